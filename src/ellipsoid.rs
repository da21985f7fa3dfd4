//! The reference body: an ellipsoid of revolution plus geodetic conversions
//! and closed-form ray intersections.
//!
//! All operations here are pure functions of their arguments; an
//! `Ellipsoid` carries no mutable state once constructed.

use uom::si::angle::radian;
use uom::si::f64::{Angle, Length};
use uom::si::length::meter;

use crate::error::RuggedError;
use crate::linalg::Vector3;

/// A position expressed as geodetic latitude/longitude/altitude above a
/// reference `Ellipsoid`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeodeticPoint {
    /// Geodetic latitude, in `[-pi/2, pi/2]`.
    pub latitude: Angle,
    /// Geodetic longitude.
    pub longitude: Angle,
    /// Altitude above the ellipsoid surface, in meters (may be negative).
    pub altitude: Length,
}

impl GeodeticPoint {
    /// Constructs a geodetic point from raw radian/meter components.
    pub fn from_radians_meters(lat_rad: f64, lon_rad: f64, alt_m: f64) -> Self {
        GeodeticPoint {
            latitude: Angle::new::<radian>(lat_rad),
            longitude: Angle::new::<radian>(lon_rad),
            altitude: Length::new::<meter>(alt_m),
        }
    }

    /// Latitude in radians.
    pub fn lat_rad(&self) -> f64 {
        self.latitude.get::<radian>()
    }

    /// Longitude in radians.
    pub fn lon_rad(&self) -> f64 {
        self.longitude.get::<radian>()
    }

    /// Altitude in meters.
    pub fn alt_m(&self) -> f64 {
        self.altitude.get::<meter>()
    }
}

/// A geodetic point together with the longitude reference it was unwrapped
/// against, so that ray paths crossing the antimeridian remain continuous.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedGeodeticPoint {
    /// The underlying geodetic point (longitude may lie outside
    /// `(-pi, pi]` once unwrapped relative to `longitude_reference`).
    pub point: GeodeticPoint,
    /// The longitude, in radians, that this point's longitude was continued
    /// from.
    pub longitude_reference: f64,
}

impl NormalizedGeodeticPoint {
    /// Normalizes `point`'s longitude to be within `pi` of
    /// `longitude_reference` (i.e. continuous across the antimeridian),
    /// recording the reference used.
    pub fn new(point: GeodeticPoint, longitude_reference: f64) -> Self {
        let lon = unwrap_longitude(point.lon_rad(), longitude_reference);
        NormalizedGeodeticPoint {
            point: GeodeticPoint {
                latitude: point.latitude,
                longitude: Angle::new::<radian>(lon),
                altitude: point.altitude,
            },
            longitude_reference,
        }
    }
}

/// Unwraps `lon` to within `pi` of `reference`, preserving continuity across
/// the antimeridian: a tile or ray path whose longitude passes through
/// `+/- pi` keeps increasing or decreasing instead of jumping by `2*pi`.
pub(crate) fn unwrap_longitude(lon: f64, reference: f64) -> f64 {
    let two_pi = std::f64::consts::TAU;
    let mut lon = lon;
    while lon - reference > std::f64::consts::PI {
        lon -= two_pi;
    }
    while lon - reference < -std::f64::consts::PI {
        lon += two_pi;
    }
    lon
}

/// An ellipsoid of revolution: equatorial radius `a`, flattening `f`.
/// Derived quantities (`e2`, `b`) are computed once at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    /// Equatorial radius, in meters.
    pub a: f64,
    /// Flattening.
    pub f: f64,
    /// Polar radius, `a * (1 - f)`.
    pub b: f64,
    /// First eccentricity squared, `f * (2 - f)`.
    pub e2: f64,
}

impl Ellipsoid {
    /// Constructs an ellipsoid from its equatorial radius and flattening.
    pub fn new(a: f64, f: f64) -> Self {
        Ellipsoid {
            a,
            f,
            b: a * (1.0 - f),
            e2: f * (2.0 - f),
        }
    }

    /// GRS80 reference ellipsoid (`a = 6378137.0`, `1/f = 298.257222101`).
    pub fn grs80() -> Self {
        Ellipsoid::new(6_378_137.0, 1.0 / 298.257_222_101)
    }

    /// WGS84 reference ellipsoid (`a = 6378137.0`, `1/f = 298.257223563`).
    pub fn wgs84() -> Self {
        Ellipsoid::new(6_378_137.0, 1.0 / 298.257_223_563)
    }

    /// IERS96 reference ellipsoid.
    pub fn iers96() -> Self {
        Ellipsoid::new(6_378_136.49, 1.0 / 298.25645)
    }

    /// IERS2003 reference ellipsoid.
    pub fn iers2003() -> Self {
        Ellipsoid::new(6_378_136.6, 1.0 / 298.25642)
    }

    /// Converts a geodetic point to body-frame Cartesian coordinates.
    pub fn geodetic_to_cartesian(&self, point: &GeodeticPoint) -> Vector3 {
        let lat = point.lat_rad();
        let lon = point.lon_rad();
        let h = point.alt_m();
        let sin_lat = lat.sin();
        let cos_lat = lat.cos();
        let n = self.a / (1.0 - self.e2 * sin_lat * sin_lat).sqrt();
        Vector3::new(
            (n + h) * cos_lat * lon.cos(),
            (n + h) * cos_lat * lon.sin(),
            (n * (1.0 - self.e2) + h) * sin_lat,
        )
    }

    /// Converts a body-frame Cartesian point to geodetic coordinates, using
    /// Bowring's closed-form approximation (1976), which is exact at the
    /// poles and on the equator and accurate to sub-millimeter altitude
    /// error elsewhere for Earth-like flattenings.
    pub fn cartesian_to_geodetic(&self, p: Vector3) -> GeodeticPoint {
        let (x, y, z) = (p.x, p.y, p.z);
        let lon = y.atan2(x);
        let r = (x * x + y * y).sqrt();
        if r < 1e-9 {
            // On (or extremely near) the polar axis: latitude is +/- pi/2,
            // longitude is undefined but conventionally zero.
            let lat = if z >= 0.0 { std::f64::consts::FRAC_PI_2 } else { -std::f64::consts::FRAC_PI_2 };
            let alt = z.abs() - self.b;
            return GeodeticPoint::from_radians_meters(lat, 0.0, alt);
        }
        let ep2 = (self.a * self.a - self.b * self.b) / (self.b * self.b);
        let theta = (z * self.a).atan2(r * self.b);
        let sin_t = theta.sin();
        let cos_t = theta.cos();
        let lat = (z + ep2 * self.b * sin_t.powi(3)).atan2(r - self.e2 * self.a * cos_t.powi(3));
        let sin_lat = lat.sin();
        let n = self.a / (1.0 - self.e2 * sin_lat * sin_lat).sqrt();
        let alt = r / lat.cos() - n;
        GeodeticPoint::from_radians_meters(lat, lon, alt)
    }

    /// Solves `a_coef*t^2 + b_coef*t + c_coef = 0` for its smallest
    /// non-negative root, if any. Used by every ray/quadric intersection in
    /// this module.
    fn smallest_nonnegative_root(a_coef: f64, b_coef: f64, c_coef: f64) -> Option<f64> {
        if a_coef.abs() < 1e-30 {
            if b_coef.abs() < 1e-30 {
                return None;
            }
            let t = -c_coef / b_coef;
            return (t >= 0.0).then_some(t);
        }
        let disc = b_coef * b_coef - 4.0 * a_coef * c_coef;
        if disc < 0.0 {
            return None;
        }
        let sqrt_disc = disc.sqrt();
        let t1 = (-b_coef - sqrt_disc) / (2.0 * a_coef);
        let t2 = (-b_coef + sqrt_disc) / (2.0 * a_coef);
        let (lo, hi) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
        if lo >= 0.0 {
            Some(lo)
        } else if hi >= 0.0 {
            Some(hi)
        } else {
            None
        }
    }

    /// Coefficients of the quadratic in `t` for `p + los*t` on the offset
    /// ellipsoid at constant `altitude` (equatorial/polar radii both shifted
    /// by `altitude`; an accepted approximation for a constant-height shell
    /// in this domain, not a true geodetic offset surface).
    fn altitude_quadric_coeffs(&self, p: Vector3, los: Vector3, altitude: f64) -> (f64, f64, f64) {
        let a = self.a + altitude;
        let b = self.b + altitude;
        let inv_a2 = 1.0 / (a * a);
        let inv_b2 = 1.0 / (b * b);
        let a_coef = (los.x * los.x + los.y * los.y) * inv_a2 + los.z * los.z * inv_b2;
        let b_coef = 2.0 * ((p.x * los.x + p.y * los.y) * inv_a2 + p.z * los.z * inv_b2);
        let c_coef = (p.x * p.x + p.y * p.y) * inv_a2 + p.z * p.z * inv_b2 - 1.0;
        (a_coef, b_coef, c_coef)
    }

    /// Intersects ray `(p, los)` with the offset ellipsoid at constant
    /// `altitude`.
    pub fn point_at_altitude(
        &self,
        p: Vector3,
        los: Vector3,
        altitude: f64,
    ) -> Result<GeodeticPoint, RuggedError> {
        let (a_coef, b_coef, c_coef) = self.altitude_quadric_coeffs(p, los, altitude);
        let t = Self::smallest_nonnegative_root(a_coef, b_coef, c_coef)
            .ok_or(RuggedError::LineOfSightNeverCrossesAltitude { altitude_m: altitude })?;
        Ok(self.cartesian_to_geodetic(p + los * t))
    }

    /// The algebraically smallest real root (may be negative, i.e. behind
    /// the ray origin) of the ray/offset-ellipsoid quadric at `altitude`.
    /// Used by the DEM entry-point search to tell "no shell crossing at all"
    /// apart from "the shell is crossed, but behind the spacecraft".
    pub(crate) fn smallest_real_root_at_altitude(&self, p: Vector3, los: Vector3, altitude: f64) -> Option<f64> {
        let (a_coef, b_coef, c_coef) = self.altitude_quadric_coeffs(p, los, altitude);
        Self::all_real_roots(a_coef, b_coef, c_coef)
            .into_iter()
            .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |m| m.min(t))))
    }

    /// Intersects ray `(p, los)` with the ellipsoid surface at altitude
    /// zero; the standard ground intersection.
    pub fn point_on_ground(&self, p: Vector3, los: Vector3) -> Result<GeodeticPoint, RuggedError> {
        self.point_at_altitude(p, los, 0.0)
            .map_err(|_| RuggedError::LineOfSightDoesNotReachGround)
    }

    /// Intersects ray `(p, los)` with the offset ellipsoid at the given
    /// `altitude`; identical to [`Self::point_at_altitude`] but reports the
    /// ground-specific error when it fails.
    pub fn point_on_ground_at_altitude(
        &self,
        p: Vector3,
        los: Vector3,
        altitude: f64,
    ) -> Result<GeodeticPoint, RuggedError> {
        self.point_at_altitude(p, los, altitude)
            .map_err(|_| RuggedError::LineOfSightDoesNotReachGround)
    }

    /// Intersects ray `(p, los)` with the cone of constant geodetic
    /// latitude `lat_rad`. The locus of points at fixed geodetic latitude is
    /// linear in cylindrical coordinates (`z = r*tan(lat) - k`), so this
    /// reduces to a quadratic in the ray parameter. When two roots exist,
    /// the one whose point is closer to `close_ref` is returned.
    pub fn point_at_latitude(
        &self,
        p: Vector3,
        los: Vector3,
        lat_rad: f64,
        close_ref: Vector3,
    ) -> Result<GeodeticPoint, RuggedError> {
        let err = || RuggedError::LineOfSightNeverCrossesLatitude { latitude_rad: lat_rad };
        if lat_rad.abs() >= std::f64::consts::FRAC_PI_2 - 1e-12 {
            // Degenerate: the "cone" collapses to the polar axis itself;
            // there is no ray/axis crossing in general position.
            return Err(err());
        }
        let sin_lat = lat_rad.sin();
        let n = self.a / (1.0 - self.e2 * sin_lat * sin_lat).sqrt();
        let k = n * self.e2 * sin_lat;
        if lat_rad.abs() < 1e-12 {
            // Equatorial plane: z = 0.
            let t = -p.z / los.z;
            if !t.is_finite() {
                return Err(err());
            }
            let candidates = [t];
            return self.pick_closest(&candidates, p, los, close_ref).ok_or_else(err);
        }
        let tan_lat = lat_rad.tan();
        let m = 1.0 / (tan_lat * tan_lat);
        let zk = |t: f64| p.z + los.z * t + k;
        let a_coef = los.x * los.x + los.y * los.y - m * los.z * los.z;
        let b_coef = 2.0 * (p.x * los.x + p.y * los.y) - 2.0 * m * los.z * (p.z + k);
        let c_coef = p.x * p.x + p.y * p.y - m * (p.z + k) * (p.z + k);
        let roots = Self::all_real_roots(a_coef, b_coef, c_coef);
        // Only roots on the correct side of the cone (same sign of
        // r*tan(lat) as the requested hemisphere) are genuine latitude
        // crossings; the quadratic also admits the mirror-image cone at
        // `-lat_rad`.
        let valid: Vec<f64> = roots
            .into_iter()
            .filter(|&t| {
                let z = zk(t) - k;
                let same_hemisphere = z.signum() == lat_rad.signum() || z.abs() < 1e-9;
                same_hemisphere
            })
            .collect();
        self.pick_closest(&valid, p, los, close_ref).ok_or_else(err)
    }

    /// Intersects ray `(p, los)` with the half-plane of constant longitude
    /// `lon_rad`.
    pub fn point_at_longitude(
        &self,
        p: Vector3,
        los: Vector3,
        lon_rad: f64,
        _close_ref: Vector3,
    ) -> Result<GeodeticPoint, RuggedError> {
        let err = || RuggedError::LineOfSightNeverCrossesLongitude { longitude_rad: lon_rad };
        let cl = lon_rad.cos();
        let sl = lon_rad.sin();
        let denom = los.y * cl - los.x * sl;
        if denom.abs() < 1e-15 {
            return Err(err());
        }
        let t = (p.x * sl - p.y * cl) / denom;
        if t < 0.0 {
            return Err(err());
        }
        let hit = p + los * t;
        if hit.x * cl + hit.y * sl < 0.0 {
            return Err(err());
        }
        Ok(self.cartesian_to_geodetic(hit))
    }

    fn all_real_roots(a_coef: f64, b_coef: f64, c_coef: f64) -> Vec<f64> {
        if a_coef.abs() < 1e-30 {
            if b_coef.abs() < 1e-30 {
                return Vec::new();
            }
            return vec![-c_coef / b_coef];
        }
        let disc = b_coef * b_coef - 4.0 * a_coef * c_coef;
        if disc < 0.0 {
            return Vec::new();
        }
        let sqrt_disc = disc.sqrt();
        vec![
            (-b_coef - sqrt_disc) / (2.0 * a_coef),
            (-b_coef + sqrt_disc) / (2.0 * a_coef),
        ]
    }

    fn pick_closest(
        &self,
        candidates: &[f64],
        p: Vector3,
        los: Vector3,
        close_ref: Vector3,
    ) -> Option<GeodeticPoint> {
        let forward: Vec<f64> = candidates.iter().copied().filter(|t| t.is_finite()).collect();
        forward
            .into_iter()
            .min_by(|&t1, &t2| {
                let d1 = (p + los * t1 - close_ref).norm();
                let d2 = (p + los * t2 - close_ref).norm();
                d1.partial_cmp(&d2).unwrap()
            })
            .map(|t| self.cartesian_to_geodetic(p + los * t))
    }
}
