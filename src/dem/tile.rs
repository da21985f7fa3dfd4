//! A rectangular lat/long-indexed DEM patch with a min/max coverage tree.
//!
//! A regular lattice of elevation samples, cells being the quadrilateral
//! patches between four neighboring samples, plus a balanced binary
//! subdivision (alternating along the larger side) down to single cells,
//! each internal node storing `(hMin, hMax)` for its subregion.

use crate::ellipsoid::{unwrap_longitude, Ellipsoid, GeodeticPoint};
use crate::error::RuggedError;
use crate::linalg::Vector3;

/// The relationship between a queried `(lat, lon)` and a tile's coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationStatus {
    /// The point is interior: all four surrounding samples lie in the tile.
    HasInterpolationNeighbors,
    /// The point is within the tile but right at its edge, so at least one
    /// neighboring sample needed for interpolation is missing.
    HasRawData,
    /// The point is outside the tile's angular coverage entirely.
    OutOfTile,
}

/// One node of a tile's min/max coverage tree, covering the half-open cell
/// index rectangle `[i0, i1) x [j0, j1)`.
#[derive(Debug, Clone)]
pub struct MinMaxNode {
    pub(crate) i0: usize,
    pub(crate) i1: usize,
    pub(crate) j0: usize,
    pub(crate) j1: usize,
    /// Minimum elevation across every cell covered by this node.
    pub h_min: f64,
    /// Maximum elevation across every cell covered by this node.
    pub h_max: f64,
    pub(crate) children: Option<Box<(MinMaxNode, MinMaxNode)>>,
}

impl MinMaxNode {
    fn build(elevations: &[f64], n_lon: usize, i0: usize, i1: usize, j0: usize, j1: usize) -> Self {
        if i1 - i0 == 1 && j1 - j0 == 1 {
            let h00 = elevations[i0 * n_lon + j0];
            let h10 = elevations[i0 * n_lon + j0 + 1];
            let h01 = elevations[(i0 + 1) * n_lon + j0];
            let h11 = elevations[(i0 + 1) * n_lon + j0 + 1];
            let h_min = h00.min(h10).min(h01).min(h11);
            let h_max = h00.max(h10).max(h01).max(h11);
            return MinMaxNode { i0, i1, j0, j1, h_min, h_max, children: None };
        }
        let (left, right) = if (i1 - i0) >= (j1 - j0) {
            let mid = i0 + (i1 - i0) / 2;
            (
                MinMaxNode::build(elevations, n_lon, i0, mid, j0, j1),
                MinMaxNode::build(elevations, n_lon, mid, i1, j0, j1),
            )
        } else {
            let mid = j0 + (j1 - j0) / 2;
            (
                MinMaxNode::build(elevations, n_lon, i0, i1, j0, mid),
                MinMaxNode::build(elevations, n_lon, i0, i1, mid, j1),
            )
        };
        let h_min = left.h_min.min(right.h_min);
        let h_max = left.h_max.max(right.h_max);
        MinMaxNode { i0, i1, j0, j1, h_min, h_max, children: Some(Box::new((left, right))) }
    }

    /// Whether this node is a single DEM cell.
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// The node's children, nearest-first is decided by the caller (the
    /// traversal needs the ray direction to know which child to visit
    /// first; this just exposes both).
    pub fn children(&self) -> Option<(&MinMaxNode, &MinMaxNode)> {
        self.children.as_ref().map(|b| (&b.0, &b.1))
    }
}

/// An orthonormal east/north/up frame anchored at a tile's center, used by
/// the flat-body intersection variant's locally-planar approximation.
#[derive(Debug, Clone, Copy)]
pub struct LocalFrame {
    /// The frame's origin, in body-frame Cartesian coordinates.
    pub origin: Vector3,
    /// Unit vector pointing east at the origin.
    pub east: Vector3,
    /// Unit vector pointing (geodetic) north at the origin.
    pub north: Vector3,
    /// Unit vector pointing up (away from the body) at the origin.
    pub up: Vector3,
}

impl LocalFrame {
    /// Projects a body-frame Cartesian point into this frame's coordinates.
    pub fn to_local(&self, p: Vector3) -> Vector3 {
        let d = p - self.origin;
        Vector3::new(d.dot(self.east), d.dot(self.north), d.dot(self.up))
    }

    /// Projects a body-frame Cartesian direction (no translation) into this
    /// frame's coordinates.
    pub fn to_local_direction(&self, v: Vector3) -> Vector3 {
        Vector3::new(v.dot(self.east), v.dot(self.north), v.dot(self.up))
    }
}

/// A rectangular grid of elevation samples on a regular (latitude,
/// longitude) lattice, with a min/max coverage tree over its cells.
#[derive(Debug, Clone)]
pub struct Tile {
    lat0: f64,
    lon0: f64,
    d_lat: f64,
    d_lon: f64,
    n_lat: usize,
    n_lon: usize,
    elevations: Vec<f64>,
    root: MinMaxNode,
    local_frame: LocalFrame,
}

impl Tile {
    /// Constructs a tile from a raster of `n_lat x n_lon` elevation samples
    /// in row-major order (`elevations[i * n_lon + j]` is the sample at
    /// `(lat0 + i*d_lat, lon0 + j*d_lon)`).
    ///
    /// Fails with [`RuggedError::EmptyTile`] if either dimension has fewer
    /// than two samples, or if the steps are not strictly positive.
    pub fn new(
        lat0: f64,
        lon0: f64,
        d_lat: f64,
        d_lon: f64,
        n_lat: usize,
        n_lon: usize,
        elevations: Vec<f64>,
    ) -> Result<Self, RuggedError> {
        if n_lat < 2 || n_lon < 2 || d_lat <= 0.0 || d_lon <= 0.0 || elevations.len() != n_lat * n_lon {
            return Err(RuggedError::EmptyTile);
        }
        let root = MinMaxNode::build(&elevations, n_lon, 0, n_lat - 1, 0, n_lon - 1);
        let center_lat = lat0 + d_lat * (n_lat - 1) as f64 / 2.0;
        let center_lon = lon0 + d_lon * (n_lon - 1) as f64 / 2.0;
        let local_frame = Self::build_local_frame(center_lat, center_lon);
        Ok(Tile { lat0, lon0, d_lat, d_lon, n_lat, n_lon, elevations, root, local_frame })
    }

    fn build_local_frame(lat: f64, lon: f64) -> LocalFrame {
        let ellipsoid = Ellipsoid::wgs84();
        let gp = GeodeticPoint::from_radians_meters(lat, lon, 0.0);
        let origin = ellipsoid.geodetic_to_cartesian(&gp);
        let sin_lat = lat.sin();
        let cos_lat = lat.cos();
        let sin_lon = lon.sin();
        let cos_lon = lon.cos();
        let east = Vector3::new(-sin_lon, cos_lon, 0.0);
        let north = Vector3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat);
        let up = Vector3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat);
        LocalFrame { origin, east, north, up }
    }

    /// This tile's origin `(lat0, lon0)`, in radians.
    pub fn origin(&self) -> (f64, f64) {
        (self.lat0, self.lon0)
    }

    /// This tile's angular steps `(d_lat, d_lon)`, in radians.
    pub fn steps(&self) -> (f64, f64) {
        (self.d_lat, self.d_lon)
    }

    /// This tile's sample grid dimensions `(n_lat, n_lon)`.
    pub fn dims(&self) -> (usize, usize) {
        (self.n_lat, self.n_lon)
    }

    /// The root of the min/max coverage tree.
    pub fn root(&self) -> &MinMaxNode {
        &self.root
    }

    /// The tangent-plane frame anchored at this tile's center.
    pub fn local_frame(&self) -> &LocalFrame {
        &self.local_frame
    }

    /// The DEM's global maximum elevation within this tile.
    pub fn max_elevation(&self) -> f64 {
        self.root.h_max
    }

    /// Raw, bounds-checked sample lookup.
    pub fn get_elevation_at_indices(&self, i: i64, j: i64) -> Result<f64, RuggedError> {
        if i < 0 || j < 0 || i as usize >= self.n_lat || j as usize >= self.n_lon {
            return Err(RuggedError::OutOfTileIndices {
                i,
                j,
                max_i: self.n_lat as i64 - 1,
                max_j: self.n_lon as i64 - 1,
            });
        }
        Ok(self.elevations[i as usize * self.n_lon + j as usize])
    }

    /// This tile's angular center longitude, used as the reference to
    /// unwrap a raw query longitude (e.g. straight out of `atan2`) into this
    /// tile's own continuous frame, so a tile spanning the antimeridian is
    /// still matched regardless of which side of `+/-pi` the query wrapped
    /// to.
    fn longitude_reference(&self) -> f64 {
        self.lon0 + self.d_lon * (self.n_lon - 1) as f64 / 2.0
    }

    /// The fractional `(i, j)` indices of `(lat, lon)`, i.e. `i = (lat -
    /// lat0) / d_lat`, `j = (lon - lon0) / d_lon` (not bounds-checked). `lon`
    /// is unwrapped against this tile's own reference longitude first, so a
    /// wrapped (`atan2`-range) query longitude still lands correctly in a
    /// tile that straddles the antimeridian.
    pub fn fractional_indices(&self, lat: f64, lon: f64) -> (f64, f64) {
        let lon = unwrap_longitude(lon, self.longitude_reference());
        ((lat - self.lat0) / self.d_lat, (lon - self.lon0) / self.d_lon)
    }

    /// The location status of `(lat, lon)` relative to this tile.
    pub fn location_status(&self, lat: f64, lon: f64) -> LocationStatus {
        let (fi, fj) = self.fractional_indices(lat, lon);
        if fi < 0.0 || fj < 0.0 || fi > (self.n_lat - 1) as f64 || fj > (self.n_lon - 1) as f64 {
            return LocationStatus::OutOfTile;
        }
        let edge = 1e-9;
        if fi < edge || fj < edge || fi > (self.n_lat - 1) as f64 - edge || fj > (self.n_lon - 1) as f64 - edge {
            return LocationStatus::HasRawData;
        }
        LocationStatus::HasInterpolationNeighbors
    }

    /// Bilinear interpolation of the elevation at `(lat, lon)`.
    pub fn interpolate_elevation(&self, lat: f64, lon: f64) -> Result<f64, RuggedError> {
        let (fi, fj) = self.fractional_indices(lat, lon);
        if fi < 0.0 || fj < 0.0 || fi > (self.n_lat - 1) as f64 || fj > (self.n_lon - 1) as f64 {
            return Err(RuggedError::OutOfTileAngles { latitude_rad: lat, longitude_rad: lon });
        }
        let i = (fi.floor() as usize).min(self.n_lat - 2);
        let j = (fj.floor() as usize).min(self.n_lon - 2);
        let v = fi - i as f64;
        let u = fj - j as f64;
        let h00 = self.get_elevation_at_indices(i as i64, j as i64)?;
        let h10 = self.get_elevation_at_indices(i as i64, j as i64 + 1)?;
        let h01 = self.get_elevation_at_indices(i as i64 + 1, j as i64)?;
        let h11 = self.get_elevation_at_indices(i as i64 + 1, j as i64 + 1)?;
        Ok(bilinear(h00, h10, h01, h11, u, v))
    }

    fn corner_cartesian(&self, ellipsoid: &Ellipsoid, i: usize, j: usize) -> Vector3 {
        let lat = self.lat0 + i as f64 * self.d_lat;
        let lon = self.lon0 + j as f64 * self.d_lon;
        let h = self.elevations[i * self.n_lon + j];
        ellipsoid.geodetic_to_cartesian(&GeodeticPoint::from_radians_meters(lat, lon, h))
    }

    /// The geodetic bounds `(lat_min, lat_max, lon_min, lon_max)` of a
    /// min/max-tree node's cell index rectangle.
    pub fn node_bounds(&self, node: &MinMaxNode) -> (f64, f64, f64, f64) {
        (
            self.lat0 + node.i0 as f64 * self.d_lat,
            self.lat0 + node.i1 as f64 * self.d_lat,
            self.lon0 + node.j0 as f64 * self.d_lon,
            self.lon0 + node.j1 as f64 * self.d_lon,
        )
    }

    /// The axis-aligned box (in this tile's local tangent frame) enclosing
    /// a node's curved lat/long/altitude region, formed from the 8 corners
    /// of its index rectangle at the node's `h_min` and `h_max`.
    pub fn node_local_aabb(&self, ellipsoid: &Ellipsoid, node: &MinMaxNode) -> (Vector3, Vector3) {
        let (lat_min, lat_max, lon_min, lon_max) = self.node_bounds(node);
        let frame = &self.local_frame;
        let mut lo = Vector3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        let mut hi = Vector3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for &lat in &[lat_min, lat_max] {
            for &lon in &[lon_min, lon_max] {
                for &h in &[node.h_min, node.h_max] {
                    let cart = ellipsoid.geodetic_to_cartesian(&GeodeticPoint::from_radians_meters(lat, lon, h));
                    let local = frame.to_local(cart);
                    lo.x = lo.x.min(local.x);
                    lo.y = lo.y.min(local.y);
                    lo.z = lo.z.min(local.z);
                    hi.x = hi.x.max(local.x);
                    hi.y = hi.y.max(local.y);
                    hi.z = hi.z.max(local.z);
                }
            }
        }
        (lo, hi)
    }

    /// Whether `(lat, lon, h)` falls within a node's exact index rectangle
    /// and altitude shell (used to refine the flat-body approximation for
    /// the primary Duvenhage variant).
    pub fn node_contains(&self, node: &MinMaxNode, lat: f64, lon: f64, h: f64) -> bool {
        let lon = unwrap_longitude(lon, self.longitude_reference());
        let (lat_min, lat_max, lon_min, lon_max) = self.node_bounds(node);
        lat >= lat_min && lat <= lat_max && lon >= lon_min && lon <= lon_max && h >= node.h_min && h <= node.h_max
    }

    /// The leaf cell `(i, j)` that a node covers (valid only when
    /// `node.is_leaf()`).
    pub fn leaf_cell(&self, node: &MinMaxNode) -> (usize, usize) {
        (node.i0, node.j0)
    }

    /// Intersects ray `(p, los)` with the bilinear elevation patch of cell
    /// `(i, j)`, using the standard ray/bilinear-patch algorithm (solve a
    /// quadratic in one patch parameter after eliminating the ray
    /// parameter via two directions perpendicular to the ray). Returns
    /// `None` if the ray misses the patch within `(u, v) in [0, 1]^2` or
    /// only intersects it behind the ray origin.
    pub fn cell_intersection(
        &self,
        ellipsoid: &Ellipsoid,
        p: Vector3,
        los: Vector3,
        i: usize,
        j: usize,
    ) -> Option<GeodeticPoint> {
        if i + 1 >= self.n_lat || j + 1 >= self.n_lon {
            return None;
        }
        let p00 = self.corner_cartesian(ellipsoid, i, j);
        let p10 = self.corner_cartesian(ellipsoid, i, j + 1);
        let p01 = self.corner_cartesian(ellipsoid, i + 1, j);
        let p11 = self.corner_cartesian(ellipsoid, i + 1, j + 1);

        let a = p10 - p00;
        let b = p01 - p00;
        let c = p11 - p10 - p01 + p00;
        let q = p - p00;

        let los_n = los.normalize();
        let helper = if los_n.x.abs() < 0.9 { Vector3::new(1.0, 0.0, 0.0) } else { Vector3::new(0.0, 1.0, 0.0) };
        let n1 = los_n.cross(helper).normalize();
        let n2 = los_n.cross(n1);

        let a1 = n1.dot(a);
        let b1 = n1.dot(b);
        let c1 = n1.dot(c);
        let d1 = -n1.dot(q);
        let a2 = n2.dot(a);
        let b2 = n2.dot(b);
        let c2 = n2.dot(c);
        let d2 = -n2.dot(q);

        let a_u = a2 * c1 - c2 * a1;
        let b_u = a2 * b1 + d2 * c1 - b2 * a1 - c2 * d1;
        let c_u = d2 * b1 - b2 * d1;

        let mut candidates = Vec::with_capacity(2);
        for u in quadratic_roots(a_u, b_u, c_u) {
            let denom = b1 + c1 * u;
            let v = if denom.abs() > 1e-12 {
                -(a1 * u + d1) / denom
            } else {
                let denom2 = b2 + c2 * u;
                if denom2.abs() < 1e-12 {
                    continue;
                }
                -(a2 * u + d2) / denom2
            };
            candidates.push((u, v));
        }

        let eps = 1e-9;
        let mut best: Option<(f64, f64, f64)> = None;
        for (u, v) in candidates {
            if u < -eps || u > 1.0 + eps || v < -eps || v > 1.0 + eps {
                continue;
            }
            let hit = a * u + b * v + c * (u * v) - q;
            let denom = los.dot(los);
            if denom.abs() < 1e-30 {
                continue;
            }
            let t = hit.dot(los) / denom;
            if t < 0.0 {
                continue;
            }
            if best.map(|(_, _, bt)| t < bt).unwrap_or(true) {
                best = Some((u, v, t));
            }
        }

        best.map(|(u, v, _)| {
            let h00 = self.elevations[i * self.n_lon + j];
            let h10 = self.elevations[i * self.n_lon + j + 1];
            let h01 = self.elevations[(i + 1) * self.n_lon + j];
            let h11 = self.elevations[(i + 1) * self.n_lon + j + 1];
            let lat = self.lat0 + (i as f64 + v) * self.d_lat;
            let lon = self.lon0 + (j as f64 + u) * self.d_lon;
            let h = bilinear(h00, h10, h01, h11, u, v);
            GeodeticPoint::from_radians_meters(lat, lon, h)
        })
    }
}

fn bilinear(h00: f64, h10: f64, h01: f64, h11: f64, u: f64, v: f64) -> f64 {
    (1.0 - u) * (1.0 - v) * h00 + u * (1.0 - v) * h10 + (1.0 - u) * v * h01 + u * v * h11
}

fn quadratic_roots(a: f64, b: f64, c: f64) -> Vec<f64> {
    if a.abs() < 1e-14 {
        if b.abs() < 1e-14 {
            return Vec::new();
        }
        return vec![-c / b];
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return Vec::new();
    }
    let sqrt_disc = disc.sqrt();
    vec![(-b - sqrt_disc) / (2.0 * a), (-b + sqrt_disc) / (2.0 * a)]
}
