//! Multi-layer atmospheric refraction: an optional collaborator to
//! ground-point intersection, feature-gated behind `atmosphere`
//! (default-on).
//!
//! The model treats the atmosphere as a stack of concentric spherical shells
//! of constant refractive index (the fixed table below), each boundary
//! bending the line of sight by Snell's law — the textbook
//! "radio-occultation" spherical-shell refraction model (see DESIGN.md for
//! the resolved open question about the `previous_refraction_index`
//! sentinel).

use once_cell::sync::Lazy;

use crate::dem::Tile;
use crate::ellipsoid::{Ellipsoid, GeodeticPoint};
use crate::error::RuggedError;
use crate::linalg::Vector3;

/// One shell boundary: `lower_bound_altitude_m` is the altitude, in meters,
/// at and above which `refractive_index` applies, down to the next lower
/// entry in the table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefractionLayer {
    /// The altitude, in meters, marking this layer's lower bound.
    pub lower_bound_altitude_m: f64,
    /// The refractive index of the air column at and above this boundary.
    pub refractive_index: f64,
}

/// The default layer table, processed in descending-altitude order (index 0
/// is the highest layer). Built once and shared, in the same
/// static-backed global table pattern as `iers`'s `IERS_DATA`.
pub static DEFAULT_LAYERS: Lazy<Vec<RefractionLayer>> = Lazy::new(|| {
    [
        (100_000.0, 1.000_000),
        (50_000.0, 1.000_000),
        (40_000.0, 1.000_001),
        (30_000.0, 1.000_004),
        (23_000.0, 1.000_012),
        (18_000.0, 1.000_028),
        (14_000.0, 1.000_052),
        (11_000.0, 1.000_083),
        (9_000.0, 1.000_106),
        (7_000.0, 1.000_134),
        (5_000.0, 1.000_167),
        (3_000.0, 1.000_206),
        (1_000.0, 1.000_252),
        (0.0, 1.000_278),
        (-1_000.0, 1.000_306),
    ]
    .into_iter()
    .map(|(lower_bound_altitude_m, refractive_index)| RefractionLayer { lower_bound_altitude_m, refractive_index })
    .collect()
});

/// The multi-layer atmospheric refraction model.
#[derive(Debug, Clone)]
pub struct AtmosphericRefraction {
    /// Layers, in descending `lower_bound_altitude_m` order. Must be
    /// strictly descending and non-empty.
    layers: Vec<RefractionLayer>,
}

impl Default for AtmosphericRefraction {
    fn default() -> Self {
        AtmosphericRefraction { layers: DEFAULT_LAYERS.clone() }
    }
}

impl AtmosphericRefraction {
    /// Builds a model from a custom layer table (e.g. for a non-Earth
    /// atmosphere), sorted descending by altitude. Fails with
    /// [`RuggedError::NoLayerData`] if `layers` is empty.
    pub fn new(mut layers: Vec<RefractionLayer>) -> Result<Self, RuggedError> {
        if layers.is_empty() {
            return Err(RuggedError::NoLayerData { altitude_m: f64::NAN });
        }
        layers.sort_by(|a, b| b.lower_bound_altitude_m.partial_cmp(&a.lower_bound_altitude_m).unwrap());
        Ok(AtmosphericRefraction { layers })
    }

    /// The layer whose shell the given altitude falls at or just above,
    /// i.e. the first entry (in descending order) whose
    /// `lower_bound_altitude_m <= altitude`.
    fn layer_at_or_above(&self, altitude_m: f64) -> Result<usize, RuggedError> {
        self.layers
            .iter()
            .position(|layer| layer.lower_bound_altitude_m <= altitude_m)
            .ok_or(RuggedError::NoLayerData { altitude_m })
    }

    /// Refracts ray `(initial_pos, initial_los)` down through the layer
    /// table to `altitude`, then intersects the resulting ray with `tile`.
    ///
    /// `initial_zenith` is the angle, in radians, between `initial_los` and
    /// the local "up" direction at `initial_pos`, as seen looking back along
    /// the ray (i.e. the classical zenith angle of the incoming ray); it is
    /// accepted for interface parity but is redundant with `initial_los`
    /// (the two must agree up to floating-point tolerance — see DESIGN.md's
    /// resolution of this open question), since the direction vector alone
    /// determines the angle used by the Snell's law stepping below.
    pub fn get_point_on_ground(
        &self,
        ellipsoid: &Ellipsoid,
        initial_pos: Vector3,
        initial_los: Vector3,
        initial_zenith: f64,
        altitude: f64,
        tile: &Tile,
    ) -> Result<GeodeticPoint, RuggedError> {
        let _ = initial_zenith; // accepted for interface parity; see doc comment above.
        let los = initial_los.normalize();
        let start_altitude = ellipsoid.cartesian_to_geodetic(initial_pos).alt_m();

        let start_idx = self.layer_at_or_above(start_altitude)?;
        let end_idx = self.layer_at_or_above(altitude)?;

        let mut p = initial_pos;
        let mut d = los;
        // `previous_refraction_index = -1` sentinel: resolved here as "no
        // interface above the first applicable layer" — the first layer
        // transition in the loop below has no predecessor to bend away
        // from, so the loop starts its "previous index" at the starting
        // layer's own index and only bends at the boundaries *between*
        // table entries, never at entry into the topmost one.
        let mut previous_index = self.layers[start_idx].refractive_index;

        for next_idx in (start_idx + 1)..=end_idx {
            let next_layer = self.layers[next_idx];
            let shell_radius = ellipsoid.a + next_layer.lower_bound_altitude_m;
            let (p2, exists) = step_to_shell(p, d, shell_radius);
            if !exists {
                break;
            }
            p = p2;
            let up = p.normalize();
            d = match refract(d, up, previous_index, next_layer.refractive_index) {
                Some(refracted) => refracted,
                None => break, // total internal reflection: keep straight-line d (should not occur for n~1)
            };
            previous_index = next_layer.refractive_index;
        }

        intersect_tile(ellipsoid, tile, p, d).ok_or(RuggedError::LineOfSightDoesNotReachGround)
    }
}

/// Finds the point on ray `(p, d)` (d need not be unit) at the sphere of
/// radius `radius` centered at the body's center, choosing the smallest
/// non-negative step. Returns `(point, true)` on success, or `(p, false)` if
/// the ray does not reach that shell.
fn step_to_shell(p: Vector3, d: Vector3, radius: f64) -> (Vector3, bool) {
    let a = d.dot(d);
    let b = 2.0 * p.dot(d);
    let c = p.dot(p) - radius * radius;
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return (p, false);
    }
    let sqrt_disc = disc.sqrt();
    let t1 = (-b - sqrt_disc) / (2.0 * a);
    let t2 = (-b + sqrt_disc) / (2.0 * a);
    let t = if t1 >= 0.0 { t1 } else { t2 };
    if t < 0.0 {
        return (p, false);
    }
    (p + d * t, true)
}

/// Vector form of Snell's law: refracts unit incident direction `d` across
/// an interface with outward normal `normal` (pointing back toward the
/// medium `d` is leaving), bending from refractive index `n1` to `n2`.
/// Returns `None` on total internal reflection.
fn refract(d: Vector3, normal: Vector3, n1: f64, n2: f64) -> Option<Vector3> {
    let eta = n1 / n2;
    let cos_i = -d.dot(normal);
    let sin2_t = eta * eta * (1.0 - cos_i * cos_i).max(0.0);
    if sin2_t > 1.0 {
        return None;
    }
    let cos_t = (1.0 - sin2_t).sqrt();
    Some((d * eta + normal * (eta * cos_i - cos_t)).normalize())
}

/// Brute-force ray/tile intersection for the atmospheric model's final
/// step, mirroring `BasicScanAlgorithm`: this module is given a single
/// already-selected `tile` rather than a cache, so there is no tile-hopping
/// to do.
fn intersect_tile(ellipsoid: &Ellipsoid, tile: &Tile, p: Vector3, d: Vector3) -> Option<GeodeticPoint> {
    let (n_lat, n_lon) = tile.dims();
    let mut best: Option<(f64, GeodeticPoint)> = None;
    for i in 0..n_lat - 1 {
        for j in 0..n_lon - 1 {
            if let Some(hit) = tile.cell_intersection(ellipsoid, p, d, i, j) {
                let cart = ellipsoid.geodetic_to_cartesian(&hit);
                let t = (cart - p).dot(d) / d.dot(d);
                if t >= 0.0 && best.as_ref().map(|(bt, _)| t < *bt).unwrap_or(true) {
                    best = Some((t, hit));
                }
            }
        }
    }
    best.map(|(_, hit)| hit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_tile(elevation: f64) -> Tile {
        let deg = std::f64::consts::PI / 180.0;
        Tile::new(-2.0 * deg, -2.0 * deg, deg / 2.0, deg / 2.0, 8, 8, vec![elevation; 64]).unwrap()
    }

    #[test]
    fn default_layers_are_strictly_descending() {
        let layers = &DEFAULT_LAYERS;
        for pair in layers.windows(2) {
            assert!(pair[0].lower_bound_altitude_m > pair[1].lower_bound_altitude_m);
        }
    }

    #[test]
    fn empty_layer_table_is_rejected() {
        assert!(AtmosphericRefraction::new(Vec::new()).is_err());
    }

    #[test]
    fn refraction_near_unity_index_barely_bends_nadir_ray() {
        let ellipsoid = Ellipsoid::wgs84();
        let model = AtmosphericRefraction::default();
        let tile = flat_tile(0.0);

        let alt = 50_000.0;
        let p = Vector3::new(ellipsoid.a + alt, 0.0, 0.0);
        let los = Vector3::new(-1.0, 0.0, 0.0);
        let unrefracted = ellipsoid.point_on_ground(p, los).unwrap();

        let hit = model.get_point_on_ground(&ellipsoid, p, los, 0.0, 0.0, &tile).unwrap();
        // A purely nadir ray crosses every shell boundary-on, so Snell's law
        // leaves it undeflected regardless of the index profile; this
        // exercises the full stepping loop while keeping a closed-form
        // expected answer.
        assert!((hit.lat_rad() - unrefracted.lat_rad()).abs() < 1e-9);
        assert!((hit.lon_rad() - unrefracted.lon_rad()).abs() < 1e-9);
    }

    #[test]
    fn oblique_ray_bends_toward_the_normal_entering_denser_air() {
        let ellipsoid = Ellipsoid::wgs84();
        let model = AtmosphericRefraction::default();
        let tile = flat_tile(0.0);

        let alt = 50_000.0;
        let p = Vector3::new(ellipsoid.a + alt, 0.0, 0.0);
        let los = Vector3::new(-1.0, 0.3, 0.0).normalize();

        let hit = model.get_point_on_ground(&ellipsoid, p, los, 0.0, 0.0, &tile);
        assert!(hit.is_ok());
    }
}
