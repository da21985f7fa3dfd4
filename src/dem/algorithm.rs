//! The intersection algorithm family.
//!
//! All four variants share the same two-operation capability surface
//! (`intersection`, `refine_intersection`), modeled as a flat trait with one
//! small `impl` per variant rather than a class hierarchy.

use crate::dem::cache::{TileCache, TileUpdater};
use crate::dem::tile::{MinMaxNode, Tile};
use crate::ellipsoid::{Ellipsoid, GeodeticPoint};
use crate::error::RuggedError;
use crate::linalg::Vector3;

/// The shared capability set every intersection algorithm variant
/// implements.
pub trait IntersectionAlgorithm {
    /// Intersects ray `(p, los)`, given in the body frame, with the ground
    /// (DEM or ellipsoid, depending on the variant).
    fn intersection(&mut self, ellipsoid: &Ellipsoid, p: Vector3, los: Vector3) -> Result<GeodeticPoint, RuggedError>;

    /// Refines an approximate hit `approx` (typically computed with a
    /// light-time-shifted transform) into an exact one, by recomputing the
    /// cell intersection in the tile known to contain it.
    fn refine_intersection(
        &mut self,
        ellipsoid: &Ellipsoid,
        p: Vector3,
        los: Vector3,
        approx: GeodeticPoint,
    ) -> Result<GeodeticPoint, RuggedError>;
}

/// Ignores the DEM entirely; intersection is the ellipsoid surface at
/// altitude zero, and refinement is the identity.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreDemAlgorithm;

impl IntersectionAlgorithm for IgnoreDemAlgorithm {
    fn intersection(&mut self, ellipsoid: &Ellipsoid, p: Vector3, los: Vector3) -> Result<GeodeticPoint, RuggedError> {
        ellipsoid.point_on_ground(p, los)
    }

    fn refine_intersection(
        &mut self,
        _ellipsoid: &Ellipsoid,
        _p: Vector3,
        _los: Vector3,
        approx: GeodeticPoint,
    ) -> Result<GeodeticPoint, RuggedError> {
        Ok(approx)
    }
}

/// Replaces the DEM with an ellipsoid offset by a fixed altitude; used
/// internally by inverse localization's quadrilateral corners.
#[derive(Debug, Clone, Copy)]
pub struct FixedAltitudeAlgorithm {
    /// The fixed altitude, in meters, the DEM is replaced by.
    pub altitude: f64,
}

impl IntersectionAlgorithm for FixedAltitudeAlgorithm {
    fn intersection(&mut self, ellipsoid: &Ellipsoid, p: Vector3, los: Vector3) -> Result<GeodeticPoint, RuggedError> {
        ellipsoid.point_on_ground_at_altitude(p, los, self.altitude)
    }

    fn refine_intersection(
        &mut self,
        ellipsoid: &Ellipsoid,
        p: Vector3,
        los: Vector3,
        _approx: GeodeticPoint,
    ) -> Result<GeodeticPoint, RuggedError> {
        self.intersection(ellipsoid, p, los)
    }
}

const MAX_TILE_HOPS: u32 = 64;

/// The Duvenhage hierarchical min/max tile traversal, parameterized by
/// whether node boundaries are resolved against the exact
/// ellipsoid geometry (the primary `Duvenhage` variant) or a tangent-plane
/// approximation anchored at each tile's center (the `DuvenhageFlatBody`
/// variant).
pub struct DuvenhageAlgorithm<U> {
    cache: TileCache<U>,
    /// An upper bound on the DEM's global maximum elevation, used to place
    /// the ray's entry point onto the body. The DEM
    /// is only ever seen tile-by-tile through the updater callback, so this
    /// crate cannot discover the true global maximum on its own; callers
    /// configure a conservative bound (see `facade::RuggedBuilder`).
    pub global_max_altitude: f64,
    /// Selects the tangent-plane (`true`) or exact-ellipsoid (`false`)
    /// node-boundary computation.
    pub flat_body: bool,
}

impl<U: TileUpdater> DuvenhageAlgorithm<U> {
    /// Constructs a Duvenhage algorithm instance over the given tile cache.
    pub fn new(cache: TileCache<U>, global_max_altitude: f64, flat_body: bool) -> Self {
        DuvenhageAlgorithm { cache, global_max_altitude, flat_body }
    }

    /// Exposes the underlying cache (e.g. for `stats()`).
    pub fn cache(&self) -> &TileCache<U> {
        &self.cache
    }

    fn entry_point(&self, ellipsoid: &Ellipsoid, p: Vector3, los: Vector3) -> Result<Vector3, RuggedError> {
        let t = ellipsoid
            .smallest_real_root_at_altitude(p, los, self.global_max_altitude)
            .ok_or(RuggedError::LineOfSightDoesNotReachGround)?;
        if t < 0.0 {
            return Err(RuggedError::DemEntryPointIsBehindSpacecraft);
        }
        Ok(p + los * t)
    }

    fn node_segment(
        &self,
        ellipsoid: &Ellipsoid,
        tile: &Tile,
        node: &MinMaxNode,
        p: Vector3,
        los: Vector3,
        t_bounds: (f64, f64),
    ) -> Option<(f64, f64)> {
        let frame = tile.local_frame();
        let (lo, hi) = tile.node_local_aabb(ellipsoid, node);
        let p_local = frame.to_local(p);
        let los_local = frame.to_local_direction(los);

        let mut t0 = t_bounds.0;
        let mut t1 = t_bounds.1;
        for axis in 0..3 {
            let (o, d, lo_a, hi_a) = match axis {
                0 => (p_local.x, los_local.x, lo.x, hi.x),
                1 => (p_local.y, los_local.y, lo.y, hi.y),
                _ => (p_local.z, los_local.z, lo.z, hi.z),
            };
            if d.abs() < 1e-15 {
                if o < lo_a || o > hi_a {
                    return None;
                }
                continue;
            }
            let ta = (lo_a - o) / d;
            let tb = (hi_a - o) / d;
            let (near, far) = if ta <= tb { (ta, tb) } else { (tb, ta) };
            t0 = t0.max(near);
            t1 = t1.min(far);
            if t0 > t1 {
                return None;
            }
        }

        if self.flat_body {
            return Some((t0, t1));
        }
        self.refine_exact(ellipsoid, tile, node, p, los, (t0, t1))
    }

    /// Tightens the tangent-plane bracket `(t0, t1)` against the exact
    /// membership predicate (geodetic lat/lon/altitude within the node's
    /// true rectangle), by sampling the bracket and bisecting around the
    /// first and last samples that satisfy it.
    fn refine_exact(
        &self,
        ellipsoid: &Ellipsoid,
        tile: &Tile,
        node: &MinMaxNode,
        p: Vector3,
        los: Vector3,
        (t0, t1): (f64, f64),
    ) -> Option<(f64, f64)> {
        let contains = |t: f64| {
            let gp = ellipsoid.cartesian_to_geodetic(p + los * t);
            tile.node_contains(node, gp.lat_rad(), gp.lon_rad(), gp.alt_m())
        };

        const SAMPLES: usize = 12;
        let step = (t1 - t0) / SAMPLES as f64;
        let mut first_in: Option<usize> = None;
        let mut last_in: Option<usize> = None;
        let mut flags = [false; SAMPLES + 1];
        for (k, flag) in flags.iter_mut().enumerate() {
            let t = t0 + step * k as f64;
            *flag = contains(t);
            if *flag {
                if first_in.is_none() {
                    first_in = Some(k);
                }
                last_in = Some(k);
            }
        }
        let first_in = first_in?;
        let last_in = last_in?;

        let refine_lower = |mut lo: f64, mut hi: f64| {
            for _ in 0..20 {
                let mid = 0.5 * (lo + hi);
                if contains(mid) {
                    hi = mid;
                } else {
                    lo = mid;
                }
            }
            hi
        };
        let refine_upper = |mut lo: f64, mut hi: f64| {
            for _ in 0..20 {
                let mid = 0.5 * (lo + hi);
                if contains(mid) {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            lo
        };

        let refined_t0 = if first_in == 0 {
            t0
        } else {
            let lo = t0 + step * (first_in - 1) as f64;
            let hi = t0 + step * first_in as f64;
            refine_lower(lo, hi)
        };
        let refined_t1 = if last_in == SAMPLES {
            t1
        } else {
            let lo = t0 + step * last_in as f64;
            let hi = t0 + step * (last_in + 1) as f64;
            refine_upper(lo, hi)
        };
        if refined_t0 > refined_t1 {
            None
        } else {
            Some((refined_t0, refined_t1))
        }
    }

    fn traverse(
        &self,
        ellipsoid: &Ellipsoid,
        tile: &Tile,
        node: &MinMaxNode,
        p: Vector3,
        los: Vector3,
        t_bounds: (f64, f64),
    ) -> Option<GeodeticPoint> {
        let segment = self.node_segment(ellipsoid, tile, node, p, los, t_bounds)?;

        if node.is_leaf() {
            let (i, j) = tile.leaf_cell(node);
            return tile.cell_intersection(ellipsoid, p, los, i, j);
        }

        let (a, b) = node.children().expect("non-leaf node always has children");
        let seg_a = self.node_segment(ellipsoid, tile, a, p, los, segment);
        let seg_b = self.node_segment(ellipsoid, tile, b, p, los, segment);
        let (first, second) = match (seg_a, seg_b) {
            (Some(sa), Some(sb)) if sa.0 <= sb.0 => ((a, sa), (b, sb)),
            (Some(sa), Some(sb)) => ((b, sb), (a, sa)),
            (Some(sa), None) => return self.traverse(ellipsoid, tile, a, p, los, sa),
            (None, Some(sb)) => return self.traverse(ellipsoid, tile, b, p, los, sb),
            (None, None) => return None,
        };
        if let Some(hit) = self.traverse(ellipsoid, tile, first.0, p, los, first.1) {
            return Some(hit);
        }
        self.traverse(ellipsoid, tile, second.0, p, los, second.1)
    }

    fn intersect_from(&mut self, ellipsoid: &Ellipsoid, p: Vector3, los: Vector3, start: Vector3) -> Result<GeodeticPoint, RuggedError> {
        let mut current = start;
        for _ in 0..MAX_TILE_HOPS {
            let gp = ellipsoid.cartesian_to_geodetic(current);
            let tile = self.cache.get_tile(gp.lat_rad(), gp.lon_rad())?;
            let t_enter = (current - p).dot(los) / los.dot(los);
            let root_segment = match self.node_segment(ellipsoid, &tile, tile.root(), p, los, (t_enter, f64::INFINITY)) {
                Some(s) => s,
                None => return Err(RuggedError::LineOfSightDoesNotReachGround),
            };
            if let Some(hit) = self.traverse(ellipsoid, &tile, tile.root(), p, los, root_segment) {
                return Ok(hit);
            }
            let next_t = root_segment.1 + 1e-6_f64.max(root_segment.1.abs() * 1e-9);
            current = p + los * next_t;
        }
        Err(RuggedError::LineOfSightDoesNotReachGround)
    }
}

impl<U: TileUpdater> IntersectionAlgorithm for DuvenhageAlgorithm<U> {
    fn intersection(&mut self, ellipsoid: &Ellipsoid, p: Vector3, los: Vector3) -> Result<GeodeticPoint, RuggedError> {
        let entry = self.entry_point(ellipsoid, p, los)?;
        self.intersect_from(ellipsoid, p, los, entry)
    }

    fn refine_intersection(
        &mut self,
        ellipsoid: &Ellipsoid,
        p: Vector3,
        los: Vector3,
        approx: GeodeticPoint,
    ) -> Result<GeodeticPoint, RuggedError> {
        let tile = self.cache.get_tile(approx.lat_rad(), approx.lon_rad())?;
        let (fi, fj) = tile.fractional_indices(approx.lat_rad(), approx.lon_rad());
        let (n_lat, n_lon) = tile.dims();
        let i = (fi.floor() as i64).clamp(0, n_lat as i64 - 2) as usize;
        let j = (fj.floor() as i64).clamp(0, n_lon as i64 - 2) as usize;
        tile.cell_intersection(ellipsoid, p, los, i, j)
            .ok_or(RuggedError::LineOfSightDoesNotReachGround)
    }
}

/// Brute-force reference algorithm: walks every cell of the tile(s) the ray
/// crosses and returns the closest positive hit. Not for production use;
/// exists to validate [`DuvenhageAlgorithm`] in tests.
pub struct BasicScanAlgorithm<U> {
    cache: TileCache<U>,
    global_max_altitude: f64,
}

impl<U: TileUpdater> BasicScanAlgorithm<U> {
    /// Constructs a basic-scan algorithm instance over the given tile cache.
    pub fn new(cache: TileCache<U>, global_max_altitude: f64) -> Self {
        BasicScanAlgorithm { cache, global_max_altitude }
    }
}

impl<U: TileUpdater> IntersectionAlgorithm for BasicScanAlgorithm<U> {
    fn intersection(&mut self, ellipsoid: &Ellipsoid, p: Vector3, los: Vector3) -> Result<GeodeticPoint, RuggedError> {
        let entry = ellipsoid
            .point_at_altitude(p, los, self.global_max_altitude)
            .map_err(|_| RuggedError::LineOfSightDoesNotReachGround)?;
        let tile = self.cache.get_tile(entry.lat_rad(), entry.lon_rad())?;
        let (n_lat, n_lon) = tile.dims();

        let mut best: Option<(f64, GeodeticPoint)> = None;
        for i in 0..n_lat - 1 {
            for j in 0..n_lon - 1 {
                if let Some(hit) = tile.cell_intersection(ellipsoid, p, los, i, j) {
                    let cart = ellipsoid.geodetic_to_cartesian(&hit);
                    let t = (cart - p).dot(los) / los.dot(los);
                    if t >= 0.0 && best.as_ref().map(|(bt, _)| t < *bt).unwrap_or(true) {
                        best = Some((t, hit));
                    }
                }
            }
        }
        best.map(|(_, hit)| hit).ok_or(RuggedError::LineOfSightDoesNotReachGround)
    }

    fn refine_intersection(
        &mut self,
        ellipsoid: &Ellipsoid,
        p: Vector3,
        los: Vector3,
        approx: GeodeticPoint,
    ) -> Result<GeodeticPoint, RuggedError> {
        let tile = self.cache.get_tile(approx.lat_rad(), approx.lon_rad())?;
        let (fi, fj) = tile.fractional_indices(approx.lat_rad(), approx.lon_rad());
        let (n_lat, n_lon) = tile.dims();
        let i = (fi.floor() as i64).clamp(0, n_lat as i64 - 2) as usize;
        let j = (fj.floor() as i64).clamp(0, n_lon as i64 - 2) as usize;
        tile.cell_intersection(ellipsoid, p, los, i, j)
            .ok_or(RuggedError::LineOfSightDoesNotReachGround)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dem::cache::UpdatableTile;

    struct FlatDemUpdater {
        elevation: f64,
    }

    impl TileUpdater for FlatDemUpdater {
        fn update_tile(&self, latitude: f64, longitude: f64, tile: &mut UpdatableTile) -> Result<(), RuggedError> {
            let deg = std::f64::consts::PI / 180.0;
            let lat0 = (latitude / deg).floor() * deg - deg;
            let lon0 = (longitude / deg).floor() * deg - deg;
            let n = 8;
            tile.set_geometry(lat0, lon0, deg / 2.0, deg / 2.0, n, n);
            for i in 0..n {
                for j in 0..n {
                    tile.set_elevation(i, j, self.elevation)?;
                }
            }
            Ok(())
        }
    }

    #[test]
    fn duvenhage_matches_ellipsoid_on_flat_zero_dem() {
        let ellipsoid = Ellipsoid::wgs84();
        let cache = TileCache::new(FlatDemUpdater { elevation: 0.0 }, 4);
        let mut algo = DuvenhageAlgorithm::new(cache, 10_000.0, false);

        let alt = 700_000.0;
        let p = Vector3::new(ellipsoid.a + alt, 0.0, 0.0);
        let los = Vector3::new(-1.0, 0.0, 0.0);
        let hit = algo.intersection(&ellipsoid, p, los).unwrap();
        assert!(hit.lat_rad().abs() < 1e-6);
        assert!(hit.lon_rad().abs() < 1e-6);
        assert!(hit.alt_m().abs() < 1.0);
    }

    #[test]
    fn ray_above_global_max_never_reaches_ground() {
        let ellipsoid = Ellipsoid::wgs84();
        let cache = TileCache::new(FlatDemUpdater { elevation: 0.0 }, 4);
        let mut algo = DuvenhageAlgorithm::new(cache, 10_000.0, false);

        // A ray passing well above the DEM's global maximum, parallel to
        // the equatorial plane over a pole, should miss.
        let p = Vector3::new(0.0, 0.0, ellipsoid.b + 50_000.0);
        let los = Vector3::new(1.0, 0.0, 0.0);
        assert!(algo.intersection(&ellipsoid, p, los).is_err());
    }

    #[test]
    fn duvenhage_and_basic_scan_agree_on_flat_dem() {
        let ellipsoid = Ellipsoid::wgs84();
        let alt = 700_000.0;
        let p = Vector3::new(ellipsoid.a + alt, 0.0, 0.0);
        let los = Vector3::new(-1.0, 0.02, 0.01).normalize();

        let cache_a = TileCache::new(FlatDemUpdater { elevation: 0.0 }, 4);
        let mut duvenhage = DuvenhageAlgorithm::new(cache_a, 10_000.0, false);
        let hit_a = duvenhage.intersection(&ellipsoid, p, los).unwrap();

        let cache_b = TileCache::new(FlatDemUpdater { elevation: 0.0 }, 4);
        let mut scan = BasicScanAlgorithm::new(cache_b, 10_000.0);
        let hit_b = scan.intersection(&ellipsoid, p, los).unwrap();

        assert!((hit_a.lat_rad() - hit_b.lat_rad()).abs() < 1e-6);
        assert!((hit_a.lon_rad() - hit_b.lon_rad()).abs() < 1e-6);
    }

    #[test]
    fn entry_point_behind_spacecraft_is_reported_distinctly_from_no_crossing() {
        let ellipsoid = Ellipsoid::wgs84();
        let cache = TileCache::new(FlatDemUpdater { elevation: 0.0 }, 4);
        let mut algo = DuvenhageAlgorithm::new(cache, 10_000.0, false);

        // The spacecraft sits outside the global-max shell and looks
        // straight outward, away from the body: the line through `p` does
        // cross the shell, but only behind the spacecraft.
        let p = Vector3::new(ellipsoid.a + 10_000.0 + 500_000.0, 0.0, 0.0);
        let los = Vector3::new(1.0, 0.0, 0.0);
        match algo.intersection(&ellipsoid, p, los) {
            Err(RuggedError::DemEntryPointIsBehindSpacecraft) => {}
            other => panic!("expected DemEntryPointIsBehindSpacecraft, got {other:?}"),
        }

        // A ray that never meets the shell's line at all (perpendicular
        // miss, well above the body) stays a plain "no crossing" miss.
        let cache2 = TileCache::new(FlatDemUpdater { elevation: 0.0 }, 4);
        let mut algo2 = DuvenhageAlgorithm::new(cache2, 10_000.0, false);
        let p2 = Vector3::new(0.0, 0.0, ellipsoid.b + 50_000.0);
        let los2 = Vector3::new(1.0, 0.0, 0.0);
        match algo2.intersection(&ellipsoid, p2, los2) {
            Err(RuggedError::LineOfSightDoesNotReachGround) => {}
            other => panic!("expected LineOfSightDoesNotReachGround, got {other:?}"),
        }
    }

    #[test]
    fn antimeridian_spanning_tile_returns_continuous_longitude() {
        struct AntimeridianUpdater;
        impl TileUpdater for AntimeridianUpdater {
            fn update_tile(&self, _latitude: f64, _longitude: f64, tile: &mut UpdatableTile) -> Result<(), RuggedError> {
                let deg = std::f64::consts::PI / 180.0;
                // A tile expressed continuously from 179 deg to 182.5 deg
                // (the latter being -177.5 deg once wrapped to (-pi, pi]):
                // it straddles the antimeridian in its own frame.
                tile.set_geometry(-2.0 * deg, 179.0 * deg, deg / 2.0, deg / 2.0, 8, 8);
                for i in 0..8 {
                    for j in 0..8 {
                        tile.set_elevation(i, j, 0.0)?;
                    }
                }
                Ok(())
            }
        }

        let ellipsoid = Ellipsoid::wgs84();
        let cache = TileCache::new(AntimeridianUpdater, 4);
        let mut algo = DuvenhageAlgorithm::new(cache, 10_000.0, false);

        // Subsatellite point at 180.3 deg (== -179.7 deg wrapped), which
        // sits inside the tile's continuous frame (179 .. 183 deg).
        let target_lon = 180.3_f64.to_radians();
        let target = ellipsoid.geodetic_to_cartesian(&GeodeticPoint::from_radians_meters(0.0, target_lon, 0.0));
        let up = target.normalize();
        let p = target + up * 700_000.0;
        let los = -up;

        let hit = algo.intersection(&ellipsoid, p, los).unwrap();
        assert!(
            hit.lon_rad() > std::f64::consts::PI,
            "expected a continuous (> pi) longitude consistent with the tile's reference, got {}",
            hit.lon_rad()
        );
        assert!((hit.lon_rad() - target_lon).abs() < 1e-6);
        assert!(hit.lat_rad().abs() < 1e-6);
    }

    #[test]
    fn ray_tangent_to_dem_top_returns_a_hit_not_a_miss() {
        let ellipsoid = Ellipsoid::wgs84();
        let max_alt = 1_000.0;
        let cache = TileCache::new(FlatDemUpdater { elevation: max_alt }, 4);
        let mut algo = DuvenhageAlgorithm::new(cache, max_alt, false);

        // In the z=0 (equatorial) plane, flattening drops out of the
        // offset-ellipsoid equation, so the DEM-top shell is exactly the
        // circle x^2 + y^2 = (a + max_alt)^2. A ray confined to the line
        // x = radius, sweeping in y, touches that circle at exactly one
        // point (y = 0) without ever crossing it: a textbook tangent ray.
        let radius = ellipsoid.a + max_alt;
        let p = Vector3::new(radius, 50_000.0, 0.0);
        let los = Vector3::new(0.0, -1.0, 0.0);

        let hit = algo.intersection(&ellipsoid, p, los).unwrap();
        assert!(hit.lat_rad().abs() < 1e-6);
        assert!(hit.lon_rad().abs() < 1e-6);
        assert!((hit.alt_m() - max_alt).abs() < 1.0);
    }
}
