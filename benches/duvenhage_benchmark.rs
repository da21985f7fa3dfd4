use criterion::{black_box, criterion_group, criterion_main, Criterion};

use geopush::dem::{DuvenhageAlgorithm, IntersectionAlgorithm, TileUpdater, UpdatableTile};
use geopush::ellipsoid::Ellipsoid;
use geopush::error::RuggedError;
use geopush::linalg::Vector3;

/// A DEM made of a single conical hill at (10N, 20E), peak 1000 m: the
/// traversal has to descend the min/max tree past the hill's footprint
/// rather than accepting the tile's root bound on the first check, which is
/// the traversal cost this benchmark is meant to characterize.
struct HillUpdater;

impl TileUpdater for HillUpdater {
    fn update_tile(&self, latitude: f64, longitude: f64, tile: &mut UpdatableTile) -> Result<(), RuggedError> {
        let deg = std::f64::consts::PI / 180.0;
        let lat0 = (latitude / deg).floor() * deg - 2.0 * deg;
        let lon0 = (longitude / deg).floor() * deg - 2.0 * deg;
        let n = 64;
        let step = 4.0 * deg / (n - 1) as f64;
        tile.set_geometry(lat0, lon0, step, step, n, n);
        let peak_lat = 10.0 * deg;
        let peak_lon = 20.0 * deg;
        for i in 0..n {
            for j in 0..n {
                let lat = lat0 + step * i as f64;
                let lon = lon0 + step * j as f64;
                let d = ((lat - peak_lat).powi(2) + (lon - peak_lon).powi(2)).sqrt();
                let elevation = (1000.0 * (1.0 - d / deg)).max(0.0);
                tile.set_elevation(i, j, elevation)?;
            }
        }
        Ok(())
    }
}

fn bench_duvenhage_intersection(c: &mut Criterion) {
    let ellipsoid = Ellipsoid::wgs84();
    let deg = std::f64::consts::PI / 180.0;
    let ground = geopush::ellipsoid::GeodeticPoint::from_radians_meters(10.0 * deg, 20.0 * deg, 500.0);
    let target = ellipsoid.geodetic_to_cartesian(&ground);
    let p = target + Vector3::new(0.0, 0.0, 700_000.0);
    let los = (target - p).normalize();

    c.bench_function("duvenhage intersection through hill tile", |b| {
        b.iter(|| {
            let mut algorithm = DuvenhageAlgorithm::new(
                geopush::dem::TileCache::new(HillUpdater, 8),
                black_box(1_000.0),
                false,
            );
            algorithm.intersection(&ellipsoid, black_box(p), black_box(los)).unwrap()
        })
    });
}

fn bench_duvenhage_warm_cache_refinement(c: &mut Criterion) {
    let ellipsoid = Ellipsoid::wgs84();
    let deg = std::f64::consts::PI / 180.0;
    let ground = geopush::ellipsoid::GeodeticPoint::from_radians_meters(10.0 * deg, 20.0 * deg, 500.0);
    let target = ellipsoid.geodetic_to_cartesian(&ground);
    let p = target + Vector3::new(0.0, 0.0, 700_000.0);
    let los = (target - p).normalize();

    let mut algorithm = DuvenhageAlgorithm::new(geopush::dem::TileCache::new(HillUpdater, 8), 1_000.0, false);
    let approx = algorithm.intersection(&ellipsoid, p, los).unwrap();

    c.bench_function("duvenhage refinement against a warm tile cache", |b| {
        b.iter(|| algorithm.refine_intersection(&ellipsoid, black_box(p), black_box(los), black_box(approx)).unwrap())
    });
}

criterion_group!(benches, bench_duvenhage_intersection, bench_duvenhage_warm_cache_refinement);
criterion_main!(benches);
