//! The top-level entry point: owns the ellipsoid, spacecraft-to-body
//! transforms, the registered sensors, and the selected intersection
//! algorithm, and answers direct/inverse localization queries against them.
//!
//! Ownership is a straight tree, not a graph: [`Rugged`] owns its algorithm,
//! which owns its tile cache, which holds a plain [`TileUpdater`] callback
//! value (never a back-reference to the facade). Cyclic references that
//! would otherwise arise from a callback wanting to reach back into the
//! facade are designed out rather than worked around with weak pointers.

use std::collections::HashMap;
use std::ops::Range;

use crate::config::{build_algorithm, RuggedConfig};
use crate::dem::{IntersectionAlgorithm, TileCache, TileUpdater};
use crate::ellipsoid::{Ellipsoid, GeodeticPoint};
use crate::error::RuggedError;
use crate::localization::inverse::SensorPixel;
use crate::localization::{direct_localization, inverse_localization};
use crate::sensor::LineSensor;
use crate::spacecraft::{InertialToBody, ScToInertial};

/// The facade answering direct and inverse localization queries. Built via
/// [`RuggedBuilder`]; not `Clone` or `Sync` — an instance is not safe for
/// concurrent mutation, so typical deployments create one instance per
/// worker thread.
pub struct Rugged {
    ellipsoid: Ellipsoid,
    sc_to_inertial: ScToInertial,
    inertial_to_body: InertialToBody,
    sensors: HashMap<String, LineSensor>,
    algorithm: Box<dyn IntersectionAlgorithm>,
    light_time_correction: bool,
    aberration_of_light_correction: bool,
}

impl Rugged {
    /// The reference ellipsoid this instance was configured with.
    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    /// Registers (or replaces) a sensor by name. Callers must not invoke
    /// this concurrently with a localization query on the same instance.
    pub fn add_sensor(&mut self, sensor: LineSensor) {
        self.sensors.insert(sensor.name().to_owned(), sensor);
    }

    /// Whether light-time correction is currently enabled.
    pub fn light_time_correction(&self) -> bool {
        self.light_time_correction
    }

    /// Enables or disables light-time correction. See
    /// [`Self::add_sensor`]'s concurrency caveat.
    pub fn set_light_time_correction(&mut self, enabled: bool) {
        self.light_time_correction = enabled;
    }

    /// Whether aberration-of-light correction is currently enabled.
    pub fn aberration_of_light_correction(&self) -> bool {
        self.aberration_of_light_correction
    }

    /// Enables or disables aberration-of-light correction.
    pub fn set_aberration_of_light_correction(&mut self, enabled: bool) {
        self.aberration_of_light_correction = enabled;
    }

    fn sensor(&self, name: &str) -> Result<&LineSensor, RuggedError> {
        self.sensors.get(name).ok_or_else(|| RuggedError::UnknownSensor { name: name.to_owned() })
    }

    /// Direct localization of every pixel of `sensor_name` at `line`.
    pub fn direct_localization(&mut self, sensor_name: &str, line: f64) -> Result<Vec<GeodeticPoint>, RuggedError> {
        let num_pixels = self.sensor(sensor_name)?.num_pixels();
        self.direct_localization_range(sensor_name, line, 0..num_pixels)
    }

    /// Direct localization restricted to `pixel_range`: an array of geodetic
    /// points, one per pixel in `[start, end)`.
    pub fn direct_localization_range(
        &mut self,
        sensor_name: &str,
        line: f64,
        pixel_range: Range<usize>,
    ) -> Result<Vec<GeodeticPoint>, RuggedError> {
        // Cloned out from under the borrow: `self.algorithm` must be
        // borrowed mutably below, which the borrow checker cannot reconcile
        // with an immutable borrow of `self.sensors` live across the call.
        // `LineSensor` is a small, cheaply-clonable read-only snapshot.
        let sensor = self.sensor(sensor_name)?.clone();
        direct_localization(
            &self.ellipsoid,
            &self.sc_to_inertial,
            &self.inertial_to_body,
            &sensor,
            self.algorithm.as_mut(),
            self.light_time_correction,
            self.aberration_of_light_correction,
            line,
            pixel_range,
        )
    }

    /// Inverse localization: which sensor pixel observes ground point `g`,
    /// if any, within `[line_min, line_max]`.
    pub fn inverse_localization(
        &mut self,
        sensor_name: &str,
        g: GeodeticPoint,
        line_min: f64,
        line_max: f64,
    ) -> Result<Option<SensorPixel>, RuggedError> {
        let sensor = self.sensor(sensor_name)?.clone();
        inverse_localization(
            &self.ellipsoid,
            &self.sc_to_inertial,
            &self.inertial_to_body,
            &sensor,
            g,
            line_min,
            line_max,
            self.light_time_correction,
            self.aberration_of_light_correction,
        )
    }
}

/// Builds a [`Rugged`] facade from a [`RuggedConfig`], a spacecraft-to-body
/// geometric pipeline, a [`TileUpdater`], and zero or more sensors.
///
/// Mirrors `SesameConfig::init`-then-construct, widened into a builder
/// because, unlike `SesameConfig`, this facade has several collaborators
/// (ephemeris/attitude providers, sensors, a tile updater) that cannot be
/// defaulted.
pub struct RuggedBuilder<U> {
    config: RuggedConfig,
    sc_to_inertial: Option<ScToInertial>,
    inertial_to_body: Option<InertialToBody>,
    updater: Option<U>,
    sensors: HashMap<String, LineSensor>,
}

impl<U: TileUpdater + 'static> RuggedBuilder<U> {
    /// Starts a builder from `config` (use [`RuggedConfig::default`] or
    /// [`RuggedConfig::from_env_or_default`] for the common cases).
    pub fn new(config: RuggedConfig) -> Self {
        RuggedBuilder {
            config,
            sc_to_inertial: None,
            inertial_to_body: None,
            updater: None,
            sensors: HashMap::new(),
        }
    }

    /// Supplies the spacecraft-to-body geometric pipeline.
    pub fn with_spacecraft_to_body(mut self, sc_to_inertial: ScToInertial, inertial_to_body: InertialToBody) -> Self {
        self.sc_to_inertial = Some(sc_to_inertial);
        self.inertial_to_body = Some(inertial_to_body);
        self
    }

    /// Supplies the DEM tile updater callback.
    pub fn with_tile_updater(mut self, updater: U) -> Self {
        self.updater = Some(updater);
        self
    }

    /// Registers a sensor, keyed by its own name.
    pub fn with_sensor(mut self, sensor: LineSensor) -> Self {
        self.sensors.insert(sensor.name().to_owned(), sensor);
        self
    }

    /// Builds the [`Rugged`] facade. Fails with
    /// [`RuggedError::UninitializedContext`] if the spacecraft-to-body
    /// pipeline or the tile updater were never supplied.
    pub fn build(self) -> Result<Rugged, RuggedError> {
        let sc_to_inertial = self.sc_to_inertial.ok_or_else(|| RuggedError::UninitializedContext {
            reason: "spacecraft-to-inertial transform provider was never supplied".into(),
        })?;
        let inertial_to_body = self.inertial_to_body.ok_or_else(|| RuggedError::UninitializedContext {
            reason: "inertial-to-body transform provider was never supplied".into(),
        })?;
        let updater = self
            .updater
            .ok_or_else(|| RuggedError::UninitializedContext { reason: "tile updater was never supplied".into() })?;

        let ellipsoid = self.config.ellipsoid_id.resolve();
        let cache = TileCache::new(updater, self.config.max_cached_tiles);
        let algorithm = build_algorithm(self.config.algorithm_id, cache, self.config.global_max_altitude);

        Ok(Rugged {
            ellipsoid,
            sc_to_inertial,
            inertial_to_body,
            sensors: self.sensors,
            algorithm,
            light_time_correction: self.config.light_time_correction,
            aberration_of_light_correction: self.config.aberration_of_light_correction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlgorithmId;
    use crate::dem::UpdatableTile;
    use crate::linalg::{Quaternion, Vector3};
    use crate::spacecraft::{AttitudeProvider, AttitudeSample, Ephemeris, PvSample};
    use hifitime::{Epoch, Unit};

    struct FlatDemUpdater;

    impl TileUpdater for FlatDemUpdater {
        fn update_tile(&self, latitude: f64, longitude: f64, tile: &mut UpdatableTile) -> Result<(), RuggedError> {
            let deg = std::f64::consts::PI / 180.0;
            let lat0 = (latitude / deg).floor() * deg - deg;
            let lon0 = (longitude / deg).floor() * deg - deg;
            tile.set_geometry(lat0, lon0, deg / 2.0, deg / 2.0, 8, 8);
            for i in 0..8 {
                for j in 0..8 {
                    tile.set_elevation(i, j, 0.0)?;
                }
            }
            Ok(())
        }
    }

    fn leo_rugged(light_time: bool, aberration: bool) -> Rugged {
        let t0 = Epoch::from_gregorian_utc_at_midnight(2020, 1, 1);
        let alt = 700_000.0;
        let ellipsoid = Ellipsoid::wgs84();
        let radius = ellipsoid.a + alt;
        let speed = 7_500.0;
        let pv_samples: Vec<PvSample> = (0..5)
            .map(|k| {
                let t = (k as f64 - 2.0) * 0.5;
                PvSample {
                    epoch: t0 + t * Unit::Second,
                    position: Vector3::new(radius, speed * t, 0.0),
                    velocity: Vector3::new(0.0, speed, 0.0),
                }
            })
            .collect();
        let ephemeris = Ephemeris::new(pv_samples, 4);
        let attitude_samples: Vec<AttitudeSample> = (0..5)
            .map(|k| {
                let t = (k as f64 - 2.0) * 0.5;
                AttitudeSample { epoch: t0 + t * Unit::Second, rotation: Quaternion::IDENTITY, angular_velocity: Vector3::ZERO }
            })
            .collect();
        let attitude = AttitudeProvider::new(attitude_samples, 2);
        let sc_to_inertial = ScToInertial::new(ephemeris, attitude);

        let body_attitude_samples: Vec<AttitudeSample> = (0..5)
            .map(|k| {
                let t = (k as f64 - 2.0) * 0.5;
                AttitudeSample { epoch: t0 + t * Unit::Second, rotation: Quaternion::IDENTITY, angular_velocity: Vector3::ZERO }
            })
            .collect();
        let inertial_to_body = InertialToBody::new(AttitudeProvider::new(body_attitude_samples, 2));

        let pixel_los: Vec<Vector3> = (0..5).map(|k| Vector3::new((k as f64 - 2.0) * 0.02, 0.0, -1.0).normalize()).collect();
        let sensor = LineSensor::new("nadir", pixel_los, Vector3::ZERO, Vector3::new(0.0, 1.0, 0.0), t0, 0.01);

        let mut config = RuggedConfig::default();
        config.algorithm_id = AlgorithmId::Duvenhage;
        config.global_max_altitude = 1_000.0;
        config.light_time_correction = light_time;
        config.aberration_of_light_correction = aberration;

        RuggedBuilder::new(config)
            .with_spacecraft_to_body(sc_to_inertial, inertial_to_body)
            .with_tile_updater(FlatDemUpdater)
            .with_sensor(sensor)
            .build()
            .unwrap()
    }

    #[test]
    fn build_fails_without_tile_updater() {
        let t0 = Epoch::from_gregorian_utc_at_midnight(2020, 1, 1);
        let config = RuggedConfig::default();
        let samples = vec![
            PvSample { epoch: t0, position: Vector3::new(7_000_000.0, 0.0, 0.0), velocity: Vector3::ZERO },
            PvSample { epoch: t0 + 10.0 * Unit::Second, position: Vector3::new(7_000_000.0, 0.0, 0.0), velocity: Vector3::ZERO },
        ];
        let sc_to_inertial = ScToInertial::new(Ephemeris::new(samples, 2), AttitudeProvider::new(
            vec![
                AttitudeSample { epoch: t0, rotation: Quaternion::IDENTITY, angular_velocity: Vector3::ZERO },
                AttitudeSample { epoch: t0 + 10.0 * Unit::Second, rotation: Quaternion::IDENTITY, angular_velocity: Vector3::ZERO },
            ],
            2,
        ));
        let inertial_to_body = InertialToBody::new(AttitudeProvider::new(
            vec![
                AttitudeSample { epoch: t0, rotation: Quaternion::IDENTITY, angular_velocity: Vector3::ZERO },
                AttitudeSample { epoch: t0 + 10.0 * Unit::Second, rotation: Quaternion::IDENTITY, angular_velocity: Vector3::ZERO },
            ],
            2,
        ));
        let result = RuggedBuilder::<FlatDemUpdater>::new(config)
            .with_spacecraft_to_body(sc_to_inertial, inertial_to_body)
            .build();
        assert!(matches!(result, Err(RuggedError::UninitializedContext { .. })));
    }

    #[test]
    fn direct_localization_nadir_hits_subsatellite_point_without_corrections() {
        let mut rugged = leo_rugged(false, false);
        let points = rugged.direct_localization("nadir", 0.0).unwrap();
        assert_eq!(points.len(), 5);
        assert!(points[2].lat_rad().abs() < 1e-6);
        assert!(points[2].lon_rad().abs() < 1e-6);
        assert!(points[2].alt_m().abs() < 1.0);
    }

    #[test]
    fn unknown_sensor_surfaces_as_error() {
        let mut rugged = leo_rugged(false, false);
        assert!(matches!(rugged.direct_localization("missing", 0.0), Err(RuggedError::UnknownSensor { .. })));
    }

    #[test]
    fn direct_then_inverse_round_trips_to_the_same_line_and_pixel() {
        let mut rugged = leo_rugged(true, true);
        let points = rugged.direct_localization("nadir", 1.0).unwrap();
        let g = points[0];
        let resolved = rugged.inverse_localization("nadir", g, 0.0, 2.0).unwrap();
        let resolved = resolved.expect("ground point seen by the sensor in range");
        assert!((resolved.line - 1.0).abs() < 1e-3);
        assert!((resolved.pixel - 0.0).abs() < 1e-2);
    }

    #[test]
    fn toggling_corrections_at_runtime_changes_the_result() {
        let mut rugged = leo_rugged(false, false);
        let without = rugged.direct_localization("nadir", 0.0).unwrap()[0];
        rugged.set_aberration_of_light_correction(true);
        let with_aberration = rugged.direct_localization("nadir", 0.0).unwrap()[0];
        assert!((without.lon_rad() - with_aberration.lon_rad()).abs() > 1e-9 || (without.lat_rad() - with_aberration.lat_rad()).abs() > 1e-9);
    }

    #[test]
    fn ignore_dem_with_corrections_off_matches_closed_form_ellipsoid_to_1mm() {
        let t0 = Epoch::from_gregorian_utc_at_midnight(2020, 1, 1);
        let ellipsoid = Ellipsoid::wgs84();
        let position = Vector3::new(ellipsoid.a + 700_000.0, 0.0, 0.0);
        let los_body = Vector3::new(-1.0, 0.02, -0.01).normalize();

        let at = |dt: f64| t0 + dt * Unit::Second;
        let pv_samples = vec![
            PvSample { epoch: at(-1.0), position, velocity: Vector3::ZERO },
            PvSample { epoch: at(1.0), position, velocity: Vector3::ZERO },
        ];
        let attitude_samples = vec![
            AttitudeSample { epoch: at(-1.0), rotation: Quaternion::IDENTITY, angular_velocity: Vector3::ZERO },
            AttitudeSample { epoch: at(1.0), rotation: Quaternion::IDENTITY, angular_velocity: Vector3::ZERO },
        ];
        let sc_to_inertial = ScToInertial::new(Ephemeris::new(pv_samples, 2), AttitudeProvider::new(attitude_samples.clone(), 2));
        let inertial_to_body = InertialToBody::new(AttitudeProvider::new(attitude_samples, 2));

        let sensor = LineSensor::new("cam", vec![los_body], Vector3::ZERO, Vector3::new(0.0, 1.0, 0.0), t0, 1.0);

        let mut config = RuggedConfig::default();
        config.algorithm_id = AlgorithmId::IgnoreDemUseEllipsoid;
        config.light_time_correction = false;
        config.aberration_of_light_correction = false;

        let mut rugged = RuggedBuilder::new(config)
            .with_spacecraft_to_body(sc_to_inertial, inertial_to_body)
            .with_tile_updater(FlatDemUpdater)
            .with_sensor(sensor)
            .build()
            .unwrap();

        let got = rugged.direct_localization("cam", 0.0).unwrap()[0];
        let expected = ellipsoid.point_on_ground(position, los_body).unwrap();

        let offset_m = (ellipsoid.geodetic_to_cartesian(&got) - ellipsoid.geodetic_to_cartesian(&expected)).norm();
        assert!(offset_m < 0.001, "expected closed-form agreement within 1 mm, got {offset_m} m");
    }
}
