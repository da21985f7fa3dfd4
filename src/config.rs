//! The facade's configuration surface: algorithm, ellipsoid, and frame
//! selection, cache sizing, interpolation orders, and the light-time/
//! aberration toggles.
//!
//! Frame and ellipsoid IDs are enumerated here, but their resolution to
//! concrete geometry is `Ellipsoid`'s job (for ellipsoids) or left to the
//! external frame library (for `InertialFrameId`/`BodyRotatingFrameId`,
//! which are out of scope here and carried only as a selectable
//! identifier), in the same enum-plus-`TryFrom`-plus-`Default`-config
//! pattern as `lookup_config`'s frame/database selectors.

use std::env;

use crate::dem::algorithm::IntersectionAlgorithm;
use crate::dem::{BasicScanAlgorithm, DuvenhageAlgorithm, IgnoreDemAlgorithm, TileCache, TileUpdater};
use crate::ellipsoid::Ellipsoid;

/// Which ray/DEM intersection variant to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmId {
    /// The primary hierarchical min/max traversal, boundaries resolved
    /// against exact ellipsoid geometry.
    Duvenhage,
    /// The same traversal, with a tangent-plane node-boundary approximation.
    DuvenhageFlatBody,
    /// Brute-force reference scan; not for production use.
    BasicSlowExhaustiveScanForTestsOnly,
    /// Ignores the DEM; intersects the ellipsoid directly.
    IgnoreDemUseEllipsoid,
}

impl TryFrom<&str> for AlgorithmId {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_ascii_uppercase().as_str() {
            "DUVENHAGE" => Ok(AlgorithmId::Duvenhage),
            "DUVENHAGE_FLAT_BODY" => Ok(AlgorithmId::DuvenhageFlatBody),
            "BASIC_SLOW_EXHAUSTIVE_SCAN_FOR_TESTS_ONLY" => Ok(AlgorithmId::BasicSlowExhaustiveScanForTestsOnly),
            "IGNORE_DEM_USE_ELLIPSOID" => Ok(AlgorithmId::IgnoreDemUseEllipsoid),
            _ => Err(format!("unknown algorithm id: {value}")),
        }
    }
}

/// Builds the boxed intersection algorithm selected by `id`, wiring in
/// `cache` where the variant needs one.
pub(crate) fn build_algorithm<U: TileUpdater + 'static>(
    id: AlgorithmId,
    cache: TileCache<U>,
    global_max_altitude: f64,
) -> Box<dyn IntersectionAlgorithm> {
    match id {
        AlgorithmId::Duvenhage => Box::new(DuvenhageAlgorithm::new(cache, global_max_altitude, false)),
        AlgorithmId::DuvenhageFlatBody => Box::new(DuvenhageAlgorithm::new(cache, global_max_altitude, true)),
        AlgorithmId::BasicSlowExhaustiveScanForTestsOnly => Box::new(BasicScanAlgorithm::new(cache, global_max_altitude)),
        AlgorithmId::IgnoreDemUseEllipsoid => Box::new(IgnoreDemAlgorithm),
    }
}

/// Which reference ellipsoid to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EllipsoidId {
    /// GRS80 (`a = 6378137.0`, `1/f = 298.257222101`).
    Grs80,
    /// WGS84 (`a = 6378137.0`, `1/f = 298.257223563`).
    Wgs84,
    /// IERS96 (`a = 6378136.49`, `1/f = 298.25645`).
    Iers96,
    /// IERS2003 (`a = 6378136.6`, `1/f = 298.25642`).
    Iers2003,
}

impl EllipsoidId {
    /// Resolves this identifier to a concrete ellipsoid.
    pub fn resolve(self) -> Ellipsoid {
        match self {
            EllipsoidId::Grs80 => Ellipsoid::grs80(),
            EllipsoidId::Wgs84 => Ellipsoid::wgs84(),
            EllipsoidId::Iers96 => Ellipsoid::iers96(),
            EllipsoidId::Iers2003 => Ellipsoid::iers2003(),
        }
    }
}

impl TryFrom<&str> for EllipsoidId {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_ascii_uppercase().as_str() {
            "GRS80" => Ok(EllipsoidId::Grs80),
            "WGS84" => Ok(EllipsoidId::Wgs84),
            "IERS96" => Ok(EllipsoidId::Iers96),
            "IERS2003" => Ok(EllipsoidId::Iers2003),
            _ => Err(format!("unknown ellipsoid id: {value}")),
        }
    }
}

/// The inertial frame an ephemeris is expressed in. Resolution to concrete
/// axes is delegated to an external frame library; this crate only carries
/// the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InertialFrameId {
    /// Geocentric Celestial Reference Frame.
    Gcrf,
    /// Earth Mean Equator and Equinox of J2000.
    Eme2000,
    /// Mean Of Date.
    Mod,
    /// True Of Date.
    Tod,
    /// Veis 1950.
    Veis1950,
}

/// The body-rotating frame the DEM and tile cache are expressed in.
/// Resolution is delegated to an external frame library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyRotatingFrameId {
    /// International Terrestrial Reference Frame.
    Itrf,
    /// ITRF, equinox-based.
    ItrfEquinox,
    /// Greenwich True Of Date.
    Gtod,
}

/// The facade's full configuration.
#[derive(Debug, Clone, Copy)]
pub struct RuggedConfig {
    /// Which ray/DEM intersection variant to use.
    pub algorithm_id: AlgorithmId,
    /// Which reference ellipsoid to use.
    pub ellipsoid_id: EllipsoidId,
    /// The inertial frame ephemeris samples are expressed in.
    pub inertial_frame_id: InertialFrameId,
    /// The body-rotating frame the DEM is expressed in.
    pub body_rotating_frame_id: BodyRotatingFrameId,
    /// Maximum number of live tiles in the cache (must be `> 0`).
    pub max_cached_tiles: usize,
    /// Ephemeris interpolation order (must be `>= 2`).
    pub pv_interpolation_order: usize,
    /// Attitude interpolation order (must be `>= 2`).
    pub a_interpolation_order: usize,
    /// An upper bound on the DEM's global maximum elevation, used to place
    /// the Duvenhage algorithms' entry point. A conservative default is
    /// provided (see [`RuggedConfig::default`]).
    pub global_max_altitude: f64,
    /// Whether to apply light-time correction (default `true`).
    pub light_time_correction: bool,
    /// Whether to apply aberration-of-light correction (default `true`).
    pub aberration_of_light_correction: bool,
}

impl Default for RuggedConfig {
    fn default() -> Self {
        RuggedConfig {
            algorithm_id: AlgorithmId::Duvenhage,
            ellipsoid_id: EllipsoidId::Wgs84,
            inertial_frame_id: InertialFrameId::Gcrf,
            body_rotating_frame_id: BodyRotatingFrameId::Itrf,
            max_cached_tiles: 8,
            pv_interpolation_order: 4,
            a_interpolation_order: 2,
            global_max_altitude: 9_000.0,
            light_time_correction: true,
            aberration_of_light_correction: true,
        }
    }
}

impl RuggedConfig {
    /// Builds a config from default values, overridden by the
    /// `RUGGED_ALGORITHM` and `RUGGED_ELLIPSOID` environment variables when
    /// present and parseable (falling back to the default on any parse
    /// failure).
    pub fn from_env_or_default() -> Self {
        let mut config = RuggedConfig::default();
        if let Ok(value) = env::var("RUGGED_ALGORITHM") {
            if let Ok(id) = AlgorithmId::try_from(value.as_str()) {
                config.algorithm_id = id;
            }
        }
        if let Ok(value) = env::var("RUGGED_ELLIPSOID") {
            if let Ok(id) = EllipsoidId::try_from(value.as_str()) {
                config.ellipsoid_id = id;
            }
        }
        config
    }
}
