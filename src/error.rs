//! Typed failures for the localization pipeline.
//!
//! Every variant carries the parameters needed to reconstruct the failure
//! message, so a diagnostic can be translated by matching on the variant
//! and substituting its fields rather than parsing rendered text. The
//! variant itself *is* the message identifier; `Display` (via `thiserror`)
//! renders the English-language message used when no localization layer is
//! present.

use thiserror::Error;

/// An enumeration of errors that can occur while localizing pushbroom
/// imagery against a DEM.
#[derive(Debug, Error)]
pub enum RuggedError {
    /// The line of sight does not intersect the reference ellipsoid at all.
    #[error("line of sight does not reach the ground")]
    LineOfSightDoesNotReachGround,

    /// The line of sight never reaches the requested iso-latitude.
    #[error("line of sight never crosses latitude {latitude_rad} rad")]
    LineOfSightNeverCrossesLatitude {
        /// The requested latitude, in radians.
        latitude_rad: f64,
    },

    /// The line of sight never reaches the requested iso-longitude.
    #[error("line of sight never crosses longitude {longitude_rad} rad")]
    LineOfSightNeverCrossesLongitude {
        /// The requested longitude, in radians.
        longitude_rad: f64,
    },

    /// The line of sight never reaches the requested altitude.
    #[error("line of sight never crosses altitude {altitude_m} m")]
    LineOfSightNeverCrossesAltitude {
        /// The requested altitude, in meters.
        altitude_m: f64,
    },

    /// The DEM entry point computed from the global max altitude shell lies
    /// behind the spacecraft relative to the ray direction.
    #[error("DEM entry point is behind the spacecraft")]
    DemEntryPointIsBehindSpacecraft,

    /// A tile index lookup fell outside the tile's raw sample grid.
    #[error("indices ({i}, {j}) are out of tile bounds (max {max_i}, {max_j})")]
    OutOfTileIndices {
        /// The requested row index.
        i: i64,
        /// The requested column index.
        j: i64,
        /// The largest valid row index.
        max_i: i64,
        /// The largest valid column index.
        max_j: i64,
    },

    /// A geodetic query fell outside a tile's angular coverage.
    #[error("point (lat={latitude_rad} rad, lon={longitude_rad} rad) is out of tile angular coverage")]
    OutOfTileAngles {
        /// The queried latitude, in radians.
        latitude_rad: f64,
        /// The queried longitude, in radians.
        longitude_rad: f64,
    },

    /// A tile was constructed with fewer than two samples along some axis.
    #[error("tile has no usable elevation samples (needs at least 2x2)")]
    EmptyTile,

    /// After an updater callback, the cache still could not find a tile
    /// whose interior covers the requested point.
    #[error("no cached or updated tile has interpolation neighbors for (lat={latitude_rad}, lon={longitude_rad})")]
    TileWithoutRequiredNeighborsSelected {
        /// The queried latitude, in radians.
        latitude_rad: f64,
        /// The queried longitude, in radians.
        longitude_rad: f64,
    },

    /// No DEM data is available at all (e.g. an empty cache with no
    /// updater configured).
    #[error("no DEM data available")]
    NoDemData,

    /// A temporal query fell outside the span covered by the ephemeris or
    /// attitude samples.
    #[error("date {epoch} is out of the time range covered by samples")]
    OutOfTimeRange {
        /// A human-readable rendering of the offending epoch.
        epoch: String,
    },

    /// The facade was queried before being fully configured.
    #[error("context is not fully initialized: {reason}")]
    UninitializedContext {
        /// What part of the context is missing.
        reason: String,
    },

    /// A sensor name does not match any registered sensor.
    #[error("unknown sensor '{name}'")]
    UnknownSensor {
        /// The requested sensor name.
        name: String,
    },

    /// Bilinear refinement converged to a pixel outside the sensor's valid
    /// column range.
    #[error("ground point resolves to pixel {pixel}, outside column range [0, {num_pixels})")]
    GroundPointOutOfColumnRange {
        /// The resolved (out-of-range) pixel index.
        pixel: f64,
        /// The number of pixels in the sensor.
        num_pixels: usize,
    },

    /// A bracketing root solver exhausted its evaluation budget without
    /// converging.
    #[error("root solver exceeded {max_eval} evaluations without converging")]
    SolverExhausted {
        /// The evaluation budget that was exceeded.
        max_eval: u32,
    },

    /// The atmospheric refraction layer table has no entries, or the
    /// requested altitude is not covered by it.
    #[error("no atmospheric refraction layer data for altitude {altitude_m} m")]
    NoLayerData {
        /// The altitude, in meters, for which no layer was found.
        altitude_m: f64,
    },

    /// An invariant that should be impossible to violate was violated;
    /// indicates a bug rather than bad input.
    #[error("internal error: {reason}")]
    InternalError {
        /// A description of the violated invariant.
        reason: String,
    },
}
