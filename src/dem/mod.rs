//! The DEM subsystem: tiles, their min/max coverage trees, the bounded tile
//! cache, and the ray/DEM intersection algorithm family. This is the
//! largest single component of the crate.

pub mod algorithm;
pub mod cache;
pub mod tile;

pub use algorithm::{
    BasicScanAlgorithm, DuvenhageAlgorithm, FixedAltitudeAlgorithm, IgnoreDemAlgorithm,
    IntersectionAlgorithm,
};
pub use cache::{CacheStats, TileCache, TileUpdater, UpdatableTile};
pub use tile::{LocalFrame, LocationStatus, MinMaxNode, Tile};
