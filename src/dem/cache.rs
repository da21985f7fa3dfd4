//! Bounded LRU cache mapping geographic queries to DEM tiles.
//!
//! On a cache miss the updater callback is invoked to deliver a tile
//! covering the query point; eviction is least-recently used by lookup,
//! bounded to `max_cached_tiles`.

use std::rc::Rc;

use crate::dem::tile::{LocationStatus, Tile};
use crate::error::RuggedError;

/// A tile under construction, populated by a [`TileUpdater`] callback.
///
/// The updater first declares the tile's geometry with [`Self::set_geometry`]
/// (which allocates the elevation grid, initialized to `NaN` so that an
/// updater forgetting to fill a sample is caught rather than silently
/// treated as zero elevation), then fills samples with [`Self::set_elevation`].
#[derive(Debug, Clone)]
pub struct UpdatableTile {
    lat0: f64,
    lon0: f64,
    d_lat: f64,
    d_lon: f64,
    n_lat: usize,
    n_lon: usize,
    elevations: Vec<f64>,
    geometry_set: bool,
}

impl Default for UpdatableTile {
    fn default() -> Self {
        UpdatableTile {
            lat0: 0.0,
            lon0: 0.0,
            d_lat: 0.0,
            d_lon: 0.0,
            n_lat: 0,
            n_lon: 0,
            elevations: Vec::new(),
            geometry_set: false,
        }
    }
}

impl UpdatableTile {
    /// Declares this tile's origin, steps, and dimensions, allocating an
    /// elevation grid (initially all `NaN`) for the updater to fill in.
    pub fn set_geometry(&mut self, lat0: f64, lon0: f64, d_lat: f64, d_lon: f64, n_lat: usize, n_lon: usize) {
        self.lat0 = lat0;
        self.lon0 = lon0;
        self.d_lat = d_lat;
        self.d_lon = d_lon;
        self.n_lat = n_lat;
        self.n_lon = n_lon;
        self.elevations = vec![f64::NAN; n_lat * n_lon];
        self.geometry_set = true;
    }

    /// Sets the elevation sample at raw indices `(i, j)`.
    pub fn set_elevation(&mut self, i: usize, j: usize, elevation: f64) -> Result<(), RuggedError> {
        if i >= self.n_lat || j >= self.n_lon {
            return Err(RuggedError::OutOfTileIndices {
                i: i as i64,
                j: j as i64,
                max_i: self.n_lat as i64 - 1,
                max_j: self.n_lon as i64 - 1,
            });
        }
        self.elevations[i * self.n_lon + j] = elevation;
        Ok(())
    }

    fn into_tile(self) -> Result<Tile, RuggedError> {
        if !self.geometry_set {
            return Err(RuggedError::EmptyTile);
        }
        if self.elevations.iter().any(|h| h.is_nan()) {
            return Err(RuggedError::NoDemData);
        }
        Tile::new(self.lat0, self.lon0, self.d_lat, self.d_lon, self.n_lat, self.n_lon, self.elevations)
    }
}

/// A callback providing DEM data on demand. Implementations must fill a
/// tile that covers `(latitude, longitude)` strictly inside its bounds (not
/// on the boundary).
///
/// Must not re-enter the owning facade.
pub trait TileUpdater {
    /// Populates `tile` with a DEM patch covering `(latitude, longitude)`.
    fn update_tile(&self, latitude: f64, longitude: f64, tile: &mut UpdatableTile) -> Result<(), RuggedError>;
}

impl<T: TileUpdater + ?Sized> TileUpdater for Box<T> {
    fn update_tile(&self, latitude: f64, longitude: f64, tile: &mut UpdatableTile) -> Result<(), RuggedError> {
        (**self).update_tile(latitude, longitude, tile)
    }
}

/// Snapshot of a cache's lifetime activity, for diagnostics and
/// benchmarking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Queries satisfied by an already-cached tile.
    pub hits: u64,
    /// Queries that required invoking the updater.
    pub misses: u64,
    /// Tiles evicted to stay within `max_cached_tiles`.
    pub evictions: u64,
}

struct CacheEntry {
    tile: Rc<Tile>,
    last_used: u64,
}

/// A bounded LRU cache of DEM tiles, keyed by geographic coverage rather
/// than by an explicit key: a lookup walks the live tiles for one whose
/// [`LocationStatus`] for the query is
/// [`HasInterpolationNeighbors`](LocationStatus::HasInterpolationNeighbors),
/// and falls back to the updater on a miss.
pub struct TileCache<U> {
    updater: U,
    max_cached_tiles: usize,
    entries: Vec<CacheEntry>,
    clock: u64,
    stats: CacheStats,
}

impl<U: TileUpdater> TileCache<U> {
    /// Constructs a cache bounded to `max_cached_tiles` live tiles (clamped
    /// to at least 1).
    pub fn new(updater: U, max_cached_tiles: usize) -> Self {
        TileCache {
            updater,
            max_cached_tiles: max_cached_tiles.max(1),
            entries: Vec::new(),
            clock: 0,
            stats: CacheStats::default(),
        }
    }

    /// Returns a tile whose location status for `(lat, lon)` is
    /// `HasInterpolationNeighbors`, fetching and caching one via the
    /// updater if none of the currently cached tiles qualify.
    pub fn get_tile(&mut self, lat: f64, lon: f64) -> Result<Rc<Tile>, RuggedError> {
        self.clock += 1;
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.tile.location_status(lat, lon) == LocationStatus::HasInterpolationNeighbors)
        {
            entry.last_used = self.clock;
            self.stats.hits += 1;
            return Ok(Rc::clone(&entry.tile));
        }

        self.stats.misses += 1;
        let mut updatable = UpdatableTile::default();
        self.updater.update_tile(lat, lon, &mut updatable)?;
        let tile = updatable.into_tile()?;
        if tile.location_status(lat, lon) != LocationStatus::HasInterpolationNeighbors {
            return Err(RuggedError::TileWithoutRequiredNeighborsSelected { latitude_rad: lat, longitude_rad: lon });
        }

        let tile = Rc::new(tile);
        if self.entries.len() >= self.max_cached_tiles {
            let lru = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(idx, _)| idx)
                .expect("max_cached_tiles is at least 1, so a full cache is never empty");
            self.entries.remove(lru);
            self.stats.evictions += 1;
        }
        self.entries.push(CacheEntry { tile: Rc::clone(&tile), last_used: self.clock });
        Ok(tile)
    }

    /// The number of tiles currently cached.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache currently holds no tiles.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cumulative hit/miss/eviction counters.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct ConstantUpdater {
        calls: RefCell<Vec<(f64, f64)>>,
    }

    impl TileUpdater for ConstantUpdater {
        fn update_tile(&self, latitude: f64, longitude: f64, tile: &mut UpdatableTile) -> Result<(), RuggedError> {
            self.calls.borrow_mut().push((latitude, longitude));
            // 1-degree tiles on a regular grid, covering whichever cell the
            // query falls in.
            let deg = std::f64::consts::PI / 180.0;
            let lat0 = (latitude / deg).floor() * deg;
            let lon0 = (longitude / deg).floor() * deg;
            tile.set_geometry(lat0, lon0, deg / 4.0, deg / 4.0, 5, 5);
            for i in 0..5 {
                for j in 0..5 {
                    tile.set_elevation(i, j, 0.0)?;
                }
            }
            Ok(())
        }
    }

    #[test]
    fn miss_then_hit_does_not_call_updater_twice() {
        let updater = ConstantUpdater { calls: RefCell::new(Vec::new()) };
        let mut cache = TileCache::new(updater, 4);
        let deg = std::f64::consts::PI / 180.0;
        cache.get_tile(0.1 * deg, 0.1 * deg).unwrap();
        cache.get_tile(0.15 * deg, 0.12 * deg).unwrap();
        assert_eq!(cache.updater.calls.borrow().len(), 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn lru_eviction_keeps_cache_within_bound() {
        let updater = ConstantUpdater { calls: RefCell::new(Vec::new()) };
        let mut cache = TileCache::new(updater, 2);
        let deg = std::f64::consts::PI / 180.0;
        // Three well-separated tiles: a, b, a again, then c should evict b.
        cache.get_tile(0.1 * deg, 0.1 * deg).unwrap(); // tile a
        cache.get_tile(5.1 * deg, 5.1 * deg).unwrap(); // tile b
        cache.get_tile(0.1 * deg, 0.1 * deg).unwrap(); // tile a again (re-touch)
        cache.get_tile(10.1 * deg, 10.1 * deg).unwrap(); // tile c, should evict b
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);
        // tile a must still be resident (no new updater call for it)
        let calls_before = cache.updater.calls.borrow().len();
        cache.get_tile(0.1 * deg, 0.1 * deg).unwrap();
        assert_eq!(cache.updater.calls.borrow().len(), calls_before);
    }

    #[test]
    fn max_cached_tiles_is_never_exceeded() {
        let updater = ConstantUpdater { calls: RefCell::new(Vec::new()) };
        let mut cache = TileCache::new(updater, 3);
        let deg = std::f64::consts::PI / 180.0;
        for k in 0..10 {
            let off = k as f64 * 5.0 * deg;
            cache.get_tile(off, off).unwrap();
            assert!(cache.len() <= 3);
        }
    }
}
