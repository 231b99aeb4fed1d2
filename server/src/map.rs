//! Binary map decoding and the process-wide map cache
//!
//! A map file holds two planes back to back, tiles first and then items.
//! Each plane is `MAP_WIDTH * MAP_HEIGHT` big-endian `u16` values laid out
//! x-major: for every column `x`, all rows `y` in order.
//!
//! Indices outside the configured floor/item counts are replaced with `0`
//! instead of failing the load. Corrupt data therefore shows up as void
//! tiles, and the number of clamped values is logged at `warn`.

use crate::error::MapLoadError;
use log::{info, warn};
use shared::{MapView, MAP_HEIGHT, MAP_WIDTH};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

const WIDTH: usize = MAP_WIDTH as usize;
const HEIGHT: usize = MAP_HEIGHT as usize;
const PLANES: usize = 2;
const BYTES_PER_VALUE: usize = 2;

/// Exact number of bytes a map file must provide.
pub const MAP_FILE_LEN: usize = WIDTH * HEIGHT * PLANES * BYTES_PER_VALUE;

/// Decoded map, immutable once built. Grids are indexed `[x][y]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameMap {
    pub id: String,
    pub tiles: Vec<Vec<u16>>,
    pub items: Vec<Vec<u16>>,
}

impl GameMap {
    pub fn width(&self) -> i32 {
        MAP_WIDTH
    }

    pub fn height(&self) -> i32 {
        MAP_HEIGHT
    }

    pub fn tile(&self, x: usize, y: usize) -> Option<u16> {
        self.tiles.get(x).and_then(|column| column.get(y)).copied()
    }

    pub fn item(&self, x: usize, y: usize) -> Option<u16> {
        self.items.get(x).and_then(|column| column.get(y)).copied()
    }

    pub fn to_view(&self) -> MapView {
        MapView {
            id: self.id.clone(),
            width: MAP_WIDTH,
            height: MAP_HEIGHT,
            tiles: self.tiles.clone(),
            items: self.items.clone(),
        }
    }
}

/// Result of decoding a buffer, with the number of values that had to be clamped.
#[derive(Debug)]
pub struct Decoded {
    pub map: GameMap,
    pub clamped: usize,
}

/// Decodes a raw map buffer. Bytes beyond [`MAP_FILE_LEN`] are ignored.
pub fn decode(
    map_id: &str,
    bytes: &[u8],
    floor_count: u16,
    item_count: u16,
) -> Result<Decoded, MapLoadError> {
    if bytes.len() < MAP_FILE_LEN {
        return Err(MapLoadError::TooShort {
            map_id: map_id.to_string(),
            expected: MAP_FILE_LEN,
            actual: bytes.len(),
        });
    }

    let plane_len = WIDTH * HEIGHT * BYTES_PER_VALUE;
    let mut clamped = 0;
    let tiles = decode_plane(&bytes[..plane_len], floor_count, &mut clamped);
    let items = decode_plane(&bytes[plane_len..plane_len * 2], item_count, &mut clamped);

    Ok(Decoded {
        map: GameMap {
            id: map_id.to_string(),
            tiles,
            items,
        },
        clamped,
    })
}

fn decode_plane(plane: &[u8], limit: u16, clamped: &mut usize) -> Vec<Vec<u16>> {
    let mut values = plane
        .chunks_exact(BYTES_PER_VALUE)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));

    let mut grid = vec![vec![0u16; HEIGHT]; WIDTH];
    for column in grid.iter_mut() {
        for cell in column.iter_mut() {
            let value = values.next().unwrap_or(0);
            if value < limit {
                *cell = value;
            } else {
                *clamped += 1;
            }
        }
    }
    grid
}

/// Loads maps from disk on first use and serves the cached copy afterwards.
pub struct MapRepository {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<GameMap>>>,
}

impl MapRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the cached map for `map_id`, decoding it from disk the first time.
    ///
    /// A failed load is not cached, so a later call retries the file.
    pub async fn load(
        &self,
        map_id: &str,
        floor_count: u16,
        item_count: u16,
    ) -> Result<Arc<GameMap>, MapLoadError> {
        if let Some(map) = self.cache.read().await.get(map_id) {
            return Ok(Arc::clone(map));
        }

        if map_id.is_empty() || map_id.contains(&['/', '\\'][..]) || map_id.contains("..") {
            return Err(MapLoadError::InvalidId(map_id.to_string()));
        }

        let path = self.dir.join(map_id);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| MapLoadError::Io {
                map_id: map_id.to_string(),
                source,
            })?;
        let decoded = decode(map_id, &bytes, floor_count, item_count)?;

        if decoded.clamped > 0 {
            warn!(
                "Map {} had {} out-of-range indices replaced with 0",
                map_id, decoded.clamped
            );
        }

        // Another task may have finished the same load while we were reading.
        let mut cache = self.cache.write().await;
        let map = cache
            .entry(map_id.to_string())
            .or_insert_with(|| {
                info!("Loaded map {} from {}", map_id, path.display());
                Arc::new(decoded.map)
            })
            .clone();
        Ok(map)
    }

    pub async fn cached_count(&self) -> usize {
        self.cache.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Encodes grids the same way map files are laid out on disk.
    fn encode(tiles: &[Vec<u16>], items: &[Vec<u16>]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(MAP_FILE_LEN);
        for plane in [tiles, items] {
            for column in plane {
                for value in column {
                    bytes.extend_from_slice(&value.to_be_bytes());
                }
            }
        }
        bytes
    }

    fn patterned_grid(seed: u16, modulo: u16) -> Vec<Vec<u16>> {
        (0..WIDTH)
            .map(|x| {
                (0..HEIGHT)
                    .map(|y| (x as u16 * 7 + y as u16 * 3 + seed) % modulo)
                    .collect()
            })
            .collect()
    }

    fn temp_maps_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "realm-maps-{}-{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_required_length() {
        assert_eq!(MAP_FILE_LEN, 20800);
    }

    #[test]
    fn test_decode_x_major_big_endian() {
        let mut bytes = vec![0u8; MAP_FILE_LEN];
        // First value of the tile plane is (x=0, y=0), the second is (x=0, y=1).
        bytes[0] = 0x00;
        bytes[1] = 0x03;
        bytes[2] = 0x00;
        bytes[3] = 0x05;
        // First value of the second column is (x=1, y=0).
        let column_stride = HEIGHT * BYTES_PER_VALUE;
        bytes[column_stride + 1] = 0x09;
        // First value of the item plane.
        let plane_len = WIDTH * HEIGHT * BYTES_PER_VALUE;
        bytes[plane_len] = 0x01;
        bytes[plane_len + 1] = 0x02;

        let decoded = decode("lev01", &bytes, 1024, 1024).unwrap();
        assert_eq!(decoded.map.tile(0, 0), Some(3));
        assert_eq!(decoded.map.tile(0, 1), Some(5));
        assert_eq!(decoded.map.tile(1, 0), Some(9));
        assert_eq!(decoded.map.item(0, 0), Some(0x0102));
        assert_eq!(decoded.clamped, 0);
    }

    #[test]
    fn test_decode_clamps_out_of_range_to_zero() {
        let mut tiles = patterned_grid(0, 10);
        let mut items = patterned_grid(1, 10);
        tiles[3][4] = 500;
        items[51][99] = 12;

        let decoded = decode("lev02", &encode(&tiles, &items), 10, 12).unwrap();

        assert_eq!(decoded.map.tile(3, 4), Some(0));
        assert_eq!(decoded.map.item(51, 99), Some(0));
        assert_eq!(decoded.clamped, 2);
        assert!(decoded.map.tiles.iter().flatten().all(|&t| t < 10));
        assert!(decoded.map.items.iter().flatten().all(|&i| i < 12));
    }

    #[test]
    fn test_decode_short_buffer_fails() {
        let bytes = vec![0u8; MAP_FILE_LEN - 1];
        match decode("short", &bytes, 10, 10) {
            Err(MapLoadError::TooShort {
                expected, actual, ..
            }) => {
                assert_eq!(expected, MAP_FILE_LEN);
                assert_eq!(actual, MAP_FILE_LEN - 1);
            }
            other => panic!("expected TooShort, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let tiles = patterned_grid(2, 16);
        let items = patterned_grid(5, 16);
        let mut bytes = encode(&tiles, &items);
        bytes.extend_from_slice(&[0xff; 64]);

        let decoded = decode("long", &bytes, 16, 16).unwrap();
        assert_eq!(decoded.map.tiles, tiles);
        assert_eq!(decoded.map.items, items);
    }

    proptest! {
        #[test]
        fn prop_decode_is_deterministic(seed in any::<u8>(), floor_count in 1u16..2000, item_count in 1u16..2000) {
            let bytes: Vec<u8> = (0..MAP_FILE_LEN)
                .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
                .collect();

            let first = decode("prop", &bytes, floor_count, item_count).unwrap();
            let second = decode("prop", &bytes, floor_count, item_count).unwrap();

            prop_assert_eq!(&first.map, &second.map);
            prop_assert!(first.map.tiles.iter().flatten().all(|&t| t < floor_count));
            prop_assert!(first.map.items.iter().flatten().all(|&i| i < item_count));
        }

        #[test]
        fn prop_short_buffers_always_fail(len in 0usize..MAP_FILE_LEN) {
            let bytes = vec![0u8; len];
            prop_assert!(decode("prop", &bytes, 10, 10).is_err());
        }
    }

    #[tokio::test]
    async fn test_repository_caches_first_load() {
        let dir = temp_maps_dir("cache");
        let tiles = patterned_grid(0, 8);
        let items = patterned_grid(3, 8);
        std::fs::write(dir.join("lev01"), encode(&tiles, &items)).unwrap();

        let repository = MapRepository::new(&dir);
        let first = repository.load("lev01", 8, 8).await.unwrap();

        // Changing the file afterwards must not affect the cached copy.
        std::fs::write(dir.join("lev01"), vec![0u8; 10]).unwrap();
        let second = repository.load("lev01", 8, 8).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.tiles, tiles);
        assert_eq!(repository.cached_count().await, 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_repository_does_not_cache_failures() {
        let dir = temp_maps_dir("failure");
        std::fs::write(dir.join("lev09"), vec![0u8; 100]).unwrap();

        let repository = MapRepository::new(&dir);
        assert!(matches!(
            repository.load("lev09", 8, 8).await,
            Err(MapLoadError::TooShort { .. })
        ));
        assert_eq!(repository.cached_count().await, 0);

        std::fs::write(dir.join("lev09"), vec![0u8; MAP_FILE_LEN]).unwrap();
        assert!(repository.load("lev09", 8, 8).await.is_ok());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_repository_rejects_path_traversal() {
        let repository = MapRepository::new(temp_maps_dir("traversal"));
        assert!(matches!(
            repository.load("../etc/passwd", 8, 8).await,
            Err(MapLoadError::InvalidId(_))
        ));
        assert!(matches!(
            repository.load("missing", 8, 8).await,
            Err(MapLoadError::Io { .. })
        ));
    }
}
