//! The tile data source collaborator: elevation queries and raw sample blocks.

use crate::tile_key::TileKey;

/// Errors a [`TileDataSource`] may report for a sample block request.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The key does not address a tile the source covers.
    #[error("tile {0:?} is outside the source coverage")]
    OutOfRange(TileKey),
    /// A returned block does not have the advertised dimensions.
    #[error("sample block for {key:?} has {actual} samples, expected {expected}")]
    Malformed {
        /// Tile the block was produced for.
        key: TileKey,
        /// Expected sample count (`size * size`).
        expected: usize,
        /// Sample count actually present.
        actual: usize,
    },
    /// The backing store could not produce data.
    #[error("tile source unavailable: {0}")]
    Unavailable(String),
}

/// Raw per-tile samples as produced by the data source.
///
/// All layers are row-major, `size * size` samples, row 0 at the tile's
/// southern edge. Samples are edge-inclusive: column 0 lies on the western
/// border and column `size - 1` on the eastern one, so neighbouring tiles share
/// their border samples. Heights are elevation ratios quantised to a byte.
#[derive(Clone, Debug)]
pub struct RawTile {
    pub key: TileKey,
    pub size: u32,
    /// Elevation ratio per sample, `0` at the min radius and `255` at the max.
    pub heights: Vec<u8>,
    /// Base surface colour. When absent, heights are remapped through a palette.
    pub color: Option<Vec<[u8; 3]>>,
    /// Cloud opacity per sample.
    pub clouds: Option<Vec<u8>>,
    /// Night-light emission per sample.
    pub night: Option<Vec<u8>>,
}

impl RawTile {
    /// A block of uniform height and no optional layers.
    pub fn flat(key: TileKey, size: u32, height: u8) -> Self {
        Self {
            key,
            size,
            heights: vec![height; (size * size) as usize],
            color: None,
            clouds: None,
            night: None,
        }
    }

    /// Height sample at `(x, y)`, clamping to the block edge.
    pub fn height(&self, x: i64, y: i64) -> u8 {
        let max = self.size as i64 - 1;
        let x = x.clamp(0, max) as usize;
        let y = y.clamp(0, max) as usize;
        self.heights[y * self.size as usize + x]
    }

    /// Check that every present layer has `size * size` samples.
    pub fn validate(&self) -> Result<(), SourceError> {
        let expected = (self.size * self.size) as usize;
        let lens = [
            Some(self.heights.len()),
            self.color.as_ref().map(Vec::len),
            self.clouds.as_ref().map(Vec::len),
            self.night.as_ref().map(Vec::len),
        ];
        for actual in lens.into_iter().flatten() {
            if actual != expected {
                return Err(SourceError::Malformed {
                    key: self.key,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}

/// Provider of elevation and surface samples.
///
/// Implementations are shared between the render thread (live elevation queries
/// during refinement) and the tile synthesis worker, hence `Send + Sync`.
pub trait TileDataSource: Send + Sync {
    /// Elevation ratio in `[0, 1]` at a latitude/longitude in radians.
    ///
    /// `precision` is the bintree level asking; sources may use it to limit the
    /// detail they evaluate. Longitude may be anywhere in `[0, TAU]` and must wrap.
    fn displacement(&self, lat: f64, lon: f64, precision: u8) -> f64;

    /// Raw sample block for `key` at `size × size` resolution.
    fn tile(&self, key: TileKey, size: u32) -> Result<RawTile, SourceError>;
}
