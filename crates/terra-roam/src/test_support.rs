//! Shared fixtures for the bintree and scheduler tests.

use std::sync::Arc;

use terra_geo::{PlanetShape, RawTile, SourceError, TileDataSource, TileKey};

use crate::bintree::{BinTreeParams, TriangleBinTree};

/// Source returning the same elevation ratio everywhere.
pub(crate) struct ConstantSource(pub f64);

impl TileDataSource for ConstantSource {
    fn displacement(&self, _lat: f64, _lon: f64, _precision: u8) -> f64 {
        self.0
    }

    fn tile(&self, key: TileKey, size: u32) -> Result<RawTile, SourceError> {
        Ok(RawTile::flat(key, size, (self.0 * 255.0) as u8))
    }
}

pub(crate) fn shape() -> PlanetShape {
    PlanetShape::new(1000.0, 1100.0)
}

pub(crate) fn tree_with(source: Arc<dyn TileDataSource>, pool_capacity: usize) -> TriangleBinTree {
    TriangleBinTree::new(
        shape(),
        source,
        None,
        BinTreeParams {
            pool_capacity,
            ..Default::default()
        },
    )
    .expect("tree")
}

pub(crate) fn flat_tree(pool_capacity: usize) -> TriangleBinTree {
    tree_with(Arc::new(ConstantSource(0.5)), pool_capacity)
}
