//! Offline variance table construction.

use std::sync::Arc;

use terra_geo::{PlanetShape, TileDataSource};
use terra_roam::{BinTreeParams, MAX_TABLE_LEVEL, TriangleBinTree, VarianceTable, tris_for_level};

use crate::error::ToolError;

/// Split a fresh tree down to `level` and quantise every split node.
///
/// Every node of levels `0..=level` is split once so that its midpoint
/// displacement is measured against the live source.
pub fn build_table(
    shape: PlanetShape,
    source: Arc<dyn TileDataSource>,
    level: u8,
) -> Result<VarianceTable, ToolError> {
    if level > MAX_TABLE_LEVEL {
        return Err(ToolError::LevelTooDeep {
            level,
            max: MAX_TABLE_LEVEL,
        });
    }
    let params = BinTreeParams {
        pool_capacity: tris_for_level(level + 1),
        ..Default::default()
    };
    let mut tree = TriangleBinTree::new(shape, source, None, params)?;
    tree.force_split_to(level)?;
    tracing::info!(level, live = tree.live_nodes(), "Tree fully split");
    Ok(VarianceTable::new(level, tree.variance_entries(level))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use terra_roam::total_nodes_for_level;
    use terra_terrain::{ProceduralSource, SurfaceParams};

    fn source() -> Arc<dyn TileDataSource> {
        Arc::new(ProceduralSource::new(3, SurfaceParams::default()))
    }

    fn shape() -> PlanetShape {
        PlanetShape::new(1_000.0, 1_050.0)
    }

    #[test]
    fn test_table_covers_every_level() {
        let table = build_table(shape(), source(), 3).unwrap();
        assert_eq!(table.max_level(), 3);
        assert_eq!(table.len(), total_nodes_for_level(3));
        // Roots always measure some relief.
        assert!(table.entries()[..8].iter().any(|e| e.log2_variance != 0));
    }

    #[test]
    fn test_build_is_deterministic() {
        let a = build_table(shape(), source(), 2).unwrap();
        let b = build_table(shape(), source(), 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_built_table_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("planet.var");
        let table = build_table(shape(), source(), 2).unwrap();
        table.save(&path).unwrap();
        assert_eq!(VarianceTable::load(&path).unwrap(), table);
    }

    #[test]
    fn test_rejects_deep_level() {
        let err = build_table(shape(), source(), MAX_TABLE_LEVEL + 1);
        assert!(matches!(err, Err(ToolError::LevelTooDeep { .. })));
    }
}
