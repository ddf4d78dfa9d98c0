//! Memoised sector meshes with least-recently-used eviction.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use terra_geo::{PlanetShape, SourceError, TileDataSource, TileKey};

use crate::mesh::SectorMesh;

struct CachedSector {
    mesh: SectorMesh,
    last_used: u64,
}

/// Bounded least-recently-used cache of sector meshes keyed by tile.
pub struct SectorMeshCache {
    sectors: FxHashMap<TileKey, CachedSector>,
    capacity: usize,
    clock: u64,
    shape: PlanetShape,
    source: Arc<dyn TileDataSource>,
}

impl SectorMeshCache {
    pub fn new(capacity: usize, shape: PlanetShape, source: Arc<dyn TileDataSource>) -> Self {
        Self {
            sectors: FxHashMap::default(),
            capacity: capacity.max(1),
            clock: 0,
            shape,
            source,
        }
    }

    /// The mesh for `key`, built on first use.
    pub fn mesh(&mut self, key: TileKey) -> Result<&SectorMesh, SourceError> {
        Ok(&self.entry(key)?.mesh)
    }

    /// The mesh for `key` with its UVs mapped into `texture_key`'s extent.
    pub fn mesh_textured(
        &mut self,
        key: TileKey,
        texture_key: TileKey,
    ) -> Result<&SectorMesh, SourceError> {
        let sector = self.entry(key)?;
        if sector.mesh.texture_key != texture_key {
            sector.mesh.rebind_texture(texture_key);
        }
        Ok(&sector.mesh)
    }

    fn entry(&mut self, key: TileKey) -> Result<&mut CachedSector, SourceError> {
        self.clock += 1;
        let clock = self.clock;

        if !self.sectors.contains_key(&key) {
            let mesh = SectorMesh::build(self.source.as_ref(), &self.shape, key)?;
            if self.sectors.len() >= self.capacity {
                self.evict_oldest();
            }
            tracing::debug!(?key, cached = self.sectors.len() + 1, "Built sector mesh");
            self.sectors.insert(
                key,
                CachedSector {
                    mesh,
                    last_used: clock,
                },
            );
        }

        let sector = self
            .sectors
            .get_mut(&key)
            .ok_or(SourceError::OutOfRange(key))?;
        sector.last_used = clock;
        Ok(sector)
    }

    /// Point the cached mesh for `key` at `texture_key`'s texture without
    /// rebuilding its geometry. Returns `false` when `key` is not cached.
    pub fn rebind_texture(&mut self, key: TileKey, texture_key: TileKey) -> bool {
        match self.sectors.get_mut(&key) {
            Some(sector) if sector.mesh.texture_key != texture_key => {
                sector.mesh.rebind_texture(texture_key);
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    /// The cached mesh for `key`, without touching its recency.
    pub fn peek(&self, key: &TileKey) -> Option<&SectorMesh> {
        self.sectors.get(key).map(|s| &s.mesh)
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.sectors.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.sectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.sectors.clear();
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .sectors
            .iter()
            .min_by_key(|(_, s)| s.last_used)
            .map(|(k, _)| *k);
        if let Some(key) = oldest {
            self.sectors.remove(&key);
            tracing::trace!(?key, "Evicted sector mesh");
        }
    }
}
