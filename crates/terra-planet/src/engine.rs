//! The engine query surface.

use std::sync::Arc;

use glam::{DVec3, Vec3};
use terra_config::Config;
use terra_geo::{PlanetShape, SourceError, TileDataSource, TileKey};
use terra_roam::{
    BinTreeParams, FrameStats, NodeId, RefinementParams, RefinementScheduler, TriangleBinTree,
    VarianceTable, ViewCenterBoost, Viewpoint,
};
use terra_sector::SectorMeshCache;
use terra_tiles::{TextureBackend, TextureHandle, TileCache, TileCacheParams, TileCacheStats};

use crate::error::EngineError;
use crate::render::{RenderBackend, StripVertex};

/// Everything needed to assemble a [`PlanetEngine`].
#[derive(Clone, Debug)]
pub struct EngineParams {
    pub bintree: BinTreeParams,
    pub refinement: RefinementParams,
    pub tiles: TileCacheParams,
    pub sector_capacity: usize,
    /// Run the bintree consistency check after every frame in release builds too.
    pub validate_every_frame: bool,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for EngineParams {
    fn from(config: &Config) -> Self {
        let r = &config.refinement;
        let t = &config.tiles;
        Self {
            bintree: BinTreeParams {
                max_level: r.max_level,
                max_texture_level: t.max_level,
                pool_capacity: r.node_pool_capacity,
            },
            refinement: RefinementParams {
                pixels_per_triangle: r.pixels_per_triangle,
                viewport_height: r.viewport_height as f64,
                fov_y: r.fov_y_degrees.to_radians(),
                triangle_budget: r.triangle_budget,
                max_level: r.max_level,
                view_center_boost: if r.view_center_boost {
                    ViewCenterBoost::TextureLevel
                } else {
                    ViewCenterBoost::None
                },
            },
            tiles: TileCacheParams {
                tile_size: t.tile_size,
                slot_capacity: t.slot_capacity,
                queue_capacity: t.queue_capacity,
                max_level: t.max_level,
                stale_sun_degrees: t.stale_sun_degrees,
                sun_longitude: t.sun_longitude_degrees,
                sea_level: config.planet.sea_level,
            },
            sector_capacity: config.sectors.capacity,
            validate_every_frame: config.debug.validate_every_frame,
        }
    }
}

/// Counters for one [`PlanetEngine::render`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Leaves drawn.
    pub triangles: usize,
    pub texture_binds: usize,
    /// Leaves drawn with a coarser tile than they asked for.
    pub fallbacks: usize,
    /// Tile committed to the backend this frame.
    pub committed: Option<TileKey>,
}

/// The planet renderer core.
pub struct PlanetEngine {
    tree: TriangleBinTree,
    scheduler: RefinementScheduler,
    tiles: TileCache,
    sectors: SectorMeshCache,
    validate_every_frame: bool,
    leaves: Vec<NodeId>,
    draws: Vec<(TextureHandle, TileKey, NodeId)>,
    last_frame: FrameStats,
}

impl PlanetEngine {
    pub fn new(
        shape: PlanetShape,
        source: Arc<dyn TileDataSource>,
        variance: Option<Arc<VarianceTable>>,
        params: EngineParams,
        backend: &mut dyn TextureBackend,
    ) -> Result<Self, EngineError> {
        let tree = TriangleBinTree::new(shape, Arc::clone(&source), variance, params.bintree)?;
        let scheduler = RefinementScheduler::new(params.refinement, shape);
        let tiles = TileCache::new(params.tiles, &shape, Arc::clone(&source), backend)?;
        let sectors = SectorMeshCache::new(params.sector_capacity, shape, source);
        tracing::info!(
            min_radius = shape.min_radius,
            max_radius = shape.max_radius,
            variance = tree.variance_table().is_some(),
            "Planet engine ready"
        );
        Ok(Self {
            tree,
            scheduler,
            tiles,
            sectors,
            validate_every_frame: params.validate_every_frame,
            leaves: Vec::new(),
            draws: Vec::new(),
            last_frame: FrameStats::default(),
        })
    }

    /// Assemble an engine from a loaded config, reading the variance table when one is set.
    pub fn from_config(
        config: &Config,
        source: Arc<dyn TileDataSource>,
        backend: &mut dyn TextureBackend,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let shape = PlanetShape::new(config.planet.min_radius_m, config.planet.max_radius_m);
        let variance = match &config.variance.table_path {
            Some(path) => Some(Arc::new(VarianceTable::load(path)?)),
            None => {
                tracing::info!("No variance table configured, using live elevation queries");
                None
            }
        };
        Self::new(shape, source, variance, EngineParams::from(config), backend)
    }

    /// Apply the parts of a reloaded config that can change while running:
    /// refinement tuning and per-frame validation.
    ///
    /// Planet, tile, sector and variance settings take effect on the next
    /// construction.
    pub fn apply_config(&mut self, config: &Config) -> Result<(), EngineError> {
        config.validate()?;
        let params = EngineParams::from(config);
        self.scheduler.set_params(params.refinement);
        self.validate_every_frame = params.validate_every_frame;
        tracing::info!(
            pixels_per_triangle = config.refinement.pixels_per_triangle,
            triangle_budget = config.refinement.triangle_budget,
            "Refinement settings applied"
        );
        Ok(())
    }

    pub fn set_viewpoint(&mut self, viewpoint: Viewpoint) {
        self.scheduler.set_viewpoint(viewpoint);
    }

    pub fn viewpoint(&self) -> Option<&Viewpoint> {
        self.scheduler.viewpoint()
    }

    /// Advance refinement by one frame.
    pub fn render_setup(&mut self) -> FrameStats {
        let stats = self.scheduler.render_setup(&mut self.tree);
        if self.validate_every_frame
            && !cfg!(debug_assertions)
            && let Err(err) = self.tree.validate()
        {
            tracing::error!(%err, "Bintree invariant violated");
        }
        self.last_frame = stats;
        stats
    }

    /// Commit at most one finished tile, then draw every visible leaf.
    ///
    /// Leaves are grouped by texture so each handle is bound once.
    pub fn render<B: RenderBackend>(&mut self, backend: &mut B) -> RenderStats {
        let mut stats = RenderStats {
            committed: self.tiles.update(backend),
            ..Default::default()
        };
        let Some(eye) = self.scheduler.viewpoint().map(|v| v.eye) else {
            return stats;
        };

        self.leaves.clear();
        self.tree.collect_visible_leaves(&mut self.leaves);

        self.draws.clear();
        for &id in &self.leaves {
            let wanted = self.tree.node(id).tile();
            let mut key = wanted;
            let Some(handle) = self.tiles.texture_handle(&mut key) else {
                continue;
            };
            if key != wanted {
                stats.fallbacks += 1;
            }
            self.draws.push((handle, key, id));
        }
        self.draws.sort_by_key(|(handle, _, _)| handle.0);

        let mut bound = None;
        for &(handle, key, id) in &self.draws {
            if bound != Some(handle) {
                backend.bind_texture(handle);
                bound = Some(handle);
                stats.texture_binds += 1;
            }
            let corners = self.tree.node(id).corners();
            let strip = corners.map(|v| StripVertex {
                position: (v.position - eye).as_vec3().to_array(),
                uv: key.local_uv(v.tex),
            });
            backend.submit_triangle_strip(&strip);
            stats.triangles += 1;
        }
        stats
    }

    /// Draw the fixed-detail sector mesh for `key` instead of bintree geometry.
    ///
    /// The sector's UVs are rebound when only a coarser texture is resident.
    /// Returns the number of strips submitted.
    pub fn render_sector<B: RenderBackend>(
        &mut self,
        key: TileKey,
        backend: &mut B,
    ) -> Result<usize, SourceError> {
        let Some(eye) = self.scheduler.viewpoint().map(|v| v.eye) else {
            return Ok(0);
        };
        let mut texture_key = key;
        let handle = self
            .tiles
            .texture_handle(&mut texture_key)
            .ok_or(SourceError::OutOfRange(key))?;
        let mesh = self.sectors.mesh_textured(key, texture_key)?;

        let offset: DVec3 = mesh.origin - eye;
        backend.bind_texture(handle);
        let mut vertices = Vec::with_capacity(mesh.strips.first().map_or(0, |s| s.len()));
        for strip in &mesh.strips {
            vertices.clear();
            vertices.extend(strip.iter().map(|&i| {
                let v = mesh.vertices[i as usize];
                StripVertex {
                    position: (offset + Vec3::from(v.position).as_dvec3())
                        .as_vec3()
                        .to_array(),
                    uv: v.uv,
                }
            }));
            backend.submit_triangle_strip(&vertices);
        }
        Ok(mesh.strips.len())
    }

    /// Texture for `key` or its nearest resident ancestor; `key` is updated to
    /// the tile returned.
    pub fn texture_handle(&mut self, key: &mut TileKey) -> Option<TextureHandle> {
        self.tiles.texture_handle(key)
    }

    /// Whether `key` is resident. A miss queues it.
    pub fn has_texture_cached(&mut self, key: TileKey) -> bool {
        self.tiles.has_texture_cached(key)
    }

    pub fn set_sun_longitude(&mut self, degrees: f64) {
        self.tiles.set_sun_longitude(degrees);
    }

    pub fn tree(&self) -> &TriangleBinTree {
        &self.tree
    }

    pub fn scheduler_mut(&mut self) -> &mut RefinementScheduler {
        &mut self.scheduler
    }

    pub fn tile_stats(&self) -> TileCacheStats {
        self.tiles.stats()
    }

    pub fn tiles(&self) -> &TileCache {
        &self.tiles
    }

    pub fn sectors(&self) -> &SectorMeshCache {
        &self.sectors
    }

    pub fn last_frame(&self) -> FrameStats {
        self.last_frame
    }

    /// Stop the tile worker. Also happens on drop.
    pub fn close(&mut self) {
        self.tiles.close();
    }
}
