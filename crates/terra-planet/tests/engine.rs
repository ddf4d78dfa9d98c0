use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::DVec3;
use terra_config::Config;
use terra_planet::{
    EngineError, HeadlessBackend, PlanetCamera, PlanetEngine, PlanetShape, TileDataSource,
    TileKey,
};
use terra_roam::{BinTreeParams, TriangleBinTree, VarianceTable};
use terra_terrain::{ProceduralSource, SurfaceParams};

fn small_config() -> Config {
    let mut config = Config::default();
    config.planet.min_radius_m = 10_000.0;
    config.planet.max_radius_m = 10_200.0;
    config.refinement.triangle_budget = 3_000;
    config.refinement.node_pool_capacity = 1 << 14;
    config.refinement.max_level = 24;
    config.tiles.tile_size = 8;
    config.tiles.slot_capacity = 16;
    config.tiles.max_level = 14;
    config.sectors.capacity = 4;
    config
}

fn source() -> Arc<dyn TileDataSource> {
    Arc::new(ProceduralSource::new(7, SurfaceParams::default()))
}

fn camera() -> PlanetCamera {
    PlanetCamera::above(10_000.0, 500.0, 0.3, 1.0, 0.6, 60f64.to_radians(), 4.0 / 3.0)
}

fn engine(config: &Config, backend: &mut HeadlessBackend) -> PlanetEngine {
    PlanetEngine::from_config(config, source(), backend).expect("engine")
}

/// Refine until two consecutive frames change nothing.
fn settle(engine: &mut PlanetEngine) {
    let mut quiet = 0;
    for _ in 0..500 {
        let stats = engine.render_setup();
        if stats.splits == 0 && stats.merges == 0 {
            quiet += 1;
            if quiet == 2 {
                return;
            }
        } else {
            quiet = 0;
        }
    }
    panic!("refinement did not settle");
}

#[test]
fn test_refinement_is_idempotent_once_settled() {
    let config = small_config();
    let mut backend = HeadlessBackend::new();
    let mut engine = engine(&config, &mut backend);
    engine.set_viewpoint(camera().viewpoint());

    settle(&mut engine);
    let live = engine.tree().live_nodes();
    assert!(live > 8);
    assert!(live <= 3_000 + 4 * 25);

    for _ in 0..3 {
        let stats = engine.render_setup();
        assert_eq!((stats.splits, stats.merges), (0, 0));
        assert_eq!(stats.live_nodes, live);
    }
    engine.tree().validate().expect("consistent tree");
}

#[test]
fn test_render_emits_one_strip_per_visible_leaf() {
    let config = small_config();
    let mut backend = HeadlessBackend::new();
    let mut engine = engine(&config, &mut backend);
    engine.set_viewpoint(camera().viewpoint());
    settle(&mut engine);

    backend.begin_frame();
    let stats = engine.render(&mut backend);
    assert!(stats.triangles > 0);
    assert_eq!(backend.frame_strips.len(), stats.triangles);
    assert!(backend.frame_strips.iter().all(|&(_, n)| n == 3));
    assert!(stats.texture_binds <= stats.triangles);
    assert!(
        backend
            .frame_strips
            .iter()
            .all(|(h, _)| h.0 >= 1 && h.0 <= backend.textures_created)
    );
}

#[test]
fn test_tiles_stream_in_over_frames() {
    let config = small_config();
    let mut backend = HeadlessBackend::new();
    let mut engine = engine(&config, &mut backend);
    engine.set_viewpoint(camera().viewpoint());
    settle(&mut engine);

    let base_uploads = backend.texture_uploads;
    assert_eq!(base_uploads, 2);

    let deadline = Instant::now() + Duration::from_secs(20);
    let mut committed = 0;
    while committed < 3 {
        assert!(Instant::now() < deadline, "no tiles committed");
        let stats = engine.render(&mut backend);
        if stats.committed.is_some() {
            committed += 1;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    // One upload per frame at most.
    assert_eq!(backend.texture_uploads, base_uploads + committed);
    assert!(engine.tile_stats().commits >= 5);
    assert!(engine.tiles().resident_count() <= 16);
}

#[test]
fn test_nothing_drawn_when_looking_away() {
    let config = small_config();
    let mut backend = HeadlessBackend::new();
    let mut engine = engine(&config, &mut backend);

    let eye = DVec3::new(30_000.0, 0.0, 0.0);
    let away = PlanetCamera {
        eye,
        target: eye * 2.0,
        up: DVec3::Z,
        fov_y: 1.0,
        aspect_ratio: 1.0,
        near: 1.0,
        far: 100_000.0,
    };
    engine.set_viewpoint(away.viewpoint());
    let stats = engine.render_setup();
    assert_eq!(stats.splits, 0);
    assert_eq!(stats.frustum_outside, 8);

    backend.begin_frame();
    let drawn = engine.render(&mut backend);
    assert_eq!(drawn.triangles, 0);
    assert!(backend.frame_strips.is_empty());
}

#[test]
fn test_no_geometry_without_viewpoint() {
    let config = small_config();
    let mut backend = HeadlessBackend::new();
    let mut engine = engine(&config, &mut backend);
    let stats = engine.render_setup();
    assert_eq!(stats.live_nodes, 8);
    assert_eq!(engine.render(&mut backend).triangles, 0);
    assert_eq!(backend.strips, 0);
}

#[test]
fn test_texture_lookup_falls_back_and_queues() {
    let config = small_config();
    let mut backend = HeadlessBackend::new();
    let mut engine = engine(&config, &mut backend);

    let mut key = TileKey::new(21, 9, 12);
    let handle = engine.texture_handle(&mut key);
    assert!(handle.is_some());
    assert!(key.is_base());
    assert!(!engine.has_texture_cached(TileKey::new(5, 2, 9)));
    assert!(engine.has_texture_cached(TileKey::new(0, 0, 7)));
    engine.close();
}

#[test]
fn test_sector_rendering() {
    let config = small_config();
    let mut backend = HeadlessBackend::new();
    let mut engine = engine(&config, &mut backend);
    engine.set_viewpoint(camera().viewpoint());

    let key = TileKey::new(3, 2, 9);
    backend.begin_frame();
    let strips = engine.render_sector(key, &mut backend).unwrap();
    assert_eq!(strips, 17);
    assert_eq!(backend.frame_strips.len(), 17);
    assert!(backend.frame_strips.iter().all(|&(_, n)| n == 36));
    assert_eq!(engine.sectors().len(), 1);

    // Only the base tiles are resident, so the sector samples one of them.
    let mesh = engine.sectors().peek(&key).unwrap();
    assert!(mesh.texture_key.is_base());
    assert_eq!(backend.binds, 1);
}

#[test]
fn test_variance_table_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("planet.var");
    let shape = PlanetShape::new(10_000.0, 10_200.0);
    let mut tree = TriangleBinTree::new(
        shape,
        source(),
        None,
        BinTreeParams {
            pool_capacity: 1 << 12,
            ..Default::default()
        },
    )
    .unwrap();
    tree.force_split_to(4).unwrap();
    let table = VarianceTable::new(4, tree.variance_entries(4)).unwrap();
    table.save(&path).unwrap();

    let mut config = small_config();
    config.variance.table_path = Some(path.clone());
    let mut backend = HeadlessBackend::new();
    let engine = engine(&config, &mut backend);
    assert_eq!(engine.tree().variance_table().map(|t| t.max_level()), Some(4));

    std::fs::write(&path, [4u8, 1, 2, 3]).unwrap();
    let err = PlanetEngine::from_config(&config, source(), &mut backend);
    assert!(matches!(err, Err(EngineError::Variance(_))));
}

#[test]
fn test_invalid_config_rejected() {
    let mut config = small_config();
    config.tiles.slot_capacity = 2;
    let mut backend = HeadlessBackend::new();
    let err = PlanetEngine::from_config(&config, source(), &mut backend);
    assert!(matches!(err, Err(EngineError::Config(_))));
}

#[test]
fn test_reloaded_refinement_settings_apply() {
    let mut config = small_config();
    let mut backend = HeadlessBackend::new();
    let mut engine = engine(&config, &mut backend);
    engine.set_viewpoint(camera().viewpoint());
    settle(&mut engine);
    let refined = engine.tree().live_nodes();

    config.refinement.triangle_budget = 200;
    config.refinement.pixels_per_triangle = 40.0;
    engine.apply_config(&config).unwrap();
    assert_eq!(engine.scheduler_mut().params().triangle_budget, 200);
    settle(&mut engine);
    assert!(engine.tree().live_nodes() < refined);

    config.tiles.queue_capacity = 0;
    assert!(matches!(
        engine.apply_config(&config),
        Err(EngineError::Config(_))
    ));
    assert_eq!(engine.scheduler_mut().params().triangle_budget, 200);
}
