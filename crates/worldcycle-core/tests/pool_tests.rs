//! Integration tests for pool rotation and the strategy dispatcher

mod common;

use common::Harness;
use glam::Vec3;
use worldcycle_core::{
    CoreConfig, Initiator, Location, PlayerRoster, PoolConfig, PoolError, PoolWarning,
    ResetOutcome, ResetService, WorldHost, WorldPoolManager, WorldStorage,
};

fn pool_config(size: usize, regeneration_delay_ticks: u64) -> PoolConfig {
    PoolConfig {
        size,
        regeneration_delay_ticks,
        ..Default::default()
    }
}

fn in_use_count(pool: &WorldPoolManager) -> usize {
    pool.slots().iter().filter(|s| s.in_use).count()
}

#[test]
fn test_initialize_creates_missing_slots() {
    let harness = Harness::new(false);
    let pool = WorldPoolManager::new(harness.deps(), pool_config(3, 100));
    pool.initialize_pool().unwrap();

    assert_eq!(
        harness.storage.list_worlds().unwrap(),
        vec!["world_pool_0", "world_pool_1", "world_pool_2"]
    );
    let slots = pool.slots();
    assert!(slots[0].in_use);
    assert!(slots.iter().all(|s| s.seed.is_some()));
    assert_eq!(in_use_count(&pool), 1);
    assert!(pool.warnings().is_empty());
}

#[test]
fn test_existing_slots_load_lazily() {
    let harness = Harness::new(false);
    {
        let pool = WorldPoolManager::new(harness.deps(), pool_config(3, 100));
        pool.initialize_pool().unwrap();
    }
    // Simulate a restart: worlds on disk, nothing loaded
    for name in harness.host.loaded_names() {
        harness.host.unload_world(&name, true);
    }

    let pool = WorldPoolManager::new(harness.deps(), pool_config(3, 100));
    pool.initialize_pool().unwrap();

    assert_eq!(harness.host.loaded_names(), vec!["world_pool_0"]);
    assert_eq!(pool.get_pool_stats().materialized, 1);
    assert!(pool.slots()[1].seed.is_none());

    // First use loads it from disk rather than recreating it
    let on_disk_seed = harness
        .storage
        .read_metadata("world_pool_1")
        .unwrap()
        .unwrap()
        .seed;
    let next = pool.rotate_to_next_world().unwrap();
    assert_eq!(next.name, "world_pool_1");
    assert_eq!(next.seed, on_disk_seed);
}

#[test]
fn test_pregenerate_loads_every_slot() {
    let harness = Harness::new(false);
    WorldPoolManager::new(harness.deps(), pool_config(3, 100))
        .initialize_pool()
        .unwrap();
    for name in harness.host.loaded_names() {
        harness.host.unload_world(&name, true);
    }

    let config = PoolConfig {
        pregenerate_on_startup: true,
        ..pool_config(3, 100)
    };
    let pool = WorldPoolManager::new(harness.deps(), config);
    pool.initialize_pool().unwrap();

    assert_eq!(pool.get_pool_stats().materialized, 3);
    assert!(pool.slots().iter().all(|s| s.seed.is_some()));
}

#[test]
fn test_rotation_cycles_with_period_n() {
    let harness = Harness::new(false);
    let pool = WorldPoolManager::new(harness.deps(), pool_config(4, 1_000_000));
    pool.initialize_pool().unwrap();

    let mut indices = Vec::new();
    for _ in 0..8 {
        let world = pool.rotate_to_next_world().unwrap();
        let stats = pool.get_pool_stats();
        assert_eq!(stats.current_name, world.name);
        assert_eq!(in_use_count(&pool), 1);
        indices.push(stats.current_index);
    }
    assert_eq!(indices, vec![1, 2, 3, 0, 1, 2, 3, 0]);
}

#[test]
fn test_pool_size_coercion() {
    let harness = Harness::new(false);

    let small = WorldPoolManager::new(harness.deps(), pool_config(1, 100));
    assert_eq!(small.size(), 3);
    assert_eq!(
        small.warnings(),
        &[PoolWarning::SizeTooSmall {
            requested: 1,
            coerced: 3
        }]
    );

    let large = WorldPoolManager::new(harness.deps(), pool_config(25, 100));
    assert_eq!(large.size(), 25);
    assert_eq!(large.warnings(), &[PoolWarning::SizeLarge { requested: 25 }]);
}

#[test]
fn test_retired_slot_is_rebuilt_after_cooldown() {
    let harness = Harness::new(false);
    let pool = WorldPoolManager::new(harness.deps(), pool_config(3, 10));
    pool.initialize_pool().unwrap();
    let old_seed = pool.slots()[0].seed.unwrap();
    let straggler = harness
        .roster
        .add(1, Location::new("world_pool_0", Vec3::new(3.5, 71.0, 3.5)));

    let current = pool.rotate_to_next_world().unwrap();

    // Nothing happens before the cool-down
    harness.manual.advance(9);
    assert_eq!(pool.slots()[0].seed, Some(old_seed));
    assert_eq!(
        harness.roster.location(straggler).unwrap().world,
        "world_pool_0"
    );

    harness.manual.run_until_idle(1_000);
    assert_eq!(
        harness.roster.location(straggler),
        Some(current.spawn_location())
    );
    let rebuilt = pool.slots()[0].clone();
    assert!(!rebuilt.in_use);
    assert_ne!(rebuilt.seed, Some(old_seed));
    let meta = harness.storage.read_metadata("world_pool_0").unwrap().unwrap();
    assert_eq!(Some(meta.seed), rebuilt.seed);
}

#[test]
fn test_rebuild_skipped_when_slot_is_current_again() {
    let harness = Harness::new(false);
    let pool = WorldPoolManager::new(harness.deps(), pool_config(2, 10));
    pool.initialize_pool().unwrap();
    let slot0_seed = pool.slots()[0].seed;
    let slot1_seed = pool.slots()[1].seed;

    pool.rotate_to_next_world().unwrap();
    pool.rotate_to_next_world().unwrap();
    assert_eq!(pool.get_pool_stats().current_index, 0);

    harness.manual.run_until_idle(1_000);

    // Slot 0 is live and untouched; slot 1 was retired second and rebuilt
    assert_eq!(pool.slots()[0].seed, slot0_seed);
    assert!(harness.host.loaded_world("world_pool_0").is_some());
    assert_ne!(pool.slots()[1].seed, slot1_seed);
}

#[test]
fn test_rotation_onto_slot_being_rebuilt_keeps_live_world() {
    let harness = Harness::new(false);
    let pool = WorldPoolManager::new(harness.deps(), pool_config(2, 1));
    pool.initialize_pool().unwrap();

    pool.rotate_to_next_world().unwrap();
    // Slot 0 is unloaded and its delete is queued on the async pool
    harness.manual.tick();
    assert!(pool.slots()[0].rebuilding);
    assert!(harness.host.loaded_world("world_pool_0").is_none());

    let err = pool.rotate_to_next_world().unwrap_err();
    assert!(matches!(err, PoolError::WorldUnavailable { ref slot } if slot == "world_pool_0"));
    assert_eq!(pool.get_pool_stats().current_index, 1);
    assert!(pool.slots()[1].in_use);

    harness.manual.run_until_idle(1_000);
    assert!(harness.host.loaded_world("world_pool_1").is_some());
    assert!(harness.storage.exists("world_pool_1"));
    assert!(!pool.slots()[0].rebuilding);
    assert!(harness.storage.exists("world_pool_0"));

    // Once rebuilt the slot takes its turn again
    let next = pool.rotate_to_next_world().unwrap();
    assert_eq!(next.name, "world_pool_0");
    assert_eq!(pool.slots()[0].seed, Some(next.seed));
    assert!(harness.storage.exists("world_pool_0"));
}

#[test]
fn test_failed_delete_leaves_old_world_usable() {
    let harness = Harness::with_failing_deletes(&["world_pool_0"]);
    let pool = WorldPoolManager::new(harness.deps(), pool_config(2, 1));
    pool.initialize_pool().unwrap();
    let old_seed = pool.slots()[0].seed.unwrap();

    pool.rotate_to_next_world().unwrap();
    harness.manual.run_until_idle(1_000);
    assert!(!pool.slots()[0].rebuilding);
    assert!(harness.storage.exists("world_pool_0"));

    let back = pool.rotate_to_next_world().unwrap();
    assert_eq!(back.name, "world_pool_0");
    assert_eq!(back.seed, old_seed);
}

#[test]
fn test_failed_rotation_keeps_current_slot() {
    let harness = Harness::new(false);
    let pool = WorldPoolManager::new(harness.deps(), pool_config(3, 100));
    pool.initialize_pool().unwrap();

    harness.host.unload_world("world_pool_1", false);
    harness.storage.delete_world("world_pool_1").unwrap();
    harness.host.fail_create("world_pool_1");

    let err = pool.rotate_to_next_world().unwrap_err();
    assert!(matches!(err, PoolError::WorldUnavailable { ref slot } if slot == "world_pool_1"));

    let stats = pool.get_pool_stats();
    assert_eq!(stats.current_index, 0);
    assert!(pool.slots()[0].in_use);
    assert_eq!(in_use_count(&pool), 1);
}

#[test]
fn test_current_world_materializes_on_demand() {
    let harness = Harness::new(false);
    let pool = WorldPoolManager::new(harness.deps(), pool_config(3, 100));
    pool.initialize_pool().unwrap();
    harness.host.unload_world("world_pool_0", true);

    let world = pool.get_current_world().unwrap();
    assert_eq!(world.name, "world_pool_0");
    assert!(harness.host.loaded_world("world_pool_0").is_some());
}

#[test]
fn test_service_rotates_on_fixed_hosts() {
    let harness = Harness::new(false);
    let player = harness
        .roster
        .add(7, Location::new("world_pool_0", Vec3::new(0.5, 71.0, 0.5)));
    let service = ResetService::new(harness.deps(), &CoreConfig::default());
    service.pool().unwrap().initialize_pool().unwrap();

    let outcome = service.begin_full_reset(Initiator::Console).unwrap();
    let ResetOutcome::Rotated(world) = outcome else {
        panic!("expected a rotation, got {:?}", outcome);
    };
    assert_eq!(world.name, "world_pool_1");
    assert!(!service.is_reset_in_progress());

    harness.manual.tick();
    assert_eq!(
        harness.roster.location(player).unwrap().world,
        "world_pool_1"
    );
}

#[test]
fn test_service_resets_in_place_on_dynamic_hosts() {
    let harness = Harness::new(true);
    let service = ResetService::new(harness.deps(), &CoreConfig::default());
    assert!(service.pool().is_none());

    assert_eq!(
        service.begin_full_reset(Initiator::Console).unwrap(),
        ResetOutcome::Started
    );
    assert!(service.is_reset_in_progress());
    harness.manual.run_until_idle(1_000);
    assert!(!service.is_reset_in_progress());
}
