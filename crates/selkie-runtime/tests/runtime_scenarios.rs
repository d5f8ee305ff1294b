//! End-to-end runtime scenarios under simulated time and loading

use pretty_assertions::assert_eq;
use selkie_core::config::{RuntimeConfig, PROPERTY_UPDATE_RATE_HZ_MAX};
use selkie_core::Clock;
use selkie_core::error::Error;
use selkie_core::log::{LogLevel, LOG_MANAGER_ID};
use selkie_core::manager::SharedManager;
use selkie_core::properties::PropertyValue;
use selkie_dst::{
    journal, journal_entries, HookEvent, Journal, RecordingLog, RecordingManager, SimClock,
    SimLoader, SimModule,
};
use selkie_runtime::Runtime;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

fn sim_runtime(config: RuntimeConfig) -> (Runtime, Arc<SimClock>, Arc<SimLoader>) {
    let clock = SimClock::shared();
    let loader = SimLoader::new();
    let runtime = Runtime::builder()
        .with_loader(loader.clone())
        .with_clock(clock.clone())
        .with_config(config)
        .build()
        .expect("runtime builds");
    (runtime, clock, loader)
}

/// Config with no rate cap, so ticks consume no virtual time on their own
fn uncapped() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.update.update_rate_hz_max = 0;
    config
}

/// Journal entries without the per-tick update phases
fn lifecycle_events(journal: &Journal) -> Vec<HookEvent> {
    journal_entries(journal)
        .into_iter()
        .filter(|event| {
            !matches!(
                event,
                HookEvent::PreUpdate(_)
                    | HookEvent::FixedUpdate(_)
                    | HookEvent::Update(_)
                    | HookEvent::PostUpdate(_)
            )
        })
        .collect()
}

fn fixed_update_count(journal: &Journal) -> usize {
    journal_entries(journal)
        .iter()
        .filter(|event| matches!(event, HookEvent::FixedUpdate(_)))
        .count()
}

// =============================================================================
// Activation Scenarios
// =============================================================================

#[test]
fn activation_takes_effect_at_the_tick_boundary() {
    let (mut runtime, _clock, loader) = sim_runtime(uncapped());
    let library_id = Uuid::new_v4();
    loader.provide("core.so", move || {
        Box::new(SimModule::new(library_id, "Core"))
    });
    runtime.load_library(Path::new("core.so")).unwrap();

    let events = journal();
    let type_id = Uuid::new_v4();
    let manager = RecordingManager::shared(type_id, "Window", "W", &events);
    runtime.register_manager(library_id, manager.clone()).unwrap();

    runtime.request_activate(manager.clone()).unwrap();
    assert!(matches!(
        runtime.active(type_id).unwrap_err(),
        Error::ManagerNotActive { .. }
    ));

    runtime.tick();
    assert!(Arc::ptr_eq(&runtime.active(type_id).unwrap(), &manager));
    assert!(Arc::ptr_eq(
        &runtime.active_by_name("Window").unwrap(),
        &manager
    ));
}

#[test]
fn hot_swap_runs_the_handoff_protocol() {
    // The concrete scenario: library "Core", manager type "Log"; activate I,
    // then activate I2 of the same type and observe the handoff.
    let (mut runtime, _clock, loader) = sim_runtime(uncapped());
    let library_id = Uuid::new_v4();
    loader.provide("core.so", move || {
        Box::new(SimModule::new(library_id, "Core"))
    });
    runtime.load_library(Path::new("core.so")).unwrap();

    let events = journal();
    let type_id = Uuid::new_v4();
    let first = RecordingManager::shared(type_id, "Log", "I", &events);
    let second = RecordingManager::shared(type_id, "Log", "I2", &events);
    runtime.register_manager(library_id, first.clone()).unwrap();

    runtime.request_activate(first.clone()).unwrap();
    runtime.tick();
    assert!(Arc::ptr_eq(&runtime.active(type_id).unwrap(), &first));

    // Same type id within one library would be a conflict, so the second
    // implementation lives in a second library.
    let other_library = Uuid::new_v4();
    loader.provide("extra.so", move || {
        Box::new(SimModule::new(other_library, "Extra"))
    });
    runtime.load_library(Path::new("extra.so")).unwrap();
    runtime
        .register_manager(other_library, second.clone())
        .unwrap();

    runtime.request_activate(second.clone()).unwrap();
    runtime.tick();

    assert!(Arc::ptr_eq(&runtime.active(type_id).unwrap(), &second));
    assert!(!first.is_active());
    assert_eq!(
        lifecycle_events(&events),
        vec![
            HookEvent::Init("I".into()),
            HookEvent::Init("I2".into()),
            HookEvent::Activate {
                label: "I".into(),
                had_predecessor: false
            },
            HookEvent::Replaced("I".into()),
            HookEvent::Deactivate("I".into()),
            HookEvent::Activate {
                label: "I2".into(),
                had_predecessor: true
            },
        ]
    );
}

#[test]
fn update_phases_run_in_order_for_active_managers() {
    let (mut runtime, clock, loader) = sim_runtime(uncapped());
    let library_id = Uuid::new_v4();
    loader.provide("core.so", move || {
        Box::new(SimModule::new(library_id, "Core"))
    });
    runtime.load_library(Path::new("core.so")).unwrap();

    let events = journal();
    let manager = RecordingManager::shared(Uuid::new_v4(), "Window", "W", &events);
    runtime.register_manager(library_id, manager.clone()).unwrap();
    runtime.request_activate(manager).unwrap();

    runtime.tick();
    // Advance past one fixed step so the tick dispatches all four phases.
    clock.advance_ms(30);
    runtime.tick();

    let phases: Vec<HookEvent> = journal_entries(&events)
        .into_iter()
        .filter(|event| {
            matches!(
                event,
                HookEvent::PreUpdate(_)
                    | HookEvent::FixedUpdate(_)
                    | HookEvent::Update(_)
                    | HookEvent::PostUpdate(_)
            )
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            // First tick: activation applies at the tick boundary, then the
            // phases run; no virtual time has passed, so no fixed step.
            HookEvent::PreUpdate("W".into()),
            HookEvent::Update("W".into()),
            HookEvent::PostUpdate("W".into()),
            // Second tick: 30 ms elapsed covers one 25 ms fixed step.
            HookEvent::PreUpdate("W".into()),
            HookEvent::FixedUpdate("W".into()),
            HookEvent::Update("W".into()),
            HookEvent::PostUpdate("W".into()),
        ]
    );
}

#[test]
fn unloading_a_library_evicts_its_active_managers() {
    let (mut runtime, _clock, loader) = sim_runtime(uncapped());
    let events = journal();
    let library_id = Uuid::new_v4();
    let type_id = Uuid::new_v4();
    {
        let events = events.clone();
        loader.provide("core.so", move || {
            Box::new(
                SimModule::new(library_id, "Core")
                    .with_manager(RecordingManager::shared(type_id, "Window", "W", &events)),
            )
        });
    }
    runtime.load_library(Path::new("core.so")).unwrap();

    let manager = runtime
        .library(library_id)
        .unwrap()
        .find_manager_by_id(type_id)
        .unwrap();
    runtime.request_activate(manager).unwrap();
    runtime.tick();
    assert_eq!(runtime.coordinator().active_count(), 1);

    runtime.unload_library(library_id).unwrap();
    assert_eq!(runtime.coordinator().active_count(), 0);
    assert_eq!(runtime.library_count(), 0);
    assert_eq!(
        lifecycle_events(&events),
        vec![
            HookEvent::Init("W".into()),
            HookEvent::Activate {
                label: "W".into(),
                had_predecessor: false
            },
            HookEvent::Deactivate("W".into()),
            HookEvent::Deinit("W".into()),
        ]
    );
}

#[test]
fn load_unload_round_trip_restores_observable_state() {
    let (mut runtime, _clock, loader) = sim_runtime(uncapped());
    let library_id = Uuid::new_v4();
    let type_id = Uuid::new_v4();
    {
        let events = journal();
        loader.provide("core.so", move || {
            Box::new(
                SimModule::new(library_id, "Core")
                    .with_manager(RecordingManager::shared(type_id, "Window", "W", &events))
                    .with_property("core.title", PropertyValue::Str("selkie".into()), true),
            )
        });
    }

    assert_eq!(runtime.library_count(), 0);
    runtime.load_library(Path::new("core.so")).unwrap();
    assert_eq!(runtime.library_count(), 1);
    assert!(runtime.properties().contains("core.title"));

    runtime.unload_library(library_id).unwrap();
    assert_eq!(runtime.library_count(), 0);
    assert!(runtime.library(library_id).is_err());
    assert!(runtime.library_by_name("Core").is_err());
    assert!(!runtime.properties().contains("core.title"));
    assert!(runtime.active(type_id).is_err());

    // The same library loads again cleanly.
    runtime.load_library(Path::new("core.so")).unwrap();
    assert_eq!(runtime.library_count(), 1);
}

#[test]
fn duplicate_library_id_is_rejected_without_side_effects() {
    let (mut runtime, _clock, loader) = sim_runtime(uncapped());
    let library_id = Uuid::new_v4();
    loader.provide("core.so", move || {
        Box::new(SimModule::new(library_id, "Core"))
    });
    loader.provide("imposter.so", move || {
        Box::new(SimModule::new(library_id, "Imposter"))
    });

    runtime.load_library(Path::new("core.so")).unwrap();
    let err = runtime.load_library(Path::new("imposter.so")).unwrap_err();
    assert!(matches!(err, Error::LibraryIdConflict { .. }));
    assert_eq!(runtime.library_count(), 1);
}

#[test]
fn failed_library_setup_leaves_no_trace() {
    let (mut runtime, _clock, loader) = sim_runtime(uncapped());
    loader.provide("bad.so", || {
        Box::new(SimModule::new(Uuid::new_v4(), "Bad").with_failing_setup("setup exploded"))
    });

    assert!(runtime.load_library(Path::new("bad.so")).is_err());
    assert_eq!(runtime.library_count(), 0);
    assert!(runtime.library_by_name("Bad").is_err());
}

// =============================================================================
// Scheduler Scenarios
// =============================================================================

#[test]
fn pacing_holds_the_configured_update_rate() {
    let mut config = RuntimeConfig::default();
    config.update.update_rate_hz_max = 100;
    let (mut runtime, clock, loader) = sim_runtime(config);
    let library_id = Uuid::new_v4();
    loader.provide("core.so", move || {
        Box::new(SimModule::new(library_id, "Core"))
    });
    runtime.load_library(Path::new("core.so")).unwrap();

    runtime.tick();
    assert_eq!(clock.now_us(), 0);
    runtime.tick();
    assert_eq!(clock.now_us(), 10_000);
    runtime.tick();
    assert_eq!(clock.now_us(), 20_000);

    let stats = runtime.frame_stats();
    assert_eq!(stats.samples, 2);
    assert_eq!(stats.average.as_micros(), 10_000);
    assert_eq!(stats.min, stats.max);
}

#[test]
fn fixed_step_budget_bounds_catch_up_after_a_stall() {
    let mut config = RuntimeConfig::default();
    config.update.update_rate_hz_max = 0;
    config.update.fixed_rate_hz = 1_000;
    config.update.fixed_steps_budget_max = 8;
    config.update.fixed_steps_replenish_per_tick = 2;
    let (mut runtime, clock, loader) = sim_runtime(config);

    let library_id = Uuid::new_v4();
    loader.provide("core.so", move || {
        Box::new(SimModule::new(library_id, "Core"))
    });
    runtime.load_library(Path::new("core.so")).unwrap();

    let events = journal();
    let manager = RecordingManager::shared(Uuid::new_v4(), "Physics", "P", &events);
    runtime.register_manager(library_id, manager.clone()).unwrap();
    runtime.request_activate(manager).unwrap();

    runtime.tick(); // budget 2, no elapsed time
    assert_eq!(fixed_update_count(&events), 0);

    // Stall one full second: at 1 kHz that wants 1000 steps, but the
    // budget (2 + 2 replenished) bounds the tick to 4 coarser steps.
    clock.advance_ms(1_000);
    runtime.tick();
    assert_eq!(fixed_update_count(&events), 4);
    assert_eq!(runtime.scheduler().remaining_fixed_budget(), 0);
}

#[test]
fn fixed_step_budget_replenishes_up_to_the_cap() {
    let mut config = RuntimeConfig::default();
    config.update.update_rate_hz_max = 0;
    config.update.fixed_steps_budget_max = 8;
    config.update.fixed_steps_replenish_per_tick = 2;
    let (mut runtime, _clock, loader) = sim_runtime(config);
    let library_id = Uuid::new_v4();
    loader.provide("core.so", move || {
        Box::new(SimModule::new(library_id, "Core"))
    });
    runtime.load_library(Path::new("core.so")).unwrap();

    for _ in 0..10 {
        runtime.tick();
    }
    assert_eq!(runtime.scheduler().remaining_fixed_budget(), 8);
}

#[test]
fn fixed_steps_run_at_the_nominal_rate_in_steady_state() {
    let mut config = RuntimeConfig::default();
    config.update.update_rate_hz_max = 0;
    config.update.fixed_rate_hz = 40; // 25 ms steps
    let (mut runtime, clock, loader) = sim_runtime(config);
    let library_id = Uuid::new_v4();
    loader.provide("core.so", move || {
        Box::new(SimModule::new(library_id, "Core"))
    });
    runtime.load_library(Path::new("core.so")).unwrap();

    let events = journal();
    let manager = RecordingManager::shared(Uuid::new_v4(), "Physics", "P", &events);
    runtime.register_manager(library_id, manager.clone()).unwrap();
    runtime.request_activate(manager).unwrap();
    runtime.tick();

    // 100 ms of virtual time at 25 ms steps: four nominal iterations,
    // spread over ticks as the budget allows.
    for _ in 0..4 {
        clock.advance_ms(25);
        runtime.tick();
    }
    assert_eq!(fixed_update_count(&events), 4);
}

#[test]
fn update_rate_property_reconfigures_pacing_without_restart() {
    let (mut runtime, clock, loader) = sim_runtime(RuntimeConfig::default());
    let library_id = Uuid::new_v4();
    loader.provide("core.so", move || {
        Box::new(SimModule::new(library_id, "Core"))
    });
    runtime.load_library(Path::new("core.so")).unwrap();

    runtime.tick();
    runtime.tick();
    assert_eq!(clock.now_us(), 16_666); // default 60 Hz

    runtime
        .properties_mut()
        .set(PROPERTY_UPDATE_RATE_HZ_MAX, PropertyValue::Int(100))
        .unwrap();
    runtime.tick();
    assert_eq!(clock.now_us(), 26_666); // now paced at 10 ms
}

// =============================================================================
// Log Bootstrap Scenarios
// =============================================================================

fn provide_plain_library(loader: &SimLoader, path: &str, name: &'static str) -> Uuid {
    let id = Uuid::new_v4();
    loader.provide(path, move || Box::new(SimModule::new(id, name)));
    id
}

#[test]
fn early_logs_flush_when_a_logging_manager_activates() {
    let (mut runtime, _clock, loader) = sim_runtime(uncapped());
    let core = provide_plain_library(&loader, "core.so", "Core");
    let logging = provide_plain_library(&loader, "logging.so", "Logging");

    runtime.load_library(Path::new("core.so")).unwrap();
    let relay = runtime.library(core).unwrap().log().clone();
    relay.log(LogLevel::Info, "booting");
    relay.log(LogLevel::Warn, "no renderer yet");
    assert_eq!(relay.buffered_count(), 2);

    runtime.load_library(Path::new("logging.so")).unwrap();
    let (log_manager, records) = RecordingLog::shared();
    runtime.register_manager(logging, log_manager.clone()).unwrap();
    runtime.request_activate(log_manager).unwrap();
    runtime.tick();

    assert_eq!(relay.buffered_count(), 0);
    let captured = records.lock().unwrap();
    assert_eq!(captured.len(), 2);
    assert_eq!(captured[0].message, "booting");
    assert_eq!(captured[0].level, LogLevel::Info);
    assert_eq!(captured[1].message, "no renderer yet");
    drop(captured);

    // Subsequent records go straight through.
    relay.log(LogLevel::Info, "live now");
    assert_eq!(relay.buffered_count(), 0);
    assert_eq!(records.lock().unwrap().len(), 3);
}

#[test]
fn relay_rebinds_across_logging_manager_swaps() {
    let (mut runtime, _clock, loader) = sim_runtime(uncapped());
    let core = provide_plain_library(&loader, "core.so", "Core");
    let logging = provide_plain_library(&loader, "logging.so", "Logging");
    let logging2 = provide_plain_library(&loader, "logging2.so", "Logging2");

    runtime.load_library(Path::new("core.so")).unwrap();
    runtime.load_library(Path::new("logging.so")).unwrap();
    runtime.load_library(Path::new("logging2.so")).unwrap();
    let relay = runtime.library(core).unwrap().log().clone();

    let (first_log, first_records) = RecordingLog::shared();
    runtime.register_manager(logging, first_log.clone()).unwrap();
    runtime.request_activate(first_log.clone()).unwrap();
    runtime.tick();

    relay.log(LogLevel::Info, "through first");
    assert_eq!(first_records.lock().unwrap().len(), 1);

    // Hot-swap the logging implementation; the relay rebinds to the
    // replacement and later records land there.
    let (second_log, second_records) = RecordingLog::shared();
    runtime.register_manager(logging2, second_log.clone()).unwrap();
    runtime.request_activate(second_log.clone()).unwrap();
    runtime.tick();

    relay.log(LogLevel::Info, "through second");
    assert_eq!(first_records.lock().unwrap().len(), 1);
    assert_eq!(second_records.lock().unwrap().len(), 1);

    // Deactivating with no replacement resumes buffering.
    runtime.request_deactivate(LOG_MANAGER_ID).unwrap();
    runtime.tick();
    relay.log(LogLevel::Info, "buffered again");
    assert_eq!(relay.buffered_count(), 1);
}

#[test]
fn libraries_loaded_after_the_logger_bind_immediately() {
    let (mut runtime, _clock, loader) = sim_runtime(uncapped());
    let logging = provide_plain_library(&loader, "logging.so", "Logging");
    let late = provide_plain_library(&loader, "late.so", "Late");

    runtime.load_library(Path::new("logging.so")).unwrap();
    let (log_manager, records) = RecordingLog::shared();
    runtime.register_manager(logging, log_manager.clone()).unwrap();
    runtime.request_activate(log_manager).unwrap();
    runtime.tick();

    runtime.load_library(Path::new("late.so")).unwrap();
    let relay = runtime.library(late).unwrap().log().clone();
    relay.log(LogLevel::Info, "no buffering needed");
    assert_eq!(relay.buffered_count(), 0);
    assert_eq!(records.lock().unwrap().len(), 1);
}

// =============================================================================
// Cross-Thread Staging
// =============================================================================

#[test]
fn staging_from_a_worker_thread_lands_on_the_next_tick() {
    let (mut runtime, _clock, loader) = sim_runtime(uncapped());
    let library_id = Uuid::new_v4();
    loader.provide("core.so", move || {
        Box::new(SimModule::new(library_id, "Core"))
    });
    runtime.load_library(Path::new("core.so")).unwrap();

    let events = journal();
    let type_id = Uuid::new_v4();
    let manager = RecordingManager::shared(type_id, "Audio", "A", &events);
    runtime.register_manager(library_id, manager.clone()).unwrap();

    let coordinator = runtime.coordinator().clone();
    let worker: SharedManager = manager.clone();
    let staging = std::thread::spawn(move || coordinator.request_activate(worker));
    staging.join().unwrap().unwrap();

    assert!(runtime.active(type_id).is_err());
    runtime.tick();
    assert!(Arc::ptr_eq(&runtime.active(type_id).unwrap(), &manager));
}
