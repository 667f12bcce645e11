//! Governor wired to a TOML file on disk: persisted manual pins, reload from
//! an edited file, environment overrides, and persistence failures.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use perfgov_core::{ConfigStore, GovernorError, ManualClock, OperationMode};
use perfgov_daemon::{Governor, GovernorBuilder, TomlConfigStore};

fn open(path: &Path, env: &[(&str, &str)]) -> Arc<TomlConfigStore> {
    let env = env
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()));
    Arc::new(TomlConfigStore::open(path, env).expect("store opens"))
}

fn governor(store: &Arc<TomlConfigStore>) -> Governor {
    GovernorBuilder::new(Arc::new(NoMetrics))
        .clock(Arc::new(ManualClock::starting_at(0)))
        .config_store(Arc::clone(store) as Arc<dyn ConfigStore>)
        .config_warnings(store.warnings())
        .build()
        .expect("governor builds")
}

struct NoMetrics;

impl perfgov_core::MetricsProvider for NoMetrics {
    fn current_rate(&self) -> perfgov_core::GovernorResult<f64> {
        Ok(20.0)
    }

    fn hardware_readings(&self) -> perfgov_core::GovernorResult<perfgov_core::HardwareStatus> {
        Ok(perfgov_core::HardwareStatus {
            free_process_memory_gb: 4.0,
            free_system_memory_gb: 8.0,
            available_cores: 4,
        })
    }
}

#[test]
fn manual_pin_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("perfgov.toml");
    fs::write(&path, "[decision]\nstability_threshold = 3\n").unwrap();

    let store = open(&path, &[]);
    let first = governor(&store);
    first.enable_manual_mode(OperationMode::Basic).unwrap();
    first.shutdown();

    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("stability_threshold = 3"), "{written}");
    assert!(written.contains("mode = \"basic\""), "{written}");

    let restarted = governor(&open(&path, &[]));
    assert_eq!(restarted.current_mode(), OperationMode::Basic);
    assert!(restarted.is_manual_mode_enabled());
    assert_eq!(restarted.config().decision.stability_threshold, 3);
}

#[test]
fn reload_reads_the_edited_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("perfgov.toml");
    fs::write(&path, "[decision]\ncooldown_ms = 60000\n").unwrap();
    let store = open(&path, &[]);
    let governor = governor(&store);

    fs::write(&path, "[decision]\ncooldown_ms = 5000\n").unwrap();
    governor.reload_configuration().unwrap();
    assert_eq!(governor.config().decision.cooldown_ms, 5_000);

    fs::write(&path, "[decision\ncooldown_ms = ").unwrap();
    let err = governor.reload_configuration().unwrap_err();
    assert!(matches!(err, GovernorError::InvalidConfig { .. }));
    assert_eq!(governor.config().decision.cooldown_ms, 5_000);
}

#[test]
fn environment_overrides_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("perfgov.toml");
    fs::write(&path, "[decision]\ncooldown_ms = 60000\nmystery = 1\n").unwrap();

    let store = open(
        &path,
        &[
            ("PERFGOV_DECISION_COOLDOWN_MS", "1234"),
            ("HOME", "/root"),
        ],
    );
    assert_eq!(store.env_keys_used(), vec!["PERFGOV_DECISION_COOLDOWN_MS"]);
    assert!(
        store
            .warnings()
            .iter()
            .any(|w| w.field == "decision.mystery")
    );

    let governor = governor(&store);
    assert_eq!(governor.config().decision.cooldown_ms, 1_234);
}

#[test]
fn persistence_failure_keeps_in_memory_pin() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, "").unwrap();
    let path = blocker.join("perfgov.toml");

    let store = open(&path, &[]);
    let governor = governor(&store);
    let transition = governor
        .enable_manual_mode(OperationMode::Emergency)
        .unwrap();
    assert!(transition.is_some());
    assert_eq!(governor.current_mode(), OperationMode::Emergency);
    assert!(governor.is_manual_mode_enabled());
    assert_eq!(governor.stats().persist_failures, 2);
}
