use std::env;
use std::sync::{Mutex, OnceLock};

use frontdesk_cli::commands::{migrate, seed, sweep};
use frontdesk_cli::SweepKindArg;
use serde_json::Value;

// One connection so every statement sees the same in-memory database.
const MEMORY_DB: &[(&str, &str)] =
    &[("FRONTDESK_DATABASE_URL", "sqlite::memory:"), ("FRONTDESK_DATABASE_MAX_CONNECTIONS", "1")];

#[test]
fn migrate_returns_success_against_a_memory_database() {
    with_env(MEMORY_DB, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn seed_loads_the_demo_tenant() {
    with_env(MEMORY_DB, || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected successful seed run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");
        assert!(
            payload["message"].as_str().unwrap_or_default().contains("clinica-demo"),
            "seed message should name the demo tenant"
        );
    });
}

#[test]
fn sweep_on_an_empty_database_does_nothing() {
    with_env(MEMORY_DB, || {
        let result = sweep::run(SweepKindArg::Recall);
        assert_eq!(result.exit_code, 0, "expected successful sweep run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "sweep");
        assert_eq!(payload["status"], "ok");
        assert!(
            payload["message"].as_str().unwrap_or_default().contains("0 processed"),
            "no tenants means no work"
        );
    });
}

#[test]
fn migrate_reports_config_failure_on_invalid_override() {
    with_env(&[("FRONTDESK_DATABASE_MAX_CONNECTIONS", "not-a-number")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be JSON")
}

/// Commands read process environment; serialize the tests that mutate it.
fn with_env(vars: &[(&str, &str)], run: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap();

    const MANAGED: &[&str] = &[
        "FRONTDESK_CONFIG",
        "FRONTDESK_DATABASE_URL",
        "FRONTDESK_DATABASE_MAX_CONNECTIONS",
        "FRONTDESK_DATABASE_TIMEOUT_SECS",
    ];
    let saved: Vec<(&str, Option<String>)> =
        MANAGED.iter().map(|key| (*key, env::var(key).ok())).collect();
    for key in MANAGED {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    run();

    for (key, value) in saved {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }
}
