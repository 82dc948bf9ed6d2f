use crate::commands::{runtime, CommandResult};
use frontdesk_core::config::{AppConfig, LoadOptions};
use frontdesk_db::{connect_with_settings, fixtures, migrations};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        let summary = fixtures::seed_demo_tenant(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(summary)
    });

    match result {
        Ok(summary) => CommandResult::success(
            "seed",
            format!(
                "demo tenant `{}` seeded (webhook token `{}`); re-running changes nothing",
                summary.slug, summary.webhook_token
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
