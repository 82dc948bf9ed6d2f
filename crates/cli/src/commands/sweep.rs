use frontdesk_core::config::{AppConfig, LoadOptions};
use frontdesk_server::state::SweepKind;
use frontdesk_server::{build_state, sweeps};

use crate::commands::{runtime, CommandResult};
use crate::SweepKindArg;

/// Runs one sweep pass in-process, the same function the server's scheduler
/// and `/jobs/*` endpoints call.
pub fn run(kind: SweepKindArg) -> CommandResult {
    let kind = match kind {
        SweepKindArg::Recall => SweepKind::Recall,
        SweepKindArg::Confirmations => SweepKind::Confirmations,
        SweepKindArg::DueInvoices => SweepKind::DueInvoices,
        SweepKindArg::Overdue => SweepKind::Overdue,
    };

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "sweep",
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
                "sweep",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let state = build_state(config)
            .await
            .map_err(|error| ("state_init", error.to_string(), 4u8))?;
        Ok::<_, (&'static str, String, u8)>(sweeps::run_sweep(&state, kind).await)
    });

    match result {
        Ok(stats) => CommandResult::success(
            "sweep",
            format!(
                "{} sweep finished: {} processed, {} failed, {} skipped",
                kind.as_str(),
                stats.processed,
                stats.failed,
                stats.skipped
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("sweep", error_class, message, exit_code)
        }
    }
}
