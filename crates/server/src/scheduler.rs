//! Background loops. One task drives both cadences: the recall sweep on its
//! configured interval, and a once-a-minute check that fires each tenant's
//! daily sweeps after its local `daily_sweep_time`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use frontdesk_core::domain::tenant::TenantId;

use crate::state::{AppState, SweepKind};
use crate::sweeps;

const DAILY_CHECK_SECS: u64 = 60;

pub async fn run(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let recall_secs = state.config.scheduler.recall_interval_minutes.max(1) * 60;
    let mut recall = interval(Duration::from_secs(recall_secs));
    recall.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut daily = interval(Duration::from_secs(DAILY_CHECK_SECS));
    daily.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Both intervals yield immediately once; consume that so no sweep runs
    // during startup.
    recall.tick().await;
    daily.tick().await;

    let mut last_daily_run: HashMap<TenantId, NaiveDate> = HashMap::new();
    info!(event_name = "scheduler_started", recall_interval_secs = recall_secs);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!(event_name = "scheduler_stopping");
                break;
            }
            _ = recall.tick() => {
                sweeps::run_sweep(&state, SweepKind::Recall).await;
            }
            _ = daily.tick() => {
                daily_pass(&state, &mut last_daily_run).await;
            }
        }
    }
}

/// Runs the daily sweeps for every tenant whose local clock has passed its
/// sweep time, at most once per tenant-local day.
async fn daily_pass(state: &AppState, last_run: &mut HashMap<TenantId, NaiveDate>) {
    let tenants = match state.tenants.list_active().await {
        Ok(tenants) => tenants,
        Err(error) => {
            warn!(event_name = "daily_tenant_list_failed", error = %error);
            return;
        }
    };
    for tenant in &tenants {
        let local_now = Utc::now().with_timezone(&tenant.timezone);
        let today = local_now.date_naive();
        if local_now.time() < tenant.daily_sweep_time {
            continue;
        }
        if last_run.get(&tenant.id) == Some(&today) {
            continue;
        }
        // Recorded up front: a failing sweep waits for the next day, not the
        // next minute.
        last_run.insert(tenant.id.clone(), today);

        debug!(event_name = "daily_sweeps_due", tenant = %tenant.slug, date = %today);
        for kind in [SweepKind::Confirmations, SweepKind::DueInvoices, SweepKind::Overdue] {
            sweeps::sweep_tenant(state, tenant, kind).await;
        }
    }
}
