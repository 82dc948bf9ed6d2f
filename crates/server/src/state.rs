use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;

use frontdesk_agent::{ConversationDriver, EngagementFlow, RoutingEngine};
use frontdesk_core::config::AppConfig;
use frontdesk_core::domain::tenant::TenantId;
use frontdesk_db::{ContactRepository, DbPool, DirectoryRepository, TenantRepository};

/// Everything a request handler or sweep needs, built once at startup.
pub struct AppState {
    pub config: AppConfig,
    pub pool: DbPool,
    pub tenants: Arc<dyn TenantRepository>,
    pub directory: Arc<dyn DirectoryRepository>,
    pub contacts: Arc<dyn ContactRepository>,
    pub driver: Arc<ConversationDriver>,
    pub routing: RoutingEngine,
    pub engagement: EngagementFlow,
    pub sweep_guard: SweepGuard,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SweepKind {
    Recall,
    Confirmations,
    DueInvoices,
    Overdue,
}

impl SweepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recall => "recall",
            Self::Confirmations => "confirmations",
            Self::DueInvoices => "due-invoices",
            Self::Overdue => "overdue",
        }
    }
}

/// In-process overlap prevention: a sweep of one kind for one tenant does not
/// start while the previous one is still running. Shared between the
/// scheduler ticks and the ops trigger endpoints.
#[derive(Default)]
pub struct SweepGuard {
    running: Mutex<HashSet<(TenantId, SweepKind)>>,
}

impl SweepGuard {
    /// Marks the (tenant, kind) pair as running. `false` means a previous
    /// sweep still holds it.
    pub fn try_begin(&self, tenant_id: &TenantId, kind: SweepKind) -> bool {
        self.lock().insert((tenant_id.clone(), kind))
    }

    pub fn finish(&self, tenant_id: &TenantId, kind: SweepKind) {
        self.lock().remove(&(tenant_id.clone(), kind));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<(TenantId, SweepKind)>> {
        // A poisoned set still holds valid pairs.
        self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use frontdesk_core::domain::tenant::TenantId;

    use super::{SweepGuard, SweepKind};

    #[test]
    fn guard_blocks_a_second_sweep_of_the_same_kind_until_finish() {
        let guard = SweepGuard::default();
        let tenant = TenantId("t-1".to_string());

        assert!(guard.try_begin(&tenant, SweepKind::Recall));
        assert!(!guard.try_begin(&tenant, SweepKind::Recall));
        // A different kind and a different tenant are independent.
        assert!(guard.try_begin(&tenant, SweepKind::Overdue));
        assert!(guard.try_begin(&TenantId("t-2".to_string()), SweepKind::Recall));

        guard.finish(&tenant, SweepKind::Recall);
        assert!(guard.try_begin(&tenant, SweepKind::Recall));
    }
}
