//! Deterministic demo dataset: one fully configured tenant with an assistant
//! per purpose, transfer departments, two agendas, a media library, a staff
//! roster, and a billing account. Used by `frontdesk seed` and the
//! repository tests.

use sqlx::Executor;

use frontdesk_core::domain::assistant::AssistantId;
use frontdesk_core::domain::tenant::TenantId;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

pub const DEMO_SLUG: &str = "clinica-demo";
pub const DEMO_WEBHOOK_TOKEN: &str = "demo-webhook-token";

const DEMO_TENANT_ID: &str = "tn-demo-001";
const DEMO_RESPONDER_ID: &str = "as-demo-respond";
const DEMO_SCHEDULER_ID: &str = "as-demo-schedule";

const SEED_SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

/// Stable identifiers of the seeded rows, for callers that want to point at
/// the dataset without re-querying it.
#[derive(Clone, Debug)]
pub struct SeedSummary {
    pub tenant_id: TenantId,
    pub slug: &'static str,
    pub webhook_token: &'static str,
    pub responder_id: AssistantId,
    pub scheduler_id: AssistantId,
}

/// Loads the demo dataset. Idempotent: the SQL is all `INSERT OR IGNORE`, so
/// re-seeding an already seeded database changes nothing.
pub async fn seed_demo_tenant(pool: &DbPool) -> Result<SeedSummary, RepositoryError> {
    let mut tx = pool.begin().await?;
    tx.execute(SEED_SQL).await?;
    tx.commit().await?;

    Ok(SeedSummary {
        tenant_id: TenantId(DEMO_TENANT_ID.to_string()),
        slug: DEMO_SLUG,
        webhook_token: DEMO_WEBHOOK_TOKEN,
        responder_id: AssistantId(DEMO_RESPONDER_ID.to_string()),
        scheduler_id: AssistantId(DEMO_SCHEDULER_ID.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::seed_demo_tenant;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn seeding_twice_leaves_a_single_demo_tenant() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        seed_demo_tenant(&pool).await.expect("first seed");
        seed_demo_tenant(&pool).await.expect("second seed");

        let tenants = sqlx::query("SELECT COUNT(*) AS count FROM tenant")
            .fetch_one(&pool)
            .await
            .expect("count")
            .get::<i64, _>("count");
        assert_eq!(tenants, 1);

        let assistants = sqlx::query("SELECT COUNT(*) AS count FROM assistant")
            .fetch_one(&pool)
            .await
            .expect("count")
            .get::<i64, _>("count");
        assert_eq!(assistants, 6);

        pool.close().await;
    }
}
