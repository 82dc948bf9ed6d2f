use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use frontdesk_core::domain::assistant::AssistantId;
use frontdesk_core::domain::contact::{Contact, ContactId};
use frontdesk_core::domain::tenant::TenantId;
use frontdesk_core::recall::RecallCutoffs;

use super::{
    bool_column, column, format_timestamp, parse_timestamp, ContactRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlContactRepository {
    pool: DbPool,
}

impl SqlContactRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_contact(row: &SqliteRow) -> Result<Contact, RepositoryError> {
    let last_message_at = column::<Option<String>>(row, "last_message_at")?
        .map(|s| parse_timestamp("last_message_at", &s))
        .transpose()?;

    Ok(Contact {
        id: ContactId(column(row, "id")?),
        tenant_id: TenantId(column(row, "tenant_id")?),
        external_id: column(row, "external_id")?,
        display_name: column(row, "display_name")?,
        phone: column(row, "phone")?,
        thread_id: column(row, "thread_id")?,
        assistant_id: column::<Option<String>>(row, "assistant_id")?.map(AssistantId),
        last_message_at,
        recall_count: column::<i64>(row, "recall_count")?.max(0) as u32,
        pending_confirmation: bool_column(row, "pending_confirmation")?,
        awaiting_human: bool_column(row, "awaiting_human")?,
        ai_replies_enabled: bool_column(row, "ai_replies_enabled")?,
        crm_deal_id: column(row, "crm_deal_id")?,
        created_at: parse_timestamp("created_at", &column::<String>(row, "created_at")?)?,
        updated_at: parse_timestamp("updated_at", &column::<String>(row, "updated_at")?)?,
    })
}

#[async_trait::async_trait]
impl ContactRepository for SqlContactRepository {
    async fn find_by_external_id(
        &self,
        tenant_id: &TenantId,
        external_id: &str,
    ) -> Result<Option<Contact>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM contact WHERE tenant_id = ? AND external_id = ?")
            .bind(&tenant_id.0)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_contact(r)?)),
            None => Ok(None),
        }
    }

    async fn find_or_create(
        &self,
        tenant_id: &TenantId,
        external_id: &str,
        default_assistant: Option<&AssistantId>,
        now: DateTime<Utc>,
    ) -> Result<Contact, RepositoryError> {
        let now_str = format_timestamp(now);

        // Upsert so a repeat event only touches the message timestamp; the id
        // and the assistant assigned at creation survive the conflict.
        sqlx::query(
            "INSERT INTO contact (id, tenant_id, external_id, assistant_id, last_message_at,
                                  created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(tenant_id, external_id) DO UPDATE SET
                 last_message_at = excluded.last_message_at,
                 updated_at = excluded.updated_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&tenant_id.0)
        .bind(external_id)
        .bind(default_assistant.map(|a| a.0.clone()))
        .bind(&now_str)
        .bind(&now_str)
        .bind(&now_str)
        .execute(&self.pool)
        .await?;

        self.find_by_external_id(tenant_id, external_id).await?.ok_or_else(|| {
            RepositoryError::Decode(format!("contact `{external_id}` missing after upsert"))
        })
    }

    async fn list_recall_candidates(
        &self,
        tenant_id: &TenantId,
        cutoffs: RecallCutoffs,
        max_attempts: u32,
        skip_pending_confirmation: bool,
    ) -> Result<Vec<Contact>, RepositoryError> {
        if max_attempts == 0 {
            return Ok(Vec::new());
        }
        let final_attempt = i64::from(max_attempts) - 1;

        let rows: Vec<SqliteRow> = sqlx::query(
            "SELECT * FROM contact
             WHERE tenant_id = ?
               AND ai_replies_enabled = 1
               AND awaiting_human = 0
               AND last_message_at IS NOT NULL
               AND (? = 0 OR pending_confirmation = 0)
               AND ((recall_count < ? AND last_message_at <= ?)
                 OR (recall_count = ? AND last_message_at <= ?))
             ORDER BY last_message_at ASC",
        )
        .bind(&tenant_id.0)
        .bind(i64::from(skip_pending_confirmation))
        .bind(final_attempt)
        .bind(format_timestamp(cutoffs.standard))
        .bind(final_attempt)
        .bind(format_timestamp(cutoffs.r#final))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_contact).collect::<Result<Vec<_>, _>>()
    }

    async fn set_thread(
        &self,
        id: &ContactId,
        thread_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE contact SET thread_id = ?, updated_at = ? WHERE id = ?")
            .bind(thread_id)
            .bind(format_timestamp(now))
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_assistant(
        &self,
        id: &ContactId,
        assistant_id: &AssistantId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE contact SET assistant_id = ?, updated_at = ? WHERE id = ?")
            .bind(&assistant_id.0)
            .bind(format_timestamp(now))
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_awaiting_human(
        &self,
        id: &ContactId,
        awaiting: bool,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE contact SET awaiting_human = ?, updated_at = ? WHERE id = ?")
            .bind(i64::from(awaiting))
            .bind(format_timestamp(now))
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_pending_confirmation(
        &self,
        id: &ContactId,
        pending: bool,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE contact SET pending_confirmation = ?, updated_at = ? WHERE id = ?")
            .bind(i64::from(pending))
            .bind(format_timestamp(now))
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_profile(
        &self,
        id: &ContactId,
        display_name: Option<&str>,
        phone: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE contact
             SET display_name = COALESCE(?, display_name),
                 phone = COALESCE(?, phone),
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(display_name)
        .bind(phone)
        .bind(format_timestamp(now))
        .bind(&id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset(&self, id: &ContactId, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE contact
             SET thread_id = NULL,
                 assistant_id = NULL,
                 last_message_at = NULL,
                 recall_count = 0,
                 pending_confirmation = 0,
                 awaiting_human = 0,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(format_timestamp(now))
        .bind(&id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn increment_recall_guarded(
        &self,
        id: &ContactId,
        expected_thread_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        // `thread_id IS ?` matches NULL-to-NULL, unlike `=`.
        let result = sqlx::query(
            "UPDATE contact
             SET recall_count = recall_count + 1,
                 last_message_at = ?,
                 updated_at = ?
             WHERE id = ? AND thread_id IS ?",
        )
        .bind(format_timestamp(now))
        .bind(format_timestamp(now))
        .bind(&id.0)
        .bind(expected_thread_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use frontdesk_core::recall::{recall_cutoffs, RecallCutoffs};

    use super::SqlContactRepository;
    use crate::fixtures;
    use crate::repositories::ContactRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> (sqlx::SqlitePool, fixtures::SeedSummary) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let seeded = fixtures::seed_demo_tenant(&pool).await.expect("seed");
        (pool, seeded)
    }

    fn cutoffs_minutes(now: chrono::DateTime<Utc>, standard: i64, r#final: i64) -> RecallCutoffs {
        RecallCutoffs {
            standard: now - Duration::minutes(standard),
            r#final: now - Duration::minutes(r#final),
        }
    }

    #[tokio::test]
    async fn find_or_create_creates_then_touches() {
        let (pool, seeded) = setup().await;
        let repo = SqlContactRepository::new(pool);

        let first_seen = Utc::now() - Duration::minutes(10);
        let created = repo
            .find_or_create(
                &seeded.tenant_id,
                "5511999990000@c.us",
                Some(&seeded.responder_id),
                first_seen,
            )
            .await
            .expect("create");
        assert_eq!(created.assistant_id.as_ref(), Some(&seeded.responder_id));
        assert_eq!(created.last_message_at, Some(first_seen));
        assert_eq!(created.recall_count, 0);

        let later = Utc::now();
        let touched = repo
            .find_or_create(&seeded.tenant_id, "5511999990000@c.us", None, later)
            .await
            .expect("touch");
        assert_eq!(touched.id, created.id);
        assert_eq!(touched.last_message_at, Some(later));
        // The assistant assigned at creation survives the touch.
        assert_eq!(touched.assistant_id.as_ref(), Some(&seeded.responder_id));
    }

    #[tokio::test]
    async fn reset_clears_thread_counter_and_flags() {
        let (pool, seeded) = setup().await;
        let repo = SqlContactRepository::new(pool);
        let now = Utc::now();

        let contact = repo
            .find_or_create(&seeded.tenant_id, "551188887777", None, now)
            .await
            .expect("create");
        repo.set_thread(&contact.id, "thread_abc", now).await.expect("thread");
        repo.set_awaiting_human(&contact.id, true, now).await.expect("flag");
        repo.set_pending_confirmation(&contact.id, true, now).await.expect("flag");

        repo.reset(&contact.id, now).await.expect("reset");

        let after = repo
            .find_by_external_id(&seeded.tenant_id, "551188887777")
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(after.thread_id, None);
        assert_eq!(after.assistant_id, None);
        assert_eq!(after.last_message_at, None);
        assert_eq!(after.recall_count, 0);
        assert!(!after.pending_confirmation);
        assert!(!after.awaiting_human);
    }

    #[tokio::test]
    async fn guarded_increment_loses_to_a_concurrent_reset() {
        let (pool, seeded) = setup().await;
        let repo = SqlContactRepository::new(pool);
        let now = Utc::now();

        let contact = repo
            .find_or_create(&seeded.tenant_id, "551177776666", None, now)
            .await
            .expect("create");
        repo.set_thread(&contact.id, "thread_abc", now).await.expect("thread");

        // Sweep selected the contact with thread_abc; webhook resets first.
        repo.reset(&contact.id, now).await.expect("reset");
        let updated = repo
            .increment_recall_guarded(&contact.id, Some("thread_abc"), now)
            .await
            .expect("increment");
        assert!(!updated);

        let after = repo
            .find_by_external_id(&seeded.tenant_id, "551177776666")
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(after.recall_count, 0);
    }

    #[tokio::test]
    async fn guarded_increment_applies_while_the_thread_is_unchanged() {
        let (pool, seeded) = setup().await;
        let repo = SqlContactRepository::new(pool);
        let now = Utc::now();

        let contact = repo
            .find_or_create(&seeded.tenant_id, "551166665555", None, now - Duration::minutes(90))
            .await
            .expect("create");
        repo.set_thread(&contact.id, "thread_abc", now).await.expect("thread");

        let updated = repo
            .increment_recall_guarded(&contact.id, Some("thread_abc"), now)
            .await
            .expect("increment");
        assert!(updated);

        let after = repo
            .find_by_external_id(&seeded.tenant_id, "551166665555")
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(after.recall_count, 1);
        assert_eq!(after.thread_id.as_deref(), Some("thread_abc"));
        // The attempt refreshes the idle clock.
        assert_eq!(after.last_message_at, Some(now));
    }

    #[tokio::test]
    async fn recall_scan_applies_the_standard_and_final_windows() {
        let (pool, seeded) = setup().await;
        let repo = SqlContactRepository::new(pool.clone());
        let now = Utc::now();
        let cutoffs = cutoffs_minutes(now, 60, 1440);

        // Idle 61 minutes, zero attempts: standard window.
        let standard = repo
            .find_or_create(&seeded.tenant_id, "standard", None, now - Duration::minutes(61))
            .await
            .expect("create");
        // Idle 61 minutes but already on the final attempt: not yet.
        let waiting = repo
            .find_or_create(&seeded.tenant_id, "waiting", None, now - Duration::minutes(61))
            .await
            .expect("create");
        sqlx::query("UPDATE contact SET recall_count = 2 WHERE id = ?")
            .bind(&waiting.id.0)
            .execute(&pool)
            .await
            .expect("bump");
        // Idle past the final cutoff on the final attempt: final window.
        let r#final = repo
            .find_or_create(&seeded.tenant_id, "final", None, now - Duration::minutes(1441))
            .await
            .expect("create");
        sqlx::query("UPDATE contact SET recall_count = 2 WHERE id = ?")
            .bind(&r#final.id.0)
            .execute(&pool)
            .await
            .expect("bump");
        // Fresh contact: no window.
        repo.find_or_create(&seeded.tenant_id, "fresh", None, now).await.expect("create");

        let candidates = repo
            .list_recall_candidates(&seeded.tenant_id, cutoffs, 3, false)
            .await
            .expect("scan");
        let external_ids: Vec<&str> =
            candidates.iter().map(|c| c.external_id.as_str()).collect();
        assert_eq!(external_ids, vec!["final", "standard"]);
    }

    #[tokio::test]
    async fn recall_scan_respects_flags_and_the_pending_confirmation_toggle() {
        let (pool, seeded) = setup().await;
        let repo = SqlContactRepository::new(pool.clone());
        let now = Utc::now();
        let idle = now - Duration::minutes(61);
        let cutoffs = cutoffs_minutes(now, 60, 1440);

        let muted =
            repo.find_or_create(&seeded.tenant_id, "muted", None, idle).await.expect("create");
        sqlx::query("UPDATE contact SET ai_replies_enabled = 0 WHERE id = ?")
            .bind(&muted.id.0)
            .execute(&pool)
            .await
            .expect("mute");

        let waiting_human =
            repo.find_or_create(&seeded.tenant_id, "human", None, idle).await.expect("create");
        repo.set_awaiting_human(&waiting_human.id, true, now).await.expect("flag");

        let pending =
            repo.find_or_create(&seeded.tenant_id, "pending", None, idle).await.expect("create");
        repo.set_pending_confirmation(&pending.id, true, now).await.expect("flag");

        let lenient = repo
            .list_recall_candidates(&seeded.tenant_id, cutoffs, 3, false)
            .await
            .expect("scan");
        assert_eq!(lenient.len(), 1);
        assert_eq!(lenient[0].external_id, "pending");

        let strict = repo
            .list_recall_candidates(&seeded.tenant_id, cutoffs, 3, true)
            .await
            .expect("scan");
        assert!(strict.is_empty());
    }

    #[tokio::test]
    async fn recall_scan_with_zero_max_attempts_selects_nobody() {
        let (pool, seeded) = setup().await;
        let repo = SqlContactRepository::new(pool);
        let now = Utc::now();
        repo.find_or_create(&seeded.tenant_id, "idle", None, now - Duration::minutes(9999))
            .await
            .expect("create");

        let candidates = repo
            .list_recall_candidates(&seeded.tenant_id, cutoffs_minutes(now, 60, 1440), 0, false)
            .await
            .expect("scan");
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn update_profile_fills_only_the_provided_fields() {
        let (pool, seeded) = setup().await;
        let repo = SqlContactRepository::new(pool);
        let now = Utc::now();

        let contact =
            repo.find_or_create(&seeded.tenant_id, "profiled", None, now).await.expect("create");
        repo.update_profile(&contact.id, Some("Ana"), Some("5511999990000"), now)
            .await
            .expect("profile");
        repo.update_profile(&contact.id, None, Some("5511000000000"), now)
            .await
            .expect("partial");

        let after = repo
            .find_by_external_id(&seeded.tenant_id, "profiled")
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(after.display_name.as_deref(), Some("Ana"));
        assert_eq!(after.phone.as_deref(), Some("5511000000000"));
    }

    #[tokio::test]
    async fn cutoff_helper_matches_the_repository_windows() {
        // The scan binds the same instants `recall_cutoffs` computes.
        let now = Utc::now();
        let settings = frontdesk_core::domain::tenant::RecallSettings {
            enabled: true,
            timeout_minutes: Some(30),
            final_timeout_minutes: Some(720),
            max_attempts: 2,
            skips_pending_confirmation: false,
        };
        let cutoffs = recall_cutoffs(&settings, now);
        assert_eq!(cutoffs.standard, now - Duration::minutes(30));
        assert_eq!(cutoffs.r#final, now - Duration::minutes(720));
    }
}
