use sqlx::sqlite::SqliteRow;

use frontdesk_core::domain::assistant::{Assistant, AssistantId, AssistantPurpose};
use frontdesk_core::domain::directory::{
    Agenda, BillingAccount, Department, Employee, MediaAsset, MediaKind,
};
use frontdesk_core::domain::tenant::TenantId;

use super::{bool_column, column, parse_timestamp, DirectoryRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDirectoryRepository {
    pool: DbPool,
}

impl SqlDirectoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_assistant(row: &SqliteRow) -> Result<Assistant, RepositoryError> {
    let purpose = AssistantPurpose::parse(&column::<String>(row, "purpose")?)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    Ok(Assistant {
        id: AssistantId(column(row, "id")?),
        tenant_id: TenantId(column(row, "tenant_id")?),
        external_id: column(row, "external_id")?,
        name: column(row, "name")?,
        purpose,
        shortcut: column(row, "shortcut")?,
        created_at: parse_timestamp("created_at", &column::<String>(row, "created_at")?)?,
    })
}

fn row_to_department(row: &SqliteRow) -> Result<Department, RepositoryError> {
    Ok(Department {
        id: column(row, "id")?,
        tenant_id: TenantId(column(row, "tenant_id")?),
        shortcut: column(row, "shortcut")?,
        external_department_id: column(row, "external_department_id")?,
        external_user_id: column(row, "external_user_id")?,
        transfer_comment: column(row, "transfer_comment")?,
        is_confirmation: bool_column(row, "is_confirmation")?,
    })
}

fn row_to_agenda(row: &SqliteRow) -> Result<Agenda, RepositoryError> {
    Ok(Agenda {
        id: column(row, "id")?,
        tenant_id: TenantId(column(row, "tenant_id")?),
        shortcut: column(row, "shortcut")?,
        address: column(row, "address")?,
    })
}

fn row_to_media(row: &SqliteRow) -> Result<MediaAsset, RepositoryError> {
    let kind = MediaKind::parse(&column::<String>(row, "kind")?)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    Ok(MediaAsset {
        id: column(row, "id")?,
        tenant_id: TenantId(column(row, "tenant_id")?),
        shortcut: column(row, "shortcut")?,
        kind,
        url: column(row, "url")?,
        caption: column(row, "caption")?,
    })
}

fn row_to_employee(row: &SqliteRow) -> Result<Employee, RepositoryError> {
    Ok(Employee {
        id: column(row, "id")?,
        tenant_id: TenantId(column(row, "tenant_id")?),
        name: column(row, "name")?,
        role: column(row, "role")?,
    })
}

fn row_to_billing_account(row: &SqliteRow) -> Result<BillingAccount, RepositoryError> {
    Ok(BillingAccount {
        id: column(row, "id")?,
        tenant_id: TenantId(column(row, "tenant_id")?),
        label: column(row, "label")?,
        api_key: column(row, "api_key")?,
        base_url: column(row, "base_url")?,
    })
}

#[async_trait::async_trait]
impl DirectoryRepository for SqlDirectoryRepository {
    async fn find_assistant(
        &self,
        id: &AssistantId,
    ) -> Result<Option<Assistant>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, external_id, name, purpose, shortcut, created_at
             FROM assistant WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_assistant(r)?)),
            None => Ok(None),
        }
    }

    async fn find_assistant_by_purpose(
        &self,
        tenant_id: &TenantId,
        purpose: AssistantPurpose,
    ) -> Result<Option<Assistant>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, external_id, name, purpose, shortcut, created_at
             FROM assistant WHERE tenant_id = ? AND purpose = ?
             ORDER BY created_at ASC LIMIT 1",
        )
        .bind(&tenant_id.0)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_assistant(r)?)),
            None => Ok(None),
        }
    }

    async fn find_assistant_by_shortcut(
        &self,
        tenant_id: &TenantId,
        shortcut: &str,
    ) -> Result<Option<Assistant>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, external_id, name, purpose, shortcut, created_at
             FROM assistant WHERE tenant_id = ? AND shortcut = ?",
        )
        .bind(&tenant_id.0)
        .bind(shortcut)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_assistant(r)?)),
            None => Ok(None),
        }
    }

    async fn find_department_by_shortcut(
        &self,
        tenant_id: &TenantId,
        shortcut: &str,
    ) -> Result<Option<Department>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, shortcut, external_department_id, external_user_id,
                    transfer_comment, is_confirmation
             FROM department WHERE tenant_id = ? AND shortcut = ?",
        )
        .bind(&tenant_id.0)
        .bind(shortcut)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_department(r)?)),
            None => Ok(None),
        }
    }

    async fn find_confirmation_department(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<Department>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, shortcut, external_department_id, external_user_id,
                    transfer_comment, is_confirmation
             FROM department WHERE tenant_id = ? AND is_confirmation = 1
             ORDER BY shortcut ASC LIMIT 1",
        )
        .bind(&tenant_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_department(r)?)),
            None => Ok(None),
        }
    }

    async fn find_agenda_by_shortcut(
        &self,
        tenant_id: &TenantId,
        shortcut: &str,
    ) -> Result<Option<Agenda>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, shortcut, address
             FROM agenda WHERE tenant_id = ? AND shortcut = ?",
        )
        .bind(&tenant_id.0)
        .bind(shortcut)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_agenda(r)?)),
            None => Ok(None),
        }
    }

    async fn list_agendas(&self, tenant_id: &TenantId) -> Result<Vec<Agenda>, RepositoryError> {
        let rows: Vec<SqliteRow> = sqlx::query(
            "SELECT id, tenant_id, shortcut, address
             FROM agenda WHERE tenant_id = ? ORDER BY shortcut ASC",
        )
        .bind(&tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_agenda).collect::<Result<Vec<_>, _>>()
    }

    async fn find_media_by_shortcut(
        &self,
        tenant_id: &TenantId,
        shortcut: &str,
    ) -> Result<Option<MediaAsset>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, shortcut, kind, url, caption
             FROM media_asset WHERE tenant_id = ? AND shortcut = ?",
        )
        .bind(&tenant_id.0)
        .bind(shortcut)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_media(r)?)),
            None => Ok(None),
        }
    }

    async fn list_employees(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<Employee>, RepositoryError> {
        let rows: Vec<SqliteRow> = sqlx::query(
            "SELECT id, tenant_id, name, role
             FROM employee WHERE tenant_id = ? ORDER BY name ASC",
        )
        .bind(&tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_employee).collect::<Result<Vec<_>, _>>()
    }

    async fn list_billing_accounts(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<BillingAccount>, RepositoryError> {
        let rows: Vec<SqliteRow> = sqlx::query(
            "SELECT id, tenant_id, label, api_key, base_url
             FROM billing_account WHERE tenant_id = ? ORDER BY label ASC",
        )
        .bind(&tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_billing_account).collect::<Result<Vec<_>, _>>()
    }
}

#[cfg(test)]
mod tests {
    use frontdesk_core::domain::assistant::AssistantPurpose;

    use super::SqlDirectoryRepository;
    use crate::fixtures;
    use crate::repositories::DirectoryRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> (sqlx::SqlitePool, fixtures::SeedSummary) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let seeded = fixtures::seed_demo_tenant(&pool).await.expect("seed");
        (pool, seeded)
    }

    #[tokio::test]
    async fn assistants_resolve_by_purpose_and_shortcut() {
        let (pool, seeded) = setup().await;
        let repo = SqlDirectoryRepository::new(pool);

        let responder = repo
            .find_assistant_by_purpose(&seeded.tenant_id, AssistantPurpose::Respond)
            .await
            .expect("lookup")
            .expect("responder seeded");
        assert_eq!(responder.purpose, AssistantPurpose::Respond);

        let by_shortcut = repo
            .find_assistant_by_shortcut(&seeded.tenant_id, "vendas")
            .await
            .expect("lookup")
            .expect("shortcut seeded");
        assert_eq!(by_shortcut.shortcut.as_deref(), Some("vendas"));

        let missing =
            repo.find_assistant_by_shortcut(&seeded.tenant_id, "sumiu").await.expect("lookup");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn confirmation_department_is_the_flagged_one() {
        let (pool, seeded) = setup().await;
        let repo = SqlDirectoryRepository::new(pool);

        let confirmation = repo
            .find_confirmation_department(&seeded.tenant_id)
            .await
            .expect("lookup")
            .expect("confirmation department seeded");
        assert!(confirmation.is_confirmation);
    }

    #[tokio::test]
    async fn directory_lookups_are_tenant_scoped() {
        let (pool, seeded) = setup().await;
        let repo = SqlDirectoryRepository::new(pool);

        let agendas = repo.list_agendas(&seeded.tenant_id).await.expect("list");
        assert!(!agendas.is_empty());

        let other = frontdesk_core::domain::tenant::TenantId("someone-else".to_string());
        assert!(repo.list_agendas(&other).await.expect("list").is_empty());
        assert!(repo.list_employees(&other).await.expect("list").is_empty());
        assert!(repo.list_billing_accounts(&other).await.expect("list").is_empty());
    }
}
