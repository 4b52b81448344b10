//! Read-only access to the contact and tenant-settings collaborators.
//!
//! Nothing here is cached: consent and settings are re-read by every enqueue
//! and every worker run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use flock_common::error::AppError;
use flock_common::types::{Contact, TenantMessagingSettings};

#[async_trait]
pub trait Directory: Send + Sync {
    async fn tenant_settings(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<TenantMessagingSettings>, AppError>;

    /// Opted-in contacts of a tenant created in `[from, until)`.
    async fn consenting_contacts_created_between(
        &self,
        tenant_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Contact>, AppError>;

    /// Batched recipient lookup. Unknown ids are simply absent from the result.
    async fn contacts_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Contact>, AppError>;
}

#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Directory for PgDirectory {
    async fn tenant_settings(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<TenantMessagingSettings>, AppError> {
        let settings: Option<TenantMessagingSettings> = sqlx::query_as(
            r#"
            SELECT tenant_id, group_link, template_name, messaging_enabled
            FROM tenant_messaging_settings
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(settings)
    }

    async fn consenting_contacts_created_between(
        &self,
        tenant_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Contact>, AppError> {
        let contacts: Vec<Contact> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, name, phone, whatsapp_opt_in, created_at
            FROM contacts
            WHERE tenant_id = $1
              AND whatsapp_opt_in = true
              AND created_at >= $2
              AND created_at < $3
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id)
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        Ok(contacts)
    }

    async fn contacts_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Contact>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let contacts: Vec<Contact> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, name, phone, whatsapp_opt_in, created_at
            FROM contacts
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(contacts)
    }
}
