use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

/// Dispatch job lifecycle status. `Sent` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Sent,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Sent | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Sent => write!(f, "sent"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Messaging channel served by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Whatsapp,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Whatsapp => write!(f, "whatsapp"),
        }
    }
}

/// Where a batch of messages is actually delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DispatchMode {
    /// Every send goes to a single override destination.
    #[serde(alias = "test")]
    Test,
    /// Every send goes to the contact's own destination.
    #[default]
    #[serde(alias = "production")]
    Production,
}

impl std::fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchMode::Test => write!(f, "TEST"),
            DispatchMode::Production => write!(f, "PRODUCTION"),
        }
    }
}

/// Shape of the outbound request chosen at enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    Template,
    Text,
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderMode::Template => write!(f, "template"),
            RenderMode::Text => write!(f, "text"),
        }
    }
}

/// Message body recorded on a job, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageSpec {
    Template {
        template_name: String,
        language: String,
    },
    Text {
        body: String,
    },
}

impl MessageSpec {
    pub fn mode(&self) -> RenderMode {
        match self {
            MessageSpec::Template { .. } => RenderMode::Template,
            MessageSpec::Text { .. } => RenderMode::Text,
        }
    }
}

/// Delivery-mode override carried by every job of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DispatchTarget {
    pub mode: DispatchMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_phone: Option<String>,
}

impl DispatchTarget {
    pub fn production() -> Self {
        Self::default()
    }

    pub fn test(phone: impl Into<String>) -> Self {
        Self {
            mode: DispatchMode::Test,
            test_phone: Some(phone.into()),
        }
    }

    /// The override destination, only when the batch runs in TEST mode.
    pub fn override_phone(&self) -> Option<&str> {
        match self.mode {
            DispatchMode::Test => self.test_phone.as_deref().filter(|p| !p.is_empty()),
            DispatchMode::Production => None,
        }
    }
}

/// Everything the worker needs to render and send one message.
///
/// Written once by the enqueuer; the job store never looks inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Normalized destination recorded at enqueue time
    #[serde(default)]
    pub to: Option<String>,
    /// Recipient display name
    pub name: String,
    /// Tenant group invite link, if configured
    #[serde(default)]
    pub group_link: Option<String>,
    #[serde(default)]
    pub dispatch: DispatchTarget,
    pub message: MessageSpec,
    /// Rendered body used for text mode
    pub fallback_text: String,
}

/// A persisted dispatch job.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub contact_id: Uuid,
    pub channel: Channel,
    pub status: JobStatus,
    pub payload: Json<JobPayload>,
    pub attempts: i32,
    pub scheduled_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub provider_message_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A job ready to be inserted at status `pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub contact_id: Uuid,
    pub channel: Channel,
    pub payload: JobPayload,
    pub scheduled_at: DateTime<Utc>,
}

/// A church contact, owned by the contact store.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Contact {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub whatsapp_opt_in: bool,
    pub created_at: DateTime<Utc>,
}

/// Per-tenant messaging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TenantMessagingSettings {
    pub tenant_id: Uuid,
    pub group_link: Option<String>,
    pub template_name: Option<String>,
    pub messaging_enabled: bool,
}

/// Authenticated caller as resolved by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerScope {
    pub user_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub roles: Vec<String>,
    pub is_global_admin: bool,
}

impl CallerScope {
    pub fn has_any_role(&self, allowed: &[&str]) -> bool {
        self.roles.iter().any(|r| allowed.contains(&r.as_str()))
    }
}
