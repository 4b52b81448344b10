//! Welcome-message enqueuer.
//!
//! Turns "contacts registered in this date range" into one pending dispatch
//! job per reachable, opted-in contact. Validation, scope and configuration
//! failures are reported before anything is written. The insert itself is a
//! single all-or-nothing batch.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use flock_common::error::AppError;
use flock_common::types::{
    CallerScope, Channel, DispatchMode, DispatchTarget, JobPayload, MessageSpec, NewJob,
    RenderMode, TenantMessagingSettings,
};

use crate::directory::Directory;
use crate::render::{normalize_phone, render_fallback_text};
use crate::store::JobStore;

/// Roles allowed to send notifications within their own tenant.
pub const SEND_ROLES: &[&str] = &["admin", "pastor", "secretary"];

/// Enqueue request as received from the API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnqueueRequest {
    pub tenant_id: Option<Uuid>,
    /// `YYYY-MM-DD`, inclusive
    pub date_from: String,
    /// `YYYY-MM-DD`, inclusive
    pub date_to: String,
    pub mode: Option<RenderMode>,
    pub dispatch_mode: Option<DispatchMode>,
    pub test_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueSummary {
    pub queued: u64,
    pub skipped_invalid_phone: u64,
    pub tenant_id: Uuid,
    pub mode: RenderMode,
    pub dispatch_mode: DispatchMode,
}

pub struct Enqueuer {
    store: Arc<dyn JobStore>,
    directory: Arc<dyn Directory>,
    template_language: String,
}

impl Enqueuer {
    pub fn new(
        store: Arc<dyn JobStore>,
        directory: Arc<dyn Directory>,
        template_language: impl Into<String>,
    ) -> Self {
        Self {
            store,
            directory,
            template_language: template_language.into(),
        }
    }

    pub async fn enqueue(
        &self,
        caller: &CallerScope,
        request: &EnqueueRequest,
    ) -> Result<EnqueueSummary, AppError> {
        self.enqueue_at(caller, request, Utc::now()).await
    }

    /// Same as [`Enqueuer::enqueue`] with an explicit creation time.
    pub async fn enqueue_at(
        &self,
        caller: &CallerScope,
        request: &EnqueueRequest,
        now: DateTime<Utc>,
    ) -> Result<EnqueueSummary, AppError> {
        if !caller.is_global_admin && !caller.has_any_role(SEND_ROLES) {
            return Err(AppError::Forbidden(
                "Caller is not allowed to send notifications".to_string(),
            ));
        }

        let (from, until) = parse_range(&request.date_from, &request.date_to)?;
        let dispatch = resolve_dispatch(request)?;
        let tenant_id = resolve_tenant(caller, request.tenant_id)?;

        let settings = self
            .directory
            .tenant_settings(tenant_id)
            .await?
            .filter(|s| s.messaging_enabled)
            .ok_or(AppError::MessagingDisabled(tenant_id))?;

        let mode = request.mode.unwrap_or_else(|| default_mode(&settings));

        let contacts = self
            .directory
            .consenting_contacts_created_between(tenant_id, from, until)
            .await?;

        let group_link = settings
            .group_link
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty());

        let mut jobs = Vec::with_capacity(contacts.len());
        let mut skipped_invalid_phone = 0u64;

        for contact in &contacts {
            let phone = normalize_phone(contact.phone.as_deref().unwrap_or_default());
            if phone.is_empty() {
                skipped_invalid_phone += 1;
                tracing::debug!(contact_id = %contact.id, "Skipping contact without a usable phone");
                continue;
            }

            let fallback_text = render_fallback_text(&contact.name, group_link);
            let message = self.message_spec(mode, &settings, &fallback_text);

            jobs.push(NewJob {
                id: Uuid::new_v4(),
                tenant_id,
                contact_id: contact.id,
                channel: Channel::Whatsapp,
                payload: JobPayload {
                    to: Some(phone),
                    name: contact.name.clone(),
                    group_link: group_link.map(str::to_string),
                    dispatch: dispatch.clone(),
                    message,
                    fallback_text,
                },
                scheduled_at: now,
            });
        }

        let queued = if jobs.is_empty() {
            0
        } else {
            self.store.insert_batch(&jobs).await?
        };

        tracing::info!(
            tenant_id = %tenant_id,
            user_id = %caller.user_id,
            queued,
            skipped_invalid_phone,
            mode = %mode,
            dispatch_mode = %dispatch.mode,
            "Welcome messages enqueued"
        );

        Ok(EnqueueSummary {
            queued,
            skipped_invalid_phone,
            tenant_id,
            mode,
            dispatch_mode: dispatch.mode,
        })
    }

    /// Template mode degrades to text when the tenant has no template configured.
    fn message_spec(
        &self,
        mode: RenderMode,
        settings: &TenantMessagingSettings,
        fallback_text: &str,
    ) -> MessageSpec {
        match (mode, configured_template(settings)) {
            (RenderMode::Template, Some(template_name)) => MessageSpec::Template {
                template_name: template_name.to_string(),
                language: self.template_language.clone(),
            },
            _ => MessageSpec::Text {
                body: fallback_text.to_string(),
            },
        }
    }
}

fn configured_template(settings: &TenantMessagingSettings) -> Option<&str> {
    settings
        .template_name
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn default_mode(settings: &TenantMessagingSettings) -> RenderMode {
    if configured_template(settings).is_some() {
        RenderMode::Template
    } else {
        RenderMode::Text
    }
}

/// Parse an inclusive calendar range into `[from 00:00, (to + 1 day) 00:00)` UTC.
fn parse_range(date_from: &str, date_to: &str) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    let parse = |field: &str, raw: &str| {
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
            AppError::InvalidRange(format!("{} '{}' is not a YYYY-MM-DD date", field, raw))
        })
    };

    let from = parse("date_from", date_from)?;
    let to = parse("date_to", date_to)?;

    if from > to {
        return Err(AppError::InvalidRange(format!(
            "date_from {} is after date_to {}",
            from, to
        )));
    }

    let until = to
        .checked_add_signed(Duration::days(1))
        .ok_or_else(|| AppError::InvalidRange(format!("date_to {} is out of range", to)))?;

    Ok((
        from.and_time(chrono::NaiveTime::MIN).and_utc(),
        until.and_time(chrono::NaiveTime::MIN).and_utc(),
    ))
}

fn resolve_dispatch(request: &EnqueueRequest) -> Result<DispatchTarget, AppError> {
    match request.dispatch_mode.unwrap_or_default() {
        DispatchMode::Production => Ok(DispatchTarget::production()),
        DispatchMode::Test => {
            let phone = normalize_phone(request.test_phone.as_deref().unwrap_or_default());
            if phone.is_empty() {
                return Err(AppError::MissingTestDestination);
            }
            Ok(DispatchTarget::test(phone))
        }
    }
}

fn resolve_tenant(caller: &CallerScope, requested: Option<Uuid>) -> Result<Uuid, AppError> {
    match (requested, caller.tenant_id) {
        (Some(tenant_id), _) if caller.is_global_admin => Ok(tenant_id),
        (Some(tenant_id), Some(own)) if tenant_id == own => Ok(tenant_id),
        (Some(tenant_id), _) => Err(AppError::ScopeViolation(format!(
            "Caller may not enqueue for tenant {}",
            tenant_id
        ))),
        (None, Some(own)) => Ok(own),
        (None, None) => Err(AppError::Validation("tenant_id is required".to_string())),
    }
}
