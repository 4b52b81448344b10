//! Dispatch worker.
//!
//! One run selects up to [`BATCH_SIZE`] due pending jobs (oldest first),
//! attempts delivery of each through the provider, and persists each job's
//! transition as soon as its own outcome is known. A failure on one job,
//! whether in delivery or persistence, never stops the rest of the batch.
//! Jobs not yet reached when a run is killed keep their previous state and
//! are picked up by the next run.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use flock_common::error::AppError;
use flock_common::types::{Contact, Job, JobPayload, MessageSpec};
use flock_notifier::{ProviderClient, ProviderReceipt, ProviderRequest};

use crate::directory::Directory;
use crate::render::normalize_phone;
use crate::retry::{Outcome, Transition, next_state};
use crate::store::JobStore;

/// Maximum jobs selected per run.
pub const BATCH_SIZE: i64 = 50;

/// Longest `last_error` stored on a job row.
const MAX_ERROR_LEN: usize = 2000;

/// Aggregate result of one worker run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Jobs selected this run
    pub processed: u64,
    /// Jobs the provider accepted this run
    pub sent: u64,
    /// Jobs whose attempt failed this run (now retrying or exhausted)
    pub failed: u64,
}

pub struct DispatchWorker {
    store: Arc<dyn JobStore>,
    directory: Arc<dyn Directory>,
    provider: Arc<dyn ProviderClient>,
    batch_size: i64,
}

impl DispatchWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        directory: Arc<dyn Directory>,
        provider: Arc<dyn ProviderClient>,
    ) -> Self {
        Self {
            store,
            directory,
            provider,
            batch_size: BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Process one batch of due jobs to completion.
    pub async fn run_batch(&self) -> Result<RunSummary, AppError> {
        self.run_batch_at(Utc::now()).await
    }

    /// Same as [`DispatchWorker::run_batch`], treating `now` as the current time.
    pub async fn run_batch_at(&self, now: DateTime<Utc>) -> Result<RunSummary, AppError> {
        let jobs = self.store.select_due_pending(self.batch_size, now).await?;
        if jobs.is_empty() {
            tracing::debug!("No due dispatch jobs");
            return Ok(RunSummary::default());
        }

        let mut contact_ids: Vec<Uuid> = jobs.iter().map(|j| j.contact_id).collect();
        contact_ids.sort_unstable();
        contact_ids.dedup();

        let recipients: HashMap<Uuid, Contact> = self
            .directory
            .contacts_by_ids(&contact_ids)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let mut summary = RunSummary {
            processed: jobs.len() as u64,
            ..Default::default()
        };

        for job in &jobs {
            let outcome = self.attempt(job, recipients.get(&job.contact_id)).await;
            let at = Utc::now().max(now);

            match outcome {
                Ok(receipt) => {
                    summary.sent += 1;
                    self.record_success(job, &receipt, at).await;
                }
                Err(error) => {
                    summary.failed += 1;
                    self.record_failure(job, &error, at).await;
                }
            }
        }

        tracing::info!(
            processed = summary.processed,
            sent = summary.sent,
            failed = summary.failed,
            "Dispatch batch finished"
        );

        Ok(summary)
    }

    /// One delivery attempt. Recipient checks fail without calling the provider.
    async fn attempt(
        &self,
        job: &Job,
        recipient: Option<&Contact>,
    ) -> Result<ProviderReceipt, String> {
        let contact = recipient
            .filter(|c| c.tenant_id == job.tenant_id)
            .ok_or_else(|| format!("recipient {} not found", job.contact_id))?;

        if !contact.whatsapp_opt_in {
            return Err(format!("recipient {} revoked consent", contact.id));
        }

        let to = resolve_destination(&job.payload, Some(contact))
            .ok_or_else(|| "no destination phone".to_string())?;

        let request = build_request(&job.payload, to);
        match self.provider.send(&request).await {
            Ok(receipt) => Ok(receipt),
            Err(e) if is_template(&request) && e.is_template_unsupported() => {
                tracing::warn!(
                    job_id = %job.id,
                    error = %e,
                    "Template refused by provider, sending fallback text"
                );
                let fallback = fallback_request(&job.payload, request.to().to_string());
                self.provider.send(&fallback).await.map_err(|e| e.to_string())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    async fn record_success(&self, job: &Job, receipt: &ProviderReceipt, at: DateTime<Utc>) {
        match self
            .store
            .update_on_success(job.id, &receipt.message_id, at)
            .await
        {
            Ok(true) => tracing::info!(
                job_id = %job.id,
                tenant_id = %job.tenant_id,
                provider_message_id = %receipt.message_id,
                "Dispatch job sent"
            ),
            Ok(false) => tracing::warn!(
                job_id = %job.id,
                "Dispatch job was no longer pending when marking sent"
            ),
            Err(e) => tracing::error!(
                job_id = %job.id,
                error = %e,
                "Failed to persist sent dispatch job"
            ),
        }
    }

    async fn record_failure(&self, job: &Job, error: &str, at: DateTime<Utc>) {
        let transition = next_state(job.attempts, Outcome::Failed, at);
        let (attempts, scheduled_at) = match transition {
            Transition::Retry {
                attempts,
                scheduled_at,
            }
            | Transition::Exhausted {
                attempts,
                scheduled_at,
            } => (attempts, scheduled_at),
            Transition::Sent => return,
        };

        let error = truncate_error(error);
        match self
            .store
            .update_on_failure(job.id, transition.status(), scheduled_at, &error)
            .await
        {
            Ok(true) => tracing::warn!(
                job_id = %job.id,
                tenant_id = %job.tenant_id,
                attempts,
                status = %transition.status(),
                retry_at = %scheduled_at,
                error = %error,
                "Dispatch attempt failed"
            ),
            Ok(false) => tracing::warn!(
                job_id = %job.id,
                "Dispatch job was no longer pending when recording failure"
            ),
            Err(e) => tracing::error!(
                job_id = %job.id,
                error = %e,
                "Failed to persist dispatch failure"
            ),
        }
    }
}

/// Destination for a job: TEST override, then the recorded destination, then
/// the contact's live phone.
pub fn resolve_destination(payload: &JobPayload, contact: Option<&Contact>) -> Option<String> {
    if let Some(phone) = payload.dispatch.override_phone() {
        return Some(phone.to_string());
    }

    payload
        .to
        .as_deref()
        .map(normalize_phone)
        .filter(|p| !p.is_empty())
        .or_else(|| {
            contact
                .and_then(|c| c.phone.as_deref())
                .map(normalize_phone)
                .filter(|p| !p.is_empty())
        })
}

/// Provider request for a job's recorded message shape.
///
/// Templates always take `[name, group_link]`; a job without a group link
/// goes out as its fallback text instead.
pub fn build_request(payload: &JobPayload, to: String) -> ProviderRequest {
    match &payload.message {
        MessageSpec::Template {
            template_name,
            language,
        } => match payload.group_link.as_deref().filter(|l| !l.is_empty()) {
            Some(link) => ProviderRequest::Template {
                to,
                template_name: template_name.clone(),
                language: language.clone(),
                parameters: vec![payload.name.clone(), link.to_string()],
            },
            None => fallback_request(payload, to),
        },
        MessageSpec::Text { body } => ProviderRequest::Text {
            to,
            body: body.clone(),
        },
    }
}

fn fallback_request(payload: &JobPayload, to: String) -> ProviderRequest {
    ProviderRequest::Text {
        to,
        body: payload.fallback_text.clone(),
    }
}

fn is_template(request: &ProviderRequest) -> bool {
    matches!(request, ProviderRequest::Template { .. })
}

fn truncate_error(error: &str) -> String {
    match error.char_indices().nth(MAX_ERROR_LEN) {
        Some((idx, _)) => format!("{}…", &error[..idx]),
        None => error.to_string(),
    }
}
