//! In-memory fakes of the store, directory and provider for unit tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use flock_common::error::AppError;
use flock_common::types::{
    CallerScope, Channel, Contact, DispatchTarget, Job, JobPayload, JobStatus, MessageSpec,
    NewJob, TenantMessagingSettings,
};
use flock_notifier::{ProviderClient, ProviderError, ProviderReceipt, ProviderRequest};

use crate::directory::Directory;
use crate::render::{normalize_phone, render_fallback_text};
use crate::store::JobStore;

pub fn caller_for(tenant_id: Uuid) -> CallerScope {
    CallerScope {
        user_id: Uuid::new_v4(),
        tenant_id: Some(tenant_id),
        roles: vec!["secretary".to_string()],
        is_global_admin: false,
    }
}

/// Opted-in contact registered mid-March 2026.
pub fn contact(tenant_id: Uuid, name: &str, phone: Option<&str>) -> Contact {
    Contact {
        id: Uuid::new_v4(),
        tenant_id,
        name: name.to_string(),
        phone: phone.map(str::to_string),
        whatsapp_opt_in: true,
        created_at: "2026-03-15T10:00:00Z".parse().unwrap(),
    }
}

/// Fresh text-mode job for a contact, due at `scheduled_at`.
pub fn pending_job(contact: &Contact, scheduled_at: DateTime<Utc>) -> Job {
    let fallback_text = render_fallback_text(&contact.name, None);
    Job {
        id: Uuid::new_v4(),
        tenant_id: contact.tenant_id,
        contact_id: contact.id,
        channel: Channel::Whatsapp,
        status: JobStatus::Pending,
        payload: Json(JobPayload {
            to: contact.phone.as_deref().map(normalize_phone),
            name: contact.name.clone(),
            group_link: None,
            dispatch: DispatchTarget::production(),
            message: MessageSpec::Text {
                body: fallback_text.clone(),
            },
            fallback_text,
        }),
        attempts: 0,
        scheduled_at,
        last_error: None,
        provider_message_id: None,
        sent_at: None,
        created_at: scheduled_at,
        updated_at: scheduled_at,
    }
}

fn unavailable() -> AppError {
    AppError::Database(sqlx::Error::PoolTimedOut)
}

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<Vec<Job>>,
    insert_calls: AtomicUsize,
    fail_inserts: AtomicBool,
    fail_selects: AtomicBool,
    fail_updates: Mutex<HashSet<Uuid>>,
}

impl InMemoryJobStore {
    pub fn push(&self, job: Job) {
        self.jobs.lock().unwrap().push(job);
    }

    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned()
    }

    pub fn all(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn fail_inserts(&self) {
        self.fail_inserts.store(true, Ordering::SeqCst);
    }

    pub fn fail_selects(&self) {
        self.fail_selects.store(true, Ordering::SeqCst);
    }

    pub fn fail_updates_for(&self, id: Uuid) {
        self.fail_updates.lock().unwrap().insert(id);
    }

    fn update_pending(&self, id: Uuid, apply: impl FnOnce(&mut Job)) -> Result<bool, AppError> {
        if self.fail_updates.lock().unwrap().contains(&id) {
            return Err(unavailable());
        }
        let mut jobs = self.jobs.lock().unwrap();
        match jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == JobStatus::Pending)
        {
            Some(job) => {
                apply(job);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert_batch(&self, jobs: &[NewJob]) -> Result<u64, AppError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(unavailable());
        }

        let mut stored = self.jobs.lock().unwrap();
        for job in jobs {
            stored.push(Job {
                id: job.id,
                tenant_id: job.tenant_id,
                contact_id: job.contact_id,
                channel: job.channel,
                status: JobStatus::Pending,
                payload: Json(job.payload.clone()),
                attempts: 0,
                scheduled_at: job.scheduled_at,
                last_error: None,
                provider_message_id: None,
                sent_at: None,
                created_at: job.scheduled_at,
                updated_at: job.scheduled_at,
            });
        }
        Ok(jobs.len() as u64)
    }

    async fn select_due_pending(
        &self,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Job>, AppError> {
        if self.fail_selects.load(Ordering::SeqCst) {
            return Err(unavailable());
        }

        let mut due: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.status == JobStatus::Pending && j.scheduled_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|j| (j.scheduled_at, j.created_at));
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn update_on_success(
        &self,
        id: Uuid,
        provider_message_id: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        self.update_pending(id, |job| {
            job.status = JobStatus::Sent;
            job.provider_message_id = Some(provider_message_id.to_string());
            job.last_error = None;
            job.sent_at = Some(sent_at);
            job.updated_at = sent_at;
        })
    }

    async fn update_on_failure(
        &self,
        id: Uuid,
        new_status: JobStatus,
        new_scheduled_at: DateTime<Utc>,
        error: &str,
    ) -> Result<bool, AppError> {
        self.update_pending(id, |job| {
            job.status = new_status;
            job.attempts += 1;
            job.scheduled_at = new_scheduled_at;
            job.last_error = Some(error.to_string());
        })
    }
}

#[derive(Default)]
pub struct InMemoryDirectory {
    settings: Mutex<Vec<TenantMessagingSettings>>,
    contacts: Mutex<Vec<Contact>>,
}

impl InMemoryDirectory {
    pub fn set_settings(&self, settings: TenantMessagingSettings) {
        let mut all = self.settings.lock().unwrap();
        all.retain(|s| s.tenant_id != settings.tenant_id);
        all.push(settings);
    }

    pub fn enable_messaging(
        &self,
        tenant_id: Uuid,
        template_name: Option<&str>,
        group_link: Option<&str>,
    ) {
        self.set_settings(TenantMessagingSettings {
            tenant_id,
            group_link: group_link.map(str::to_string),
            template_name: template_name.map(str::to_string),
            messaging_enabled: true,
        });
    }

    pub fn add_contact(&self, contact: Contact) {
        self.contacts.lock().unwrap().push(contact);
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn tenant_settings(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<TenantMessagingSettings>, AppError> {
        Ok(self
            .settings
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.tenant_id == tenant_id)
            .cloned())
    }

    async fn consenting_contacts_created_between(
        &self,
        tenant_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Contact>, AppError> {
        let mut contacts: Vec<Contact> = self
            .contacts
            .lock()
            .unwrap()
            .iter()
            .filter(|c| {
                c.tenant_id == tenant_id
                    && c.whatsapp_opt_in
                    && c.created_at >= from
                    && c.created_at < until
            })
            .cloned()
            .collect();
        contacts.sort_by_key(|c| c.created_at);
        Ok(contacts)
    }

    async fn contacts_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Contact>, AppError> {
        Ok(self
            .contacts
            .lock()
            .unwrap()
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect())
    }
}

/// Provider that records every request and fails on demand.
#[derive(Default)]
pub struct FakeProvider {
    requests: Mutex<Vec<ProviderRequest>>,
    failing: Mutex<HashSet<String>>,
    fail_all: AtomicBool,
    reject_templates: AtomicBool,
    fail_texts: AtomicBool,
}

impl FakeProvider {
    pub fn fail_for(&self, destination: &str) {
        self.failing.lock().unwrap().insert(destination.to_string());
    }

    pub fn fail_all(&self) {
        self.fail_all.store(true, Ordering::SeqCst);
    }

    /// Refuse every template request the way the Cloud API refuses an
    /// unknown template.
    pub fn reject_templates(&self) {
        self.reject_templates.store(true, Ordering::SeqCst);
    }

    pub fn fail_texts(&self) {
        self.fail_texts.store(true, Ordering::SeqCst);
    }

    pub fn succeed_all(&self) {
        self.fail_all.store(false, Ordering::SeqCst);
        self.reject_templates.store(false, Ordering::SeqCst);
        self.fail_texts.store(false, Ordering::SeqCst);
        self.failing.lock().unwrap().clear();
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderClient for FakeProvider {
    async fn send(&self, request: &ProviderRequest) -> Result<ProviderReceipt, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());

        if self.fail_all.load(Ordering::SeqCst)
            || self.failing.lock().unwrap().contains(request.to())
        {
            return Err(ProviderError::Rejected {
                status: 400,
                body: r#"{"error":{"message":"Recipient phone number not in allowed list"}}"#
                    .to_string(),
            });
        }

        let is_template = matches!(request, ProviderRequest::Template { .. });
        if is_template && self.reject_templates.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected {
                status: 400,
                body: r#"{"error":{"message":"(#132001) Template name does not exist in the translation","type":"OAuthException","code":132001}}"#
                    .to_string(),
            });
        }
        if !is_template && self.fail_texts.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected {
                status: 400,
                body: r#"{"error":{"message":"Message failed to send"}}"#.to_string(),
            });
        }

        Ok(ProviderReceipt {
            message_id: format!("wamid.{}", requests.len()),
        })
    }
}
