//! Welcome-message dispatch pipeline: enqueuer, job store, worker and retry
//! policy. The enqueuer and worker share nothing in memory; all coordination
//! goes through the persisted `dispatch_jobs` rows.

pub mod directory;
pub mod enqueuer;
pub mod lease;
pub mod render;
pub mod retry;
pub mod store;
pub mod worker;

#[cfg(test)]
mod testing;

pub use directory::{Directory, PgDirectory};
pub use enqueuer::{EnqueueRequest, EnqueueSummary, Enqueuer};
pub use store::{JobStore, PgJobStore};
pub use worker::{DispatchWorker, RunSummary};
