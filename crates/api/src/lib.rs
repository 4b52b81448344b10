//! Flock dispatch HTTP surface.
//!
//! Endpoints:
//! - `POST /api/dispatch/welcome`: enqueue welcome messages (JWT caller)
//! - `POST /api/dispatch/worker/run`: process one batch (shared worker token)
//! - `GET /health`

pub mod middleware;
pub mod routes;
pub mod state;
