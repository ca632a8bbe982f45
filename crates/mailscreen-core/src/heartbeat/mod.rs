//! Worker heartbeats: liveness, failure counting, and stop requests.

mod model;
mod repository;

pub use model::{WorkerHeartbeat, worker_id};
pub use repository::HeartbeatRepository;
