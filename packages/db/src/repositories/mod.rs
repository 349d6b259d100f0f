//! Repository implementations for database operations.

mod job_repo;
mod readiness_repo;

pub use job_repo::JobRepository;
pub use readiness_repo::ReadinessRepository;
