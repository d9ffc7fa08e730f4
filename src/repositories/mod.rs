pub mod submission_repository;

pub use submission_repository::{MemorySubmissionStore, PostgresSubmissionStore, SubmissionStore};

use sqlx::PgPool;

/// Database connection pool type alias.
pub type DbPool = PgPool;
