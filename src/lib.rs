pub mod api;
pub mod boundary;
pub mod cache;
pub mod config;
pub mod error;
pub mod idempotency;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod services;
pub mod submission;
