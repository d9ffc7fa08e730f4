pub mod client;
pub mod handlers;
pub mod requests;
pub mod responses;
pub mod routes;

pub use client::HttpSettlementGateway;
pub use routes::{create_router, AppState};
