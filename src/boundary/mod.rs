pub mod cosigner;
pub mod duplicate_guard;
pub mod forwarder;
pub mod gateway;

pub use cosigner::Ed25519CoSigner;
pub use duplicate_guard::{
    content_hash, DuplicateGuardConfig, DuplicateStore, GuardDecision, GuardReservation, RemoteDuplicateGuard,
};
pub use forwarder::{Forwarder, HttpForwarder};
pub use gateway::CosigningBoundary;
