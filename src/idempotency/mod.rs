pub mod action_guard;
pub mod key_generator;
pub mod registry;

pub use action_guard::{ActionGuard, ActionPermit};
pub use key_generator::{DerivedKeys, IdempotencyKey, IdempotencyKeyGenerator, KeyGeneratorConfig};
pub use registry::{
    InFlightEntry, InFlightGuard, InFlightHandle, InFlightRegistry, Registration, RegistryConfig,
    RegistryStats, RegistryStatsSnapshot, RegistrySweepJob, ResultSlot,
};
