mod common;

use chrono::{Duration, TimeZone, Utc};
use rust_decimal_macros::dec;
use std::sync::{Arc, Barrier};
use std::thread;

use payment_guard::config::GuardSettings;
use payment_guard::idempotency::{
    ActionGuard, IdempotencyKeyGenerator, InFlightRegistry, KeyGeneratorConfig, Registration, RegistryConfig,
    ResultSlot,
};
use payment_guard::models::{Currency, PaymentOutcome, PaymentRequest};

fn registry(bucket_width_ms: i64, cooldown_secs: i64) -> InFlightRegistry {
    InFlightRegistry::new(RegistryConfig {
        keys: KeyGeneratorConfig {
            bucket_width_ms,
            key_prefix: "idem".to_string(),
        },
        cooldown: Duration::seconds(cooldown_secs),
    })
}

#[test]
fn test_equivalent_amounts_share_a_key() {
    let generator = IdempotencyKeyGenerator::with_default_config();
    let at = Utc::now();

    let plain = PaymentRequest::new("alice", "bob", dec!(10), Currency::USD);
    let padded = PaymentRequest::new(" alice ", "bob", dec!(10.000), Currency::USD);
    let other = PaymentRequest::new("alice", "bob", dec!(10.01), Currency::USD);

    assert_eq!(generator.derive_at(&plain, at), generator.derive_at(&padded, at));
    assert_ne!(generator.derive_at(&plain, at).current, generator.derive_at(&other, at).current);
}

#[test]
fn test_requests_straddling_a_bucket_edge_collide() {
    let reg = registry(10_000, 60);
    let before_edge = Utc.timestamp_millis_opt(1_700_000_009_999).unwrap();
    let after_edge = before_edge + Duration::milliseconds(2);

    let first = reg.check_and_register_at(&common::payment(), before_edge);
    let second = reg.check_and_register_at(&common::payment(), after_edge);

    assert!(!first.is_already_in_flight());
    assert!(second.is_already_in_flight());
    assert_eq!(first.key(), second.key());
}

#[test]
fn test_previous_bucket_key_matches_neighbour_current_key() {
    let generator = IdempotencyKeyGenerator::with_default_config();
    let at = Utc.timestamp_millis_opt(1_700_000_015_000).unwrap();
    let earlier = at - Duration::milliseconds(10_000);

    let now_keys = generator.derive_at(&common::payment(), at);
    let earlier_keys = generator.derive_at(&common::payment(), earlier);

    assert_eq!(now_keys.previous, earlier_keys.current);
    assert_eq!(now_keys.bucket, earlier_keys.bucket + 1);
}

#[test]
fn test_concurrent_registration_yields_one_owner() {
    let reg = registry(60_000, 60);
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let reg = reg.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                reg.check_and_register(&common::payment())
            })
        })
        .collect();

    let registrations: Vec<Registration> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let owners = registrations
        .iter()
        .filter(|r| !r.is_already_in_flight())
        .count();

    assert_eq!(owners, 1);
    assert_eq!(reg.len(), 1);
    assert_eq!(reg.stats().hits, 15);
}

#[tokio::test]
async fn test_waiters_all_receive_the_owner_outcome() {
    let reg = registry(60_000, 60);
    let Registration::Owner(guard) = reg.check_and_register(&common::payment()) else {
        panic!("expected owner");
    };

    let waiters: Vec<_> = (0..5)
        .map(|_| match reg.check_and_register(&common::payment()) {
            Registration::InFlight(handle) => tokio::spawn(handle.wait()),
            Registration::Owner(_) => panic!("expected in-flight"),
        })
        .collect();

    let outcome = PaymentOutcome::Confirmed {
        signature: "sig-shared".to_string(),
        attempts: 1,
    };
    guard.resolve(outcome.clone()).unwrap();

    for waiter in waiters {
        assert_eq!(waiter.await.unwrap(), outcome);
    }
    assert!(reg.is_empty());
}

#[test]
fn test_failed_entry_blocks_resubmission_for_full_cooldown() {
    let reg = InFlightRegistry::from_settings(&GuardSettings::default());
    let t0 = Utc::now();
    let Registration::Owner(guard) = reg.check_and_register_at(&common::payment(), t0) else {
        panic!("expected owner");
    };
    let key = guard.key().clone();
    guard
        .resolve(PaymentOutcome::TransientFailure {
            reason: "request timed out".to_string(),
        })
        .unwrap();

    for offset in [5, 15, 25, 30, 45, 55] {
        let Registration::InFlight(handle) = reg.check_and_register_at(&common::payment(), t0 + Duration::seconds(offset))
        else {
            panic!("retry at +{}s must still be blocked", offset);
        };
        assert_eq!(handle.key(), &key);
        assert!(matches!(handle.peek(), ResultSlot::Failed(PaymentOutcome::TransientFailure { .. })));
    }

    let after_cooldown = reg.check_and_register_at(&common::payment(), t0 + Duration::seconds(65));
    assert!(!after_cooldown.is_already_in_flight());
    assert_ne!(after_cooldown.key(), &key);
}

#[test]
fn test_expired_failure_is_swept() {
    let reg = registry(10_000, 60);
    let Registration::Owner(guard) = reg.check_and_register(&common::payment()) else {
        panic!("expected owner");
    };
    let key = guard.key().clone();
    guard
        .resolve(PaymentOutcome::FatalFailure {
            reason: "insufficient funds".to_string(),
        })
        .unwrap();

    let expires_at = reg.entry(&key).and_then(|e| e.expires_at).expect("cooldown set");
    assert_eq!(reg.sweep_expired_at(expires_at + Duration::seconds(1)), 1);
    assert!(!reg.check_and_register(&common::payment()).is_already_in_flight());
}

#[test]
fn test_duplicate_rejection_clears_entry() {
    let reg = registry(60_000, 60);
    let Registration::Owner(guard) = reg.check_and_register(&common::payment()) else {
        panic!("expected owner");
    };
    guard
        .resolve(PaymentOutcome::DuplicateRejected {
            reason: "seen recently".to_string(),
        })
        .unwrap();

    assert!(reg.is_empty());
}

#[test]
fn test_double_tap_is_collapsed_by_action_guard() {
    let guard = ActionGuard::new(std::time::Duration::from_millis(500));

    let first = guard.permit("send-payment");
    let second = guard.permit("send-payment");

    assert!(first.is_some());
    assert!(second.is_none());

    drop(first);
    assert!(!guard.try_acquire("send-payment"), "interval still applies after release");
}
