use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::config::GuardSettings;
use crate::models::PaymentRequest;

/// Configuration for idempotency key derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyGeneratorConfig {
    /// Width W of a time bucket in milliseconds.
    pub bucket_width_ms: i64,
    /// Prefix for generated keys
    pub key_prefix: String,
}

impl Default for KeyGeneratorConfig {
    fn default() -> Self {
        Self {
            bucket_width_ms: 10_000,
            key_prefix: "idem".to_string(),
        }
    }
}

impl From<&GuardSettings> for KeyGeneratorConfig {
    fn from(settings: &GuardSettings) -> Self {
        Self {
            bucket_width_ms: settings.dedup_window_ms.max(1),
            key_prefix: settings.key_prefix.clone(),
        }
    }
}

/// Identifier grouping requests that count as "the same logical action".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keys for the bucket containing an instant and the bucket before it.
///
/// Derived once per request and threaded through the pipeline; nothing
/// downstream recomputes a key from the clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKeys {
    pub current: IdempotencyKey,
    pub previous: IdempotencyKey,
    pub bucket: i64,
}

impl DerivedKeys {
    /// Both windows, newest first.
    pub fn candidates(&self) -> [&IdempotencyKey; 2] {
        [&self.current, &self.previous]
    }
}

/// Generator for idempotency keys using SHA-256 hashing.
#[derive(Debug, Clone)]
pub struct IdempotencyKeyGenerator {
    config: KeyGeneratorConfig,
}

impl IdempotencyKeyGenerator {
    pub fn new(config: KeyGeneratorConfig) -> Self {
        Self { config }
    }

    pub fn with_default_config() -> Self {
        Self::new(KeyGeneratorConfig::default())
    }

    pub fn bucket_width_ms(&self) -> i64 {
        self.config.bucket_width_ms
    }

    /// Derives current- and previous-bucket keys at `timestamp`.
    pub fn derive_at(&self, request: &PaymentRequest, timestamp: DateTime<Utc>) -> DerivedKeys {
        let bucket = self.bucket_of(timestamp);
        DerivedKeys {
            current: self.key_for_bucket(request, bucket),
            previous: self.key_for_bucket(request, bucket - 1),
            bucket,
        }
    }

    /// Key for one specific bucket index.
    pub fn key_for_bucket(&self, request: &PaymentRequest, bucket: i64) -> IdempotencyKey {
        self.digest(request, Some(bucket))
    }

    /// Bucket-less key for the payment content. Used to hold a failed
    /// payment for its whole cooldown regardless of bucket width.
    pub fn content_key(&self, request: &PaymentRequest) -> IdempotencyKey {
        self.digest(request, None)
    }

    fn digest(&self, request: &PaymentRequest, bucket: Option<i64>) -> IdempotencyKey {
        let normalized = request.normalized();
        let mut hasher = Sha256::new();

        hasher.update(b"snd:");
        hasher.update(normalized.sender_id.as_bytes());
        hasher.update(b"|rcp:");
        hasher.update(normalized.recipient_id.as_bytes());
        hasher.update(b"|amt:");
        hasher.update(normalized.amount.to_string().as_bytes());
        hasher.update(b"|cur:");
        hasher.update(normalized.currency.code().as_bytes());
        if let Some(bucket) = bucket {
            hasher.update(b"|tw:");
            hasher.update(bucket.to_string().as_bytes());
        }

        let hash_hex = hex::encode(hasher.finalize());
        IdempotencyKey(format!("{}_{}", self.config.key_prefix, hash_hex))
    }

    /// Bucket index of a timestamp; floors toward negative infinity.
    pub fn bucket_of(&self, timestamp: DateTime<Utc>) -> i64 {
        timestamp
            .timestamp_millis()
            .div_euclid(self.config.bucket_width_ms)
    }
}
