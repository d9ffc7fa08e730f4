use async_trait::async_trait;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::error::{AppError, Result};
use crate::submission::{PayloadSigner, SigningError};

const SIGNATURE_LEN: usize = 64;

/// The boundary's half of the two-party ceremony. Output is the client's
/// signed payload followed by a detached ed25519 signature over it.
pub struct Ed25519CoSigner {
    signing_key: SigningKey,
}

impl Ed25519CoSigner {
    pub fn new(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }

    pub fn from_seed_hex(seed_hex: &str) -> Result<Self> {
        let bytes = hex::decode(seed_hex.trim())
            .map_err(|e| AppError::Validation(format!("cosigner seed is not hex: {}", e)))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AppError::Validation("cosigner seed must be 32 bytes".to_string()))?;
        Ok(Self::new(SigningKey::from_bytes(&seed)))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Splits a co-signed blob and checks the trailing signature.
    pub fn verify(key: &VerifyingKey, cosigned: &[u8]) -> bool {
        if cosigned.len() <= SIGNATURE_LEN {
            return false;
        }
        let (payload, sig) = cosigned.split_at(cosigned.len() - SIGNATURE_LEN);
        match Signature::from_slice(sig) {
            Ok(signature) => key.verify(payload, &signature).is_ok(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl PayloadSigner for Ed25519CoSigner {
    async fn sign(&self, payload: &[u8]) -> std::result::Result<Vec<u8>, SigningError> {
        if payload.is_empty() {
            return Err(SigningError::Rejected("empty payload".to_string()));
        }
        let signature = self.signing_key.sign(payload);

        let mut out = Vec::with_capacity(payload.len() + SIGNATURE_LEN);
        out.extend_from_slice(payload);
        out.extend_from_slice(&signature.to_bytes());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cosigned_payload_verifies() {
        let signer = Ed25519CoSigner::new(SigningKey::from_bytes(&[7u8; 32]));
        let cosigned = signer.sign(b"client-signed").await.unwrap();

        assert!(cosigned.starts_with(b"client-signed"));
        assert!(Ed25519CoSigner::verify(&signer.verifying_key(), &cosigned));

        let mut tampered = cosigned.clone();
        tampered[0] ^= 0xff;
        assert!(!Ed25519CoSigner::verify(&signer.verifying_key(), &tampered));
    }

    #[test]
    fn test_seed_must_be_32_bytes() {
        assert!(Ed25519CoSigner::from_seed_hex("abcd").is_err());
        assert!(Ed25519CoSigner::from_seed_hex(&"11".repeat(32)).is_ok());
    }
}
