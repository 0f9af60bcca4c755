// Keys - Public keys, addresses and signature verification
use ed25519_dalek::{Signature as DalekSignature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use super::primitives::{Address, Hash};

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid public key")]
    InvalidPubkey,

    #[error("invalid signature encoding")]
    InvalidSignature,

    #[error("signature verification failed")]
    VerificationFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    /// Consensus signing key
    Ed25519,
    /// Cross-chain witness key, carried opaquely (bridge logic lives outside
    /// this engine)
    EcdsaSecp256k1,
}

/// An algorithm-tagged public key as it appears in genesis documents and
/// transaction payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    pub algorithm: Algorithm,
    #[serde(with = "hex_bytes")]
    pub bytes: Vec<u8>,
}

impl PublicKey {
    pub fn ed25519(bytes: [u8; 32]) -> Self {
        PublicKey {
            algorithm: Algorithm::Ed25519,
            bytes: bytes.to_vec(),
        }
    }

    pub fn ecdsa(bytes: Vec<u8>) -> Self {
        PublicKey {
            algorithm: Algorithm::EcdsaSecp256k1,
            bytes,
        }
    }

    /// Decode into a verifying key; fails for non-consensus algorithms or
    /// malformed key bytes
    pub fn verifying_key(&self) -> Result<VerifyingKey, KeyError> {
        match self.algorithm {
            Algorithm::Ed25519 => {
                let raw: [u8; 32] = self
                    .bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| KeyError::InvalidPubkey)?;
                VerifyingKey::from_bytes(&raw).map_err(|_| KeyError::InvalidPubkey)
            }
            Algorithm::EcdsaSecp256k1 => Err(KeyError::InvalidPubkey),
        }
    }

    /// Derive the 20-byte on-chain address: truncated Blake3 of the key bytes
    pub fn address(&self) -> Address {
        let digest = Hash::hash(&self.bytes);
        Address::from_slice(&digest.as_bytes()[..Address::LEN]).expect("digest longer than address")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "hex_bytes")] pub Vec<u8>);

/// One signer's public key plus their signature over the raw transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerSignature {
    pub signer: PublicKey,
    pub signature: Signature,
}

impl SignerSignature {
    /// Verify this signature over `message` and confirm the key decodes
    pub fn verify(&self, message: &[u8]) -> Result<(), KeyError> {
        let key = self.signer.verifying_key()?;
        let raw: [u8; 64] = self
            .signature
            .0
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSignature)?;
        let sig = DalekSignature::from_bytes(&raw);
        key.verify(message, &sig)
            .map_err(|_| KeyError::VerificationFailed)
    }
}

/// Verify that every declared signer has a valid signature over `message`.
/// Signature order does not have to match signer order.
pub fn verify_signers(
    message: &[u8],
    signers: &[Address],
    signatures: &[SignerSignature],
) -> Result<(), KeyError> {
    for signer in signers {
        let found = signatures
            .iter()
            .find(|ss| ss.signer.address() == *signer)
            .ok_or(KeyError::VerificationFailed)?;
        found.verify(message)?;
    }
    Ok(())
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    fn keypair() -> (SigningKey, PublicKey) {
        let sk = SigningKey::generate(&mut OsRng);
        let pk = PublicKey::ed25519(sk.verifying_key().to_bytes());
        (sk, pk)
    }

    #[test]
    fn verify_signers_accepts_valid_set() {
        let (sk_a, pk_a) = keypair();
        let (sk_b, pk_b) = keypair();
        let msg = b"payload";

        let sigs = vec![
            SignerSignature {
                signer: pk_b.clone(),
                signature: Signature(sk_b.sign(msg).to_bytes().to_vec()),
            },
            SignerSignature {
                signer: pk_a.clone(),
                signature: Signature(sk_a.sign(msg).to_bytes().to_vec()),
            },
        ];

        verify_signers(msg, &[pk_a.address(), pk_b.address()], &sigs).unwrap();
    }

    #[test]
    fn verify_signers_rejects_missing_signer() {
        let (sk_a, pk_a) = keypair();
        let (_, pk_b) = keypair();
        let msg = b"payload";

        let sigs = vec![SignerSignature {
            signer: pk_a.clone(),
            signature: Signature(sk_a.sign(msg).to_bytes().to_vec()),
        }];

        assert!(verify_signers(msg, &[pk_b.address()], &sigs).is_err());
    }

    #[test]
    fn tampered_message_fails() {
        let (sk, pk) = keypair();
        let sig = SignerSignature {
            signer: pk,
            signature: Signature(sk.sign(b"original").to_bytes().to_vec()),
        };
        assert!(sig.verify(b"tampered").is_err());
    }

    #[test]
    fn ecdsa_key_does_not_decode_as_consensus_key() {
        let pk = PublicKey::ecdsa(vec![2u8; 33]);
        assert!(pk.verifying_key().is_err());
    }
}
