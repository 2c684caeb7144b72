//! Crypto collaborators.
//!
//! Hashing and signature verification are external to the VM: operations see
//! only this trait. Digest output is copied into owned vectors before it is
//! returned, so no backend-internal buffer outlives a call.

use ripemd::Ripemd160;
use secp256k1::{ecdsa, schnorr, All, Message, PublicKey, Secp256k1};
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Hashing and signature-checking backend used by the VM.
pub trait VmCrypto: Send + Sync {
    fn sha1(&self, data: &[u8]) -> Vec<u8>;
    fn sha256(&self, data: &[u8]) -> Vec<u8>;
    fn ripemd160(&self, data: &[u8]) -> Vec<u8>;

    fn hash160(&self, data: &[u8]) -> Vec<u8> {
        self.ripemd160(&self.sha256(data))
    }

    fn hash256(&self, data: &[u8]) -> Vec<u8> {
        self.sha256(&self.sha256(data))
    }

    /// Verify a DER-encoded ECDSA signature over a 32-byte digest.
    fn verify_ecdsa(&self, signature_der: &[u8], public_key: &[u8], digest: &[u8; 32]) -> bool;

    /// Verify a 64-byte Schnorr signature over a 32-byte digest.
    fn verify_schnorr(&self, signature: &[u8], public_key: &[u8], digest: &[u8; 32]) -> bool;

    /// Whether `public_key` parses as a point on the curve.
    fn validate_public_key(&self, public_key: &[u8]) -> bool;
}

/// Default backend: RustCrypto digests plus libsecp256k1 bindings.
pub struct StandardCrypto {
    secp: Secp256k1<All>,
}

impl StandardCrypto {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
        }
    }
}

impl Default for StandardCrypto {
    fn default() -> Self {
        Self::new()
    }
}

impl VmCrypto for StandardCrypto {
    fn sha1(&self, data: &[u8]) -> Vec<u8> {
        Sha1::digest(data).to_vec()
    }

    fn sha256(&self, data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }

    fn ripemd160(&self, data: &[u8]) -> Vec<u8> {
        Ripemd160::digest(data).to_vec()
    }

    fn verify_ecdsa(&self, signature_der: &[u8], public_key: &[u8], digest: &[u8; 32]) -> bool {
        let Ok(signature) = ecdsa::Signature::from_der(signature_der) else {
            return false;
        };
        let Ok(public_key) = PublicKey::from_slice(public_key) else {
            return false;
        };
        let message = Message::from_digest(*digest);
        self.secp
            .verify_ecdsa(&message, &signature, &public_key)
            .is_ok()
    }

    fn verify_schnorr(&self, signature: &[u8], public_key: &[u8], digest: &[u8; 32]) -> bool {
        let Ok(signature) = schnorr::Signature::from_slice(signature) else {
            return false;
        };
        let Ok(public_key) = PublicKey::from_slice(public_key) else {
            return false;
        };
        let message = Message::from_digest(*digest);
        self.secp
            .verify_schnorr(&signature, &message, &public_key.x_only_public_key().0)
            .is_ok()
    }

    fn validate_public_key(&self, public_key: &[u8]) -> bool {
        PublicKey::from_slice(public_key).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The secp256k1 generator point, compressed.
    const GENERATOR: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    #[test]
    fn test_digest_lengths() {
        let crypto = StandardCrypto::new();
        assert_eq!(crypto.sha1(b"abc").len(), 20);
        assert_eq!(crypto.sha256(b"abc").len(), 32);
        assert_eq!(crypto.ripemd160(b"abc").len(), 20);
        assert_eq!(crypto.hash160(b"abc").len(), 20);
        assert_eq!(crypto.hash256(b"abc").len(), 32);
    }

    #[test]
    fn test_known_digests() {
        let crypto = StandardCrypto::new();
        assert_eq!(
            hex::encode(crypto.sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            hex::encode(crypto.ripemd160(b"abc")),
            "8eb208f7e05d987a9b044a8e98c6b087f15a0bfc"
        );
    }

    #[test]
    fn test_public_key_validation() {
        let crypto = StandardCrypto::new();
        assert!(crypto.validate_public_key(&hex::decode(GENERATOR).unwrap()));
        assert!(!crypto.validate_public_key(&[0x02; 33]));
        assert!(!crypto.validate_public_key(&[]));
    }

    #[test]
    fn test_bad_signatures_fail_closed() {
        let crypto = StandardCrypto::new();
        let public_key = hex::decode(GENERATOR).unwrap();
        let digest = [0x2a; 32];
        assert!(!crypto.verify_ecdsa(&[0x30, 0x00], &public_key, &digest));
        assert!(!crypto.verify_schnorr(&[0u8; 64], &public_key, &digest));
        assert!(!crypto.verify_schnorr(&[0u8; 63], &public_key, &digest));
    }
}
