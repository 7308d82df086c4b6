//! Crypto primitives adapter.
//!
//! Pure functions only: no peer state, no I/O. Everything else in this
//! crate reaches cryptography through this module so the adapter can be
//! swapped (e.g. for a hardware-backed AES-SIV engine) without touching
//! the key schedule or the AMPE codec.

use aes_siv::aead::{Aead, KeyInit, Payload};
use aes_siv::Aes128SivAead;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::error::{MeshError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Fill `out` with cryptographically secure random bytes.
pub fn rand_bytes(out: &mut [u8]) {
    OsRng.fill_bytes(out);
}

/// 802.11-style counter-mode PRF (12.7.1.2), generalized to HMAC-SHA256:
/// `output = HMAC-SHA256(key, label || 0x00 || context || counter) || ...`
/// truncated to `out_len` bytes. Each 32-byte block uses an incrementing
/// one-byte counter, matching the construction used for both AEK and MTK
/// derivation.
pub fn sha256_prf(key: &[u8], label: &str, context: &[u8], out_len: usize) -> Vec<u8> {
    const BLOCK_LEN: usize = 32;
    let mut out = Vec::with_capacity(out_len);
    let mut counter: u8 = 0;

    while out.len() < out_len {
        let mut mac =
            <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts keys of any length");
        mac.update(label.as_bytes());
        mac.update(&[0x00]);
        mac.update(context);
        mac.update(&[counter]);
        let block = mac.finalize().into_bytes();

        let take = BLOCK_LEN.min(out_len - out.len());
        out.extend_from_slice(&block[..take]);
        counter = counter.wrapping_add(1);
    }

    out
}

/// AES-SIV encrypt. `aad` components are concatenated in order before
/// being bound into the synthetic IV. `key` must be 32 bytes
/// (two 128-bit AES-SIV subkeys). Returns `len(plaintext) + 16` bytes:
/// 16-byte synthetic IV followed by the ciphertext.
pub fn aes_siv_encrypt(key: &[u8], plaintext: &[u8], aad: &[&[u8]]) -> Result<Vec<u8>> {
    let cipher = build_cipher(key)?;
    let associated_data = concat_aad(aad);
    let nonce = Default::default();
    cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad: &associated_data,
            },
        )
        .map_err(|_| MeshError::CryptoAuthFail)
}

/// AES-SIV decrypt + verify. Returns `MeshError::CryptoAuthFail` on tag
/// mismatch or any AAD byte having changed since encryption.
pub fn aes_siv_decrypt(key: &[u8], ciphertext: &[u8], aad: &[&[u8]]) -> Result<Vec<u8>> {
    let cipher = build_cipher(key)?;
    let associated_data = concat_aad(aad);
    let nonce = Default::default();
    cipher
        .decrypt(
            &nonce,
            Payload {
                msg: ciphertext,
                aad: &associated_data,
            },
        )
        .map_err(|_| MeshError::CryptoAuthFail)
}

fn build_cipher(key: &[u8]) -> Result<Aes128SivAead> {
    Aes128SivAead::new_from_slice(key)
        .map_err(|_| MeshError::PolicyMismatch("AES-SIV key must be 32 bytes".into()))
}

fn concat_aad(aad: &[&[u8]]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(aad.iter().map(|a| a.len()).sum());
    for component in aad {
        buf.extend_from_slice(component);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        let mut k = [0u8; 32];
        rand_bytes(&mut k);
        k
    }

    #[test]
    fn prf_is_deterministic_and_respects_length() {
        let out1 = sha256_prf(b"pmk-material", "AEK Derivation", b"context", 16);
        let out2 = sha256_prf(b"pmk-material", "AEK Derivation", b"context", 16);
        assert_eq!(out1, out2);
        assert_eq!(out1.len(), 16);
    }

    #[test]
    fn prf_output_differs_for_different_labels() {
        let a = sha256_prf(b"pmk", "AEK Derivation", b"ctx", 16);
        let b = sha256_prf(b"pmk", "Temporal Key Derivation", b"ctx", 16);
        assert_ne!(a, b);
    }

    #[test]
    fn siv_round_trips() {
        let key = test_key();
        let aad: [&[u8]; 3] = [b"local", b"peer", b"frame-bytes"];
        let ct = aes_siv_encrypt(&key, b"hello mesh", &aad).unwrap();
        assert_eq!(ct.len(), "hello mesh".len() + 16);
        let pt = aes_siv_decrypt(&key, &ct, &aad).unwrap();
        assert_eq!(pt, b"hello mesh");
    }

    #[test]
    fn siv_detects_aad_tamper() {
        let key = test_key();
        let aad: [&[u8]; 3] = [b"local", b"peer", b"frame-bytes"];
        let ct = aes_siv_encrypt(&key, b"hello mesh", &aad).unwrap();

        let bad_aad: [&[u8]; 3] = [b"local", b"peer", b"frame-bytex"];
        assert!(aes_siv_decrypt(&key, &ct, &bad_aad).is_err());
    }

    #[test]
    fn siv_detects_ciphertext_tamper() {
        let key = test_key();
        let aad: [&[u8]; 3] = [b"local", b"peer", b"frame-bytes"];
        let mut ct = aes_siv_encrypt(&key, b"hello mesh", &aad).unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0x01;
        assert!(aes_siv_decrypt(&key, &ct, &aad).is_err());
    }
}
