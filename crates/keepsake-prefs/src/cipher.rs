//! Symmetric cipher seam for stored preference values.
//!
//! The [`Cipher`] trait is the boundary the rest of the stack programs
//! against. Two implementations are provided:
//!
//! - [`Passthrough`]: identity transform, used in debug configurations where
//!   save files should stay human-readable.
//! - [`KeystreamCipher`]: a keyed-stream transform with base64-armored output,
//!   derived from a static project-embedded key and IV.
//!
//! [`KeystreamCipher`] deliberately offers no key rotation and no
//! authentication. It deters casual save editing; it is not a security
//! boundary. Anything requiring real confidentiality does not belong in a
//! preference store in the first place.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced when unsealing a stored value.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// The sealed value is not valid base64.
    #[error("sealed value is not valid base64: {0}")]
    Armor(String),

    /// The leading check bytes did not match after unsealing. Either the key
    /// differs from the one used to seal, or the ciphertext was altered.
    #[error("keystream check failed (wrong key or altered ciphertext)")]
    Check,

    /// The unsealed bytes are not valid UTF-8.
    #[error("unsealed bytes are not valid UTF-8")]
    Utf8,
}

// ---------------------------------------------------------------------------
// Cipher trait
// ---------------------------------------------------------------------------

/// A deterministic, symmetric string transform.
///
/// `decrypt(encrypt(s)) == s` must hold for every `s`. `decrypt` of input not
/// produced by the same cipher instance must fail rather than return garbage,
/// so callers can treat a failed unseal as "this copy is absent".
pub trait Cipher {
    /// Seal a plaintext string.
    fn encrypt(&self, plaintext: &str) -> String;

    /// Unseal a previously sealed string.
    ///
    /// # Errors
    ///
    /// Returns a [`CipherError`] if the input was not produced by
    /// [`encrypt`](Self::encrypt) with the same key material.
    fn decrypt(&self, sealed: &str) -> Result<String, CipherError>;
}

// ---------------------------------------------------------------------------
// Passthrough
// ---------------------------------------------------------------------------

/// Identity cipher: values are stored as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Cipher for Passthrough {
    fn encrypt(&self, plaintext: &str) -> String {
        plaintext.to_owned()
    }

    fn decrypt(&self, sealed: &str) -> Result<String, CipherError> {
        Ok(sealed.to_owned())
    }
}

// ---------------------------------------------------------------------------
// KeystreamCipher
// ---------------------------------------------------------------------------

/// Check bytes prepended to the plaintext before sealing. A mismatch after
/// unsealing signals a wrong key or altered ciphertext.
const CHECK: &[u8; 4] = b"KPV1";

/// Keyed-stream obfuscation cipher with base64-armored output.
///
/// The key and IV are folded into a 64-bit seed, which drives an xorshift
/// keystream XORed over the plaintext. Output is deterministic for a given
/// key, IV, and plaintext, so the reconciler's raw-equality shortcut between
/// the two stored copies remains valid.
#[derive(Debug, Clone)]
pub struct KeystreamCipher {
    seed: u64,
}

impl KeystreamCipher {
    /// Create a cipher from static key and IV material.
    pub fn new(key: &[u8], iv: &[u8]) -> Self {
        let seed = fold_bytes(key, 0xcbf2_9ce4_8422_2325) ^ fold_bytes(iv, 0x9e37_79b9_7f4a_7c15);
        Self {
            // An all-zero seed would collapse the xorshift stream.
            seed: if seed == 0 { 0x2545_f491_4f6c_dd1d } else { seed },
        }
    }

    fn apply_stream(&self, bytes: &mut [u8]) {
        let mut state = self.seed;
        for chunk in bytes.chunks_mut(8) {
            state ^= state >> 12;
            state ^= state << 25;
            state ^= state >> 27;
            let word = state.wrapping_mul(0x2545_f491_4f6c_dd1d).to_le_bytes();
            for (b, w) in chunk.iter_mut().zip(word.iter()) {
                *b ^= w;
            }
        }
    }
}

impl Cipher for KeystreamCipher {
    fn encrypt(&self, plaintext: &str) -> String {
        let mut bytes = Vec::with_capacity(CHECK.len() + plaintext.len());
        bytes.extend_from_slice(CHECK);
        bytes.extend_from_slice(plaintext.as_bytes());
        self.apply_stream(&mut bytes);
        BASE64.encode(bytes)
    }

    fn decrypt(&self, sealed: &str) -> Result<String, CipherError> {
        let mut bytes = BASE64
            .decode(sealed)
            .map_err(|e| CipherError::Armor(e.to_string()))?;
        self.apply_stream(&mut bytes);

        if bytes.len() < CHECK.len() || &bytes[..CHECK.len()] != CHECK {
            return Err(CipherError::Check);
        }

        String::from_utf8(bytes.split_off(CHECK.len())).map_err(|_| CipherError::Utf8)
    }
}

/// FNV-1a fold of key material into a 64-bit seed.
fn fold_bytes(bytes: &[u8], basis: u64) -> u64 {
    let mut acc = basis;
    for &b in bytes {
        acc ^= u64::from(b);
        acc = acc.wrapping_mul(0x0000_0100_0000_01b3);
    }
    acc
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
