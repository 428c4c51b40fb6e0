//! Cipher-suite primitives used by the security contexts.
//!
//! Keyed by an opaque suite identifier, mirroring the interface the
//! contexts consume: context init, start/update/finish, whole-buffer
//! convenience calls, key wrap, sizing.

use crate::error::{SecError, SecResult};
use std::convert::TryFrom;
use aes_gcm::aead::AeadInPlace;
use aes_gcm::aes::{Aes128, Aes192, Aes256};
use aes_gcm::{Aes128Gcm, Aes256Gcm, KeyInit, Nonce, Tag};
use aes_kw::Kek;
use hmac::{Hmac, Mac};
use nanorand::{ChaCha8, Rng};
use sha2::{Sha256, Sha384, Sha512};

/// Cipher suites known to this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherSuite {
    Aes128Gcm,
    Aes256Gcm,
    HmacSha256,
    HmacSha384,
    HmacSha512,
    AesKeyWrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

pub const GCM_IV_LEN: usize = 12;
pub const GCM_TAG_LEN: usize = 16;

impl CipherSuite {
    /// Symmetric key size for this suite, also the size of generated
    /// session keys.
    pub fn key_len(self) -> usize {
        match self {
            CipherSuite::Aes128Gcm => 16,
            CipherSuite::Aes256Gcm => 32,
            CipherSuite::HmacSha256 => 32,
            CipherSuite::HmacSha384 => 48,
            CipherSuite::HmacSha512 => 64,
            CipherSuite::AesKeyWrap => 16,
        }
    }

    /// Preferred chunk size when feeding large data through a context.
    pub fn chunk_size(self) -> usize {
        4096
    }

    pub fn is_aead(self) -> bool {
        matches!(self, CipherSuite::Aes128Gcm | CipherSuite::Aes256Gcm)
    }

    /// Predicted output size for transforming `input_len` bytes. GCM keeps
    /// ciphertext and plaintext the same length; the authentication tag is
    /// carried detached, as a security result.
    pub fn crypt_res_len(self, input_len: u64, _direction: Direction) -> u64 {
        input_len
    }
}

/// Cryptographically strong random bytes.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = ChaCha8::new();
    let mut buf = vec![0u8; len];
    rng.fill_bytes(&mut buf);
    buf
}

/// Fresh session key sized for the given suite.
pub fn session_key_new(suite: CipherSuite) -> Vec<u8> {
    random_bytes(suite.key_len())
}

/// Fresh initialization vector for an AEAD suite.
pub fn iv_new(_suite: CipherSuite) -> Vec<u8> {
    random_bytes(GCM_IV_LEN)
}

fn gcm_encrypt(
    suite: CipherSuite,
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    buf: &mut [u8],
) -> SecResult<Vec<u8>> {
    if iv.len() != GCM_IV_LEN {
        return Err(SecError::Crypto(format!("bad iv length {}", iv.len())));
    }
    let nonce = Nonce::from_slice(iv);
    let tag = match suite {
        CipherSuite::Aes128Gcm => Aes128Gcm::new_from_slice(key)
            .map_err(|e| SecError::Crypto(e.to_string()))?
            .encrypt_in_place_detached(nonce, aad, buf),
        CipherSuite::Aes256Gcm => Aes256Gcm::new_from_slice(key)
            .map_err(|e| SecError::Crypto(e.to_string()))?
            .encrypt_in_place_detached(nonce, aad, buf),
        _ => return Err(SecError::Crypto(format!("{:?} is not an AEAD suite", suite))),
    };
    tag.map(|t| t.to_vec())
        .map_err(|_| SecError::Crypto("AEAD encryption failed".to_string()))
}

fn gcm_decrypt(
    suite: CipherSuite,
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    buf: &mut [u8],
    tag: &[u8],
) -> SecResult<()> {
    if iv.len() != GCM_IV_LEN {
        return Err(SecError::Crypto(format!("bad iv length {}", iv.len())));
    }
    if tag.len() != GCM_TAG_LEN {
        return Err(SecError::Crypto(format!("bad tag length {}", tag.len())));
    }
    let nonce = Nonce::from_slice(iv);
    let tag = Tag::from_slice(tag);
    let outcome = match suite {
        CipherSuite::Aes128Gcm => Aes128Gcm::new_from_slice(key)
            .map_err(|e| SecError::Crypto(e.to_string()))?
            .decrypt_in_place_detached(nonce, aad, buf, tag),
        CipherSuite::Aes256Gcm => Aes256Gcm::new_from_slice(key)
            .map_err(|e| SecError::Crypto(e.to_string()))?
            .decrypt_in_place_detached(nonce, aad, buf, tag),
        _ => return Err(SecError::Crypto(format!("{:?} is not an AEAD suite", suite))),
    };
    outcome.map_err(|_| SecError::AuthFailed)
}

/// Incremental encrypt/decrypt context.
///
/// The RustCrypto AEAD interface is one-shot, so `update` accumulates input
/// and `finish` runs the cipher over the whole buffer; callers still stream
/// bounded chunks in and write whatever bytes each call hands back.
pub struct CryptContext {
    suite: CipherSuite,
    direction: Direction,
    key: Vec<u8>,
    iv: Vec<u8>,
    aad: Vec<u8>,
    buf: Vec<u8>,
}

impl CryptContext {
    pub fn init(suite: CipherSuite, key: &[u8], direction: Direction) -> SecResult<CryptContext> {
        if !suite.is_aead() {
            return Err(SecError::Crypto(format!(
                "{:?} cannot be used for encryption",
                suite
            )));
        }
        if key.len() != suite.key_len() {
            return Err(SecError::Crypto(format!(
                "key length {} invalid for {:?}",
                key.len(),
                suite
            )));
        }
        Ok(CryptContext {
            suite,
            direction,
            key: key.to_vec(),
            iv: Vec::new(),
            aad: Vec::new(),
            buf: Vec::new(),
        })
    }

    /// Arm the context with per-operation material. May be called again to
    /// restart the context from scratch.
    pub fn start(&mut self, iv: &[u8], aad: &[u8]) -> SecResult<()> {
        self.iv = iv.to_vec();
        self.aad = aad.to_vec();
        self.buf.clear();
        Ok(())
    }

    /// Feed one chunk of input, returning any output bytes ready so far.
    pub fn update(&mut self, chunk: &[u8]) -> SecResult<Vec<u8>> {
        self.buf.extend_from_slice(chunk);
        Ok(Vec::new())
    }

    /// Complete the transform. Encrypting yields the remaining output and
    /// the authentication tag; decrypting verifies `expected_tag` and yields
    /// the plaintext, failing with [`SecError::AuthFailed`] on mismatch.
    pub fn finish(mut self, expected_tag: Option<&[u8]>) -> SecResult<(Vec<u8>, Option<Vec<u8>>)> {
        match self.direction {
            Direction::Encrypt => {
                let tag = gcm_encrypt(self.suite, &self.key, &self.iv, &self.aad, &mut self.buf)?;
                Ok((self.buf, Some(tag)))
            }
            Direction::Decrypt => {
                let tag = expected_tag
                    .ok_or_else(|| SecError::Crypto("no authentication tag supplied".to_string()))?;
                gcm_decrypt(self.suite, &self.key, &self.iv, &self.aad, &mut self.buf, tag)?;
                Ok((self.buf, None))
            }
        }
    }
}

/// Whole-buffer encrypt/decrypt convenience call.
pub fn crypt_full(
    suite: CipherSuite,
    direction: Direction,
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    data: &[u8],
    expected_tag: Option<&[u8]>,
) -> SecResult<(Vec<u8>, Option<Vec<u8>>)> {
    let mut ctx = CryptContext::init(suite, key, direction)?;
    ctx.start(iv, aad)?;
    ctx.update(data)?;
    ctx.finish(expected_tag)
}

enum MacState {
    S256(Hmac<Sha256>),
    S384(Hmac<Sha384>),
    S512(Hmac<Sha512>),
}

/// Incremental HMAC signing/verification context.
pub struct SignContext {
    state: MacState,
}

impl SignContext {
    pub fn init(suite: CipherSuite, key: &[u8]) -> SecResult<SignContext> {
        let state = match suite {
            CipherSuite::HmacSha256 => MacState::S256(
                <Hmac<Sha256> as Mac>::new_from_slice(key)
                    .map_err(|e| SecError::Crypto(e.to_string()))?,
            ),
            CipherSuite::HmacSha384 => MacState::S384(
                <Hmac<Sha384> as Mac>::new_from_slice(key)
                    .map_err(|e| SecError::Crypto(e.to_string()))?,
            ),
            CipherSuite::HmacSha512 => MacState::S512(
                <Hmac<Sha512> as Mac>::new_from_slice(key)
                    .map_err(|e| SecError::Crypto(e.to_string()))?,
            ),
            _ => {
                return Err(SecError::Crypto(format!(
                    "{:?} cannot be used for signing",
                    suite
                )))
            }
        };
        Ok(SignContext { state })
    }

    pub fn update(&mut self, chunk: &[u8]) {
        match &mut self.state {
            MacState::S256(mac) => mac.update(chunk),
            MacState::S384(mac) => mac.update(chunk),
            MacState::S512(mac) => mac.update(chunk),
        }
    }

    pub fn finish_sign(self) -> Vec<u8> {
        match self.state {
            MacState::S256(mac) => mac.finalize().into_bytes().to_vec(),
            MacState::S384(mac) => mac.finalize().into_bytes().to_vec(),
            MacState::S512(mac) => mac.finalize().into_bytes().to_vec(),
        }
    }

    /// Boolean verification outcome; a mismatch is not an error.
    pub fn finish_verify(self, expected: &[u8]) -> bool {
        match self.state {
            MacState::S256(mac) => mac.verify_slice(expected).is_ok(),
            MacState::S384(mac) => mac.verify_slice(expected).is_ok(),
            MacState::S512(mac) => mac.verify_slice(expected).is_ok(),
        }
    }
}

/// Whole-buffer digest convenience call.
pub fn sign_full(suite: CipherSuite, key: &[u8], data: &[u8]) -> SecResult<Vec<u8>> {
    let mut ctx = SignContext::init(suite, key)?;
    ctx.update(data);
    Ok(ctx.finish_sign())
}

/// AES key wrap (RFC 3394) of `key` under `kek`.
pub fn keywrap(kek: &[u8], key: &[u8]) -> SecResult<Vec<u8>> {
    match kek.len() {
        16 => Kek::<Aes128>::try_from(kek)
            .map_err(|e| SecError::Crypto(e.to_string()))?
            .wrap_vec(key)
            .map_err(|e| SecError::Crypto(e.to_string())),
        24 => Kek::<Aes192>::try_from(kek)
            .map_err(|e| SecError::Crypto(e.to_string()))?
            .wrap_vec(key)
            .map_err(|e| SecError::Crypto(e.to_string())),
        32 => Kek::<Aes256>::try_from(kek)
            .map_err(|e| SecError::Crypto(e.to_string()))?
            .wrap_vec(key)
            .map_err(|e| SecError::Crypto(e.to_string())),
        n => Err(SecError::Crypto(format!("bad key-encryption key length {}", n))),
    }
}

/// AES key unwrap (RFC 3394); an integrity failure is a key-unwrap error.
pub fn keyunwrap(kek: &[u8], wrapped: &[u8]) -> SecResult<Vec<u8>> {
    let unwrap_err = |e: aes_kw::Error| SecError::KeyUnwrap(e.to_string());
    match kek.len() {
        16 => Kek::<Aes128>::try_from(kek)
            .map_err(unwrap_err)?
            .unwrap_vec(wrapped)
            .map_err(unwrap_err),
        24 => Kek::<Aes192>::try_from(kek)
            .map_err(unwrap_err)?
            .unwrap_vec(wrapped)
            .map_err(unwrap_err),
        32 => Kek::<Aes256>::try_from(kek)
            .map_err(unwrap_err)?
            .unwrap_vec(wrapped)
            .map_err(unwrap_err),
        n => Err(SecError::KeyUnwrap(format!(
            "bad key-encryption key length {}",
            n
        ))),
    }
}

/// Protect or recover a session key with an AEAD suite instead of the
/// dedicated key-wrap primitive. Encrypting returns the ciphertext and the
/// wrap tag; decrypting takes them back and verifies.
pub fn crypt_key(
    suite: CipherSuite,
    direction: Direction,
    kek: &[u8],
    iv: &[u8],
    key_material: &[u8],
    expected_tag: Option<&[u8]>,
) -> SecResult<(Vec<u8>, Option<Vec<u8>>)> {
    if suite == CipherSuite::AesKeyWrap {
        return match direction {
            Direction::Encrypt => Ok((keywrap(kek, key_material)?, None)),
            Direction::Decrypt => Ok((keyunwrap(kek, key_material)?, None)),
        };
    }
    crypt_full(suite, direction, kek, iv, &[], key_material, expected_tag)
}
