//! Generic utilities shared by security context implementations.

use crate::crypto::{self, CipherSuite, Direction};
use crate::error::{SecError, SecResult};
use crate::sci::ScState;
use crate::value::{ScValueId, ScValueKind};

/// Well-known cipher-parameter value ids, shared by contexts that use the
/// generic parameter projection below. RFC 9173 contexts define their own
/// id spaces and populate [`CipherParms`] by hand.
pub const PARM_KEYINFO: ScValueId = 1;
pub const PARM_IV: ScValueId = 2;
pub const PARM_SALT: ScValueId = 3;
pub const PARM_ICV: ScValueId = 4;
pub const PARM_INTSIG: ScValueId = 5;
pub const PARM_BEK: ScValueId = 6;
pub const PARM_BEKICV: ScValueId = 7;

/// Per-operation bundle of cipher material: initialization vector, salt,
/// authentication tag, integrity signature, wrapped-key material and AAD.
///
/// The AAD buffer is always produced fresh by the operation that uses it;
/// the remaining slots are small copies out of the state, so the bundle has
/// no lifetime ties and cannot outlive-or-free anything by accident.
#[derive(Debug, Clone, Default)]
pub struct CipherParms {
    pub iv: Option<Vec<u8>>,
    pub salt: Option<Vec<u8>>,
    pub icv: Option<Vec<u8>>,
    pub intsig: Option<Vec<u8>>,
    pub keyinfo: Option<Vec<u8>>,
    pub aad: Option<Vec<u8>>,
}

/// Fetch the long-term key named by a state parameter.
///
/// The parameter value is a key *name*, not key material; the actual bytes
/// come from a second lookup through the state's key store. Fails if either
/// lookup misses.
pub fn key_get(state: &ScState<'_>, name_parm_id: ScValueId) -> SecResult<Vec<u8>> {
    let name_val = state
        .parm(name_parm_id)
        .ok_or(SecError::MissingParm("key_name"))?;
    let name = std::str::from_utf8(&name_val.raw)
        .map_err(|e| SecError::Decode(format!("key name is not utf-8: {}", e)))?;
    state
        .keys
        .key_get(name)
        .ok_or_else(|| SecError::KeyNotFound(name.to_owned()))
}

/// Recover the session key for a security block.
///
/// The key-encryption key is fetched by name via [`key_get`]. When a
/// wrapped-key parameter is present it is unwrapped with the dedicated AES
/// key-wrap primitive (suite [`CipherSuite::AesKeyWrap`]) or the general
/// AEAD decrypt-key path. When no wrapped key is present the KEK itself is
/// used as the session key; degenerate configurations rely on this, so the
/// fallback is kept, with a warning.
pub fn key_unwrap(
    state: &ScState<'_>,
    kek_parm_id: ScValueId,
    wrapped_parm_id: ScValueId,
    suite: CipherSuite,
    parms: &CipherParms,
) -> SecResult<Vec<u8>> {
    let kek = key_get(state, kek_parm_id)?;

    match state.parm_bytes(wrapped_parm_id) {
        Some(wrapped) => match suite {
            CipherSuite::AesKeyWrap => crypto::keyunwrap(&kek, wrapped),
            _ => {
                let iv = parms
                    .iv
                    .as_deref()
                    .ok_or(SecError::MissingParm("iv"))?;
                let tag = parms.aad.as_deref();
                let (key, _) = crypto::crypt_key(suite, Direction::Decrypt, &kek, iv, wrapped, tag)
                    .map_err(|e| SecError::KeyUnwrap(e.to_string()))?;
                Ok(key)
            }
        },
        None => {
            log::warn!("no wrapped key present, using key-encryption key as session key");
            Ok(kek)
        }
    }
}

/// Project a state's parameters into a [`CipherParms`] bundle by scanning
/// for the well-known cipher-parameter ids. The wrapped-key ICV rides in
/// the AAD slot, where the AEAD key-recovery path expects its tag.
pub fn parms_extract(state: &ScState<'_>) -> CipherParms {
    let grab = |id: ScValueId, kind: ScValueKind| -> Option<Vec<u8>> {
        state
            .parms
            .iter()
            .map(|p| p.value())
            .chain(state.results.iter())
            .find(|v| v.id == id && v.kind == kind)
            .map(|v| v.raw.clone())
    };

    CipherParms {
        iv: grab(PARM_IV, ScValueKind::Parm),
        salt: grab(PARM_SALT, ScValueKind::Parm),
        icv: grab(PARM_ICV, ScValueKind::Result),
        intsig: grab(PARM_INTSIG, ScValueKind::Result),
        keyinfo: grab(PARM_BEK, ScValueKind::Parm),
        aad: grab(PARM_BEKICV, ScValueKind::Result),
    }
}
