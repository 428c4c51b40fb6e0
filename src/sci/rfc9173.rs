//! Utilities shared by the security contexts standardized in RFC 9173:
//! canonical AAD/IPPT construction, session-key generation and integer
//! parameter access.

use crate::bundle::{ByteBuffer, SecBundle, PAYLOAD_BLOCK_NUMBER, PRIMARY_BLOCK_NUMBER};
use crate::crypto::{self, CipherSuite};
use crate::error::{SecError, SecResult};
use crate::sci::rfc9173::ScopeFlags as Flags;
use crate::sci::ScState;
use crate::value::{ScValue, ScValueId, ScValueKind};
use bitflags::bitflags;

pub type ScopeFlagsType = u16;

bitflags! {
    /// AAD/IPPT scope flags.
    /// https://www.rfc-editor.org/rfc/rfc9173.html#name-scope
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScopeFlags: ScopeFlagsType {
        /// Include the primary block.
        const PRIMARY = 0x0001;
        /// Include the target block's header fields.
        const TARGET_HEADER = 0x0002;
        /// Include the security block's header fields.
        const SECURITY_HEADER = 0x0004;
    }
}

/// Default scope: primary block, target header and security header.
pub const SCOPE_DEFAULT: ScopeFlagsType = 0x0007;

/// Retrieve an integer security context parameter, with a default fallback
/// and a warning diagnostic when the parameter is absent or malformed.
pub fn int_parm_get(state: &ScState<'_>, id: ScValueId, default: u64) -> u64 {
    match state.parm(id) {
        Some(val) => val.as_u64().unwrap_or_else(|| {
            log::warn!("parameter {} malformed, using default {}", id, default);
            default
        }),
        None => {
            log::warn!("cannot find parameter {}, using default {}", id, default);
            default
        }
    }
}

/// Construct the canonical byte sequence that is HMAC'd (the IPPT for
/// BIB-HMAC-SHA2) or used as AEAD associated data (the AAD for
/// BCB-AES-GCM).
///
/// The construction order is fixed: the scope flags, then the primary
/// block's canonical encoding, the target block's re-serialized header
/// fields and the security block's header fields as selected by the scope
/// mask, then (extension-block targets only, when `add_data` is set) the
/// target's block-type-specific data field. Header fields are re-encoded as
/// individual CBOR unsigned integers, never copied verbatim from the wire,
/// and exclude block data and any CRC.
///
/// The same function serves the outbound (not-yet-serialized) and inbound
/// (freshly-deserialized) views of a bundle; a sender's AAD/IPPT must equal
/// the receiver's byte for byte.
pub fn auth_data_build(
    state: &ScState<'_>,
    scope_parm_id: ScValueId,
    target: u64,
    add_data: bool,
    bundle: &SecBundle,
) -> SecResult<ByteBuffer> {
    let raw_flags = int_parm_get(state, scope_parm_id, SCOPE_DEFAULT as u64);
    let flags = Flags::from_bits(raw_flags as ScopeFlagsType)
        .filter(|_| raw_flags <= ScopeFlagsType::MAX as u64)
        .ok_or(SecError::BadScope(raw_flags))?;

    if add_data && (target == PAYLOAD_BLOCK_NUMBER || target == PRIMARY_BLOCK_NUMBER) {
        return Err(SecError::BadTarget(target));
    }
    if target == PRIMARY_BLOCK_NUMBER
        && flags.intersects(Flags::PRIMARY | Flags::TARGET_HEADER)
    {
        return Err(SecError::BadScope(raw_flags));
    }

    let mut out: ByteBuffer = serde_cbor::to_vec(&raw_flags)?;

    if flags.contains(Flags::PRIMARY) {
        out.append(&mut bundle.primary_cbor()?);
    }
    if flags.contains(Flags::TARGET_HEADER) {
        append_block_header(&mut out, bundle, target)?;
    }
    if flags.contains(Flags::SECURITY_HEADER) {
        append_block_header(&mut out, bundle, state.sec_blk_num)?;
    }
    if add_data {
        out.append(&mut bundle.block_data_wire(target)?);
    }

    Ok(out)
}

/// Re-serialize a block's header fields: block type, block number and
/// processing control flags, each an independently encoded CBOR unsigned
/// integer. Never valid for the primary block.
fn append_block_header(out: &mut ByteBuffer, bundle: &SecBundle, block_number: u64) -> SecResult<()> {
    if block_number == PRIMARY_BLOCK_NUMBER {
        return Err(SecError::BadTarget(block_number));
    }
    let head = bundle
        .block_head(block_number)
        .ok_or(SecError::BlockNotFound(block_number))?;
    out.append(&mut serde_cbor::to_vec(&head.block_type)?);
    out.append(&mut serde_cbor::to_vec(&head.block_number)?);
    out.append(&mut serde_cbor::to_vec(&head.block_control_flags)?);
    Ok(())
}

/// Generate a fresh session key for `suite`, wrap it under the KEK named by
/// the `kek_parm_id` parameter and return both. The wrapped form must be
/// added to the outbound block's parameter list so receivers can unwrap it.
pub fn ses_key_get(
    state: &ScState<'_>,
    kek_parm_id: ScValueId,
    wrapped_parm_id: ScValueId,
    suite: CipherSuite,
) -> SecResult<(Vec<u8>, ScValue)> {
    let kek = super::util::key_get(state, kek_parm_id)?;

    let session_key = crypto::session_key_new(suite);
    let wrapped = crypto::keywrap(&kek, &session_key)?;

    let wrapped_val = ScValue::new(ScValueKind::Parm, wrapped_parm_id, wrapped);
    Ok((session_key, wrapped_val))
}
