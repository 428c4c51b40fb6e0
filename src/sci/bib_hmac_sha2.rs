//! The BIB-HMAC-SHA2 security context standardized by RFC 9173.

use crate::bundle::{SecBundle, PAYLOAD_BLOCK_NUMBER, PRIMARY_BLOCK_NUMBER};
use crate::crypto::{CipherSuite, SignContext};
use crate::error::{SecError, SecResult};
use crate::sci::util::{key_unwrap, CipherParms};
use crate::sci::{
    rfc9173, ScId, ScRole, ScState, SecurityBlock, SecurityContext, SopOutcome,
};
use crate::value::{self, ScValue, ScValueKind, ScValueMapEntry, ValueCodec};

pub const BIB_HMAC_SHA2_NAME: &str = "BIB-HMAC-SHA2";
// https://www.rfc-editor.org/rfc/rfc9173.html#name-security-context-identifier
pub const BIB_HMAC_SHA2_ID: ScId = 1;

// Security context parameters
// https://www.rfc-editor.org/rfc/rfc9173.html#name-enumerations
pub const PARM_SHA_VARIANT: u32 = 1;
pub const PARM_WRAPPED_KEY: u32 = 2;
pub const PARM_SCOPE_FLAGS: u32 = 3;
/// Policy-only; names the long-term key and never crosses the wire.
pub const PARM_KEY_NAME: u32 = 4;
pub const RESULT_HMAC: u32 = 1;

// SHA Variant codepoints
// https://www.rfc-editor.org/rfc/rfc9173.html#name-sha-variant
pub const HMAC_SHA_256: u64 = 5;
pub const HMAC_SHA_384: u64 = 6; // default
pub const HMAC_SHA_512: u64 = 7;

static VALUE_MAP: [ScValueMapEntry; 5] = [
    ScValueMapEntry {
        name: "key_name",
        id: PARM_KEY_NAME,
        kind: ScValueKind::Parm,
        codec: ValueCodec::Str,
        wire: false,
    },
    ScValueMapEntry {
        name: "sha_variant",
        id: PARM_SHA_VARIANT,
        kind: ScValueKind::Parm,
        codec: ValueCodec::Int,
        wire: true,
    },
    ScValueMapEntry {
        name: "wrapped_key",
        id: PARM_WRAPPED_KEY,
        kind: ScValueKind::Parm,
        codec: ValueCodec::Hex,
        wire: true,
    },
    ScValueMapEntry {
        name: "scope_flags",
        id: PARM_SCOPE_FLAGS,
        kind: ScValueKind::Parm,
        codec: ValueCodec::Int,
        wire: true,
    },
    ScValueMapEntry {
        name: "ehmac",
        id: RESULT_HMAC,
        kind: ScValueKind::Result,
        codec: ValueCodec::Hex,
        wire: true,
    },
];

pub struct BibHmacSha2;

impl BibHmacSha2 {
    /// Resolve the SHA variant parameter, defaulting (with a warning) when
    /// the value is absent or outside the known set.
    fn sha_suite(state: &ScState<'_>) -> CipherSuite {
        match rfc9173::int_parm_get(state, PARM_SHA_VARIANT, HMAC_SHA_384) {
            HMAC_SHA_256 => CipherSuite::HmacSha256,
            HMAC_SHA_384 => CipherSuite::HmacSha384,
            HMAC_SHA_512 => CipherSuite::HmacSha512,
            other => {
                log::warn!(
                    "incorrect value {} for parameter `{}`, defaulting to {}",
                    other,
                    value::name_of(&VALUE_MAP, PARM_SHA_VARIANT, ScValueKind::Parm),
                    HMAC_SHA_384
                );
                CipherSuite::HmacSha384
            }
        }
    }

    /// Get the signing key for this block: the cached session key when a
    /// previous operation already resolved one, otherwise an unwrap of the
    /// block's wrapped-key parameter (falling back to the named long-term
    /// key itself when no wrapped key is present).
    fn verification_key(state: &mut ScState<'_>) -> SecResult<Vec<u8>> {
        if let Some(key) = &state.session_key {
            return Ok(key.clone());
        }
        let key = key_unwrap(
            state,
            PARM_KEY_NAME,
            PARM_WRAPPED_KEY,
            CipherSuite::AesKeyWrap,
            &CipherParms::default(),
        )?;
        state.session_key = Some(key.clone());
        Ok(key)
    }

    /// Session key for signing at the security source: generated fresh and
    /// wrapped on first use, with the wrapped form going out in the block's
    /// parameters; cached for the block's remaining targets.
    fn signing_key(state: &mut ScState<'_>, extra_parms: &mut Vec<ScValue>) -> SecResult<Vec<u8>> {
        if let Some(key) = &state.session_key {
            return Ok(key.clone());
        }
        let suite = Self::sha_suite(state);
        let (key, wrapped) =
            rfc9173::ses_key_get(state, PARM_KEY_NAME, PARM_WRAPPED_KEY, suite)?;
        extra_parms.push(wrapped.clone());
        state.push_parm(wrapped);
        state.session_key = Some(key.clone());
        Ok(key)
    }

    /// Generate the canonical IPPT for a target and feed it through the
    /// HMAC in fixed-size chunks. Primary and payload targets contribute
    /// their canonical form after the preamble; extension-block targets are
    /// folded into the preamble itself.
    fn ippt_digest(
        state: &ScState<'_>,
        bundle: &SecBundle,
        target: u64,
        suite: CipherSuite,
        key: &[u8],
    ) -> SecResult<Vec<u8>> {
        let (add_data, target_canonical) = match target {
            PRIMARY_BLOCK_NUMBER => (false, bundle.primary_cbor()?),
            PAYLOAD_BLOCK_NUMBER => (false, bundle.block_data_wire(target)?),
            _ => (true, Vec::new()),
        };
        let preamble = rfc9173::auth_data_build(state, PARM_SCOPE_FLAGS, target, add_data, bundle)?;

        let mut ctx = SignContext::init(suite, key)?;
        for chunk in preamble.chunks(suite.chunk_size()) {
            ctx.update(chunk);
        }
        for chunk in target_canonical.chunks(suite.chunk_size()) {
            ctx.update(chunk);
        }
        Ok(ctx.finish_sign())
    }
}

impl SecurityContext for BibHmacSha2 {
    fn process_outbound(
        &self,
        state: &mut ScState<'_>,
        extra_parms: &mut Vec<ScValue>,
        bundle: &mut SecBundle,
        _asb: &SecurityBlock,
        target: u64,
    ) -> SecResult<SopOutcome> {
        if state.role != ScRole::Source {
            return Ok(SopOutcome::Passthrough);
        }
        if state.action != crate::sci::ScAction::Sign {
            return Err(SecError::RoleActionMismatch(
                state.role.as_str(),
                state.action.as_str(),
            ));
        }

        let suite = Self::sha_suite(state);
        let key = Self::signing_key(state, extra_parms)?;
        let digest = Self::ippt_digest(state, bundle, target, suite, &key)?;

        state.push_result(ScValue::new(ScValueKind::Result, RESULT_HMAC, digest));
        Ok(SopOutcome::Processed)
    }

    fn process_inbound(
        &self,
        state: &mut ScState<'_>,
        bundle: &mut SecBundle,
        asb: &SecurityBlock,
        target: u64,
    ) -> SecResult<SopOutcome> {
        if state.action != crate::sci::ScAction::Verify {
            return Ok(SopOutcome::Passthrough);
        }

        let suite = Self::sha_suite(state);
        let key = Self::verification_key(state)?;

        let asserted = asb
            .target_results(target)
            .and_then(|r| value::find(&r.results, RESULT_HMAC, ScValueKind::Result))
            .ok_or(SecError::MissingResult("ehmac"))?;

        let digest = Self::ippt_digest(state, bundle, target, suite, &key)?;
        if digest == asserted.raw {
            Ok(SopOutcome::Processed)
        } else {
            log::debug!("digest mismatch for target {}", target);
            Ok(SopOutcome::CheckFailed)
        }
    }

    fn value_map(&self) -> &'static [ScValueMapEntry] {
        &VALUE_MAP
    }
}
