//! The BCB-AES-GCM security context standardized by RFC 9173.

use crate::bundle::{SecBundle, PAYLOAD_BLOCK_NUMBER, PRIMARY_BLOCK_NUMBER};
use crate::crypto::{self, CipherSuite, Direction};
use crate::error::{SecError, SecResult};
use crate::sci::util::{key_unwrap, CipherParms};
use crate::sci::{
    rfc9173, ScAction, ScId, ScRole, ScState, SecurityBlock, SecurityContext, SopOutcome,
};
use crate::stream;
use crate::value::{self, ScValue, ScValueKind, ScValueMapEntry, ValueCodec};

pub const BCB_AES_GCM_NAME: &str = "BCB-AES-GCM";
// https://www.rfc-editor.org/rfc/rfc9173.html#name-security-context-identifier
pub const BCB_AES_GCM_ID: ScId = 2;

// Security context parameters
// https://www.rfc-editor.org/rfc/rfc9173.html#name-enumerations
pub const PARM_IV: u32 = 1;
pub const PARM_AES_VARIANT: u32 = 2;
pub const PARM_WRAPPED_KEY: u32 = 3;
pub const PARM_AAD_SCOPE: u32 = 4;
/// Policy-only; names the long-term key and never crosses the wire.
pub const PARM_KEY_NAME: u32 = 5;
pub const RESULT_TAG: u32 = 1;

// AES Variant codepoints
// https://www.rfc-editor.org/rfc/rfc9173.html#name-aes-gcm
pub const AES_128_GCM: u64 = 1;
pub const AES_256_GCM: u64 = 3; // default

static VALUE_MAP: [ScValueMapEntry; 6] = [
    ScValueMapEntry {
        name: "key_name",
        id: PARM_KEY_NAME,
        kind: ScValueKind::Parm,
        codec: ValueCodec::Str,
        wire: false,
    },
    ScValueMapEntry {
        name: "iv",
        id: PARM_IV,
        kind: ScValueKind::Parm,
        codec: ValueCodec::Hex,
        wire: true,
    },
    ScValueMapEntry {
        name: "aes_variant",
        id: PARM_AES_VARIANT,
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
        name: "aad_scope",
        id: PARM_AAD_SCOPE,
        kind: ScValueKind::Parm,
        codec: ValueCodec::Int,
        wire: true,
    },
    ScValueMapEntry {
        name: "tag",
        id: RESULT_TAG,
        kind: ScValueKind::Result,
        codec: ValueCodec::Hex,
        wire: true,
    },
];

pub struct BcbAesGcm;

impl BcbAesGcm {
    /// Resolve the AES variant parameter, defaulting (with a warning) when
    /// the value is absent or outside the known set.
    fn aes_suite(state: &ScState<'_>) -> CipherSuite {
        match rfc9173::int_parm_get(state, PARM_AES_VARIANT, AES_256_GCM) {
            AES_128_GCM => CipherSuite::Aes128Gcm,
            AES_256_GCM => CipherSuite::Aes256Gcm,
            other => {
                log::warn!(
                    "incorrect value {} for parameter `{}`, defaulting to {}",
                    other,
                    value::name_of(&VALUE_MAP, PARM_AES_VARIANT, ScValueKind::Parm),
                    AES_256_GCM
                );
                CipherSuite::Aes256Gcm
            }
        }
    }

    /// Decryption key for this block: cached in the state after the first
    /// target's unwrap, reused by every later target in the same block.
    fn decryption_key(state: &mut ScState<'_>) -> SecResult<Vec<u8>> {
        if let Some(key) = &state.session_key {
            return Ok(key.clone());
        }
        // AES key wrap needs no cipher parameters.
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

    /// Encryption key at the security source: generated and wrapped on
    /// first use, the wrapped form traveling in the block's parameters.
    fn encryption_key(
        state: &mut ScState<'_>,
        extra_parms: &mut Vec<ScValue>,
        suite: CipherSuite,
    ) -> SecResult<Vec<u8>> {
        if let Some(key) = &state.session_key {
            return Ok(key.clone());
        }
        let (key, wrapped) = rfc9173::ses_key_get(state, PARM_KEY_NAME, PARM_WRAPPED_KEY, suite)?;
        extra_parms.push(wrapped.clone());
        state.push_parm(wrapped);
        state.session_key = Some(key.clone());
        Ok(key)
    }

    /// Cipher parameters for decrypting one inbound target: the IV comes
    /// from the block's parameters, the authentication tag from the
    /// target's results, and the AAD is built fresh over the scope the
    /// block declares.
    fn in_parms(
        state: &ScState<'_>,
        bundle: &SecBundle,
        asb: &SecurityBlock,
        target: u64,
    ) -> SecResult<CipherParms> {
        let iv = state
            .parm_bytes(PARM_IV)
            .ok_or(SecError::MissingParm("iv"))?
            .to_vec();
        let icv = asb
            .target_results(target)
            .and_then(|r| value::find(&r.results, RESULT_TAG, ScValueKind::Result))
            .ok_or(SecError::MissingResult("tag"))?
            .raw
            .clone();
        let aad = rfc9173::auth_data_build(state, PARM_AAD_SCOPE, target, false, bundle)?;

        Ok(CipherParms {
            iv: Some(iv),
            icv: Some(icv),
            aad: Some(aad),
            ..Default::default()
        })
    }

    /// Cipher parameters for encrypting one outbound target. RFC 9173
    /// carries the IV as a block-level parameter, so a block using this
    /// context can hold only a single security operation: an IV already
    /// present in the state means it has been used and may not be reused.
    fn out_parms(
        state: &mut ScState<'_>,
        extra_parms: &mut Vec<ScValue>,
        bundle: &SecBundle,
        suite: CipherSuite,
        target: u64,
    ) -> SecResult<CipherParms> {
        if state.parm(PARM_IV).is_some() {
            log::error!("misconfiguration: IV already used for this security block");
            return Err(SecError::IvReuse);
        }
        let iv = crypto::iv_new(suite);
        let iv_val = ScValue::new(ScValueKind::Parm, PARM_IV, iv.clone());
        // Make the IV available to later operations in this block and to
        // the outgoing security block itself.
        state.push_parm(iv_val.clone());
        extra_parms.push(iv_val);

        let aad = rfc9173::auth_data_build(state, PARM_AAD_SCOPE, target, false, bundle)?;

        Ok(CipherParms {
            iv: Some(iv),
            aad: Some(aad),
            ..Default::default()
        })
    }

    /// Transform a target block in place. Payload targets stream through
    /// the cipher driver, replacing the payload object; extension-block
    /// targets are transformed in memory and may not change size.
    fn transform_target(
        state: &mut ScState<'_>,
        bundle: &mut SecBundle,
        target: u64,
        suite: CipherSuite,
        key: &[u8],
        parms: &CipherParms,
        direction: Direction,
    ) -> SecResult<Option<Vec<u8>>> {
        if target == PRIMARY_BLOCK_NUMBER {
            return Err(SecError::BadTarget(target));
        }

        if target == PAYLOAD_BLOCK_NUMBER {
            let payload = bundle.take_payload()?;
            let (output, tag) =
                stream::convert(suite, direction, key, parms, payload, &state.stream_policy)?;
            bundle.replace_payload(output)?;
            return Ok(tag);
        }

        let input = bundle.block_data(target)?.to_vec();
        let input_len = input.len();
        let iv = parms.iv.as_deref().ok_or(SecError::MissingParm("iv"))?;
        let aad = parms.aad.as_deref().unwrap_or(&[]);
        let (output, tag) = crypto::crypt_full(
            suite,
            direction,
            key,
            iv,
            aad,
            &input,
            parms.icv.as_deref(),
        )?;
        if output.len() != input_len {
            // No support for resizing extension blocks.
            return Err(SecError::BlockResize {
                expected: input_len,
                actual: output.len(),
            });
        }
        bundle.set_block_data(target, output)?;
        Ok(tag)
    }
}

impl SecurityContext for BcbAesGcm {
    fn process_outbound(
        &self,
        state: &mut ScState<'_>,
        extra_parms: &mut Vec<ScValue>,
        bundle: &mut SecBundle,
        _asb: &SecurityBlock,
        target: u64,
    ) -> SecResult<SopOutcome> {
        if state.role != ScRole::Source || state.action != ScAction::Encrypt {
            // Other roles do not act on this context.
            return Ok(SopOutcome::Passthrough);
        }

        let suite = Self::aes_suite(state);
        let key = Self::encryption_key(state, extra_parms, suite)?;
        let parms = Self::out_parms(state, extra_parms, bundle, suite, target)?;

        let tag = Self::transform_target(
            state,
            bundle,
            target,
            suite,
            &key,
            &parms,
            Direction::Encrypt,
        )?;

        match tag {
            Some(tag) => {
                state.push_result(ScValue::new(ScValueKind::Result, RESULT_TAG, tag));
            }
            None => {
                log::warn!("no integrity check value (authentication tag) produced");
            }
        }
        Ok(SopOutcome::Processed)
    }

    fn process_inbound(
        &self,
        state: &mut ScState<'_>,
        bundle: &mut SecBundle,
        asb: &SecurityBlock,
        target: u64,
    ) -> SecResult<SopOutcome> {
        if state.role != ScRole::Acceptor {
            // BCB-AES-GCM default passes at a verifier.
            return Ok(SopOutcome::Passthrough);
        }
        if state.action != ScAction::Decrypt {
            return Err(SecError::RoleActionMismatch(
                state.role.as_str(),
                state.action.as_str(),
            ));
        }

        let suite = Self::aes_suite(state);
        let key = Self::decryption_key(state)?;
        let parms = Self::in_parms(state, bundle, asb, target)?;

        match Self::transform_target(
            state,
            bundle,
            target,
            suite,
            &key,
            &parms,
            Direction::Decrypt,
        ) {
            Ok(_) => Ok(SopOutcome::Processed),
            Err(SecError::AuthFailed) => Ok(SopOutcome::CheckFailed),
            Err(err) => Err(err),
        }
    }

    fn value_map(&self) -> &'static [ScValueMapEntry] {
        &VALUE_MAP
    }
}
