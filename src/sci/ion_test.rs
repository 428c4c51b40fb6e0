//! A testing-only security context suitable for basic interoperability
//! testing of security block packaging.
//!
//! This context is not standardized and uses the identifier -1; context ids
//! below zero are reserved by RFC 9172 for local, site-specific uses. It
//! combines a BIB and a BCB behind one id with a fixed
//! HMAC-SHA-256 / AES-256-GCM suite pairing: Sign/Verify actions route to
//! the integrity logic, Encrypt/Decrypt to the confidentiality logic.

use crate::bundle::{SecBundle, PAYLOAD_BLOCK_NUMBER, PRIMARY_BLOCK_NUMBER};
use crate::crypto::{self, CipherSuite, Direction, SignContext};
use crate::error::{SecError, SecResult};
use crate::sci::util::{
    key_get, key_unwrap, parms_extract, CipherParms, PARM_BEK, PARM_BEKICV, PARM_ICV, PARM_INTSIG,
    PARM_IV, PARM_KEYINFO, PARM_SALT,
};
use crate::sci::{ScAction, ScId, ScRole, ScState, SecurityBlock, SecurityContext, SopOutcome};
use crate::stream;
use crate::value::{self, ScValue, ScValueKind, ScValueMapEntry, ValueCodec};

pub const ION_TEST_SC_NAME: &str = "ION_TEST_SC";
pub const ION_TEST_SC_ID: ScId = -1;

pub const BIB_SUITE: CipherSuite = CipherSuite::HmacSha256;
pub const BCB_SUITE: CipherSuite = CipherSuite::Aes256Gcm;

static VALUE_MAP: [ScValueMapEntry; 7] = [
    ScValueMapEntry {
        name: "key_name",
        id: PARM_KEYINFO,
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
        name: "salt",
        id: PARM_SALT,
        kind: ScValueKind::Parm,
        codec: ValueCodec::Hex,
        wire: false,
    },
    ScValueMapEntry {
        name: "icv",
        id: PARM_ICV,
        kind: ScValueKind::Result,
        codec: ValueCodec::Hex,
        wire: true,
    },
    ScValueMapEntry {
        name: "intsig",
        id: PARM_INTSIG,
        kind: ScValueKind::Result,
        codec: ValueCodec::Hex,
        wire: true,
    },
    ScValueMapEntry {
        name: "bek",
        id: PARM_BEK,
        kind: ScValueKind::Parm,
        codec: ValueCodec::Hex,
        wire: true,
    },
    ScValueMapEntry {
        name: "bekicv",
        id: PARM_BEKICV,
        kind: ScValueKind::Result,
        codec: ValueCodec::Hex,
        wire: true,
    },
];

pub struct IonTestSc;

impl IonTestSc {
    /// Canonical form of a target block; this context only protects the
    /// primary and payload blocks.
    fn target_canonical(bundle: &SecBundle, target: u64) -> SecResult<Vec<u8>> {
        match target {
            PRIMARY_BLOCK_NUMBER => bundle.primary_cbor(),
            PAYLOAD_BLOCK_NUMBER => bundle.block_data_wire(target),
            _ => {
                log::error!("the ION test context only signs primary and payload blocks");
                Err(SecError::BadTarget(target))
            }
        }
    }

    /// Digest a target block in fixed-size chunks.
    fn compute_digest(
        bundle: &SecBundle,
        target: u64,
        key: &[u8],
    ) -> SecResult<Vec<u8>> {
        let data = Self::target_canonical(bundle, target)?;
        let mut ctx = SignContext::init(BIB_SUITE, key)?;
        for chunk in data.chunks(BIB_SUITE.chunk_size()) {
            ctx.update(chunk);
        }
        Ok(ctx.finish_sign())
    }

    fn bib_sign(
        state: &mut ScState<'_>,
        bundle: &SecBundle,
        target: u64,
    ) -> SecResult<SopOutcome> {
        let key = key_get(state, PARM_KEYINFO)?;
        let digest = Self::compute_digest(bundle, target, &key)?;
        state.push_result(ScValue::new(ScValueKind::Result, PARM_INTSIG, digest));
        Ok(SopOutcome::Processed)
    }

    fn bib_verify(
        state: &ScState<'_>,
        bundle: &SecBundle,
        asb: &SecurityBlock,
        target: u64,
    ) -> SecResult<SopOutcome> {
        let key = key_get(state, PARM_KEYINFO)?;
        let asserted = asb
            .target_results(target)
            .and_then(|r| value::find(&r.results, PARM_INTSIG, ScValueKind::Result))
            .ok_or(SecError::MissingResult("intsig"))?;
        let digest = Self::compute_digest(bundle, target, &key)?;
        if digest == asserted.raw {
            Ok(SopOutcome::Processed)
        } else {
            Ok(SopOutcome::CheckFailed)
        }
    }

    /// Generate the material for encrypting a target: a fresh session key,
    /// its AEAD-wrapped form (ciphertext in the `bek` parameter, wrap tag
    /// in the `bekicv` result) and the remaining cipher parameters from
    /// the state.
    fn bcb_out_parms(
        state: &ScState<'_>,
    ) -> SecResult<(CipherParms, Vec<u8>, ScValue, ScValue)> {
        let kek = key_get(state, PARM_KEYINFO)?;
        let session_key = crypto::session_key_new(BCB_SUITE);
        let parms = parms_extract(state);

        let iv = parms.iv.as_deref().ok_or(SecError::MissingParm("iv"))?;
        let (wrapped, wrap_tag) = crypto::crypt_key(
            BCB_SUITE,
            Direction::Encrypt,
            &kek,
            iv,
            &session_key,
            None,
        )?;
        let wrap_tag =
            wrap_tag.ok_or_else(|| SecError::Crypto("no wrap tag produced".to_string()))?;

        let bek = ScValue::new(ScValueKind::Parm, PARM_BEK, wrapped);
        let bekicv = ScValue::new(ScValueKind::Result, PARM_BEKICV, wrap_tag);
        Ok((parms, session_key, bek, bekicv))
    }

    fn bcb_encrypt(
        state: &mut ScState<'_>,
        extra_parms: &mut Vec<ScValue>,
        bundle: &mut SecBundle,
        target: u64,
    ) -> SecResult<SopOutcome> {
        if target != PAYLOAD_BLOCK_NUMBER {
            log::error!("the ION test context only encrypts payloads");
            return Err(SecError::BadTarget(target));
        }

        let (parms, session_key, bek, bekicv) = Self::bcb_out_parms(state)?;
        extra_parms.push(bek);
        state.push_result(bekicv);

        let payload = bundle.take_payload()?;
        let (output, tag) = stream::convert(
            BCB_SUITE,
            Direction::Encrypt,
            &session_key,
            &parms,
            payload,
            &state.stream_policy,
        )?;
        bundle.replace_payload(output)?;

        let tag = tag.ok_or_else(|| SecError::Crypto("no authentication tag".to_string()))?;
        state.push_result(ScValue::new(ScValueKind::Result, PARM_ICV, tag));
        Ok(SopOutcome::Processed)
    }

    fn bcb_decrypt(
        state: &mut ScState<'_>,
        bundle: &mut SecBundle,
        asb: &SecurityBlock,
        target: u64,
    ) -> SecResult<SopOutcome> {
        if state.role != ScRole::Acceptor {
            // Default pass at a verifier.
            return Ok(SopOutcome::Passthrough);
        }
        if target != PAYLOAD_BLOCK_NUMBER {
            log::error!("the ION test context only decrypts payloads");
            return Err(SecError::BadTarget(target));
        }

        // The wrap tag and payload tag arrive as results of this target,
        // not as state parameters; fold them into the cipher parameters.
        let mut parms = parms_extract(state);
        if let Some(results) = asb.target_results(target) {
            if parms.icv.is_none() {
                parms.icv = value::find(&results.results, PARM_ICV, ScValueKind::Result)
                    .map(|v| v.raw.clone());
            }
            if parms.aad.is_none() {
                parms.aad = value::find(&results.results, PARM_BEKICV, ScValueKind::Result)
                    .map(|v| v.raw.clone());
            }
        }

        let session_key = key_unwrap(state, PARM_KEYINFO, PARM_BEK, BCB_SUITE, &parms)?;

        // The AAD slot carried only the key-wrap tag; the payload itself
        // was transformed without associated data.
        parms.aad = None;

        let payload = bundle.take_payload()?;
        match stream::convert(
            BCB_SUITE,
            Direction::Decrypt,
            &session_key,
            &parms,
            payload,
            &state.stream_policy,
        ) {
            Ok((output, _)) => {
                bundle.replace_payload(output)?;
                Ok(SopOutcome::Processed)
            }
            Err(SecError::AuthFailed) => Ok(SopOutcome::CheckFailed),
            Err(err) => Err(err),
        }
    }
}

impl SecurityContext for IonTestSc {
    fn process_outbound(
        &self,
        state: &mut ScState<'_>,
        extra_parms: &mut Vec<ScValue>,
        bundle: &mut SecBundle,
        _asb: &SecurityBlock,
        target: u64,
    ) -> SecResult<SopOutcome> {
        match state.action {
            ScAction::Sign => Self::bib_sign(state, bundle, target),
            ScAction::Encrypt => Self::bcb_encrypt(state, extra_parms, bundle, target),
            _ => Err(SecError::RoleActionMismatch(
                state.role.as_str(),
                state.action.as_str(),
            )),
        }
    }

    fn process_inbound(
        &self,
        state: &mut ScState<'_>,
        bundle: &mut SecBundle,
        asb: &SecurityBlock,
        target: u64,
    ) -> SecResult<SopOutcome> {
        match state.action {
            ScAction::Verify => Self::bib_verify(state, bundle, asb, target),
            ScAction::Decrypt => Self::bcb_decrypt(state, bundle, asb, target),
            _ => Err(SecError::RoleActionMismatch(
                state.role.as_str(),
                state.action.as_str(),
            )),
        }
    }

    fn value_map(&self) -> &'static [ScValueMapEntry] {
        &VALUE_MAP
    }
}
