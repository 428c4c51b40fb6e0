//! Security Context Interface (SCI).
//!
//! BPSec (RFC 9172) defines the concept of a "security context" used to
//! generate and consume cryptographic material associated with security
//! blocks. This module provides the registry for finding contexts, the
//! per-block processing state, and the shared state machine that drives
//! one security operation per target through a context.
//!
//! The interface does not, itself, implement cryptographic functions; those
//! live in [`crate::crypto`]. The registry is populated at compile time and
//! never mutated, so concurrent lookups from independent bundle-processing
//! threads need no locking. Each [`ScState`] belongs to exactly one such
//! thread for the duration of one security-block episode.

pub mod asb;
pub mod bcb_aes_gcm;
pub mod bib_hmac_sha2;
pub mod ion_test;
pub mod rfc9173;
pub mod util;

pub use asb::{new_confidentiality_block, new_integrity_block, SecurityBlock, TargetResults};

use crate::bundle::SecBundle;
use crate::eid::EndpointID;
use crate::error::{SecError, SecResult};
use crate::keys::KeyStore;
use crate::stream::StreamPolicy;
use crate::value::{self, ScValue, ScValueKind, ScValueMapEntry};
use bitflags::bitflags;
use std::sync::Arc;

pub type ScId = i16;

bitflags! {
    /// Security services a context can offer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScServices: u8 {
        const INTEGRITY = 0x01;
        const CONFIDENTIALITY = 0x02;
    }
}

/// The three BPSec roles a node can hold for a security operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScRole {
    Source,
    Verifier,
    Acceptor,
}

impl ScRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ScRole::Source => "source",
            ScRole::Verifier => "verifier",
            ScRole::Acceptor => "acceptor",
        }
    }
}

/// The security service action performed by a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScAction {
    Sign,
    Verify,
    Encrypt,
    Decrypt,
}

impl ScAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ScAction::Sign => "sign",
            ScAction::Verify => "verify",
            ScAction::Encrypt => "encrypt",
            ScAction::Decrypt => "decrypt",
        }
    }

    /// The service a context must offer to perform this action.
    pub fn service(self) -> ScServices {
        match self {
            ScAction::Sign | ScAction::Verify => ScServices::INTEGRITY,
            ScAction::Encrypt | ScAction::Decrypt => ScServices::CONFIDENTIALITY,
        }
    }

    /// Role/action pairings that make sense: a source signs or encrypts;
    /// verifiers and acceptors verify or decrypt (a confidentiality context
    /// decides itself that it takes no action below the acceptor role).
    pub fn permitted_for(self, role: ScRole) -> bool {
        match role {
            ScRole::Source => matches!(self, ScAction::Sign | ScAction::Encrypt),
            ScRole::Verifier | ScRole::Acceptor => {
                matches!(self, ScAction::Verify | ScAction::Decrypt)
            }
        }
    }
}

/// Outcome of processing one security operation.
///
/// `CheckFailed` is the definite "the data is bad" signal, distinct from the
/// `Err` path which means the system itself failed. `Passthrough` means the
/// context takes no action for this role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SopOutcome {
    Processed,
    CheckFailed,
    Passthrough,
}

/// A security context implementation.
///
/// One implementer exists per supported context; instances are stateless and
/// shared process-wide through the registry, with all mutable processing
/// state confined to the [`ScState`] handed into each call.
pub trait SecurityContext: Sync {
    /// Optional startup hook; a context with no init is always ready.
    fn init(&self) -> SecResult<()> {
        Ok(())
    }

    /// Optional shutdown hook.
    fn teardown(&self) {}

    /// Apply this context's security operation to one target of an outgoing
    /// security block. Generated results land in `state.results`; parameters
    /// that must travel with the block (fresh IVs, wrapped keys) are pushed
    /// onto `extra_parms`.
    fn process_outbound(
        &self,
        state: &mut ScState<'_>,
        extra_parms: &mut Vec<ScValue>,
        bundle: &mut SecBundle,
        asb: &SecurityBlock,
        target: u64,
    ) -> SecResult<SopOutcome>;

    /// Process one target of a received security block: verify a signature
    /// or decrypt the target, depending on the state's action.
    fn process_inbound(
        &self,
        state: &mut ScState<'_>,
        bundle: &mut SecBundle,
        asb: &SecurityBlock,
        target: u64,
    ) -> SecResult<SopOutcome>;

    /// The static parameter/result descriptor map for this context, used by
    /// policy tooling to validate and encode named values without knowing
    /// context internals.
    fn value_map(&self) -> &'static [ScValueMapEntry];
}

/// Registry entry for one security context.
pub struct ScDef {
    pub name: &'static str,
    pub id: ScId,
    pub services: ScServices,
    pub context: &'static dyn SecurityContext,
}

impl ScDef {
    /// Initialize an outbound security block for this context at a security
    /// source: record the context id, the block's security source and deep
    /// copies of the policy parameters that should travel in the block.
    pub fn init_outbound_block(
        &self,
        source: &EndpointID,
        policy_parms: &PolicyParms,
    ) -> SecurityBlock {
        SecurityBlock::init_outbound(self.id, source.clone(), policy_parms)
    }
}

static SC_DEFS: &[ScDef] = &[
    ScDef {
        name: ion_test::ION_TEST_SC_NAME,
        id: ion_test::ION_TEST_SC_ID,
        services: ScServices::INTEGRITY.union(ScServices::CONFIDENTIALITY),
        context: &ion_test::IonTestSc,
    },
    ScDef {
        name: bib_hmac_sha2::BIB_HMAC_SHA2_NAME,
        id: bib_hmac_sha2::BIB_HMAC_SHA2_ID,
        services: ScServices::INTEGRITY,
        context: &bib_hmac_sha2::BibHmacSha2,
    },
    ScDef {
        name: bcb_aes_gcm::BCB_AES_GCM_NAME,
        id: bcb_aes_gcm::BCB_AES_GCM_ID,
        services: ScServices::CONFIDENTIALITY,
        context: &bcb_aes_gcm::BcbAesGcm,
    },
];

/// Number of security contexts registered in the system.
pub fn def_count() -> usize {
    SC_DEFS.len()
}

/// Find the security context definition for a given identifier.
pub fn def_find(id: ScId) -> Option<&'static ScDef> {
    SC_DEFS.iter().find(|d| d.id == id)
}

/// Find the security context identifier for a given name.
pub fn id_find(name: &str) -> Option<ScId> {
    SC_DEFS.iter().find(|d| d.name == name).map(|d| d.id)
}

/// Initialize all registered contexts on startup, stopping at the first
/// failure. Context ids must be unique; ids below zero are reserved by
/// RFC 9172 for local, non-IANA-registered contexts.
pub fn exec_init() -> SecResult<()> {
    for (idx, def) in SC_DEFS.iter().enumerate() {
        if SC_DEFS[..idx].iter().any(|d| d.id == def.id) {
            return Err(SecError::ContextIdCollision(def.id));
        }
    }
    for def in SC_DEFS {
        if let Err(err) = def.context.init() {
            log::error!("failed to initialize context {} (id {})", def.name, def.id);
            return Err(err);
        }
    }
    Ok(())
}

/// Tear down all registered contexts on shutdown.
pub fn exec_teardown() {
    for def in SC_DEFS {
        def.context.teardown();
    }
}

/******************************
 *
 * Policy parameters
 *
 ******************************/

/// Parameters configured by local node policy. Policy values outlive any
/// single bundle's processing episode and are shared into states by
/// reference, never copied or mutated.
pub type PolicyParms = Vec<Arc<ScValue>>;

/// Create a policy parameter from string input and add it to a list.
pub fn policy_parm_add(
    parms: &mut PolicyParms,
    def: &ScDef,
    key: &str,
    value_text: &str,
) -> SecResult<()> {
    let map = def.context.value_map();
    let entry = value::by_name(map, key).ok_or_else(|| SecError::UnknownValue(key.to_owned()))?;
    if entry.kind != ScValueKind::Parm {
        log::error!(
            "value {} is not a parameter of context {} (id {})",
            key,
            def.name,
            def.id
        );
        return Err(SecError::UnknownValue(key.to_owned()));
    }
    let mut val = entry.decode_str(value_text)?;
    val.loc = crate::value::ScValueLoc::SharedPolicy;
    parms.push(Arc::new(val));
    Ok(())
}

/// Render a policy parameter list as a comma-separated string.
pub fn policy_parm_print(def: &ScDef, parms: &PolicyParms) -> String {
    let map = def.context.value_map();
    let mut parts = Vec::with_capacity(parms.len());
    for val in parms {
        match value::by_id(map, val.id, val.kind) {
            Some(entry) => parts.push(format!("{}={}", entry.name, entry.encode_str(val))),
            None => log::error!("cannot convert value id {} to string", val.id),
        }
    }
    parts.join(",")
}

/******************************
 *
 * Security context state
 *
 ******************************/

/// A parameter held by a state: block-sourced parameters are deep-owned
/// copies, policy-sourced parameters are shared references into the policy
/// store. The split makes the ownership discipline explicit; neither side
/// can be double-freed or leaked.
#[derive(Debug, Clone)]
pub enum ScParm {
    Owned(ScValue),
    Policy(Arc<ScValue>),
}

impl ScParm {
    pub fn value(&self) -> &ScValue {
        match self {
            ScParm::Owned(v) => v,
            ScParm::Policy(v) => v,
        }
    }
}

/// Mutable state tracked while processing one security block.
///
/// A state is initialized when starting to process a security block,
/// incremented once per additional security operation (target) in the
/// block, and cleared exactly once at the end. Parameters are shared by
/// every operation in the block; results belong to the current target only.
pub struct ScState<'a> {
    pub sec_blk_num: u64,
    pub context_id: ScId,
    pub role: ScRole,
    pub action: ScAction,
    pub cur_target: usize,
    pub total_targets: usize,
    pub source: EndpointID,
    pub parms: Vec<ScParm>,
    pub results: Vec<ScValue>,
    /// Unwrapped session key cached after the first target's key unwrap so
    /// later targets in the same block skip the unwrap.
    pub session_key: Option<Vec<u8>>,
    pub keys: &'a dyn KeyStore,
    pub stream_policy: StreamPolicy,
}

impl<'a> std::fmt::Debug for ScState<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScState")
            .field("sec_blk_num", &self.sec_blk_num)
            .field("context_id", &self.context_id)
            .field("role", &self.role)
            .field("action", &self.action)
            .field("cur_target", &self.cur_target)
            .field("total_targets", &self.total_targets)
            .field("source", &self.source)
            .field("parms", &self.parms)
            .field("results", &self.results)
            .field("session_key", &self.session_key)
            .field("stream_policy", &self.stream_policy)
            .finish_non_exhaustive()
    }
}

impl<'a> ScState<'a> {
    /// Initialize a state instance to handle a security service for the
    /// given context. Role/action consistency and the context's offered
    /// services are checked here so contexts can assume a sane pairing.
    #[allow(clippy::too_many_arguments)]
    pub fn init(
        def: &ScDef,
        sec_blk_num: u64,
        role: ScRole,
        action: ScAction,
        source: EndpointID,
        keys: &'a dyn KeyStore,
        policy_parms: &PolicyParms,
        blk_parms: &[ScValue],
        total_targets: usize,
    ) -> SecResult<ScState<'a>> {
        if !action.permitted_for(role) {
            return Err(SecError::RoleActionMismatch(role.as_str(), action.as_str()));
        }
        if !def.services.contains(action.service()) {
            return Err(SecError::ServiceUnsupported(action.as_str()));
        }

        let mut state = ScState {
            sec_blk_num,
            context_id: def.id,
            role,
            action,
            cur_target: 0,
            total_targets,
            source,
            parms: Vec::new(),
            results: Vec::new(),
            session_key: None,
            keys,
            stream_policy: StreamPolicy::default(),
        };
        parm_filter(&mut state, policy_parms, blk_parms);
        Ok(state)
    }

    /// Prepare the state for the next security operation in the block:
    /// advance the target cursor and discard the previous target's results.
    pub fn increment(&mut self) {
        self.cur_target += 1;
        self.results.clear();
    }

    /// Release the state's resources: results, the cached session key and
    /// the parameter list. Policy-sourced parameters only drop their shared
    /// reference. The state must be re-initialized before re-use.
    pub fn clear(&mut self) {
        self.results.clear();
        self.parms.clear();
        self.session_key = None;
        self.cur_target = 0;
        self.total_targets = 0;
    }

    /// Find a parameter by id.
    pub fn parm(&self, id: crate::value::ScValueId) -> Option<&ScValue> {
        self.parms
            .iter()
            .map(|p| p.value())
            .find(|v| v.id == id && v.kind == ScValueKind::Parm)
    }

    pub fn parm_bytes(&self, id: crate::value::ScValueId) -> Option<&[u8]> {
        self.parm(id).map(|v| v.raw.as_slice())
    }

    pub fn push_parm(&mut self, val: ScValue) {
        self.parms.push(ScParm::Owned(val));
    }

    pub fn push_result(&mut self, val: ScValue) {
        self.results.push(val);
    }
}

/// Deconflict parameter definitions when generating a state: every
/// block-supplied parameter is deep copied in first, then every
/// policy-supplied parameter whose id is not already present is appended by
/// reference. Block values win over policy values for the same id.
fn parm_filter(state: &mut ScState<'_>, policy_parms: &PolicyParms, blk_parms: &[ScValue]) {
    for val in blk_parms {
        state.parms.push(ScParm::Owned(val.clone()));
    }
    for polval in policy_parms {
        let duplicate = state
            .parms
            .iter()
            .any(|p| p.value().id == polval.id && p.value().kind == polval.kind);
        if !duplicate {
            state.parms.push(ScParm::Policy(Arc::clone(polval)));
        }
    }
}

/******************************
 *
 * Multiplicity check
 *
 ******************************/

/// Determine whether a new security operation, described by its context and
/// parameter list, may be appended to an existing outbound security block.
///
/// All operations in one block must share the same context, the same
/// security source (which must be local, since only local blocks accept new
/// operations) and the same parameters, compared as an order-independent
/// set on (id, length, content). The cheap checks run first.
pub fn mult_check(
    asb: &SecurityBlock,
    def: &ScDef,
    parms: &PolicyParms,
    local: &EndpointID,
) -> bool {
    if asb.context_id != def.id {
        return false;
    }
    if asb.parms.len() != parms.len() {
        return false;
    }
    if asb.source != *local {
        return false;
    }
    for blk_val in &asb.parms {
        let matched = parms.iter().any(|sop_val| {
            sop_val.id == blk_val.id
                && sop_val.len() == blk_val.len()
                && sop_val.raw == blk_val.raw
        });
        if !matched {
            return false;
        }
    }
    true
}

/******************************
 *
 * Block orchestration
 *
 ******************************/

/// Drive every security operation of an outbound security block through its
/// context: one `process_outbound` call per target, results collected into
/// the block, extra parameters (fresh IVs, wrapped keys) appended to the
/// block's parameter list, the state incremented between targets.
pub fn apply_outbound(
    def: &ScDef,
    state: &mut ScState<'_>,
    bundle: &mut SecBundle,
    asb: &mut SecurityBlock,
) -> SecResult<Vec<(u64, SopOutcome)>> {
    let targets = asb.targets.clone();
    let mut outcomes = Vec::with_capacity(targets.len());
    for (idx, target) in targets.iter().enumerate() {
        let mut extra_parms = Vec::new();
        let outcome = def
            .context
            .process_outbound(state, &mut extra_parms, bundle, asb, *target)?;
        if outcome == SopOutcome::Processed {
            let results = std::mem::take(&mut state.results);
            asb.push_results(*target, results);
        }
        asb.parms.append(&mut extra_parms);
        outcomes.push((*target, outcome));
        if idx + 1 < targets.len() {
            state.increment();
        }
    }
    Ok(outcomes)
}

/// Drive every security operation of a received security block through its
/// context, returning the per-target outcomes. A `CheckFailed` outcome is
/// reported, not raised; system errors abort the walk immediately so the
/// caller can abort its enclosing store transaction.
pub fn process_inbound(
    def: &ScDef,
    state: &mut ScState<'_>,
    bundle: &mut SecBundle,
    asb: &SecurityBlock,
) -> SecResult<Vec<(u64, SopOutcome)>> {
    let targets = asb.targets.clone();
    let mut outcomes = Vec::with_capacity(targets.len());
    for (idx, target) in targets.iter().enumerate() {
        let outcome = def.context.process_inbound(state, bundle, asb, *target)?;
        outcomes.push((*target, outcome));
        if idx + 1 < targets.len() {
            state.increment();
        }
    }
    Ok(outcomes)
}
