//! Abstract Security Block: the in-memory form of a BIB or BCB before and
//! after its block-type-specific data is CBOR encoded.
//!
//! The enclosing canonical-block framing belongs to the bundle layer; this
//! module covers the security-block fields of RFC 9172 and the CBOR coding
//! of individual parameters and results, which is driven by the owning
//! context's value map.

use crate::bundle::{
    new_canonical_block, BlockControlFlagsType, ByteBuffer, SecBlock, CONFIDENTIALITY_BLOCK,
    INTEGRITY_BLOCK,
};
use crate::eid::EndpointID;
use crate::error::{SecError, SecResult};
use crate::sci::{PolicyParms, ScId};
use crate::value::{self, ScValue, ScValueKind, ScValueMapEntry};
use serde::Deserialize;
use serde_cbor::Value;

// Security Context Flags
pub type SecurityContextFlag = u8;
pub const SEC_CONTEXT_ABSENT: SecurityContextFlag = 0;
pub const SEC_CONTEXT_PRESENT: SecurityContextFlag = 1;

/// The security results generated for one target of a security block.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetResults {
    pub target: u64,
    pub results: Vec<ScValue>,
}

/// Abstract security block shared by BIBs and BCBs.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityBlock {
    pub targets: Vec<u64>,
    pub context_id: ScId,
    pub context_flags: SecurityContextFlag,
    pub source: EndpointID,
    pub parms: Vec<ScValue>,
    pub results: Vec<TargetResults>,
}

impl SecurityBlock {
    /// Initialize an outbound security block at a security source,
    /// recording the context id, the declared security source and deep
    /// copies of the supplied policy parameters.
    pub fn init_outbound(
        context_id: ScId,
        source: EndpointID,
        policy_parms: &PolicyParms,
    ) -> SecurityBlock {
        let parms: Vec<ScValue> = policy_parms.iter().map(|p| (**p).clone()).collect();
        let context_flags = if parms.is_empty() {
            SEC_CONTEXT_ABSENT
        } else {
            SEC_CONTEXT_PRESENT
        };
        SecurityBlock {
            targets: Vec::new(),
            context_id,
            context_flags,
            source,
            parms,
            results: Vec::new(),
        }
    }

    pub fn add_target(&mut self, target: u64) {
        self.targets.push(target);
    }

    pub fn target_results(&self, target: u64) -> Option<&TargetResults> {
        self.results.iter().find(|r| r.target == target)
    }

    pub fn push_results(&mut self, target: u64, results: Vec<ScValue>) {
        self.results.push(TargetResults { target, results });
    }

    /// Serialize the block-type-specific data of this security block.
    ///
    /// Parameters and results are written as `[[id, value], ...]` arrays in
    /// the wire form their value-map entries define; values without a wire
    /// representation (policy-only, e.g. key names) are skipped.
    pub fn to_cbor(&self, map: &[ScValueMapEntry]) -> SecResult<ByteBuffer> {
        let mut out: ByteBuffer = Vec::new();
        out.append(&mut serde_cbor::to_vec(&self.targets)?);
        out.append(&mut serde_cbor::to_vec(&self.context_id)?);
        out.append(&mut serde_cbor::to_vec(&self.context_flags)?);
        out.append(&mut serde_cbor::to_vec(&self.source)?);

        if self.context_flags & SEC_CONTEXT_PRESENT != 0 {
            let parms = wire_values(map, &self.parms)?;
            out.append(&mut serde_cbor::to_vec(&Value::Array(parms))?);
        }

        let mut result_sets = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let set = self
                .target_results(*target)
                .map(|r| r.results.as_slice())
                .unwrap_or(&[]);
            result_sets.push(Value::Array(wire_values(map, set)?));
        }
        out.append(&mut serde_cbor::to_vec(&Value::Array(result_sets))?);

        Ok(out)
    }

    /// Parse the block-type-specific data of a received security block.
    pub fn from_cbor(data: &[u8], map: &[ScValueMapEntry]) -> SecResult<SecurityBlock> {
        let mut de = serde_cbor::Deserializer::from_slice(data);

        let targets = Vec::<u64>::deserialize(&mut de)?;
        let context_id = ScId::deserialize(&mut de)?;
        let context_flags = SecurityContextFlag::deserialize(&mut de)?;
        let source = EndpointID::deserialize(&mut de)?;

        let parms = if context_flags & SEC_CONTEXT_PRESENT != 0 {
            let raw = Value::deserialize(&mut de)?;
            parse_values(map, &raw, ScValueKind::Parm)?
        } else {
            Vec::new()
        };

        let raw_results = Value::deserialize(&mut de)?;
        let sets = match raw_results {
            Value::Array(sets) => sets,
            _ => return Err(SecError::Decode("malformed security results".to_string())),
        };
        if sets.len() != targets.len() {
            return Err(SecError::Decode(format!(
                "{} result sets for {} targets",
                sets.len(),
                targets.len()
            )));
        }
        let mut results = Vec::with_capacity(sets.len());
        for (target, set) in targets.iter().zip(sets.iter()) {
            results.push(TargetResults {
                target: *target,
                results: parse_values(map, set, ScValueKind::Result)?,
            });
        }

        Ok(SecurityBlock {
            targets,
            context_id,
            context_flags,
            source,
            parms,
            results,
        })
    }
}

fn wire_values(map: &[ScValueMapEntry], values: &[ScValue]) -> SecResult<Vec<Value>> {
    let mut out = Vec::with_capacity(values.len());
    for val in values {
        let entry = match value::by_id(map, val.id, val.kind) {
            Some(entry) => entry,
            None => {
                return Err(SecError::UnknownValue(format!(
                    "value id {} unknown to this context",
                    val.id
                )))
            }
        };
        if !entry.wire {
            log::debug!("skipping wire encoding of policy-only value `{}`", entry.name);
            continue;
        }
        out.push(Value::Array(vec![
            Value::Integer(val.id as i128),
            entry.cbor_encode(val)?,
        ]));
    }
    Ok(out)
}

fn parse_values(
    map: &[ScValueMapEntry],
    raw: &Value,
    kind: ScValueKind,
) -> SecResult<Vec<ScValue>> {
    let items = match raw {
        Value::Array(items) => items,
        _ => return Err(SecError::Decode("malformed value list".to_string())),
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let pair = match item {
            Value::Array(pair) if pair.len() == 2 => pair,
            _ => return Err(SecError::Decode("malformed value pair".to_string())),
        };
        let id = match &pair[0] {
            Value::Integer(i) if *i >= 0 => *i as u32,
            _ => return Err(SecError::Decode("malformed value id".to_string())),
        };
        let entry = value::by_id(map, id, kind)
            .ok_or_else(|| SecError::UnknownValue(format!("value id {}", id)))?;
        out.push(entry.cbor_decode(&pair[1])?);
    }
    Ok(out)
}

/// Wrap a serialized BIB into its canonical block (block type 11).
pub fn new_integrity_block(
    block_number: u64,
    block_control_flags: BlockControlFlagsType,
    security_block: ByteBuffer,
) -> SecBlock {
    new_canonical_block(
        INTEGRITY_BLOCK,
        block_number,
        block_control_flags,
        security_block,
    )
}

/// Wrap a serialized BCB into its canonical block (block type 12).
pub fn new_confidentiality_block(
    block_number: u64,
    block_control_flags: BlockControlFlagsType,
    security_block: ByteBuffer,
) -> SecBlock {
    new_canonical_block(
        CONFIDENTIALITY_BLOCK,
        block_number,
        block_control_flags,
        security_block,
    )
}
