use super::crc::*;
use super::eid::EndpointID;
use super::error::{SecError, SecResult};
use super::primary::PrimaryBlock;
use super::stream::StreamObject;
use core::fmt;
use serde::de::{SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{de, Deserialize, Deserializer, Serialize};

/// Version for bundle protocol standard is 7.
pub const DTN_VERSION: u32 = 7;

pub type ByteBuffer = Vec<u8>;

pub type DtnVersionType = u32;
pub type BundleControlFlagsType = u64;
pub type BlockControlFlagsType = u64;
pub type CanonicalBlockType = u64;
pub type FragOffsetType = u64;
pub type LifetimeType = u64;
pub type TotalDataLengthType = u64;

/// The bundle is a fragment.
pub const BUNDLE_IS_FRAGMENT: BundleControlFlagsType = 0x01;

/// Block number used to address the primary block in a security target list.
pub const PRIMARY_BLOCK_NUMBER: u64 = 0;

// PAYLOAD_BLOCK is a BlockType for a payload block as defined in RFC 9171, 4.3.1.
pub const PAYLOAD_BLOCK: CanonicalBlockType = 1;
pub const PAYLOAD_BLOCK_NUMBER: u64 = 1;

// https://www.rfc-editor.org/rfc/rfc9172.html#BlockType
pub const INTEGRITY_BLOCK: CanonicalBlockType = 11;
pub const CONFIDENTIALITY_BLOCK: CanonicalBlockType = 12;

/// The block header fields that are re-serialized into AAD/IPPT material:
/// block type, block number and block processing control flags. The
/// block-type-specific data and any CRC are never part of this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHead {
    pub block_type: CanonicalBlockType,
    pub block_number: u64,
    pub block_control_flags: BlockControlFlagsType,
}

/******************************
 *
 * Canonical Block
 *
 ******************************/

/// A canonical block carrying its block-type-specific data as raw bytes.
///
/// The security context interface treats all block payloads as opaque; only
/// the payload block is ever large enough to need streamed access.
#[derive(Debug, Clone, PartialEq)]
pub struct SecBlock {
    pub block_type: CanonicalBlockType,
    pub block_number: u64,
    pub block_control_flags: BlockControlFlagsType,
    pub crc: CrcValue,
    pub data: ByteBuffer,
}

impl SecBlock {
    pub fn head(&self) -> BlockHead {
        BlockHead {
            block_type: self.block_type,
            block_number: self.block_number,
            block_control_flags: self.block_control_flags,
        }
    }
    pub fn to_cbor(&self) -> ByteBuffer {
        serde_cbor::to_vec(&self).expect("Error exporting block to cbor")
    }
}

impl Serialize for SecBlock {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let crc_bytes = self.crc.bytes();
        let num_elems = if crc_bytes.is_some() { 6 } else { 5 };

        let mut seq = serializer.serialize_seq(Some(num_elems))?;
        seq.serialize_element(&self.block_type)?;
        seq.serialize_element(&self.block_number)?;
        seq.serialize_element(&self.block_control_flags)?;
        seq.serialize_element(&self.crc.to_code())?;
        seq.serialize_element(&serde_bytes::Bytes::new(&self.data))?;
        if let Some(buf) = crc_bytes {
            seq.serialize_element(&serde_bytes::Bytes::new(buf))?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for SecBlock {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SecBlockVisitor;

        impl<'de> Visitor<'de> for SecBlockVisitor {
            type Value = SecBlock;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("SecBlock")
            }

            fn visit_seq<V>(self, mut seq: V) -> Result<Self::Value, V::Error>
            where
                V: SeqAccess<'de>,
            {
                let block_type: CanonicalBlockType = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let block_number: u64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let block_control_flags: BlockControlFlagsType = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(2, &self))?;
                let crc_type: CrcRawType = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(3, &self))?;
                let data = seq
                    .next_element::<serde_bytes::ByteBuf>()?
                    .ok_or_else(|| de::Error::invalid_length(4, &self))?
                    .into_vec();
                let crc = if crc_type == CRC_NO {
                    CrcValue::CrcNo
                } else {
                    let crcbuf: ByteBuffer = seq
                        .next_element::<serde_bytes::ByteBuf>()?
                        .ok_or_else(|| de::Error::invalid_length(5, &self))?
                        .into_vec();
                    CrcValue::from_parts(crc_type, &crcbuf)
                        .ok_or_else(|| de::Error::invalid_length(5, &self))?
                };

                Ok(SecBlock {
                    block_type,
                    block_number,
                    block_control_flags,
                    crc,
                    data,
                })
            }
        }

        deserializer.deserialize_any(SecBlockVisitor)
    }
}

pub fn new_canonical_block(
    block_type: CanonicalBlockType,
    block_number: u64,
    block_control_flags: BlockControlFlagsType,
    data: ByteBuffer,
) -> SecBlock {
    SecBlock {
        block_type,
        block_number,
        block_control_flags,
        crc: CrcValue::CrcNo,
        data,
    }
}

pub fn new_payload_block(block_control_flags: BlockControlFlagsType, data: ByteBuffer) -> SecBlock {
    new_canonical_block(
        PAYLOAD_BLOCK,
        PAYLOAD_BLOCK_NUMBER,
        block_control_flags,
        data,
    )
}

/******************************
 *
 * Bundle
 *
 ******************************/

/// A bundle as seen by the security context interface: one primary block and
/// a list of canonical blocks.
///
/// The same structure serves as the outbound (not-yet-serialized) and the
/// inbound (freshly-deserialized) view of a bundle; both directions feed the
/// identical canonicalization path, so a sender's AAD/IPPT always equals the
/// receiver's for the same logical bundle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SecBundle {
    pub primary: PrimaryBlock,
    pub canonicals: Vec<SecBlock>,
}

impl SecBundle {
    pub fn new(primary: PrimaryBlock, canonicals: Vec<SecBlock>) -> SecBundle {
        SecBundle {
            primary,
            canonicals,
        }
    }

    pub fn source(&self) -> &EndpointID {
        &self.primary.source
    }

    /// Canonical encoding of the primary block.
    pub fn primary_cbor(&self) -> SecResult<ByteBuffer> {
        Ok(serde_cbor::to_vec(&self.primary)?)
    }

    pub fn block_by_number(&self, block_number: u64) -> Option<&SecBlock> {
        self.canonicals
            .iter()
            .find(|b| b.block_number == block_number)
    }

    fn block_by_number_mut(&mut self, block_number: u64) -> Option<&mut SecBlock> {
        self.canonicals
            .iter_mut()
            .find(|b| b.block_number == block_number)
    }

    /// Header fields of a canonical block; the primary block has none.
    pub fn block_head(&self, block_number: u64) -> Option<BlockHead> {
        self.block_by_number(block_number).map(|b| b.head())
    }

    /// Raw block-type-specific data of a canonical block.
    pub fn block_data(&self, block_number: u64) -> SecResult<&[u8]> {
        self.block_by_number(block_number)
            .map(|b| b.data.as_slice())
            .ok_or(SecError::BlockNotFound(block_number))
    }

    /// Replace the block-type-specific data of a canonical block.
    pub fn set_block_data(&mut self, block_number: u64, data: ByteBuffer) -> SecResult<()> {
        let blk = self
            .block_by_number_mut(block_number)
            .ok_or(SecError::BlockNotFound(block_number))?;
        blk.data = data;
        Ok(())
    }

    /// Block-type-specific data in its wire framing, a CBOR byte string.
    pub fn block_data_wire(&self, block_number: u64) -> SecResult<ByteBuffer> {
        let data = self.block_data(block_number)?;
        Ok(serde_cbor::to_vec(&serde_bytes::Bytes::new(data))?)
    }

    /// Detach the payload as a stream object. The bundle keeps an empty
    /// payload until [`SecBundle::replace_payload`] hands a new object back.
    pub fn take_payload(&mut self) -> SecResult<StreamObject> {
        let blk = self
            .block_by_number_mut(PAYLOAD_BLOCK_NUMBER)
            .ok_or(SecError::BlockNotFound(PAYLOAD_BLOCK_NUMBER))?;
        let data = std::mem::take(&mut blk.data);
        Ok(StreamObject::from_vec(data))
    }

    /// Install a transformed payload object, consuming it.
    pub fn replace_payload(&mut self, payload: StreamObject) -> SecResult<()> {
        let data = payload.into_vec()?;
        self.set_block_data(PAYLOAD_BLOCK_NUMBER, data)
    }

    /// Smallest unused block number, for appending security blocks.
    pub fn next_block_number(&self) -> u64 {
        self.canonicals
            .iter()
            .map(|b| b.block_number)
            .max()
            .unwrap_or(PAYLOAD_BLOCK_NUMBER)
            + 1
    }

    pub fn add_block(&mut self, block: SecBlock) {
        self.canonicals.push(block);
    }

    /// Serialize bundle as CBOR encoded byte buffer, using the
    /// indefinite-length array encoding of RFC 9171.
    pub fn to_cbor(&self) -> SecResult<ByteBuffer> {
        let mut buf: ByteBuffer = vec![0x9f];
        buf.append(&mut serde_cbor::to_vec(&self.primary)?);
        for blk in &self.canonicals {
            buf.append(&mut serde_cbor::to_vec(blk)?);
        }
        buf.push(0xff); // break mark
        Ok(buf)
    }

    /// Deserialize a bundle from its CBOR wire form.
    pub fn from_cbor(data: &[u8]) -> SecResult<SecBundle> {
        let items: Vec<serde_cbor::Value> = serde_cbor::from_slice(data)?;
        let mut iter = items.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| SecError::Decode("empty bundle".to_string()))?;
        let primary: PrimaryBlock = serde_cbor::value::from_value(first)?;
        let mut canonicals = Vec::new();
        for item in iter {
            canonicals.push(serde_cbor::value::from_value::<SecBlock>(item)?);
        }
        Ok(SecBundle {
            primary,
            canonicals,
        })
    }
}
