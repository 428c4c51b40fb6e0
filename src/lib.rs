//! Rust implementation of the BPSec security context interface for
//! [dtn bundle protocol 7](https://www.rfc-editor.org/rfc/rfc9171.html),
//! covering the [RFC 9172](https://www.rfc-editor.org/rfc/rfc9172.html)
//! security block machinery and the
//! [RFC 9173](https://www.rfc-editor.org/rfc/rfc9173.html) default security
//! contexts (BIB-HMAC-SHA2 and BCB-AES-GCM), plus a site-local test context.
//!
//! # Examples
//!
//! Signing a bundle's payload at the security source with BIB-HMAC-SHA2:
//!
//! ```
//! use bp7sec::bundle::{new_payload_block, SecBundle};
//! use bp7sec::eid::EndpointID;
//! use bp7sec::keys::MemKeyStore;
//! use bp7sec::primary::PrimaryBlockBuilder;
//! use bp7sec::sci::{self, ScAction, ScRole, ScState, SopOutcome};
//!
//! let src = EndpointID::with_ipn(2, 1).unwrap();
//! let dst = EndpointID::with_ipn(1, 2).unwrap();
//! let primary = PrimaryBlockBuilder::new()
//!     .destination(dst)
//!     .source(src.clone())
//!     .report_to(src.clone())
//!     .build();
//! let mut bundle = SecBundle::new(primary, vec![new_payload_block(0, b"hello".to_vec())]);
//!
//! // Node configuration: a long-term key and the context parameters.
//! let mut keys = MemKeyStore::new();
//! keys.insert("bibkey", vec![0x1a; 16]);
//! let def = sci::def_find(sci::bib_hmac_sha2::BIB_HMAC_SHA2_ID).unwrap();
//! let mut policy = Vec::new();
//! sci::policy_parm_add(&mut policy, def, "key_name", "bibkey").unwrap();
//! sci::policy_parm_add(&mut policy, def, "sha_variant", "7").unwrap();
//!
//! // Build the outbound security block and sign the payload.
//! let sec_blk_num = bundle.next_block_number();
//! let mut asb = def.init_outbound_block(&src, &policy);
//! asb.add_target(1);
//! bundle.add_block(sci::new_integrity_block(sec_blk_num, 0, Vec::new()));
//!
//! let mut state = ScState::init(
//!     def, sec_blk_num, ScRole::Source, ScAction::Sign,
//!     src.clone(), &keys, &policy, &[], 1,
//! ).unwrap();
//! let outcomes = sci::apply_outbound(def, &mut state, &mut bundle, &mut asb).unwrap();
//! state.clear();
//!
//! assert_eq!(outcomes, vec![(1, SopOutcome::Processed)]);
//! assert_eq!(asb.target_results(1).unwrap().results.len(), 1);
//! ```

#![forbid(unsafe_code)]

pub mod bundle;
pub mod crc;
pub mod crypto;
pub mod dtntime;
pub mod eid;
pub mod error;
pub mod helpers;
pub mod keys;
pub mod primary;
pub mod sci;
pub mod stream;
pub mod value;

pub use bundle::{ByteBuffer, SecBlock, SecBundle};
pub use eid::EndpointID;
pub use error::{SecError, SecResult};
pub use helpers::{hexify, unhexify};
pub use value::{ScValue, ScValueKind};
