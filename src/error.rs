use thiserror::Error;

/// Result alias used throughout the security context interface.
pub type SecResult<T> = Result<T, SecError>;

/// Errors raised while processing security operations.
///
/// Cryptographic *rejections* (a bad signature, a failed AEAD check) are not
/// errors; they surface as [`crate::sci::SopOutcome::CheckFailed`] so callers
/// can tell "the data is bad" apart from "the system is broken". The single
/// exception is [`SecError::AuthFailed`], which the streamed cipher driver
/// uses internally and which the contexts map back into a check failure.
#[derive(Error, Debug)]
pub enum SecError {
    #[error("unknown security context id {0}")]
    UnknownContext(i16),
    #[error("security context id {0} registered more than once")]
    ContextIdCollision(i16),
    #[error("context does not offer service `{0}`")]
    ServiceUnsupported(&'static str),
    #[error("role `{0}` cannot perform action `{1}`")]
    RoleActionMismatch(&'static str, &'static str),
    #[error("unknown security context value `{0}`")]
    UnknownValue(String),
    #[error("missing security parameter `{0}`")]
    MissingParm(&'static str),
    #[error("missing security result `{0}`")]
    MissingResult(&'static str),
    #[error("key `{0}` not found in key store")]
    KeyNotFound(String),
    #[error("cannot unwrap session key: {0}")]
    KeyUnwrap(String),
    #[error("invalid scope flags 0x{0:x}")]
    BadScope(u64),
    #[error("block {0} is not a valid target for this operation")]
    BadTarget(u64),
    #[error("initialization vector already used for this security block")]
    IvReuse,
    #[error("block {0} not found in bundle")]
    BlockNotFound(u64),
    #[error("cipher output length {actual} differs from block data length {expected}")]
    BlockResize { expected: usize, actual: usize },
    #[error("stream object has no data")]
    EmptyStream,
    #[error("authentication failed")]
    AuthFailed,
    #[error("cipher failure: {0}")]
    Crypto(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("cbor error: {0}")]
    Cbor(#[from] serde_cbor::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
