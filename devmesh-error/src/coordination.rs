use thiserror::Error;

/// Classifies coordination-service failures to avoid ad-hoc strings.
///
/// These originate from the shared store (topics, buckets, semaphores,
/// entity maps) and are never absorbed into a successful reply.
#[derive(Error, Debug, Clone)]
pub enum CoordinationError {
    /// The backing store cannot be reached or is shutting down
    #[error("coordination service unavailable: {0}")]
    Unavailable(String),
    /// A payload could not be encoded for the wire
    #[error("coordination encode failure: {0}")]
    Encode(String),
    /// A stored payload could not be decoded
    #[error("coordination decode failure: {0}")]
    Decode(String),
    /// A subscription could not be established or was torn down unexpectedly
    #[error("coordination subscription failure: {0}")]
    Subscription(String),
    /// TTL or expiry argument was invalid
    #[error("coordination ttl invalid: {0}")]
    InvalidTtl(String),
    /// Generic coordination error message
    #[error("coordination error: {0}")]
    Msg(String),
}

impl From<serde_json::Error> for CoordinationError {
    #[inline]
    fn from(e: serde_json::Error) -> Self {
        CoordinationError::Decode(e.to_string())
    }
}
