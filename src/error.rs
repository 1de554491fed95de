use std::sync::Arc;

use alloy::transports::{RpcError, TransportErrorKind};
use thiserror::Error;

/// Errors from the node query boundary.
///
/// `SourceError` deliberately carries no retry logic of its own: classification
/// happens here, policy lives in the caller. The backfill walker shrinks the
/// batch on [`SourceError::RangeTooLarge`] and abandons the walk on anything
/// else; live subscribers report and keep listening.
#[derive(Error, Debug, Clone)]
pub enum SourceError {
    /// The provider rejected the requested block span as too wide.
    ///
    /// Providers signal this with an opaque message rather than a numeric
    /// limit, so it is detected by pattern-matching the error text.
    #[error("block range too large")]
    RangeTooLarge,

    /// Any other transport-level failure.
    #[error("transport error: {0}")]
    Transport(Arc<RpcError<TransportErrorKind>>),

    /// The underlying log subscription ended (for example, the WebSocket
    /// connection dropped and the node closed the push channel).
    #[error("log subscription closed")]
    SubscriptionClosed,
}

impl SourceError {
    /// Classifies a raw RPC error.
    ///
    /// An error whose message matches a range/size pattern becomes
    /// [`SourceError::RangeTooLarge`]; everything else is
    /// [`SourceError::Transport`]. A response with zero logs is success and
    /// never reaches this point.
    ///
    /// The patterns cover both phrasings providers use for the cap: a limit
    /// on the block span ("range", "too large") and a limit on the result
    /// count ("too many", "more than N results").
    pub fn classify(error: RpcError<TransportErrorKind>) -> Self {
        let text = error.to_string().to_ascii_lowercase();
        if text.contains("range")
            || text.contains("too large")
            || text.contains("too many")
            || text.contains("more than")
        {
            SourceError::RangeTooLarge
        } else {
            SourceError::Transport(Arc::new(error))
        }
    }
}

impl From<RpcError<TransportErrorKind>> for SourceError {
    fn from(error: RpcError<TransportErrorKind>) -> Self {
        SourceError::Transport(Arc::new(error))
    }
}

/// Errors surfaced by [`MarketFeed`](crate::MarketFeed).
#[derive(Error, Debug, Clone)]
pub enum FeedError {
    /// A configuration parameter is malformed. Caught by the builder before
    /// any network call.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// The requested historical range is degenerate in a way the caller must
    /// fix (`from` above `to`).
    #[error("invalid block range: from {from} exceeds to {to}")]
    InvalidRange { from: u64, to: u64 },

    /// A node query failed.
    #[error(transparent)]
    Source(#[from] SourceError),
}
