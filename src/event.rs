use std::{fmt, time::SystemTime};

use alloy::{
    primitives::{Address, B256, TxHash, U256},
    rpc::types::Log,
    sol,
    sol_types::SolEvent,
};
use tracing::{debug, warn};

sol! {
    #[derive(Debug, PartialEq, Eq)]
    event Listed(address indexed nft, uint256 indexed tokenId, address seller, uint256 price, address paymentToken);

    #[derive(Debug, PartialEq, Eq)]
    event Bought(address indexed nft, uint256 indexed tokenId, address buyer, uint256 price, address paymentToken);
}

/// The two marketplace event kinds the feed tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Listed,
    Bought,
}

impl EventKind {
    pub const ALL: [EventKind; 2] = [EventKind::Listed, EventKind::Bought];

    /// The `topic0` hash identifying this event in log filters.
    #[must_use]
    pub fn signature_hash(self) -> B256 {
        match self {
            EventKind::Listed => Listed::SIGNATURE_HASH,
            EventKind::Bought => Bought::SIGNATURE_HASH,
        }
    }

    /// The full Solidity event signature.
    #[must_use]
    pub fn signature(self) -> &'static str {
        match self {
            EventKind::Listed => Listed::SIGNATURE,
            EventKind::Bought => Bought::SIGNATURE,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Listed => f.write_str("Listed"),
            EventKind::Bought => f.write_str("Bought"),
        }
    }
}

/// The per-kind actor of a marketplace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketAction {
    Listed { seller: Address },
    Bought { buyer: Address },
}

/// One observed marketplace event.
///
/// Events are value types: there is no identity beyond the field values, so
/// exact duplicates are indistinguishable without external context.
/// `observed_at` is engine-local wall-clock time, not chain block time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketEvent {
    pub nft: Address,
    pub token_id: U256,
    pub price: U256,
    pub payment_token: Address,
    pub action: MarketAction,
    pub tx_hash: Option<TxHash>,
    pub observed_at: SystemTime,
}

impl MarketEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self.action {
            MarketAction::Listed { .. } => EventKind::Listed,
            MarketAction::Bought { .. } => EventKind::Bought,
        }
    }
}

/// A raw log decoded by event signature.
///
/// Unknown signatures decode to [`DecodedLog::Unrecognized`] instead of being
/// silently cast; callers skip them and keep processing the batch.
#[derive(Debug, PartialEq, Eq)]
pub enum DecodedLog {
    Listed(Listed),
    Bought(Bought),
    Unrecognized,
}

/// Decodes a single log by its `topic0`.
///
/// # Errors
///
/// Returns an error when the log carries a known signature but its fields
/// cannot be decoded. Unknown signatures are not an error.
pub fn decode_market_log(log: &Log) -> Result<DecodedLog, alloy::sol_types::Error> {
    let Some(topic0) = log.topic0() else {
        return Ok(DecodedLog::Unrecognized);
    };

    if *topic0 == Listed::SIGNATURE_HASH {
        Ok(DecodedLog::Listed(Listed::decode_log(&log.inner)?.data))
    } else if *topic0 == Bought::SIGNATURE_HASH {
        Ok(DecodedLog::Bought(Bought::decode_log(&log.inner)?.data))
    } else {
        Ok(DecodedLog::Unrecognized)
    }
}

/// Decodes a batch of raw logs into [`MarketEvent`]s, stamping each with the
/// current wall-clock time.
///
/// Undecodable and unrecognized logs are skipped with a log line; they never
/// abort the rest of the batch.
#[must_use]
pub fn decode_batch(logs: &[Log]) -> Vec<MarketEvent> {
    let observed_at = SystemTime::now();

    logs.iter()
        .filter_map(|log| match decode_market_log(log) {
            Ok(DecodedLog::Listed(ev)) => Some(MarketEvent {
                nft: ev.nft,
                token_id: ev.tokenId,
                price: ev.price,
                payment_token: ev.paymentToken,
                action: MarketAction::Listed { seller: ev.seller },
                tx_hash: log.transaction_hash,
                observed_at,
            }),
            Ok(DecodedLog::Bought(ev)) => Some(MarketEvent {
                nft: ev.nft,
                token_id: ev.tokenId,
                price: ev.price,
                payment_token: ev.paymentToken,
                action: MarketAction::Bought { buyer: ev.buyer },
                tx_hash: log.transaction_hash,
                observed_at,
            }),
            Ok(DecodedLog::Unrecognized) => {
                debug!(topic0 = ?log.topic0(), "skipping log with unrecognized signature");
                None
            }
            Err(error) => {
                warn!(error = %error, topic0 = ?log.topic0(), "skipping undecodable log");
                None
            }
        })
        .collect()
}
