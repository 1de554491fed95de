//! Shared test harness: a scripted in-memory log source.

// not every test binary uses every helper
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use alloy::{
    primitives::{Address, TxHash, U256, address},
    rpc::types::Log,
    sol_types::SolEvent,
};
use tokio::sync::Semaphore;

use market_feed::{
    EventKind, LogSubscription, LogSubscriptionSender, MarketLogSource, SourceError,
    event::{Bought, Listed},
};

pub type Responder =
    Arc<dyn Fn(EventKind, u64, u64) -> Result<Vec<Log>, SourceError> + Send + Sync>;

/// Records every fetch and hands out scripted responses. Subscriptions are
/// plain channels the test pushes into by hand.
pub struct MockSource {
    latest: u64,
    responder: Responder,
    calls: Arc<Mutex<Vec<(EventKind, u64, u64)>>>,
    live: Arc<Mutex<Vec<(EventKind, LogSubscriptionSender)>>>,
    /// When set, every fetch waits for one permit before responding. Lets a
    /// test hold the backfill in place while it drives live delivery.
    gate: Option<Arc<Semaphore>>,
}

impl MockSource {
    pub fn new(latest: u64, responder: Responder) -> Self {
        Self {
            latest,
            responder,
            calls: Arc::new(Mutex::new(Vec::new())),
            live: Arc::new(Mutex::new(Vec::new())),
            gate: None,
        }
    }

    /// A source whose fetches always succeed with no logs.
    pub fn empty(latest: u64) -> Self {
        Self::new(latest, Arc::new(|_, _, _| Ok(Vec::new())))
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Shared handle to the recorded fetch calls; survives moving the source
    /// into a feed.
    pub fn calls(&self) -> Arc<Mutex<Vec<(EventKind, u64, u64)>>> {
        Arc::clone(&self.calls)
    }

    /// Shared handle to the open subscription senders.
    pub fn live(&self) -> Arc<Mutex<Vec<(EventKind, LogSubscriptionSender)>>> {
        Arc::clone(&self.live)
    }
}

impl MarketLogSource for MockSource {
    async fn latest_block(&self) -> Result<u64, SourceError> {
        Ok(self.latest)
    }

    async fn fetch_logs(
        &self,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, SourceError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        self.calls.lock().unwrap().push((kind, from_block, to_block));
        (self.responder)(kind, from_block, to_block)
    }

    async fn subscribe(&self, kind: EventKind) -> Result<LogSubscription, SourceError> {
        let (sender, subscription) = LogSubscription::channel(16);
        self.live.lock().unwrap().push((kind, sender));
        Ok(subscription)
    }
}

/// Ranges fetched for one event kind, in call order.
pub fn ranges_for(
    calls: &Arc<Mutex<Vec<(EventKind, u64, u64)>>>,
    kind: EventKind,
) -> Vec<(u64, u64)> {
    calls
        .lock()
        .unwrap()
        .iter()
        .filter(|(k, _, _)| *k == kind)
        .map(|(_, from, to)| (*from, *to))
        .collect()
}

/// Pushes one live batch into every open subscription of the given kind.
pub fn push_live(
    live: &Arc<Mutex<Vec<(EventKind, LogSubscriptionSender)>>>,
    kind: EventKind,
    logs: Vec<Log>,
) {
    let senders = live.lock().unwrap();
    for (k, sender) in senders.iter() {
        if *k == kind {
            sender.logs.try_send(Ok(logs.clone())).expect("subscription channel full");
        }
    }
}

const NFT: Address = address!("0x4b78DcD21Edb2A51881Cb4B0328fFfa3A8dA9FB0");
const PAY: Address = address!("0x3333333333333333333333333333333333333333");

fn rpc_log(data: alloy::primitives::LogData, block: u64, log_index: u64) -> Log {
    Log {
        inner: alloy::primitives::Log { address: NFT, data },
        block_hash: None,
        block_number: Some(block),
        block_timestamp: None,
        transaction_hash: Some(TxHash::repeat_byte((block % 251) as u8)),
        transaction_index: None,
        log_index: Some(log_index),
        removed: false,
    }
}

/// A `Listed` log at the given chain position, distinguishable by token id.
pub fn listed_log(block: u64, log_index: u64, token_id: u64) -> Log {
    let ev = Listed {
        nft: NFT,
        tokenId: U256::from(token_id),
        seller: address!("0x1111111111111111111111111111111111111111"),
        price: U256::from(1_000u64),
        paymentToken: PAY,
    };
    rpc_log(ev.encode_log_data(), block, log_index)
}

/// A `Bought` log at the given chain position.
pub fn bought_log(block: u64, log_index: u64, token_id: u64) -> Log {
    let ev = Bought {
        nft: NFT,
        tokenId: U256::from(token_id),
        buyer: address!("0x4444444444444444444444444444444444444444"),
        price: U256::from(500u64),
        paymentToken: PAY,
    };
    rpc_log(ev.encode_log_data(), block, log_index)
}
