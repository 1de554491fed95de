//! The node query boundary.
//!
//! [`MarketLogSource`] abstracts the three node interactions the feed needs:
//! the latest block number, bounded `eth_getLogs` queries, and standing log
//! subscriptions. [`NodeLogSource`] is the production implementation over an
//! Alloy provider; tests substitute deterministic in-memory sources.

use alloy::{
    network::{Ethereum, Network},
    primitives::Address,
    providers::{Provider, RootProvider},
    rpc::types::{Filter, Log},
};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tracing::{debug, info, warn};

use crate::{error::SourceError, event::EventKind};

/// Buffer size of a [`LogSubscription`] channel.
pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 128;

/// A source of marketplace logs for one contract.
///
/// * [`fetch_logs`](MarketLogSource::fetch_logs) covers exactly the requested
///   range or fails with a classified [`SourceError`]. Callers must pass
///   `from_block <= to_block`. Zero logs is success. The source performs no
///   internal retry; back-off policy belongs to the caller.
/// * [`subscribe`](MarketLogSource::subscribe) opens a standing push channel
///   for one event kind; delivery stops only when the returned
///   [`SubscriptionHandle`] is closed.
pub trait MarketLogSource: Send + Sync + 'static {
    /// Latest block number at the node.
    fn latest_block(&self) -> impl Future<Output = Result<u64, SourceError>> + Send;

    /// Fetches matching logs for `[from_block, to_block]`, both inclusive.
    fn fetch_logs(
        &self,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = Result<Vec<Log>, SourceError>> + Send;

    /// Opens a standing subscription for `kind`.
    fn subscribe(
        &self,
        kind: EventKind,
    ) -> impl Future<Output = Result<LogSubscription, SourceError>> + Send;
}

/// Consumer half of a log subscription: the pushed log batches plus the
/// explicit close handle.
pub struct LogSubscription {
    logs: mpsc::Receiver<Result<Vec<Log>, SourceError>>,
    handle: SubscriptionHandle,
}

impl LogSubscription {
    /// Creates a subscription channel pair.
    ///
    /// The producer half is handed to whatever forwards node pushes; the
    /// consumer half is returned to the subscriber.
    #[must_use]
    pub fn channel(capacity: usize) -> (LogSubscriptionSender, LogSubscription) {
        let (log_tx, log_rx) = mpsc::channel(capacity);
        let (close_tx, close_rx) = oneshot::channel();

        let sender = LogSubscriptionSender { logs: log_tx, closed: close_rx };
        let subscription =
            LogSubscription { logs: log_rx, handle: SubscriptionHandle { close: close_tx } };

        (sender, subscription)
    }

    /// Splits into the batch stream and the close handle, so the stream can
    /// be consumed by one task while another retains the ability to stop it.
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (ReceiverStream<Result<Vec<Log>, SourceError>>, SubscriptionHandle) {
        (ReceiverStream::new(self.logs), self.handle)
    }
}

/// Producer half of a log subscription.
pub struct LogSubscriptionSender {
    /// Channel for pushed log batches. Each send is one atomic batch.
    pub logs: mpsc::Sender<Result<Vec<Log>, SourceError>>,
    /// Resolves when the consumer closes (or drops) its handle; producers
    /// should stop forwarding at that point.
    pub closed: oneshot::Receiver<()>,
}

/// Explicit stop signal for a log subscription.
///
/// Closing the handle is the only sanctioned way to end delivery; the feed
/// engine closes every open handle on shutdown. Dropping the handle without
/// calling [`close`](SubscriptionHandle::close) has the same effect.
#[derive(Debug)]
pub struct SubscriptionHandle {
    close: oneshot::Sender<()>,
}

impl SubscriptionHandle {
    /// Stops delivery on the subscription this handle belongs to.
    pub fn close(self) {
        // the receiver may already be gone; either way delivery ends
        let _ = self.close.send(());
    }
}

/// [`MarketLogSource`] over an Alloy provider, scoped to one market contract.
#[derive(Clone, Debug)]
pub struct NodeLogSource<N: Network = Ethereum> {
    provider: RootProvider<N>,
    address: Address,
}

impl<N: Network> NodeLogSource<N> {
    #[must_use]
    pub fn new(provider: RootProvider<N>, address: Address) -> Self {
        Self { provider, address }
    }

    fn filter_for(&self, kind: EventKind) -> Filter {
        Filter::new().address(self.address).event_signature(kind.signature_hash())
    }
}

impl<N: Network> MarketLogSource for NodeLogSource<N> {
    async fn latest_block(&self) -> Result<u64, SourceError> {
        self.provider.get_block_number().await.map_err(SourceError::from)
    }

    async fn fetch_logs(
        &self,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, SourceError> {
        debug_assert!(from_block <= to_block);

        let filter = self.filter_for(kind).from_block(from_block).to_block(to_block);
        self.provider.get_logs(&filter).await.map_err(SourceError::classify)
    }

    async fn subscribe(&self, kind: EventKind) -> Result<LogSubscription, SourceError> {
        let filter = self.filter_for(kind);
        let node_subscription =
            self.provider.subscribe_logs(&filter).await.map_err(SourceError::from)?;

        info!(kind = %kind, address = %self.address, "log subscription opened");

        let (sender, subscription) = LogSubscription::channel(DEFAULT_SUBSCRIPTION_BUFFER);
        let LogSubscriptionSender { logs, mut closed } = sender;
        let mut stream = node_subscription.into_stream();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut closed => {
                        debug!(kind = %kind, "subscription closed by handle");
                        break;
                    }
                    next = stream.next() => match next {
                        Some(log) => {
                            if logs.send(Ok(vec![log])).await.is_err() {
                                debug!(kind = %kind, "subscriber dropped, stopping forwarder");
                                break;
                            }
                        }
                        None => {
                            warn!(kind = %kind, "node closed log subscription");
                            let _ = logs.send(Err(SourceError::SubscriptionClosed)).await;
                            break;
                        }
                    }
                }
            }
        });

        Ok(subscription)
    }
}
