//! market-feed maintains a bounded, newest-first feed of NFT marketplace events.
//!
//! The main entry point is [`MarketFeed`], built via [`MarketFeedBuilder`]. Once
//! [started](MarketFeed::start), the feed runs two producers in parallel:
//!
//! * a one-shot **backfill** over a historical block range, driven by
//!   [`AdaptiveBatchWalker`](backfill::AdaptiveBatchWalker), which discovers a
//!   working `eth_getLogs` block-range width at runtime (providers reject
//!   oversized ranges with an opaque error rather than a numeric limit), and
//! * one standing **live subscription** per event kind, delivering new logs as
//!   the node pushes them.
//!
//! Both producers merge into a single capped [`EventBuffer`](buffer::EventBuffer);
//! consumers read it with [`MarketFeed::snapshot`] and are notified of every
//! merge through [`MarketFeed::updates`].
//!
//! # Ordering
//!
//! Order is exact within one merged batch. Across merges the only guarantee is
//! that the most recently merged batch sits closest to the head: a live event
//! whose true chain position falls inside the still-unscanned historical range
//! will appear out of chronological order. This is best-effort ordering, not a
//! consensus guarantee.
//!
//! # Duplicates
//!
//! No deduplication is performed. If the live subscription's start point
//! overlaps the backfill's tail, the same chain event can appear twice.
//! Consumers that need idempotency should key on transaction hash plus
//! event fields.
//!
//! # Failure behavior
//!
//! The backfill returns partial results plus the terminal error rather than
//! discarding progress; live subscriptions report errors through
//! [`MarketFeed::last_error`] but never terminate themselves. The consumer
//! always sees the latest successfully merged buffer.

pub mod backfill;
pub mod buffer;
pub mod config;
pub mod error;
pub mod event;
pub mod feed;
pub mod source;

pub use backfill::{AdaptiveBatchWalker, WalkReport};
pub use buffer::{EventBuffer, MergeOrder};
pub use config::{
    DEFAULT_BATCH_GROWTH_STEP, DEFAULT_CAPACITY, DEFAULT_HISTORICAL_SPAN, DEFAULT_INITIAL_BATCH,
    DEFAULT_MAX_BATCH, DEFAULT_MAX_RETRIES_PER_CURSOR, DEFAULT_MIN_BATCH, FeedConfig,
};
pub use error::{FeedError, SourceError};
pub use event::{DecodedLog, EventKind, MarketAction, MarketEvent};
pub use feed::{BackfillStatus, FeedStatus, LiveStatus, MarketFeed, MarketFeedBuilder};
pub use source::{
    LogSubscription, LogSubscriptionSender, MarketLogSource, NodeLogSource, SubscriptionHandle,
};
