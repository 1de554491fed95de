//! One-shot historical walk with adaptive chunk sizing.
//!
//! Providers cap the block span an `eth_getLogs` query may cover, but the cap
//! is undocumented and surfaces only as an opaque rejection. The walker probes
//! for a working width at runtime: it halves the chunk on rejection and grows
//! it linearly on success. When even the minimum width is rejected it skips
//! forward rather than loop forever, reporting the gap as a warning.

use std::ops::RangeInclusive;

use tokio::try_join;
use tracing::{debug, error, info, warn};

use crate::{
    config::FeedConfig,
    error::SourceError,
    event::{EventKind, MarketEvent, decode_batch},
    source::MarketLogSource,
};

/// Mutable state of one walk.
///
/// `next_block` only increases; the walk terminates when it passes
/// `end_block`. `batch_size` stays within `[min_batch, max_batch]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanCursor {
    pub next_block: u64,
    pub end_block: u64,
    pub batch_size: u64,
}

impl ScanCursor {
    fn chunk_end(&self) -> u64 {
        self.next_block.saturating_add(self.batch_size - 1).min(self.end_block)
    }
}

/// Outcome of a walk: everything accumulated before completion, abandonment,
/// or the event budget being reached.
#[derive(Debug, Default)]
pub struct WalkReport {
    /// Decoded events, oldest to newest (the natural order of an ascending
    /// scan).
    pub events: Vec<MarketEvent>,
    /// Block ranges skipped because the provider rejected even the minimum
    /// batch width. Gaps, accepted to guarantee termination.
    pub skipped: Vec<RangeInclusive<u64>>,
    /// Number of chunk fetches issued.
    pub chunk_calls: usize,
    /// The terminal error, if the walk was abandoned. Partial results are
    /// still present in `events`.
    pub error: Option<SourceError>,
}

impl WalkReport {
    /// Whether the walk covered its range without being abandoned.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Walks a block interval end to end, discovering a working chunk width as it
/// goes.
pub struct AdaptiveBatchWalker<'a, S> {
    source: &'a S,
    config: &'a FeedConfig,
}

impl<'a, S: MarketLogSource> AdaptiveBatchWalker<'a, S> {
    #[must_use]
    pub fn new(source: &'a S, config: &'a FeedConfig) -> Self {
        Self { source, config }
    }

    /// Covers `[from_block, to_block]` (both inclusive) with as few chunk
    /// calls as the provider allows.
    ///
    /// A degenerate span (`from_block > to_block`) returns an empty report
    /// without issuing any call. The walk stops early once
    /// [`FeedConfig::max_total`] events have been accumulated.
    pub async fn walk(&self, from_block: u64, to_block: u64) -> WalkReport {
        let mut report = WalkReport::default();

        if from_block > to_block {
            debug!(from_block, to_block, "degenerate span, nothing to walk");
            return report;
        }

        let config = self.config;
        let span = (to_block - from_block).saturating_add(1);
        let mut cursor = ScanCursor {
            next_block: from_block,
            end_block: to_block,
            // the first call must not exceed the requested interval
            batch_size: config.initial_batch.clamp(config.min_batch, config.max_batch).min(span),
        };
        let mut attempts_at_cursor: u32 = 0;

        info!(from_block, to_block, batch_size = cursor.batch_size, "starting backfill walk");

        while cursor.next_block <= cursor.end_block {
            let chunk_end = cursor.chunk_end();
            report.chunk_calls += 1;

            match self.fetch_chunk(cursor.next_block, chunk_end).await {
                Ok(events) => {
                    debug!(
                        from_block = cursor.next_block,
                        to_block = chunk_end,
                        event_count = events.len(),
                        "chunk fetched"
                    );

                    report.events.extend(events);
                    attempts_at_cursor = 0;

                    // reward the width that worked, bounded linear climb
                    cursor.batch_size =
                        cursor.batch_size.saturating_add(config.batch_growth_step).min(config.max_batch);

                    if report.events.len() >= config.max_total {
                        info!(
                            event_count = report.events.len(),
                            max_total = config.max_total,
                            "event budget reached, stopping walk early"
                        );
                        break;
                    }

                    if chunk_end == cursor.end_block {
                        break;
                    }
                    cursor.next_block = chunk_end + 1;
                }
                Err(SourceError::RangeTooLarge) => {
                    attempts_at_cursor += 1;

                    // halve the width actually attempted, not the nominal
                    // batch size, so progress is guaranteed near the end of
                    // the range too
                    let attempted = chunk_end - cursor.next_block + 1;
                    let halved = attempted / 2;

                    if halved < config.min_batch
                        || attempts_at_cursor >= config.max_retries_per_cursor
                    {
                        // accept a gap rather than deadlock
                        let skip_end = cursor
                            .next_block
                            .saturating_add(config.min_batch - 1)
                            .min(cursor.end_block);

                        warn!(
                            from_block = cursor.next_block,
                            to_block = skip_end,
                            attempts = attempts_at_cursor,
                            "minimum batch still rejected, skipping blocks"
                        );

                        report.skipped.push(cursor.next_block..=skip_end);
                        attempts_at_cursor = 0;
                        cursor.batch_size = config.min_batch;

                        if skip_end == cursor.end_block {
                            break;
                        }
                        cursor.next_block = skip_end + 1;
                    } else {
                        debug!(
                            from_block = cursor.next_block,
                            batch_size = halved,
                            "provider rejected range, halving batch"
                        );
                        cursor.batch_size = halved;
                    }
                }
                Err(err) => {
                    error!(
                        error = %err,
                        from_block = cursor.next_block,
                        to_block = chunk_end,
                        "abandoning walk, returning partial results"
                    );
                    report.error = Some(err);
                    break;
                }
            }
        }

        info!(
            event_count = report.events.len(),
            chunk_calls = report.chunk_calls,
            skipped_ranges = report.skipped.len(),
            complete = report.is_complete(),
            "backfill walk finished"
        );

        report
    }

    /// Fetches both event kinds for one chunk concurrently and decodes them
    /// in chain order.
    async fn fetch_chunk(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<MarketEvent>, SourceError> {
        let (listed, bought) = try_join!(
            self.source.fetch_logs(EventKind::Listed, from_block, to_block),
            self.source.fetch_logs(EventKind::Bought, from_block, to_block),
        )?;

        let mut logs = listed;
        logs.extend(bought);
        logs.sort_by_key(|log| (log.block_number.unwrap_or_default(), log.log_index.unwrap_or_default()));

        Ok(decode_batch(&logs))
    }
}
