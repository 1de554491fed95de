use crate::error::FeedError;

/// Default starting width, in blocks, of a backfill chunk.
pub const DEFAULT_INITIAL_BATCH: u64 = 1000;
/// Default smallest chunk width the walker will attempt.
pub const DEFAULT_MIN_BATCH: u64 = 10;
/// Default largest chunk width the walker will grow to.
pub const DEFAULT_MAX_BATCH: u64 = 4000;
/// Default number of blocks added to the chunk width after each successful
/// fetch. Linear growth avoids overshooting a provider's true limit the way
/// exponential growth would.
pub const DEFAULT_BATCH_GROWTH_STEP: u64 = 500;
/// Default bound on consecutive attempts at one cursor position before the
/// walker skips forward. Exists purely to guarantee termination under
/// pathological provider behavior.
pub const DEFAULT_MAX_RETRIES_PER_CURSOR: u32 = 10;
/// Default capacity of the event buffer.
pub const DEFAULT_CAPACITY: usize = 50;
/// Default number of blocks behind the chain head where the backfill starts.
pub const DEFAULT_HISTORICAL_SPAN: u64 = 10_000;

/// Tuning knobs for the feed engine.
///
/// All fields have working defaults; override them through
/// [`MarketFeedBuilder`](crate::MarketFeedBuilder).
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Starting chunk width for the backfill walk, clamped to
    /// `[min_batch, max_batch]` and to the requested span.
    pub initial_batch: u64,
    /// Smallest chunk width attempted before the walker skips forward rather
    /// than deadlock.
    pub min_batch: u64,
    /// Upper bound on chunk width growth.
    pub max_batch: u64,
    /// Blocks added to the chunk width after each successful fetch.
    pub batch_growth_step: u64,
    /// Consecutive attempts allowed at one cursor before forcing skip-forward.
    pub max_retries_per_cursor: u32,
    /// Maximum number of events held in the buffer; older entries are dropped.
    pub capacity: usize,
    /// How far back from the chain head the backfill starts.
    pub historical_span: u64,
    /// Stop the backfill once this many events have been accumulated, even if
    /// range remains. Cost control: a feed only needs the most recent events.
    pub max_total: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            initial_batch: DEFAULT_INITIAL_BATCH,
            min_batch: DEFAULT_MIN_BATCH,
            max_batch: DEFAULT_MAX_BATCH,
            batch_growth_step: DEFAULT_BATCH_GROWTH_STEP,
            max_retries_per_cursor: DEFAULT_MAX_RETRIES_PER_CURSOR,
            capacity: DEFAULT_CAPACITY,
            historical_span: DEFAULT_HISTORICAL_SPAN,
            max_total: DEFAULT_CAPACITY * 3,
        }
    }
}

impl FeedConfig {
    /// Validates the configuration before any network call is made.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::InvalidConfig`] naming the offending parameter.
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.capacity == 0 {
            return Err(FeedError::InvalidConfig("capacity must be greater than 0"));
        }
        if self.initial_batch == 0 {
            return Err(FeedError::InvalidConfig("initial batch must be greater than 0"));
        }
        if self.min_batch == 0 {
            return Err(FeedError::InvalidConfig("min batch must be greater than 0"));
        }
        if self.max_batch < self.min_batch {
            return Err(FeedError::InvalidConfig("max batch must not be below min batch"));
        }
        if self.batch_growth_step == 0 {
            return Err(FeedError::InvalidConfig("batch growth step must be greater than 0"));
        }
        if self.max_retries_per_cursor == 0 {
            return Err(FeedError::InvalidConfig("max retries per cursor must be greater than 0"));
        }
        if self.max_total == 0 {
            return Err(FeedError::InvalidConfig("max total must be greater than 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = FeedConfig::default();

        assert_eq!(config.initial_batch, DEFAULT_INITIAL_BATCH);
        assert_eq!(config.min_batch, DEFAULT_MIN_BATCH);
        assert_eq!(config.max_batch, DEFAULT_MAX_BATCH);
        assert_eq!(config.batch_growth_step, DEFAULT_BATCH_GROWTH_STEP);
        assert_eq!(config.max_retries_per_cursor, DEFAULT_MAX_RETRIES_PER_CURSOR);
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.historical_span, DEFAULT_HISTORICAL_SPAN);
        assert_eq!(config.max_total, DEFAULT_CAPACITY * 3);
    }

    #[test]
    fn default_config_validates() {
        assert!(FeedConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_parameters_are_rejected() {
        let cases: [fn(&mut FeedConfig); 6] = [
            |c| c.capacity = 0,
            |c| c.initial_batch = 0,
            |c| c.min_batch = 0,
            |c| c.batch_growth_step = 0,
            |c| c.max_retries_per_cursor = 0,
            |c| c.max_total = 0,
        ];

        for broken in cases {
            let mut config = FeedConfig::default();
            broken(&mut config);
            assert!(matches!(config.validate(), Err(FeedError::InvalidConfig(_))));
        }
    }

    #[test]
    fn max_batch_below_min_batch_is_rejected() {
        let config = FeedConfig { min_batch: 100, max_batch: 50, ..FeedConfig::default() };
        assert!(matches!(config.validate(), Err(FeedError::InvalidConfig(_))));
    }
}
