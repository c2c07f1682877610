//! Batch pipeline tuning: courtesy delays, item-level retry ceiling, back-off.

use std::time::Duration;

/// Default pause between consecutive tasks.
pub const DEFAULT_INTER_TASK_DELAY: Duration = Duration::from_millis(1000);

/// Default ceiling on item-level attempts.
pub const DEFAULT_ITEM_MAX_ATTEMPTS: u32 = 3;

/// Default base delay before the first item-level retry.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(2000);

/// Default cap on a single back-off delay.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Knobs for [`crate::BatchJobPipeline`].
///
/// The item-level ceiling (`item_max_attempts`) is independent of the
/// credential-pool ceiling inside the executor. The two multiply; see
/// [`BatchSettings::max_provider_calls_per_item`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSettings {
    /// Pause inserted between tasks (not between replicas of one task).
    pub inter_task_delay: Duration,
    /// Item-level attempts, including the first. Values below 1 act as 1.
    pub item_max_attempts: u32,
    /// Base back-off; doubled after every failed attempt.
    pub retry_backoff: Duration,
    /// Upper bound on a single back-off.
    pub max_backoff: Duration,
    /// Whether pool exhaustion is retried at item level. When `false`, each
    /// item gets exactly one pass over the pool.
    pub retry_pool_exhaustion: bool,
    /// Optional wall-clock limit for the whole batch.
    pub batch_timeout: Option<Duration>,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            inter_task_delay: DEFAULT_INTER_TASK_DELAY,
            item_max_attempts: DEFAULT_ITEM_MAX_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            retry_pool_exhaustion: true,
            batch_timeout: None,
        }
    }
}

impl BatchSettings {
    /// Settings with every delay set to zero. Handy for tests and local runs.
    pub fn immediate() -> Self {
        Self {
            inter_task_delay: Duration::ZERO,
            retry_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Effective item-level attempt ceiling.
    pub fn attempts(&self) -> u32 {
        if self.retry_pool_exhaustion {
            self.item_max_attempts.max(1)
        } else {
            1
        }
    }

    /// Delay before item-level attempt `failed_attempt + 1`.
    ///
    /// `retry_backoff × 2^(failed_attempt − 1)`, capped at `max_backoff`, and
    /// raised to `hint` when the provider asked for a longer wait.
    pub fn backoff_for(&self, failed_attempt: u32, hint: Option<Duration>) -> Duration {
        let factor = 2u32.saturating_pow(failed_attempt.saturating_sub(1));
        let delay = self.retry_backoff.saturating_mul(factor).min(self.max_backoff);
        match hint {
            Some(hint) => delay.max(hint),
            None => delay,
        }
    }

    /// Worst-case provider calls for one job item: item attempts × two
    /// negotiation modes × credentials tried per executor run.
    pub fn max_provider_calls_per_item(&self, pool_size: usize, has_override: bool) -> usize {
        self.attempts() as usize * 2 * (pool_size + usize::from(has_override))
    }
}
