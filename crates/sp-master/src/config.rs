use std::time::Duration;

use sp_engine::SchedulerConfig;
use sp_output::DEFAULT_CAPACITY;

/// Player settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerConfig {
    pub scheduler: SchedulerConfig,
    /// How often the end-of-song poller reads the queue clock
    pub poll_interval: Duration,
    /// Backlog size of the software queue
    pub queue_capacity: usize,
    /// Time left for release tails after the last tick before stopping
    pub end_delay: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            poll_interval: Duration::from_millis(100),
            queue_capacity: DEFAULT_CAPACITY,
            end_delay: Duration::from_secs(2),
        }
    }
}
