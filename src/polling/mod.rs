//! Activity polling: the feed collaborator, the single-flight poll cycle and
//! the background loop that schedules it.

pub mod controller;
pub mod loop_worker;
pub mod processor;
pub mod source;
pub mod stats;

pub use controller::{PollController, TriggerResult};
pub use processor::{ActivityProcessor, CycleOutcome, CycleReport, ProcessorConfig};
pub use source::{ActivitySource, FetchOutcome, FileActivitySource, RawActivity};
pub use stats::PollStats;
