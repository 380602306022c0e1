//! Online learning over chunked streams
//!
//! - [`config`] - run configuration
//! - [`evaluator`] - windowed progressive log-loss
//! - [`pipeline`] - the test-then-train driver loop
//! - [`reporter`] - sinks for loss series entries
//! - [`warmup`] - optional fit on a stream prefix

pub mod config;
pub mod evaluator;
pub mod pipeline;
pub mod reporter;
pub mod warmup;

pub use config::{StreamConfig, WarmupConfig};
pub use evaluator::{LossPoint, LossSeries, WindowedEvaluator};
pub use pipeline::{run_from_config, Driver, RunReport, RunState, RunSummary, StopReason};
pub use reporter::{CollectingReporter, LossReporter, TracingReporter};
pub use warmup::warm_up;
