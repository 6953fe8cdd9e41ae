//! Loss summaries and metrics logging.
//!
//! ## Summaries
//!
//! - [`SummaryBundle`]: activation statistics, loss scalars and gradient norms
//!   of one loss step
//!
//! ## Loggers
//!
//! - [`ConsoleLogger`]: Pretty-printed console output
//! - [`CSVLogger`]: CSV file logging for analysis
//! - [`MultiLogger`]: Combine multiple loggers

pub mod logger;
pub mod summaries;

pub use logger::{ConsoleLogger, CSVLogger, LossSnapshot, MetricsLogger, MultiLogger, CSV_HEADER};
pub use summaries::{summarized_activations, summarized_scalars, ActivationSummary, SummaryBundle};
