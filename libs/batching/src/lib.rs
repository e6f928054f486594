//! Dual-trigger batching of inbound messages into files.

pub mod controller;
pub mod sink;

pub use controller::{BatchFlushController, FlushPolicy, FlushReport, FlushTrigger};
pub use sink::{normalize_line, DailyFileSink, FileSink, RotatedFileSink};
