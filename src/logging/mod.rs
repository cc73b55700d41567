//! Structured logging setup.

pub mod format;

pub use format::{ReportLine, StructuredLogger};
