//! Output module for monitoring the worker and inspecting scans
//!
//! This module handles:
//! - Queue, scan and lease statistics
//! - Printing a stored scan with its findings

mod scan;
pub mod stats;

pub use scan::{print_scan, stored_report};
pub use stats::{load_statistics, print_statistics, WorkerStatistics};
