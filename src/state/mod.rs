//! State module for tracking scan progress
//!
//! # Components
//!
//! - `ScanStatus`: the monotonic PENDING -> SCANNING -> {COMPLETED, FAILED} lifecycle
//! - `ScanType` / `WorkerType`: which crawl strategy produced a scan's content

mod scan_status;
mod scan_type;

// Re-export main types
pub use scan_status::ScanStatus;
pub use scan_type::{ScanType, WorkerType};
