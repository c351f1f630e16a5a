//! URL handling for scan targets
//!
//! Parses user-supplied targets and derives the domain stored on each scan request.

mod target;

pub use target::{dns_root, extract_domain, parse_target};
