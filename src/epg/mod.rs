//! EPG (Electronic Program Guide) module
//!
//! Fetches per-day program windows from the API, folds them into one
//! deduplicated program list and writes it as XMLTV.

mod aggregator;
mod xmltv;

// Re-export public types
pub use aggregator::{build_guide, day_windows, fetch_guide};
pub use xmltv::{write_guide, Attribution};
