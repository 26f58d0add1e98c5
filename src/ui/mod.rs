pub mod output;

pub use output::{display_events, display_results};
