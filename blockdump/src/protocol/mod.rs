//! Protocol implementations.

pub mod block;

// Re-export common items
pub use block::{
    NEWLINE_THRESHOLD, REQUEST_PREFIX, count_newlines, exceeds_newline_threshold,
    request_command, strip_trailing_cr,
};
