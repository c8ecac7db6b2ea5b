//! Summaries computed over stored probe history.

pub mod stats;
