//! Content transfer: throughput probing, ranged downloads and formatting.

pub mod bandwidth;
pub mod chunked;
pub mod progress;
