//! Staged neighbor exchanges used by composite-grid setup.
//!
//! Stage 1 ([`size_exchange`]) announces how many words each peer will get,
//! stage 2 ([`data_exchange`]) moves the words. Both drain every posted
//! handle before returning, also on error, so a failed exchange never leaves
//! a message in flight for the next stage to trip over.

pub mod data_exchange;
pub mod size_exchange;

pub use data_exchange::{all_gather_words, exchange_variable, exchange_words};
pub use size_exchange::exchange_sizes;
