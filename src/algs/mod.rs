//! Message passing and the wire format shared by every setup phase.

pub mod communicator;
pub mod exchange;
pub mod wire;

pub use communicator::{CommTag, Communicator, SetupCommTags};
