//! BufferCodec: the word buffers exchanged during composite-grid setup.
//!
//! # Layout of a send buffer
//!
//! ```text
//! num_psi_levels
//! per level:   count
//!              global index * count
//!              residual * count
//!              [ghost flag * count, coarse global index * count]     (not on the coarsest level)
//!              per node: A len, A values, A columns [, P len, P values, P columns]
//! ```
//!
//! The map negotiation buffer is, per level from the sending level down, a
//! count followed by one kept flag per incoming node.

pub mod maps;
pub mod pack;
pub mod unpack;

pub use maps::{negotiation_len, pack_recv_map_send, recv_map_from, unpack_send_flag_buffer};
pub use pack::{PackedSend, pack_all, pack_send_buffer};
pub use unpack::{decode_recv_buffer, unpack_recv_buffer};
