//! Composite grids: each rank's extended local view of every level.

pub mod add_flag;
pub mod comm_pkg;
pub mod grid;
pub mod merge;
pub mod resolve;
pub mod row;

pub use add_flag::AddFlag;
pub use comm_pkg::{CompGridCommPkg, LevelCommPackage, PeerMap};
pub use grid::{CompositeCsr, CompositeGrid, CompositeNode, NodeId};
pub use merge::IncomingNode;
pub use resolve::resolve_local_indices;
pub use row::CompositeMatrixRow;
