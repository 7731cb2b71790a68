#![cfg_attr(docsrs, feature(doc_cfg))]
//! # amgdd
//!
//! amgdd builds the composite grids used by algebraic multigrid domain
//! decomposition (AMG-DD) solvers. Given this rank's share of a distributed
//! AMG hierarchy, it extends every level with the nearby rows owned by other
//! ranks, so that later solve cycles can run locally with only one exchange
//! per cycle.
//!
//! ## Features
//! - Neighbor discovery over the matrix graph, `padding + num_ghost_layers` hops deep
//! - Psi-composite packing that cascades each sent region down the hierarchy
//! - Sorted, duplicate-free composite grids with stable node handles
//! - Negotiated send and receive maps for the solve phase
//! - Pluggable transports: serial, threaded in-process ranks, MPI
//! - Optional self-checks of shape, data fidelity and symmetry
//!
//! ## Usage
//! Add `amgdd` as a dependency in your `Cargo.toml` and enable features as needed:
//!
//! ```toml
//! [dependencies]
//! amgdd = "0.3"
//! # Optional features:
//! # features = ["mpi-support", "rayon"]
//! ```
//!
//! ```no_run
//! use amgdd::prelude::*;
//! use amgdd::hierarchy::distribute::distribute;
//! use amgdd::hierarchy::serial::{build_hierarchy, laplacian_1d};
//!
//! let serial = build_hierarchy(laplacian_1d(64), vec![1.0; 64], 4, 2);
//! let mine = distribute(&serial, &[0, 64], 0)?;
//! let out = setup_composite_grids(&mine, &CompGridParams::new(2, 1), &NoComm)?;
//! assert_eq!(out.num_levels(), mine.num_levels());
//! # Ok::<(), amgdd::AmgDdError>(())
//! ```
//!
//! ## Invariant checking
//! Debug builds, and release builds with `check-invariants` or
//! `strict-invariants`, validate every composite grid after each merge and
//! every communication package after discovery.

pub mod algs;
pub mod amgdd_error;
pub mod assembler;
pub mod codec;
pub mod composite;
pub mod debug_invariants;
pub mod hierarchy;
pub mod neighbors;
pub mod params;
pub mod verify;

pub use amgdd_error::AmgDdError;
pub use assembler::{CompositeHierarchy, SetupTimings, setup_composite_grids};
pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{CommTag, Communicator, LocalComm, NoComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::amgdd_error::AmgDdError;
    pub use crate::assembler::{CompositeHierarchy, SetupTimings, setup_composite_grids};
    pub use crate::composite::{
        AddFlag, CompGridCommPkg, CompositeCsr, CompositeGrid, CompositeMatrixRow, NodeId,
    };
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::hierarchy::{AmgHierarchy, CfMarker, OneHopPattern, ParCsr, ParLevel};
    pub use crate::params::CompGridParams;
}
