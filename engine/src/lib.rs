//! In-process neural network engine.
//!
//! This crate plays the role of the native compute library behind the
//! `bridge` boundary layer: blob storage, net graph execution, a small layer
//! zoo, the interchangeable solver update rules, checkpoint I/O and the
//! process-wide device selector. The boundary crate never reaches into layer
//! internals; everything goes through `Net`, `Blob` and `Solver`.

pub mod blob;
pub mod checkpoint;
pub mod device;
pub mod error;
pub mod layer;
pub mod layers;
pub mod net;
pub mod netdef;
pub mod solver;

pub use blob::Blob;
pub use error::{EngineErr, Result};
pub use layer::{layer_type_list, Layer, PinnedBuffer};
pub use net::Net;
pub use netdef::{NetDef, Phase};
pub use solver::{Solver, SolverParams, UpdateRule};

/// Engine version string, reported through the boundary layer.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
