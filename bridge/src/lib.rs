//! Boundary layer over the in-process neural network engine.
//!
//! This crate is the host-facing surface: it validates host buffers before
//! they touch engine storage, exports zero-copy tensor views that keep their
//! owners alive, tracks custodianship of injected training data, releases
//! the host execution lock around long-running engine calls, and translates
//! every engine failure into a `BridgeErr` with the original message intact.
//! It implements none of the numerical work itself.

pub mod blob;
pub mod device;
pub mod error;
pub mod gate;
pub mod host;
pub mod layer;
pub mod net;
pub mod sequence;
pub mod solver;
pub mod validate;
pub mod view;

pub use blob::Blob;
pub use error::{BridgeErr, Result};
pub use gate::{host_lock, HostGuard, HostLock};
pub use host::{CallArgs, DType, HostArray};
pub use layer::Layer;
pub use net::Net;
pub use sequence::{
    BlobSeq, BoolSeq, FloatSeq, IntSeq, LayerSeq, NetSeq, Sequence, StringSeq,
};
pub use solver::{solver_type_list, Solver};
pub use view::{TensorView, ViewKind};

pub use engine::netdef::Phase;
pub use engine::SolverParams;

/// Version of the underlying engine.
pub fn version() -> &'static str {
    engine::VERSION
}

/// Names of all layer types registered in the engine.
pub fn layer_type_list() -> Vec<&'static str> {
    engine::layer_type_list()
}
