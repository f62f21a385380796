use std::{error::Error, fmt, io, path::PathBuf};

use engine::EngineErr;

/// The boundary layer's result type.
pub type Result<T> = std::result::Result<T, BridgeErr>;

/// Everything the boundary layer can report to the host.
///
/// File-access failures are raised before any parse attempt; validation
/// failures are raised before any engine storage is touched; everything the
/// engine itself raises arrives here as `Engine` with its message preserved.
#[derive(Debug)]
pub enum BridgeErr {
    /// A path could not be opened at validation time.
    FileAccess {
        path: PathBuf,
        source: io::Error,
    },
    /// A host buffer is not laid out contiguously in row-major order.
    NotContiguous {
        name: &'static str,
    },
    /// A host buffer has the wrong element type.
    WrongDType {
        name: &'static str,
        got: &'static str,
    },
    /// A host buffer has the wrong number of dimensions.
    DimCount {
        name: &'static str,
        got: usize,
        expected: usize,
    },
    /// One non-leading dimension of a host buffer has the wrong extent.
    DimMismatch {
        name: &'static str,
        axis: usize,
        got: usize,
        expected: usize,
    },
    /// Data and label buffers disagree on the example count.
    LeadingDimMismatch {
        data: usize,
        labels: usize,
    },
    /// The example count is not a multiple of the layer's batch size.
    BatchRemainder {
        total: usize,
        batch: usize,
    },
    /// `set_input_arrays` targeted a layer that is not a memory-input layer.
    NotMemoryData {
        index: usize,
    },
    /// A sequence access was out of bounds.
    OutOfBounds {
        index: usize,
        len: usize,
    },
    /// A host array was constructed with inconsistent storage.
    BadHostArray {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// The requested solver variant is not registered.
    UnknownSolver {
        name: String,
    },
    /// A keyword-free call received keyword arguments.
    KeywordArgs {
        method: &'static str,
    },
    /// Any failure propagated from the engine, message preserved.
    Engine(String),
}

impl fmt::Display for BridgeErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeErr::FileAccess { path, source } => {
                write!(f, "could not open file {}: {source}", path.display())
            }
            BridgeErr::NotContiguous { name } => write!(f, "{name} must be C contiguous"),
            BridgeErr::WrongDType { name, got } => {
                write!(f, "{name} must be float32, got {got}")
            }
            BridgeErr::DimCount {
                name,
                got,
                expected,
            } => write!(
                f,
                "{name} has wrong number of dimensions ({got} vs. {expected})"
            ),
            BridgeErr::DimMismatch {
                name,
                axis,
                got,
                expected,
            } => write!(
                f,
                "{name}: shape dimension {axis} has wrong size ({got} vs. {expected})"
            ),
            BridgeErr::LeadingDimMismatch { data, labels } => write!(
                f,
                "data and labels must have the same first dimension ({data} vs. {labels})"
            ),
            BridgeErr::BatchRemainder { total, batch } => write!(
                f,
                "first dimension of input arrays ({total}) must be a multiple of batch size ({batch})"
            ),
            BridgeErr::NotMemoryData { index } => write!(
                f,
                "set_input_arrays may only target a memory data layer (layer {index} is not one)"
            ),
            BridgeErr::OutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for sequence of length {len}")
            }
            BridgeErr::BadHostArray {
                what,
                got,
                expected,
            } => write!(f, "host array {what}: got {got}, expected {expected}"),
            BridgeErr::UnknownSolver { name } => write!(f, "unknown solver type: {name}"),
            BridgeErr::KeywordArgs { method } => write!(f, "{method} takes no kwargs"),
            BridgeErr::Engine(msg) => write!(f, "engine error: {msg}"),
        }
    }
}

impl Error for BridgeErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BridgeErr::FileAccess { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Total translation: every engine failure becomes a reported host error
/// carrying the original message text.
impl From<EngineErr> for BridgeErr {
    fn from(value: EngineErr) -> Self {
        BridgeErr::Engine(value.to_string())
    }
}
