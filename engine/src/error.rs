use std::{error::Error, fmt, io};

/// The engine's result type.
pub type Result<T> = std::result::Result<T, EngineErr>;

/// Failures raised by the engine proper.
#[derive(Debug)]
pub enum EngineErr {
    Io(io::Error),
    /// A model or solver definition could not be interpreted.
    MalformedDef {
        what: String,
    },
    UnknownLayerType {
        name: String,
    },
    UnknownBlob {
        name: String,
    },
    /// A legacy 4-axis accessor was used on a blob with fewer axes.
    AxisOutOfRange {
        axis: usize,
        num_axes: usize,
    },
    ShapeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// `forward`/`backward` received a layer range outside the net.
    LayerRange {
        start: usize,
        end: usize,
        len: usize,
    },
    /// A memory-input layer ran before any buffers were injected.
    NoInputData {
        layer: String,
    },
    DeviceIndex {
        index: usize,
        len: usize,
    },
    Checkpoint {
        what: String,
    },
}

impl fmt::Display for EngineErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineErr::Io(e) => write!(f, "io error: {e}"),
            EngineErr::MalformedDef { what } => write!(f, "malformed definition: {what}"),
            EngineErr::UnknownLayerType { name } => write!(f, "unknown layer type: {name}"),
            EngineErr::UnknownBlob { name } => write!(f, "unknown blob: {name}"),
            EngineErr::AxisOutOfRange { axis, num_axes } => {
                write!(f, "axis {axis} out of range for blob with {num_axes} axes")
            }
            EngineErr::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(f, "shape mismatch for {what}: got {got}, expected {expected}"),
            EngineErr::LayerRange { start, end, len } => {
                write!(f, "layer range {start}..{end} invalid for net with {len} layers")
            }
            EngineErr::NoInputData { layer } => {
                write!(f, "memory data layer {layer} has no input buffers set")
            }
            EngineErr::DeviceIndex { index, len } => {
                write!(f, "device index {index} out of range for {len} configured devices")
            }
            EngineErr::Checkpoint { what } => write!(f, "checkpoint error: {what}"),
        }
    }
}

impl Error for EngineErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EngineErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for EngineErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for EngineErr {
    fn from(value: serde_json::Error) -> Self {
        Self::MalformedDef {
            what: value.to_string(),
        }
    }
}
