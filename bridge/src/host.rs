//! Host-side value types crossing the boundary.

use std::sync::Arc;

use engine::PinnedBuffer;

use crate::error::{BridgeErr, Result};

/// Element type of a host buffer. The engine is f32-only; anything else is
/// rejected by validation before it reaches engine storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    F32,
    F64,
}

impl DType {
    pub fn name(self) -> &'static str {
        match self {
            DType::F32 => "float32",
            DType::F64 => "float64",
        }
    }
}

#[derive(Debug, Clone)]
enum Storage {
    F32(Arc<[f32]>),
    F64(Arc<[f64]>),
}

/// A host-owned N-dimensional buffer with explicit element strides, the
/// shape a scripting host's array object takes at this boundary.
///
/// Storage is shared: cloning the array, or a layer retaining it as a
/// custodian, never copies the elements.
#[derive(Debug, Clone)]
pub struct HostArray {
    dtype: DType,
    shape: Vec<usize>,
    strides: Vec<usize>,
    storage: Storage,
}

fn c_contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

impl HostArray {
    /// A C-contiguous f32 array over `values`.
    pub fn from_vec(shape: &[usize], values: Vec<f32>) -> Result<Self> {
        let count: usize = shape.iter().product();
        if values.len() != count {
            return Err(BridgeErr::BadHostArray {
                what: "storage length",
                got: values.len(),
                expected: count,
            });
        }
        Ok(Self {
            dtype: DType::F32,
            strides: c_contiguous_strides(shape),
            shape: shape.to_vec(),
            storage: Storage::F32(values.into()),
        })
    }

    /// A C-contiguous f64 array, for exercising dtype validation.
    pub fn from_vec_f64(shape: &[usize], values: Vec<f64>) -> Result<Self> {
        let count: usize = shape.iter().product();
        if values.len() != count {
            return Err(BridgeErr::BadHostArray {
                what: "storage length",
                got: values.len(),
                expected: count,
            });
        }
        Ok(Self {
            dtype: DType::F64,
            strides: c_contiguous_strides(shape),
            shape: shape.to_vec(),
            storage: Storage::F64(values.into()),
        })
    }

    /// An f32 array with caller-chosen strides (e.g. a transposed or sliced
    /// host view). The storage must cover the furthest addressed element.
    pub fn with_strides(shape: &[usize], strides: &[usize], values: Vec<f32>) -> Result<Self> {
        if strides.len() != shape.len() {
            return Err(BridgeErr::BadHostArray {
                what: "strides length",
                got: strides.len(),
                expected: shape.len(),
            });
        }
        let needed = shape
            .iter()
            .zip(strides)
            .map(|(&dim, &stride)| dim.saturating_sub(1) * stride)
            .sum::<usize>()
            + 1;
        if values.len() < needed {
            return Err(BridgeErr::BadHostArray {
                what: "strided storage length",
                got: values.len(),
                expected: needed,
            });
        }
        Ok(Self {
            dtype: DType::F32,
            shape: shape.to_vec(),
            strides: strides.to_vec(),
            storage: Storage::F32(values.into()),
        })
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Number of logical elements (product of the shape).
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_c_contiguous(&self) -> bool {
        self.strides == c_contiguous_strides(&self.shape)
    }

    /// Direct element access, only available once validation has established
    /// a contiguous f32 layout.
    pub fn as_f32_slice(&self) -> Option<&[f32]> {
        match (&self.storage, self.is_c_contiguous()) {
            (Storage::F32(values), true) => Some(values),
            _ => None,
        }
    }

    /// Counterpart for f64 buffers, which validation rejects at the engine
    /// boundary but hosts can still read back.
    pub fn as_f64_slice(&self) -> Option<&[f64]> {
        match (&self.storage, self.is_c_contiguous()) {
            (Storage::F64(values), true) => Some(values),
            _ => None,
        }
    }
}

/// Validated host arrays can be pinned by the engine as input custody.
impl PinnedBuffer for HostArray {
    fn as_f32(&self) -> &[f32] {
        match &self.storage {
            Storage::F32(values) => values,
            // Validation rejects f64 buffers before any pinning happens.
            Storage::F64(_) => &[],
        }
    }
}

/// Arguments to a keyword-free variadic call (tensor reshape, sequence
/// append): an ordered dimension list plus any keyword arguments the caller
/// tried to pass, which the callee must reject.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    positional: Vec<usize>,
    keywords: Vec<(String, usize)>,
}

impl CallArgs {
    pub fn positional(dims: &[usize]) -> Self {
        Self {
            positional: dims.to_vec(),
            keywords: Vec::new(),
        }
    }

    pub fn with_keyword(mut self, name: &str, value: usize) -> Self {
        self.keywords.push((name.to_string(), value));
        self
    }

    pub fn dims(&self) -> &[usize] {
        &self.positional
    }

    pub fn has_keywords(&self) -> bool {
        !self.keywords.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguity_follows_strides() {
        let arr = HostArray::from_vec(&[2, 3], vec![0.0; 6]).unwrap();
        assert!(arr.is_c_contiguous());
        assert_eq!(arr.strides(), &[3, 1]);

        // Transposed view over the same storage.
        let t = HostArray::with_strides(&[3, 2], &[1, 3], vec![0.0; 6]).unwrap();
        assert!(!t.is_c_contiguous());
        assert!(t.as_f32_slice().is_none());
    }

    #[test]
    fn element_access_follows_dtype() {
        let f = HostArray::from_vec(&[2], vec![1.0, 2.0]).unwrap();
        assert_eq!(f.as_f32_slice().unwrap(), &[1.0, 2.0]);
        assert!(f.as_f64_slice().is_none());

        let d = HostArray::from_vec_f64(&[2], vec![3.0, 4.0]).unwrap();
        assert_eq!(d.as_f64_slice().unwrap(), &[3.0, 4.0]);
        assert!(d.as_f32_slice().is_none());
    }

    #[test]
    fn storage_length_is_checked() {
        assert!(matches!(
            HostArray::from_vec(&[2, 3], vec![0.0; 5]),
            Err(BridgeErr::BadHostArray { .. })
        ));
    }
}
