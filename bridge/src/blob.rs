use std::sync::Arc;

use engine::Blob as EngineBlob;

use crate::error::{BridgeErr, Result};
use crate::host::CallArgs;
use crate::view::{TensorView, ViewKind};

/// Host handle to a tensor. Cloning the handle shares the underlying
/// storage; the engine blob lives as long as any handle or exported view.
#[derive(Clone)]
pub struct Blob {
    inner: Arc<EngineBlob>,
}

impl Blob {
    pub(crate) fn from_engine(inner: Arc<EngineBlob>) -> Self {
        Self { inner }
    }

    /// A fresh standalone blob, not owned by any net.
    pub fn with_shape(shape: &[usize]) -> Self {
        Self {
            inner: Arc::new(EngineBlob::new(shape)),
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        self.inner.shape()
    }

    pub fn num_axes(&self) -> usize {
        self.inner.num_axes()
    }

    pub fn count(&self) -> usize {
        self.inner.count()
    }

    // Legacy 4-axis accessors.

    pub fn num(&self) -> Result<usize> {
        Ok(self.inner.axis(0)?)
    }

    pub fn channels(&self) -> Result<usize> {
        Ok(self.inner.axis(1)?)
    }

    pub fn height(&self) -> Result<usize> {
        Ok(self.inner.axis(2)?)
    }

    pub fn width(&self) -> Result<usize> {
        Ok(self.inner.axis(3)?)
    }

    /// Resizes the blob from an ordered dimension list. Keyword arguments
    /// are rejected; reshape may reallocate, which stales outstanding views.
    pub fn reshape(&self, args: &CallArgs) -> Result<()> {
        if args.has_keywords() {
            return Err(BridgeErr::KeywordArgs {
                method: "Blob.reshape",
            });
        }
        self.inner.reshape(args.dims());
        Ok(())
    }

    /// Zero-copy view of the activation buffer.
    pub fn data(&self) -> TensorView {
        TensorView::export(&self.inner, ViewKind::Data)
    }

    /// Zero-copy view of the gradient buffer.
    pub fn diff(&self) -> TensorView {
        TensorView::export(&self.inner, ViewKind::Diff)
    }
}
