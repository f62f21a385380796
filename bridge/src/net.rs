use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use engine::net::MemoryDataInfo;
use engine::{Net as EngineNet, NetDef, Phase, PinnedBuffer};

use crate::blob::Blob;
use crate::error::{BridgeErr, Result};
use crate::gate::HostGuard;
use crate::host::HostArray;
use crate::layer::Layer;
use crate::sequence::Sequence;
use crate::validate::check_array;

/// Checks a path is openable before anything tries to parse it, so callers
/// get a file-access error distinct from parse errors.
pub(crate) fn check_file(path: &Path) -> Result<()> {
    File::open(path).map_err(|source| BridgeErr::FileAccess {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Host handle to a network. Cloning shares the underlying net.
#[derive(Clone)]
pub struct Net {
    inner: Arc<EngineNet>,
}

impl fmt::Debug for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Net")
            .field("name", &self.inner.name())
            .field("phase", &self.inner.phase())
            .field("layers", &self.inner.num_layers())
            .finish()
    }
}

impl Net {
    /// Builds a net from a model definition file.
    pub fn from_file(definition: &Path, phase: Phase) -> Result<Self> {
        check_file(definition)?;
        let def = NetDef::from_json_file(definition)?;
        let inner = Arc::new(EngineNet::build(&def, phase, 0)?);
        Ok(Self { inner })
    }

    /// Builds a net and seeds it with pretrained weights.
    pub fn from_files(definition: &Path, weights: &Path, phase: Phase) -> Result<Self> {
        check_file(definition)?;
        check_file(weights)?;
        let net = Self::from_file(definition, phase)?;
        net.inner.copy_trained_layers_from(weights)?;
        Ok(net)
    }

    pub(crate) fn from_engine(inner: Arc<EngineNet>) -> Self {
        Self { inner }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn phase(&self) -> Phase {
        self.inner.phase()
    }

    pub fn num_layers(&self) -> usize {
        self.inner.num_layers()
    }

    /// Runs layers `start..=end`, returning the scalar loss. Long-running:
    /// the host lock is released for the engine call's duration.
    pub fn forward(&self, guard: &mut HostGuard<'_>, start: usize, end: usize) -> Result<f32> {
        let inner = &self.inner;
        Ok(guard.allow_threads(|| inner.forward_from_to(start, end))?)
    }

    /// Runs the whole net forward.
    pub fn forward_all(&self, guard: &mut HostGuard<'_>) -> Result<f32> {
        let inner = &self.inner;
        Ok(guard.allow_threads(|| inner.forward_all())?)
    }

    /// Runs layers `start` down to `end` backward. Long-running, gated like
    /// `forward`.
    pub fn backward(&self, guard: &mut HostGuard<'_>, start: usize, end: usize) -> Result<()> {
        let inner = &self.inner;
        guard.allow_threads(|| inner.backward_from_to(start, end))?;
        Ok(())
    }

    pub fn backward_all(&self, guard: &mut HostGuard<'_>) -> Result<()> {
        let inner = &self.inner;
        guard.allow_threads(|| inner.backward_all())?;
        Ok(())
    }

    /// Recomputes all blob shapes from current input shapes.
    pub fn reshape(&self) -> Result<()> {
        self.inner.reshape()?;
        Ok(())
    }

    /// Copies learned weights from a checkpoint file.
    pub fn copy_from(&self, path: &Path) -> Result<()> {
        self.inner.copy_trained_layers_from(path)?;
        Ok(())
    }

    /// Aliases this net's learnable weights with `other`'s, matching layers
    /// by name.
    pub fn share_with(&self, other: &Net) -> Result<()> {
        self.inner.share_trained_layers_with(&other.inner)?;
        Ok(())
    }

    /// Serializes current weights to a binary checkpoint file.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.inner.save_weights(path)?;
        Ok(())
    }

    fn memory_data_info(&self, index: usize) -> Result<MemoryDataInfo> {
        self.inner
            .memory_data_info(index)?
            .ok_or(BridgeErr::NotMemoryData { index })
    }

    fn validate_input_arrays(
        info: &MemoryDataInfo,
        data: &HostArray,
        labels: &HostArray,
    ) -> Result<usize> {
        check_array(data, "data array", &info.data_shape)?;
        check_array(labels, "labels array", &info.label_shape)?;

        let n = data.shape()[0];
        let n_labels = labels.shape()[0];
        if n != n_labels {
            return Err(BridgeErr::LeadingDimMismatch {
                data: n,
                labels: n_labels,
            });
        }
        if n % info.batch_size != 0 {
            return Err(BridgeErr::BatchRemainder {
                total: n,
                batch: info.batch_size,
            });
        }
        Ok(n)
    }

    /// Injects externally owned training buffers into the memory-input layer
    /// at `index`.
    ///
    /// On success the layer becomes a custodian of both arrays: their
    /// storage stays alive until the next injection replaces them. On any
    /// validation failure no engine state changes.
    pub fn set_input_arrays(
        &self,
        index: usize,
        data: &Arc<HostArray>,
        labels: &Arc<HostArray>,
    ) -> Result<()> {
        let info = self.memory_data_info(index)?;
        let n = Self::validate_input_arrays(&info, data, labels)?;
        log::debug!(
            "injecting {n} examples into memory data layer {index} (batch size {})",
            info.batch_size
        );
        let data: Arc<dyn PinnedBuffer> = Arc::clone(data) as _;
        let labels: Arc<dyn PinnedBuffer> = Arc::clone(labels) as _;
        match self.inner.reset_memory_data(index, data, labels, n)? {
            Some(()) => Ok(()),
            None => Err(BridgeErr::NotMemoryData { index }),
        }
    }

    /// Same contract as `set_input_arrays`, addressing the layer by handle
    /// instead of by index.
    pub fn set_layer_input_arrays(
        &self,
        layer: &Layer,
        data: &Arc<HostArray>,
        labels: &Arc<HostArray>,
    ) -> Result<()> {
        self.set_input_arrays(layer.index(), data, labels)
    }

    /// Handles to all named blobs, in net order.
    pub fn blobs(&self) -> Sequence<Blob> {
        self.inner
            .blobs()
            .iter()
            .map(|b| Blob::from_engine(Arc::clone(b)))
            .collect()
    }

    pub fn blob_names(&self) -> Sequence<String> {
        self.inner.blob_names().iter().cloned().collect()
    }

    pub fn blob_by_name(&self, name: &str) -> Result<Blob> {
        Ok(Blob::from_engine(self.inner.blob_by_name(name)?))
    }

    /// Handles to all layers, each keeping this net alive.
    pub fn layers(&self) -> Sequence<Layer> {
        (0..self.inner.num_layers())
            .map(|i| Layer::new(Arc::clone(&self.inner), i))
            .collect()
    }

    pub fn layer_names(&self) -> Sequence<String> {
        self.inner.layer_names().iter().cloned().collect()
    }

    pub fn bottom_ids(&self, layer: usize) -> Result<Sequence<usize>> {
        Ok(self.inner.bottom_ids(layer)?.into_iter().collect())
    }

    pub fn top_ids(&self, layer: usize) -> Result<Sequence<usize>> {
        Ok(self.inner.top_ids(layer)?.into_iter().collect())
    }

    pub fn blob_loss_weights(&self) -> Sequence<f32> {
        self.inner.blob_loss_weights().iter().copied().collect()
    }

    /// Indices of the net's input blobs.
    pub fn inputs(&self) -> Sequence<usize> {
        self.inner.input_ids().iter().copied().collect()
    }

    /// Indices of the net's output blobs.
    pub fn outputs(&self) -> Sequence<usize> {
        self.inner.output_ids().iter().copied().collect()
    }
}
