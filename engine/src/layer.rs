use std::sync::Arc;

use crate::blob::Blob;
use crate::error::{EngineErr, Result};
use crate::layers::{EuclideanLoss, InnerProduct, MemoryData};
use crate::netdef::LayerDef;

/// A host-owned buffer the engine may retain raw access to.
///
/// Injected training data stays owned by the caller; the receiving layer
/// keeps an `Arc<dyn PinnedBuffer>` alive for as long as it reads from the
/// buffer, so the storage can never be released underneath it.
pub trait PinnedBuffer: Send + Sync {
    fn as_f32(&self) -> &[f32];
}

impl PinnedBuffer for Vec<f32> {
    fn as_f32(&self) -> &[f32] {
        self
    }
}

/// One processing stage of a net.
///
/// Learnable blobs are exposed through `blobs` so the owning net can collect
/// parameters for the solver and alias them for weight sharing.
pub trait Layer: Send + Sync {
    fn layer_type(&self) -> &'static str;

    /// Learnable parameter blobs, in a stable order.
    fn blobs(&self) -> &[Arc<Blob>] {
        &[]
    }

    /// Replaces this layer's learnable blobs with aliases of `from`, for
    /// `share_with`. Layers without parameters ignore the call.
    fn share_blobs(&mut self, from: &[Arc<Blob>]) -> Result<()> {
        let _ = from;
        Ok(())
    }

    /// Recomputes top shapes from bottom shapes, allocating parameters on
    /// first use.
    fn reshape(&mut self, bottom: &[Arc<Blob>], top: &[Arc<Blob>]) -> Result<()>;

    /// Runs the layer; loss layers return their unweighted scalar loss,
    /// everything else returns 0.
    fn forward(&mut self, bottom: &[Arc<Blob>], top: &[Arc<Blob>]) -> Result<f32>;

    fn backward(&mut self, top: &[Arc<Blob>], bottom: &[Arc<Blob>]) -> Result<()>;

    /// Downcast hook for the data-injection path.
    fn as_memory_data(&mut self) -> Option<&mut MemoryData> {
        None
    }

    fn memory_data(&self) -> Option<&MemoryData> {
        None
    }
}

/// Names of all registered layer types.
pub fn layer_type_list() -> Vec<&'static str> {
    vec!["EuclideanLoss", "InnerProduct", "MemoryData"]
}

/// Instantiates a layer from its definition.
pub fn build_layer(def: &LayerDef, seed: u64) -> Result<Box<dyn Layer>> {
    match def.layer_type.as_str() {
        "MemoryData" => {
            let cfg = def.memory_data.ok_or_else(|| EngineErr::MalformedDef {
                what: format!("layer {} is MemoryData but has no memory_data block", def.name),
            })?;
            Ok(Box::new(MemoryData::new(def.name.clone(), cfg)))
        }
        "InnerProduct" => {
            let cfg = def.inner_product.ok_or_else(|| EngineErr::MalformedDef {
                what: format!(
                    "layer {} is InnerProduct but has no inner_product block",
                    def.name
                ),
            })?;
            Ok(Box::new(InnerProduct::new(cfg.num_output, seed)))
        }
        "EuclideanLoss" => Ok(Box::new(EuclideanLoss::new())),
        other => Err(EngineErr::UnknownLayerType {
            name: other.to_string(),
        }),
    }
}

/// Whether tops of this layer type carry loss by default.
pub fn is_loss_type(layer_type: &str) -> bool {
    layer_type.ends_with("Loss")
}
