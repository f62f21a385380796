use std::sync::Arc;

use engine::Net as EngineNet;

use crate::blob::Blob;
use crate::error::Result;

/// Host handle to one layer of a net.
///
/// The handle holds the owning net alive: a layer reached through a net that
/// is later dropped stays valid for as long as the handle exists.
#[derive(Clone)]
pub struct Layer {
    net: Arc<EngineNet>,
    index: usize,
}

impl Layer {
    pub(crate) fn new(net: Arc<EngineNet>, index: usize) -> Self {
        Self { net, index }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> String {
        self.net.layer_names()[self.index].clone()
    }

    pub fn layer_type(&self) -> Result<String> {
        Ok(self.net.layer_type(self.index)?.to_string())
    }

    /// Handles to the layer's learnable blobs.
    pub fn blobs(&self) -> Result<Vec<Blob>> {
        Ok(self
            .net
            .layer_blobs(self.index)?
            .into_iter()
            .map(Blob::from_engine)
            .collect())
    }
}
