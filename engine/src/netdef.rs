//! Model definitions.
//!
//! Nets are described by a JSON document listing layers in execution order.
//! The format is opaque to the boundary layer, which only passes file paths
//! through after an openability check.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Whether a net is built for training or inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Train,
    Test,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetDef {
    pub name: String,
    #[serde(default)]
    pub layers: Vec<LayerDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerDef {
    pub name: String,
    #[serde(rename = "type")]
    pub layer_type: String,
    #[serde(default)]
    pub bottoms: Vec<String>,
    #[serde(default)]
    pub tops: Vec<String>,
    /// Restricts the layer to one phase; absent means both.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    /// Loss weight applied to the first top blob. Defaults to 1 for loss
    /// layers and 0 otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss_weight: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_data: Option<MemoryDataDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_product: Option<InnerProductDef>,
}

/// Configuration of a memory-input layer: batch size plus the per-example
/// data shape (channels, height, width).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MemoryDataDef {
    pub batch_size: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InnerProductDef {
    pub num_output: usize,
}

impl NetDef {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
