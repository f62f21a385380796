//! Binary weights persistence (safetensors format).

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use safetensors::tensor::TensorView;
use safetensors::{serialize, Dtype, SafeTensors};

use crate::blob::Blob;
use crate::error::{EngineErr, Result};

fn checkpoint_err(e: impl std::fmt::Display) -> EngineErr {
    EngineErr::Checkpoint {
        what: e.to_string(),
    }
}

/// Writes named parameter blobs to a safetensors file.
pub fn save_weights(path: &Path, params: &[(String, Arc<Blob>)]) -> Result<()> {
    // Snapshot under the blob locks first; TensorView only borrows.
    let snapshots: Vec<(String, Vec<usize>, Vec<u8>)> = params
        .iter()
        .map(|(name, blob)| {
            let data = blob.data();
            let bytes: &[u8] = bytemuck::cast_slice(&data);
            (name.clone(), blob.shape(), bytes.to_vec())
        })
        .collect();

    let mut views = Vec::with_capacity(snapshots.len());
    for (name, shape, bytes) in &snapshots {
        let view =
            TensorView::new(Dtype::F32, shape.clone(), bytes).map_err(checkpoint_err)?;
        views.push((name.clone(), view));
    }

    let encoded = serialize(views, &None).map_err(checkpoint_err)?;
    fs::write(path, encoded)?;
    Ok(())
}

/// Reads every tensor from a safetensors file into owned f32 buffers.
pub fn load_weights(path: &Path) -> Result<HashMap<String, (Vec<usize>, Vec<f32>)>> {
    let bytes = fs::read(path)?;
    let tensors = SafeTensors::deserialize(&bytes).map_err(checkpoint_err)?;

    let mut out = HashMap::new();
    for (name, view) in tensors.tensors() {
        if view.dtype() != Dtype::F32 {
            return Err(EngineErr::Checkpoint {
                what: format!("tensor {name} is not f32"),
            });
        }
        // File bytes need not be 4-aligned; decode element-wise.
        let values: Vec<f32> = view
            .data()
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        out.insert(name.to_string(), (view.shape().to_vec(), values));
    }
    Ok(out)
}
