use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::blob::Blob;
use crate::checkpoint;
use crate::error::{EngineErr, Result};
use crate::layer::{build_layer, is_loss_type, Layer, PinnedBuffer};
use crate::layers::MemoryData;
use crate::netdef::{NetDef, Phase};

/// Shape information of a memory-input layer, used by the boundary layer to
/// validate injected buffers before any storage is touched.
#[derive(Debug, Clone)]
pub struct MemoryDataInfo {
    pub data_shape: Vec<usize>,
    pub label_shape: Vec<usize>,
    pub batch_size: usize,
}

/// An ordered sequence of layers and the named blobs flowing between them.
///
/// The layer sequence is fixed at build time; reshape may resize blobs but
/// never reorders layers. Blobs are shared (`Arc`) so exported views and
/// solver parameter lists outlive the net if they need to.
pub struct Net {
    name: String,
    phase: Phase,
    layers: Vec<RwLock<Box<dyn Layer>>>,
    layer_names: Vec<String>,
    layer_types: Vec<String>,
    blobs: Vec<Arc<Blob>>,
    blob_names: Vec<String>,
    bottom_ids: Vec<Vec<usize>>,
    top_ids: Vec<Vec<usize>>,
    blob_loss_weights: Vec<f32>,
    input_ids: Vec<usize>,
    output_ids: Vec<usize>,
}

impl Net {
    /// Builds a net for the given phase. Layers restricted to the other
    /// phase are skipped.
    pub fn build(def: &NetDef, phase: Phase, seed: u64) -> Result<Net> {
        let mut blobs: Vec<Arc<Blob>> = Vec::new();
        let mut blob_names: Vec<String> = Vec::new();
        let mut blob_index: HashMap<String, usize> = HashMap::new();
        let mut layers = Vec::new();
        let mut layer_names = Vec::new();
        let mut layer_types = Vec::new();
        let mut bottom_ids: Vec<Vec<usize>> = Vec::new();
        let mut top_ids: Vec<Vec<usize>> = Vec::new();
        let mut blob_loss_weights: Vec<f32> = Vec::new();

        for (idx, layer_def) in def.layers.iter().enumerate() {
            if let Some(p) = layer_def.phase {
                if p != phase {
                    continue;
                }
            }

            let mut bottoms = Vec::with_capacity(layer_def.bottoms.len());
            for name in &layer_def.bottoms {
                let id = *blob_index.get(name).ok_or_else(|| EngineErr::UnknownBlob {
                    name: name.clone(),
                })?;
                bottoms.push(id);
            }

            let mut tops = Vec::with_capacity(layer_def.tops.len());
            for name in &layer_def.tops {
                let id = *blob_index.entry(name.clone()).or_insert_with(|| {
                    blobs.push(Arc::new(Blob::new(&[0])));
                    blob_names.push(name.clone());
                    blob_loss_weights.push(0.0);
                    blobs.len() - 1
                });
                tops.push(id);
            }

            // No in-place layers: a top aliasing a bottom (or another top of
            // the same layer) would have forward writing a blob it holds a
            // read guard on.
            for (i, id) in tops.iter().enumerate() {
                if bottoms.contains(id) || tops[..i].contains(id) {
                    return Err(EngineErr::MalformedDef {
                        what: format!(
                            "layer {} cannot write blob {} it already uses",
                            layer_def.name, layer_def.tops[i]
                        ),
                    });
                }
            }

            let layer = build_layer(layer_def, seed.wrapping_add(idx as u64))?;
            let default_weight = if is_loss_type(&layer_def.layer_type) {
                1.0
            } else {
                0.0
            };
            if let Some(&first_top) = tops.first() {
                blob_loss_weights[first_top] = layer_def.loss_weight.unwrap_or(default_weight);
            }

            layers.push(RwLock::new(layer));
            layer_names.push(layer_def.name.clone());
            layer_types.push(layer_def.layer_type.clone());
            bottom_ids.push(bottoms);
            top_ids.push(tops);
        }

        // Inputs: tops of source layers (no bottoms). Outputs: blobs never
        // consumed by a later layer.
        let consumed: Vec<usize> = bottom_ids.iter().flatten().copied().collect();
        let input_ids = bottom_ids
            .iter()
            .zip(&top_ids)
            .filter(|(b, _)| b.is_empty())
            .flat_map(|(_, t)| t.iter().copied())
            .collect();
        let output_ids = (0..blobs.len())
            .filter(|id| !consumed.contains(id))
            .collect();

        let net = Net {
            name: def.name.clone(),
            phase,
            layers,
            layer_names,
            layer_types,
            blobs,
            blob_names,
            bottom_ids,
            top_ids,
            blob_loss_weights,
            input_ids,
            output_ids,
        };
        net.reshape()?;
        log::debug!(
            "built net {} ({} layers, {} blobs)",
            net.name,
            net.layers.len(),
            net.blobs.len()
        );
        Ok(net)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layer_names(&self) -> &[String] {
        &self.layer_names
    }

    pub fn layer_type(&self, index: usize) -> Result<&str> {
        self.layer_types
            .get(index)
            .map(String::as_str)
            .ok_or(EngineErr::LayerRange {
                start: index,
                end: index,
                len: self.layers.len(),
            })
    }

    pub fn layer_blobs(&self, index: usize) -> Result<Vec<Arc<Blob>>> {
        let layer = self.layers.get(index).ok_or(EngineErr::LayerRange {
            start: index,
            end: index,
            len: self.layers.len(),
        })?;
        Ok(layer.read().blobs().to_vec())
    }

    pub fn blobs(&self) -> &[Arc<Blob>] {
        &self.blobs
    }

    pub fn blob_names(&self) -> &[String] {
        &self.blob_names
    }

    pub fn blob_by_name(&self, name: &str) -> Result<Arc<Blob>> {
        self.blob_names
            .iter()
            .position(|n| n == name)
            .map(|i| Arc::clone(&self.blobs[i]))
            .ok_or_else(|| EngineErr::UnknownBlob {
                name: name.to_string(),
            })
    }

    pub fn bottom_ids(&self, layer: usize) -> Result<Vec<usize>> {
        self.bottom_ids
            .get(layer)
            .cloned()
            .ok_or(EngineErr::LayerRange {
                start: layer,
                end: layer,
                len: self.layers.len(),
            })
    }

    pub fn top_ids(&self, layer: usize) -> Result<Vec<usize>> {
        self.top_ids
            .get(layer)
            .cloned()
            .ok_or(EngineErr::LayerRange {
                start: layer,
                end: layer,
                len: self.layers.len(),
            })
    }

    pub fn blob_loss_weights(&self) -> &[f32] {
        &self.blob_loss_weights
    }

    pub fn input_ids(&self) -> &[usize] {
        &self.input_ids
    }

    pub fn output_ids(&self) -> &[usize] {
        &self.output_ids
    }

    fn gather(&self, ids: &[usize]) -> Vec<Arc<Blob>> {
        ids.iter().map(|&i| Arc::clone(&self.blobs[i])).collect()
    }

    /// Runs layers `start..=end` in order, returning the accumulated weighted
    /// loss.
    pub fn forward_from_to(&self, start: usize, end: usize) -> Result<f32> {
        if start > end || end >= self.layers.len() {
            return Err(EngineErr::LayerRange {
                start,
                end,
                len: self.layers.len(),
            });
        }
        let mut loss = 0.0;
        for i in start..=end {
            let bottoms = self.gather(&self.bottom_ids[i]);
            let tops = self.gather(&self.top_ids[i]);
            let layer_loss = self.layers[i].write().forward(&bottoms, &tops)?;
            if layer_loss != 0.0 {
                let weight = self
                    .top_ids[i]
                    .first()
                    .map(|&id| self.blob_loss_weights[id])
                    .unwrap_or(1.0);
                loss += layer_loss * weight;
            }
        }
        Ok(loss)
    }

    /// Runs layers `start` down to `end` (inclusive) in reverse order.
    pub fn backward_from_to(&self, start: usize, end: usize) -> Result<()> {
        if end > start || start >= self.layers.len() {
            return Err(EngineErr::LayerRange {
                start,
                end,
                len: self.layers.len(),
            });
        }
        for i in (end..=start).rev() {
            let bottoms = self.gather(&self.bottom_ids[i]);
            let tops = self.gather(&self.top_ids[i]);
            self.layers[i].write().backward(&tops, &bottoms)?;
        }
        Ok(())
    }

    pub fn forward_all(&self) -> Result<f32> {
        self.forward_from_to(0, self.layers.len().saturating_sub(1))
    }

    pub fn backward_all(&self) -> Result<()> {
        self.backward_from_to(self.layers.len().saturating_sub(1), 0)
    }

    /// Recomputes every blob shape from current input shapes.
    pub fn reshape(&self) -> Result<()> {
        for i in 0..self.layers.len() {
            let bottoms = self.gather(&self.bottom_ids[i]);
            let tops = self.gather(&self.top_ids[i]);
            self.layers[i].write().reshape(&bottoms, &tops)?;
        }
        Ok(())
    }

    /// Learnable parameters with stable checkpoint names
    /// (`<layer_name>.<param_index>`).
    pub fn params(&self) -> Vec<(String, Arc<Blob>)> {
        let mut out = Vec::new();
        for (i, layer) in self.layers.iter().enumerate() {
            for (j, blob) in layer.read().blobs().iter().enumerate() {
                out.push((format!("{}.{j}", self.layer_names[i]), Arc::clone(blob)));
            }
        }
        out
    }

    pub fn param_blobs(&self) -> Vec<Arc<Blob>> {
        self.params().into_iter().map(|(_, b)| b).collect()
    }

    /// Copies learned weights from a checkpoint file, matching parameters by
    /// name. Parameters absent from the file keep their current values.
    pub fn copy_trained_layers_from(&self, path: &Path) -> Result<()> {
        let loaded = checkpoint::load_weights(path)?;
        for (name, blob) in self.params() {
            if let Some((_, values)) = loaded.get(&name) {
                blob.set_data(values)?;
            }
        }
        Ok(())
    }

    /// Aliases this net's learnable blobs to `other`'s, matching layers by
    /// name. Subsequent updates to either net touch the shared storage.
    pub fn share_trained_layers_with(&self, other: &Net) -> Result<()> {
        for (i, name) in self.layer_names.iter().enumerate() {
            let Some(j) = other.layer_names.iter().position(|n| n == name) else {
                continue;
            };
            let theirs = other.layers[j].read().blobs().to_vec();
            if theirs.is_empty() {
                continue;
            }
            self.layers[i].write().share_blobs(&theirs)?;
        }
        Ok(())
    }

    pub fn save_weights(&self, path: &Path) -> Result<()> {
        checkpoint::save_weights(path, &self.params())
    }

    fn check_layer_index(&self, index: usize) -> Result<()> {
        if index >= self.layers.len() {
            return Err(EngineErr::LayerRange {
                start: index,
                end: index,
                len: self.layers.len(),
            });
        }
        Ok(())
    }

    /// Shape information if the layer at `index` is a memory-input layer.
    pub fn memory_data_info(&self, index: usize) -> Result<Option<MemoryDataInfo>> {
        self.check_layer_index(index)?;
        let layer = self.layers[index].read();
        Ok(layer.memory_data().map(|md| MemoryDataInfo {
            data_shape: md.data_shape(),
            label_shape: md.label_shape(),
            batch_size: md.batch_size(),
        }))
    }

    /// Runs `f` against the memory-input layer at `index`, or returns
    /// `Ok(None)` if that layer is of a different type.
    pub fn with_memory_data<R>(
        &self,
        index: usize,
        f: impl FnOnce(&mut MemoryData) -> Result<R>,
    ) -> Result<Option<R>> {
        self.check_layer_index(index)?;
        let mut layer = self.layers[index].write();
        match layer.as_memory_data() {
            Some(md) => f(md).map(Some),
            None => Ok(None),
        }
    }

    /// Injects pre-validated buffers into the memory-input layer at `index`.
    pub fn reset_memory_data(
        &self,
        index: usize,
        data: Arc<dyn PinnedBuffer>,
        labels: Arc<dyn PinnedBuffer>,
        n: usize,
    ) -> Result<Option<()>> {
        self.with_memory_data(index, |md| md.reset(data, labels, n))
    }
}
