use std::sync::Arc;

use crate::blob::Blob;
use crate::error::{EngineErr, Result};
use crate::layer::{Layer, PinnedBuffer};
use crate::netdef::MemoryDataDef;

/// A layer that feeds externally owned buffers into the net.
///
/// Unlike every other layer, it does not own its input data: `reset`
/// re-points it at caller-supplied buffers and the layer becomes a custodian
/// of those buffers until the next `reset` (or its own destruction). Each
/// forward pass copies the next `batch_size` examples into the top blobs,
/// wrapping around at the end.
pub struct MemoryData {
    name: String,
    cfg: MemoryDataDef,
    source: Option<Source>,
}

struct Source {
    data: Arc<dyn PinnedBuffer>,
    labels: Arc<dyn PinnedBuffer>,
    n: usize,
    cursor: usize,
}

impl MemoryData {
    pub fn new(name: String, cfg: MemoryDataDef) -> Self {
        Self {
            name,
            cfg,
            source: None,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.cfg.batch_size
    }

    /// Full data shape including the leading batch dimension.
    pub fn data_shape(&self) -> Vec<usize> {
        vec![
            self.cfg.batch_size,
            self.cfg.channels,
            self.cfg.height,
            self.cfg.width,
        ]
    }

    /// Label shape: one scalar label per example.
    pub fn label_shape(&self) -> Vec<usize> {
        vec![self.cfg.batch_size]
    }

    fn example_size(&self) -> usize {
        self.cfg.channels * self.cfg.height * self.cfg.width
    }

    /// Re-points the layer at new input buffers.
    ///
    /// `n` is the example count; the caller has already validated shapes and
    /// divisibility. The previous custody edge (if any) is dropped here,
    /// releasing the old buffers.
    pub fn reset(
        &mut self,
        data: Arc<dyn PinnedBuffer>,
        labels: Arc<dyn PinnedBuffer>,
        n: usize,
    ) -> Result<()> {
        let needed = n * self.example_size();
        if data.as_f32().len() != needed {
            return Err(EngineErr::ShapeMismatch {
                what: "memory data buffer",
                got: data.as_f32().len(),
                expected: needed,
            });
        }
        if labels.as_f32().len() != n {
            return Err(EngineErr::ShapeMismatch {
                what: "memory label buffer",
                got: labels.as_f32().len(),
                expected: n,
            });
        }
        self.source = Some(Source {
            data,
            labels,
            n,
            cursor: 0,
        });
        Ok(())
    }
}

impl Layer for MemoryData {
    fn layer_type(&self) -> &'static str {
        "MemoryData"
    }

    fn reshape(&mut self, _bottom: &[Arc<Blob>], top: &[Arc<Blob>]) -> Result<()> {
        if top.len() != 2 {
            return Err(EngineErr::ShapeMismatch {
                what: "memory data tops",
                got: top.len(),
                expected: 2,
            });
        }
        top[0].reshape(&self.data_shape());
        top[1].reshape(&self.label_shape());
        Ok(())
    }

    fn forward(&mut self, _bottom: &[Arc<Blob>], top: &[Arc<Blob>]) -> Result<f32> {
        let source = self.source.as_mut().ok_or_else(|| EngineErr::NoInputData {
            layer: self.name.clone(),
        })?;

        let batch = self.cfg.batch_size;
        let example = self.cfg.channels * self.cfg.height * self.cfg.width;
        let start = source.cursor;

        let data = source.data.as_f32();
        let labels = source.labels.as_f32();
        top[0].data_mut()[..batch * example]
            .copy_from_slice(&data[start * example..(start + batch) * example]);
        top[1].data_mut()[..batch].copy_from_slice(&labels[start..start + batch]);

        source.cursor = (source.cursor + batch) % source.n;
        Ok(0.0)
    }

    fn backward(&mut self, _top: &[Arc<Blob>], _bottom: &[Arc<Blob>]) -> Result<()> {
        // Input layers have nothing to propagate.
        Ok(())
    }

    fn as_memory_data(&mut self) -> Option<&mut MemoryData> {
        Some(self)
    }

    fn memory_data(&self) -> Option<&MemoryData> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer() -> MemoryData {
        MemoryData::new(
            "data".to_string(),
            MemoryDataDef {
                batch_size: 2,
                channels: 1,
                height: 1,
                width: 2,
            },
        )
    }

    #[test]
    fn forward_without_reset_fails() {
        let mut md = layer();
        let tops = vec![Arc::new(Blob::new(&[0])), Arc::new(Blob::new(&[0]))];
        md.reshape(&[], &tops).unwrap();
        assert!(matches!(
            md.forward(&[], &tops),
            Err(EngineErr::NoInputData { .. })
        ));
    }

    #[test]
    fn forward_consumes_batches_in_order_and_wraps() {
        let mut md = layer();
        let tops = vec![Arc::new(Blob::new(&[0])), Arc::new(Blob::new(&[0]))];
        md.reshape(&[], &tops).unwrap();

        let data: Arc<dyn PinnedBuffer> =
            Arc::new((0..8).map(|v| v as f32).collect::<Vec<f32>>());
        let labels: Arc<dyn PinnedBuffer> = Arc::new(vec![10.0, 11.0, 12.0, 13.0]);
        md.reset(data, labels, 4).unwrap();

        md.forward(&[], &tops).unwrap();
        assert_eq!(&*tops[0].data(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(&*tops[1].data(), &[10.0, 11.0]);

        md.forward(&[], &tops).unwrap();
        assert_eq!(&*tops[0].data(), &[4.0, 5.0, 6.0, 7.0]);
        assert_eq!(&*tops[1].data(), &[12.0, 13.0]);

        // Wrap-around.
        md.forward(&[], &tops).unwrap();
        assert_eq!(&*tops[1].data(), &[10.0, 11.0]);
    }

    #[test]
    fn reset_checks_buffer_sizes() {
        let mut md = layer();
        let data: Arc<dyn PinnedBuffer> = Arc::new(vec![0.0; 7]);
        let labels: Arc<dyn PinnedBuffer> = Arc::new(vec![0.0; 4]);
        assert!(matches!(
            md.reset(data, labels, 4),
            Err(EngineErr::ShapeMismatch { .. })
        ));
    }
}
