use std::sync::Arc;

use crate::blob::Blob;
use crate::error::{EngineErr, Result};
use crate::layer::Layer;

/// Squared-error loss: `sum((a - b)^2) / 2n` over the two bottoms, where `n`
/// is the batch size. Labels may be flat `(n,)` against `(n, 1)` predictions;
/// only the total element counts must agree.
pub struct EuclideanLoss;

impl EuclideanLoss {
    pub fn new() -> Self {
        Self
    }

    fn check_counts(bottom: &[Arc<Blob>]) -> Result<usize> {
        let a = bottom[0].count();
        let b = bottom[1].count();
        if a != b {
            return Err(EngineErr::ShapeMismatch {
                what: "euclidean loss bottoms",
                got: b,
                expected: a,
            });
        }
        Ok(a)
    }
}

impl Default for EuclideanLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for EuclideanLoss {
    fn layer_type(&self) -> &'static str {
        "EuclideanLoss"
    }

    fn reshape(&mut self, bottom: &[Arc<Blob>], top: &[Arc<Blob>]) -> Result<()> {
        if bottom.len() != 2 || top.len() != 1 {
            return Err(EngineErr::MalformedDef {
                what: format!(
                    "euclidean loss takes 2 bottoms and 1 top, got {} and {}",
                    bottom.len(),
                    top.len()
                ),
            });
        }
        Self::check_counts(bottom)?;
        top[0].reshape(&[1]);
        Ok(())
    }

    fn forward(&mut self, bottom: &[Arc<Blob>], top: &[Arc<Blob>]) -> Result<f32> {
        Self::check_counts(bottom)?;
        let n = bottom[0].shape().first().copied().unwrap_or(1).max(1);
        let a = bottom[0].data();
        let b = bottom[1].data();
        let sq_sum: f32 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
        let loss = sq_sum / (2.0 * n as f32);
        top[0].data_mut()[0] = loss;
        Ok(loss)
    }

    fn backward(&mut self, _top: &[Arc<Blob>], bottom: &[Arc<Blob>]) -> Result<()> {
        Self::check_counts(bottom)?;
        let n = bottom[0].shape().first().copied().unwrap_or(1).max(1) as f32;
        let a = bottom[0].data().to_vec();
        let b = bottom[1].data().to_vec();

        let mut da = bottom[0].diff_mut();
        for ((g, x), y) in da.iter_mut().zip(&a).zip(&b) {
            *g = (x - y) / n;
        }
        drop(da);

        let mut db = bottom[1].diff_mut();
        for ((g, x), y) in db.iter_mut().zip(&a).zip(&b) {
            *g = -(x - y) / n;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_and_gradient() {
        let mut layer = EuclideanLoss::new();
        let bottom = vec![Arc::new(Blob::new(&[2, 1])), Arc::new(Blob::new(&[2]))];
        let top = vec![Arc::new(Blob::new(&[0]))];
        layer.reshape(&bottom, &top).unwrap();

        bottom[0].set_data(&[1.0, 3.0]).unwrap();
        bottom[1].set_data(&[0.0, 1.0]).unwrap();

        let loss = layer.forward(&bottom, &top).unwrap();
        assert!((loss - (1.0 + 4.0) / 4.0).abs() < 1e-6);
        assert_eq!(top[0].data()[0], loss);

        layer.backward(&top, &bottom).unwrap();
        assert_eq!(&*bottom[0].diff(), &[0.5, 1.0]);
        assert_eq!(&*bottom[1].diff(), &[-0.5, -1.0]);
    }

    #[test]
    fn wrong_arity_is_rejected_at_reshape() {
        let mut layer = EuclideanLoss::new();
        let bottom = vec![Arc::new(Blob::new(&[2]))];
        let top = vec![Arc::new(Blob::new(&[0]))];
        assert!(matches!(
            layer.reshape(&bottom, &top),
            Err(EngineErr::MalformedDef { .. })
        ));
    }

    #[test]
    fn mismatched_counts_are_rejected() {
        let mut layer = EuclideanLoss::new();
        let bottom = vec![Arc::new(Blob::new(&[2, 2])), Arc::new(Blob::new(&[2]))];
        let top = vec![Arc::new(Blob::new(&[0]))];
        assert!(matches!(
            layer.reshape(&bottom, &top),
            Err(EngineErr::ShapeMismatch { .. })
        ));
    }
}
