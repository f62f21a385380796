use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::blob::Blob;
use crate::error::{EngineErr, Result};
use crate::layer::Layer;

/// Fully connected layer: `y = x W^T + b`.
///
/// `W` is `(num_output, in_features)`, `b` is `(num_output,)`. Parameters are
/// allocated on the first reshape once the bottom shape is known.
pub struct InnerProduct {
    num_output: usize,
    in_features: usize,
    seed: u64,
    params: Vec<Arc<Blob>>,
}

impl InnerProduct {
    pub fn new(num_output: usize, seed: u64) -> Self {
        Self {
            num_output,
            in_features: 0,
            seed,
            params: Vec::new(),
        }
    }

    fn weight_view(data: &[f32], m: usize, k: usize) -> Result<ArrayView2<'_, f32>> {
        ArrayView2::from_shape((m, k), data).map_err(|_| EngineErr::ShapeMismatch {
            what: "inner product weights",
            got: data.len(),
            expected: m * k,
        })
    }
}

impl Layer for InnerProduct {
    fn layer_type(&self) -> &'static str {
        "InnerProduct"
    }

    fn blobs(&self) -> &[Arc<Blob>] {
        &self.params
    }

    fn share_blobs(&mut self, from: &[Arc<Blob>]) -> Result<()> {
        if from.len() != self.params.len() {
            return Err(EngineErr::ShapeMismatch {
                what: "shared parameter blobs",
                got: from.len(),
                expected: self.params.len(),
            });
        }
        for (mine, theirs) in self.params.iter().zip(from) {
            if mine.count() != theirs.count() {
                return Err(EngineErr::ShapeMismatch {
                    what: "shared parameter count",
                    got: theirs.count(),
                    expected: mine.count(),
                });
            }
        }
        self.params = from.to_vec();
        Ok(())
    }

    fn reshape(&mut self, bottom: &[Arc<Blob>], top: &[Arc<Blob>]) -> Result<()> {
        if bottom.len() != 1 || top.len() != 1 {
            return Err(EngineErr::MalformedDef {
                what: format!(
                    "inner product takes 1 bottom and 1 top, got {} and {}",
                    bottom.len(),
                    top.len()
                ),
            });
        }
        let bottom_shape = bottom[0].shape();
        let n = bottom_shape.first().copied().unwrap_or(0);
        let in_features: usize = bottom_shape.iter().skip(1).product();

        if self.params.is_empty() {
            self.in_features = in_features;
            let weights = Arc::new(Blob::new(&[self.num_output, in_features]));
            let scale = 1.0 / (in_features.max(1) as f32).sqrt();
            let mut rng = StdRng::seed_from_u64(self.seed);
            for w in weights.data_mut().iter_mut() {
                *w = rng.random_range(-scale..scale);
            }
            let bias = Arc::new(Blob::new(&[self.num_output]));
            self.params = vec![weights, bias];
        } else if in_features != self.in_features {
            return Err(EngineErr::ShapeMismatch {
                what: "inner product input features",
                got: in_features,
                expected: self.in_features,
            });
        }

        top[0].reshape(&[n, self.num_output]);
        Ok(())
    }

    fn forward(&mut self, bottom: &[Arc<Blob>], top: &[Arc<Blob>]) -> Result<f32> {
        let n = bottom[0].shape().first().copied().unwrap_or(0);
        let (m, k) = (self.num_output, self.in_features);

        let x_guard = bottom[0].data();
        let x = ArrayView2::from_shape((n, k), &x_guard).map_err(|_| EngineErr::ShapeMismatch {
            what: "inner product bottom",
            got: x_guard.len(),
            expected: n * k,
        })?;
        let w_guard = self.params[0].data();
        let w = Self::weight_view(&w_guard, m, k)?;
        let b_guard = self.params[1].data();

        let mut y: Array2<f32> = x.dot(&w.t());
        let bias = Array1::from_iter(b_guard.iter().copied());
        y += &bias;

        let mut out = top[0].data_mut();
        for (dst, src) in out.iter_mut().zip(y.iter()) {
            *dst = *src;
        }
        Ok(0.0)
    }

    fn backward(&mut self, top: &[Arc<Blob>], bottom: &[Arc<Blob>]) -> Result<()> {
        let n = bottom[0].shape().first().copied().unwrap_or(0);
        let (m, k) = (self.num_output, self.in_features);

        // Data and diff share one lock per blob: every read guard must be
        // gone before any diff_mut below, or this thread deadlocks on its
        // own lock.
        let (dw, db, dx) = {
            let dy_guard = top[0].diff();
            let dy = ArrayView2::from_shape((n, m), &dy_guard).map_err(|_| {
                EngineErr::ShapeMismatch {
                    what: "inner product top diff",
                    got: dy_guard.len(),
                    expected: n * m,
                }
            })?;
            let x_guard = bottom[0].data();
            let x =
                ArrayView2::from_shape((n, k), &x_guard).map_err(|_| EngineErr::ShapeMismatch {
                    what: "inner product bottom",
                    got: x_guard.len(),
                    expected: n * k,
                })?;
            let w_guard = self.params[0].data();
            let w = Self::weight_view(&w_guard, m, k)?;

            let dw: Array2<f32> = dy.t().dot(&x);
            let db = dy.sum_axis(Axis(0));
            let dx: Array2<f32> = dy.dot(&w);
            (dw, db, dx)
        };

        // Parameter gradients accumulate across the backward pass.
        {
            let mut w_diff = self.params[0].diff_mut();
            for (acc, g) in w_diff.iter_mut().zip(dw.iter()) {
                *acc += *g;
            }
        }
        {
            let mut b_diff = self.params[1].diff_mut();
            for (acc, g) in b_diff.iter_mut().zip(db.iter()) {
                *acc += *g;
            }
        }

        let mut bottom_diff = bottom[0].diff_mut();
        for (dst, src) in bottom_diff.iter_mut().zip(dx.iter()) {
            *dst = *src;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_matches_manual_product() {
        let mut ip = InnerProduct::new(1, 7);
        let bottom = vec![Arc::new(Blob::new(&[2, 2]))];
        let top = vec![Arc::new(Blob::new(&[0]))];
        ip.reshape(&bottom, &top).unwrap();
        assert_eq!(top[0].shape(), vec![2, 1]);

        // Fix the parameters for a deterministic check.
        ip.params[0].set_data(&[0.5, -1.0]).unwrap();
        ip.params[1].set_data(&[0.25]).unwrap();
        bottom[0].set_data(&[1.0, 2.0, 3.0, 4.0]).unwrap();

        ip.forward(&bottom, &top).unwrap();
        assert_eq!(&*top[0].data(), &[0.5 - 2.0 + 0.25, 1.5 - 4.0 + 0.25]);
    }

    #[test]
    fn backward_accumulates_parameter_gradients() {
        let mut ip = InnerProduct::new(1, 7);
        let bottom = vec![Arc::new(Blob::new(&[2, 2]))];
        let top = vec![Arc::new(Blob::new(&[0]))];
        ip.reshape(&bottom, &top).unwrap();
        ip.params[0].set_data(&[1.0, 1.0]).unwrap();
        bottom[0].set_data(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        top[0].diff_mut().copy_from_slice(&[1.0, 1.0]);

        ip.backward(&top, &bottom).unwrap();
        assert_eq!(&*ip.params[0].diff(), &[4.0, 6.0]);
        assert_eq!(&*ip.params[1].diff(), &[2.0]);
        assert_eq!(&*bottom[0].diff(), &[1.0, 1.0, 1.0, 1.0]);

        // Second pass accumulates rather than overwrites.
        ip.backward(&top, &bottom).unwrap();
        assert_eq!(&*ip.params[0].diff(), &[8.0, 12.0]);

        // Backward released every lock it took.
        assert_eq!(bottom[0].data().len(), 4);
        assert_eq!(top[0].diff().len(), 2);
    }

    #[test]
    fn wrong_arity_is_rejected_at_reshape() {
        let mut ip = InnerProduct::new(1, 0);
        let bottom = vec![Arc::new(Blob::new(&[2, 2])), Arc::new(Blob::new(&[2, 2]))];
        let top = vec![Arc::new(Blob::new(&[0]))];
        assert!(matches!(
            ip.reshape(&bottom, &top),
            Err(EngineErr::MalformedDef { .. })
        ));
    }
}
