use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use crate::error::{EngineErr, Result};

/// A dense f32 buffer with an activation view (`data`) and a gradient view
/// (`diff`) of identical shape.
///
/// Storage is guarded so that shared handles (the owning net, exported host
/// views, solver parameter lists) can coexist. Reshape may reallocate; the
/// generation counter lets an exported view detect that its snapshot of the
/// shape no longer matches.
#[derive(Debug)]
pub struct Blob {
    inner: RwLock<BlobInner>,
}

#[derive(Debug)]
struct BlobInner {
    shape: Vec<usize>,
    data: Vec<f32>,
    diff: Vec<f32>,
    generation: u64,
}

impl Blob {
    pub fn new(shape: &[usize]) -> Self {
        let count = shape.iter().product();
        Self {
            inner: RwLock::new(BlobInner {
                shape: shape.to_vec(),
                data: vec![0.0; count],
                diff: vec![0.0; count],
                generation: 0,
            }),
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        self.inner.read().shape.clone()
    }

    pub fn num_axes(&self) -> usize {
        self.inner.read().shape.len()
    }

    pub fn count(&self) -> usize {
        self.inner.read().data.len()
    }

    /// Extent of one axis, for the legacy `num`/`channels`/`height`/`width`
    /// accessors.
    pub fn axis(&self, axis: usize) -> Result<usize> {
        let inner = self.inner.read();
        inner
            .shape
            .get(axis)
            .copied()
            .ok_or(EngineErr::AxisOutOfRange {
                axis,
                num_axes: inner.shape.len(),
            })
    }

    /// Bumped whenever a reshape changes the shape, so an exported view can
    /// tell that its snapshot no longer matches.
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Resizes the blob. Contents are preserved up to the new count; grown
    /// regions are zero-filled. A no-op when the shape is unchanged.
    pub fn reshape(&self, shape: &[usize]) {
        let count: usize = shape.iter().product();
        let mut inner = self.inner.write();
        if inner.shape == shape {
            return;
        }
        if count != inner.data.len() {
            inner.data.resize(count, 0.0);
            inner.diff.resize(count, 0.0);
        }
        inner.shape = shape.to_vec();
        inner.generation += 1;
    }

    pub fn data(&self) -> MappedRwLockReadGuard<'_, [f32]> {
        RwLockReadGuard::map(self.inner.read(), |b| b.data.as_slice())
    }

    pub fn data_mut(&self) -> MappedRwLockWriteGuard<'_, [f32]> {
        RwLockWriteGuard::map(self.inner.write(), |b| b.data.as_mut_slice())
    }

    pub fn diff(&self) -> MappedRwLockReadGuard<'_, [f32]> {
        RwLockReadGuard::map(self.inner.read(), |b| b.diff.as_slice())
    }

    pub fn diff_mut(&self) -> MappedRwLockWriteGuard<'_, [f32]> {
        RwLockWriteGuard::map(self.inner.write(), |b| b.diff.as_mut_slice())
    }

    /// Runs `f` over `(data, diff)` under a single write lock, for solver
    /// updates that read the gradient while mutating the weights.
    pub fn apply_update<R>(&self, f: impl FnOnce(&mut [f32], &mut [f32]) -> R) -> R {
        let mut inner = self.inner.write();
        let inner = &mut *inner;
        f(&mut inner.data, &mut inner.diff)
    }

    pub fn set_data(&self, values: &[f32]) -> Result<()> {
        let mut inner = self.inner.write();
        if values.len() != inner.data.len() {
            return Err(EngineErr::ShapeMismatch {
                what: "blob data",
                got: values.len(),
                expected: inner.data.len(),
            });
        }
        inner.data.copy_from_slice(values);
        Ok(())
    }

    pub fn zero_diff(&self) {
        self.inner.write().diff.fill(0.0);
    }
}
