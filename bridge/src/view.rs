//! Zero-copy tensor views.

use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard};

use engine::Blob as EngineBlob;

/// Which of the blob's two buffers a view exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Data,
    Diff,
}

/// A host-visible view over a blob's `data` or `diff` buffer.
///
/// The view copies nothing: element access goes straight to the blob's
/// storage. It snapshots the blob's shape at export time and holds a strong
/// back-reference to the blob, so the storage outlives the view even if the
/// owning net is dropped first. Two exports of the same buffer are fully
/// independent views.
#[derive(Clone)]
pub struct TensorView {
    blob: Arc<EngineBlob>,
    kind: ViewKind,
    shape: Vec<usize>,
    generation: u64,
}

impl TensorView {
    pub(crate) fn export(blob: &Arc<EngineBlob>, kind: ViewKind) -> Self {
        Self {
            blob: Arc::clone(blob),
            kind,
            shape: blob.shape(),
            generation: blob.generation(),
        }
    }

    /// The blob's shape as of export time.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn num_axes(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once a later reshape has changed the blob's shape, making this
    /// view's shape snapshot stale.
    pub fn is_stale(&self) -> bool {
        self.blob.generation() != self.generation
    }

    /// Read access to the live buffer. No copy is made.
    pub fn read(&self) -> MappedRwLockReadGuard<'_, [f32]> {
        match self.kind {
            ViewKind::Data => self.blob.data(),
            ViewKind::Diff => self.blob.diff(),
        }
    }

    /// Write access to the live buffer. No copy is made.
    pub fn write(&self) -> MappedRwLockWriteGuard<'_, [f32]> {
        match self.kind {
            ViewKind::Data => self.blob.data_mut(),
            ViewKind::Diff => self.blob.diff_mut(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_reports_shape_at_export_time() {
        let blob = Arc::new(EngineBlob::new(&[2, 3]));
        let before = TensorView::export(&blob, ViewKind::Data);
        blob.reshape(&[6, 2]);
        let after = TensorView::export(&blob, ViewKind::Data);

        assert_eq!(before.shape(), &[2, 3]);
        assert_eq!(after.shape(), &[6, 2]);
        assert!(before.is_stale());
        assert!(!after.is_stale());

        // A same-count reshape changes the shape, so the snapshot is stale
        // even though nothing reallocated.
        blob.reshape(&[2, 6]);
        assert!(after.is_stale());
    }

    #[test]
    fn writes_through_one_view_are_seen_by_another() {
        let blob = Arc::new(EngineBlob::new(&[4]));
        let a = TensorView::export(&blob, ViewKind::Data);
        let b = TensorView::export(&blob, ViewKind::Data);
        a.write()[0] = 7.0;
        assert_eq!(b.read()[0], 7.0);

        // diff is a distinct buffer.
        let d = TensorView::export(&blob, ViewKind::Diff);
        assert_eq!(d.read()[0], 0.0);
    }

    #[test]
    fn view_keeps_blob_alive() {
        let blob = Arc::new(EngineBlob::new(&[2]));
        let view = TensorView::export(&blob, ViewKind::Data);
        assert_eq!(Arc::strong_count(&blob), 2);
        drop(blob);
        // Storage still reachable through the view's back-reference.
        assert_eq!(view.read().len(), 2);
    }
}
