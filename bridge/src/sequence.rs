//! Bounds-checked sequence wrappers handed to the host.
//!
//! Host-side indexing errors must surface as translated errors, never as
//! panics, so every access goes through `get`/`set` instead of `Index`.

use crate::blob::Blob;
use crate::error::{BridgeErr, Result};
use crate::host::CallArgs;
use crate::layer::Layer;
use crate::net::Net;

/// An owned, growable sequence with index validation on every access.
#[derive(Debug, Clone, Default)]
pub struct Sequence<T> {
    items: Vec<T>,
}

pub type BlobSeq = Sequence<Blob>;
pub type LayerSeq = Sequence<Layer>;
pub type NetSeq = Sequence<Net>;
pub type StringSeq = Sequence<String>;
pub type IntSeq = Sequence<usize>;
pub type FloatSeq = Sequence<f32>;
pub type BoolSeq = Sequence<bool>;

impl<T> Sequence<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&T> {
        self.items.get(index).ok_or(BridgeErr::OutOfBounds {
            index,
            len: self.items.len(),
        })
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut T> {
        let len = self.items.len();
        self.items
            .get_mut(index)
            .ok_or(BridgeErr::OutOfBounds { index, len })
    }

    pub fn set(&mut self, index: usize, value: T) -> Result<()> {
        *self.get_mut(index)? = value;
        Ok(())
    }

    pub fn append(&mut self, value: T) {
        self.items.push(value);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl Sequence<Blob> {
    /// Appends a freshly allocated blob shaped from the ordered dimension
    /// list. Keyword arguments are rejected.
    pub fn add_blob(&mut self, args: &CallArgs) -> Result<()> {
        if args.has_keywords() {
            return Err(BridgeErr::KeywordArgs {
                method: "BlobSeq.add_blob",
            });
        }
        self.items.push(Blob::with_shape(args.dims()));
        Ok(())
    }
}

impl<T> FromIterator<T> for Sequence<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<T> IntoIterator for Sequence<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Sequence<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_access_is_an_error() {
        let mut seq: IntSeq = [1usize, 2].into_iter().collect();
        assert_eq!(*seq.get(1).unwrap(), 2);
        assert!(matches!(
            seq.get(2),
            Err(BridgeErr::OutOfBounds { index: 2, len: 2 })
        ));
        assert!(seq.set(5, 9).is_err());

        seq.append(3);
        assert_eq!(*seq.get(2).unwrap(), 3);
    }

    #[test]
    fn add_blob_rejects_keywords() {
        let mut seq = BlobSeq::new();
        seq.add_blob(&CallArgs::positional(&[2, 3])).unwrap();
        assert_eq!(seq.get(0).unwrap().shape(), vec![2, 3]);

        let err = seq
            .add_blob(&CallArgs::positional(&[2]).with_keyword("shape", 2))
            .unwrap_err();
        assert!(matches!(err, BridgeErr::KeywordArgs { .. }));
    }
}
