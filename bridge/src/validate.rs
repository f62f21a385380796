//! Structural validation of host buffers.
//!
//! Runs before any engine storage is extracted; a failure here has no side
//! effects. Only dimensions beyond the leading batch dimension are checked
//! against the expected shape.

use crate::error::{BridgeErr, Result};
use crate::host::{DType, HostArray};

/// Checks that `arr` is C-contiguous f32 and that every non-leading
/// dimension matches `expected` exactly.
pub fn check_array(arr: &HostArray, name: &'static str, expected: &[usize]) -> Result<()> {
    if !arr.is_c_contiguous() {
        return Err(BridgeErr::NotContiguous { name });
    }
    if arr.dtype() != DType::F32 {
        return Err(BridgeErr::WrongDType {
            name,
            got: arr.dtype().name(),
        });
    }
    if arr.ndim() != expected.len() {
        return Err(BridgeErr::DimCount {
            name,
            got: arr.ndim(),
            expected: expected.len(),
        });
    }
    for axis in 1..arr.ndim() {
        let got = arr.shape()[axis];
        if got != expected[axis] {
            return Err(BridgeErr::DimMismatch {
                name,
                axis,
                got,
                expected: expected[axis],
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_dimension_is_not_checked() {
        let arr = HostArray::from_vec(&[8, 1, 1, 2], vec![0.0; 16]).unwrap();
        check_array(&arr, "data array", &[2, 1, 1, 2]).unwrap();
    }

    #[test]
    fn mismatch_names_axis_and_both_sizes() {
        let arr = HostArray::from_vec(&[4, 1, 1, 3], vec![0.0; 12]).unwrap();
        let err = check_array(&arr, "data array", &[2, 1, 1, 2]).unwrap_err();
        match err {
            BridgeErr::DimMismatch {
                name,
                axis,
                got,
                expected,
            } => {
                assert_eq!(name, "data array");
                assert_eq!(axis, 3);
                assert_eq!(got, 3);
                assert_eq!(expected, 2);
            }
            other => panic!("expected DimMismatch, got {other:?}"),
        }
    }

    #[test]
    fn non_contiguous_and_f64_are_rejected() {
        let t = HostArray::with_strides(&[2, 2], &[1, 2], vec![0.0; 4]).unwrap();
        assert!(matches!(
            check_array(&t, "data array", &[2, 2]),
            Err(BridgeErr::NotContiguous { .. })
        ));

        let d = HostArray::from_vec_f64(&[2, 2], vec![0.0; 4]).unwrap();
        assert!(matches!(
            check_array(&d, "data array", &[2, 2]),
            Err(BridgeErr::WrongDType { .. })
        ));
    }
}
