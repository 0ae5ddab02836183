use nalgebra::{DMatrix, DVector};
use num::Float;
use std::fmt::LowerExp;

/// Poor man's approx assertion for slices of floating point numbers
#[macro_export]
macro_rules! assert_approx_slice_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let x: &[_] = &$x;
        let y: &[_] = &$y;
        assert_eq!(x.len(), y.len(), "Slices must have the same length.");

        let max_absdiff = $crate::max_abs_diff(x, y);
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {}", $crate::format_slice(x));
            println!("right: {}", $crate::format_slice(y));
            println!("max abs diff: {:e}", max_absdiff);
        }
        assert!(approx_eq);
    }};
}

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

/// Largest absolute entry-wise difference between two slices of equal length.
pub fn max_abs_diff<T: Float>(x: &[T], y: &[T]) -> T {
    x.iter()
        .zip(y)
        .map(|(a, b)| (*a - *b).abs())
        .fold(T::zero(), |max, diff| if diff > max { diff } else { max })
}

pub fn format_slice<T: LowerExp>(x: &[T]) -> String {
    let entries: Vec<_> = x.iter().map(|x_i| format!("{:e}", x_i)).collect();
    format!("[{}]", entries.join(", "))
}

pub fn prefix_sum(counts: impl IntoIterator<Item = usize>, x0: usize) -> impl Iterator<Item = usize> {
    counts.into_iter().scan(x0, |sum, x| {
        let current = *sum;
        *sum += x;
        Some(current)
    })
}

/// Interpolation matrix, derivative matrix and weights of linear Lagrange basis functions on the
/// reference interval `[-1, 1]`, evaluated at the points of the two-point Gauss rule.
pub fn linear_lagrange_1d() -> (DMatrix<f64>, DMatrix<f64>, DVector<f64>) {
    let x = 1.0 / f64::sqrt(3.0);
    #[rustfmt::skip]
    let interpolation = DMatrix::from_row_slice(2, 2, &[
        0.5 * (1.0 + x), 0.5 * (1.0 - x),
        0.5 * (1.0 - x), 0.5 * (1.0 + x),
    ]);
    let gradient = DMatrix::from_row_slice(2, 2, &[-0.5, 0.5, -0.5, 0.5]);
    let weights = DVector::from_element(2, 1.0);
    (interpolation, gradient, weights)
}

/// Node indices of a chain of `num_elements` two-node elements: element `e` owns nodes `e` and `e + 1`.
pub fn chain_indices(num_elements: usize) -> Vec<usize> {
    (0..num_elements).flat_map(|e| [e, e + 1]).collect()
}
