//! The contract of basis evaluators, which map nodal element values to values at evaluation
//! points and back.
//!
//! Per element, nodal values are laid out as `[comp][node]`. Evaluated values are laid out as
//! `[comp][point]` for [`EvalMode::Value`], `[dim][comp][point]` for [`EvalMode::Gradient`] and
//! `[point]` for [`EvalMode::Weight`].
use crate::kernel::EvalMode;
use eyre::{bail, eyre};
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut, RealField};
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransposeMode {
    /// Nodal values to evaluation points.
    NoTranspose,
    /// Evaluation points to nodal values.
    Transpose,
}

/// Evaluates a single element's nodal values at its evaluation points, or applies the transpose.
pub trait BasisEvaluator<T>: Send + Sync {
    /// Dimension of the reference element.
    fn dimension(&self) -> usize;

    fn num_components(&self) -> usize;

    fn num_nodes(&self) -> usize;

    fn num_points(&self) -> usize;

    /// Whether [`apply`](Self::apply) can evaluate the given mode in the given direction.
    fn supports(&self, transpose: TransposeMode, mode: EvalMode) -> bool;

    /// Apply the basis to the values of a single element.
    ///
    /// For [`TransposeMode::NoTranspose`], `input` holds nodal values and `output` holds values
    /// at the evaluation points. For [`TransposeMode::Transpose`] the roles are swapped, and
    /// `output` is overwritten with the transposed action.
    fn apply(&self, transpose: TransposeMode, mode: EvalMode, input: &[T], output: &mut [T]) -> eyre::Result<()>;

    /// Length of a single element's nodal values.
    fn nodal_len(&self) -> usize {
        self.num_components() * self.num_nodes()
    }

    /// Length of a single element's values at the evaluation points for the given mode.
    fn evaluated_len(&self, mode: EvalMode) -> usize {
        mode.num_qcomponents(self.num_components(), self.dimension()) * self.num_points()
    }
}

/// A basis defined by dense interpolation and derivative matrices.
///
/// Row `q` of the interpolation matrix holds the values of all nodal basis functions at
/// evaluation point `q`, and likewise the `d`-th gradient matrix holds their derivatives with
/// respect to reference coordinate `d`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixBasis<T: RealField + Copy> {
    num_components: usize,
    interpolation: DMatrix<T>,
    gradients: Vec<DMatrix<T>>,
    weights: DVector<T>,
}

impl<T: RealField + Copy> MatrixBasis<T> {
    pub fn new(
        num_components: usize,
        interpolation: DMatrix<T>,
        gradients: Vec<DMatrix<T>>,
        weights: DVector<T>,
    ) -> eyre::Result<Self> {
        if num_components == 0 {
            bail!("Basis must have at least one component");
        }
        if gradients.is_empty() {
            bail!("Basis must have at least one reference dimension");
        }
        let shape = interpolation.shape();
        if shape.0 == 0 || shape.1 == 0 {
            bail!("Basis must have at least one node and one evaluation point");
        }
        if let Some(d) = gradients.iter().position(|g| g.shape() != shape) {
            bail!(
                "Gradient matrix {} has shape {:?}, but interpolation matrix has shape {:?}",
                d,
                gradients[d].shape(),
                shape
            );
        }
        if weights.len() != shape.0 {
            bail!(
                "Number of weights ({}) does not match number of evaluation points ({})",
                weights.len(),
                shape.0
            );
        }
        Ok(Self {
            num_components,
            interpolation,
            gradients,
            weights,
        })
    }

    pub fn interpolation(&self) -> &DMatrix<T> {
        &self.interpolation
    }

    pub fn gradients(&self) -> &[DMatrix<T>] {
        &self.gradients
    }

    pub fn weights(&self) -> &DVector<T> {
        &self.weights
    }

    fn check_lengths(&self, transpose: TransposeMode, mode: EvalMode, input: usize, output: usize) -> eyre::Result<()> {
        let (nodal, evaluated) = (self.nodal_len(), self.evaluated_len(mode));
        let (expected_input, expected_output) = match (transpose, mode) {
            (TransposeMode::NoTranspose, EvalMode::Weight) => (0, evaluated),
            (TransposeMode::NoTranspose, _) => (nodal, evaluated),
            (TransposeMode::Transpose, _) => (evaluated, nodal),
        };
        // Weights do not depend on the input, so any input is accepted
        if input != expected_input && mode != EvalMode::Weight {
            return Err(eyre!(
                "Basis input has length {}, expected {} for {:?} {}",
                input,
                expected_input,
                transpose,
                mode
            ));
        }
        if output != expected_output {
            return Err(eyre!(
                "Basis output has length {}, expected {} for {:?} {}",
                output,
                expected_output,
                transpose,
                mode
            ));
        }
        Ok(())
    }
}

impl<T: RealField + Copy> BasisEvaluator<T> for MatrixBasis<T> {
    fn dimension(&self) -> usize {
        self.gradients.len()
    }

    fn num_components(&self) -> usize {
        self.num_components
    }

    fn num_nodes(&self) -> usize {
        self.interpolation.ncols()
    }

    fn num_points(&self) -> usize {
        self.interpolation.nrows()
    }

    fn supports(&self, transpose: TransposeMode, mode: EvalMode) -> bool {
        match mode {
            EvalMode::Value | EvalMode::Gradient => true,
            EvalMode::Weight => transpose == TransposeMode::NoTranspose,
            EvalMode::None | EvalMode::Divergence | EvalMode::Curl => false,
        }
    }

    fn apply(&self, transpose: TransposeMode, mode: EvalMode, input: &[T], output: &mut [T]) -> eyre::Result<()> {
        self.check_lengths(transpose, mode, input.len(), output.len())?;
        let (p, q) = (self.num_nodes(), self.num_points());
        let s = self.num_components;

        match (transpose, mode) {
            (TransposeMode::NoTranspose, EvalMode::Value) => {
                for (u, v) in input.chunks_exact(p).zip(output.chunks_exact_mut(q)) {
                    let mut v = DVectorViewMut::from_slice(v, q);
                    v.gemv(T::one(), &self.interpolation, &DVectorView::from_slice(u, p), T::zero());
                }
            }
            (TransposeMode::Transpose, EvalMode::Value) => {
                for (v, u) in input.chunks_exact(q).zip(output.chunks_exact_mut(p)) {
                    let mut u = DVectorViewMut::from_slice(u, p);
                    u.gemv_tr(T::one(), &self.interpolation, &DVectorView::from_slice(v, q), T::zero());
                }
            }
            (TransposeMode::NoTranspose, EvalMode::Gradient) => {
                for (g, dv) in self.gradients.iter().zip(output.chunks_exact_mut(s * q)) {
                    for (u, v) in input.chunks_exact(p).zip(dv.chunks_exact_mut(q)) {
                        let mut v = DVectorViewMut::from_slice(v, q);
                        v.gemv(T::one(), g, &DVectorView::from_slice(u, p), T::zero());
                    }
                }
            }
            (TransposeMode::Transpose, EvalMode::Gradient) => {
                output.fill(T::zero());
                for (g, dv) in self.gradients.iter().zip(input.chunks_exact(s * q)) {
                    for (v, u) in dv.chunks_exact(q).zip(output.chunks_exact_mut(p)) {
                        let mut u = DVectorViewMut::from_slice(u, p);
                        u.gemv_tr(T::one(), g, &DVectorView::from_slice(v, q), T::one());
                    }
                }
            }
            (TransposeMode::NoTranspose, EvalMode::Weight) => {
                output.copy_from_slice(self.weights.as_slice());
            }
            (transpose, mode) => bail!("Matrix basis does not support {:?} {}", transpose, mode),
        }
        Ok(())
    }
}
