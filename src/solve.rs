//! Krylov solvers for operators that are only available through their action on a vector.
//!
//! [`Operator`] implements the [`LinearOperator`] trait of `fenris-sparse`, so a matrix-free
//! operator can be handed directly to its [`ConjugateGradient`] solver. The active input and
//! output vectors play the roles of `x` and `y` in `y = A x`.
use crate::operator::Operator;
use nalgebra::{DVectorView, DVectorViewMut, RealField};
use std::error::Error;

pub use fenris_sparse::cg::{
    CgOutput, CgStoppingCriterion, CgWorkspace, ConjugateGradient, IdentityOperator, LinearOperator,
    RelativeResidualCriterion, SolveError, SolveErrorKind,
};

impl<'a, T: RealField + Copy> LinearOperator<T> for Operator<'a, T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        Operator::apply(self, x.as_slice(), y.as_mut_slice())?;
        Ok(())
    }
}
