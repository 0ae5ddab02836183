//! Matrix-free evaluation of finite element operators.
//!
//! The crate maps between global vectors (L-vectors) and per-element local vectors (E-vectors)
//! through [`Restriction`](restriction::Restriction)s, and evaluates pointwise
//! [`Kernel`](kernel::Kernel)s at the evaluation points of each element. An
//! [`Operator`](operator::Operator) chains these steps together with a basis evaluator to
//! compute the action of a finite element operator without assembling a matrix.
pub mod basis;
pub mod coloring;
pub mod index_map;
pub mod kernel;
pub mod operator;
pub mod restriction;
pub mod solve;
pub mod vector;

pub extern crate fenris_nested_vec;
pub extern crate fenris_paradis;
pub extern crate nalgebra;

pub use index_map::{IndexMap, NoPointsAssigned, ValidationError};
pub use kernel::{EvalMode, Kernel, KernelContext, KernelError};
pub use operator::{Operator, OperatorBuilder, OperatorError};
pub use restriction::{Restriction, RestrictionError, ScatterMode};
pub use vector::{CopyMode, LVector, VectorStorage};
