//! Matrix-free operator actions composed from restrictions, basis evaluators and a kernel.
//!
//! An operator binds every field of a kernel to a restriction, a basis evaluator and a global
//! vector. Applying the operator runs the pipeline
//!
//! ```text
//! gather -> basis -> kernel -> basis transpose -> scatter-add
//! ```
//!
//! for all elements. The operator holds no state between actions besides its bindings, so the
//! same operator may be applied repeatedly, for example inside an iterative solver.
use crate::basis::{BasisEvaluator, TransposeMode};
use crate::kernel::{EvalMode, Field, Kernel, KernelError, StatusCode};
use crate::restriction::{Restriction, RestrictionError, ScatterMode};
use itertools::izip;
use log::{debug, trace};
use nalgebra::RealField;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::mem;
use std::ops::Range;

/// Execution strategy for the per-element stages of an operator action.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Execution {
    #[default]
    Serial,
    /// Elements are processed in parallel with rayon. The scatter-add is performed one color
    /// class at a time.
    Parallel,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorConfig {
    pub execution: Execution,
}

impl OperatorConfig {
    pub fn with_execution(self, execution: Execution) -> Self {
        Self { execution, ..self }
    }
}

/// The stages of a single operator action.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Idle,
    Gathered,
    BasisEvaluated,
    KernelApplied,
    BasisTransposed,
    Scattered,
}

impl PipelineStage {
    /// The stage that follows this one. The stage after [`Scattered`](Self::Scattered) is
    /// [`Idle`](Self::Idle).
    pub fn next(self) -> Self {
        match self {
            Self::Idle => Self::Gathered,
            Self::Gathered => Self::BasisEvaluated,
            Self::BasisEvaluated => Self::KernelApplied,
            Self::KernelApplied => Self::BasisTransposed,
            Self::BasisTransposed => Self::Scattered,
            Self::Scattered => Self::Idle,
        }
    }
}

/// The global vector a field reads from or writes to.
#[derive(Debug)]
pub enum FieldVector<'a, T> {
    /// The vector passed to [`Operator::apply`].
    Active,
    /// A fixed vector provided at construction, for example geometry or quadrature data.
    Passive(&'a [T]),
    /// No vector. Used for quadrature weights.
    None,
}

impl<'a, T> Clone for FieldVector<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T> Copy for FieldVector<'a, T> {}

struct FieldBinding<'a, T> {
    restriction: Option<&'a Restriction<'a>>,
    basis: Option<&'a dyn BasisEvaluator<T>>,
    vector: FieldVector<'a, T>,
}

#[derive(Debug)]
pub enum OperatorError {
    Restriction(RestrictionError),
    Kernel(KernelError),
    Basis(eyre::Report),
    UnknownField(String),
    FieldNotBound(String),
    FieldBoundTwice(String),
    InvalidBinding { field: String, reason: &'static str },
    /// None of the fields has a restriction, so the number of elements is unknown.
    NoRestriction,
    IncompatibleElementCount { field: String, expected: usize, actual: usize },
    IncompatiblePointCount { field: String, element: usize, expected: usize, actual: usize },
    ShapeMismatch { what: String, expected: usize, actual: usize },
}

impl OperatorError {
    /// The status code returned by the kernel, if the action failed inside the kernel.
    pub fn kernel_status(&self) -> Option<StatusCode> {
        match self {
            Self::Kernel(KernelError::KernelFailure { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for OperatorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Restriction(err) => write!(f, "Restriction error: {}", err),
            Self::Kernel(err) => write!(f, "Kernel error: {}", err),
            Self::Basis(err) => write!(f, "Basis evaluation failed: {}", err),
            Self::UnknownField(name) => write!(f, "Kernel has no field named '{}'", name),
            Self::FieldNotBound(name) => write!(f, "Field '{}' is not bound", name),
            Self::FieldBoundTwice(name) => write!(f, "Field '{}' is bound more than once", name),
            Self::InvalidBinding { field, reason } => write!(f, "Invalid binding for field '{}': {}", field, reason),
            Self::NoRestriction => write!(f, "At least one field must have a restriction"),
            Self::IncompatibleElementCount { field, expected, actual } => write!(
                f,
                "Restriction of field '{}' has {} elements, expected {}",
                field, actual, expected
            ),
            Self::IncompatiblePointCount {
                field,
                element,
                expected,
                actual,
            } => write!(
                f,
                "Field '{}' has {} points in element {}, expected {}",
                field, actual, element, expected
            ),
            Self::ShapeMismatch { what, expected, actual } => {
                write!(f, "Expected {} of length {}, got {}", what, expected, actual)
            }
        }
    }
}

impl Error for OperatorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Restriction(err) => Some(err),
            Self::Kernel(err) => Some(err),
            Self::Basis(err) => Some(&**err),
            _ => None,
        }
    }
}

impl From<RestrictionError> for OperatorError {
    fn from(err: RestrictionError) -> Self {
        Self::Restriction(err)
    }
}

impl From<KernelError> for OperatorError {
    fn from(err: KernelError) -> Self {
        Self::Kernel(err)
    }
}

fn invalid(field: &Field, reason: &'static str) -> OperatorError {
    OperatorError::InvalidBinding {
        field: field.name().to_string(),
        reason,
    }
}

/// Builds an [`Operator`] by binding each field of a kernel.
pub struct OperatorBuilder<'a, T> {
    kernel: &'a Kernel<T>,
    config: OperatorConfig,
    bindings: Vec<(String, FieldBinding<'a, T>)>,
}

impl<'a, T> fmt::Debug for OperatorBuilder<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.bindings.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("OperatorBuilder")
            .field("kernel", &self.kernel.name())
            .field("config", &self.config)
            .field("bindings", &names)
            .finish()
    }
}

impl<'a, T: RealField + Copy> OperatorBuilder<'a, T> {
    pub fn new(kernel: &'a Kernel<T>) -> Self {
        Self {
            kernel,
            config: OperatorConfig::default(),
            bindings: Vec::new(),
        }
    }

    pub fn with_config(self, config: OperatorConfig) -> Self {
        Self { config, ..self }
    }

    /// Bind a field that is restricted and then evaluated with a basis.
    pub fn with_field<B>(
        self,
        name: &str,
        restriction: &'a Restriction<'a>,
        basis: &'a B,
        vector: FieldVector<'a, T>,
    ) -> Self
    where
        B: BasisEvaluator<T>,
    {
        self.with_binding(
            name,
            FieldBinding {
                restriction: Some(restriction),
                basis: Some(basis),
                vector,
            },
        )
    }

    /// Bind a field whose restricted values are passed to the kernel without basis evaluation.
    pub fn with_restricted_field(
        self,
        name: &str,
        restriction: &'a Restriction<'a>,
        vector: FieldVector<'a, T>,
    ) -> Self {
        self.with_binding(
            name,
            FieldBinding {
                restriction: Some(restriction),
                basis: None,
                vector,
            },
        )
    }

    /// Bind a field to the quadrature weights of a basis.
    pub fn with_weight_field<B>(self, name: &str, basis: &'a B) -> Self
    where
        B: BasisEvaluator<T>,
    {
        self.with_binding(
            name,
            FieldBinding {
                restriction: None,
                basis: Some(basis),
                vector: FieldVector::None,
            },
        )
    }

    fn with_binding(mut self, name: &str, binding: FieldBinding<'a, T>) -> Self {
        self.bindings.push((name.to_string(), binding));
        self
    }

    /// Validate all bindings and build the operator.
    pub fn build(self) -> Result<Operator<'a, T>, OperatorError> {
        let kernel = self.kernel;
        let mut inputs: Vec<Option<FieldBinding<'a, T>>> = kernel.inputs().iter().map(|_| None).collect();
        let mut outputs: Vec<Option<FieldBinding<'a, T>>> = kernel.outputs().iter().map(|_| None).collect();

        for (name, binding) in self.bindings {
            let position = |fields: &[Field]| fields.iter().position(|field| field.name() == name);
            let slot = if let Some(i) = position(kernel.inputs()) {
                &mut inputs[i]
            } else if let Some(i) = position(kernel.outputs()) {
                &mut outputs[i]
            } else {
                return Err(OperatorError::UnknownField(name));
            };
            if slot.is_some() {
                return Err(OperatorError::FieldBoundTwice(name));
            }
            *slot = Some(binding);
        }

        let collect_bound = |fields: &[Field], bindings: Vec<Option<FieldBinding<'a, T>>>| {
            izip!(fields, bindings)
                .map(|(field, binding)| binding.ok_or_else(|| OperatorError::FieldNotBound(field.name().to_string())))
                .collect::<Result<Vec<_>, _>>()
        };
        let inputs = collect_bound(kernel.inputs(), inputs)?;
        let outputs = collect_bound(kernel.outputs(), outputs)?;

        for (field, binding) in izip!(kernel.inputs(), &inputs) {
            check_binding(field, binding, TransposeMode::NoTranspose)?;
        }
        for (field, binding) in izip!(kernel.outputs(), &outputs) {
            check_binding(field, binding, TransposeMode::Transpose)?;
            if !matches!(binding.vector, FieldVector::Active) {
                return Err(invalid(field, "output fields must write to the active vector"));
            }
        }

        let all_fields = || izip!(kernel.inputs().iter().chain(kernel.outputs()), inputs.iter().chain(&outputs));

        let num_elements = check_element_count(all_fields())?;
        let point_offsets = compute_point_offsets(num_elements, all_fields())?;
        let active_input_len = check_active_len("active input", izip!(kernel.inputs(), &inputs))?;
        let active_output_len = check_active_len("active output", izip!(kernel.outputs(), &outputs))?;

        debug!(
            "Built operator for kernel '{}' with {} elements, {} points, active lengths {} -> {} ({:?})",
            kernel.name(),
            num_elements,
            point_offsets[num_elements],
            active_input_len,
            active_output_len,
            self.config.execution
        );

        Ok(Operator {
            kernel,
            config: self.config,
            inputs,
            outputs,
            num_elements,
            point_offsets,
            active_input_len,
            active_output_len,
        })
    }
}

/// Check a single binding. Inputs are evaluated with `NoTranspose`, outputs with `Transpose`.
fn check_binding<T>(
    field: &Field,
    binding: &FieldBinding<T>,
    transpose: TransposeMode,
) -> Result<(), OperatorError> {
    match (field.eval_mode(), binding.restriction, binding.basis) {
        (EvalMode::Weight, None, Some(basis)) => {
            if !matches!(binding.vector, FieldVector::None) {
                return Err(invalid(field, "weight fields can not have a vector"));
            }
            if !basis.supports(transpose, EvalMode::Weight) {
                return Err(invalid(field, "basis does not support the evaluation mode"));
            }
            return Ok(());
        }
        (EvalMode::Weight, _, _) => return Err(invalid(field, "weight fields need a basis and no restriction")),
        (EvalMode::None, Some(restriction), None) => {
            if restriction.num_components() != field.num_components() {
                return Err(invalid(field, "restriction components do not match field components"));
            }
        }
        (EvalMode::None, _, _) => {
            return Err(invalid(field, "fields without evaluation need a restriction and no basis"));
        }
        (mode, Some(restriction), Some(basis)) => {
            if !basis.supports(transpose, mode) {
                return Err(invalid(field, "basis does not support the evaluation mode"));
            }
            if restriction.num_components() != basis.num_components() {
                return Err(invalid(field, "restriction components do not match basis components"));
            }
            if mode.num_qcomponents(basis.num_components(), basis.dimension()) != field.num_components() {
                return Err(invalid(field, "evaluated basis components do not match field components"));
            }
            let nodes = basis.num_nodes();
            if (0..restriction.num_elements()).any(|e| restriction.element_slot_count(e) != nodes) {
                return Err(invalid(field, "restriction element size does not match basis nodes"));
            }
        }
        (_, _, _) => return Err(invalid(field, "evaluated fields need a restriction and a basis")),
    }

    if let (FieldVector::Passive(vector), Some(restriction)) = (binding.vector, binding.restriction) {
        if vector.len() != restriction.lvector_len() {
            return Err(OperatorError::ShapeMismatch {
                what: format!("passive vector of field '{}'", field.name()),
                expected: restriction.lvector_len(),
                actual: vector.len(),
            });
        }
    }
    if matches!(binding.vector, FieldVector::None) {
        return Err(invalid(field, "restricted fields need a vector"));
    }
    Ok(())
}

fn check_element_count<'b, 'a: 'b, T: 'b>(
    fields: impl Iterator<Item = (&'b Field, &'b FieldBinding<'a, T>)>,
) -> Result<usize, OperatorError> {
    let mut num_elements = None;
    for (field, binding) in fields {
        if let Some(restriction) = binding.restriction {
            let actual = restriction.num_elements();
            match num_elements {
                None => num_elements = Some(actual),
                Some(expected) if expected != actual => {
                    return Err(OperatorError::IncompatibleElementCount {
                        field: field.name().to_string(),
                        expected,
                        actual,
                    })
                }
                Some(_) => {}
            }
        }
    }
    num_elements.ok_or(OperatorError::NoRestriction)
}

/// Determine the number of points of each element, and return their prefix sum.
fn compute_point_offsets<'b, 'a: 'b, T: 'b>(
    num_elements: usize,
    fields: impl Iterator<Item = (&'b Field, &'b FieldBinding<'a, T>)>,
) -> Result<Vec<usize>, OperatorError> {
    let mut points: Vec<Option<usize>> = vec![None; num_elements];
    for (field, binding) in fields {
        for (element, expected) in points.iter_mut().enumerate() {
            let actual = match (binding.basis, binding.restriction) {
                (Some(basis), _) => basis.num_points(),
                (None, Some(restriction)) => restriction.element_slot_count(element),
                (None, None) => continue,
            };
            match *expected {
                None => *expected = Some(actual),
                Some(expected) if expected != actual => {
                    return Err(OperatorError::IncompatiblePointCount {
                        field: field.name().to_string(),
                        element,
                        expected,
                        actual,
                    })
                }
                Some(_) => {}
            }
        }
    }
    let mut offsets = Vec::with_capacity(num_elements + 1);
    offsets.push(0);
    for count in points {
        let last = offsets[offsets.len() - 1];
        offsets.push(last + count.unwrap_or(0));
    }
    Ok(offsets)
}

fn check_active_len<'b, 'a: 'b, T: 'b>(
    what: &str,
    fields: impl Iterator<Item = (&'b Field, &'b FieldBinding<'a, T>)>,
) -> Result<usize, OperatorError> {
    let mut len = None;
    for (field, binding) in fields {
        if let (FieldVector::Active, Some(restriction)) = (binding.vector, binding.restriction) {
            let actual = restriction.lvector_len();
            match len {
                None => len = Some(actual),
                Some(expected) if expected != actual => {
                    return Err(OperatorError::ShapeMismatch {
                        what: format!("{} vector of field '{}'", what, field.name()),
                        expected,
                        actual,
                    })
                }
                Some(_) => {}
            }
        }
    }
    Ok(len.unwrap_or(0))
}

/// Split a buffer laid out like the point data of a field into the blocks of each element.
fn split_point_blocks_mut<'v, T>(
    buffer: &'v mut [T],
    point_offsets: &[usize],
    num_components: usize,
) -> Vec<&'v mut [T]> {
    let mut blocks = Vec::with_capacity(point_offsets.len().saturating_sub(1));
    let mut remaining = buffer;
    for window in point_offsets.windows(2) {
        let block_len = num_components * (window[1] - window[0]);
        let (block, rest) = mem::take(&mut remaining).split_at_mut(block_len);
        blocks.push(block);
        remaining = rest;
    }
    blocks
}

/// A matrix-free operator.
///
/// See [`OperatorBuilder`] for construction.
pub struct Operator<'a, T> {
    kernel: &'a Kernel<T>,
    config: OperatorConfig,
    inputs: Vec<FieldBinding<'a, T>>,
    outputs: Vec<FieldBinding<'a, T>>,
    num_elements: usize,
    point_offsets: Vec<usize>,
    active_input_len: usize,
    active_output_len: usize,
}

impl<'a, T> fmt::Debug for Operator<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("kernel", &self.kernel.name())
            .field("config", &self.config)
            .field("num_elements", &self.num_elements)
            .field("num_points", &self.num_points())
            .finish()
    }
}

impl<'a, T> Operator<'a, T> {
    pub fn kernel(&self) -> &Kernel<T> {
        self.kernel
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    /// Total number of evaluation points over all elements.
    pub fn num_points(&self) -> usize {
        self.point_offsets[self.num_elements]
    }

    pub fn element_point_count(&self, element: usize) -> usize {
        self.point_offsets[element + 1] - self.point_offsets[element]
    }

    /// Length of the input passed to [`apply`](Self::apply). Zero if no input field is active.
    pub fn active_input_len(&self) -> usize {
        self.active_input_len
    }

    /// Length of the output passed to [`apply`](Self::apply). Zero if the kernel has no outputs.
    pub fn active_output_len(&self) -> usize {
        self.active_output_len
    }

    fn point_range(&self, element: usize, num_components: usize) -> Range<usize> {
        num_components * self.point_offsets[element]..num_components * self.point_offsets[element + 1]
    }
}

impl<'a, T: RealField + Copy> Operator<'a, T> {
    /// Compute `output = A(input)`.
    ///
    /// If the kernel fails, the action is aborted and the contents of `output` are unspecified.
    pub fn apply(&self, input: &[T], output: &mut [T]) -> Result<(), OperatorError> {
        self.apply_with_mode(input, output, ScatterMode::Request)
    }

    /// Compute `output += A(input)`.
    pub fn apply_add(&self, input: &[T], output: &mut [T]) -> Result<(), OperatorError> {
        self.apply_with_mode(input, output, ScatterMode::Add)
    }

    fn apply_with_mode(&self, input: &[T], output: &mut [T], mode: ScatterMode) -> Result<(), OperatorError> {
        let check = |what: &str, expected, actual| {
            if expected == actual {
                Ok(())
            } else {
                Err(OperatorError::ShapeMismatch {
                    what: what.to_string(),
                    expected,
                    actual,
                })
            }
        };
        check("operator input", self.active_input_len, input.len())?;
        check("operator output", self.active_output_len, output.len())?;

        let kernel = self.kernel;
        let mut stage = PipelineStage::Idle;

        let e_inputs = self
            .inputs
            .iter()
            .map(|binding| self.gather(binding, input))
            .collect::<Result<Vec<_>, _>>()?;
        stage = self.advance(stage);

        let q_inputs = izip!(kernel.inputs(), &self.inputs, e_inputs)
            .map(|(field, binding, e_vector)| self.evaluate_basis(field, binding, e_vector))
            .collect::<Result<Vec<_>, _>>()?;
        stage = self.advance(stage);

        let mut q_outputs: Vec<Vec<T>> = kernel
            .outputs()
            .iter()
            .map(|field| vec![T::zero(); field.num_components() * self.num_points()])
            .collect();
        self.invoke_kernel(&q_inputs, &mut q_outputs)?;
        stage = self.advance(stage);

        let e_outputs = izip!(kernel.outputs(), &self.outputs, q_outputs)
            .map(|(field, binding, q_vector)| self.transpose_basis(field, binding, q_vector))
            .collect::<Result<Vec<_>, _>>()?;
        stage = self.advance(stage);

        if mode == ScatterMode::Request {
            output.fill(T::zero());
        }
        for (binding, e_vector) in izip!(&self.outputs, &e_outputs) {
            if let Some(restriction) = binding.restriction {
                match self.config.execution {
                    Execution::Serial => restriction.apply_transpose(e_vector, &mut *output, ScatterMode::Add)?,
                    Execution::Parallel => {
                        restriction.par_apply_transpose(e_vector, &mut *output, ScatterMode::Add)?
                    }
                }
            }
        }
        stage = self.advance(stage);
        self.advance(stage);
        Ok(())
    }

    fn advance(&self, stage: PipelineStage) -> PipelineStage {
        let next = stage.next();
        trace!("Operator '{}': {:?} -> {:?}", self.kernel.name(), stage, next);
        next
    }

    fn for_each_element<I, F>(&self, items: Vec<I>, f: F) -> Result<(), OperatorError>
    where
        I: Send,
        F: Send + Sync + Fn(usize, I) -> Result<(), OperatorError>,
    {
        match self.config.execution {
            Execution::Serial => items
                .into_iter()
                .enumerate()
                .try_for_each(|(element, item)| f(element, item)),
            Execution::Parallel => items
                .into_par_iter()
                .enumerate()
                .try_for_each(|(element, item)| f(element, item)),
        }
    }

    /// Restrict the global vector of a field. Returns `None` for fields without restriction.
    fn gather(&self, binding: &FieldBinding<'a, T>, input: &[T]) -> Result<Option<Vec<T>>, OperatorError> {
        let Some(restriction) = binding.restriction else {
            return Ok(None);
        };
        let source = match binding.vector {
            FieldVector::Active => input,
            FieldVector::Passive(vector) => vector,
            FieldVector::None => &[],
        };
        let mut e_vector = restriction.create_evector();
        match self.config.execution {
            Execution::Serial => restriction.apply(source, &mut e_vector)?,
            Execution::Parallel => restriction.par_apply(source, &mut e_vector)?,
        }
        Ok(Some(e_vector))
    }

    /// Map the E-vector of an input field to its values at the evaluation points.
    ///
    /// Fields without basis are passed through: their E-vector blocks already have the layout
    /// of point data.
    fn evaluate_basis(
        &self,
        field: &Field,
        binding: &FieldBinding<'a, T>,
        e_vector: Option<Vec<T>>,
    ) -> Result<Vec<T>, OperatorError> {
        let Some(basis) = binding.basis else {
            return Ok(e_vector.unwrap_or_default());
        };
        let e_vector = e_vector.unwrap_or_default();
        let mut q_vector = vec![T::zero(); field.num_components() * self.num_points()];
        let blocks = split_point_blocks_mut(&mut q_vector, &self.point_offsets, field.num_components());
        self.for_each_element(blocks, |element, block| {
            let local = match binding.restriction {
                Some(restriction) => &e_vector[restriction.index_map().element_evector_range(element)],
                None => &[],
            };
            basis
                .apply(TransposeMode::NoTranspose, field.eval_mode(), local, block)
                .map_err(OperatorError::Basis)
        })?;
        Ok(q_vector)
    }

    fn invoke_kernel(&self, q_inputs: &[Vec<T>], q_outputs: &mut [Vec<T>]) -> Result<(), OperatorError> {
        let kernel = self.kernel;
        let mut element_outputs: Vec<Vec<&mut [T]>> = (0..self.num_elements)
            .map(|_| Vec::with_capacity(q_outputs.len()))
            .collect();
        for (field, q_vector) in izip!(kernel.outputs(), q_outputs.iter_mut()) {
            let blocks = split_point_blocks_mut(q_vector, &self.point_offsets, field.num_components());
            for (outputs, block) in izip!(&mut element_outputs, blocks) {
                outputs.push(block);
            }
        }

        self.for_each_element(element_outputs, |element, mut outputs| {
            let inputs: Vec<&[T]> = izip!(kernel.inputs(), q_inputs)
                .map(|(field, q_vector)| &q_vector[self.point_range(element, field.num_components())])
                .collect();
            kernel.apply(self.element_point_count(element), &inputs, &mut outputs)?;
            Ok(())
        })
    }

    /// Map the point values of an output field back to its E-vector.
    fn transpose_basis(
        &self,
        field: &Field,
        binding: &FieldBinding<'a, T>,
        q_vector: Vec<T>,
    ) -> Result<Vec<T>, OperatorError> {
        let (Some(restriction), Some(basis)) = (binding.restriction, binding.basis) else {
            return Ok(q_vector);
        };
        let mut e_vector = restriction.create_evector();
        let blocks = restriction.split_evector_mut(&mut e_vector);
        self.for_each_element(blocks, |element, block| {
            let local = &q_vector[self.point_range(element, field.num_components())];
            basis
                .apply(TransposeMode::Transpose, field.eval_mode(), local, block)
                .map_err(OperatorError::Basis)
        })?;
        Ok(e_vector)
    }
}
