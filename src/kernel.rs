//! Pointwise kernels and their calling contract.
//!
//! A kernel is a pure function evaluated at a batch of `num_points` points. It receives an opaque
//! context blob and one buffer per declared input field, and writes one buffer per declared
//! output field. A field with `num_components` components occupies `num_components * num_points`
//! entries, stored component-major: all points of component 0, then all points of component 1
//! and so on.
//!
//! Kernels report failure by returning a non-zero [`StatusCode`]. The code is surfaced to the
//! caller unchanged as [`KernelError::KernelFailure`].
use bytemuck::Pod;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::mem::size_of;
use std::sync::Arc;

pub mod gallery;
pub mod registry;

/// Status returned by a kernel body. Zero signals success.
pub type StatusCode = i32;

pub const KERNEL_SUCCESS: StatusCode = 0;

/// Maximum number of input fields, and separately of output fields, of a kernel.
pub const MAX_KERNEL_FIELDS: usize = 16;

/// How the values of a field are obtained at the evaluation points.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvalMode {
    /// Interpolated values.
    Value,
    /// Derivatives with respect to the reference coordinates.
    Gradient,
    Divergence,
    Curl,
    /// Quadrature weights. Input only, with a single component.
    Weight,
    /// Values passed through without basis evaluation.
    None,
}

impl EvalMode {
    /// Number of values per point produced by evaluating a basis with `num_components`
    /// components in `dim` dimensions.
    pub fn num_qcomponents(self, num_components: usize, dim: usize) -> usize {
        match self {
            Self::Value | Self::Divergence | Self::None => num_components,
            Self::Gradient => num_components * dim,
            Self::Curl => num_components * if dim == 2 { 1 } else { 3 },
            Self::Weight => 1,
        }
    }
}

impl fmt::Display for EvalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A named input or output of a kernel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    name: String,
    num_components: usize,
    eval_mode: EvalMode,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_components(&self) -> usize {
        self.num_components
    }

    pub fn eval_mode(&self) -> EvalMode {
        self.eval_mode
    }

    /// Number of entries of a buffer holding this field at `num_points` points.
    pub fn buffer_len(&self, num_points: usize) -> usize {
        self.num_components * num_points
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FieldDirection {
    Input,
    Output,
}

impl fmt::Display for FieldDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// A kernel was instantiated under a name different from its declared name.
    NameMismatch { declared: String, requested: String },
    DuplicateFieldName { kernel: String, field: String },
    TooManyFields { kernel: String, direction: FieldDirection },
    InvalidField { kernel: String, field: String, reason: &'static str },
    UnknownKernel(String),
    DuplicateKernelName(String),
    /// The buffers passed to an invocation do not match the declared fields.
    ShapeMismatch {
        kernel: String,
        direction: FieldDirection,
        field: Option<String>,
        expected: usize,
        actual: usize,
    },
    /// The kernel body returned a non-zero status.
    KernelFailure { kernel: String, status: StatusCode },
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NameMismatch { declared, requested } => write!(
                f,
                "Kernel '{}' does not match requested name: {}",
                declared, requested
            ),
            Self::DuplicateFieldName { kernel, field } => {
                write!(f, "Kernel '{}' already has a field named '{}'", kernel, field)
            }
            Self::TooManyFields { kernel, direction } => write!(
                f,
                "Kernel '{}' can not have more than {} {} fields",
                kernel, MAX_KERNEL_FIELDS, direction
            ),
            Self::InvalidField { kernel, field, reason } => {
                write!(f, "Invalid field '{}' in kernel '{}': {}", field, kernel, reason)
            }
            Self::UnknownKernel(name) => write!(f, "No registered kernel matches '{}'", name),
            Self::DuplicateKernelName(name) => write!(f, "A kernel named '{}' is already registered", name),
            Self::ShapeMismatch {
                kernel,
                direction,
                field: Some(field),
                expected,
                actual,
            } => write!(
                f,
                "Kernel '{}' expected {} buffer '{}' of length {}, got {}",
                kernel, direction, field, expected, actual
            ),
            Self::ShapeMismatch {
                kernel,
                direction,
                field: None,
                expected,
                actual,
            } => write!(
                f,
                "Kernel '{}' expected {} {} buffers, got {}",
                kernel, expected, direction, actual
            ),
            Self::KernelFailure { kernel, status } => {
                write!(f, "Kernel '{}' failed with status {}", kernel, status)
            }
        }
    }
}

impl Error for KernelError {}

/// The body of a pointwise kernel.
///
/// Implementations must treat `num_points == 0` as a no-op and must not read beyond
/// `num_points * num_components` entries of any input.
pub trait PointwiseKernel<T>: Send + Sync {
    fn evaluate(&self, context: &[u8], num_points: usize, inputs: &[&[T]], outputs: &mut [&mut [T]]) -> StatusCode;
}

impl<T, F> PointwiseKernel<T> for F
where
    F: Send + Sync + Fn(&[u8], usize, &[&[T]], &mut [&mut [T]]) -> StatusCode,
{
    fn evaluate(&self, context: &[u8], num_points: usize, inputs: &[&[T]], outputs: &mut [&mut [T]]) -> StatusCode {
        self(context, num_points, inputs, outputs)
    }
}

/// Owned context data handed to a kernel as an opaque byte blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelContext {
    bytes: Vec<u8>,
}

impl KernelContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value<P: Pod>(value: &P) -> Self {
        Self {
            bytes: bytemuck::bytes_of(value).to_vec(),
        }
    }

    pub fn from_values<P: Pod>(values: &[P]) -> Self {
        Self {
            bytes: bytemuck::cast_slice(values).to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Read a value of type `P` from the start of a context blob.
///
/// Returns `None` if the blob is too short. The blob need not be aligned.
pub fn read_context<P: Pod>(context: &[u8]) -> Option<P> {
    let bytes = context.get(..size_of::<P>())?;
    bytemuck::try_pod_read_unaligned(bytes).ok()
}

/// The declared inputs and outputs of a kernel.
///
/// Fields are positional: the `i`-th buffer passed to an invocation corresponds to the `i`-th
/// declared field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldRegistrar {
    kernel_name: String,
    inputs: Vec<Field>,
    outputs: Vec<Field>,
}

impl FieldRegistrar {
    fn new(kernel_name: &str) -> Self {
        Self {
            kernel_name: kernel_name.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn add_input(
        &mut self,
        name: &str,
        num_components: usize,
        eval_mode: EvalMode,
    ) -> Result<&mut Self, KernelError> {
        self.add_field(FieldDirection::Input, name, num_components, eval_mode)
    }

    pub fn add_output(
        &mut self,
        name: &str,
        num_components: usize,
        eval_mode: EvalMode,
    ) -> Result<&mut Self, KernelError> {
        self.add_field(FieldDirection::Output, name, num_components, eval_mode)
    }

    fn add_field(
        &mut self,
        direction: FieldDirection,
        name: &str,
        num_components: usize,
        eval_mode: EvalMode,
    ) -> Result<&mut Self, KernelError> {
        let invalid = |reason| KernelError::InvalidField {
            kernel: self.kernel_name.clone(),
            field: name.to_string(),
            reason,
        };
        if self.field(name).is_some() {
            return Err(KernelError::DuplicateFieldName {
                kernel: self.kernel_name.clone(),
                field: name.to_string(),
            });
        }
        if num_components == 0 {
            return Err(invalid("fields must have at least one component"));
        }
        if eval_mode == EvalMode::Weight {
            if direction == FieldDirection::Output {
                return Err(invalid("weight fields can only be inputs"));
            }
            if num_components != 1 {
                return Err(invalid("weight fields must have exactly one component"));
            }
        }

        let fields = match direction {
            FieldDirection::Input => &mut self.inputs,
            FieldDirection::Output => &mut self.outputs,
        };
        if fields.len() >= MAX_KERNEL_FIELDS {
            return Err(KernelError::TooManyFields {
                kernel: self.kernel_name.clone(),
                direction,
            });
        }
        fields.push(Field {
            name: name.to_string(),
            num_components,
            eval_mode,
        });
        Ok(self)
    }

    pub fn inputs(&self) -> &[Field] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Field] {
        &self.outputs
    }

    /// Look up a field by name among both inputs and outputs.
    pub fn field(&self, name: &str) -> Option<(FieldDirection, &Field)> {
        let input = self.inputs.iter().find(|field| field.name == name);
        let output = self.outputs.iter().find(|field| field.name == name);
        input
            .map(|field| (FieldDirection::Input, field))
            .or_else(|| output.map(|field| (FieldDirection::Output, field)))
    }
}

/// A pointwise kernel bound to a name, a list of fields and a context.
#[derive(Clone)]
pub struct Kernel<T> {
    name: String,
    implementation: Arc<dyn PointwiseKernel<T>>,
    fields: FieldRegistrar,
    context: KernelContext,
}

impl<T> fmt::Debug for Kernel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("name", &self.name)
            .field("inputs", &self.fields.inputs)
            .field("outputs", &self.fields.outputs)
            .field("context_bytes", &self.context.bytes.len())
            .finish()
    }
}

impl<T> Kernel<T> {
    /// A kernel with no fields. Fields are declared with [`add_input`](Self::add_input) and
    /// [`add_output`](Self::add_output).
    pub fn new<F>(name: &str, implementation: F) -> Self
    where
        F: 'static + Send + Sync + Fn(&[u8], usize, &[&[T]], &mut [&mut [T]]) -> StatusCode,
    {
        Self::from_shared(name, Arc::new(implementation))
    }

    pub fn from_shared(name: &str, implementation: Arc<dyn PointwiseKernel<T>>) -> Self {
        Self {
            name: name.to_string(),
            implementation,
            fields: FieldRegistrar::new(name),
            context: KernelContext::default(),
        }
    }

    pub fn add_input(
        &mut self,
        name: &str,
        num_components: usize,
        eval_mode: EvalMode,
    ) -> Result<&mut Self, KernelError> {
        self.fields.add_input(name, num_components, eval_mode)?;
        Ok(self)
    }

    pub fn add_output(
        &mut self,
        name: &str,
        num_components: usize,
        eval_mode: EvalMode,
    ) -> Result<&mut Self, KernelError> {
        self.fields.add_output(name, num_components, eval_mode)?;
        Ok(self)
    }

    pub fn with_context(self, context: KernelContext) -> Self {
        Self { context, ..self }
    }

    pub fn set_context(&mut self, context: KernelContext) {
        self.context = context;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[Field] {
        self.fields.inputs()
    }

    pub fn outputs(&self) -> &[Field] {
        self.fields.outputs()
    }

    pub fn fields(&self) -> &FieldRegistrar {
        &self.fields
    }

    pub(crate) fn fields_mut(&mut self) -> &mut FieldRegistrar {
        &mut self.fields
    }

    pub fn context(&self) -> &KernelContext {
        &self.context
    }

    fn check_buffers(
        &self,
        direction: FieldDirection,
        fields: &[Field],
        lengths: impl ExactSizeIterator<Item = usize>,
        num_points: usize,
    ) -> Result<(), KernelError> {
        if lengths.len() != fields.len() {
            return Err(KernelError::ShapeMismatch {
                kernel: self.name.clone(),
                direction,
                field: None,
                expected: fields.len(),
                actual: lengths.len(),
            });
        }
        for (field, len) in fields.iter().zip(lengths) {
            let expected = field.buffer_len(num_points);
            if len != expected {
                return Err(KernelError::ShapeMismatch {
                    kernel: self.name.clone(),
                    direction,
                    field: Some(field.name.clone()),
                    expected,
                    actual: len,
                });
            }
        }
        Ok(())
    }

    /// Evaluate the kernel at `num_points` points with an explicit context.
    ///
    /// Every buffer must have exactly the length implied by its field and `num_points`.
    /// With zero points, the kernel body is not called and nothing is written.
    pub fn invoke(
        &self,
        context: &[u8],
        num_points: usize,
        inputs: &[&[T]],
        outputs: &mut [&mut [T]],
    ) -> Result<(), KernelError> {
        self.check_buffers(FieldDirection::Input, self.inputs(), inputs.iter().map(|b| b.len()), num_points)?;
        self.check_buffers(FieldDirection::Output, self.outputs(), outputs.iter().map(|b| b.len()), num_points)?;

        if num_points == 0 {
            return Ok(());
        }

        trace!("Invoking kernel '{}' at {} points", self.name, num_points);
        let status = self.implementation.evaluate(context, num_points, inputs, outputs);
        if status == KERNEL_SUCCESS {
            Ok(())
        } else {
            warn!("Kernel '{}' failed with status {}", self.name, status);
            Err(KernelError::KernelFailure {
                kernel: self.name.clone(),
                status,
            })
        }
    }

    /// Evaluate the kernel with its own context.
    pub fn apply(&self, num_points: usize, inputs: &[&[T]], outputs: &mut [&mut [T]]) -> Result<(), KernelError> {
        self.invoke(self.context.as_bytes(), num_points, inputs, outputs)
    }

    pub(crate) fn log_created(&self) {
        debug!(
            "Created kernel '{}' with {} inputs and {} outputs",
            self.name,
            self.inputs().len(),
            self.outputs().len()
        );
    }
}
