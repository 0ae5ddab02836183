//! Named kernel definitions and lookup by name.
use crate::kernel::{FieldRegistrar, Kernel, KernelError, PointwiseKernel, StatusCode};
use log::debug;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

type FieldInit = dyn Send + Sync + Fn(&mut FieldRegistrar) -> Result<(), KernelError>;

/// A kernel implementation together with the routine that declares its fields.
#[derive(Clone)]
pub struct KernelDefinition<T> {
    name: String,
    implementation: Arc<dyn PointwiseKernel<T>>,
    field_init: Arc<FieldInit>,
}

impl<T> fmt::Debug for KernelDefinition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelDefinition").field("name", &self.name).finish()
    }
}

impl<T> KernelDefinition<T> {
    pub fn new<F, I>(name: &str, implementation: F, field_init: I) -> Self
    where
        F: 'static + Send + Sync + Fn(&[u8], usize, &[&[T]], &mut [&mut [T]]) -> StatusCode,
        I: 'static + Send + Sync + Fn(&mut FieldRegistrar) -> Result<(), KernelError>,
    {
        Self {
            name: name.to_string(),
            implementation: Arc::new(implementation),
            field_init: Arc::new(field_init),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a kernel from this definition under the requested name.
    ///
    /// The requested name must equal the declared name exactly. On mismatch, no fields are
    /// declared and no kernel is created.
    pub fn instantiate(&self, requested: &str) -> Result<Kernel<T>, KernelError> {
        if requested != self.name {
            return Err(KernelError::NameMismatch {
                declared: self.name.clone(),
                requested: requested.to_string(),
            });
        }
        let mut kernel = Kernel::from_shared(&self.name, Arc::clone(&self.implementation));
        (self.field_init)(kernel.fields_mut())?;
        kernel.log_created();
        Ok(kernel)
    }
}

/// A table of kernel definitions keyed by name.
#[derive(Debug, Clone)]
pub struct KernelRegistry<T> {
    definitions: FxHashMap<String, KernelDefinition<T>>,
}

impl<T> Default for KernelRegistry<T> {
    fn default() -> Self {
        Self {
            definitions: FxHashMap::default(),
        }
    }
}

impl<T> KernelRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, I>(&mut self, name: &str, implementation: F, field_init: I) -> Result<(), KernelError>
    where
        F: 'static + Send + Sync + Fn(&[u8], usize, &[&[T]], &mut [&mut [T]]) -> StatusCode,
        I: 'static + Send + Sync + Fn(&mut FieldRegistrar) -> Result<(), KernelError>,
    {
        self.register_definition(KernelDefinition::new(name, implementation, field_init))
    }

    pub fn register_definition(&mut self, definition: KernelDefinition<T>) -> Result<(), KernelError> {
        if self.definitions.contains_key(&definition.name) {
            return Err(KernelError::DuplicateKernelName(definition.name));
        }
        debug!("Registered kernel '{}'", definition.name);
        self.definitions.insert(definition.name.clone(), definition);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&KernelDefinition<T>> {
        self.definitions.get(name)
    }

    /// Create a kernel by name.
    ///
    /// The definition whose name is the longest prefix of `name` is selected and instantiated
    /// under `name`. Consequently a name that extends a registered name, such as `"MassApply2"`
    /// when only `"MassApply"` is registered, fails with [`KernelError::NameMismatch`].
    pub fn create_by_name(&self, name: &str) -> Result<Kernel<T>, KernelError> {
        let definition = self
            .definitions
            .values()
            .filter(|definition| name.starts_with(definition.name.as_str()))
            .max_by_key(|definition| definition.name.len())
            .ok_or_else(|| KernelError::UnknownKernel(name.to_string()))?;
        definition.instantiate(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.definitions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
