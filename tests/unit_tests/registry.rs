use matfree::kernel::registry::{KernelDefinition, KernelRegistry};
use matfree::kernel::{EvalMode, FieldRegistrar, KernelError, StatusCode, KERNEL_SUCCESS};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn noop(_: &[u8], _: usize, _: &[&[f64]], _: &mut [&mut [f64]]) -> StatusCode {
    KERNEL_SUCCESS
}

fn value_fields(fields: &mut FieldRegistrar) -> Result<(), KernelError> {
    fields.add_input("u", 1, EvalMode::Value)?;
    fields.add_output("v", 1, EvalMode::Value)?;
    Ok(())
}

#[test]
fn name_mismatch_declares_no_fields() {
    let field_init_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&field_init_calls);
    let definition = KernelDefinition::new("A", noop, move |fields: &mut FieldRegistrar| {
        counter.fetch_add(1, Ordering::SeqCst);
        value_fields(fields)
    });

    assert_eq!(
        definition.instantiate("B").unwrap_err(),
        KernelError::NameMismatch {
            declared: "A".to_string(),
            requested: "B".to_string()
        }
    );
    assert_eq!(field_init_calls.load(Ordering::SeqCst), 0);

    let kernel = definition.instantiate("A").unwrap();
    assert_eq!(field_init_calls.load(Ordering::SeqCst), 1);
    assert_eq!(kernel.name(), "A");
    assert_eq!(kernel.inputs().len(), 1);
    assert_eq!(kernel.outputs().len(), 1);
}

#[test]
fn field_init_errors_propagate() {
    let definition = KernelDefinition::new("dup", noop, |fields: &mut FieldRegistrar| {
        fields.add_input("u", 1, EvalMode::Value)?;
        fields.add_input("u", 1, EvalMode::Gradient)?;
        Ok(())
    });
    assert_eq!(
        definition.instantiate("dup").unwrap_err(),
        KernelError::DuplicateFieldName {
            kernel: "dup".to_string(),
            field: "u".to_string()
        }
    );
}

#[test]
fn registry_rejects_duplicate_names() {
    let mut registry = KernelRegistry::new();
    registry.register("Mass", noop, value_fields).unwrap();
    assert_eq!(
        registry.register("Mass", noop, value_fields),
        Err(KernelError::DuplicateKernelName("Mass".to_string()))
    );
    assert_eq!(registry.len(), 1);
    assert!(registry.get("Mass").is_some());
    assert!(registry.get("Mas").is_none());
}

#[test]
fn create_by_name_uses_longest_prefix() {
    let mut registry = KernelRegistry::<f64>::new();
    registry.register("Mass", noop, value_fields).unwrap();
    registry.register("MassApply", noop, value_fields).unwrap();
    assert_eq!(registry.names(), vec!["Mass", "MassApply"]);

    assert_eq!(registry.create_by_name("Mass").unwrap().name(), "Mass");
    assert_eq!(registry.create_by_name("MassApply").unwrap().name(), "MassApply");

    // The longest matching prefix is "MassApply", whose name does not match exactly
    assert_eq!(
        registry.create_by_name("MassApplyTwice").unwrap_err(),
        KernelError::NameMismatch {
            declared: "MassApply".to_string(),
            requested: "MassApplyTwice".to_string()
        }
    );
    assert_eq!(
        registry.create_by_name("Poisson").unwrap_err(),
        KernelError::UnknownKernel("Poisson".to_string())
    );
}
