use matfree::basis::MatrixBasis;
use matfree::index_map::IndexMap;
use matfree::kernel::gallery::SINGULAR_JACOBIAN;
use matfree::kernel::registry::KernelRegistry;
use matfree::kernel::{EvalMode, Kernel, KERNEL_SUCCESS};
use matfree::operator::{
    Execution, FieldVector, Operator, OperatorBuilder, OperatorConfig, OperatorError, PipelineStage,
};
use matfree::restriction::Restriction;
use matfree::vector::CopyMode;
use matrixcompare::assert_matrix_eq;
use nalgebra::DMatrix;
use util::{assert_approx_slice_eq, chain_indices, linear_lagrange_1d};

/// A uniform mesh of two-node elements on `[0, length]`.
pub(super) struct Mesh1d {
    coords: Vec<f64>,
    nodes: Restriction<'static>,
    qdata: Restriction<'static>,
    basis: MatrixBasis<f64>,
}

impl Mesh1d {
    pub(super) fn uniform(num_elements: usize, length: f64) -> Self {
        let h = length / num_elements as f64;
        let coords = (0..=num_elements).map(|i| i as f64 * h).collect();
        let (interpolation, gradient, weights) = linear_lagrange_1d();
        let offsets = (0..=num_elements).map(|e| 2 * e).collect();
        Self {
            coords,
            nodes: Restriction::take(num_elements, num_elements + 1, 1, offsets, chain_indices(num_elements)).unwrap(),
            qdata: Restriction::from_index_map(IndexMap::strided(num_elements, 2, 1), CopyMode::Take),
            basis: MatrixBasis::new(1, interpolation, vec![gradient], weights).unwrap(),
        }
    }

    pub(super) fn num_nodes(&self) -> usize {
        self.coords.len()
    }

    fn build_qdata(&self, config: OperatorConfig) -> Result<Vec<f64>, OperatorError> {
        let kernel = KernelRegistry::with_gallery().create_by_name("Mass1DBuild").unwrap();
        let setup = OperatorBuilder::new(&kernel)
            .with_config(config)
            .with_field("dx", &self.nodes, &self.basis, FieldVector::Passive(&self.coords))
            .with_weight_field("weights", &self.basis)
            .with_restricted_field("qdata", &self.qdata, FieldVector::Active)
            .build()?;
        let mut qdata = vec![0.0; setup.active_output_len()];
        setup.apply(&[], &mut qdata)?;
        Ok(qdata)
    }
}

pub(super) fn with_mass_operator(mesh: &Mesh1d, config: OperatorConfig, f: impl FnOnce(&Operator<f64>)) {
    let qdata = mesh.build_qdata(config).unwrap();
    let kernel = KernelRegistry::with_gallery().create_by_name("MassApply").unwrap();
    let operator = OperatorBuilder::new(&kernel)
        .with_config(config)
        .with_field("u", &mesh.nodes, &mesh.basis, FieldVector::Active)
        .with_restricted_field("qdata", &mesh.qdata, FieldVector::Passive(&qdata))
        .with_field("v", &mesh.nodes, &mesh.basis, FieldVector::Active)
        .build()
        .unwrap();
    f(&operator)
}

pub(super) fn dense_matrix(operator: &Operator<f64>) -> DMatrix<f64> {
    let (m, n) = (operator.active_output_len(), operator.active_input_len());
    let mut matrix = DMatrix::zeros(m, n);
    for j in 0..n {
        let mut unit = vec![0.0; n];
        unit[j] = 1.0;
        let mut column = vec![0.0; m];
        operator.apply(&unit, &mut column).unwrap();
        matrix.column_mut(j).copy_from_slice(&column);
    }
    matrix
}

#[test]
fn pipeline_stages_cycle_back_to_idle() {
    let mut stage = PipelineStage::Idle;
    let mut visited = vec![stage];
    for _ in 0..5 {
        stage = stage.next();
        visited.push(stage);
    }
    assert_eq!(
        visited,
        vec![
            PipelineStage::Idle,
            PipelineStage::Gathered,
            PipelineStage::BasisEvaluated,
            PipelineStage::KernelApplied,
            PipelineStage::BasisTransposed,
            PipelineStage::Scattered
        ]
    );
    assert_eq!(stage.next(), PipelineStage::Idle);
}

#[test]
fn setup_operator_computes_quadrature_data() {
    let mesh = Mesh1d::uniform(4, 2.0);
    let qdata = mesh.build_qdata(OperatorConfig::default()).unwrap();
    // Each point carries w * |J| = 1 * h / 2
    assert_approx_slice_eq!(qdata, [0.25; 8], abstol = 1e-14);
}

#[test]
fn mass_operator_matches_mass_matrix() {
    let mesh = Mesh1d::uniform(3, 1.5);
    let h = 0.5;
    with_mass_operator(&mesh, OperatorConfig::default(), |operator| {
        assert_eq!(operator.num_elements(), 3);
        assert_eq!(operator.num_points(), 6);
        assert_eq!(operator.active_input_len(), mesh.num_nodes());

        #[rustfmt::skip]
        let expected = DMatrix::from_row_slice(4, 4, &[
            2.0, 1.0, 0.0, 0.0,
            1.0, 4.0, 1.0, 0.0,
            0.0, 1.0, 4.0, 1.0,
            0.0, 0.0, 1.0, 2.0,
        ]) * (h / 6.0);
        assert_matrix_eq!(dense_matrix(operator), expected, comp = abs, tol = 1e-14);
    });
}

#[test]
fn apply_overwrites_and_apply_add_accumulates() {
    let mesh = Mesh1d::uniform(4, 2.0);
    with_mass_operator(&mesh, OperatorConfig::default(), |operator| {
        let ones = vec![1.0; mesh.num_nodes()];
        let mut v = vec![7.0; mesh.num_nodes()];
        operator.apply(&ones, &mut v).unwrap();
        // Row sums of the mass matrix integrate the constant function
        assert_approx_slice_eq!(v, [0.25, 0.5, 0.5, 0.5, 0.25], abstol = 1e-14);
        assert!((v.iter().sum::<f64>() - 2.0).abs() < 1e-14);

        operator.apply_add(&ones, &mut v).unwrap();
        assert_approx_slice_eq!(v, [0.5, 1.0, 1.0, 1.0, 0.5], abstol = 1e-14);

        // The operator holds no state between actions
        operator.apply(&ones, &mut v).unwrap();
        assert_approx_slice_eq!(v, [0.25, 0.5, 0.5, 0.5, 0.25], abstol = 1e-14);
    });
}

#[test]
fn parallel_execution_matches_serial_execution() {
    let mesh = Mesh1d::uniform(17, 3.0);
    let u: Vec<f64> = mesh.coords.iter().map(|x| x.sin()).collect();

    let mut serial = vec![0.0; mesh.num_nodes()];
    with_mass_operator(&mesh, OperatorConfig::default(), |operator| {
        operator.apply(&u, &mut serial).unwrap();
    });

    let mut parallel = vec![0.0; mesh.num_nodes()];
    let config = OperatorConfig::default().with_execution(Execution::Parallel);
    with_mass_operator(&mesh, config, |operator| {
        assert_eq!(operator.config().execution, Execution::Parallel);
        operator.apply(&u, &mut parallel).unwrap();
    });
    assert_approx_slice_eq!(serial, parallel, abstol = 1e-13);
}

#[test]
fn apply_checks_active_vector_lengths() {
    let mesh = Mesh1d::uniform(2, 1.0);
    with_mass_operator(&mesh, OperatorConfig::default(), |operator| {
        let mut v = vec![0.0; 3];
        assert!(matches!(
            operator.apply(&[1.0; 2], &mut v),
            Err(OperatorError::ShapeMismatch {
                expected: 3,
                actual: 2,
                ..
            })
        ));
    });
}

#[test]
fn kernel_failure_aborts_action_with_status() {
    // Two coinciding nodes give a degenerate element
    let mut mesh = Mesh1d::uniform(3, 3.0);
    mesh.coords[2] = mesh.coords[1];
    let err = mesh.build_qdata(OperatorConfig::default()).unwrap_err();
    assert_eq!(err.kernel_status(), Some(SINGULAR_JACOBIAN));

    let config = OperatorConfig::default().with_execution(Execution::Parallel);
    let err = mesh.build_qdata(config).unwrap_err();
    assert_eq!(err.kernel_status(), Some(SINGULAR_JACOBIAN));
}

#[test]
fn build_rejects_invalid_bindings() {
    let mesh = Mesh1d::uniform(2, 1.0);
    let kernel = KernelRegistry::with_gallery().create_by_name("MassApply").unwrap();
    let qdata = vec![1.0; mesh.qdata.lvector_len()];
    let builder = || {
        OperatorBuilder::new(&kernel)
            .with_field("u", &mesh.nodes, &mesh.basis, FieldVector::Active)
            .with_restricted_field("qdata", &mesh.qdata, FieldVector::Passive(&qdata))
    };

    let result = builder().build();
    assert!(matches!(result, Err(OperatorError::FieldNotBound(name)) if name == "v"));

    let result = builder()
        .with_field("v", &mesh.nodes, &mesh.basis, FieldVector::Active)
        .with_field("w", &mesh.nodes, &mesh.basis, FieldVector::Active)
        .build();
    assert!(matches!(result, Err(OperatorError::UnknownField(name)) if name == "w"));

    let result = builder()
        .with_field("v", &mesh.nodes, &mesh.basis, FieldVector::Active)
        .with_field("v", &mesh.nodes, &mesh.basis, FieldVector::Active)
        .build();
    assert!(matches!(result, Err(OperatorError::FieldBoundTwice(name)) if name == "v"));

    let result = builder()
        .with_restricted_field("v", &mesh.qdata, FieldVector::Active)
        .build();
    assert!(matches!(result, Err(OperatorError::InvalidBinding { field, .. }) if field == "v"));

    let nodal = vec![0.0; mesh.num_nodes()];
    let result = builder()
        .with_field("v", &mesh.nodes, &mesh.basis, FieldVector::Passive(&nodal))
        .build();
    assert!(matches!(result, Err(OperatorError::InvalidBinding { field, .. }) if field == "v"));

    let short = vec![1.0; 3];
    let result = OperatorBuilder::new(&kernel)
        .with_field("u", &mesh.nodes, &mesh.basis, FieldVector::Active)
        .with_restricted_field("qdata", &mesh.qdata, FieldVector::Passive(&short))
        .with_field("v", &mesh.nodes, &mesh.basis, FieldVector::Active)
        .build();
    assert!(matches!(
        result,
        Err(OperatorError::ShapeMismatch {
            expected: 4,
            actual: 3,
            ..
        })
    ));
}

#[test]
fn build_rejects_modes_the_basis_can_not_evaluate() {
    let mesh = Mesh1d::uniform(2, 1.0);
    let noop = |_: &[u8], _: usize, _: &[&[f64]], _: &mut [&mut [f64]]| KERNEL_SUCCESS;
    let unsupported = "basis does not support the evaluation mode";

    let mut divergence = Kernel::new("divergence", noop);
    divergence
        .add_input("u", 1, EvalMode::Divergence)
        .unwrap()
        .add_output("v", 1, EvalMode::Value)
        .unwrap();
    let result = OperatorBuilder::new(&divergence)
        .with_field("u", &mesh.nodes, &mesh.basis, FieldVector::Active)
        .with_field("v", &mesh.nodes, &mesh.basis, FieldVector::Active)
        .build();
    assert!(matches!(
        result,
        Err(OperatorError::InvalidBinding { field, reason }) if field == "u" && reason == unsupported
    ));

    let mut curl = Kernel::new("curl", noop);
    curl.add_input("u", 1, EvalMode::Value)
        .unwrap()
        .add_output("v", 3, EvalMode::Curl)
        .unwrap();
    let result = OperatorBuilder::new(&curl)
        .with_field("u", &mesh.nodes, &mesh.basis, FieldVector::Active)
        .with_field("v", &mesh.nodes, &mesh.basis, FieldVector::Active)
        .build();
    assert!(matches!(
        result,
        Err(OperatorError::InvalidBinding { field, reason }) if field == "v" && reason == unsupported
    ));
}

#[test]
fn build_rejects_inconsistent_sizes() {
    let mesh = Mesh1d::uniform(2, 1.0);
    let kernel = KernelRegistry::with_gallery().create_by_name("MassApply").unwrap();

    // Three points per element in the quadrature data, but the basis has two
    let wide_qdata = Restriction::from_index_map(IndexMap::strided(2, 3, 1), CopyMode::Take);
    let qdata = vec![1.0; wide_qdata.lvector_len()];
    let result = OperatorBuilder::new(&kernel)
        .with_field("u", &mesh.nodes, &mesh.basis, FieldVector::Active)
        .with_restricted_field("qdata", &wide_qdata, FieldVector::Passive(&qdata))
        .with_field("v", &mesh.nodes, &mesh.basis, FieldVector::Active)
        .build();
    assert!(matches!(
        result,
        Err(OperatorError::IncompatiblePointCount {
            element: 0,
            expected: 2,
            actual: 3,
            ..
        })
    ));

    let more_elements = Restriction::from_index_map(IndexMap::strided(3, 2, 1), CopyMode::Take);
    let qdata = vec![1.0; more_elements.lvector_len()];
    let result = OperatorBuilder::new(&kernel)
        .with_field("u", &mesh.nodes, &mesh.basis, FieldVector::Active)
        .with_restricted_field("qdata", &more_elements, FieldVector::Passive(&qdata))
        .with_field("v", &mesh.nodes, &mesh.basis, FieldVector::Active)
        .build();
    assert!(matches!(
        result,
        Err(OperatorError::IncompatibleElementCount {
            expected: 2,
            actual: 3,
            ..
        })
    ));

    let weights_only = {
        let mut kernel =
            Kernel::new("weights", |_: &[u8], _: usize, _: &[&[f64]], _: &mut [&mut [f64]]| KERNEL_SUCCESS);
        kernel.add_input("w", 1, EvalMode::Weight).unwrap();
        kernel
    };
    let result = OperatorBuilder::new(&weights_only)
        .with_weight_field("w", &mesh.basis)
        .build();
    assert!(matches!(result, Err(OperatorError::NoRestriction)));
}

#[test]
fn operator_at_points_with_varying_point_counts() {
    // Three elements with 2, 3 and 1 points, each point owned by exactly one element
    let packed = [4, 6, 9, 10, 3, 4, 5, 0, 1, 2];
    let points = Restriction::from_index_map(IndexMap::from_packed(3, 1, 6, &packed).unwrap(), CopyMode::Copy);

    let mut kernel = Kernel::new(
        "double_and_count",
        |_: &[u8], num_points: usize, inputs: &[&[f64]], outputs: &mut [&mut [f64]]| {
            for (v, u) in outputs[0].iter_mut().zip(inputs[0]) {
                *v = 2.0 * u + num_points as f64;
            }
            KERNEL_SUCCESS
        },
    );
    kernel.add_input("u", 1, EvalMode::None).unwrap();
    kernel.add_output("v", 1, EvalMode::None).unwrap();

    for execution in [Execution::Serial, Execution::Parallel] {
        let operator = OperatorBuilder::new(&kernel)
            .with_config(OperatorConfig { execution })
            .with_restricted_field("u", &points, FieldVector::Active)
            .with_restricted_field("v", &points, FieldVector::Active)
            .build()
            .unwrap();
        assert_eq!(operator.element_point_count(0), 2);
        assert_eq!(operator.element_point_count(1), 3);
        assert_eq!(operator.element_point_count(2), 1);

        let u = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let mut v = [0.0; 6];
        operator.apply(&u, &mut v).unwrap();
        // Points 3, 4 belong to element 0, points 5, 0, 1 to element 1 and point 2 to element 2
        assert_eq!(v, [3.0, 5.0, 5.0, 8.0, 10.0, 13.0]);
    }
}
