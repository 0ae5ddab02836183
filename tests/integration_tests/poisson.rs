use super::{dot, TensorMesh};
use matfree::kernel::registry::KernelRegistry;
use matfree::operator::{Execution, FieldVector, Operator, OperatorBuilder, OperatorConfig};
use util::assert_approx_slice_eq;

fn with_laplace_operator(mesh: &TensorMesh, config: OperatorConfig, f: impl FnOnce(&Operator<f64>)) {
    let (build, apply, num_qcomponents) = match mesh.dim {
        1 => ("Poisson1DBuild", "Poisson1DApply", 1),
        2 => ("Poisson2DBuild", "Poisson2DApply", 3),
        _ => unreachable!(),
    };
    let qdata_restriction = mesh.qdata_restriction(num_qcomponents);
    let qdata = mesh.build_qdata(build, &qdata_restriction, config);

    let kernel = KernelRegistry::with_gallery().create_by_name(apply).unwrap();
    let operator = OperatorBuilder::new(&kernel)
        .with_config(config)
        .with_field("du", &mesh.nodes, &mesh.basis, FieldVector::Active)
        .with_restricted_field("qdata", &qdata_restriction, FieldVector::Passive(&qdata))
        .with_field("dv", &mesh.nodes, &mesh.basis, FieldVector::Active)
        .build()
        .unwrap();
    f(&operator)
}

#[test]
fn laplace_1d_of_linear_function_gives_boundary_flux() {
    let mesh = TensorMesh::line(5, 2.5);
    with_laplace_operator(&mesh, OperatorConfig::default(), |laplace| {
        let mut v = vec![0.0; mesh.num_nodes()];
        laplace.apply(&vec![1.0; mesh.num_nodes()], &mut v).unwrap();
        assert_approx_slice_eq!(v, [0.0; 6], abstol = 1e-13);

        laplace.apply(&mesh.coords, &mut v).unwrap();
        assert_approx_slice_eq!(v, [-1.0, 0.0, 0.0, 0.0, 0.0, 1.0], abstol = 1e-13);

        // A single hat function at node 2 with h = 0.5
        let mut hat = vec![0.0; mesh.num_nodes()];
        hat[2] = 1.0;
        laplace.apply(&hat, &mut v).unwrap();
        assert_approx_slice_eq!(v, [0.0, -2.0, 4.0, -2.0, 0.0, 0.0], abstol = 1e-13);
    });
}

#[test]
fn laplace_2d_energy_of_linear_function() {
    let (lx, ly) = (2.0, 1.0);
    let mesh = TensorMesh::rectangle(4, 3, lx, ly);
    let (x, y) = (mesh.coordinate(0), mesh.coordinate(1));
    let (a, b) = (0.5, -1.5);
    let u: Vec<f64> = x.iter().zip(&y).map(|(x, y)| a * x + b * y + 2.0).collect();

    let mut serial = vec![0.0; mesh.num_nodes()];
    with_laplace_operator(&mesh, OperatorConfig::default(), |laplace| {
        let mut v = vec![0.0; mesh.num_nodes()];
        laplace.apply(&vec![3.0; mesh.num_nodes()], &mut v).unwrap();
        assert_approx_slice_eq!(v, vec![0.0; mesh.num_nodes()], abstol = 1e-12);

        laplace.apply(&u, &mut serial).unwrap();
        // The integral of |grad u|^2 over the rectangle
        assert!((dot(&u, &serial) - (a * a + b * b) * lx * ly).abs() < 1e-12);
        assert!(serial.iter().sum::<f64>().abs() < 1e-12);
    });

    let config = OperatorConfig::default().with_execution(Execution::Parallel);
    with_laplace_operator(&mesh, config, |laplace| {
        let mut parallel = vec![0.0; mesh.num_nodes()];
        laplace.apply(&u, &mut parallel).unwrap();
        assert_approx_slice_eq!(serial, parallel, abstol = 1e-12);
    });
}

#[test]
fn mass_plus_laplace_with_apply_add() {
    // (M + K) applied to a constant equals M applied to it
    let mesh = TensorMesh::line(6, 3.0);
    let ones = vec![1.0; mesh.num_nodes()];
    let qdata_restriction = mesh.qdata_restriction(1);
    let qdata = mesh.build_qdata("Mass1DBuild", &qdata_restriction, OperatorConfig::default());
    let kernel = KernelRegistry::with_gallery().create_by_name("MassApply").unwrap();
    let mass = OperatorBuilder::new(&kernel)
        .with_field("u", &mesh.nodes, &mesh.basis, FieldVector::Active)
        .with_restricted_field("qdata", &qdata_restriction, FieldVector::Passive(&qdata))
        .with_field("v", &mesh.nodes, &mesh.basis, FieldVector::Active)
        .build()
        .unwrap();

    let mut v = vec![0.0; mesh.num_nodes()];
    with_laplace_operator(&mesh, OperatorConfig::default(), |laplace| {
        laplace.apply(&ones, &mut v).unwrap();
    });
    mass.apply_add(&ones, &mut v).unwrap();
    assert_approx_slice_eq!(v, [0.25, 0.5, 0.5, 0.5, 0.5, 0.5, 0.25], abstol = 1e-13);
}
