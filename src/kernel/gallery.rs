//! A small collection of predefined kernels for mass and Laplace operators.
//!
//! Gradient inputs are laid out as `[dim][comp][point]`. The Jacobian of the reference-to-physical
//! map is therefore read from a `dx` field as `dx[q + num_points * (d * dim + c)] = ∂x_c / ∂X_d`.
//!
//! Build kernels store symmetric quadrature data in Voigt order: `00, 11, 01` in 2D and
//! `00, 11, 22, 12, 02, 01` in 3D.
use crate::kernel::registry::KernelRegistry;
use crate::kernel::{read_context, EvalMode, FieldRegistrar, KernelError, StatusCode, KERNEL_SUCCESS};
use itertools::izip;
use nalgebra::{Matrix2, Matrix3, RealField};

/// Status returned by build kernels when the Jacobian is singular at some point.
pub const SINGULAR_JACOBIAN: StatusCode = 1;

/// Status returned by kernels whose context is missing or too short.
pub const MISSING_CONTEXT: StatusCode = 2;

const VOIGT_2D: [(usize, usize); 3] = [(0, 0), (1, 1), (0, 1)];
const VOIGT_3D: [(usize, usize); 6] = [(0, 0), (1, 1), (2, 2), (1, 2), (0, 2), (0, 1)];

/// Register all gallery kernels.
pub fn register_gallery<T: RealField + Copy>(registry: &mut KernelRegistry<T>) -> Result<(), KernelError> {
    registry.register("Identity", identity::<T>, |fields: &mut FieldRegistrar| {
        fields.add_input("input", 1, EvalMode::Value)?;
        fields.add_output("output", 1, EvalMode::Value)?;
        Ok(())
    })?;
    registry.register("Scale", scale::<T>, |fields: &mut FieldRegistrar| {
        fields.add_input("input", 1, EvalMode::Value)?;
        fields.add_output("output", 1, EvalMode::Value)?;
        Ok(())
    })?;

    registry.register("Mass1DBuild", mass_build_1d::<T>, |fields: &mut FieldRegistrar| {
        fields.add_input("dx", 1, EvalMode::Gradient)?;
        fields.add_input("weights", 1, EvalMode::Weight)?;
        fields.add_output("qdata", 1, EvalMode::None)?;
        Ok(())
    })?;
    registry.register("Mass2DBuild", mass_build_2d::<T>, |fields: &mut FieldRegistrar| {
        fields.add_input("dx", 4, EvalMode::Gradient)?;
        fields.add_input("weights", 1, EvalMode::Weight)?;
        fields.add_output("qdata", 1, EvalMode::None)?;
        Ok(())
    })?;
    registry.register("Mass3DBuild", mass_build_3d::<T>, |fields: &mut FieldRegistrar| {
        fields.add_input("dx", 9, EvalMode::Gradient)?;
        fields.add_input("weights", 1, EvalMode::Weight)?;
        fields.add_output("qdata", 1, EvalMode::None)?;
        Ok(())
    })?;
    registry.register("MassApply", scale_by_qdata::<T>, |fields: &mut FieldRegistrar| {
        fields.add_input("u", 1, EvalMode::Value)?;
        fields.add_input("qdata", 1, EvalMode::None)?;
        fields.add_output("v", 1, EvalMode::Value)?;
        Ok(())
    })?;
    registry.register("Vector3MassApply", scale_by_qdata::<T>, |fields: &mut FieldRegistrar| {
        fields.add_input("u", 3, EvalMode::Value)?;
        fields.add_input("qdata", 1, EvalMode::None)?;
        fields.add_output("v", 3, EvalMode::Value)?;
        Ok(())
    })?;

    registry.register("Poisson1DBuild", poisson_build_1d::<T>, |fields: &mut FieldRegistrar| {
        fields.add_input("dx", 1, EvalMode::Gradient)?;
        fields.add_input("weights", 1, EvalMode::Weight)?;
        fields.add_output("qdata", 1, EvalMode::None)?;
        Ok(())
    })?;
    registry.register("Poisson2DBuild", poisson_build_2d::<T>, |fields: &mut FieldRegistrar| {
        fields.add_input("dx", 4, EvalMode::Gradient)?;
        fields.add_input("weights", 1, EvalMode::Weight)?;
        fields.add_output("qdata", 3, EvalMode::None)?;
        Ok(())
    })?;
    registry.register("Poisson3DBuild", poisson_build_3d::<T>, |fields: &mut FieldRegistrar| {
        fields.add_input("dx", 9, EvalMode::Gradient)?;
        fields.add_input("weights", 1, EvalMode::Weight)?;
        fields.add_output("qdata", 6, EvalMode::None)?;
        Ok(())
    })?;
    registry.register("Poisson1DApply", scale_by_qdata::<T>, |fields: &mut FieldRegistrar| {
        fields.add_input("du", 1, EvalMode::Gradient)?;
        fields.add_input("qdata", 1, EvalMode::None)?;
        fields.add_output("dv", 1, EvalMode::Gradient)?;
        Ok(())
    })?;
    registry.register("Poisson2DApply", poisson_apply_2d::<T>, |fields: &mut FieldRegistrar| {
        fields.add_input("du", 2, EvalMode::Gradient)?;
        fields.add_input("qdata", 3, EvalMode::None)?;
        fields.add_output("dv", 2, EvalMode::Gradient)?;
        Ok(())
    })?;
    registry.register("Poisson3DApply", poisson_apply_3d::<T>, |fields: &mut FieldRegistrar| {
        fields.add_input("du", 3, EvalMode::Gradient)?;
        fields.add_input("qdata", 6, EvalMode::None)?;
        fields.add_output("dv", 3, EvalMode::Gradient)?;
        Ok(())
    })?;
    registry.register("Vector3Poisson1DApply", scale_by_qdata::<T>, |fields: &mut FieldRegistrar| {
        fields.add_input("du", 3, EvalMode::Gradient)?;
        fields.add_input("qdata", 1, EvalMode::None)?;
        fields.add_output("dv", 3, EvalMode::Gradient)?;
        Ok(())
    })?;
    Ok(())
}

impl<T: RealField + Copy> KernelRegistry<T> {
    /// A registry pre-populated with the gallery kernels.
    pub fn with_gallery() -> Self {
        let mut registry = Self::new();
        register_gallery(&mut registry).expect("Internal error: Gallery kernel names must be unique");
        registry
    }
}

fn identity<T: Copy>(_: &[u8], _: usize, inputs: &[&[T]], outputs: &mut [&mut [T]]) -> StatusCode {
    outputs[0].copy_from_slice(inputs[0]);
    KERNEL_SUCCESS
}

/// Multiplies the input by the `f64` factor stored in the context.
fn scale<T: RealField + Copy>(context: &[u8], _: usize, inputs: &[&[T]], outputs: &mut [&mut [T]]) -> StatusCode {
    let Some(factor) = read_context::<f64>(context) else {
        return MISSING_CONTEXT;
    };
    let factor: T = nalgebra::convert(factor);
    for (v, &u) in izip!(outputs[0].iter_mut(), inputs[0]) {
        *v = factor * u;
    }
    KERNEL_SUCCESS
}

/// `v[c][q] = qdata[q] * u[c][q]` for every component of `u`.
fn scale_by_qdata<T: RealField + Copy>(
    _: &[u8],
    num_points: usize,
    inputs: &[&[T]],
    outputs: &mut [&mut [T]],
) -> StatusCode {
    if num_points == 0 {
        return KERNEL_SUCCESS;
    }
    let (u, qdata) = (inputs[0], inputs[1]);
    for (v_c, u_c) in izip!(outputs[0].chunks_exact_mut(num_points), u.chunks_exact(num_points)) {
        for (v, &u, &w) in izip!(v_c, u_c, qdata) {
            *v = w * u;
        }
    }
    KERNEL_SUCCESS
}

fn jacobian_2d<T: RealField + Copy>(dx: &[T], num_points: usize, q: usize) -> Matrix2<T> {
    Matrix2::from_fn(|c, d| dx[q + num_points * (2 * d + c)])
}

fn jacobian_3d<T: RealField + Copy>(dx: &[T], num_points: usize, q: usize) -> Matrix3<T> {
    Matrix3::from_fn(|c, d| dx[q + num_points * (3 * d + c)])
}

fn mass_build_1d<T: RealField + Copy>(_: &[u8], _: usize, inputs: &[&[T]], outputs: &mut [&mut [T]]) -> StatusCode {
    let (dx, weights) = (inputs[0], inputs[1]);
    for (qd, &j, &w) in izip!(outputs[0].iter_mut(), dx, weights) {
        if j == T::zero() {
            return SINGULAR_JACOBIAN;
        }
        *qd = j * w;
    }
    KERNEL_SUCCESS
}

fn mass_build_2d<T: RealField + Copy>(
    _: &[u8],
    num_points: usize,
    inputs: &[&[T]],
    outputs: &mut [&mut [T]],
) -> StatusCode {
    let (dx, weights) = (inputs[0], inputs[1]);
    for (q, qd) in outputs[0].iter_mut().enumerate() {
        let det = jacobian_2d(dx, num_points, q).determinant();
        if det == T::zero() {
            return SINGULAR_JACOBIAN;
        }
        *qd = det * weights[q];
    }
    KERNEL_SUCCESS
}

fn mass_build_3d<T: RealField + Copy>(
    _: &[u8],
    num_points: usize,
    inputs: &[&[T]],
    outputs: &mut [&mut [T]],
) -> StatusCode {
    let (dx, weights) = (inputs[0], inputs[1]);
    for (q, qd) in outputs[0].iter_mut().enumerate() {
        let det = jacobian_3d(dx, num_points, q).determinant();
        if det == T::zero() {
            return SINGULAR_JACOBIAN;
        }
        *qd = det * weights[q];
    }
    KERNEL_SUCCESS
}

fn poisson_build_1d<T: RealField + Copy>(_: &[u8], _: usize, inputs: &[&[T]], outputs: &mut [&mut [T]]) -> StatusCode {
    let (dx, weights) = (inputs[0], inputs[1]);
    for (qd, &j, &w) in izip!(outputs[0].iter_mut(), dx, weights) {
        if j == T::zero() {
            return SINGULAR_JACOBIAN;
        }
        *qd = w / j;
    }
    KERNEL_SUCCESS
}

fn poisson_build_2d<T: RealField + Copy>(
    _: &[u8],
    num_points: usize,
    inputs: &[&[T]],
    outputs: &mut [&mut [T]],
) -> StatusCode {
    let (dx, weights) = (inputs[0], inputs[1]);
    let qdata = &mut *outputs[0];
    for q in 0..num_points {
        let j = jacobian_2d(dx, num_points, q);
        let Some(j_inv) = j.try_inverse() else {
            return SINGULAR_JACOBIAN;
        };
        let a = j_inv * j_inv.transpose() * (weights[q] * j.determinant());
        for (k, &(r, s)) in VOIGT_2D.iter().enumerate() {
            qdata[q + num_points * k] = a[(r, s)];
        }
    }
    KERNEL_SUCCESS
}

fn poisson_build_3d<T: RealField + Copy>(
    _: &[u8],
    num_points: usize,
    inputs: &[&[T]],
    outputs: &mut [&mut [T]],
) -> StatusCode {
    let (dx, weights) = (inputs[0], inputs[1]);
    let qdata = &mut *outputs[0];
    for q in 0..num_points {
        let j = jacobian_3d(dx, num_points, q);
        let Some(j_inv) = j.try_inverse() else {
            return SINGULAR_JACOBIAN;
        };
        let a = j_inv * j_inv.transpose() * (weights[q] * j.determinant());
        for (k, &(r, s)) in VOIGT_3D.iter().enumerate() {
            qdata[q + num_points * k] = a[(r, s)];
        }
    }
    KERNEL_SUCCESS
}

fn poisson_apply_2d<T: RealField + Copy>(
    _: &[u8],
    num_points: usize,
    inputs: &[&[T]],
    outputs: &mut [&mut [T]],
) -> StatusCode {
    let (du, qdata) = (inputs[0], inputs[1]);
    let dv = &mut *outputs[0];
    let n = num_points;
    for q in 0..n {
        let (q00, q11, q01) = (qdata[q], qdata[q + n], qdata[q + 2 * n]);
        let (du0, du1) = (du[q], du[q + n]);
        dv[q] = q00 * du0 + q01 * du1;
        dv[q + n] = q01 * du0 + q11 * du1;
    }
    KERNEL_SUCCESS
}

fn poisson_apply_3d<T: RealField + Copy>(
    _: &[u8],
    num_points: usize,
    inputs: &[&[T]],
    outputs: &mut [&mut [T]],
) -> StatusCode {
    let (du, qdata) = (inputs[0], inputs[1]);
    let dv = &mut *outputs[0];
    let n = num_points;
    for q in 0..n {
        let mut a = Matrix3::zeros();
        for (k, &(r, s)) in VOIGT_3D.iter().enumerate() {
            a[(r, s)] = qdata[q + n * k];
            a[(s, r)] = qdata[q + n * k];
        }
        let g = a * nalgebra::Vector3::new(du[q], du[q + n], du[q + 2 * n]);
        for d in 0..3 {
            dv[q + n * d] = g[d];
        }
    }
    KERNEL_SUCCESS
}
