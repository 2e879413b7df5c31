//! Projectors that turn field bilinears on a surface point into flux densities.

use nalgebra::{Matrix3, Vector3};

use crate::core::fields::{C64, CVector3};

/// Per-point projector matrices for the power, force and torque fluxes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NMatrices {
    /// `conj(E) N H = n . (conj(E) x H)`.
    pub power: Matrix3<f64>,
    pub force: [Matrix3<f64>; 3],
    pub torque: [Matrix3<f64>; 3],
}

#[inline]
fn levi_civita(i: usize, j: usize, k: usize) -> f64 {
    match (i, j, k) {
        (0, 1, 2) | (1, 2, 0) | (2, 0, 1) => 1.0,
        (0, 2, 1) | (2, 1, 0) | (1, 0, 2) => -1.0,
        _ => 0.0,
    }
}

/// Projectors for outward normal `n` and lever arm `r = x - x_torque`.
pub fn n_matrices(n: &Vector3<f64>, r: &Vector3<f64>) -> NMatrices {
    let power = Matrix3::from_fn(|j, k| (0..3).map(|i| levi_civita(j, k, i) * n[i]).sum());

    let force = std::array::from_fn(|i| {
        Matrix3::from_fn(|j, k| {
            let mut value = 0.0;
            if i == k {
                value += n[j];
            }
            if i == j {
                value += n[k];
            }
            if j == k {
                value -= n[i];
            }
            value
        })
    });

    let r_cross_n = r.cross(n);
    let torque = std::array::from_fn(|mu| {
        let lever: Vector3<f64> = Vector3::from_fn(|b, _| (0..3).map(|j| levi_civita(mu, j, b) * r[j]).sum());
        Matrix3::from_fn(|a, b| {
            let diagonal = if a == b { r_cross_n[mu] } else { 0.0 };
            n[a] * lever[b] + lever[a] * n[b] - diagonal
        })
    });

    NMatrices { power, force, torque }
}

/// `sum conj(u_mu) M_mu,nu v_nu`.
#[inline]
pub fn hvmvp(u: &CVector3, m: &Matrix3<f64>, v: &CVector3) -> C64 {
    let mut sum = C64::new(0.0, 0.0);
    for mu in 0..3 {
        let cu = u[mu].conj();
        for nu in 0..3 {
            sum += cu * m[(mu, nu)] * v[nu];
        }
    }
    sum
}
