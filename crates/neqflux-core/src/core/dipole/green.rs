//! Free-space dyadic Green's function and point-dipole fields.

use nalgebra::{Matrix3, Vector3};
use std::f64::consts::PI;

use crate::core::fields::{C64, CVector3, FieldSample};
use crate::core::physics::ZVAC;

const II: C64 = C64::new(0.0, 1.0);

/// Below this value of `k r` the imaginary part of the Green's function is evaluated from
/// its Taylor series.
const SMALL_KR: f64 = 1e-3;

/// Below this distance two points are treated as coincident.
pub const COINCIDENT: f64 = 1e-12;

/// `G(r) = (1 + grad grad / k^2) exp(ikr) / (4 pi r)`.
pub fn dyadic_green(r: &Vector3<f64>, k: f64) -> Matrix3<C64> {
    let rn = r.norm();
    let rhat = r / rn;
    let kr = k * rn;
    let g = (II * kr).exp() / (4.0 * PI * rn);
    let ikr = II / kr;
    let a = 1.0 + ikr - 1.0 / (kr * kr);
    let b = -1.0 - 3.0 * ikr + 3.0 / (kr * kr);
    let rr = rhat * rhat.transpose();
    (Matrix3::<f64>::identity().map(C64::from) * a + rr.map(C64::from) * b) * g
}

/// `Im G(r)`, regular at `r = 0` where it equals `k / (6 pi)` times the identity.
pub fn im_dyadic_green(r: &Vector3<f64>, k: f64) -> Matrix3<f64> {
    let rn = r.norm();
    let x = k * rn;
    let (a, b) = if x < SMALL_KR {
        let x2 = x * x;
        (2.0 / 3.0 - 2.0 * x2 / 15.0, x2 / 15.0)
    } else {
        let (s, c) = x.sin_cos();
        let j0 = s / x;
        let j2 = (3.0 / (x * x * x) - 1.0 / x) * s - 3.0 * c / (x * x);
        ((2.0 * j0 - j2) / 3.0, j2)
    };
    let rr = if rn > COINCIDENT {
        let rhat = r / rn;
        rhat * rhat.transpose()
    } else {
        Matrix3::zeros()
    };
    (Matrix3::identity() * a + rr * b) * (k / (4.0 * PI))
}

/// Field at displacement `r` from a point current element `u` (unit current moment).
///
/// `E = i k Z0 G(r) u`, `H = (ik - 1/r) g(r) rhat x u`. Returns zero at the source point.
pub fn dipole_field(r: &Vector3<f64>, u: &Vector3<f64>, k: f64) -> FieldSample {
    let rn = r.norm();
    if rn < COINCIDENT {
        return FieldSample::zero();
    }
    let uc: CVector3 = u.map(C64::from);
    let e = dyadic_green(r, k) * uc * (II * k * ZVAC);
    let rhat = r / rn;
    let g = (II * k * rn).exp() / (4.0 * PI * rn);
    let h = rhat.cross(u).map(C64::from) * ((II * k - 1.0 / rn) * g);
    FieldSample { e, h }
}

/// Radiation-reaction field a unit current element exerts on itself: `i k Z0 Im G(0) u`.
pub fn self_field_coefficient(k: f64) -> f64 {
    -k * k * ZVAC / (6.0 * PI)
}

/// Power radiated by a current moment of unit magnitude.
pub fn radiated_power_per_unit_moment(k: f64) -> f64 {
    ZVAC * k * k / (12.0 * PI)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-10;

    #[test]
    fn imaginary_part_matches_full_green_function() {
        let k = 1.7;
        for r in [Vector3::new(0.3, -0.4, 1.1), Vector3::new(2.0, 0.0, 0.0)] {
            let full = dyadic_green(&r, k).map(|z| z.im);
            let im = im_dyadic_green(&r, k);
            assert!((full - im).norm() < TOLERANCE);
        }
    }

    #[test]
    fn imaginary_part_is_regular_at_origin() {
        let k = 0.8;
        let at_origin = im_dyadic_green(&Vector3::zeros(), k);
        assert!((at_origin - Matrix3::identity() * (k / (6.0 * PI))).norm() < TOLERANCE);
        let nearby = im_dyadic_green(&Vector3::new(1e-5, 0.0, 0.0), k);
        assert!((at_origin - nearby).norm() < 1e-9);
    }

    #[test]
    fn far_field_is_transverse_and_impedance_matched() {
        let k = 2.0;
        let r = Vector3::new(0.0, 300.0, 0.0);
        let sample = dipole_field(&r, &Vector3::x(), k);
        let e_mag = sample.e.norm();
        let h_mag = sample.h.norm();
        assert!((e_mag / h_mag / ZVAC - 1.0).abs() < 1e-2);
        assert!(sample.e[1].norm() / e_mag < 1e-2);
    }

    #[test]
    fn green_function_is_symmetric_under_reflection() {
        let k = 1.2;
        let r = Vector3::new(0.5, 0.2, -0.3);
        let g_plus = dyadic_green(&r, k);
        let g_minus = dyadic_green(&(-r), k);
        assert!((g_plus - g_minus).norm() < TOLERANCE);
        assert!((g_plus - g_plus.transpose()).norm() < TOLERANCE);
    }
}
