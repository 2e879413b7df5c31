use nalgebra::{Point3, Vector3};
use num_complex::Complex64;
use std::ops::{Add, AddAssign};

use super::physics::ZVAC;

pub type C64 = Complex64;
pub type CVector3 = Vector3<Complex64>;

/// Electric and magnetic field at one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSample {
    pub e: CVector3,
    pub h: CVector3,
}

impl FieldSample {
    pub fn zero() -> Self {
        Self {
            e: CVector3::zeros(),
            h: CVector3::zeros(),
        }
    }

    pub fn scale(&self, factor: C64) -> Self {
        Self {
            e: self.e * factor,
            h: self.h * factor,
        }
    }
}

impl Default for FieldSample {
    fn default() -> Self {
        Self::zero()
    }
}

impl Add for FieldSample {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            e: self.e + rhs.e,
            h: self.h + rhs.h,
        }
    }
}

impl AddAssign for FieldSample {
    fn add_assign(&mut self, rhs: Self) {
        self.e += rhs.e;
        self.h += rhs.h;
    }
}

/// A field impinging on the geometry from outside.
pub trait IncidentField: Sync {
    fn fields(&self, x: &Point3<f64>, omega: f64) -> FieldSample;
}

/// A linearly polarized plane wave `E0 exp(i k nHat . x)` in vacuum.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneWave {
    pub e0: CVector3,
    pub direction: Vector3<f64>,
}

impl PlaneWave {
    pub fn new(e0: CVector3, direction: Vector3<f64>) -> Self {
        Self {
            e0,
            direction: direction.normalize(),
        }
    }
}

impl IncidentField for PlaneWave {
    fn fields(&self, x: &Point3<f64>, omega: f64) -> FieldSample {
        let k = omega;
        let phase = C64::new(0.0, k * self.direction.dot(&x.coords)).exp();
        let e = self.e0 * phase;
        let n = self.direction.map(C64::from);
        let h = n.cross(&e) / C64::from(ZVAC);
        FieldSample { e, h }
    }
}
