//! Trace formulas that turn a current correlation into power, force and torque.
//!
//! Three independent evaluators are provided. They agree wherever their domains overlap,
//! which makes them useful cross-checks of each other:
//!
//! - [`overlap`]: local overlap integrals of each destination's own basis functions (OPFT),
//!   plus the current-times-field torque.
//! - [`displacement`]: currents in the destination against the fields of every current
//!   (JDEPFT).
//! - [`dsi`]: Maxwell stress and Poynting flux through a surface enclosing the destination
//!   (DSIPFT), either from a single current vector or from a full Rytov matrix.

pub mod displacement;
pub mod dsi;
pub mod nmatrix;
pub mod overlap;

use crate::core::fields::C64;
use crate::core::geometry::{CMatrix, CVector};

/// What drives the currents whose PFT is evaluated.
#[derive(Debug, Clone, Copy)]
pub enum Excitation<'a> {
    /// A Rytov matrix `R_ab = <c_a conj(c_b)>`.
    Rytov(&'a CMatrix),
    /// A deterministic current vector, standing for the correlation `c c^H`.
    Current(&'a CVector),
}

impl Excitation<'_> {
    /// `X_ba = <c_b conj(c_a)>`.
    #[inline]
    pub fn correlation(&self, b: usize, a: usize) -> C64 {
        match self {
            Excitation::Rytov(r) => r[(b, a)],
            Excitation::Current(c) => c[b] * c[a].conj(),
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            Excitation::Rytov(r) => r.nrows(),
            Excitation::Current(c) => c.len(),
        }
    }

    pub fn current(&self) -> Option<&CVector> {
        match self {
            Excitation::Current(c) => Some(c),
            Excitation::Rytov(_) => None,
        }
    }
}
