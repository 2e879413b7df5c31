use serde::Deserialize;
use std::f64::consts::PI;

use crate::core::fields::C64;

/// Dielectric response of a cluster's material.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum Material {
    /// Frequency-independent permittivity `[re, im]`.
    Constant { epsilon: [f64; 2] },
    /// `eps(w) = eps_inf - wp^2 / (w (w + i gamma))`, frequencies in `3e14 rad/s`.
    #[serde(rename_all = "kebab-case")]
    Drude {
        eps_inf: f64,
        omega_p: f64,
        gamma: f64,
    },
    /// Single-pole Lorentz oscillator on top of `eps_inf`.
    #[serde(rename_all = "kebab-case")]
    Lorentz {
        eps_inf: f64,
        strength: f64,
        omega_0: f64,
        gamma: f64,
    },
}

impl Material {
    pub fn epsilon(&self, omega: f64) -> C64 {
        match *self {
            Material::Constant { epsilon } => C64::new(epsilon[0], epsilon[1]),
            Material::Drude {
                eps_inf,
                omega_p,
                gamma,
            } => eps_inf - omega_p * omega_p / (omega * C64::new(omega, gamma)),
            Material::Lorentz {
                eps_inf,
                strength,
                omega_0,
                gamma,
            } => {
                eps_inf
                    + strength * omega_0 * omega_0
                        / C64::new(omega_0 * omega_0 - omega * omega, -gamma * omega)
            }
        }
    }
}

/// Polarizabilities of one lattice cell of volume `dv`, in volume units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Polarizability {
    /// Clausius-Mossotti polarizability.
    pub bare: C64,
    /// Including the radiation-reaction correction.
    pub dressed: C64,
}

impl Polarizability {
    pub fn new(epsilon: C64, dv: f64, k: f64) -> Self {
        let bare = 3.0 * dv * (epsilon - 1.0) / (epsilon + 2.0);
        let dressed = bare / (1.0 - C64::new(0.0, k * k * k / (6.0 * PI)) * bare);
        Self { bare, dressed }
    }

    /// `Im(-1 / alpha0)`, the dissipative part of the cell response. Zero for a cell with
    /// vanishing polarizability.
    pub fn loss(&self) -> f64 {
        if self.bare.norm() == 0.0 {
            return 0.0;
        }
        (-1.0 / self.bare).im
    }

    /// Absorption cross section `k |alpha|^2 Im(-1/alpha0)` of an isolated cell.
    pub fn absorption_cross_section(&self, k: f64) -> f64 {
        k * self.dressed.norm_sqr() * self.loss()
    }
}
