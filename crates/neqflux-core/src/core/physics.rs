//! Unit conventions and physical constants.
//!
//! Angular frequencies are measured in units of `3e14 rad/s`, so that the free-space
//! wavenumber `k = Omega` comes out in inverse microns. Temperatures are in Kelvin.

use serde::Deserialize;

/// Impedance of free space in Ohms.
pub const ZVAC: f64 = 376.73031346177;

/// Momentum flux of one watt of radiation, in nanonewtons. Powers are reported in watts,
/// forces in nN and torques in nN um.
pub const FORCE_PER_WATT: f64 = 10.0 / 3.0;

/// Absolute permittivity of free space in the units above.
pub const EPS_ABS: f64 = FORCE_PER_WATT / ZVAC;

/// Absolute permeability of free space in the units above.
pub const MU_ABS: f64 = FORCE_PER_WATT * ZVAC;

pub const HBAR: f64 = 1.054571817e-34;

/// Boltzmann constant expressed as a frequency: `k_B * 1 K / (hbar * 3e14 rad/s)`.
pub const BOLTZMANN_K: f64 = 4.36763e-3;

/// Angular frequency unit in rad/s.
pub const OMEGA_UNIT_RAD_PER_SEC: f64 = 3.0e14;

/// `hbar * omega0^2` in watts, with `omega0` the frequency unit. Spectral densities are
/// reported per unit of dimensionless frequency, so integrating them over `Omega` yields
/// watts when fluctuation sources are scaled by this constant.
pub const SPECTRAL_POWER_UNIT: f64 = HBAR * OMEGA_UNIT_RAD_PER_SEC * OMEGA_UNIT_RAD_PER_SEC;

/// Mean energy of a harmonic oscillator at frequency `omega` and temperature `t`, without
/// the zero-point term, in units of `hbar * 3e14 rad/s`.
///
/// Returns zero at zero temperature and at non-positive frequency.
pub fn theta(omega: f64, t: f64) -> f64 {
    if t <= 0.0 || omega <= 0.0 {
        return 0.0;
    }
    omega / (omega / (BOLTZMANN_K * t)).exp_m1()
}

/// Object and environment temperatures.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TemperatureProfile {
    pub environment: f64,
    pub objects: Vec<f64>,
}

impl TemperatureProfile {
    pub fn uniform(num_objects: usize, object: f64, environment: f64) -> Self {
        Self {
            environment,
            objects: vec![object; num_objects],
        }
    }

    /// Temperature of object `index`; objects without an entry sit at the environment
    /// temperature.
    pub fn object(&self, index: usize) -> f64 {
        self.objects.get(index).copied().unwrap_or(self.environment)
    }

    /// `Theta(Omega, T_object) - Theta(Omega, T_environment)`: the weight with which an
    /// object's fluctuations drive a non-equilibrium flux.
    pub fn delta_theta(&self, index: usize, omega: f64) -> f64 {
        theta(omega, self.object(index)) - theta(omega, self.environment)
    }

    pub fn max(&self) -> f64 {
        self.objects
            .iter()
            .copied()
            .fold(self.environment, f64::max)
    }
}
