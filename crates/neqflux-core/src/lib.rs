//! # neqflux Core Library
//!
//! Spectral densities and frequency integrals of non-equilibrium power, force and torque
//! transfer between bodies held at different temperatures, computed from fluctuational
//! electrodynamics trace formulas.
//!
//! ## Architectural Philosophy
//!
//! The library keeps the same three-layer split used throughout the code base:
//!
//! - **[`core`]: The Foundation.** Stateless models: the PFT quantity set, geometric
//!   transforms, electromagnetic field samples, cubature rules, the [`core::geometry::Geometry`]
//!   collaborator trait with its point-dipole reference implementation, and the record
//!   formats written to disk.
//!
//! - **[`engine`]: The Logic Core.** The stateful machinery for one frequency: the matrix
//!   block store and Rytov workspace, the Rytov matrix builder, the three PFT trace
//!   evaluators (overlap, current-displacement, displaced surface integral), the flux cache
//!   and the per-frequency flux evaluation that ties them together.
//!
//! - **[`workflows`]: The Public API.** Complete procedures: evaluating spectra at a list of
//!   frequencies and integrating the flux tensor over frequency.

pub mod core;
pub mod engine;
pub mod workflows;
