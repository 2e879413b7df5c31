//! # Engine Module
//!
//! The stateful machinery that turns a geometry and a temperature profile into the flux
//! tensor at one frequency.
//!
//! ## Overview
//!
//! A [`context::FluxContext`] owns everything reused across frequencies: the matrix block
//! store, the Rytov workspace sized to the whole geometry, and the flux tensor layout. For each
//! frequency it assembles the material and fluctuation blocks once, then for every geometric
//! transform it rebuilds the interaction blocks, forms the Rytov matrix of each source object
//! and evaluates the power, force and torque on each destination.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Flux run and frequency integration settings with builders
//! - **Rytov Builder** ([`rytov`]) - Source-current correlation matrices from the block store
//! - **PFT Evaluators** ([`pft`]) - Overlap, current-displacement and displaced surface
//!   integral trace formulas
//! - **Flux Evaluation** ([`flux`]) - The per-frequency sweep and its output records
//! - **Flux Cache** ([`cache`]) - Reuse of flux records written by earlier runs
//! - **Quadrature** ([`quadrature`]) - Adaptive Gauss-Kronrod and trapezoid/Simpson rules
//! - **Progress Monitoring** ([`progress`]) - Progress events for front ends
//! - **Error Handling** ([`error`]) - Engine error types
//!
//! ## Key Capabilities
//!
//! - **Three independent trace formulas** whose agreement is a consistency check
//! - **Parallel assembly and reduction** behind the `parallel` feature
//! - **Record caching** so interrupted spectra and integrations resume cheaply
//! - **All-or-nothing output**: a frequency that fails leaves no partial records behind

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod flux;
pub mod pft;
pub mod progress;
pub mod quadrature;
pub(crate) mod reduce;
pub mod rytov;
