//! # Workflows Module
//!
//! Top-level entry points that drive the flux engine over frequency.
//!
//! ## Overview
//!
//! Each workflow validates its inputs, builds a [`crate::engine::context::FluxContext`] for
//! the run and reports progress through the caller's
//! [`crate::engine::progress::ProgressReporter`]. Per-frequency records and the flux cache
//! are written by the engine; the workflows add their own summary output.
//!
//! ## Architecture
//!
//! - **Spectrum Workflow** ([`spectrum`]) - Flux tensors at an explicit list of frequencies
//! - **Integration Workflow** ([`integrate`]) - Frequency-integrated flux tensor with error
//!   estimates, appended to `<base>.out`

pub mod integrate;
pub mod spectrum;
