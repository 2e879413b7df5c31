//! # Core Module
//!
//! Fundamental building blocks for non-equilibrium flux calculations.
//!
//! ## Overview
//!
//! Everything in this module is free of run state. It describes *what* is being computed
//! (quantities, transforms, cubature rules) and *who* supplies the electromagnetic
//! ingredients (the [`geometry::Geometry`] collaborator), but never drives a calculation.
//!
//! ## Architecture
//!
//! - **Quantities** ([`quantity`]) - The eight power/force/torque components and selections of them
//! - **Physics** ([`physics`]) - Unit conventions, vacuum impedance and the Bose-Einstein factor
//! - **Transforms** ([`transform`]) - Tagged rigid transformations applied to groups of objects
//! - **Fields** ([`fields`]) - E/H field samples and incident field sources
//! - **Cubature** ([`cubature`]) - Surface cubature rules for displaced surface integrals
//! - **Geometry** ([`geometry`]) - The matrix-block and field collaborator interface
//! - **Dipole Clusters** ([`dipole`]) - A concrete collaborator built from polarizable point sites
//! - **Flux Tensor** ([`tensor`]) - Layout of per-transform, per-pair quantity values
//! - **Records** ([`io`]) - Text formats for flux records and integrated results

pub mod cubature;
pub mod dipole;
pub mod fields;
pub mod geometry;
pub mod io;
pub mod physics;
pub mod quantity;
pub mod tensor;
pub mod transform;
