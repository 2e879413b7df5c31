use tracing::instrument;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::Excitation;
use crate::core::geometry::{Geometry, GeometryError};
use crate::core::quantity::Pft;
use crate::engine::error::EngineError;

/// Overlap PFT of every destination, with the current-times-field torque alongside.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapPft {
    pub pft: Vec<Pft>,
    pub jxe_torque: Vec<[f64; 3]>,
}

/// Evaluates `PFT_d[q] = Re sum_{a,b in d} Q_ab X_ba` for every destination object.
///
/// # Errors
///
/// Returns [`EngineError::DimensionMismatch`] when the excitation does not span every basis
/// function, and any error the geometry raises while building kernels.
#[instrument(level = "debug", skip_all, name = "opft", fields(omega = omega))]
pub fn get_opft<G: Geometry + ?Sized>(
    geometry: &G,
    omega: f64,
    excitation: Excitation<'_>,
) -> Result<OverlapPft, EngineError> {
    check_excitation(geometry, &excitation)?;
    let destinations: Vec<usize> = (0..geometry.num_objects()).collect();

    let evaluate = |&d: &usize| -> Result<(Pft, [f64; 3]), GeometryError> {
        let overlap = geometry.overlap_kernels(d, omega)?;
        let torque = geometry.jxe_torque_kernels(d, omega)?;
        let x = |b, a| excitation.correlation(b, a);
        Ok((overlap.contract_pft(x), torque.contract(x)))
    };

    #[cfg(feature = "parallel")]
    let iterator = destinations.par_iter();
    #[cfg(not(feature = "parallel"))]
    let iterator = destinations.iter();

    let results: Vec<Result<_, GeometryError>> = iterator.map(evaluate).collect();

    let mut pft = Vec::with_capacity(results.len());
    let mut jxe_torque = Vec::with_capacity(results.len());
    for result in results {
        let (p, t) = result?;
        pft.push(p);
        jxe_torque.push(t);
    }
    Ok(OverlapPft { pft, jxe_torque })
}

pub(crate) fn check_excitation<G: Geometry + ?Sized>(
    geometry: &G,
    excitation: &Excitation<'_>,
) -> Result<(), EngineError> {
    let expected = geometry.total_basis_functions();
    let found = excitation.dimension();
    if expected != found {
        return Err(EngineError::DimensionMismatch {
            what: "excitation",
            expected,
            found,
        });
    }
    if let Excitation::Rytov(r) = excitation {
        if r.ncols() != expected {
            return Err(EngineError::DimensionMismatch {
                what: "Rytov matrix columns",
                expected,
                found: r.ncols(),
            });
        }
    }
    Ok(())
}
