//! Displaced-surface-integral PFT: Poynting flux and Maxwell stress through a closed
//! surface around the destination object.

use nalgebra::Point3;
use tracing::{debug, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::nmatrix::{NMatrices, hvmvp, n_matrices};
use crate::core::cubature::{CubatureError, CubatureProvider, CubatureRule, CubatureSource};
use crate::core::fields::{C64, FieldSample, IncidentField};
use crate::core::geometry::{CMatrix, CVector, Geometry, GeometryError};
use crate::core::physics::{EPS_ABS, MU_ABS};
use crate::core::quantity::{NUM_PFT, Pft, Quantity};
use crate::engine::error::EngineError;
use crate::engine::reduce::parallel_reduce;

/// A cubature rule around one destination together with its torque centre, both in world
/// coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct DsiSurface {
    pub rule: CubatureRule,
    pub torque_center: Point3<f64>,
}

impl DsiSurface {
    /// Places `source` and the body-frame torque centre at the current pose of
    /// `destination`.
    pub fn for_destination<G: Geometry + ?Sized>(
        geometry: &G,
        cubature: &dyn CubatureProvider,
        source: &CubatureSource,
        destination: usize,
        torque_center: &Point3<f64>,
    ) -> Result<Self, EngineError> {
        if geometry.num_objects() == 0 {
            return Err(GeometryError::NoObjects.into());
        }
        if destination >= geometry.num_objects() {
            return Err(GeometryError::ObjectOutOfRange {
                index: destination,
                count: geometry.num_objects(),
            }
            .into());
        }
        let pose = geometry.object_pose(destination);
        let rule = cubature.rule(source, &pose)?;
        Ok(Self {
            rule,
            torque_center: pose * torque_center,
        })
    }

    fn projectors(&self, index: usize) -> (f64, NMatrices) {
        let p = &self.rule.points[index];
        (p.w, n_matrices(&p.n, &(p.x - self.torque_center)))
    }

    fn check(&self) -> Result<(), EngineError> {
        if self.rule.is_empty() {
            return Err(CubatureError::EmptyRule.into());
        }
        Ok(())
    }
}

type Accumulator = [C64; NUM_PFT];

fn zero_accumulator() -> Accumulator {
    [C64::new(0.0, 0.0); NUM_PFT]
}

fn merge(mut a: Accumulator, b: Accumulator) -> Accumulator {
    for (x, y) in a.iter_mut().zip(b) {
        *x += y;
    }
    a
}

fn finish(acc: Accumulator) -> Pft {
    Pft(acc.map(|z| z.re))
}

/// Adds `w/4 J (<E_a,N,H_b> - <H_a,N,E_b>)` to the absorbed power (with a minus sign) and
/// the matching stress terms to force and torque.
#[inline]
fn accumulate_pair(acc: &mut Accumulator, w: f64, n: &NMatrices, j: C64, fa: &FieldSample, fb: &FieldSample) {
    let weight = j * (0.25 * w);
    acc[Quantity::AbsorbedPower.index()] -= weight * (hvmvp(&fa.e, &n.power, &fb.h) - hvmvp(&fa.h, &n.power, &fb.e));
    for (i, q) in Quantity::FORCES.iter().enumerate() {
        acc[q.index()] += weight * (hvmvp(&fa.e, &n.force[i], &fb.e) * EPS_ABS + hvmvp(&fa.h, &n.force[i], &fb.h) * MU_ABS);
    }
    for (mu, q) in Quantity::TORQUES.iter().enumerate() {
        acc[q.index()] += weight * (hvmvp(&fa.e, &n.torque[mu], &fb.e) * EPS_ABS + hvmvp(&fa.h, &n.torque[mu], &fb.h) * MU_ABS);
    }
}

/// PFT of a deterministic current distribution, optionally illuminated by an incident field.
///
/// Absorbed power, force and torque use the total field; scattered power uses the field
/// radiated by `current` alone.
#[instrument(level = "debug", skip_all, name = "dsipft", fields(omega = omega, points = surface.rule.len()))]
pub fn get_dsipft_direct<G: Geometry + ?Sized>(
    geometry: &G,
    omega: f64,
    surface: &DsiSurface,
    current: &CVector,
    incident: Option<&dyn IncidentField>,
) -> Result<Pft, EngineError> {
    surface.check()?;
    if current.len() != geometry.total_basis_functions() {
        return Err(EngineError::DimensionMismatch {
            what: "current vector",
            expected: geometry.total_basis_functions(),
            found: current.len(),
        });
    }
    let points: Vec<Point3<f64>> = surface.rule.points.iter().map(|p| p.x).collect();
    let scattered = geometry.fields(None, Some(current), omega, &points);
    let total = match incident {
        Some(field) => geometry.fields(Some(field), Some(current), omega, &points),
        None => scattered.clone(),
    };

    let acc = parallel_reduce(
        0..points.len(),
        zero_accumulator,
        |mut acc, p| {
            let (w, n) = surface.projectors(p);
            let (t, s) = (&total[p], &scattered[p]);
            accumulate_pair(&mut acc, w, &n, C64::new(1.0, 0.0), t, t);
            acc[Quantity::ScatteredPower.index()] +=
                (hvmvp(&s.e, &n.power, &s.h) - hvmvp(&s.h, &n.power, &s.e)) * (0.25 * w);
            acc
        },
        merge,
    );
    Ok(finish(acc))
}

/// PFT of the fluctuating currents described by `rytov`, by the trace formula.
///
/// Every single-basis-function field is evaluated once at every cubature point; each
/// unordered basis pair then contributes its bilinear and, off the diagonal, the mirrored
/// term with the conjugate correlation. Scattered power is not defined here and is zero.
#[instrument(level = "debug", skip_all, name = "dsipft_trace", fields(omega = omega, points = surface.rule.len()))]
pub fn get_dsipft_trace<G: Geometry + ?Sized>(
    geometry: &G,
    omega: f64,
    surface: &DsiSurface,
    rytov: &CMatrix,
) -> Result<Pft, EngineError> {
    surface.check()?;
    let nbf = geometry.total_basis_functions();
    if rytov.nrows() != nbf || rytov.ncols() != nbf {
        return Err(EngineError::DimensionMismatch {
            what: "Rytov matrix",
            expected: nbf,
            found: rytov.nrows(),
        });
    }
    let nx = surface.rule.len();
    let basis: Vec<(usize, usize)> = (0..nbf)
        .map(|n| {
            geometry
                .resolve_basis(n)
                .ok_or_else(|| EngineError::Internal(format!("basis function {} has no owner", n)))
        })
        .collect::<Result<_, _>>()?;

    debug!(points = nx, basis_functions = nbf, "Precomputing single-basis-function fields");
    let field_at = |index: usize| {
        let (p, n) = (index / nbf, index % nbf);
        let (object, local) = basis[n];
        geometry.basis_field(object, local, omega, &surface.rule.points[p].x)
    };
    #[cfg(feature = "parallel")]
    let fields: Vec<FieldSample> = (0..nx * nbf).into_par_iter().map(field_at).collect();
    #[cfg(not(feature = "parallel"))]
    let fields: Vec<FieldSample> = (0..nx * nbf).map(field_at).collect();

    let acc = parallel_reduce(
        0..nx * nbf,
        zero_accumulator,
        |mut acc, index| {
            let (p, a) = (index / nbf, index % nbf);
            let (w, n) = surface.projectors(p);
            let row = &fields[p * nbf..(p + 1) * nbf];
            let fa = &row[a];
            for b in a..nbf {
                let j = rytov[(b, a)];
                if j == C64::new(0.0, 0.0) {
                    continue;
                }
                let fb = &row[b];
                accumulate_pair(&mut acc, w, &n, j, fa, fb);
                if b > a {
                    accumulate_pair(&mut acc, w, &n, j.conj(), fb, fa);
                }
            }
            acc
        },
        merge,
    );
    Ok(finish(acc))
}
