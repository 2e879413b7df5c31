use nalgebra::Point3;
use tracing::instrument;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::Excitation;
use super::overlap::check_excitation;
use crate::core::fields::IncidentField;
use crate::core::geometry::{Geometry, GeometryError};
use crate::core::quantity::Pft;
use crate::engine::error::EngineError;

/// Evaluates `PFT_d[q] = Re sum_{a in d, b} K_ab X_ba` for every destination object.
///
/// `torque_centers[d]` is the world-frame point about which destination `d`'s torque is
/// taken. The incident field contributes only together with a current excitation.
///
/// # Errors
///
/// Returns [`EngineError::DimensionMismatch`] for a mis-sized excitation or torque-centre
/// list, and any error the geometry raises while building kernels.
#[instrument(level = "debug", skip_all, name = "jdepft", fields(omega = omega))]
pub fn get_jdepft<G: Geometry + ?Sized>(
    geometry: &G,
    omega: f64,
    excitation: Excitation<'_>,
    incident: Option<&dyn IncidentField>,
    torque_centers: &[Point3<f64>],
) -> Result<Vec<Pft>, EngineError> {
    check_excitation(geometry, &excitation)?;
    let num_objects = geometry.num_objects();
    if torque_centers.len() != num_objects {
        return Err(EngineError::DimensionMismatch {
            what: "torque centres",
            expected: num_objects,
            found: torque_centers.len(),
        });
    }
    let destinations: Vec<usize> = (0..num_objects).collect();

    let evaluate = |&d: &usize| -> Result<Pft, GeometryError> {
        let center = &torque_centers[d];
        let kernels = geometry.displacement_kernels(d, omega, center)?;
        let mut pft = kernels.contract_pft(|b, a| excitation.correlation(b, a));
        if let (Some(field), Some(current)) = (incident, excitation.current()) {
            pft += geometry.incident_kernels(d, omega, field, center)?.contract(current);
        }
        Ok(pft)
    };

    #[cfg(feature = "parallel")]
    let iterator = destinations.par_iter();
    #[cfg(not(feature = "parallel"))]
    let iterator = destinations.iter();

    let results: Vec<Result<Pft, GeometryError>> = iterator.map(evaluate).collect();
    results
        .into_iter()
        .map(|r| r.map_err(EngineError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dipole::material::Material;
    use crate::core::dipole::{DipoleGeometry, DipoleObject};
    use crate::core::fields::{C64, CVector3, PlaneWave};
    use crate::core::geometry::CVector;
    use crate::core::quantity::Quantity;
    use crate::core::transform::translation;
    use crate::core::dipole::green::radiated_power_per_unit_moment;
    use nalgebra::Vector3;

    fn geometry() -> DipoleGeometry {
        let material = Material::Constant { epsilon: [4.0, 2.0] };
        DipoleGeometry::new(vec![
            DipoleObject::new("a", material.clone(), vec![Point3::origin(), Point3::new(0.15, 0.0, 0.0)], 0.002),
            DipoleObject::new("b", material, vec![Point3::origin()], 0.002)
                .at(translation(Vector3::new(0.0, 0.9, 0.0))),
        ])
        .unwrap()
    }

    fn centers(geometry: &DipoleGeometry) -> Vec<Point3<f64>> {
        (0..geometry.num_objects())
            .map(|o| geometry.object_pose(o) * Point3::origin())
            .collect()
    }

    #[test]
    fn lone_current_element_absorbs_minus_its_radiated_power() {
        let geometry = geometry();
        let omega = 0.7;
        let mut c = CVector::zeros(9);
        c[1] = C64::new(1.0, 0.0);
        let jde = get_jdepft(&geometry, omega, Excitation::Current(&c), None, &centers(&geometry)).unwrap();
        let radiated = radiated_power_per_unit_moment(omega);
        assert!((jde[0][Quantity::AbsorbedPower] + radiated).abs() < 1e-12 * radiated);
        assert_eq!(jde[1][Quantity::AbsorbedPower], 0.0);
        assert!((jde[0][Quantity::ScatteredPower] - radiated).abs() < 1e-9 * radiated);
    }

    #[test]
    fn incident_field_requires_a_current_excitation() {
        let geometry = geometry();
        let wave = PlaneWave::new(
            CVector3::new(C64::new(1.0, 0.0), C64::new(0.0, 0.0), C64::new(0.0, 0.0)),
            Vector3::z(),
        );
        let r = crate::core::geometry::CMatrix::zeros(9, 9);
        let with = get_jdepft(&geometry, 0.5, Excitation::Rytov(&r), Some(&wave), &centers(&geometry)).unwrap();
        assert!(with.iter().all(|p| *p == Pft::zero()));

        let c = CVector::from_element(9, C64::new(0.0, 0.0));
        let zero_current = get_jdepft(&geometry, 0.5, Excitation::Current(&c), Some(&wave), &centers(&geometry)).unwrap();
        assert!(zero_current.iter().all(|p| *p == Pft::zero()));
    }

    #[test]
    fn torque_centres_must_cover_every_object() {
        let geometry = geometry();
        let c = CVector::zeros(9);
        assert!(matches!(
            get_jdepft(&geometry, 0.5, Excitation::Current(&c), None, &[Point3::origin()]),
            Err(EngineError::DimensionMismatch { what: "torque centres", .. })
        ));
    }
}
