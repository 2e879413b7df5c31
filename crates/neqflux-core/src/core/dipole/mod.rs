//! Rigid clusters of polarizable point dipoles.
//!
//! Each lattice site of an object carries three basis functions, point current elements
//! along the object's body-fixed axes. Basis function `3 s + d` of an object is the
//! element of site `s` along body axis `d`. The sites respond with a Clausius-Mossotti
//! polarizability including radiation reaction, and fluctuate according to the
//! fluctuation-dissipation theorem. Because the basis directions rotate with the body,
//! self-interaction blocks are the same for every rigid placement of an object.

pub mod green;
pub mod material;

use nalgebra::{Isometry3, Matrix3, Point3, Translation3, Unit, UnitQuaternion, Vector3};
use serde::Deserialize;
use std::f64::consts::PI;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use self::green::{dipole_field, dyadic_green, im_dyadic_green, self_field_coefficient};
use self::material::{Material, Polarizability};
use super::fields::{C64, CVector3, FieldSample, IncidentField};
use super::geometry::{
    CMatrix, Geometry, GeometryError, IncidentKernels, OverlapBlocks, PftKernels, TorqueKernels,
};
use super::physics::{FORCE_PER_WATT, SPECTRAL_POWER_UNIT, TemperatureProfile, ZVAC};
use super::quantity::Quantity;
use super::transform::GTComplex;

const II: C64 = C64::new(0.0, 1.0);
const DIRECTIONS: usize = 3;

/// Relative finite-difference step for gradients of inter-site fields.
const GRADIENT_STEP: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq)]
pub struct DipoleObject {
    pub label: String,
    pub material: Material,
    /// Site positions in the body frame.
    pub sites: Vec<Point3<f64>>,
    pub cell_volume: f64,
    /// Reference placement of the body frame.
    pub pose: Isometry3<f64>,
}

impl DipoleObject {
    pub fn new(
        label: impl Into<String>,
        material: Material,
        sites: Vec<Point3<f64>>,
        cell_volume: f64,
    ) -> Self {
        Self {
            label: label.into(),
            material,
            sites,
            cell_volume,
            pose: Isometry3::identity(),
        }
    }

    /// Cubic lattice points with spacing `spacing` inside a ball of radius `radius`.
    pub fn sphere(label: impl Into<String>, material: Material, radius: f64, spacing: f64) -> Self {
        let n = (radius / spacing).floor() as i64;
        let mut sites = Vec::new();
        for i in -n..=n {
            for j in -n..=n {
                for k in -n..=n {
                    let p = Point3::new(i as f64, j as f64, k as f64) * spacing;
                    if p.coords.norm() <= radius * (1.0 + 1e-9) {
                        sites.push(p);
                    }
                }
            }
        }
        if sites.is_empty() {
            sites.push(Point3::origin());
        }
        Self::new(label, material, sites, spacing.powi(3))
    }

    pub fn at(mut self, pose: Isometry3<f64>) -> Self {
        self.pose = pose;
        self
    }

    pub fn num_sites(&self) -> usize {
        self.sites.len()
    }

    fn same_body(&self, other: &DipoleObject) -> bool {
        self.material == other.material
            && self.cell_volume == other.cell_volume
            && self.sites == other.sites
    }

    fn validate(&self) -> Result<(), GeometryError> {
        let invalid = |message: &str| GeometryError::InvalidObject {
            label: self.label.clone(),
            message: message.to_string(),
        };
        if self.sites.is_empty() {
            return Err(invalid("object has no sites"));
        }
        if !(self.cell_volume > 0.0) {
            return Err(invalid("cell volume must be positive"));
        }
        for (i, a) in self.sites.iter().enumerate() {
            if self.sites[..i]
                .iter()
                .any(|b| (a - b).norm() < green::COINCIDENT)
            {
                return Err(invalid("two sites coincide"));
            }
        }
        Ok(())
    }
}

/// A world-frame basis function: position and current direction.
#[derive(Debug, Clone, Copy)]
struct BasisFrame {
    object: usize,
    site: usize,
    x: Point3<f64>,
    u: Vector3<f64>,
}

#[derive(Debug, Clone)]
pub struct DipoleGeometry {
    objects: Vec<DipoleObject>,
    poses: Vec<Isometry3<f64>>,
    offsets: Vec<usize>,
    mates: Vec<Option<usize>>,
    total: usize,
}

impl DipoleGeometry {
    pub fn new(objects: Vec<DipoleObject>) -> Result<Self, GeometryError> {
        if objects.is_empty() {
            return Err(GeometryError::NoObjects);
        }
        for (i, object) in objects.iter().enumerate() {
            object.validate()?;
            if objects[..i].iter().any(|o| o.label == object.label) {
                return Err(GeometryError::DuplicateLabel(object.label.clone()));
            }
        }

        let mut offsets = Vec::with_capacity(objects.len());
        let mut total = 0;
        for object in &objects {
            offsets.push(total);
            total += DIRECTIONS * object.num_sites();
        }

        let mates: Vec<Option<usize>> = (0..objects.len())
            .map(|i| (0..i).find(|&j| objects[j].same_body(&objects[i])))
            .collect();

        for (i, mate) in mates.iter().enumerate() {
            if let Some(j) = mate {
                debug!(object = %objects[i].label, mate = %objects[*j].label, "Object is identical to an earlier one");
            }
        }

        info!(
            objects = objects.len(),
            basis_functions = total,
            "Dipole geometry assembled"
        );

        Ok(Self {
            poses: objects.iter().map(|o| o.pose).collect(),
            objects,
            offsets,
            mates,
            total,
        })
    }

    pub fn from_spec(spec: GeometrySpec) -> Result<Self, GeometryError> {
        let objects = spec
            .objects
            .into_iter()
            .map(ObjectSpec::into_object)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(objects)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, GeometryError> {
        let spec: GeometrySpec = toml::from_str(content)?;
        Self::from_spec(spec)
    }

    pub fn load(path: &Path) -> Result<Self, GeometryError> {
        let content = fs::read_to_string(path).map_err(|e| GeometryError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn objects(&self) -> &[DipoleObject] {
        &self.objects
    }

    fn check(&self, object: usize) -> Result<&DipoleObject, GeometryError> {
        self.objects
            .get(object)
            .ok_or(GeometryError::ObjectOutOfRange {
                index: object,
                count: self.objects.len(),
            })
    }

    fn polarizability(&self, object: usize, omega: f64) -> Polarizability {
        let o = &self.objects[object];
        Polarizability::new(o.material.epsilon(omega), o.cell_volume, omega)
    }

    fn frame(&self, object: usize, local: usize) -> BasisFrame {
        let site = local / DIRECTIONS;
        let dir = local % DIRECTIONS;
        let pose = &self.poses[object];
        BasisFrame {
            object,
            site,
            x: pose.transform_point(&self.objects[object].sites[site]),
            u: pose.rotation * Vector3::ith(dir, 1.0),
        }
    }

    fn frames(&self, object: usize) -> Vec<BasisFrame> {
        (0..DIRECTIONS * self.objects[object].num_sites())
            .map(|l| self.frame(object, l))
            .collect()
    }

    fn all_frames(&self) -> Vec<BasisFrame> {
        (0..self.objects.len()).flat_map(|o| self.frames(o)).collect()
    }

    fn same_site(a: &BasisFrame, b: &BasisFrame) -> bool {
        a.object == b.object && a.site == b.site
    }

    /// Electric field of `b` at `x` and its derivative along each Cartesian axis.
    fn field_and_gradient(b: &BasisFrame, x: &Point3<f64>, k: f64) -> (CVector3, [CVector3; 3]) {
        let r = x - b.x;
        let h = GRADIENT_STEP * r.norm();
        let e = dipole_field(&r, &b.u, k).e;
        let grad = std::array::from_fn(|axis| {
            let step = Vector3::ith(axis, h);
            let plus = dipole_field(&(r + step), &b.u, k).e;
            let minus = dipole_field(&(r - step), &b.u, k).e;
            (plus - minus) / C64::from(2.0 * h)
        });
        (e, grad)
    }
}

fn complexify(v: &Vector3<f64>) -> CVector3 {
    v.map(C64::from)
}

/// Pushes the force and torque kernels of a field and its gradient acting on element `a`.
fn push_mechanical(
    kernels: &mut PftKernels,
    (a, b): (usize, usize),
    ua: &CVector3,
    e: &CVector3,
    grad: Option<&[CVector3; 3]>,
    lever: &Vector3<f64>,
    coef: C64,
) {
    let force = match grad {
        Some(grad) => CVector3::from_fn(|axis, _| ua.dot(&grad[axis]) * coef),
        None => CVector3::zeros(),
    };
    let spin = ua.cross(e) * coef;
    let torque = spin + complexify(lever).cross(&force);
    for (axis, q) in Quantity::FORCES.iter().enumerate() {
        kernels.push_quantity(*q, a, b, force[axis]);
    }
    for (axis, q) in Quantity::TORQUES.iter().enumerate() {
        kernels.push_quantity(*q, a, b, torque[axis]);
    }
}

impl Geometry for DipoleGeometry {
    fn num_objects(&self) -> usize {
        self.objects.len()
    }

    fn label(&self, object: usize) -> &str {
        &self.objects[object].label
    }

    fn num_basis_functions(&self, object: usize) -> usize {
        DIRECTIONS * self.objects[object].num_sites()
    }

    fn basis_offset(&self, object: usize) -> usize {
        self.offsets[object]
    }

    fn total_basis_functions(&self) -> usize {
        self.total
    }

    fn mate(&self, object: usize) -> Option<usize> {
        self.mates.get(object).copied().flatten()
    }

    fn apply_transform(&mut self, transform: &GTComplex) -> Result<(), GeometryError> {
        self.revert_transform();
        for m in &transform.moves {
            let index = self
                .object_index(&m.label)
                .ok_or_else(|| GeometryError::UnknownLabel(m.label.clone()))?;
            self.poses[index] = m.motion * self.objects[index].pose;
        }
        Ok(())
    }

    fn revert_transform(&mut self) {
        for (pose, object) in self.poses.iter_mut().zip(&self.objects) {
            *pose = object.pose;
        }
    }

    fn object_pose(&self, object: usize) -> Isometry3<f64> {
        self.poses[object]
    }

    fn assemble_overlap_blocks(
        &self,
        object: usize,
        omega: f64,
        temperatures: &TemperatureProfile,
    ) -> Result<OverlapBlocks, GeometryError> {
        let o = self.check(object)?;
        let k = omega;
        let alpha = self.polarizability(object, omega);
        let dv2 = o.cell_volume * o.cell_volume;

        let response = II * k * alpha.dressed / ZVAC;
        let strength = 4.0 * SPECTRAL_POWER_UNIT * temperatures.delta_theta(object, omega) * k
            * alpha.dressed.norm_sqr()
            * alpha.loss()
            / (PI * ZVAC);

        let n = self.num_basis_functions(object);
        Ok(OverlapBlocks {
            v: CMatrix::from_diagonal_element(n, n, response * dv2),
            sigma: CMatrix::from_diagonal_element(n, n, C64::from(strength * dv2)),
        })
    }

    fn assemble_g_block(&self, a: usize, b: usize, omega: f64) -> Result<CMatrix, GeometryError> {
        let oa = self.check(a)?;
        let ob = self.check(b)?;
        let k = omega;
        let ra = self.poses[a].rotation.to_rotation_matrix().into_inner();
        let rb = self.poses[b].rotation.to_rotation_matrix().into_inner();
        let ra_t = ra.transpose().map(C64::from);
        let rb = rb.map(C64::from);
        let prefactor = II * k * ZVAC;

        let mut block = CMatrix::zeros(self.num_basis_functions(a), self.num_basis_functions(b));
        for (sa, pa) in oa.sites.iter().enumerate() {
            let xa = self.poses[a].transform_point(pa);
            for (sb, pb) in ob.sites.iter().enumerate() {
                if a == b && sa == sb {
                    continue;
                }
                let xb = self.poses[b].transform_point(pb);
                let g: Matrix3<C64> = ra_t * dyadic_green(&(xa - xb), k) * rb * prefactor;
                block
                    .view_mut((DIRECTIONS * sa, DIRECTIONS * sb), (DIRECTIONS, DIRECTIONS))
                    .copy_from(&g);
            }
        }
        Ok(block)
    }

    fn assemble_system_inverse(&self, _omega: f64) -> Result<CMatrix, GeometryError> {
        let diagonal = nalgebra::DVector::from_iterator(
            self.total,
            self.objects.iter().flat_map(|o| {
                std::iter::repeat_n(C64::from(1.0 / o.cell_volume), DIRECTIONS * o.num_sites())
            }),
        );
        Ok(CMatrix::from_diagonal(&diagonal))
    }

    fn basis_field(&self, object: usize, basis: usize, omega: f64, x: &Point3<f64>) -> FieldSample {
        let frame = self.frame(object, basis);
        dipole_field(&(x - frame.x), &frame.u, omega)
    }

    fn overlap_kernels(&self, object: usize, omega: f64) -> Result<PftKernels, GeometryError> {
        self.check(object)?;
        let k = omega;
        let alpha = self.polarizability(object, omega);
        let offset = self.offsets[object];
        let frames = self.frames(object);

        let absorption = C64::from(0.5 * ZVAC / k * alpha.loss());
        let spin = if alpha.bare.norm() > 0.0 {
            FORCE_PER_WATT * ZVAC / (2.0 * k * k * alpha.bare)
        } else {
            C64::new(0.0, 0.0)
        };

        let mut kernels = PftKernels::new();
        for (la, fa) in frames.iter().enumerate() {
            for (lb, fb) in frames.iter().enumerate() {
                if !Self::same_site(fa, fb) {
                    continue;
                }
                let (a, b) = (offset + la, offset + lb);
                if la == lb {
                    kernels.push_quantity(Quantity::AbsorbedPower, a, b, absorption);
                }
                let axis = fa.u.cross(&fb.u);
                for (mu, q) in Quantity::TORQUES.iter().enumerate() {
                    kernels.push_quantity(*q, a, b, spin * axis[mu]);
                }
            }
        }
        Ok(kernels)
    }

    fn jxe_torque_kernels(&self, object: usize, omega: f64) -> Result<TorqueKernels, GeometryError> {
        self.check(object)?;
        let k = omega;
        let coef = FORCE_PER_WATT / (2.0 * II * k);
        let offset = self.offsets[object];
        let all = self.all_frames();

        let mut kernels = TorqueKernels::new();
        for (la, fa) in self.frames(object).iter().enumerate() {
            let ua = complexify(&fa.u);
            for (b, fb) in all.iter().enumerate() {
                if Self::same_site(fa, fb) {
                    continue;
                }
                let e = dipole_field(&(fa.x - fb.x), &fb.u, k).e;
                let torque = ua.cross(&e) * coef;
                for mu in 0..3 {
                    kernels.push(mu, offset + la, b, torque[mu]);
                }
            }
        }
        Ok(kernels)
    }

    fn displacement_kernels(
        &self,
        object: usize,
        omega: f64,
        torque_center: &Point3<f64>,
    ) -> Result<PftKernels, GeometryError> {
        self.check(object)?;
        let k = omega;
        let offset = self.offsets[object];
        let all = self.all_frames();
        let self_field = self_field_coefficient(k);
        let coef = FORCE_PER_WATT / (2.0 * II * k);

        let mut kernels = PftKernels::new();
        for (la, fa) in self.frames(object).iter().enumerate() {
            let a = offset + la;
            let ua = complexify(&fa.u);
            let lever = fa.x - torque_center;
            for (b, fb) in all.iter().enumerate() {
                let (e, grad) = if Self::same_site(fa, fb) {
                    (complexify(&fb.u) * C64::from(self_field), None)
                } else {
                    let (e, grad) = Self::field_and_gradient(fb, &fa.x, k);
                    (e, Some(grad))
                };
                kernels.push_quantity(Quantity::AbsorbedPower, a, b, ua.dot(&e) * 0.5);
                push_mechanical(&mut kernels, (a, b), &ua, &e, grad.as_ref(), &lever, coef);

                if fb.object == object {
                    let im_g = im_dyadic_green(&(fa.x - fb.x), k);
                    let value = 0.5 * k * ZVAC * fa.u.dot(&(im_g * fb.u));
                    kernels.push_quantity(Quantity::ScatteredPower, a, b, C64::from(value));
                }
            }
        }
        Ok(kernels)
    }

    fn incident_kernels(
        &self,
        object: usize,
        omega: f64,
        incident: &dyn IncidentField,
        torque_center: &Point3<f64>,
    ) -> Result<IncidentKernels, GeometryError> {
        self.check(object)?;
        let k = omega;
        let coef = FORCE_PER_WATT / (2.0 * II * k);
        let h = GRADIENT_STEP * 2.0 * PI / k;
        let offset = self.offsets[object];

        let mut kernels = IncidentKernels::new();
        for (la, fa) in self.frames(object).iter().enumerate() {
            let a = offset + la;
            let ua = complexify(&fa.u);
            let e = incident.fields(&fa.x, omega).e;
            let force = CVector3::from_fn(|axis, _| {
                let step = Vector3::ith(axis, h);
                let plus = incident.fields(&(fa.x + step), omega).e;
                let minus = incident.fields(&(fa.x - step), omega).e;
                ua.dot(&((plus - minus) / C64::from(2.0 * h))) * coef
            });
            let torque = ua.cross(&e) * coef + complexify(&(fa.x - torque_center)).cross(&force);

            kernels.push(Quantity::AbsorbedPower, a, ua.dot(&e) * 0.5);
            for (axis, q) in Quantity::FORCES.iter().enumerate() {
                kernels.push(*q, a, force[axis]);
            }
            for (axis, q) in Quantity::TORQUES.iter().enumerate() {
                kernels.push(*q, a, torque[axis]);
            }
        }
        Ok(kernels)
    }
}

/// TOML description of a dipole geometry: a list of `[[object]]` tables.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct GeometrySpec {
    #[serde(rename = "object")]
    pub objects: Vec<ObjectSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ObjectSpec {
    pub label: String,
    pub material: Material,
    pub shape: ShapeSpec,
    #[serde(default)]
    pub position: [f64; 3],
    #[serde(default)]
    pub rotation_axis: Option<[f64; 3]>,
    #[serde(default)]
    pub rotation_angle: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum ShapeSpec {
    Sphere {
        radius: f64,
        spacing: f64,
    },
    #[serde(rename_all = "kebab-case")]
    Sites {
        positions: Vec<[f64; 3]>,
        cell_volume: f64,
    },
}

impl ObjectSpec {
    fn into_object(self) -> Result<DipoleObject, GeometryError> {
        let label = self.label;
        let object = match self.shape {
            ShapeSpec::Sphere { radius, spacing } => {
                if !(radius > 0.0 && spacing > 0.0) {
                    return Err(GeometryError::InvalidObject {
                        label,
                        message: "sphere radius and spacing must be positive".to_string(),
                    });
                }
                DipoleObject::sphere(label, self.material, radius, spacing)
            }
            ShapeSpec::Sites {
                positions,
                cell_volume,
            } => DipoleObject::new(
                label,
                self.material,
                positions.into_iter().map(Point3::from).collect(),
                cell_volume,
            ),
        };

        let rotation = match self.rotation_angle {
            Some(angle) => {
                let axis = self.rotation_axis.map(Vector3::from).unwrap_or_else(Vector3::z);
                let axis = Unit::try_new(axis, 1e-12).ok_or_else(|| GeometryError::InvalidObject {
                    label: object.label.clone(),
                    message: "rotation axis must be non-zero".to_string(),
                })?;
                UnitQuaternion::from_axis_angle(&axis, angle.to_radians())
            }
            None => UnitQuaternion::identity(),
        };
        let pose = Isometry3::from_parts(Translation3::from(Vector3::from(self.position)), rotation);
        Ok(object.at(pose))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fields::PlaneWave;
    use crate::core::transform::{rotation, translation};

    const TOLERANCE: f64 = 1e-9;

    fn lossy() -> Material {
        Material::Constant {
            epsilon: [3.0, 1.5],
        }
    }

    fn pair() -> DipoleGeometry {
        DipoleGeometry::new(vec![
            DipoleObject::new("A", lossy(), vec![Point3::origin()], 0.01),
            DipoleObject::new("B", lossy(), vec![Point3::origin()], 0.01)
                .at(translation(Vector3::new(0.0, 0.0, 1.5))),
        ])
        .unwrap()
    }

    #[test]
    fn sphere_lattice_is_symmetric_and_sized() {
        let obj = DipoleObject::sphere("S", lossy(), 0.25, 0.1);
        assert_eq!(obj.cell_volume, 0.1f64.powi(3));
        let centroid = obj.sites.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords);
        assert!(centroid.norm() < TOLERANCE);
        assert!(obj.sites.iter().all(|p| p.coords.norm() <= 0.25 + 1e-12));
        assert_eq!(obj.num_sites(), 81);
    }

    #[test]
    fn identical_bodies_are_mated_regardless_of_pose() {
        let geometry = pair();
        assert_eq!(geometry.mate(0), None);
        assert_eq!(geometry.mate(1), Some(0));
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let result = DipoleGeometry::new(vec![
            DipoleObject::new("A", lossy(), vec![Point3::origin()], 0.01),
            DipoleObject::new("A", lossy(), vec![Point3::origin()], 0.01),
        ]);
        assert!(matches!(result, Err(GeometryError::DuplicateLabel(_))));
    }

    #[test]
    fn g_blocks_are_reciprocal() {
        let geometry = DipoleGeometry::new(vec![
            DipoleObject::sphere("A", lossy(), 0.1, 0.1),
            DipoleObject::sphere("B", lossy(), 0.1, 0.1)
                .at(rotation(Vector3::new(1.0, 1.0, 0.0), 30.0).unwrap() * translation(Vector3::new(0.0, 0.4, 1.0))),
        ])
        .unwrap();
        let gab = geometry.assemble_g_block(0, 1, 0.8).unwrap();
        let gba = geometry.assemble_g_block(1, 0, 0.8).unwrap();
        assert!((gab - gba.transpose()).norm() < TOLERANCE);
    }

    #[test]
    fn self_block_is_invariant_under_rigid_motion() {
        let mut geometry = DipoleGeometry::new(vec![DipoleObject::sphere("A", lossy(), 0.2, 0.1)]).unwrap();
        let before = geometry.assemble_g_block(0, 0, 1.1).unwrap();
        let gtc = GTComplex::identity("moved").with_move(
            "A",
            rotation(Vector3::new(0.3, -1.0, 0.2), 71.0).unwrap() * translation(Vector3::new(1.0, 2.0, 3.0)),
        );
        geometry.apply_transform(&gtc).unwrap();
        let after = geometry.assemble_g_block(0, 0, 1.1).unwrap();
        assert!((&before - &after).norm() < TOLERANCE * before.norm());
        assert!(before[(0, 0)].norm() == 0.0);
    }

    #[test]
    fn transform_moves_object_and_revert_restores_it() {
        let mut geometry = pair();
        let gtc = GTComplex::identity("d").with_move("B", translation(Vector3::new(1.0, 0.0, 0.0)));
        geometry.apply_transform(&gtc).unwrap();
        assert_eq!(geometry.object_pose(1).translation.vector, Vector3::new(1.0, 0.0, 1.5));
        geometry.revert_transform();
        assert_eq!(geometry.object_pose(1).translation.vector, Vector3::new(0.0, 0.0, 1.5));

        let bad = GTComplex::identity("x").with_move("C", translation(Vector3::x()));
        assert!(matches!(geometry.apply_transform(&bad), Err(GeometryError::UnknownLabel(_))));
    }

    #[test]
    fn fluctuation_source_vanishes_at_equilibrium_and_is_positive_when_hot() {
        let geometry = pair();
        let equilibrium = TemperatureProfile::uniform(2, 300.0, 300.0);
        let blocks = geometry.assemble_overlap_blocks(0, 0.2, &equilibrium).unwrap();
        assert_eq!(blocks.sigma.norm(), 0.0);

        let hot = TemperatureProfile {
            environment: 0.0,
            objects: vec![300.0, 0.0],
        };
        let blocks = geometry.assemble_overlap_blocks(0, 0.2, &hot).unwrap();
        assert!(blocks.sigma[(0, 0)].re > 0.0);
        assert_eq!(blocks.sigma[(0, 1)], C64::new(0.0, 0.0));
    }

    #[test]
    fn default_field_sum_matches_single_basis_field() {
        let geometry = pair();
        let mut current = crate::core::geometry::CVector::zeros(geometry.total_basis_functions());
        current[4] = C64::new(0.0, 2.0);
        let x = Point3::new(0.3, 0.1, -0.7);
        let samples = geometry.fields(None, Some(&current), 0.5, &[x]);
        let expected = geometry.basis_field(1, 1, 0.5, &x).scale(C64::new(0.0, 2.0));
        assert!((samples[0].e - expected.e).norm() < TOLERANCE);
        assert!((samples[0].h - expected.h).norm() < TOLERANCE);
    }

    #[test]
    fn incident_absorbed_power_matches_overlap_for_self_consistent_currents() {
        // A single isolated cell driven by a plane wave: c = -A E_inc.
        let geometry = DipoleGeometry::new(vec![DipoleObject::new("A", lossy(), vec![Point3::origin()], 0.01)]).unwrap();
        let omega = 0.9;
        let pw = PlaneWave::new(
            CVector3::new(C64::new(1.0, 0.0), C64::new(0.0, 0.5), C64::new(0.0, 0.0)),
            Vector3::z(),
        );
        let alpha = geometry.polarizability(0, omega);
        let response = II * omega * alpha.dressed / ZVAC;
        let e_inc = pw.fields(&Point3::origin(), omega).e;
        let current = crate::core::geometry::CVector::from_fn(3, |i, _| -response * e_inc[i]);

        let x = |b: usize, a: usize| current[b] * current[a].conj();
        let overlap = geometry.overlap_kernels(0, omega).unwrap().contract_pft(x);
        let jde = geometry
            .displacement_kernels(0, omega, &Point3::origin())
            .unwrap()
            .contract_pft(x)
            + geometry
                .incident_kernels(0, omega, &pw, &Point3::origin())
                .unwrap()
                .contract(&current);

        let p_overlap = overlap[Quantity::AbsorbedPower];
        let p_jde = jde[Quantity::AbsorbedPower];
        assert!(p_overlap > 0.0);
        assert!((p_overlap - p_jde).abs() < 1e-9 * p_overlap);

        let z_torque_overlap = overlap[Quantity::ZTorque];
        let z_torque_jde = jde[Quantity::ZTorque];
        assert!(z_torque_overlap.abs() > 0.0);
        assert!((z_torque_overlap - z_torque_jde).abs() < 1e-6 * z_torque_overlap.abs());
    }

    #[test]
    fn parses_toml_description() {
        let geometry = DipoleGeometry::from_toml_str(
            r#"
            [[object]]
            label = "Hot"
            material = { type = "constant", epsilon = [3.0, 1.0] }
            shape = { type = "sphere", radius = 0.2, spacing = 0.1 }

            [[object]]
            label = "Cold"
            material = { type = "drude", eps-inf = 1.0, omega-p = 10.0, gamma = 0.2 }
            shape = { type = "sites", positions = [[0.0, 0.0, 0.0], [0.1, 0.0, 0.0]], cell-volume = 0.001 }
            position = [0.0, 0.0, 2.0]
            rotation-angle = 90.0
            "#,
        )
        .unwrap();
        assert_eq!(geometry.num_objects(), 2);
        assert_eq!(geometry.num_basis_functions(1), 6);
        assert_eq!(geometry.basis_offset(1), geometry.num_basis_functions(0));
        let x = geometry.frame(1, 3).x;
        assert!((x - Point3::new(0.0, 0.1, 2.0)).norm() < TOLERANCE);
    }
}
