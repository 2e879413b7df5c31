use nalgebra::{DMatrix, DVector, Isometry3, Point3};
use thiserror::Error;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::fields::{C64, FieldSample, IncidentField};
use super::physics::TemperatureProfile;
use super::quantity::{NUM_PFT, Pft, Quantity};
use super::transform::GTComplex;

pub type CMatrix = DMatrix<C64>;
pub type CVector = DVector<C64>;

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("Geometry contains no objects")]
    NoObjects,
    #[error("Unknown object label '{0}'")]
    UnknownLabel(String),
    #[error("Duplicate object label '{0}'")]
    DuplicateLabel(String),
    #[error("Object index {index} out of range (geometry has {count} objects)")]
    ObjectOutOfRange { index: usize, count: usize },
    #[error("Invalid object '{label}': {message}")]
    InvalidObject { label: String, message: String },
    #[error("I/O error reading geometry file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse geometry description: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Material response `V` and fluctuation source `Sigma` of one object.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapBlocks {
    pub v: CMatrix,
    pub sigma: CMatrix,
}

/// One entry `K_ab` of a bilinear trace kernel, with global basis indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelEntry {
    pub a: usize,
    pub b: usize,
    pub value: C64,
}

/// Sparse bilinear kernels, one list per slot.
///
/// A kernel contracts with a correlation `X` as `Re sum_ab K_ab X_ba`, where `X_ba` is
/// `<c_b conj(c_a)>`.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelSet<const N: usize> {
    terms: [Vec<KernelEntry>; N],
}

pub type PftKernels = KernelSet<NUM_PFT>;
pub type TorqueKernels = KernelSet<3>;

impl<const N: usize> Default for KernelSet<N> {
    fn default() -> Self {
        Self {
            terms: std::array::from_fn(|_| Vec::new()),
        }
    }
}

impl<const N: usize> KernelSet<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, slot: usize, a: usize, b: usize, value: C64) {
        if value != C64::new(0.0, 0.0) {
            self.terms[slot].push(KernelEntry { a, b, value });
        }
    }

    pub fn terms(&self, slot: usize) -> &[KernelEntry] {
        &self.terms[slot]
    }

    pub fn is_empty(&self) -> bool {
        self.terms.iter().all(Vec::is_empty)
    }

    pub fn contract<X>(&self, x: X) -> [f64; N]
    where
        X: Fn(usize, usize) -> C64,
    {
        std::array::from_fn(|slot| {
            self.terms[slot]
                .iter()
                .map(|t| (t.value * x(t.b, t.a)).re)
                .sum()
        })
    }
}

impl KernelSet<NUM_PFT> {
    pub fn push_quantity(&mut self, quantity: Quantity, a: usize, b: usize, value: C64) {
        self.push(quantity.index(), a, b, value);
    }

    pub fn contract_pft<X>(&self, x: X) -> Pft
    where
        X: Fn(usize, usize) -> C64,
    {
        Pft(self.contract(x))
    }
}

/// Linear kernels `k_a` contracted with a current vector as `Re sum_a conj(c_a) k_a`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IncidentKernels {
    terms: [Vec<(usize, C64)>; NUM_PFT],
}

impl IncidentKernels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, quantity: Quantity, a: usize, value: C64) {
        if value != C64::new(0.0, 0.0) {
            self.terms[quantity.index()].push((a, value));
        }
    }

    pub fn contract(&self, current: &CVector) -> Pft {
        Pft(std::array::from_fn(|q| {
            self.terms[q]
                .iter()
                .map(|(a, k)| (current[*a].conj() * k).re)
                .sum()
        }))
    }
}

/// The electromagnetic model of a set of objects.
///
/// Basis functions are numbered object by object; `basis_offset(o)` is the global index of
/// the first basis function of object `o`. Every matrix and kernel the engine consumes
/// comes from this trait, so the flux engine never sees the underlying discretization.
pub trait Geometry: Sync {
    fn num_objects(&self) -> usize;

    fn label(&self, object: usize) -> &str;

    fn object_index(&self, label: &str) -> Option<usize> {
        (0..self.num_objects()).find(|&o| self.label(o) == label)
    }

    fn num_basis_functions(&self, object: usize) -> usize;

    fn basis_offset(&self, object: usize) -> usize {
        (0..object).map(|o| self.num_basis_functions(o)).sum()
    }

    fn total_basis_functions(&self) -> usize {
        (0..self.num_objects())
            .map(|o| self.num_basis_functions(o))
            .sum()
    }

    /// Maps a global basis index to `(object, local index)`.
    fn resolve_basis(&self, index: usize) -> Option<(usize, usize)> {
        let mut start = 0;
        for object in 0..self.num_objects() {
            let n = self.num_basis_functions(object);
            if index < start + n {
                return Some((object, index - start));
            }
            start += n;
        }
        None
    }

    /// An earlier object identical to `object` whose self-interaction block can be reused.
    fn mate(&self, _object: usize) -> Option<usize> {
        None
    }

    /// Moves objects by `transform` relative to their current pose.
    ///
    /// Every call is paired with a [`Geometry::revert_transform`] before the next transform
    /// is applied, also when the call fails.
    fn apply_transform(&mut self, transform: &GTComplex) -> Result<(), GeometryError>;

    /// Returns every object to its reference pose.
    fn revert_transform(&mut self);

    fn object_pose(&self, object: usize) -> Isometry3<f64>;

    fn assemble_overlap_blocks(
        &self,
        object: usize,
        omega: f64,
        temperatures: &TemperatureProfile,
    ) -> Result<OverlapBlocks, GeometryError>;

    fn assemble_g_block(&self, a: usize, b: usize, omega: f64) -> Result<CMatrix, GeometryError>;

    fn assemble_system_inverse(&self, omega: f64) -> Result<CMatrix, GeometryError>;

    /// Field of basis function `basis` of `object` (unit coefficient) at `x`.
    fn basis_field(&self, object: usize, basis: usize, omega: f64, x: &Point3<f64>) -> FieldSample;

    /// Incident plus scattered fields at each point.
    fn fields(
        &self,
        incident: Option<&dyn IncidentField>,
        current: Option<&CVector>,
        omega: f64,
        points: &[Point3<f64>],
    ) -> Vec<FieldSample> {
        let sources: Vec<(usize, usize, C64)> = current
            .map(|c| {
                c.iter()
                    .enumerate()
                    .filter(|(_, v)| v.norm_sqr() > 0.0)
                    .filter_map(|(n, v)| self.resolve_basis(n).map(|(o, l)| (o, l, *v)))
                    .collect()
            })
            .unwrap_or_default();

        let evaluate = |x: &Point3<f64>| {
            let mut sample = incident.map(|f| f.fields(x, omega)).unwrap_or_default();
            for (object, local, coefficient) in &sources {
                sample += self.basis_field(*object, *local, omega, x).scale(*coefficient);
            }
            sample
        };

        #[cfg(feature = "parallel")]
        let samples = points.par_iter().map(evaluate).collect();
        #[cfg(not(feature = "parallel"))]
        let samples = points.iter().map(evaluate).collect();
        samples
    }

    /// Local overlap kernels of `object`.
    fn overlap_kernels(&self, _object: usize, _omega: f64) -> Result<PftKernels, GeometryError> {
        Ok(PftKernels::new())
    }

    /// Current-times-field torque kernels of `object`, one slot per Cartesian axis.
    fn jxe_torque_kernels(&self, _object: usize, _omega: f64) -> Result<TorqueKernels, GeometryError> {
        Ok(TorqueKernels::new())
    }

    /// Current-displacement kernels of `object`; torques are taken about `torque_center`.
    fn displacement_kernels(
        &self,
        _object: usize,
        _omega: f64,
        _torque_center: &Point3<f64>,
    ) -> Result<PftKernels, GeometryError> {
        Ok(PftKernels::new())
    }

    /// Contributions of an incident field to the current-displacement quantities.
    fn incident_kernels(
        &self,
        _object: usize,
        _omega: f64,
        _incident: &dyn IncidentField,
        _torque_center: &Point3<f64>,
    ) -> Result<IncidentKernels, GeometryError> {
        Ok(IncidentKernels::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_contraction_uses_transposed_correlation_index() {
        let mut kernels = PftKernels::new();
        kernels.push_quantity(Quantity::AbsorbedPower, 0, 1, C64::new(2.0, 0.0));
        kernels.push_quantity(Quantity::XForce, 1, 1, C64::new(0.0, 1.0));
        let x = |b: usize, a: usize| C64::new((10 * b + a) as f64, 1.0);
        let pft = kernels.contract_pft(x);
        assert_eq!(pft[Quantity::AbsorbedPower], 2.0 * 10.0);
        assert_eq!(pft[Quantity::XForce], -1.0);
        assert_eq!(pft[Quantity::YForce], 0.0);
    }

    #[test]
    fn zero_entries_are_not_stored() {
        let mut kernels = TorqueKernels::new();
        kernels.push(0, 0, 0, C64::new(0.0, 0.0));
        assert!(kernels.is_empty());
    }

    #[test]
    fn incident_kernels_contract_with_conjugated_current() {
        let mut kernels = IncidentKernels::new();
        kernels.push(Quantity::AbsorbedPower, 1, C64::new(0.0, 1.0));
        let current = CVector::from_vec(vec![C64::new(5.0, 0.0), C64::new(0.0, 2.0)]);
        let pft = kernels.contract(&current);
        assert_eq!(pft[Quantity::AbsorbedPower], 2.0);
    }
}
