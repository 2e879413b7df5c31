use itertools::iproduct;

/// Layout of the flux tensor: `(transform, source, destination, quantity)` flattened with
/// the quantity rank varying fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FluxIndex {
    pub num_transforms: usize,
    pub num_objects: usize,
    pub num_quantities: usize,
}

impl FluxIndex {
    pub fn new(num_transforms: usize, num_objects: usize, num_quantities: usize) -> Self {
        Self {
            num_transforms,
            num_objects,
            num_quantities,
        }
    }

    pub fn len(&self) -> usize {
        self.num_transforms * self.num_objects * self.num_objects * self.num_quantities
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn index(&self, nt: usize, nos: usize, nod: usize, nq: usize) -> usize {
        let no = self.num_objects;
        let nq_total = self.num_quantities;
        nt * no * no * nq_total + nos * no * nq_total + nod * nq_total + nq
    }

    /// Inverse of [`FluxIndex::index`].
    pub fn decompose(&self, index: usize) -> (usize, usize, usize, usize) {
        let nq = index % self.num_quantities;
        let rest = index / self.num_quantities;
        let nod = rest % self.num_objects;
        let rest = rest / self.num_objects;
        let nos = rest % self.num_objects;
        let nt = rest / self.num_objects;
        (nt, nos, nod, nq)
    }

    /// Every `(transform, source, destination)` triple in canonical record order.
    pub fn records(&self) -> impl Iterator<Item = (usize, usize, usize)> + use<> {
        let no = self.num_objects;
        iproduct!(0..self.num_transforms, 0..no, 0..no)
    }
}

/// Flux values for every transform, source, destination and selected quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxTensor {
    layout: FluxIndex,
    values: Vec<f64>,
}

impl FluxTensor {
    pub fn zeros(layout: FluxIndex) -> Self {
        Self {
            layout,
            values: vec![0.0; layout.len()],
        }
    }

    /// Wraps `values`; returns `None` if the length does not match the layout.
    pub fn from_values(layout: FluxIndex, values: Vec<f64>) -> Option<Self> {
        (values.len() == layout.len()).then_some(Self { layout, values })
    }

    pub fn layout(&self) -> FluxIndex {
        self.layout
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    pub fn get(&self, nt: usize, nos: usize, nod: usize, nq: usize) -> f64 {
        self.values[self.layout.index(nt, nos, nod, nq)]
    }

    pub fn set(&mut self, nt: usize, nos: usize, nod: usize, nq: usize, value: f64) {
        let i = self.layout.index(nt, nos, nod, nq);
        self.values[i] = value;
    }

    /// The quantities of one `(transform, source, destination)` record.
    pub fn record(&self, nt: usize, nos: usize, nod: usize) -> &[f64] {
        let start = self.layout.index(nt, nos, nod, 0);
        &self.values[start..start + self.layout.num_quantities]
    }

    pub fn record_mut(&mut self, nt: usize, nos: usize, nod: usize) -> &mut [f64] {
        let start = self.layout.index(nt, nos, nod, 0);
        &mut self.values[start..start + self.layout.num_quantities]
    }
}
