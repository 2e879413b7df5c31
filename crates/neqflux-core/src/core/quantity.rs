use phf::{Map, phf_map};
use std::fmt;
use std::ops::{Add, AddAssign, Index, IndexMut};
use std::str::FromStr;
use thiserror::Error;

pub const NUM_PFT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Quantity {
    AbsorbedPower,  // PAbs
    ScatteredPower, // PScat
    XForce,
    YForce,
    ZForce,
    XTorque,
    YTorque,
    ZTorque,
}

#[rustfmt::skip]
static QUANTITY_NAMES: Map<&'static str, Quantity> = phf_map! {
    "pabs" => Quantity::AbsorbedPower, "power" => Quantity::AbsorbedPower,
    "absorbed-power" => Quantity::AbsorbedPower,
    "pscat" => Quantity::ScatteredPower, "scattered-power" => Quantity::ScatteredPower,
    "xforce" => Quantity::XForce, "x-force" => Quantity::XForce, "fx" => Quantity::XForce,
    "yforce" => Quantity::YForce, "y-force" => Quantity::YForce, "fy" => Quantity::YForce,
    "zforce" => Quantity::ZForce, "z-force" => Quantity::ZForce, "fz" => Quantity::ZForce,
    "xtorque" => Quantity::XTorque, "x-torque" => Quantity::XTorque, "tx" => Quantity::XTorque,
    "ytorque" => Quantity::YTorque, "y-torque" => Quantity::YTorque, "ty" => Quantity::YTorque,
    "ztorque" => Quantity::ZTorque, "z-torque" => Quantity::ZTorque, "tz" => Quantity::ZTorque,
};

impl Quantity {
    pub const ALL: [Quantity; NUM_PFT] = [
        Quantity::AbsorbedPower,
        Quantity::ScatteredPower,
        Quantity::XForce,
        Quantity::YForce,
        Quantity::ZForce,
        Quantity::XTorque,
        Quantity::YTorque,
        Quantity::ZTorque,
    ];

    pub const FORCES: [Quantity; 3] = [Quantity::XForce, Quantity::YForce, Quantity::ZForce];
    pub const TORQUES: [Quantity; 3] = [Quantity::XTorque, Quantity::YTorque, Quantity::ZTorque];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Scattered power has no meaning for a thermal source and is never part of a flux
    /// selection.
    pub const fn is_selectable(self) -> bool {
        !matches!(self, Quantity::ScatteredPower)
    }

    pub fn label(self) -> &'static str {
        match self {
            Quantity::AbsorbedPower => "power",
            Quantity::ScatteredPower => "scattered power",
            Quantity::XForce => "x-force",
            Quantity::YForce => "y-force",
            Quantity::ZForce => "z-force",
            Quantity::XTorque => "x-torque",
            Quantity::YTorque => "y-torque",
            Quantity::ZTorque => "z-torque",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown PFT quantity: '{0}'")]
pub struct ParseQuantityError(pub String);

impl FromStr for Quantity {
    type Err = ParseQuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace('_', "-");
        QUANTITY_NAMES
            .get(key.as_str())
            .copied()
            .ok_or_else(|| ParseQuantityError(s.to_string()))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// An ordered selection of PFT quantities.
///
/// The position of a quantity inside the selection (its *rank*) is the innermost index of
/// the flux tensor, so iteration always follows the canonical [`Quantity::ALL`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuantitySet {
    enabled: [bool; NUM_PFT],
}

impl QuantitySet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn power_only() -> Self {
        Self::empty().with(Quantity::AbsorbedPower)
    }

    /// Every selectable quantity: power, three forces and three torques.
    pub fn all() -> Self {
        Quantity::ALL
            .into_iter()
            .filter(|q| q.is_selectable())
            .fold(Self::empty(), Self::with)
    }

    pub fn with(mut self, quantity: Quantity) -> Self {
        self.insert(quantity);
        self
    }

    /// Returns `false` when the quantity cannot be selected.
    pub fn insert(&mut self, quantity: Quantity) -> bool {
        if !quantity.is_selectable() {
            return false;
        }
        self.enabled[quantity.index()] = true;
        true
    }

    #[inline]
    pub fn contains(&self, quantity: Quantity) -> bool {
        self.enabled[quantity.index()]
    }

    pub fn len(&self) -> usize {
        self.enabled.iter().filter(|&&on| on).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Quantity> + '_ {
        Quantity::ALL
            .into_iter()
            .filter(move |q| self.contains(*q))
    }

    /// Pairs every selected quantity with its rank in the flux tensor.
    pub fn ranked(&self) -> impl Iterator<Item = (usize, Quantity)> + '_ {
        self.iter().enumerate()
    }

    pub fn rank_of(&self, quantity: Quantity) -> Option<usize> {
        self.ranked().find(|(_, q)| *q == quantity).map(|(rank, _)| rank)
    }
}

impl FromIterator<Quantity> for QuantitySet {
    fn from_iter<I: IntoIterator<Item = Quantity>>(iter: I) -> Self {
        let mut set = Self::empty();
        for quantity in iter {
            set.insert(quantity);
        }
        set
    }
}

/// The eight power/force/torque values for one destination object.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pft(pub [f64; NUM_PFT]);

impl Pft {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn values(&self) -> &[f64; NUM_PFT] {
        &self.0
    }

    pub fn force(&self) -> [f64; 3] {
        Quantity::FORCES.map(|q| self[q])
    }

    pub fn torque(&self) -> [f64; 3] {
        Quantity::TORQUES.map(|q| self[q])
    }
}

impl Index<Quantity> for Pft {
    type Output = f64;

    fn index(&self, quantity: Quantity) -> &f64 {
        &self.0[quantity.index()]
    }
}

impl IndexMut<Quantity> for Pft {
    fn index_mut(&mut self, quantity: Quantity) -> &mut f64 {
        &mut self.0[quantity.index()]
    }
}

impl Add for Pft {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl AddAssign for Pft {
    fn add_assign(&mut self, rhs: Self) {
        for (lhs, rhs) in self.0.iter_mut().zip(rhs.0) {
            *lhs += rhs;
        }
    }
}
