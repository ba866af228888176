//! Potential coefficients.
//!
//! Unknowns are arena-allocated and compared by `Idx`, never by label: two
//! independently allocated unknowns with the same label are distinct
//! variables. The arena index is the join key between every constraint that
//! mentions a coefficient and the solved valuation.

use std::fmt;
use std::ops;

use derive_more::Debug;
use la_arena::{Arena, Idx};
use num_rational::Rational64;
use smol_str::SmolStr;

pub type CoeffId = Idx<CoeffData>;

/// Debug payload of an unknown coefficient. Carries no identity of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
#[debug("Coeff({label:?})")]
pub struct CoeffData {
    pub label: SmolStr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Coefficient {
    Unknown(CoeffId),
    /// A constant. Never allocated a solver variable.
    Known(Rational64),
}

impl Coefficient {
    pub fn known(value: i64) -> Self {
        Coefficient::Known(Rational64::from_integer(value))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Coefficient::Unknown(_))
    }
}

impl fmt::Display for Coefficient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coefficient::Unknown(id) => write!(f, "q{}", u32::from(id.into_raw())),
            Coefficient::Known(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CoeffArena {
    data: Arena<CoeffData>,
}

impl CoeffArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self, label: impl Into<SmolStr>) -> Coefficient {
        Coefficient::Unknown(self.data.alloc(CoeffData {
            label: label.into(),
        }))
    }

    pub fn iter(&self) -> impl Iterator<Item = (CoeffId, &CoeffData)> {
        self.data.iter()
    }
}

impl ops::Index<CoeffId> for CoeffArena {
    type Output = CoeffData;
    fn index(&self, index: CoeffId) -> &Self::Output {
        &self.data[index]
    }
}
