//! Partition offsets and their reserved sentinel values.

use std::{fmt, ops::Add};

/// Offsets at or below this value encode "N before the end of the partition".
const OFFSET_TAIL_BASE: i64 = -2000;

/// A position in a partition log.
///
/// Concrete offsets are non-negative. Negative values are reserved:
///
/// | value            | meaning                                          |
/// |------------------|--------------------------------------------------|
/// | `-1`             | [`Offset::END`], the next offset to be written    |
/// | `-2`             | [`Offset::BEGINNING`], the earliest retained one  |
/// | `-1000`          | [`Offset::STORED`], defer to the committed value  |
/// | `-1001`          | [`Offset::INVALID`], unset                        |
/// | `<= -2000`       | [`Offset::tail`], relative to the end             |
///
/// Arithmetic only moves concrete offsets; adding to a sentinel leaves it
/// untouched.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Offset(i64);

impl Offset {
    pub const BEGINNING: Offset = Offset(-2);
    pub const END: Offset = Offset(-1);
    pub const STORED: Offset = Offset(-1000);
    pub const INVALID: Offset = Offset(-1001);

    pub const fn new(value: i64) -> Self {
        Offset(value)
    }

    /// `n` records before the end of the partition.
    pub const fn tail(n: i64) -> Self {
        Offset(OFFSET_TAIL_BASE.saturating_sub(n))
    }

    pub const fn value(&self) -> i64 {
        self.0
    }

    pub const fn is_special(&self) -> bool {
        self.0 < 0
    }

    pub const fn is_concrete(&self) -> bool {
        !self.is_special()
    }

    /// Distance from the end, if this is a relative-from-end offset.
    pub const fn tail_count(&self) -> Option<i64> {
        if self.0 <= OFFSET_TAIL_BASE {
            Some(OFFSET_TAIL_BASE.saturating_sub(self.0))
        } else {
            None
        }
    }
}

impl Default for Offset {
    fn default() -> Self {
        Offset::INVALID
    }
}

impl From<i64> for Offset {
    fn from(value: i64) -> Self {
        Offset(value)
    }
}

impl From<i32> for Offset {
    fn from(value: i32) -> Self {
        Offset(i64::from(value))
    }
}

impl From<Offset> for i64 {
    fn from(offset: Offset) -> Self {
        offset.0
    }
}

impl Add<i64> for Offset {
    type Output = Offset;

    fn add(self, rhs: i64) -> Offset {
        if self.is_special() {
            self
        } else {
            Offset(self.0.saturating_add(rhs))
        }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Offset::BEGINNING => write!(f, "Beginning"),
            Offset::END => write!(f, "End"),
            Offset::STORED => write!(f, "Stored"),
            Offset::INVALID => write!(f, "Unset"),
            offset => match offset.tail_count() {
                Some(n) => write!(f, "End-{}", n),
                None => write!(f, "{}", offset.0),
            },
        }
    }
}
