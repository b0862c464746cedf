use std::fmt;
use std::str::FromStr;

use crate::GeometryError;
use crate::Result;

/// One dimension of a [`super::Hyperrectangle`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    begin: f64,
    end: f64,
    begin_included: bool,
    end_included: bool,
}

impl Interval {
    /// Closed interval `[begin, end]`
    pub fn closed(
        begin: f64,
        end: f64,
    ) -> Result<Self> {
        Self::new(begin, end, true, true)
    }

    pub fn new(
        begin: f64,
        end: f64,
        begin_included: bool,
        end_included: bool,
    ) -> Result<Self> {
        if begin.is_nan() || end.is_nan() || begin > end {
            return Err(GeometryError::InvalidInterval { begin, end }.into());
        }

        // (x, x) would be empty
        if begin == end && !(begin_included && end_included) {
            return Err(GeometryError::InvalidInterval { begin, end }.into());
        }

        Ok(Self {
            begin,
            end,
            begin_included,
            end_included,
        })
    }

    pub fn begin(&self) -> f64 {
        self.begin
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn is_begin_included(&self) -> bool {
        self.begin_included
    }

    pub fn is_end_included(&self) -> bool {
        self.end_included
    }

    pub fn length(&self) -> f64 {
        self.end - self.begin
    }

    pub fn midpoint(&self) -> f64 {
        self.begin + self.length() / 2.0
    }

    pub fn contains_point(
        &self,
        point: f64,
    ) -> bool {
        self.covers_bound(point, true)
    }

    /// Whether `point` lies in the interval, honouring both sides' inclusion
    fn covers_bound(
        &self,
        point: f64,
        point_included: bool,
    ) -> bool {
        if point < self.begin || point > self.end {
            return false;
        }
        if point == self.begin && !(self.begin_included && point_included) {
            return false;
        }
        if point == self.end && !(self.end_included && point_included) {
            return false;
        }
        true
    }

    /// Strictly inside, never on a bound
    pub fn is_interior_point(
        &self,
        point: f64,
    ) -> bool {
        point > self.begin && point < self.end
    }

    /// True when the two intervals share at least one point
    pub fn overlaps(
        &self,
        other: &Interval,
    ) -> bool {
        let (low, low_included) = if self.begin > other.begin {
            (self.begin, self.begin_included)
        } else if other.begin > self.begin {
            (other.begin, other.begin_included)
        } else {
            (self.begin, self.begin_included && other.begin_included)
        };
        let (high, high_included) = if self.end < other.end {
            (self.end, self.end_included)
        } else if other.end < self.end {
            (other.end, other.end_included)
        } else {
            (self.end, self.end_included && other.end_included)
        };
        low < high || (low == high && low_included && high_included)
    }

    /// True when every point of `other` is in `self`
    pub fn covers(
        &self,
        other: &Interval,
    ) -> bool {
        if other.begin < self.begin || other.end > self.end {
            return false;
        }
        if other.begin == self.begin && !self.begin_included && other.begin_included {
            return false;
        }
        if other.end == self.end && !self.end_included && other.end_included {
            return false;
        }
        true
    }

    /// Left part up to `position`
    pub fn split_left(
        &self,
        position: f64,
        position_included: bool,
    ) -> Result<Interval> {
        if !self.contains_point(position) {
            return Err(GeometryError::SplitOutOfRange {
                position,
                dimension: 0,
            }
            .into());
        }
        Interval::new(self.begin, position, self.begin_included, position_included)
    }

    /// Right part starting at `position`
    pub fn split_right(
        &self,
        position: f64,
        position_included: bool,
    ) -> Result<Interval> {
        if !self.contains_point(position) {
            return Err(GeometryError::SplitOutOfRange {
                position,
                dimension: 0,
            }
            .into());
        }
        Interval::new(position, self.end, position_included, self.end_included)
    }

    /// Smallest interval covering both
    pub fn span(
        &self,
        other: &Interval,
    ) -> Interval {
        let (begin, begin_included) = if self.begin < other.begin {
            (self.begin, self.begin_included)
        } else if other.begin < self.begin {
            (other.begin, other.begin_included)
        } else {
            (self.begin, self.begin_included || other.begin_included)
        };
        let (end, end_included) = if self.end > other.end {
            (self.end, self.end_included)
        } else if other.end > self.end {
            (other.end, other.end_included)
        } else {
            (self.end, self.end_included || other.end_included)
        };
        Interval {
            begin,
            end,
            begin_included,
            end_included,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let open = if self.begin_included { '[' } else { '(' };
        let close = if self.end_included { ']' } else { ')' };
        write!(f, "{}{},{}{}", open, self.begin, self.end, close)
    }
}

impl FromStr for Interval {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let begin_included = match s.chars().next() {
            Some('[') => true,
            Some('(') => false,
            _ => return Err(GeometryError::Parse(format!("interval {s:?} must start with ( or [")).into()),
        };
        let end_included = match s.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => return Err(GeometryError::Parse(format!("interval {s:?} must end with ) or ]")).into()),
        };
        if s.len() < 2 {
            return Err(GeometryError::Parse(format!("interval {s:?} is too short")).into());
        }

        let body = &s[1..s.len() - 1];
        let (begin, end) = body
            .split_once(',')
            .filter(|(_, rest)| !rest.contains(','))
            .ok_or_else(|| GeometryError::Parse(format!("interval {s:?} must contain exactly one ','")))?;

        let parse = |v: &str| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| GeometryError::Parse(format!("{v:?} in {s:?}: {e}")))
        };

        Interval::new(parse(begin)?, parse(end)?, begin_included, end_included)
    }
}
