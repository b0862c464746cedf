use std::fmt;
use std::str::FromStr;

use super::Interval;
use crate::GeometryError;
use crate::Result;

/// Axis aligned n-dimensional box.
///
/// A box without dimensions is the full space: it intersects and covers
/// everything. Its compact string form is `[]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Hyperrectangle {
    intervals: Vec<Interval>,
}

impl Hyperrectangle {
    pub fn new(intervals: Vec<Interval>) -> Self {
        Self { intervals }
    }

    pub fn full_space() -> Self {
        Self::default()
    }

    /// Closed box from `[low0, high0, low1, high1, ...]`
    pub fn from_bounds(bounds: &[f64]) -> Result<Self> {
        if bounds.len() % 2 != 0 {
            return Err(GeometryError::Parse(format!(
                "odd number of bounds ({}) for a box",
                bounds.len()
            ))
            .into());
        }
        let intervals = bounds
            .chunks(2)
            .map(|pair| Interval::closed(pair[0], pair[1]))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { intervals })
    }

    /// Degenerate box around a single point
    pub fn from_point(coordinates: &[f64]) -> Result<Self> {
        let intervals = coordinates
            .iter()
            .map(|c| Interval::closed(*c, *c))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { intervals })
    }

    pub fn dimension(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_full_space(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn interval(
        &self,
        dimension: usize,
    ) -> Option<&Interval> {
        self.intervals.get(dimension)
    }

    pub fn low(
        &self,
        dimension: usize,
    ) -> Option<f64> {
        self.interval(dimension).map(Interval::begin)
    }

    pub fn high(
        &self,
        dimension: usize,
    ) -> Option<f64> {
        self.interval(dimension).map(Interval::end)
    }

    /// Exact overlap test, including the open/closed flags
    pub fn intersects(
        &self,
        other: &Hyperrectangle,
    ) -> bool {
        if self.is_full_space() || other.is_full_space() {
            return true;
        }
        if self.dimension() != other.dimension() {
            return false;
        }
        self.intervals
            .iter()
            .zip(other.intervals.iter())
            .all(|(a, b)| a.overlaps(b))
    }

    /// Whether `other` lies completely inside this box
    pub fn covers(
        &self,
        other: &Hyperrectangle,
    ) -> bool {
        if self.is_full_space() {
            return true;
        }
        if other.is_full_space() || self.dimension() != other.dimension() {
            return false;
        }
        self.intervals
            .iter()
            .zip(other.intervals.iter())
            .all(|(a, b)| a.covers(b))
    }

    pub fn contains_point(
        &self,
        point: &[f64],
    ) -> bool {
        if self.is_full_space() {
            return true;
        }
        point.len() == self.dimension()
            && self
                .intervals
                .iter()
                .zip(point.iter())
                .all(|(i, p)| i.contains_point(*p))
    }

    pub fn volume(&self) -> f64 {
        if self.is_full_space() {
            return 0.0;
        }
        self.intervals.iter().map(Interval::length).product()
    }

    pub fn center(&self) -> Vec<f64> {
        self.intervals.iter().map(Interval::midpoint).collect()
    }

    /// Left part of the box; `position` belongs to it when `position_included`
    pub fn split_left(
        &self,
        position: f64,
        dimension: usize,
        position_included: bool,
    ) -> Result<Hyperrectangle> {
        self.split_with(position, dimension, |i| i.split_left(position, position_included))
    }

    /// Right part of the box; `position` belongs to it when `position_included`
    pub fn split_right(
        &self,
        position: f64,
        dimension: usize,
        position_included: bool,
    ) -> Result<Hyperrectangle> {
        self.split_with(position, dimension, |i| i.split_right(position, position_included))
    }

    fn split_with<F>(
        &self,
        position: f64,
        dimension: usize,
        split: F,
    ) -> Result<Hyperrectangle>
    where
        F: FnOnce(&Interval) -> Result<Interval>,
    {
        let interval = self
            .intervals
            .get(dimension)
            .ok_or(GeometryError::DimensionMismatch {
                expected: dimension + 1,
                actual: self.dimension(),
            })?;

        if !interval.contains_point(position) {
            return Err(GeometryError::SplitOutOfRange {
                position,
                dimension,
            }
            .into());
        }

        let mut intervals = self.intervals.clone();
        intervals[dimension] = split(interval)?;
        Ok(Hyperrectangle { intervals })
    }

    /// Smallest box covering all given boxes. Full space when `boxes` is empty.
    pub fn covering_box(boxes: &[Hyperrectangle]) -> Result<Hyperrectangle> {
        let mut non_empty = boxes.iter().filter(|b| !b.is_full_space());
        let first = match non_empty.next() {
            Some(b) => b.clone(),
            None => return Ok(Hyperrectangle::full_space()),
        };

        non_empty.try_fold(first, |acc, b| {
            if acc.dimension() != b.dimension() {
                return Err(GeometryError::DimensionMismatch {
                    expected: acc.dimension(),
                    actual: b.dimension(),
                }
                .into());
            }
            let intervals = acc
                .intervals
                .iter()
                .zip(b.intervals.iter())
                .map(|(x, y)| x.span(y))
                .collect();
            Ok(Hyperrectangle { intervals })
        })
    }

    /// `[[0,5]:[0,6]]`
    pub fn to_compact_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Hyperrectangle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "[")?;
        for (d, interval) in self.intervals.iter().enumerate() {
            if d != 0 {
                write!(f, ":")?;
            }
            write!(f, "{interval}")?;
        }
        write!(f, "]")
    }
}

impl FromStr for Hyperrectangle {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if !s.starts_with('[') || !s.ends_with(']') || s.len() < 2 {
            return Err(GeometryError::Parse(format!("box {s:?} must be enclosed in [ ]")).into());
        }
        if s == "[]" {
            return Ok(Hyperrectangle::full_space());
        }

        let intervals = s[1..s.len() - 1]
            .split(':')
            .map(str::parse::<Interval>)
            .collect::<Result<Vec<_>>>()?;
        Ok(Hyperrectangle { intervals })
    }
}
