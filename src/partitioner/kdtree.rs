use tracing::trace;

use super::median;
use super::ChildBoxStrategy;
use crate::Hyperrectangle;
use crate::Result;

/// Binary split on dimension `level % dims` at the median of the sample
/// centers. The box midpoint is used when the median is not strictly inside.
#[derive(Debug, Clone, Copy, Default)]
pub struct KdTreeStrategy;

impl KdTreeStrategy {
    pub fn split_position(
        bbox: &Hyperrectangle,
        dimension: usize,
        samples: &[Hyperrectangle],
    ) -> Option<f64> {
        let interval = bbox.interval(dimension)?;
        let mut centers: Vec<f64> = samples
            .iter()
            .filter_map(|s| s.center().get(dimension).copied())
            .filter(|c| c.is_finite())
            .collect();

        match median(&mut centers) {
            Some(m) if interval.is_interior_point(m) => Some(m),
            _ => Some(interval.midpoint()),
        }
    }
}

impl ChildBoxStrategy for KdTreeStrategy {
    fn name(&self) -> &'static str {
        "kdtree"
    }

    fn child_boxes(
        &self,
        bbox: &Hyperrectangle,
        level: usize,
        samples: &[Hyperrectangle],
    ) -> Result<Vec<Hyperrectangle>> {
        let dimension = level % bbox.dimension().max(1);
        let position = Self::split_position(bbox, dimension, samples).unwrap_or_default();
        trace!(dimension, position, "Splitting kd-tree region");

        let left = bbox.split_left(position, dimension, true)?;
        let right = bbox.split_right(position, dimension, false)?;
        Ok(vec![left, right])
    }
}
