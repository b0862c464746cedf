use tracing::trace;

use super::median;
use super::ChildBoxStrategy;
use crate::Hyperrectangle;
use crate::Result;

/// Splits every dimension at once, giving `2^d` children. The split point is
/// the median sample point when it lies strictly inside the box, the box
/// center otherwise.
///
/// Child `n` takes the upper half of dimension `d` when bit `d` of `n` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuadtreeStrategy;

impl QuadtreeStrategy {
    pub fn split_point(
        bbox: &Hyperrectangle,
        samples: &[Hyperrectangle],
    ) -> Vec<f64> {
        let center = bbox.center();
        let mut point = Vec::with_capacity(bbox.dimension());
        for dimension in 0..bbox.dimension() {
            let mut values: Vec<f64> = samples
                .iter()
                .filter_map(|s| s.center().get(dimension).copied())
                .filter(|c| c.is_finite())
                .collect();
            match median(&mut values) {
                Some(m) => point.push(m),
                None => return center,
            }
        }

        let interior = bbox
            .intervals()
            .iter()
            .zip(point.iter())
            .all(|(interval, p)| interval.is_interior_point(*p));
        if interior {
            point
        } else {
            center
        }
    }
}

impl ChildBoxStrategy for QuadtreeStrategy {
    fn name(&self) -> &'static str {
        "quadtree"
    }

    fn child_boxes(
        &self,
        bbox: &Hyperrectangle,
        _level: usize,
        samples: &[Hyperrectangle],
    ) -> Result<Vec<Hyperrectangle>> {
        let point = Self::split_point(bbox, samples);
        trace!(?point, "Splitting quadtree region");

        let mut boxes = vec![bbox.clone()];
        for (dimension, position) in point.iter().enumerate() {
            let mut next = Vec::with_capacity(boxes.len() * 2);
            for b in &boxes {
                next.push(b.split_left(*position, dimension, true)?);
            }
            for b in &boxes {
                next.push(b.split_right(*position, dimension, false)?);
            }
            boxes = next;
        }
        Ok(boxes)
    }
}
