//! Visiting order of alignment points.
//!
//! Without dome minimization points are swept by azimuth. With it they are swept
//! by the edge of their dome aperture, so consecutive points tend to share one
//! dome position. Missing aperture bounds sort last.

use std::cmp::Ordering;

use crate::models::{ModelPoint, ModelPointState, PierSide};

/// Comparator choosing the next point to visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointOrdering {
    /// `false` sweeps by ascending azimuth, `true` by descending azimuth
    pub west_to_east: bool,
    /// Order by dome aperture bounds instead of azimuth
    pub dome_aware: bool,
    /// Keep points on one side of pier together, this side first
    pub preferred_side: Option<PierSide>,
    /// Flipped once per retry iteration when direction alternation is on
    pub reversed: bool,
}

impl PointOrdering {
    pub fn new(west_to_east: bool, dome_aware: bool) -> Self {
        Self {
            west_to_east,
            dome_aware,
            preferred_side: None,
            reversed: false,
        }
    }

    /// Group points by expected side of pier, visiting `side` first.
    pub fn with_preferred_side(mut self, side: PierSide) -> Self {
        self.preferred_side = Some(side);
        self
    }

    /// The same ordering swept the other way.
    pub fn flipped(self) -> Self {
        Self {
            reversed: !self.reversed,
            ..self
        }
    }

    /// Effective sweep direction after the reversal flag is applied.
    pub fn is_ascending(&self) -> bool {
        !(self.west_to_east ^ self.reversed)
    }

    fn side_rank(&self, point: &ModelPoint) -> u8 {
        match self.preferred_side {
            Some(side) if side != PierSide::Unknown => {
                if point.expected_side_of_pier == side {
                    0
                } else {
                    1
                }
            }
            _ => 0,
        }
    }

    fn dome_key(&self, point: &ModelPoint) -> f64 {
        if self.is_ascending() {
            if point.min_dome_azimuth.is_nan() {
                f64::INFINITY
            } else {
                point.min_dome_azimuth
            }
        } else if point.max_dome_azimuth.is_nan() {
            f64::NEG_INFINITY
        } else {
            point.max_dome_azimuth
        }
    }

    fn directed(&self, a: f64, b: f64) -> Ordering {
        if self.is_ascending() {
            a.total_cmp(&b)
        } else {
            b.total_cmp(&a)
        }
    }

    /// Total order: `Less` means `a` is visited before `b`.
    pub fn compare(&self, a: &ModelPoint, b: &ModelPoint) -> Ordering {
        self.side_rank(a)
            .cmp(&self.side_rank(b))
            .then_with(|| {
                if self.dome_aware {
                    self.directed(self.dome_key(a), self.dome_key(b))
                } else {
                    Ordering::Equal
                }
            })
            .then_with(|| self.directed(a.azimuth_deg(), b.azimuth_deg()))
            .then_with(|| b.altitude_deg().total_cmp(&a.altitude_deg()))
            .then_with(|| a.id.cmp(&b.id))
    }

    /// Index of the first `Generated` point in this order.
    pub fn select_next(&self, points: &[ModelPoint]) -> Option<usize> {
        points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.state == ModelPointState::Generated)
            .min_by(|(_, a), (_, b)| self.compare(a, b))
            .map(|(i, _)| i)
    }

    /// Ids of the eligible points in visiting order.
    pub fn plan(&self, points: &[ModelPoint]) -> Vec<usize> {
        let mut eligible: Vec<&ModelPoint> = points
            .iter()
            .filter(|p| p.state == ModelPointState::Generated)
            .collect();
        eligible.sort_by(|a, b| self.compare(a, b));
        eligible.into_iter().map(|p| p.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: usize, alt: f64, az: f64) -> ModelPoint {
        ModelPoint::new(id, alt, az, ModelPointState::Generated)
    }

    fn with_bounds(id: usize, az: f64, min: f64, max: f64) -> ModelPoint {
        let mut p = point(id, 40.0, az);
        p.min_dome_azimuth = min;
        p.max_dome_azimuth = max;
        p
    }

    #[test]
    fn test_azimuth_sweep_directions() {
        let points = vec![
            point(0, 30.0, 200.0),
            point(1, 30.0, 20.0),
            point(2, 30.0, 110.0),
        ];
        let asc = PointOrdering::new(false, false);
        assert_eq!(asc.plan(&points), vec![1, 2, 0]);
        let desc = PointOrdering::new(true, false);
        assert_eq!(desc.plan(&points), vec![0, 2, 1]);
    }

    #[test]
    fn test_reversal_flips_direction() {
        let ordering = PointOrdering::new(false, false);
        assert!(ordering.is_ascending());
        assert!(!ordering.flipped().is_ascending());
        assert!(ordering.flipped().flipped().is_ascending());
    }

    #[test]
    fn test_dome_bounds_ordering() {
        let points = vec![
            with_bounds(0, 50.0, 40.0, 60.0),
            with_bounds(1, 15.0, 10.0, 20.0),
            with_bounds(2, 55.0, 30.0, 80.0),
            point(3, 40.0, 5.0),
        ];
        let asc = PointOrdering::new(false, true);
        assert_eq!(asc.plan(&points), vec![1, 2, 0, 3]);
        let desc = PointOrdering::new(true, true);
        assert_eq!(desc.plan(&points), vec![2, 0, 1, 3]);
    }

    #[test]
    fn test_preferred_side_comes_first() {
        let mut a = point(0, 30.0, 10.0);
        a.expected_side_of_pier = PierSide::West;
        let mut b = point(1, 30.0, 300.0);
        b.expected_side_of_pier = PierSide::East;
        let ordering = PointOrdering::new(false, false).with_preferred_side(PierSide::East);
        assert_eq!(ordering.plan(&[a, b]), vec![1, 0]);
    }

    #[test]
    fn test_ties_break_by_altitude_then_id() {
        let points = vec![
            point(0, 30.0, 90.0),
            point(1, 60.0, 90.0),
            point(2, 60.0, 90.0),
        ];
        let ordering = PointOrdering::new(false, false);
        assert_eq!(ordering.plan(&points), vec![1, 2, 0]);
    }

    #[test]
    fn test_select_next_skips_ineligible() {
        let mut points = vec![point(0, 30.0, 10.0), point(1, 30.0, 20.0)];
        points[0].state = ModelPointState::AddedToModel;
        let ordering = PointOrdering::new(false, false);
        assert_eq!(ordering.select_next(&points), Some(1));
        points[1].state = ModelPointState::BelowHorizon;
        assert_eq!(ordering.select_next(&points), None);
    }
}
