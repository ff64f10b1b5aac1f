//! Medial axis data model.
//!
//! A pocket is cleared by walking an ordered list of maximal inscribed circles (MICs) of
//! the region the cutter center may visit. Each MIC is reached from the circle before it
//! along a pair of outer bitangents; the crescent between the two circles is the material
//! that MIC removes.

use std::fmt;

use nalgebra::geometry::Point2;
use nalgebra::Vector2;
use tracing::warn;

use crate::error::Result;
use crate::geometry::{distance, perp, unit, Ring, EPSILON};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Point2<f64>,
    pub radius: f64,
}

impl Circle {
    pub fn new(center: Point2<f64>, radius: f64) -> Self {
        Circle { center, radius }
    }

    fn at(&self, direction: &Vector2<f64>) -> Point2<f64> {
        self.center + direction * self.radius
    }
}

/// A straight move tangent to two circles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bitangent {
    pub start: Point2<f64>,
    pub end: Point2<f64>,
}

impl Bitangent {
    /// Unit direction of travel, if the segment has length.
    pub fn direction(&self) -> Option<Vector2<f64>> {
        unit(&(self.end - self.start))
    }
}

/// One node of the walk.
#[derive(Debug, Clone, PartialEq)]
pub struct Mic {
    pub circle: Circle,
    /// From the previous circle onto this one.
    pub entry: Bitangent,
    /// From this circle back onto the previous one.
    pub exit: Bitangent,
    /// The circle this MIC grows out of.
    pub previous: Circle,
    /// Set when the walk jumps back to an earlier circle to start a new branch; holds
    /// that circle.
    pub branch: Option<Circle>,
}

impl Mic {
    pub fn is_new_branch(&self) -> bool {
        self.branch.is_some()
    }
}

/// An ordered MIC walk. The first MIC's `previous` circle is where clearing starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MedialAxisGraph {
    pub mics: Vec<Mic>,
}

/// One step of a walk before its tangent points are known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkStep {
    pub circle: Circle,
    /// Earlier circle a new branch starts from.
    pub branch_from: Option<Circle>,
}

impl WalkStep {
    pub fn next(circle: Circle) -> Self {
        WalkStep {
            circle,
            branch_from: None,
        }
    }

    pub fn branch(from: Circle, circle: Circle) -> Self {
        WalkStep {
            circle,
            branch_from: Some(from),
        }
    }
}

/// Outer tangent directions (unit normals) of `a` and `b`, left then right of the travel
/// from `a` to `b`. `None` when one circle contains the other.
pub fn outer_tangent_normals(a: &Circle, b: &Circle) -> Option<(Vector2<f64>, Vector2<f64>)> {
    let d = distance(&a.center, &b.center);
    let u = unit(&(b.center - a.center))?;
    let k = (a.radius - b.radius) / d;
    if k.abs() >= 1.0 - EPSILON {
        return None;
    }
    let s = (1.0 - k * k).sqrt();
    let along = u * k;
    let across = perp(&u) * s;
    Some((along + across, along - across))
}

impl MedialAxisGraph {
    /// Builds the walk from `start` through `steps`, computing the bitangents that join each
    /// circle to the one it grows from. With `clockwise` arcs the entry runs along the left
    /// of the direction of travel. Steps whose circle lies inside the one before it add
    /// nothing and are dropped.
    pub fn from_walk(start: Circle, steps: &[WalkStep], clockwise: bool) -> Self {
        let mut mics = Vec::with_capacity(steps.len());
        let mut last = start;
        for step in steps {
            let previous = step.branch_from.unwrap_or(last);
            let (left, right) = match outer_tangent_normals(&previous, &step.circle) {
                Some(n) => n,
                None => {
                    warn!(
                        "MIC at ({:.4}, {:.4}) has no outer bitangent, skipping",
                        step.circle.center.x, step.circle.center.y
                    );
                    continue;
                }
            };
            let (inside, outside) = if clockwise { (left, right) } else { (right, left) };
            mics.push(Mic {
                circle: step.circle,
                entry: Bitangent {
                    start: previous.at(&inside),
                    end: step.circle.at(&inside),
                },
                exit: Bitangent {
                    start: step.circle.at(&outside),
                    end: previous.at(&outside),
                },
                previous,
                branch: step.branch_from,
            });
            last = step.circle;
        }
        MedialAxisGraph { mics }
    }

    /// Number of circles including the start circle; zero when empty.
    pub fn node_count(&self) -> usize {
        if self.mics.is_empty() {
            0
        } else {
            self.mics.len() + 1
        }
    }

    pub fn start(&self) -> Option<Circle> {
        self.mics.first().map(|m| m.previous)
    }
}

/// Which side of a boundary a medial axis is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Interior,
    Exterior,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetSide {
    /// Toward the inside of a closed ring.
    Inward,
    Outward,
}

/// Builds MIC walks over a region.
pub trait MedialAxisEngine: fmt::Debug {
    /// Walk over `region` of `boundary`, spacing MICs so that each removes a crescent about
    /// `width` wide.
    fn medial_axis(
        &self,
        boundary: &Ring,
        region: Region,
        width: f64,
        clockwise: bool,
    ) -> Result<MedialAxisGraph>;
}

/// The polygon operations the pocket engine needs.
pub trait GeometryEngine: fmt::Debug {
    /// Rings `distance` from `boundary` on `side`. An offset that consumes the boundary
    /// entirely gives no rings.
    fn parallel_offset(&self, boundary: &Ring, distance: f64, side: OffsetSide) -> Result<Vec<Ring>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::dot;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_bitangents_touch_both_circles() {
        let a = Circle::new(Point2::new(0.0, 0.0), 1.0);
        let b = Circle::new(Point2::new(1.0, 0.5), 0.6);
        let g = MedialAxisGraph::from_walk(a, &[WalkStep::next(b)], true);
        let mic = &g.mics[0];
        for t in &[mic.entry, mic.exit] {
            let dir = t.direction().unwrap();
            // Tangent: the radius at each end is square to the segment
            let (on_a, on_b) = if t == &mic.entry { (t.start, t.end) } else { (t.end, t.start) };
            assert!(close(distance(&on_a, &a.center), a.radius));
            assert!(close(distance(&on_b, &b.center), b.radius));
            assert!(close(dot(&(on_a - a.center), &dir), 0.0));
            assert!(close(dot(&(on_b - b.center), &dir), 0.0));
        }
        // Entry on the left of travel for clockwise arcs
        let travel = b.center - a.center;
        assert!(crate::geometry::cross(&travel, &(mic.entry.end - b.center)) > 0.0);
        assert!(crate::geometry::cross(&travel, &(mic.exit.start - b.center)) < 0.0);
    }

    #[test]
    fn test_counter_clockwise_swaps_sides() {
        let a = Circle::new(Point2::new(0.0, 0.0), 0.5);
        let b = Circle::new(Point2::new(1.0, 0.0), 0.5);
        let cw = MedialAxisGraph::from_walk(a, &[WalkStep::next(b)], true);
        let ccw = MedialAxisGraph::from_walk(a, &[WalkStep::next(b)], false);
        assert!(close(cw.mics[0].entry.end.y, 0.5));
        assert!(close(ccw.mics[0].entry.end.y, -0.5));
        assert_eq!(cw.mics[0].entry.end, ccw.mics[0].exit.start);
    }

    #[test]
    fn test_contained_circle_dropped() {
        let a = Circle::new(Point2::new(0.0, 0.0), 1.0);
        let inside = Circle::new(Point2::new(0.1, 0.0), 0.5);
        let g = MedialAxisGraph::from_walk(a, &[WalkStep::next(inside)], true);
        assert!(g.mics.is_empty());
        assert_eq!(g.node_count(), 0);
        assert_eq!(g.start(), None);
    }

    #[test]
    fn test_branch_grows_from_earlier_circle() {
        let a = Circle::new(Point2::new(0.0, 0.0), 0.5);
        let b = Circle::new(Point2::new(0.5, 0.0), 0.5);
        let c = Circle::new(Point2::new(-0.3, -0.3), 0.2);
        let g = MedialAxisGraph::from_walk(a, &[WalkStep::next(b), WalkStep::branch(a, c)], true);
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.mics[1].previous, a);
        assert!(g.mics[1].is_new_branch());
        assert!(!g.mics[0].is_new_branch());
    }
}
