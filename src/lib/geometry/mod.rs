use nalgebra::geometry::Point2;
use nalgebra::Vector2;

use crate::error::{CamError, Result};

/// Tolerance used when comparing coordinates produced by floating point arithmetic.
pub const EPSILON: f64 = 1e-9;

/// Most increments a [`StepSeq`] will produce. More than this is a unit mixup, not a job.
pub const MAX_STEPS: f64 = 1e6;

pub fn distance(a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    (b - a).norm()
}

pub fn dot(v1: &Vector2<f64>, v2: &Vector2<f64>) -> f64 {
    v1.dot(v2)
}

/// Z component of the 3D cross product of two XY vectors.
pub fn cross(v1: &Vector2<f64>, v2: &Vector2<f64>) -> f64 {
    v1.x * v2.y - v1.y * v2.x
}

/// Unit vector along `v`, or `None` for a zero length vector.
pub fn unit(v: &Vector2<f64>) -> Option<Vector2<f64>> {
    let len = v.norm();
    if len < EPSILON {
        None
    } else {
        Some(v / len)
    }
}

/// `v` rotated 90 degrees counter-clockwise.
pub fn perp(v: &Vector2<f64>) -> Vector2<f64> {
    Vector2::new(-v.y, v.x)
}

/// Signed angle (radians) turning `v1` onto `v2`. Positive is counter-clockwise.
pub fn angle_between(v1: &Vector2<f64>, v2: &Vector2<f64>) -> f64 {
    cross(v1, v2).atan2(dot(v1, v2))
}

/// Point at `angle` degrees on the circle around `center`.
pub fn polar(center: &Point2<f64>, radius: f64, angle: f64) -> Point2<f64> {
    let a = angle.to_radians();
    Point2::new(center.x + a.cos() * radius, center.y + a.sin() * radius)
}

/// An evenly stepped sequence from `start` toward `stop`.
///
/// The requested step is shrunk to `(stop - start) / ceil(|stop - start| / step)` so every
/// increment is equal and the last value is exactly `stop`: there is never a tiny final pass.
#[derive(Debug, Clone)]
pub struct StepSeq {
    start: f64,
    stop: f64,
    step: f64,
    count: usize,
    include_end: bool,
    index: usize,
}

impl StepSeq {
    pub fn new(start: f64, stop: f64, step: f64, include_end: bool) -> Result<Self> {
        if !(step > 0.0) || !step.is_finite() || !start.is_finite() || !stop.is_finite() {
            return Err(CamError::InvalidStep { start, stop, step });
        }
        let span = stop - start;
        let steps = span.abs() / step;
        if steps > MAX_STEPS {
            return Err(CamError::InvalidStep { start, stop, step });
        }
        // Shave a little off so 1.0 / 0.1 doesn't become 11 passes
        let count = (steps - EPSILON).ceil().max(0.0) as usize;
        let step = if count == 0 { 0.0 } else { span / count as f64 };
        Ok(StepSeq {
            start,
            stop,
            step,
            count,
            include_end,
            index: 0,
        })
    }

    /// The increment actually used between values.
    pub fn step(&self) -> f64 {
        self.step
    }
}

impl Iterator for StepSeq {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        let i = self.index;
        if i < self.count {
            self.index += 1;
            Some(self.start + self.step * i as f64)
        } else if i == self.count && self.include_end {
            self.index += 1;
            Some(self.stop)
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let total = self.count + if self.include_end { 1 } else { 0 };
        let left = total.saturating_sub(self.index);
        (left, Some(left))
    }
}

impl ExactSizeIterator for StepSeq {}

/// A closed polygon boundary. The closing point is implied, not stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Ring {
    points: Vec<Point2<f64>>,
}

impl Ring {
    pub fn new(mut points: Vec<Point2<f64>>) -> Self {
        while points.len() > 1 && distance(&points[0], &points[points.len() - 1]) < EPSILON {
            points.pop();
        }
        Ring { points }
    }

    /// Axis aligned rectangle with corners `p1` and `p2`.
    pub fn rectangle(p1: Point2<f64>, p2: Point2<f64>) -> Self {
        Ring::new(vec![
            p1,
            Point2::new(p1.x, p2.y),
            p2,
            Point2::new(p2.x, p1.y),
        ])
    }

    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.len() < 3
    }

    /// Shoelace area; positive for counter-clockwise rings.
    pub fn signed_area(&self) -> f64 {
        let n = self.points.len();
        let mut sum = 0.0;
        for i in 0..n {
            let p1 = self.points[i];
            let p2 = self.points[(i + 1) % n];
            sum += p1.x * p2.y - p2.x * p1.y;
        }
        sum / 2.0
    }

    pub fn is_clockwise(&self) -> bool {
        self.signed_area() < 0.0
    }

    pub fn enforce_direction(mut self, clockwise: bool) -> Self {
        if self.is_clockwise() != clockwise {
            self.points.reverse();
        }
        self
    }

    /// Points in order, ending back on the first point.
    pub fn closed_points(&self) -> Vec<Point2<f64>> {
        let mut pts = self.points.clone();
        if let Some(first) = self.points.first() {
            pts.push(*first);
        }
        pts
    }
}
