//! Built-in geometry for simple pockets: offsets of convex rings and the medial axis of an
//! axis aligned rectangle. Anything more general comes from an external engine behind the
//! same traits.

use std::f64::consts::SQRT_2;

use nalgebra::geometry::Point2;
use nalgebra::Vector2;

use super::medial::{
    Circle, GeometryEngine, MedialAxisEngine, MedialAxisGraph, OffsetSide, Region, WalkStep,
};
use crate::error::{CamError, Result};
use crate::geometry::{cross, distance, dot, perp, unit, Ring, StepSeq, EPSILON};

/// Corner MICs stop shrinking here.
pub const MIN_MIC_RADIUS: f64 = 0.001;

/// Offsets convex rings with sharp corners.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvexOffset;

fn is_convex(points: &[Point2<f64>]) -> bool {
    let n = points.len();
    let mut sign = 0.0;
    for i in 0..n {
        let e1 = points[(i + 1) % n] - points[i];
        let e2 = points[(i + 2) % n] - points[(i + 1) % n];
        let c = cross(&e1, &e2);
        if c.abs() < EPSILON {
            continue;
        }
        if sign == 0.0 {
            sign = c.signum();
        } else if c.signum() != sign {
            return false;
        }
    }
    true
}

/// Keeps the part of `poly` on the side of the line through `origin` that `normal` points to.
fn clip(poly: &[Point2<f64>], origin: &Point2<f64>, normal: &Vector2<f64>) -> Vec<Point2<f64>> {
    let mut out = Vec::with_capacity(poly.len() + 1);
    let n = poly.len();
    for i in 0..n {
        let (cur, next) = (poly[i], poly[(i + 1) % n]);
        let d0 = dot(&(cur - *origin), normal);
        let d1 = dot(&(next - *origin), normal);
        if d0 >= 0.0 {
            out.push(cur);
        }
        if (d0 >= 0.0) != (d1 >= 0.0) {
            out.push(cur + (next - cur) * (d0 / (d0 - d1)));
        }
    }
    out.dedup_by(|a, b| distance(a, b) < EPSILON);
    out
}

/// Where the lines `p + t*e` and `q + s*f` cross; `q` if they are parallel.
fn intersect(p: &Point2<f64>, e: &Vector2<f64>, q: &Point2<f64>, f: &Vector2<f64>) -> Point2<f64> {
    let denom = cross(e, f);
    if denom.abs() < EPSILON {
        return *q;
    }
    *p + *e * (cross(&(*q - *p), f) / denom)
}

impl GeometryEngine for ConvexOffset {
    fn parallel_offset(&self, boundary: &Ring, distance: f64, side: OffsetSide) -> Result<Vec<Ring>> {
        if boundary.is_empty() {
            return Ok(Vec::new());
        }
        let pts = boundary.points();
        if !is_convex(pts) {
            return Err(CamError::invalid("boundary", "offsetting needs a convex ring"));
        }
        let n = pts.len();
        // Inward normal of each edge
        let turn = if boundary.is_clockwise() { -1.0 } else { 1.0 };
        let mut edges = Vec::with_capacity(n);
        for i in 0..n {
            let e = pts[(i + 1) % n] - pts[i];
            if let Some(e) = unit(&e) {
                edges.push((pts[i], e, perp(&e) * turn));
            }
        }

        let offset: Vec<Point2<f64>> = match side {
            OffsetSide::Inward => edges.iter().fold(pts.to_vec(), |poly, (p, _, normal)| {
                clip(&poly, &(*p + *normal * distance), normal)
            }),
            OffsetSide::Outward => (0..edges.len())
                .map(|i| {
                    let (p0, e0, n0) = edges[(i + edges.len() - 1) % edges.len()];
                    let (p1, e1, n1) = edges[i];
                    intersect(&(p0 - n0 * distance), &e0, &(p1 - n1 * distance), &e1)
                })
                .collect(),
        };

        let ring = Ring::new(offset);
        if ring.is_empty() || ring.signed_area().abs() < EPSILON {
            return Ok(Vec::new());
        }
        Ok(vec![ring])
    }
}

/// Medial axis of an axis aligned rectangle: a spine along the long side, then a branch
/// into each corner.
#[derive(Debug, Clone, Copy, Default)]
pub struct RectMedialAxis;

fn rectangle_bounds(ring: &Ring) -> Option<(Point2<f64>, Point2<f64>)> {
    let pts = ring.points();
    if pts.len() != 4 {
        return None;
    }
    for i in 0..4 {
        let e = pts[(i + 1) % 4] - pts[i];
        if e.x.abs() > EPSILON && e.y.abs() > EPSILON {
            return None;
        }
    }
    let lo = Point2::new(
        pts.iter().map(|p| p.x).fold(f64::INFINITY, f64::min),
        pts.iter().map(|p| p.y).fold(f64::INFINITY, f64::min),
    );
    let hi = Point2::new(
        pts.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max),
        pts.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max),
    );
    Some((lo, hi))
}

/// Circles from `from` down the diagonal into `corner`, each removing about `width`.
fn corner_branch(from: &Circle, corner: &Point2<f64>, width: f64) -> Result<Vec<Circle>> {
    let span = distance(&from.center, corner) - SQRT_2 * MIN_MIC_RADIUS;
    let dir = match unit(&(*corner - from.center)) {
        Some(d) if span > EPSILON => d,
        _ => return Ok(Vec::new()),
    };
    // The front of a circle sliding into a right angle corner advances this much slower
    let step = width / (1.0 - 1.0 / SQRT_2);
    Ok(StepSeq::new(0.0, span, step, true)?
        .skip(1)
        .map(|t| Circle::new(from.center + dir * t, from.radius - t / SQRT_2))
        .collect())
}

impl MedialAxisEngine for RectMedialAxis {
    fn medial_axis(
        &self,
        boundary: &Ring,
        region: Region,
        width: f64,
        clockwise: bool,
    ) -> Result<MedialAxisGraph> {
        if region != Region::Interior {
            return Err(CamError::invalid("region", "only rectangle interiors are supported"));
        }
        let (lo, hi) = rectangle_bounds(boundary)
            .ok_or_else(|| CamError::invalid("boundary", "not an axis aligned rectangle"))?;
        let (w, h) = (hi.x - lo.x, hi.y - lo.y);
        let r = w.min(h) / 2.0;
        if r <= EPSILON {
            return Ok(MedialAxisGraph::default());
        }
        let mid = Point2::new((lo.x + hi.x) / 2.0, (lo.y + hi.y) / 2.0);
        let u = if w >= h {
            Vector2::new(1.0, 0.0)
        } else {
            Vector2::new(0.0, 1.0)
        };
        let half = w.max(h) / 2.0 - r;
        let s0 = mid - u * half;
        let start = Circle::new(s0, r);

        let mut steps: Vec<WalkStep> = StepSeq::new(0.0, 2.0 * half, width, true)?
            .skip(1)
            .map(|t| WalkStep::next(Circle::new(s0 + u * t, r)))
            .collect();
        let end = steps.last().map_or(start, |s| s.circle);

        let corners = [
            Point2::new(lo.x, lo.y),
            Point2::new(lo.x, hi.y),
            Point2::new(hi.x, hi.y),
            Point2::new(hi.x, lo.y),
        ];
        let (far, near): (Vec<_>, Vec<_>) = corners
            .iter()
            .partition(|c| dot(&(**c - mid), &u) > 0.0);
        let branches = far
            .into_iter()
            .map(|c| (end, c))
            .chain(near.into_iter().map(|c| (start, c)));

        let mut continuing = true;
        for (from, corner) in branches {
            let circles = corner_branch(&from, corner, width)?;
            for (i, c) in circles.into_iter().enumerate() {
                if i == 0 && !continuing {
                    steps.push(WalkStep::branch(from, c));
                } else {
                    steps.push(WalkStep::next(c));
                }
            }
            continuing = false;
        }
        Ok(MedialAxisGraph::from_walk(start, &steps, clockwise))
    }
}
