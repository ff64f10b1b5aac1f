use nalgebra::geometry::Point2;
use tracing::warn;

use super::{clear_height, non_negative, retract, Operation};
use crate::error::Result;
use crate::feeds::FeedKind;
use crate::gcode::{xy, z};
use crate::geometry::{distance, Ring, EPSILON};
use crate::machine::{Machine, Rate, Stepover};
use crate::tools::Tool;

/// Follows a polyline with the tool center, stepping down to depth. A path whose last point
/// returns to its first is cut as a loop without lifting between levels.
#[derive(Debug, Clone)]
pub struct CoordProfile {
    pub points: Vec<Point2<f64>>,
    pub z: f64,
    pub depth: f64,
    pub stepdown: Stepover,
    pub clearz: Option<f64>,
    pub auto_clear: bool,
    pub tool: Option<Tool>,
}

impl CoordProfile {
    pub fn new(points: Vec<Point2<f64>>, z: f64, depth: f64) -> Self {
        CoordProfile {
            points,
            z,
            depth,
            stepdown: Stepover::PercentOfDiameter(50.0),
            clearz: None,
            auto_clear: true,
            tool: None,
        }
    }

    pub fn from_ring(ring: &Ring, z: f64, depth: f64) -> Self {
        CoordProfile::new(ring.closed_points(), z, depth)
    }

    pub fn is_closed(&self) -> bool {
        match (self.points.first(), self.points.last()) {
            (Some(a), Some(b)) => self.points.len() > 2 && distance(a, b) < EPSILON,
            _ => false,
        }
    }
}

impl Operation for CoordProfile {
    fn comment(&self) -> Option<String> {
        Some(format!("CoordProfile {} points, depth={:.3}", self.points.len(), self.depth))
    }

    fn tool(&self) -> Option<&Tool> {
        self.tool.as_ref()
    }

    fn feed(&self) -> Option<Rate> {
        Some(Rate::Kind(FeedKind::Cut))
    }

    fn validate(&self) -> Result<()> {
        non_negative("depth", self.depth)
    }

    fn generate(&self, m: &mut Machine) -> Result<()> {
        let (first, rest) = match self.points.split_first() {
            Some((first, rest)) if !rest.is_empty() => (first, rest),
            _ => {
                warn!("profile with {} points, skipping", self.points.len());
                return Ok(());
            }
        };
        let closed = self.is_closed();
        let clearz = clear_height(m, self.z, self.clearz);
        let stepdown = m.calc_stepdown(self.stepdown, self.depth)?;
        let plunge = m.resolve_rate(Rate::Kind(FeedKind::Plunge))?;

        let mut positioned = false;
        for zc in m.zstep(self.z, self.z - self.depth, stepdown)? {
            if !positioned || !closed {
                m.goto(z(clearz))?;
                m.goto(xy(first.x, first.y))?;
                positioned = true;
            }
            m.cut(z(zc).feed(plunge))?;
            for p in rest {
                m.cut(xy(p.x, p.y))?;
            }
        }

        if self.auto_clear {
            retract(m, clearz)?;
        }
        Ok(())
    }
}
