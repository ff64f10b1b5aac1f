use std::str::FromStr;

use nalgebra::geometry::Point2;
use tracing::warn;

use super::{clear_height, non_negative, retract, Operation};
use crate::error::{CamError, Result};
use crate::feeds::FeedKind;
use crate::gcode::{x, xy, y, z};
use crate::geometry::{StepSeq, EPSILON};
use crate::machine::{Machine, Rate, Stepover};
use crate::tools::Tool;

/// Direction of the long passes of a zig-zag pocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanAxis {
    X,
    Y,
}

impl FromStr for ScanAxis {
    type Err = CamError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "x" | "X" => Ok(ScanAxis::X),
            "y" | "Y" => Ok(ScanAxis::Y),
            _ => Err(CamError::invalid(
                "axis",
                format!("unsupported milling axis '{s}', expected x or y"),
            )),
        }
    }
}

/// Rectangular pocket cleared in zig-zag passes.
#[derive(Debug, Clone)]
pub struct RectPocket {
    pub p1: Point2<f64>,
    pub p2: Point2<f64>,
    pub z: f64,
    pub depth: f64,
    pub stepover: Stepover,
    pub stepdown: Stepover,
    pub axis: ScanAxis,
    pub clearz: Option<f64>,
    pub auto_clear: bool,
    pub tool: Option<Tool>,
}

impl RectPocket {
    pub fn new(p1: Point2<f64>, p2: Point2<f64>, z: f64, depth: f64) -> Self {
        RectPocket {
            p1,
            p2,
            z,
            depth,
            stepover: Stepover::PercentOfDiameter(50.0),
            stepdown: Stepover::PercentOfDiameter(50.0),
            axis: ScanAxis::X,
            clearz: None,
            auto_clear: true,
            tool: None,
        }
    }
}

/// Moves `from` toward `to` by `r`.
fn inset(from: f64, to: f64, r: f64) -> f64 {
    if from < to {
        from + r
    } else {
        from - r
    }
}

impl Operation for RectPocket {
    fn comment(&self) -> Option<String> {
        Some(format!(
            "RectPocket {:.4},{:.4} to {:.4},{:.4}, depth={:.3}",
            self.p1.x, self.p1.y, self.p2.x, self.p2.y, self.depth
        ))
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
        let r = m.tool()?.radius();
        let (w, h) = ((self.p2.x - self.p1.x).abs(), (self.p2.y - self.p1.y).abs());
        if w < 2.0 * r || h < 2.0 * r {
            warn!("pocket {:.4} x {:.4} is narrower than the tool, skipping", w, h);
            return Ok(());
        }
        let x1 = inset(self.p1.x, self.p2.x, r);
        let x2 = inset(self.p2.x, self.p1.x, r);
        let y1 = inset(self.p1.y, self.p2.y, r);
        let y2 = inset(self.p2.y, self.p1.y, r);

        let clearz = clear_height(m, self.z, self.clearz);
        let stepover = m.calc_stepover(self.stepover, self.depth)?;
        let stepdown = m.calc_stepdown(self.stepdown, self.depth)?;
        let plunge = m.resolve_rate(Rate::Kind(FeedKind::Plunge))?;

        for zc in m.zstep(self.z, self.z - self.depth, stepdown)? {
            if self.auto_clear {
                m.goto(z(clearz))?;
            }
            m.goto(xy(x1, y1))?;
            m.cut(z(zc).feed(plunge))?;

            let mut forward = true;
            match self.axis {
                ScanAxis::X => {
                    for yr in StepSeq::new(y1, y2, stepover, true)? {
                        // The plunge already left the tool on the first row
                        if (yr - y1).abs() > EPSILON {
                            m.cut(y(yr))?;
                        }
                        m.cut(x(if forward { x2 } else { x1 }))?;
                        forward = !forward;
                    }
                }
                ScanAxis::Y => {
                    for xr in StepSeq::new(x1, x2, stepover, true)? {
                        if (xr - x1).abs() > EPSILON {
                            m.cut(x(xr))?;
                        }
                        m.cut(y(if forward { y2 } else { y1 }))?;
                        forward = !forward;
                    }
                }
            }
        }

        if self.auto_clear {
            retract(m, clearz)?;
        }
        Ok(())
    }
}

/// Dog-bone reliefs at the four corners of a rectangular pocket, so a square cornered
/// part can seat fully.
#[derive(Debug, Clone)]
pub struct RectPocketCornerRelief {
    pub p1: Point2<f64>,
    pub p2: Point2<f64>,
    pub z: f64,
    pub depth: f64,
    pub stepdown: Stepover,
    pub clearz: Option<f64>,
    pub auto_clear: bool,
    pub tool: Option<Tool>,
}

impl RectPocketCornerRelief {
    pub fn new(p1: Point2<f64>, p2: Point2<f64>, z: f64, depth: f64) -> Self {
        RectPocketCornerRelief {
            p1,
            p2,
            z,
            depth,
            stepdown: Stepover::PercentOfDiameter(50.0),
            clearz: None,
            auto_clear: true,
            tool: None,
        }
    }
}

impl Operation for RectPocketCornerRelief {
    fn comment(&self) -> Option<String> {
        Some("RectPocketCornerRelief".to_string())
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
        // A little oversize so the corner is fully cleared
        let r = 1.1 * m.tool()?.radius();
        let off = r / (2.0 * 2f64.sqrt());
        let (xl, xh) = (self.p1.x.min(self.p2.x) + r, self.p1.x.max(self.p2.x) - r);
        let (yl, yh) = (self.p1.y.min(self.p2.y) + r, self.p1.y.max(self.p2.y) - r);
        let clearz = clear_height(m, self.z, self.clearz);
        let stepdown = m.calc_stepdown(self.stepdown, self.depth)?;

        let corners = [
            (Point2::new(xl, yl), -off, -off),
            (Point2::new(xl, yh), -off, off),
            (Point2::new(xh, yh), off, off),
            (Point2::new(xh, yl), off, -off),
        ];
        for (corner, dx, dy) in corners.iter() {
            m.goto(z(self.z))?;
            for zc in m.zstep(self.z, self.z - self.depth, stepdown)? {
                m.goto(xy(corner.x, corner.y))?;
                m.cut(z(zc))?;
                m.cut(xy(corner.x + dx, corner.y + dy))?;
                m.cut(xy(corner.x, corner.y))?;
            }
        }

        if self.auto_clear {
            retract(m, clearz)?;
        }
        Ok(())
    }
}
