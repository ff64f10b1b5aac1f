use nalgebra::geometry::Point2;

use crate::error::{CamError, Result};
use crate::feeds::FeedKind;
use crate::gcode::{x, xy, y, z};
use crate::geometry::{StepSeq, EPSILON};
use crate::machine::{CenterArc, Machine, Rate, Stepover};
use crate::operations::{clear_height, positive, retract, Operation};
use crate::tools::Tool;

/// Tool radii the facing passes run out past each side of the stock.
pub const FACING_OVERRUN: f64 = 1.05;

/// Faces the rectangle between `p1` and `p2` with loops that close in from the front and
/// back edges toward the middle.
///
/// Each loop climbs along the front edge right to left and along the back edge left to
/// right, with rounded corners so the cutter never stops in the material. The moves between
/// the two edges are rapids outside the stock.
#[derive(Debug, Clone)]
pub struct HsmFacing {
    pub p1: Point2<f64>,
    pub p2: Point2<f64>,
    pub z: f64,
    pub depth: f64,
    pub stepover: Stepover,
    /// `None` faces the whole depth in one level.
    pub stepdown: Option<Stepover>,
    pub clearz: Option<f64>,
    pub auto_clear: bool,
    pub tool: Option<Tool>,
}

impl HsmFacing {
    pub fn new(p1: Point2<f64>, p2: Point2<f64>, z: f64, depth: f64) -> Self {
        HsmFacing {
            p1,
            p2,
            z,
            depth,
            stepover: Stepover::PercentOfDiameter(90.0),
            stepdown: None,
            clearz: None,
            auto_clear: true,
            tool: None,
        }
    }
}

impl Operation for HsmFacing {
    fn comment(&self) -> Option<String> {
        Some(format!(
            "HSMFacing {:.4},{:.4} to {:.4},{:.4}, depth={:.3}",
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
        positive("depth", self.depth)?;
        if (self.p2.x - self.p1.x).abs() < EPSILON || (self.p2.y - self.p1.y).abs() < EPSILON {
            return Err(CamError::invalid("p2", "facing area is empty"));
        }
        Ok(())
    }

    fn generate(&self, m: &mut Machine) -> Result<()> {
        let r = m.tool()?.radius();
        let (xl, xh) = (
            self.p1.x.min(self.p2.x) - FACING_OVERRUN * r,
            self.p1.x.max(self.p2.x) + FACING_OVERRUN * r,
        );
        let (yl, yh) = (self.p1.y.min(self.p2.y), self.p1.y.max(self.p2.y));
        let clearz = clear_height(m, self.z, self.clearz);
        let stepover = m.calc_stepover(self.stepover, self.depth)?;
        let stepdown = m.calc_stepdown(
            self.stepdown.unwrap_or(Stepover::Absolute(self.depth)),
            self.depth,
        )?;
        // Each loop takes a stepover off the front and the back; the last two rows meet
        let offsets: Vec<f64> = StepSeq::new(0.0, (yh - yl) / 2.0, stepover, true)?
            .skip(1)
            .collect();

        let first = match offsets.first() {
            Some(&off) => off,
            None => return Ok(()),
        };

        let corner = |cx: f64, cy: f64, from: f64, to: f64| {
            CenterArc::new(Point2::new(cx, cy), r, from, to)
        };

        for zc in m.zstep(self.z, self.z - self.depth, stepdown)? {
            m.goto(z(clearz))?;
            m.goto(xy(xh, yl + first))?;
            // Clear of the stock, so no need to feed down
            m.goto(z(zc))?;
            for (i, &off) in offsets.iter().enumerate() {
                let front = yl - r + off;
                let back = yh + r - off;
                if i > 0 {
                    m.goto(y(front + r))?;
                }
                m.cut_arc_center_rad(&corner(xh - r, front + r, 0.0, -90.0))?;
                m.cut(x(xl + r))?;
                m.cut_arc_center_rad(&corner(xl + r, front + r, -90.0, -180.0))?;
                if back - front > 2.0 * r + EPSILON {
                    m.goto(y(back - r))?;
                }
                m.cut_arc_center_rad(&corner(xl + r, back - r, 180.0, 90.0))?;
                m.cut(x(xh - r))?;
                m.cut_arc_center_rad(&corner(xh - r, back - r, 90.0, 0.0))?;
            }
        }

        if self.auto_clear {
            retract(m, clearz)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Motion;
    use crate::operations::run;
    use crate::testutil::{arcs, test_machine_with_tool};

    #[test]
    fn test_facing_covers_stock() {
        let (mut m, _) = test_machine_with_tool("1/2in spiral upcut");
        let mut op = HsmFacing::new(Point2::new(0.0, 0.0), Point2::new(3.0, 2.0), 0.0, 0.1);
        op.stepover = Stepover::Absolute(0.3);
        run(&mut m, &op).unwrap();

        let mut rows: Vec<f64> = m
            .segments()
            .iter()
            .filter(|s| s.motion == Motion::Linear && s.from.y == s.to.y && s.from.x != s.to.x)
            .map(|s| s.to.y.unwrap())
            .collect();
        rows.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!(rows.len() >= 4);
        assert_eq!(rows.len() % 2, 0);
        assert!(rows[0] - 0.25 <= 1e-9);
        assert!(rows[rows.len() - 1] + 0.25 >= 2.0 - 1e-9);
        assert!(rows.windows(2).all(|w| w[1] - w[0] <= 0.5 + 1e-9));
        // The last two rows meet in the middle
        let mid = rows.len() / 2;
        assert!((rows[mid - 1] - 0.75).abs() < 1e-9);
        assert!((rows[mid] - 1.25).abs() < 1e-9);
        assert_eq!(arcs(&m).len(), 2 * rows.len());
    }

    #[test]
    fn test_facing_rapids_stay_off_stock() {
        let (mut m, _) = test_machine_with_tool("1/2in spiral upcut");
        let op = HsmFacing::new(Point2::new(3.0, 2.0), Point2::new(0.0, 0.0), 0.0, 0.1);
        run(&mut m, &op).unwrap();
        let edge = FACING_OVERRUN * 0.25;
        for s in m.segments().iter().filter(|s| s.motion == Motion::Rapid) {
            if s.to.z.map_or(false, |z| z < 0.0) {
                let x = s.to.x.unwrap();
                assert!(
                    (x + edge).abs() < 1e-9 || (x - 3.0 - edge).abs() < 1e-9,
                    "rapid at x={x}"
                );
            }
        }
        assert_eq!(m.position().z, Some(0.125));
        assert_eq!(m.feed_stack_depth(), 0);
    }

    #[test]
    fn test_facing_levels() {
        let (mut m, _) = test_machine_with_tool("1/2in spiral upcut");
        let mut op = HsmFacing::new(Point2::new(0.0, 0.0), Point2::new(1.0, 1.0), 0.0, 0.2);
        op.stepdown = Some(Stepover::Absolute(0.1));
        run(&mut m, &op).unwrap();
        let levels: Vec<f64> = m
            .segments()
            .iter()
            .filter(|s| s.motion == Motion::Rapid && s.from.z != s.to.z)
            .filter_map(|s| s.to.z)
            .filter(|&z| z < 0.0)
            .collect();
        assert!(levels.len() >= 2);
        assert!((levels.last().unwrap() + 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_facing_empty_area() {
        let op = HsmFacing::new(Point2::new(0.0, 1.0), Point2::new(3.0, 1.0), 0.0, 0.1);
        assert!(matches!(
            op.validate(),
            Err(CamError::InvalidInput { name: "p2", .. })
        ));
    }
}
