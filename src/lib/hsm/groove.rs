use std::str::FromStr;

use nalgebra::geometry::Point2;
use nalgebra::Vector2;

use crate::error::{CamError, Result};
use crate::feeds::FeedKind;
use crate::gcode::{xy, z};
use crate::geometry::{angle_between, perp, unit, StepSeq, EPSILON};
use crate::machine::{Approach, CenterArc, Machine, Rate, Stepover, ToolSide};
use crate::operations::{clear_height, non_negative, positive, run, HelicalDrill, Operation};
use crate::tools::Tool;

/// Shape of the small arcs a groove is milled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrooveStyle {
    /// Full circle at every step.
    Circle,
    /// Half circle sweeping across the front of the cut.
    Semicircle,
    /// Half circles alternating direction.
    Swing,
}

impl FromStr for GrooveStyle {
    type Err = CamError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "circle" => Ok(GrooveStyle::Circle),
            "semicircle" => Ok(GrooveStyle::Semicircle),
            "swing" => Ok(GrooveStyle::Swing),
            _ => Err(CamError::invalid(
                "style",
                format!("unknown groove style '{s}', expected circle, semicircle or swing"),
            )),
        }
    }
}

/// Distances the first and last arc centers sit beyond the ends of a groove.
fn overrun(safety_margin: Option<[f64; 2]>, through: bool, width: f64) -> (f64, f64) {
    let [start, end] = safety_margin.unwrap_or(if through { [1.0, 1.0] } else { [0.0, 0.0] });
    let half = width / 2.0;
    if through {
        (start * half, end * half)
    } else {
        (start * half - half, end * half - half)
    }
}

fn heading_of(dir: &Vector2<f64>) -> f64 {
    dir.y.atan2(dir.x).to_degrees()
}

/// Cuts the short way around `vertex` from the direction `from` to the direction `to`.
/// The tool must already sit at `vertex + from * radius`.
fn turn_around(
    m: &mut Machine,
    vertex: Point2<f64>,
    radius: f64,
    from: &Vector2<f64>,
    to: &Vector2<f64>,
) -> Result<()> {
    let turn = angle_between(from, to);
    if turn.abs() < EPSILON {
        return Ok(());
    }
    let start = heading_of(from);
    let arc =
        CenterArc::new(vertex, radius, start, start + turn.to_degrees()).clockwise(turn < 0.0);
    m.cut_arc_center_rad(&arc)
}

/// Cuts the wall `wall` to the right of a run of segments, each given as its end points and
/// direction. Outside corners swing around the vertex; inside corners cut to where the two
/// walls meet.
fn cut_wall(
    m: &mut Machine,
    legs: &[(Point2<f64>, Point2<f64>, Vector2<f64>)],
    wall: f64,
) -> Result<()> {
    for (i, &(from, to, dir)) in legs.iter().enumerate() {
        let n = -perp(&dir);
        if i == 0 {
            let p = from + n * wall;
            m.cut(xy(p.x, p.y))?;
        }
        let next = match legs.get(i + 1) {
            Some(&(_, _, next)) => next,
            None => {
                let p = to + n * wall;
                return m.cut(xy(p.x, p.y));
            }
        };
        let n2 = -perp(&next);
        let meet = 1.0 + n.dot(&n2);
        if angle_between(&dir, &next) < -EPSILON && meet > EPSILON {
            let p = to + (n + n2) * (wall / meet);
            m.cut(xy(p.x, p.y))?;
        } else {
            let p = to + n * wall;
            m.cut(xy(p.x, p.y))?;
            turn_around(m, to, wall, &n, &n2)?;
        }
    }
    Ok(())
}

/// A straight slot of `width` from `p1` to `p2`, cut at full depth with small arcs stepping
/// along its length.
///
/// `safety_margin` is in half widths and moves the first and last arc centers out past the
/// ends; it defaults to one for a through slot. A blind slot keeps the cutter inside the
/// capsule around `p1` and `p2`.
#[derive(Debug, Clone)]
pub struct HsmStraightGroove {
    pub p1: Point2<f64>,
    pub p2: Point2<f64>,
    pub width: f64,
    pub z: f64,
    pub depth: f64,
    pub stepover: Stepover,
    pub style: GrooveStyle,
    pub safety_margin: Option<[f64; 2]>,
    /// Left on each wall by the arcs and removed with one pass down each side.
    pub rough_margin: f64,
    pub through: bool,
    /// Enter with a helix at the start instead of from outside the stock.
    pub plunge: bool,
    pub clearz: Option<f64>,
    pub tool: Option<Tool>,
}

impl HsmStraightGroove {
    pub fn new(p1: Point2<f64>, p2: Point2<f64>, width: f64, z: f64, depth: f64) -> Self {
        HsmStraightGroove {
            p1,
            p2,
            width,
            z,
            depth,
            stepover: Stepover::PercentOfDiameter(12.5),
            style: GrooveStyle::Semicircle,
            safety_margin: None,
            rough_margin: 0.0,
            through: true,
            plunge: false,
            clearz: None,
            tool: None,
        }
    }

    /// The same groove as a one segment path.
    fn as_path(&self) -> HsmPathGroove {
        HsmPathGroove {
            path: vec![self.p1, self.p2],
            width: self.width,
            z: self.z,
            depth: self.depth,
            stepover: self.stepover,
            style: self.style,
            safety_margin: self.safety_margin,
            rough_margin: self.rough_margin,
            through: self.through,
            plunge: self.plunge,
            clearz: self.clearz,
            tool: None,
        }
    }
}

impl Operation for HsmStraightGroove {
    fn comment(&self) -> Option<String> {
        Some(format!(
            "HSMStraightGroove p1={:.4},{:.4} p2={:.4},{:.4} width={:.4} z={:.4}",
            self.p1.x, self.p1.y, self.p2.x, self.p2.y, self.width, self.z
        ))
    }

    fn tool(&self) -> Option<&Tool> {
        self.tool.as_ref()
    }

    fn feed(&self) -> Option<Rate> {
        Some(Rate::Kind(FeedKind::Cut))
    }

    fn validate(&self) -> Result<()> {
        if unit(&(self.p2 - self.p1)).is_none() {
            return Err(CamError::invalid("p2", "groove has no length"));
        }
        self.as_path().validate()
    }

    fn generate(&self, m: &mut Machine) -> Result<()> {
        self.as_path().generate(m)
    }
}

/// A groove of `width` following an open polyline, cut like [`HsmStraightGroove`] one
/// segment at a time.
///
/// Each interior vertex gets a full circle so the outside of the turn is cleared whatever
/// its angle. The wall passes left by `rough_margin` follow each side of the path and swing
/// around the vertices.
#[derive(Debug, Clone)]
pub struct HsmPathGroove {
    pub path: Vec<Point2<f64>>,
    pub width: f64,
    pub z: f64,
    pub depth: f64,
    pub stepover: Stepover,
    pub style: GrooveStyle,
    pub safety_margin: Option<[f64; 2]>,
    pub rough_margin: f64,
    pub through: bool,
    pub plunge: bool,
    pub clearz: Option<f64>,
    pub tool: Option<Tool>,
}

impl HsmPathGroove {
    pub fn new(path: Vec<Point2<f64>>, width: f64, z: f64, depth: f64) -> Self {
        HsmPathGroove {
            path,
            width,
            z,
            depth,
            stepover: Stepover::PercentOfDiameter(12.5),
            style: GrooveStyle::Semicircle,
            safety_margin: None,
            rough_margin: 0.0,
            through: true,
            plunge: false,
            clearz: None,
            tool: None,
        }
    }

    /// Start, direction and length of each segment.
    fn segments(&self) -> Result<Vec<(Point2<f64>, Vector2<f64>, f64)>> {
        if self.path.len() < 2 {
            return Err(CamError::invalid("path", "a groove needs at least two points"));
        }
        self.path
            .windows(2)
            .map(|w| {
                let along = w[1] - w[0];
                let dir = unit(&along)
                    .ok_or_else(|| CamError::invalid("path", "repeated point in groove path"))?;
                Ok((w[0], dir, along.norm()))
            })
            .collect()
    }
}

impl Operation for HsmPathGroove {
    fn comment(&self) -> Option<String> {
        Some(format!(
            "HSMPathGroove {} points, width={:.4} z={:.4}",
            self.path.len(),
            self.width,
            self.z
        ))
    }

    fn tool(&self) -> Option<&Tool> {
        self.tool.as_ref()
    }

    fn feed(&self) -> Option<Rate> {
        Some(Rate::Kind(FeedKind::Cut))
    }

    fn validate(&self) -> Result<()> {
        positive("width", self.width)?;
        positive("depth", self.depth)?;
        non_negative("rough_margin", self.rough_margin)?;
        self.segments().map(|_| ())
    }

    fn generate(&self, m: &mut Machine) -> Result<()> {
        let tool_d = m.tool()?.diameter();
        let r = tool_d / 2.0;
        if self.width + EPSILON < tool_d {
            return Err(CamError::invalid(
                "width",
                format!("{:.4} is narrower than the {:.4} tool", self.width, tool_d),
            ));
        }
        let segments = self.segments()?;
        let last = segments.len() - 1;
        let bottom = self.z - self.depth;
        let path_r = (self.width - 2.0 * self.rough_margin) / 2.0 - r;
        let (before, after) = overrun(self.safety_margin, self.through, self.width);
        let clearz = clear_height(m, self.z, self.clearz);
        let stepover = m.calc_stepover(self.stepover, self.depth)?;
        let plunge = m.resolve_rate(Rate::Kind(FeedKind::Plunge))?;
        let (p0, dir0, _) = segments[0];
        let (pn, dirn, lenn) = segments[last];
        let start = p0 - dir0 * before;
        let end = pn + dirn * (lenn + after);

        m.goto(z(clearz))?;
        if self.plunge {
            let entry = HelicalDrill {
                center: start,
                z: self.z,
                outer_rad: r.min(self.width / 2.0),
                depth: self.depth,
                stepdown: Stepover::PercentOfDiameter(25.0),
                clockwise: true,
                clearz: Some(clearz),
                auto_clear: false,
                tool: None,
            };
            run(m, &entry)?;
            let first = entry.outer_rad + stepover;
            if first < self.width / 2.0 {
                for rad in StepSeq::new(first, self.width / 2.0, stepover, true)? {
                    let ring = CenterArc::full(start, rad, 0.0)
                        .clockwise(false)
                        .side(ToolSide::Inner)
                        .approach(Approach::Cut);
                    m.cut_arc_center_rad(&ring)?;
                }
            }
            m.cut(xy(start.x, start.y))?;
        } else {
            m.goto(xy(start.x, start.y))?;
            if self.through {
                // Starts off the end of the stock
                m.goto(z(bottom))?;
            } else {
                m.cut(z(bottom).feed(plunge))?;
            }
        }

        let mut forward = true;
        for (i, &(p, dir, len)) in segments.iter().enumerate() {
            let heading = heading_of(&dir);
            let from = if i == 0 { -before } else { 0.0 };
            let to = if i == last { len + after } else { len };
            let ts: Vec<f64> = StepSeq::new(from, to, stepover, true)?.collect();
            for (k, &t) in ts.iter().enumerate() {
                // The previous segment's vertex circle already sits here
                if i > 0 && k == 0 {
                    continue;
                }
                let c = p + dir * t;
                let arc = if i < last && k == ts.len() - 1 {
                    CenterArc::full(c, path_r, heading - 90.0).clockwise(false)
                } else {
                    match self.style {
                        GrooveStyle::Circle => {
                            CenterArc::full(c, path_r, heading - 90.0).clockwise(false)
                        }
                        GrooveStyle::Semicircle => {
                            CenterArc::new(c, path_r, heading - 90.0, heading + 90.0)
                                .clockwise(false)
                        }
                        GrooveStyle::Swing if forward => {
                            CenterArc::new(c, path_r, heading, heading - 180.0).clockwise(false)
                        }
                        GrooveStyle::Swing => CenterArc::new(c, path_r, heading, heading + 180.0),
                    }
                };
                m.cut_arc_center_rad(&arc.approach(Approach::Cut))?;
                forward = !forward;
            }
        }

        if self.rough_margin > 0.0 {
            let wall = self.width / 2.0 - r;
            let ahead: Vec<_> = segments
                .iter()
                .enumerate()
                .map(|(i, &(p, dir, len))| {
                    let from = if i == 0 { start } else { p };
                    let to = if i == last { end } else { p + dir * len };
                    (from, to, dir)
                })
                .collect();
            let back: Vec<_> = ahead.iter().rev().map(|&(a, b, d)| (b, a, -d)).collect();
            cut_wall(m, &back, wall)?;
            cut_wall(m, &ahead, wall)?;
        }

        m.goto(z(clearz))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::distance;
    use crate::machine::Motion;
    use crate::testutil::{arcs, test_machine_with_tool};

    fn groove(style: GrooveStyle) -> HsmStraightGroove {
        let mut g = HsmStraightGroove::new(Point2::new(1.0, 1.0), Point2::new(3.0, 1.0), 0.5, 0.0, 0.25);
        g.style = style;
        g.stepover = Stepover::Absolute(0.1);
        g
    }

    #[test]
    fn test_through_groove_overruns_ends() {
        let (mut m, _) = test_machine_with_tool("1/8in spiral upcut");
        run(&mut m, &groove(GrooveStyle::Circle)).unwrap();
        let arcs = arcs(&m);
        let centers: Vec<Point2<f64>> = arcs
            .iter()
            .map(|s| match s.motion {
                Motion::Arc { center, .. } => center,
                _ => unreachable!(),
            })
            .collect();
        // Half a width past each end, 0.1 apart
        assert!((centers[0].x - 0.75).abs() < 1e-9);
        assert!((centers.last().unwrap().x - 3.25).abs() < 1e-9);
        assert_eq!(centers.len(), 26);
        for (s, c) in arcs.iter().zip(&centers) {
            let from = Point2::new(s.from.x.unwrap(), s.from.y.unwrap());
            assert!((distance(&from, c) - 0.1875).abs() < 1e-9);
            assert_eq!(s.to.z, Some(-0.25));
        }
        assert_eq!(m.position().z, Some(0.125));
    }

    #[test]
    fn test_blind_groove_stays_in_capsule() {
        let (mut m, _) = test_machine_with_tool("1/8in spiral upcut");
        let mut g = groove(GrooveStyle::Semicircle);
        g.through = false;
        g.plunge = true;
        run(&mut m, &g).unwrap();
        for s in m.segments().iter().filter(|s| s.to.z == Some(-0.25)) {
            let x = s.to.x.unwrap();
            assert!(x >= 1.0 - 0.25 + 0.0625 - 1e-9, "x={x}");
            assert!(x <= 3.0 + 0.25 - 0.0625 + 1e-9, "x={x}");
        }
        // No rapid below the top of the stock
        assert!(m
            .segments()
            .iter()
            .filter(|s| s.motion == Motion::Rapid)
            .all(|s| s.to.z.map_or(true, |z| z >= 0.0)));
    }

    #[test]
    fn test_swing_alternates() {
        let (mut m, _) = test_machine_with_tool("1/8in spiral upcut");
        run(&mut m, &groove(GrooveStyle::Swing)).unwrap();
        let dirs: Vec<bool> = arcs(&m)
            .iter()
            .map(|s| match s.motion {
                Motion::Arc { clockwise, .. } => clockwise,
                _ => unreachable!(),
            })
            .collect();
        assert!(dirs.windows(2).all(|w| w[0] != w[1]));
    }

    #[test]
    fn test_wall_finish() {
        let (mut m, _) = test_machine_with_tool("1/8in spiral upcut");
        let mut g = groove(GrooveStyle::Semicircle);
        g.rough_margin = 0.02;
        run(&mut m, &g).unwrap();
        let walls = m
            .segments()
            .iter()
            .filter(|s| s.motion == Motion::Linear)
            .filter(|s| s.to.y.map_or(false, |y| (y - 1.0).abs() > 0.18))
            .count();
        assert!(walls >= 3);
        let arc_r = arcs(&m)
            .iter()
            .map(|s| match s.motion {
                Motion::Arc { center, .. } => {
                    distance(&center, &Point2::new(s.from.x.unwrap(), s.from.y.unwrap()))
                }
                _ => unreachable!(),
            })
            .fold(0.0, f64::max);
        assert!((arc_r - 0.1675).abs() < 1e-9);
    }

    fn l_path() -> HsmPathGroove {
        let path = vec![Point2::new(0.0, 0.0), Point2::new(2.0, 0.0), Point2::new(2.0, 2.0)];
        let mut g = HsmPathGroove::new(path, 0.5, 0.0, 0.25);
        g.stepover = Stepover::Absolute(0.1);
        g.through = false;
        g
    }

    /// Distance from `p` to the nearest point of the polyline.
    fn off_path(path: &[Point2<f64>], p: &Point2<f64>) -> f64 {
        path.windows(2)
            .map(|w| {
                let d = w[1] - w[0];
                let t = ((p - w[0]).dot(&d) / d.norm_squared()).clamp(0.0, 1.0);
                distance(p, &(w[0] + d * t))
            })
            .fold(f64::INFINITY, f64::min)
    }

    #[test]
    fn test_path_groove_clears_vertex() {
        let (mut m, _) = test_machine_with_tool("1/8in spiral upcut");
        let g = l_path();
        run(&mut m, &g).unwrap();
        let arcs = arcs(&m);
        let vertex_circles = arcs
            .iter()
            .filter(|s| s.from == s.to)
            .filter(|s| match s.motion {
                Motion::Arc { center, .. } => distance(&center, &Point2::new(2.0, 0.0)) < 1e-9,
                _ => false,
            })
            .count();
        assert_eq!(vertex_circles, 1);
        // 0.25..2 then 2..3.75 along the path, the vertex shared
        assert_eq!(arcs.len(), 37);
        for s in m.segments().iter().filter(|s| s.to.z == Some(-0.25)) {
            let p = Point2::new(s.to.x.unwrap(), s.to.y.unwrap());
            assert!(off_path(&g.path, &p) <= 0.25 - 0.0625 + 1e-9, "{p}");
        }
        assert_eq!(m.position().z, Some(0.125));
    }

    #[test]
    fn test_path_groove_walls_follow_path() {
        let (mut m, _) = test_machine_with_tool("1/8in spiral upcut");
        let mut g = l_path();
        g.rough_margin = 0.02;
        run(&mut m, &g).unwrap();
        let walls: Vec<Point2<f64>> = m
            .segments()
            .iter()
            .filter(|s| s.motion == Motion::Linear && s.to.z == Some(-0.25) && s.from.z == s.to.z)
            .map(|s| Point2::new(s.to.x.unwrap(), s.to.y.unwrap()))
            .filter(|p| off_path(&g.path, p) > 0.18)
            .collect();
        assert_eq!(walls.len(), 6);
        for p in &walls {
            assert!((off_path(&g.path, p) - 0.1875).abs() < 1e-9, "{p}");
        }
        // The inside of the turn goes straight to the corner
        assert!(walls
            .iter()
            .any(|p| distance(p, &Point2::new(1.8125, 0.1875)) < 1e-9));
        // The outside swings around the vertex
        let swings = arcs(&m)
            .iter()
            .filter(|s| match s.motion {
                Motion::Arc { center, .. } => {
                    let from = Point2::new(s.from.x.unwrap(), s.from.y.unwrap());
                    distance(&center, &Point2::new(2.0, 0.0)) < 1e-9
                        && (distance(&center, &from) - 0.1875).abs() < 1e-9
                }
                _ => false,
            })
            .count();
        assert_eq!(swings, 1);
    }

    #[test]
    fn test_path_groove_validation() {
        let mut g = l_path();
        g.path = vec![Point2::new(0.0, 0.0)];
        assert!(matches!(g.validate(), Err(CamError::InvalidInput { name: "path", .. })));
        g.path = vec![Point2::new(0.0, 0.0), Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)];
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_too_narrow() {
        let (mut m, _) = test_machine_with_tool("1/2in spiral upcut");
        let mut g = groove(GrooveStyle::Circle);
        g.width = 0.4;
        assert!(matches!(
            run(&mut m, &g),
            Err(CamError::InvalidInput { name: "width", .. })
        ));
        assert!("zigzag".parse::<GrooveStyle>().is_err());
    }
}
