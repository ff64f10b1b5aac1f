use nalgebra::geometry::Point2;
use tracing::warn;

use super::{clear_height, non_negative, positive, retract, run, HelicalDrill, Operation};
use crate::error::{CamError, Result};
use crate::feeds::FeedKind;
use crate::gcode::{xy, z};
use crate::geometry::{polar, StepSeq, EPSILON};
use crate::machine::{Approach, CenterArc, Machine, Rate, Stepover, ToolSide};
use crate::tools::{HoleFit, HoleSize, Tool};

/// A circle, or part of one, cut to depth with the tool on one side of it.
#[derive(Debug, Clone)]
pub struct CircleProfile {
    pub center: Point2<f64>,
    pub z: f64,
    pub radius: f64,
    pub depth: f64,
    pub stepdown: Stepover,
    pub side: ToolSide,
    /// Degrees, counter-clockwise from +X.
    pub start_angle: f64,
    pub end_angle: f64,
    pub clockwise: bool,
    pub clearz: Option<f64>,
    pub auto_clear: bool,
    pub tool: Option<Tool>,
}

impl CircleProfile {
    pub fn new(center: Point2<f64>, z: f64, radius: f64, depth: f64) -> Self {
        CircleProfile {
            center,
            z,
            radius,
            depth,
            stepdown: Stepover::PercentOfDiameter(50.0),
            side: ToolSide::Inner,
            start_angle: 0.0,
            end_angle: 360.0,
            clockwise: true,
            clearz: None,
            auto_clear: true,
            tool: None,
        }
    }

    fn full_circle(&self) -> bool {
        ((self.end_angle - self.start_angle).abs() - 360.0).abs() < EPSILON
    }
}

impl Operation for CircleProfile {
    fn comment(&self) -> Option<String> {
        Some(format!(
            "CircleProfile at {:.4} {:.4}, rad={:.3}, depth={:.3}",
            self.center.x, self.center.y, self.radius, self.depth
        ))
    }

    fn tool(&self) -> Option<&Tool> {
        self.tool.as_ref()
    }

    fn feed(&self) -> Option<Rate> {
        Some(Rate::Kind(FeedKind::Cut))
    }

    fn validate(&self) -> Result<()> {
        positive("radius", self.radius)?;
        non_negative("depth", self.depth)
    }

    fn generate(&self, m: &mut Machine) -> Result<()> {
        let rad = m.compensated_radius(self.radius, self.side)?;
        if rad <= EPSILON {
            warn!(
                "profile radius {:.4} leaves no room for the tool, skipping",
                self.radius
            );
            return Ok(());
        }
        let full = self.full_circle();
        let clearz = clear_height(m, self.z, self.clearz);
        let stepdown = m.calc_stepdown(self.stepdown, self.depth)?;
        let plunge = m.resolve_rate(Rate::Kind(FeedKind::Plunge))?;
        let start = polar(&self.center, rad, self.start_angle);
        let arc = CenterArc::new(self.center, rad, self.start_angle, self.end_angle)
            .clockwise(self.clockwise);

        let mut first = true;
        for zc in m.zstep(self.z, self.z - self.depth, stepdown)? {
            // A full circle ends where it started, so it can go straight down
            if first || !full {
                m.goto(z(clearz))?;
                m.goto(xy(start.x, start.y))?;
                first = false;
            }
            m.cut(z(zc).feed(plunge))?;
            m.cut_arc_center_rad(&arc)?;
        }

        if self.auto_clear {
            retract(m, clearz)?;
        }
        Ok(())
    }
}

/// An annulus (or disc, with `inner_rad` zero) cleared in concentric rings.
#[derive(Debug, Clone)]
pub struct CirclePocket {
    pub center: Point2<f64>,
    pub z: f64,
    pub inner_rad: f64,
    pub outer_rad: f64,
    pub depth: f64,
    pub stepover: Stepover,
    pub stepdown: Stepover,
    pub clockwise: bool,
    pub clearz: Option<f64>,
    pub auto_clear: bool,
    pub tool: Option<Tool>,
}

impl CirclePocket {
    pub fn new(center: Point2<f64>, z: f64, inner_rad: f64, outer_rad: f64, depth: f64) -> Self {
        CirclePocket {
            center,
            z,
            inner_rad,
            outer_rad,
            depth,
            stepover: Stepover::PercentOfDiameter(50.0),
            stepdown: Stepover::PercentOfDiameter(50.0),
            clockwise: true,
            clearz: None,
            auto_clear: true,
            tool: None,
        }
    }
}

fn check_annulus(inner_rad: f64, outer_rad: f64) -> Result<()> {
    non_negative("inner_rad", inner_rad)?;
    positive("outer_rad", outer_rad)?;
    if inner_rad >= outer_rad {
        return Err(CamError::invalid(
            "inner_rad",
            format!("{inner_rad} is not inside outer_rad {outer_rad}"),
        ));
    }
    Ok(())
}

impl Operation for CirclePocket {
    fn comment(&self) -> Option<String> {
        Some(format!(
            "CirclePocket at {:.4} {:.4}, from {:.3} to {:.3}, depth={:.3}",
            self.center.x, self.center.y, self.inner_rad, self.outer_rad, self.depth
        ))
    }

    fn tool(&self) -> Option<&Tool> {
        self.tool.as_ref()
    }

    fn feed(&self) -> Option<Rate> {
        Some(Rate::Kind(FeedKind::Cut))
    }

    fn validate(&self) -> Result<()> {
        check_annulus(self.inner_rad, self.outer_rad)?;
        non_negative("depth", self.depth)
    }

    fn generate(&self, m: &mut Machine) -> Result<()> {
        let r = m.tool()?.radius();
        let (near, far) = (self.inner_rad + r, self.outer_rad - r);
        if far < near - EPSILON {
            warn!(
                "annulus {:.4}..{:.4} is narrower than the tool, skipping",
                self.inner_rad, self.outer_rad
            );
            return Ok(());
        }
        let far = far.max(near);
        let clearz = clear_height(m, self.z, self.clearz);
        let stepover = m.calc_stepover(self.stepover, self.depth)?;
        let stepdown = m.calc_stepdown(self.stepdown, self.depth)?;
        let plunge = m.resolve_rate(Rate::Kind(FeedKind::Plunge))?;
        let c = self.center;

        // Alternate outward and inward so each level starts where the last one ended
        let mut outward = true;
        for zc in m.zstep(self.z, self.z - self.depth, stepdown)? {
            let (from, to) = if outward { (near, far) } else { (far, near) };
            let start = polar(&c, from, 0.0);
            m.goto(z(clearz))?;
            m.goto(xy(start.x, start.y))?;
            m.cut(z(zc).feed(plunge))?;
            for rad in StepSeq::new(from, to, stepover, true)? {
                let p = polar(&c, rad, 0.0);
                m.cut(xy(p.x, p.y))?;
                m.cut_arc_center_rad(&CenterArc::full(c, rad, 0.0).clockwise(self.clockwise))?;
            }
            outward = !outward;
        }

        if self.auto_clear {
            retract(m, clearz)?;
        }
        Ok(())
    }
}

/// A circular pocket entered with a helix, then widened ring by ring at full depth.
#[derive(Debug, Clone)]
pub struct HsmCirclePocket {
    pub center: Point2<f64>,
    pub z: f64,
    pub inner_rad: f64,
    pub outer_rad: f64,
    pub depth: f64,
    pub stepover: Stepover,
    pub stepdown: Stepover,
    pub climb: bool,
    pub clearz: Option<f64>,
    pub auto_clear: bool,
    pub tool: Option<Tool>,
}

impl HsmCirclePocket {
    pub fn new(center: Point2<f64>, z: f64, outer_rad: f64, depth: f64) -> Self {
        HsmCirclePocket {
            center,
            z,
            inner_rad: 0.0,
            outer_rad,
            depth,
            stepover: Stepover::PercentOfDiameter(50.0),
            stepdown: Stepover::PercentOfDiameter(50.0),
            climb: true,
            clearz: None,
            auto_clear: true,
            tool: None,
        }
    }
}

impl Operation for HsmCirclePocket {
    fn comment(&self) -> Option<String> {
        Some("HSM Circle Pocket".to_string())
    }

    fn tool(&self) -> Option<&Tool> {
        self.tool.as_ref()
    }

    fn feed(&self) -> Option<Rate> {
        Some(Rate::Kind(FeedKind::Cut))
    }

    fn validate(&self) -> Result<()> {
        check_annulus(self.inner_rad, self.outer_rad)?;
        non_negative("depth", self.depth)
    }

    fn generate(&self, m: &mut Machine) -> Result<()> {
        let r = m.tool()?.radius();
        let c = self.center;
        let start_rad = if self.inner_rad > 0.0 {
            self.inner_rad + r
        } else {
            r.min(self.outer_rad)
        };
        let clearz = clear_height(m, self.z, self.clearz);

        let entry = HelicalDrill {
            center: c,
            z: self.z,
            outer_rad: start_rad,
            depth: self.depth,
            stepdown: self.stepdown,
            clockwise: self.climb,
            clearz: Some(clearz),
            auto_clear: true,
            tool: None,
        };
        run(m, &entry)?;

        let stepover = m.calc_stepover(self.stepover, self.depth)?;
        let stepdown = m.calc_stepdown(self.stepdown, self.depth)?;
        let plunge = m.resolve_rate(Rate::Kind(FeedKind::Plunge))?;
        // Where the helix ran, so the drop to each level is through cleared material
        let entry_point = polar(&c, (start_rad - r).max(0.0), 0.0);
        for zc in m.zstep(self.z, self.z - self.depth, stepdown)? {
            m.goto(z(clearz))?;
            m.goto(xy(entry_point.x, entry_point.y))?;
            m.cut(z(zc).feed(plunge))?;
            for rad in StepSeq::new(start_rad, self.outer_rad, stepover, true)? {
                let ring = CenterArc::full(c, rad - r, 0.0)
                    .clockwise(self.climb)
                    .approach(Approach::Cut);
                m.cut_arc_center_rad(&ring)?;
            }
        }

        if self.auto_clear {
            retract(m, clearz)?;
        }
        Ok(())
    }
}

/// Point `index` of `count` spread evenly around a circle, measured clockwise from +Y the
/// way drawings dimension bolt circles.
fn bolt_point(
    center: &Point2<f64>,
    radius: f64,
    first_angle: f64,
    index: u32,
    count: u32,
) -> Point2<f64> {
    let a = (first_angle + index as f64 * 360.0 / count as f64).to_radians();
    Point2::new(center.x + a.sin() * radius, center.y + a.cos() * radius)
}

/// Screw holes evenly spaced around a circle, each cut with a [`HelicalDrill`] sized from
/// the [`HoleSize`] table.
#[derive(Debug, Clone)]
pub struct BoltCircle {
    pub center: Point2<f64>,
    pub z: f64,
    /// Radius of the circle through the hole centers.
    pub radius: f64,
    pub depth: f64,
    pub bolts: u32,
    pub screw: String,
    pub fit: HoleFit,
    /// Degrees clockwise from +Y to the first hole.
    pub first_angle: f64,
    pub stepdown: Stepover,
    pub clearz: Option<f64>,
    pub auto_clear: bool,
    pub tool: Option<Tool>,
}

impl BoltCircle {
    pub fn new(
        center: Point2<f64>,
        z: f64,
        radius: f64,
        bolts: u32,
        screw: &str,
        depth: f64,
    ) -> Self {
        BoltCircle {
            center,
            z,
            radius,
            depth,
            bolts,
            screw: screw.to_string(),
            fit: HoleFit::StandardClearance,
            first_angle: 0.0,
            stepdown: Stepover::PercentOfDiameter(25.0),
            clearz: None,
            auto_clear: true,
            tool: None,
        }
    }

    pub fn holes(&self) -> Vec<Point2<f64>> {
        (0..self.bolts)
            .map(|b| bolt_point(&self.center, self.radius, self.first_angle, b, self.bolts))
            .collect()
    }
}

impl Operation for BoltCircle {
    fn comment(&self) -> Option<String> {
        Some(format!(
            "BoltCircle at {:.4} {:.4}, rad={:.3}, {} x {}",
            self.center.x, self.center.y, self.radius, self.bolts, self.screw
        ))
    }

    fn tool(&self) -> Option<&Tool> {
        self.tool.as_ref()
    }

    fn validate(&self) -> Result<()> {
        non_negative("radius", self.radius)?;
        non_negative("depth", self.depth)?;
        if self.bolts == 0 {
            return Err(CamError::invalid("bolts", "a bolt circle needs at least one bolt"));
        }
        HoleSize::screw(&self.screw, self.fit).map(|_| ())
    }

    fn generate(&self, m: &mut Machine) -> Result<()> {
        let hole = HoleSize::screw(&self.screw, self.fit)?;
        if hole.radius() < m.tool()?.radius() {
            warn!(
                "tool is wider than the {:.4} {} hole, holes will be oversize",
                hole.diameter, self.screw
            );
        }
        let clearz = clear_height(m, self.z, self.clearz);
        for p in self.holes() {
            m.goto(z(clearz))?;
            let drill = HelicalDrill {
                center: p,
                z: self.z,
                outer_rad: hole.radius(),
                depth: self.depth,
                stepdown: self.stepdown,
                clockwise: true,
                clearz: Some(clearz),
                auto_clear: true,
                tool: None,
            };
            run(m, &drill)?;
        }
        if self.auto_clear {
            retract(m, clearz)?;
        }
        Ok(())
    }
}

/// A ring cut free of the stock: bolt holes between the walls first, then the inner and
/// outer profiles. An `inner_rad` of zero cuts a disc.
#[derive(Debug, Clone)]
pub struct Ring {
    pub center: Point2<f64>,
    pub z: f64,
    pub inner_rad: f64,
    pub outer_rad: f64,
    pub depth: f64,
    pub stepdown: Stepover,
    /// Holes spaced evenly on `bolt_radius`, starting at +Y. Zero for none.
    pub bolts: u32,
    pub bolt_radius: f64,
    pub screw: String,
    pub fit: HoleFit,
    pub clearz: Option<f64>,
    pub tool: Option<Tool>,
}

impl Ring {
    pub fn new(center: Point2<f64>, z: f64, inner_rad: f64, outer_rad: f64, depth: f64) -> Self {
        Ring {
            center,
            z,
            inner_rad,
            outer_rad,
            depth,
            stepdown: Stepover::PercentOfDiameter(50.0),
            bolts: 0,
            bolt_radius: 0.0,
            screw: "1/4-20".to_string(),
            fit: HoleFit::StandardClearance,
            clearz: None,
            tool: None,
        }
    }
}

impl Operation for Ring {
    fn comment(&self) -> Option<String> {
        Some(format!(
            "Ring at {:.4} {:.4}, from {:.3} to {:.3}, depth={:.3}",
            self.center.x, self.center.y, self.inner_rad, self.outer_rad, self.depth
        ))
    }

    fn tool(&self) -> Option<&Tool> {
        self.tool.as_ref()
    }

    fn validate(&self) -> Result<()> {
        check_annulus(self.inner_rad, self.outer_rad)?;
        non_negative("depth", self.depth)?;
        if self.bolts > 0 {
            let hole = HoleSize::screw(&self.screw, self.fit)?;
            if self.bolt_radius - hole.radius() < self.inner_rad
                || self.bolt_radius + hole.radius() > self.outer_rad
            {
                return Err(CamError::invalid(
                    "bolt_radius",
                    format!(
                        "{} holes on {:.4} don't fit between {:.4} and {:.4}",
                        self.screw, self.bolt_radius, self.inner_rad, self.outer_rad
                    ),
                ));
            }
        }
        Ok(())
    }

    fn generate(&self, m: &mut Machine) -> Result<()> {
        let clearz = clear_height(m, self.z, self.clearz);
        if self.bolts > 0 {
            let hole = HoleSize::screw(&self.screw, self.fit)?;
            for b in 0..self.bolts {
                let p = bolt_point(&self.center, self.bolt_radius, 0.0, b, self.bolts);
                let mut pocket = CirclePocket::new(p, self.z, 0.0, hole.radius(), self.depth);
                pocket.stepdown = self.stepdown;
                pocket.clearz = Some(clearz);
                run(m, &pocket)?;
            }
        }
        if self.inner_rad > 0.0 {
            let mut inner = CircleProfile::new(self.center, self.z, self.inner_rad, self.depth);
            inner.stepdown = self.stepdown;
            inner.clearz = Some(clearz);
            run(m, &inner)?;
        }
        let mut outer = CircleProfile::new(self.center, self.z, self.outer_rad, self.depth);
        outer.side = ToolSide::Outer;
        outer.stepdown = self.stepdown;
        outer.clearz = Some(clearz);
        run(m, &outer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::distance;
    use crate::machine::Motion;
    use crate::testutil::{arcs, test_machine, test_machine_with_tool};

    fn arc_radius(s: &crate::machine::Segment) -> f64 {
        match s.motion {
            Motion::Arc { center, .. } => {
                distance(&center, &Point2::new(s.from.x.unwrap(), s.from.y.unwrap()))
            }
            _ => panic!("not an arc"),
        }
    }

    #[test]
    fn test_profile_side_compensation() {
        for &(side, expected) in &[
            (ToolSide::Inner, 0.875),
            (ToolSide::Outer, 1.125),
            (ToolSide::Center, 1.0),
        ] {
            let (mut m, _) = test_machine();
            let mut op = CircleProfile::new(Point2::new(3.0, 3.0), 0.0, 1.0, 0.1);
            op.side = side;
            run(&mut m, &op).unwrap();
            let arcs = arcs(&m);
            assert!(!arcs.is_empty());
            for a in arcs {
                assert!((arc_radius(a) - expected).abs() < 1e-9, "{side:?}");
            }
        }
    }

    #[test]
    fn test_partial_profile_repositions_each_level() {
        let (mut m, _) = test_machine();
        let mut op = CircleProfile::new(Point2::new(0.0, 0.0), 0.0, 1.0, 0.25);
        op.start_angle = 0.0;
        op.end_angle = 90.0;
        op.stepdown = Stepover::Absolute(0.125);
        op.side = ToolSide::Center;
        run(&mut m, &op).unwrap();
        let arcs = arcs(&m);
        assert_eq!(arcs.len(), 2);
        for a in arcs {
            assert!((a.to.x.unwrap()).abs() < 1e-9);
            assert!((a.to.y.unwrap() - 1.0).abs() < 1e-9);
        }
        let rapids_to_start = m
            .segments()
            .iter()
            .filter(|s| s.motion == Motion::Rapid && s.to.x == Some(1.0) && s.from.x != Some(1.0))
            .count();
        assert_eq!(rapids_to_start, 2);
    }

    #[test]
    fn test_profile_too_small_for_tool() {
        let (mut m, _) = test_machine();
        let op = CircleProfile::new(Point2::new(0.0, 0.0), 0.0, 0.1, 0.25);
        run(&mut m, &op).unwrap();
        assert!(m.segments().is_empty());
    }

    #[test]
    fn test_circle_pocket_rings_alternate() {
        let (mut m, _) = test_machine();
        let mut op = CirclePocket::new(Point2::new(0.0, 0.0), 0.0, 0.0, 1.0, 0.25);
        op.stepdown = Stepover::Absolute(0.125);
        run(&mut m, &op).unwrap();
        let radii: Vec<f64> = arcs(&m).into_iter().map(arc_radius).collect();
        // 0.125 to 0.875 in 0.125 steps, out then back in
        assert_eq!(radii.len(), 14);
        assert!((radii[0] - 0.125).abs() < 1e-9);
        assert!((radii[6] - 0.875).abs() < 1e-9);
        assert!((radii[7] - 0.875).abs() < 1e-9);
        assert!((radii[13] - 0.125).abs() < 1e-9);
    }

    #[test]
    fn test_circle_pocket_validation() {
        let op = CirclePocket::new(Point2::new(0.0, 0.0), 0.0, 1.0, 0.5, 0.25);
        assert!(op.validate().is_err());
    }

    #[test]
    fn test_hsm_circle_pocket() {
        let (mut m, _) = test_machine();
        let mut op = HsmCirclePocket::new(Point2::new(0.0, 0.0), 0.0, 0.5, 0.125);
        op.stepdown = Stepover::Absolute(0.125);
        run(&mut m, &op).unwrap();
        // Helix at the tool radius is a plain plunge; rings then grow to 0.375
        let radii: Vec<f64> = arcs(&m).into_iter().map(arc_radius).collect();
        assert!((radii.last().unwrap() - 0.375).abs() < 1e-9);
        assert!(radii.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(m.feed_stack_depth(), 0);
        assert_eq!(m.position().z, Some(0.125));
    }

    fn arc_center(s: &crate::machine::Segment) -> Point2<f64> {
        match s.motion {
            Motion::Arc { center, .. } => center,
            _ => panic!("not an arc"),
        }
    }

    #[test]
    fn test_bolt_circle_holes() {
        let (mut m, _) = test_machine_with_tool("1/8in spiral upcut");
        let op = BoltCircle::new(Point2::new(2.0, 2.0), 0.0, 1.0, 4, "1/4-20", 0.25);
        let holes = op.holes();
        // Clockwise from +Y
        let expected = [(2.0, 3.0), (3.0, 2.0), (2.0, 1.0), (1.0, 2.0)];
        for (p, &(x, y)) in holes.iter().zip(&expected) {
            assert!(distance(p, &Point2::new(x, y)) < 1e-9, "{p}");
        }
        run(&mut m, &op).unwrap();
        let arcs = arcs(&m);
        for h in &holes {
            assert!(arcs.iter().any(|a| distance(&arc_center(a), h) < 1e-9));
        }
        // 0.257 clearance hole less the tool radius
        for a in &arcs {
            assert!((arc_radius(a) - (0.257 / 2.0 - 0.0625)).abs() < 1e-9);
        }
        assert_eq!(m.position().z, Some(0.125));
    }

    #[test]
    fn test_bolt_circle_validation() {
        let mut op = BoltCircle::new(Point2::new(0.0, 0.0), 0.0, 1.0, 0, "1/4-20", 0.25);
        assert!(matches!(op.validate(), Err(CamError::InvalidInput { name: "bolts", .. })));
        op.bolts = 3;
        op.screw = "M7".to_string();
        assert!(matches!(op.validate(), Err(CamError::Unknown { kind: "screw", .. })));
    }

    #[test]
    fn test_ring_holes_then_profiles() {
        let (mut m, _) = test_machine_with_tool("1/8in spiral upcut");
        let mut op = Ring::new(Point2::new(0.0, 0.0), 0.0, 1.0, 2.0, 0.125);
        op.bolts = 3;
        op.bolt_radius = 1.5;
        op.stepdown = Stepover::Absolute(0.125);
        run(&mut m, &op).unwrap();
        let arcs = arcs(&m);
        let origin = Point2::new(0.0, 0.0);
        let first_profile = arcs
            .iter()
            .position(|a| distance(&arc_center(a), &origin) < 1e-9)
            .unwrap();
        assert!(first_profile > 0);
        for a in &arcs[..first_profile] {
            assert!((distance(&arc_center(a), &origin) - 1.5).abs() < 1e-9);
        }
        let radii: Vec<f64> = arcs[first_profile..].iter().map(|a| arc_radius(a)).collect();
        assert!((radii[0] - 0.9375).abs() < 1e-9);
        assert!((radii.last().unwrap() - 2.0625).abs() < 1e-9);
        assert_eq!(m.position().z, Some(0.125));
    }

    #[test]
    fn test_ring_bolts_must_fit() {
        let mut op = Ring::new(Point2::new(0.0, 0.0), 0.0, 1.0, 2.0, 0.125);
        op.bolts = 4;
        op.bolt_radius = 1.95;
        assert!(matches!(
            op.validate(),
            Err(CamError::InvalidInput { name: "bolt_radius", .. })
        ));
        op.bolt_radius = 1.5;
        assert!(op.validate().is_ok());
    }
}
