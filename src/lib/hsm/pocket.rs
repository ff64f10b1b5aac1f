use std::rc::Rc;

use nalgebra::geometry::Point2;
use nalgebra::Vector2;
use tracing::{debug, warn};

use super::engines::{ConvexOffset, RectMedialAxis};
use super::medial::{
    Circle, GeometryEngine, MedialAxisEngine, MedialAxisGraph, Mic, OffsetSide, Region,
};
use crate::error::{CamError, Result};
use crate::feeds::FeedKind;
use crate::gcode::{xy, z};
use crate::geometry::{perp, unit, Ring, StepSeq, EPSILON};
use crate::machine::{CenterArc, Machine, Rate, Stepover};
use crate::operations::{
    clear_height, non_negative, run, CoordProfile, HelicalDrill, Operation, RectPocketCornerRelief,
};
use crate::tools::Tool;

/// Largest lead arc used to join one MIC to the next.
pub const LEAD_ARC_RADIUS: f64 = 0.03;
/// Entry helix diameter, as a fraction of the tool diameter.
pub const HELIX_DIAMETER_FRACTION: f64 = 0.9;
/// Angular step, in radians, of the entry spiral.
pub const SPIRAL_ANGLE_STEP: f64 = 0.1;
/// The entry spiral starts this close to the center of the first MIC.
const SPIRAL_MIN_RADIUS: f64 = 0.001;

/// Clears an arbitrary closed boundary with constant engagement by walking the medial axis
/// of the region the cutter center may reach.
#[derive(Clone)]
pub struct HsmPocket {
    pub boundary: Ring,
    pub z: f64,
    pub depth: f64,
    pub stepover: Stepover,
    pub stepdown: Stepover,
    /// Clockwise MIC arcs when set.
    pub climb: bool,
    /// Stock left on the walls by the roughing walk.
    pub finish_offset: f64,
    /// Profile passes stepping from `finish_offset` in to the boundary.
    pub finish_passes: u32,
    pub lead_arc_radius: f64,
    pub helix_fraction: f64,
    pub spiral_step: f64,
    pub clearz: Option<f64>,
    pub tool: Option<Tool>,
    pub medial: Rc<dyn MedialAxisEngine>,
    pub geometry: Rc<dyn GeometryEngine>,
}

impl HsmPocket {
    pub fn new(
        boundary: Ring,
        z: f64,
        depth: f64,
        medial: Rc<dyn MedialAxisEngine>,
        geometry: Rc<dyn GeometryEngine>,
    ) -> Self {
        HsmPocket {
            boundary,
            z,
            depth,
            stepover: Stepover::PercentOfDiameter(10.0),
            stepdown: Stepover::PercentOfDiameter(100.0),
            climb: true,
            finish_offset: 0.0,
            finish_passes: 0,
            lead_arc_radius: LEAD_ARC_RADIUS,
            helix_fraction: HELIX_DIAMETER_FRACTION,
            spiral_step: SPIRAL_ANGLE_STEP,
            clearz: None,
            tool: None,
            medial,
            geometry,
        }
    }

    /// Offsets between the walls and the finishing allowance, outermost first, ending on
    /// the boundary itself.
    fn finish_offsets(&self) -> Vec<f64> {
        let n = self.finish_passes;
        (1..=n)
            .map(|k| self.finish_offset * f64::from(n - k) / f64::from(n))
            .collect()
    }
}

/// Unit normal pointing to the center of an arc leaving along `tangent`.
fn turn_normal(tangent: &Vector2<f64>, clockwise: bool) -> Vector2<f64> {
    if clockwise {
        -perp(tangent)
    } else {
        perp(tangent)
    }
}

/// State of one depth level of the walk.
struct Walk<'a> {
    pocket: &'a HsmPocket,
    zc: f64,
    clearz: f64,
    plunge: f64,
    stepover: f64,
    stepdown: f64,
}

impl Walk<'_> {
    fn clockwise(&self) -> bool {
        self.pocket.climb
    }

    fn lead(&self, available: f64) -> f64 {
        self.pocket.lead_arc_radius.min(0.9 * available)
    }

    /// Helix into the start circle, then an Archimedean spiral out to `target` on its edge
    /// and one full turn at that radius.
    fn spiral_clear(&self, m: &mut Machine, start: &Circle, target: &Point2<f64>) -> Result<()> {
        let c = start.center;
        let tool_d = m.tool()?.diameter();
        m.goto(z(self.clearz))?;
        let entry = HelicalDrill {
            center: c,
            z: self.pocket.z,
            outer_rad: start.radius.min(tool_d * self.pocket.helix_fraction),
            depth: self.pocket.z - self.zc,
            // Already material scaled; HelicalDrill scales it again, keeping the entry gentle
            stepdown: Stepover::Absolute(self.stepdown / 4.0),
            clockwise: self.clockwise(),
            clearz: Some(self.clearz),
            auto_clear: false,
            tool: None,
        };
        run(m, &entry)?;

        let to_target = *target - c;
        let theta_end = to_target.y.atan2(to_target.x);
        let r_end = to_target.norm();
        // One stepover of growth per turn
        let b = self.stepover / (2.0 * std::f64::consts::PI);
        let sign = if self.clockwise() { 1.0 } else { -1.0 };
        let remaining = (r_end - SPIRAL_MIN_RADIUS) / b;
        if remaining > EPSILON {
            for s in StepSeq::new(remaining, 0.0, self.pocket.spiral_step, true)? {
                // Angle still to turn is s; winding clockwise means the angle falls
                let theta = theta_end + sign * s;
                let r = r_end - b * s;
                m.cut(xy(c.x + r * theta.cos(), c.y + r * theta.sin()))?;
            }
        } else {
            m.cut(xy(target.x, target.y))?;
        }
        let ring = CenterArc::full(c, r_end, theta_end.to_degrees()).clockwise(self.clockwise());
        m.cut_arc_center_rad(&ring)
    }

    /// Arc out of the cut at `from`, a straight move, and an arc back in at `to`.
    fn rapid_to_next(
        &self,
        m: &mut Machine,
        out_dir: &Vector2<f64>,
        in_dir: &Vector2<f64>,
        from: &Point2<f64>,
        to: &Point2<f64>,
        rad: f64,
    ) -> Result<()> {
        let cw = self.clockwise();
        let cen1 = *from + turn_normal(out_dir, cw) * rad;
        let cen2 = *to + turn_normal(in_dir, cw) * rad;
        let across = match unit(&(cen2 - cen1)) {
            Some(u) => u,
            None => {
                // Both leads share a circle; follow it round
                return m.arc_points(cen1, *from, *to, cw, None, None);
            }
        };
        let off = turn_normal(&across, cw) * rad;
        let leave = cen1 - off;
        let arrive = cen2 - off;
        m.arc_points(cen1, *from, leave, cw, None, None)?;
        m.cut(xy(arrive.x, arrive.y))?;
        m.arc_points(cen2, arrive, *to, cw, None, None)
    }

    /// Quarter turn out of the cut, a lift to clearance, and a quarter turn into the new
    /// branch.
    fn rapid_to_new_branch(
        &self,
        m: &mut Machine,
        out_dir: &Vector2<f64>,
        in_dir: &Vector2<f64>,
        from: &Point2<f64>,
        to: &Point2<f64>,
        rad_out: f64,
        rad_in: f64,
    ) -> Result<()> {
        let cw = self.clockwise();
        let cen1 = *from + turn_normal(out_dir, cw) * rad_out;
        let leave = cen1 + out_dir * rad_out;
        m.arc_points(cen1, *from, leave, cw, None, None)?;

        let cen2 = *to + turn_normal(in_dir, cw) * rad_in;
        let arrive = cen2 - in_dir * rad_in;
        m.goto(z(self.clearz))?;
        m.goto(xy(arrive.x, arrive.y))?;
        m.cut(z(self.zc).feed(self.plunge))?;
        m.arc_points(cen2, arrive, *to, cw, None, None)
    }

    fn final_lead_out(&self, m: &mut Machine, out_dir: &Vector2<f64>, from: &Point2<f64>, rad: f64) -> Result<()> {
        let cw = self.clockwise();
        let cen = *from + turn_normal(out_dir, cw) * rad;
        let leave = cen + out_dir * rad;
        m.arc_points(cen, *from, leave, cw, None, None)
    }

    fn level(&self, m: &mut Machine, graph: &MedialAxisGraph) -> Result<()> {
        let cw = self.clockwise();
        let mut last: Option<&Mic> = None;
        for mic in &graph.mics {
            let in_dir = mic.entry.direction().unwrap_or_else(Vector2::zeros);
            match last {
                None => {
                    m.comment("spiral entry")?;
                    self.spiral_clear(m, &mic.previous, &mic.entry.start)?;
                }
                Some(prev) => {
                    let out_dir = prev.exit.direction().unwrap_or_else(Vector2::zeros);
                    let from = prev.exit.end;
                    if let Some(branch) = &mic.branch {
                        self.rapid_to_new_branch(
                            m,
                            &out_dir,
                            &in_dir,
                            &from,
                            &mic.entry.start,
                            self.lead(prev.previous.radius),
                            self.lead(branch.radius.min(mic.circle.radius)),
                        )?;
                    } else {
                        // Lead out inside the circle being left, lead in inside the next
                        let rad = self.lead(
                            prev.previous
                                .radius
                                .min(mic.previous.radius)
                                .min(mic.circle.radius),
                        );
                        self.rapid_to_next(m, &out_dir, &in_dir, &from, &mic.entry.start, rad)?;
                    }
                }
            }
            m.cut(xy(mic.entry.end.x, mic.entry.end.y))?;
            m.arc_points(mic.circle.center, mic.entry.end, mic.exit.start, cw, None, None)?;
            m.cut(xy(mic.exit.end.x, mic.exit.end.y))?;
            last = Some(mic);
        }
        if let Some(prev) = last {
            let out_dir = prev.exit.direction().unwrap_or_else(Vector2::zeros);
            self.final_lead_out(m, &out_dir, &prev.exit.end, self.lead(prev.previous.radius))?;
        }
        m.goto(z(self.clearz))
    }
}

impl Operation for HsmPocket {
    fn comment(&self) -> Option<String> {
        Some(format!(
            "HSMPocket {} points, depth={:.3}",
            self.boundary.points().len(),
            self.depth
        ))
    }

    fn tool(&self) -> Option<&Tool> {
        self.tool.as_ref()
    }

    fn feed(&self) -> Option<Rate> {
        Some(Rate::Kind(FeedKind::Cut))
    }

    fn validate(&self) -> Result<()> {
        if self.boundary.is_empty() {
            return Err(CamError::invalid("boundary", "needs at least three points"));
        }
        non_negative("depth", self.depth)?;
        non_negative("finish_offset", self.finish_offset)?;
        if !(self.lead_arc_radius > 0.0) {
            return Err(CamError::invalid("lead_arc_radius", "must be positive"));
        }
        if !(self.helix_fraction > 0.0 && self.helix_fraction <= 1.0) {
            return Err(CamError::invalid("helix_fraction", "must be in (0, 1]"));
        }
        if !(self.spiral_step > 0.0) {
            return Err(CamError::invalid("spiral_step", "must be positive"));
        }
        Ok(())
    }

    fn generate(&self, m: &mut Machine) -> Result<()> {
        let r = m.tool()?.radius();
        let boundary = self.boundary.clone().enforce_direction(true);
        let clearz = clear_height(m, self.z, self.clearz);
        let stepover = m.calc_stepover(self.stepover, self.depth)?;
        let stepdown = m.calc_stepdown(self.stepdown, self.depth)?;

        let reachable = self
            .geometry
            .parallel_offset(&boundary, r + self.finish_offset, OffsetSide::Inward)?;
        let graph = match reachable.first() {
            Some(ring) => self.medial.medial_axis(ring, Region::Interior, stepover, self.climb)?,
            None => MedialAxisGraph::default(),
        };
        if graph.node_count() < 2 {
            warn!("pocket has no room for the tool, skipping the roughing walk");
        } else {
            debug!("walking {} MICs per level", graph.mics.len());
            let walk = Walk {
                pocket: self,
                zc: self.z,
                clearz,
                plunge: m.resolve_rate(Rate::Kind(FeedKind::Plunge))?,
                stepover,
                stepdown,
            };
            for zc in m.zstep(self.z, self.z - self.depth, stepdown)? {
                Walk { zc, ..walk }.level(m, &graph)?;
            }
        }

        for offset in self.finish_offsets() {
            let rings = self
                .geometry
                .parallel_offset(&boundary, offset + r, OffsetSide::Inward)?;
            let ring = match rings.into_iter().next() {
                Some(ring) => ring.enforce_direction(true),
                None => {
                    warn!("finishing offset {:.4} leaves nothing to cut, skipping", offset);
                    continue;
                }
            };
            let mut pass = CoordProfile::from_ring(&ring, self.z, self.depth);
            pass.stepdown = Stepover::Absolute(stepdown);
            pass.clearz = Some(clearz);
            run(m, &pass)?;
        }
        Ok(())
    }
}

/// Adaptive clearing of a rectangle, with optional dog-bone corners.
#[derive(Debug, Clone)]
pub struct HsmRectPocket {
    pub p1: Point2<f64>,
    pub p2: Point2<f64>,
    pub z: f64,
    pub depth: f64,
    pub stepover: Stepover,
    pub stepdown: Stepover,
    pub climb: bool,
    pub corner_relief: bool,
    pub finish_offset: f64,
    pub finish_passes: u32,
    pub clearz: Option<f64>,
    pub tool: Option<Tool>,
}

impl HsmRectPocket {
    pub fn new(p1: Point2<f64>, p2: Point2<f64>, z: f64, depth: f64) -> Self {
        HsmRectPocket {
            p1,
            p2,
            z,
            depth,
            stepover: Stepover::PercentOfDiameter(20.0),
            stepdown: Stepover::PercentOfDiameter(100.0),
            climb: true,
            corner_relief: false,
            finish_offset: 0.0,
            finish_passes: 0,
            clearz: None,
            tool: None,
        }
    }

    fn pocket(&self) -> HsmPocket {
        let mut p = HsmPocket::new(
            Ring::rectangle(self.p1, self.p2),
            self.z,
            self.depth,
            Rc::new(RectMedialAxis),
            Rc::new(ConvexOffset),
        );
        p.stepover = self.stepover;
        p.stepdown = self.stepdown;
        p.climb = self.climb;
        p.finish_offset = self.finish_offset;
        p.finish_passes = self.finish_passes;
        p.clearz = self.clearz;
        p
    }
}

impl Operation for HsmRectPocket {
    fn comment(&self) -> Option<String> {
        Some(format!(
            "HSMRectPocket {:.4},{:.4} to {:.4},{:.4}, depth={:.3}",
            self.p1.x, self.p1.y, self.p2.x, self.p2.y, self.depth
        ))
    }

    fn tool(&self) -> Option<&Tool> {
        self.tool.as_ref()
    }

    fn validate(&self) -> Result<()> {
        self.pocket().validate()
    }

    fn generate(&self, m: &mut Machine) -> Result<()> {
        run(m, &self.pocket())?;
        if self.corner_relief {
            let mut relief = RectPocketCornerRelief::new(self.p1, self.p2, self.z, self.depth);
            relief.stepdown = self.stepdown;
            relief.clearz = self.clearz;
            run(m, &relief)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::distance;
    use crate::hsm::medial::WalkStep;
    use crate::machine::{Motion, Segment};
    use crate::testutil::test_machine;

    /// Hands back a fixed walk whatever it is asked.
    #[derive(Debug)]
    struct FixedWalk(MedialAxisGraph);

    impl MedialAxisEngine for FixedWalk {
        fn medial_axis(&self, _: &Ring, _: Region, _: f64, _: bool) -> Result<MedialAxisGraph> {
            Ok(self.0.clone())
        }
    }

    fn point(s: &crate::machine::Position) -> Point2<f64> {
        Point2::new(s.x.unwrap(), s.y.unwrap())
    }

    fn close(a: &Point2<f64>, b: &Point2<f64>) -> bool {
        distance(a, b) < 1e-9
    }

    fn pocket(graph: MedialAxisGraph) -> HsmPocket {
        let ring = Ring::rectangle(Point2::new(0.0, 0.0), Point2::new(3.0, 2.0));
        let mut p = HsmPocket::new(ring, 0.0, 0.25, Rc::new(FixedWalk(graph)), Rc::new(ConvexOffset));
        p.stepdown = Stepover::Absolute(0.25);
        p
    }

    /// A flat whole turn.
    fn full_turn(s: &Segment) -> bool {
        matches!(s.motion, Motion::Arc { .. })
            && s.from.z == s.to.z
            && close(&point(&s.from), &point(&s.to))
    }

    fn turn_radius(s: &Segment) -> f64 {
        match s.motion {
            Motion::Arc { center, .. } => distance(&center, &point(&s.from)),
            _ => 0.0,
        }
    }

    fn after_spiral(m: &Machine) -> Vec<&Segment> {
        // Skip the helix, spiral and its closing turn
        let segs = m.segments();
        let closing = segs.iter().rposition(full_turn).unwrap();
        segs[closing + 1..].iter().collect()
    }

    #[test]
    fn test_walk_is_continuous() {
        let a = Circle::new(Point2::new(1.0, 1.0), 0.5);
        let b = Circle::new(Point2::new(1.2, 1.0), 0.5);
        let c = Circle::new(Point2::new(1.4, 1.0), 0.5);
        let graph = MedialAxisGraph::from_walk(a, &[WalkStep::next(b), WalkStep::next(c)], true);
        let (mut m, _) = test_machine();
        run(&mut m, &pocket(graph.clone())).unwrap();

        let segs = after_spiral(&m);
        // Leaving MIC b's exit is where the transition to MIC c starts
        let exit_b = graph.mics[0].exit.end;
        let i = segs.iter().position(|s| close(&point(&s.to), &exit_b)).unwrap();
        let lead_out = segs[i + 1];
        assert!(close(&point(&lead_out.from), &exit_b));
        assert!(matches!(lead_out.motion, Motion::Arc { clockwise: true, .. }));
        // Lead arcs stay in the material: no rapids until the final lift
        let lift = segs.iter().position(|s| s.motion == Motion::Rapid).unwrap();
        assert!(lift > i + 3);
        let lead_in_end = segs[i + 3];
        assert!(close(&point(&lead_in_end.to), &graph.mics[1].entry.start));
        assert!(lead_in_end.feed.is_some());
        assert_eq!(m.feed_stack_depth(), 0);
        assert_eq!(m.position().z, Some(0.125));
    }

    #[test]
    fn test_new_branch_lifts_to_clearance() {
        let a = Circle::new(Point2::new(1.5, 1.0), 0.5);
        let b = Circle::new(Point2::new(1.8, 1.0), 0.5);
        let c = Circle::new(Point2::new(1.2, 0.7), 0.3);
        let graph = MedialAxisGraph::from_walk(a, &[WalkStep::next(b), WalkStep::branch(a, c)], true);
        let (mut m, _) = test_machine();
        run(&mut m, &pocket(graph.clone())).unwrap();

        let segs = after_spiral(&m);
        let exit_b = graph.mics[0].exit.end;
        let i = segs.iter().position(|s| close(&point(&s.to), &exit_b)).unwrap();
        assert!(matches!(segs[i + 1].motion, Motion::Arc { .. }));
        assert_eq!(segs[i + 2].motion, Motion::Rapid);
        assert_eq!(segs[i + 2].to.z, Some(0.125));
        assert_eq!(segs[i + 3].motion, Motion::Rapid);
        assert_eq!(segs[i + 4].to.z, Some(-0.25));
        assert!(segs[i + 4].feed.is_some());
        assert!(close(&point(&segs[i + 5].to), &graph.mics[1].entry.start));
    }

    #[test]
    fn test_empty_graph_skipped() {
        let (mut m, _) = test_machine();
        run(&mut m, &pocket(MedialAxisGraph::default())).unwrap();
        assert!(m.segments().is_empty());
    }

    #[test]
    fn test_spiral_ends_on_entry() {
        let a = Circle::new(Point2::new(1.5, 1.0), 0.5);
        let b = Circle::new(Point2::new(1.6, 1.0), 0.5);
        let graph = MedialAxisGraph::from_walk(a, &[WalkStep::next(b)], true);
        let (mut m, _) = test_machine();
        run(&mut m, &pocket(graph.clone())).unwrap();
        let segs = m.segments();
        let turn = segs
            .iter()
            .find(|s| full_turn(s) && (turn_radius(s) - 0.5).abs() < 1e-9)
            .unwrap();
        assert!(close(&point(&turn.from), &graph.mics[0].entry.start));
        // The spiral before it only grows
        let spiral: Vec<f64> = segs
            .iter()
            .take_while(|s| !std::ptr::eq(*s, turn))
            .filter(|s| s.motion == Motion::Linear && s.from.z == s.to.z)
            .map(|s| distance(&point(&s.to), &a.center))
            .collect();
        assert!(spiral.len() > 10);
        assert!(spiral.windows(2).all(|w| w[1] >= w[0] - 1e-12));
    }

    #[test]
    fn test_entry_helix_scales_with_material_twice() {
        let helix_turns = |factor: f64| {
            let a = Circle::new(Point2::new(1.5, 1.0), 0.5);
            let b = Circle::new(Point2::new(1.6, 1.0), 0.5);
            let graph = MedialAxisGraph::from_walk(a, &[WalkStep::next(b)], true);
            let (mut m, _) = test_machine();
            m.material_factor = factor;
            run(&mut m, &pocket(graph)).unwrap();
            let descending = |s: &&Segment| {
                matches!(s.motion, Motion::Arc { .. })
                    && s.from.z.zip(s.to.z).map_or(false, |(f, t)| t < f)
            };
            m.segments()
                .iter()
                .skip_while(|s| !descending(s))
                .take_while(|s| descending(s))
                .count()
        };
        // A quarter of 0.25 per turn down to -0.25
        assert_eq!(helix_turns(1.0), 4);
        // Half the level depth, and a quarter of the halved stepdown halved again
        assert_eq!(helix_turns(0.5), 8);
    }

    #[test]
    fn test_rect_pocket_clears_and_finishes() {
        let (mut m, _) = test_machine();
        let mut op = HsmRectPocket::new(Point2::new(0.0, 0.0), Point2::new(2.0, 1.0), 0.0, 0.25);
        op.stepover = Stepover::PercentOfDiameter(50.0);
        op.finish_offset = 0.02;
        op.finish_passes = 2;
        run(&mut m, &op).unwrap();
        let segs = m.segments();
        for s in segs.iter().filter(|s| s.to.z.map_or(false, |z| z < 0.0)) {
            let p = point(&s.to);
            assert!(p.x >= 0.125 * (1.0 - 0.1) - 1e-9 && p.x <= 2.0 - 0.125 * 0.9 + 1e-9, "{p}");
            assert!(p.y >= 0.125 * 0.9 - 1e-9 && p.y <= 1.0 - 0.125 * 0.9 + 1e-9, "{p}");
        }
        let reaches = |p: Point2<f64>| {
            segs.iter()
                .filter(|s| s.to.x.is_some() && s.to.y.is_some())
                .any(|s| close(&point(&s.to), &p))
        };
        // The last finishing pass runs on the wall offset by the tool radius
        assert!(reaches(Point2::new(0.125, 0.875)));
        assert!(reaches(Point2::new(0.135, 0.865)));
        assert_eq!(m.feed_stack_depth(), 0);
    }

    #[test]
    fn test_finish_offsets() {
        let mut p = pocket(MedialAxisGraph::default());
        p.finish_offset = 0.03;
        p.finish_passes = 3;
        let offs = p.finish_offsets();
        assert_eq!(offs.len(), 3);
        assert!((offs[0] - 0.02).abs() < 1e-12);
        assert_eq!(offs[2], 0.0);
    }
}
