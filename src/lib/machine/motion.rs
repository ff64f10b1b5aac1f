use std::str::FromStr;

use nalgebra::geometry::Point2;
use tracing::warn;

use super::{Machine, Motion};
use crate::error::{CamError, Result};
use crate::gcode::{self, xy, ArcWords, Axes};
use crate::geometry::{angle_between, distance, polar, EPSILON};

/// Which side of the nominal path the tool edge follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSide {
    Center,
    /// Tool inside the path: the cutter center runs at `radius - tool radius`.
    Inner,
    Outer,
}

impl FromStr for ToolSide {
    type Err = CamError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "center" | "centre" => Ok(ToolSide::Center),
            "inner" | "inside" => Ok(ToolSide::Inner),
            "outer" | "outside" => Ok(ToolSide::Outer),
            _ => Err(CamError::invalid(
                "side",
                format!("expected inner, outer or center, got '{s}'"),
            )),
        }
    }
}

/// How to get to the start of an arc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approach {
    /// Already there.
    None,
    Rapid,
    Cut,
}

/// An arc given by center, radius and start/end angles in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct CenterArc {
    pub center: Point2<f64>,
    pub radius: f64,
    pub start_angle: f64,
    pub end_angle: f64,
    pub clockwise: bool,
    /// Final depth, for helical arcs.
    pub z: Option<f64>,
    pub rate: Option<f64>,
    pub approach: Approach,
    /// Repeat the approach move back to the start point afterwards.
    pub return_to_start: bool,
    pub side: ToolSide,
    pub comment: Option<String>,
}

impl CenterArc {
    pub fn new(center: Point2<f64>, radius: f64, start_angle: f64, end_angle: f64) -> Self {
        CenterArc {
            center,
            radius,
            start_angle,
            end_angle,
            clockwise: true,
            z: None,
            rate: None,
            approach: Approach::None,
            return_to_start: false,
            side: ToolSide::Center,
            comment: None,
        }
    }

    /// A whole revolution starting and ending at `angle`.
    pub fn full(center: Point2<f64>, radius: f64, angle: f64) -> Self {
        CenterArc::new(center, radius, angle, angle + 360.0)
    }

    pub fn clockwise(mut self, clockwise: bool) -> Self {
        self.clockwise = clockwise;
        self
    }

    pub fn z(mut self, z: f64) -> Self {
        self.z = Some(z);
        self
    }

    pub fn rate(mut self, rate: f64) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn approach(mut self, approach: Approach) -> Self {
        self.approach = approach;
        self
    }

    pub fn return_to_start(mut self) -> Self {
        self.return_to_start = true;
        self
    }

    pub fn side(mut self, side: ToolSide) -> Self {
        self.side = side;
        self
    }

    pub fn comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }
}

/// A canned drilling cycle over several holes.
#[derive(Debug, Clone, PartialEq)]
pub struct CannedCycle {
    pub points: Vec<Point2<f64>>,
    /// Bottom of the holes.
    pub depth_z: f64,
    /// Height the cycle feeds down from.
    pub retract_z: f64,
    /// Peck increment; pecking uses `G83`.
    pub peck: Option<f64>,
    /// Dwell at the bottom, in seconds.
    pub dwell: Option<f64>,
    /// Retract to the starting height between holes (`G98`) rather than `retract_z` (`G99`).
    pub return_to_initial: bool,
}

/// Sweep in degrees, always in the commanded direction, of the arc from `start` to `end`
/// around `center`. Coincident start and end make zero, not a whole turn.
pub fn sweep(center: &Point2<f64>, start: &Point2<f64>, end: &Point2<f64>, clockwise: bool) -> f64 {
    let a = angle_between(&(start - center), &(end - center)).to_degrees();
    let a = if clockwise { -a } else { a };
    if a < -EPSILON {
        a + 360.0
    } else {
        a.max(0.0)
    }
}

impl Machine {
    /// Rapid move. Axes left unset keep their position; an attached feed is ignored.
    pub fn goto(&mut self, axes: Axes) -> Result<()> {
        if !axes.has_axis() {
            return Err(CamError::EmptyMove);
        }
        self.write(&axes.to_line("G0", None))?;
        let mut to = self.position;
        to.apply(&axes);
        self.record(Motion::Rapid, to, None);
        Ok(())
    }

    /// Feed move. An attached feed is used for this move only.
    pub fn cut(&mut self, axes: Axes) -> Result<()> {
        if !axes.has_axis() {
            return Err(CamError::EmptyMove);
        }
        let (word, feed) = self.take_feed(axes.feed);
        self.write(&axes.to_line("G1", word))?;
        let mut to = self.position;
        to.apply(&axes);
        self.record(Motion::Linear, to, feed);
        Ok(())
    }

    /// Rapid on one axis to a controller expression such as `[#5063+0.025]`.
    /// The axis position is unknown afterwards.
    pub fn goto_expression(&mut self, axis: char, expr: &str) -> Result<()> {
        let axis = axis.to_ascii_uppercase();
        self.write(&format!("G0 {axis}{expr}"))?;
        let mut to = self.position;
        *axis_slot(&mut to, axis)? = None;
        self.record(Motion::Rapid, to, None);
        Ok(())
    }

    /// Path radius once the tool radius is taken into account.
    pub fn compensated_radius(&self, radius: f64, side: ToolSide) -> Result<f64> {
        Ok(match side {
            ToolSide::Center => radius,
            ToolSide::Inner => radius - self.tool()?.radius(),
            ToolSide::Outer => radius + self.tool()?.radius(),
        })
    }

    /// Cuts `arc`. A radius that compensation shrinks to nothing leaves just the approach
    /// move, to the center.
    pub fn cut_arc_center_rad(&mut self, arc: &CenterArc) -> Result<()> {
        if let Some(c) = &arc.comment {
            self.comment(c)?;
        }
        let radius = self.compensated_radius(arc.radius, arc.side)?;
        let r = radius.max(0.0);
        let start = polar(&arc.center, r, arc.start_angle);
        let span = arc.end_angle - arc.start_angle;
        let end = if span.abs() > EPSILON && (span % 360.0).abs() < EPSILON {
            start
        } else {
            polar(&arc.center, r, arc.end_angle)
        };

        self.approach_point(arc.approach, start, arc.rate)?;
        if radius <= EPSILON {
            warn!(
                "arc at ({:.4}, {:.4}) has radius {:.4} after compensation, skipping",
                arc.center.x, arc.center.y, radius
            );
        } else {
            self.emit_arc(start, end, arc.center, arc.z, arc.clockwise, arc.rate)?;
        }
        if arc.return_to_start {
            self.approach_point(arc.approach, start, arc.rate)?;
        }
        Ok(())
    }

    fn approach_point(&mut self, approach: Approach, p: Point2<f64>, rate: Option<f64>) -> Result<()> {
        let mut axes = xy(p.x, p.y);
        axes.feed = rate;
        match approach {
            Approach::None => Ok(()),
            Approach::Rapid => self.goto(axes),
            Approach::Cut => self.cut(axes),
        }
    }

    /// Arc around `center` from `start`, where the tool already is, to `end`.
    /// Zero radius or zero sweep arcs are skipped.
    pub fn arc_points(
        &mut self,
        center: Point2<f64>,
        start: Point2<f64>,
        end: Point2<f64>,
        clockwise: bool,
        z: Option<f64>,
        rate: Option<f64>,
    ) -> Result<()> {
        if distance(&center, &start) <= EPSILON {
            warn!("zero radius arc at ({:.4}, {:.4}), skipping", center.x, center.y);
            return Ok(());
        }
        if sweep(&center, &start, &end, clockwise) <= EPSILON {
            return Ok(());
        }
        self.emit_arc(start, end, center, z, clockwise, rate)
    }

    fn emit_arc(
        &mut self,
        start: Point2<f64>,
        end: Point2<f64>,
        center: Point2<f64>,
        z: Option<f64>,
        clockwise: bool,
        rate: Option<f64>,
    ) -> Result<()> {
        let (word, feed) = self.take_feed(rate);
        let words = ArcWords {
            x: end.x,
            y: end.y,
            i: center.x - start.x,
            j: center.y - start.y,
            z,
            clockwise,
        };
        self.write(&words.to_line(word))?;
        let mut to = self.position;
        to.x = Some(end.x);
        to.y = Some(end.y);
        to.z = z.or(to.z);
        self.record(Motion::Arc { center, clockwise }, to, feed);
        Ok(())
    }

    /// Straight probe along `axis` toward `to`. The probed axis position is unknown
    /// afterwards.
    pub fn probe(
        &mut self,
        axis: char,
        to: f64,
        rate: Option<f64>,
        toward: bool,
        halt_on_error: bool,
    ) -> Result<()> {
        let g = match (toward, halt_on_error) {
            (true, true) => "G38.2",
            (true, false) => "G38.3",
            (false, true) => "G38.4",
            (false, false) => "G38.5",
        };
        let mut target = self.position;
        *axis_slot(&mut target, axis)? = None;
        let (word, feed) = self.take_feed(rate);
        let mut line = format!("{g} {}", gcode::axis_word(axis, to));
        if let Some(f) = word {
            line.push_str(&format!(" F{f:.3}"));
        }
        self.write(&line)?;
        self.record(Motion::Probe, target, feed);
        Ok(())
    }

    /// Drills every point of `cycle` with one canned cycle, cancelled with `G80`.
    pub fn drill_cycle(&mut self, cycle: &CannedCycle, rate: Option<f64>) -> Result<()> {
        let (first, rest) = cycle
            .points
            .split_first()
            .ok_or_else(|| CamError::invalid("points", "a drill cycle needs at least one hole"))?;
        if cycle.depth_z >= cycle.retract_z {
            return Err(CamError::invalid("depth_z", "must be below the retract height"));
        }
        let initial_z = self.position.z;
        let end_z = if cycle.return_to_initial {
            initial_z.map_or(cycle.retract_z, |z| z.max(cycle.retract_z))
        } else {
            cycle.retract_z
        };

        let (word, feed) = self.take_feed(rate);
        let retract_mode = if cycle.return_to_initial { "G98" } else { "G99" };
        let mut line = String::from(retract_mode);
        match (cycle.peck, cycle.dwell) {
            (Some(_), _) => line.push_str(" G83"),
            (None, Some(_)) => line.push_str(" G82"),
            (None, None) => line.push_str(" G81"),
        }
        let mut words = Axes {
            x: Some(first.x),
            y: Some(first.y),
            z: Some(cycle.depth_z),
            ..Axes::default()
        }
        .to_line("", None);
        words.push_str(&format!(" R{:.6}", cycle.retract_z));
        if let Some(q) = cycle.peck {
            words.push_str(&format!(" Q{q:.6}"));
        }
        if let Some(p) = cycle.dwell {
            words.push_str(&format!(" P{p:.3}"));
        }
        if let Some(f) = word {
            words.push_str(&format!(" F{f:.3}"));
        }
        line.push_str(&words);
        self.write(&line)?;
        self.record_hole(*first, end_z, feed);

        for p in rest {
            self.write(xy(p.x, p.y).to_line("", None).trim_start())?;
            self.record_hole(*p, end_z, feed);
        }
        self.write("G80")
    }

    fn record_hole(&mut self, p: Point2<f64>, end_z: f64, feed: Option<f64>) {
        let mut to = self.position;
        to.x = Some(p.x);
        to.y = Some(p.y);
        to.z = Some(end_z);
        self.record(Motion::DrillCycle, to, feed);
    }
}

fn axis_slot(pos: &mut super::Position, axis: char) -> Result<&mut Option<f64>> {
    match axis.to_ascii_uppercase() {
        'X' => Ok(&mut pos.x),
        'Y' => Ok(&mut pos.y),
        'Z' => Ok(&mut pos.z),
        'A' => Ok(&mut pos.a),
        other => Err(CamError::invalid("axis", format!("no such axis '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcode::{xyz, z};
    use crate::testutil::{arcs, lines, test_machine};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_compensation_round_trip() {
        for &(side, expected) in &[
            (ToolSide::Inner, 1.0 - 0.125),
            (ToolSide::Outer, 1.0 + 0.125),
            (ToolSide::Center, 1.0),
        ] {
            let (mut m, _) = test_machine();
            let c = Point2::new(2.0, 3.0);
            let arc = CenterArc::full(c, 1.0, 0.0)
                .side(side)
                .approach(Approach::Rapid)
                .rate(20.0);
            m.cut_arc_center_rad(&arc).unwrap();
            let arcs = arcs(&m);
            assert_eq!(arcs.len(), 1);
            let seg = arcs[0];
            let from = Point2::new(seg.from.x.unwrap(), seg.from.y.unwrap());
            assert!(close(distance(&c, &from), expected), "{side:?}");
        }
    }

    #[test]
    fn test_arc_words_relative_to_start() {
        let (mut m, streams) = test_machine();
        let arc = CenterArc::new(Point2::new(1.0, 1.0), 0.5, 0.0, 90.0)
            .clockwise(false)
            .approach(Approach::Rapid)
            .rate(12.0);
        m.cut_arc_center_rad(&arc).unwrap();
        let out = lines(&streams);
        assert!(out.contains(&"G0 X1.500000 Y1.000000".to_string()));
        assert!(out.contains(&"G3 X1.000000 Y1.500000 I-0.500000 J0.000000 F12.000".to_string()));
    }

    #[test]
    fn test_zero_radius_arc_is_a_point_move() {
        let (mut m, streams) = test_machine();
        // 1/4in tool inside a 1/8in radius circle
        let arc = CenterArc::full(Point2::new(1.0, 1.0), 0.125, 0.0)
            .side(ToolSide::Inner)
            .approach(Approach::Cut)
            .rate(5.0);
        m.cut_arc_center_rad(&arc).unwrap();
        assert!(arcs(&m).is_empty());
        let out = lines(&streams);
        assert!(out.contains(&"G1 X1.000000 Y1.000000 F5.000".to_string()));
    }

    #[test]
    fn test_sweep_direction() {
        let c = Point2::new(0.0, 0.0);
        let a = Point2::new(1.0, 0.0);
        let b = Point2::new(0.0, 1.0);
        assert!(close(sweep(&c, &a, &b, false), 90.0));
        assert!(close(sweep(&c, &a, &b, true), 270.0));
        assert!(close(sweep(&c, &a, &a, true), 0.0));
    }

    #[test]
    fn test_arc_points_skips_degenerate() {
        let (mut m, _) = test_machine();
        let c = Point2::new(0.0, 0.0);
        let p = Point2::new(1.0, 0.0);
        m.arc_points(c, c, p, true, None, Some(10.0)).unwrap();
        m.arc_points(c, p, p, true, None, Some(10.0)).unwrap();
        assert!(arcs(&m).is_empty());
        m.arc_points(c, p, Point2::new(0.0, -1.0), true, Some(-0.1), Some(10.0)).unwrap();
        let pos = m.position();
        assert_eq!(arcs(&m).len(), 1);
        assert!(close(pos.y.unwrap(), -1.0));
        assert!(close(pos.z.unwrap(), -0.1));
    }

    #[test]
    fn test_probe_words() {
        let (mut m, streams) = test_machine();
        m.goto(xyz(0.0, 0.0, 0.1)).unwrap();
        m.probe('z', -0.5, Some(5.0), true, true).unwrap();
        m.probe('z', 0.1, Some(2.5), false, false).unwrap();
        m.goto_expression('z', "[#5063+0.025000]").unwrap();
        let out = lines(&streams);
        assert!(out.contains(&"G38.2 Z-0.500000 F5.000".to_string()));
        assert!(out.contains(&"G38.5 Z0.100000 F2.500".to_string()));
        assert!(out.contains(&"G0 Z[#5063+0.025000]".to_string()));
        assert_eq!(m.position().z, None);
        assert_eq!(m.position().x, Some(0.0));
        assert!(m.probe('q', 0.0, None, true, true).is_err());
    }

    #[test]
    fn test_peck_drill_cycle() {
        let (mut m, streams) = test_machine();
        m.goto(z(0.5)).unwrap();
        let cycle = CannedCycle {
            points: vec![Point2::new(1.0, 1.0), Point2::new(2.0, 1.0)],
            depth_z: -0.5,
            retract_z: 0.1,
            peck: Some(0.1),
            dwell: None,
            return_to_initial: true,
        };
        m.drill_cycle(&cycle, Some(8.0)).unwrap();
        let out = lines(&streams);
        assert!(out.contains(
            &"G98 G83 X1.000000 Y1.000000 Z-0.500000 R0.100000 Q0.100000 F8.000".to_string()
        ));
        assert!(out.contains(&"X2.000000 Y1.000000".to_string()));
        assert!(out.contains(&"G80".to_string()));
        assert_eq!(m.position().z, Some(0.5));

        let empty = CannedCycle {
            points: vec![],
            ..cycle
        };
        assert!(m.drill_cycle(&empty, None).is_err());
    }
}
