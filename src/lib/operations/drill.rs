use nalgebra::geometry::Point2;

use super::{clear_height, non_negative, positive, retract, Operation};
use crate::error::{CamError, Result};
use crate::feeds::FeedKind;
use crate::gcode::{xy, z};
use crate::geometry::polar;
use crate::machine::{Approach, CannedCycle, CenterArc, Machine, Rate, Stepover};
use crate::tools::Tool;

/// A hole cut by spiralling down around its edge.
///
/// With `outer_rad` up to one tool radius this is a plain plunge; up to two radii it drills
/// a hole, and beyond that it cuts a ring groove one tool wide.
#[derive(Debug, Clone)]
pub struct HelicalDrill {
    pub center: Point2<f64>,
    pub z: f64,
    pub outer_rad: f64,
    pub depth: f64,
    pub stepdown: Stepover,
    pub clockwise: bool,
    pub clearz: Option<f64>,
    pub auto_clear: bool,
    pub tool: Option<Tool>,
}

impl HelicalDrill {
    pub fn new(center: Point2<f64>, z: f64, outer_rad: f64, depth: f64) -> Self {
        HelicalDrill {
            center,
            z,
            outer_rad,
            depth,
            stepdown: Stepover::PercentOfDiameter(25.0),
            clockwise: true,
            clearz: None,
            auto_clear: true,
            tool: None,
        }
    }
}

impl Operation for HelicalDrill {
    fn comment(&self) -> Option<String> {
        Some(format!(
            "HelicalDrill at {:.4} {:.4}, outer_rad={:.3}, depth={:.3}",
            self.center.x, self.center.y, self.outer_rad, self.depth
        ))
    }

    fn tool(&self) -> Option<&Tool> {
        self.tool.as_ref()
    }

    fn feed(&self) -> Option<Rate> {
        Some(Rate::Kind(FeedKind::Plunge))
    }

    fn validate(&self) -> Result<()> {
        non_negative("depth", self.depth)?;
        non_negative("outer_rad", self.outer_rad)
    }

    fn generate(&self, m: &mut Machine) -> Result<()> {
        if self.depth == 0.0 {
            return Ok(());
        }
        let r = m.tool()?.radius();
        let clearz = clear_height(m, self.z, self.clearz);
        let bottom = self.z - self.depth;
        let c = self.center;

        m.goto(z(clearz))?;
        if self.outer_rad <= r {
            m.goto(xy(c.x, c.y))?;
            m.cut(z(bottom))?;
        } else {
            let rad = self.outer_rad - r;
            let start = polar(&c, rad, 0.0);
            m.goto(xy(start.x, start.y))?;
            m.goto(z(self.z))?;
            let stepdown = m.calc_stepdown(self.stepdown, self.depth)?;
            let turn = CenterArc::full(c, rad, 0.0)
                .clockwise(self.clockwise)
                .approach(Approach::None);
            for zc in m.zstep(self.z, bottom, stepdown)? {
                m.cut_arc_center_rad(&turn.clone().z(zc))?;
            }
            // Flat last turn cleans up the ramp
            m.cut_arc_center_rad(&turn.z(bottom))?;
        }

        if self.auto_clear {
            retract(m, clearz)?;
        }
        Ok(())
    }
}

/// Holes drilled with one canned cycle.
#[derive(Debug, Clone)]
pub struct DrillCycle {
    pub centers: Vec<Point2<f64>>,
    pub z: f64,
    pub depth: f64,
    /// Height above `z` the cycle feeds down from.
    pub retract_distance: f64,
    pub peck: Option<f64>,
    pub dwell: Option<f64>,
    pub return_to_initial: bool,
    pub clearz: Option<f64>,
    pub auto_clear: bool,
    pub tool: Option<Tool>,
}

impl DrillCycle {
    pub fn new(centers: Vec<Point2<f64>>, z: f64, depth: f64, retract_distance: f64) -> Self {
        DrillCycle {
            centers,
            z,
            depth,
            retract_distance,
            peck: None,
            dwell: None,
            return_to_initial: false,
            clearz: None,
            auto_clear: true,
            tool: None,
        }
    }
}

impl Operation for DrillCycle {
    fn comment(&self) -> Option<String> {
        Some(format!(
            "Peck drilling holes z={:.3}, depth={:.3}, retract_distance={:.3}",
            self.z, self.depth, self.retract_distance
        ))
    }

    fn tool(&self) -> Option<&Tool> {
        self.tool.as_ref()
    }

    fn feed(&self) -> Option<Rate> {
        Some(Rate::Kind(FeedKind::Drill))
    }

    fn validate(&self) -> Result<()> {
        if self.centers.is_empty() {
            return Err(CamError::invalid("centers", "no holes to drill"));
        }
        positive("depth", self.depth)?;
        non_negative("retract_distance", self.retract_distance)?;
        if let Some(q) = self.peck {
            positive("peck", q)?;
        }
        Ok(())
    }

    fn generate(&self, m: &mut Machine) -> Result<()> {
        let clearz = clear_height(m, self.z, self.clearz);
        m.goto(z(clearz))?;
        let cycle = CannedCycle {
            points: self.centers.clone(),
            depth_z: self.z - self.depth,
            retract_z: self.z + self.retract_distance,
            peck: self.peck,
            dwell: self.dwell,
            return_to_initial: self.return_to_initial,
        };
        m.drill_cycle(&cycle, None)?;
        if self.auto_clear {
            retract(m, clearz)?;
        }
        Ok(())
    }
}

/// Probes the work surface, optionally several times at falling feeds, and can zero the
/// work offset on the result.
#[derive(Debug, Clone)]
pub struct ZProbe {
    pub center: Point2<f64>,
    /// Height to start probing from.
    pub z: f64,
    /// How far below `z` to search.
    pub depth: f64,
    /// Lift between tries, relative to where the probe tripped.
    pub zretract: f64,
    pub rate: Option<f64>,
    pub toward: bool,
    pub halt_on_error: bool,
    pub tries: u32,
    /// Each try runs at this fraction of the previous feed.
    pub backoff: f64,
    pub set_z: bool,
    /// Store the probed height in this numbered parameter.
    pub store_z: Option<u32>,
    pub clearz: Option<f64>,
    pub auto_clear: bool,
}

impl ZProbe {
    pub fn new(center: Point2<f64>, z: f64, depth: f64) -> Self {
        ZProbe {
            center,
            z,
            depth,
            zretract: 0.025,
            rate: None,
            toward: true,
            halt_on_error: true,
            tries: 1,
            backoff: 0.5,
            set_z: false,
            store_z: None,
            clearz: None,
            auto_clear: true,
        }
    }
}

impl Operation for ZProbe {
    fn feed(&self) -> Option<Rate> {
        Some(Rate::Kind(FeedKind::Probe))
    }

    fn validate(&self) -> Result<()> {
        positive("depth", self.depth)?;
        if self.tries == 0 {
            return Err(CamError::invalid("tries", "must probe at least once"));
        }
        if !(self.backoff > 0.0 && self.backoff <= 1.0) {
            return Err(CamError::invalid("backoff", "must be in (0, 1]"));
        }
        Ok(())
    }

    fn generate(&self, m: &mut Machine) -> Result<()> {
        let clearz = clear_height(m, self.z, self.clearz);
        let rate = match self.rate {
            Some(r) => r,
            None => m.resolve_rate(Rate::Kind(FeedKind::Probe))?,
        };
        m.goto(z(self.z))?;
        m.goto(xy(self.center.x, self.center.y))?;
        let mut feed = rate;
        for i in 0..self.tries {
            m.probe('z', self.z - self.depth, Some(feed), self.toward, self.halt_on_error)?;
            if i + 1 != self.tries {
                m.goto_expression('z', &format!("[#5063+{:.6}]", self.zretract))?;
            }
            feed *= self.backoff;
        }
        if self.set_z {
            m.write("G10 L20 P0 Z0")?;
        }
        if let Some(n) = self.store_z {
            m.write(&format!("#{n}=#5422"))?;
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
    use crate::operations::run;
    use crate::testutil::{arcs, count_prefix, lines, test_machine};

    #[test]
    fn test_helical_drill_degenerates_to_plunge() {
        let (mut m, streams) = test_machine();
        // Tool radius is 0.125
        let op = HelicalDrill::new(Point2::new(1.0, 1.0), 0.0, 0.1, 0.5);
        run(&mut m, &op).unwrap();
        let out = lines(&streams);
        assert_eq!(count_prefix(&out, "G1 "), 1);
        assert!(arcs(&m).is_empty());
        assert_eq!(m.position().z, Some(0.125));
    }

    #[test]
    fn test_helical_drill_full_turns() {
        let (mut m, _) = test_machine();
        let mut op = HelicalDrill::new(Point2::new(0.0, 0.0), 0.0, 0.25, 0.5);
        op.stepdown = Stepover::Absolute(0.1);
        run(&mut m, &op).unwrap();
        let arcs = arcs(&m);
        // Five ramping turns plus the flat one
        assert_eq!(arcs.len(), 6);
        for a in &arcs {
            assert_eq!(a.from.x, a.to.x);
            assert_eq!(a.from.y, a.to.y);
            assert!((a.from.x.unwrap() - 0.125).abs() < 1e-9);
        }
        assert!((arcs[4].to.z.unwrap() + 0.5).abs() < 1e-9);
        assert_eq!(arcs[5].from.z, arcs[5].to.z);
        assert_eq!(m.feed_stack_depth(), 0);
    }

    #[test]
    fn test_zero_depth_emits_nothing() {
        let (mut m, _) = test_machine();
        let op = HelicalDrill::new(Point2::new(0.0, 0.0), 0.0, 0.5, 0.0);
        run(&mut m, &op).unwrap();
        assert!(m.segments().is_empty());
    }

    #[test]
    fn test_drill_cycle_op() {
        let (mut m, streams) = test_machine();
        let mut op = DrillCycle::new(
            vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)],
            0.0,
            0.25,
            0.05,
        );
        op.peck = Some(0.05);
        run(&mut m, &op).unwrap();
        let out = lines(&streams);
        let cycle = out.iter().find(|l| l.starts_with("G99 G83")).unwrap();
        assert!(cycle.contains("Z-0.250000 R0.050000 Q0.050000 F"));
        assert_eq!(out.iter().filter(|l| *l == "G80").count(), 1);
        assert!(DrillCycle::new(vec![], 0.0, 0.1, 0.0).validate().is_err());
    }

    #[test]
    fn test_zprobe_tries() {
        let (mut m, streams) = test_machine();
        let mut op = ZProbe::new(Point2::new(0.0, 0.0), 0.0, 0.375);
        op.tries = 2;
        op.set_z = true;
        run(&mut m, &op).unwrap();
        let out = lines(&streams);
        assert!(out.contains(&"G38.2 Z-0.375000 F5.000".to_string()));
        assert!(out.contains(&"G38.2 Z-0.375000 F2.500".to_string()));
        assert_eq!(count_prefix(&out, "G0 Z[#5063+"), 1);
        assert!(out.contains(&"G10 L20 P0 Z0".to_string()));
        assert_eq!(m.position().z, Some(0.125));
    }
}
