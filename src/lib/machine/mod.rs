//! The program writer.
//!
//! A [`Machine`] tracks everything a running program has changed: the bound tool and
//! material, the commanded feed and its save stack, the cutter position and the open output
//! streams. Operations share one `Machine` by `&mut` borrow, one after another.

use std::collections::BTreeMap;
use std::io::Write;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::config::MachineProfile;
use crate::error::{CamError, Result};
use crate::feeds::{self, FeedClass, FeedKind};
use crate::gcode::{self, Axes, PREAMBLE, PROGRAM_END, PROGRAM_MARKER, SPINDLE_OFF};
use crate::geometry::StepSeq;
use crate::materials::Material;
use crate::output::{part_name, FileStreams, StreamFactory};
use crate::tools::Tool;

mod motion;

pub use motion::{Approach, CannedCycle, CenterArc, ToolSide};

/// A pass width or depth, either absolute or relative to the tool diameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stepover {
    Absolute(f64),
    PercentOfDiameter(f64),
}

impl Stepover {
    fn resolve(self, diameter: f64) -> f64 {
        match self {
            Stepover::Absolute(v) => v,
            Stepover::PercentOfDiameter(p) => diameter * p / 100.0,
        }
    }
}

impl FromStr for Stepover {
    type Err = CamError;

    /// `"50%"` is half the tool diameter, `"0.1"` is a tenth of an inch.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let bad = || CamError::invalid("stepover", format!("can't parse '{s}'"));
        match s.strip_suffix('%') {
            Some(p) => p
                .trim()
                .parse()
                .map(Stepover::PercentOfDiameter)
                .map_err(|_| bad()),
            None => s.parse().map(Stepover::Absolute).map_err(|_| bad()),
        }
    }
}

/// Where a feed comes from: a number, or the tool and material's rate for a kind of move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rate {
    Fixed(f64),
    Kind(FeedKind),
}

impl From<FeedKind> for Rate {
    fn from(kind: FeedKind) -> Self {
        Rate::Kind(kind)
    }
}

impl From<f64> for Rate {
    fn from(feed: f64) -> Self {
        Rate::Fixed(feed)
    }
}

/// Last commanded position. An axis is `None` until it has been moved, or after a probe
/// leaves it wherever contact happened.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub a: Option<f64>,
}

impl Position {
    fn apply(&mut self, axes: &Axes) {
        self.x = axes.x.or(self.x);
        self.y = axes.y.or(self.y);
        self.z = axes.z.or(self.z);
        self.a = axes.a.or(self.a);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Motion {
    Rapid,
    Linear,
    Arc {
        center: nalgebra::Point2<f64>,
        clockwise: bool,
    },
    Probe,
    DrillCycle,
}

/// One emitted move, kept when auditing is on.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub motion: Motion,
    pub from: Position,
    pub to: Position,
    /// Feed in effect for the move; `None` for rapids and unfed moves.
    pub feed: Option<f64>,
}

struct OpenStream {
    out: Box<dyn Write>,
    spindle_rpm: Option<f64>,
}

pub struct Machine {
    profile: MachineProfile,
    tool: Option<Tool>,
    tool_number: u32,
    material: Option<Material>,
    /// Scales every stepover and stepdown; below 1 for materials that need lighter passes.
    pub material_factor: f64,
    feed_class: FeedClass,
    feed_depth: f64,
    feed: Option<f64>,
    feed_pending: bool,
    modal_feed: Option<f64>,
    speed_stack: Vec<Option<f64>>,
    position: Position,
    streams: Box<dyn StreamFactory>,
    files: BTreeMap<String, OpenStream>,
    current: Option<String>,
    base_name: Option<String>,
    part: usize,
    level: usize,
    audit: Option<Vec<Segment>>,
    unfed_moves: usize,
}

impl Machine {
    pub fn new(profile: MachineProfile, streams: Box<dyn StreamFactory>) -> Self {
        Machine {
            profile,
            tool: None,
            tool_number: 0,
            material: None,
            material_factor: 1.0,
            feed_class: FeedClass::Low,
            feed_depth: 0.0,
            feed: None,
            feed_pending: false,
            modal_feed: None,
            speed_stack: Vec::new(),
            position: Position::default(),
            streams,
            files: BTreeMap::new(),
            current: None,
            base_name: None,
            part: 1,
            level: 0,
            audit: None,
            unfed_moves: 0,
        }
    }

    /// A machine writing program files to disk.
    pub fn with_files(profile: MachineProfile) -> Self {
        Machine::new(profile, Box::new(FileStreams))
    }

    pub fn profile(&self) -> &MachineProfile {
        &self.profile
    }

    pub fn tool(&self) -> Result<&Tool> {
        self.tool.as_ref().ok_or(CamError::NoTool)
    }

    pub fn material(&self) -> Option<&Material> {
        self.material.as_ref()
    }

    pub fn feed_class(&self) -> FeedClass {
        self.feed_class
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Current commanded feed, if any.
    pub fn feed(&self) -> Option<f64> {
        self.feed
    }

    /// Number of saved feeds not yet restored.
    pub fn feed_stack_depth(&self) -> usize {
        self.speed_stack.len()
    }

    /// Cutting moves emitted while no feed was defined.
    pub fn unfed_moves(&self) -> usize {
        self.unfed_moves
    }

    pub fn current_file(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Selects the output stream, opening it and writing the program header if it isn't
    /// open yet. Tool changes split further parts off this name.
    pub fn set_file(&mut self, name: &str) -> Result<()> {
        if self.base_name.as_deref() != Some(name) {
            self.base_name = Some(name.to_string());
            self.part = 1;
        }
        self.select_file(name)
    }

    fn select_file(&mut self, name: &str) -> Result<()> {
        if !self.files.contains_key(name) {
            debug!("opening {}", name);
            let out = self.streams.open(name)?;
            self.files.insert(
                name.to_string(),
                OpenStream {
                    out,
                    spindle_rpm: None,
                },
            );
            self.current = Some(name.to_string());
            self.modal_feed = None;
            self.feed_pending = true;
            self.write_raw(PROGRAM_MARKER)?;
            self.write_raw(PREAMBLE)?;
        }
        self.current = Some(name.to_string());
        Ok(())
    }

    /// Writes the program footer and closes `name`.
    pub fn close_file(&mut self, name: &str) -> Result<()> {
        let mut stream = match self.files.remove(name) {
            Some(s) => s,
            None => return Ok(()),
        };
        if self.current.as_deref() == Some(name) {
            self.current = None;
        }
        if stream.spindle_rpm.is_some() {
            writeln!(stream.out, "{SPINDLE_OFF}")?;
        }
        writeln!(stream.out, "{PROGRAM_END}")?;
        writeln!(stream.out, "{PROGRAM_MARKER}")?;
        stream.out.flush()?;
        debug!("closed {}", name);
        Ok(())
    }

    /// Closes every open stream.
    pub fn finish(&mut self) -> Result<()> {
        let names: Vec<String> = self.files.keys().cloned().collect();
        for name in names {
            self.close_file(&name)?;
        }
        Ok(())
    }

    fn next_part(&mut self) -> Result<()> {
        let base = self.base_name.clone().ok_or(CamError::NoOpenStream)?;
        self.part += 1;
        let name = part_name(&base, self.part)?;
        if let Some(current) = self.current.clone() {
            self.close_file(&current)?;
        }
        debug!("tool change, continuing in {}", name);
        self.select_file(&name)
    }

    fn write_raw(&mut self, line: &str) -> Result<()> {
        let name = self.current.as_ref().ok_or(CamError::NoOpenStream)?;
        let stream = self.files.get_mut(name).ok_or(CamError::NoOpenStream)?;
        writeln!(stream.out, "{line}")?;
        stream.out.flush()?;
        Ok(())
    }

    /// Writes one line at the current indentation level.
    pub fn write(&mut self, line: &str) -> Result<()> {
        let indent = " ".repeat(self.level.saturating_sub(1) * 4);
        self.write_raw(&format!("{indent}{line}"))
    }

    pub fn comment(&mut self, text: &str) -> Result<()> {
        self.write(&gcode::comment(text))
    }

    pub fn pause_program(&mut self) -> Result<()> {
        self.comment("PAUSE")?;
        self.write(gcode::PAUSE)
    }

    pub fn push_level(&mut self) {
        self.level += 1;
    }

    pub fn pop_level(&mut self) -> Result<()> {
        self.level = self.level.checked_sub(1).ok_or(CamError::LevelUnderflow)?;
        Ok(())
    }

    /// Binds `tool`, splitting the program into a new part file if it replaces a different
    /// tool on a machine that can't change tools itself.
    pub fn set_tool(&mut self, tool: Tool, class: FeedClass) -> Result<()> {
        let changed = self.tool.as_ref().map_or(false, |t| *t != tool);
        if changed && self.current.is_some() {
            if self.profile.auto_tool_changer {
                self.tool_number = tool.number.unwrap_or(self.tool_number + 1);
                self.stop_spindle()?;
                self.write(&format!("T{} M6", self.tool_number))?;
            } else {
                self.next_part()?;
            }
        } else if self.tool.is_none() {
            self.tool_number = tool.number.unwrap_or(1);
        }
        debug!("tool '{}' ({:?} feeds)", tool.name, class);
        self.feed_class = class;
        self.feed = None;
        self.feed_pending = false;
        let text = tool.comment();
        self.tool = Some(tool);
        if self.current.is_some() {
            self.comment(&text)?;
            self.start_spindle()?;
        }
        Ok(())
    }

    /// Binds the material used for feed calculations. Emits nothing.
    pub fn set_material(&mut self, material: Material) {
        debug!("material '{}'", material.name);
        self.material = Some(material);
    }

    /// Depth below the tool tip used when computing feeds for pointed tools.
    pub fn set_feed_depth(&mut self, depth: f64) {
        self.feed_depth = depth.max(0.0);
    }

    fn start_spindle(&mut self) -> Result<()> {
        let rpm = match (&self.tool, &self.material) {
            (Some(tool), Some(material)) => {
                feeds::compute(
                    tool,
                    material,
                    &self.profile,
                    self.feed_class,
                    FeedKind::Cut,
                    self.feed_depth,
                )?
                .rpm
            }
            _ => None,
        };
        let rpm = match rpm {
            Some(rpm) => rpm.round(),
            None => return Ok(()),
        };
        let running = self
            .current
            .as_ref()
            .and_then(|n| self.files.get(n))
            .and_then(|s| s.spindle_rpm);
        if running != Some(rpm) {
            self.write(&format!("S{rpm:.0} M3"))?;
            self.set_spindle(Some(rpm));
        }
        Ok(())
    }

    fn stop_spindle(&mut self) -> Result<()> {
        let running = self
            .current
            .as_ref()
            .and_then(|n| self.files.get(n))
            .and_then(|s| s.spindle_rpm);
        if running.is_some() {
            self.write(SPINDLE_OFF)?;
            self.set_spindle(None);
        }
        Ok(())
    }

    fn set_spindle(&mut self, rpm: Option<f64>) {
        let files = &mut self.files;
        if let Some(stream) = self.current.as_ref().and_then(|n| files.get_mut(n)) {
            stream.spindle_rpm = rpm;
        }
    }

    /// Turns `rate` into a number using the bound tool, material and feed class.
    pub fn resolve_rate(&self, rate: Rate) -> Result<f64> {
        match rate {
            Rate::Fixed(f) => Ok(f),
            Rate::Kind(FeedKind::Probe) => Ok(self.profile.probe_feed),
            Rate::Kind(FeedKind::Engrave) => Ok(self.profile.engrave_feed),
            Rate::Kind(kind) => {
                let tool = self.tool()?;
                let material = self.material.as_ref().ok_or(CamError::NoMaterial)?;
                let feeds = feeds::compute(
                    tool,
                    material,
                    &self.profile,
                    self.feed_class,
                    kind,
                    self.feed_depth,
                )?;
                Ok(feeds.feed)
            }
        }
    }

    /// Replaces the current feed. The next cut carries it.
    pub fn set_speed(&mut self, rate: Rate) -> Result<()> {
        self.feed = Some(self.resolve_rate(rate)?);
        self.feed_pending = true;
        Ok(())
    }

    /// Saves the current feed and switches to `rate` until the matching [`pop_speed`].
    ///
    /// [`pop_speed`]: Machine::pop_speed
    pub fn push_speed(&mut self, rate: Rate) -> Result<()> {
        let feed = self.resolve_rate(rate)?;
        self.speed_stack.push(self.feed);
        self.feed = Some(feed);
        self.feed_pending = true;
        Ok(())
    }

    pub fn pop_speed(&mut self) -> Result<()> {
        let saved = self.speed_stack.pop().ok_or(CamError::FeedStackUnderflow)?;
        self.feed = saved;
        self.feed_pending = true;
        Ok(())
    }

    /// Feed word for the next cutting move, and the feed the move will run at. The current
    /// feed is written once and then left modal; an explicit feed is written and re-arms the
    /// current one.
    fn take_feed(&mut self, explicit: Option<f64>) -> (Option<f64>, Option<f64>) {
        if let Some(f) = explicit {
            self.feed_pending = true;
            self.modal_feed = Some(f);
            return (Some(f), Some(f));
        }
        match self.feed {
            Some(f) if self.feed_pending => {
                self.feed_pending = false;
                self.modal_feed = Some(f);
                (Some(f), Some(f))
            }
            Some(_) => (None, self.modal_feed),
            None => {
                self.unfed_moves += 1;
                warn!("cutting move with no feed set");
                (None, None)
            }
        }
    }

    /// Pass width for the bound tool: `stepover` scaled by the material factor, never more
    /// than 95% of the tool's diameter at `depth`.
    pub fn calc_stepover(&self, stepover: Stepover, depth: f64) -> Result<f64> {
        let d = self.tool()?.diameter_at_depth(depth);
        let step = stepover.resolve(d);
        if !(step > 0.0) {
            return Err(CamError::invalid("stepover", format!("{step} is not positive")));
        }
        Ok((step * self.material_factor).min(0.95 * d))
    }

    /// Pass depth for the bound tool, never more than twice its diameter at `depth`.
    pub fn calc_stepdown(&self, stepdown: Stepover, depth: f64) -> Result<f64> {
        let d = self.tool()?.diameter_at_depth(depth);
        let step = stepdown.resolve(d);
        if !(step > 0.0) {
            return Err(CamError::invalid("stepdown", format!("{step} is not positive")));
        }
        Ok((step * self.material_factor).min(2.0 * d))
    }

    /// Depths of each pass from `z1` down to `z2`, equal steps no larger than `stepdown`.
    /// `z1` itself is not included.
    pub fn zstep(&self, z1: f64, z2: f64, stepdown: f64) -> Result<std::iter::Skip<StepSeq>> {
        Ok(StepSeq::new(z1, z2, stepdown, true)?.skip(1))
    }

    pub fn enable_audit(&mut self) {
        if self.audit.is_none() {
            self.audit = Some(Vec::new());
        }
    }

    /// Moves recorded since auditing was enabled.
    pub fn segments(&self) -> &[Segment] {
        self.audit.as_deref().unwrap_or(&[])
    }

    fn record(&mut self, motion: Motion, to: Position, feed: Option<f64>) {
        let from = self.position;
        self.position = to;
        if let Some(audit) = self.audit.as_mut() {
            audit.push(Segment {
                motion,
                from,
                to,
                feed,
            });
        }
    }
}

impl Drop for Machine {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!("failed to close program files: {}", e);
        }
    }
}
