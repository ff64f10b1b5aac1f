//! Units of machining work, and programs made of them.
//!
//! An [`Operation`] describes one feature. [`run`] wraps its `generate` with the shared
//! setup every operation gets (tool binding, comment, feed scope), so the per-operation code
//! only emits motion.

use tracing::debug;

use crate::error::{CamError, Result};
use crate::gcode::{xyz, z};
use crate::machine::{Machine, Rate};
use crate::tools::Tool;

mod circle;
mod drill;
mod pocket;
mod profile;

pub use circle::{BoltCircle, CirclePocket, CircleProfile, HsmCirclePocket, Ring};
pub use drill::{DrillCycle, HelicalDrill, ZProbe};
pub use pocket::{RectPocket, RectPocketCornerRelief, ScanAxis};
pub use profile::CoordProfile;

pub trait Operation {
    /// Comment written before the operation's motion.
    fn comment(&self) -> Option<String> {
        None
    }

    /// Tool to bind before generating. `None` keeps whatever tool is bound.
    fn tool(&self) -> Option<&Tool> {
        None
    }

    /// Feed in effect while generating; the previous feed is restored afterwards.
    fn feed(&self) -> Option<Rate> {
        None
    }

    /// Checks parameters. Runs before anything is written.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Emits the operation's motion, finishing at a safe height.
    fn generate(&self, m: &mut Machine) -> Result<()>;
}

/// Validates and generates `op` inside its own indentation level and feed scope.
/// The feed stack and level are restored even if generation fails.
pub fn run(m: &mut Machine, op: &dyn Operation) -> Result<()> {
    op.validate()?;
    m.push_level();
    let result = run_scoped(m, op);
    let popped = m.pop_level();
    result.and(popped)
}

fn run_scoped(m: &mut Machine, op: &dyn Operation) -> Result<()> {
    if let Some(tool) = op.tool() {
        let class = m.feed_class();
        m.set_tool(tool.clone(), class)?;
    }
    if let Some(c) = op.comment() {
        m.comment(&c)?;
    }
    match op.feed() {
        Some(rate) => {
            m.push_speed(rate)?;
            let result = op.generate(m);
            let popped = m.pop_speed();
            result.and(popped)
        }
        None => op.generate(m),
    }
}

/// Operations written to one program file.
pub struct Program {
    pub file: String,
    /// Job name, written as the first comment.
    pub name: Option<String>,
    /// Position to move to before the first operation.
    pub origin: Option<[f64; 3]>,
    operations: Vec<Box<dyn Operation>>,
}

impl Program {
    pub fn new(file: &str) -> Self {
        Program {
            file: file.to_string(),
            name: None,
            origin: None,
            operations: Vec::new(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn origin(mut self, x: f64, y: f64, z: f64) -> Self {
        self.origin = Some([x, y, z]);
        self
    }

    pub fn add<O: Operation + 'static>(&mut self, op: O) -> &mut Self {
        self.operations.push(Box::new(op));
        self
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Writes the whole program. Every operation is validated before the file is opened,
    /// so a bad request never leaves a partial program behind.
    pub fn generate(&self, m: &mut Machine) -> Result<()> {
        for op in &self.operations {
            op.validate()?;
        }
        debug!("writing {} operations to {}", self.operations.len(), self.file);
        m.set_file(&self.file)?;
        if let Some(name) = &self.name {
            m.comment(name)?;
        }
        if let Some([x, y, z]) = self.origin {
            m.goto(xyz(x, y, z))?;
        }
        for op in &self.operations {
            run(m, op.as_ref())?;
        }
        m.finish()
    }
}

/// Rapid to a position.
pub struct Goto {
    pub axes: crate::gcode::Axes,
}

impl Operation for Goto {
    fn validate(&self) -> Result<()> {
        if !self.axes.has_axis() {
            return Err(CamError::EmptyMove);
        }
        Ok(())
    }

    fn generate(&self, m: &mut Machine) -> Result<()> {
        m.goto(self.axes.clone())
    }
}

/// Describes the stock for simulators; emits no motion.
pub struct RectStock {
    pub width: f64,
    pub height: f64,
    pub thickness: f64,
    pub origin: [f64; 3],
}

impl Operation for RectStock {
    fn validate(&self) -> Result<()> {
        positive("width", self.width)?;
        positive("height", self.height)?;
        positive("thickness", self.thickness)
    }

    fn generate(&self, m: &mut Machine) -> Result<()> {
        let [x, y, z] = self.origin;
        m.comment(&format!(
            "RectSolid {:.6} {:.6} {:.6} origin={:.6} {:.6} {:.6}",
            self.width, self.height, self.thickness, x, y, z
        ))
    }
}

pub(crate) fn positive(name: &'static str, v: f64) -> Result<()> {
    if v > 0.0 && v.is_finite() {
        Ok(())
    } else {
        Err(CamError::invalid(name, format!("must be positive, got {v}")))
    }
}

pub(crate) fn non_negative(name: &'static str, v: f64) -> Result<()> {
    if v >= 0.0 && v.is_finite() {
        Ok(())
    } else {
        Err(CamError::invalid(name, format!("must not be negative, got {v}")))
    }
}

/// Clearance height for a feature whose top is at `top`.
pub(crate) fn clear_height(m: &Machine, top: f64, clearz: Option<f64>) -> f64 {
    clearz.unwrap_or(top + m.profile().clearance)
}

pub(crate) fn retract(m: &mut Machine, clearz: f64) -> Result<()> {
    m.goto(z(clearz))
}
