//! Words and lines of the motion program.
//!
//! Everything here is pure formatting: building lines is separate from deciding what to emit,
//! which is the [`Machine`](crate::machine::Machine)'s job.

use std::fmt::Write;

/// Start/end marker framing every program file.
pub const PROGRAM_MARKER: &str = "%";
/// X-Y plane, inch units, no cutter compensation, absolute positioning.
pub const PREAMBLE: &str = "G17 G20 G40 G90";
pub const SPINDLE_OFF: &str = "M5";
pub const PROGRAM_END: &str = "M30";
pub const PAUSE: &str = "M0";

/// Axis words for a linear move, with an optional feed. Unset axes hold their last value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Axes {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub a: Option<f64>,
    pub feed: Option<f64>,
}

pub fn x(x: f64) -> Axes {
    Axes {
        x: Some(x),
        ..Axes::default()
    }
}

pub fn y(y: f64) -> Axes {
    Axes {
        y: Some(y),
        ..Axes::default()
    }
}

pub fn z(z: f64) -> Axes {
    Axes {
        z: Some(z),
        ..Axes::default()
    }
}

pub fn a(a: f64) -> Axes {
    Axes {
        a: Some(a),
        ..Axes::default()
    }
}

pub fn xy(x: f64, y: f64) -> Axes {
    Axes {
        x: Some(x),
        y: Some(y),
        ..Axes::default()
    }
}

pub fn xyz(x: f64, y: f64, z: f64) -> Axes {
    Axes {
        x: Some(x),
        y: Some(y),
        z: Some(z),
        ..Axes::default()
    }
}

pub fn xyza(x: f64, y: f64, z: f64, a: f64) -> Axes {
    Axes {
        x: Some(x),
        y: Some(y),
        z: Some(z),
        a: Some(a),
        feed: None,
    }
}

pub fn zf(z: f64, feed: f64) -> Axes {
    Axes {
        z: Some(z),
        feed: Some(feed),
        ..Axes::default()
    }
}

pub fn xyf(x: f64, y: f64, feed: f64) -> Axes {
    Axes {
        x: Some(x),
        y: Some(y),
        feed: Some(feed),
        ..Axes::default()
    }
}

impl Axes {
    /// Same axes with an explicit feed attached.
    pub fn feed(mut self, feed: f64) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn has_axis(&self) -> bool {
        self.x.is_some() || self.y.is_some() || self.z.is_some() || self.a.is_some()
    }

    /// `G0`/`G1` line for these axes, using `feed` in place of any attached feed.
    pub fn to_line(&self, g: &str, feed: Option<f64>) -> String {
        let mut line = String::from(g);
        g_val(&mut line, "X", self.x);
        g_val(&mut line, "Y", self.y);
        g_val(&mut line, "Z", self.z);
        g_val(&mut line, "A", self.a);
        f_val(&mut line, feed);
        line
    }
}

/// An arc ending at `x, y`, whose center is offset `i, j` from the start point.
#[derive(Clone, Debug, PartialEq)]
pub struct ArcWords {
    pub x: f64,
    pub y: f64,
    pub i: f64,
    pub j: f64,
    pub z: Option<f64>,
    pub clockwise: bool,
}

impl ArcWords {
    pub fn to_line(&self, feed: Option<f64>) -> String {
        let mut line = String::from(if self.clockwise { "G2" } else { "G3" });
        g_val(&mut line, "X", Some(self.x));
        g_val(&mut line, "Y", Some(self.y));
        g_val(&mut line, "I", Some(self.i));
        g_val(&mut line, "J", Some(self.j));
        g_val(&mut line, "Z", self.z);
        f_val(&mut line, feed);
        line
    }
}

/// Append a parameter word in fixed point, if `ov` is `Some`.
/// Values that would print as negative zero are written as zero.
fn g_val(line: &mut String, name: &str, ov: Option<f64>) {
    if let Some(v) = ov {
        let v = if v.abs() < 5e-7 { 0.0 } else { v };
        let _ = write!(line, " {name}{v:.6}");
    }
}

fn f_val(line: &mut String, ov: Option<f64>) {
    if let Some(f) = ov {
        let _ = write!(line, " F{f:.3}");
    }
}

/// A parenthesised comment. Parentheses inside the text would end the comment early,
/// so they become brackets.
pub fn comment(s: &str) -> String {
    format!("({})", s.replace('(', "[").replace(')', "]"))
}

/// Single axis word for probe moves, e.g. `Z-0.250000`.
pub fn axis_word(axis: char, v: f64) -> String {
    let mut s = String::new();
    g_val(&mut s, &axis.to_ascii_uppercase().to_string(), Some(v));
    s.trim_start().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_words() {
        assert_eq!(xy(1.0, -2.5).to_line("G0", None), "G0 X1.000000 Y-2.500000");
        assert_eq!(z(-0.125).to_line("G1", Some(12.0)), "G1 Z-0.125000 F12.000");
        assert_eq!(
            xyza(0.0, 0.0, 1.0, 90.0).to_line("G0", None),
            "G0 X0.000000 Y0.000000 Z1.000000 A90.000000"
        );
    }

    #[test]
    fn test_negative_zero_is_zero() {
        assert_eq!(x(-0.0).to_line("G0", None), "G0 X0.000000");
    }

    #[test]
    fn test_has_axis() {
        assert!(!Axes::default().has_axis());
        assert!(!Axes::default().feed(3.0).has_axis());
        assert!(a(1.0).has_axis());
        assert_eq!(zf(1.0, 2.0), z(1.0).feed(2.0));
        assert_eq!(xyf(1.0, 2.0, 3.0).feed, Some(3.0));
    }

    #[test]
    fn test_arc_words() {
        let arc = ArcWords {
            x: 1.0,
            y: 0.0,
            i: -1.0,
            j: 0.0,
            z: Some(-0.1),
            clockwise: true,
        };
        assert_eq!(
            arc.to_line(Some(30.0)),
            "G2 X1.000000 Y0.000000 I-1.000000 J0.000000 Z-0.100000 F30.000"
        );
        let arc = ArcWords {
            clockwise: false,
            z: None,
            ..arc
        };
        assert_eq!(arc.to_line(None), "G3 X1.000000 Y0.000000 I-1.000000 J0.000000");
    }

    #[test]
    fn test_comment_sanitised() {
        assert_eq!(comment("hole (M5)"), "(hole [M5])");
        assert_eq!(axis_word('z', -0.25), "Z-0.250000");
    }
}
