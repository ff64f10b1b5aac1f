//! Cutting tools and the built-in tool catalog.
//!
//! All dimensions are in inches, matching the `G20` program preamble.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CamError, Result};

/// One millimetre, in inches.
pub const MM: f64 = 1.0 / 25.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolMaterial {
    Hss,
    Carbide,
}

impl Default for ToolMaterial {
    fn default() -> Self {
        ToolMaterial::Hss
    }
}

impl fmt::Display for ToolMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolMaterial::Hss => write!(f, "hss"),
            ToolMaterial::Carbide => write!(f, "carbide"),
        }
    }
}

fn default_cutting_length() -> f64 {
    5.0
}

/// Geometry of each kind of tool. Only the fields that kind needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolKind {
    Straight {
        diameter: f64,
        #[serde(default = "default_cutting_length")]
        cutting_length: f64,
    },
    Ball {
        diameter: f64,
        #[serde(default = "default_cutting_length")]
        cutting_length: f64,
    },
    Dovetail {
        major_diameter: f64,
        minor_diameter: f64,
        height: f64,
    },
    /// V bit; `included_angle` in degrees.
    V {
        diameter: f64,
        included_angle: f64,
        #[serde(default)]
        tip_diameter: f64,
        #[serde(default = "default_cutting_length")]
        cutting_length: f64,
    },
    /// Flat tipped engraver; `taper_angle` is the per-side angle in degrees.
    TaperedEngrave {
        tip_diameter: f64,
        shank_diameter: f64,
        taper_angle: f64,
        #[serde(default = "default_cutting_length")]
        cutting_length: f64,
    },
    Laser {
        beam_width: f64,
    },
}

fn default_flutes() -> u32 {
    2
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(flatten)]
    pub kind: ToolKind,
    #[serde(default)]
    pub material: ToolMaterial,
    #[serde(default = "default_flutes")]
    pub flutes: u32,
    #[serde(default)]
    pub edge_radius: f64,
    /// Pocket number in an automatic tool changer.
    #[serde(default)]
    pub number: Option<u32>,
}

impl Tool {
    pub fn new(name: &str, kind: ToolKind, material: ToolMaterial, flutes: u32) -> Self {
        Tool {
            name: name.to_string(),
            kind,
            material,
            flutes,
            edge_radius: 0.0,
            number: None,
        }
    }

    pub fn straight(name: &str, diameter: f64, material: ToolMaterial, flutes: u32) -> Self {
        Tool::new(
            name,
            ToolKind::Straight {
                diameter,
                cutting_length: default_cutting_length(),
            },
            material,
            flutes,
        )
    }

    pub fn ball(name: &str, diameter: f64, material: ToolMaterial, flutes: u32) -> Self {
        Tool::new(
            name,
            ToolKind::Ball {
                diameter,
                cutting_length: default_cutting_length(),
            },
            material,
            flutes,
        )
    }

    pub fn vee(
        name: &str,
        diameter: f64,
        included_angle: f64,
        tip_diameter: f64,
        material: ToolMaterial,
        flutes: u32,
    ) -> Self {
        Tool::new(
            name,
            ToolKind::V {
                diameter,
                included_angle,
                tip_diameter,
                cutting_length: default_cutting_length(),
            },
            material,
            flutes,
        )
    }

    /// Nominal (largest cutting) diameter.
    pub fn diameter(&self) -> f64 {
        match self.kind {
            ToolKind::Straight { diameter, .. }
            | ToolKind::Ball { diameter, .. }
            | ToolKind::V { diameter, .. } => diameter,
            ToolKind::Dovetail { major_diameter, .. } => major_diameter,
            ToolKind::TaperedEngrave { shank_diameter, .. } => shank_diameter,
            ToolKind::Laser { beam_width } => beam_width,
        }
    }

    pub fn radius(&self) -> f64 {
        self.diameter() / 2.0
    }

    /// Cutting width at `depth` below the tip. Constant except for pointed tools,
    /// which widen until they reach their nominal diameter.
    pub fn diameter_at_depth(&self, depth: f64) -> f64 {
        let depth = depth.max(0.0);
        match self.kind {
            ToolKind::V {
                diameter,
                included_angle,
                tip_diameter,
                ..
            } => {
                let d = tip_diameter + 2.0 * depth * (included_angle / 2.0).to_radians().tan();
                d.min(diameter)
            }
            ToolKind::TaperedEngrave {
                tip_diameter,
                shank_diameter,
                taper_angle,
                ..
            } => {
                let d = tip_diameter + 2.0 * depth * taper_angle.to_radians().tan();
                d.min(shank_diameter)
            }
            _ => self.diameter(),
        }
    }

    pub fn is_laser(&self) -> bool {
        matches!(self.kind, ToolKind::Laser { .. })
    }

    /// Tool description comment text, the format simulators read to build the cutter shape.
    pub fn comment(&self) -> String {
        match self.kind {
            ToolKind::Straight {
                diameter,
                cutting_length,
            } => format!("FlatMill {:.6} {:.6}", cutting_length, diameter / 2.0),
            ToolKind::Ball {
                diameter,
                cutting_length,
            } => format!("BallMill {:.6} {:.6}", cutting_length, diameter / 2.0),
            ToolKind::Dovetail {
                major_diameter,
                minor_diameter,
                height,
            } => format!(
                "DovetailMill {:.6} {:.6} {:.6}",
                height,
                major_diameter / 2.0,
                minor_diameter / 2.0
            ),
            ToolKind::V {
                diameter,
                included_angle,
                tip_diameter,
                cutting_length,
            } => format!(
                "VMill {:.6} {:.6} {:.6} {:.6}",
                cutting_length,
                tip_diameter / 2.0,
                diameter / 2.0,
                included_angle
            ),
            ToolKind::TaperedEngrave {
                tip_diameter,
                shank_diameter,
                taper_angle,
                cutting_length,
            } => format!(
                "TaperedMill {:.6} {:.6} {:.6} {:.6}",
                cutting_length,
                tip_diameter / 2.0,
                shank_diameter / 2.0,
                taper_angle
            ),
            ToolKind::Laser { beam_width } => format!("Laser {:.6}", beam_width),
        }
    }
}

/// Tools looked up by name.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: BTreeMap<String, Tool>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        use ToolMaterial::Hss;

        let mut c = ToolCatalog::new();
        for &(name, d) in &[
            ("1/16in spiral upcut", 1.0 / 16.0),
            ("1/8in spiral upcut", 1.0 / 8.0),
            ("1/4in spiral upcut", 1.0 / 4.0),
            ("3/8in spiral upcut", 3.0 / 8.0),
            ("1/2in spiral upcut", 1.0 / 2.0),
            ("1 1/2in straight bit", 1.5),
        ] {
            c.insert(Tool::straight(name, d, Hss, 2));
        }
        for &(name, d) in &[
            ("1/8in 4-flute endmill", 1.0 / 8.0),
            ("1/4in 4-flute endmill", 1.0 / 4.0),
            ("1/2in 4-flute endmill", 1.0 / 2.0),
        ] {
            c.insert(Tool::straight(name, d, Hss, 4));
        }
        for &(name, d) in &[
            ("1/8in spiral ball", 1.0 / 8.0),
            ("1/4in spiral ball", 1.0 / 4.0),
            ("1/2in spiral ball", 1.0 / 2.0),
        ] {
            c.insert(Tool::ball(name, d, Hss, 2));
        }
        for &mm in &[
            0.6, 0.7, 0.8, 0.9, 1.0, 1.2, 1.4, 1.6, 1.8, 2.0, 2.2, 2.4, 3.0,
        ] {
            c.insert(Tool::straight(&format!("tiny-{mm:.1}mm"), mm * MM, Hss, 2));
        }
        c.insert(Tool::new(
            "1/2in dovetail",
            ToolKind::Dovetail {
                major_diameter: 1.0 / 2.0,
                minor_diameter: 5.0 / 8.0,
                height: 7.0 / 8.0,
            },
            Hss,
            2,
        ));
        c.insert(Tool::vee("30degV", 1.0 / 4.0, 30.0, 0.0, Hss, 1));
        c.insert(Tool::vee("engrave-0.1mm-30", 1.0 / 8.0, 30.0, 0.1 * MM, Hss, 1));
        c.insert(Tool::vee("engrave-0.1mm-10", 1.0 / 8.0, 10.0, 0.1 * MM, Hss, 1));
        c.insert(Tool::vee("engrave-0.01in-15", 1.0 / 8.0, 15.0, 0.01, Hss, 3));
        c.insert(Tool::new(
            "taper-0.2mm-10",
            ToolKind::TaperedEngrave {
                tip_diameter: 0.2 * MM,
                shank_diameter: 1.0 / 8.0,
                taper_angle: 10.0,
                cutting_length: default_cutting_length(),
            },
            Hss,
            2,
        ));
        c.insert(Tool::new(
            "k40-laser",
            ToolKind::Laser { beam_width: 0.010 },
            Hss,
            1,
        ));
        c
    }

    /// Adds or replaces a tool under its own name.
    pub fn insert(&mut self, tool: Tool) {
        self.tools.insert(tool.name.clone(), tool);
    }

    pub fn get(&self, name: &str) -> Result<Tool> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| CamError::unknown("tool", name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(|k| k.as_str())
    }
}

/// How a screw meets its hole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoleFit {
    /// Tap drill for 75% thread.
    Thread75,
    /// Tap drill for 50% thread.
    Thread50,
    CloseClearance,
    StandardClearance,
}

impl FromStr for HoleFit {
    type Err = CamError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "thread" | "thread75" | "75" => Ok(HoleFit::Thread75),
            "thread50" | "50" => Ok(HoleFit::Thread50),
            "close" => Ok(HoleFit::CloseClearance),
            "clearance" | "standard" => Ok(HoleFit::StandardClearance),
            _ => Err(CamError::invalid(
                "fit",
                format!("unknown hole fit '{s}', expected thread75, thread50, close or standard"),
            )),
        }
    }
}

/// Tap and clearance drills per screw, in [`HoleFit`] order. Inch sizes are in inches,
/// metric sizes in millimetres.
/// From <http://www.littlemachineshop.com/reference/tapdrillsizes.pdf>.
const SCREWS: &[(&str, [(f64, &str); 4])] = &[
    ("1/4-20", [(0.1887, "7"), (0.2010, "7/32"), (0.2188, "F"), (0.2570, "H")]),
    ("1/4-28", [(0.2062, "3"), (0.2130, "1"), (0.2280, "F"), (0.2570, "H")]),
    ("1/4-32", [(0.2117, "7/32"), (0.2188, "1"), (0.2280, "F"), (0.2570, "H")]),
    ("M1.5-.35", [(1.15, "56"), (1.25, "55"), (1.60, "1/16"), (1.65, "52")]),
    ("M1.6-.35", [(1.25, "55"), (1.35, "54"), (1.70, "51"), (1.75, "50")]),
    ("M1.8-.35", [(1.45, "53"), (1.55, "1/16"), (1.90, "49"), (2.00, "5/64")]),
    ("M2-.45", [(1.55, "1/16"), (1.70, "51"), (2.10, "45"), (2.20, "44")]),
    ("M2-.40", [(1.60, "52"), (1.75, "50"), (2.10, "45"), (2.20, "44")]),
    ("M2.2-.45", [(1.75, "50"), (1.90, "48"), (2.30, "3/32"), (2.40, "41")]),
    ("M2.5-.45", [(2.05, "46"), (2.20, "44"), (2.65, "37"), (2.75, "7/64")]),
    ("M3-.60", [(2.40, "41"), (2.60, "37"), (3.15, "1/8"), (3.30, "30")]),
    ("M3-.50", [(2.50, "39"), (2.70, "36"), (3.15, "1/8"), (3.30, "30")]),
    ("M3.5-.60", [(2.90, "32"), (3.10, "31"), (3.70, "27"), (3.85, "24")]),
    ("M4-.75", [(3.25, "30"), (3.50, "28"), (4.20, "19"), (4.40, "17")]),
    ("M4-.70", [(3.30, "30"), (3.50, "28"), (4.20, "19"), (4.40, "17")]),
    ("M4.5-.75", [(3.75, "25"), (4.00, "22"), (4.75, "13"), (5.00, "9")]),
    ("M5-1.00", [(4.00, "21"), (4.40, "11/64"), (5.25, "5"), (5.50, "7/32")]),
    ("M5-.90", [(4.10, "20"), (4.40, "17"), (5.25, "5"), (5.50, "7/32")]),
    ("M5-.80", [(4.20, "19"), (4.50, "16"), (5.25, "5"), (5.50, "7/32")]),
    ("M5.5-.90", [(4.60, "14"), (4.90, "10"), (5.80, "1"), (6.10, "B")]),
    ("M6-1.00", [(5.00, "8"), (5.40, "4"), (6.30, "E"), (6.60, "G")]),
    ("M6-0.75", [(5.25, "4"), (5.50, "7/32"), (6.30, "E"), (6.60, "G")]),
];

/// A hole for a screw: its diameter in inches and the drill that makes it.
#[derive(Debug, Clone, PartialEq)]
pub struct HoleSize {
    pub diameter: f64,
    /// Number, letter or fractional drill size.
    pub drill: &'static str,
}

impl HoleSize {
    pub fn screw(name: &str, fit: HoleFit) -> Result<HoleSize> {
        let (_, row) = SCREWS
            .iter()
            .find(|(n, _)| *n == name)
            .ok_or_else(|| CamError::unknown("screw", name))?;
        let (d, drill) = row[fit as usize];
        let diameter = if name.starts_with('M') { d * MM } else { d };
        Ok(HoleSize { diameter, drill })
    }

    pub fn radius(&self) -> f64 {
        self.diameter / 2.0
    }

    /// Screw names the table knows.
    pub fn screws() -> impl Iterator<Item = &'static str> {
        SCREWS.iter().map(|(n, _)| *n)
    }
}
