//! Machine profiles and catalog configuration.
//!
//! A config file is TOML with any number of `[[machine]]`, `[[tool]]` and `[[material]]`
//! tables. Entries are added on top of the built-in catalogs, replacing any built-in entry
//! with the same name.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CamError, Result};
use crate::materials::{Material, MaterialCatalog};
use crate::tools::{Tool, ToolCatalog};

fn default_clearance() -> f64 {
    0.125
}

fn default_plunge_divisor() -> f64 {
    10.0
}

fn default_fixed_feed() -> f64 {
    5.0
}

/// Physical limits of one machine, chosen once per program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineProfile {
    pub name: String,
    pub min_rpm: f64,
    pub max_rpm: f64,
    /// X, Y and Z limits in inches per minute.
    pub max_feedrates: [f64; 3],
    #[serde(default)]
    pub auto_tool_changer: bool,
    /// Height above the top of cut used for rapids between features.
    #[serde(default = "default_clearance")]
    pub clearance: f64,
    /// Plunge and drill feeds are the cutting feed divided by this.
    #[serde(default = "default_plunge_divisor")]
    pub plunge_divisor: f64,
    #[serde(default = "default_fixed_feed")]
    pub probe_feed: f64,
    #[serde(default = "default_fixed_feed")]
    pub engrave_feed: f64,
}

impl MachineProfile {
    pub fn new(name: &str, min_rpm: f64, max_rpm: f64, max_feedrates: [f64; 3]) -> Self {
        MachineProfile {
            name: name.to_string(),
            min_rpm,
            max_rpm,
            max_feedrates,
            auto_tool_changer: false,
            clearance: default_clearance(),
            plunge_divisor: default_plunge_divisor(),
            probe_feed: default_fixed_feed(),
            engrave_feed: default_fixed_feed(),
        }
    }

    /// Fastest feed any axis can take.
    pub fn peak_feedrate(&self) -> f64 {
        self.max_feedrates.iter().cloned().fold(0.0, f64::max)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.min_rpm > 0.0) || self.min_rpm > self.max_rpm {
            return Err(CamError::invalid(
                "min_rpm",
                format!(
                    "machine '{}' needs 0 < min_rpm <= max_rpm, got {}..{}",
                    self.name, self.min_rpm, self.max_rpm
                ),
            ));
        }
        if self.max_feedrates.iter().any(|f| !(*f > 0.0)) {
            return Err(CamError::invalid(
                "max_feedrates",
                format!("machine '{}' has a non-positive axis feed", self.name),
            ));
        }
        if !(self.plunge_divisor > 0.0) {
            return Err(CamError::invalid("plunge_divisor", "must be positive"));
        }
        Ok(())
    }
}

pub fn builtin_profiles() -> Vec<MachineProfile> {
    vec![
        MachineProfile::new("k2cnc", 10000.0, 20000.0, [144.0, 144.0, 20.0]),
        MachineProfile::new("lms", 10000.0, 20000.0, [144.0, 144.0, 20.0]),
    ]
}

/// Contents of one config file.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default, rename = "machine")]
    pub machines: Vec<MachineProfile>,
    #[serde(default, rename = "tool")]
    pub tools: Vec<Tool>,
    #[serde(default, rename = "material")]
    pub materials: Vec<Material>,
}

impl ConfigFile {
    pub fn parse(text: &str) -> Result<Self> {
        let config: ConfigFile = toml::from_str(text)?;
        for m in &config.machines {
            m.validate()?;
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        debug!("loading config from {}", path.display());
        ConfigFile::parse(&fs::read_to_string(path)?)
    }
}

/// Machine profiles defined in a config file, ignoring its tools and materials.
pub fn load_profiles(path: &Path) -> Result<Vec<MachineProfile>> {
    Ok(ConfigFile::load(path)?.machines)
}

/// Everything that can be looked up by name.
#[derive(Debug, Clone)]
pub struct Catalogs {
    pub machines: BTreeMap<String, MachineProfile>,
    pub tools: ToolCatalog,
    pub materials: MaterialCatalog,
}

impl Catalogs {
    pub fn builtin() -> Self {
        Catalogs {
            machines: builtin_profiles()
                .into_iter()
                .map(|m| (m.name.clone(), m))
                .collect(),
            tools: ToolCatalog::builtin(),
            materials: MaterialCatalog::builtin(),
        }
    }

    /// Built-in catalogs, extended by `path` if given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut catalogs = Catalogs::builtin();
        if let Some(path) = path {
            catalogs.extend(ConfigFile::load(path)?);
        }
        Ok(catalogs)
    }

    pub fn extend(&mut self, config: ConfigFile) {
        for m in config.machines {
            self.machines.insert(m.name.clone(), m);
        }
        for t in config.tools {
            self.tools.insert(t);
        }
        for m in config.materials {
            self.materials.insert(m);
        }
    }

    pub fn machine(&self, name: &str) -> Result<MachineProfile> {
        self.machines
            .get(name)
            .cloned()
            .ok_or_else(|| CamError::unknown("machine", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolKind, ToolMaterial};

    const CONFIG: &str = r#"
[[machine]]
name = "shapeoko"
min_rpm = 8000
max_rpm = 24000
max_feedrates = [200, 200, 30]
plunge_divisor = 4

[[tool]]
name = "3mm carbide"
kind = "straight"
diameter = 0.118
material = "carbide"
flutes = 3

[[tool]]
name = "60deg v"
kind = "v"
diameter = 0.5
included_angle = 60

[[material]]
name = "acrylic"
sfm_carbide = [500, 800]
fpt_carbide = [[0.008, 0.010], [0.005, 0.007]]
"#;

    #[test]
    fn test_parse_config() {
        let config = ConfigFile::parse(CONFIG).unwrap();
        assert_eq!(config.machines.len(), 1);
        let m = &config.machines[0];
        assert_eq!(m.plunge_divisor, 4.0);
        assert_eq!(m.clearance, 0.125);
        assert!(!m.auto_tool_changer);
        assert_eq!(m.peak_feedrate(), 200.0);

        let t = &config.tools[0];
        assert_eq!(t.material, ToolMaterial::Carbide);
        assert_eq!(t.flutes, 3);
        assert!(matches!(t.kind, ToolKind::Straight { .. }));
        assert!(matches!(
            config.tools[1].kind,
            ToolKind::V { tip_diameter, .. } if tip_diameter == 0.0
        ));
        assert_eq!(config.materials[0].fpt_carbide.len(), 2);
    }

    #[test]
    fn test_extend_overrides_builtin() {
        let mut c = Catalogs::builtin();
        assert!(c.machine("shapeoko").is_err());
        c.extend(ConfigFile::parse(CONFIG).unwrap());
        assert_eq!(c.machine("shapeoko").unwrap().max_rpm, 24000.0);
        assert!(c.machine("k2cnc").is_ok());
        assert!(c.tools.get("60deg v").is_ok());
        assert!(c.materials.get("acrylic").is_ok());
    }

    #[test]
    fn test_rejects_bad_profile() {
        let text = "[[machine]]\nname = \"x\"\nmin_rpm = 5000\nmax_rpm = 100\nmax_feedrates = [1, 1, 1]\n";
        assert!(matches!(
            ConfigFile::parse(text),
            Err(CamError::InvalidInput { name: "min_rpm", .. })
        ));
        assert!(matches!(
            ConfigFile::parse("[[machine]]\nname = 3\n"),
            Err(CamError::Config(_))
        ));
    }

    #[test]
    fn test_load_profiles_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cam.toml");
        fs::write(&path, CONFIG).unwrap();
        let profiles = load_profiles(&path).unwrap();
        assert_eq!(profiles[0].name, "shapeoko");
        assert!(Catalogs::load(Some(&path)).unwrap().machine("shapeoko").is_ok());
        assert!(matches!(
            Catalogs::load(Some(&dir.path().join("missing.toml"))),
            Err(CamError::Io(_))
        ));
    }
}
