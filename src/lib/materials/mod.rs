//! Workpiece materials: surface speeds and chip loads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CamError, Result};
use crate::tools::ToolMaterial;

/// Tool diameters (inches) that chip load tables are published for, largest first.
/// Entry `n` of a chip load table belongs to `DIAMETER_BANDS[n]`.
pub const DIAMETER_BANDS: [f64; 6] = [1.0, 1.0 / 2.0, 1.0 / 4.0, 1.0 / 8.0, 1.0 / 16.0, 1.0 / 32.0];

/// Feed per tooth range, in inches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct ChipLoad {
    pub low: f64,
    pub high: f64,
}

impl From<(f64, f64)> for ChipLoad {
    fn from((low, high): (f64, f64)) -> Self {
        ChipLoad { low, high }
    }
}

impl From<ChipLoad> for (f64, f64) {
    fn from(c: ChipLoad) -> Self {
        (c.low, c.high)
    }
}

/// Surface speed range, in feet per minute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct SurfaceSpeed {
    pub low: f64,
    pub high: f64,
}

impl From<(f64, f64)> for SurfaceSpeed {
    fn from((low, high): (f64, f64)) -> Self {
        SurfaceSpeed { low, high }
    }
}

impl From<SurfaceSpeed> for (f64, f64) {
    fn from(s: SurfaceSpeed) -> Self {
        (s.low, s.high)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    #[serde(default)]
    pub sfm_hss: Option<SurfaceSpeed>,
    #[serde(default)]
    pub sfm_carbide: Option<SurfaceSpeed>,
    #[serde(default)]
    pub fpt_hss: Vec<ChipLoad>,
    #[serde(default)]
    pub fpt_carbide: Vec<ChipLoad>,
}

impl Material {
    pub fn surface_speed(&self, tool_material: ToolMaterial) -> Result<SurfaceSpeed> {
        let sfm = match tool_material {
            ToolMaterial::Hss => self.sfm_hss,
            ToolMaterial::Carbide => self.sfm_carbide,
        };
        sfm.ok_or_else(|| self.missing(tool_material, "surface speed"))
    }

    /// Chip load for a tool of `diameter`: the largest band at or below that diameter.
    /// Tools smaller than the smallest listed band use the smallest; anything over an inch
    /// uses the one inch band.
    pub fn chip_load(&self, tool_material: ToolMaterial, diameter: f64) -> Result<ChipLoad> {
        let table = match tool_material {
            ToolMaterial::Hss => &self.fpt_hss,
            ToolMaterial::Carbide => &self.fpt_carbide,
        };
        let last = table
            .last()
            .ok_or_else(|| self.missing(tool_material, "chip load"))?;
        let band = DIAMETER_BANDS
            .iter()
            .zip(table.iter())
            .find(|(band, _)| **band <= diameter + crate::geometry::EPSILON)
            .map(|(_, load)| load);
        Ok(*band.unwrap_or(last))
    }

    fn missing(&self, tool_material: ToolMaterial, field: &'static str) -> CamError {
        CamError::MissingCuttingData {
            material: self.name.clone(),
            tool_material: tool_material.to_string(),
            field,
        }
    }
}

/// Materials looked up by name.
#[derive(Debug, Clone, Default)]
pub struct MaterialCatalog {
    materials: BTreeMap<String, Material>,
}

fn loads(pairs: &[(f64, f64)]) -> Vec<ChipLoad> {
    pairs.iter().map(|&p| ChipLoad::from(p)).collect()
}

/// Same low and high load per band.
fn fixed_loads(values: &[f64]) -> Vec<ChipLoad> {
    values.iter().map(|&v| ChipLoad { low: v, high: v }).collect()
}

const WOOD_LOADS: [(f64, f64); 4] = [(0.025, 0.027), (0.025, 0.027), (0.013, 0.016), (0.004, 0.007)];

impl MaterialCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let sfm = |low: f64, high: f64| Some(SurfaceSpeed { low, high });
        let mut c = MaterialCatalog::new();
        c.insert(Material {
            name: "none".to_string(),
            sfm_hss: sfm(0.0, 0.0),
            sfm_carbide: sfm(0.0, 0.0),
            fpt_hss: loads(&[(0.0, 0.0); 4]),
            fpt_carbide: loads(&[(0.0, 0.0); 4]),
        });
        c.insert(Material {
            name: "aluminum".to_string(),
            sfm_hss: sfm(250.0, 800.0),
            sfm_carbide: sfm(600.0, 1200.0),
            fpt_hss: Vec::new(),
            fpt_carbide: fixed_loads(&[0.0080, 0.0040, 0.0020, 0.0010]),
        });
        c.insert(Material {
            name: "steel".to_string(),
            sfm_hss: None,
            sfm_carbide: sfm(100.0, 350.0),
            fpt_hss: Vec::new(),
            fpt_carbide: fixed_loads(&[0.0050, 0.0030, 0.0020, 0.0010]),
        });
        for name in &["hardwood", "softwood"] {
            c.insert(Material {
                name: name.to_string(),
                sfm_hss: sfm(600.0, 1000.0),
                sfm_carbide: sfm(600.0, 1000.0),
                fpt_hss: Vec::new(),
                fpt_carbide: loads(&WOOD_LOADS),
            });
        }
        c.insert(Material {
            name: "mdf".to_string(),
            sfm_hss: sfm(600.0, 1000.0),
            sfm_carbide: sfm(600.0, 1000.0),
            fpt_hss: loads(&WOOD_LOADS),
            fpt_carbide: loads(&WOOD_LOADS),
        });
        let mut pcb = WOOD_LOADS.to_vec();
        pcb.extend_from_slice(&[(0.001, 0.002), (0.0005, 0.001)]);
        c.insert(Material {
            name: "fr4-1oz".to_string(),
            sfm_hss: sfm(250.0, 800.0),
            sfm_carbide: sfm(600.0, 1000.0),
            fpt_hss: loads(&pcb),
            fpt_carbide: loads(&WOOD_LOADS),
        });
        c.insert(Material {
            name: "foam".to_string(),
            sfm_hss: sfm(100.0, 5000.0),
            sfm_carbide: sfm(100.0, 5000.0),
            fpt_hss: loads(&WOOD_LOADS),
            fpt_carbide: loads(&WOOD_LOADS),
        });
        c
    }

    pub fn insert(&mut self, material: Material) {
        self.materials.insert(material.name.clone(), material);
    }

    pub fn get(&self, name: &str) -> Result<Material> {
        self.materials
            .get(name)
            .cloned()
            .ok_or_else(|| CamError::unknown("material", name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.materials.keys().map(|k| k.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_selection() {
        let mdf = MaterialCatalog::builtin().get("mdf").unwrap();
        let hss = ToolMaterial::Hss;
        // 1/4 sits exactly on a band
        assert_eq!(mdf.chip_load(hss, 0.25).unwrap(), ChipLoad::from((0.013, 0.016)));
        // 3/8 falls back to the 1/4 band
        assert_eq!(mdf.chip_load(hss, 0.375).unwrap(), ChipLoad::from((0.013, 0.016)));
        assert_eq!(mdf.chip_load(hss, 0.5).unwrap(), ChipLoad::from((0.025, 0.027)));
        assert_eq!(mdf.chip_load(hss, 1.5).unwrap(), ChipLoad::from((0.025, 0.027)));
        // Smaller than every listed band
        assert_eq!(mdf.chip_load(hss, 0.02).unwrap(), ChipLoad::from((0.004, 0.007)));
    }

    #[test]
    fn test_long_table_reaches_small_bands() {
        let pcb = MaterialCatalog::builtin().get("fr4-1oz").unwrap();
        let load = pcb.chip_load(ToolMaterial::Hss, 1.0 / 32.0).unwrap();
        assert_eq!(load, ChipLoad::from((0.0005, 0.001)));
    }

    #[test]
    fn test_missing_data() {
        let steel = MaterialCatalog::builtin().get("steel").unwrap();
        let err = steel.surface_speed(ToolMaterial::Hss).unwrap_err();
        assert_eq!(
            err.to_string(),
            "material 'steel' has no surface speed data for hss tools"
        );
        assert!(steel.chip_load(ToolMaterial::Hss, 0.25).is_err());
        assert!(steel.chip_load(ToolMaterial::Carbide, 0.25).is_ok());
    }

    #[test]
    fn test_unknown_material() {
        assert!(MaterialCatalog::builtin().get("unobtainium").is_err());
    }
}
