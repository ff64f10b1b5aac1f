//! Spindle speed and feed rate from tool, material and machine limits.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::config::MachineProfile;
use crate::error::{CamError, Result};
use crate::materials::Material;
use crate::tools::Tool;

/// Which end of the published cutting data band to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedClass {
    Low,
    High,
    Average,
}

impl FromStr for FeedClass {
    type Err = CamError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(FeedClass::Low),
            "high" => Ok(FeedClass::High),
            "average" | "avg" => Ok(FeedClass::Average),
            _ => Err(CamError::invalid(
                "feed_class",
                format!("expected low, high or average, got '{s}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Cut,
    Plunge,
    Drill,
    Engrave,
    Probe,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FeedKind::Cut => "cut",
            FeedKind::Plunge => "plunge",
            FeedKind::Drill => "drill",
            FeedKind::Engrave => "engrave",
            FeedKind::Probe => "probe",
        };
        write!(f, "{s}")
    }
}

/// A feed in inches per minute, and the spindle speed it assumes.
/// Fixed feeds (probe, engrave) don't depend on the spindle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feeds {
    pub feed: f64,
    pub rpm: Option<f64>,
}

struct Band {
    feed: f64,
    rpm: f64,
}

/// Feed and spindle speed at one end of the band.
fn band_end(sfm: f64, fpt: f64, diameter: f64, flutes: f64, profile: &MachineProfile) -> Band {
    let rpm = if diameter > 0.0 {
        sfm / (diameter * PI / 12.0)
    } else {
        profile.max_rpm
    };
    let rpm = rpm.max(profile.min_rpm).min(profile.max_rpm);
    let feed = rpm * fpt * flutes;
    let peak = profile.peak_feedrate();
    if feed > peak {
        // Slow the spindle down to keep the chip load
        Band {
            feed: peak,
            rpm: peak / (fpt * flutes),
        }
    } else {
        Band { feed, rpm }
    }
}

/// Feed for cutting with `tool` in `material`, `depth` below the tool tip.
///
/// Depth only matters for pointed tools, whose cutting diameter grows as they go deeper.
pub fn compute(
    tool: &Tool,
    material: &Material,
    profile: &MachineProfile,
    class: FeedClass,
    kind: FeedKind,
    depth: f64,
) -> Result<Feeds> {
    match kind {
        FeedKind::Probe => {
            return Ok(Feeds {
                feed: profile.probe_feed,
                rpm: None,
            })
        }
        FeedKind::Engrave => {
            return Ok(Feeds {
                feed: profile.engrave_feed,
                rpm: None,
            })
        }
        FeedKind::Plunge | FeedKind::Drill if tool.is_laser() => {
            return Err(CamError::UnsupportedFeed {
                tool: tool.name.clone(),
                kind: kind.to_string(),
            })
        }
        _ => {}
    }

    let diameter = tool.diameter_at_depth(depth);
    let sfm = material.surface_speed(tool.material)?;
    let fpt = material.chip_load(tool.material, diameter)?;
    let flutes = tool.flutes.max(1) as f64;

    let low = band_end(sfm.low, fpt.low, diameter, flutes, profile);
    let high = band_end(sfm.high, fpt.high, diameter, flutes, profile);
    let feeds = match class {
        FeedClass::Low => Feeds {
            feed: low.feed,
            rpm: Some(low.rpm),
        },
        FeedClass::High => Feeds {
            feed: high.feed,
            rpm: Some(high.rpm),
        },
        FeedClass::Average => Feeds {
            feed: (low.feed + high.feed) / 2.0,
            rpm: Some((low.rpm + high.rpm) / 2.0),
        },
    };
    let feeds = match kind {
        FeedKind::Plunge | FeedKind::Drill => Feeds {
            feed: feeds.feed / profile.plunge_divisor,
            ..feeds
        },
        _ => feeds,
    };
    debug!(
        "{} feed for '{}' in {} at d={:.4}: {:.3} ipm",
        kind, tool.name, material.name, diameter, feeds.feed
    );
    Ok(feeds)
}
