//! Generate a tool path for a rectangular pocket.
//!
//! By default the pocket is cleared with zig-zag passes. With `--hsm` it is cleared
//! adaptively by walking its medial axis, which keeps the load on the cutter even and suits
//! harder materials and deeper cuts. With `--face` the rectangle is skimmed flat instead.
use std::path::PathBuf;

use anyhow::{Context, Result};
use cam::config::Catalogs;
use cam::feeds::FeedClass;
use cam::hsm::{HsmFacing, HsmRectPocket};
use cam::machine::{Machine, Stepover};
use cam::operations::{Program, RectPocket, RectPocketCornerRelief, ScanAxis};
use nalgebra::geometry::Point2;
use structopt::StructOpt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, StructOpt)]
#[structopt(name = "pocket_gen", about = "Generates tool path for a rectangular pocket")]
struct Opt {
    /// Name for the job, written as the first comment
    #[structopt(short, long)]
    name: Option<String>,

    /// Output file for the resulting G code
    #[structopt(short, long, parse(from_os_str))]
    output: PathBuf,

    /// TOML file with extra machines, tools and materials
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Machine profile
    #[structopt(long, default_value = "k2cnc")]
    machine: String,

    /// Tool, by catalog name
    #[structopt(long, default_value = "1/4in spiral upcut")]
    tool: String,

    /// Material, by catalog name
    #[structopt(long, default_value = "mdf")]
    material: String,

    /// Feed class: low, average or high
    #[structopt(long, default_value = "low")]
    feeds: FeedClass,

    /// First corner of the pocket, as "X,Y" in inches
    #[structopt(long, parse(try_from_str = parse_point), allow_hyphen_values = true)]
    p1: Point2<f64>,

    /// Opposite corner of the pocket, as "X,Y" in inches
    #[structopt(long, parse(try_from_str = parse_point), allow_hyphen_values = true)]
    p2: Point2<f64>,

    /// Top of the stock
    #[structopt(long, default_value = "0", allow_hyphen_values = true)]
    z: f64,

    /// Depth of the pocket below the top
    #[structopt(long)]
    depth: f64,

    /// Distance between passes, as "0.1" inches or "40%" of the tool diameter
    #[structopt(long)]
    stepover: Option<Stepover>,

    /// Depth of each level, as "0.1" inches or "50%" of the tool diameter
    #[structopt(long)]
    stepdown: Option<Stepover>,

    /// Direction of the zig-zag passes: x or y
    #[structopt(long, default_value = "x")]
    axis: ScanAxis,

    /// Clear adaptively instead of with zig-zag passes
    #[structopt(long)]
    hsm: bool,

    /// Cut conventionally instead of climbing (adaptive clearing only)
    #[structopt(long)]
    conventional: bool,

    /// Stock left on the walls by the adaptive walk
    #[structopt(long, default_value = "0")]
    finish_offset: f64,

    /// Profile passes removing the stock left on the walls
    #[structopt(long, default_value = "0")]
    finish_passes: u32,

    /// Relieve the corners so square parts fit
    #[structopt(long)]
    corner_relief: bool,

    /// Face the rectangle, running off every edge, instead of pocketing it
    #[structopt(long, conflicts_with = "hsm")]
    face: bool,
}

fn parse_point(s: &str) -> Result<Point2<f64>> {
    let (x, y) = s
        .split_once(',')
        .with_context(|| format!("'{}' is not X,Y", s))?;
    Ok(Point2::new(x.trim().parse()?, y.trim().parse()?))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let opt = Opt::from_args();

    let catalogs = Catalogs::load(opt.config.as_deref()).context("loading config")?;
    let profile = catalogs.machine(&opt.machine)?;
    let tool = catalogs.tools.get(&opt.tool)?;
    let material = catalogs.materials.get(&opt.material)?;
    let (p1, p2) = (opt.p1, opt.p2);

    let mut m = Machine::with_files(profile);
    m.set_material(material);
    m.set_tool(tool.clone(), opt.feeds)?;

    let output = opt.output.to_string_lossy().into_owned();
    let mut program = Program::new(&output);
    if let Some(name) = &opt.name {
        program = program.named(name);
    }
    if opt.face {
        let mut op = HsmFacing::new(p1, p2, opt.z, opt.depth);
        if let Some(s) = opt.stepover {
            op.stepover = s;
        }
        op.stepdown = opt.stepdown;
        op.tool = Some(tool);
        program.add(op);
    } else if opt.hsm {
        let mut op = HsmRectPocket::new(p1, p2, opt.z, opt.depth);
        if let Some(s) = opt.stepover {
            op.stepover = s;
        }
        if let Some(s) = opt.stepdown {
            op.stepdown = s;
        }
        op.climb = !opt.conventional;
        op.corner_relief = opt.corner_relief;
        op.finish_offset = opt.finish_offset;
        op.finish_passes = opt.finish_passes;
        op.tool = Some(tool);
        program.add(op);
    } else {
        let mut op = RectPocket::new(p1, p2, opt.z, opt.depth);
        if let Some(s) = opt.stepover {
            op.stepover = s;
        }
        if let Some(s) = opt.stepdown {
            op.stepdown = s;
        }
        op.axis = opt.axis;
        op.tool = Some(tool);
        let stepdown = op.stepdown;
        program.add(op);
        if opt.corner_relief {
            let mut relief = RectPocketCornerRelief::new(p1, p2, opt.z, opt.depth);
            relief.stepdown = stepdown;
            program.add(relief);
        }
    }

    program
        .generate(&mut m)
        .with_context(|| format!("writing {}", output))?;
    info!("wrote {}", output);
    Ok(())
}
