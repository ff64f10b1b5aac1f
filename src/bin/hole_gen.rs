//! Generate a tool path for a set of round holes.
//!
//! Holes wider than the tool are milled with a helix, and holes no wider than the tool are
//! plunged straight down. With `--peck` the holes are drilled with a canned cycle instead,
//! for a drill bit in the spindle.
use std::path::PathBuf;

use anyhow::{Context, Result};
use cam::config::Catalogs;
use cam::feeds::FeedClass;
use cam::machine::{Machine, Stepover};
use cam::operations::{DrillCycle, HelicalDrill, Program};
use nalgebra::geometry::Point2;
use structopt::StructOpt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, StructOpt)]
#[structopt(name = "hole_gen", about = "Generates tool path for round holes")]
struct Opt {
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
    #[structopt(long, default_value = "1/8in spiral upcut")]
    tool: String,

    /// Material, by catalog name
    #[structopt(long, default_value = "mdf")]
    material: String,

    /// Feed class: low, average or high
    #[structopt(long, default_value = "low")]
    feeds: FeedClass,

    /// Hole center as "X,Y"; repeat for more holes
    #[structopt(long = "at", parse(try_from_str = parse_point), allow_hyphen_values = true, required = true)]
    centers: Vec<Point2<f64>>,

    /// Hole diameter
    #[structopt(long)]
    diameter: f64,

    /// Top of the stock
    #[structopt(long, default_value = "0", allow_hyphen_values = true)]
    z: f64,

    /// Depth of the holes below the top
    #[structopt(long)]
    depth: f64,

    /// Depth per turn of the helix, as "0.05" inches or "25%" of the tool diameter
    #[structopt(long, default_value = "25%")]
    stepdown: Stepover,

    /// Mill the helix counter-clockwise
    #[structopt(long)]
    ccw: bool,

    /// Drill with a canned cycle, pecking this deep each time
    #[structopt(long)]
    peck: Option<f64>,

    /// Height above the top where the drill cycle starts feeding
    #[structopt(long, default_value = "0.1")]
    retract: f64,
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
    let tool = catalogs.tools.get(&opt.tool)?;
    let mut m = Machine::with_files(catalogs.machine(&opt.machine)?);
    m.set_material(catalogs.materials.get(&opt.material)?);
    m.set_tool(tool.clone(), opt.feeds)?;

    let output = opt.output.to_string_lossy().into_owned();
    let mut program = Program::new(&output);
    if let Some(peck) = opt.peck {
        let mut op = DrillCycle::new(opt.centers.clone(), opt.z, opt.depth, opt.retract);
        op.peck = Some(peck);
        op.tool = Some(tool);
        program.add(op);
    } else {
        for c in &opt.centers {
            let mut op = HelicalDrill::new(*c, opt.z, opt.diameter / 2.0, opt.depth);
            op.stepdown = opt.stepdown;
            op.clockwise = !opt.ccw;
            op.tool = Some(tool.clone());
            program.add(op);
        }
    }
    program
        .generate(&mut m)
        .with_context(|| format!("writing {}", output))?;
    info!("wrote {} holes to {}", opt.centers.len(), output);
    Ok(())
}
