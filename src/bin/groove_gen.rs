//! Generate a high speed tool path for a slot, straight or following a path given with
//! `--via`.
//!
//! The slot is cut at full depth with small arcs stepping along it, so a narrow cutter can
//! take a deep slot without burying itself.
use std::path::PathBuf;

use anyhow::{Context, Result};
use cam::config::Catalogs;
use cam::feeds::FeedClass;
use cam::hsm::{GrooveStyle, HsmPathGroove, HsmStraightGroove};
use cam::machine::{Machine, Stepover};
use cam::operations::Program;
use nalgebra::geometry::Point2;
use structopt::StructOpt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, StructOpt)]
#[structopt(name = "groove_gen", about = "Generates high speed tool path for a slot")]
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

    /// Start of the slot centerline, as "X,Y"
    #[structopt(long, parse(try_from_str = parse_point), allow_hyphen_values = true)]
    p1: Point2<f64>,

    /// End of the slot centerline, as "X,Y"
    #[structopt(long, parse(try_from_str = parse_point), allow_hyphen_values = true)]
    p2: Point2<f64>,

    /// Corner the slot passes through between p1 and p2; repeat for more, in order
    #[structopt(long, parse(try_from_str = parse_point), allow_hyphen_values = true)]
    via: Vec<Point2<f64>>,

    /// Width of the slot
    #[structopt(long)]
    width: f64,

    /// Top of the stock
    #[structopt(long, default_value = "0", allow_hyphen_values = true)]
    z: f64,

    /// Depth of the slot below the top
    #[structopt(long)]
    depth: f64,

    /// Advance per arc, as "0.02" inches or "12.5%" of the tool diameter
    #[structopt(long)]
    stepover: Option<Stepover>,

    /// Arc shape: circle, semicircle or swing
    #[structopt(long, default_value = "semicircle")]
    style: GrooveStyle,

    /// The slot stops inside the stock instead of running off both ends
    #[structopt(long)]
    blind: bool,

    /// Enter with a helix at the start instead of from outside the stock
    #[structopt(long)]
    plunge: bool,

    /// Stock left on each wall by the arcs, then removed with one pass down each side
    #[structopt(long, default_value = "0")]
    rough_margin: f64,
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
    if opt.via.is_empty() {
        let mut op = HsmStraightGroove::new(opt.p1, opt.p2, opt.width, opt.z, opt.depth);
        if let Some(s) = opt.stepover {
            op.stepover = s;
        }
        op.style = opt.style;
        op.through = !opt.blind;
        op.plunge = opt.plunge;
        op.rough_margin = opt.rough_margin;
        op.tool = Some(tool);
        program.add(op);
    } else {
        let mut path = vec![opt.p1];
        path.extend(opt.via.iter().copied());
        path.push(opt.p2);
        let mut op = HsmPathGroove::new(path, opt.width, opt.z, opt.depth);
        if let Some(s) = opt.stepover {
            op.stepover = s;
        }
        op.style = opt.style;
        op.through = !opt.blind;
        op.plunge = opt.plunge;
        op.rough_margin = opt.rough_margin;
        op.tool = Some(tool);
        program.add(op);
    }
    program
        .generate(&mut m)
        .with_context(|| format!("writing {}", output))?;
    info!("wrote {}", output);
    Ok(())
}
