//! Generate a tool path for a circular feature: a profile cut around or inside a circle,
//! a circular pocket, a bolt circle or a ring cut free of the stock.
use std::path::PathBuf;

use anyhow::{Context, Result};
use cam::config::Catalogs;
use cam::feeds::FeedClass;
use cam::machine::{Machine, Stepover, ToolSide};
use cam::operations::{BoltCircle, CirclePocket, CircleProfile, HsmCirclePocket, Program, Ring};
use cam::tools::HoleFit;
use nalgebra::geometry::Point2;
use structopt::StructOpt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, StructOpt)]
enum Job {
    /// Cut along a circle, or an arc of one
    Profile {
        /// Which side of the circle the tool runs on: inner, outer or center
        #[structopt(long, default_value = "inner")]
        side: ToolSide,

        /// Start angle in degrees, counter-clockwise from +X
        #[structopt(long, default_value = "0", allow_hyphen_values = true)]
        start_angle: f64,

        /// End angle in degrees
        #[structopt(long, default_value = "360", allow_hyphen_values = true)]
        end_angle: f64,
    },
    /// Clear a circular pocket, or a ring with --inner
    Pocket {
        /// Radius of an island left standing in the middle
        #[structopt(long, default_value = "0")]
        inner: f64,

        /// Enter with a helix and widen at full depth
        #[structopt(long)]
        hsm: bool,
    },
    /// Drill screw holes evenly spaced around the circle
    Bolts {
        /// Number of holes
        #[structopt(long)]
        bolts: u32,

        /// Screw size, such as "1/4-20" or "M5-.80"
        #[structopt(long, default_value = "1/4-20")]
        screw: String,

        /// Hole fit: thread75, thread50, close or standard
        #[structopt(long, default_value = "standard")]
        fit: HoleFit,

        /// Degrees clockwise from +Y to the first hole
        #[structopt(long, default_value = "0", allow_hyphen_values = true)]
        first_angle: f64,
    },
    /// Cut a ring free of the stock, the circle being its outside
    Ring {
        /// Inside radius of the ring; zero cuts a disc
        #[structopt(long, default_value = "0")]
        inner: f64,

        /// Number of bolt holes between the walls
        #[structopt(long, default_value = "0")]
        bolts: u32,

        /// Radius of the circle through the bolt holes
        #[structopt(long, default_value = "0")]
        bolt_radius: f64,

        /// Screw size for the bolt holes
        #[structopt(long, default_value = "1/4-20")]
        screw: String,
    },
}

#[derive(Debug, StructOpt)]
#[structopt(name = "circle_gen", about = "Generates tool path for circles, circular pockets, bolt circles and rings")]
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
    #[structopt(long, default_value = "1/4in spiral upcut")]
    tool: String,

    /// Material, by catalog name
    #[structopt(long, default_value = "mdf")]
    material: String,

    /// Feed class: low, average or high
    #[structopt(long, default_value = "low")]
    feeds: FeedClass,

    /// Center of the circle, as "X,Y"
    #[structopt(long, default_value = "0,0", parse(try_from_str = parse_point), allow_hyphen_values = true)]
    center: Point2<f64>,

    /// Radius of the circle
    #[structopt(long)]
    radius: f64,

    /// Top of the stock
    #[structopt(long, default_value = "0", allow_hyphen_values = true)]
    z: f64,

    /// Depth of the cut below the top
    #[structopt(long)]
    depth: f64,

    /// Depth of each level, as "0.1" inches or "50%" of the tool diameter
    #[structopt(long)]
    stepdown: Option<Stepover>,

    /// Cut counter-clockwise
    #[structopt(long)]
    ccw: bool,

    #[structopt(subcommand)]
    job: Job,
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
    match opt.job {
        Job::Profile {
            side,
            start_angle,
            end_angle,
        } => {
            let mut op = CircleProfile::new(opt.center, opt.z, opt.radius, opt.depth);
            op.side = side;
            op.start_angle = start_angle;
            op.end_angle = end_angle;
            op.clockwise = !opt.ccw;
            if let Some(s) = opt.stepdown {
                op.stepdown = s;
            }
            op.tool = Some(tool);
            program.add(op);
        }
        Job::Pocket { inner, hsm: true } => {
            let mut op = HsmCirclePocket::new(opt.center, opt.z, opt.radius, opt.depth);
            op.inner_rad = inner;
            op.climb = !opt.ccw;
            if let Some(s) = opt.stepdown {
                op.stepdown = s;
            }
            op.tool = Some(tool);
            program.add(op);
        }
        Job::Pocket { inner, hsm: false } => {
            let mut op = CirclePocket::new(opt.center, opt.z, inner, opt.radius, opt.depth);
            op.clockwise = !opt.ccw;
            if let Some(s) = opt.stepdown {
                op.stepdown = s;
            }
            op.tool = Some(tool);
            program.add(op);
        }
        Job::Bolts {
            bolts,
            screw,
            fit,
            first_angle,
        } => {
            let mut op = BoltCircle::new(opt.center, opt.z, opt.radius, bolts, &screw, opt.depth);
            op.fit = fit;
            op.first_angle = first_angle;
            if let Some(s) = opt.stepdown {
                op.stepdown = s;
            }
            op.tool = Some(tool);
            program.add(op);
        }
        Job::Ring {
            inner,
            bolts,
            bolt_radius,
            screw,
        } => {
            let mut op = Ring::new(opt.center, opt.z, inner, opt.radius, opt.depth);
            op.bolts = bolts;
            op.bolt_radius = bolt_radius;
            op.screw = screw;
            if let Some(s) = opt.stepdown {
                op.stepdown = s;
            }
            op.tool = Some(tool);
            program.add(op);
        }
    }
    program
        .generate(&mut m)
        .with_context(|| format!("writing {}", output))?;
    info!("wrote {}", output);
    Ok(())
}
