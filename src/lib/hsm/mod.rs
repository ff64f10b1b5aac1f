//! High speed machining: toolpaths that keep the cutter's engagement roughly constant by
//! sweeping small arcs instead of full width passes.
//!
//! [`HsmStraightGroove`] steps arcs along a slot and [`HsmPathGroove`] along a polyline.
//! [`HsmFacing`] skims a rectangle in rounded loops. [`HsmPocket`] walks the medial axis of an
//! arbitrary boundary; the medial axis and polygon offsets come from the engines behind
//! [`medial::MedialAxisEngine`] and [`medial::GeometryEngine`]. [`HsmRectPocket`] runs it
//! with the built-in rectangle engines.

mod engines;
mod facing;
mod groove;
pub mod medial;
mod pocket;

pub use engines::{ConvexOffset, RectMedialAxis, MIN_MIC_RADIUS};
pub use facing::{HsmFacing, FACING_OVERRUN};
pub use groove::{GrooveStyle, HsmPathGroove, HsmStraightGroove};
pub use pocket::{
    HsmPocket, HsmRectPocket, HELIX_DIAMETER_FRACTION, LEAD_ARC_RADIUS, SPIRAL_ANGLE_STEP,
};
