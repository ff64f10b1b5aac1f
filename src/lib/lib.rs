//! Toolpath generation for 3-axis routers and mills.
//!
//! A [`machine::Machine`] turns motion requests into G-code, tracking position, the bound
//! tool and the modal feed. Feeds and speeds come from [`feeds`], looked up from the tool
//! and material catalogs. The machining primitives live in [`operations`] and [`hsm`].

pub mod config;
pub mod error;
pub mod feeds;
pub mod gcode;
pub mod geometry;
pub mod hsm;
pub mod machine;
pub mod materials;
pub mod operations;
pub mod output;
pub mod tools;

#[cfg(test)]
mod testutil;

pub use error::{CamError, Result};
