//! Error types for program generation.

use std::io;
use thiserror::Error;

/// Errors that abort program generation.
///
/// Geometric degeneracies (zero radius arcs, empty offsets, short MIC walks) are not errors:
/// they are skipped where they occur and logged.
#[derive(Error, Debug)]
pub enum CamError {
    /// A line was emitted while no output stream was selected.
    #[error("no open output stream")]
    NoOpenStream,

    /// `pop_speed` was called more times than `push_speed`.
    #[error("feed stack underflow: pop without matching push")]
    FeedStackUnderflow,

    /// An indentation level was popped that was never pushed.
    #[error("popped too many indentation levels")]
    LevelUnderflow,

    /// An operation needed a tool but none was bound.
    #[error("no tool is active")]
    NoTool,

    /// A feed class was requested but no material is active.
    #[error("no material is active")]
    NoMaterial,

    /// The material table has no cutting data for this tool material.
    #[error("material '{material}' has no {field} data for {tool_material} tools")]
    MissingCuttingData {
        material: String,
        tool_material: String,
        field: &'static str,
    },

    /// The tool can't produce this kind of feed, e.g. plunging a laser.
    #[error("tool '{tool}' has no {kind} feed")]
    UnsupportedFeed { tool: String, kind: String },

    /// A tool change needs a new part file, but the current stream name can't be split.
    #[error("can't derive the next part file name from '{0}'")]
    PartNaming(String),

    /// A motion command had no axis words.
    #[error("refusing to emit a move with no axis words")]
    EmptyMove,

    /// A parameter was rejected before any motion was emitted.
    #[error("invalid value for '{name}': {reason}")]
    InvalidInput { name: &'static str, reason: String },

    /// A step sequence could never reach its terminal value.
    #[error("invalid step {step} for sequence from {start} to {stop}")]
    InvalidStep { start: f64, stop: f64, step: f64 },

    /// A named tool, material or machine profile was not found.
    #[error("unknown {kind} '{name}'")]
    Unknown { kind: &'static str, name: String },

    /// A configuration file couldn't be parsed.
    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CamError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        CamError::InvalidInput {
            name,
            reason: reason.into(),
        }
    }

    pub fn unknown(kind: &'static str, name: impl Into<String>) -> Self {
        CamError::Unknown {
            kind,
            name: name.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CamError>;
