//! Helpers shared by the unit tests.

use crate::config::builtin_profiles;
use crate::feeds::FeedClass;
use crate::machine::{Machine, Motion, Segment};
use crate::materials::MaterialCatalog;
use crate::output::MemoryStreams;
use crate::tools::ToolCatalog;

pub const TEST_FILE: &str = "test.nc";

/// A k2cnc machine cutting mdf with a 1/4in upcut, writing to [`TEST_FILE`] in memory,
/// with auditing on.
pub fn test_machine() -> (Machine, MemoryStreams) {
    test_machine_with_tool("1/4in spiral upcut")
}

pub fn test_machine_with_tool(tool: &str) -> (Machine, MemoryStreams) {
    let streams = MemoryStreams::new();
    let mut m = Machine::new(builtin_profiles().remove(0), Box::new(streams.clone()));
    m.enable_audit();
    m.set_file(TEST_FILE).unwrap();
    m.set_material(MaterialCatalog::builtin().get("mdf").unwrap());
    m.set_tool(ToolCatalog::builtin().get(tool).unwrap(), FeedClass::Low)
        .unwrap();
    (m, streams)
}

/// Lines of [`TEST_FILE`], indentation removed.
pub fn lines(streams: &MemoryStreams) -> Vec<String> {
    streams
        .contents(TEST_FILE)
        .unwrap_or_default()
        .lines()
        .map(|l| l.trim().to_string())
        .collect()
}

pub fn count_prefix(lines: &[String], prefix: &str) -> usize {
    lines.iter().filter(|l| l.starts_with(prefix)).count()
}

pub fn arcs(m: &Machine) -> Vec<&Segment> {
    m.segments()
        .iter()
        .filter(|s| matches!(s.motion, Motion::Arc { .. }))
        .collect()
}
