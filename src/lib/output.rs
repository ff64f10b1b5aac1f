//! Named output streams.
//!
//! The [`Machine`](crate::machine::Machine) asks a [`StreamFactory`] for a writer whenever it
//! opens a program file, including the extra part files made by tool changes.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

use crate::error::{CamError, Result};

pub trait StreamFactory {
    fn open(&mut self, name: &str) -> io::Result<Box<dyn Write>>;
}

/// Streams backed by files on disk. Parent directories are created as needed.
#[derive(Debug, Default)]
pub struct FileStreams;

impl StreamFactory for FileStreams {
    fn open(&mut self, name: &str) -> io::Result<Box<dyn Write>> {
        if let Some(dir) = Path::new(name).parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(name)?;
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// In-memory streams. Clones share the same buffers, so a clone kept by the caller can read
/// back what the machine wrote.
#[derive(Debug, Default, Clone)]
pub struct MemoryStreams {
    buffers: Rc<RefCell<BTreeMap<String, Rc<RefCell<Vec<u8>>>>>>,
}

impl MemoryStreams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every stream opened so far, in name order.
    pub fn names(&self) -> Vec<String> {
        self.buffers.borrow().keys().cloned().collect()
    }

    pub fn contents(&self, name: &str) -> Option<String> {
        self.buffers
            .borrow()
            .get(name)
            .map(|b| String::from_utf8_lossy(&b.borrow()).into_owned())
    }
}

struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl StreamFactory for MemoryStreams {
    fn open(&mut self, name: &str) -> io::Result<Box<dyn Write>> {
        let buf = Rc::new(RefCell::new(Vec::new()));
        self.buffers
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&buf));
        Ok(Box::new(SharedBuffer(buf)))
    }
}

/// Name of part `part` of a program whose first file is `base`,
/// e.g. `out/box.nc` part 2 is `out/box_part_2.nc`.
pub fn part_name(base: &str, part: usize) -> Result<String> {
    let path = Path::new(base);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CamError::PartNaming(base.to_string()))?;
    let file = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_part_{part}.{ext}"),
        None => format!("{stem}_part_{part}"),
    };
    Ok(match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(file).to_string_lossy().into_owned(),
        _ => file,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_name() {
        assert_eq!(part_name("box.nc", 2).unwrap(), "box_part_2.nc");
        assert_eq!(part_name("out/box.nc", 3).unwrap(), "out/box_part_3.nc");
        assert_eq!(part_name("plain", 2).unwrap(), "plain_part_2");
        assert!(matches!(part_name("", 2), Err(CamError::PartNaming(_))));
    }

    #[test]
    fn test_memory_streams_shared() {
        let streams = MemoryStreams::new();
        let mut factory = streams.clone();
        let mut w = factory.open("a.nc").unwrap();
        writeln!(w, "G0 X1.").unwrap();
        assert_eq!(streams.contents("a.nc").unwrap(), "G0 X1.\n");
        assert_eq!(streams.names(), vec!["a.nc".to_string()]);
        assert!(streams.contents("b.nc").is_none());
    }

    #[test]
    fn test_file_streams_create_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("nested/job.nc");
        let mut w = FileStreams.open(name.to_str().unwrap()).unwrap();
        writeln!(w, "%").unwrap();
        w.flush().unwrap();
        drop(w);
        assert_eq!(fs::read_to_string(&name).unwrap(), "%\n");
    }
}
