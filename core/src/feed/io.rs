//! feed/io.rs
//! Normalized output sinks.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

/// Canonical output abstraction.
pub enum OutputSink {
    Writer(Box<dyn Write + Send>),
    /// Created on first write: a failed feed leaves no file behind.
    File(PathBuf),
    /// Keep the finished feed in `FeedReport::output`.
    Memory,
}

/// File writer that creates its file lazily.
pub struct DeferredFile {
    path: PathBuf,
    file: Option<BufWriter<File>>,
}

impl DeferredFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), file: None }
    }

    pub fn is_created(&self) -> bool {
        self.file.is_some()
    }

    fn file(&mut self) -> io::Result<&mut BufWriter<File>> {
        if self.file.is_none() {
            log::debug!("[IO] creating {}", self.path.display());
            self.file = Some(BufWriter::new(File::create(&self.path)?));
        }
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "output file unavailable"))
    }
}

impl Write for DeferredFile {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.file()?.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(f) => f.flush(),
            None => Ok(()),
        }
    }
}

/// Normalize a non-memory sink into a boxed writer. `Memory` yields `None`; the
/// caller keeps the bytes itself.
pub fn open_output(sink: OutputSink) -> Option<Box<dyn Write + Send>> {
    match sink {
        OutputSink::Writer(w) => Some(w),
        OutputSink::File(p) => Some(Box::new(DeferredFile::new(p))),
        OutputSink::Memory => None,
    }
}
