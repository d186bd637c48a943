//! Output sink shared across the parallel per-pile workers.
//!
//! Every handler writes its result lines (`BKPT`, `READ`, `INBS`, k-mer
//! hits, correction records) through one of these, so the interleaving of
//! lines from different rayon worker threads stays at line granularity
//! rather than splitting mid-line.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

pub type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

pub fn wrap<W: Write + Send + 'static>(w: W) -> SharedWriter {
    Arc::new(Mutex::new(Box::new(w)))
}

pub fn shared_stdout() -> SharedWriter {
    wrap(io::stdout())
}

/// Writes one line (appending `\n`) through the shared sink, holding the
/// lock only for the duration of the write.
pub fn write_line(out: &SharedWriter, line: &str) -> io::Result<()> {
    let mut guard = out.lock().unwrap_or_else(|e| e.into_inner());
    guard.write_all(line.as_bytes())?;
    guard.write_all(b"\n")
}
