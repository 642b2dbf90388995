//! Save/load entry points and the commit protocol.
//!
//! A save streams the whole project into a temporary file created in the
//! destination's directory, then publishes it by deleting any previous file
//! and renaming the temp file into place. Failure and cancellation share one
//! cleanup path: the temp file is removed and the destination is never
//! touched, so the only intermediate state a caller can observe is "old file
//! still intact". Background variants run on one dedicated worker thread per
//! operation and report exclusively through the registered listeners.

use crate::display::DisplayPrefs;
use crate::format::{FormatError, LoadedProject, ProjectReader, ProjectWriter};
use crate::genome::GenomeStore;
use crate::progress::{ProgressContext, ProgressListener, TaskOutcome};
use crate::project::Project;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tempfile::NamedTempFile;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Write through a gzip filter. A preference only: readers detect
    /// compression from the stream itself.
    pub compress: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self { compress: true }
    }
}

/// Writes `project` to `destination`, committing only on full success.
pub fn save_project(
    project: &Project,
    prefs: &DisplayPrefs,
    destination: &Path,
    options: &SaveOptions,
    ctx: &ProgressContext,
) -> Result<(), FormatError> {
    // The temp file lives next to the destination so the final rename never
    // crosses a filesystem boundary. Dropping it on any early return deletes
    // the partial file.
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)?;
    debug!("writing project to {}", temp.path().display());

    let writer = ProjectWriter::new(project, prefs, ctx);
    {
        let file = temp.as_file_mut();
        if options.compress {
            let mut out = BufWriter::new(GzEncoder::new(file, Compression::default()));
            writer.write(&mut out)?;
            out.into_inner().map_err(|e| e.into_error())?.finish()?;
        } else {
            let mut out = BufWriter::new(file);
            writer.write(&mut out)?;
            out.flush()?;
        }
    }
    ctx.checkpoint()?;

    // Publish. Removing the previous file before the rename leaves a window
    // in which a crash loses both copies; the on-disk behavior is kept
    // as-is for compatibility with existing files and tooling.
    if destination.exists() {
        std::fs::remove_file(destination)?;
    }
    temp.persist(destination)
        .map_err(|e| FormatError::Io(e.error))?;
    debug!("project committed to {}", destination.display());
    Ok(())
}

/// Reads a project file, sniffing gzip compression from the magic bytes.
pub fn load_project(
    path: &Path,
    genomes: &dyn GenomeStore,
    ctx: &ProgressContext,
) -> Result<LoadedProject, FormatError> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    let mut got = 0;
    while got < magic.len() {
        let n = file.read(&mut magic[got..])?;
        if n == 0 {
            break;
        }
        got += n;
    }
    file.seek(SeekFrom::Start(0))?;

    let input: Box<dyn BufRead> = if got == magic.len() && magic == GZIP_MAGIC {
        Box::new(BufReader::new(GzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    ProjectReader::new(genomes, ctx).read(input)
}

/// Handle on a background save or load. Dropping the handle detaches the
/// worker; it keeps running and still reports through its listeners.
pub struct TaskHandle {
    cancel: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl TaskHandle {
    /// Asks the worker to stop at its next row checkpoint. The worker
    /// confirms through the listeners' `cancelled` callback after cleanup.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Blocks until the worker exits. Outcomes are delivered through the
    /// listeners, not through this call.
    pub fn join(self) {
        let _ = self.thread.join();
    }
}

/// Starts a save on a dedicated worker thread and returns immediately.
pub fn spawn_save(
    project: Arc<Project>,
    prefs: DisplayPrefs,
    destination: PathBuf,
    options: SaveOptions,
    listeners: Vec<Arc<dyn ProgressListener>>,
) -> std::io::Result<TaskHandle> {
    let ctx = ProgressContext::new(listeners);
    let cancel = ctx.cancel_flag();
    let thread = thread::Builder::new()
        .name("readscope-save".to_string())
        .spawn(move || {
            match save_project(&project, &prefs, &destination, &options, &ctx) {
                Ok(()) => ctx.complete("project_saved", &TaskOutcome::Saved { path: destination }),
                Err(FormatError::Cancelled) => ctx.cancelled(),
                Err(error) => ctx.exception(&error),
            }
        })?;
    Ok(TaskHandle { cancel, thread })
}

/// Starts a load on a dedicated worker thread and returns immediately.
pub fn spawn_load(
    path: PathBuf,
    genomes: Arc<dyn GenomeStore>,
    listeners: Vec<Arc<dyn ProgressListener>>,
) -> std::io::Result<TaskHandle> {
    let ctx = ProgressContext::new(listeners);
    let cancel = ctx.cancel_flag();
    let thread = thread::Builder::new()
        .name("readscope-load".to_string())
        .spawn(move || match load_project(&path, genomes.as_ref(), &ctx) {
            Ok(loaded) => {
                ctx.complete("project_loaded", &TaskOutcome::Loaded(Arc::new(loaded)));
            }
            Err(FormatError::Cancelled) => ctx.cancelled(),
            Err(error) => ctx.exception(&error),
        })?;
    Ok(TaskHandle { cancel, thread })
}
