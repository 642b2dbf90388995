//! ReadScope Core Library
//!
//! Project data model and the versioned project-file persistence engine:
//! section codecs, atomic commit and background save/load tasks.

pub mod commit;
pub mod display;
pub mod format;
pub mod genome;
pub mod probes;
pub mod progress;
pub mod project;
pub mod types;

// Re-export commonly used types and functions
pub use commit::{load_project, save_project, spawn_load, spawn_save, SaveOptions, TaskHandle};
pub use display::{DisplayPrefs, ReadDensity, ScaleMode};
pub use format::{FormatError, LoadedProject, ProjectSummary, PROJECT_DATA_VERSION};
pub use genome::{Chromosome, FolderGenomeStore, Genome, GenomeStore, StaticGenomeStore};
pub use probes::{Probe, ProbeList, ProbeSet};
pub use progress::{ProgressContext, ProgressListener, TaskOutcome};
pub use project::{
    AnnotationSet, DataGroup, DataSet, Feature, PairBucket, Project, ReadData, ReplicateMember,
    ReplicateSet, StoreRef,
};
pub use types::{Location, Strand};

/// Version information for the ReadScope core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
