use std::path::PathBuf;
use thiserror::Error;

/// The error type for IFO decoding and program extraction.
///
/// Variants up to [`ProgramOutOfRange`] are structural: nothing useful can
/// be decoded or extracted once one occurs, and callers should abort the
/// run. [`OutputExists`] only fails the one program being extracted; other
/// programs can still be processed. Unreadable ranges in the bulk VRO data
/// are not reported through this type at all; the extraction engine skips
/// them and counts them in its [`ExtractStats`].
///
/// [`ProgramOutOfRange`]: VrError::ProgramOutOfRange
/// [`OutputExists`]: VrError::OutputExists
/// [`ExtractStats`]: crate::extract::ExtractStats
#[derive(Debug, Error)]
pub enum VrError {
    /// An I/O error on the IFO, VRO or destination file.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// The file does not start with the `DVD_RTR_VMG0` identifier.
    #[error("invalid DVD-VR IFO identifier")]
    InvalidId,

    /// The file is shorter than the length its own header declares.
    #[error("IFO file truncated: header declares {declared} bytes, file has {actual}")]
    Truncated { declared: usize, actual: usize },

    /// A decoded offset or record extends outside the mapped IFO region.
    #[error("malformed IFO metadata: {what} at offset {offset:#x}")]
    Malformed { what: &'static str, offset: usize },

    /// The IFO declares zero program info tables for the VRO.
    #[error("no program info table for the VRO data")]
    NoProgramTables,

    /// An explicitly requested program number is not on the disc.
    #[error("program {requested} requested but disc has {count}")]
    ProgramOutOfRange { requested: usize, count: usize },

    /// Every candidate output name for a program already exists.
    #[error("output file already exists: {0}")]
    OutputExists(PathBuf),

    /// A program's output file could not be created.
    #[error("cannot create {path}: {source}")]
    OutputCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl VrError {
    /// Whether this error only fails the current program, leaving the rest
    /// of the run viable.
    pub fn is_per_program(&self) -> bool {
        matches!(self, VrError::OutputExists(_) | VrError::OutputCreate { .. })
    }

    pub(crate) fn malformed(what: &'static str, offset: usize) -> Self {
        VrError::Malformed { what, offset }
    }
}
