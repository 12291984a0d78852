use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CountError {
    /// A single alignment record could not be decoded or used.
    #[error("Skipping alignment record: {0}")]
    SkippableRecord(String),

    /// An auxiliary output (mismatch, insert size, orientation, histogram, wig) failed.
    #[error("Auxiliary output '{name}' failed: {source}")]
    AuxiliaryIo {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The primary alignment input could not be opened or iterated.
    #[error("Can't read alignment input {path}: {reason}")]
    FatalInput { path: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Can't parse chrom sizes: {0}")]
    ChromSizesParse(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// What the run driver does when it meets an error of a given class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Log and move on to the next record.
    Skip,
    /// Log once and turn the failing output into a no-op.
    DisableSink,
    /// Drain what has been aggregated, then stop the run.
    Abort,
}

impl CountError {
    pub fn action(&self) -> ErrorAction {
        match self {
            CountError::SkippableRecord(_) => ErrorAction::Skip,
            CountError::AuxiliaryIo { .. } => ErrorAction::DisableSink,
            CountError::FatalInput { .. }
            | CountError::InvalidConfig(_)
            | CountError::ChromSizesParse(_)
            | CountError::Io(_) => ErrorAction::Abort,
        }
    }

    pub fn auxiliary(name: &str, source: io::Error) -> Self {
        CountError::AuxiliaryIo {
            name: name.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CountError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    fn test_error_classes_map_to_actions() {
        assert_eq!(
            CountError::SkippableRecord("bad cigar".to_string()).action(),
            ErrorAction::Skip
        );
        assert_eq!(
            CountError::auxiliary("mismatch", io::Error::other("disk full")).action(),
            ErrorAction::DisableSink
        );
        assert_eq!(
            CountError::FatalInput {
                path: "missing.bam".to_string(),
                reason: "not found".to_string()
            }
            .action(),
            ErrorAction::Abort
        );
    }

    #[rstest]
    fn test_auxiliary_error_message_names_the_output() {
        let err = CountError::auxiliary("isize", io::Error::other("broken pipe"));
        assert_eq!(
            err.to_string(),
            "Auxiliary output 'isize' failed: broken pipe"
        );
    }
}
