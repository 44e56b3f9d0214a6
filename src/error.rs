// Error kinds for analysis and extraction.
// Unmatched lines or attributes are never errors; they fall back to defaults.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DumpError {
    // Fatal for a whole analysis; for extraction, fails every table of that pass.
    #[error("cannot read dump {}: {source}", path.display())]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Fails a single table's extraction only.
    #[error("cannot write {}: {source}", path.display())]
    OutputUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("table {0} is not in the catalog")]
    UnknownTable(String),

    #[error("cannot decompress {}: {source}", path.display())]
    Decompress {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid output file name: {0}")]
    InvalidFileName(String),
}

impl DumpError {
    pub fn input(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DumpError::InputUnreadable {
            path: path.into(),
            source,
        }
    }

    pub fn output(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DumpError::OutputUnwritable {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DumpError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn messages_name_the_path() {
        let err = DumpError::input(
            "/tmp/missing.sql",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.to_string(), "cannot read dump /tmp/missing.sql: gone");

        let err = DumpError::UnknownTable("users".into());
        assert_eq!(err.to_string(), "table users is not in the catalog");
    }
}
