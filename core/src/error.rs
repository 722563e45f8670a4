use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("document '{doc_id}' is already indexed")]
    DuplicateDocument { doc_id: String },
    #[error("malformed persisted state in {path:?} at line {line}: {reason}")]
    MalformedPersistedState { path: PathBuf, line: usize, reason: String },
    #[error("i/o failure on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn malformed(path: &std::path::Path, line: usize, reason: impl Into<String>) -> Self {
        Error::MalformedPersistedState { path: path.to_path_buf(), line, reason: reason.into() }
    }

    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Error::Io { path: path.to_path_buf(), source }
    }
}
