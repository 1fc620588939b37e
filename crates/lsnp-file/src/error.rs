use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("writing received file to {path}: {source}")]
    Write {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("creating inbox directory {path}: {source}")]
    CreateDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}
