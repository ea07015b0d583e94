use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to open {path}: {source}. Try: sudo chmod 666 /dev/uinput")]
    Open {
        path: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{request} failed: {source}")]
    Ioctl {
        request: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize config for {path:?}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("device name is longer than {max} bytes")]
    NameTooLong { max: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
