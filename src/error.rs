use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Problems with the marker's own inputs, as opposed to a student's submission.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("test file '{testfile}' for target '{target}' has no registered runner in module '{module}'")]
    Unregistered {
        module: String,
        target: String,
        testfile: String,
    },
}
