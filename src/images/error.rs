//! Error types for container image manifest handling and builds.

use thiserror::Error;

/// Errors raised while resolving image manifests or running the build tool.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ImageError {
    /// Raised when rendering a manifest template fails.
    #[error("failed to render image manifest template: {message}")]
    Template {
        /// Rendering error reported by the template engine.
        message: String,
    },
    /// Raised when a rendered or plain manifest cannot be parsed.
    #[error("failed to parse image manifest: {message}")]
    Manifest {
        /// Parse error reported by the YAML deserializer.
        message: String,
    },
    /// Raised when reading a manifest file from disk fails.
    #[error("failed to read image manifest `{path}`: {message}")]
    FileRead {
        /// Expanded path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
    /// Raised when the build tool cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the build tool completes with a non-zero exit code.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Command name used for the attempted build.
        program: String,
        /// Exit status as reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the process.
        stderr: String,
    },
}
