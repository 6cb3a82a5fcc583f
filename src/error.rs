//! Error handling for the surface renderer
//!
//! One error type for the whole crate. Lower layers (color ramp, shader
//! composer, resource cache) return these unchanged; only the surface
//! orchestrator decides whether a frame is dropped or the context is lost.

use std::error::Error as StdError;
use std::fmt;

use crate::gpu::GpuBackendError;

/// Main error type for topo-surface
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceError {
    // Color ramp errors
    Format {
        file: String,
        line: usize,
        reason: String,
    },

    // Shader errors
    ShaderBuild {
        program: String,
        diagnostic: String,
    },
    TemplateMissing {
        name: String,
    },

    // GPU errors
    ResourceExhausted {
        resource: String,
        error: String,
    },
    GpuOperationFailed {
        operation: String,
        error: String,
    },

    // Configuration errors
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },

    // System errors
    IoError {
        path: String,
        error: String,
    },
    AssetWatchError {
        path: String,
        error: String,
    },
    StateError {
        expected: String,
        actual: String,
    },

    Internal {
        message: String,
    },
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceError::Format { file, line, reason } => write!(
                f,
                "Color map format error in line {} of file {}: {}",
                line, file, reason
            ),

            SurfaceError::ShaderBuild {
                program,
                diagnostic,
            } => write!(f, "Shader build failed for {}: {}", program, diagnostic),
            SurfaceError::TemplateMissing { name } => {
                write!(f, "Shader template not found: {}", name)
            }

            SurfaceError::ResourceExhausted { resource, error } => {
                write!(f, "GPU resources exhausted while creating {}: {}", resource, error)
            }
            SurfaceError::GpuOperationFailed { operation, error } => {
                write!(f, "GPU operation '{}' failed: {}", operation, error)
            }

            SurfaceError::InvalidConfig {
                field,
                value,
                reason,
            } => write!(f, "Invalid config: {} = {} ({})", field, value, reason),

            SurfaceError::IoError { path, error } => write!(f, "IO error for {}: {}", path, error),
            SurfaceError::AssetWatchError { path, error } => {
                write!(f, "Asset watch error for {}: {}", path, error)
            }
            SurfaceError::StateError { expected, actual } => {
                write!(f, "State error: expected {}, actual {}", expected, actual)
            }

            SurfaceError::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl StdError for SurfaceError {}

impl SurfaceError {
    /// Errors after which the rendering context must not be used again
    pub fn is_context_fatal(&self) -> bool {
        matches!(self, SurfaceError::ResourceExhausted { .. })
    }

    /// Build an I/O error tagged with the path that caused it
    pub fn io(path: impl AsRef<std::path::Path>, error: std::io::Error) -> Self {
        SurfaceError::IoError {
            path: path.as_ref().display().to_string(),
            error: error.to_string(),
        }
    }
}

/// Type alias for Results in topo-surface
pub type SurfaceResult<T> = Result<T, SurfaceError>;

impl From<std::io::Error> for SurfaceError {
    fn from(error: std::io::Error) -> Self {
        SurfaceError::IoError {
            path: String::new(),
            error: error.to_string(),
        }
    }
}

impl From<GpuBackendError> for SurfaceError {
    fn from(err: GpuBackendError) -> Self {
        match err {
            GpuBackendError::OutOfMemory { resource } => SurfaceError::ResourceExhausted {
                resource,
                error: "out of GPU memory".to_string(),
            },
            GpuBackendError::Compilation { label, diagnostic } => SurfaceError::ShaderBuild {
                program: label,
                diagnostic,
            },
            GpuBackendError::UnknownHandle { kind, id } => SurfaceError::GpuOperationFailed {
                operation: format!("lookup {}", kind),
                error: format!("unknown handle {}", id),
            },
            GpuBackendError::NoActivePass => SurfaceError::StateError {
                expected: "active render pass".to_string(),
                actual: "no pass".to_string(),
            },
            GpuBackendError::Validation { operation, message } => {
                SurfaceError::GpuOperationFailed {
                    operation,
                    error: message,
                }
            }
        }
    }
}

impl From<toml::de::Error> for SurfaceError {
    fn from(error: toml::de::Error) -> Self {
        SurfaceError::InvalidConfig {
            field: "<document>".to_string(),
            value: String::new(),
            reason: error.to_string(),
        }
    }
}

/// Extension trait for adding context to errors
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> SurfaceResult<T>;
    fn with_context<F>(self, f: F) -> SurfaceResult<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: fmt::Display,
{
    fn context(self, msg: &str) -> SurfaceResult<T> {
        self.map_err(|e| SurfaceError::Internal {
            message: format!("{}: {}", msg, e),
        })
    }

    fn with_context<F>(self, f: F) -> SurfaceResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| SurfaceError::Internal {
            message: format!("{}: {}", f(), e),
        })
    }
}
