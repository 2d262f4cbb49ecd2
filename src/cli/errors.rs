use std::path::PathBuf;

use thiserror::Error;

/// Application-specific errors for the CLI
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Input path does not exist: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error(transparent)]
    Pipeline(#[from] acqmap::Error),
}

impl AppError {
    /// This error followed by its `source()` chain.
    pub fn chain(&self) -> Vec<String> {
        match self {
            AppError::Pipeline(e) => e.chain().map(|e| e.to_string()).collect(),
            other => vec![other.to_string()],
        }
    }
}
