use std::borrow::Cow;
use std::io;

use thiserror::Error;

use crate::storage::StorageArea;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to resolve required path: {0}")]
    Path(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{area} storage failed: {message}")]
    Storage { area: StorageArea, message: String },
    #[error("No valid rows found in CSV.")]
    EmptyInput,
    #[error("No valid username entries detected in CSV.")]
    NoValidEntries,
    #[error("Choose a CSV file to import.")]
    MissingFile,
}

impl AppError {
    pub fn storage(area: StorageArea, message: impl Into<String>) -> Self {
        AppError::Storage {
            area,
            message: message.into(),
        }
    }

    pub fn user_message<'a>(&'a self, fallback: &'a str) -> Cow<'a, str> {
        match self {
            AppError::EmptyInput | AppError::NoValidEntries | AppError::MissingFile => {
                Cow::Owned(self.to_string())
            }
            _ => Cow::Borrowed(fallback),
        }
    }
}
