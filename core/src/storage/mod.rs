use std::io;
use std::path::PathBuf;

use thiserror::Error;

mod matrix;
mod peaks_file;

pub use matrix::{load_signal_matrix, matrix_from_rows, LoaderOptions};
pub use peaks_file::{load_peaks, save_peaks, save_report};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed CSV in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("row {row}, column {column}: {value:?} is not a number")]
    Parse {
        row: usize,
        column: usize,
        value: String,
    },
    #[error("malformed peak file {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
