use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use super::StorageError;
use crate::batch::{BatchReport, PeakAggregate};

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let io_error = |source: std::io::Error| StorageError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_error)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value).map_err(|source| StorageError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(io_error)
}

/// Write the per-row peak indices as a JSON object keyed by row index.
pub fn save_peaks(path: &Path, peaks: &PeakAggregate) -> Result<(), StorageError> {
    write_json(path, peaks)
}

/// Read back a file written by [`save_peaks`].
pub fn load_peaks(path: &Path) -> Result<PeakAggregate, StorageError> {
    let file = File::open(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| StorageError::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save_report(path: &Path, report: &BatchReport) -> Result<(), StorageError> {
    write_json(path, report)
}
