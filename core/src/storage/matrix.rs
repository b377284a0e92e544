use std::fs::File;
use std::io::Read;
use std::path::Path;

use ndarray::Array2;

use super::StorageError;

/// How to read a signal matrix file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Skip the first record as column names
    pub has_header: bool,
    pub delimiter: u8,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: b',',
        }
    }
}

fn parse_cell(cell: &str, row: usize, column: usize) -> Result<f64, StorageError> {
    match cell {
        "" | "nan" | "NaN" | "NAN" | "NA" | "N/A" => Ok(f64::NAN),
        _ => cell.parse::<f64>().map_err(|_| StorageError::Parse {
            row,
            column,
            value: cell.to_string(),
        }),
    }
}

/// Read a CSV file of signal rows into a matrix, one signal per row.
///
/// Rows shorter than the widest one are right-padded with `NaN`, as are
/// empty cells. A file with no data rows gives a matrix with no rows.
pub fn load_signal_matrix(path: &Path, options: &LoaderOptions) -> Result<Array2<f64>, StorageError> {
    let file = File::open(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_signal_matrix(file, path, options)
}

fn read_signal_matrix<R: Read>(
    reader: R,
    path: &Path,
    options: &LoaderOptions,
) -> Result<Array2<f64>, StorageError> {
    let csv_error = |source: csv::Error| StorageError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(options.has_header)
        .delimiter(options.delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let header_width = if options.has_header {
        reader.headers().map_err(csv_error)?.len()
    } else {
        0
    };

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(csv_error)?;
        let values = record
            .iter()
            .enumerate()
            .map(|(column, cell)| parse_cell(cell, row, column))
            .collect::<Result<Vec<f64>, _>>()?;
        rows.push(values);
    }
    if rows.is_empty() {
        return Ok(Array2::zeros((0, header_width)));
    }
    Ok(matrix_from_rows(rows))
}

/// Stack rows of unequal length into a `NaN`-padded matrix.
pub fn matrix_from_rows(rows: Vec<Vec<f64>>) -> Array2<f64> {
    let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    let mut matrix = Array2::from_elem((rows.len(), width), f64::NAN);
    for (mut target, row) in matrix.rows_mut().into_iter().zip(rows) {
        for (slot, value) in target.iter_mut().zip(row) {
            *slot = value;
        }
    }
    matrix
}
