use super::TableError;
use super::format::FloatFormat;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Streams rows to a CSV file one chunk at a time.
///
/// The file handle is owned by the writer and closed when it is dropped, on
/// success or on an early `?` return. Only `finish` guarantees the data was
/// flushed and synced.
pub struct ChunkedTableWriter {
    path: PathBuf,
    out: BufWriter<File>,
    format: FloatFormat,
    columns: usize,
    rows: usize,
    line: String,
}

impl ChunkedTableWriter {
    /// Create (truncate) `path` and write the `Time_s,Ch1..ChN` header if asked.
    pub fn create(
        path: &Path,
        columns: usize,
        format: FloatFormat,
        include_header: bool,
    ) -> Result<Self, TableError> {
        let file = File::create(path).map_err(|e| TableError::write(path, e))?;
        let mut writer = Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            format,
            columns,
            rows: 0,
            line: String::new(),
        };
        if include_header {
            let header = header_line(columns);
            writer
                .out
                .write_all(header.as_bytes())
                .map_err(|e| TableError::write(path, e))?;
        }
        Ok(writer)
    }

    /// Append one chunk. `columns[c][i]` is the value of channel `c` at `timestamps[i]`.
    pub fn write_chunk(
        &mut self,
        timestamps: &[f64],
        columns: &[&[f64]],
    ) -> Result<(), TableError> {
        debug_assert_eq!(columns.len(), self.columns);
        self.line.clear();
        for (i, &t) in timestamps.iter().enumerate() {
            self.format.write_to(&mut self.line, t);
            for column in columns {
                self.line.push(',');
                self.format.write_to(&mut self.line, column[i]);
            }
            self.line.push('\n');
        }
        self.out
            .write_all(self.line.as_bytes())
            .map_err(|e| TableError::write(&self.path, e))?;
        self.rows += timestamps.len();
        Ok(())
    }

    /// Flush, sync and close. Returns the number of data rows written.
    pub fn finish(self) -> Result<usize, TableError> {
        let Self { path, out, rows, .. } = self;
        let file = out
            .into_inner()
            .map_err(|e| TableError::write(&path, e.into_error()))?;
        file.sync_all().map_err(|e| TableError::write(&path, e))?;
        Ok(rows)
    }
}

pub fn header_line(columns: usize) -> String {
    let mut header = String::from("Time_s");
    for c in 1..=columns {
        header.push_str(&format!(",Ch{}", c));
    }
    header.push('\n');
    header
}
