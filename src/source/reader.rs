//! CSV reader for raw listing files.

use csv::ReaderBuilder;
use snafu::prelude::*;
use snafu::IntoError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::RawBatch;
use crate::config::SourceConfig;
use crate::emit;
use crate::error::{
    OpenRawSnafu, ReadHeaderSnafu, ReadRecordSnafu, SourceError, TooManyFieldsSnafu,
};
use crate::metrics::events::RecordsRead;

/// Reads a delimited listings file into a [`RawBatch`].
///
/// Quoted fields may span lines. Short records are padded with missing
/// values. A record with more fields than the header is an error naming its
/// line, since its cells cannot be attributed to columns.
#[derive(Debug, Clone)]
pub struct ListingsReader {
    delimiter: u8,
}

impl Default for ListingsReader {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl ListingsReader {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }

    /// Read a file from disk.
    pub fn read_path(&self, path: &Path) -> Result<RawBatch, SourceError> {
        let reader = self
            .builder()
            .from_path(path)
            .context(OpenRawSnafu { path })?;
        self.read_csv(reader, path)
    }

    /// Read from any byte stream; `label` names the input in errors.
    pub fn read<R: Read>(&self, input: R, label: &Path) -> Result<RawBatch, SourceError> {
        self.read_csv(self.builder().from_reader(input), label)
    }

    fn builder(&self) -> ReaderBuilder {
        let mut builder = ReaderBuilder::new();
        builder
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true);
        builder
    }

    fn read_csv<R: Read>(
        &self,
        mut reader: csv::Reader<R>,
        label: &Path,
    ) -> Result<RawBatch, SourceError> {
        let path = PathBuf::from(label);
        let columns: Vec<String> = reader
            .headers()
            .context(ReadHeaderSnafu { path: &path })?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        debug!("Raw columns: {:?}", columns);

        let mut batch = RawBatch::new(columns);
        for record in reader.records() {
            let record = record.map_err(|source| {
                let line = source.position().map_or(0, |p| p.line());
                ReadRecordSnafu {
                    path: path.clone(),
                    line,
                }
                .into_error(source)
            })?;
            let expected = batch.columns().len();
            ensure!(
                record.len() <= expected,
                TooManyFieldsSnafu {
                    path: &path,
                    line: record.position().map_or(0, |p| p.line()),
                    expected,
                    found: record.len(),
                }
            );
            batch.push_row(record.iter().map(Some));
        }

        emit!(RecordsRead {
            count: batch.num_rows() as u64
        });
        info!(
            "Read {} raw records with {} columns from {}",
            batch.num_rows(),
            batch.columns().len(),
            path.display()
        );
        Ok(batch)
    }
}

/// Read the configured raw listings file.
pub fn read_listings(config: &SourceConfig) -> Result<RawBatch, SourceError> {
    ListingsReader::new(config.delimiter_byte()).read_path(&config.path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(text: &str) -> Result<RawBatch, SourceError> {
        ListingsReader::default().read(text.as_bytes(), Path::new("test.csv"))
    }

    #[test]
    fn test_reads_header_and_rows() {
        let batch = read("id,price,neighbourhood\n1,\"$1,200.00\",Downtown\n2,,\n").unwrap();

        assert_eq!(batch.columns(), &["id", "price", "neighbourhood"]);
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.value(0, 1), Some("$1,200.00"));
        assert_eq!(batch.value(1, 1), None);
        assert_eq!(batch.value(1, 2), None);
    }

    #[test]
    fn test_quoted_multiline_field() {
        let batch = read("id,name\n1,\"two\nlines\"\n").unwrap();
        assert_eq!(batch.value(0, 1), Some("two\nlines"));
    }

    #[test]
    fn test_long_record_reports_line() {
        let err = read("id,price\n1,10\n2,20,extra\n").unwrap_err();
        match err {
            SourceError::TooManyFields {
                line,
                expected,
                found,
                ..
            } => {
                assert_eq!(line, 3);
                assert_eq!(expected, 2);
                assert_eq!(found, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_short_record_padded_with_missing() {
        let batch = read("id,price,neighbourhood\n1,$10\n2\n").unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.value(0, 1), Some("$10"));
        assert_eq!(batch.value(0, 2), None);
        assert_eq!(batch.value(1, 0), Some("2"));
        assert_eq!(batch.value(1, 1), None);
    }

    #[test]
    fn test_header_only_file() {
        let batch = read("id,price\n").unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.columns().len(), 2);
    }

    #[test]
    fn test_tab_delimiter() {
        let batch = ListingsReader::new(b'\t')
            .read("id\tprice\n7\t$5\n".as_bytes(), Path::new("test.tsv"))
            .unwrap();
        assert_eq!(batch.value(0, 1), Some("$5"));
    }

    #[test]
    fn test_missing_file_fails_to_open() {
        let err = ListingsReader::default()
            .read_path(Path::new("/nonexistent/listings.csv"))
            .unwrap_err();
        assert!(matches!(err, SourceError::OpenRaw { .. }));
    }
}
