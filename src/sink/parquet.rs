//! Parquet writer for the staged artifact.
//!
//! The artifact is written to a temporary file in the destination directory
//! and renamed into place once the footer is written. A reader of the
//! configured path therefore sees either the previous artifact or the new
//! complete one.

use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use snafu::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::{ParquetCompression, StagingConfig};
use crate::emit;
use crate::error::{
    CreateDirSnafu, MetadataSnafu, PersistSnafu, StagingError, TempFileSnafu, WriteSnafu,
    WriterCreateSnafu,
};
use crate::metrics::events::StagedArtifactWritten;

/// A Parquet file holding one cleaned batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifact {
    pub path: PathBuf,
    pub size: u64,
    pub record_count: usize,
}

/// Writes cleaned batches to the staged artifact path.
#[derive(Debug, Clone)]
pub struct StagedWriter {
    path: PathBuf,
    compression: ParquetCompression,
    row_group_size: usize,
}

impl StagedWriter {
    pub fn new(config: &StagingConfig) -> Self {
        Self {
            path: config.path.clone(),
            compression: config.compression,
            row_group_size: config.row_group_size,
        }
    }

    /// Destination of the artifact.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer_properties(&self) -> WriterProperties {
        let compression = match self.compression {
            ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
            ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            ParquetCompression::Lz4 => Compression::LZ4,
        };

        WriterProperties::builder()
            .set_compression(compression)
            .set_max_row_group_size(self.row_group_size)
            .build()
    }

    /// Write `batch`, replacing any previous artifact at the same path.
    pub fn write(&self, batch: &RecordBatch) -> Result<StagedArtifact, StagingError> {
        let start = Instant::now();
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).context(CreateDirSnafu { path: &dir })?;

        let mut tmp = NamedTempFile::new_in(&dir).context(TempFileSnafu { path: &dir })?;
        {
            let mut writer =
                ArrowWriter::try_new(&mut tmp, batch.schema(), Some(self.writer_properties()))
                    .context(WriterCreateSnafu)?;
            writer.write(batch).context(WriteSnafu)?;
            writer.close().context(WriteSnafu)?;
        }
        debug!("Wrote staged batch to temporary file {}", tmp.path().display());

        tmp.persist(&self.path)
            .context(PersistSnafu { path: &self.path })?;
        let size = std::fs::metadata(&self.path)
            .context(MetadataSnafu { path: &self.path })?
            .len();

        emit!(StagedArtifactWritten {
            bytes: size,
            duration: start.elapsed(),
        });
        info!(
            "Wrote staged artifact {} ({} bytes, {} records)",
            self.path.display(),
            size,
            batch.num_rows()
        );

        Ok(StagedArtifact {
            path: self.path.clone(),
            size,
            record_count: batch.num_rows(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, true),
            Field::new("price", DataType::Float64, true),
            Field::new("neighbourhood", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![Some(1), Some(2), None])),
                Arc::new(Float64Array::from(vec![Some(0.1 + 0.2), None, Some(1234.5)])),
                Arc::new(StringArray::from(vec![Some("Downtown"), None, Some("")])),
            ],
        )
        .unwrap()
    }

    fn config(path: PathBuf, compression: ParquetCompression) -> StagingConfig {
        StagingConfig {
            path,
            compression,
            row_group_size: 2,
        }
    }

    #[test]
    fn test_round_trip_preserves_nulls_and_floats() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("staged/listings.parquet");
        let writer = StagedWriter::new(&config(path.clone(), ParquetCompression::Snappy));

        let batch = test_batch();
        let artifact = writer.write(&batch).unwrap();
        assert_eq!(artifact.record_count, 3);
        assert!(artifact.size > 0);

        let file = std::fs::File::open(&path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        let read = arrow::compute::concat_batches(&batch.schema(), &batches).unwrap();

        assert_eq!(read, batch);
    }

    #[test]
    fn test_rewrite_replaces_previous_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("listings.parquet");
        let writer = StagedWriter::new(&config(path.clone(), ParquetCompression::Zstd));

        writer.write(&test_batch()).unwrap();
        let artifact = writer.write(&test_batch().slice(0, 1)).unwrap();

        assert_eq!(artifact.record_count, 1);
        let entries = std::fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(entries, 1, "temporary files must not be left behind");
    }
}
