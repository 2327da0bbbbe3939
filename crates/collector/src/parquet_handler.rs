use anyhow::{anyhow, Error};
use arrow::array::RecordBatch;
use chrono::NaiveDate;
use clima_core::ensure_parent_dir;
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::Compression,
    file::properties::WriterProperties,
};
use std::{
    fs::File,
    path::{Path, PathBuf},
};

use crate::Granularity;

/// `<data_dir>/raw/<category>/<file_stem>_<YYYYMMDD>.parquet`
pub fn partition_path(data_dir: &Path, granularity: Granularity, date: NaiveDate) -> PathBuf {
    data_dir
        .join("raw")
        .join(granularity.category())
        .join(format!(
            "{}_{}.parquet",
            granularity.file_stem(),
            date.format("%Y%m%d")
        ))
}

/// Writes `batch` as a single SNAPPY row group at `path`, creating parent
/// folders and replacing any previous file. Same batch, same bytes.
pub fn save_partition(batch: &RecordBatch, path: &Path) -> Result<(), Error> {
    ensure_parent_dir(path).map_err(|e| anyhow!("failed to create partition folder: {}", e))?;

    let file = File::create(path).map_err(|e| anyhow!("failed to create parquet file: {}", e))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .map_err(|e| anyhow!("failed to create parquet writer: {}", e))?;
    writer
        .write(batch)
        .map_err(|e| anyhow!("failed to write rows: {}", e))?;
    writer
        .close()
        .map_err(|e| anyhow!("failed to close parquet writer: {}", e))?;
    Ok(())
}

pub fn read_partition(path: &Path) -> Result<Vec<RecordBatch>, Error> {
    let file = File::open(path).map_err(|e| anyhow!("failed to open {}: {}", path.display(), e))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| anyhow!("failed to read parquet metadata: {}", e))?
        .build()
        .map_err(|e| anyhow!("failed to build parquet reader: {}", e))?;
    reader
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow!("failed to read parquet rows: {}", e))
}
