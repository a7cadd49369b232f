use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use csv::StringRecord;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::atomic::write_atomic;
use crate::error::{Error, Result};

/// Storage zone of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Raw,
    Processed,
}

impl Zone {
    fn dir_name(&self) -> &'static str {
        match self {
            Zone::Raw => "raw",
            Zone::Processed => "processed",
        }
    }
}

/// Files exchanged between pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    RawTransactions,
    CleanedTransactions,
    CustomerDimension,
}

impl Artifact {
    pub fn zone(&self) -> Zone {
        match self {
            Artifact::RawTransactions => Zone::Raw,
            Artifact::CleanedTransactions | Artifact::CustomerDimension => Zone::Processed,
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Artifact::RawTransactions => "transactions.csv",
            Artifact::CleanedTransactions => "cleaned_transactions.csv",
            Artifact::CustomerDimension => "dim_customer.csv",
        }
    }
}

/// Date-partitioned directory layout rooted at the pipeline base directory.
///
/// `<root>/<raw|processed>/<YYYY>/<MM>/<DD>/<artifact>`
#[derive(Debug, Clone)]
pub struct PartitionLayout {
    root: PathBuf,
}

impl PartitionLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn partition_dir(&self, zone: Zone, date: NaiveDate) -> PathBuf {
        self.root
            .join(zone.dir_name())
            .join(format!("{:04}", date.year()))
            .join(format!("{:02}", date.month()))
            .join(format!("{:02}", date.day()))
    }

    pub fn artifact_path(&self, artifact: Artifact, date: NaiveDate) -> PathBuf {
        self.partition_dir(artifact.zone(), date)
            .join(artifact.file_name())
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }
}

/// Summary of a partition file written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenPartition {
    pub path: PathBuf,
    pub rows: u64,
    pub bytes: u64,
}

/// Deserialize every row of a CSV partition.
///
/// Fails with [`Error::MissingInput`] when the file does not exist.
pub fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = open_reader(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Read a partition as untyped records, keeping the header row.
pub fn read_records(path: &Path) -> Result<(StringRecord, Vec<StringRecord>)> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers()?.clone();
    let mut records = Vec::new();
    for record in reader.records() {
        records.push(record?);
    }
    Ok((headers, records))
}

fn open_reader(path: &Path) -> Result<csv::Reader<File>> {
    if !path.exists() {
        return Err(Error::MissingInput(path.to_path_buf()));
    }
    let file = File::open(path)?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file))
}

/// Serialize rows to a CSV partition, replacing any previous file atomically.
pub fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<WrittenPartition> {
    let bytes = write_atomic(path, |out| {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(true)
            .from_writer(CountingWriter::new(out));
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        let counting = writer.into_inner().map_err(|err| Error::Io(err.into_error()))?;
        Ok(counting.bytes_written())
    })?;

    Ok(WrittenPartition {
        path: path.to_path_buf(),
        rows: rows.len() as u64,
        bytes,
    })
}

struct CountingWriter<W: Write> {
    inner: W,
    bytes: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let size = self.inner.write(buf)?;
        self.bytes = self.bytes.saturating_add(size as u64);
        Ok(size)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lays_out_partitions_by_zone_and_date() {
        let layout = PartitionLayout::new("/data");
        let date = NaiveDate::from_ymd_opt(2025, 2, 7).unwrap();

        assert_eq!(
            layout.artifact_path(Artifact::RawTransactions, date),
            PathBuf::from("/data/raw/2025/02/07/transactions.csv")
        );
        assert_eq!(
            layout.artifact_path(Artifact::CleanedTransactions, date),
            PathBuf::from("/data/processed/2025/02/07/cleaned_transactions.csv")
        );
        assert_eq!(
            layout.artifact_path(Artifact::CustomerDimension, date),
            PathBuf::from("/data/processed/2025/02/07/dim_customer.csv")
        );
    }

    #[test]
    fn missing_partition_is_reported_as_missing_input() {
        let path = std::env::temp_dir().join("payflow_missing_partition_does_not_exist.csv");
        let result = read_rows::<crate::model::ChannelDim>(&path);
        assert!(matches!(result, Err(Error::MissingInput(p)) if p == path));
    }
}
