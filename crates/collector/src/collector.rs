use anyhow::{Context, Error};
use arrow::array::RecordBatch;
use chrono::NaiveDate;
use slog::{info, warn, Logger};
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    append_partition, concat_aligned, normalize, partition_path, save_partition, CollectError,
    Granularity, Municipality, PartitionUploader, WatermarkStore, WeatherFetcher,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteTarget {
    pub path: PathBuf,
    pub table_prefix: String,
}

impl SqliteTarget {
    /// `<prefix>_<category>`, e.g. `clima_raw_diario`.
    pub fn table_name(&self, granularity: Granularity) -> String {
        format!("{}_{}", self.table_prefix, granularity.category())
    }
}

/// Where a non-empty partition goes once it is aggregated.
#[derive(Clone)]
pub struct Sinks {
    pub data_dir: PathBuf,
    pub uploader: Option<Arc<dyn PartitionUploader>>,
    pub sqlite: Option<SqliteTarget>,
}

impl Sinks {
    pub fn local(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            uploader: None,
            sqlite: None,
        }
    }
}

/// Rows gathered for one (date, granularity) and the municipalities that
/// could not be fetched.
#[derive(Debug)]
pub struct Collection {
    pub dataset: RecordBatch,
    pub failures: Vec<CollectError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionReport {
    pub date: NaiveDate,
    pub granularity: Granularity,
    pub rows: usize,
    pub failures: usize,
    pub local_path: Option<PathBuf>,
    pub remote: Option<String>,
    pub appended: Option<u64>,
}

impl fmt::Display for PartitionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} rows, {} failures",
            self.date, self.granularity, self.rows, self.failures
        )?;
        match &self.local_path {
            Some(path) => write!(f, ", written to {}", path.display())?,
            None => write!(f, ", nothing written")?,
        }
        if let Some(remote) = &self.remote {
            write!(f, ", uploaded to {}", remote)?;
        }
        if let Some(appended) = self.appended {
            write!(f, ", {} rows appended", appended)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub partitions: Vec<PartitionReport>,
    /// Last value written to the watermark during this run.
    pub watermark: Option<NaiveDate>,
}

impl RunSummary {
    pub fn total_rows(&self) -> usize {
        self.partitions.iter().map(|p| p.rows).sum()
    }

    pub fn total_failures(&self) -> usize {
        self.partitions.iter().map(|p| p.failures).sum()
    }

    pub fn written(&self) -> Vec<&Path> {
        self.partitions
            .iter()
            .filter_map(|p| p.local_path.as_deref())
            .collect()
    }
}

pub struct Collector {
    fetcher: WeatherFetcher,
    municipalities: Vec<Municipality>,
    sinks: Sinks,
    logger: Logger,
}

impl Collector {
    pub fn new(
        logger: Logger,
        fetcher: WeatherFetcher,
        municipalities: Vec<Municipality>,
        sinks: Sinks,
    ) -> Self {
        Self {
            fetcher,
            municipalities,
            sinks,
            logger,
        }
    }

    /// Fetches and normalizes every municipality in catalog order. A failed
    /// municipality is logged and counted; it never stops the loop.
    pub async fn collect(
        &self,
        date: NaiveDate,
        granularity: Granularity,
    ) -> Result<Collection, Error> {
        let mut batches = vec![];
        let mut failures = vec![];

        for municipality in &self.municipalities {
            match self.fetcher.fetch(municipality, date, granularity).await {
                Ok(payload) => {
                    let batch = normalize(&payload, municipality, granularity).with_context(|| {
                        format!("failed to normalize {} rows for {}", granularity, municipality)
                    })?;
                    if batch.num_rows() > 0 {
                        batches.push(batch);
                    }
                }
                Err(err) => {
                    warn!(
                        self.logger,
                        "skipping {} [{}]: {}", municipality.name, municipality.id, err
                    );
                    failures.push(err);
                }
            }
        }

        let dataset = concat_aligned(&batches, granularity.columns())
            .with_context(|| format!("failed to aggregate {} rows for {}", granularity, date))?;
        Ok(Collection { dataset, failures })
    }

    /// Processes `dates` in ascending order. The watermark (if given) only
    /// moves to a date once both daily and hourly have been attempted for it;
    /// a single-granularity run leaves it where it was. Sink failures abort
    /// the run before the watermark moves.
    pub async fn run(
        &self,
        dates: &[NaiveDate],
        granularities: &[Granularity],
        watermark: Option<&WatermarkStore>,
    ) -> Result<RunSummary, Error> {
        let mut summary = RunSummary::default();
        let advances = covers_every_granularity(granularities);
        if watermark.is_some() && !advances {
            warn!(
                self.logger,
                "collecting {:?} only, watermark left unchanged until daily and hourly both run",
                granularities
            );
        }

        for &date in dates {
            for &granularity in granularities {
                info!(
                    self.logger,
                    "collecting {} data for {} ({} municipalities)",
                    granularity,
                    date,
                    self.municipalities.len()
                );
                let collection = self.collect(date, granularity).await?;
                let report = self.store(date, granularity, collection).await?;
                info!(self.logger, "{}", report);
                summary.partitions.push(report);
            }

            if let Some(store) = watermark.filter(|_| advances) {
                store.save(date).with_context(|| {
                    format!("failed to save watermark to {}", store.path().display())
                })?;
                info!(self.logger, "watermark advanced to {}", date);
                summary.watermark = Some(date);
            }
        }

        Ok(summary)
    }

    async fn store(
        &self,
        date: NaiveDate,
        granularity: Granularity,
        collection: Collection,
    ) -> Result<PartitionReport, Error> {
        let mut report = PartitionReport {
            date,
            granularity,
            rows: collection.dataset.num_rows(),
            failures: collection.failures.len(),
            local_path: None,
            remote: None,
            appended: None,
        };

        if collection.dataset.num_rows() == 0 {
            warn!(
                self.logger,
                "no {} rows for {} ({} failures), skipping partition",
                granularity,
                date,
                report.failures
            );
            return Ok(report);
        }

        let path = partition_path(&self.sinks.data_dir, granularity, date);
        save_partition(&collection.dataset, &path)
            .with_context(|| format!("failed to write partition {}", path.display()))?;
        info!(
            self.logger,
            "saved {} rows to {}",
            report.rows,
            path.display()
        );

        if let Some(uploader) = &self.sinks.uploader {
            let remote = uploader
                .upload(&path, granularity.category(), date)
                .await
                .with_context(|| format!("failed to upload {}", path.display()))?;
            report.remote = Some(remote);
        }

        if let Some(sqlite) = &self.sinks.sqlite {
            let table = sqlite.table_name(granularity);
            let appended = append_partition(&path, &sqlite.path, &table)
                .await
                .with_context(|| format!("failed to append {} to {}", path.display(), table))?;
            info!(
                self.logger,
                "appended {} rows to {} in {}",
                appended,
                table,
                sqlite.path.display()
            );
            report.appended = Some(appended);
        }

        report.local_path = Some(path);
        Ok(report)
    }
}

fn covers_every_granularity(granularities: &[Granularity]) -> bool {
    [Granularity::Daily, Granularity::Hourly]
        .iter()
        .all(|g| granularities.contains(g))
}
