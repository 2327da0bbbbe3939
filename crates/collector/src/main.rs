use anyhow::anyhow;
use collector::{
    date_range, filter_regions, get_config_info, load_municipalities, pending_dates,
    setup_logger, today_in, Cli, Collector, FetchSettings, OpenMeteoClient, PartitionUploader,
    RateLimiter, Sinks, WatermarkStore, WeatherFetcher, CATALOG_DELIMITER,
};
use slog::{error, info, Logger};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = get_config_info();
    let logger = setup_logger(&cli);

    if let Err(err) = run(cli, &logger).await {
        error!(logger, "collection aborted: {:#}", err);
        return Err(err);
    }
    Ok(())
}

async fn run(cli: Cli, logger: &Logger) -> Result<(), anyhow::Error> {
    let timezone = cli.timezone()?;
    let explicit_range = cli.date_range()?;
    let granularities = cli.mode().granularities();

    info!(logger, "Clima collector starting...");
    info!(logger, "  Data dir: {}", cli.data_dir().display());
    info!(logger, "  Catalog: {}", cli.catalog().display());
    info!(logger, "  Timezone: {}", timezone);
    info!(logger, "  Mode: {:?}", cli.mode());

    let municipalities = load_municipalities(&cli.catalog(), CATALOG_DELIMITER)?;
    let regions = cli.regions();
    let municipalities = filter_regions(municipalities, &regions);
    if municipalities.is_empty() {
        return Err(anyhow!("no municipalities left after region filter {:?}", regions));
    }
    info!(logger, "loaded {} municipalities", municipalities.len());

    let today = today_in(timezone);
    let store = WatermarkStore::new(cli.watermark());
    let (dates, watermark) = match explicit_range {
        Some((start, end)) => {
            info!(
                logger,
                "explicit range {} to {}, watermark left untouched", start, end
            );
            (date_range(start, end), None)
        }
        None => {
            let last = store.load();
            info!(
                logger,
                "watermark: {}",
                last.map_or_else(|| "none".to_string(), |d| d.to_string())
            );
            (pending_dates(last, today), Some(&store))
        }
    };

    if dates.is_empty() {
        info!(logger, "nothing pending, already collected up to yesterday");
        return Ok(());
    }
    info!(
        logger,
        "pending dates: {} ({} to {})",
        dates.len(),
        dates[0],
        dates[dates.len() - 1]
    );

    let rate_limiter = RateLimiter::new(cli.token_capacity(), cli.refill_rate());
    let client = OpenMeteoClient::new(
        logger.clone(),
        &cli.user_agent(),
        cli.request_timeout(),
        rate_limiter,
    )?
    .with_urls(cli.archive_url(), cli.forecast_url());

    let fetcher = WeatherFetcher::new(
        logger.clone(),
        Arc::new(client),
        FetchSettings {
            timezone: timezone.name().to_string(),
            today,
            daily_retry: cli.daily_retry(),
            hourly_retry: cli.hourly_retry(),
        },
    );

    let sinks = Sinks {
        data_dir: cli.data_dir(),
        uploader: uploader(&cli, logger).await?,
        sqlite: cli.sqlite_target(),
    };

    let collector = Collector::new(logger.clone(), fetcher, municipalities, sinks);
    let summary = collector.run(&dates, &granularities, watermark).await?;

    info!(
        logger,
        "run finished: {} rows, {} failures across {} partitions",
        summary.total_rows(),
        summary.total_failures(),
        summary.partitions.len()
    );
    for report in &summary.partitions {
        info!(logger, "  {}", report);
    }
    if let Some(date) = summary.watermark {
        info!(logger, "watermark now at {}", date);
    }
    Ok(())
}

#[cfg(feature = "s3")]
async fn uploader(
    cli: &Cli,
    logger: &Logger,
) -> Result<Option<Arc<dyn PartitionUploader>>, anyhow::Error> {
    let Some(bucket) = cli.s3_bucket.clone() else {
        return Ok(None);
    };
    let storage = collector::S3Storage::new(
        bucket,
        cli.s3_endpoint.clone(),
        cli.s3_profile.clone(),
        logger.clone(),
    )
    .await?;
    Ok(Some(Arc::new(storage)))
}

#[cfg(not(feature = "s3"))]
async fn uploader(
    cli: &Cli,
    logger: &Logger,
) -> Result<Option<Arc<dyn PartitionUploader>>, anyhow::Error> {
    if let Some(bucket) = &cli.s3_bucket {
        slog::warn!(
            logger,
            "S3 bucket {} configured but built without the s3 feature, skipping upload", bucket
        );
    }
    Ok(None)
}
