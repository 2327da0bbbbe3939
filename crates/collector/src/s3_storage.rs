use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::Path;

/// Puts a local partition file into object storage and returns its locator.
#[async_trait]
pub trait PartitionUploader: Send + Sync {
    async fn upload(
        &self,
        local_path: &Path,
        category: &str,
        reference_date: NaiveDate,
    ) -> Result<String, anyhow::Error>;
}

/// Hive-style key: `raw/clima/<category>/date=<YYYY-MM-DD>/<file name>`.
pub fn partition_key(category: &str, reference_date: NaiveDate, file_name: &str) -> String {
    format!(
        "raw/clima/{}/date={}/{}",
        category,
        reference_date.format("%Y-%m-%d"),
        file_name
    )
}

#[cfg(feature = "s3")]
pub use self::s3::S3Storage;

#[cfg(feature = "s3")]
mod s3 {
    use anyhow::anyhow;
    use async_trait::async_trait;
    use aws_sdk_s3::Client;
    use chrono::NaiveDate;
    use clima_core::path_exists;
    use slog::{error, info, Logger};
    use std::path::Path;

    use super::{partition_key, PartitionUploader};

    pub struct S3Storage {
        client: Client,
        bucket: String,
        logger: Logger,
    }

    impl S3Storage {
        pub async fn new(
            bucket: String,
            endpoint: Option<String>,
            profile: Option<String>,
            logger: Logger,
        ) -> Result<Self, anyhow::Error> {
            let mut config_loader = aws_config::from_env();

            if let Some(endpoint_url) = endpoint {
                info!(logger, "Using custom S3 endpoint: {}", endpoint_url);
                config_loader = config_loader.endpoint_url(endpoint_url);
            }
            if let Some(profile) = profile {
                info!(logger, "Using AWS profile: {}", profile);
                config_loader = config_loader.profile_name(profile);
            }

            let config = config_loader.load().await;
            let client = Client::new(&config);

            info!(logger, "S3 storage initialized for bucket: {}", bucket);

            Ok(Self {
                client,
                bucket,
                logger,
            })
        }

        pub async fn upload_file(
            &self,
            local_path: &Path,
            s3_key: &str,
        ) -> Result<(), anyhow::Error> {
            let body = aws_sdk_s3::primitives::ByteStream::from_path(local_path).await?;

            info!(
                self.logger,
                "Uploading {} to s3://{}/{}",
                local_path.display(),
                self.bucket,
                s3_key
            );

            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(s3_key)
                .body(body)
                .content_type("application/parquet")
                .send()
                .await
                .map_err(|e| {
                    error!(self.logger, "Failed to upload to S3: {}", e);
                    anyhow!("S3 upload failed: {}", e)
                })?;

            Ok(())
        }
    }

    #[async_trait]
    impl PartitionUploader for S3Storage {
        async fn upload(
            &self,
            local_path: &Path,
            category: &str,
            reference_date: NaiveDate,
        ) -> Result<String, anyhow::Error> {
            if !path_exists(local_path) {
                return Err(anyhow!("local file not found: {}", local_path.display()));
            }
            let file_name = local_path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow!("invalid partition path: {}", local_path.display()))?;

            let key = partition_key(category, reference_date, file_name);
            self.upload_file(local_path, &key).await?;

            let locator = format!("s3://{}/{}", self.bucket, key);
            info!(self.logger, "Successfully uploaded to {}", locator);
            Ok(locator)
        }
    }
}
