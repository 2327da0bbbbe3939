use chrono::NaiveDate;
use slog::{debug, info, Logger};
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;

use crate::{
    Endpoint, FetchError, FetchOutcome, Granularity, Municipality, QueryWindow, WeatherApi,
    WeatherPayload, WeatherQuery, MAX_PAST_DAYS,
};

/// Bounded retry with linear backoff: the wait after attempt `n` is
/// `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Per-municipality failure; counted by the collector, never fatal to a run.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CollectError {
    #[error("{granularity} fetch for {municipality} on {date} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        municipality: String,
        date: NaiveDate,
        granularity: Granularity,
        attempts: u32,
        #[source]
        source: FetchError,
    },
    #[error("{granularity} fallback fetch for {municipality} on {date} failed: {source}")]
    Fallback {
        municipality: String,
        date: NaiveDate,
        granularity: Granularity,
        #[source]
        source: FetchError,
    },
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timezone: String,
    /// "Today" in `timezone`, used to size the fallback window.
    pub today: NaiveDate,
    pub daily_retry: RetryPolicy,
    pub hourly_retry: RetryPolicy,
}

pub struct WeatherFetcher {
    api: Arc<dyn WeatherApi>,
    settings: FetchSettings,
    logger: Logger,
}

impl WeatherFetcher {
    pub fn new(logger: Logger, api: Arc<dyn WeatherApi>, settings: FetchSettings) -> Self {
        Self {
            api,
            settings,
            logger,
        }
    }

    pub fn retry_policy(&self, granularity: Granularity) -> RetryPolicy {
        match granularity {
            Granularity::Daily => self.settings.daily_retry,
            Granularity::Hourly => self.settings.hourly_retry,
        }
    }

    /// Fetches one municipality for one date from the archive. Hourly
    /// requests the archive answers with an empty series fall back once to
    /// the forecast endpoint's recent-past window; failures never do.
    pub async fn fetch(
        &self,
        municipality: &Municipality,
        date: NaiveDate,
        granularity: Granularity,
    ) -> Result<WeatherPayload, CollectError> {
        let query = self.query(
            municipality,
            granularity,
            QueryWindow::Range {
                start: date,
                end: date,
            },
        );
        let outcome = self
            .fetch_with_retry(municipality, date, Endpoint::Archive, &query)
            .await?;

        match (outcome, granularity) {
            (FetchOutcome::Payload(payload), _) => Ok(payload),
            (FetchOutcome::Empty, Granularity::Daily) => {
                debug!(
                    self.logger,
                    "archive has no daily rows for {} on {}", municipality, date
                );
                Ok(WeatherPayload::default())
            }
            (FetchOutcome::Empty, Granularity::Hourly) => {
                self.fetch_recent_hourly(municipality, date).await
            }
        }
    }

    async fn fetch_with_retry(
        &self,
        municipality: &Municipality,
        date: NaiveDate,
        endpoint: Endpoint,
        query: &WeatherQuery,
    ) -> Result<FetchOutcome, CollectError> {
        let policy = self.retry_policy(query.granularity);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.api.fetch(endpoint, query).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if attempt < policy.max_attempts => {
                    let delay = policy.delay_after(attempt);
                    info!(
                        self.logger,
                        "attempt {}/{} for {} on {} failed: {}, retrying in {:?}",
                        attempt,
                        policy.max_attempts,
                        municipality,
                        date,
                        err,
                        delay
                    );
                    sleep(delay).await;
                }
                Err(source) => {
                    return Err(CollectError::Exhausted {
                        municipality: municipality.to_string(),
                        date,
                        granularity: query.granularity,
                        attempts: attempt,
                        source,
                    })
                }
            }
        }
    }

    async fn fetch_recent_hourly(
        &self,
        municipality: &Municipality,
        date: NaiveDate,
    ) -> Result<WeatherPayload, CollectError> {
        let past_days = (self.settings.today - date)
            .num_days()
            .clamp(1, MAX_PAST_DAYS) as u32;
        info!(
            self.logger,
            "archive has no hourly rows for {} on {}, using forecast with past_days={}",
            municipality,
            date,
            past_days
        );

        let query = self.query(
            municipality,
            Granularity::Hourly,
            QueryWindow::PastDays(past_days),
        );
        match self.api.fetch(Endpoint::Forecast, &query).await {
            Ok(FetchOutcome::Payload(payload)) => Ok(WeatherPayload {
                daily: None,
                hourly: payload.hourly.map(|series| series.retain_date(date)),
            }),
            Ok(FetchOutcome::Empty) => Ok(WeatherPayload::default()),
            Err(source) => Err(CollectError::Fallback {
                municipality: municipality.to_string(),
                date,
                granularity: Granularity::Hourly,
                source,
            }),
        }
    }

    fn query(
        &self,
        municipality: &Municipality,
        granularity: Granularity,
        window: QueryWindow,
    ) -> WeatherQuery {
        WeatherQuery {
            latitude: municipality.latitude,
            longitude: municipality.longitude,
            granularity,
            window,
            timezone: self.settings.timezone.clone(),
        }
    }
}
