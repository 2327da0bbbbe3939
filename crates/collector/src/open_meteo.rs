use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use slog::{debug, Logger};
use std::{fmt, time::Duration};
use tokio::sync::Mutex;

use crate::{DailySeries, Granularity, HourlySeries, RateLimiter};

pub const ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";
pub const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Upper bound the forecast endpoint accepts for `past_days`.
pub const MAX_PAST_DAYS: i64 = 92;

/// Response body of both endpoints, reduced to the series we request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WeatherPayload {
    #[serde(default)]
    pub daily: Option<DailySeries>,
    #[serde(default)]
    pub hourly: Option<HourlySeries>,
}

impl WeatherPayload {
    pub fn has_rows(&self, granularity: Granularity) -> bool {
        match granularity {
            Granularity::Daily => self.daily.as_ref().is_some_and(|s| !s.is_empty()),
            Granularity::Hourly => self.hourly.as_ref().is_some_and(|s| !s.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Arbitrary past date ranges.
    Archive,
    /// Today-relative data with an optional recent-past window.
    Forecast,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Archive => f.write_str("archive"),
            Endpoint::Forecast => f.write_str("forecast"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryWindow {
    Range { start: NaiveDate, end: NaiveDate },
    PastDays(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub granularity: Granularity,
    pub window: QueryWindow,
    pub timezone: String,
}

impl WeatherQuery {
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("latitude", self.latitude.to_string()),
            ("longitude", self.longitude.to_string()),
            (
                self.granularity.api_key(),
                self.granularity.variables().join(","),
            ),
            ("timezone", self.timezone.clone()),
        ];
        match &self.window {
            QueryWindow::Range { start, end } => {
                params.push(("start_date", start.format("%Y-%m-%d").to_string()));
                params.push(("end_date", end.format("%Y-%m-%d").to_string()));
            }
            QueryWindow::PastDays(days) => params.push(("past_days", days.to_string())),
        }
        params
    }
}

/// A request that reached the upstream and was understood.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Payload(WeatherPayload),
    /// Well-formed response without rows for the requested window, which is
    /// how the archive answers for days it has not indexed yet.
    Empty,
}

impl FetchOutcome {
    pub fn from_payload(payload: WeatherPayload, granularity: Granularity) -> Self {
        if payload.has_rows(granularity) {
            FetchOutcome::Payload(payload)
        } else {
            FetchOutcome::Empty
        }
    }
}

/// Transient upstream failure; the only kind that is retried.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("error sending request: {0}")]
    Request(String),
    #[error("upstream answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("error parsing body of response: {0}")]
    Decode(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WeatherApi: Send + Sync {
    async fn fetch(
        &self,
        endpoint: Endpoint,
        query: &WeatherQuery,
    ) -> Result<FetchOutcome, FetchError>;
}

pub struct OpenMeteoClient {
    http: Client,
    archive_url: String,
    forecast_url: String,
    rate_limiter: Mutex<RateLimiter>,
    logger: Logger,
}

impl OpenMeteoClient {
    pub fn new(
        logger: Logger,
        user_agent: &str,
        timeout: Duration,
        rate_limiter: RateLimiter,
    ) -> Result<Self, anyhow::Error> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            archive_url: ARCHIVE_URL.to_string(),
            forecast_url: FORECAST_URL.to_string(),
            rate_limiter: Mutex::new(rate_limiter),
            logger,
        })
    }

    pub fn with_urls(mut self, archive_url: String, forecast_url: String) -> Self {
        self.archive_url = archive_url;
        self.forecast_url = forecast_url;
        self
    }

    fn url(&self, endpoint: Endpoint) -> &str {
        match endpoint {
            Endpoint::Archive => &self.archive_url,
            Endpoint::Forecast => &self.forecast_url,
        }
    }
}

#[async_trait]
impl WeatherApi for OpenMeteoClient {
    async fn fetch(
        &self,
        endpoint: Endpoint,
        query: &WeatherQuery,
    ) -> Result<FetchOutcome, FetchError> {
        self.rate_limiter.lock().await.acquire().await;

        let url = self.url(endpoint);
        debug!(self.logger, "requesting {}: {} {:?}", endpoint, url, query.params());
        let response = self
            .http
            .get(url)
            .query(&query.params())
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: WeatherPayload = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(FetchOutcome::from_payload(payload, query.granularity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(window: QueryWindow) -> WeatherQuery {
        WeatherQuery {
            latitude: -23.5,
            longitude: -46.6,
            granularity: Granularity::Hourly,
            window,
            timezone: "America/Sao_Paulo".into(),
        }
    }

    #[test]
    fn range_query_params() {
        let date = NaiveDate::from_ymd_opt(2025, 11, 5).unwrap();
        let params = query(QueryWindow::Range {
            start: date,
            end: date,
        })
        .params();

        assert!(params.contains(&("start_date", "2025-11-05".to_string())));
        assert!(params.contains(&("end_date", "2025-11-05".to_string())));
        assert!(params.contains(&(
            "hourly",
            "temperature_2m,relative_humidity_2m,precipitation,wind_speed_10m".to_string()
        )));
        assert!(params.iter().all(|(key, _)| *key != "past_days"));
    }

    #[test]
    fn past_days_query_params() {
        let params = query(QueryWindow::PastDays(3)).params();
        assert!(params.contains(&("past_days", "3".to_string())));
        assert!(params.iter().all(|(key, _)| *key != "start_date"));
    }

    #[test]
    fn missing_or_empty_series_is_an_empty_outcome() {
        let missing: WeatherPayload =
            serde_json::from_str(r#"{"latitude": -23.5, "longitude": -46.6}"#).unwrap();
        assert_eq!(
            FetchOutcome::from_payload(missing, Granularity::Hourly),
            FetchOutcome::Empty
        );

        let empty: WeatherPayload = serde_json::from_str(r#"{"hourly": {}}"#).unwrap();
        assert_eq!(
            FetchOutcome::from_payload(empty, Granularity::Hourly),
            FetchOutcome::Empty
        );

        let daily_only: WeatherPayload =
            serde_json::from_str(r#"{"daily": {"time": ["2025-11-05"]}}"#).unwrap();
        assert_eq!(
            FetchOutcome::from_payload(daily_only.clone(), Granularity::Hourly),
            FetchOutcome::Empty
        );
        assert_eq!(
            FetchOutcome::from_payload(daily_only.clone(), Granularity::Daily),
            FetchOutcome::Payload(daily_only)
        );
    }
}
