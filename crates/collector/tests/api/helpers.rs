use async_trait::async_trait;
use chrono::NaiveDate;
use collector::{
    load_municipalities, Collector, Endpoint, FetchError, FetchOutcome, FetchSettings,
    Municipality, RetryPolicy, Sinks, WatermarkStore, WeatherApi, WeatherFetcher,
    WeatherPayload, WeatherQuery, CATALOG_DELIMITER,
};
use mockall::mock;
use slog::{o, Logger};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tempfile::TempDir;

mock! {
    pub WeatherAccess {}

    #[async_trait]
    impl WeatherApi for WeatherAccess {
        async fn fetch(
            &self,
            endpoint: Endpoint,
            query: &WeatherQuery,
        ) -> Result<FetchOutcome, FetchError>;
    }
}

pub const CATALOG: &str = "\
codigo_ibge;nome;nome_uf;latitude;longitude;populacao
3550308;São Paulo;São Paulo;-23.5329;-46.6395;11451999
3304557;Rio de Janeiro;Rio de Janeiro;-22.9129;-43.2003;6211223
3106200;Belo Horizonte;Minas Gerais;-19.9102;-43.9266;2315560
";

pub struct TestApp {
    pub dir: TempDir,
    pub collector: Collector,
    pub watermark: WatermarkStore,
}

impl TestApp {
    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }
}

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 11, day).unwrap()
}

/// "Today" for every test run.
pub fn today() -> NaiveDate {
    date(6)
}

pub fn load_catalog(dir: &TempDir) -> Vec<Municipality> {
    let path = dir.path().join("data/lista_municipios/lista_mun.csv");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, CATALOG).unwrap();
    load_municipalities(&path, CATALOG_DELIMITER).unwrap()
}

pub fn spawn_collector(weather: MockWeatherAccess) -> TestApp {
    spawn_collector_with(weather, |sinks| sinks)
}

pub fn spawn_collector_with(
    weather: MockWeatherAccess,
    configure: impl FnOnce(Sinks) -> Sinks,
) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let municipalities = load_catalog(&dir);
    let logger = Logger::root(slog::Discard, o!());
    let retry = RetryPolicy::new(3, Duration::ZERO);

    let fetcher = WeatherFetcher::new(
        logger.clone(),
        Arc::new(weather),
        FetchSettings {
            timezone: "America/Sao_Paulo".into(),
            today: today(),
            daily_retry: retry,
            hourly_retry: retry,
        },
    );
    let sinks = configure(Sinks::local(dir.path().join("data")));
    let collector = Collector::new(logger, fetcher, municipalities, sinks);
    let watermark = WatermarkStore::new(dir.path().join("data/state/watermark.txt"));

    TestApp {
        dir,
        collector,
        watermark,
    }
}

/// Archive response for one day, shaped like the real upstream body.
pub fn mock_daily_payload(query: &WeatherQuery, day: &str) -> FetchOutcome {
    let body = format!(
        r#"{{
            "latitude": {lat},
            "longitude": {lon},
            "timezone": "America/Sao_Paulo",
            "daily_units": {{"time": "iso8601", "temperature_2m_max": "°C"}},
            "daily": {{
                "time": ["{day}"],
                "temperature_2m_max": [{max}],
                "temperature_2m_min": [18.1],
                "apparent_temperature_max": [31.0],
                "apparent_temperature_min": [18.9],
                "precipitation_sum": [2.4],
                "rain_sum": [2.4],
                "snowfall_sum": [0.0],
                "windspeed_10m_max": [14.8],
                "windgusts_10m_max": [33.1],
                "winddirection_10m_dominant": [128],
                "shortwave_radiation_sum": [21.37],
                "weathercode": [61]
            }}
        }}"#,
        lat = query.latitude,
        lon = query.longitude,
        day = day,
        max = 30.0 + query.latitude / 10.0,
    );
    let payload: WeatherPayload = serde_json::from_str(&body).unwrap();
    FetchOutcome::Payload(payload)
}

/// Forecast response spanning the day before and the target day.
pub fn mock_recent_hourly_payload() -> FetchOutcome {
    let payload: WeatherPayload = serde_json::from_str(
        r#"{
            "hourly": {
                "time": ["2025-11-04T23:00", "2025-11-05T00:00", "2025-11-05T01:00", "2025-11-06T00:00"],
                "temperature_2m": [20.5, 19.8, 19.1, 22.0],
                "relative_humidity_2m": [81, 84, 86, 70],
                "precipitation": [0.0, 0.2, null, 0.0],
                "wind_speed_10m": [7.2, 6.8, 6.1, 9.0]
            }
        }"#,
    )
    .unwrap();
    FetchOutcome::Payload(payload)
}

pub fn transient_error() -> FetchError {
    FetchError::Status {
        status: 503,
        body: "service unavailable".into(),
    }
}
