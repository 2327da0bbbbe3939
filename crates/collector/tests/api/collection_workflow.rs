use crate::helpers::{
    date, mock_daily_payload, mock_recent_hourly_payload, spawn_collector, spawn_collector_with,
    today, transient_error, MockWeatherAccess,
};
use arrow::{
    array::{Array, AsArray},
    datatypes::Float64Type,
};
use collector::{
    partition_path, pending_dates, read_partition, Endpoint, FetchOutcome, Granularity,
    QueryWindow, SqliteTarget,
};
use sqlx::{sqlite::SqlitePoolOptions, Row};

const RIO_LATITUDE: f64 = -22.9129;

fn range_day(window: &QueryWindow) -> String {
    match window {
        QueryWindow::Range { start, .. } => start.format("%Y-%m-%d").to_string(),
        QueryWindow::PastDays(_) => panic!("archive queries use an explicit range"),
    }
}

#[tokio::test]
async fn partial_failure_still_writes_and_advances() {
    let mut weather_data = MockWeatherAccess::new();
    // every attempt for Rio fails, 3 per retry budget and granularity
    weather_data
        .expect_fetch()
        .withf(|_, query| query.latitude == RIO_LATITUDE)
        .times(6)
        .returning(|_, _| Err(transient_error()));
    weather_data
        .expect_fetch()
        .withf(|_, query| {
            query.latitude != RIO_LATITUDE && query.granularity == Granularity::Daily
        })
        .times(2)
        .returning(|_, query| Ok(mock_daily_payload(query, &range_day(&query.window))));
    weather_data
        .expect_fetch()
        .withf(|endpoint, query| {
            query.latitude != RIO_LATITUDE
                && query.granularity == Granularity::Hourly
                && *endpoint == Endpoint::Archive
        })
        .times(2)
        .returning(|_, _| Ok(FetchOutcome::Empty));
    weather_data
        .expect_fetch()
        .withf(|endpoint, query| {
            query.latitude != RIO_LATITUDE && *endpoint == Endpoint::Forecast
        })
        .times(2)
        .returning(|_, _| Ok(mock_recent_hourly_payload()));

    let test_app = spawn_collector(weather_data);
    let summary = test_app
        .collector
        .run(
            &[date(5)],
            &[Granularity::Daily, Granularity::Hourly],
            Some(&test_app.watermark),
        )
        .await
        .unwrap();

    assert_eq!(summary.partitions.len(), 2);
    assert_eq!(summary.partitions[0].rows, 2);
    assert_eq!(summary.partitions[0].failures, 1);
    assert_eq!(summary.partitions[1].failures, 1);
    assert_eq!(test_app.watermark.load(), Some(date(5)));

    let path = partition_path(&test_app.data_dir(), Granularity::Daily, date(5));
    assert_eq!(summary.partitions[0].local_path.as_deref(), Some(path.as_path()));
    let batches = read_partition(&path).unwrap();
    let batch = &batches[0];
    assert_eq!(batch.num_rows(), 2);
    assert_eq!(batch.num_columns(), 18);

    let names = batch.column_by_name("nome").unwrap().as_string::<i32>();
    assert_eq!(names.value(0), "São Paulo");
    assert_eq!(names.value(1), "Belo Horizonte");
    let dates = batch.column_by_name("data").unwrap().as_string::<i32>();
    assert_eq!(dates.value(0), "2025-11-05");
}

#[tokio::test]
async fn total_failure_writes_nothing_but_moves_past_the_date() {
    let mut weather_data = MockWeatherAccess::new();
    weather_data
        .expect_fetch()
        .returning(|_, _| Err(transient_error()));

    let test_app = spawn_collector(weather_data);
    test_app.watermark.save(date(3)).unwrap();

    let dates = pending_dates(test_app.watermark.load(), today());
    let summary = test_app
        .collector
        .run(
            &dates,
            &[Granularity::Daily, Granularity::Hourly],
            Some(&test_app.watermark),
        )
        .await
        .unwrap();

    assert_eq!(summary.partitions.len(), 4);
    assert!(summary.written().is_empty());
    assert_eq!(summary.total_failures(), 12);
    assert!(!test_app.data_dir().join("raw").exists());
    assert_eq!(test_app.watermark.load(), Some(date(5)));
}

#[tokio::test]
async fn rerunning_a_date_produces_identical_partitions() {
    let weather = || {
        let mut weather_data = MockWeatherAccess::new();
        weather_data
            .expect_fetch()
            .returning(|_, query| Ok(mock_daily_payload(query, &range_day(&query.window))));
        weather_data
    };

    let test_app = spawn_collector(weather());
    let path = partition_path(&test_app.data_dir(), Granularity::Daily, date(5));

    test_app
        .collector
        .run(&[date(5)], &[Granularity::Daily], None)
        .await
        .unwrap();
    let first = std::fs::read(&path).unwrap();

    test_app
        .collector
        .run(&[date(5)], &[Granularity::Daily], None)
        .await
        .unwrap();
    let second = std::fs::read(&path).unwrap();
    assert_eq!(first, second);

    let other_app = spawn_collector(weather());
    other_app
        .collector
        .run(&[date(5)], &[Granularity::Daily], None)
        .await
        .unwrap();
    let third =
        std::fs::read(partition_path(&other_app.data_dir(), Granularity::Daily, date(5))).unwrap();
    assert_eq!(first, third);

    // explicit runs never touch the watermark
    assert_eq!(test_app.watermark.load(), None);
}

#[tokio::test]
async fn empty_hourly_archive_is_filled_from_the_recent_window() {
    let mut weather_data = MockWeatherAccess::new();
    weather_data
        .expect_fetch()
        .withf(|endpoint, _| *endpoint == Endpoint::Archive)
        .times(3)
        .returning(|_, _| Ok(FetchOutcome::Empty));
    weather_data
        .expect_fetch()
        .withf(|endpoint, query| {
            *endpoint == Endpoint::Forecast && query.window == QueryWindow::PastDays(1)
        })
        .times(3)
        .returning(|_, _| Ok(mock_recent_hourly_payload()));

    let test_app = spawn_collector(weather_data);
    let summary = test_app
        .collector
        .run(&[date(5)], &[Granularity::Hourly], Some(&test_app.watermark))
        .await
        .unwrap();

    assert_eq!(summary.partitions[0].rows, 6);
    assert_eq!(summary.partitions[0].failures, 0);

    let path = partition_path(&test_app.data_dir(), Granularity::Hourly, date(5));
    let batches = read_partition(&path).unwrap();
    let batch = &batches[0];
    let names: Vec<String> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    assert_eq!(
        names,
        vec![
            "data_hora",
            "municipio",
            "uf",
            "latitude",
            "longitude",
            "temperatura_c",
            "umidade_relativa",
            "precipitacao_mm",
            "velocidade_vento_ms"
        ]
    );

    let hours = batch.column_by_name("data_hora").unwrap().as_string::<i32>();
    assert!((0..hours.len()).all(|i| hours.value(i).starts_with("2025-11-05")));
    let rain = batch
        .column_by_name("precipitacao_mm")
        .unwrap()
        .as_primitive::<Float64Type>();
    assert_eq!(rain.value(0), 0.2);
    assert!(rain.is_null(1));
}

#[tokio::test]
async fn daily_only_run_keeps_hourly_pending() {
    let mut weather_data = MockWeatherAccess::new();
    weather_data
        .expect_fetch()
        .withf(|_, query| query.granularity == Granularity::Daily)
        .returning(|_, query| Ok(mock_daily_payload(query, &range_day(&query.window))));
    weather_data
        .expect_fetch()
        .withf(|endpoint, query| {
            query.granularity == Granularity::Hourly && *endpoint == Endpoint::Archive
        })
        .returning(|_, _| Ok(FetchOutcome::Empty));
    weather_data
        .expect_fetch()
        .withf(|endpoint, _| *endpoint == Endpoint::Forecast)
        .returning(|_, _| Ok(mock_recent_hourly_payload()));

    let test_app = spawn_collector(weather_data);
    test_app.watermark.save(date(4)).unwrap();
    let hourly_path = partition_path(&test_app.data_dir(), Granularity::Hourly, date(5));

    let dates = pending_dates(test_app.watermark.load(), today());
    assert_eq!(dates, vec![date(5)]);
    let summary = test_app
        .collector
        .run(&dates, &[Granularity::Daily], Some(&test_app.watermark))
        .await
        .unwrap();

    assert_eq!(summary.written().len(), 1);
    assert_eq!(summary.watermark, None);
    assert_eq!(test_app.watermark.load(), Some(date(4)));
    assert!(!hourly_path.exists());
    // the date is still pending, so a full run picks hourly up
    assert_eq!(pending_dates(test_app.watermark.load(), today()), vec![date(5)]);

    let summary = test_app
        .collector
        .run(
            &dates,
            &[Granularity::Daily, Granularity::Hourly],
            Some(&test_app.watermark),
        )
        .await
        .unwrap();

    assert_eq!(summary.partitions[1].rows, 6);
    assert!(hourly_path.exists());
    assert_eq!(summary.watermark, Some(date(5)));
    assert!(pending_dates(test_app.watermark.load(), today()).is_empty());
}

#[tokio::test]
async fn caught_up_watermark_means_no_fetches() {
    let mut weather_data = MockWeatherAccess::new();
    weather_data.expect_fetch().never();

    let test_app = spawn_collector(weather_data);
    test_app.watermark.save(date(5)).unwrap();

    let dates = pending_dates(test_app.watermark.load(), today());
    assert!(dates.is_empty());

    let summary = test_app
        .collector
        .run(
            &dates,
            &[Granularity::Daily, Granularity::Hourly],
            Some(&test_app.watermark),
        )
        .await
        .unwrap();
    assert!(summary.partitions.is_empty());
    assert_eq!(summary.watermark, None);
    assert_eq!(test_app.watermark.load(), Some(date(5)));
}

#[tokio::test]
async fn partitions_are_appended_to_sqlite_per_category() {
    let mut weather_data = MockWeatherAccess::new();
    weather_data
        .expect_fetch()
        .withf(|_, query| query.granularity == Granularity::Daily)
        .returning(|_, query| Ok(mock_daily_payload(query, &range_day(&query.window))));
    weather_data
        .expect_fetch()
        .withf(|endpoint, query| {
            query.granularity == Granularity::Hourly && *endpoint == Endpoint::Archive
        })
        .returning(|_, _| Ok(FetchOutcome::Empty));
    weather_data
        .expect_fetch()
        .withf(|endpoint, _| *endpoint == Endpoint::Forecast)
        .returning(|_, _| Ok(mock_recent_hourly_payload()));

    let db_dir = tempfile::tempdir().unwrap();
    let db_path = db_dir.path().join("sqlite").join("clima.db");
    let target = SqliteTarget {
        path: db_path.clone(),
        table_prefix: "clima_raw".into(),
    };
    let test_app = spawn_collector_with(weather_data, |mut sinks| {
        sinks.sqlite = Some(target);
        sinks
    });

    let summary = test_app
        .collector
        .run(
            &[date(5)],
            &[Granularity::Daily, Granularity::Hourly],
            Some(&test_app.watermark),
        )
        .await
        .unwrap();
    assert_eq!(summary.partitions[0].appended, Some(3));
    assert_eq!(summary.partitions[1].appended, Some(6));

    let pool = SqlitePoolOptions::new()
        .connect(&format!("sqlite://{}", db_path.display()))
        .await
        .unwrap();
    let daily = sqlx::query("SELECT nome, codigo_tempo_wmo FROM clima_raw_diario ORDER BY rowid")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(daily.len(), 3);
    assert_eq!(daily[0].get::<String, _>("nome"), "São Paulo");
    assert_eq!(daily[0].get::<i64, _>("codigo_tempo_wmo"), 61);

    let hourly: i64 = sqlx::query("SELECT COUNT(*) FROM clima_raw_horario")
        .fetch_one(&pool)
        .await
        .unwrap()
        .get(0);
    assert_eq!(hourly, 6);
}
