use arrow::{array::RecordBatch, error::ArrowError};
use chrono::NaiveDate;
use serde::Deserialize;

use super::super::{measurements, repeated_float, repeated_text, FieldMap, Measure};
use crate::{build_batch, empty_batch, text_array, Columns, Municipality};

pub const HOURLY_FIELDS: FieldMap = &[
    ("temperature_2m", "temperatura_c", Measure::Float),
    ("relative_humidity_2m", "umidade_relativa", Measure::Float),
    ("precipitation", "precipitacao_mm", Measure::Float),
    ("wind_speed_10m", "velocidade_vento_ms", Measure::Float),
];

pub const HOURLY_COLUMNS: &[&str] = &[
    "data_hora",
    "municipio",
    "uf",
    "latitude",
    "longitude",
    "temperatura_c",
    "umidade_relativa",
    "precipitacao_mm",
    "velocidade_vento_ms",
];

/// The `hourly` object of an upstream response. Timestamps are local to the
/// requested timezone, formatted `YYYY-MM-DDTHH:MM`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HourlySeries {
    #[serde(default)]
    pub time: Vec<String>,
    pub temperature_2m: Option<Vec<Option<f64>>>,
    pub relative_humidity_2m: Option<Vec<Option<f64>>>,
    pub precipitation: Option<Vec<Option<f64>>>,
    pub wind_speed_10m: Option<Vec<Option<f64>>>,
}

impl HourlySeries {
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn values(&self, variable: &str) -> Option<&[Option<f64>]> {
        let series = match variable {
            "temperature_2m" => &self.temperature_2m,
            "relative_humidity_2m" => &self.relative_humidity_2m,
            "precipitation" => &self.precipitation,
            "wind_speed_10m" => &self.wind_speed_10m,
            _ => return None,
        };
        series.as_deref()
    }

    /// Keeps only the hours whose timestamp starts with `date`.
    pub fn retain_date(&self, date: NaiveDate) -> HourlySeries {
        let prefix = date.format("%Y-%m-%d").to_string();
        let keep: Vec<usize> = self
            .time
            .iter()
            .enumerate()
            .filter(|(_, time)| time.starts_with(&prefix))
            .map(|(index, _)| index)
            .collect();

        let pick = |series: &Option<Vec<Option<f64>>>| {
            series
                .as_ref()
                .map(|values| keep.iter().map(|&i| values.get(i).copied().flatten()).collect())
        };

        HourlySeries {
            time: keep.iter().map(|&i| self.time[i].clone()).collect(),
            temperature_2m: pick(&self.temperature_2m),
            relative_humidity_2m: pick(&self.relative_humidity_2m),
            precipitation: pick(&self.precipitation),
            wind_speed_10m: pick(&self.wind_speed_10m),
        }
    }
}

/// One row per hour: timestamp, municipality columns, then the
/// measurements present upstream.
pub fn normalize_hourly(
    series: &HourlySeries,
    municipality: &Municipality,
) -> Result<RecordBatch, ArrowError> {
    let rows = series.time.len();
    if rows == 0 {
        return Ok(empty_batch());
    }

    let mut columns: Columns = vec![
        (
            "data_hora",
            text_array(series.time.iter().cloned().map(Some).collect(), rows),
        ),
        ("municipio", repeated_text(&municipality.name, rows)),
        ("uf", repeated_text(&municipality.region, rows)),
        ("latitude", repeated_float(municipality.latitude, rows)),
        ("longitude", repeated_float(municipality.longitude, rows)),
    ];
    columns.extend(measurements(HOURLY_FIELDS, rows, |variable| series.values(variable)));
    build_batch(rows, columns)
}
