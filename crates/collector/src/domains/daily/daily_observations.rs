use arrow::{array::RecordBatch, error::ArrowError};
use serde::Deserialize;

use super::super::{measurements, repeated_float, repeated_text, FieldMap, Measure};
use crate::{build_batch, empty_batch, text_array, Columns, Municipality};

/*
Daily variables requested from the archive endpoint, see
https://open-meteo.com/en/docs/historical-weather-api

temperature_2m_max / _min            -> temp_max_c / temp_min_c
apparent_temperature_max / _min      -> sensacao_termica_max_c / _min_c
precipitation_sum, rain_sum          -> precipitacao_total_mm, chuva_mm
snowfall_sum                         -> neve_mm
windspeed_10m_max, windgusts_10m_max -> vento_velocidade_max_kmh, rajadas_vento_max_kmh
winddirection_10m_dominant           -> vento_direcao_dominante_graus
shortwave_radiation_sum              -> radiacao_solar_mj_m2
weathercode                          -> codigo_tempo_wmo
*/
pub const DAILY_FIELDS: FieldMap = &[
    ("temperature_2m_max", "temp_max_c", Measure::Float),
    ("temperature_2m_min", "temp_min_c", Measure::Float),
    ("apparent_temperature_max", "sensacao_termica_max_c", Measure::Float),
    ("apparent_temperature_min", "sensacao_termica_min_c", Measure::Float),
    ("precipitation_sum", "precipitacao_total_mm", Measure::Float),
    ("rain_sum", "chuva_mm", Measure::Float),
    ("snowfall_sum", "neve_mm", Measure::Float),
    ("windspeed_10m_max", "vento_velocidade_max_kmh", Measure::Float),
    ("windgusts_10m_max", "rajadas_vento_max_kmh", Measure::Float),
    ("winddirection_10m_dominant", "vento_direcao_dominante_graus", Measure::Int),
    ("shortwave_radiation_sum", "radiacao_solar_mj_m2", Measure::Float),
    ("weathercode", "codigo_tempo_wmo", Measure::Int),
];

pub const DAILY_COLUMNS: &[&str] = &[
    "data",
    "temp_max_c",
    "temp_min_c",
    "sensacao_termica_max_c",
    "sensacao_termica_min_c",
    "precipitacao_total_mm",
    "chuva_mm",
    "neve_mm",
    "vento_velocidade_max_kmh",
    "rajadas_vento_max_kmh",
    "vento_direcao_dominante_graus",
    "radiacao_solar_mj_m2",
    "codigo_tempo_wmo",
    "codigo_ibge",
    "nome",
    "nome_uf",
    "latitude",
    "longitude",
];

/// The `daily` object of an upstream response: parallel arrays keyed by
/// variable. Variables the upstream left out stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DailySeries {
    #[serde(default)]
    pub time: Vec<String>,
    pub temperature_2m_max: Option<Vec<Option<f64>>>,
    pub temperature_2m_min: Option<Vec<Option<f64>>>,
    pub apparent_temperature_max: Option<Vec<Option<f64>>>,
    pub apparent_temperature_min: Option<Vec<Option<f64>>>,
    pub precipitation_sum: Option<Vec<Option<f64>>>,
    pub rain_sum: Option<Vec<Option<f64>>>,
    pub snowfall_sum: Option<Vec<Option<f64>>>,
    pub windspeed_10m_max: Option<Vec<Option<f64>>>,
    pub windgusts_10m_max: Option<Vec<Option<f64>>>,
    pub winddirection_10m_dominant: Option<Vec<Option<f64>>>,
    pub shortwave_radiation_sum: Option<Vec<Option<f64>>>,
    pub weathercode: Option<Vec<Option<f64>>>,
}

impl DailySeries {
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn values(&self, variable: &str) -> Option<&[Option<f64>]> {
        let series = match variable {
            "temperature_2m_max" => &self.temperature_2m_max,
            "temperature_2m_min" => &self.temperature_2m_min,
            "apparent_temperature_max" => &self.apparent_temperature_max,
            "apparent_temperature_min" => &self.apparent_temperature_min,
            "precipitation_sum" => &self.precipitation_sum,
            "rain_sum" => &self.rain_sum,
            "snowfall_sum" => &self.snowfall_sum,
            "windspeed_10m_max" => &self.windspeed_10m_max,
            "windgusts_10m_max" => &self.windgusts_10m_max,
            "winddirection_10m_dominant" => &self.winddirection_10m_dominant,
            "shortwave_radiation_sum" => &self.shortwave_radiation_sum,
            "weathercode" => &self.weathercode,
            _ => return None,
        };
        series.as_deref()
    }
}

/// One row per day: the date, the measurements present upstream, then the
/// municipality columns.
pub fn normalize_daily(
    series: &DailySeries,
    municipality: &Municipality,
) -> Result<RecordBatch, ArrowError> {
    let rows = series.time.len();
    if rows == 0 {
        return Ok(empty_batch());
    }

    let mut columns: Columns = vec![(
        "data",
        text_array(series.time.iter().cloned().map(Some).collect(), rows),
    )];
    columns.extend(measurements(DAILY_FIELDS, rows, |variable| series.values(variable)));
    columns.extend([
        ("codigo_ibge", repeated_text(&municipality.id, rows)),
        ("nome", repeated_text(&municipality.name, rows)),
        ("nome_uf", repeated_text(&municipality.region, rows)),
        ("latitude", repeated_float(municipality.latitude, rows)),
        ("longitude", repeated_float(municipality.longitude, rows)),
    ]);
    build_batch(rows, columns)
}
