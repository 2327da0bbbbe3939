mod daily;
mod hourly;

pub use daily::*;
pub use hourly::*;

use arrow::{
    array::{ArrayRef, Float64Array, RecordBatch, StringArray},
    error::ArrowError,
};
use std::{fmt, sync::Arc};

use crate::{empty_batch, float_array, int_array, Columns, Municipality, WeatherPayload};

/// Collection mode of one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Daily,
    Hourly,
}

impl Granularity {
    /// Key of the series object in the upstream response and query.
    pub fn api_key(&self) -> &'static str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Hourly => "hourly",
        }
    }

    /// Local folder and object-storage category.
    pub fn category(&self) -> &'static str {
        match self {
            Granularity::Daily => "diario",
            Granularity::Hourly => "horario",
        }
    }

    pub fn file_stem(&self) -> &'static str {
        match self {
            Granularity::Daily => "dados_climaticos_diarios",
            Granularity::Hourly => "dados_climaticos_horarios",
        }
    }

    /// Upstream variables requested for this granularity.
    pub fn variables(&self) -> Vec<&'static str> {
        let fields = match self {
            Granularity::Daily => DAILY_FIELDS,
            Granularity::Hourly => HOURLY_FIELDS,
        };
        fields.iter().map(|(upstream, _, _)| *upstream).collect()
    }

    /// Canonical output columns, in order.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Granularity::Daily => DAILY_COLUMNS,
            Granularity::Hourly => HOURLY_COLUMNS,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_key())
    }
}

/// Physical type of a measurement column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Float,
    Int,
}

/// `(upstream variable, output column, type)`: the rename map and column
/// order for the measurements of one granularity.
pub type FieldMap = &'static [(&'static str, &'static str, Measure)];

/// Turns the typed series for `granularity` into output rows for one
/// municipality. A payload without that series yields an empty batch.
pub fn normalize(
    payload: &WeatherPayload,
    municipality: &Municipality,
    granularity: Granularity,
) -> Result<RecordBatch, ArrowError> {
    match granularity {
        Granularity::Daily => match &payload.daily {
            Some(series) => normalize_daily(series, municipality),
            None => Ok(empty_batch()),
        },
        Granularity::Hourly => match &payload.hourly {
            Some(series) => normalize_hourly(series, municipality),
            None => Ok(empty_batch()),
        },
    }
}

/// Renamed measurement columns present upstream, in field-map order.
fn measurements<'a>(
    fields: FieldMap,
    rows: usize,
    lookup: impl Fn(&str) -> Option<&'a [Option<f64>]>,
) -> Columns {
    fields
        .iter()
        .filter_map(|&(upstream, column, measure)| {
            let values = lookup(upstream)?;
            let array = match measure {
                Measure::Float => float_array(values.to_vec(), rows),
                Measure::Int => int_array(
                    values.iter().map(|v| v.map(|v| v.round() as i64)).collect(),
                    rows,
                ),
            };
            Some((column, array))
        })
        .collect()
}

fn repeated_text(value: &str, rows: usize) -> ArrayRef {
    Arc::new(StringArray::from(vec![value; rows]))
}

fn repeated_float(value: f64, rows: usize) -> ArrayRef {
    Arc::new(Float64Array::from(vec![value; rows]))
}
