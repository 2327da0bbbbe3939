use clima_core::path_exists;
use serde::Deserialize;
use std::{fmt, path::Path};

/// A municipality from the catalog, the unit over which weather is sampled.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Municipality {
    #[serde(rename = "codigo_ibge")]
    pub id: String,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "nome_uf")]
    pub region: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl fmt::Display for Municipality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) [{}]", self.name, self.region, self.id)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("municipality catalog not found: {0}")]
    NotFound(String),
    #[error("failed to read municipality catalog {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("municipality catalog {0} has no rows")]
    Empty(String),
}

pub const CATALOG_DELIMITER: u8 = b';';

/// Reads the delimited municipality list. Extra columns are ignored; a
/// missing file, a bad row or an empty list aborts the run.
pub fn load_municipalities(
    path: &Path,
    delimiter: u8,
) -> Result<Vec<Municipality>, CatalogError> {
    let display = path.display().to_string();
    if !path_exists(path) {
        return Err(CatalogError::NotFound(display));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| CatalogError::Read {
            path: display.clone(),
            source,
        })?;

    let municipalities = reader
        .deserialize::<Municipality>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| CatalogError::Read {
            path: display.clone(),
            source,
        })?;

    if municipalities.is_empty() {
        return Err(CatalogError::Empty(display));
    }
    Ok(municipalities)
}

/// Keeps the municipalities whose region matches one of `regions`
/// (case-insensitive). An empty filter keeps everything.
pub fn filter_regions(municipalities: Vec<Municipality>, regions: &[String]) -> Vec<Municipality> {
    if regions.is_empty() {
        return municipalities;
    }
    let wanted: Vec<String> = regions.iter().map(|r| r.trim().to_lowercase()).collect();
    municipalities
        .into_iter()
        .filter(|m| wanted.contains(&m.region.trim().to_lowercase()))
        .collect()
}
