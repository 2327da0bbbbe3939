mod collector;
mod coordinates;
mod dataset;
mod domains;
mod fetcher;
mod open_meteo;
mod parquet_handler;
mod pending_dates;
mod s3_storage;
mod sqlite_sink;
mod utils;
mod watermark;

pub use collector::*;
pub use coordinates::*;
pub use dataset::*;
pub use domains::*;
pub use fetcher::*;
pub use open_meteo::*;
pub use parquet_handler::*;
pub use pending_dates::*;
pub use s3_storage::*;
pub use sqlite_sink::*;
pub use utils::*;
pub use watermark::*;
