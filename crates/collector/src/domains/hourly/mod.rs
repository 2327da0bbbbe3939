mod hourly_observations;

pub use hourly_observations::*;
