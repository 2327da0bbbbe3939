mod daily_observations;

pub use daily_observations::*;
