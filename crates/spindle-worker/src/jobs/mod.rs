//! Worker payloads
//!
//! - `series`: a CPU-bound loop that only stops when cancelled
//! - `survey`: a directory walk and content hash that runs to completion

pub mod series;
pub mod survey;

pub use series::{SeriesResult, SeriesWorker};
pub use survey::{SurveyResult, SurveyWorker};

/// Name of the cancellable series worker
pub const SERIES_WORKER: &str = "series-worker";

/// Name of the directory survey worker
pub const SURVEY_WORKER: &str = "survey-worker";

/// Serde adapter writing a `Duration` as fractional seconds
pub(crate) mod seconds {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
