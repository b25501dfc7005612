//! OSRM HTTP adapter for distance matrices.
//!
//! Talks to an already-running `osrm-routed` instance. Failures never
//! surface as errors to the engine: unroutable cells and transport errors
//! become [`Distance::UNREACHABLE`].

use std::fmt;

use serde::Deserialize;

use crate::model::Location;
use crate::traits::{Distance, DistanceMatrixProvider};

#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "car".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug)]
pub enum OsrmError {
    Http(reqwest::Error),
    /// The server answered but with a non-`Ok` code.
    Service(String),
}

impl fmt::Display for OsrmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OsrmError::Http(err) => write!(f, "osrm request failed: {err}"),
            OsrmError::Service(code) => write!(f, "osrm returned {code}"),
        }
    }
}

impl std::error::Error for OsrmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OsrmError::Http(err) => Some(err),
            OsrmError::Service(_) => None,
        }
    }
}

impl From<reqwest::Error> for OsrmError {
    fn from(err: reqwest::Error) -> Self {
        OsrmError::Http(err)
    }
}

#[derive(Debug, Clone)]
pub struct OsrmClient {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmClient {
    pub fn new(config: OsrmConfig) -> Result<Self, OsrmError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn table_url(&self, locations: &[Location]) -> String {
        let coords = locations
            .iter()
            .map(|location| format!("{:.6},{:.6}", location.longitude(), location.latitude()))
            .collect::<Vec<_>>()
            .join(";");

        format!(
            "{}/table/v1/{}/{}?annotations=duration,distance",
            self.config.base_url, self.config.profile, coords
        )
    }

    /// Fetches the table, surfacing transport and service errors.
    pub fn try_matrix_for(&self, locations: &[Location]) -> Result<Vec<Vec<Distance>>, OsrmError> {
        if locations.is_empty() {
            return Ok(Vec::new());
        }

        let body = self
            .client
            .get(self.table_url(locations))
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<OsrmTableResponse>())?;

        body.into_matrix(locations.len())
    }
}

impl DistanceMatrixProvider for OsrmClient {
    fn matrix_for(&self, locations: &[Location]) -> Vec<Vec<Distance>> {
        match self.try_matrix_for(locations) {
            Ok(matrix) => matrix,
            Err(err) => {
                tracing::warn!(error = %err, locations = locations.len(), "osrm table unavailable");
                vec![vec![Distance::UNREACHABLE; locations.len()]; locations.len()]
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OsrmTableResponse {
    code: String,
    durations: Option<Vec<Vec<Option<f64>>>>,
    distances: Option<Vec<Vec<Option<f64>>>>,
}

impl OsrmTableResponse {
    pub(crate) fn into_matrix(self, n: usize) -> Result<Vec<Vec<Distance>>, OsrmError> {
        if self.code != "Ok" {
            return Err(OsrmError::Service(self.code));
        }
        let durations = self.durations.unwrap_or_default();
        let distances = self.distances.unwrap_or_default();

        let cell = |table: &[Vec<Option<f64>>], i: usize, j: usize| {
            table
                .get(i)
                .and_then(|row| row.get(j))
                .copied()
                .flatten()
                .map(|value| value.round() as u64)
        };

        let matrix = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| match (cell(&distances, i, j), cell(&durations, i, j)) {
                        (Some(meters), Some(seconds)) => Distance::new(meters, seconds),
                        _ => Distance::UNREACHABLE,
                    })
                    .collect()
            })
            .collect();
        Ok(matrix)
    }
}
