//! Measurement query API
//!
//! `GET status/<family>.json` returns every reading of the requested tags in
//! a date range as flat `{date, tag, model, keydata}` lines.

use crate::aggregate::TaggedMeasurement;
use crate::error::{SyncError, SyncResult};
use crate::schema::MetricFamily;
use crate::session::{AccessToken, SessionTransport};
use crate::sync::{MeasurementSource, TimeWindow};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Deserialize;

/// Date format of `from` / `to` query parameters
pub const QUERY_DATE_FORMAT: &str = "%Y%m%d%H%M%S";
/// Date format of `date` in response lines
pub const RECORD_DATE_FORMAT: &str = "%Y%m%d%H%M";

/// `date=1`: filter on measured time; `0` would filter on upload time
const MEASURED_TIME_MODE: &str = "1";

#[derive(Debug, Deserialize)]
struct StatusResponse {
    data: Vec<StatusRecord>,
}

#[derive(Debug, Deserialize)]
struct StatusRecord {
    date: String,
    tag: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    keydata: Option<String>,
}

/// Authenticated client for one metric family's query endpoint
pub struct HealthPlanetApi<T: SessionTransport> {
    transport: T,
    token: AccessToken,
    family: MetricFamily,
}

impl<T: SessionTransport> HealthPlanetApi<T> {
    pub fn new(transport: T, token: AccessToken, family: MetricFamily) -> Self {
        Self {
            transport,
            token,
            family,
        }
    }
}

#[async_trait]
impl<T: SessionTransport> MeasurementSource for HealthPlanetApi<T> {
    fn family(&self) -> MetricFamily {
        self.family
    }

    async fn fetch(&self, window: &TimeWindow) -> SyncResult<Vec<TaggedMeasurement>> {
        let from = window.from.format(QUERY_DATE_FORMAT).to_string();
        let to = window.to.format(QUERY_DATE_FORMAT).to_string();
        let tags = self.family.tag_query();
        let query = [
            ("access_token", self.token.as_str()),
            ("date", MEASURED_TIME_MODE),
            ("from", from.as_str()),
            ("to", to.as_str()),
            ("tag", tags.as_str()),
        ];

        let response = self.transport.get(self.family.endpoint(), &query).await?;
        if !response.is_success() {
            return Err(SyncError::Transport(format!(
                "{} returned HTTP {}: {}",
                self.family.endpoint(),
                response.status,
                response.body_snippet()
            )));
        }

        decode_measurements(&response.body)
    }
}

/// Decode a status payload into measurements
pub fn decode_measurements(body: &[u8]) -> SyncResult<Vec<TaggedMeasurement>> {
    let payload: StatusResponse = serde_json::from_slice(body)?;

    payload
        .data
        .into_iter()
        .map(|record| {
            let timestamp = NaiveDateTime::parse_from_str(&record.date, RECORD_DATE_FORMAT)
                .map_err(|e| {
                    SyncError::Decode(format!("invalid record date {:?}: {}", record.date, e))
                })?;
            Ok(TaggedMeasurement {
                timestamp,
                tag: record.tag,
                model: record.model,
                value: record.keydata.unwrap_or_default(),
            })
        })
        .collect()
}
