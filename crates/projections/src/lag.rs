//! Staleness of the read models.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::Result;
use crate::store::ReadModelStore;

/// How far the read models trail the write side.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LagReport {
    /// Newest event timestamp applied, if any event was applied yet.
    pub watermark: Option<DateTime<Utc>>,
    /// `as_of - watermark` in seconds, never negative.
    pub lag_seconds: Option<f64>,
    pub as_of: DateTime<Utc>,
}

impl LagReport {
    /// Builds a report for a given watermark and clock reading.
    pub fn at(watermark: Option<DateTime<Utc>>, as_of: DateTime<Utc>) -> Self {
        let lag_seconds = watermark.map(|w| {
            let millis = (as_of - w).num_milliseconds().max(0);
            millis as f64 / 1000.0
        });
        Self {
            watermark,
            lag_seconds,
            as_of,
        }
    }
}

/// Read-only view over the projector's watermark.
#[derive(Debug, Clone)]
pub struct LagReporter<R> {
    store: R,
}

impl<R: ReadModelStore> LagReporter<R> {
    pub fn new(store: R) -> Self {
        Self { store }
    }

    /// Reads the watermark and reports lag against the current time.
    ///
    /// Also publishes the `projection_lag_seconds` gauge.
    pub async fn report(&self) -> Result<LagReport> {
        let report = LagReport::at(self.store.watermark().await?, Utc::now());
        if let Some(lag) = report.lag_seconds {
            metrics::gauge!("projection_lag_seconds").set(lag);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::InMemoryReadModels;

    #[test]
    fn lag_is_distance_to_watermark() {
        let now = Utc::now();
        let report = LagReport::at(Some(now - TimeDelta::milliseconds(2500)), now);
        assert_eq!(report.lag_seconds, Some(2.5));
    }

    #[test]
    fn watermark_ahead_of_clock_is_zero_lag() {
        let now = Utc::now();
        let report = LagReport::at(Some(now + TimeDelta::seconds(5)), now);
        assert_eq!(report.lag_seconds, Some(0.0));
    }

    #[tokio::test]
    async fn no_watermark_reports_unknown_lag() {
        let reporter = LagReporter::new(InMemoryReadModels::new());
        let report = reporter.report().await.unwrap();

        assert!(report.watermark.is_none());
        assert!(report.lag_seconds.is_none());

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["lagSeconds"].is_null());
        assert!(json["asOf"].is_string());
    }
}
