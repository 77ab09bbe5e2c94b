//! Periodic analytics writes from a live detection session

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use cctv_core::models::{NewAnalyticsRecord, SessionCounters};
use cctv_core::repository::AnalyticsRepository;

/// Writes one analytics record per label at most once per interval
pub struct AnalyticsReporter {
    repo: Arc<dyn AnalyticsRepository>,
    area_name: String,
    interval: Duration,
    last_report: Instant,
}

impl AnalyticsReporter {
    pub fn new(
        repo: Arc<dyn AnalyticsRepository>,
        area_name: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            repo,
            area_name: area_name.into(),
            interval,
            last_report: Instant::now(),
        }
    }

    #[must_use]
    pub fn is_due(&self) -> bool {
        self.last_report.elapsed() >= self.interval
    }

    /// Write `counters` if the interval has elapsed; returns records written
    pub async fn maybe_report(&mut self, counters: &SessionCounters) -> usize {
        if !self.is_due() {
            return 0;
        }
        self.last_report = Instant::now();

        let mut written = 0;
        for (label, count) in counters.iter() {
            let record = NewAnalyticsRecord {
                object_type: label.to_string(),
                count: i32::try_from(count).unwrap_or(i32::MAX),
                area_name: self.area_name.clone(),
            };
            match self.repo.create(&record).await {
                Ok(_) => written += 1,
                Err(e) => {
                    warn!(area = %self.area_name, label, error = %e, "Failed to write analytics record");
                }
            }
        }
        debug!(area = %self.area_name, written, "Analytics reported");
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cctv_core::models::{AnalyticsQuery, DetectionEvent};
    use cctv_core::repository::MemoryAnalyticsRepository;

    #[tokio::test(start_paused = true)]
    async fn test_reports_once_per_interval() {
        let repo = Arc::new(MemoryAnalyticsRepository::new());
        let mut reporter =
            AnalyticsReporter::new(repo.clone(), "Simpang Lima", Duration::from_secs(5));

        let counters = SessionCounters::tally(&[
            DetectionEvent::new("car", 0.9, [0.0; 4], 1, 0.0),
            DetectionEvent::new("car", 0.9, [0.0; 4], 1, 0.0),
            DetectionEvent::new("person", 0.9, [0.0; 4], 0, 0.0),
        ]);

        assert_eq!(reporter.maybe_report(&counters).await, 0);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(reporter.maybe_report(&counters).await, 2);
        assert_eq!(reporter.maybe_report(&counters).await, 0);

        let records = repo.list(AnalyticsQuery::default()).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.area_name == "Simpang Lima"));
        let car = records.iter().find(|r| r.object_type == "car").unwrap();
        assert_eq!(car.count, 2);
    }
}
