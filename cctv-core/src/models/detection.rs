use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Display colors handed out by `class_id % PALETTE.len()`
pub const PALETTE: [&str; 10] = [
    "#FF0000", "#00FF00", "#0000FF", "#FFFF00", "#FF00FF", "#00FFFF", "#FF8000", "#8000FF",
    "#008000", "#800080",
];

/// Deterministic display color for a class id
#[must_use]
pub fn class_color(class_id: u32) -> &'static str {
    PALETTE[class_id as usize % PALETTE.len()]
}

/// Current wall-clock time as fractional unix seconds
#[must_use]
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}

/// One labeled box found in a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub label: String,
    /// Percentage, 0-100, two decimals
    pub confidence: f64,
    /// `[x, y, width, height]`
    pub bbox: [f64; 4],
    pub class_id: u32,
    pub timestamp: f64,
    pub color: String,
}

impl DetectionEvent {
    /// Build an event from a detector score in `0.0..=1.0`.
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        score: f64,
        bbox: [f64; 4],
        class_id: u32,
        timestamp: f64,
    ) -> Self {
        let confidence = (score.clamp(0.0, 1.0) * 10_000.0).round() / 100.0;
        Self {
            label: label.into(),
            confidence,
            bbox,
            class_id,
            timestamp,
            color: class_color(class_id).to_string(),
        }
    }

    /// Build an event from corner coordinates `[x1, y1, x2, y2]`.
    #[must_use]
    pub fn from_corners(
        label: impl Into<String>,
        score: f64,
        corners: [f64; 4],
        class_id: u32,
        timestamp: f64,
    ) -> Self {
        let [x1, y1, x2, y2] = corners;
        Self::new(
            label,
            score,
            [x1, y1, (x2 - x1).max(0.0), (y2 - y1).max(0.0)],
            class_id,
            timestamp,
        )
    }
}

/// Per-label object counts for one detection session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionCounters(BTreeMap<String, u32>);

impl SessionCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-label counts of a single frame's detections
    #[must_use]
    pub fn tally(events: &[DetectionEvent]) -> Self {
        let mut counts = BTreeMap::new();
        for event in events {
            *counts.entry(event.label.clone()).or_insert(0) += 1;
        }
        Self(counts)
    }

    /// Replace every count with the counts of `events`; labels absent from
    /// `events` disappear.
    pub fn replace_with(&mut self, events: &[DetectionEvent]) {
        *self = Self::tally(events);
    }

    /// Add the counts of `events` to the running totals.
    pub fn accumulate(&mut self, events: &[DetectionEvent]) {
        for event in events {
            *self.0.entry(event.label.clone()).or_insert(0) += 1;
        }
    }

    #[must_use]
    pub fn get(&self, label: &str) -> u32 {
        self.0.get(label).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.values().map(|&c| u64::from(c)).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(label, &count)| (label.as_str(), count))
    }
}
