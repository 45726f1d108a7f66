//! Append-only record of peak levels and detected notes, one point per tick.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesPoint {
    pub tick_index: u64,
    pub peak_level: f32,
    /// Detected note label, empty when no note was detected.
    pub note_label: String,
}

/// Points are ordered by strictly increasing tick index. Indices are only
/// skipped when a tick produced no point (a read fault).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeSeries {
    points: Vec<TimeSeriesPoint>,
    next_index: u64,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a point at the next tick index and returns that index.
    pub fn push(&mut self, peak_level: f32, note_label: impl Into<String>) -> u64 {
        let tick_index = self.next_index;
        self.points.push(TimeSeriesPoint {
            tick_index,
            peak_level: peak_level.max(0.0),
            note_label: note_label.into(),
        });
        self.next_index += 1;
        tick_index
    }

    /// Consumes a tick index without recording a point.
    pub fn skip(&mut self) -> u64 {
        let tick_index = self.next_index;
        self.next_index += 1;
        tick_index
    }

    pub fn reset(&mut self) {
        self.points.clear();
        self.next_index = 0;
    }

    pub fn points(&self) -> &[TimeSeriesPoint] {
        &self.points
    }

    pub fn last(&self) -> Option<&TimeSeriesPoint> {
        self.points.last()
    }

    /// The index the next tick will use.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
