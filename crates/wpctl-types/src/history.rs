//! Historical samples and chart series assembly.

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

use crate::types::{CompressorState, Sensor, SensorReadings};

/// One historical data point.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HistorySample {
    /// Controller-local timestamp of the sample.
    pub timestamp: PrimitiveDateTime,
    /// Readings present in this sample; absent sensors had no data.
    pub readings: SensorReadings,
    pub compressor: CompressorState,
}

/// A `(timestamp, value)` point of a single-sensor series.
pub type SeriesPoint = (PrimitiveDateTime, f64);

/// Time-ordered history.
///
/// Samples are strictly ascending by timestamp. When a payload carries two
/// samples with the same timestamp the later one wins.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HistorySeries {
    samples: Vec<HistorySample>,
}

impl HistorySeries {
    /// Build a series from samples in any order.
    ///
    /// # Examples
    ///
    /// ```
    /// use time::macros::datetime;
    /// use wpctl_types::{CompressorState, HistorySample, HistorySeries, SensorReadings};
    ///
    /// let sample = |ts, state| HistorySample {
    ///     timestamp: ts,
    ///     readings: SensorReadings::new(),
    ///     compressor: state,
    /// };
    /// let series = HistorySeries::from_samples(vec![
    ///     sample(datetime!(2024-05-01 10:05), CompressorState::Off),
    ///     sample(datetime!(2024-05-01 10:00), CompressorState::Off),
    ///     sample(datetime!(2024-05-01 10:05), CompressorState::Running),
    /// ]);
    /// assert_eq!(series.len(), 2);
    /// assert_eq!(series.latest().unwrap().compressor, CompressorState::Running);
    /// ```
    pub fn from_samples(mut samples: Vec<HistorySample>) -> Self {
        // Stable sort keeps payload order among equal timestamps.
        samples.sort_by_key(|s| s.timestamp);

        let mut deduped: Vec<HistorySample> = Vec::with_capacity(samples.len());
        for sample in samples {
            match deduped.last_mut() {
                Some(prev) if prev.timestamp == sample.timestamp => *prev = sample,
                _ => deduped.push(sample),
            }
        }

        Self { samples: deduped }
    }

    /// Samples in ascending timestamp order.
    pub fn samples(&self) -> &[HistorySample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The most recent sample, regardless of which sensors it carries.
    pub fn latest(&self) -> Option<&HistorySample> {
        self.samples.last()
    }

    /// The oldest sample.
    pub fn earliest(&self) -> Option<&HistorySample> {
        self.samples.first()
    }

    /// Keep only the newest `limit` samples.
    #[must_use]
    pub fn truncate_to_latest(mut self, limit: usize) -> Self {
        if self.samples.len() > limit {
            let excess = self.samples.len() - limit;
            self.samples.drain(..excess);
        }
        self
    }

    /// Sparse series for one sensor. Samples without a reading are omitted.
    pub fn sensor_series(&self, sensor: Sensor) -> Vec<SeriesPoint> {
        self.samples
            .iter()
            .filter_map(|s| s.readings.get(sensor).map(|v| (s.timestamp, v)))
            .collect()
    }

    /// Sparse series for every sensor that has at least one reading.
    pub fn chart_series(&self) -> BTreeMap<Sensor, Vec<SeriesPoint>> {
        let mut series: BTreeMap<Sensor, Vec<SeriesPoint>> = BTreeMap::new();
        for sample in &self.samples {
            for (sensor, value) in sample.readings.iter() {
                series
                    .entry(sensor)
                    .or_default()
                    .push((sample.timestamp, value));
            }
        }
        series
    }

    /// Minimum and maximum reading of `sensor` over the series.
    pub fn value_range(&self, sensor: Sensor) -> Option<(f64, f64)> {
        self.sensor_series(sensor)
            .into_iter()
            .map(|(_, v)| v)
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Share of samples (0.0..=1.0) in which the compressor was running.
    pub fn compressor_duty(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let running = self
            .samples
            .iter()
            .filter(|s| s.compressor.is_running())
            .count();
        Some(running as f64 / self.samples.len() as f64)
    }
}

impl<'a> IntoIterator for &'a HistorySeries {
    type Item = &'a HistorySample;
    type IntoIter = std::slice::Iter<'a, HistorySample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
