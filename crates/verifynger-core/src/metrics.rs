//! Per-sensor metrics.
//!
//! Two writers feed the same counters: periodic snapshots from the node
//! overwrite them, local verification and enrollment outcomes increment
//! them. Whatever arrived last wins; the two are never reconciled.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::warn;

use verifynger_shared::constants::MAX_CONFIDENCE;
use verifynger_shared::protocol::MetricsReport;
use verifynger_shared::types::sensor_of_hash;
use verifynger_shared::Sensor;

#[derive(Debug, Clone, PartialEq)]
pub struct SensorMetric {
    pub capacity: u32,
    /// Enrolled templates on this sensor, recounted from the store.
    pub used: u32,
    pub response_time_samples: Vec<f64>,
    pub success_count: u64,
    pub fail_count: u64,
    pub avg_confidence: f64,
    pub total_scans: u64,
    pub last_update: Option<NaiveDateTime>,
}

impl SensorMetric {
    fn new(sensor: Sensor) -> Self {
        Self {
            capacity: sensor.capacity(),
            used: 0,
            response_time_samples: Vec::new(),
            success_count: 0,
            fail_count: 0,
            avg_confidence: 0.0,
            total_scans: 0,
            last_update: None,
        }
    }

    pub fn avg_response_time(&self) -> Option<f64> {
        if self.response_time_samples.is_empty() {
            return None;
        }
        let sum: f64 = self.response_time_samples.iter().sum();
        Some(sum / self.response_time_samples.len() as f64)
    }

    pub fn usage_percent(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        f64::from(self.used) * 100.0 / f64::from(self.capacity)
    }
}

/// Read-only view handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorMetricView {
    pub sensor: Sensor,
    pub capacity: u32,
    pub used: u32,
    pub usage_percent: f64,
    pub success_count: u64,
    pub fail_count: u64,
    pub total_scans: u64,
    pub avg_confidence: f64,
    pub avg_response_time: Option<f64>,
    pub last_update: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct MetricsBoard {
    sensors: BTreeMap<Sensor, SensorMetric>,
}

impl MetricsBoard {
    pub fn new() -> Self {
        let sensors = Sensor::ALL
            .into_iter()
            .map(|s| (s, SensorMetric::new(s)))
            .collect();
        Self { sensors }
    }

    pub fn get(&self, sensor: Sensor) -> &SensorMetric {
        // Every sensor is inserted by `new` and never removed.
        &self.sensors[&sensor]
    }

    fn entry(&mut self, sensor: Sensor) -> &mut SensorMetric {
        self.sensors
            .entry(sensor)
            .or_insert_with(|| SensorMetric::new(sensor))
    }

    /// Count a hit. The score goes into the running confidence mean, clamped
    /// to the sensor's confidence range.
    ///
    /// A zero mean is seeded with the score itself: enrollment scans and
    /// node snapshots bump `success_count` without contributing a score.
    pub fn record_success(&mut self, sensor: Sensor, score: i64, now: NaiveDateTime) {
        let score = clamp_score(sensor, score);
        let m = self.entry(sensor);

        m.success_count += 1;
        m.total_scans += 1;
        m.last_update = Some(now);

        if m.avg_confidence == 0.0 {
            m.avg_confidence = score;
        } else {
            let n = m.success_count as f64;
            m.avg_confidence = (m.avg_confidence * (n - 1.0) + score) / n;
        }
    }

    pub fn record_failure(&mut self, sensor: Sensor, now: NaiveDateTime) {
        let m = self.entry(sensor);
        m.fail_count += 1;
        m.total_scans += 1;
        m.last_update = Some(now);
    }

    /// An enrollment scan finished. Only the counters move; there is no
    /// confidence score to average.
    pub fn record_scan(&mut self, sensor: Sensor, succeeded: bool, now: NaiveDateTime) {
        let m = self.entry(sensor);
        if succeeded {
            m.success_count += 1;
        } else {
            m.fail_count += 1;
        }
        m.total_scans += 1;
        m.last_update = Some(now);
    }

    /// Overwrite the counters with the node's own. Applying the same report
    /// twice at the same `now` leaves the board unchanged.
    pub fn apply_snapshot(&mut self, report: &MetricsReport, now: NaiveDateTime) {
        for (sensor, snap) in &report.sensors {
            let m = self.entry(*sensor);
            m.total_scans = snap.total_scans;
            m.success_count = snap.success_count;
            m.fail_count = snap.fail_count;
            m.avg_confidence = snap.avg_confidence;
            if snap.avg_response_time > 0.0 {
                m.response_time_samples = vec![snap.avg_response_time];
            }
            if snap.last_scan_time > 0 {
                m.last_update = Some(now);
            }
        }
    }

    /// Recount `used` for every sensor from the full list of stored hashes.
    pub fn recount_used<'a>(&mut self, hashes: impl IntoIterator<Item = &'a str>) {
        let mut counts: BTreeMap<Sensor, u32> = BTreeMap::new();
        for hash in hashes {
            if let Some(sensor) = sensor_of_hash(hash) {
                *counts.entry(sensor).or_default() += 1;
            }
        }
        for sensor in Sensor::ALL {
            self.entry(sensor).used = counts.get(&sensor).copied().unwrap_or(0);
        }
    }

    pub fn snapshot(&self) -> Vec<SensorMetricView> {
        self.sensors
            .iter()
            .map(|(sensor, m)| SensorMetricView {
                sensor: *sensor,
                capacity: m.capacity,
                used: m.used,
                usage_percent: m.usage_percent(),
                success_count: m.success_count,
                fail_count: m.fail_count,
                total_scans: m.total_scans,
                avg_confidence: m.avg_confidence,
                avg_response_time: m.avg_response_time(),
                last_update: m.last_update,
            })
            .collect()
    }
}

impl Default for MetricsBoard {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_score(sensor: Sensor, score: i64) -> f64 {
    let raw = score as f64;
    if !(0.0..=MAX_CONFIDENCE).contains(&raw) {
        warn!(sensor = %sensor, score, "Match score out of range, clamped for averaging");
    }
    raw.clamp(0.0, MAX_CONFIDENCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use verifynger_shared::protocol::SensorSnapshot;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[test]
    fn running_mean_uses_post_increment_count() {
        let mut board = MetricsBoard::new();
        board.record_success(Sensor::As608, 92, now());
        board.record_success(Sensor::As608, 80, now());

        let m = board.get(Sensor::As608);
        assert_eq!(m.success_count, 2);
        assert_eq!(m.total_scans, 2);
        assert!((m.avg_confidence - 86.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_score_is_clamped_for_mean() {
        let mut board = MetricsBoard::new();
        board.record_success(Sensor::Fpm10a, 250, now());
        assert_eq!(board.get(Sensor::Fpm10a).avg_confidence, 100.0);
        board.record_success(Sensor::Fpm10a, -5, now());
        assert_eq!(board.get(Sensor::Fpm10a).avg_confidence, 50.0);
    }

    #[test]
    fn first_hit_after_enrollment_seeds_mean() {
        let mut board = MetricsBoard::new();
        board.record_scan(Sensor::As608, true, now());
        board.record_success(Sensor::As608, 92, now());

        let m = board.get(Sensor::As608);
        assert_eq!(m.success_count, 2);
        assert_eq!(m.avg_confidence, 92.0);

        board.record_success(Sensor::As608, 80, now());
        assert!((board.get(Sensor::As608).avg_confidence - 84.0).abs() < 1e-9);
    }

    #[test]
    fn zero_confidence_snapshot_is_reseeded() {
        let mut board = MetricsBoard::new();
        let mut report = MetricsReport::default();
        report.sensors.insert(
            Sensor::Zw101,
            SensorSnapshot {
                total_scans: 4,
                success_count: 4,
                ..Default::default()
            },
        );
        board.apply_snapshot(&report, now());
        board.record_success(Sensor::Zw101, 70, now());

        let m = board.get(Sensor::Zw101);
        assert_eq!(m.success_count, 5);
        assert_eq!(m.avg_confidence, 70.0);
    }

    #[test]
    fn failure_moves_only_failure_counters() {
        let mut board = MetricsBoard::new();
        board.record_failure(Sensor::Zw101, now());
        let m = board.get(Sensor::Zw101);
        assert_eq!((m.fail_count, m.success_count, m.total_scans), (1, 0, 1));
        assert_eq!(m.last_update, Some(now()));
    }

    #[test]
    fn snapshot_overwrites_and_is_idempotent() {
        let mut board = MetricsBoard::new();
        board.record_success(Sensor::As608, 90, now());

        let mut report = MetricsReport::default();
        report.sensors.insert(
            Sensor::As608,
            SensorSnapshot {
                total_scans: 10,
                success_count: 8,
                fail_count: 2,
                avg_confidence: 88.5,
                avg_response_time: 420.0,
                last_scan_time: 1234,
            },
        );

        board.apply_snapshot(&report, now());
        let once = board.snapshot();
        board.apply_snapshot(&report, now());
        assert_eq!(once, board.snapshot());

        let m = board.get(Sensor::As608);
        assert_eq!(m.success_count, 8);
        assert_eq!(m.avg_response_time(), Some(420.0));
        assert_eq!(board.get(Sensor::Fpm10a).total_scans, 0);
    }

    #[test]
    fn zero_response_time_keeps_samples() {
        let mut board = MetricsBoard::new();
        let mut report = MetricsReport::default();
        report.sensors.insert(Sensor::Zw101, SensorSnapshot::default());
        board.apply_snapshot(&report, now());

        let m = board.get(Sensor::Zw101);
        assert_eq!(m.avg_response_time(), None);
        assert_eq!(m.last_update, None);
    }

    #[test]
    fn used_is_recounted_from_hashes() {
        let mut board = MetricsBoard::new();
        board.recount_used(["AS608_1", "AS608_2", "ZW101_1", "BOGUS"]);
        assert_eq!(board.get(Sensor::As608).used, 2);
        assert_eq!(board.get(Sensor::Zw101).used, 1);
        assert_eq!(board.get(Sensor::Fpm10a).used, 0);
        assert!((board.get(Sensor::As608).usage_percent() - 1.0).abs() < 1e-9);

        board.recount_used(["ZW101_1"]);
        assert_eq!(board.get(Sensor::As608).used, 0);
    }
}
