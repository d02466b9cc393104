use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub started_at: Option<DateTime<Utc>>,
    pub stages: BTreeMap<String, StageMetrics>,
    pub total_duration_ms: f64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
}

#[derive(Debug, Default, Serialize, Clone)]
pub struct StageMetrics {
    pub calls: u64,
    /// Runs that ended in an error.
    pub failures: u64,
    pub total_duration_ms: f64,
    pub max_duration_ms: f64,
}

#[derive(Debug, Default, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsSnapshot>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_stage(&self, stage_name: &str) -> StageTimer {
        StageTimer {
            stage: stage_name.to_string(),
            started_at: Instant::now(),
            collector: self.inner.clone(),
            succeeded: false,
        }
    }

    pub fn record_total_duration(&self, duration: Duration) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.total_duration_ms = duration.as_secs_f64() * 1_000.0;
        }
    }

    pub fn record_job_success(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.jobs_succeeded += 1;
        }
    }

    pub fn record_job_failure(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.jobs_failed += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Clears all counters and stamps a new start time.
    pub fn reset(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = MetricsSnapshot {
                started_at: Some(Utc::now()),
                ..MetricsSnapshot::default()
            };
        }
    }
}

/// Times one stage run. A timer dropped without [`StageTimer::finish`] counts
/// the run as failed, so a stage that returns early through `?` still shows
/// up in the snapshot.
pub struct StageTimer {
    stage: String,
    started_at: Instant,
    collector: Arc<Mutex<MetricsSnapshot>>,
    succeeded: bool,
}

impl StageTimer {
    /// Marks the stage as completed.
    pub fn finish(mut self) {
        self.succeeded = true;
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        let elapsed_ms = self.started_at.elapsed().as_secs_f64() * 1_000.0;
        if let Ok(mut guard) = self.collector.lock() {
            let entry = guard.stages.entry(self.stage.clone()).or_default();
            entry.calls += 1;
            if !self.succeeded {
                entry.failures += 1;
            }
            entry.total_duration_ms += elapsed_ms;
            entry.max_duration_ms = entry.max_duration_ms.max(elapsed_ms);
        }
        debug!(
            stage = %self.stage,
            elapsed_ms,
            succeeded = self.succeeded,
            "Stage finished"
        );
    }
}

impl StageMetrics {
    pub fn average_duration_ms(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_duration_ms / self.calls as f64
        }
    }
}

pub fn log_snapshot(snapshot: &MetricsSnapshot) {
    let jobs = snapshot.jobs_succeeded + snapshot.jobs_failed;
    info!(
        jobs,
        succeeded = snapshot.jobs_succeeded,
        failed = snapshot.jobs_failed,
        total_ms = snapshot.total_duration_ms,
        "Upscale run finished"
    );
    for (stage, metrics) in &snapshot.stages {
        let share = if snapshot.total_duration_ms > 0.0 {
            metrics.total_duration_ms / snapshot.total_duration_ms * 100.0
        } else {
            0.0
        };
        info!(
            stage = stage.as_str(),
            runs = metrics.calls,
            failures = metrics.failures,
            avg_ms = metrics.average_duration_ms(),
            max_ms = metrics.max_duration_ms,
            share_pct = share,
            "Stage timing"
        );
    }
}
