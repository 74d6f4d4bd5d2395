//! Latency stats for the per-tick pipeline stages
//!
//! Totals cover the whole run. Percentiles are taken over the most recent
//! `WINDOW` samples so memory stays bounded on long sessions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

const WINDOW: usize = 1024;

#[derive(Clone, Default)]
pub struct PipelineStats {
    pub normalize: StageStats,
    pub classify: StageStats,
    pub speech: StageStats,
}

/// Running aggregates for one stage
#[derive(Clone, Default)]
pub struct StageStats {
    count: u64,
    total: Duration,
    max: Duration,
    input_total: u64, // pixels for normalize/classify, chars for speech
    recent: VecDeque<Duration>,
}

impl StageStats {
    pub fn record(&mut self, duration: Duration, input_size: usize) {
        self.count += 1;
        self.total += duration;
        self.max = self.max.max(duration);
        self.input_total += input_size as u64;
        if self.recent.len() == WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(duration);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    fn percentile(&self, q: f64) -> Duration {
        let mut sorted: Vec<Duration> = self.recent.iter().copied().collect();
        sorted.sort_unstable();
        match sorted.len() {
            0 => Duration::ZERO,
            n => sorted[((n - 1) as f64 * q).round() as usize],
        }
    }

    fn avg(&self) -> Duration {
        match self.count {
            0 => Duration::ZERO,
            n => Duration::from_nanos((self.total.as_nanos() / n as u128) as u64),
        }
    }
}

impl PipelineStats {
    pub fn summary(&self) -> String {
        let mut out = String::new();

        for (name, stage) in [
            ("Normalize", &self.normalize),
            ("Classify", &self.classify),
            ("Speech", &self.speech),
        ] {
            if stage.count == 0 {
                continue;
            }
            out.push_str(&format!(
                "{:<9} n={:<5} avg={:.1}ms p50={:.1}ms p95={:.1}ms max={:.1}ms input={:.0}\n",
                name,
                stage.count,
                ms(stage.avg()),
                ms(stage.percentile(0.5)),
                ms(stage.percentile(0.95)),
                ms(stage.max),
                stage.input_total as f64 / stage.count as f64
            ));
        }

        if out.is_empty() {
            out.push_str("No stats recorded yet.\n");
        }
        out
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

pub type SharedStats = Arc<Mutex<PipelineStats>>;

pub fn new_shared() -> SharedStats {
    Arc::new(Mutex::new(PipelineStats::default()))
}

#[derive(Clone, Copy)]
pub enum StatKind {
    Normalize,
    Classify,
    Speech,
}

/// Measures one stage; call `finish` to record
pub struct Timer<'a> {
    start: Instant,
    stats: &'a SharedStats,
    kind: StatKind,
    input_size: usize,
}

impl<'a> Timer<'a> {
    pub fn new(stats: &'a SharedStats, kind: StatKind, input_size: usize) -> Self {
        Self {
            start: Instant::now(),
            stats,
            kind,
            input_size,
        }
    }

    pub fn finish(self) {
        let elapsed = self.start.elapsed();
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let stage = match self.kind {
            StatKind::Normalize => &mut stats.normalize,
            StatKind::Classify => &mut stats.classify,
            StatKind::Speech => &mut stats.speech,
        };
        stage.record(elapsed, self.input_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_summary() {
        assert_eq!(PipelineStats::default().summary(), "No stats recorded yet.\n");
    }

    #[test]
    fn test_timer_records_kind() {
        let stats = new_shared();
        Timer::new(&stats, StatKind::Classify, 90_000).finish();
        Timer::new(&stats, StatKind::Classify, 90_000).finish();
        Timer::new(&stats, StatKind::Speech, 5).finish();

        let snapshot = stats.lock().unwrap().clone();
        assert_eq!(snapshot.classify.count(), 2);
        assert_eq!(snapshot.speech.count(), 1);
        assert_eq!(snapshot.normalize.count(), 0);

        let summary = snapshot.summary();
        assert!(summary.contains("Classify  n=2"));
        assert!(summary.contains("Speech    n=1"));
        assert!(summary.contains("input=90000"));
        assert!(!summary.contains("Normalize"));
    }

    #[test]
    fn test_latency_percentiles() {
        let mut stage = StageStats::default();
        for i in 1..=100 {
            stage.record(Duration::from_millis(i), 1);
        }
        assert_eq!(stage.max, Duration::from_millis(100));
        assert_eq!(stage.percentile(0.95), Duration::from_millis(95));
        assert_eq!(stage.percentile(0.5), Duration::from_millis(51));
        assert_eq!(stage.avg(), Duration::from_micros(50_500));
    }

    #[test]
    fn test_long_runs_stay_bounded() {
        let mut stage = StageStats::default();
        for i in 0..(WINDOW as u64 * 10) {
            stage.record(Duration::from_micros(i), 100);
        }
        assert_eq!(stage.count(), WINDOW as u64 * 10);
        assert_eq!(stage.recent.len(), WINDOW);
        assert_eq!(stage.max, Duration::from_micros(WINDOW as u64 * 10 - 1));
        // percentiles reflect the recent window only
        assert!(stage.percentile(0.0) >= Duration::from_micros(WINDOW as u64 * 9));
    }
}
