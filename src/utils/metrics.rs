//! Tick timing metrics for the control loop.
//!
//! Bounded history (1000 most recent points) of tick jitter and body execution time,
//! plus counters for ticks, faults and overruns. Reported by the status commands.

use std::collections::VecDeque;

pub const MAX_POINTS: usize = 1_000;

#[derive(Debug, Default, Clone)]
pub struct LoopMetrics {
    /// |actual interval - nominal period| per tick (microseconds)
    pub jitter_us: VecDeque<u64>,
    /// Tick body execution time (microseconds)
    pub exec_us: VecDeque<u64>,

    pub ticks: u64,
    pub faults: u64,
    /// Ticks whose body ran longer than the period
    pub overruns: u64,
}

impl LoopMetrics {
    /// Record one completed tick.
    pub fn record_tick(&mut self, jitter_us: u64, exec_us: u64, period_us: u64) {
        self.ticks += 1;
        push_capped_u64(&mut self.jitter_us, jitter_us);
        push_capped_u64(&mut self.exec_us, exec_us);
        if exec_us > period_us {
            self.overruns += 1;
        }
    }

    pub fn record_fault(&mut self) {
        self.faults += 1;
    }

    pub fn clear(&mut self) {
        *self = LoopMetrics::default();
    }

    /// One-line summary for status reports.
    pub fn summary(&self) -> String {
        let jitter = calculate_stats_u64(&self.jitter_us);
        let exec = calculate_stats_u64(&self.exec_us);
        let fmt = |s: Option<Stats>| match s {
            Some(s) => format!("avg {:.1} max {:.0}", s.mean, s.max),
            None => "n/a".to_string(),
        };
        format!(
            "ticks {} faults {} overruns {} jitter_us [{}] exec_us [{}]",
            self.ticks,
            self.faults,
            self.overruns,
            fmt(jitter),
            fmt(exec)
        )
    }
}

/// Appends value to buffer; removes oldest if at capacity.
#[inline]
pub fn push_capped_u64(buf: &mut VecDeque<u64>, val: u64) {
    if buf.len() >= MAX_POINTS {
        buf.pop_front();
    }
    buf.push_back(val);
}

#[derive(Debug, Clone)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

/// Computes min, max, mean for a u64 buffer (cast to f64).
pub fn calculate_stats_u64(data: &VecDeque<u64>) -> Option<Stats> {
    if data.is_empty() {
        return None;
    }

    let count = data.len();
    let min = data.iter().map(|&x| x as f64).fold(f64::INFINITY, f64::min);
    let max = data.iter().map(|&x| x as f64).fold(f64::NEG_INFINITY, f64::max);
    let mean = data.iter().map(|&x| x as f64).sum::<f64>() / count as f64;

    Some(Stats { min, max, mean, count })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_capped() {
        let mut buf = VecDeque::new();
        for i in 0..(MAX_POINTS as u64 + 10) {
            push_capped_u64(&mut buf, i);
        }
        assert_eq!(buf.len(), MAX_POINTS);
        assert_eq!(buf.front(), Some(&10));
    }

    #[test]
    fn overruns_counted_against_period() {
        let mut m = LoopMetrics::default();
        m.record_tick(5, 900, 1_000);
        m.record_tick(5, 1_500, 1_000);
        assert_eq!(m.ticks, 2);
        assert_eq!(m.overruns, 1);
        let stats = calculate_stats_u64(&m.exec_us).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.min, 900.0);
        assert_eq!(stats.mean, 1_200.0);
        assert!(m.summary().starts_with("ticks 2 faults 0 overruns 1"));
    }
}
