use std::path::Path;
use std::time::{Duration, Instant};

use crate::countdown::config::CountdownConfig;
use crate::countdown::engine::CountdownEngine;

const BENCHMARK_TICKS: usize = 10_000;

/// Latency statistics for a run of `tick` calls.
pub struct TickStats {
    total_ticks: u64,
    total_time: Duration,
    slowest: Duration,
    latency_histogram: [u64; 5],
}

impl TickStats {
    pub fn new() -> Self {
        Self {
            total_ticks: 0,
            total_time: Duration::ZERO,
            slowest: Duration::ZERO,
            latency_histogram: [0; 5],
        }
    }

    pub fn record_tick(&mut self, latency: Duration) {
        self.total_ticks += 1;
        self.total_time += latency;
        self.slowest = self.slowest.max(latency);
        self.update_histogram(latency);
    }

    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    pub fn mean_micros(&self) -> f64 {
        if self.total_ticks == 0 {
            return 0.0;
        }
        self.total_time.as_secs_f64() * 1_000_000.0 / self.total_ticks as f64
    }

    pub fn slowest(&self) -> Duration {
        self.slowest
    }

    pub fn histogram(&self) -> [u64; 5] {
        self.latency_histogram
    }

    fn update_histogram(&mut self, latency: Duration) {
        let micros = latency.as_secs_f64() * 1_000_000.0;
        let bucket = if micros <= 1.0 {
            0
        } else if micros <= 10.0 {
            1
        } else if micros <= 100.0 {
            2
        } else if micros <= 1_000.0 {
            3
        } else {
            4
        };
        self.latency_histogram[bucket] += 1;
    }
}

impl Default for TickStats {
    fn default() -> Self {
        Self::new()
    }
}

pub fn run_diagnostics(
    label: &str,
    detail: Option<&str>,
    engine: &CountdownEngine,
    config: &CountdownConfig,
    config_path: &Path,
) {
    let resolver = engine.resolver();
    println!("countdown-kiosk diagnostics");
    println!("Selected timing source: {label}");
    if let Some(detail) = detail {
        println!("Timing detail: {detail}");
    }
    println!("Display time zone: {}", resolver.timezone().name());
    println!("Config file: {}", config_path.display());
    println!("Mode: {}", config.mode.name());
    match config.validate() {
        Ok(()) => println!("Validation: ok"),
        Err(err) => println!("Validation: {err}"),
    }

    let now_ms = engine.time_source().now_ms();
    if let Err(err) = resolver.try_resolve(config, now_ms) {
        println!("Resolution error: {err}");
    }
    match resolver.resolve(config, now_ms) {
        0 => println!("Resolved target: none"),
        target_ms => println!(
            "Resolved target: {target_ms} ({})",
            resolver.format_hhmm(target_ms)
        ),
    }

    println!("Running {BENCHMARK_TICKS} tick benchmark...");
    let mut stats = TickStats::new();
    for _ in 0..BENCHMARK_TICKS {
        let tick_start = Instant::now();
        std::hint::black_box(engine.tick(config));
        stats.record_tick(tick_start.elapsed());
    }

    println!("Benchmark summary:");
    println!("  Ticks: {}", stats.total_ticks());
    println!("  Mean latency: {:.2} us", stats.mean_micros());
    println!("  Slowest tick: {:?}", stats.slowest());
    println!("  Latency histogram buckets (<=1, <=10, <=100, <=1000, >1000 us):");
    println!("  {:?}", stats.histogram());
}

/// Sleeps until `deadline`, yielding for the last stretch to stay on schedule.
pub fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if now >= deadline {
        return;
    }

    let remaining = deadline.saturating_duration_since(now);
    if remaining > Duration::from_millis(1) {
        std::thread::sleep(remaining - Duration::from_micros(250));
    }

    while Instant::now() < deadline {
        std::thread::yield_now();
    }
}
