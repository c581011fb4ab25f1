use std::fmt::Write;
use std::time::{Duration, Instant};

use ahash::AHashMap;

use crate::floating_type_mod::FT;

/// Running aggregate of a series of samples. Memory use does not grow with the number of samples.
#[derive(Clone)]
struct Counter<T> {
    count: u32,
    sum: T,
    min: T,
    max: T,
    last_start: Instant,
}
impl<T: Copy + PartialOrd + std::ops::Add<Output = T>> Counter<T> {
    fn new(zero: T) -> Self {
        Counter::<T> {
            count: 0,
            sum: zero,
            min: zero,
            max: zero,
            last_start: Instant::now(),
        }
    }
    fn add_value(&mut self, v: T) {
        if self.count == 0 || v < self.min {
            self.min = v;
        }
        if self.count == 0 || v > self.max {
            self.max = v;
        }
        self.sum = self.sum + v;
        self.count = self.count.saturating_add(1);
    }
}
impl Counter<FT> {
    fn avg(&self) -> FT {
        self.sum / self.count as FT
    }
}
impl Counter<Duration> {
    fn begin(&mut self) {
        self.last_start = Instant::now();
    }

    fn end(&mut self) {
        self.add_value(Instant::now() - self.last_start);
    }

    fn avg(&self) -> Duration {
        self.sum / self.count.max(1)
    }
}

pub struct ValueCounters {
    counters: AHashMap<String, Counter<FT>>,
    enabled: bool,
}
impl ValueCounters {
    pub fn new(enabled: bool) -> ValueCounters {
        ValueCounters {
            counters: AHashMap::default(),
            enabled,
        }
    }

    pub fn add_value(&mut self, id: &str, v: FT) {
        if self.enabled {
            self.counters
                .entry(id.to_string())
                .or_insert_with(|| Counter::new(0.))
                .add_value(v);
        }
    }

    pub fn avg(&self, id: &str) -> Option<FT> {
        self.counters.get(id).map(|c| c.avg())
    }
}

/// Wall clock time per simulation stage.
pub struct PerformanceCounters {
    counters: AHashMap<String, Counter<Duration>>,
    enabled: bool,
}
impl PerformanceCounters {
    pub fn new(enabled: bool) -> PerformanceCounters {
        PerformanceCounters {
            counters: AHashMap::default(),
            enabled,
        }
    }

    pub fn begin(&mut self, id: &str) {
        if self.enabled {
            self.counters
                .entry(id.to_string())
                .or_insert_with(|| Counter::new(Duration::ZERO))
                .begin();
        }
    }

    pub fn end(&mut self, id: &str) {
        if self.enabled {
            if let Some(counter) = self.counters.get_mut(id) {
                counter.end();
            }
        }
    }

    pub fn total(&self, id: &str) -> Option<Duration> {
        self.counters.get(id).map(|c| c.sum)
    }
}

pub struct StepCounters {
    pub pcounters: PerformanceCounters,
    pub vcounters: ValueCounters,
}

impl StepCounters {
    pub fn new(enabled: bool) -> StepCounters {
        StepCounters {
            pcounters: PerformanceCounters::new(enabled),
            vcounters: ValueCounters::new(enabled),
        }
    }
}

pub fn write_statistics(counters: &StepCounters) -> String {
    let mut s = String::new();

    if let Some(total) = counters.pcounters.total("step") {
        writeln!(s, "simulation-time: {}ms", total.as_secs_f64() * 1000.).unwrap();
        writeln!(s).unwrap();
    }

    let mut v = counters.pcounters.counters.iter().collect::<Vec<_>>();
    v.sort_by(|x, y| x.0.cmp(y.0));
    for (label, pcounter) in v {
        writeln!(s, "{}: avg:{}ms", label, pcounter.avg().as_secs_f64() * 1000.).unwrap();
    }
    writeln!(s).unwrap();

    let mut v = counters.vcounters.counters.iter().collect::<Vec<_>>();
    v.sort_by(|x, y| x.0.cmp(y.0));
    for (label, vcounter) in v {
        writeln!(
            s,
            "{}: min:{} max:{} avg:{}",
            label,
            vcounter.min,
            vcounter.max,
            vcounter.avg()
        )
        .unwrap();
    }

    s
}

#[test]
fn disabled_counters_record_nothing() {
    let mut counters = StepCounters::new(false);
    counters.pcounters.begin("step");
    counters.pcounters.end("step");
    counters.vcounters.add_value("particle-count", 3.);
    assert!(counters.pcounters.total("step").is_none());
    assert!(counters.vcounters.avg("particle-count").is_none());
}

#[test]
fn statistics_report_lists_counters() {
    let mut counters = StepCounters::new(true);
    counters.pcounters.begin("step");
    counters.pcounters.end("step");
    counters.vcounters.add_value("particle-count", 2.);
    counters.vcounters.add_value("particle-count", 4.);
    assert_eq!(counters.vcounters.avg("particle-count"), Some(3.));

    let report = write_statistics(&counters);
    assert!(report.contains("simulation-time"));
    assert!(report.contains("step: avg:"));
    assert!(report.contains("particle-count: min:2 max:4 avg:3"));
}

#[test]
fn counters_aggregate_long_series() {
    let mut counters = ValueCounters::new(true);
    for i in 0..10_000 {
        counters.add_value("contacts", (i % 100) as FT);
    }
    let counter = &counters.counters["contacts"];
    assert_eq!(counter.count, 10_000);
    assert_eq!(counter.min, 0.);
    assert_eq!(counter.max, 99.);
    assert_eq!(counters.avg("contacts"), Some(49.5));

    let mut pcounters = PerformanceCounters::new(true);
    for _ in 0..3 {
        pcounters.begin("step");
        pcounters.end("step");
    }
    assert_eq!(pcounters.counters["step"].count, 3);
    assert!(pcounters.total("step").unwrap() >= pcounters.counters["step"].max);
}
