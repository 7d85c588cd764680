use std::{fmt, io};

use crate::{
    cache::{AccessOutcome, AccessResult, SetAssociativeCache},
    config::{CacheConfig, SnapshotMode},
};

#[cfg(feature = "stat")]
use crate::stat::{AddStats, Stats};

pub struct Simulator {
    config: CacheConfig,
    cache: SetAssociativeCache,
    last: Option<AccessResult>,
    #[cfg(feature = "stat")]
    stat_builder: stat::SimStatBuilder,
}

/// Totals printed at the end of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Report {
    pub hits: u64,
    pub misses: u64,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#hits: {}", self.hits)?;
        writeln!(f, "#miss: {}", self.misses)
    }
}

impl SnapshotMode {
    pub fn should_emit(self, previous: Option<AccessResult>, current: AccessResult) -> bool {
        match self {
            SnapshotMode::Never => false,
            SnapshotMode::Every => true,
            SnapshotMode::OnChange => {
                !current.is_hit() || previous.map_or(true, |p| !p.is_hit())
            }
        }
    }
}

impl Simulator {
    pub fn new(config: CacheConfig) -> Self {
        let geometry = config.geometry();
        log::info!(
            "cache: {} bytes, {} per line, {geometry}",
            config.cache_bytes(),
            config.line_size()
        );
        log::info!(
            "offset bits: {}, snapshot: {}",
            config.line_size().offset_bits(),
            config.snapshot()
        );
        Self {
            config,
            cache: SetAssociativeCache::with_geometry(geometry),
            last: None,
            #[cfg(feature = "stat")]
            stat_builder: stat::SimStatBuilder::new(),
        }
    }
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
    pub fn cache(&self) -> &SetAssociativeCache {
        &self.cache
    }
    /// decomposes `address`, accesses the cache and writes a snapshot to
    /// `out` if the snapshot mode asks for one.
    pub fn step(&mut self, address: u32, out: &mut impl io::Write) -> io::Result<AccessOutcome> {
        let block = self.config.line_size().block_of(address);
        let outcome = self.cache.access_detailed(block);
        log::debug!(
            "{address:#010x} -> block {block}, set {}, line {:03}: {}",
            outcome.set,
            outcome.line,
            outcome.result
        );
        if self.config.snapshot().should_emit(self.last, outcome.result) {
            write!(out, "{}", self.cache.snapshot())?;
        }
        self.last = Some(outcome.result);
        Ok(outcome)
    }
    pub fn run(
        &mut self,
        trace: impl IntoIterator<Item = u32>,
        out: &mut impl io::Write,
    ) -> io::Result<()> {
        for address in trace {
            self.step(address, out)?;
        }
        Ok(())
    }
    pub fn report(&self) -> Report {
        Report {
            hits: self.cache.hit_count(),
            misses: self.cache.miss_count(),
        }
    }
    pub fn exit_sim(&mut self) {
        #[cfg(feature = "stat")]
        self.stat_builder.stop_timer();
        log::info!(
            "finished {} accesses: {} hits, {} misses",
            self.cache.access_count(),
            self.cache.hit_count(),
            self.cache.miss_count()
        );
    }
}

impl Simulator {
    #[cfg(feature = "stat")]
    pub fn collect_stat(&self) -> Stats {
        let mut ss = Stats::default();
        self.add_stats(&mut ss);
        ss
    }
}

#[cfg(feature = "stat")]
impl AddStats for Simulator {
    fn add_stats(&self, buf: &mut Stats) {
        buf.push(Box::new(self.stat_builder.finish(&self.config)));
        self.cache.add_stats(buf);
    }
}

#[cfg(feature = "stat")]
mod stat {
    use crate::stat::*;

    use super::*;
    use std::time;

    pub struct SimStatBuilder {
        begin: time::Instant,
        elapsed: Option<time::Duration>,
    }

    impl SimStatBuilder {
        pub fn new() -> Self {
            Self {
                begin: time::Instant::now(),
                elapsed: None,
            }
        }
        pub fn stop_timer(&mut self) {
            self.elapsed = Some(time::Instant::now() - self.begin)
        }
        pub fn finish(&self, config: &CacheConfig) -> SimStat {
            SimStat {
                total_lines: config.geometry().total_lines(),
                number_of_sets: config.geometry().number_of_sets(),
                lines_per_set: config.geometry().lines_per_set(),
                line_bytes: config.line_size().bytes(),
                elapsed: self.elapsed.unwrap_or_else(|| self.begin.elapsed()),
            }
        }
    }

    impl Default for SimStatBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    pub struct SimStat {
        total_lines: usize,
        number_of_sets: usize,
        lines_per_set: usize,
        line_bytes: u32,
        elapsed: time::Duration,
    }

    impl Stat for SimStat {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(self)
        }
    }

    impl StatView for &'_ SimStat {
        fn header(&self) -> &'static str {
            "simulator stat"
        }
        fn width(&self) -> usize {
            33
        }
    }

    impl fmt::Display for &'_ SimStat {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let us = format!("{} us", self.elapsed.as_micros());
            writeln!(f, "  elapsed total: {us:>12}")?;
            writeln!(f, "     line bytes: {:>12}", self.line_bytes)?;
            writeln!(f, "          lines: {:>12}", self.total_lines)?;
            writeln!(f, "           sets: {:>12}", self.number_of_sets)?;
            write!(f, "  lines per set: {:>12}", self.lines_per_set)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(cache_bytes: usize, line_bytes: u32, ways: usize) -> CacheConfig {
        CacheConfig::new(cache_bytes, line_bytes, ways).unwrap()
    }

    #[test]
    fn test_same_line_report() {
        let mut sim = Simulator::new(config(8 * 1024, 1024, 2));
        let mut out = Vec::new();
        sim.run([0x0000_0000, 0x0000_0004], &mut out).unwrap();
        assert!(out.is_empty());
        assert_eq!(
            Report {
                hits: 1,
                misses: 1
            },
            sim.report()
        );
        assert_eq!("#hits: 1\n#miss: 1\n", sim.report().to_string());
    }

    #[test]
    fn test_next_line_misses() {
        let mut sim = Simulator::new(config(8 * 1024, 1024, 2));
        let mut out = Vec::new();
        sim.run([0x0000_0000, 0x0000_0400], &mut out).unwrap();
        assert_eq!("#hits: 0\n#miss: 2\n", sim.report().to_string());
    }

    #[test]
    fn test_associativity_overflow() {
        // 4 sets, blocks 1, 5, 9 all map to set 1
        let mut sim = Simulator::new(config(8 * 1024, 1024, 2));
        let mut out = Vec::new();
        let results: Vec<_> = [0x400, 0x1400, 0x2400, 0x400]
            .into_iter()
            .map(|a| sim.step(a, &mut out).unwrap())
            .collect();
        assert!(results.iter().all(|o| o.set == 1 && !o.result.is_hit()));
        assert_eq!(None, results[1].evicted);
        assert_eq!(Some(1), results[2].evicted.map(|b| b.into_inner()));
        assert_eq!(Some(5), results[3].evicted.map(|b| b.into_inner()));
        assert_eq!(4, sim.report().misses);
    }

    #[test]
    fn test_conservation() {
        let mut sim = Simulator::new(config(4096, 64, 4));
        let mut out = Vec::new();
        let trace: Vec<u32> = (0..500u32).map(|i| i.wrapping_mul(2_654_435_761) >> 20).collect();
        sim.run(trace, &mut out).unwrap();
        let r = sim.report();
        assert_eq!(500, r.hits + r.misses);
    }

    #[test]
    fn test_snapshot_mode() {
        use AccessResult::*;
        assert!(!SnapshotMode::Never.should_emit(None, Miss));
        assert!(SnapshotMode::Every.should_emit(Some(Hit), Hit));
        assert!(SnapshotMode::OnChange.should_emit(None, Miss));
        assert!(SnapshotMode::OnChange.should_emit(Some(Miss), Miss));
        assert!(SnapshotMode::OnChange.should_emit(Some(Miss), Hit));
        assert!(!SnapshotMode::OnChange.should_emit(Some(Hit), Hit));
        assert!(SnapshotMode::OnChange.should_emit(Some(Hit), Miss));
    }

    #[test]
    fn test_snapshot_output() {
        let trace = [0x0, 0x4, 0x8, 0x400];
        let mut sim = Simulator::new(config(2048, 1024, 2).with_snapshot(SnapshotMode::OnChange));
        let mut out = Vec::new();
        sim.run(trace, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        // miss, hit after miss, miss
        assert_eq!(3, out.matches("IDX V ** ADDR **").count());
        assert!(out.ends_with("000 1 0x00000000\n001 1 0x00000001\n"));

        let mut sim = Simulator::new(config(2048, 1024, 2).with_snapshot(SnapshotMode::Every));
        let mut out = Vec::new();
        sim.run(trace, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert_eq!(4, out.matches("IDX V ** ADDR **").count());
    }
}
