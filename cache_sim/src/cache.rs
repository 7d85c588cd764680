use std::{collections::VecDeque, fmt, ops::Range};

use crate::{
    addr::BlockId,
    config::{ConfigError, Geometry},
    snapshot::SnapshotView,
};

#[cfg(feature = "stat")]
use crate::stat::{AddStats, Stats};

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheLine {
    occupied: bool,
    block: BlockId,
}

impl CacheLine {
    pub fn is_occupied(&self) -> bool {
        self.occupied
    }
    /// stored block, if any.
    pub fn block(&self) -> Option<BlockId> {
        self.occupied.then_some(self.block)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessResult {
    Hit,
    Miss,
}

impl AccessResult {
    /// Returns `true` if the access result is [`Hit`].
    ///
    /// [`Hit`]: AccessResult::Hit
    #[must_use]
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit)
    }
}

impl fmt::Display for AccessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessResult::Hit => write!(f, "hit"),
            AccessResult::Miss => write!(f, "miss"),
        }
    }
}

/// What a single access did to the line array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessOutcome {
    pub result: AccessResult,
    pub block: BlockId,
    pub set: usize,
    /// line that matched or received the block
    pub line: usize,
    /// previous occupant, when a full set had to replace one
    pub evicted: Option<BlockId>,
}

/// Set-associative cache with FIFO replacement.
///
/// Lines `set * lines_per_set .. (set + 1) * lines_per_set` make up `set`.
/// Hits never change the replacement order: the victim of a full set is
/// always the line filled longest ago, and a replaced line goes to the back
/// of its set's queue.
pub struct SetAssociativeCache {
    geometry: Geometry,
    lines: Vec<CacheLine>,
    eviction: Vec<VecDeque<usize>>,
    hits: u64,
    misses: u64,
}

impl SetAssociativeCache {
    pub fn new(total_lines: usize, lines_per_set: usize) -> Result<Self, ConfigError> {
        Ok(Self::with_geometry(Geometry::new(total_lines, lines_per_set)?))
    }
    pub fn with_geometry(geometry: Geometry) -> Self {
        Self {
            geometry,
            lines: vec![CacheLine::default(); geometry.total_lines()],
            eviction: (0..geometry.number_of_sets())
                .map(|_| VecDeque::with_capacity(geometry.lines_per_set()))
                .collect(),
            hits: 0,
            misses: 0,
        }
    }
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }
    pub fn hit_count(&self) -> u64 {
        self.hits
    }
    pub fn miss_count(&self) -> u64 {
        self.misses
    }
    pub fn access_count(&self) -> u64 {
        self.hits + self.misses
    }
    pub fn lines(&self) -> &[CacheLine] {
        &self.lines
    }
    pub fn set_of(&self, block: BlockId) -> usize {
        block.into_usize() % self.geometry.number_of_sets()
    }
    fn set_range(&self, set: usize) -> Range<usize> {
        let begin = set * self.geometry.lines_per_set();
        begin..begin + self.geometry.lines_per_set()
    }
    pub fn set_lines(&self, set: usize) -> &[CacheLine] {
        &self.lines[self.set_range(set)]
    }
    /// line indices of `set`, next victim first.
    pub fn eviction_order(&self, set: usize) -> impl Iterator<Item = usize> + '_ {
        self.eviction[set].iter().copied()
    }
    pub fn occupied(&self) -> usize {
        self.lines.iter().filter(|l| l.occupied).count()
    }
    pub fn contains(&self, block: BlockId) -> bool {
        self.set_lines(self.set_of(block))
            .iter()
            .any(|l| l.block() == Some(block))
    }
    pub fn snapshot(&self) -> SnapshotView<'_> {
        SnapshotView::new(&self.lines)
    }
    pub fn access(&mut self, block: BlockId) -> AccessResult {
        self.access_detailed(block).result
    }
    pub fn access_detailed(&mut self, block: BlockId) -> AccessOutcome {
        let set = self.set_of(block);
        for index in self.set_range(set) {
            let line = &mut self.lines[index];
            if !line.occupied {
                line.occupied = true;
                line.block = block;
                self.eviction[set].push_back(index);
                self.misses += 1;
                return AccessOutcome {
                    result: AccessResult::Miss,
                    block,
                    set,
                    line: index,
                    evicted: None,
                };
            }
            if line.block == block {
                self.hits += 1;
                return AccessOutcome {
                    result: AccessResult::Hit,
                    block,
                    set,
                    line: index,
                    evicted: None,
                };
            }
        }
        // every line of a full set sits in its queue exactly once
        let Some(index) = self.eviction[set].pop_front() else {
            unreachable!("set {set} is full but has no queued line");
        };
        let evicted = std::mem::replace(&mut self.lines[index].block, block);
        self.eviction[set].push_back(index);
        self.misses += 1;
        log::trace!("set {set}: line {index:03} {evicted} -> {block}");
        AccessOutcome {
            result: AccessResult::Miss,
            block,
            set,
            line: index,
            evicted: Some(evicted),
        }
    }
}

#[cfg(feature = "stat")]
impl AddStats for SetAssociativeCache {
    fn add_stats(&self, buf: &mut Stats) {
        buf.push(Box::new(stat::HitStat {
            hit_count: self.hits,
            miss_count: self.misses,
        }));
        buf.push(Box::new(stat::OccupancyStat {
            lines_per_set: self.geometry.lines_per_set(),
            per_set: (0..self.geometry.number_of_sets())
                .map(|s| self.set_lines(s).iter().filter(|l| l.occupied).count())
                .collect(),
        }));
    }
}

#[cfg(feature = "stat")]
mod stat {
    use std::fmt;

    use crate::stat::*;

    #[derive(Default, Clone, Copy)]
    pub struct HitStat {
        pub hit_count: u64,
        pub miss_count: u64,
    }

    impl Stat for HitStat {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(HitStatView { stat: self })
        }
    }

    pub struct HitStatView<'a> {
        stat: &'a HitStat,
    }

    impl StatView for HitStatView<'_> {
        fn header(&self) -> &'static str {
            "cache stat"
        }
        fn width(&self) -> usize {
            33
        }
    }

    impl fmt::Display for HitStatView<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let hit = self.stat.hit_count;
            let miss = self.stat.miss_count;
            let total = (hit + miss).max(1);
            let hit_pct = format!("{:.6}", 100. * hit as f64 / total as f64);
            let miss_pct = format!("{:.6}", 100. * miss as f64 / total as f64);
            writeln!(f, "      hit: {hit:>10} ({hit_pct:>10}%)")?;
            write!(f, "     miss: {miss:>10} ({miss_pct:>10}%)")
        }
    }

    pub struct OccupancyStat {
        pub lines_per_set: usize,
        pub per_set: Vec<usize>,
    }

    const CELL_WIDTH: usize = 14;

    impl Stat for OccupancyStat {
        fn view(&self, max_width: usize) -> Box<dyn StatView + '_> {
            Box::new(OccupancyStatView {
                stat: self,
                chunk_size: OccupancyStatView::chunk_size(max_width),
            })
        }
    }

    pub struct OccupancyStatView<'a> {
        stat: &'a OccupancyStat,
        chunk_size: usize,
    }

    impl Width for OccupancyStatView<'_> {
        fn width_by_chunk_size(chunk_size: usize) -> usize {
            chunk_size * CELL_WIDTH
        }
    }

    impl StatView for OccupancyStatView<'_> {
        fn header(&self) -> &'static str {
            "occupancy per set"
        }
        fn width(&self) -> usize {
            Self::width_by_chunk_size(self.chunk_size.min(self.stat.per_set.len()))
        }
    }

    impl fmt::Display for OccupancyStatView<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let ways = self.stat.lines_per_set;
            for (row, chunk) in self.stat.per_set.chunks(self.chunk_size).enumerate() {
                if row != 0 {
                    writeln!(f)?;
                }
                for (i, used) in chunk.iter().enumerate() {
                    let set = row * self.chunk_size + i;
                    let cell = format!("{used}/{ways}");
                    write!(f, "  {set:>4}: {cell:<6}")?;
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::LineSize;

    fn b(v: u32) -> BlockId {
        BlockId::new(v)
    }

    #[test]
    fn test_construct() {
        let c = SetAssociativeCache::new(8, 2).unwrap();
        assert_eq!(4, c.geometry().number_of_sets());
        assert_eq!(8, c.lines().len());
        assert_eq!(0, c.occupied());
        assert!(c.lines().iter().all(|l| !l.is_occupied()));
        assert!(SetAssociativeCache::new(8, 3).is_err());
        assert!(SetAssociativeCache::new(0, 1).is_err());
        assert!(SetAssociativeCache::new(8, 0).is_err());
    }

    #[test]
    fn test_same_block_hits() {
        let l = LineSize::new(1024).unwrap();
        let mut c = SetAssociativeCache::new(8, 2).unwrap();
        assert_eq!(AccessResult::Miss, c.access(l.block_of(0x0000_0000)));
        assert_eq!(AccessResult::Hit, c.access(l.block_of(0x0000_03FF)));
        assert_eq!(1, c.hit_count());
        assert_eq!(1, c.miss_count());
    }

    #[test]
    fn test_different_blocks_miss() {
        // 0x400 is the next line with 1024 byte lines
        let l = LineSize::new(1024).unwrap();
        let mut c = SetAssociativeCache::new(8, 2).unwrap();
        assert_eq!(AccessResult::Miss, c.access(l.block_of(0x0000_0000)));
        assert_eq!(AccessResult::Miss, c.access(l.block_of(0x0000_0400)));
        assert_eq!(0, c.hit_count());
        assert_eq!(2, c.miss_count());
    }

    #[test]
    fn test_repeated_hits_keep_state() {
        let mut c = SetAssociativeCache::new(8, 2).unwrap();
        assert_eq!(AccessResult::Miss, c.access(b(5)));
        let lines = c.lines().to_vec();
        let order: Vec<_> = c.eviction_order(1).collect();
        assert_eq!(AccessResult::Hit, c.access(b(5)));
        assert_eq!(AccessResult::Hit, c.access(b(5)));
        assert_eq!(lines, c.lines());
        assert_eq!(order, c.eviction_order(1).collect::<Vec<_>>());
        assert_eq!(2, c.hit_count());
    }

    #[test]
    fn test_first_free_line_wins() {
        let mut c = SetAssociativeCache::new(8, 2).unwrap();
        let o = c.access_detailed(b(1));
        assert_eq!((1, 2), (o.set, o.line));
        let o = c.access_detailed(b(5));
        assert_eq!((1, 3), (o.set, o.line));
        assert_eq!(Some(b(1)), c.lines()[2].block());
        assert_eq!(Some(b(5)), c.lines()[3].block());
    }

    #[test]
    fn test_set_mapping() {
        let c = SetAssociativeCache::new(8, 2).unwrap();
        for v in 0..64 {
            assert_eq!(c.set_of(b(v)), c.set_of(b(v + 4)));
            assert_eq!(v as usize % 4, c.set_of(b(v)));
        }
        let mut c = SetAssociativeCache::new(8, 2).unwrap();
        c.access(b(7));
        c.access(b(3));
        c.access(b(11));
        assert!(c.set_lines(0).iter().all(|l| !l.is_occupied()));
        assert_eq!(2, c.set_lines(3).iter().filter(|l| l.is_occupied()).count());
    }

    #[test]
    fn test_fifo_without_refresh() {
        let mut c = SetAssociativeCache::new(4, 1).unwrap();
        assert_eq!(AccessResult::Miss, c.access(b(0)));
        let o = c.access_detailed(b(4));
        assert_eq!(AccessResult::Miss, o.result);
        assert_eq!(Some(b(0)), o.evicted);
        assert_eq!(AccessResult::Miss, c.access(b(0)));
        assert_eq!(3, c.miss_count());
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut c = SetAssociativeCache::new(8, 2).unwrap();
        assert_eq!(AccessResult::Miss, c.access(b(2)));
        assert_eq!(AccessResult::Miss, c.access(b(6)));
        // a hit on the oldest block does not save it
        assert_eq!(AccessResult::Hit, c.access(b(2)));
        let o = c.access_detailed(b(10));
        assert_eq!(AccessResult::Miss, o.result);
        assert_eq!(Some(b(2)), o.evicted);
        assert_eq!(4, o.line);
        assert!(!c.contains(b(2)));
        assert!(c.contains(b(6)));
        assert_eq!(AccessResult::Miss, c.access(b(2)));
        assert!(!c.contains(b(6)));
    }

    #[test]
    fn test_replaced_line_requeued() {
        let mut c = SetAssociativeCache::new(3, 3).unwrap();
        for v in 0..3 {
            c.access(b(v));
        }
        assert_eq!(vec![0, 1, 2], c.eviction_order(0).collect::<Vec<_>>());
        let evictions: Vec<_> = (3..12)
            .map(|v| {
                let o = c.access_detailed(b(v));
                (o.line, o.evicted.unwrap().into_inner())
            })
            .collect();
        assert_eq!(
            vec![
                (0, 0),
                (1, 1),
                (2, 2),
                (0, 3),
                (1, 4),
                (2, 5),
                (0, 6),
                (1, 7),
                (2, 8)
            ],
            evictions
        );
        assert_eq!(3, c.eviction_order(0).count());
    }

    #[test]
    fn test_capacity_and_conservation() {
        let mut c = SetAssociativeCache::new(16, 4).unwrap();
        let mut seed = 0x2545_F491u32;
        for n in 1..=2000u64 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
            c.access(b((seed >> 16) % 97));
            assert_eq!(n, c.hit_count() + c.miss_count());
            assert!(c.occupied() <= 16);
            for set in 0..4 {
                let mut blocks: Vec<_> =
                    c.set_lines(set).iter().filter_map(CacheLine::block).collect();
                assert!(blocks.iter().all(|blk| c.set_of(*blk) == set));
                let len = blocks.len();
                blocks.sort();
                blocks.dedup();
                assert_eq!(len, blocks.len());
                assert_eq!(len, c.eviction_order(set).count());
            }
        }
    }
}
