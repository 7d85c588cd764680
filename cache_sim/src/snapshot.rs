use std::fmt;

use crate::cache::CacheLine;

/// Line table of a cache, one row per line:
///
/// ```text
/// ================
/// IDX V ** ADDR **
/// 000 1 0x00000000
/// 001 0
/// ```
pub struct SnapshotView<'a> {
    lines: &'a [CacheLine],
}

impl<'a> SnapshotView<'a> {
    pub fn new(lines: &'a [CacheLine]) -> Self {
        Self { lines }
    }
}

impl fmt::Display for SnapshotView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "================")?;
        writeln!(f, "IDX V ** ADDR **")?;
        for (index, line) in self.lines.iter().enumerate() {
            write!(f, "{index:03} {} ", u8::from(line.is_occupied()))?;
            if let Some(block) = line.block() {
                write!(f, "{block}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
