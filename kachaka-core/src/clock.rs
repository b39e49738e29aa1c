//! Strictly increasing cursor generation.

use kachaka_types::Cursor;
use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Where a [`CursorClock`] takes its values from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorSource {
    /// Unix time in milliseconds, forced past the previous cursor when two
    /// writes land in the same millisecond (or the clock steps back).
    #[default]
    WallClock,
    /// A plain counter starting at 1.
    Sequence,
}

/// Generates the cursors a store stamps its writes with.
///
/// Every tick is strictly greater than the previous one and greater than
/// the sentinel, whatever the source.
#[derive(Debug, Clone, Default)]
pub struct CursorClock {
    source: CursorSource,
    last: Cursor,
}

impl CursorClock {
    /// Create a clock using the given source.
    pub fn new(source: CursorSource) -> Self {
        Self {
            source,
            last: Cursor::zero(),
        }
    }

    /// Epoch-millisecond cursors.
    pub fn wall_clock() -> Self {
        Self::new(CursorSource::WallClock)
    }

    /// Counter cursors: 1, 2, 3, ...
    pub fn sequence() -> Self {
        Self::new(CursorSource::Sequence)
    }

    /// The source this clock reads.
    pub fn source(&self) -> CursorSource {
        self.source
    }

    /// The most recently issued cursor (the sentinel before the first tick).
    pub fn last(&self) -> Cursor {
        self.last
    }

    /// Issue the next cursor.
    pub fn tick(&mut self) -> Cursor {
        let floor = self.last.value().saturating_add(1);
        let value = match self.source {
            CursorSource::WallClock => unix_millis().max(floor),
            CursorSource::Sequence => floor,
        };
        self.last = Cursor::new(value);
        self.last
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_counts_from_one() {
        let mut clock = CursorClock::sequence();
        assert_eq!(clock.last(), Cursor::zero());
        assert_eq!(clock.tick(), Cursor::new(1));
        assert_eq!(clock.tick(), Cursor::new(2));
        assert_eq!(clock.last(), Cursor::new(2));
    }

    #[test]
    fn wall_clock_is_strictly_increasing_within_a_millisecond() {
        let mut clock = CursorClock::wall_clock();
        let mut previous = clock.tick();
        // Far more ticks than milliseconds elapse
        for _ in 0..10_000 {
            let next = clock.tick();
            assert!(next > previous, "{:?} should exceed {:?}", next, previous);
            previous = next;
        }
    }

    #[test]
    fn wall_clock_starts_near_now() {
        let mut clock = CursorClock::wall_clock();
        let before = unix_millis();
        let cursor = clock.tick();
        assert!(cursor.value() >= before);
    }

    #[test]
    fn first_tick_is_never_the_sentinel() {
        for source in [CursorSource::WallClock, CursorSource::Sequence] {
            let mut clock = CursorClock::new(source);
            assert!(!clock.tick().is_zero());
        }
    }

    #[test]
    fn default_source_is_wall_clock() {
        assert_eq!(CursorClock::default().source(), CursorSource::WallClock);
    }
}
