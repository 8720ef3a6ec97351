///! Pluggable "find the next initialized tick" strategy. The spec leaves
///! tick discovery unspecified beyond "any strategy that yields the same
///! next-initialized tick is conformant" — this module ships the sorted-map
///! default plus an alternate bitmap-backed strategy grounded on the
///! teacher's `states/tick_bitmap.rs` and `libraries/bit_math.rs`.
use std::collections::BTreeMap;

use crate::fixed_point::U256;
use crate::tick::TickInfo;

/// Locates the next initialized tick at or beyond a starting point, in a
/// given direction of travel. `lte` selects "at or to the left" (price
/// falling, `zeroForOne`) vs. "strictly to the right" (price rising). The
/// live tick table is always passed in: `LinearTickDiscovery` searches it
/// directly, while `BitmapTickDiscovery` ignores it and searches its own
/// synced bitmap instead (kept in sync via `flip_tick`, called by the
/// engine alongside every `TickInfo` flip).
pub trait TickDiscovery {
    fn next_initialized(
        &self,
        ticks: &BTreeMap<i32, TickInfo>,
        tick_spacing: i32,
        from: i32,
        lte: bool,
    ) -> Option<i32>;

    /// Notifies the strategy that `tick`'s initialized state flipped.
    /// `LinearTickDiscovery` needs no bookkeeping of its own; strategies
    /// that maintain an auxiliary index override this.
    fn on_flip(&mut self, _tick_spacing: i32, _tick: i32) {}
}

/// Walks the tick table's sorted keys directly. Mirrors how the teacher's
/// own pool iterates ticks before any bitmap is consulted; this is the
/// engine's default because it needs no auxiliary structure kept in sync.
#[derive(Default)]
pub struct LinearTickDiscovery;

impl TickDiscovery for LinearTickDiscovery {
    fn next_initialized(
        &self,
        ticks: &BTreeMap<i32, TickInfo>,
        _tick_spacing: i32,
        from: i32,
        lte: bool,
    ) -> Option<i32> {
        if lte {
            ticks.range(..=from).next_back().map(|(&tick, _)| tick)
        } else {
            ticks.range((from + 1)..).next().map(|(&tick, _)| tick)
        }
    }
}

/// A 256-bit-per-word packed bitmap of initialized ticks, keyed by
/// `tick / tick_spacing >> 8`. Offered as an alternate, equally-conformant
/// strategy — grounded on the teacher's `TickBitmapState`/`bit_math`, ported
/// from Anchor zero-copy accounts onto a plain `HashMap<i16, U256>`.
#[derive(Default)]
pub struct BitmapTickDiscovery {
    words: std::collections::HashMap<i16, U256>,
}

struct Position {
    word_pos: i16,
    bit_pos: u8,
}

fn position(tick_by_spacing: i32) -> Position {
    Position {
        word_pos: (tick_by_spacing >> 8) as i16,
        bit_pos: (tick_by_spacing.rem_euclid(256)) as u8,
    }
}

fn most_significant_bit(x: U256) -> u8 {
    let mut msb = 0u8;
    let mut x = x;
    for shift in [128u32, 64, 32, 16, 8, 4, 2, 1] {
        if x >= (U256::one() << shift as usize) {
            msb += shift as u8;
            x >>= shift as usize;
        }
    }
    msb
}

fn least_significant_bit(x: U256) -> u8 {
    debug_assert!(!x.is_zero());
    let mut low = 0u8;
    let mut high = 255u8;
    // binary search for the lowest set bit via successive halving of the
    // masked-low range
    while low < high {
        let mid = low + (high - low) / 2;
        let mask = (U256::one() << (mid as usize + 1)) - U256::one();
        if (x & mask).is_zero() {
            low = mid + 1;
        } else {
            high = mid;
        }
    }
    low
}

impl BitmapTickDiscovery {
    pub fn flip_tick(&mut self, tick_spacing: i32, tick: i32) {
        debug_assert_eq!(tick % tick_spacing, 0);
        let pos = position(tick / tick_spacing);
        let word = self.words.entry(pos.word_pos).or_insert_with(U256::zero);
        *word ^= U256::one() << pos.bit_pos as usize;
    }

    fn next_initialized_bit(&self, tick_spacing: i32, from: i32, lte: bool) -> Option<i32> {
        let compressed = from / tick_spacing;
        let pos = position(compressed);
        let word = *self.words.get(&pos.word_pos).unwrap_or(&U256::zero());

        if lte {
            let mask = (U256::one() << pos.bit_pos as usize)
                - U256::one()
                + (U256::one() << pos.bit_pos as usize);
            let masked = word & mask;
            if masked.is_zero() {
                None
            } else {
                let bit = most_significant_bit(masked);
                Some((compressed - (pos.bit_pos - bit) as i32) * tick_spacing)
            }
        } else {
            let mask = !((U256::one() << pos.bit_pos as usize) - U256::one());
            let masked = word & mask;
            if masked.is_zero() {
                None
            } else {
                let bit = least_significant_bit(masked);
                Some((compressed + (bit - pos.bit_pos) as i32) * tick_spacing)
            }
        }
    }
}

impl TickDiscovery for BitmapTickDiscovery {
    fn next_initialized(
        &self,
        _ticks: &BTreeMap<i32, TickInfo>,
        tick_spacing: i32,
        from: i32,
        lte: bool,
    ) -> Option<i32> {
        self.next_initialized_bit(tick_spacing, from, lte)
    }

    fn on_flip(&mut self, tick_spacing: i32, tick: i32) {
        self.flip_tick(tick_spacing, tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_finds_nearest_tick_at_or_below() {
        let mut ticks = BTreeMap::new();
        ticks.insert(-120, TickInfo::default());
        ticks.insert(60, TickInfo::default());
        ticks.insert(180, TickInfo::default());
        let disc = LinearTickDiscovery;
        assert_eq!(disc.next_initialized(&ticks, 60, 100, true), Some(60));
        assert_eq!(disc.next_initialized(&ticks, 60, 60, true), Some(60));
    }

    #[test]
    fn linear_finds_nearest_tick_strictly_above() {
        let mut ticks = BTreeMap::new();
        ticks.insert(-120, TickInfo::default());
        ticks.insert(60, TickInfo::default());
        let disc = LinearTickDiscovery;
        assert_eq!(disc.next_initialized(&ticks, 60, 0, false), Some(60));
        assert_eq!(disc.next_initialized(&ticks, 60, 60, false), None);
    }

    #[test]
    fn bitmap_round_trips_flip_and_search() {
        let mut bmp = BitmapTickDiscovery::default();
        let ticks = BTreeMap::new();
        bmp.on_flip(60, -120);
        bmp.on_flip(60, 600);
        assert_eq!(bmp.next_initialized(&ticks, 60, 0, true), Some(-120));
        assert_eq!(bmp.next_initialized(&ticks, 60, 0, false), Some(600));
    }

    #[test]
    fn bitmap_returns_none_when_word_empty() {
        let bmp = BitmapTickDiscovery::default();
        let ticks = BTreeMap::new();
        assert_eq!(bmp.next_initialized(&ticks, 60, 0, true), None);
    }
}
