//! # Communication Settings
//!
//! Immutable per-connection request/response sizing, and the rotation logic that
//! derives the next iteration's sizes from the current ones. Grounded in
//! `original_source/src/comsettings.hpp`'s min/max/step fields; the mode (fixed,
//! random, sweep) is derived rather than stored, per spec.md §3.

use rand::Rng;

pub const MIN_FRAME_SIZE: u32 = crate::protocol::HEADER_LEN as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeMode {
    Fixed,
    Random,
    Sweep,
}

/// Min/max/step for one direction (request or response sizes).
#[derive(Debug, Clone, Copy)]
pub struct SizeRange {
    pub min: u32,
    pub max: u32,
    pub step: u32,
}

impl SizeRange {
    pub fn new(min: u32, max: u32, step: u32) -> Self {
        Self { min, max, step }
    }

    pub fn mode(&self) -> SizeMode {
        if self.step == 0 && self.min == self.max {
            SizeMode::Fixed
        } else if self.step == 0 {
            SizeMode::Random
        } else {
            SizeMode::Sweep
        }
    }

    /// Size for the very first iteration: always the range's minimum.
    pub fn initial(&self) -> u32 {
        self.min
    }

    /// Derives the next size from `current`, per spec.md §4.4 step 5.
    pub fn next(&self, current: u32, rng: &mut impl Rng) -> u32 {
        match self.mode() {
            SizeMode::Fixed => current,
            SizeMode::Random => rng.gen_range(self.min..=self.max),
            SizeMode::Sweep => {
                let advanced = current.saturating_add(self.step);
                if advanced > self.max {
                    self.min
                } else {
                    advanced
                }
            }
        }
    }
}

/// Immutable communication settings for one connection: independent request and
/// response size ranges.
#[derive(Debug, Clone, Copy)]
pub struct ComSettings {
    pub request: SizeRange,
    pub response: SizeRange,
    /// Carried over from `original_source/src/comsettings.hpp` for wire/config
    /// compatibility with the original tool. Never read by any operation here; see
    /// DESIGN.md for the decision record.
    pub disconnect: bool,
}

impl ComSettings {
    pub fn new(request: SizeRange, response: SizeRange) -> Self {
        Self {
            request,
            response,
            disconnect: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn mode_classification() {
        assert_eq!(SizeRange::new(100, 100, 0).mode(), SizeMode::Fixed);
        assert_eq!(SizeRange::new(100, 200, 0).mode(), SizeMode::Random);
        assert_eq!(SizeRange::new(100, 200, 10).mode(), SizeMode::Sweep);
    }

    #[test]
    fn sweep_wraps_to_minimum_when_exceeding_maximum() {
        let range = SizeRange::new(100, 120, 15);
        let mut rng = StdRng::seed_from_u64(0);
        let mut size = range.initial();
        size = range.next(size, &mut rng);
        assert_eq!(size, 115);
        size = range.next(size, &mut rng);
        // 115 + 15 = 130 > 120, wraps to min
        assert_eq!(size, 100);
    }

    #[test]
    fn fixed_mode_never_changes() {
        let range = SizeRange::new(512, 512, 0);
        let mut rng = StdRng::seed_from_u64(1);
        let mut size = range.initial();
        for _ in 0..5 {
            size = range.next(size, &mut rng);
            assert_eq!(size, 512);
        }
    }

    #[test]
    fn random_mode_stays_within_bounds() {
        let range = SizeRange::new(200, 300, 0);
        let mut rng = StdRng::seed_from_u64(2);
        let mut size = range.initial();
        for _ in 0..50 {
            size = range.next(size, &mut rng);
            assert!(size >= 200 && size <= 300);
        }
    }
}
