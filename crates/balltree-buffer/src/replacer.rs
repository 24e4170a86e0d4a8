//! Victim selection for the buffer pool.

use crate::frame::FrameId;

/// Chooses which resident page gives up its frame.
pub trait Replacer {
    /// Notes a use of `frame_id`.
    fn record_access(&mut self, frame_id: FrameId);

    /// Marks a frame as evictable (holding a page) or not.
    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool);

    /// Selects a victim frame for eviction.
    ///
    /// Returns None if no frames are evictable.
    fn evict(&mut self) -> Option<FrameId>;

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;
}

/// Clock (second-chance) replacement.
///
/// The clock hand sweeps the frames in a circle. When selecting a victim:
/// 1. Skip frames that are not evictable
/// 2. If the frame's reference bit is set, clear it and advance
/// 3. Otherwise the frame is the victim
///
/// If every evictable frame is referenced, the first sweep clears all bits
/// and the frame under the hand where the sweep began is chosen on the
/// second pass.
pub struct ClockReplacer {
    /// Total number of frames.
    num_frames: usize,
    /// Reference bits for each frame.
    reference_bits: Vec<bool>,
    /// Evictable flag for each frame.
    evictable: Vec<bool>,
    /// Number of evictable frames.
    evictable_count: usize,
    /// Current clock hand position.
    clock_hand: usize,
}

impl ClockReplacer {
    /// Creates a replacer tracking `num_frames` frames, none evictable.
    pub fn new(num_frames: usize) -> Self {
        Self {
            num_frames,
            reference_bits: vec![false; num_frames],
            evictable: vec![false; num_frames],
            evictable_count: 0,
            clock_hand: 0,
        }
    }
}

impl Replacer for ClockReplacer {
    fn record_access(&mut self, frame_id: FrameId) {
        if frame_id.index() < self.num_frames {
            self.reference_bits[frame_id.index()] = true;
        }
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        let idx = frame_id.index();
        if idx >= self.num_frames || self.evictable[idx] == evictable {
            return;
        }
        self.evictable[idx] = evictable;
        if evictable {
            self.evictable_count += 1;
        } else {
            self.evictable_count -= 1;
        }
    }

    fn evict(&mut self) -> Option<FrameId> {
        if self.evictable_count == 0 {
            return None;
        }

        // The first rotation clears every reference bit it passes, so the
        // second rotation is guaranteed to find a victim.
        for _ in 0..(2 * self.num_frames) {
            let hand = self.clock_hand;
            self.clock_hand = (hand + 1) % self.num_frames;

            if !self.evictable[hand] {
                continue;
            }
            if self.reference_bits[hand] {
                self.reference_bits[hand] = false;
                continue;
            }

            self.evictable[hand] = false;
            self.evictable_count -= 1;
            return Some(FrameId(hand as u32));
        }

        None
    }

    fn size(&self) -> usize {
        self.evictable_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replacer_with(num_frames: usize, evictable: &[u32]) -> ClockReplacer {
        let mut replacer = ClockReplacer::new(num_frames);
        for &i in evictable {
            replacer.set_evictable(FrameId(i), true);
        }
        replacer
    }

    #[test]
    fn test_clock_replacer_new() {
        let replacer = ClockReplacer::new(10);
        assert_eq!(replacer.num_frames, 10);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.clock_hand, 0);
    }

    #[test]
    fn test_clock_replacer_set_evictable() {
        let mut replacer = replacer_with(10, &[0, 1, 2]);
        assert_eq!(replacer.size(), 3);

        replacer.set_evictable(FrameId(1), false);
        assert_eq!(replacer.size(), 2);

        // Setting the same state twice is a no-op
        replacer.set_evictable(FrameId(0), true);
        assert_eq!(replacer.size(), 2);
    }

    #[test]
    fn test_clock_replacer_evict_empty() {
        let mut replacer = ClockReplacer::new(10);
        assert!(replacer.evict().is_none());
    }

    #[test]
    fn test_clock_replacer_evict_single() {
        let mut replacer = replacer_with(10, &[5]);

        assert_eq!(replacer.evict(), Some(FrameId(5)));
        assert_eq!(replacer.size(), 0);
        assert!(replacer.evict().is_none());
    }

    #[test]
    fn test_clock_replacer_skips_referenced() {
        let mut replacer = replacer_with(10, &[0, 1, 2]);
        replacer.record_access(FrameId(0));
        replacer.record_access(FrameId(1));

        // Frame 2 is the first unreferenced frame under the hand
        assert_eq!(replacer.evict(), Some(FrameId(2)));

        // Passing frames 0 and 1 cleared their reference bits
        assert!(!replacer.reference_bits[0]);
        assert!(!replacer.reference_bits[1]);
    }

    #[test]
    fn test_clock_replacer_all_referenced_second_pass() {
        let mut replacer = replacer_with(3, &[0, 1, 2]);
        for i in 0..3 {
            replacer.record_access(FrameId(i));
        }

        // First sweep clears all bits, second pass takes the frame where it began
        assert_eq!(replacer.evict(), Some(FrameId(0)));
        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.clock_hand, 1);
    }

    #[test]
    fn test_clock_replacer_second_chance_order() {
        let mut replacer = replacer_with(4, &[0, 1, 2, 3]);

        assert_eq!(replacer.evict(), Some(FrameId(0)));
        replacer.set_evictable(FrameId(0), true);
        replacer.record_access(FrameId(0));

        // Hand continues from frame 1
        assert_eq!(replacer.evict(), Some(FrameId(1)));
        assert_eq!(replacer.evict(), Some(FrameId(2)));
        assert_eq!(replacer.evict(), Some(FrameId(3)));
        // Frame 0 lost its second chance on the way round
        assert_eq!(replacer.evict(), Some(FrameId(0)));
    }

    #[test]
    fn test_clock_replacer_reinstated_victim() {
        let mut replacer = replacer_with(2, &[0, 1]);
        replacer.record_access(FrameId(1));

        // A victim handed back to the replacer competes again
        assert_eq!(replacer.evict(), Some(FrameId(0)));
        replacer.set_evictable(FrameId(0), true);
        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.evict(), Some(FrameId(0)));
    }

    #[test]
    fn test_clock_replacer_out_of_bounds() {
        let mut replacer = ClockReplacer::new(5);

        // These should not panic
        replacer.set_evictable(FrameId(100), true);
        replacer.record_access(FrameId(100));

        assert_eq!(replacer.size(), 0);
        assert!(replacer.reference_bits.iter().all(|&r| !r));
    }

    #[test]
    fn test_clock_replacer_fifo_without_references() {
        let mut replacer = replacer_with(5, &[0, 1, 2, 3, 4]);

        for i in 0..5 {
            assert_eq!(replacer.evict(), Some(FrameId(i)));
        }
        assert_eq!(replacer.size(), 0);
    }
}
