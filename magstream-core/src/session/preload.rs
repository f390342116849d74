//! Preload selection: which pieces to fetch first so playback can start
//! before the download completes.

use std::ops::Range;

use super::piece_map::PieceMap;
use crate::engine::{Priority, SwarmEngine};

/// Pieces requested at high priority once metadata arrives.
///
/// The leading `preload_count` pieces let playback start immediately and
/// the final piece carries container metadata most players seek to first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreloadPlan {
    total_pieces: u32,
    preload_count: u32,
}

impl PreloadPlan {
    /// Computes `round(total_pieces * ratio)`, clamped to `[1, total_pieces]`
    /// for non-empty torrents.
    pub fn new(total_pieces: u32, ratio: f64) -> Self {
        let preload_count = if total_pieces == 0 {
            0
        } else {
            ((f64::from(total_pieces) * ratio).round() as u32).clamp(1, total_pieces)
        };
        Self {
            total_pieces,
            preload_count,
        }
    }

    pub fn total_pieces(&self) -> u32 {
        self.total_pieces
    }

    pub fn preload_count(&self) -> u32 {
        self.preload_count
    }

    pub fn preload_range(&self) -> Range<u32> {
        0..self.preload_count
    }

    pub fn final_piece(&self) -> Option<u32> {
        self.total_pieces.checked_sub(1)
    }

    /// Requests the preload window and the final piece at high priority.
    pub fn apply(&self, engine: &dyn SwarmEngine) {
        if self.preload_count > 0 {
            engine.select_range(self.preload_range(), Priority::High);
        }
        if let Some(last) = self.final_piece() {
            engine.select_range(last..last + 1, Priority::High);
        }
    }

    /// Seek readiness: the final piece and the whole preload window are verified.
    pub fn is_video_ready(&self, pieces: &PieceMap) -> bool {
        match self.final_piece() {
            Some(last) => pieces.is_verified(last) && pieces.all_verified(self.preload_range()),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::engine::{EngineCall, MockSwarmFactory, SwarmEngineFactory};

    #[test]
    fn test_preload_count_rounding() {
        assert_eq!(PreloadPlan::new(10_000, 0.001).preload_count(), 10);
        assert_eq!(PreloadPlan::new(2_600, 0.001).preload_count(), 3);
        assert_eq!(PreloadPlan::new(1_400, 0.001).preload_count(), 1);
    }

    #[test]
    fn test_small_torrents_preload_at_least_one_piece() {
        assert_eq!(PreloadPlan::new(40, 0.001).preload_count(), 1);
        assert_eq!(PreloadPlan::new(1, 0.001).preload_count(), 1);
        assert_eq!(PreloadPlan::new(0, 0.001).preload_count(), 0);
        assert_eq!(PreloadPlan::new(5, 2.0).preload_count(), 5);
    }

    #[test]
    fn test_apply_selects_preload_window_and_final_piece() {
        let factory = MockSwarmFactory::new();
        let magnet = "magnet:?xt=urn:btih:dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c"
            .parse()
            .unwrap();
        let (engine, _events) = factory.open(&magnet, std::path::Path::new(".")).unwrap();

        PreloadPlan::new(5_000, 0.001).apply(engine.as_ref());

        let control = factory.last().unwrap();
        assert_eq!(
            control.calls(),
            vec![
                EngineCall::SelectRange {
                    pieces: 0..5,
                    priority: Priority::High
                },
                EngineCall::SelectRange {
                    pieces: 4_999..5_000,
                    priority: Priority::High
                },
            ]
        );
    }

    #[test]
    fn test_video_ready_requires_final_piece() {
        let plan = PreloadPlan::new(10, 0.2);
        let mut pieces = PieceMap::new(10);
        pieces.mark_verified(0);
        pieces.mark_verified(1);
        assert!(!plan.is_video_ready(&pieces));

        pieces.mark_verified(9);
        assert!(plan.is_video_ready(&pieces));
    }

    #[test]
    fn test_video_ready_requires_whole_preload_window() {
        let plan = PreloadPlan::new(10, 0.3);
        let mut pieces = PieceMap::new(10);
        pieces.mark_verified(0);
        pieces.mark_verified(2);
        pieces.mark_verified(9);
        assert!(!plan.is_video_ready(&pieces));
    }

    proptest! {
        #[test]
        fn prop_video_ready_iff_final_and_preload_verified(
            total in 1u32..500,
            ratio in 0.0f64..0.2,
            verified in prop::collection::vec(0u32..500, 0..300),
        ) {
            let plan = PreloadPlan::new(total, ratio);
            let mut pieces = PieceMap::new(total);
            for index in &verified {
                pieces.mark_verified(*index);
            }

            let expected = pieces.is_verified(total - 1)
                && (0..plan.preload_count()).all(|i| pieces.is_verified(i));
            prop_assert_eq!(plan.is_video_ready(&pieces), expected);
            prop_assert!(plan.preload_count() >= 1 && plan.preload_count() <= total);
        }
    }
}
