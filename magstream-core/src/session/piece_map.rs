//! Per-torrent piece verification status.

use std::ops::Range;

/// Pieces per bucket in the condensed reporting view.
pub const PIECE_MAP_BUCKET: usize = 100;

/// Verification status of a single piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceStatus {
    Missing,
    Verified,
}

impl PieceStatus {
    /// Single-character form used in status reports.
    pub fn symbol(self) -> char {
        match self {
            PieceStatus::Missing => '.',
            PieceStatus::Verified => '*',
        }
    }
}

/// Bitset of piece verification status indexed by piece number.
///
/// Empty until metadata is known, then sized to the torrent's piece count
/// with every piece Missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PieceMap {
    verified: Vec<bool>,
    verified_count: usize,
}

impl PieceMap {
    /// Creates a map of `total` Missing pieces.
    pub fn new(total: u32) -> Self {
        Self {
            verified: vec![false; total as usize],
            verified_count: 0,
        }
    }

    pub fn len(&self) -> u32 {
        self.verified.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.verified.is_empty()
    }

    /// Marks `index` Verified. Returns true if the piece was newly verified;
    /// indices outside the map are ignored.
    pub fn mark_verified(&mut self, index: u32) -> bool {
        match self.verified.get_mut(index as usize) {
            Some(piece) if !*piece => {
                *piece = true;
                self.verified_count += 1;
                true
            }
            _ => false,
        }
    }

    pub fn status(&self, index: u32) -> PieceStatus {
        if self.is_verified(index) {
            PieceStatus::Verified
        } else {
            PieceStatus::Missing
        }
    }

    pub fn is_verified(&self, index: u32) -> bool {
        self.verified.get(index as usize).copied().unwrap_or(false)
    }

    /// True when every piece in `range` is Verified.
    pub fn all_verified(&self, range: Range<u32>) -> bool {
        range.into_iter().all(|index| self.is_verified(index))
    }

    pub fn verified_count(&self) -> usize {
        self.verified_count
    }

    /// Condensed view: one string per bucket of [`PIECE_MAP_BUCKET`] pieces,
    /// `.` for Missing and `*` for Verified. The last bucket may be shorter.
    pub fn condensed(&self) -> Vec<String> {
        self.verified
            .chunks(PIECE_MAP_BUCKET)
            .map(|bucket| {
                bucket
                    .iter()
                    .map(|&verified| {
                        if verified {
                            PieceStatus::Verified.symbol()
                        } else {
                            PieceStatus::Missing.symbol()
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_new_map_is_all_missing() {
        let map = PieceMap::new(5);
        assert_eq!(map.len(), 5);
        assert_eq!(map.verified_count(), 0);
        assert_eq!(map.condensed(), vec![".....".to_string()]);
    }

    #[test]
    fn test_mark_verified() {
        let mut map = PieceMap::new(3);
        assert!(map.mark_verified(1));
        assert!(!map.mark_verified(1));
        assert!(!map.mark_verified(3));

        assert_eq!(map.status(1), PieceStatus::Verified);
        assert_eq!(map.status(0), PieceStatus::Missing);
        assert_eq!(map.verified_count(), 1);
        assert_eq!(map.condensed(), vec![".*.".to_string()]);
    }

    #[test]
    fn test_empty_map() {
        let map = PieceMap::default();
        assert!(map.is_empty());
        assert!(map.condensed().is_empty());
        assert!(!map.is_verified(0));
    }

    #[test]
    fn test_condensed_buckets() {
        let mut map = PieceMap::new(250);
        map.mark_verified(0);
        map.mark_verified(249);

        let buckets = map.condensed();
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].len(), 100);
        assert_eq!(buckets[2].len(), 50);
        assert!(buckets[0].starts_with('*'));
        assert!(buckets[2].ends_with('*'));
    }

    proptest! {
        #[test]
        fn prop_condensed_partitions_every_piece(
            total in 0u32..1000,
            verified in prop::collection::vec(0u32..1000, 0..200),
        ) {
            let mut map = PieceMap::new(total);
            for index in &verified {
                map.mark_verified(*index);
            }

            let buckets = map.condensed();
            let chars: usize = buckets.iter().map(String::len).sum();
            prop_assert_eq!(chars, total as usize);
            prop_assert_eq!(buckets.len(), (total as usize).div_ceil(PIECE_MAP_BUCKET));
            if let Some((last, full)) = buckets.split_last() {
                prop_assert!(full.iter().all(|b| b.len() == PIECE_MAP_BUCKET));
                prop_assert!(!last.is_empty() && last.len() <= PIECE_MAP_BUCKET);
            }

            let stars = buckets.iter().flat_map(|b| b.chars()).filter(|&c| c == '*').count();
            prop_assert_eq!(stars, map.verified_count());
        }
    }
}
