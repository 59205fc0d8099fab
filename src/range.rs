//! Circular live window over the block-id space.
//!
//! Block ids live in `[0, modulus)`. The live window is the inclusive run
//! `first ..= last` read circularly: when `first > last` the window spans the
//! wrap point and the ids strictly between `last` and `first` are dead.

/// Inclusive live range `[first, last]` in a circular id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    first: i64,
    last: i64,
    modulus: i64,
}

impl BlockRange {
    /// Build a range; both ends must already be reduced modulo `modulus`.
    pub fn new(first: i64, last: i64, modulus: i64) -> Self {
        debug_assert!((0..modulus).contains(&first) && (0..modulus).contains(&last));
        Self {
            first,
            last,
            modulus,
        }
    }

    /// A range holding exactly one id.
    pub fn single(id: i64, modulus: i64) -> Self {
        Self::new(id, id, modulus)
    }

    /// First live id.
    pub fn first(&self) -> i64 {
        self.first
    }

    /// Last live id.
    pub fn last(&self) -> i64 {
        self.last
    }

    /// True if the window spans the wrap point.
    pub fn wraps(&self) -> bool {
        self.first > self.last
    }

    /// Wrap-aware membership test.
    pub fn contains(&self, id: i64) -> bool {
        if self.wraps() {
            (self.first..self.modulus).contains(&id) || (0..=self.last).contains(&id)
        } else {
            (self.first..=self.last).contains(&id)
        }
    }

    /// Number of live ids.
    pub fn len(&self) -> i64 {
        if self.wraps() {
            self.last + self.modulus - self.first + 1
        } else {
            self.last - self.first + 1
        }
    }

    /// Id the next append would receive, or `None` when the id space is exhausted.
    pub fn next_id(&self) -> Option<i64> {
        let next = (self.last + 1) % self.modulus;
        (next != self.first).then_some(next)
    }

    /// The range after appending one id.
    pub fn extended(&self) -> Option<Self> {
        self.next_id().map(|last| Self { last, ..*self })
    }

    /// The range after dropping everything before `first` (which must be live).
    pub fn truncated(&self, first: i64) -> Self {
        debug_assert!(self.contains(first));
        Self { first, ..*self }
    }

    /// Position of `id` counted from `first`, if live.
    pub fn offset_of(&self, id: i64) -> Option<i64> {
        self.contains(id)
            .then(|| (id - self.first).rem_euclid(self.modulus))
    }

    /// Live ids in log order.
    pub fn iter(&self) -> impl Iterator<Item = i64> {
        let (first, modulus) = (self.first, self.modulus);
        (0..self.len()).map(move |i| (first + i) % modulus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwrapped_membership() {
        let r = BlockRange::new(3, 7, 10);
        assert!(!r.wraps());
        assert!(!r.contains(2));
        assert!(r.contains(3) && r.contains(7));
        assert!(!r.contains(8));
        assert_eq!(r.len(), 5);
    }

    #[test]
    fn wrapped_membership_excludes_dead_gap() {
        let r = BlockRange::new(8, 1, 10);
        assert!(r.wraps());
        for id in [8, 9, 0, 1] {
            assert!(r.contains(id), "{id}");
        }
        for id in 2..8 {
            assert!(!r.contains(id), "{id}");
        }
        assert_eq!(r.len(), 4);
        assert_eq!(r.iter().collect::<Vec<_>>(), vec![8, 9, 0, 1]);
    }

    #[test]
    fn next_id_wraps_and_detects_exhaustion() {
        let r = BlockRange::new(2, 9, 10);
        assert_eq!(r.next_id(), Some(0));
        let r = BlockRange::new(0, 9, 10);
        assert_eq!(r.next_id(), None);
        let r = BlockRange::new(5, 4, 10);
        assert_eq!(r.next_id(), None);
        assert_eq!(r.len(), 10);
    }

    #[test]
    fn offset_of_counts_from_first() {
        let r = BlockRange::new(8, 1, 10);
        assert_eq!(r.offset_of(8), Some(0));
        assert_eq!(r.offset_of(0), Some(2));
        assert_eq!(r.offset_of(1), Some(3));
        assert_eq!(r.offset_of(5), None);
    }

    #[test]
    fn truncated_keeps_last() {
        let r = BlockRange::new(8, 1, 10).truncated(0);
        assert_eq!((r.first(), r.last()), (0, 1));
        assert!(!r.wraps());
    }
}
