//! Vote tally for the current item
//!
//! Likes and skip requests are keyed by contributor so repeat votes from
//! the same device do not inflate the counters. The tally is reset every
//! time a new item starts playing.

use rockola_common::model::VoteCounts;
use std::collections::HashSet;

pub struct VoteTally {
    likes: HashSet<String>,
    skips: HashSet<String>,
    /// Number of distinct skip votes that triggers a venue-wide skip
    skip_threshold: usize,
}

impl VoteTally {
    pub fn new(skip_threshold: usize) -> Self {
        Self {
            likes: HashSet::new(),
            skips: HashSet::new(),
            skip_threshold,
        }
    }

    pub fn like(&mut self, contributor: &str) -> VoteCounts {
        self.likes.insert(contributor.to_string());
        self.counts()
    }

    /// Register a skip request. The boolean is true only on the vote that
    /// crosses the threshold, so the skip signal is published exactly once.
    pub fn vote_skip(&mut self, contributor: &str) -> (VoteCounts, bool) {
        let inserted = self.skips.insert(contributor.to_string());
        let reached = inserted && self.skips.len() == self.skip_threshold;
        (self.counts(), reached)
    }

    pub fn counts(&self) -> VoteCounts {
        VoteCounts {
            likes: self.likes.len(),
            skips: self.skips.len(),
        }
    }

    pub fn reset(&mut self) {
        self.likes.clear();
        self.skips.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_votes_do_not_count_twice() {
        let mut tally = VoteTally::new(3);
        tally.like("alice");
        let counts = tally.like("alice");
        assert_eq!(counts.likes, 1);
    }

    #[test]
    fn test_threshold_fires_exactly_once() {
        let mut tally = VoteTally::new(2);
        let (_, reached) = tally.vote_skip("alice");
        assert!(!reached);
        let (counts, reached) = tally.vote_skip("bob");
        assert!(reached);
        assert_eq!(counts.skips, 2);
        // A third vote, or a repeat, must not fire the signal again
        let (_, reached) = tally.vote_skip("bob");
        assert!(!reached);
        let (_, reached) = tally.vote_skip("carol");
        assert!(!reached);
    }

    #[test]
    fn test_reset_clears_counters() {
        let mut tally = VoteTally::new(2);
        tally.like("alice");
        tally.vote_skip("bob");
        tally.reset();
        assert_eq!(tally.counts(), VoteCounts::default());
    }
}
