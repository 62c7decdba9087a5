//! Adaptive difficulty and badge policies, plus the score bookkeeping built on them.

use std::collections::BTreeSet;

use crate::domain::{Difficulty, ScoreState};

/// Correct-answer counts that unlock a badge.
pub const BADGE_THRESHOLDS: [u32; 4] = [5, 10, 15, 20];

/// Below this many answers we keep the default difficulty.
const MIN_SIGNAL: u32 = 3;

pub fn next_difficulty(correct_count: u32, total_count: u32) -> Difficulty {
  if total_count < MIN_SIGNAL {
    return Difficulty::Medium;
  }
  let pct = f64::from(correct_count) * 100.0 / f64::from(total_count);
  if pct < 40.0 {
    Difficulty::Easy
  } else if pct > 75.0 {
    Difficulty::Hard
  } else {
    Difficulty::Medium
  }
}

/// Monotone: never removes a badge from `already_earned`.
pub fn earned_badges(correct_count: u32, already_earned: &BTreeSet<u32>) -> BTreeSet<u32> {
  let mut out = already_earned.clone();
  out.extend(BADGE_THRESHOLDS.iter().copied().filter(|t| correct_count >= *t));
  out
}

impl ScoreState {
  /// Record one evaluated answer and recompute difficulty and badges.
  /// Returns the badges unlocked by this answer.
  pub fn record(&mut self, correct: bool) -> Vec<u32> {
    self.total_count += 1;
    if correct {
      self.correct_count += 1;
    }
    self.difficulty = next_difficulty(self.correct_count, self.total_count);
    let badges = earned_badges(self.correct_count, &self.badges);
    let unlocked = badges.difference(&self.badges).copied().collect();
    self.badges = badges;
    unlocked
  }
}
