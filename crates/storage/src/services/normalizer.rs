//! Turns a ballot into the canonical total for its role.
//!
//! The judge total is the plain sum of accepted category scores. Submission,
//! audit and repair all go through `raw_sum`, so a stored total can always be
//! checked against its ratings.

use rust_decimal::Decimal;
use std::collections::HashSet;

use crate::models::{Ballot, CategoryRegistry, MAX_SCALE, QuestionAnswer, Rating, VoteRole};

/// Entry dropped while normalizing, with the reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredEntry {
    pub id: String,
    pub score: i32,
    pub reason: IgnoreReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    UnknownCategory,
    UnknownQuestion,
    Duplicate,
    OutOfScale,
    WrongBallotKind,
}

/// Result of normalizing a ballot
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub total: Decimal,
    pub ratings: Vec<Rating>,
    pub answers: Vec<QuestionAnswer>,
    pub ignored: Vec<IgnoredEntry>,
}

impl Normalized {
    fn empty() -> Self {
        Self {
            total: Decimal::ZERO,
            ratings: Vec::new(),
            answers: Vec::new(),
            ignored: Vec::new(),
        }
    }
}

/// Role-specific scoring rules
///
/// Never fails: anything it cannot use is reported in `Normalized::ignored`
/// and contributes nothing.
pub trait VoteStrategy: Send + Sync {
    fn role(&self) -> VoteRole;

    fn applies_to(&self, role: VoteRole) -> bool {
        self.role() == role
    }

    fn normalize(&self, ballot: &Ballot, registry: &CategoryRegistry) -> Normalized;
}

pub struct JudgeVoteStrategy;

pub struct SpectatorVoteStrategy;

impl VoteStrategy for JudgeVoteStrategy {
    fn role(&self) -> VoteRole {
        VoteRole::Judge
    }

    fn normalize(&self, ballot: &Ballot, registry: &CategoryRegistry) -> Normalized {
        let mut normalized = Normalized::empty();

        let ratings = match ballot {
            Ballot::Ratings { ratings } => ratings,
            Ballot::Like { .. } => {
                normalized.ignored.push(IgnoredEntry {
                    id: "like".to_string(),
                    score: 0,
                    reason: IgnoreReason::WrongBallotKind,
                });
                return normalized;
            }
        };

        let mut seen = HashSet::new();
        for rating in ratings {
            let reason = if !registry.has_category(&rating.category_id) {
                Some(IgnoreReason::UnknownCategory)
            } else if !in_scale(rating.score) {
                Some(IgnoreReason::OutOfScale)
            } else if !seen.insert(rating.category_id.as_str()) {
                Some(IgnoreReason::Duplicate)
            } else {
                None
            };

            match reason {
                Some(reason) => normalized.ignored.push(IgnoredEntry {
                    id: rating.category_id.clone(),
                    score: rating.score,
                    reason,
                }),
                None => normalized.ratings.push(rating.clone()),
            }
        }

        normalized.total = raw_sum(&normalized.ratings);
        normalized
    }
}

impl VoteStrategy for SpectatorVoteStrategy {
    fn role(&self) -> VoteRole {
        VoteRole::Spectator
    }

    /// A spectator vote is one like. Answers are kept for reporting and never
    /// touch the total.
    fn normalize(&self, ballot: &Ballot, registry: &CategoryRegistry) -> Normalized {
        let mut normalized = Normalized::empty();
        normalized.total = Decimal::ONE;

        let answers = match ballot {
            Ballot::Like { answers } => answers,
            Ballot::Ratings { ratings } => {
                normalized
                    .ignored
                    .extend(ratings.iter().map(|r| IgnoredEntry {
                        id: r.category_id.clone(),
                        score: r.score,
                        reason: IgnoreReason::WrongBallotKind,
                    }));
                return normalized;
            }
        };

        let mut seen = HashSet::new();
        for answer in answers {
            let reason = if !registry.has_question(&answer.question_id) {
                Some(IgnoreReason::UnknownQuestion)
            } else if !in_scale(answer.score) {
                Some(IgnoreReason::OutOfScale)
            } else if !seen.insert(answer.question_id.as_str()) {
                Some(IgnoreReason::Duplicate)
            } else {
                None
            };

            match reason {
                Some(reason) => normalized.ignored.push(IgnoredEntry {
                    id: answer.question_id.clone(),
                    score: answer.score,
                    reason,
                }),
                None => normalized.answers.push(answer.clone()),
            }
        }

        normalized
    }
}

static JUDGE: JudgeVoteStrategy = JudgeVoteStrategy;
static SPECTATOR: SpectatorVoteStrategy = SpectatorVoteStrategy;

/// Strategy for a role
pub fn strategy_for(role: VoteRole) -> &'static dyn VoteStrategy {
    match role {
        VoteRole::Judge => &JUDGE,
        VoteRole::Spectator => &SPECTATOR,
    }
}

/// Canonical judge total: the unweighted sum of rating scores.
pub fn raw_sum(ratings: &[Rating]) -> Decimal {
    ratings.iter().map(|r| Decimal::from(r.score)).sum()
}

pub fn in_scale(score: i32) -> bool {
    (0..=MAX_SCALE).contains(&score)
}
