pub mod presentation;
pub mod scoring_category;
pub mod vote;

pub use presentation::{Presentation, PresentationRollup};
pub use scoring_category::{
    CategoryRegistry, MAX_POINTS, MAX_SCALE, ScoringCategory, SpectatorQuestion,
};
pub use vote::{
    Ballot, HistoryAction, HistoryEntry, QuestionAnswer, Rating, VoteRecord, VoteRole,
};
