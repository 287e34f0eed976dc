pub mod presentation;
pub mod vote;
