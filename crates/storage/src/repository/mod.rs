pub mod category;
pub mod presentation;
pub mod vote;
