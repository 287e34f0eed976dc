pub mod aggregator;
pub mod audit;
pub mod normalizer;
pub mod repair;
pub mod voting;
