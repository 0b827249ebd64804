pub mod creative;
pub mod metrics;
pub mod pillar;
pub mod recommendation;
pub mod rule;
