pub mod budget;
pub mod config;
pub mod content_mix;
pub mod fatigue;
pub mod rules;
pub mod significance;

pub use config::EngineConfig;
