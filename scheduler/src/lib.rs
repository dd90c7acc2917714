pub mod applier;
pub mod clock;
pub mod engine;
pub mod ranges;
pub mod resolver;
pub mod types;
