pub mod range;
pub mod types;
