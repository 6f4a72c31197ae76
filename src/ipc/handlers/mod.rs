pub mod core;
pub mod grading;
pub mod progression;
pub mod reports;
pub mod roster;
pub mod scores;
pub mod setup;
