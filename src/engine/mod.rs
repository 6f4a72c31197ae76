//! Academic progression: grade resolution, subject aggregation, ranking and
//! promotion decisions. Everything here is a pure function of an owned
//! [`TermSnapshot`]; storage and IPC live outside this module.

pub mod aggregate;
pub mod error;
pub mod model;
pub mod promotion;
pub mod ranking;
pub mod report;
pub mod scheme;
pub mod snapshot;

pub use error::EngineError;
pub use model::*;
pub use snapshot::TermSnapshot;
