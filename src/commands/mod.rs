//! Command-layer drivers: one struct per binary, built with the
//! `with_*(self) -> Self` pattern and run with a single `run()` call,
//! mirroring the other commands in this family.

pub mod compare;
pub mod correct;
pub mod index;
pub mod search;

pub use compare::{CompareCommand, CompareMode};
pub use correct::CorrectCommand;
pub use index::IndexCommand;
pub use search::SearchCommand;
