//! finsight-classify: transaction categorization as an ordered chain of
//! capability providers.
//!
//! Rule-based merchant matching runs first; a classifier backend (remote or
//! otherwise) fills in what the rules cannot. The engine guarantees total
//! coverage: every well-formed transaction gets a category, with
//! `Uncategorized`/0.0 as the floor.

pub mod backend;
pub mod engine;
pub mod rules;

pub use backend::{BackendProvider, ClassifierBackend, RemoteClassifier};
pub use engine::{CONFIDENCE_THRESHOLD, CategorizationEngine, CategoryProvider};
pub use rules::RuleProvider;
