//! Tematica: topic modeling in pure Rust.
//!
//! Tematica estimates latent topic structure over tokenized corpora with
//! collapsed Gibbs sampling (the LDA family), with a focus on exact
//! sufficient-statistics invariants under concurrent execution and
//! reproducible runs for a fixed seed.
//!
//! # Quick Start
//!
//! ```
//! use tematica::prelude::*;
//!
//! let mut model = LdaModel::new(2, 0.1, 0.01).unwrap().with_seed(42);
//! model.add_document(&["apple", "banana", "apple", "cherry"]).unwrap();
//! model.add_document(&["banana", "banana", "cherry"]).unwrap();
//! model.add_document(&["apple", "cherry", "cherry"]).unwrap();
//!
//! // 100 sequential sweeps; worker counts above 1 pick a concurrent
//! // execution scheme instead.
//! model.train(100, 1, ParallelScheme::Sequential).unwrap();
//!
//! let perplexity = model.perplexity().unwrap();
//! assert!(perplexity.is_finite());
//!
//! for words in model.top_words(2).unwrap() {
//!     assert_eq!(words.len(), 2);
//! }
//! ```
//!
//! # Modules
//!
//! - [`corpus`]: Vocabulary interning, documents, term weighting
//! - [`lda`]: The training/inference engine
//! - [`parallel`]: Execution schemes and the merge protocol
//! - [`prior`]: Dirichlet prior plumbing and the provider seam
//! - [`state`]: Shared sufficient statistics
//! - [`error`]: Crate error type

pub mod corpus;
pub mod error;
pub mod lda;
pub(crate) mod math;
pub(crate) mod optimize;
pub mod parallel;
pub mod prelude;
pub mod prior;
pub(crate) mod sampler;
pub mod state;

pub use corpus::{Document, TermWeight, Vocabulary};
pub use error::{Result, TematicaError};
pub use lda::{InferenceOptions, LdaModel, ModelSnapshot};
pub use parallel::ParallelScheme;
pub use prior::{DefaultPrior, PriorProvider};
pub use state::ModelState;
