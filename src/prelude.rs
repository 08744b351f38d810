//! Convenience re-exports for common usage.
//!
//! # Usage
//!
//! ```
//! use tematica::prelude::*;
//! ```

pub use crate::corpus::{Document, TermWeight, Vocabulary};
pub use crate::error::{Result, TematicaError};
pub use crate::lda::{InferenceOptions, LdaModel, ModelSnapshot};
pub use crate::parallel::ParallelScheme;
pub use crate::prior::{DefaultPrior, PriorProvider};
