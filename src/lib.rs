#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

//! Artifact Registry over Git Tags
//!
//! Turns an ordinary Git repository into an artifact registry: artifacts
//! are versioned and promoted through lifecycle stages by creating
//! annotated tags in a fixed naming scheme, and the registry state is
//! assembled on demand from the tags plus the optional in-tree
//! `artifacts.yaml` index. No state lives outside the repository.
//!
//! ## Usage
//!
//! Add the dependency to Cargo.toml
//!
//! ```toml
//!
//! [dependencies]
//! tagreg = "0.4.2"
//!
//! ```
//!
//! Register a version, promote it, and query the result:
//!
//! ```no_run
//! use tagreg::cancel::Token;
//! use tagreg::collector::Scope;
//! use tagreg::mutator::Mutator;
//! use tagreg::{query, Registry};
//!
//! # fn main() -> Result<(), tagreg::Error> {
//! let registry = Registry::open(std::path::Path::new("."))?;
//! let token = Token::new();
//!
//! // Propose tags for `register rf` then `assign rf prod`.
//! let state = registry.assemble(&Scope::Head, &token)?;
//! let mutator = Mutator::new(&state, registry.config());
//! let commit = registry.resolve_commit(None)?;
//! let plan = mutator.register("rf", &commit, Some("v1"), None, false)?;
//! registry.apply(&plan, &token)?;
//!
//! // Writes become visible on the next assemble.
//! let state = registry.assemble(&Scope::Head, &token)?;
//! let plan = Mutator::new(&state, registry.config()).assign(
//!     "rf",
//!     "prod",
//!     Some("v1"),
//!     None,
//!     None,
//! )?;
//! registry.apply(&plan, &token)?;
//!
//! let state = registry.assemble(&Scope::Head, &token)?;
//! assert_eq!(Some("v1".to_string()), query::which(&state, "rf", "prod")?);
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod cli;
pub mod codec;
pub mod collector;
pub mod config;
mod error;
pub mod event;
pub mod git_utils;
pub mod index;
pub mod mutator;
pub mod query;
pub mod registry;
pub mod state;
pub mod version;

pub use error::Error;
pub use registry::Registry;
