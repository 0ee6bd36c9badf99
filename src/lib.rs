//! forester - version-control core for 3D-asset projects
//!
//! a Git-inspired, content-addressed storage engine that tracks ordinary
//! project files alongside first-class mesh objects and textures,
//! deduplicating identical content across history.
//!
//! # Core concepts
//!
//! - **Blob**: content-addressed file bytes
//! - **Tree**: a directory snapshot (tab-separated text)
//! - **Mesh**: a normalized 3D asset (canonical JSON), referencing textures by hash
//! - **Texture**: image bytes versioned independently of meshes
//! - **Commit / Stash**: snapshot records (canonical JSON); stashes live outside branch history
//! - **Branch / Tag / HEAD**: named pointers into the commit graph
//!
//! objects live under `.DFM/objects/<kind>/<xx>/<rest>` keyed by the
//! SHA-256 of their canonical bytes; refs, locks, and review records live
//! in a WAL-journaled metadata index at `.DFM/forester.db`.
//!
//! # Example usage
//!
//! ```no_run
//! use forester::{ops, Repo};
//! use std::path::Path;
//!
//! // initialize a repository
//! let repo = Repo::init(Path::new("/path/to/project"), false).unwrap();
//!
//! // snapshot the working set
//! let hash = ops::commit(&repo, "first pass", Some("alice"), &Default::default()).unwrap();
//!
//! // reconstruct it later
//! if let Some(hash) = hash {
//!     ops::checkout(&repo, &hash.to_hex(), &ops::CheckoutOptions { force: true, ..Default::default() }).unwrap();
//! }
//! ```

mod config;
mod error;
mod hash;
mod ignore;
mod refs;
mod repo;
mod tree_builder;

pub mod index;
pub mod object;
pub mod ops;
pub mod scan;

pub use config::RepoConfig;
pub use error::{Error, IoContext, Result};
pub use hash::{hash_bytes, hash_file, Hash, Hasher};
pub use crate::ignore::IgnoreFilter;
pub use refs::{read_head, write_head, Head};
pub use repo::{Repo, RepoLock, DEFAULT_BRANCH, DFM_DIR};
pub use tree_builder::{build_tree, TreeBuild};
