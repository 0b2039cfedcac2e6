//! Core Trellis: the shared vocabulary of the package and network layers.
//!
//! - `Value`: tree-shaped payloads and structural configuration tables
//! - `Name`: validated identifier for packages, communicators and channels
//! - `Container`: host-supplied namespace that can enumerate its children
//! - `Error`: registration and lookup failures common to both layers
//!
//! # Example
//!
//! ```rust
//! use trellis_core::{Container, Folder, Value};
//!
//! let folder = Folder::new("Shared")
//!     .with("Coins", Value::from(10i64))
//!     .with("Gems", Value::from(3i64));
//!
//! let names: Vec<String> = folder.list_children().into_iter().map(|(n, _)| n).collect();
//! assert_eq!(names, vec!["Coins", "Gems"]);
//! ```

mod container;
mod error;
pub mod json;
mod name;
mod value;

pub use container::{Container, Folder};
pub use error::{BoxError, EntryKind, Error, Result};
pub use name::Name;
pub use value::Value;
