//! Core orchestration engine for kiln.
//!
//! This crate ties together recipe parsing, the local archive, build backends,
//! and the host package manager into the `Engine`, the central API for
//! bootstrapping the archive, building packages from recipes, and installing
//! them with their dependencies. It also provides configuration loading and
//! the cross-process archive lock.

pub mod concurrency;
pub mod config;
pub mod engine;
pub mod resolver;

pub use concurrency::ArchiveLock;
pub use config::KilnConfig;
pub use engine::Engine;
pub use resolver::{package_name, resolve};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("no recipe for package '{0}'")]
    RecipeNotFound(String),
    #[error("recipe file for '{expected}' describes '{found}'")]
    RecipeMismatch { expected: String, found: String },
    #[error("build of '{name}' is incomplete: {reason}")]
    BuildIncomplete { name: String, reason: String },
    #[error("dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),
    #[error("recipe error: {0}")]
    Recipe(#[from] kiln_schema::RecipeError),
    #[error("package description error: {0}")]
    Descriptor(#[from] kiln_schema::DescriptorError),
    #[error("store error: {0}")]
    Store(#[from] kiln_store::StoreError),
    #[error("runtime error: {0}")]
    Runtime(#[from] kiln_runtime::RuntimeError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
