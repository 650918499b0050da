//! CLI command entry points.
//!
//! Each command is a free function taking a [`Runtime`] plus parsed
//! arguments. Commands own the wiring: they open the registry, build the
//! fetcher, and hand off to the transition resolver.

mod apply;
mod list;
mod paths;
mod plan;
mod remove;

pub use apply::apply;
pub use list::list;
pub use plan::plan;
pub use remove::remove;

pub(crate) use paths::{registry_path, resolve_root};
