pub mod apply;
pub mod commands;
pub mod fetch;
pub mod guard;
pub mod http;
pub mod manifest;
pub mod registry;
pub mod runtime;
pub mod transition;
