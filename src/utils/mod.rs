//! Generic utility primitives with zero domain knowledge.
//!
//! - `command` - Local command execution
//! - `shell` - Shell escaping and quoting
//! - `template` - String template rendering

pub mod command;
pub mod shell;
pub(crate) mod template;
