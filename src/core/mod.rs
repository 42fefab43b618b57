// Public modules
pub mod action;
pub mod alias;
pub mod context;
pub mod deploy;
pub mod error;
pub mod git;
pub mod hooks;
pub mod log;
pub mod notify;
pub mod operation;
pub mod pipeline;
pub mod restore;
pub mod retention;
pub mod revision;
pub mod settings;
pub mod ssh;

// Internal modules - not part of public API
pub(crate) mod paths;

#[cfg(test)]
pub(crate) mod testing;

// Public modules for CLI access
pub mod defaults;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
