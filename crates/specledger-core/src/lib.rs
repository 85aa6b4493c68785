pub mod clock;
pub mod config;
pub mod context;
pub mod duplicate;
pub mod error;
pub mod git;
pub mod graph;
pub mod hooks;
pub mod id;
pub mod io;
pub mod issue;
pub mod launcher;
pub mod lockfile;
pub mod manifest;
pub mod metadata;
pub mod migrate;
pub mod paths;
pub mod playbook;
pub mod prerequisites;
pub mod resolver;
pub mod store;
pub mod tree;

pub use error::{Result, SpecLedgerError};
