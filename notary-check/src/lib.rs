//! Building blocks of the `notary-check` command line tool.

#[macro_use]
extern crate tracing;

pub mod check;
pub mod config;
pub mod import;
pub mod log;
pub mod manage;
pub mod target;
pub mod update;
