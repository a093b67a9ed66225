//! Command-line front end for the hanging protocol engine.

pub mod cli;
pub mod commands;
pub mod logging;
pub mod summary;
