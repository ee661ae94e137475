// ChromBERT 🧬 AGPL-3.0 License - https://github.com/TongjiZhanglab/ChromBERT

//! CLI module for the imputation tool.
//!
//! This module contains the command-line interface logic, including argument
//! parsing and the imputation run itself.

// Modules
/// CLI arguments.
pub mod args;

/// Imputation run logic.
pub mod impute;

/// Logging macros and verbosity control.
pub mod logging;
