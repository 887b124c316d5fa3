//! WhatIf Core Engine
//!
//! Core generation engine module.
//! Handles provider access, script models, key storage and settings.

pub mod ai;
pub mod credentials;
pub mod fs;
pub mod script;
pub mod settings;

mod error;
pub use error::*;
