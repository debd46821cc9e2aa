//! CSV forecast import and dispatch export.

pub mod export;
pub mod import;
