//! Signed identity tokens: claims, issuance, and validation.

pub mod claims;
pub mod secret;
pub mod service;
