//! Exoform Core
//!
//! Resource model, schema and lifecycle traits shared by the exoform host
//! engine and its providers

pub mod differ;
pub mod effect;
pub mod interpreter;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod timeouts;
pub mod upgrade;
