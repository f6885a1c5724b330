// src/utils/mod.rs
pub mod canonicalize;
pub mod config;
pub mod crypto;
pub mod serialization;
