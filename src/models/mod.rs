// src/models/mod.rs
pub mod chain;
pub mod credential;
pub mod did;
pub mod verification;
