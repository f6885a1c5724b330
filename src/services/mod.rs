// src/services/mod.rs
pub mod api_server;
pub mod credential_issuer;
pub mod did_jwt;
pub mod did_resolver;
pub mod verifier;
