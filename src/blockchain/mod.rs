// src/blockchain/mod.rs
pub mod anchor_service;
pub mod ethereum_client;
pub mod merkle_tree;
pub mod retry;
