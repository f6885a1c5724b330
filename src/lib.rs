// src/lib.rs
//! # Blockchain-anchored verifiable credentials
//!
//! Issues and verifies W3C verifiable credentials in two formats:
//! - **BlockCerts**: the canonical credential hash is the root of a Merkle
//!   tree whose root is written into an Ethereum transaction; the proof
//!   (`MerkleProof2019`) points at that transaction through a `blink:` URI.
//! - **DID-JWT**: the credential is a JWT signed by the issuer DID's key and
//!   verified against the DID document fetched from a Universal Resolver.
//!
//! ## Layout
//! 1. **Models**: credentials, proofs, DID documents, the chain registry
//! 2. **Blockchain Layer**: Merkle tree, RPC client, anchoring with bounded retry
//! 3. **Services Layer**: issuers, verifiers, DID resolution and the HTTP API
//! 4. **Utilities**: hashing, canonicalization, proof encoding, configuration

pub mod blockchain; // Ethereum anchoring
pub mod error; // Error taxonomy
pub mod models; // Data structures
pub mod services; // Business logic and API
pub mod utils; // Helper functions
