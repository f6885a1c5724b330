// src/services/did_resolver.rs
//! DID resolution.
//!
//! DIDs are resolved through a [DIF Universal Resolver](https://github.com/decentralized-identity/universal-resolver)
//! instance. Every failure (malformed DID, transport error, unknown method,
//! unparsable document) is reported as `DidResolutionFailed` so callers can
//! tell resolution problems apart from signature problems.

use crate::error::VcError;
use crate::models::did::{is_well_formed_did, DidDocument};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Resolves a DID to its DID document.
#[async_trait]
pub trait DidResolver: Send + Sync {
    async fn resolve(&self, did: &str) -> Result<DidDocument, VcError>;
}

/// HTTP client for a Universal Resolver deployment.
#[derive(Clone)]
pub struct UniversalResolver {
    base_url: String,
    client: reqwest::Client,
}

impl UniversalResolver {
    /// Creates a resolver for `base_url`, e.g. `https://dev.uniresolver.io`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, VcError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VcError::InvalidRequest(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

fn failed(did: &str, reason: impl Into<String>) -> VcError {
    VcError::DidResolutionFailed {
        did: did.to_string(),
        reason: reason.into(),
    }
}

#[async_trait]
impl DidResolver for UniversalResolver {
    async fn resolve(&self, did: &str) -> Result<DidDocument, VcError> {
        if !is_well_formed_did(did) {
            return Err(failed(did, "malformed DID"));
        }

        let url = format!("{}/1.0/identifiers/{}", self.base_url, did);
        log::debug!("resolving {} via {}", did, url);
        let response = self
            .client
            .get(&url)
            .header("accept", "application/did+ld+json, application/json")
            .send()
            .await
            .map_err(|e| failed(did, format!("resolver unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(did, format!("resolver returned {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| failed(did, format!("invalid resolver response: {}", e)))?;

        // Resolution results wrap the document; bare documents are accepted too.
        let document = match body.get("didDocument") {
            Some(document) if !document.is_null() => document.clone(),
            Some(_) => return Err(failed(did, "resolver returned no document")),
            None => body,
        };
        let document: DidDocument = serde_json::from_value(document)
            .map_err(|e| failed(did, format!("invalid DID document: {}", e)))?;

        if document.id != did {
            return Err(failed(did, format!("resolver returned document for {}", document.id)));
        }
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::mock;
    use serde_json::json;

    const DID: &str = "did:web:issuer.example";

    fn resolver() -> UniversalResolver {
        UniversalResolver::new(&mockito::server_url(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_resolves_wrapped_document() {
        let body = json!({
            "didDocument": {
                "id": DID,
                "verificationMethod": [{
                    "id": format!("{DID}#key-1"),
                    "type": "JsonWebKey2020",
                    "controller": DID,
                    "publicKeyJwk": { "kty": "OKP", "crv": "Ed25519", "x": "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo" }
                }]
            },
            "didResolutionMetadata": { "contentType": "application/did+ld+json" }
        });
        let _m = mock("GET", "/1.0/identifiers/did:web:issuer.example")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create();

        let document = resolver().resolve(DID).await.unwrap();
        assert_eq!(document.id, DID);
        assert_eq!(document.verification_method.len(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_resolution_failure() {
        let _m = mock("GET", "/1.0/identifiers/did:web:missing.example")
            .with_status(404)
            .create();

        let err = resolver().resolve("did:web:missing.example").await.unwrap_err();
        assert!(matches!(err, VcError::DidResolutionFailed { .. }));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_malformed_did_never_reaches_network() {
        let m = mock("GET", mockito::Matcher::Any).expect(0).create();
        let err = resolver().resolve("not-a-did").await.unwrap_err();
        assert!(matches!(err, VcError::DidResolutionFailed { .. }));
        m.assert();
    }

    #[tokio::test]
    async fn test_unreachable_resolver() {
        let resolver = UniversalResolver::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let err = resolver.resolve(DID).await.unwrap_err();
        assert!(matches!(err, VcError::DidResolutionFailed { .. }));
    }
}
