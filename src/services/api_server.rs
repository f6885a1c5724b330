// src/services/api_server.rs
//! API Server for blockchain-anchored verifiable credentials
//!
//! This module exposes the issuance and verification services over a small
//! JSON REST interface built with Axum:
//! - BlockCerts issuance and verification
//! - DID-JWT issuance and verification
//! - A liveness probe
//!
//! Service failures are mapped to `400 Bad Request` with an
//! `{error, error_description}` body. A credential that fails verification is
//! *not* an error: it is answered with `200 OK` and `status: "failure"`.
//! Requests that outlive the deadline get `408 Request Timeout` with the same
//! error body.

use crate::blockchain::anchor_service::SigningAccount;
use crate::error::VcError;
use crate::models::chain::Chain;
use crate::models::credential::VerifiableCredential;
use crate::models::verification::VerifyResult;
use crate::services::credential_issuer::BlockCertIssuer;
use crate::services::did_jwt::{DidJwtVcService, VerifiedJwt};
use crate::services::verifier::BlockCertVerifier;
use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::StatusCode,
    middleware::map_response,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

// API request and response structures

/// Request payload for issuing a BlockCerts credential
#[derive(Serialize, Deserialize)]
struct IssueBlockCertRequest {
    credential: Option<Value>,
}

/// Response carrying the signed BlockCerts credential
#[derive(Serialize)]
struct IssueBlockCertResponse {
    vc: VerifiableCredential,
}

/// Request payload for verifying a BlockCerts credential
#[derive(Serialize, Deserialize)]
struct VerifyBlockCertRequest {
    vc_block_cert: Option<Value>,
}

#[derive(Serialize)]
struct VerifyBlockCertResponse {
    verify_result: VerifyResult,
}

/// Request payload for issuing a DID-JWT credential
#[derive(Serialize, Deserialize)]
struct IssueDidJwtRequest {
    credential: Option<Value>,
    headers: Option<Map<String, Value>>,
}

#[derive(Serialize)]
struct IssueDidJwtResponse {
    vc: String,
}

/// Request payload for verifying a DID-JWT credential
#[derive(Serialize, Deserialize)]
struct VerifyDidJwtRequest {
    vc_jwt: Option<String>,
}

#[derive(Serialize)]
struct VerifyDidJwtResponse {
    verified_vc: VerifiedJwt,
}

fn error_body(error: &VcError) -> Json<Value> {
    Json(json!({
        "error": error.code(),
        "error_description": error.to_string(),
    }))
}

impl IntoResponse for VcError {
    fn into_response(self) -> Response {
        log::error!("request failed ({}): {}", self.code(), self);
        (StatusCode::BAD_REQUEST, error_body(&self)).into_response()
    }
}

/// Gives the bare 408 produced by `TimeoutLayer` an error body.
async fn describe_timeout(response: Response) -> Response {
    if response.status() != StatusCode::REQUEST_TIMEOUT {
        return response;
    }
    let error = VcError::Timeout("request".into());
    log::error!("request failed ({}): {}", error.code(), error);
    (StatusCode::REQUEST_TIMEOUT, error_body(&error)).into_response()
}

fn required<T>(field: Option<T>, name: &str) -> Result<T, VcError> {
    field.ok_or_else(|| VcError::InvalidRequest(format!("missing required field `{}`", name)))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, VcError> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|rejection| VcError::InvalidRequest(rejection.body_text()))
}

/// Identity used when issuing BlockCerts credentials.
#[derive(Clone, Debug)]
pub struct IssuingIdentity {
    pub account: SigningAccount,
    pub verification_method: String,
    pub chain: Chain,
}

/// Main API server structure holding all service dependencies
#[derive(Clone)]
pub struct ApiServer {
    /// Service for BlockCerts issuance
    issuer: Arc<dyn BlockCertIssuer>,

    /// Service for BlockCerts verification
    verifier: Arc<BlockCertVerifier>,

    /// Service for DID-JWT issuance and verification
    did_jwt: Arc<DidJwtVcService>,

    /// Account, verification method and chain used for anchoring
    identity: Arc<IssuingIdentity>,

    /// Deadline applied to every request
    request_timeout: Duration,
}

impl ApiServer {
    /// Creates a new instance of the API server
    ///
    /// # Arguments
    /// * `issuer` - BlockCerts issuing strategy
    /// * `verifier` - BlockCerts verifier
    /// * `did_jwt` - DID-JWT service
    /// * `identity` - Issuing account, verification method and chain
    /// * `request_timeout` - Deadline for each request
    pub fn new(
        issuer: Arc<dyn BlockCertIssuer>,
        verifier: BlockCertVerifier,
        did_jwt: DidJwtVcService,
        identity: IssuingIdentity,
        request_timeout: Duration,
    ) -> Self {
        ApiServer {
            issuer,
            verifier: Arc::new(verifier),
            did_jwt: Arc::new(did_jwt),
            identity: Arc::new(identity),
            request_timeout,
        }
    }

    /// Builds the router with every endpoint and the request deadline.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(Self::health_handler))
            .route("/v1/verifiable-credentials/block-cert", post(Self::issue_block_cert_handler))
            .route(
                "/v1/verifiable-credentials/block-cert/verify",
                post(Self::verify_block_cert_handler),
            )
            .route("/v1/verifiable-credentials/did-jwt", post(Self::issue_did_jwt_handler))
            .route(
                "/v1/verifiable-credentials/did-jwt/verify",
                post(Self::verify_did_jwt_handler),
            )
            .layer(TimeoutLayer::new(self.request_timeout))
            .layer(map_response(describe_timeout))
            .with_state(Arc::new(self.clone()))
    }

    /// Starts the API server and begins listening for requests
    ///
    /// # Errors
    /// Fails if the address cannot be bound or the server stops unexpectedly.
    pub async fn run(&self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        log::info!("API server listening on http://{}", addr);
        axum::serve(listener, self.router()).await
    }

    /// GET /health
    async fn health_handler() -> impl IntoResponse {
        Json(json!({ "status": "ok" }))
    }

    /// Issues a BlockCerts credential anchored on the configured chain
    ///
    /// # Endpoint
    /// POST /v1/verifiable-credentials/block-cert
    ///
    /// # Responses
    /// - 200 OK: `{vc}`
    /// - 400 Bad Request: missing credential, canonicalization, balance or broadcast failure
    async fn issue_block_cert_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<IssueBlockCertRequest>, JsonRejection>,
    ) -> Result<Json<IssueBlockCertResponse>, VcError> {
        let credential = required(body(payload)?.credential, "credential")?;
        let identity = &state.identity;
        let vc = state
            .issuer
            .issue(
                &credential,
                &identity.account,
                &identity.verification_method,
                identity.chain,
            )
            .await?;
        Ok(Json(IssueBlockCertResponse { vc }))
    }

    /// Verifies a BlockCerts credential
    ///
    /// # Endpoint
    /// POST /v1/verifiable-credentials/block-cert/verify
    ///
    /// # Responses
    /// - 200 OK: `{verify_result}`, whatever the verification outcome
    /// - 400 Bad Request: missing `vc_block_cert`
    async fn verify_block_cert_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<VerifyBlockCertRequest>, JsonRejection>,
    ) -> Result<Json<VerifyBlockCertResponse>, VcError> {
        let document = required(body(payload)?.vc_block_cert, "vc_block_cert")?;
        let verify_result = state.verifier.verify(&document).await;
        Ok(Json(VerifyBlockCertResponse { verify_result }))
    }

    /// Issues a DID-JWT credential
    ///
    /// # Endpoint
    /// POST /v1/verifiable-credentials/did-jwt
    async fn issue_did_jwt_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<IssueDidJwtRequest>, JsonRejection>,
    ) -> Result<Json<IssueDidJwtResponse>, VcError> {
        let request = body(payload)?;
        let credential = required(request.credential, "credential")?;
        let vc = state.did_jwt.issue(&credential, request.headers.as_ref())?;
        Ok(Json(IssueDidJwtResponse { vc }))
    }

    /// Verifies a DID-JWT credential
    ///
    /// # Endpoint
    /// POST /v1/verifiable-credentials/did-jwt/verify
    async fn verify_did_jwt_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<VerifyDidJwtRequest>, JsonRejection>,
    ) -> Result<Json<VerifyDidJwtResponse>, VcError> {
        let jwt = required(body(payload)?.vc_jwt, "vc_jwt")?;
        let verified_vc = state.did_jwt.verify(&jwt).await?;
        Ok(Json(VerifyDidJwtResponse { verified_vc }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::anchor_service::tests::test_account;
    use crate::blockchain::anchor_service::{AnchorReceipt, Anchoring};
    use crate::models::did::DidDocument;
    use crate::services::credential_issuer::tests::FixedAnchor;
    use crate::services::credential_issuer::AnchoredIssuer;
    use crate::services::did_resolver::DidResolver;
    use crate::utils::canonicalize::JcsCanonicalizer;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    struct NoResolver;

    #[async_trait]
    impl DidResolver for NoResolver {
        async fn resolve(&self, did: &str) -> Result<DidDocument, VcError> {
            Err(VcError::DidResolutionFailed {
                did: did.to_string(),
                reason: "resolver offline".into(),
            })
        }
    }

    /// Anchoring that never completes within a test's lifetime.
    struct StalledAnchor;

    #[async_trait]
    impl Anchoring for StalledAnchor {
        async fn anchor(
            &self,
            _account: &SigningAccount,
            _chain: Chain,
            _payload: &[u8],
        ) -> Result<AnchorReceipt, VcError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(VcError::Rpc("unreachable".into()))
        }
    }

    fn server() -> ApiServer {
        server_with(Arc::new(FixedAnchor::new("0xabc")), Duration::from_secs(5))
    }

    fn server_with(anchoring: Arc<dyn Anchoring>, request_timeout: Duration) -> ApiServer {
        let issuer = AnchoredIssuer::new(Arc::new(JcsCanonicalizer), anchoring);
        ApiServer::new(
            Arc::new(issuer),
            BlockCertVerifier::new(Arc::new(JcsCanonicalizer)),
            DidJwtVcService::new(Arc::new(NoResolver)),
            IssuingIdentity {
                account: test_account(),
                verification_method: "did:example:issuer#key-1".into(),
                chain: Chain::EthereumSepolia,
            },
            request_timeout,
        )
    }

    async fn post(uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = server().router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = server().router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_issue_block_cert() {
        let (status, body) = post(
            "/v1/verifiable-credentials/block-cert",
            json!({ "credential": { "name": "Alice" } }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["vc"]["name"], json!("Alice"));
        assert_eq!(body["vc"]["proof"]["type"], json!("MerkleProof2019"));
    }

    #[tokio::test]
    async fn test_missing_fields_are_bad_requests() {
        for uri in [
            "/v1/verifiable-credentials/block-cert",
            "/v1/verifiable-credentials/block-cert/verify",
            "/v1/verifiable-credentials/did-jwt",
            "/v1/verifiable-credentials/did-jwt/verify",
        ] {
            let (status, body) = post(uri, json!({})).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["error"], json!("invalid_request"), "{uri}");
            assert!(body["error_description"].as_str().unwrap().contains("missing"));
        }
    }

    #[tokio::test]
    async fn test_failed_verification_is_ok_response() {
        let (_, issued) = post(
            "/v1/verifiable-credentials/block-cert",
            json!({ "credential": { "name": "Alice" } }),
        )
        .await;
        let mut tampered = issued["vc"].clone();
        tampered["name"] = json!("Mallory");

        let (status, body) = post(
            "/v1/verifiable-credentials/block-cert/verify",
            json!({ "vc_block_cert": tampered }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verify_result"]["status"], json!("failure"));
    }

    #[tokio::test]
    async fn test_did_jwt_errors() {
        let (status, body) = post(
            "/v1/verifiable-credentials/did-jwt",
            json!({ "credential": { "name": "Alice" } }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("invalid_request"));

        let (status, body) = post(
            "/v1/verifiable-credentials/did-jwt/verify",
            json!({ "vc_jwt": "not-a-jwt" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("invalid_jwt"));
    }

    #[tokio::test]
    async fn test_malformed_json_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/v1/verifiable-credentials/block-cert")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = server().router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_request_timeout_has_error_body() {
        let app = server_with(Arc::new(StalledAnchor), Duration::from_millis(50)).router();
        let request = Request::builder()
            .method("POST")
            .uri("/v1/verifiable-credentials/block-cert")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "credential": { "name": "Alice" } }).to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], json!("timeout"));
        assert!(body["error_description"].as_str().unwrap().contains("request"));
    }
}
