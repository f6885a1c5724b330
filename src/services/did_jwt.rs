// src/services/did_jwt.rs
//! DID-JWT verifiable credentials.
//!
//! Credentials are encoded as compact JWTs following the W3C VC-JWT mapping:
//! `iss` carries the issuer DID, `sub` the subject id, `nbf`/`exp` the
//! validity window and `jti` the credential id; the remaining credential
//! members travel in the `vc` claim.
//!
//! Verification resolves `iss` through a [`DidResolver`] and checks the
//! signature against the keys published in the DID document. Resolution
//! failures surface as `DidResolutionFailed`; everything wrong with the token
//! itself surfaces as `JwtInvalid`.
//!
//! Supported algorithms are `ES256` (P-256) and `EdDSA` (Ed25519).

use crate::error::VcError;
use crate::models::did::{DidDocument, VerificationMethod};
use crate::services::did_resolver::DidResolver;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::str::FromStr;
use std::sync::Arc;

const CREDENTIALS_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";
const JWT_PROOF_TYPE: &str = "JwtProof2020";

/// Private key used to sign credential JWTs.
#[derive(Clone)]
pub struct IssuerKey {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    kid: Option<String>,
}

impl IssuerKey {
    /// Loads a PKCS#8 PEM key for `ES256` or `EdDSA`.
    pub fn from_pem(algorithm: Algorithm, pem: &[u8]) -> Result<Self, VcError> {
        let encoding_key = match algorithm {
            Algorithm::ES256 => EncodingKey::from_ec_pem(pem),
            Algorithm::EdDSA => EncodingKey::from_ed_pem(pem),
            other => return Err(unsupported(other)),
        }
        .map_err(|e| VcError::InvalidRequest(format!("invalid issuer key: {}", e)))?;
        Ok(Self {
            algorithm,
            encoding_key,
            kid: None,
        })
    }

    /// Loads a PKCS#8 DER key for `ES256` or `EdDSA`.
    pub fn from_pkcs8_der(algorithm: Algorithm, der: &[u8]) -> Result<Self, VcError> {
        let encoding_key = match algorithm {
            Algorithm::ES256 => EncodingKey::from_ec_der(der),
            Algorithm::EdDSA => EncodingKey::from_ed_der(der),
            other => return Err(unsupported(other)),
        };
        Ok(Self {
            algorithm,
            encoding_key,
            kid: None,
        })
    }

    /// Sets the `kid` header emitted with every token.
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

fn unsupported(algorithm: Algorithm) -> VcError {
    VcError::InvalidRequest(format!("unsupported signing algorithm {:?}", algorithm))
}

/// Parses `ES256` / `EdDSA`.
pub fn parse_algorithm(name: &str) -> Result<Algorithm, VcError> {
    match Algorithm::from_str(name) {
        Ok(alg @ (Algorithm::ES256 | Algorithm::EdDSA)) => Ok(alg),
        Ok(other) => Err(unsupported(other)),
        Err(_) => Err(VcError::InvalidRequest(format!("unknown algorithm {}", name))),
    }
}

/// Outcome of a successful JWT verification.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedJwt {
    /// Verified JWT claims
    pub payload: Value,
    /// Credential rebuilt from the claims, with a `JwtProof2020` proof
    pub verifiable_credential: Value,
    pub issuer: String,
    pub jwt: String,
}

/// Signs `credential` as a JWT issued by `issuer_did`.
pub fn issue_jwt(
    credential: &Value,
    issuer_did: &str,
    key: &IssuerKey,
    header_overrides: Option<&Map<String, Value>>,
) -> Result<String, VcError> {
    let claims = credential_to_claims(credential, issuer_did, Utc::now().timestamp())?;

    let mut header = Header::new(key.algorithm);
    header.kid = key.kid.clone();
    if let Some(overrides) = header_overrides {
        apply_header_overrides(&mut header, overrides)?;
    }

    encode(&header, &claims, &key.encoding_key).map_err(|e| VcError::Signing(e.to_string()))
}

/// Verifies a credential JWT against its issuer's DID document.
pub async fn verify_jwt(jwt: &str, resolver: &dyn DidResolver) -> Result<VerifiedJwt, VcError> {
    let header = decode_header(jwt)
        .map_err(|e| VcError::JwtInvalid(format!("malformed header: {}", e)))?;
    if !matches!(header.alg, Algorithm::ES256 | Algorithm::EdDSA) {
        return Err(VcError::JwtInvalid(format!("unsupported algorithm {:?}", header.alg)));
    }

    let issuer = unverified_claims(jwt)?
        .get("iss")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| VcError::JwtInvalid("missing iss claim".into()))?;

    let document = resolver.resolve(&issuer).await?;
    let keys = decoding_keys(&document, header.alg, header.kid.as_deref());
    if keys.is_empty() {
        return Err(VcError::JwtInvalid(format!(
            "{} publishes no {:?} verification key",
            issuer, header.alg
        )));
    }

    let mut validation = Validation::new(header.alg);
    validation.set_required_spec_claims(&["iss"]);
    validation.set_issuer(&[issuer.as_str()]);
    validation.validate_nbf = true;

    for key in &keys {
        match decode::<Map<String, Value>>(jwt, key, &validation) {
            Ok(data) => {
                log::info!("verified credential JWT issued by {}", issuer);
                return Ok(VerifiedJwt {
                    verifiable_credential: claims_to_credential(&data.claims, &issuer, jwt),
                    payload: Value::Object(data.claims),
                    issuer,
                    jwt: jwt.to_string(),
                });
            }
            Err(e) if matches!(e.kind(), ErrorKind::InvalidSignature) => continue,
            Err(e) => return Err(VcError::JwtInvalid(e.to_string())),
        }
    }
    Err(VcError::JwtInvalid(format!(
        "signature does not match any key of {}",
        issuer
    )))
}

/// Service facade binding a configured issuer and resolver.
pub struct DidJwtVcService {
    issuer: Option<(String, IssuerKey)>,
    resolver: Arc<dyn DidResolver>,
}

impl DidJwtVcService {
    pub fn new(resolver: Arc<dyn DidResolver>) -> Self {
        Self {
            issuer: None,
            resolver,
        }
    }

    /// Configures the DID and key used by [`Self::issue`].
    pub fn with_issuer(mut self, issuer_did: impl Into<String>, key: IssuerKey) -> Self {
        self.issuer = Some((issuer_did.into(), key));
        self
    }

    pub fn issue(
        &self,
        credential: &Value,
        header_overrides: Option<&Map<String, Value>>,
    ) -> Result<String, VcError> {
        let (did, key) = self
            .issuer
            .as_ref()
            .ok_or_else(|| VcError::InvalidRequest("no DID-JWT issuer is configured".into()))?;
        issue_jwt(credential, did, key, header_overrides)
    }

    pub async fn verify(&self, jwt: &str) -> Result<VerifiedJwt, VcError> {
        verify_jwt(jwt, self.resolver.as_ref()).await
    }
}

fn credential_to_claims(
    credential: &Value,
    issuer_did: &str,
    now: i64,
) -> Result<Map<String, Value>, VcError> {
    let mut vc = credential
        .as_object()
        .cloned()
        .ok_or_else(|| VcError::InvalidRequest("credential must be a JSON object".into()))?;
    vc.remove("proof");

    if let Some(issuer) = vc.remove("issuer") {
        let id = match &issuer {
            Value::String(id) => Some(id.as_str()),
            Value::Object(profile) => profile.get("id").and_then(Value::as_str),
            _ => None,
        };
        if id != Some(issuer_did) {
            return Err(VcError::InvalidRequest(format!(
                "credential issuer {} does not match signing DID {}",
                issuer, issuer_did
            )));
        }
    }

    let mut claims = Map::new();
    claims.insert("iss".into(), json!(issuer_did));

    if let Some(Value::Object(subject)) = vc.get_mut("credentialSubject") {
        if let Some(Value::String(sub)) = subject.remove("id") {
            claims.insert("sub".into(), json!(sub));
        }
    }

    let nbf = match vc.remove("issuanceDate") {
        Some(date) => timestamp(&date, "issuanceDate")?,
        None => now,
    };
    claims.insert("nbf".into(), json!(nbf));
    if let Some(date) = vc.remove("expirationDate") {
        claims.insert("exp".into(), json!(timestamp(&date, "expirationDate")?));
    }
    if let Some(id) = vc.remove("id") {
        claims.insert("jti".into(), id);
    }
    claims.insert("iat".into(), json!(now));

    vc.entry("@context").or_insert_with(|| json!([CREDENTIALS_CONTEXT]));
    vc.entry("type").or_insert_with(|| json!(["VerifiableCredential"]));
    claims.insert("vc".into(), Value::Object(vc));
    Ok(claims)
}

fn timestamp(value: &Value, field: &str) -> Result<i64, VcError> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp())
        .ok_or_else(|| VcError::InvalidRequest(format!("{} must be an RFC 3339 date", field)))
}

fn rfc3339(seconds: i64) -> Option<String> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn claims_to_credential(claims: &Map<String, Value>, issuer: &str, jwt: &str) -> Value {
    let mut vc = claims
        .get("vc")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    vc.insert("issuer".into(), json!({ "id": issuer }));
    if let Some(sub) = claims.get("sub").and_then(Value::as_str) {
        let subject = vc
            .entry("credentialSubject")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(subject) = subject {
            subject.insert("id".into(), json!(sub));
        }
    }
    let issued = claims
        .get("nbf")
        .or_else(|| claims.get("iat"))
        .and_then(Value::as_i64)
        .and_then(rfc3339);
    if let Some(date) = issued {
        vc.insert("issuanceDate".into(), json!(date));
    }
    if let Some(date) = claims.get("exp").and_then(Value::as_i64).and_then(rfc3339) {
        vc.insert("expirationDate".into(), json!(date));
    }
    if let Some(jti) = claims.get("jti") {
        vc.insert("id".into(), jti.clone());
    }
    vc.insert("proof".into(), json!({ "type": JWT_PROOF_TYPE, "jwt": jwt }));
    Value::Object(vc)
}

fn apply_header_overrides(header: &mut Header, overrides: &Map<String, Value>) -> Result<(), VcError> {
    for (name, value) in overrides {
        let text = value
            .as_str()
            .ok_or_else(|| VcError::InvalidRequest(format!("header {} must be a string", name)))?
            .to_string();
        match name.as_str() {
            "alg" => {
                if parse_algorithm(&text)? != header.alg {
                    return Err(VcError::InvalidRequest(format!(
                        "header alg {} does not match the issuer key",
                        text
                    )));
                }
            }
            "typ" => header.typ = Some(text),
            "kid" => header.kid = Some(text),
            "cty" => header.cty = Some(text),
            "jku" => header.jku = Some(text),
            "x5u" => header.x5u = Some(text),
            "x5t" => header.x5t = Some(text),
            other => {
                return Err(VcError::InvalidRequest(format!(
                    "unsupported header field {}",
                    other
                )))
            }
        }
    }
    Ok(())
}

fn unverified_claims(jwt: &str) -> Result<Map<String, Value>, VcError> {
    let mut parts = jwt.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(VcError::JwtInvalid("expected three dot-separated segments".into())),
    };
    let bytes = base64::decode_config(payload, base64::URL_SAFE_NO_PAD)
        .map_err(|e| VcError::JwtInvalid(format!("payload is not base64url: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| VcError::JwtInvalid(format!("payload is not a JSON object: {}", e)))
}

fn decoding_keys(document: &DidDocument, alg: Algorithm, kid: Option<&str>) -> Vec<DecodingKey> {
    document
        .verification_method
        .iter()
        .filter(|vm| kid.map_or(true, |kid| vm.matches_kid(&document.id, kid)))
        .filter_map(|vm| decoding_key(vm, alg))
        .collect()
}

fn decoding_key(vm: &VerificationMethod, alg: Algorithm) -> Option<DecodingKey> {
    let b64url = |s: &str| base64::decode_config(s, base64::URL_SAFE_NO_PAD).ok();
    match alg {
        Algorithm::ES256 => {
            let jwk = vm.public_key_jwk.as_ref()?;
            if jwk.kty != "EC" || jwk.crv.as_deref() != Some("P-256") {
                return None;
            }
            let x = b64url(&jwk.x)?;
            let y = b64url(jwk.y.as_deref()?)?;
            if x.len() != 32 || y.len() != 32 {
                return None;
            }
            let mut point = Vec::with_capacity(65);
            point.push(0x04);
            point.extend_from_slice(&x);
            point.extend_from_slice(&y);
            Some(DecodingKey::from_ec_der(&point))
        }
        Algorithm::EdDSA => {
            let raw = match (&vm.public_key_jwk, &vm.public_key_base58) {
                (Some(jwk), _) if jwk.kty == "OKP" && jwk.crv.as_deref() == Some("Ed25519") => {
                    b64url(&jwk.x)?
                }
                (None, Some(base58)) => bs58::decode(base58).into_vec().ok()?,
                _ => return None,
            };
            (raw.len() == 32).then(|| DecodingKey::from_ed_der(&raw))
        }
        _ => None,
    }
}
