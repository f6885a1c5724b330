// src/utils/canonicalize.rs
//! Document canonicalization.
//!
//! The canonicalizer is a pure function from a JSON document to a
//! deterministic byte string. Hashing always flows through it so that
//! semantically identical documents hash identically.

use crate::error::VcError;
use serde_json::Value;

/// Deterministic document → bytes normalization.
pub trait Canonicalizer: Send + Sync {
    fn canonicalize(&self, document: &Value) -> Result<Vec<u8>, VcError>;
}

/// JSON Canonicalization Scheme (RFC 8785) serializer.
///
/// Non-integer numbers are rejected before serialization since their textual
/// form is not stable across producers. The top-level value must be an object.
#[derive(Debug, Clone, Copy, Default)]
pub struct JcsCanonicalizer;

impl Canonicalizer for JcsCanonicalizer {
    fn canonicalize(&self, document: &Value) -> Result<Vec<u8>, VcError> {
        if !document.is_object() {
            return Err(VcError::CanonicalizationFailed(
                "document must be a JSON object".into(),
            ));
        }
        reject_floats(document)?;
        serde_jcs::to_string(document)
            .map(String::into_bytes)
            .map_err(|e| VcError::CanonicalizationFailed(e.to_string()))
    }
}

fn reject_floats(value: &Value) -> Result<(), VcError> {
    match value {
        Value::Number(n) if !n.is_i64() && !n.is_u64() => Err(VcError::CanonicalizationFailed(
            format!("non-integer number {} is not canonicalizable", n),
        )),
        Value::Array(items) => items.iter().try_for_each(reject_floats),
        Value::Object(map) => map.values().try_for_each(reject_floats),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_and_whitespace_are_normalized() {
        let a = json!({ "b": 1, "a": { "y": [true, null], "x": "s" } });
        let b: Value =
            serde_json::from_str(r#"{ "a" : { "x" : "s", "y" : [ true , null ] }, "b" : 1 }"#)
                .unwrap();
        let canon = JcsCanonicalizer;
        let bytes = canon.canonicalize(&a).unwrap();
        assert_eq!(bytes, canon.canonicalize(&b).unwrap());
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":{"x":"s","y":[true,null]},"b":1}"#
        );
    }

    #[test]
    fn test_rejects_floats_and_non_objects() {
        let canon = JcsCanonicalizer;
        assert!(matches!(
            canon.canonicalize(&json!({ "score": 1.5 })),
            Err(VcError::CanonicalizationFailed(_))
        ));
        assert!(matches!(
            canon.canonicalize(&json!({ "nested": [{ "weight": 0.25 }] })),
            Err(VcError::CanonicalizationFailed(_))
        ));
        assert!(matches!(
            canon.canonicalize(&json!(["not", "an", "object"])),
            Err(VcError::CanonicalizationFailed(_))
        ));
    }

    #[test]
    fn test_matches_jcs_output() {
        let document = json!({
            "credentialSubject": { "name": "Zoë", "id": "did:example:alice" },
            "\u{e000}": 1,
            "😀": 2,
            "count": -7
        });
        let bytes = JcsCanonicalizer.canonicalize(&document).unwrap();
        assert_eq!(bytes, serde_jcs::to_string(&document).unwrap().into_bytes());
        assert!(String::from_utf8(bytes)
            .unwrap()
            .starts_with(r#"{"count":-7,"credentialSubject":{"id":"did:example:alice","name":"Zoë"}"#));
    }

    #[test]
    fn test_strings_are_escaped() {
        let bytes = JcsCanonicalizer
            .canonicalize(&json!({ "quote": "say \"hi\"\n" }))
            .unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"quote":"say \"hi\"\n"}"#);
    }
}
