//! Request-signature authentication.
//!
//! Every scalar value at the root of a request body, plus the merchant's
//! secret under a `Password` key, is sorted by key, concatenated, and
//! hashed with SHA-256 to hex. Nested objects/arrays and null values are
//! dropped from the scalar set before signing.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// A flat map of request parameters reduced to the scalars the protocol signs.
///
/// `BTreeMap` gives ordinal byte-ordering over keys for free, which is
/// exactly the sort order the protocol requires.
pub type ScalarParams = BTreeMap<String, String>;

/// Extract root-level scalar entries from an arbitrary JSON object: nested
/// objects, arrays, and nulls are dropped; booleans become the lowercase
/// words `true`/`false`; numbers keep the textual form the caller supplied;
/// strings pass through untouched.
pub fn scalars_from_json(value: &Value) -> ScalarParams {
    let mut out = BTreeMap::new();
    let Value::Object(map) = value else {
        return out;
    };
    for (key, v) in map {
        let scalar = match v {
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Null | Value::Object(_) | Value::Array(_) => continue,
        };
        out.insert(key.clone(), scalar);
    }
    out
}

/// Deterministic request signer: canonicalize + SHA-256 + hex.
pub struct Signer;

impl Signer {
    /// Produce the lowercase hex signature for `params` under `secret`.
    ///
    /// Inserts `Password` (literal key name, per protocol) before sorting,
    /// then concatenates values with no separator in key order.
    pub fn sign(params: &ScalarParams, secret: &str) -> String {
        let mut with_secret = params.clone();
        with_secret.insert("Password".to_string(), secret.to_string());

        let mut buf = String::new();
        for value in with_secret.values() {
            buf.push_str(value);
        }

        let digest = Sha256::digest(buf.as_bytes());
        hex::encode(digest)
    }

    /// Verify `provided_hex` against the signature computed for `params`/`secret`.
    ///
    /// Comparison is constant-time over the decoded bytes and
    /// case-insensitive on the input hex; failure never reveals the
    /// expected signature.
    pub fn verify(params: &ScalarParams, provided_hex: &str, secret: &str) -> bool {
        let expected = Self::sign(params, secret);
        constant_time_eq(expected.as_bytes(), provided_hex.to_lowercase().as_bytes())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_params() -> ScalarParams {
        let mut m = BTreeMap::new();
        m.insert("Amount".to_string(), "1000".to_string());
        m.insert("Currency".to_string(), "RUB".to_string());
        m.insert("OrderId".to_string(), "o1".to_string());
        m
    }

    #[test]
    fn sign_is_deterministic() {
        let p = sample_params();
        assert_eq!(Signer::sign(&p, "s"), Signer::sign(&p, "s"));
    }

    #[test]
    fn sign_matches_known_vector() {
        // sort order: Amount, Currency, OrderId, Password -> "1000" "RUB" "o1" "s"
        let p = sample_params();
        let expected = {
            let digest = Sha256::digest(b"1000RUBo1s");
            hex::encode(digest)
        };
        assert_eq!(Signer::sign(&p, "s"), expected);
    }

    #[test]
    fn verify_round_trips() {
        let p = sample_params();
        let sig = Signer::sign(&p, "s");
        assert!(Signer::verify(&p, &sig, "s"));
    }

    #[test]
    fn verify_rejects_flipped_signature_byte() {
        let p = sample_params();
        let mut sig = Signer::sign(&p, "s");
        let last = sig.pop().unwrap();
        let flipped = if last == '0' { '1' } else { '0' };
        sig.push(flipped);
        assert!(!Signer::verify(&p, &sig, "s"));
    }

    #[test]
    fn verify_rejects_any_changed_param_value() {
        let p = sample_params();
        let sig = Signer::sign(&p, "s");
        let mut changed = p.clone();
        changed.insert("OrderId".to_string(), "o2".to_string());
        assert!(!Signer::verify(&changed, &sig, "s"));
    }

    #[test]
    fn verify_is_case_insensitive_on_provided_hex() {
        let p = sample_params();
        let sig = Signer::sign(&p, "s");
        assert!(Signer::verify(&p, &sig.to_uppercase(), "s"));
    }

    #[test]
    fn scalars_from_json_drops_nested_and_null_entries() {
        let v = json!({
            "Amount": "1000",
            "nested": {"a": 1},
            "arr": [1, 2],
            "missing": null,
            "flag": true,
        });
        let scalars = scalars_from_json(&v);
        assert_eq!(scalars.len(), 2);
        assert_eq!(scalars.get("Amount").unwrap(), "1000");
        assert_eq!(scalars.get("flag").unwrap(), "true");
    }
}
