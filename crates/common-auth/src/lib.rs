//! Token payload decoding shared across tokenwatch crates.
//!
//! Tokens are three dot-separated segments whose middle segment is a base64
//! encoded JSON object. Nothing here verifies signatures; the decoder only
//! exposes the claims so they can be inspected.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Number of dot-separated segments in a well-formed token.
pub const TOKEN_SEGMENTS: usize = 3;

/// Reasons a token could not be decoded.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No token was supplied.
    #[error("token is absent")]
    Absent,
    /// The token did not split into header, payload and signature.
    #[error("expected {TOKEN_SEGMENTS} segments, found {0}")]
    Segments(usize),
    /// The payload segment was not valid base64.
    #[error("payload segment is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    /// The payload bytes were not valid JSON.
    #[error("payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    /// The payload parsed but was not a JSON object.
    #[error("payload is not a json object")]
    NotAnObject,
}

/// Claims carried in the middle segment of a token.
///
/// The map is open: only `exp`, `iat` and `token_type` have typed accessors,
/// every other claim is reachable through [`TokenPayload::claim`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenPayload(Map<String, Value>);

impl TokenPayload {
    pub fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    /// Wraps a JSON value, returning `None` unless it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(claims) => Some(Self(claims)),
            _ => None,
        }
    }

    /// Expiry as epoch seconds.
    pub fn exp(&self) -> Option<i64> {
        self.numeric_claim("exp")
    }

    /// Issued-at as epoch seconds.
    pub fn iat(&self) -> Option<i64> {
        self.numeric_claim("iat")
    }

    pub fn token_type(&self) -> Option<&str> {
        self.0.get("token_type").and_then(Value::as_str)
    }

    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn claims(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    fn numeric_claim(&self, name: &str) -> Option<i64> {
        let value = self.0.get(name)?;
        value
            .as_i64()
            .or_else(|| value.as_u64().and_then(|raw| i64::try_from(raw).ok()))
            .or_else(|| value.as_f64().map(|raw| raw.trunc() as i64))
    }
}

impl From<Map<String, Value>> for TokenPayload {
    fn from(claims: Map<String, Value>) -> Self {
        Self(claims)
    }
}

/// Decodes the payload of `token`, mapping every failure to `None`.
pub fn decode_payload(token: Option<&str>) -> Option<TokenPayload> {
    match try_decode_payload(token) {
        Ok(payload) => Some(payload),
        Err(error) => {
            tracing::trace!(%error, "token payload not decodable");
            None
        }
    }
}

/// Decodes the payload of `token`, reporting why decoding failed.
pub fn try_decode_payload(token: Option<&str>) -> Result<TokenPayload, AuthError> {
    let token = token.ok_or(AuthError::Absent)?;
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != TOKEN_SEGMENTS {
        return Err(AuthError::Segments(segments.len()));
    }

    let bytes = decode_segment(segments[1])?;
    let value: Value = serde_json::from_slice(&bytes)?;
    TokenPayload::from_value(value).ok_or(AuthError::NotAnObject)
}

/// Seconds until the payload's `exp`, measured against `now_ms`.
///
/// Negative once the token has expired; `None` when there is no `exp` claim
/// or the difference does not fit in an `i64`.
pub fn seconds_remaining(payload: &TokenPayload, now_ms: i64) -> Option<i64> {
    payload
        .exp()
        .and_then(|exp| exp.checked_sub(now_ms.div_euclid(1000)))
}

/// Builds an unsigned token carrying `payload`.
///
/// The header declares `alg: none` and the signature segment is empty.
pub fn encode_unsigned(payload: &TokenPayload) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let body = serde_json::to_vec(payload).unwrap_or_else(|_| b"{}".to_vec());
    format!("{header}.{}.", URL_SAFE_NO_PAD.encode(body))
}

// Accepts both alphabets, padded or not.
fn decode_segment(segment: &str) -> Result<Vec<u8>, AuthError> {
    let normalized: String = segment
        .trim_end_matches('=')
        .chars()
        .map(|ch| match ch {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    Ok(STANDARD_NO_PAD.decode(normalized.as_bytes())?)
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::STANDARD;
    use serde_json::json;

    use super::*;

    fn payload(value: Value) -> TokenPayload {
        TokenPayload::from_value(value).expect("object payload")
    }

    #[test]
    fn decodes_exp_and_iat_from_encoded_token() {
        let original = payload(json!({ "exp": 1_700_000_000, "iat": 1_699_999_000 }));
        let token = encode_unsigned(&original);

        let decoded = decode_payload(Some(&token)).expect("payload");
        assert_eq!(decoded.exp(), Some(1_700_000_000));
        assert_eq!(decoded.iat(), Some(1_699_999_000));
        assert_eq!(decoded, original);
    }

    #[test]
    fn malformed_tokens_yield_no_payload() {
        let cases = [
            None,
            Some(""),
            Some("not-a-token"),
            Some("only.two"),
            Some("a.b.c.d"),
            Some("header.%%%.sig"),
            Some("header..sig"),
        ];
        for case in cases {
            assert!(decode_payload(case).is_none(), "{case:?} should not decode");
        }
    }

    #[test]
    fn non_object_json_is_rejected() {
        let token = format!("h.{}.s", URL_SAFE_NO_PAD.encode(b"[1,2,3]"));
        assert!(matches!(
            try_decode_payload(Some(&token)),
            Err(AuthError::NotAnObject)
        ));

        let token = format!("h.{}.s", URL_SAFE_NO_PAD.encode(b"{not json"));
        assert!(matches!(
            try_decode_payload(Some(&token)),
            Err(AuthError::Json(_))
        ));
    }

    #[test]
    fn accepts_padded_standard_alphabet() {
        // `?` in the claim forces `/` in the standard alphabet.
        let body = br#"{"sub":"??>","token_type":"access"}"#;
        let token = format!("h.{}.s", STANDARD.encode(body));

        let decoded = decode_payload(Some(&token)).expect("payload");
        assert_eq!(decoded.token_type(), Some("access"));
        assert_eq!(decoded.claim("sub"), Some(&json!("??>")));
    }

    #[test]
    fn float_claims_are_truncated() {
        let decoded = payload(json!({ "exp": 1_700_000_000.9 }));
        assert_eq!(decoded.exp(), Some(1_700_000_000));
        assert_eq!(decoded.iat(), None);
    }

    #[test]
    fn seconds_remaining_floors_now() {
        let decoded = payload(json!({ "exp": 1_700_000_000 }));
        assert_eq!(seconds_remaining(&decoded, 1_699_999_990_999), Some(10));
        assert_eq!(seconds_remaining(&decoded, 1_700_000_005_000), Some(-5));
        assert_eq!(seconds_remaining(&payload(json!({})), 0), None);
    }

    #[test]
    fn extreme_exp_does_not_overflow() {
        let now_ms = 1_699_999_990_500;
        let lowest = payload(json!({ "exp": i64::MIN }));
        assert_eq!(lowest.exp(), Some(i64::MIN));
        assert_eq!(seconds_remaining(&lowest, now_ms), None);

        let saturated = payload(json!({ "exp": -1e300 }));
        assert_eq!(saturated.exp(), Some(i64::MIN));
        assert_eq!(seconds_remaining(&saturated, now_ms), None);

        let highest = payload(json!({ "exp": i64::MAX }));
        assert_eq!(seconds_remaining(&highest, -1_000), None);
        assert_eq!(seconds_remaining(&highest, 0), Some(i64::MAX));
    }

    #[test]
    fn segment_count_is_reported() {
        assert!(matches!(
            try_decode_payload(Some("a.b")),
            Err(AuthError::Segments(2))
        ));
        assert!(matches!(try_decode_payload(None), Err(AuthError::Absent)));
    }
}
