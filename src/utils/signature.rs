//! 支付网关 webhook 签名: `X-Payment-Signature: t=<unix>,v1=<base64url(HMAC-SHA256("t.body"))>`

use crate::error::{AppError, AppResult};
use jsonwebtoken::crypto;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};

pub const SIGNATURE_HEADER: &str = "X-Payment-Signature";
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, PartialEq, Eq)]
struct ParsedHeader<'a> {
    timestamp: i64,
    signature: &'a str,
}

fn parse_header(header: &str) -> AppResult<ParsedHeader<'_>> {
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("v1", v)) => signature = Some(v),
            _ => {}
        }
    }
    match (timestamp, signature) {
        (Some(timestamp), Some(signature)) => Ok(ParsedHeader {
            timestamp,
            signature,
        }),
        _ => Err(AppError::AuthError("Malformed signature header".into())),
    }
}

pub fn sign_payload(secret: &str, timestamp: i64, body: &[u8]) -> AppResult<String> {
    let message = signed_message(timestamp, body);
    let key = EncodingKey::from_secret(secret.as_bytes());
    Ok(crypto::sign(&message, &key, Algorithm::HS256)?)
}

pub fn signature_header(secret: &str, timestamp: i64, body: &[u8]) -> AppResult<String> {
    Ok(format!("t={timestamp},v1={}", sign_payload(secret, timestamp, body)?))
}

/// 校验签名与时间窗口
pub fn verify_signature(
    secret: &str,
    header: &str,
    body: &[u8],
    now_unix: i64,
    tolerance_secs: i64,
) -> AppResult<()> {
    if secret.is_empty() {
        return Err(AppError::ConfigError("Webhook secret is not configured".into()));
    }
    let parsed = parse_header(header)?;
    if (now_unix - parsed.timestamp).abs() > tolerance_secs {
        return Err(AppError::AuthError("Signature timestamp outside tolerance".into()));
    }
    let message = signed_message(parsed.timestamp, body);
    let key = DecodingKey::from_secret(secret.as_bytes());
    let valid = crypto::verify(parsed.signature, &message, &key, Algorithm::HS256)
        .map_err(|_| AppError::AuthError("Invalid signature".into()))?;
    if !valid {
        return Err(AppError::AuthError("Invalid signature".into()));
    }
    Ok(())
}

fn signed_message(timestamp: i64, body: &[u8]) -> Vec<u8> {
    let mut message = format!("{timestamp}.").into_bytes();
    message.extend_from_slice(body);
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"type":"charge.succeeded"}"#;

    #[test]
    fn test_valid_signature_passes() {
        let header = signature_header("whsec", 1_700_000_000, BODY).unwrap();
        assert!(verify_signature("whsec", &header, BODY, 1_700_000_010, 300).is_ok());
    }

    #[test]
    fn test_tampered_body_fails() {
        let header = signature_header("whsec", 1_700_000_000, BODY).unwrap();
        let err = verify_signature("whsec", &header, b"{}", 1_700_000_000, 300).unwrap_err();
        assert!(matches!(err, AppError::AuthError(_)));
    }

    #[test]
    fn test_stale_timestamp_fails() {
        let header = signature_header("whsec", 1_700_000_000, BODY).unwrap();
        assert!(verify_signature("whsec", &header, BODY, 1_700_001_000, 300).is_err());
    }

    #[test]
    fn test_malformed_header() {
        assert!(parse_header("v1=abc").is_err());
        assert_eq!(
            parse_header("t=5, v1=abc").unwrap(),
            ParsedHeader {
                timestamp: 5,
                signature: "abc"
            }
        );
    }
}
