use hmac::{Hmac, Mac};
use serde_json::{Map, Value as JsonValue};
use sha2::Sha256;

use crate::error::{Result, TrackerError};

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `payload` keyed with `secret`.
pub fn hmac_sha256_hex(secret: &str, payload: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| TrackerError::Config(format!("invalid signing secret: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Concatenates `key + value` for every parameter in key order, without separators.
///
/// Strings are written raw. Any other value is written as its JSON text, so booleans
/// and null read `true`, `false` and `null`, and nested values keep their JSON form.
pub fn canonical_params(params: &Map<String, JsonValue>) -> String {
    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|key| {
            let value = match &params[key] {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{}{}", key, value)
        })
        .collect()
}

/// The exact string the exchange signs: method, id, api key, sorted params, nonce.
pub fn signature_payload(
    method: &str,
    id: u64,
    api_key: &str,
    params: &Map<String, JsonValue>,
    nonce: i64,
) -> String {
    format!(
        "{}{}{}{}{}",
        method,
        id,
        api_key,
        canonical_params(params),
        nonce
    )
}
