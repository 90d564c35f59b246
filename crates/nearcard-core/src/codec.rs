//! Card payload codec - the wire format exchanged between peers
//!
//! Cards travel as a compact JSON object with string values. `name` and
//! `email` are validated strictly; `phone` and `job` are best-effort and
//! fall back to absent when missing, empty, or of the wrong type. A
//! partially-malformed optional field must never fail the whole decode.

use serde_json::Value;

use crate::error::{CardError, CardResult};
use crate::types::ProfilePayload;

/// Encode a card as a JSON object. Optional fields are omitted when absent.
pub fn encode(payload: &ProfilePayload) -> CardResult<Vec<u8>> {
    serde_json::to_vec(payload).map_err(|e| CardError::Serialization(e.to_string()))
}

/// Decode received bytes as a card payload.
///
/// Fails with [`CardError::DecodePayload`] when the bytes are not a JSON
/// object or when `name`/`email` is missing or not a string.
pub fn decode(bytes: &[u8]) -> CardResult<ProfilePayload> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| CardError::DecodePayload(format!("not valid JSON: {}", e)))?;

    let object = value
        .as_object()
        .ok_or_else(|| CardError::DecodePayload("payload is not an object".to_string()))?;

    let name = required_string(object, "name")?;
    let email = required_string(object, "email")?;

    Ok(ProfilePayload {
        name,
        email,
        phone: optional_string(object, "phone"),
        job: optional_string(object, "job"),
    })
}

fn required_string(
    object: &serde_json::Map<String, Value>,
    field: &str,
) -> CardResult<String> {
    object
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            CardError::DecodePayload(format!("missing or non-string field: {}", field))
        })
}

/// Lenient extraction: missing, null, wrong-typed, or empty values all
/// collapse to `None`. Some senders emit empty strings for unset fields,
/// so those are treated as absent too.
fn optional_string(object: &serde_json::Map<String, Value>, field: &str) -> Option<String> {
    object
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_full_card() {
        let card = ProfilePayload::new("Tom Jones", "tomjones@domain.com")
            .with_phone("+90 216 645 56 32")
            .with_job("Singer");

        let bytes = encode(&card).unwrap();
        assert_eq!(decode(&bytes).unwrap(), card);
    }

    #[test]
    fn test_round_trip_required_only() {
        let card = ProfilePayload::new("Tom Jones", "tomjones@domain.com");
        let bytes = encode(&card).unwrap();

        // Absent optionals are omitted from the wire form entirely
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(!text.contains("phone"));
        assert!(!text.contains("job"));

        assert_eq!(decode(&bytes).unwrap(), card);
    }

    #[test]
    fn test_missing_name_fails() {
        let err = decode(br#"{"email":"a@b.com"}"#).unwrap_err();
        assert!(matches!(err, CardError::DecodePayload(_)));
    }

    #[test]
    fn test_missing_email_fails() {
        let err = decode(br#"{"name":"Tom"}"#).unwrap_err();
        assert!(matches!(err, CardError::DecodePayload(_)));
    }

    #[test]
    fn test_non_string_required_field_fails() {
        let err = decode(br#"{"name":42,"email":"a@b.com"}"#).unwrap_err();
        assert!(matches!(err, CardError::DecodePayload(_)));
    }

    #[test]
    fn test_wrong_typed_optionals_are_dropped_not_fatal() {
        let card = decode(br#"{"name":"Tom","email":"a@b.com","phone":17,"job":null}"#).unwrap();
        assert_eq!(card.phone, None);
        assert_eq!(card.job, None);
    }

    #[test]
    fn test_empty_optionals_are_absent() {
        let card = decode(br#"{"name":"Tom","email":"a@b.com","phone":"","job":""}"#).unwrap();
        assert_eq!(card.phone, None);
        assert_eq!(card.job, None);
    }

    #[test]
    fn test_non_object_fails() {
        assert!(decode(br#"[1,2,3]"#).is_err());
        assert!(decode(br#""just a string""#).is_err());
    }

    #[test]
    fn test_garbage_bytes_fail() {
        assert!(decode(&[0xff, 0xfe, 0x00]).is_err());
        assert!(decode(b"{truncated").is_err());
    }
}
