//! JSON codec between typed values and the store's string representation.
//!
//! Every value this crate writes goes through [`encode`] and is read back
//! through [`decode`]. The empty string is reserved as [`NULL_MARKER`]: a
//! serialized JSON document is never empty, so the placeholder can never be
//! confused with a real payload.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

/// Placeholder stored for ids the primary store confirmed absent.
///
/// It is distinct from "key absent": a key holding `NULL_MARKER` means the
/// lookup was already made and came back empty.
pub const NULL_MARKER: &str = "";

/// Serializes `value` into its stored string form.
///
/// # Examples
///
/// ```
/// use cacheguard_core::codec;
///
/// let encoded = codec::encode(&vec![1, 2, 3]).unwrap();
/// assert_eq!(encoded, "[1,2,3]");
/// ```
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, CodecError> {
    serde_json::to_string(value).map_err(CodecError::Encode)
}

/// Deserializes a stored string back into `T`.
///
/// `key` is only used to give decode failures some context.
///
/// # Examples
///
/// ```
/// use cacheguard_core::codec;
///
/// let decoded: Vec<u32> = codec::decode("shop:list", "[1,2,3]").unwrap();
/// assert_eq!(decoded, vec![1, 2, 3]);
/// ```
pub fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, CodecError> {
    serde_json::from_str(raw).map_err(|source| CodecError::Decode {
        key: key.to_string(),
        source,
    })
}

/// Returns true if `raw` is the null placeholder.
#[inline]
pub fn is_null_marker(raw: &str) -> bool {
    raw == NULL_MARKER
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Shop {
        id: u64,
        name: String,
        score: f32,
        tags: Vec<String>,
        area: Option<String>,
    }

    #[test]
    fn test_struct_round_trip() {
        let shop = Shop {
            id: 1,
            name: "103 Tea House".to_string(),
            score: 4.5,
            tags: vec!["tea".to_string(), "snacks".to_string()],
            area: None,
        };

        let raw = encode(&shop).unwrap();
        let back: Shop = decode("shop:1", &raw).unwrap();
        assert_eq!(back, shop);
    }

    #[test]
    fn test_encoded_value_is_never_the_null_marker() {
        assert!(!is_null_marker(&encode("").unwrap()));
        assert!(!is_null_marker(&encode(&Vec::<u8>::new()).unwrap()));
        assert!(!is_null_marker(&encode(&()).unwrap()));
    }

    #[test]
    fn test_decode_malformed_is_an_error() {
        let result: Result<Shop, _> = decode("shop:9", "{\"id\":");
        match result {
            Err(CodecError::Decode { key, .. }) => assert_eq!(key, "shop:9"),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_null_marker_detection() {
        assert!(is_null_marker(""));
        assert!(!is_null_marker(" "));
        assert!(!is_null_marker("null"));
    }
}
