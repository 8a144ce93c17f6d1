//! Canonical JSON serialization
//!
//! The same logical value must always produce the same byte sequence,
//! because block hashes and signatures are computed over serialized JSON.
//! Canonical form: object keys in lexical order, no insignificant
//! whitespace. Routing through `serde_json::Value` sorts object keys
//! (its map type is a `BTreeMap`).

use serde::Serialize;

use crate::error::CoreResult;

/// Serialize `value` as canonical JSON text.
pub fn to_canonical_json<T: Serialize>(value: &T) -> CoreResult<String> {
    let v = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&v)?)
}

/// Canonical JSON of an already-parsed value.
pub fn value_to_canonical_json(value: &serde_json::Value) -> CoreResult<String> {
    Ok(serde_json::to_string(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Unordered {
        zebra: u32,
        alpha: u32,
        mid: &'static str,
    }

    #[test]
    fn keys_are_sorted() {
        let s = to_canonical_json(&Unordered {
            zebra: 1,
            alpha: 2,
            mid: "x",
        })
        .unwrap();
        assert_eq!(s, r#"{"alpha":2,"mid":"x","zebra":1}"#);
    }

    #[test]
    fn nested_objects_are_sorted_too() {
        let v: serde_json::Value =
            serde_json::from_str(r#"{"b":{"d":1,"c":2},"a":3}"#).unwrap();
        assert_eq!(
            value_to_canonical_json(&v).unwrap(),
            r#"{"a":3,"b":{"c":2,"d":1}}"#
        );
    }

    #[test]
    fn identical_values_identical_bytes() {
        let a: serde_json::Value = serde_json::from_str(r#"{"x":1,"y":[1,2]}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{ "y": [1, 2], "x": 1 }"#).unwrap();
        assert_eq!(
            value_to_canonical_json(&a).unwrap(),
            value_to_canonical_json(&b).unwrap()
        );
    }
}
