//! Contract wrapping
//!
//! User code is submitted Base-64 encoded and defines action handlers on
//! a local `actions` map. At deploy time it is substituted into a fixed
//! dispatch template; the wrapped source is what gets stored and what
//! runs on every subsequent call. The preamble cannot be bypassed, and
//! it removes `createSSC` from the map on every non-deploy dispatch, so
//! contract initialization is reachable exactly once.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

const CODE_MARKER: &str = "###CONTRACT_CODE###";

const CONTRACT_TEMPLATE: &str = r#"let actions = #{};

###CONTRACT_CODE###

if type_of(action) == "string" && action in actions && type_of(actions[action]) == "Fn" {
    if action != "createSSC" {
        actions["createSSC"] = ();
    }
    let handler = actions[action];
    handler.call(payload);
}
"#;

/// Substitute decoded user code into the dispatch template.
pub fn wrap_contract_code(user_code: &str) -> String {
    CONTRACT_TEMPLATE.replace(CODE_MARKER, user_code)
}

/// Decode the Base-64 contract source submitted in a deploy payload.
pub fn decode_contract_code(encoded: &str) -> Result<String, String> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| format!("invalid base64 contract code: {e}"))?;
    String::from_utf8(bytes).map_err(|e| format!("contract code is not valid utf-8: {e}"))
}

/// Encode contract source the way submitters do. Used by tests and tools.
pub fn encode_contract_code(source: &str) -> String {
    BASE64.encode(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_substitutes_user_code() {
        let wrapped = wrap_contract_code("actions.noop = |payload| {};");
        assert!(wrapped.starts_with("let actions = #{};"));
        assert!(wrapped.contains("actions.noop"));
        assert!(!wrapped.contains(CODE_MARKER));
    }

    #[test]
    fn encode_decode_roundtrip() {
        let source = "actions.mint = |payload| { emit(\"minted\", payload); };";
        let decoded = decode_contract_code(&encode_contract_code(source)).unwrap();
        assert_eq!(decoded, source);
    }

    #[test]
    fn bad_base64_is_rejected() {
        assert!(decode_contract_code("!!not base64!!").is_err());
    }
}
