//! V1 frame parsing (spec.md §4.5, §6).
//!
//! Content after the `0|` version pun is `<meta-base64>|<params-base64>`,
//! or — for backward compatibility — a bare, non-Base64-encoded
//! `Class/method(...)` line with no params at all. V1 has no overload
//! support: method resolution is by name only (see `descriptor::find_method`).

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::{
    error::ParseError,
    parse::{split_class_method, RawElem},
};

pub struct RawV1Request {
    pub class_name: String,
    pub method_name: String,
    pub raw_params: Vec<RawElem>,
}

const PARAM_SEPARATOR: &str = ":::";

pub fn parse_v1(content: &str) -> Result<RawV1Request, ParseError> {
    let body = content.strip_prefix("0|").unwrap_or(content);

    match body.split_once('|') {
        Some((meta_b64, params_b64)) => {
            let meta = decode_std_utf8(meta_b64)?;
            let (class_name, method_name) =
                split_class_method(&meta).ok_or(ParseError::Malformed)?;
            let raw_params = parse_params_block(params_b64)?;
            Ok(RawV1Request {
                class_name: class_name.to_string(),
                method_name: method_name.to_string(),
                raw_params,
            })
        }
        // Legacy bare frame: the whole body is plain-text "Class/method()",
        // never Base64-encoded, and carries no parameters.
        None => {
            let (class_name, method_name) =
                split_class_method(body).ok_or(ParseError::Malformed)?;
            Ok(RawV1Request {
                class_name: class_name.to_string(),
                method_name: method_name.to_string(),
                raw_params: vec![],
            })
        }
    }
}

fn parse_params_block(params_b64: &str) -> Result<Vec<RawElem>, ParseError> {
    if params_b64.is_empty() {
        return Ok(vec![]);
    }
    let block = decode_std_utf8(params_b64)?;
    if block.is_empty() {
        return Ok(vec![]);
    }
    block
        .split(PARAM_SEPARATOR)
        .map(|token| {
            let inner = token
                .strip_prefix("{{")
                .and_then(|t| t.strip_suffix("}}"))
                .ok_or(ParseError::Malformed)?;
            let text = decode_std_utf8(inner)?;
            Ok(if text == crate::mapper::builtin::NULL_MARKER_V1 {
                RawElem::Null
            } else {
                RawElem::Text(text)
            })
        })
        .collect()
}

fn decode_std_utf8(token: &str) -> Result<String, ParseError> {
    if token.is_empty() {
        return Ok(String::new());
    }
    let bytes = STANDARD.decode(token).map_err(|_| ParseError::Malformed)?;
    String::from_utf8(bytes).map_err(|_| ParseError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(s: &str) -> String {
        STANDARD.encode(s)
    }

    #[test]
    fn parses_no_arg_call_with_security_prefix() {
        let meta = b64("HelloWorldResource/helloWorld");
        let content = format!("0|{meta}|");
        let req = parse_v1(&content).unwrap();
        assert_eq!(req.class_name, "HelloWorldResource");
        assert_eq!(req.method_name, "helloWorld");
        assert!(req.raw_params.is_empty());
    }

    #[test]
    fn parses_params_block_with_null_marker() {
        let meta = b64("Echo/echo");
        let params_inner = format!("{{{{{}}}}}:::{{{{{}}}}}", b64("hi"), b64("NULL"));
        let params = b64(&params_inner);
        let content = format!("0|{meta}|{params}");
        let req = parse_v1(&content).unwrap();
        assert_eq!(
            req.raw_params,
            vec![RawElem::Text("hi".to_string()), RawElem::Null]
        );
    }

    #[test]
    fn tolerates_trailing_parens_in_meta() {
        let meta = b64("Calculator/add()");
        let content = format!("0|{meta}|");
        let req = parse_v1(&content).unwrap();
        assert_eq!(req.method_name, "add");
    }

    #[test]
    fn legacy_bare_frame_has_no_params() {
        let req = parse_v1("HelloWorldResource/helloWorld()").unwrap();
        assert_eq!(req.class_name, "HelloWorldResource");
        assert_eq!(req.method_name, "helloWorld");
        assert!(req.raw_params.is_empty());
    }
}
