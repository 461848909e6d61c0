//! V2 frame parsing (spec.md §4.5, §6).
//!
//! Content after the `V2|` prefix is `COMPRESSION | {{meta-base64}} |
//! [param1,param2,...]`. The `COMPRESSION` field is the compression
//! envelope's own flag (spec.md §4.4): everything following it is the
//! envelope's payload, so `compression::decode` both strips the flag and
//! (if needed) inflates the rest before this module ever splits on `|`
//! again. See DESIGN.md for why the frame is structured this way.

use nom::{bytes::complete::{tag, take_until}, sequence::delimited, IResult};

use crate::{
    compression,
    error::ParseError,
    parse::{split_class_method, RawElem},
    security,
};

pub struct RawV2Request {
    pub class_name: String,
    pub method_name: String,
    pub descriptor: String,
    pub raw_array: RawArray,
}

/// `[]` is ambiguous between "zero elements" and "one empty element"; the
/// caller disambiguates once the method's arity is known (spec.md §9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawArray {
    Ambiguous,
    Elements(Vec<RawElem>),
}

impl RawArray {
    pub fn resolve(self, arity: usize) -> Result<Vec<RawElem>, ParseError> {
        match self {
            RawArray::Ambiguous => match arity {
                0 => Ok(vec![]),
                1 => Ok(vec![RawElem::Text(String::new())]),
                found => Err(ParseError::ArityMismatch { expected: arity, found }),
            },
            RawArray::Elements(elems) => {
                if elems.len() != arity {
                    Err(ParseError::ArityMismatch {
                        expected: arity,
                        found: elems.len(),
                    })
                } else {
                    Ok(elems)
                }
            }
        }
    }
}

pub fn parse_v2(
    content_after_prefix: &str,
    compression_config: &compression::CompressionConfig,
) -> Result<RawV2Request, ParseError> {
    let plaintext = compression::decode(content_after_prefix, compression_config)
        .map_err(ParseError::Security)?;
    let plaintext = String::from_utf8(plaintext).map_err(|_| ParseError::Malformed)?;

    let (meta_braced, array_part) = plaintext.split_once('|').ok_or(ParseError::Malformed)?;
    let meta_b64 = meta_braced
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
        .ok_or(ParseError::Malformed)?;
    let meta_bytes = security::meta_decode(meta_b64).map_err(ParseError::Security)?;
    let meta = String::from_utf8(meta_bytes).map_err(|_| ParseError::Malformed)?;

    let (class_and_method, descriptor) = split_meta_descriptor(&meta)?;
    let (class_name, method_name) =
        split_class_method(class_and_method).ok_or(ParseError::Malformed)?;

    let raw_array = parse_array(array_part)?;

    Ok(RawV2Request {
        class_name: class_name.to_string(),
        method_name: method_name.to_string(),
        descriptor,
        raw_array,
    })
}

fn split_meta_descriptor(meta: &str) -> Result<(&str, String), ParseError> {
    match meta.find('(') {
        Some(idx) if meta.ends_with(')') => Ok((&meta[..idx], meta[idx..].to_string())),
        _ => Err(ParseError::Malformed),
    }
}

fn parse_array(input: &str) -> Result<RawArray, ParseError> {
    let inner = bracketed(input).map_err(|_: nom::Err<nom::error::Error<&str>>| ParseError::Malformed)?;
    if inner.is_empty() {
        return Ok(RawArray::Ambiguous);
    }
    let elems = inner
        .split(',')
        .map(|raw| decode_elem(raw))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RawArray::Elements(elems))
}

fn bracketed(input: &str) -> IResult<&str, &str> {
    let (rest, inner) = delimited(tag("["), take_until("]"), tag("]"))(input)?;
    Ok((rest, inner))
}

fn decode_elem(raw: &str) -> Result<RawElem, ParseError> {
    match raw {
        "~" => Ok(RawElem::Null),
        "" => Ok(RawElem::Text(String::new())),
        token => {
            let bytes = security::meta_decode(token).map_err(ParseError::Security)?;
            let text = String::from_utf8(bytes).map_err(|_| ParseError::Malformed)?;
            Ok(RawElem::Text(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::meta_encode;

    fn frame_body(meta: &str, array: &str) -> String {
        let meta_b64 = meta_encode(meta.as_bytes());
        format!("0|{{{{{meta_b64}}}}}|{array}")
    }

    #[test]
    fn parses_add_call_with_two_int_params() {
        let content = frame_body("Calculator/add(II)", "[NQ==,Mw==]");
        let parsed = parse_v2(&content, &compression::CompressionConfig::default()).unwrap();
        assert_eq!(parsed.class_name, "Calculator");
        assert_eq!(parsed.method_name, "add");
        assert_eq!(parsed.descriptor, "(II)");
        let resolved = parsed.raw_array.resolve(2).unwrap();
        assert_eq!(
            resolved,
            vec![
                RawElem::Text("5".to_string()),
                RawElem::Text("3".to_string())
            ]
        );
    }

    #[test]
    fn parses_null_element() {
        let content = frame_body("Echo/echo(Ljava/lang/String;)", "[~]");
        let parsed = parse_v2(&content, &compression::CompressionConfig::default()).unwrap();
        let resolved = parsed.raw_array.resolve(1).unwrap();
        assert_eq!(resolved, vec![RawElem::Null]);
    }

    #[test]
    fn empty_brackets_resolve_by_arity() {
        let content = frame_body("Noop/run()", "[]");
        let parsed = parse_v2(&content, &compression::CompressionConfig::default()).unwrap();
        assert_eq!(parsed.raw_array, RawArray::Ambiguous);
        assert_eq!(parsed.raw_array.clone().resolve(0).unwrap(), vec![]);
    }

    #[test]
    fn arity_mismatch_is_a_protocol_error() {
        let content = frame_body("Calculator/add(II)", "[NQ==]");
        let parsed = parse_v2(&content, &compression::CompressionConfig::default()).unwrap();
        assert!(matches!(
            parsed.raw_array.resolve(2),
            Err(ParseError::ArityMismatch { expected: 2, found: 1 })
        ));
    }
}
