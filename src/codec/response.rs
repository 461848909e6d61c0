//! Response codec (spec.md §4.6): render an invocation outcome to a reply
//! frame, and invert that on the client.
//!
//! V2 success bodies are Base64(meta-encoded) and `{{braced}}`, except for
//! `null`/`void`, which renders as the bare literal `null` (spec.md §8
//! scenario (b)) — the one asymmetry in an otherwise uniform envelope.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::{
    compression::{self, CompressionConfig},
    descriptor::MethodDescriptor,
    error::{InvokeError, MapperError, ParseError, StatusCode, TcpRestError},
    invoker::Outcome,
    mapper::MapperRegistry,
    security,
    value::Value,
};

const NULL_LITERAL: &str = "null";

/// What actually went out on the wire, reconstructed on the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Success(Value),
    Business { type_name: String, message: String },
    Server { type_name: String, message: String },
    Protocol(String),
}

/// Render `(outcome, invocation result)` into a V2 reply line (no trailers;
/// `dispatch` appends CHK/SIG).
pub fn encode_v2(
    outcome: Outcome,
    result: &Result<Value, InvokeError>,
    method: &MethodDescriptor,
    mappers: &MapperRegistry,
    compression_cfg: &CompressionConfig,
) -> Result<String, MapperError> {
    tracing::debug!(?outcome, method = method.name, "encode response");
    let (status, rendered) = match result {
        Ok(value) if value.is_null() => (StatusCode::Success, None),
        Ok(value) => {
            let tag = method.return_type.to_owned_tag();
            let mapper = mappers.resolve_for_encode(&tag, value)?;
            (StatusCode::Success, Some(mapper.encode(value)?))
        }
        Err(InvokeError::Business { type_name, message }) => {
            (StatusCode::BusinessException, Some(format!("{type_name}: {message}")))
        }
        Err(InvokeError::Server { type_name, message }) => {
            (StatusCode::ServerError, Some(format!("{type_name}: {message}")))
        }
        // Not instantiable (abstract, no default ctor, ctor throws) is a
        // protocol-level failure, not a server-side fault (spec.md §4.7).
        Err(InvokeError::NotInstantiable(class_name)) => (
            StatusCode::ProtocolError,
            Some(format!("java.lang.InstantiationException: {class_name}")),
        ),
    };

    let body_segment = match rendered {
        None => NULL_LITERAL.to_string(),
        Some(text) => format!("{{{{{}}}}}", security::meta_encode(text.as_bytes())),
    };
    let payload = format!("{}|{}", status.as_digit(), body_segment);
    Ok(format!("V2|{}", compression::encode(payload.as_bytes(), compression_cfg)))
}

/// Render a protocol-level failure (never reaches the invoker) into a V2
/// reply line.
pub fn encode_v2_protocol_error(message: &str, compression_cfg: &CompressionConfig) -> String {
    let body_segment = format!("{{{{{}}}}}", security::meta_encode(message.as_bytes()));
    let payload = format!("{}|{}", StatusCode::ProtocolError.as_digit(), body_segment);
    format!("V2|{}", compression::encode(payload.as_bytes(), compression_cfg))
}

/// Dispatch any `TcpRestError` to the matching V2 reply encoding.
pub fn encode_v2_error(error: &TcpRestError, compression_cfg: &CompressionConfig) -> String {
    match error {
        TcpRestError::Invoke(InvokeError::Business { type_name, message }) => {
            let body = format!("{{{{{}}}}}", security::meta_encode(format!("{type_name}: {message}").as_bytes()));
            let payload = format!("{}|{}", StatusCode::BusinessException.as_digit(), body);
            format!("V2|{}", compression::encode(payload.as_bytes(), compression_cfg))
        }
        other if other.status_code() == StatusCode::ProtocolError => {
            encode_v2_protocol_error(&other.to_string(), compression_cfg)
        }
        other => {
            let body = format!("{{{{{}}}}}", security::meta_encode(other.to_string().as_bytes()));
            let payload = format!("{}|{}", other.status_code().as_digit(), body);
            format!("V2|{}", compression::encode(payload.as_bytes(), compression_cfg))
        }
    }
}

/// Decode a (trailer-stripped, `V2|`-prefixed) reply line, resolving a typed
/// `Value` for SUCCESS against `return_tag` and preserving the
/// business-vs-server distinction otherwise (spec.md §4.6).
pub fn decode_v2(
    content_after_prefix: &str,
    return_tag: &crate::value::TypeTag,
    mappers: &MapperRegistry,
    compression_cfg: &CompressionConfig,
) -> Result<ResponseBody, ParseError> {
    let plaintext = compression::decode(content_after_prefix, compression_cfg)
        .map_err(ParseError::Security)?;
    let plaintext = String::from_utf8(plaintext).map_err(|_| ParseError::Malformed)?;

    let (status_digit, body_segment) = plaintext.split_once('|').ok_or(ParseError::Malformed)?;
    let status = StatusCode::from_digit(
        status_digit.chars().next().ok_or(ParseError::Malformed)?,
    )
    .ok_or(ParseError::Malformed)?;

    let text = decode_body_segment(body_segment)?;

    match status {
        StatusCode::Success => match text {
            None => Ok(ResponseBody::Success(Value::Null)),
            Some(text) => {
                let mapper = mappers.resolve_for_decode(return_tag);
                let value = mapper.decode(&text).map_err(ParseError::Mapper)?;
                Ok(ResponseBody::Success(value))
            }
        },
        StatusCode::BusinessException => {
            let (type_name, message) = split_exception_text(&text.ok_or(ParseError::Malformed)?);
            Ok(ResponseBody::Business { type_name, message })
        }
        StatusCode::ServerError => {
            let (type_name, message) = split_exception_text(&text.ok_or(ParseError::Malformed)?);
            Ok(ResponseBody::Server { type_name, message })
        }
        StatusCode::ProtocolError => {
            Ok(ResponseBody::Protocol(text.unwrap_or_default()))
        }
    }
}

fn decode_body_segment(segment: &str) -> Result<Option<String>, ParseError> {
    if segment == NULL_LITERAL {
        return Ok(None);
    }
    let inner = segment
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
        .ok_or(ParseError::Malformed)?;
    let bytes = security::meta_decode(inner).map_err(ParseError::Security)?;
    let text = String::from_utf8(bytes).map_err(|_| ParseError::Malformed)?;
    Ok(Some(text))
}

fn split_exception_text(text: &str) -> (String, String) {
    match text.split_once(": ") {
        Some((type_name, message)) => (type_name.to_string(), message.to_string()),
        None => ("java.lang.RuntimeException".to_string(), text.to_string()),
    }
}

/// V1 has no status codes: a reply is either the bare rendered value or
/// (on error) the connection is closed after logging (spec.md §4.6, §9).
/// The body is Base64(standard)-encoded and `{{braced}}`, matching V1's
/// request parameter framing.
pub fn encode_v1(rendered: &str, compression_cfg: &CompressionConfig) -> String {
    let body = format!("{{{{{}}}}}", STANDARD.encode(rendered.as_bytes()));
    compression::encode(body.as_bytes(), compression_cfg)
}

/// Invert `encode_v1`. The compression envelope must be stripped before any
/// attempt to Base64-decode the body (spec.md §9 "when porting" note) —
/// `compression::decode` does this unconditionally, so callers never see
/// the mis-ordered legacy failure mode.
pub fn decode_v1(line: &str, compression_cfg: &CompressionConfig) -> Result<String, ParseError> {
    let plaintext = compression::decode(line, compression_cfg).map_err(ParseError::Security)?;
    let plaintext = String::from_utf8(plaintext).map_err(|_| ParseError::Malformed)?;
    let inner = plaintext
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
        .ok_or(ParseError::Malformed)?;
    let bytes = STANDARD.decode(inner).map_err(|_| ParseError::Malformed)?;
    String::from_utf8(bytes).map_err(|_| ParseError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TypeTagStatic;
    use crate::value::TypeTag;

    fn add_method() -> MethodDescriptor {
        MethodDescriptor {
            name: "add",
            params: &[TypeTagStatic::Int, TypeTagStatic::Int],
            return_type: TypeTagStatic::Int,
        }
    }

    #[test]
    fn encodes_and_decodes_success_round_trip() {
        let mappers = MapperRegistry::with_defaults();
        let compression = CompressionConfig::default();
        let method = add_method();
        let line = encode_v2(
            Outcome::Succeeded,
            &Ok(Value::Int(8)),
            &method,
            &mappers,
            &compression,
        )
        .unwrap();
        assert!(line.starts_with("V2|0|0|"));
        let body = decode_v2(
            line.strip_prefix("V2|").unwrap(),
            &TypeTag::Int,
            &mappers,
            &compression,
        )
        .unwrap();
        assert_eq!(body, ResponseBody::Success(Value::Int(8)));
    }

    #[test]
    fn null_success_renders_as_bare_literal() {
        let mappers = MapperRegistry::with_defaults();
        let compression = CompressionConfig::default();
        let method = MethodDescriptor {
            name: "echo",
            params: &[TypeTagStatic::Object("java.lang.String")],
            return_type: TypeTagStatic::Object("java.lang.String"),
        };
        let line = encode_v2(Outcome::Succeeded, &Ok(Value::Null), &method, &mappers, &compression).unwrap();
        assert_eq!(line, "V2|0|0|null");
        let body = decode_v2(
            line.strip_prefix("V2|").unwrap(),
            &TypeTag::Object("java.lang.String".to_string()),
            &mappers,
            &compression,
        )
        .unwrap();
        assert_eq!(body, ResponseBody::Success(Value::Null));
    }

    #[test]
    fn business_exception_preserves_type_and_message() {
        let mappers = MapperRegistry::with_defaults();
        let compression = CompressionConfig::default();
        let method = MethodDescriptor {
            name: "validateAge",
            params: &[TypeTagStatic::Int],
            return_type: TypeTagStatic::Void,
        };
        let result = Err(InvokeError::Business {
            type_name: "ValidationException".to_string(),
            message: "Age must be non-negative".to_string(),
        });
        let line = encode_v2(Outcome::FailedBusiness, &result, &method, &mappers, &compression).unwrap();
        assert!(line.starts_with("V2|0|1|"));
        let body = decode_v2(
            line.strip_prefix("V2|").unwrap(),
            &TypeTag::Void,
            &mappers,
            &compression,
        )
        .unwrap();
        assert_eq!(
            body,
            ResponseBody::Business {
                type_name: "ValidationException".to_string(),
                message: "Age must be non-negative".to_string(),
            }
        );
    }

    #[test]
    fn not_instantiable_renders_as_protocol_error() {
        let mappers = MapperRegistry::with_defaults();
        let compression = CompressionConfig::default();
        let method = add_method();
        let result = Err(InvokeError::NotInstantiable("Calculator".to_string()));
        let line = encode_v2(Outcome::FailedServer, &result, &method, &mappers, &compression).unwrap();
        assert!(line.starts_with("V2|0|3|"));
    }

    #[test]
    fn v1_response_round_trips_through_compression_envelope() {
        let compression = CompressionConfig::default();
        let line = encode_v1("8", &compression);
        assert_eq!(decode_v1(&line, &compression).unwrap(), "8");
    }
}
