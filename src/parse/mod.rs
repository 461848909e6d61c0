//! Request parser (spec.md §4.5): turns a (trailer-stripped) frame into a
//! `(class, method, raw arguments)` triple for each protocol version. Typed
//! argument decoding (mapper resolution against the resolved method's
//! declared parameter types) happens one layer up, in `dispatch`, once the
//! target method is known — the parser only produces text/Base64-token-level
//! data (spec.md §3: "parameter vector" is a post-mapping concept).

pub mod v1;
pub mod v2;

/// One decoded-from-the-wire but not-yet-mapped argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawElem {
    /// The null marker (`NULL` in V1 text, `~` in V2 arrays).
    Null,
    /// Already Base64-decoded UTF-8 text, ready for a type-specific mapper.
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V1,
    V2,
}

/// Peek the version token without consuming input (spec.md §4.9): `V2|`
/// selects V2; anything else — including a bare legacy frame with no
/// prefix at all — is V1.
pub fn peek_version(line: &str) -> ProtocolVersion {
    if line.starts_with("V2|") {
        ProtocolVersion::V2
    } else {
        ProtocolVersion::V1
    }
}

/// Split `"<class.name>/<methodName>"`, tolerating a trailing `()` (spec.md
/// §4.5: "with an optional `()` the parser tolerates").
pub(crate) fn split_class_method(meta: &str) -> Option<(&str, &str)> {
    let meta = meta.strip_suffix("()").unwrap_or(meta);
    meta.rsplit_once('/')
}
