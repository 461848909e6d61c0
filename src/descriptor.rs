//! Type-signature codec (spec.md §4.2).
//!
//! Maps between `TypeTag` lists and JVM-style descriptor strings, and
//! resolves a method by name (+, for V2, full descriptor) against a
//! precomputed `MethodDescriptor` table — the Rust stand-in for "scan
//! declared methods, then inherited/public methods" (spec.md §9).

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::char,
    combinator::{map, value},
    multi::many0,
    sequence::{delimited, preceded},
    IResult,
};

use crate::{error::ParseError, value::TypeTag};

/// A resolved method: name, full descriptor, parameter types and return type.
/// Built once per `Resource` impl and returned by `Resource::methods()`.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    pub name: &'static str,
    pub params: &'static [TypeTagStatic],
    pub return_type: TypeTagStatic,
}

/// `TypeTag` without the heap-allocated `Object`/`Array` variants, so method
/// tables can be `const`/`static` data owned by the `Resource` impl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTagStatic {
    Int,
    Long,
    Double,
    Float,
    Byte,
    Char,
    Short,
    Bool,
    Void,
    Object(&'static str),
}

impl TypeTagStatic {
    pub fn to_owned_tag(self) -> TypeTag {
        match self {
            TypeTagStatic::Int => TypeTag::Int,
            TypeTagStatic::Long => TypeTag::Long,
            TypeTagStatic::Double => TypeTag::Double,
            TypeTagStatic::Float => TypeTag::Float,
            TypeTagStatic::Byte => TypeTag::Byte,
            TypeTagStatic::Char => TypeTag::Char,
            TypeTagStatic::Short => TypeTag::Short,
            TypeTagStatic::Bool => TypeTag::Bool,
            TypeTagStatic::Void => TypeTag::Void,
            TypeTagStatic::Object(name) => TypeTag::Object(name.to_string()),
        }
    }
}

impl MethodDescriptor {
    /// The full `(...)` wire descriptor for this method's parameters.
    pub fn descriptor(&self) -> String {
        encode_descriptor(&self.params.iter().map(|t| t.to_owned_tag()).collect::<Vec<_>>())
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Encode a parameter-type list into `(T1T2...)` form.
pub fn encode_descriptor(params: &[TypeTag]) -> String {
    let mut out = String::from("(");
    for p in params {
        encode_type_into(p, &mut out);
    }
    out.push(')');
    out
}

fn encode_type_into(tag: &TypeTag, out: &mut String) {
    match tag {
        TypeTag::Int => out.push('I'),
        TypeTag::Long => out.push('J'),
        TypeTag::Double => out.push('D'),
        TypeTag::Float => out.push('F'),
        TypeTag::Byte => out.push('B'),
        TypeTag::Char => out.push('C'),
        TypeTag::Short => out.push('S'),
        TypeTag::Bool => out.push('Z'),
        TypeTag::Void => out.push('V'),
        TypeTag::Object(name) => {
            out.push('L');
            out.push_str(&name.replace('.', "/"));
            out.push(';');
        }
        TypeTag::Array(inner) => {
            out.push('[');
            encode_type_into(inner, out);
        }
    }
}

/// Parse a `(T1T2...)` parameter descriptor into a `TypeTag` list.
pub fn parse_descriptor(input: &str) -> Result<Vec<TypeTag>, ParseError> {
    let (rest, types) =
        delimited(char('('), many0(parse_type), char(')'))(input).map_err(|_: nom::Err<nom::error::Error<&str>>| ParseError::Malformed)?;
    if !rest.is_empty() {
        return Err(ParseError::Malformed);
    }
    Ok(types)
}

fn parse_type(input: &str) -> IResult<&str, TypeTag> {
    alt((
        value(TypeTag::Int, char('I')),
        value(TypeTag::Long, char('J')),
        value(TypeTag::Double, char('D')),
        value(TypeTag::Float, char('F')),
        value(TypeTag::Byte, char('B')),
        value(TypeTag::Char, char('C')),
        value(TypeTag::Short, char('S')),
        value(TypeTag::Bool, char('Z')),
        value(TypeTag::Void, char('V')),
        parse_object,
        parse_array,
    ))(input)
}

fn parse_object(input: &str) -> IResult<&str, TypeTag> {
    map(
        delimited(char('L'), take_while1(|c| c != ';'), char(';')),
        |slashed: &str| TypeTag::Object(slashed.replace('/', ".")),
    )(input)
}

fn parse_array(input: &str) -> IResult<&str, TypeTag> {
    map(preceded(tag("["), parse_type), |inner| {
        TypeTag::Array(Box::new(inner))
    })(input)
}

/// Resolve a method by name and (for V2) descriptor. V1 has no overload
/// support: it is deliberately restricted to name-only lookup, returning
/// the first declaration-order match (spec.md §9's documented latent bug —
/// retained on purpose, see DESIGN.md).
pub fn find_method<'a>(
    methods: &'a [MethodDescriptor],
    name: &str,
    descriptor: Option<&str>,
) -> Result<&'a MethodDescriptor, ParseError> {
    match descriptor {
        Some(descriptor) => methods
            .iter()
            .find(|m| m.name == name && m.descriptor() == descriptor)
            .ok_or_else(|| ParseError::NoSuchMethod(format!("{name}{descriptor}"))),
        None => methods
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| ParseError::NoSuchMethod(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_primitive_descriptor() {
        let params = vec![TypeTag::Int, TypeTag::Int];
        let descriptor = encode_descriptor(&params);
        assert_eq!(descriptor, "(II)");
        assert_eq!(parse_descriptor(&descriptor).unwrap(), params);
    }

    #[test]
    fn round_trips_object_and_array_descriptor() {
        let params = vec![
            TypeTag::Object("java.lang.String".to_string()),
            TypeTag::Array(Box::new(TypeTag::Int)),
        ];
        let descriptor = encode_descriptor(&params);
        assert_eq!(descriptor, "(Ljava/lang/String;[I)");
        assert_eq!(parse_descriptor(&descriptor).unwrap(), params);
    }

    #[test]
    fn overload_resolution_picks_matching_descriptor() {
        const METHODS: &[MethodDescriptor] = &[
            MethodDescriptor {
                name: "add",
                params: &[TypeTagStatic::Int, TypeTagStatic::Int],
                return_type: TypeTagStatic::Int,
            },
            MethodDescriptor {
                name: "add",
                params: &[TypeTagStatic::Double, TypeTagStatic::Double],
                return_type: TypeTagStatic::Double,
            },
        ];
        let found = find_method(METHODS, "add", Some("(II)")).unwrap();
        assert_eq!(found.params, &[TypeTagStatic::Int, TypeTagStatic::Int]);
        let found = find_method(METHODS, "add", Some("(DD)")).unwrap();
        assert_eq!(found.params, &[TypeTagStatic::Double, TypeTagStatic::Double]);
    }

    #[test]
    fn v1_lookup_returns_first_match_by_name() {
        const METHODS: &[MethodDescriptor] = &[
            MethodDescriptor {
                name: "add",
                params: &[TypeTagStatic::Int, TypeTagStatic::Int],
                return_type: TypeTagStatic::Int,
            },
            MethodDescriptor {
                name: "add",
                params: &[TypeTagStatic::Double, TypeTagStatic::Double],
                return_type: TypeTagStatic::Double,
            },
        ];
        let found = find_method(METHODS, "add", None).unwrap();
        assert_eq!(found.params, &[TypeTagStatic::Int, TypeTagStatic::Int]);
    }
}
