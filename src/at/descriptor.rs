//! JVM method descriptors (`(ILjava/lang/String;[J)V`).

use crate::at::errors::AtError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JvmType {
    Void,
    /// Primitive stored as its Java keyword (`int`, `boolean`, ...)
    Primitive(&'static str),
    /// Internal class name, e.g. `java/util/Map$Entry`
    Object(String),
    Array(Box<JvmType>),
}

impl JvmType {
    /// Number of array dimensions and the element type underneath.
    pub fn peel_arrays(&self) -> (usize, &JvmType) {
        let mut dims = 0;
        let mut ty = self;
        while let JvmType::Array(inner) = ty {
            dims += 1;
            ty = inner;
        }
        (dims, ty)
    }

    /// Dotted binary name for object types (`java.util.Map.Entry`).
    pub fn dotted_name(&self) -> Option<String> {
        match self {
            JvmType::Object(internal) => Some(internal.replace(['/', '$'], ".")),
            _ => None,
        }
    }

    /// Simple (unqualified, innermost) name for object types.
    pub fn simple_name(&self) -> Option<&str> {
        match self {
            JvmType::Object(internal) => internal.rsplit(['/', '$']).next(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<JvmType>,
    pub ret: JvmType,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<Self, AtError> {
        let malformed = || AtError::MalformedDescriptor {
            descriptor: descriptor.to_string(),
        };

        let body = descriptor.strip_prefix('(').ok_or_else(malformed)?;
        let (params_str, ret_str) = body.split_once(')').ok_or_else(malformed)?;

        let mut params = Vec::new();
        let mut rest = params_str;
        while !rest.is_empty() {
            let (ty, tail) = parse_type(rest).ok_or_else(malformed)?;
            if ty == JvmType::Void {
                return Err(malformed());
            }
            params.push(ty);
            rest = tail;
        }

        let (ret, tail) = parse_type(ret_str).ok_or_else(malformed)?;
        if !tail.is_empty() {
            return Err(malformed());
        }

        Ok(Self { params, ret })
    }
}

fn parse_type(input: &str) -> Option<(JvmType, &str)> {
    let first = input.chars().next()?;
    let rest = &input[first.len_utf8()..];
    let primitive = |kw| Some((JvmType::Primitive(kw), rest));
    match first {
        'V' => Some((JvmType::Void, rest)),
        'Z' => primitive("boolean"),
        'B' => primitive("byte"),
        'C' => primitive("char"),
        'S' => primitive("short"),
        'I' => primitive("int"),
        'J' => primitive("long"),
        'F' => primitive("float"),
        'D' => primitive("double"),
        'L' => {
            let end = rest.find(';')?;
            if end == 0 {
                return None;
            }
            Some((JvmType::Object(rest[..end].to_string()), &rest[end + 1..]))
        }
        '[' => {
            let (inner, tail) = parse_type(rest)?;
            if inner == JvmType::Void {
                return None;
            }
            Some((JvmType::Array(Box::new(inner)), tail))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_descriptor() {
        let desc = MethodDescriptor::parse("(ILjava/lang/String;[[J)Ljava/util/Map$Entry;").unwrap();
        assert_eq!(desc.params.len(), 3);
        assert_eq!(desc.params[0], JvmType::Primitive("int"));
        assert_eq!(desc.params[1].simple_name(), Some("String"));
        assert_eq!(desc.params[2].peel_arrays().0, 2);
        assert_eq!(desc.ret.dotted_name().as_deref(), Some("java.util.Map.Entry"));
        assert_eq!(desc.ret.simple_name(), Some("Entry"));
    }

    #[test]
    fn void_no_args() {
        let desc = MethodDescriptor::parse("()V").unwrap();
        assert!(desc.params.is_empty());
        assert_eq!(desc.ret, JvmType::Void);
    }

    #[test]
    fn rejects_garbage() {
        assert!(MethodDescriptor::parse("V").is_err());
        assert!(MethodDescriptor::parse("(V)V").is_err());
        assert!(MethodDescriptor::parse("(Ljava/lang/String)V").is_err());
        assert!(MethodDescriptor::parse("()VV").is_err());
    }

    #[test]
    fn non_ascii_input() {
        assert!(MethodDescriptor::parse("(é)V").is_err());
        assert!(MethodDescriptor::parse("()é").is_err());
        assert!(MethodDescriptor::parse("([é)V").is_err());

        let desc = MethodDescriptor::parse("(Lnet/café/Größe;)V").unwrap();
        assert_eq!(desc.params[0].simple_name(), Some("Größe"));
    }
}
