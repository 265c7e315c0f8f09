//! Extended type encodings
//!
//! Method and closure signatures are described with compact encoding
//! strings: `d@:dd` is a method returning a double that takes two doubles
//! (after the implicit receiver `@` and selector `:`), `v@?@` is a closure
//! returning nothing that takes one object. Stack offsets (`v24@0:8`) and
//! the `r n N o O R` qualifiers are accepted and ignored.
//!
//! Besides the usual codes the bridge understands `V`, a raw script value
//! passed through unconverted.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::error::DeclarationError;

/// A single encoded type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeEncoding {
    /// `v`
    Void,
    /// `B`
    Bool,
    /// `c`
    Char,
    /// `C`
    UChar,
    /// `s`
    Short,
    /// `S`
    UShort,
    /// `i`
    Int,
    /// `I`
    UInt,
    /// `l`
    Long,
    /// `L`
    ULong,
    /// `q`
    LongLong,
    /// `Q`
    ULongLong,
    /// `f`
    Float,
    /// `d`
    Double,
    /// `*`
    CString,
    /// `@` or `@"ClassName"`
    Object(Option<String>),
    /// `@?`
    Closure,
    /// `#`
    Class,
    /// `:`
    Selector,
    /// `V`, a raw script value
    ScriptValue,
    /// `^type`
    Pointer(Box<TypeEncoding>),
    /// `{name=...}` or `(name=...)`
    Struct(String),
    /// `[len type]`
    CArray(String),
    /// `?`
    Unknown,
}

impl TypeEncoding {
    /// Parse exactly one type
    pub fn parse(encoding: &str) -> Result<TypeEncoding, DeclarationError> {
        let mut list = Self::parse_list(encoding)?;
        if list.len() != 1 {
            return Err(invalid(
                encoding,
                format!("expected one type, found {}", list.len()),
            ));
        }
        Ok(list.remove(0))
    }

    /// Parse a sequence of types
    pub fn parse_list(encoding: &str) -> Result<Vec<TypeEncoding>, DeclarationError> {
        let mut parser = Parser {
            source: encoding,
            chars: encoding.chars().peekable(),
        };
        let mut out = Vec::new();
        loop {
            parser.skip_noise();
            if parser.chars.peek().is_none() {
                break;
            }
            out.push(parser.parse_one()?);
        }
        Ok(out)
    }

    /// Whether the bridge can convert values of this type
    pub fn is_marshalable(&self) -> bool {
        !matches!(
            self,
            TypeEncoding::Pointer(_)
                | TypeEncoding::Struct(_)
                | TypeEncoding::CArray(_)
                | TypeEncoding::Unknown
        )
    }

    /// Whether this is one of the integer codes
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            TypeEncoding::Char
                | TypeEncoding::UChar
                | TypeEncoding::Short
                | TypeEncoding::UShort
                | TypeEncoding::Int
                | TypeEncoding::UInt
                | TypeEncoding::Long
                | TypeEncoding::ULong
                | TypeEncoding::LongLong
                | TypeEncoding::ULongLong
        )
    }

    /// Whether this is an integer or floating point code
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, TypeEncoding::Float | TypeEncoding::Double)
    }

    /// Whether the integer code is unsigned
    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            TypeEncoding::UChar
                | TypeEncoding::UShort
                | TypeEncoding::UInt
                | TypeEncoding::ULong
                | TypeEncoding::ULongLong
        )
    }
}

impl fmt::Display for TypeEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeEncoding::Void => f.write_str("v"),
            TypeEncoding::Bool => f.write_str("B"),
            TypeEncoding::Char => f.write_str("c"),
            TypeEncoding::UChar => f.write_str("C"),
            TypeEncoding::Short => f.write_str("s"),
            TypeEncoding::UShort => f.write_str("S"),
            TypeEncoding::Int => f.write_str("i"),
            TypeEncoding::UInt => f.write_str("I"),
            TypeEncoding::Long => f.write_str("l"),
            TypeEncoding::ULong => f.write_str("L"),
            TypeEncoding::LongLong => f.write_str("q"),
            TypeEncoding::ULongLong => f.write_str("Q"),
            TypeEncoding::Float => f.write_str("f"),
            TypeEncoding::Double => f.write_str("d"),
            TypeEncoding::CString => f.write_str("*"),
            TypeEncoding::Object(None) => f.write_str("@"),
            TypeEncoding::Object(Some(name)) => write!(f, "@\"{}\"", name),
            TypeEncoding::Closure => f.write_str("@?"),
            TypeEncoding::Class => f.write_str("#"),
            TypeEncoding::Selector => f.write_str(":"),
            TypeEncoding::ScriptValue => f.write_str("V"),
            TypeEncoding::Pointer(inner) => write!(f, "^{}", inner),
            TypeEncoding::Struct(name) => write!(f, "{{{}}}", name),
            TypeEncoding::CArray(body) => write!(f, "[{}]", body),
            TypeEncoding::Unknown => f.write_str("?"),
        }
    }
}

fn invalid(encoding: &str, reason: impl Into<String>) -> DeclarationError {
    DeclarationError::InvalidEncoding {
        encoding: encoding.to_string(),
        reason: reason.into(),
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: Peekable<Chars<'a>>,
}

impl<'a> Parser<'a> {
    /// Skip stack offsets and qualifiers
    fn skip_noise(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || matches!(c, 'r' | 'n' | 'N' | 'o' | 'O' | 'R') {
                self.chars.next();
            } else {
                break;
            }
        }
    }

    fn parse_one(&mut self) -> Result<TypeEncoding, DeclarationError> {
        let c = match self.chars.next() {
            Some(c) => c,
            None => return Err(invalid(self.source, "unexpected end of encoding")),
        };
        let ty = match c {
            'v' => TypeEncoding::Void,
            'B' => TypeEncoding::Bool,
            'c' => TypeEncoding::Char,
            'C' => TypeEncoding::UChar,
            's' => TypeEncoding::Short,
            'S' => TypeEncoding::UShort,
            'i' => TypeEncoding::Int,
            'I' => TypeEncoding::UInt,
            'l' => TypeEncoding::Long,
            'L' => TypeEncoding::ULong,
            'q' => TypeEncoding::LongLong,
            'Q' => TypeEncoding::ULongLong,
            'f' => TypeEncoding::Float,
            'd' => TypeEncoding::Double,
            '*' => TypeEncoding::CString,
            '#' => TypeEncoding::Class,
            ':' => TypeEncoding::Selector,
            'V' => TypeEncoding::ScriptValue,
            '?' => TypeEncoding::Unknown,
            '@' => self.parse_object()?,
            '^' => {
                self.skip_noise();
                if self.chars.peek().is_none() {
                    TypeEncoding::Pointer(Box::new(TypeEncoding::Unknown))
                } else {
                    TypeEncoding::Pointer(Box::new(self.parse_one()?))
                }
            }
            '{' => TypeEncoding::Struct(self.parse_aggregate('{', '}')?),
            '(' => TypeEncoding::Struct(self.parse_aggregate('(', ')')?),
            '[' => TypeEncoding::CArray(self.read_balanced('[', ']')?),
            other => {
                return Err(invalid(
                    self.source,
                    format!("unknown type code '{}'", other),
                ))
            }
        };
        Ok(ty)
    }

    fn parse_object(&mut self) -> Result<TypeEncoding, DeclarationError> {
        match self.chars.peek() {
            Some('?') => {
                self.chars.next();
                // Extended closure encodings carry their signature in <...>
                if self.chars.peek() == Some(&'<') {
                    self.chars.next();
                    self.read_balanced('<', '>')?;
                }
                Ok(TypeEncoding::Closure)
            }
            Some('"') => {
                self.chars.next();
                let mut name = String::new();
                loop {
                    match self.chars.next() {
                        Some('"') => break,
                        Some(c) => name.push(c),
                        None => return Err(invalid(self.source, "unterminated class name")),
                    }
                }
                if name.is_empty() || name.starts_with('<') {
                    Ok(TypeEncoding::Object(None))
                } else {
                    Ok(TypeEncoding::Object(Some(name)))
                }
            }
            _ => Ok(TypeEncoding::Object(None)),
        }
    }

    /// Read an aggregate and return its tag name
    fn parse_aggregate(&mut self, open: char, close: char) -> Result<String, DeclarationError> {
        let body = self.read_balanced(open, close)?;
        let name = body.split('=').next().unwrap_or("").to_string();
        Ok(name)
    }

    /// Read up to the matching close delimiter, the opener already consumed
    fn read_balanced(&mut self, open: char, close: char) -> Result<String, DeclarationError> {
        let mut depth = 1usize;
        let mut body = String::new();
        for c in self.chars.by_ref() {
            if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
                if depth == 0 {
                    return Ok(body);
                }
            }
            body.push(c);
        }
        Err(invalid(self.source, format!("missing '{}'", close)))
    }
}

// ============================================================================
// Signatures
// ============================================================================

/// Return and argument types of a method or closure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    /// Return type
    pub ret: TypeEncoding,
    /// Argument types, without receiver or selector
    pub args: Vec<TypeEncoding>,
}

impl MethodSignature {
    /// Create a signature from parts
    pub fn new(ret: TypeEncoding, args: Vec<TypeEncoding>) -> Self {
        Self { ret, args }
    }

    /// Parse a method encoding: return type, receiver, selector, arguments
    pub fn parse_method(encoding: &str) -> Result<Self, DeclarationError> {
        let mut list = TypeEncoding::parse_list(encoding)?;
        if list.len() < 3 {
            return Err(invalid(encoding, "method encodings need a receiver and a selector"));
        }
        if !matches!(list[1], TypeEncoding::Object(_) | TypeEncoding::Class) {
            return Err(invalid(encoding, "second type must be the receiver"));
        }
        if list[2] != TypeEncoding::Selector {
            return Err(invalid(encoding, "third type must be the selector"));
        }
        let args = list.split_off(3);
        Ok(Self {
            ret: list.swap_remove(0),
            args,
        })
    }

    /// Parse a closure encoding: return type, optional `@?` self, arguments
    pub fn parse_closure(encoding: &str) -> Result<Self, DeclarationError> {
        let mut list = TypeEncoding::parse_list(encoding)?;
        if list.is_empty() {
            return Err(invalid(encoding, "missing return type"));
        }
        let ret = list.remove(0);
        if list.first() == Some(&TypeEncoding::Closure) {
            list.remove(0);
        }
        Ok(Self { ret, args: list })
    }

    /// Number of arguments
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Whether every argument and the return type can be converted
    pub fn is_marshalable(&self) -> bool {
        self.ret.is_marshalable() && self.args.iter().all(TypeEncoding::is_marshalable)
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ret)?;
        for arg in &self.args {
            write!(f, "{}", arg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_primitives() {
        let list = TypeEncoding::parse_list("vBidQ*").unwrap();
        assert_eq!(
            list,
            vec![
                TypeEncoding::Void,
                TypeEncoding::Bool,
                TypeEncoding::Int,
                TypeEncoding::Double,
                TypeEncoding::ULongLong,
                TypeEncoding::CString,
            ]
        );
    }

    #[test]
    fn test_parse_objects_and_closures() {
        assert_eq!(
            TypeEncoding::parse("@\"Counter\"").unwrap(),
            TypeEncoding::Object(Some("Counter".into()))
        );
        assert_eq!(TypeEncoding::parse("@").unwrap(), TypeEncoding::Object(None));
        assert_eq!(TypeEncoding::parse("@?").unwrap(), TypeEncoding::Closure);
        assert_eq!(TypeEncoding::parse("@?<v@?i>").unwrap(), TypeEncoding::Closure);
        assert_eq!(TypeEncoding::parse("V").unwrap(), TypeEncoding::ScriptValue);
    }

    #[test]
    fn test_parse_aggregates() {
        assert_eq!(
            TypeEncoding::parse("{CGPoint=dd}").unwrap(),
            TypeEncoding::Struct("CGPoint".into())
        );
        assert_eq!(
            TypeEncoding::parse("^{Node={Inner=i}}").unwrap(),
            TypeEncoding::Pointer(Box::new(TypeEncoding::Struct("Node".into())))
        );
        assert_eq!(
            TypeEncoding::parse("[4i]").unwrap(),
            TypeEncoding::CArray("4i".into())
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(TypeEncoding::parse("z").is_err());
        assert!(TypeEncoding::parse("{Open=i").is_err());
        assert!(TypeEncoding::parse("id").is_err());
    }

    #[test]
    fn test_marshalable() {
        assert!(TypeEncoding::Double.is_marshalable());
        assert!(TypeEncoding::Closure.is_marshalable());
        assert!(TypeEncoding::ScriptValue.is_marshalable());
        assert!(!TypeEncoding::Struct("CGRect".into()).is_marshalable());
        assert!(!TypeEncoding::Pointer(Box::new(TypeEncoding::Int)).is_marshalable());
    }

    #[test]
    fn test_method_signature_with_offsets() {
        let sig = MethodSignature::parse_method("d32@0:8d16d24").unwrap();
        assert_eq!(sig.ret, TypeEncoding::Double);
        assert_eq!(sig.args, vec![TypeEncoding::Double, TypeEncoding::Double]);
        assert_eq!(sig.arity(), 2);
        assert_eq!(sig.to_string(), "ddd");
    }

    #[test]
    fn test_method_signature_requires_receiver() {
        assert!(MethodSignature::parse_method("dd").is_err());
        assert!(MethodSignature::parse_method("v@i").is_err());
    }

    #[test]
    fn test_closure_signature() {
        let sig = MethodSignature::parse_closure("i@?ii").unwrap();
        assert_eq!(sig.args, vec![TypeEncoding::Int, TypeEncoding::Int]);
        let sig = MethodSignature::parse_closure("v@").unwrap();
        assert_eq!(sig.args, vec![TypeEncoding::Object(None)]);
        assert!(sig.is_marshalable());
        let sig = MethodSignature::parse_closure("v^v").unwrap();
        assert!(!sig.is_marshalable());
    }
}
