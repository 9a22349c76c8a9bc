//! D-Bus type signatures.
//!
//! A [`Signature`] is a sequence of complete types, e.g. `a{sv}s` is a
//! dictionary of string to variant followed by a string. Method arguments,
//! replies and signal payloads are described by a `Signature`; a property type
//! and a variant tag are each a single [`Type`].

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum length of a signature string on the wire.
pub const MAX_SIGNATURE_LEN: usize = 255;

/// Maximum nesting depth of arrays, and separately of structs.
pub const MAX_NESTING_DEPTH: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature '{0}' is longer than 255 bytes")]
    TooLong(String),

    #[error("unknown type code '{code}' at offset {offset}")]
    UnknownTypeCode { code: char, offset: usize },

    #[error("unexpected end of signature after offset {0}")]
    UnexpectedEnd(usize),

    #[error("unexpected '{found}' at offset {offset}")]
    Unexpected { found: char, offset: usize },

    #[error("empty struct at offset {0}")]
    EmptyStruct(usize),

    #[error("dict entry outside of an array at offset {0}")]
    DictEntryOutsideArray(usize),

    #[error("dict key at offset {0} is not a basic type")]
    NonBasicDictKey(usize),

    #[error("containers nested deeper than 32 levels")]
    TooDeep,

    #[error("expected a single complete type, found '{0}'")]
    NotSingleType(String),
}

/// A single complete D-Bus type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Byte,
    Boolean,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Double,
    String,
    ObjectPath,
    Signature,
    UnixFd,
    Variant,
    Array(Box<Type>),
    Dict(Box<Type>, Box<Type>),
    Struct(Vec<Type>),
}

impl Type {
    /// Parse exactly one complete type.
    pub fn parse(s: &str) -> Result<Type, SignatureError> {
        let mut signature = Signature::parse(s)?;
        if signature.types.len() != 1 {
            return Err(SignatureError::NotSingleType(s.to_string()));
        }
        Ok(signature.types.remove(0))
    }

    /// Basic types are the only types allowed as dict keys.
    pub fn is_basic(&self) -> bool {
        !matches!(
            self,
            Type::Variant | Type::Array(_) | Type::Dict(..) | Type::Struct(_)
        )
    }

    pub fn array_of(element: Type) -> Type {
        Type::Array(Box::new(element))
    }

    pub fn dict_of(key: Type, value: Type) -> Type {
        Type::Dict(Box::new(key), Box::new(value))
    }

    fn code(&self) -> Option<char> {
        Some(match self {
            Type::Byte => 'y',
            Type::Boolean => 'b',
            Type::Int16 => 'n',
            Type::UInt16 => 'q',
            Type::Int32 => 'i',
            Type::UInt32 => 'u',
            Type::Int64 => 'x',
            Type::UInt64 => 't',
            Type::Double => 'd',
            Type::String => 's',
            Type::ObjectPath => 'o',
            Type::Signature => 'g',
            Type::UnixFd => 'h',
            Type::Variant => 'v',
            _ => return None,
        })
    }

    fn from_code(code: u8) -> Option<Type> {
        Some(match code {
            b'y' => Type::Byte,
            b'b' => Type::Boolean,
            b'n' => Type::Int16,
            b'q' => Type::UInt16,
            b'i' => Type::Int32,
            b'u' => Type::UInt32,
            b'x' => Type::Int64,
            b't' => Type::UInt64,
            b'd' => Type::Double,
            b's' => Type::String,
            b'o' => Type::ObjectPath,
            b'g' => Type::Signature,
            b'h' => Type::UnixFd,
            b'v' => Type::Variant,
            _ => return None,
        })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code() {
            return write!(f, "{}", code);
        }
        match self {
            Type::Array(element) => write!(f, "a{}", element),
            Type::Dict(key, value) => write!(f, "a{{{}{}}}", key, value),
            Type::Struct(fields) => {
                f.write_str("(")?;
                for field in fields {
                    write!(f, "{}", field)?;
                }
                f.write_str(")")
            }
            _ => Ok(()),
        }
    }
}

impl FromStr for Type {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Type::parse(s)
    }
}

/// An ordered sequence of complete types. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    types: Vec<Type>,
}

impl Signature {
    /// The empty signature (no arguments / no reply).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn parse(s: &str) -> Result<Signature, SignatureError> {
        if s.len() > MAX_SIGNATURE_LEN {
            return Err(SignatureError::TooLong(s.to_string()));
        }
        let mut parser = Parser {
            bytes: s.as_bytes(),
            pos: 0,
            array_depth: 0,
            struct_depth: 0,
        };
        let mut types = Vec::new();
        while parser.pos < parser.bytes.len() {
            types.push(parser.complete_type()?);
        }
        Ok(Signature { types })
    }

    pub fn types(&self) -> &[Type] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// The single type of a one-type signature.
    pub fn single(&self) -> Option<&Type> {
        match self.types.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

impl From<Vec<Type>> for Signature {
    fn from(types: Vec<Type>) -> Self {
        Signature { types }
    }
}

impl From<Type> for Signature {
    fn from(ty: Type) -> Self {
        Signature { types: vec![ty] }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ty in &self.types {
            write!(f, "{}", ty)?;
        }
        Ok(())
    }
}

impl FromStr for Signature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Signature::parse(s)
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
    array_depth: usize,
    struct_depth: usize,
}

impl Parser<'_> {
    fn next(&mut self) -> Result<u8, SignatureError> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or(SignatureError::UnexpectedEnd(self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn complete_type(&mut self) -> Result<Type, SignatureError> {
        let offset = self.pos;
        let code = self.next()?;
        if let Some(basic) = Type::from_code(code) {
            return Ok(basic);
        }
        match code {
            b'a' => {
                self.array_depth += 1;
                if self.array_depth > MAX_NESTING_DEPTH {
                    return Err(SignatureError::TooDeep);
                }
                let ty = if self.peek() == Some(b'{') {
                    self.pos += 1;
                    self.dict_entry()?
                } else {
                    Type::Array(Box::new(self.complete_type()?))
                };
                self.array_depth -= 1;
                Ok(ty)
            }
            b'(' => {
                self.struct_depth += 1;
                if self.struct_depth > MAX_NESTING_DEPTH {
                    return Err(SignatureError::TooDeep);
                }
                let mut fields = Vec::new();
                loop {
                    match self.peek() {
                        None => return Err(SignatureError::UnexpectedEnd(self.pos)),
                        Some(b')') => {
                            self.pos += 1;
                            break;
                        }
                        Some(_) => fields.push(self.complete_type()?),
                    }
                }
                if fields.is_empty() {
                    return Err(SignatureError::EmptyStruct(offset));
                }
                self.struct_depth -= 1;
                Ok(Type::Struct(fields))
            }
            b'{' => Err(SignatureError::DictEntryOutsideArray(offset)),
            b')' | b'}' => Err(SignatureError::Unexpected {
                found: code as char,
                offset,
            }),
            other => Err(SignatureError::UnknownTypeCode {
                code: other as char,
                offset,
            }),
        }
    }

    // Called with the opening '{' already consumed.
    fn dict_entry(&mut self) -> Result<Type, SignatureError> {
        let key_offset = self.pos;
        let key = self.complete_type()?;
        if !key.is_basic() {
            return Err(SignatureError::NonBasicDictKey(key_offset));
        }
        let value = self.complete_type()?;
        let offset = self.pos;
        match self.next()? {
            b'}' => Ok(Type::Dict(Box::new(key), Box::new(value))),
            other => Err(SignatureError::Unexpected {
                found: other as char,
                offset,
            }),
        }
    }
}
