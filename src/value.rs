//! Dynamically typed D-Bus values.
//!
//! Every [`Value`] knows its own [`Type`], including empty containers, so a
//! value can be checked against a declared signature before anything is put
//! on the wire.

use crate::signature::{SignatureError, Type};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("expected a value of type '{expected}', found '{found}'")]
    TypeMismatch { expected: String, found: String },

    #[error("invalid type tag: {0}")]
    InvalidTag(#[from] SignatureError),

    #[error("dict key type '{0}' is not a basic type")]
    NonBasicKey(String),

    #[error("expected {expected} values, found {found}")]
    Arity { expected: usize, found: usize },

    #[error("values of type '{0}' are not supported")]
    Unsupported(String),
}

impl ValueError {
    pub(crate) fn mismatch(expected: &Type, found: &Type) -> Self {
        ValueError::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

/// A remote object path.
///
/// Paths are not validated here; the bus connection rejects malformed ones.
/// The root path `/` is used by the Secret Service as "no object".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The `/` sentinel meaning "no object" or "no prompt needed".
    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// `None` for the `/` sentinel, the path otherwise.
    pub fn into_option(self) -> Option<ObjectPath> {
        if self.is_root() {
            None
        } else {
            Some(self)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for ObjectPath {
    fn from(path: String) -> Self {
        Self(path)
    }
}

impl From<&ObjectPath> for ObjectPath {
    fn from(path: &ObjectPath) -> Self {
        path.clone()
    }
}

/// A homogeneous array. Items always conform to the element type.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    element: Type,
    items: Vec<Value>,
}

impl Array {
    pub fn new(element: Type, items: Vec<Value>) -> Result<Self, ValueError> {
        if let Some(bad) = items.iter().find(|item| item.value_type() != element) {
            return Err(ValueError::mismatch(&element, &bad.value_type()));
        }
        Ok(Self { element, items })
    }

    pub fn element_type(&self) -> &Type {
        &self.element
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Value> {
        self.items
    }
}

/// An array of dict entries with a basic key type.
#[derive(Debug, Clone, PartialEq)]
pub struct Dict {
    key: Type,
    value: Type,
    entries: Vec<(Value, Value)>,
}

impl Dict {
    pub fn new(key: Type, value: Type, entries: Vec<(Value, Value)>) -> Result<Self, ValueError> {
        if !key.is_basic() {
            return Err(ValueError::NonBasicKey(key.to_string()));
        }
        for (k, v) in &entries {
            if k.value_type() != key {
                return Err(ValueError::mismatch(&key, &k.value_type()));
            }
            if v.value_type() != value {
                return Err(ValueError::mismatch(&value, &v.value_type()));
            }
        }
        Ok(Self {
            key,
            value,
            entries,
        })
    }

    pub fn key_type(&self) -> &Type {
        &self.key
    }

    pub fn value_type(&self) -> &Type {
        &self.value
    }

    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<(Value, Value)> {
        self.entries
    }
}

/// A value of any D-Bus type except unix file descriptors.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Byte(u8),
    Bool(bool),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
    ObjectPath(ObjectPath),
    Signature(crate::signature::Signature),
    Variant(Box<Variant>),
    Array(Array),
    Dict(Dict),
    Struct(Vec<Value>),
}

impl Value {
    /// The D-Bus type of this value.
    pub fn value_type(&self) -> Type {
        match self {
            Value::Byte(_) => Type::Byte,
            Value::Bool(_) => Type::Boolean,
            Value::I16(_) => Type::Int16,
            Value::U16(_) => Type::UInt16,
            Value::I32(_) => Type::Int32,
            Value::U32(_) => Type::UInt32,
            Value::I64(_) => Type::Int64,
            Value::U64(_) => Type::UInt64,
            Value::F64(_) => Type::Double,
            Value::Str(_) => Type::String,
            Value::ObjectPath(_) => Type::ObjectPath,
            Value::Signature(_) => Type::Signature,
            Value::Variant(_) => Type::Variant,
            Value::Array(array) => Type::array_of(array.element.clone()),
            Value::Dict(dict) => Type::dict_of(dict.key.clone(), dict.value.clone()),
            Value::Struct(fields) => Type::Struct(fields.iter().map(Value::value_type).collect()),
        }
    }

    pub fn conforms_to(&self, ty: &Type) -> bool {
        self.value_type() == *ty
    }

    /// An `ay` byte array.
    pub fn bytes(bytes: &[u8]) -> Value {
        Value::Array(Array {
            element: Type::Byte,
            items: bytes.iter().copied().map(Value::Byte).collect(),
        })
    }

    /// An `ao` array of object paths.
    pub fn object_paths<I, P>(paths: I) -> Value
    where
        I: IntoIterator<Item = P>,
        P: Into<ObjectPath>,
    {
        Value::Array(Array {
            element: Type::ObjectPath,
            items: paths
                .into_iter()
                .map(|p| Value::ObjectPath(p.into()))
                .collect(),
        })
    }

    /// An `a{ss}` dict, ordered by key.
    pub fn string_dict<I, K, V>(entries: I) -> Value
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut entries: Vec<(String, String)> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        entries.sort();
        Value::Dict(Dict {
            key: Type::String,
            value: Type::String,
            entries: entries
                .into_iter()
                .map(|(k, v)| (Value::Str(k), Value::Str(v)))
                .collect(),
        })
    }

    /// An `a{sv}` dict, ordered by key.
    pub fn variant_dict<I, K>(entries: I) -> Value
    where
        I: IntoIterator<Item = (K, Variant)>,
        K: Into<String>,
    {
        let mut entries: Vec<(String, Variant)> =
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Value::Dict(Dict {
            key: Type::String,
            value: Type::Variant,
            entries: entries
                .into_iter()
                .map(|(k, v)| (Value::Str(k), Value::Variant(Box::new(v))))
                .collect(),
        })
    }

    pub fn variant(variant: Variant) -> Value {
        Value::Variant(Box::new(variant))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object_path(&self) -> Option<&ObjectPath> {
        match self {
            Value::ObjectPath(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_variant(&self) -> Option<&Variant> {
        match self {
            Value::Variant(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<u8> for Value {
    fn from(n: u8) -> Self {
        Value::Byte(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::U32(n)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::U64(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::I32(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::F64(n)
    }
}

impl From<ObjectPath> for Value {
    fn from(p: ObjectPath) -> Self {
        Value::ObjectPath(p)
    }
}

impl From<Variant> for Value {
    fn from(v: Variant) -> Self {
        Value::Variant(Box::new(v))
    }
}

/// A value paired with its type tag, the payload of a `v`.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    tag: Type,
    value: Value,
}

impl Variant {
    /// Pair `value` with the tag parsed from `tag`.
    ///
    /// Fails unless the tag is one complete type matching the value's shape.
    pub fn new(tag: &str, value: Value) -> Result<Self, ValueError> {
        let tag = Type::parse(tag)?;
        Self::with_type(tag, value)
    }

    pub fn with_type(tag: Type, value: Value) -> Result<Self, ValueError> {
        let found = value.value_type();
        if found != tag {
            return Err(ValueError::mismatch(&tag, &found));
        }
        Ok(Self { tag, value })
    }

    /// Wrap a value, taking the tag from its own type.
    pub fn wrap(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self {
            tag: value.value_type(),
            value,
        }
    }

    pub fn tag(&self) -> &Type {
        &self.tag
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> {:?}", self.tag, self.value)
    }
}

fn mismatch_for(expected: Type, value: &Value) -> ValueError {
    ValueError::mismatch(&expected, &value.value_type())
}

impl TryFrom<Value> for String {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(mismatch_for(Type::String, &other)),
        }
    }
}

impl TryFrom<Value> for ObjectPath {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::ObjectPath(p) => Ok(p),
            other => Err(mismatch_for(Type::ObjectPath, &other)),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch_for(Type::Boolean, &other)),
        }
    }
}

impl TryFrom<Value> for u64 {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::U64(n) => Ok(n),
            other => Err(mismatch_for(Type::UInt64, &other)),
        }
    }
}

impl TryFrom<Value> for Variant {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Variant(v) => Ok(*v),
            other => Err(mismatch_for(Type::Variant, &other)),
        }
    }
}

impl TryFrom<Value> for Vec<u8> {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Array(array) if array.element == Type::Byte => array
                .items
                .into_iter()
                .map(|item| match item {
                    Value::Byte(b) => Ok(b),
                    other => Err(mismatch_for(Type::Byte, &other)),
                })
                .collect(),
            other => Err(mismatch_for(Type::array_of(Type::Byte), &other)),
        }
    }
}

impl TryFrom<Value> for Vec<ObjectPath> {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Array(array) if array.element == Type::ObjectPath => {
                array.items.into_iter().map(ObjectPath::try_from).collect()
            }
            other => Err(mismatch_for(Type::array_of(Type::ObjectPath), &other)),
        }
    }
}

impl TryFrom<Value> for HashMap<String, String> {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Dict(dict) if dict.key == Type::String && dict.value == Type::String => dict
                .entries
                .into_iter()
                .map(|(k, v)| Ok((String::try_from(k)?, String::try_from(v)?)))
                .collect(),
            other => Err(mismatch_for(
                Type::dict_of(Type::String, Type::String),
                &other,
            )),
        }
    }
}

impl TryFrom<Value> for HashMap<String, Variant> {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Dict(dict) if dict.key == Type::String && dict.value == Type::Variant => dict
                .entries
                .into_iter()
                .map(|(k, v)| Ok((String::try_from(k)?, Variant::try_from(v)?)))
                .collect(),
            other => Err(mismatch_for(
                Type::dict_of(Type::String, Type::Variant),
                &other,
            )),
        }
    }
}

/// Fields of a struct value, or an error naming the expected struct type.
pub fn struct_fields(value: Value, expected: &Type) -> Result<Vec<Value>, ValueError> {
    if !value.conforms_to(expected) {
        return Err(ValueError::mismatch(expected, &value.value_type()));
    }
    match value {
        Value::Struct(fields) => Ok(fields),
        other => Err(ValueError::mismatch(expected, &other.value_type())),
    }
}
