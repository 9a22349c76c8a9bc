use crate::signature::Type;
use crate::value::{struct_fields, ObjectPath, Value, ValueError, Variant};
use std::fmt;
use std::sync::LazyLock;

static SECRET_TYPE: LazyLock<Type> = LazyLock::new(|| {
    Type::Struct(vec![
        Type::ObjectPath,
        Type::array_of(Type::Byte),
        Type::array_of(Type::Byte),
        Type::String,
    ])
});

fn take(values: Vec<Value>, expected: usize) -> Result<std::vec::IntoIter<Value>, ValueError> {
    if values.len() != expected {
        return Err(ValueError::Arity {
            expected,
            found: values.len(),
        });
    }
    Ok(values.into_iter())
}

fn next(fields: &mut std::vec::IntoIter<Value>) -> Result<Value, ValueError> {
    fields.next().ok_or(ValueError::Arity {
        expected: 1,
        found: 0,
    })
}

/// A secret as transferred over the bus: the `(oayays)` struct.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    /// Session the value is encoded for.
    pub session: ObjectPath,
    /// Algorithm parameters (the IV for encrypted sessions, empty for `plain`).
    pub parameters: Vec<u8>,
    pub value: Vec<u8>,
    pub content_type: String,
}

impl Secret {
    pub fn new(session: ObjectPath, value: impl Into<Vec<u8>>, content_type: &str) -> Self {
        Self {
            session,
            parameters: Vec::new(),
            value: value.into(),
            content_type: content_type.to_string(),
        }
    }

    /// A UTF-8 text secret for a `plain` session.
    pub fn text(session: ObjectPath, text: &str) -> Self {
        Self::new(session, text.as_bytes(), super::TEXT_CONTENT_TYPE)
    }

    pub fn struct_type() -> &'static Type {
        &SECRET_TYPE
    }

    pub fn to_value(&self) -> Value {
        Value::Struct(vec![
            Value::ObjectPath(self.session.clone()),
            Value::bytes(&self.parameters),
            Value::bytes(&self.value),
            Value::from(self.content_type.as_str()),
        ])
    }

    pub fn value_as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

// The value is never printed.
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("session", &self.session)
            .field("parameters", &self.parameters.len())
            .field("value", &format_args!("<{} bytes>", self.value.len()))
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl From<&Secret> for Value {
    fn from(secret: &Secret) -> Self {
        secret.to_value()
    }
}

impl TryFrom<Value> for Secret {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut fields = struct_fields(value, &SECRET_TYPE)?.into_iter();
        Ok(Secret {
            session: next(&mut fields)?.try_into()?,
            parameters: next(&mut fields)?.try_into()?,
            value: next(&mut fields)?.try_into()?,
            content_type: next(&mut fields)?.try_into()?,
        })
    }
}

/// Reply of `OpenSession`.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenedSession {
    /// Algorithm output; an empty string for `plain`.
    pub output: Variant,
    pub session: ObjectPath,
}

impl TryFrom<Vec<Value>> for OpenedSession {
    type Error = ValueError;

    fn try_from(values: Vec<Value>) -> Result<Self, Self::Error> {
        let mut values = take(values, 2)?;
        Ok(OpenedSession {
            output: next(&mut values)?.try_into()?,
            session: next(&mut values)?.try_into()?,
        })
    }
}

/// Reply of `Service.SearchItems`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchItemsResult {
    pub unlocked: Vec<ObjectPath>,
    pub locked: Vec<ObjectPath>,
}

impl SearchItemsResult {
    pub fn is_empty(&self) -> bool {
        self.unlocked.is_empty() && self.locked.is_empty()
    }
}

impl TryFrom<Vec<Value>> for SearchItemsResult {
    type Error = ValueError;

    fn try_from(values: Vec<Value>) -> Result<Self, Self::Error> {
        let mut values = take(values, 2)?;
        Ok(SearchItemsResult {
            unlocked: next(&mut values)?.try_into()?,
            locked: next(&mut values)?.try_into()?,
        })
    }
}

/// Reply of `Lock` and `Unlock`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockResult {
    /// Objects whose state changed without a prompt.
    pub objects: Vec<ObjectPath>,
    pub prompt: ObjectPath,
}

impl LockResult {
    /// The prompt to run for the remaining objects, if any.
    pub fn prompt(&self) -> Option<&ObjectPath> {
        (!self.prompt.is_root()).then_some(&self.prompt)
    }
}

impl TryFrom<Vec<Value>> for LockResult {
    type Error = ValueError;

    fn try_from(values: Vec<Value>) -> Result<Self, Self::Error> {
        let mut values = take(values, 2)?;
        Ok(LockResult {
            objects: next(&mut values)?.try_into()?,
            prompt: next(&mut values)?.try_into()?,
        })
    }
}

/// Reply of `CreateCollection` and `CreateItem`.
///
/// When the daemon needs to ask the user first, `path` is `/` and the new
/// object's path arrives through the prompt's completion instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedObject {
    pub path: ObjectPath,
    pub prompt: ObjectPath,
}

impl CreatedObject {
    pub fn path(&self) -> Option<&ObjectPath> {
        (!self.path.is_root()).then_some(&self.path)
    }

    pub fn prompt(&self) -> Option<&ObjectPath> {
        (!self.prompt.is_root()).then_some(&self.prompt)
    }
}

impl TryFrom<Vec<Value>> for CreatedObject {
    type Error = ValueError;

    fn try_from(values: Vec<Value>) -> Result<Self, Self::Error> {
        let mut values = take(values, 2)?;
        Ok(CreatedObject {
            path: next(&mut values)?.try_into()?,
            prompt: next(&mut values)?.try_into()?,
        })
    }
}

/// Payload of `Prompt.Completed`.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptCompletion {
    pub dismissed: bool,
    /// Operation-specific result, e.g. `o` for `CreateItem`, `ao` for `Unlock`.
    pub result: Variant,
}

impl PromptCompletion {
    /// The result as a single object path, for creation prompts.
    pub fn object_path(&self) -> Option<&ObjectPath> {
        self.result.value().as_object_path()
    }

    /// The result as an array of object paths, for lock/unlock prompts.
    pub fn object_paths(&self) -> Vec<ObjectPath> {
        Vec::<ObjectPath>::try_from(self.result.value().clone()).unwrap_or_default()
    }
}

impl TryFrom<Vec<Value>> for PromptCompletion {
    type Error = ValueError;

    fn try_from(values: Vec<Value>) -> Result<Self, Self::Error> {
        let mut values = take(values, 2)?;
        Ok(PromptCompletion {
            dismissed: next(&mut values)?.try_into()?,
            result: next(&mut values)?.try_into()?,
        })
    }
}
