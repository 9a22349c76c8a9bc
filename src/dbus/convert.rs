//! Conversion between [`Value`] and `zvariant` values.

use crate::error::Result;
use crate::signature::{Signature, Type};
use crate::value::{Array, Dict, ObjectPath, Value, ValueError, Variant};
use zbus::message::Message;
use zbus::zvariant::{
    self, Array as ZArray, Dict as ZDict, ObjectPath as ZObjectPath, Signature as ZSignature,
    Str, Structure, StructureBuilder, Value as ZValue,
};

fn zsignature(ty: &Type) -> zbus::Result<ZSignature> {
    Ok(ZSignature::try_from(ty.to_string().as_str())?)
}

/// Encode a value for the wire. Malformed object paths are rejected here.
pub fn to_zvariant(value: &Value) -> zbus::Result<ZValue<'static>> {
    Ok(match value {
        Value::Byte(n) => ZValue::U8(*n),
        Value::Bool(b) => ZValue::Bool(*b),
        Value::I16(n) => ZValue::I16(*n),
        Value::U16(n) => ZValue::U16(*n),
        Value::I32(n) => ZValue::I32(*n),
        Value::U32(n) => ZValue::U32(*n),
        Value::I64(n) => ZValue::I64(*n),
        Value::U64(n) => ZValue::U64(*n),
        Value::F64(n) => ZValue::F64(*n),
        Value::Str(s) => ZValue::Str(Str::from(s.clone())),
        Value::ObjectPath(p) => ZValue::ObjectPath(ZObjectPath::try_from(p.as_str().to_string())?),
        Value::Signature(s) => ZValue::Signature(ZSignature::try_from(s.to_string().as_str())?),
        Value::Variant(v) => ZValue::Value(Box::new(to_zvariant(v.value())?)),
        Value::Array(array) => {
            let mut out = ZArray::new(&zsignature(array.element_type())?);
            for item in array.items() {
                out.append(to_zvariant(item)?)?;
            }
            ZValue::Array(out)
        }
        Value::Dict(dict) => {
            let mut out = ZDict::new(&zsignature(dict.key_type())?, &zsignature(dict.value_type())?);
            for (k, v) in dict.entries() {
                out.append(to_zvariant(k)?, to_zvariant(v)?)?;
            }
            ZValue::Dict(out)
        }
        Value::Struct(fields) => {
            let mut builder = StructureBuilder::new();
            for field in fields {
                builder.push_value(to_zvariant(field)?);
            }
            ZValue::Structure(builder.build()?)
        }
    })
}

fn parse_type(signature: &ZSignature) -> Result<Type, ValueError> {
    Ok(Type::parse(&signature.to_string())?)
}

/// Decode a wire value.
pub fn from_zvariant(value: &ZValue<'_>) -> Result<Value, ValueError> {
    Ok(match value {
        ZValue::U8(n) => Value::Byte(*n),
        ZValue::Bool(b) => Value::Bool(*b),
        ZValue::I16(n) => Value::I16(*n),
        ZValue::U16(n) => Value::U16(*n),
        ZValue::I32(n) => Value::I32(*n),
        ZValue::U32(n) => Value::U32(*n),
        ZValue::I64(n) => Value::I64(*n),
        ZValue::U64(n) => Value::U64(*n),
        ZValue::F64(n) => Value::F64(*n),
        ZValue::Str(s) => Value::Str(s.as_str().to_string()),
        ZValue::ObjectPath(p) => Value::ObjectPath(ObjectPath::new(p.as_str())),
        ZValue::Signature(s) => Value::Signature(Signature::parse(&s.to_string())?),
        ZValue::Value(inner) => Value::variant(Variant::wrap(from_zvariant(inner)?)),
        ZValue::Array(array) => {
            let element = parse_type(array.element_signature())?;
            let items = array
                .inner()
                .iter()
                .map(from_zvariant)
                .collect::<Result<Vec<_>, _>>()?;
            Value::Array(Array::new(element, items)?)
        }
        ZValue::Dict(dict) => {
            let (key, value) = match parse_type(dict.signature())? {
                Type::Dict(key, value) => (*key, *value),
                other => return Err(ValueError::Unsupported(other.to_string())),
            };
            let entries = dict
                .iter()
                .map(|(k, v)| Ok((from_zvariant(k)?, from_zvariant(v)?)))
                .collect::<Result<Vec<_>, ValueError>>()?;
            Value::Dict(Dict::new(key, value, entries)?)
        }
        ZValue::Structure(structure) => Value::Struct(
            structure
                .fields()
                .iter()
                .map(from_zvariant)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        other => return Err(ValueError::Unsupported(other.value_signature().to_string())),
    })
}

/// Build a method-call body: a structure whose fields are the arguments.
pub fn to_body(args: &[Value]) -> zbus::Result<Option<Structure<'static>>> {
    if args.is_empty() {
        return Ok(None);
    }
    let mut builder = StructureBuilder::new();
    for arg in args {
        builder.push_value(to_zvariant(arg)?);
    }
    Ok(Some(builder.build()?))
}

/// Decode a reply or signal body laid out as `expected`.
///
/// The wire signature of a body holding one struct (`(oayays)`) is
/// indistinguishable from a body holding that struct's fields, so the
/// declared signature decides which one was meant.
pub fn from_body(message: &Message, expected: &Signature) -> Result<Vec<Value>> {
    let body = message.body();
    if matches!(body.signature(), ZSignature::Unit) {
        return Ok(Vec::new());
    }
    let structure: Structure<'_> = body.deserialize()?;
    let fields = structure
        .fields()
        .iter()
        .map(from_zvariant)
        .collect::<Result<Vec<_>, _>>()?;

    match expected.single() {
        Some(Type::Struct(_)) => Ok(vec![Value::Struct(fields)]),
        _ => Ok(fields),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn round_trip(value: Value) {
        let wire = to_zvariant(&value).unwrap();
        assert_eq!(
            wire.value_signature().to_string(),
            value.value_type().to_string()
        );
        let back = from_zvariant(&wire).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_round_trip_basic_types() {
        round_trip(Value::from("MyItem"));
        round_trip(Value::from(""));
        round_trip(Value::ObjectPath("/org/freedesktop/secrets/session/1".into()));
        round_trip(Value::from(true));
        round_trip(Value::from(1_700_000_000u64));
        round_trip(Value::from(-4i32));
    }

    #[test]
    fn test_round_trip_containers() {
        round_trip(Value::bytes(b"my secret"));
        round_trip(Value::bytes(b""));
        round_trip(Value::object_paths([
            "/org/freedesktop/secrets/collection/login",
            "/org/freedesktop/secrets/collection/session",
        ]));
        round_trip(Value::string_dict([
            ("Attribute1", "Value1"),
            ("Attribute2", "Value2"),
        ]));
        round_trip(Value::variant_dict([
            (
                "org.freedesktop.Secret.Item.Label",
                Variant::wrap("MyItem"),
            ),
            (
                "org.freedesktop.Secret.Item.Attributes",
                Variant::wrap(Value::string_dict([("Attribute1", "Value1")])),
            ),
        ]));
    }

    #[test]
    fn test_round_trip_struct_and_variant() {
        let secret = Value::Struct(vec![
            Value::ObjectPath("/org/freedesktop/secrets/session/1".into()),
            Value::bytes(b""),
            Value::bytes(b"my secret"),
            Value::from("text/plain; charset=utf8"),
        ]);
        round_trip(secret.clone());
        round_trip(Value::variant(Variant::new("s", Value::from("")).unwrap()));
        round_trip(Value::variant(Variant::wrap(secret)));
    }

    #[test]
    fn test_decoded_maps() {
        let wire = to_zvariant(&Value::string_dict([("service", "demo")])).unwrap();
        let attrs: HashMap<String, String> = from_zvariant(&wire).unwrap().try_into().unwrap();
        assert_eq!(attrs["service"], "demo");
    }

    #[test]
    fn test_malformed_path_rejected_on_encode() {
        assert!(to_zvariant(&Value::ObjectPath("no-slash".into())).is_err());
    }

    #[test]
    fn test_body_building() {
        assert!(to_body(&[]).unwrap().is_none());
        let body = to_body(&[Value::from("plain"), Value::variant(Variant::wrap(""))])
            .unwrap()
            .unwrap();
        assert_eq!(zvariant::DynamicType::signature(&body).to_string(), "(sv)");
    }
}
