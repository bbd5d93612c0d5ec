//! Codecs between leaf values and their domain scalars.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::binding::{EnumValue, IdentityValue, Scalar, TypeName, TypedValue};
use crate::error::{CodecError, Result};
use crate::factory::CodecContextFactory;
use crate::node::{QName, Value};
use crate::runtime::BindingRuntimeContext;
use crate::schema::{EnumPair, IntType};

/// Converts between leaf [`Value`]s and domain [`Scalar`]s.
pub trait ValueCodec: fmt::Debug + Send + Sync {
    fn serialize(&self, value: &Scalar) -> Result<Value>;
    fn deserialize(&self, value: &Value) -> Result<Scalar>;
}

fn mismatch(expected: impl fmt::Display, found: &str) -> CodecError {
    CodecError::InvalidValue(format!("expected {expected}, found {found}"))
}

fn check_length(length: Option<(u64, u64)>, actual: usize, what: &str) -> Result<()> {
    if let Some((min, max)) = length {
        let actual = actual as u64;
        if actual < min || actual > max {
            return Err(CodecError::InvalidValue(format!(
                "{what} length {actual} outside of {min}..={max}"
            )));
        }
    }
    Ok(())
}

/// Built-in types whose domain and tree representations coincide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltInCodec {
    Boolean,
    Int {
        ty: IntType,
        range: Option<(i128, i128)>,
    },
    Decimal64 {
        fraction_digits: u8,
    },
    String {
        length: Option<(u64, u64)>,
    },
    Binary {
        length: Option<(u64, u64)>,
    },
    Empty,
}

impl BuiltInCodec {
    fn check_int(&self, ty: IntType, range: Option<(i128, i128)>, value: i128) -> Result<()> {
        let (min, max) = range.unwrap_or_else(|| ty.bounds());
        if value < min || value > max {
            return Err(CodecError::InvalidValue(format!(
                "{value} outside of {ty} range {min}..={max}"
            )));
        }
        Ok(())
    }

    fn validate(&self, value: &Value) -> Result<()> {
        match (self, value) {
            (BuiltInCodec::Boolean, Value::Bool(_)) | (BuiltInCodec::Empty, Value::Empty) => Ok(()),
            (BuiltInCodec::Int { ty, range }, Value::Int(v)) if v.int_type() == *ty => {
                self.check_int(*ty, *range, v.as_i128())
            }
            (BuiltInCodec::Int { ty, .. }, other) => Err(mismatch(ty, other.kind())),
            (BuiltInCodec::Decimal64 { fraction_digits }, Value::Decimal(d)) => {
                if d.fraction_digits() != *fraction_digits {
                    return Err(CodecError::InvalidValue(format!(
                        "decimal64 {d} has {} fraction digits, expected {fraction_digits}",
                        d.fraction_digits()
                    )));
                }
                Ok(())
            }
            (BuiltInCodec::String { length }, Value::String(s)) => {
                check_length(*length, s.chars().count(), "string")
            }
            (BuiltInCodec::Binary { length }, Value::Binary(b)) => {
                check_length(*length, b.len(), "binary")
            }
            (codec, other) => Err(mismatch(codec.type_name(), other.kind())),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            BuiltInCodec::Boolean => "boolean",
            BuiltInCodec::Int { .. } => "integer",
            BuiltInCodec::Decimal64 { .. } => "decimal64",
            BuiltInCodec::String { .. } => "string",
            BuiltInCodec::Binary { .. } => "binary",
            BuiltInCodec::Empty => "empty",
        }
    }
}

impl ValueCodec for BuiltInCodec {
    fn serialize(&self, value: &Scalar) -> Result<Value> {
        let tree = match value {
            Scalar::Bool(v) => Value::Bool(*v),
            Scalar::Int(v) => Value::Int(*v),
            Scalar::Decimal(v) => Value::Decimal(*v),
            Scalar::String(v) => Value::String(v.clone()),
            Scalar::Binary(v) => Value::Binary(v.clone()),
            Scalar::Empty => Value::Empty,
            other => return Err(mismatch(self.type_name(), other.kind())),
        };
        self.validate(&tree)?;
        Ok(tree)
    }

    fn deserialize(&self, value: &Value) -> Result<Scalar> {
        self.validate(value)?;
        Ok(match value {
            Value::Bool(v) => Scalar::Bool(*v),
            Value::Int(v) => Scalar::Int(*v),
            Value::Decimal(v) => Scalar::Decimal(*v),
            Value::String(v) => Scalar::String(v.clone()),
            Value::Binary(v) => Scalar::Binary(v.clone()),
            _ => Scalar::Empty,
        })
    }
}

/// Enumeration names on the tree side, name and value on the domain side.
#[derive(Debug, Clone)]
pub struct EnumerationCodec {
    pairs: Vec<EnumPair>,
}

impl EnumerationCodec {
    pub fn new(pairs: Vec<EnumPair>) -> Self {
        EnumerationCodec { pairs }
    }
}

impl ValueCodec for EnumerationCodec {
    fn serialize(&self, value: &Scalar) -> Result<Value> {
        let Scalar::Enum(value) = value else {
            return Err(mismatch("enumeration", value.kind()));
        };
        self.pairs
            .iter()
            .find(|pair| pair.name == value.name && pair.value == value.value)
            .map(|pair| Value::String(pair.name.clone()))
            .ok_or_else(|| {
                CodecError::InvalidValue(format!("{} is not a member of the enumeration", value.name))
            })
    }

    fn deserialize(&self, value: &Value) -> Result<Scalar> {
        let Value::String(name) = value else {
            return Err(mismatch("enumeration", value.kind()));
        };
        self.pairs
            .iter()
            .find(|pair| &pair.name == name)
            .map(|pair| Scalar::Enum(EnumValue::new(pair.name.clone(), pair.value)))
            .ok_or_else(|| {
                CodecError::InvalidValue(format!("{name} is not a member of the enumeration"))
            })
    }
}

/// Bit sets, restricted to the declared bit names.
#[derive(Debug, Clone)]
pub struct BitsCodec {
    names: Vec<String>,
}

impl BitsCodec {
    pub fn new(names: Vec<String>) -> Self {
        BitsCodec { names }
    }

    fn check(&self, bits: &std::collections::BTreeSet<String>) -> Result<()> {
        match bits.iter().find(|bit| !self.names.contains(bit)) {
            Some(unknown) => Err(CodecError::InvalidValue(format!("unknown bit {unknown}"))),
            None => Ok(()),
        }
    }
}

impl ValueCodec for BitsCodec {
    fn serialize(&self, value: &Scalar) -> Result<Value> {
        let Scalar::Bits(bits) = value else {
            return Err(mismatch("bits", value.kind()));
        };
        self.check(bits)?;
        Ok(Value::Bits(bits.clone()))
    }

    fn deserialize(&self, value: &Value) -> Result<Scalar> {
        let Value::Bits(bits) = value else {
            return Err(mismatch("bits", value.kind()));
        };
        self.check(bits)?;
        Ok(Scalar::Bits(bits.clone()))
    }
}

/// Identity references, checked against the runtime's identity registry.
#[derive(Debug)]
pub struct IdentityCodec {
    runtime: Arc<BindingRuntimeContext>,
    base: Option<QName>,
}

impl IdentityCodec {
    pub fn new(runtime: Arc<BindingRuntimeContext>, base: Option<QName>) -> Self {
        IdentityCodec { runtime, base }
    }

    fn check_base(&self, identity: &QName) -> Result<()> {
        match &self.base {
            Some(base) if !self.runtime.is_derived_from(identity, base) => Err(
                CodecError::InvalidValue(format!("identity {identity} is not derived from {base}")),
            ),
            _ => Ok(()),
        }
    }
}

impl ValueCodec for IdentityCodec {
    fn serialize(&self, value: &Scalar) -> Result<Value> {
        let Scalar::Identity(value) = value else {
            return Err(mismatch("identity", value.kind()));
        };
        let identity = self.runtime.identity_for_type(value.binding).ok_or_else(|| {
            CodecError::InvalidValue(format!("{} is not a known identity type", value.binding))
        })?;
        if identity.qname() != &value.qname {
            return Err(CodecError::InvalidValue(format!(
                "identity type {} names {}, not {}",
                value.binding,
                identity.qname(),
                value.qname
            )));
        }
        self.check_base(identity.qname())?;
        Ok(Value::Identity(value.qname.clone()))
    }

    fn deserialize(&self, value: &Value) -> Result<Scalar> {
        let Value::Identity(qname) = value else {
            return Err(mismatch("identityref", value.kind()));
        };
        let identity = self
            .runtime
            .identity(qname)
            .ok_or_else(|| CodecError::InvalidValue(format!("unknown identity {qname}")))?;
        self.check_base(qname)?;
        Ok(Scalar::Identity(IdentityValue {
            binding: identity.binding(),
            qname: qname.clone(),
        }))
    }
}

/// Instance identifiers, translated through the owning codec tree.
///
/// Holds the tree weakly: the tree owns this codec through its memo table.
#[derive(Debug)]
pub struct InstanceIdentifierCodec {
    factory: Weak<CodecContextFactory>,
}

impl InstanceIdentifierCodec {
    pub fn new(factory: Weak<CodecContextFactory>) -> Self {
        InstanceIdentifierCodec { factory }
    }

    fn factory(&self) -> Result<Arc<CodecContextFactory>> {
        self.factory
            .upgrade()
            .ok_or_else(|| CodecError::IllegalState("codec tree has been dropped".into()))
    }
}

impl ValueCodec for InstanceIdentifierCodec {
    fn serialize(&self, value: &Scalar) -> Result<Value> {
        let Scalar::InstanceId(path) = value else {
            return Err(mismatch("instance identifier", value.kind()));
        };
        let path = self
            .factory()?
            .to_node_path(path)
            .map_err(|e| CodecError::InvalidValue(e.to_string()))?;
        Ok(Value::InstanceId(path))
    }

    fn deserialize(&self, value: &Value) -> Result<Scalar> {
        let Value::InstanceId(path) = value else {
            return Err(mismatch("instance-identifier", value.kind()));
        };
        let path = self
            .factory()?
            .from_node_path(path)
            .map_err(|e| CodecError::InvalidValue(e.to_string()))?;
        Ok(Scalar::InstanceId(path))
    }
}

/// Unions: the first member accepting the value wins.
#[derive(Debug)]
pub struct UnionCodec {
    members: Vec<Arc<dyn ValueCodec>>,
}

impl UnionCodec {
    pub fn new(members: Vec<Arc<dyn ValueCodec>>) -> Self {
        UnionCodec { members }
    }
}

impl ValueCodec for UnionCodec {
    fn serialize(&self, value: &Scalar) -> Result<Value> {
        self.members
            .iter()
            .find_map(|member| member.serialize(value).ok())
            .ok_or_else(|| {
                CodecError::InvalidValue(format!("no union member accepts {}", value.kind()))
            })
    }

    fn deserialize(&self, value: &Value) -> Result<Scalar> {
        self.members
            .iter()
            .find_map(|member| member.deserialize(value).ok())
            .ok_or_else(|| CodecError::InvalidValue(format!("no union member accepts {value:?}")))
    }
}

/// Named typedefs: delegates to the base type's codec and wraps the result
/// in the typedef's domain type.
#[derive(Debug)]
pub struct CompositeValueCodec {
    binding: TypeName,
    inner: Arc<dyn ValueCodec>,
}

impl CompositeValueCodec {
    pub fn new(binding: TypeName, inner: Arc<dyn ValueCodec>) -> Self {
        CompositeValueCodec { binding, inner }
    }
}

impl ValueCodec for CompositeValueCodec {
    fn serialize(&self, value: &Scalar) -> Result<Value> {
        match value {
            Scalar::Typed(typed) if typed.binding == self.binding => self.inner.serialize(&typed.value),
            Scalar::Typed(typed) => Err(CodecError::InvalidValue(format!(
                "expected {}, found {}",
                self.binding, typed.binding
            ))),
            other => Err(mismatch(self.binding, other.kind())),
        }
    }

    fn deserialize(&self, value: &Value) -> Result<Scalar> {
        Ok(Scalar::Typed(TypedValue {
            binding: self.binding,
            value: Box::new(self.inner.deserialize(value)?),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Decimal64, IntValue};
    use crate::runtime::IdentitySchema;
    use crate::schema::SchemaContext;

    fn q(name: &str) -> QName {
        QName::new("urn:test", name)
    }

    #[test]
    fn int_range_is_enforced() {
        let codec = BuiltInCodec::Int {
            ty: IntType::U8,
            range: Some((1, 10)),
        };
        assert_eq!(
            codec.deserialize(&Value::Int(IntValue::U8(5))).unwrap(),
            Scalar::Int(IntValue::U8(5))
        );
        assert!(codec.deserialize(&Value::Int(IntValue::U8(11))).is_err());
        assert!(codec.serialize(&Scalar::Int(IntValue::U8(0))).is_err());
        assert!(codec.serialize(&Scalar::Int(IntValue::U16(5))).is_err());
    }

    #[test]
    fn string_length_counts_characters() {
        let codec = BuiltInCodec::String {
            length: Some((1, 3)),
        };
        assert!(codec.serialize(&Scalar::from("äöü")).is_ok());
        assert!(codec.serialize(&Scalar::from("abcd")).is_err());
        assert!(codec.deserialize(&Value::from("")).is_err());
    }

    #[test]
    fn decimal_digits_must_match() {
        let codec = BuiltInCodec::Decimal64 { fraction_digits: 2 };
        assert!(codec.serialize(&Scalar::Decimal(Decimal64::new(100, 2))).is_ok());
        assert!(codec.serialize(&Scalar::Decimal(Decimal64::new(100, 3))).is_err());
    }

    #[test]
    fn enumeration_by_name() {
        let codec = EnumerationCodec::new(vec![
            EnumPair {
                name: "up".into(),
                value: 1,
            },
            EnumPair {
                name: "down".into(),
                value: 2,
            },
        ]);
        let up = codec.deserialize(&Value::from("up")).unwrap();
        assert_eq!(up, Scalar::Enum(EnumValue::new("up", 1)));
        assert_eq!(codec.serialize(&up).unwrap(), Value::from("up"));
        assert!(codec.deserialize(&Value::from("sideways")).is_err());
        assert!(codec.serialize(&Scalar::Enum(EnumValue::new("up", 2))).is_err());
    }

    #[test]
    fn bits_must_be_declared() {
        let codec = BitsCodec::new(vec!["a".into(), "b".into()]);
        let ok = Value::Bits(["a".to_string()].into());
        assert!(codec.deserialize(&ok).is_ok());
        let bad = Value::Bits(["c".to_string()].into());
        assert!(codec.deserialize(&bad).is_err());
    }

    fn identity_runtime() -> Arc<BindingRuntimeContext> {
        let schema = SchemaContext::builder().build().unwrap();
        Arc::new(
            BindingRuntimeContext::builder(schema)
                .identity(IdentitySchema::new(q("base"), "Base"))
                .identity(IdentitySchema::new(q("derived"), "Derived").with_base(q("base")))
                .identity(IdentitySchema::new(q("unrelated"), "Unrelated"))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn identity_must_derive_from_base() {
        let codec = IdentityCodec::new(identity_runtime(), Some(q("base")));
        let derived = codec.deserialize(&Value::Identity(q("derived"))).unwrap();
        assert_eq!(
            derived,
            Scalar::Identity(IdentityValue {
                binding: "Derived",
                qname: q("derived"),
            })
        );
        assert_eq!(codec.serialize(&derived).unwrap(), Value::Identity(q("derived")));

        assert!(codec.deserialize(&Value::Identity(q("unrelated"))).is_err());
        assert!(codec.deserialize(&Value::Identity(q("missing"))).is_err());
    }

    #[test]
    fn union_tries_members_in_order() {
        let codec = UnionCodec::new(vec![
            Arc::new(BuiltInCodec::Int {
                ty: IntType::U8,
                range: None,
            }),
            Arc::new(BuiltInCodec::String { length: None }),
        ]);
        assert_eq!(
            codec.deserialize(&Value::from("x")).unwrap(),
            Scalar::from("x")
        );
        assert_eq!(
            codec.deserialize(&Value::Int(IntValue::U8(3))).unwrap(),
            Scalar::Int(IntValue::U8(3))
        );
        assert!(codec.deserialize(&Value::Bool(true)).is_err());
    }

    #[test]
    fn composite_wraps_base_value() {
        let codec = CompositeValueCodec::new(
            "Name",
            Arc::new(BuiltInCodec::String { length: None }),
        );
        let wrapped = codec.deserialize(&Value::from("abc")).unwrap();
        assert_eq!(wrapped, Scalar::Typed(TypedValue::new("Name", "abc")));
        assert_eq!(codec.serialize(&wrapped).unwrap(), Value::from("abc"));
        assert!(codec.serialize(&Scalar::from("abc")).is_err());
        assert!(codec
            .serialize(&Scalar::Typed(TypedValue::new("Other", "abc")))
            .is_err());
    }

    #[test]
    fn instance_identifier_needs_live_tree() {
        let codec = InstanceIdentifierCodec::new(Weak::new());
        let err = codec
            .deserialize(&Value::InstanceId(Default::default()))
            .unwrap_err();
        assert!(matches!(err, CodecError::IllegalState(_)));
    }
}
