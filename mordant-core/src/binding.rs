//! Domain side of the codec: typed data objects and their values.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{CodecError, Result};
use crate::node::{Decimal64, IntValue, OpaqueData, QName};

/// Stable name of a domain type.
pub type TypeName = &'static str;

/// Static description of a domain type: its name, the properties it exposes
/// and, for keyed list entries, the properties forming its key.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct BindingType {
    name: TypeName,
    properties: &'static [&'static str],
    key: Option<&'static [&'static str]>,
}

impl BindingType {
    pub const fn new(name: TypeName, properties: &'static [&'static str]) -> Self {
        BindingType {
            name,
            properties,
            key: None,
        }
    }

    pub const fn keyed(
        name: TypeName,
        properties: &'static [&'static str],
        key: &'static [&'static str],
    ) -> Self {
        BindingType {
            name,
            properties,
            key: Some(key),
        }
    }

    pub fn name(&self) -> TypeName {
        self.name
    }

    pub fn properties(&self) -> &'static [&'static str] {
        self.properties
    }

    pub fn key(&self) -> Option<&'static [&'static str]> {
        self.key
    }

    /// Extracts the key of `object`, which must be of this type.
    pub fn key_of(&self, object: &dyn DataObject) -> Result<BindingKey> {
        let names = self.key.ok_or_else(|| {
            CodecError::Programming(format!("{} has no key accessor", self.name))
        })?;
        let mut values = Vec::with_capacity(names.len());
        for name in names {
            match object.property(name)? {
                Some(DomainValue::Scalar(value)) => values.push(value),
                _ => {
                    return Err(CodecError::InvalidValue(format!(
                        "key property {name} of {} is not set",
                        self.name
                    )));
                }
            }
        }
        Ok(BindingKey(values))
    }
}

/// A typed domain object.
///
/// Implementations expose their state by property name; nested objects are
/// shared through `Arc`, whose identity the caching codec relies on.
pub trait DataObject: Any + fmt::Debug + Send + Sync {
    fn binding_type(&self) -> &'static BindingType;

    /// Returns the value of a property, or `None` when it is absent.
    ///
    /// Lazily decoded objects report decoding failures here.
    fn property(&self, name: &str) -> Result<Option<DomainValue>>;

    /// Augmentations attached to this object, keyed by their type.
    fn augmentations(&self) -> Augmentations {
        Augmentations::default()
    }

    fn as_any(&self) -> &dyn Any;
}

/// A data object type known at compile time.
pub trait BindingObject: DataObject {
    const BINDING_TYPE: &'static BindingType;
}

/// Compares two data objects by type, properties and augmentations.
///
/// Absent properties and empty collections compare equal, as do objects that
/// differ only in which backing representation produced them.
pub fn binding_eq(left: &dyn DataObject, right: &dyn DataObject) -> bool {
    let ty = left.binding_type();
    if ty.name() != right.binding_type().name() {
        return false;
    }
    for name in ty.properties() {
        let (Ok(a), Ok(b)) = (left.property(name), right.property(name)) else {
            return false;
        };
        if non_empty(a) != non_empty(b) {
            return false;
        }
    }
    left.augmentations() == right.augmentations()
}

fn non_empty(value: Option<DomainValue>) -> Option<DomainValue> {
    value.filter(|v| !v.is_empty_collection())
}

impl PartialEq for dyn DataObject {
    fn eq(&self, other: &Self) -> bool {
        binding_eq(self, other)
    }
}

/// Downcasts a data object to its concrete type.
pub fn downcast<T: DataObject>(object: &dyn DataObject) -> Option<&T> {
    object.as_any().downcast_ref::<T>()
}

/// Value of a data object property.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainValue {
    Scalar(Scalar),
    ScalarList(Vec<Scalar>),
    Object(Arc<dyn DataObject>),
    List(Vec<Arc<dyn DataObject>>),
    Map(BindingMap),
    Opaque(OpaqueObject),
}

impl DomainValue {
    /// A leaf-list value, or `None` when `values` is empty.
    pub fn scalar_list(values: impl IntoIterator<Item = Scalar>) -> Option<Self> {
        let values: Vec<_> = values.into_iter().collect();
        (!values.is_empty()).then_some(DomainValue::ScalarList(values))
    }

    /// An unkeyed list value, or `None` when `objects` is empty.
    pub fn list(objects: impl IntoIterator<Item = Arc<dyn DataObject>>) -> Option<Self> {
        let objects: Vec<_> = objects.into_iter().collect();
        (!objects.is_empty()).then_some(DomainValue::List(objects))
    }

    /// A keyed list value, or `None` when `objects` is empty.
    pub fn map(objects: impl IntoIterator<Item = Arc<dyn DataObject>>) -> Result<Option<Self>> {
        let map = BindingMap::from_objects(objects)?;
        Ok((!map.is_empty()).then_some(DomainValue::Map(map)))
    }

    pub fn is_empty_collection(&self) -> bool {
        match self {
            DomainValue::ScalarList(v) => v.is_empty(),
            DomainValue::List(v) => v.is_empty(),
            DomainValue::Map(m) => m.is_empty(),
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DomainValue::Scalar(_) => "scalar",
            DomainValue::ScalarList(_) => "scalar list",
            DomainValue::Object(_) => "object",
            DomainValue::List(_) => "list",
            DomainValue::Map(_) => "map",
            DomainValue::Opaque(_) => "opaque",
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            DomainValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_scalar_list(&self) -> Option<&[Scalar]> {
        match self {
            DomainValue::ScalarList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<dyn DataObject>> {
        match self {
            DomainValue::Object(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Arc<dyn DataObject>]> {
        match self {
            DomainValue::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BindingMap> {
        match self {
            DomainValue::Map(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&OpaqueObject> {
        match self {
            DomainValue::Opaque(v) => Some(v),
            _ => None,
        }
    }
}

/// Domain representation of a leaf value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scalar {
    Bool(bool),
    Int(IntValue),
    Decimal(Decimal64),
    String(String),
    Binary(Vec<u8>),
    Empty,
    Enum(EnumValue),
    Bits(BTreeSet<String>),
    Identity(IdentityValue),
    InstanceId(BindingPath),
    /// Value of a named typedef, wrapping its base representation.
    Typed(TypedValue),
}

impl Scalar {
    pub fn kind(&self) -> &'static str {
        match self {
            Scalar::Bool(_) => "boolean",
            Scalar::Int(_) => "integer",
            Scalar::Decimal(_) => "decimal64",
            Scalar::String(_) => "string",
            Scalar::Binary(_) => "binary",
            Scalar::Empty => "empty",
            Scalar::Enum(_) => "enumeration",
            Scalar::Bits(_) => "bits",
            Scalar::Identity(_) => "identity",
            Scalar::InstanceId(_) => "instance identifier",
            Scalar::Typed(_) => "typed value",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Enumeration member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub name: String,
    pub value: i32,
}

impl EnumValue {
    pub fn new(name: impl Into<String>, value: i32) -> Self {
        EnumValue {
            name: name.into(),
            value,
        }
    }
}

/// Identity instance, named by its domain type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityValue {
    pub binding: TypeName,
    pub qname: QName,
}

/// Value of a named typedef.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypedValue {
    pub binding: TypeName,
    pub value: Box<Scalar>,
}

impl TypedValue {
    pub fn new(binding: TypeName, value: impl Into<Scalar>) -> Self {
        TypedValue {
            binding,
            value: Box::new(value.into()),
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::String(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::String(v.to_string())
    }
}

impl From<Vec<u8>> for Scalar {
    fn from(v: Vec<u8>) -> Self {
        Scalar::Binary(v)
    }
}

impl From<Decimal64> for Scalar {
    fn from(v: Decimal64) -> Self {
        Scalar::Decimal(v)
    }
}

impl From<IntValue> for Scalar {
    fn from(v: IntValue) -> Self {
        Scalar::Int(v)
    }
}

impl From<EnumValue> for Scalar {
    fn from(v: EnumValue) -> Self {
        Scalar::Enum(v)
    }
}

impl From<IdentityValue> for Scalar {
    fn from(v: IdentityValue) -> Self {
        Scalar::Identity(v)
    }
}

impl From<BindingPath> for Scalar {
    fn from(v: BindingPath) -> Self {
        Scalar::InstanceId(v)
    }
}

impl From<TypedValue> for Scalar {
    fn from(v: TypedValue) -> Self {
        Scalar::Typed(v)
    }
}

impl From<BTreeSet<String>> for Scalar {
    fn from(v: BTreeSet<String>) -> Self {
        Scalar::Bits(v)
    }
}

macro_rules! scalar_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Scalar {
                fn from(v: $ty) -> Self {
                    Scalar::Int(v.into())
                }
            }
        )*
    };
}

scalar_from_int!(u8, u16, u32, u64, i8, i16, i32, i64);

/// Key of a keyed list entry, in key declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingKey(Vec<Scalar>);

impl BindingKey {
    pub fn new(values: impl IntoIterator<Item = Scalar>) -> Self {
        BindingKey(values.into_iter().collect())
    }

    pub fn single(value: impl Into<Scalar>) -> Self {
        BindingKey(vec![value.into()])
    }

    pub fn values(&self) -> &[Scalar] {
        &self.0
    }
}

/// Keyed list entries in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingMap(IndexMap<BindingKey, Arc<dyn DataObject>>);

impl BindingMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects entries, keying each by its own key properties.
    pub fn from_objects(objects: impl IntoIterator<Item = Arc<dyn DataObject>>) -> Result<Self> {
        let mut map = BindingMap::new();
        for object in objects {
            let key = object.binding_type().key_of(object.as_ref())?;
            map.insert(key, object);
        }
        Ok(map)
    }

    pub fn insert(&mut self, key: BindingKey, object: Arc<dyn DataObject>) {
        self.0.insert(key, object);
    }

    pub fn get(&self, key: &BindingKey) -> Option<&Arc<dyn DataObject>> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BindingKey, &Arc<dyn DataObject>)> {
        self.0.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &Arc<dyn DataObject>> {
        self.0.values()
    }
}

/// One step of a [`BindingPath`]: a domain type and, for list entries,
/// the entry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingStep {
    pub binding: TypeName,
    pub key: Option<BindingKey>,
}

/// Typed path to a data object, expressed in domain types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BindingPath(Vec<BindingStep>);

impl BindingPath {
    pub fn new(steps: impl IntoIterator<Item = BindingStep>) -> Self {
        BindingPath(steps.into_iter().collect())
    }

    pub fn root(binding: TypeName) -> Self {
        BindingPath(vec![BindingStep { binding, key: None }])
    }

    /// Appends an unkeyed step; for lists this is a wildcard.
    pub fn child(mut self, binding: TypeName) -> Self {
        self.0.push(BindingStep { binding, key: None });
        self
    }

    /// Appends a keyed list entry step.
    pub fn entry(mut self, binding: TypeName, key: BindingKey) -> Self {
        self.0.push(BindingStep {
            binding,
            key: Some(key),
        });
        self
    }

    pub fn steps(&self) -> &[BindingStep] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Opaque anydata payload, tagged with its domain type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueObject {
    pub binding: TypeName,
    pub data: OpaqueData,
}

/// Augmentations of a data object, at most one per augmentation type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Augmentations(BTreeMap<TypeName, Arc<dyn DataObject>>);

impl Augmentations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an augmentation, replacing any of the same type.
    pub fn with(mut self, augmentation: Arc<dyn DataObject>) -> Self {
        self.insert(augmentation);
        self
    }

    pub fn insert(&mut self, augmentation: Arc<dyn DataObject>) {
        self.0
            .insert(augmentation.binding_type().name(), augmentation);
    }

    pub fn get(&self, binding: TypeName) -> Option<&Arc<dyn DataObject>> {
        self.0.get(binding)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeName, &Arc<dyn DataObject>)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }
}

impl FromIterator<Arc<dyn DataObject>> for Augmentations {
    fn from_iter<I: IntoIterator<Item = Arc<dyn DataObject>>>(iter: I) -> Self {
        let mut augmentations = Augmentations::new();
        for augmentation in iter {
            augmentations.insert(augmentation);
        }
        augmentations
    }
}

/// Derives the property name of a schema child: `-` and `.` become `_`
/// and the name is lowercased.
pub fn property_name(qname: &QName) -> String {
    qname
        .local_name()
        .chars()
        .map(|c| match c {
            '-' | '.' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}
