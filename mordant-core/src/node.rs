//! The generic attribute tree.
//!
//! A [`NormalizedNode`] is an immutable, schema-shaped tree of named nodes
//! with typed scalar leaves. Subtrees are shared through `Arc`, so splicing a
//! cached subtree into a larger one never copies it.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};
use crate::schema::IntType;

/// Namespace-qualified node name.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QName {
    namespace: Arc<str>,
    local_name: Arc<str>,
}

impl QName {
    pub fn new(namespace: impl Into<Arc<str>>, local_name: impl Into<Arc<str>>) -> Self {
        QName {
            namespace: namespace.into(),
            local_name: local_name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Creates a name in the same namespace.
    pub fn sibling(&self, local_name: impl Into<Arc<str>>) -> Self {
        QName {
            namespace: self.namespace.clone(),
            local_name: local_name.into(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}){}", self.namespace, self.local_name)
    }
}

impl fmt::Debug for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Integer value tagged with its width and signedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IntValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
}

impl IntValue {
    pub fn int_type(&self) -> IntType {
        match self {
            IntValue::U8(_) => IntType::U8,
            IntValue::U16(_) => IntType::U16,
            IntValue::U32(_) => IntType::U32,
            IntValue::U64(_) => IntType::U64,
            IntValue::I8(_) => IntType::I8,
            IntValue::I16(_) => IntType::I16,
            IntValue::I32(_) => IntType::I32,
            IntValue::I64(_) => IntType::I64,
        }
    }

    /// Widens to `i128`, which holds every supported width losslessly.
    pub fn as_i128(&self) -> i128 {
        match *self {
            IntValue::U8(v) => v.into(),
            IntValue::U16(v) => v.into(),
            IntValue::U32(v) => v.into(),
            IntValue::U64(v) => v.into(),
            IntValue::I8(v) => v.into(),
            IntValue::I16(v) => v.into(),
            IntValue::I32(v) => v.into(),
            IntValue::I64(v) => v.into(),
        }
    }
}

impl fmt::Display for IntValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i128())
    }
}

macro_rules! int_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for IntValue {
                fn from(v: $ty) -> Self {
                    IntValue::$variant(v)
                }
            }

            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Int(IntValue::$variant(v))
                }
            }
        )*
    };
}

int_from!(u8 => U8, u16 => U16, u32 => U32, u64 => U64, i8 => I8, i16 => I16, i32 => I32, i64 => I64);

/// Fixed-point decimal: `unscaled / 10^fraction_digits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Decimal64 {
    unscaled: i64,
    fraction_digits: u8,
}

impl Decimal64 {
    pub fn new(unscaled: i64, fraction_digits: u8) -> Self {
        Decimal64 {
            unscaled,
            fraction_digits,
        }
    }

    pub fn unscaled(&self) -> i64 {
        self.unscaled
    }

    pub fn fraction_digits(&self) -> u8 {
        self.fraction_digits
    }
}

impl fmt::Display for Decimal64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fraction_digits == 0 {
            return write!(f, "{}", self.unscaled);
        }
        let scale = 10u128.pow(self.fraction_digits.into());
        let magnitude = u128::from(self.unscaled.unsigned_abs());
        let sign = if self.unscaled < 0 { "-" } else { "" };
        write!(
            f,
            "{sign}{}.{:0width$}",
            magnitude / scale,
            magnitude % scale,
            width = self.fraction_digits as usize
        )
    }
}

/// Scalar value held by a leaf or leaf-set entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(IntValue),
    Decimal(Decimal64),
    String(String),
    Binary(Vec<u8>),
    Empty,
    Bits(BTreeSet<String>),
    Identity(QName),
    InstanceId(NodePath),
}

impl Value {
    /// Short name of the value kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Decimal(_) => "decimal64",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::Empty => "empty",
            Value::Bits(_) => "bits",
            Value::Identity(_) => "identityref",
            Value::InstanceId(_) => "instance-identifier",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<IntValue> for Value {
    fn from(v: IntValue) -> Self {
        Value::Int(v)
    }
}

impl From<Decimal64> for Value {
    fn from(v: Decimal64) -> Self {
        Value::Decimal(v)
    }
}

/// Key predicates identifying one entry of a keyed list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryIdentifier {
    name: QName,
    keys: Vec<(QName, Value)>,
}

impl EntryIdentifier {
    pub fn new(name: QName, keys: impl IntoIterator<Item = (QName, Value)>) -> Self {
        EntryIdentifier {
            name,
            keys: keys.into_iter().collect(),
        }
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn keys(&self) -> &[(QName, Value)] {
        &self.keys
    }

    pub fn key(&self, name: &QName) -> Option<&Value> {
        self.keys.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

/// One step of a [`NodePath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathArgument {
    /// A named node, or a whole list.
    Node(QName),
    /// A keyed list entry.
    Entry(EntryIdentifier),
    /// A leaf-set entry, addressed by value.
    Value(QName, Value),
}

impl PathArgument {
    pub fn node_type(&self) -> &QName {
        match self {
            PathArgument::Node(name) | PathArgument::Value(name, _) => name,
            PathArgument::Entry(id) => id.name(),
        }
    }
}

impl fmt::Display for PathArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathArgument::Node(name) => write!(f, "{name}"),
            PathArgument::Entry(id) => {
                write!(f, "{}", id.name)?;
                for (k, v) in &id.keys {
                    write!(f, "[{}={v:?}]", k.local_name())?;
                }
                Ok(())
            }
            PathArgument::Value(name, v) => write!(f, "{name}[.={v:?}]"),
        }
    }
}

/// Path into the attribute tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodePath(Vec<PathArgument>);

impl NodePath {
    pub fn new(args: impl IntoIterator<Item = PathArgument>) -> Self {
        NodePath(args.into_iter().collect())
    }

    pub fn push(&mut self, arg: PathArgument) {
        self.0.push(arg);
    }

    /// Appends a node step, returning the extended path.
    pub fn node(mut self, name: QName) -> Self {
        self.0.push(PathArgument::Node(name));
        self
    }

    /// Appends a keyed entry step, returning the extended path.
    pub fn entry(mut self, id: EntryIdentifier) -> Self {
        self.0.push(PathArgument::Entry(id));
        self
    }

    pub fn args(&self) -> &[PathArgument] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathArgument> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for arg in &self.0 {
            write!(f, "/{arg}")?;
        }
        Ok(())
    }
}

impl FromIterator<PathArgument> for NodePath {
    fn from_iter<I: IntoIterator<Item = PathArgument>>(iter: I) -> Self {
        NodePath(iter.into_iter().collect())
    }
}

/// Uninterpreted payload of an anydata node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpaqueData {
    pub media_type: String,
    pub content: Vec<u8>,
}

/// Named children of a container-like node, in insertion order.
pub type Children = IndexMap<QName, Arc<NormalizedNode>>;

/// A node of the attribute tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalizedNode {
    Leaf {
        name: QName,
        value: Value,
    },
    LeafSet {
        name: QName,
        ordered: bool,
        values: Vec<Value>,
    },
    Container {
        name: QName,
        children: Children,
    },
    /// Choice wrapper. Its children are the data nodes of the selected case.
    Choice {
        name: QName,
        children: Children,
    },
    Map {
        name: QName,
        ordered: bool,
        entries: IndexMap<EntryIdentifier, Arc<NormalizedNode>>,
    },
    MapEntry {
        id: EntryIdentifier,
        children: Children,
    },
    UnkeyedList {
        name: QName,
        entries: Vec<Arc<NormalizedNode>>,
    },
    UnkeyedEntry {
        name: QName,
        children: Children,
    },
    Opaque {
        name: QName,
        body: OpaqueData,
    },
}

fn collect_children(children: impl IntoIterator<Item = NormalizedNode>) -> Children {
    children
        .into_iter()
        .map(|child| (child.name().clone(), Arc::new(child)))
        .collect()
}

impl NormalizedNode {
    pub fn leaf(name: QName, value: impl Into<Value>) -> Self {
        NormalizedNode::Leaf {
            name,
            value: value.into(),
        }
    }

    pub fn leaf_set(name: QName, values: impl IntoIterator<Item = Value>) -> Self {
        NormalizedNode::LeafSet {
            name,
            ordered: false,
            values: values.into_iter().collect(),
        }
    }

    pub fn ordered_leaf_set(name: QName, values: impl IntoIterator<Item = Value>) -> Self {
        NormalizedNode::LeafSet {
            name,
            ordered: true,
            values: values.into_iter().collect(),
        }
    }

    pub fn container(name: QName, children: impl IntoIterator<Item = NormalizedNode>) -> Self {
        NormalizedNode::Container {
            name,
            children: collect_children(children),
        }
    }

    pub fn choice(name: QName, children: impl IntoIterator<Item = NormalizedNode>) -> Self {
        NormalizedNode::Choice {
            name,
            children: collect_children(children),
        }
    }

    /// Builds a keyed list. Nodes other than map entries are ignored.
    pub fn map(name: QName, entries: impl IntoIterator<Item = NormalizedNode>) -> Self {
        NormalizedNode::Map {
            name,
            ordered: false,
            entries: entries
                .into_iter()
                .filter_map(|entry| match &entry {
                    NormalizedNode::MapEntry { id, .. } => Some((id.clone(), Arc::new(entry))),
                    _ => None,
                })
                .collect(),
        }
    }

    pub fn map_entry(id: EntryIdentifier, children: impl IntoIterator<Item = NormalizedNode>) -> Self {
        NormalizedNode::MapEntry {
            id,
            children: collect_children(children),
        }
    }

    pub fn unkeyed_list(name: QName, entries: impl IntoIterator<Item = NormalizedNode>) -> Self {
        NormalizedNode::UnkeyedList {
            name,
            entries: entries.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn unkeyed_entry(name: QName, children: impl IntoIterator<Item = NormalizedNode>) -> Self {
        NormalizedNode::UnkeyedEntry {
            name,
            children: collect_children(children),
        }
    }

    pub fn opaque(name: QName, body: OpaqueData) -> Self {
        NormalizedNode::Opaque { name, body }
    }

    pub fn name(&self) -> &QName {
        match self {
            NormalizedNode::Leaf { name, .. }
            | NormalizedNode::LeafSet { name, .. }
            | NormalizedNode::Container { name, .. }
            | NormalizedNode::Choice { name, .. }
            | NormalizedNode::Map { name, .. }
            | NormalizedNode::UnkeyedList { name, .. }
            | NormalizedNode::UnkeyedEntry { name, .. }
            | NormalizedNode::Opaque { name, .. } => name,
            NormalizedNode::MapEntry { id, .. } => id.name(),
        }
    }

    /// The path argument addressing this node within its parent.
    pub fn identifier(&self) -> PathArgument {
        match self {
            NormalizedNode::MapEntry { id, .. } => PathArgument::Entry(id.clone()),
            other => PathArgument::Node(other.name().clone()),
        }
    }

    /// Short name of the node kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            NormalizedNode::Leaf { .. } => "leaf",
            NormalizedNode::LeafSet { .. } => "leaf-set",
            NormalizedNode::Container { .. } => "container",
            NormalizedNode::Choice { .. } => "choice",
            NormalizedNode::Map { .. } => "map",
            NormalizedNode::MapEntry { .. } => "map entry",
            NormalizedNode::UnkeyedList { .. } => "unkeyed list",
            NormalizedNode::UnkeyedEntry { .. } => "unkeyed list entry",
            NormalizedNode::Opaque { .. } => "anydata",
        }
    }

    /// Named children, for the node kinds that have them.
    pub fn children(&self) -> Option<&Children> {
        match self {
            NormalizedNode::Container { children, .. }
            | NormalizedNode::Choice { children, .. }
            | NormalizedNode::MapEntry { children, .. }
            | NormalizedNode::UnkeyedEntry { children, .. } => Some(children),
            _ => None,
        }
    }

    pub fn child(&self, name: &QName) -> Option<&Arc<NormalizedNode>> {
        self.children().and_then(|children| children.get(name))
    }

    /// Serializes the tree to CBOR.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| CodecError::Encoding(e.to_string()))?;
        Ok(buf)
    }

    /// Deserializes a tree from CBOR.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| CodecError::Encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(name: &str) -> QName {
        QName::new("urn:test", name)
    }

    #[test]
    fn decimal_display() {
        assert_eq!(Decimal64::new(12345, 2).to_string(), "123.45");
        assert_eq!(Decimal64::new(-5, 3).to_string(), "-0.005");
        assert_eq!(Decimal64::new(7, 0).to_string(), "7");
    }

    #[test]
    fn container_children_keep_insertion_order() {
        let node = NormalizedNode::container(
            q("top"),
            [
                NormalizedNode::leaf(q("b"), "x"),
                NormalizedNode::leaf(q("a"), "y"),
            ],
        );
        let names: Vec<_> = node
            .children()
            .unwrap()
            .keys()
            .map(|k| k.local_name().to_string())
            .collect();
        assert_eq!(names, ["b", "a"]);
        assert!(node.child(&q("a")).is_some());
        assert!(node.child(&q("c")).is_none());
    }

    #[test]
    fn map_entry_identifier() {
        let id = EntryIdentifier::new(q("list"), [(q("name"), Value::from("foo"))]);
        let entry = NormalizedNode::map_entry(id.clone(), [NormalizedNode::leaf(q("name"), "foo")]);
        assert_eq!(entry.name(), &q("list"));
        assert_eq!(entry.identifier(), PathArgument::Entry(id.clone()));
        assert_eq!(id.key(&q("name")), Some(&Value::from("foo")));

        let map = NormalizedNode::map(q("list"), [entry, NormalizedNode::leaf(q("stray"), "x")]);
        let NormalizedNode::Map { entries, .. } = &map else {
            panic!("expected map");
        };
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn path_display() {
        let path = NodePath::default()
            .node(q("top"))
            .node(q("list"))
            .entry(EntryIdentifier::new(q("list"), [(q("name"), Value::from("a"))]));
        assert_eq!(
            path.to_string(),
            "/(urn:test)top/(urn:test)list/(urn:test)list[name=String(\"a\")]"
        );
    }

    #[test]
    fn cbor_roundtrip() {
        let node = NormalizedNode::container(
            q("top"),
            [
                NormalizedNode::leaf(q("flag"), true),
                NormalizedNode::leaf_set(q("tags"), [Value::from("a"), Value::from("b")]),
                NormalizedNode::map(
                    q("list"),
                    [NormalizedNode::map_entry(
                        EntryIdentifier::new(q("list"), [(q("id"), Value::Int(IntValue::U32(7)))]),
                        [NormalizedNode::leaf(q("id"), IntValue::U32(7))],
                    )],
                ),
            ],
        );
        let bytes = node.to_cbor().unwrap();
        assert_eq!(NormalizedNode::from_cbor(&bytes).unwrap(), node);
    }

    #[test]
    fn cbor_rejects_garbage() {
        let err = NormalizedNode::from_cbor(&[0xff, 0x00]).unwrap_err();
        assert!(matches!(err, CodecError::Encoding(_)));
    }
}
