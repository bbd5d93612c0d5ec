//! Schema model consumed by the codec tree.
//!
//! Schema nodes live in an arena owned by [`SchemaContext`] and refer to their
//! children by [`SchemaNodeId`], so recursive schemas are plain back-edges.

use std::fmt;

use crate::binding::TypeName;
use crate::error::{CodecError, Result};
use crate::node::{QName, Value};

/// Integer type variants for the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
}

impl IntType {
    /// Inclusive value bounds of the type.
    pub fn bounds(&self) -> (i128, i128) {
        match self {
            IntType::U8 => (0, u8::MAX.into()),
            IntType::U16 => (0, u16::MAX.into()),
            IntType::U32 => (0, u32::MAX.into()),
            IntType::U64 => (0, u64::MAX.into()),
            IntType::I8 => (i8::MIN.into(), i8::MAX.into()),
            IntType::I16 => (i16::MIN.into(), i16::MAX.into()),
            IntType::I32 => (i32::MIN.into(), i32::MAX.into()),
            IntType::I64 => (i64::MIN.into(), i64::MAX.into()),
        }
    }
}

impl fmt::Display for IntType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntType::U8 => "uint8",
            IntType::U16 => "uint16",
            IntType::U32 => "uint32",
            IntType::U64 => "uint64",
            IntType::I8 => "int8",
            IntType::I16 => "int16",
            IntType::I32 => "int32",
            IntType::I64 => "int64",
        };
        f.write_str(name)
    }
}

/// One member of an enumeration type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumPair {
    pub name: String,
    pub value: i32,
}

/// Type of a leaf or leaf-list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDefinition {
    Boolean,
    /// Integer with an optional inclusive range restriction.
    Int {
        ty: IntType,
        range: Option<(i128, i128)>,
    },
    Decimal64 {
        fraction_digits: u8,
    },
    /// String with an optional inclusive length restriction, in characters.
    String {
        length: Option<(u64, u64)>,
    },
    Binary {
        length: Option<(u64, u64)>,
    },
    Empty,
    Enumeration(Vec<EnumPair>),
    Bits(Vec<String>),
    IdentityRef {
        base: QName,
    },
    InstanceIdentifier,
    /// Members are tried in declaration order.
    Union(Vec<TypeDefinition>),
    /// Reference to a leaf elsewhere; values use the target leaf's type.
    Leafref {
        target: Box<TypeDefinition>,
    },
    /// Named typedef with its own domain wrapper type.
    Derived {
        binding: TypeName,
        base: Box<TypeDefinition>,
    },
}

impl TypeDefinition {
    pub fn int(ty: IntType) -> Self {
        TypeDefinition::Int { ty, range: None }
    }

    pub fn string() -> Self {
        TypeDefinition::String { length: None }
    }

    pub fn binary() -> Self {
        TypeDefinition::Binary { length: None }
    }

    pub fn enumeration<'a>(pairs: impl IntoIterator<Item = (&'a str, i32)>) -> Self {
        TypeDefinition::Enumeration(
            pairs
                .into_iter()
                .map(|(name, value)| EnumPair {
                    name: name.to_string(),
                    value,
                })
                .collect(),
        )
    }

    pub fn bits<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        TypeDefinition::Bits(names.into_iter().map(str::to_string).collect())
    }

    pub fn derived(binding: TypeName, base: TypeDefinition) -> Self {
        TypeDefinition::Derived {
            binding,
            base: Box::new(base),
        }
    }

    pub fn leafref(target: TypeDefinition) -> Self {
        TypeDefinition::Leafref {
            target: Box::new(target),
        }
    }
}

/// Kind-specific part of a schema node.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    Container {
        presence: bool,
    },
    /// A list; an empty key makes it unkeyed.
    List {
        key: Vec<QName>,
        ordered: bool,
    },
    Leaf {
        ty: TypeDefinition,
        default: Option<Value>,
    },
    LeafList {
        ty: TypeDefinition,
        ordered: bool,
    },
    Choice,
    Case,
    Augmentation,
    Action,
    Input,
    Output,
    Anydata,
}

impl SchemaKind {
    pub fn name(&self) -> &'static str {
        match self {
            SchemaKind::Container { .. } => "container",
            SchemaKind::List { .. } => "list",
            SchemaKind::Leaf { .. } => "leaf",
            SchemaKind::LeafList { .. } => "leaf-list",
            SchemaKind::Choice => "choice",
            SchemaKind::Case => "case",
            SchemaKind::Augmentation => "augmentation",
            SchemaKind::Action => "action",
            SchemaKind::Input => "input",
            SchemaKind::Output => "output",
            SchemaKind::Anydata => "anydata",
        }
    }
}

/// Handle of a node in a [`SchemaContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaNodeId(u32);

impl SchemaNodeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// A schema statement and the domain type bound to it.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    qname: QName,
    kind: SchemaKind,
    children: Vec<SchemaNodeId>,
    binding: Option<TypeName>,
}

impl SchemaNode {
    pub fn new(qname: QName, kind: SchemaKind) -> Self {
        SchemaNode {
            qname,
            kind,
            children: Vec::new(),
            binding: None,
        }
    }

    pub fn container(qname: QName) -> Self {
        Self::new(qname, SchemaKind::Container { presence: false })
    }

    pub fn presence_container(qname: QName) -> Self {
        Self::new(qname, SchemaKind::Container { presence: true })
    }

    pub fn list(qname: QName, key: impl IntoIterator<Item = QName>) -> Self {
        Self::new(
            qname,
            SchemaKind::List {
                key: key.into_iter().collect(),
                ordered: false,
            },
        )
    }

    pub fn leaf(qname: QName, ty: TypeDefinition) -> Self {
        Self::new(qname, SchemaKind::Leaf { ty, default: None })
    }

    pub fn leaf_list(qname: QName, ty: TypeDefinition) -> Self {
        Self::new(qname, SchemaKind::LeafList { ty, ordered: false })
    }

    pub fn choice(qname: QName) -> Self {
        Self::new(qname, SchemaKind::Choice)
    }

    pub fn case(qname: QName) -> Self {
        Self::new(qname, SchemaKind::Case)
    }

    /// Augmentations have no name in the data tree; `qname` only labels
    /// the node in diagnostics.
    pub fn augmentation(qname: QName) -> Self {
        Self::new(qname, SchemaKind::Augmentation)
    }

    pub fn action(qname: QName) -> Self {
        Self::new(qname, SchemaKind::Action)
    }

    pub fn input(qname: QName) -> Self {
        Self::new(qname, SchemaKind::Input)
    }

    pub fn output(qname: QName) -> Self {
        Self::new(qname, SchemaKind::Output)
    }

    pub fn anydata(qname: QName) -> Self {
        Self::new(qname, SchemaKind::Anydata)
    }

    /// Binds the node to a domain type.
    pub fn with_binding(mut self, binding: TypeName) -> Self {
        self.binding = Some(binding);
        self
    }

    /// Sets the default of a leaf. Ignored for other kinds.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        if let SchemaKind::Leaf { default, .. } = &mut self.kind {
            *default = Some(value.into());
        }
        self
    }

    /// Marks a list or leaf-list as ordered by the user.
    pub fn ordered_by_user(mut self) -> Self {
        match &mut self.kind {
            SchemaKind::List { ordered, .. } | SchemaKind::LeafList { ordered, .. } => {
                *ordered = true;
            }
            _ => {}
        }
        self
    }

    pub fn qname(&self) -> &QName {
        &self.qname
    }

    pub fn kind(&self) -> &SchemaKind {
        &self.kind
    }

    pub fn children(&self) -> &[SchemaNodeId] {
        &self.children
    }

    pub fn binding(&self) -> Option<TypeName> {
        self.binding
    }

    /// Whether the node appears under its own name in the attribute tree.
    pub fn is_data_node(&self) -> bool {
        !matches!(
            self.kind,
            SchemaKind::Case | SchemaKind::Augmentation | SchemaKind::Action
        )
    }
}

/// Immutable, validated schema.
#[derive(Debug, Clone)]
pub struct SchemaContext {
    nodes: Vec<SchemaNode>,
    roots: Vec<SchemaNodeId>,
}

impl SchemaContext {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Returns the node behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was issued by a different schema.
    pub fn node(&self, id: SchemaNodeId) -> &SchemaNode {
        &self.nodes[id.index()]
    }

    pub fn get(&self, id: SchemaNodeId) -> Option<&SchemaNode> {
        self.nodes.get(id.index())
    }

    pub fn roots(&self) -> &[SchemaNodeId] {
        &self.roots
    }

    pub fn is_root(&self, id: SchemaNodeId) -> bool {
        self.roots.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SchemaNodeId, &SchemaNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (SchemaNodeId(i as u32), node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Finds a top-level node by name.
    pub fn root_child(&self, qname: &QName) -> Option<SchemaNodeId> {
        self.roots
            .iter()
            .copied()
            .find(|id| self.node(*id).qname() == qname)
    }

    /// Finds a direct schema child by name, whatever its kind.
    pub fn child(&self, parent: SchemaNodeId, qname: &QName) -> Option<SchemaNodeId> {
        self.node(parent)
            .children()
            .iter()
            .copied()
            .find(|id| self.node(*id).qname() == qname)
    }

    /// Finds the schema node that appears as `qname` directly under
    /// `parent` in the attribute tree, looking through augmentations.
    pub fn data_child(&self, parent: SchemaNodeId, qname: &QName) -> Option<SchemaNodeId> {
        for id in self.node(parent).children().iter().copied() {
            let node = self.node(id);
            match node.kind() {
                SchemaKind::Augmentation => {
                    if let Some(found) = self.data_child(id, qname) {
                        return Some(found);
                    }
                }
                _ if node.is_data_node() && node.qname() == qname => return Some(id),
                _ => {}
            }
        }
        None
    }
}

/// Incremental builder for [`SchemaContext`].
///
/// Nodes are appended to the arena as they are added; parent links are
/// validated by [`build`](Self::build).
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    nodes: Vec<SchemaNode>,
    roots: Vec<SchemaNodeId>,
    links: Vec<(SchemaNodeId, SchemaNodeId)>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, node: SchemaNode) -> SchemaNodeId {
        let id = SchemaNodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Adds a top-level node.
    pub fn root(&mut self, node: SchemaNode) -> SchemaNodeId {
        let id = self.push(node);
        self.roots.push(id);
        id
    }

    /// Adds a node under `parent`.
    pub fn child(&mut self, parent: SchemaNodeId, node: SchemaNode) -> SchemaNodeId {
        let id = self.push(node);
        self.links.push((parent, id));
        id
    }

    /// Adds an existing node under `parent` as well, forming a back-edge for
    /// recursive schemas.
    pub fn link(&mut self, parent: SchemaNodeId, child: SchemaNodeId) {
        self.links.push((parent, child));
    }

    pub fn build(mut self) -> Result<SchemaContext> {
        let len = self.nodes.len();
        for (parent, child) in std::mem::take(&mut self.links) {
            if parent.index() >= len || child.index() >= len {
                return Err(CodecError::Programming(format!(
                    "schema link {parent:?} -> {child:?} refers to an unknown node"
                )));
            }
            self.nodes[parent.index()].children.push(child);
        }
        let schema = SchemaContext {
            nodes: self.nodes,
            roots: self.roots,
        };
        for (_, node) in schema.iter() {
            if let SchemaKind::List { key, .. } = node.kind() {
                for leaf in key {
                    let found = node.children().iter().any(|id| {
                        let child = schema.node(*id);
                        child.qname() == leaf && matches!(child.kind(), SchemaKind::Leaf { .. })
                    });
                    if !found {
                        return Err(CodecError::Programming(format!(
                            "key leaf {leaf} of list {} is not defined",
                            node.qname()
                        )));
                    }
                }
            }
        }
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(name: &str) -> QName {
        QName::new("urn:test", name)
    }

    #[test]
    fn data_child_looks_through_augmentations() {
        let mut builder = SchemaContext::builder();
        let top = builder.root(SchemaNode::container(q("top")));
        builder.child(top, SchemaNode::leaf(q("plain"), TypeDefinition::string()));
        let aug = builder.child(top, SchemaNode::augmentation(q("top-aug")));
        let added = builder.child(aug, SchemaNode::leaf(q("added"), TypeDefinition::string()));
        let schema = builder.build().unwrap();

        assert_eq!(schema.root_child(&q("top")), Some(top));
        assert_eq!(schema.data_child(top, &q("added")), Some(added));
        assert_eq!(schema.child(top, &q("added")), None);
        assert_eq!(schema.data_child(top, &q("top-aug")), None);
    }

    #[test]
    fn recursive_schema_links_back() {
        let mut builder = SchemaContext::builder();
        let node = builder.root(SchemaNode::list(q("node"), []));
        builder.link(node, node);
        let schema = builder.build().unwrap();
        assert_eq!(schema.data_child(node, &q("node")), Some(node));
    }

    #[test]
    fn missing_key_leaf_is_rejected() {
        let mut builder = SchemaContext::builder();
        let list = builder.root(SchemaNode::list(q("list"), [q("name")]));
        builder.child(list, SchemaNode::leaf(q("other"), TypeDefinition::string()));
        assert!(matches!(builder.build(), Err(CodecError::Programming(_))));
    }

    #[test]
    fn dangling_link_is_rejected() {
        let mut builder = SchemaContext::builder();
        let top = builder.root(SchemaNode::container(q("top")));
        builder.link(top, SchemaNodeId(42));
        assert!(matches!(builder.build(), Err(CodecError::Programming(_))));
    }

    #[test]
    fn int_bounds() {
        assert_eq!(IntType::U8.bounds(), (0, 255));
        assert_eq!(IntType::I16.bounds(), (-32768, 32767));
        assert_eq!(IntType::U32.to_string(), "uint32");
    }
}
