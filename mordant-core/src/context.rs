//! Codec contexts: the per-node state that drives transcoding.
//!
//! A context is built from its prototype on first use. Building it resolves
//! the prototypes of the node's direct children but never their contexts,
//! so recursive schemas terminate and unused subtrees cost nothing.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use log::warn;

use crate::binding::{BindingKey, BindingType, TypeName, property_name};
use crate::error::{CodecError, Result};
use crate::factory::CodecContextFactory;
use crate::leaf::{LeafCodecContext, LeafListCodecContext, OpaqueCodecContext};
use crate::node::{Children, EntryIdentifier, QName};
use crate::prototype::{CodecPrototype, PrototypeId};
use crate::schema::{SchemaKind, SchemaNodeId};
use crate::value_codec::ValueCodec;

/// Codec context of one schema node.
#[derive(Debug)]
pub enum NodeCodecContext {
    /// Container, action input or action output.
    Container(DataObjectCodecContext),
    Case(DataObjectCodecContext),
    List(ListCodecContext),
    KeyedList(MapCodecContext),
    Choice(ChoiceCodecContext),
    Augmentation(AugmentationCodecContext),
    Leaf(LeafCodecContext),
    LeafList(LeafListCodecContext),
    Opaque(OpaqueCodecContext),
    Action(ActionCodecContext),
}

/// A child context reached by name, and the augmentation it was reached
/// through, if any.
pub(crate) struct ResolvedChild {
    pub(crate) augmentation: Option<Arc<NodeCodecContext>>,
    pub(crate) context: Arc<NodeCodecContext>,
}

impl NodeCodecContext {
    pub fn kind(&self) -> &'static str {
        match self {
            NodeCodecContext::Container(_) => "container",
            NodeCodecContext::Case(_) => "case",
            NodeCodecContext::List(_) => "list",
            NodeCodecContext::KeyedList(_) => "keyed list",
            NodeCodecContext::Choice(_) => "choice",
            NodeCodecContext::Augmentation(_) => "augmentation",
            NodeCodecContext::Leaf(_) => "leaf",
            NodeCodecContext::LeafList(_) => "leaf-list",
            NodeCodecContext::Opaque(_) => "anydata",
            NodeCodecContext::Action(_) => "action",
        }
    }

    /// The node's name in the attribute tree.
    ///
    /// Fails with a programming error for augmentations, which have none.
    pub fn qname(&self) -> Result<&QName> {
        match self {
            NodeCodecContext::Container(data) | NodeCodecContext::Case(data) => Ok(data.qname()),
            NodeCodecContext::List(list) => Ok(list.entry().qname()),
            NodeCodecContext::KeyedList(map) => Ok(map.entry().qname()),
            NodeCodecContext::Choice(choice) => Ok(choice.qname()),
            NodeCodecContext::Augmentation(aug) => Err(CodecError::Programming(format!(
                "augmentation {} has no name of its own",
                aug.data().binding().name()
            ))),
            NodeCodecContext::Leaf(leaf) => Ok(leaf.qname()),
            NodeCodecContext::LeafList(leaf_list) => Ok(leaf_list.qname()),
            NodeCodecContext::Opaque(opaque) => Ok(opaque.qname()),
            NodeCodecContext::Action(action) => Ok(action.qname()),
        }
    }

    /// The domain type of the node, if it has one.
    pub fn binding(&self) -> Option<TypeName> {
        match self {
            NodeCodecContext::Choice(choice) => choice.binding(),
            NodeCodecContext::Opaque(opaque) => Some(opaque.binding()),
            NodeCodecContext::Action(action) => Some(action.binding()),
            other => other.data_object().map(|data| data.binding().name()),
        }
    }

    /// The data object part of the context: the object itself for
    /// containers, cases and augmentations, the entry for lists.
    pub fn data_object(&self) -> Option<&DataObjectCodecContext> {
        match self {
            NodeCodecContext::Container(data) | NodeCodecContext::Case(data) => Some(data),
            NodeCodecContext::List(list) => Some(list.entry()),
            NodeCodecContext::KeyedList(map) => Some(map.entry()),
            NodeCodecContext::Augmentation(aug) => Some(aug.data()),
            _ => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, NodeCodecContext::List(_) | NodeCodecContext::KeyedList(_))
    }

    /// Name for diagnostics, which works for augmentations too.
    pub(crate) fn describe(&self) -> String {
        match self.qname() {
            Ok(qname) => format!("{} {qname}", self.kind()),
            Err(_) => format!("{} {}", self.kind(), self.binding().unwrap_or("<unbound>")),
        }
    }

    /// Looks up the child that appears as `qname` under this node in the
    /// attribute tree.
    pub fn child(&self, factory: &CodecContextFactory, qname: &QName) -> Result<Arc<NodeCodecContext>> {
        Ok(self.resolve_child(factory, qname)?.context)
    }

    pub(crate) fn resolve_child(
        &self,
        factory: &CodecContextFactory,
        qname: &QName,
    ) -> Result<ResolvedChild> {
        match self {
            NodeCodecContext::Choice(choice) => {
                let case = choice.case_for_child(qname).ok_or_else(|| {
                    CodecError::IncorrectNesting(format!(
                        "{qname} is not a valid child of choice {}",
                        choice.qname()
                    ))
                })?;
                factory.context(case)?.resolve_child(factory, qname)
            }
            other => match other.data_object() {
                Some(data) => data.resolve_child(factory, qname),
                None => Err(CodecError::IllegalArgument(format!(
                    "{} has no children, cannot look up {qname}",
                    other.describe()
                ))),
            },
        }
    }
}

/// A data child of a data object: its prototype and the property carrying it.
#[derive(Debug, Clone)]
pub(crate) struct ChildSlot {
    pub(crate) prototype: PrototypeId,
    pub(crate) property: String,
}

/// Shared part of every context backed by a domain data object.
#[derive(Debug)]
pub struct DataObjectCodecContext {
    prototype: PrototypeId,
    schema: SchemaNodeId,
    qname: QName,
    binding: &'static BindingType,
    children: IndexMap<QName, ChildSlot>,
    by_property: HashMap<String, usize>,
    by_type: HashMap<TypeName, PrototypeId>,
    choices: Vec<PrototypeId>,
    augmentations: Vec<PrototypeId>,
    augment_by_qname: HashMap<QName, PrototypeId>,
    augment_by_type: HashMap<TypeName, PrototypeId>,
}

impl DataObjectCodecContext {
    pub(crate) fn new(factory: &CodecContextFactory, prototype: &CodecPrototype) -> Result<Self> {
        let schema = factory.schema();
        let node = schema.node(prototype.schema());
        let binding_name = prototype.binding().ok_or_else(|| {
            CodecError::SchemaMismatch(format!(
                "{} {} has no domain type",
                node.kind().name(),
                node.qname()
            ))
        })?;
        let binding = factory.runtime().binding_type(binding_name).ok_or_else(|| {
            CodecError::SchemaMismatch(format!("domain type {binding_name} is not registered"))
        })?;

        let mut context = DataObjectCodecContext {
            prototype: prototype.id(),
            schema: prototype.schema(),
            qname: node.qname().clone(),
            binding,
            children: IndexMap::new(),
            by_property: HashMap::new(),
            by_type: HashMap::new(),
            choices: Vec::new(),
            augmentations: Vec::new(),
            augment_by_qname: HashMap::new(),
            augment_by_type: HashMap::new(),
        };

        for child_id in node.children().iter().copied() {
            let child = schema.node(child_id);
            match child.kind() {
                SchemaKind::Augmentation => {
                    let aug_binding = child.binding().ok_or_else(|| {
                        CodecError::SchemaMismatch(format!(
                            "augmentation {} has no domain type",
                            child.qname()
                        ))
                    })?;
                    let aug = factory.prototype_for(child_id, Some(aug_binding))?;
                    for name in aug.child_names() {
                        context.augment_by_qname.insert(name.clone(), aug.id());
                    }
                    context.augment_by_type.insert(aug_binding, aug.id());
                    context.augmentations.push(aug.id());
                }
                SchemaKind::Action => {}
                SchemaKind::Case => {
                    return Err(CodecError::Programming(format!(
                        "case {} appears outside of a choice",
                        child.qname()
                    )));
                }
                kind => {
                    let property = property_name(child.qname());
                    if !binding.properties().contains(&property.as_str()) {
                        return Err(CodecError::SchemaMismatch(format!(
                            "domain type {} has no property {property} for {}",
                            binding.name(),
                            child.qname()
                        )));
                    }
                    let slot = factory.prototype_for(child_id, child.binding())?;
                    match (kind, child.binding()) {
                        (SchemaKind::Choice, _) => context.choices.push(slot.id()),
                        (SchemaKind::Container { .. } | SchemaKind::List { .. }, Some(ty)) => {
                            context.by_type.insert(ty, slot.id());
                        }
                        _ => {}
                    }
                    context
                        .by_property
                        .insert(property.clone(), context.children.len());
                    context.children.insert(
                        child.qname().clone(),
                        ChildSlot {
                            prototype: slot.id(),
                            property,
                        },
                    );
                }
            }
        }
        Ok(context)
    }

    pub fn prototype(&self) -> PrototypeId {
        self.prototype
    }

    pub fn schema(&self) -> SchemaNodeId {
        self.schema
    }

    pub fn qname(&self) -> &QName {
        &self.qname
    }

    pub fn binding(&self) -> &'static BindingType {
        self.binding
    }

    /// Names of the data children, in schema order.
    pub fn child_names(&self) -> impl Iterator<Item = &QName> {
        self.children.keys()
    }

    pub(crate) fn children(&self) -> &IndexMap<QName, ChildSlot> {
        &self.children
    }

    pub(crate) fn property_index(&self, property: &str) -> Option<usize> {
        self.by_property.get(property).copied()
    }

    pub(crate) fn augmentations(&self) -> &[PrototypeId] {
        &self.augmentations
    }

    pub(crate) fn augmentation_for_type(&self, binding: TypeName) -> Option<PrototypeId> {
        self.augment_by_type.get(binding).copied()
    }

    pub(crate) fn child_by_type(&self, binding: TypeName) -> Option<PrototypeId> {
        self.by_type.get(binding).copied()
    }

    pub(crate) fn choices(&self) -> &[PrototypeId] {
        &self.choices
    }

    fn resolve_child(&self, factory: &CodecContextFactory, qname: &QName) -> Result<ResolvedChild> {
        if let Some(slot) = self.children.get(qname) {
            return Ok(ResolvedChild {
                augmentation: None,
                context: factory.context(slot.prototype)?,
            });
        }
        if let Some(aug) = self.augment_by_qname.get(qname) {
            let augmentation = factory.context(*aug)?;
            let context = augmentation.child(factory, qname)?;
            return Ok(ResolvedChild {
                augmentation: Some(augmentation),
                context,
            });
        }
        Err(CodecError::IncorrectNesting(format!(
            "{qname} is not a valid child of {}",
            self.qname
        )))
    }
}

/// Unkeyed list.
#[derive(Debug)]
pub struct ListCodecContext {
    entry: DataObjectCodecContext,
}

impl ListCodecContext {
    pub(crate) fn new(factory: &CodecContextFactory, prototype: &CodecPrototype) -> Result<Self> {
        Ok(ListCodecContext {
            entry: DataObjectCodecContext::new(factory, prototype)?,
        })
    }

    pub fn entry(&self) -> &DataObjectCodecContext {
        &self.entry
    }
}

/// Converts between domain keys and entry predicates.
#[derive(Debug)]
pub struct KeyCodec {
    leaves: Vec<(QName, Arc<dyn ValueCodec>)>,
}

impl KeyCodec {
    pub fn entry_identifier(&self, list: &QName, key: &BindingKey) -> Result<EntryIdentifier> {
        if key.values().len() != self.leaves.len() {
            return Err(CodecError::InvalidValue(format!(
                "key of {list} has {} components, expected {}",
                key.values().len(),
                self.leaves.len()
            )));
        }
        let predicates = self
            .leaves
            .iter()
            .zip(key.values())
            .map(|((qname, codec), value)| Ok((qname.clone(), codec.serialize(value)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(EntryIdentifier::new(list.clone(), predicates))
    }

    pub fn binding_key(&self, id: &EntryIdentifier) -> Result<BindingKey> {
        let values = self
            .leaves
            .iter()
            .map(|(qname, codec)| {
                let value = id.key(qname).ok_or_else(|| {
                    CodecError::IncorrectNesting(format!(
                        "entry of {} lacks key leaf {qname}",
                        id.name()
                    ))
                })?;
                codec.deserialize(value)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(BindingKey::new(values))
    }
}

/// Keyed list.
#[derive(Debug)]
pub struct MapCodecContext {
    entry: DataObjectCodecContext,
    ordered: bool,
    key: KeyCodec,
}

impl MapCodecContext {
    pub(crate) fn new(factory: &CodecContextFactory, prototype: &CodecPrototype) -> Result<Self> {
        let schema = factory.schema();
        let node = schema.node(prototype.schema());
        let SchemaKind::List { key, ordered } = node.kind() else {
            return Err(CodecError::Programming(format!(
                "{} is not a list",
                node.qname()
            )));
        };
        let entry = DataObjectCodecContext::new(factory, prototype)?;
        let binding_key = entry.binding().key().ok_or_else(|| {
            CodecError::Programming(format!(
                "domain type {} has no key accessor, required by keyed list {}",
                entry.binding().name(),
                node.qname()
            ))
        })?;
        let schema_key: Vec<String> = key.iter().map(property_name).collect();
        if schema_key.iter().map(String::as_str).ne(binding_key.iter().copied()) {
            return Err(CodecError::Programming(format!(
                "key {binding_key:?} of {} does not match list {} key {schema_key:?}",
                entry.binding().name(),
                node.qname()
            )));
        }

        let mut leaves = Vec::with_capacity(key.len());
        for qname in key {
            let ty = schema
                .child(prototype.schema(), qname)
                .and_then(|id| match schema.node(id).kind() {
                    SchemaKind::Leaf { ty, .. } => Some(ty),
                    _ => None,
                })
                .ok_or_else(|| {
                    CodecError::Programming(format!(
                        "key leaf {qname} of {} is not defined",
                        node.qname()
                    ))
                })?;
            leaves.push((qname.clone(), factory.value_codec_for(ty)?));
        }

        Ok(MapCodecContext {
            entry,
            ordered: *ordered,
            key: KeyCodec { leaves },
        })
    }

    pub fn entry(&self) -> &DataObjectCodecContext {
        &self.entry
    }

    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    pub fn key(&self) -> &KeyCodec {
        &self.key
    }
}

/// Choice: selects a case by the names present in the attribute tree.
#[derive(Debug)]
pub struct ChoiceCodecContext {
    qname: QName,
    binding: Option<TypeName>,
    cases: IndexMap<TypeName, PrototypeId>,
    by_child: HashMap<QName, PrototypeId>,
}

impl ChoiceCodecContext {
    pub(crate) fn new(factory: &CodecContextFactory, prototype: &CodecPrototype) -> Result<Self> {
        let schema = factory.schema();
        let node = schema.node(prototype.schema());
        let mut cases = IndexMap::new();
        let mut by_child: HashMap<QName, PrototypeId> = HashMap::new();

        for case_id in node.children().iter().copied() {
            let case = schema.node(case_id);
            if !matches!(case.kind(), SchemaKind::Case) {
                return Err(CodecError::Programming(format!(
                    "{} {} appears directly under choice {}",
                    case.kind().name(),
                    case.qname(),
                    node.qname()
                )));
            }
            let binding = case.binding().ok_or_else(|| {
                CodecError::SchemaMismatch(format!("case {} has no domain type", case.qname()))
            })?;
            let case_prototype = factory.prototype_for(case_id, Some(binding))?;
            cases.insert(binding, case_prototype.id());

            let mut names = Vec::new();
            factory.collect_data_names(case_id, &mut names);
            for name in names {
                if let Some(previous) = by_child.insert(name.clone(), case_prototype.id()) {
                    if previous != case_prototype.id() {
                        return Err(CodecError::Programming(format!(
                            "{name} is claimed by more than one case of choice {}",
                            node.qname()
                        )));
                    }
                }
            }
        }

        Ok(ChoiceCodecContext {
            qname: node.qname().clone(),
            binding: prototype.binding(),
            cases,
            by_child,
        })
    }

    pub fn qname(&self) -> &QName {
        &self.qname
    }

    pub fn binding(&self) -> Option<TypeName> {
        self.binding
    }

    pub fn cases(&self) -> impl Iterator<Item = PrototypeId> + '_ {
        self.cases.values().copied()
    }

    pub fn case_for_type(&self, binding: TypeName) -> Option<PrototypeId> {
        self.cases.get(binding).copied()
    }

    pub fn case_for_child(&self, qname: &QName) -> Option<PrototypeId> {
        self.by_child.get(qname).copied()
    }

    /// Picks the case owning the children of a choice node.
    ///
    /// An empty node selects nothing. Unknown names are skipped; names of
    /// two different cases, or no known name at all, are rejected.
    pub fn select_case(&self, children: &Children) -> Result<Option<PrototypeId>> {
        if children.is_empty() {
            return Ok(None);
        }
        let mut selected: Option<(PrototypeId, &QName)> = None;
        for name in children.keys() {
            let Some(case) = self.by_child.get(name).copied() else {
                warn!("ignoring unknown child {name} of choice {}", self.qname);
                continue;
            };
            match selected {
                None => selected = Some((case, name)),
                Some((previous, previous_name)) if previous != case => {
                    return Err(CodecError::IncorrectNesting(format!(
                        "{previous_name} and {name} belong to different cases of choice {}",
                        self.qname
                    )));
                }
                Some(_) => {}
            }
        }
        match selected {
            Some((case, _)) => Ok(Some(case)),
            None => Err(CodecError::IncorrectNesting(format!(
                "no case of choice {} matches its children",
                self.qname
            ))),
        }
    }
}

/// Augmentation: a data object whose members are spliced into its parent.
#[derive(Debug)]
pub struct AugmentationCodecContext {
    inner: DataObjectCodecContext,
    child_names: Vec<QName>,
}

impl AugmentationCodecContext {
    pub(crate) fn new(factory: &CodecContextFactory, prototype: &CodecPrototype) -> Result<Self> {
        Ok(AugmentationCodecContext {
            inner: DataObjectCodecContext::new(factory, prototype)?,
            child_names: prototype.child_names().to_vec(),
        })
    }

    pub fn data(&self) -> &DataObjectCodecContext {
        &self.inner
    }

    /// Names the augmentation contributes to its parent.
    pub fn child_names(&self) -> &[QName] {
        &self.child_names
    }

    /// Whether any contributed name is present among `children`.
    pub fn is_present(&self, children: &Children) -> bool {
        self.child_names.iter().any(|name| children.contains_key(name))
    }
}

/// Action with its input and output containers.
#[derive(Debug)]
pub struct ActionCodecContext {
    qname: QName,
    binding: TypeName,
    input: PrototypeId,
    output: PrototypeId,
}

impl ActionCodecContext {
    pub(crate) fn new(factory: &CodecContextFactory, prototype: &CodecPrototype) -> Result<Self> {
        let schema = factory.schema();
        let node = schema.node(prototype.schema());
        let binding = prototype.binding().ok_or_else(|| {
            CodecError::SchemaMismatch(format!("action {} has no domain type", node.qname()))
        })?;
        let find = |want: fn(&SchemaKind) -> bool, what: &str| -> Result<PrototypeId> {
            let id = node
                .children()
                .iter()
                .copied()
                .find(|id| want(schema.node(*id).kind()))
                .ok_or_else(|| {
                    CodecError::SchemaMismatch(format!("action {} has no {what}", node.qname()))
                })?;
            Ok(factory.prototype_for(id, schema.node(id).binding())?.id())
        };
        Ok(ActionCodecContext {
            qname: node.qname().clone(),
            binding,
            input: find(|kind| matches!(kind, SchemaKind::Input), "input")?,
            output: find(|kind| matches!(kind, SchemaKind::Output), "output")?,
        })
    }

    pub fn qname(&self) -> &QName {
        &self.qname
    }

    pub fn binding(&self) -> TypeName {
        self.binding
    }

    pub fn input(&self, factory: &CodecContextFactory) -> Result<Arc<NodeCodecContext>> {
        factory.context(self.input)
    }

    pub fn output(&self, factory: &CodecContextFactory) -> Result<Arc<NodeCodecContext>> {
        factory.context(self.output)
    }
}
