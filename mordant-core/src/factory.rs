use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use log::{debug, trace};
use parking_lot::RwLock;

use crate::binding::TypeName;
use crate::context::{
    ActionCodecContext, AugmentationCodecContext, ChoiceCodecContext, DataObjectCodecContext,
    ListCodecContext, MapCodecContext, NodeCodecContext,
};
use crate::error::{CodecError, Result};
use crate::leaf::{LeafCodecContext, LeafListCodecContext, OpaqueCodecContext};
use crate::node::QName;
use crate::prototype::{Address, CodecPrototype, PrototypeId};
use crate::runtime::BindingRuntimeContext;
use crate::schema::{SchemaContext, SchemaKind, SchemaNodeId, TypeDefinition};
use crate::value_codec::{
    BitsCodec, BuiltInCodec, CompositeValueCodec, EnumerationCodec, IdentityCodec,
    InstanceIdentifierCodec, UnionCodec, ValueCodec,
};

type PrototypeKey = (SchemaNodeId, Option<TypeName>);

/// Owner of all prototypes and value codecs of one codec tree.
///
/// Prototypes live in an append-only arena and are identified by
/// [`PrototypeId`]. At most one prototype exists per schema node and domain
/// type; concurrent requests for the same pair agree on a single instance.
pub struct CodecContextFactory {
    runtime: Arc<BindingRuntimeContext>,
    prototypes: RwLock<Vec<Arc<CodecPrototype>>>,
    by_key: DashMap<PrototypeKey, PrototypeId>,
    value_codecs: DashMap<TypeDefinition, Arc<dyn ValueCodec>>,
    this: Weak<CodecContextFactory>,
}

impl CodecContextFactory {
    pub fn new(runtime: Arc<BindingRuntimeContext>) -> Arc<Self> {
        Arc::new_cyclic(|this| CodecContextFactory {
            runtime,
            prototypes: RwLock::new(Vec::new()),
            by_key: DashMap::new(),
            value_codecs: DashMap::new(),
            this: this.clone(),
        })
    }

    pub fn runtime(&self) -> &Arc<BindingRuntimeContext> {
        &self.runtime
    }

    pub fn schema(&self) -> &SchemaContext {
        self.runtime.schema()
    }

    /// Returns the prototype behind `id`, or `None` if `id` was issued by a
    /// different factory.
    pub fn prototype(&self, id: PrototypeId) -> Option<Arc<CodecPrototype>> {
        self.prototypes.read().get(id.index()).cloned()
    }

    /// Number of prototypes created so far.
    pub fn prototype_count(&self) -> usize {
        self.prototypes.read().len()
    }

    pub fn context(&self, id: PrototypeId) -> Result<Arc<NodeCodecContext>> {
        self.prototype(id)
            .ok_or_else(|| CodecError::IllegalArgument(format!("unknown prototype {id:?}")))?
            .context(self)
    }

    fn issued(&self, id: PrototypeId) -> Result<Arc<CodecPrototype>> {
        self.prototype(id)
            .ok_or_else(|| CodecError::IllegalState(format!("prototype {id:?} missing from arena")))
    }

    /// The prototype of the schema node a composite domain type is bound to.
    pub fn prototype_for_type(&self, binding: TypeName) -> Result<Arc<CodecPrototype>> {
        let schema = self.runtime.schema_for_type(binding).ok_or_else(|| {
            CodecError::SchemaMismatch(format!("{binding} is not bound to any schema node"))
        })?;
        self.prototype_for(schema, Some(binding))
    }

    pub fn context_for_type(&self, binding: TypeName) -> Result<Arc<NodeCodecContext>> {
        self.prototype_for_type(binding)?.context(self)
    }

    /// The prototype of a top-level schema node.
    pub fn root_prototype(&self, qname: &QName) -> Result<Arc<CodecPrototype>> {
        let schema = self.schema().root_child(qname).ok_or_else(|| {
            CodecError::IncorrectNesting(format!("{qname} is not a valid top-level node"))
        })?;
        self.prototype_for(schema, self.schema().node(schema).binding())
    }

    /// Returns the prototype for a schema node and domain type, creating it
    /// on first request.
    pub(crate) fn prototype_for(
        &self,
        schema: SchemaNodeId,
        binding: Option<TypeName>,
    ) -> Result<Arc<CodecPrototype>> {
        let key = (schema, binding);
        if let Some(id) = self.by_key.get(&key).map(|entry| *entry) {
            return self.issued(id);
        }
        let address = self.address_of(schema)?;
        self.check_key_accessor(schema, binding)?;
        let id = *self.by_key.entry(key).or_insert_with(|| {
            let mut arena = self.prototypes.write();
            let id = PrototypeId(arena.len() as u32);
            arena.push(Arc::new(CodecPrototype::new(id, schema, binding, address)));
            debug!(
                "created prototype {id:?} for {} ({})",
                self.schema().node(schema).qname(),
                binding.unwrap_or("<unbound>")
            );
            id
        });
        self.issued(id)
    }

    /// A keyed list needs a domain type that can report its key.
    fn check_key_accessor(&self, id: SchemaNodeId, binding: Option<TypeName>) -> Result<()> {
        let node = self.schema().node(id);
        let SchemaKind::List { key, .. } = node.kind() else {
            return Ok(());
        };
        let Some(ty) = binding.and_then(|name| self.runtime.binding_type(name)) else {
            return Ok(());
        };
        if !key.is_empty() && ty.key().is_none() {
            return Err(CodecError::Programming(format!(
                "domain type {} has no key accessor, required by keyed list {}",
                ty.name(),
                node.qname()
            )));
        }
        Ok(())
    }

    fn address_of(&self, id: SchemaNodeId) -> Result<Address> {
        let node = self.schema().node(id);
        if !matches!(node.kind(), SchemaKind::Augmentation) {
            return Ok(Address::Node(node.qname().clone()));
        }
        let mut names = Vec::new();
        self.collect_data_names(id, &mut names);
        if names.is_empty() {
            return Err(CodecError::Programming(format!(
                "augmentation {} contributes no data nodes",
                node.qname()
            )));
        }
        Ok(Address::Augmentation(names))
    }

    /// Names that nodes under `id` contribute to the attribute tree at this
    /// level, looking through augmentations.
    pub(crate) fn collect_data_names(&self, id: SchemaNodeId, names: &mut Vec<QName>) {
        for child in self.schema().node(id).children().iter().copied() {
            let node = self.schema().node(child);
            if matches!(node.kind(), SchemaKind::Augmentation) {
                self.collect_data_names(child, names);
            } else if node.is_data_node() {
                names.push(node.qname().clone());
            }
        }
    }

    /// Constructs the full context of a prototype.
    pub(crate) fn build_context(&self, prototype: &CodecPrototype) -> Result<Arc<NodeCodecContext>> {
        let node = self.schema().node(prototype.schema());
        let context = match node.kind() {
            SchemaKind::Container { .. } | SchemaKind::Input | SchemaKind::Output => {
                NodeCodecContext::Container(DataObjectCodecContext::new(self, prototype)?)
            }
            SchemaKind::Case => NodeCodecContext::Case(DataObjectCodecContext::new(self, prototype)?),
            SchemaKind::List { key, .. } if key.is_empty() => {
                NodeCodecContext::List(ListCodecContext::new(self, prototype)?)
            }
            SchemaKind::List { .. } => {
                NodeCodecContext::KeyedList(MapCodecContext::new(self, prototype)?)
            }
            SchemaKind::Choice => NodeCodecContext::Choice(ChoiceCodecContext::new(self, prototype)?),
            SchemaKind::Augmentation => {
                NodeCodecContext::Augmentation(AugmentationCodecContext::new(self, prototype)?)
            }
            SchemaKind::Leaf { .. } => NodeCodecContext::Leaf(LeafCodecContext::new(self, prototype)?),
            SchemaKind::LeafList { .. } => {
                NodeCodecContext::LeafList(LeafListCodecContext::new(self, prototype)?)
            }
            SchemaKind::Anydata => NodeCodecContext::Opaque(OpaqueCodecContext::new(self, prototype)?),
            SchemaKind::Action => NodeCodecContext::Action(ActionCodecContext::new(self, prototype)?),
        };
        debug!(
            "built {} context for {} ({:?})",
            node.kind().name(),
            node.qname(),
            prototype.id()
        );
        Ok(Arc::new(context))
    }

    /// Returns the value codec for a leaf type, memoized per type definition.
    pub fn value_codec_for(&self, ty: &TypeDefinition) -> Result<Arc<dyn ValueCodec>> {
        if let Some(codec) = self.value_codecs.get(ty).map(|entry| entry.clone()) {
            trace!("value codec hit for {ty:?}");
            return Ok(codec);
        }
        // Built outside the map lock: member codecs recurse into this method.
        let codec = self.create_value_codec(ty)?;
        Ok(self.value_codecs.entry(ty.clone()).or_insert(codec).clone())
    }

    fn create_value_codec(&self, ty: &TypeDefinition) -> Result<Arc<dyn ValueCodec>> {
        Ok(match ty {
            TypeDefinition::Boolean => Arc::new(BuiltInCodec::Boolean),
            TypeDefinition::Int { ty, range } => Arc::new(BuiltInCodec::Int {
                ty: *ty,
                range: *range,
            }),
            TypeDefinition::Decimal64 { fraction_digits } => Arc::new(BuiltInCodec::Decimal64 {
                fraction_digits: *fraction_digits,
            }),
            TypeDefinition::String { length } => Arc::new(BuiltInCodec::String { length: *length }),
            TypeDefinition::Binary { length } => Arc::new(BuiltInCodec::Binary { length: *length }),
            TypeDefinition::Empty => Arc::new(BuiltInCodec::Empty),
            TypeDefinition::Enumeration(pairs) => Arc::new(EnumerationCodec::new(pairs.clone())),
            TypeDefinition::Bits(names) => Arc::new(BitsCodec::new(names.clone())),
            TypeDefinition::IdentityRef { base } => Arc::new(IdentityCodec::new(
                self.runtime.clone(),
                Some(base.clone()),
            )),
            TypeDefinition::InstanceIdentifier => {
                Arc::new(InstanceIdentifierCodec::new(self.this.clone()))
            }
            TypeDefinition::Union(members) => Arc::new(UnionCodec::new(
                members
                    .iter()
                    .map(|member| self.value_codec_for(member))
                    .collect::<Result<_>>()?,
            )),
            TypeDefinition::Leafref { target } => self.value_codec_for(target)?,
            TypeDefinition::Derived { binding, base } => {
                Arc::new(CompositeValueCodec::new(*binding, self.value_codec_for(base)?))
            }
        })
    }
}

impl fmt::Debug for CodecContextFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecContextFactory")
            .field("prototypes", &self.prototype_count())
            .field("value_codecs", &self.value_codecs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, q};
    use std::thread;

    #[test]
    fn prototypes_are_unique_per_node_and_type() {
        let factory = CodecContextFactory::new(testing::runtime());
        let first = factory.prototype_for_type("Top").unwrap();
        let second = factory.prototype_for_type("Top").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let root = factory.root_prototype(&q("top")).unwrap();
        assert!(Arc::ptr_eq(&first, &root));
    }

    #[test]
    fn foreign_prototype_ids_are_rejected() {
        let other = CodecContextFactory::new(testing::runtime());
        let id = other.prototype_for_type("Top").unwrap().id();

        let factory = CodecContextFactory::new(testing::runtime());
        assert!(factory.prototype(id).is_none());
        assert!(matches!(
            factory.context(id),
            Err(CodecError::IllegalArgument(_))
        ));
    }

    #[test]
    fn context_is_memoized() {
        let factory = CodecContextFactory::new(testing::runtime());
        let prototype = factory.prototype_for_type("Top").unwrap();
        assert!(!prototype.is_built());
        let a = prototype.context(&factory).unwrap();
        let b = factory.context_for_type("Top").unwrap();
        assert!(prototype.is_built());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn construction_resolves_only_direct_children() {
        let factory = CodecContextFactory::new(testing::runtime());
        factory.context_for_type("Top").unwrap();
        let list = factory.prototype_for_type("TopList").unwrap();
        assert!(!list.is_built());
    }

    #[test]
    fn concurrent_first_access_agrees() {
        let factory = CodecContextFactory::new(testing::runtime());
        let contexts: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| factory.context_for_type("TopList").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for context in &contexts[1..] {
            assert!(Arc::ptr_eq(&contexts[0], context));
        }
    }

    #[test]
    fn unknown_type_is_a_schema_mismatch() {
        let factory = CodecContextFactory::new(testing::runtime());
        assert!(matches!(
            factory.prototype_for_type("Nope"),
            Err(CodecError::SchemaMismatch(_))
        ));
        assert!(matches!(
            factory.root_prototype(&q("nope")),
            Err(CodecError::IncorrectNesting(_))
        ));
    }

    #[test]
    fn value_codecs_are_memoized() {
        let factory = CodecContextFactory::new(testing::runtime());
        let a = factory.value_codec_for(&TypeDefinition::string()).unwrap();
        let b = factory.value_codec_for(&TypeDefinition::string()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
