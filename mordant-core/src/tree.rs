//! Public entry point: the codec tree of one runtime context.

use std::sync::Arc;

use crate::binding::{BindingPath, DataObject, DomainValue, TypeName};
use crate::cache::CachingCodec;
use crate::context::{ActionCodecContext, NodeCodecContext};
use crate::error::{CodecError, Result};
use crate::factory::CodecContextFactory;
use crate::lazy::decode;
use crate::node::{NodePath, NormalizedNode, QName};
use crate::runtime::BindingRuntimeContext;
use crate::serializer::{DataObjectSerializer, StreamContext};
use crate::stream::{NormalizedNodeBuilder, NormalizedNodeStreamWriter};

/// Codec tree bound to a [`BindingRuntimeContext`].
///
/// Cheap to clone; clones share every prototype, context and value codec.
/// Contexts are built on first use and live as long as the tree.
#[derive(Debug, Clone)]
pub struct BindingCodecTree {
    factory: Arc<CodecContextFactory>,
}

impl BindingCodecTree {
    pub fn new(runtime: BindingRuntimeContext) -> Self {
        Self::with_runtime(Arc::new(runtime))
    }

    pub fn with_runtime(runtime: Arc<BindingRuntimeContext>) -> Self {
        BindingCodecTree {
            factory: CodecContextFactory::new(runtime),
        }
    }

    pub fn factory(&self) -> &Arc<CodecContextFactory> {
        &self.factory
    }

    pub fn runtime(&self) -> &Arc<BindingRuntimeContext> {
        self.factory.runtime()
    }

    fn node(&self, context: Arc<NodeCodecContext>) -> CodecTreeNode {
        CodecTreeNode {
            factory: self.factory.clone(),
            context,
        }
    }

    /// The context of the schema node a domain type is bound to.
    pub fn context_for_type(&self, binding: TypeName) -> Result<CodecTreeNode> {
        Ok(self.node(self.factory.context_for_type(binding)?))
    }

    /// The context responsible for the subtree at `path`.
    pub fn context_for_path(&self, path: &NodePath) -> Result<CodecTreeNode> {
        Ok(self.node(self.factory.context_for_path(path)?))
    }

    pub fn streaming_serializer_for(&self, binding: TypeName) -> Result<DataObjectSerializer> {
        let context = self.factory.context_for_type(binding)?;
        Ok(DataObjectSerializer::new(self.factory.clone(), context))
    }

    /// A codec for `binding` that caches the encodings of `cached` types.
    pub fn caching_codec_for(
        &self,
        binding: TypeName,
        cached: impl IntoIterator<Item = TypeName>,
    ) -> Result<CachingCodec> {
        let context = self.factory.context_for_type(binding)?;
        Ok(CachingCodec::new(self.factory.clone(), context, cached))
    }

    pub fn action_codec(&self, binding: TypeName) -> Result<ActionCodec> {
        let context = self.factory.context_for_type(binding)?;
        if !matches!(context.as_ref(), NodeCodecContext::Action(_)) {
            return Err(CodecError::IllegalArgument(format!(
                "{binding} is bound to {}, not an action",
                context.describe()
            )));
        }
        Ok(ActionCodec {
            factory: self.factory.clone(),
            context,
        })
    }

    /// Serializes an object that has a node of its own. Case and
    /// augmentation objects are rejected; see
    /// [`to_normalized_augmentation`](Self::to_normalized_augmentation).
    pub fn to_normalized_node(&self, object: &dyn DataObject) -> Result<Arc<NormalizedNode>> {
        let binding = object.binding_type().name();
        let context = self.factory.context_for_type(binding)?;
        match context.as_ref() {
            NodeCodecContext::Container(_)
            | NodeCodecContext::List(_)
            | NodeCodecContext::KeyedList(_) => {
                DataObjectSerializer::new(self.factory.clone(), context).to_normalized_node(object)
            }
            other => Err(CodecError::IllegalArgument(format!(
                "{binding} is a {}, it has no node of its own",
                other.kind()
            ))),
        }
    }

    /// Decodes the node found at `path`.
    pub fn from_normalized_node(
        &self,
        path: &NodePath,
        node: &Arc<NormalizedNode>,
    ) -> Result<Option<DomainValue>> {
        let context = self.factory.context_for_path(path)?;
        decode(&self.factory, &context, node)
    }

    /// Serializes an augmentation object into the nodes it contributes to
    /// its parent.
    pub fn to_normalized_augmentation(
        &self,
        augmentation: &dyn DataObject,
    ) -> Result<Vec<Arc<NormalizedNode>>> {
        let binding = augmentation.binding_type().name();
        let context = self.factory.context_for_type(binding)?;
        let NodeCodecContext::Augmentation(_) = context.as_ref() else {
            return Err(CodecError::IllegalArgument(format!(
                "{binding} is a {}, not an augmentation",
                context.kind()
            )));
        };
        let mut builder = NormalizedNodeBuilder::new();
        builder.start_container(&augmentation_parent())?;
        StreamContext::new(&self.factory, None).write_object(&context, augmentation, &mut builder)?;
        builder.end_node()?;
        let parent = builder.build()?;
        Ok(parent
            .children()
            .map(|children| children.values().cloned().collect())
            .unwrap_or_default())
    }

    pub fn to_node_path(&self, path: &BindingPath) -> Result<NodePath> {
        self.factory.to_node_path(path)
    }

    pub fn from_node_path(&self, path: &NodePath) -> Result<BindingPath> {
        self.factory.from_node_path(path)
    }
}

/// Synthetic parent collecting the children of a detached augmentation.
fn augmentation_parent() -> QName {
    QName::new("urn:mordant:augmentation", "parent")
}

/// A codec context together with the tree it belongs to.
#[derive(Debug, Clone)]
pub struct CodecTreeNode {
    factory: Arc<CodecContextFactory>,
    context: Arc<NodeCodecContext>,
}

impl CodecTreeNode {
    pub fn context(&self) -> &Arc<NodeCodecContext> {
        &self.context
    }

    pub fn kind(&self) -> &'static str {
        self.context.kind()
    }

    pub fn qname(&self) -> Result<&QName> {
        self.context.qname()
    }

    pub fn binding(&self) -> Option<TypeName> {
        self.context.binding()
    }

    pub fn child(&self, qname: &QName) -> Result<CodecTreeNode> {
        Ok(CodecTreeNode {
            factory: self.factory.clone(),
            context: self.context.child(&self.factory, qname)?,
        })
    }

    pub fn deserialize(&self, node: &Arc<NormalizedNode>) -> Result<Option<DomainValue>> {
        decode(&self.factory, &self.context, node)
    }

    /// Serializes `value` into the node(s) this context describes. Values
    /// that map to several sibling nodes, such as augmentations, come back
    /// as the children of a synthetic container.
    pub fn serialize(&self, value: &DomainValue) -> Result<Arc<NormalizedNode>> {
        let mut builder = NormalizedNodeBuilder::new();
        let stream = StreamContext::new(&self.factory, None);
        match self.context.as_ref() {
            NodeCodecContext::Augmentation(_) | NodeCodecContext::Case(_) => {
                builder.start_container(&augmentation_parent())?;
                stream.write_value(&self.context, value, &mut builder)?;
                builder.end_node()?;
            }
            _ => stream.write_value(&self.context, value, &mut builder)?,
        }
        builder.build()
    }

    /// Whether both handles refer to the same context instance.
    pub fn is_same(&self, other: &CodecTreeNode) -> bool {
        Arc::ptr_eq(&self.context, &other.context)
    }
}

/// Encodes and decodes the input and output of one action.
#[derive(Debug, Clone)]
pub struct ActionCodec {
    factory: Arc<CodecContextFactory>,
    context: Arc<NodeCodecContext>,
}

impl ActionCodec {
    fn action(&self) -> Result<&ActionCodecContext> {
        match self.context.as_ref() {
            NodeCodecContext::Action(action) => Ok(action),
            other => Err(CodecError::Programming(format!(
                "{} is not an action",
                other.describe()
            ))),
        }
    }

    pub fn input(&self) -> Result<Arc<NodeCodecContext>> {
        self.action()?.input(&self.factory)
    }

    pub fn output(&self) -> Result<Arc<NodeCodecContext>> {
        self.action()?.output(&self.factory)
    }

    pub fn serialize_input(&self, input: &dyn DataObject) -> Result<Arc<NormalizedNode>> {
        self.serialize(self.input()?, input)
    }

    pub fn serialize_output(&self, output: &dyn DataObject) -> Result<Arc<NormalizedNode>> {
        self.serialize(self.output()?, output)
    }

    pub fn deserialize_input(&self, node: &Arc<NormalizedNode>) -> Result<Arc<dyn DataObject>> {
        self.deserialize(self.input()?, node)
    }

    pub fn deserialize_output(&self, node: &Arc<NormalizedNode>) -> Result<Arc<dyn DataObject>> {
        self.deserialize(self.output()?, node)
    }

    fn serialize(&self, context: Arc<NodeCodecContext>, object: &dyn DataObject) -> Result<Arc<NormalizedNode>> {
        DataObjectSerializer::new(self.factory.clone(), context).to_normalized_node(object)
    }

    fn deserialize(
        &self,
        context: Arc<NodeCodecContext>,
        node: &Arc<NormalizedNode>,
    ) -> Result<Arc<dyn DataObject>> {
        match decode(&self.factory, &context, node)? {
            Some(DomainValue::Object(object)) => Ok(object),
            _ => Err(CodecError::IncorrectNesting(format!(
                "{} {} did not decode to a data object",
                node.kind(),
                node.name()
            ))),
        }
    }
}
