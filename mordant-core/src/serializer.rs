//! Streaming serialization of data objects.

use std::sync::Arc;

use crate::binding::{DataObject, DomainValue, TypeName};
use crate::cache::CachingCodec;
use crate::context::{ChoiceCodecContext, DataObjectCodecContext, NodeCodecContext};
use crate::error::{CodecError, Result};
use crate::factory::CodecContextFactory;
use crate::node::NormalizedNode;
use crate::stream::{NormalizedNodeBuilder, NormalizedNodeStreamWriter};

/// One serialization pass, optionally intercepted by a caching codec.
pub(crate) struct StreamContext<'a> {
    factory: &'a CodecContextFactory,
    cache: Option<&'a CachingCodec>,
}

impl<'a> StreamContext<'a> {
    pub(crate) fn new(factory: &'a CodecContextFactory, cache: Option<&'a CachingCodec>) -> Self {
        StreamContext { factory, cache }
    }

    /// Writes a property value as the node(s) `context` describes.
    /// Empty collections write nothing.
    pub(crate) fn write_value(
        &self,
        context: &NodeCodecContext,
        value: &DomainValue,
        writer: &mut dyn NormalizedNodeStreamWriter,
    ) -> Result<()> {
        if value.is_empty_collection() {
            return Ok(());
        }
        match (context, value) {
            (NodeCodecContext::Container(_), DomainValue::Object(object))
            | (NodeCodecContext::List(_), DomainValue::Object(object))
            | (NodeCodecContext::KeyedList(_), DomainValue::Object(object)) => {
                self.write_child_object(context, object, writer)
            }
            (NodeCodecContext::List(list), DomainValue::List(objects)) => {
                writer.start_unkeyed_list(list.entry().qname())?;
                for object in objects {
                    self.write_child_object(context, object, writer)?;
                }
                writer.end_node()
            }
            (NodeCodecContext::KeyedList(map), DomainValue::Map(entries)) => {
                writer.start_map(map.entry().qname(), map.is_ordered())?;
                for object in entries.values() {
                    self.write_child_object(context, object, writer)?;
                }
                writer.end_node()
            }
            (NodeCodecContext::Choice(choice), DomainValue::Object(object)) => {
                self.write_choice(choice, object.as_ref(), writer)
            }
            (NodeCodecContext::Augmentation(_), DomainValue::Object(object))
            | (NodeCodecContext::Case(_), DomainValue::Object(object)) => {
                self.write_object(context, object.as_ref(), writer)
            }
            (NodeCodecContext::Leaf(leaf), DomainValue::Scalar(scalar)) => {
                writer.leaf(leaf.qname(), &leaf.serialize(scalar)?)
            }
            (NodeCodecContext::LeafList(leaf_list), DomainValue::ScalarList(values)) => {
                writer.start_leaf_set(leaf_list.qname(), leaf_list.is_ordered())?;
                for value in values {
                    writer.leaf_set_entry(&leaf_list.serialize(value)?)?;
                }
                writer.end_node()
            }
            (NodeCodecContext::Opaque(opaque), DomainValue::Opaque(object)) => {
                writer.opaque(opaque.qname(), &object.data)
            }
            (context, value) => Err(CodecError::IncorrectNesting(format!(
                "{} value cannot be written as {}",
                value.kind(),
                context.describe()
            ))),
        }
    }

    fn write_child_object(
        &self,
        context: &NodeCodecContext,
        object: &Arc<dyn DataObject>,
        writer: &mut dyn NormalizedNodeStreamWriter,
    ) -> Result<()> {
        if let Some(codec) = self.cache {
            if let Some(cache) = codec.cache_for(context) {
                let node = cache.get(codec, context, object)?;
                return writer.node(&node);
            }
        }
        self.write_object(context, object.as_ref(), writer)
    }

    /// Writes a data object as the node `context` describes. Case and
    /// augmentation objects write their members only.
    pub(crate) fn write_object(
        &self,
        context: &NodeCodecContext,
        object: &dyn DataObject,
        writer: &mut dyn NormalizedNodeStreamWriter,
    ) -> Result<()> {
        match context {
            NodeCodecContext::Container(data) => {
                check_type(data, object)?;
                writer.start_container(data.qname())?;
                self.write_members(data, object, writer)?;
                writer.end_node()
            }
            NodeCodecContext::List(list) => {
                let data = list.entry();
                check_type(data, object)?;
                writer.start_unkeyed_entry(data.qname())?;
                self.write_members(data, object, writer)?;
                writer.end_node()
            }
            NodeCodecContext::KeyedList(map) => {
                let data = map.entry();
                check_type(data, object)?;
                let key = data.binding().key_of(object)?;
                writer.start_map_entry(&map.key().entry_identifier(data.qname(), &key)?)?;
                self.write_members(data, object, writer)?;
                writer.end_node()
            }
            NodeCodecContext::Case(data) => {
                check_type(data, object)?;
                self.write_members(data, object, writer)
            }
            NodeCodecContext::Augmentation(aug) => {
                check_type(aug.data(), object)?;
                self.write_members(aug.data(), object, writer)
            }
            other => Err(CodecError::IllegalArgument(format!(
                "{} does not serialize data objects",
                other.describe()
            ))),
        }
    }

    fn write_choice(
        &self,
        choice: &ChoiceCodecContext,
        object: &dyn DataObject,
        writer: &mut dyn NormalizedNodeStreamWriter,
    ) -> Result<()> {
        let binding = object.binding_type().name();
        let case = choice.case_for_type(binding).ok_or_else(|| {
            CodecError::IncorrectNesting(format!(
                "{binding} is not a case of choice {}",
                choice.qname()
            ))
        })?;
        let case = self.factory.context(case)?;
        writer.start_choice(choice.qname())?;
        self.write_object(&case, object, writer)?;
        writer.end_node()
    }

    fn write_members(
        &self,
        data: &DataObjectCodecContext,
        object: &dyn DataObject,
        writer: &mut dyn NormalizedNodeStreamWriter,
    ) -> Result<()> {
        for slot in data.children().values() {
            let Some(value) = object.property(&slot.property)? else {
                continue;
            };
            let child = self.factory.context(slot.prototype)?;
            self.write_value(&child, &value, writer)?;
        }
        for (binding, augmentation) in object.augmentations().iter() {
            let id = data.augmentation_for_type(binding).ok_or_else(|| {
                CodecError::IncorrectNesting(format!(
                    "augmentation {binding} does not apply to {}",
                    data.binding().name()
                ))
            })?;
            let context = self.factory.context(id)?;
            self.write_object(&context, augmentation.as_ref(), writer)?;
        }
        Ok(())
    }
}

fn check_type(data: &DataObjectCodecContext, object: &dyn DataObject) -> Result<()> {
    let actual = object.binding_type().name();
    if actual != data.binding().name() {
        return Err(CodecError::IncorrectNesting(format!(
            "{actual} cannot be written as {} ({})",
            data.binding().name(),
            data.qname()
        )));
    }
    Ok(())
}

/// Serializer for one domain type, emitting stream events.
#[derive(Debug, Clone)]
pub struct DataObjectSerializer {
    factory: Arc<CodecContextFactory>,
    context: Arc<NodeCodecContext>,
}

impl DataObjectSerializer {
    pub(crate) fn new(factory: Arc<CodecContextFactory>, context: Arc<NodeCodecContext>) -> Self {
        DataObjectSerializer { factory, context }
    }

    pub fn binding(&self) -> Option<TypeName> {
        self.context.binding()
    }

    pub fn context(&self) -> &Arc<NodeCodecContext> {
        &self.context
    }

    /// Streams `object` into `writer`.
    pub fn serialize(
        &self,
        object: &dyn DataObject,
        writer: &mut dyn NormalizedNodeStreamWriter,
    ) -> Result<()> {
        StreamContext::new(&self.factory, None).write_object(&self.context, object, writer)
    }

    /// Serializes `object` into a new tree.
    pub fn to_normalized_node(&self, object: &dyn DataObject) -> Result<Arc<NormalizedNode>> {
        let mut builder = NormalizedNodeBuilder::new();
        self.serialize(object, &mut builder)?;
        builder.build()
    }
}
