//! Data objects backed by attribute tree nodes.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};

use log::trace;

use crate::binding::{Augmentations, BindingMap, BindingType, DataObject, DomainValue};
use crate::context::{DataObjectCodecContext, NodeCodecContext};
use crate::error::{CodecError, Result};
use crate::factory::CodecContextFactory;
use crate::node::NormalizedNode;

/// Decodes `node` with `context`.
///
/// Objects come back lazy: only the node kind and name are checked here,
/// properties decode on first access.
pub(crate) fn decode(
    factory: &Arc<CodecContextFactory>,
    context: &Arc<NodeCodecContext>,
    node: &Arc<NormalizedNode>,
) -> Result<Option<DomainValue>> {
    let mismatch = || {
        CodecError::IncorrectNesting(format!(
            "{} {} cannot be decoded as {}",
            node.kind(),
            node.name(),
            context.describe()
        ))
    };
    match context.as_ref() {
        NodeCodecContext::Container(data) => match node.as_ref() {
            NormalizedNode::Container { name, .. } if name == data.qname() => {
                Ok(Some(DomainValue::Object(LazyDataObject::create(factory, context, node)?)))
            }
            _ => Err(mismatch()),
        },
        NodeCodecContext::Case(_) => match node.as_ref() {
            NormalizedNode::Choice { .. } => {
                Ok(Some(DomainValue::Object(LazyDataObject::create(factory, context, node)?)))
            }
            _ => Err(mismatch()),
        },
        NodeCodecContext::List(list) => match node.as_ref() {
            NormalizedNode::UnkeyedList { name, entries } if name == list.entry().qname() => {
                let objects = entries
                    .iter()
                    .map(|entry| match entry.as_ref() {
                        NormalizedNode::UnkeyedEntry { .. } => {
                            LazyDataObject::create(factory, context, entry)
                        }
                        _ => Err(mismatch()),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Some(DomainValue::List(objects)))
            }
            NormalizedNode::UnkeyedEntry { name, .. } if name == list.entry().qname() => {
                Ok(Some(DomainValue::Object(LazyDataObject::create(factory, context, node)?)))
            }
            _ => Err(mismatch()),
        },
        NodeCodecContext::KeyedList(map) => match node.as_ref() {
            NormalizedNode::Map { name, entries, .. } if name == map.entry().qname() => {
                let mut objects = BindingMap::new();
                for (id, entry) in entries {
                    let key = map.key().binding_key(id)?;
                    objects.insert(key, LazyDataObject::create(factory, context, entry)?);
                }
                Ok(Some(DomainValue::Map(objects)))
            }
            NormalizedNode::MapEntry { id, .. } if id.name() == map.entry().qname() => {
                Ok(Some(DomainValue::Object(LazyDataObject::create(factory, context, node)?)))
            }
            _ => Err(mismatch()),
        },
        NodeCodecContext::Choice(choice) => {
            let NormalizedNode::Choice { name, children } = node.as_ref() else {
                return Err(mismatch());
            };
            if name != choice.qname() {
                return Err(mismatch());
            }
            let Some(case) = choice.select_case(children)? else {
                return Ok(None);
            };
            let case = factory.context(case)?;
            Ok(Some(DomainValue::Object(LazyDataObject::create(factory, &case, node)?)))
        }
        NodeCodecContext::Augmentation(aug) => {
            let children = node.children().ok_or_else(mismatch)?;
            if !aug.is_present(children) {
                return Ok(None);
            }
            Ok(Some(DomainValue::Object(LazyDataObject::create(factory, context, node)?)))
        }
        NodeCodecContext::Leaf(leaf) => Ok(Some(DomainValue::Scalar(leaf.deserialize(node)?))),
        NodeCodecContext::LeafList(leaf_list) => {
            Ok(Some(DomainValue::ScalarList(leaf_list.deserialize(node)?)))
        }
        NodeCodecContext::Opaque(opaque) => Ok(Some(DomainValue::Opaque(opaque.deserialize(node)?))),
        NodeCodecContext::Action(action) => Err(CodecError::IllegalArgument(format!(
            "action {} has no data of its own, decode its input or output",
            action.qname()
        ))),
    }
}

/// A data object that decodes its properties from a backing node on demand.
///
/// Each property is decoded at most once. Decoding failures surface from
/// [`DataObject::property`] and are remembered like successful values.
/// Case objects are backed by their choice node and augmentation objects by
/// the node they augment.
pub struct LazyDataObject {
    factory: Arc<CodecContextFactory>,
    context: Arc<NodeCodecContext>,
    binding: &'static BindingType,
    node: Arc<NormalizedNode>,
    values: Vec<OnceLock<Result<Option<DomainValue>>>>,
    augmentations: Augmentations,
}

impl LazyDataObject {
    pub(crate) fn create(
        factory: &Arc<CodecContextFactory>,
        context: &Arc<NodeCodecContext>,
        node: &Arc<NormalizedNode>,
    ) -> Result<Arc<dyn DataObject>> {
        Ok(Arc::new(Self::new(factory, context, node)?))
    }

    fn new(
        factory: &Arc<CodecContextFactory>,
        context: &Arc<NodeCodecContext>,
        node: &Arc<NormalizedNode>,
    ) -> Result<Self> {
        let data = data_context(context)?;
        let children = node.children().ok_or_else(|| {
            CodecError::IncorrectNesting(format!(
                "{} {} cannot back a data object",
                node.kind(),
                node.name()
            ))
        })?;

        let mut augmentations = Augmentations::new();
        for id in data.augmentations() {
            let aug_context = factory.context(*id)?;
            if let NodeCodecContext::Augmentation(aug) = aug_context.as_ref() {
                if aug.is_present(children) {
                    augmentations.insert(Self::create(factory, &aug_context, node)?);
                }
            }
        }

        trace!("lazy {} over {} {}", data.binding().name(), node.kind(), node.name());
        Ok(LazyDataObject {
            factory: factory.clone(),
            context: context.clone(),
            binding: data.binding(),
            node: node.clone(),
            values: (0..data.children().len()).map(|_| OnceLock::new()).collect(),
            augmentations,
        })
    }

    /// The backing node.
    pub fn node(&self) -> &Arc<NormalizedNode> {
        &self.node
    }

    pub fn context(&self) -> &Arc<NodeCodecContext> {
        &self.context
    }

    /// Like [`DataObject::property`], but falls back to the schema default
    /// of an absent leaf.
    pub fn property_or_default(&self, name: &str) -> Result<Option<DomainValue>> {
        if let Some(value) = self.property(name)? {
            return Ok(Some(value));
        }
        let data = data_context(&self.context)?;
        let Some((_, slot)) = data
            .property_index(name)
            .and_then(|index| data.children().get_index(index))
        else {
            return Ok(None);
        };
        match self.factory.context(slot.prototype)?.as_ref() {
            NodeCodecContext::Leaf(leaf) => Ok(leaf.default().cloned().map(DomainValue::Scalar)),
            _ => Ok(None),
        }
    }

    fn decode_property(&self, data: &DataObjectCodecContext, index: usize) -> Result<Option<DomainValue>> {
        let Some((qname, slot)) = data.children().get_index(index) else {
            return Ok(None);
        };
        let context = self.factory.context(slot.prototype)?;
        match self.node.child(qname) {
            Some(child) => decode(&self.factory, &context, child),
            // An absent leaf-set is an empty sequence.
            None if matches!(context.as_ref(), NodeCodecContext::LeafList(_)) => {
                Ok(Some(DomainValue::ScalarList(Vec::new())))
            }
            None => Ok(None),
        }
    }
}

fn data_context(context: &NodeCodecContext) -> Result<&DataObjectCodecContext> {
    context.data_object().ok_or_else(|| {
        CodecError::Programming(format!("{} does not describe a data object", context.describe()))
    })
}

impl DataObject for LazyDataObject {
    fn binding_type(&self) -> &'static BindingType {
        self.binding
    }

    fn property(&self, name: &str) -> Result<Option<DomainValue>> {
        let data = data_context(&self.context)?;
        let Some(index) = data.property_index(name) else {
            return Ok(None);
        };
        self.values[index]
            .get_or_init(|| self.decode_property(data, index))
            .clone()
    }

    fn augmentations(&self) -> Augmentations {
        self.augmentations.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for LazyDataObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyDataObject")
            .field("type", &self.binding.name())
            .field("node", self.node.name())
            .field("augmentations", &self.augmentations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{BindingKey, Scalar, downcast};
    use crate::node::{EntryIdentifier, IntValue, Value};
    use crate::testing::{self, q};

    fn factory() -> Arc<CodecContextFactory> {
        CodecContextFactory::new(testing::runtime())
    }

    fn entry(id: &str, value: Option<u32>) -> NormalizedNode {
        let mut children = vec![NormalizedNode::leaf(q("id"), id)];
        if let Some(value) = value {
            children.push(NormalizedNode::leaf(q("value"), IntValue::U32(value)));
        }
        NormalizedNode::map_entry(
            EntryIdentifier::new(q("top-list"), [(q("id"), Value::from(id))]),
            children,
        )
    }

    fn decode_top(factory: &Arc<CodecContextFactory>, node: NormalizedNode) -> Arc<dyn DataObject> {
        let context = factory.context_for_type("Top").unwrap();
        match decode(factory, &context, &Arc::new(node)).unwrap() {
            Some(DomainValue::Object(object)) => object,
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn properties_decode_lazily_and_once() {
        let factory = factory();
        let top = decode_top(
            &factory,
            NormalizedNode::container(q("top"), [NormalizedNode::leaf(q("name"), "n")]),
        );
        let lazy = downcast::<LazyDataObject>(top.as_ref()).unwrap();
        assert!(lazy.values.iter().all(|slot| slot.get().is_none()));

        let name = top.property("name").unwrap();
        assert_eq!(name, Some(DomainValue::Scalar(Scalar::from("n"))));
        assert_eq!(lazy.values.iter().filter(|slot| slot.get().is_some()).count(), 1);
        assert_eq!(top.property("top_list").unwrap(), None);
        assert_eq!(top.property("no_such_property").unwrap(), None);
    }

    #[test]
    fn missing_leaf_list_is_empty() {
        let factory = factory();
        let top = decode_top(
            &factory,
            NormalizedNode::container(q("top"), [NormalizedNode::leaf(q("name"), "n")]),
        );
        assert_eq!(
            top.property("tags").unwrap(),
            Some(DomainValue::ScalarList(Vec::new()))
        );

        let explicit = decode_top(
            &factory,
            NormalizedNode::container(q("top"), [NormalizedNode::leaf_set(q("tags"), [])]),
        );
        assert_eq!(explicit.property("tags").unwrap(), top.property("tags").unwrap());
    }

    #[test]
    fn malformed_child_fails_on_access() {
        let factory = factory();
        let top = decode_top(
            &factory,
            NormalizedNode::container(q("top"), [NormalizedNode::leaf(q("name"), true)]),
        );
        assert!(matches!(
            top.property("name"),
            Err(CodecError::InvalidValue(_))
        ));
        // Memoized error, same answer again.
        assert!(matches!(
            top.property("name"),
            Err(CodecError::InvalidValue(_))
        ));
    }

    #[test]
    fn keyed_list_decodes_to_map() {
        let factory = factory();
        let top = decode_top(
            &factory,
            NormalizedNode::container(
                q("top"),
                [NormalizedNode::map(
                    q("top-list"),
                    [entry("b", Some(1)), entry("a", None)],
                )],
            ),
        );
        let Some(DomainValue::Map(map)) = top.property("top_list").unwrap() else {
            panic!("expected map");
        };
        let keys: Vec<_> = map.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, [BindingKey::single("b"), BindingKey::single("a")]);

        let a = map.get(&BindingKey::single("a")).unwrap();
        let a = downcast::<LazyDataObject>(a.as_ref()).unwrap();
        assert_eq!(a.property("value").unwrap(), None);
        assert_eq!(
            a.property_or_default("value").unwrap(),
            Some(DomainValue::Scalar(Scalar::Int(IntValue::U32(7))))
        );
    }

    #[test]
    fn augmentation_is_resolved_from_parent_children() {
        let factory = factory();
        let top = decode_top(
            &factory,
            NormalizedNode::container(q("top"), [NormalizedNode::leaf(q("extra"), "e")]),
        );
        let augmentations = top.augmentations();
        let extra = augmentations.get("TopExtra").unwrap();
        assert_eq!(
            extra.property("extra").unwrap(),
            Some(DomainValue::Scalar(Scalar::from("e")))
        );

        let plain = decode_top(&factory, NormalizedNode::container(q("top"), []));
        assert!(plain.augmentations().is_empty());
    }

    #[test]
    fn augmentation_with_some_leaves_present() {
        let factory = CodecContextFactory::new(testing::split_augmentation_runtime());
        let context = factory.context_for_type("Host").unwrap();
        let node = NormalizedNode::container(
            q("host"),
            [
                NormalizedNode::leaf(q("address"), "10.0.0.1"),
                NormalizedNode::leaf(q("port"), 22u16),
            ],
        );
        let Some(DomainValue::Object(host)) = decode(&factory, &context, &Arc::new(node)).unwrap()
        else {
            panic!("expected object");
        };
        assert_eq!(
            host.property("address").unwrap(),
            Some(DomainValue::Scalar(Scalar::from("10.0.0.1")))
        );

        let augmentations = host.augmentations();
        let aug = augmentations.get("HostAug").unwrap();
        assert_eq!(
            aug.property("port").unwrap(),
            Some(DomainValue::Scalar(Scalar::from(22u16)))
        );
        assert_eq!(aug.property("alias").unwrap(), None);
    }

    #[test]
    fn choice_decodes_to_case_object() {
        let factory = factory();
        let top = decode_top(
            &factory,
            NormalizedNode::container(
                q("top"),
                [NormalizedNode::choice(
                    q("shape"),
                    [NormalizedNode::leaf(q("radius"), IntValue::U32(3))],
                )],
            ),
        );
        let Some(DomainValue::Object(shape)) = top.property("shape").unwrap() else {
            panic!("expected case object");
        };
        assert_eq!(shape.binding_type().name(), "Circle");
        assert_eq!(
            shape.property("radius").unwrap(),
            Some(DomainValue::Scalar(Scalar::Int(IntValue::U32(3))))
        );

        let empty = decode_top(
            &factory,
            NormalizedNode::container(q("top"), [NormalizedNode::choice(q("shape"), [])]),
        );
        assert_eq!(empty.property("shape").unwrap(), None);
    }

    #[test]
    fn wrong_node_kind_is_incorrect_nesting() {
        let factory = factory();
        let context = factory.context_for_type("Top").unwrap();
        let node = Arc::new(NormalizedNode::leaf(q("top"), "x"));
        assert!(matches!(
            decode(&factory, &context, &node),
            Err(CodecError::IncorrectNesting(_))
        ));
    }
}
