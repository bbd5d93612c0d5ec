//! Hand-written test model shared by the unit tests.

use std::any::Any;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::binding::{Augmentations, BindingType, DataObject, DomainValue};
use crate::error::Result;
use crate::node::QName;
use crate::runtime::BindingRuntimeContext;
use crate::schema::{IntType, SchemaContext, SchemaNode, TypeDefinition};

pub(crate) const NS: &str = "urn:test:model";

pub(crate) fn q(name: &str) -> QName {
    QName::new(NS, name)
}

pub(crate) static TOP: BindingType =
    BindingType::new("Top", &["name", "tags", "top_list", "items", "shape"]);
pub(crate) static TOP_LIST: BindingType =
    BindingType::keyed("TopList", &["id", "value", "nested"], &["id"]);
pub(crate) static NESTED: BindingType = BindingType::new("Nested", &["flag", "target"]);
pub(crate) static ITEM: BindingType = BindingType::new("Item", &["label", "items"]);
pub(crate) static SHAPE: BindingType = BindingType::new("Shape", &[]);
pub(crate) static CIRCLE: BindingType = BindingType::new("Circle", &["radius"]);
pub(crate) static SQUARE: BindingType = BindingType::new("Square", &["side"]);
pub(crate) static TOP_EXTRA: BindingType = BindingType::new("TopExtra", &["extra"]);
pub(crate) static RESET: BindingType = BindingType::new("Reset", &[]);
pub(crate) static RESET_INPUT: BindingType = BindingType::new("ResetInput", &["delay"]);
pub(crate) static RESET_OUTPUT: BindingType = BindingType::new("ResetOutput", &["ok"]);

/// Property-bag data object.
#[derive(Debug)]
pub(crate) struct TestObject {
    ty: &'static BindingType,
    props: IndexMap<&'static str, DomainValue>,
    augmentations: Augmentations,
}

impl TestObject {
    pub(crate) fn new(ty: &'static BindingType) -> Self {
        TestObject {
            ty,
            props: IndexMap::new(),
            augmentations: Augmentations::new(),
        }
    }

    pub(crate) fn with(mut self, name: &'static str, value: DomainValue) -> Self {
        self.props.insert(name, value);
        self
    }

    pub(crate) fn with_augmentation(mut self, augmentation: Arc<dyn DataObject>) -> Self {
        self.augmentations.insert(augmentation);
        self
    }
}

impl DataObject for TestObject {
    fn binding_type(&self) -> &'static BindingType {
        self.ty
    }

    fn property(&self, name: &str) -> Result<Option<DomainValue>> {
        Ok(self.props.get(name).cloned())
    }

    fn augmentations(&self) -> Augmentations {
        self.augmentations.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// ```text
/// container top                      Top
///   leaf name, leaf-list tags
///   list top-list [id]               TopList
///     leaf id, leaf value (default 7)
///     container nested               Nested
///       leaf flag, leaf target (instance-identifier)
///   list items                       Item
///     leaf label, list items (recursive)
///   choice shape                     Shape
///     case circle: leaf radius       Circle
///     case square: leaf side         Square
///   augment: leaf extra              TopExtra
///   action reset                     Reset
///     input: leaf delay              ResetInput
///     output: leaf ok                ResetOutput
/// ```
pub(crate) fn runtime() -> Arc<BindingRuntimeContext> {
    let uint32 = || TypeDefinition::int(IntType::U32);
    let mut b = SchemaContext::builder();
    let top = b.root(SchemaNode::container(q("top")).with_binding("Top"));
    b.child(top, SchemaNode::leaf(q("name"), TypeDefinition::string()));
    b.child(top, SchemaNode::leaf_list(q("tags"), TypeDefinition::string()));

    let list = b.child(
        top,
        SchemaNode::list(q("top-list"), [q("id")]).with_binding("TopList"),
    );
    b.child(list, SchemaNode::leaf(q("id"), TypeDefinition::string()));
    b.child(
        list,
        SchemaNode::leaf(q("value"), uint32()).with_default(crate::node::IntValue::U32(7)),
    );
    let nested = b.child(list, SchemaNode::container(q("nested")).with_binding("Nested"));
    b.child(nested, SchemaNode::leaf(q("flag"), TypeDefinition::Boolean));
    b.child(
        nested,
        SchemaNode::leaf(q("target"), TypeDefinition::InstanceIdentifier),
    );

    let items = b.child(top, SchemaNode::list(q("items"), []).with_binding("Item"));
    b.child(items, SchemaNode::leaf(q("label"), TypeDefinition::string()));
    b.link(items, items);

    let shape = b.child(top, SchemaNode::choice(q("shape")).with_binding("Shape"));
    let circle = b.child(shape, SchemaNode::case(q("circle")).with_binding("Circle"));
    b.child(circle, SchemaNode::leaf(q("radius"), uint32()));
    let square = b.child(shape, SchemaNode::case(q("square")).with_binding("Square"));
    b.child(square, SchemaNode::leaf(q("side"), uint32()));

    let aug = b.child(top, SchemaNode::augmentation(q("top-aug")).with_binding("TopExtra"));
    b.child(aug, SchemaNode::leaf(q("extra"), TypeDefinition::string()));

    let reset = b.child(top, SchemaNode::action(q("reset")).with_binding("Reset"));
    let input = b.child(reset, SchemaNode::input(q("input")).with_binding("ResetInput"));
    b.child(input, SchemaNode::leaf(q("delay"), uint32()));
    let output = b.child(reset, SchemaNode::output(q("output")).with_binding("ResetOutput"));
    b.child(output, SchemaNode::leaf(q("ok"), TypeDefinition::Boolean));

    let schema = b.build().unwrap();
    Arc::new(
        BindingRuntimeContext::builder(schema)
            .register_type(&TOP)
            .register_type(&TOP_LIST)
            .register_type(&NESTED)
            .register_type(&ITEM)
            .register_type(&SHAPE)
            .register_type(&CIRCLE)
            .register_type(&SQUARE)
            .register_type(&TOP_EXTRA)
            .register_type(&RESET)
            .register_type(&RESET_INPUT)
            .register_type(&RESET_OUTPUT)
            .build()
            .unwrap(),
    )
}

/// A keyed list whose domain type lacks a key accessor.
pub(crate) fn keyless_runtime() -> Arc<BindingRuntimeContext> {
    static KEYLESS: BindingType = BindingType::new("Keyless", &["id"]);
    let mut b = SchemaContext::builder();
    let list = b.root(SchemaNode::list(q("keyless"), [q("id")]).with_binding("Keyless"));
    b.child(list, SchemaNode::leaf(q("id"), TypeDefinition::string()));
    Arc::new(
        BindingRuntimeContext::builder(b.build().unwrap())
            .register_type(&KEYLESS)
            .build()
            .unwrap(),
    )
}

/// A container `host` with leaf `address`, augmented by `HostAug` with
/// leaves `port` and `alias`.
pub(crate) fn split_augmentation_runtime() -> Arc<BindingRuntimeContext> {
    static HOST: BindingType = BindingType::new("Host", &["address"]);
    static HOST_AUG: BindingType = BindingType::new("HostAug", &["port", "alias"]);
    let mut b = SchemaContext::builder();
    let host = b.root(SchemaNode::container(q("host")).with_binding("Host"));
    b.child(host, SchemaNode::leaf(q("address"), TypeDefinition::string()));
    let aug = b.child(host, SchemaNode::augmentation(q("host-aug")).with_binding("HostAug"));
    b.child(aug, SchemaNode::leaf(q("port"), TypeDefinition::int(IntType::U16)));
    b.child(aug, SchemaNode::leaf(q("alias"), TypeDefinition::string()));
    Arc::new(
        BindingRuntimeContext::builder(b.build().unwrap())
            .register_type(&HOST)
            .register_type(&HOST_AUG)
            .build()
            .unwrap(),
    )
}

/// A container with an augmentation that adds nothing.
pub(crate) fn empty_augmentation_runtime() -> Arc<BindingRuntimeContext> {
    static HOST: BindingType = BindingType::new("Host", &[]);
    static HOST_AUG: BindingType = BindingType::new("HostAug", &[]);
    let mut b = SchemaContext::builder();
    let host = b.root(SchemaNode::container(q("host")).with_binding("Host"));
    b.child(host, SchemaNode::augmentation(q("host-aug")).with_binding("HostAug"));
    Arc::new(
        BindingRuntimeContext::builder(b.build().unwrap())
            .register_type(&HOST)
            .register_type(&HOST_AUG)
            .build()
            .unwrap(),
    )
}
