//! Mordant is a schema-driven binding codec between typed domain objects
//! and a generic normalized node tree.
//!
//! Core concepts:
//! - **SchemaContext**: The data schema, a tree of containers, lists, leaves,
//!   choices, augmentations and actions
//! - **DataObject**: A typed domain object exposing its properties by name
//! - **NormalizedNode**: The generic, schema-shaped attribute tree
//! - **BindingRuntimeContext**: Associates schema nodes with domain types
//! - **BindingCodecTree**: Lazily builds one codec context per schema node and
//!   converts objects, subtrees and paths in both directions
//!
//! Decoding is lazy: a decoded object keeps its source node and decodes each
//! property on first access.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use mordant_core::{
//!     BindingCodecTree, BindingRuntimeContext, DataObject, NodePath, QName, SchemaContext,
//!     SchemaNode, TypeDefinition,
//! };
//!
//! #[derive(Debug, DataObject)]
//! #[binding(name = "Greeting")]
//! struct Greeting {
//!     text: Option<String>,
//! }
//!
//! let mut schema = SchemaContext::builder();
//! let root = schema.root(SchemaNode::container(QName::new("urn:demo", "greeting")).with_binding("Greeting"));
//! schema.child(root, SchemaNode::leaf(QName::new("urn:demo", "text"), TypeDefinition::string()));
//!
//! let runtime = BindingRuntimeContext::builder(schema.build().unwrap())
//!     .register::<Greeting>()
//!     .build()
//!     .unwrap();
//! let tree = BindingCodecTree::new(runtime);
//!
//! let greeting = Greeting { text: Some("hello".to_string()) };
//! let node = tree.to_normalized_node(&greeting).unwrap();
//!
//! let path = NodePath::new([mordant_core::PathArgument::Node(QName::new("urn:demo", "greeting"))]);
//! let decoded = tree.from_normalized_node(&path, &node).unwrap().unwrap();
//! let decoded = decoded.as_object().unwrap();
//! assert!(mordant_core::binding_eq(decoded.as_ref(), &greeting));
//! ```

mod binding;
mod cache;
mod context;
mod error;
mod factory;
mod lazy;
mod leaf;
mod node;
mod path;
mod prototype;
mod runtime;
mod schema;
mod serializer;
mod stream;
#[cfg(test)]
mod testing;
mod tree;
mod value_codec;

pub use binding::{
    Augmentations, BindingKey, BindingMap, BindingObject, BindingPath, BindingStep, BindingType,
    DataObject, DomainValue, EnumValue, IdentityValue, OpaqueObject, Scalar, TypeName,
    TypedValue, binding_eq, downcast, property_name,
};
pub use cache::CachingCodec;
pub use context::{
    ActionCodecContext, AugmentationCodecContext, ChoiceCodecContext, DataObjectCodecContext,
    KeyCodec, ListCodecContext, MapCodecContext, NodeCodecContext,
};
pub use error::{CodecError, Result};
pub use factory::CodecContextFactory;
pub use lazy::LazyDataObject;
pub use leaf::{LeafCodecContext, LeafListCodecContext, OpaqueCodecContext};
pub use node::{
    Children, Decimal64, EntryIdentifier, IntValue, NodePath, NormalizedNode, OpaqueData,
    PathArgument, QName, Value,
};
pub use prototype::{Address, CodecPrototype, PrototypeId};
pub use runtime::{BindingRuntimeBuilder, BindingRuntimeContext, IdentitySchema};
pub use schema::{
    EnumPair, IntType, SchemaBuilder, SchemaContext, SchemaKind, SchemaNode, SchemaNodeId,
    TypeDefinition,
};
pub use serializer::DataObjectSerializer;
pub use stream::{NormalizedNodeBuilder, NormalizedNodeStreamWriter, NormalizedNodeWriter};
pub use tree::{ActionCodec, BindingCodecTree, CodecTreeNode};
pub use value_codec::{
    BitsCodec, BuiltInCodec, CompositeValueCodec, EnumerationCodec, IdentityCodec,
    InstanceIdentifierCodec, UnionCodec, ValueCodec,
};

#[cfg(feature = "derive")]
pub use mordant_derive::DataObject;
