use std::fmt;
use std::sync::{Arc, OnceLock};

use log::trace;

use crate::binding::TypeName;
use crate::context::NodeCodecContext;
use crate::error::{CodecError, Result};
use crate::factory::CodecContextFactory;
use crate::node::QName;
use crate::schema::SchemaNodeId;

/// Handle of a prototype in its factory's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrototypeId(pub(crate) u32);

impl PrototypeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Where a node shows up in the attribute tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// A node with its own name.
    Node(QName),
    /// An augmentation, which contributes these names to its parent.
    Augmentation(Vec<QName>),
}

/// Cheap descriptor of one schema node and its domain type.
///
/// Holds everything needed to construct the full codec context, which is
/// built on first use and memoized. The memo slot also keeps a failed
/// construction, so every caller sees the same error.
pub struct CodecPrototype {
    id: PrototypeId,
    schema: SchemaNodeId,
    binding: Option<TypeName>,
    address: Address,
    context: OnceLock<Result<Arc<NodeCodecContext>>>,
}

impl CodecPrototype {
    pub(crate) fn new(
        id: PrototypeId,
        schema: SchemaNodeId,
        binding: Option<TypeName>,
        address: Address,
    ) -> Self {
        CodecPrototype {
            id,
            schema,
            binding,
            address,
            context: OnceLock::new(),
        }
    }

    pub fn id(&self) -> PrototypeId {
        self.id
    }

    pub fn schema(&self) -> SchemaNodeId {
        self.schema
    }

    pub fn binding(&self) -> Option<TypeName> {
        self.binding
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The name of the node in the attribute tree.
    ///
    /// Augmentations have no name of their own; asking for one is a
    /// programming error.
    pub fn qname(&self) -> Result<&QName> {
        match &self.address {
            Address::Node(qname) => Ok(qname),
            Address::Augmentation(names) => Err(CodecError::Programming(format!(
                "augmentation {} is addressed by its children {names:?}, not by name",
                self.binding.unwrap_or("<unbound>")
            ))),
        }
    }

    /// Names this node contributes to its parent in the attribute tree.
    pub fn child_names(&self) -> &[QName] {
        match &self.address {
            Address::Node(qname) => std::slice::from_ref(qname),
            Address::Augmentation(names) => names,
        }
    }

    /// Returns the codec context, constructing it on first use.
    ///
    /// Concurrent first calls construct it once; all callers observe the
    /// same instance.
    pub fn context(&self, factory: &CodecContextFactory) -> Result<Arc<NodeCodecContext>> {
        if let Some(existing) = self.context.get() {
            trace!("context hit for prototype {:?}", self.id);
            return existing.clone();
        }
        self.context
            .get_or_init(|| factory.build_context(self))
            .clone()
    }

    pub fn is_built(&self) -> bool {
        self.context.get().is_some()
    }
}

impl fmt::Debug for CodecPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecPrototype")
            .field("id", &self.id)
            .field("schema", &self.schema)
            .field("binding", &self.binding)
            .field("address", &self.address)
            .field("built", &self.is_built())
            .finish()
    }
}
