//! Contexts of leaf-like nodes: leaves, leaf-lists and anydata.

use std::sync::Arc;

use crate::binding::{OpaqueObject, Scalar, TypeName};
use crate::error::{CodecError, Result};
use crate::factory::CodecContextFactory;
use crate::node::{NormalizedNode, QName, Value};
use crate::prototype::CodecPrototype;
use crate::schema::SchemaKind;
use crate::value_codec::ValueCodec;

fn unexpected(expected: &str, qname: &QName, node: &NormalizedNode) -> CodecError {
    CodecError::IncorrectNesting(format!(
        "expected {expected} {qname}, found {} {}",
        node.kind(),
        node.name()
    ))
}

#[derive(Debug)]
pub struct LeafCodecContext {
    qname: QName,
    codec: Arc<dyn ValueCodec>,
    default: Option<Scalar>,
}

impl LeafCodecContext {
    pub(crate) fn new(factory: &CodecContextFactory, prototype: &CodecPrototype) -> Result<Self> {
        let node = factory.schema().node(prototype.schema());
        let SchemaKind::Leaf { ty, default } = node.kind() else {
            return Err(CodecError::Programming(format!("{} is not a leaf", node.qname())));
        };
        let codec = factory.value_codec_for(ty)?;
        let default = default
            .as_ref()
            .map(|value| codec.deserialize(value))
            .transpose()
            .map_err(|e| {
                CodecError::Programming(format!("default of leaf {} is invalid: {e}", node.qname()))
            })?;
        Ok(LeafCodecContext {
            qname: node.qname().clone(),
            codec,
            default,
        })
    }

    pub fn qname(&self) -> &QName {
        &self.qname
    }

    pub fn codec(&self) -> &Arc<dyn ValueCodec> {
        &self.codec
    }

    /// The schema default, decoded into its domain representation.
    pub fn default(&self) -> Option<&Scalar> {
        self.default.as_ref()
    }

    pub fn serialize(&self, value: &Scalar) -> Result<Value> {
        self.codec.serialize(value)
    }

    pub fn deserialize(&self, node: &NormalizedNode) -> Result<Scalar> {
        match node {
            NormalizedNode::Leaf { name, value } if name == &self.qname => {
                self.codec.deserialize(value)
            }
            other => Err(unexpected("leaf", &self.qname, other)),
        }
    }
}

#[derive(Debug)]
pub struct LeafListCodecContext {
    qname: QName,
    codec: Arc<dyn ValueCodec>,
    ordered: bool,
}

impl LeafListCodecContext {
    pub(crate) fn new(factory: &CodecContextFactory, prototype: &CodecPrototype) -> Result<Self> {
        let node = factory.schema().node(prototype.schema());
        let SchemaKind::LeafList { ty, ordered } = node.kind() else {
            return Err(CodecError::Programming(format!(
                "{} is not a leaf-list",
                node.qname()
            )));
        };
        Ok(LeafListCodecContext {
            qname: node.qname().clone(),
            codec: factory.value_codec_for(ty)?,
            ordered: *ordered,
        })
    }

    pub fn qname(&self) -> &QName {
        &self.qname
    }

    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    pub fn serialize(&self, value: &Scalar) -> Result<Value> {
        self.codec.serialize(value)
    }

    /// Decodes every entry; an empty leaf-set yields an empty list.
    pub fn deserialize(&self, node: &NormalizedNode) -> Result<Vec<Scalar>> {
        match node {
            NormalizedNode::LeafSet { name, values, .. } if name == &self.qname => values
                .iter()
                .map(|value| self.codec.deserialize(value))
                .collect(),
            other => Err(unexpected("leaf-set", &self.qname, other)),
        }
    }
}

/// Anydata: the payload passes through untouched.
#[derive(Debug)]
pub struct OpaqueCodecContext {
    qname: QName,
    binding: TypeName,
}

impl OpaqueCodecContext {
    pub(crate) fn new(factory: &CodecContextFactory, prototype: &CodecPrototype) -> Result<Self> {
        let node = factory.schema().node(prototype.schema());
        let binding = prototype.binding().ok_or_else(|| {
            CodecError::SchemaMismatch(format!("anydata {} has no domain type", node.qname()))
        })?;
        Ok(OpaqueCodecContext {
            qname: node.qname().clone(),
            binding,
        })
    }

    pub fn qname(&self) -> &QName {
        &self.qname
    }

    pub fn binding(&self) -> TypeName {
        self.binding
    }

    pub fn deserialize(&self, node: &NormalizedNode) -> Result<OpaqueObject> {
        match node {
            NormalizedNode::Opaque { name, body } if name == &self.qname => Ok(OpaqueObject {
                binding: self.binding,
                data: body.clone(),
            }),
            other => Err(unexpected("anydata", &self.qname, other)),
        }
    }
}
