use std::collections::{HashMap, HashSet};

use log::debug;

use crate::binding::{BindingObject, BindingType, TypeName};
use crate::error::{CodecError, Result};
use crate::node::QName;
use crate::schema::{SchemaContext, SchemaKind, SchemaNodeId};

/// An identity and the identities it derives from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySchema {
    qname: QName,
    binding: TypeName,
    bases: Vec<QName>,
}

impl IdentitySchema {
    pub fn new(qname: QName, binding: TypeName) -> Self {
        IdentitySchema {
            qname,
            binding,
            bases: Vec::new(),
        }
    }

    pub fn with_base(mut self, base: QName) -> Self {
        self.bases.push(base);
        self
    }

    pub fn qname(&self) -> &QName {
        &self.qname
    }

    pub fn binding(&self) -> TypeName {
        self.binding
    }

    pub fn bases(&self) -> &[QName] {
        &self.bases
    }
}

/// Schema plus the domain types generated from it.
///
/// This is the whole configuration of a codec tree. It is immutable once
/// built; a codec tree is bound to exactly one runtime context.
#[derive(Debug)]
pub struct BindingRuntimeContext {
    schema: SchemaContext,
    types: HashMap<TypeName, &'static BindingType>,
    type_schema: HashMap<TypeName, SchemaNodeId>,
    identities: HashMap<QName, IdentitySchema>,
    identity_types: HashMap<TypeName, QName>,
}

impl BindingRuntimeContext {
    pub fn builder(schema: SchemaContext) -> BindingRuntimeBuilder {
        BindingRuntimeBuilder {
            schema,
            types: Vec::new(),
            identities: Vec::new(),
        }
    }

    pub fn schema(&self) -> &SchemaContext {
        &self.schema
    }

    pub fn binding_type(&self, name: TypeName) -> Option<&'static BindingType> {
        self.types.get(name).copied()
    }

    /// The schema node a composite domain type is generated from.
    pub fn schema_for_type(&self, name: TypeName) -> Option<SchemaNodeId> {
        self.type_schema.get(name).copied()
    }

    pub fn identity(&self, qname: &QName) -> Option<&IdentitySchema> {
        self.identities.get(qname)
    }

    pub fn identity_for_type(&self, binding: TypeName) -> Option<&IdentitySchema> {
        self.identity_types
            .get(binding)
            .and_then(|qname| self.identities.get(qname))
    }

    /// Whether `identity` is `base` or transitively derives from it.
    pub fn is_derived_from(&self, identity: &QName, base: &QName) -> bool {
        let mut pending = vec![identity];
        let mut seen = HashSet::new();
        while let Some(current) = pending.pop() {
            if current == base {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(schema) = self.identities.get(current) {
                pending.extend(schema.bases.iter());
            }
        }
        false
    }
}

/// Collects domain types and identities for a [`BindingRuntimeContext`].
pub struct BindingRuntimeBuilder {
    schema: SchemaContext,
    types: Vec<&'static BindingType>,
    identities: Vec<IdentitySchema>,
}

impl BindingRuntimeBuilder {
    pub fn register<T: BindingObject>(self) -> Self {
        self.register_type(T::BINDING_TYPE)
    }

    pub fn register_type(mut self, ty: &'static BindingType) -> Self {
        self.types.push(ty);
        self
    }

    pub fn identity(mut self, identity: IdentitySchema) -> Self {
        self.identities.push(identity);
        self
    }

    pub fn build(self) -> Result<BindingRuntimeContext> {
        let mut types = HashMap::new();
        for ty in self.types {
            if let Some(previous) = types.insert(ty.name(), ty) {
                if previous != ty {
                    return Err(CodecError::SchemaMismatch(format!(
                        "domain type {} registered twice with different shapes",
                        ty.name()
                    )));
                }
            }
        }

        let mut type_schema = HashMap::new();
        for (id, node) in self.schema.iter() {
            let composite = matches!(
                node.kind(),
                SchemaKind::Container { .. }
                    | SchemaKind::List { .. }
                    | SchemaKind::Choice
                    | SchemaKind::Case
                    | SchemaKind::Augmentation
                    | SchemaKind::Action
                    | SchemaKind::Input
                    | SchemaKind::Output
            );
            let Some(binding) = node.binding().filter(|_| composite) else {
                continue;
            };
            if let Some(previous) = type_schema.insert(binding, id) {
                return Err(CodecError::SchemaMismatch(format!(
                    "domain type {binding} is bound to both {} and {}",
                    self.schema.node(previous).qname(),
                    node.qname()
                )));
            }
        }

        let mut identities = HashMap::new();
        let mut identity_types = HashMap::new();
        for identity in self.identities {
            identity_types.insert(identity.binding, identity.qname.clone());
            identities.insert(identity.qname.clone(), identity);
        }

        debug!(
            "runtime context: {} schema nodes, {} domain types, {} identities",
            self.schema.len(),
            types.len(),
            identities.len()
        );
        Ok(BindingRuntimeContext {
            schema: self.schema,
            types,
            type_schema,
            identities,
            identity_types,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaNode;

    fn q(name: &str) -> QName {
        QName::new("urn:test", name)
    }

    #[test]
    fn identity_derivation_is_transitive() {
        let schema = SchemaContext::builder().build().unwrap();
        let runtime = BindingRuntimeContext::builder(schema)
            .identity(IdentitySchema::new(q("crypto-base"), "CryptoBase"))
            .identity(IdentitySchema::new(q("aes"), "Aes").with_base(q("crypto-base")))
            .identity(IdentitySchema::new(q("aes-256"), "Aes256").with_base(q("aes")))
            .identity(IdentitySchema::new(q("other"), "Other"))
            .build()
            .unwrap();
        assert!(runtime.is_derived_from(&q("aes-256"), &q("crypto-base")));
        assert!(runtime.is_derived_from(&q("aes"), &q("aes")));
        assert!(!runtime.is_derived_from(&q("other"), &q("crypto-base")));
        assert_eq!(runtime.identity_for_type("Aes").unwrap().qname(), &q("aes"));
    }

    #[test]
    fn type_bound_twice_is_rejected() {
        let mut builder = SchemaContext::builder();
        builder.root(SchemaNode::container(q("a")).with_binding("Shared"));
        builder.root(SchemaNode::container(q("b")).with_binding("Shared"));
        let schema = builder.build().unwrap();
        let err = BindingRuntimeContext::builder(schema).build().unwrap_err();
        assert!(matches!(err, CodecError::SchemaMismatch(_)));
    }

    #[test]
    fn conflicting_registration_is_rejected() {
        static A: BindingType = BindingType::new("Thing", &["a"]);
        static B: BindingType = BindingType::new("Thing", &["b"]);
        let schema = SchemaContext::builder().build().unwrap();
        let err = BindingRuntimeContext::builder(schema)
            .register_type(&A)
            .register_type(&A)
            .register_type(&B)
            .build()
            .unwrap_err();
        assert!(matches!(err, CodecError::SchemaMismatch(_)));
    }
}
