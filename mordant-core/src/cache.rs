//! Identity-keyed caching of serialized subtrees.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, trace};

use crate::binding::{DataObject, DomainValue, TypeName};
use crate::context::NodeCodecContext;
use crate::error::Result;
use crate::factory::CodecContextFactory;
use crate::lazy::decode;
use crate::node::NormalizedNode;
use crate::prototype::PrototypeId;
use crate::serializer::StreamContext;
use crate::stream::NormalizedNodeBuilder;

/// Codec for one domain type that reuses serialized subtrees of selected
/// types.
///
/// Objects of a cached type are serialized once per object instance; later
/// serializations of the same instance splice in the stored subtree. Entries
/// are never evicted and keep their objects alive for the codec's lifetime.
/// With no cached types this behaves exactly like the plain serializer.
pub struct CachingCodec {
    factory: Arc<CodecContextFactory>,
    context: Arc<NodeCodecContext>,
    cached: HashSet<TypeName>,
    caches: DashMap<PrototypeId, Arc<ValueCache>>,
}

impl CachingCodec {
    pub(crate) fn new(
        factory: Arc<CodecContextFactory>,
        context: Arc<NodeCodecContext>,
        cached: impl IntoIterator<Item = TypeName>,
    ) -> Self {
        CachingCodec {
            factory,
            context,
            cached: cached.into_iter().collect(),
            caches: DashMap::new(),
        }
    }

    pub fn is_caching(&self) -> bool {
        !self.cached.is_empty()
    }

    pub fn is_cached(&self, binding: TypeName) -> bool {
        self.cached.contains(binding)
    }

    /// Serializes `object`, reusing cached subtrees.
    pub fn serialize(&self, object: &Arc<dyn DataObject>) -> Result<Arc<NormalizedNode>> {
        match self.cache_for(&self.context) {
            Some(cache) => cache.get(self, &self.context, object),
            None => self.compute(&self.context, object.as_ref()),
        }
    }

    pub fn deserialize(&self, node: &Arc<NormalizedNode>) -> Result<Option<DomainValue>> {
        decode(&self.factory, &self.context, node)
    }

    /// The cache for objects written through `context`, if their type is
    /// cached. Only contexts producing a whole node qualify.
    pub(crate) fn cache_for(&self, context: &NodeCodecContext) -> Option<Arc<ValueCache>> {
        if !matches!(
            context,
            NodeCodecContext::Container(_)
                | NodeCodecContext::List(_)
                | NodeCodecContext::KeyedList(_)
        ) {
            return None;
        }
        let data = context.data_object()?;
        if !self.cached.contains(data.binding().name()) {
            return None;
        }
        let cache = self
            .caches
            .entry(data.prototype())
            .or_insert_with(|| {
                debug!("created value cache for {}", data.binding().name());
                Arc::new(ValueCache::default())
            })
            .clone();
        Some(cache)
    }

    fn compute(&self, context: &NodeCodecContext, object: &dyn DataObject) -> Result<Arc<NormalizedNode>> {
        let mut builder = NormalizedNodeBuilder::new();
        StreamContext::new(&self.factory, Some(self)).write_object(context, object, &mut builder)?;
        builder.build()
    }
}

/// Data object compared and hashed by address.
struct ObjectIdentity(Arc<dyn DataObject>);

impl PartialEq for ObjectIdentity {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl Eq for ObjectIdentity {}

impl Hash for ObjectIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const () as usize).hash(state);
    }
}

/// Serialized subtrees of one cached context, keyed by object identity.
#[derive(Default)]
pub(crate) struct ValueCache {
    entries: DashMap<ObjectIdentity, Arc<NormalizedNode>>,
}

impl ValueCache {
    /// Returns the stored subtree for `object`, serializing it on a miss.
    ///
    /// Serialization runs without holding the map lock. When two threads
    /// miss at once, the first stored subtree wins and both return it.
    pub(crate) fn get(
        &self,
        codec: &CachingCodec,
        context: &NodeCodecContext,
        object: &Arc<dyn DataObject>,
    ) -> Result<Arc<NormalizedNode>> {
        let key = ObjectIdentity(object.clone());
        if let Some(hit) = self.entries.get(&key).map(|entry| entry.clone()) {
            trace!("cache hit for {}", object.binding_type().name());
            return Ok(hit);
        }
        trace!("cache miss for {}", object.binding_type().name());
        let node = codec.compute(context, object.as_ref())?;
        Ok(self.entries.entry(key).or_insert(node).clone())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
