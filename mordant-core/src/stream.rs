//! Event-based construction of attribute trees.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{CodecError, Result};
use crate::node::{Children, EntryIdentifier, NormalizedNode, OpaqueData, QName, Value};

/// Receiver of tree-building events.
///
/// Every `start_*` call is balanced by one [`end_node`](Self::end_node).
/// Leaves, leaf-set entries and opaque nodes are written in a single call.
pub trait NormalizedNodeStreamWriter {
    fn start_container(&mut self, name: &QName) -> Result<()>;
    fn start_choice(&mut self, name: &QName) -> Result<()>;
    fn start_map(&mut self, name: &QName, ordered: bool) -> Result<()>;
    fn start_map_entry(&mut self, id: &EntryIdentifier) -> Result<()>;
    fn start_unkeyed_list(&mut self, name: &QName) -> Result<()>;
    fn start_unkeyed_entry(&mut self, name: &QName) -> Result<()>;
    fn start_leaf_set(&mut self, name: &QName, ordered: bool) -> Result<()>;
    fn leaf_set_entry(&mut self, value: &Value) -> Result<()>;
    fn leaf(&mut self, name: &QName, value: &Value) -> Result<()>;
    fn opaque(&mut self, name: &QName, body: &OpaqueData) -> Result<()>;
    fn end_node(&mut self) -> Result<()>;

    /// Writes a complete, already built subtree.
    ///
    /// The default replays the subtree as events. Writers that build trees
    /// may splice the shared node instead.
    fn node(&mut self, node: &Arc<NormalizedNode>) -> Result<()> {
        NormalizedNodeWriter::new(self).write(node)
    }
}

/// Replays a built tree as stream events.
pub struct NormalizedNodeWriter<'a, W: ?Sized> {
    writer: &'a mut W,
}

impl<'a, W: NormalizedNodeStreamWriter + ?Sized> NormalizedNodeWriter<'a, W> {
    pub fn new(writer: &'a mut W) -> Self {
        NormalizedNodeWriter { writer }
    }

    pub fn write(&mut self, node: &NormalizedNode) -> Result<()> {
        match node {
            NormalizedNode::Leaf { name, value } => self.writer.leaf(name, value),
            NormalizedNode::LeafSet {
                name,
                ordered,
                values,
            } => {
                self.writer.start_leaf_set(name, *ordered)?;
                for value in values {
                    self.writer.leaf_set_entry(value)?;
                }
                self.writer.end_node()
            }
            NormalizedNode::Container { name, children } => {
                self.writer.start_container(name)?;
                self.write_children(children)
            }
            NormalizedNode::Choice { name, children } => {
                self.writer.start_choice(name)?;
                self.write_children(children)
            }
            NormalizedNode::Map {
                name,
                ordered,
                entries,
            } => {
                self.writer.start_map(name, *ordered)?;
                for entry in entries.values() {
                    self.write(entry)?;
                }
                self.writer.end_node()
            }
            NormalizedNode::MapEntry { id, children } => {
                self.writer.start_map_entry(id)?;
                self.write_children(children)
            }
            NormalizedNode::UnkeyedList { name, entries } => {
                self.writer.start_unkeyed_list(name)?;
                for entry in entries {
                    self.write(entry)?;
                }
                self.writer.end_node()
            }
            NormalizedNode::UnkeyedEntry { name, children } => {
                self.writer.start_unkeyed_entry(name)?;
                self.write_children(children)
            }
            NormalizedNode::Opaque { name, body } => self.writer.opaque(name, body),
        }
    }

    fn write_children(&mut self, children: &Children) -> Result<()> {
        for child in children.values() {
            self.write(child)?;
        }
        self.writer.end_node()
    }
}

enum Frame {
    Container {
        name: QName,
        children: Children,
    },
    Choice {
        name: QName,
        children: Children,
    },
    Map {
        name: QName,
        ordered: bool,
        entries: IndexMap<EntryIdentifier, Arc<NormalizedNode>>,
    },
    MapEntry {
        id: EntryIdentifier,
        children: Children,
    },
    UnkeyedList {
        name: QName,
        entries: Vec<Arc<NormalizedNode>>,
    },
    UnkeyedEntry {
        name: QName,
        children: Children,
    },
    LeafSet {
        name: QName,
        ordered: bool,
        values: Vec<Value>,
    },
}

impl Frame {
    fn into_node(self) -> NormalizedNode {
        match self {
            Frame::Container { name, children } => NormalizedNode::Container { name, children },
            Frame::Choice { name, children } => NormalizedNode::Choice { name, children },
            Frame::Map {
                name,
                ordered,
                entries,
            } => NormalizedNode::Map {
                name,
                ordered,
                entries,
            },
            Frame::MapEntry { id, children } => NormalizedNode::MapEntry { id, children },
            Frame::UnkeyedList { name, entries } => NormalizedNode::UnkeyedList { name, entries },
            Frame::UnkeyedEntry { name, children } => NormalizedNode::UnkeyedEntry { name, children },
            Frame::LeafSet {
                name,
                ordered,
                values,
            } => NormalizedNode::LeafSet {
                name,
                ordered,
                values,
            },
        }
    }
}

/// Stream writer that assembles a [`NormalizedNode`].
///
/// Exactly one top-level node may be written; a lone list entry is allowed
/// there. Subtrees passed through
/// [`node`](NormalizedNodeStreamWriter::node) are spliced in by reference.
#[derive(Default)]
pub struct NormalizedNodeBuilder {
    stack: Vec<Frame>,
    result: Option<Arc<NormalizedNode>>,
}

impl NormalizedNodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the finished tree.
    pub fn build(self) -> Result<Arc<NormalizedNode>> {
        if !self.stack.is_empty() {
            return Err(CodecError::IllegalState(format!(
                "{} node(s) still open",
                self.stack.len()
            )));
        }
        self.result
            .ok_or_else(|| CodecError::IllegalState("no node was written".into()))
    }

    fn open(&mut self, frame: Frame) -> Result<()> {
        if self.stack.is_empty() && self.result.is_some() {
            return Err(CodecError::IllegalState(
                "a top-level node was already written".into(),
            ));
        }
        self.stack.push(frame);
        Ok(())
    }

    fn attach(&mut self, node: Arc<NormalizedNode>) -> Result<()> {
        let Some(top) = self.stack.last_mut() else {
            if self.result.is_some() {
                return Err(CodecError::IllegalState(
                    "a top-level node was already written".into(),
                ));
            }
            self.result = Some(node);
            return Ok(());
        };
        match top {
            Frame::Container { children, .. }
            | Frame::Choice { children, .. }
            | Frame::MapEntry { children, .. }
            | Frame::UnkeyedEntry { children, .. } => {
                let name = node.name().clone();
                if children.insert(name.clone(), node).is_some() {
                    return Err(CodecError::IllegalState(format!(
                        "child {name} written twice"
                    )));
                }
                Ok(())
            }
            Frame::Map { name, entries, .. } => match node.as_ref() {
                NormalizedNode::MapEntry { id, .. } if id.name() == name => {
                    entries.insert(id.clone(), node.clone());
                    Ok(())
                }
                other => Err(CodecError::IllegalState(format!(
                    "{} {} cannot be written into map {name}",
                    other.kind(),
                    other.name()
                ))),
            },
            Frame::UnkeyedList { name, entries } => match node.as_ref() {
                NormalizedNode::UnkeyedEntry { name: entry, .. } if entry == name => {
                    entries.push(node.clone());
                    Ok(())
                }
                other => Err(CodecError::IllegalState(format!(
                    "{} {} cannot be written into unkeyed list {name}",
                    other.kind(),
                    other.name()
                ))),
            },
            Frame::LeafSet { name, .. } => Err(CodecError::IllegalState(format!(
                "leaf-set {name} accepts only entries"
            ))),
        }
    }
}

impl NormalizedNodeStreamWriter for NormalizedNodeBuilder {
    fn start_container(&mut self, name: &QName) -> Result<()> {
        self.open(Frame::Container {
            name: name.clone(),
            children: Children::new(),
        })
    }

    fn start_choice(&mut self, name: &QName) -> Result<()> {
        self.open(Frame::Choice {
            name: name.clone(),
            children: Children::new(),
        })
    }

    fn start_map(&mut self, name: &QName, ordered: bool) -> Result<()> {
        self.open(Frame::Map {
            name: name.clone(),
            ordered,
            entries: IndexMap::new(),
        })
    }

    fn start_map_entry(&mut self, id: &EntryIdentifier) -> Result<()> {
        match self.stack.last() {
            None => {}
            Some(Frame::Map { name, .. }) if name == id.name() => {}
            Some(_) => {
                return Err(CodecError::IllegalState(format!(
                    "map entry {} must be written inside its map",
                    id.name()
                )));
            }
        }
        self.open(Frame::MapEntry {
            id: id.clone(),
            children: Children::new(),
        })
    }

    fn start_unkeyed_list(&mut self, name: &QName) -> Result<()> {
        self.open(Frame::UnkeyedList {
            name: name.clone(),
            entries: Vec::new(),
        })
    }

    fn start_unkeyed_entry(&mut self, name: &QName) -> Result<()> {
        match self.stack.last() {
            None => {}
            Some(Frame::UnkeyedList { name: list, .. }) if list == name => {}
            Some(_) => {
                return Err(CodecError::IllegalState(format!(
                    "unkeyed entry {name} must be written inside its list"
                )));
            }
        }
        self.open(Frame::UnkeyedEntry {
            name: name.clone(),
            children: Children::new(),
        })
    }

    fn start_leaf_set(&mut self, name: &QName, ordered: bool) -> Result<()> {
        self.open(Frame::LeafSet {
            name: name.clone(),
            ordered,
            values: Vec::new(),
        })
    }

    fn leaf_set_entry(&mut self, value: &Value) -> Result<()> {
        match self.stack.last_mut() {
            Some(Frame::LeafSet { values, .. }) => {
                values.push(value.clone());
                Ok(())
            }
            _ => Err(CodecError::IllegalState(
                "leaf-set entry outside of a leaf-set".into(),
            )),
        }
    }

    fn leaf(&mut self, name: &QName, value: &Value) -> Result<()> {
        self.attach(Arc::new(NormalizedNode::Leaf {
            name: name.clone(),
            value: value.clone(),
        }))
    }

    fn opaque(&mut self, name: &QName, body: &OpaqueData) -> Result<()> {
        self.attach(Arc::new(NormalizedNode::Opaque {
            name: name.clone(),
            body: body.clone(),
        }))
    }

    fn end_node(&mut self) -> Result<()> {
        let frame = self
            .stack
            .pop()
            .ok_or_else(|| CodecError::IllegalState("end_node without an open node".into()))?;
        self.attach(Arc::new(frame.into_node()))
    }

    fn node(&mut self, node: &Arc<NormalizedNode>) -> Result<()> {
        self.attach(node.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::IntValue;

    fn q(name: &str) -> QName {
        QName::new("urn:test", name)
    }

    fn sample() -> NormalizedNode {
        NormalizedNode::container(
            q("top"),
            [
                NormalizedNode::leaf(q("name"), "x"),
                NormalizedNode::ordered_leaf_set(q("tags"), [Value::from("a")]),
                NormalizedNode::map(
                    q("list"),
                    [NormalizedNode::map_entry(
                        EntryIdentifier::new(q("list"), [(q("id"), Value::Int(IntValue::U8(1)))]),
                        [NormalizedNode::leaf(q("id"), IntValue::U8(1))],
                    )],
                ),
                NormalizedNode::unkeyed_list(
                    q("items"),
                    [NormalizedNode::unkeyed_entry(
                        q("items"),
                        [NormalizedNode::leaf(q("v"), "1")],
                    )],
                ),
                NormalizedNode::choice(q("ch"), [NormalizedNode::leaf(q("alt"), true)]),
            ],
        )
    }

    #[test]
    fn replay_rebuilds_identical_tree() {
        let original = sample();
        let mut builder = NormalizedNodeBuilder::new();
        NormalizedNodeWriter::new(&mut builder).write(&original).unwrap();
        assert_eq!(*builder.build().unwrap(), original);
    }

    #[test]
    fn node_splices_shared_subtree() {
        let shared = Arc::new(NormalizedNode::container(
            q("inner"),
            [NormalizedNode::leaf(q("a"), "b")],
        ));
        let mut builder = NormalizedNodeBuilder::new();
        builder.start_container(&q("outer")).unwrap();
        builder.node(&shared).unwrap();
        builder.end_node().unwrap();
        let built = builder.build().unwrap();
        assert!(Arc::ptr_eq(built.child(&q("inner")).unwrap(), &shared));
    }

    #[test]
    fn unbalanced_events_are_rejected() {
        let mut builder = NormalizedNodeBuilder::new();
        assert!(matches!(builder.end_node(), Err(CodecError::IllegalState(_))));

        builder.start_container(&q("top")).unwrap();
        assert!(matches!(builder.build(), Err(CodecError::IllegalState(_))));
    }

    #[test]
    fn second_top_level_node_is_rejected() {
        let mut builder = NormalizedNodeBuilder::new();
        builder.leaf(&q("a"), &Value::Empty).unwrap();
        assert!(matches!(
            builder.start_container(&q("b")),
            Err(CodecError::IllegalState(_))
        ));
    }

    #[test]
    fn entries_must_match_their_list() {
        let mut builder = NormalizedNodeBuilder::new();
        builder.start_map(&q("list"), false).unwrap();
        let foreign = EntryIdentifier::new(q("other"), []);
        assert!(matches!(
            builder.start_map_entry(&foreign),
            Err(CodecError::IllegalState(_))
        ));
        assert!(matches!(
            builder.leaf(&q("loose"), &Value::Empty),
            Err(CodecError::IllegalState(_))
        ));
    }

    #[test]
    fn lone_entry_is_a_valid_tree() {
        let id = EntryIdentifier::new(q("list"), [(q("id"), Value::from("x"))]);
        let mut builder = NormalizedNodeBuilder::new();
        builder.start_map_entry(&id).unwrap();
        builder.leaf(&q("id"), &Value::from("x")).unwrap();
        builder.end_node().unwrap();
        assert_eq!(
            *builder.build().unwrap(),
            NormalizedNode::map_entry(id, [NormalizedNode::leaf(q("id"), "x")])
        );

        let mut builder = NormalizedNodeBuilder::new();
        builder.start_container(&q("top")).unwrap();
        assert!(matches!(
            builder.start_unkeyed_entry(&q("items")),
            Err(CodecError::IllegalState(_))
        ));
    }

    #[test]
    fn duplicate_children_are_rejected() {
        let mut builder = NormalizedNodeBuilder::new();
        builder.start_container(&q("top")).unwrap();
        builder.leaf(&q("a"), &Value::Empty).unwrap();
        assert!(matches!(
            builder.leaf(&q("a"), &Value::Empty),
            Err(CodecError::IllegalState(_))
        ));
    }
}
