//! Translation between domain paths and attribute tree paths.
//!
//! A list shows up twice in a node path: once for the list itself and once
//! for the entry (`/list/list[key]`, or `/list/list` for every entry).
//! Choices appear in node paths but not in domain paths; augmentations appear
//! in domain paths but not in node paths.

use std::sync::Arc;

use crate::binding::{BindingPath, BindingStep, TypeName};
use crate::context::NodeCodecContext;
use crate::error::{CodecError, Result};
use crate::factory::CodecContextFactory;
use crate::node::{NodePath, PathArgument, QName};

fn illegal(message: String) -> CodecError {
    CodecError::IllegalArgument(message)
}

/// Unknown names are a bad path, not a bad tree.
fn as_illegal(error: CodecError) -> CodecError {
    match error {
        CodecError::IncorrectNesting(message) | CodecError::SchemaMismatch(message) => {
            CodecError::IllegalArgument(message)
        }
        other => other,
    }
}

impl CodecContextFactory {
    /// Translates a domain path into a node path.
    pub fn to_node_path(&self, path: &BindingPath) -> Result<NodePath> {
        let mut steps = path.steps().iter();
        let first = steps
            .next()
            .ok_or_else(|| illegal("empty domain path".into()))?;
        let root = self.runtime().schema_for_type(first.binding).ok_or_else(|| {
            illegal(format!("{} is not bound to any schema node", first.binding))
        })?;
        if !self.schema().is_root(root) {
            return Err(illegal(format!(
                "domain path must start at a top-level type, {} is nested",
                first.binding
            )));
        }

        let mut args = Vec::new();
        let mut current = self.context_for_type(first.binding)?;
        self.append_args(&current, first, &mut args)?;
        for step in steps {
            current = self
                .stream_child(&current, step.binding, &mut args)?
                .ok_or_else(|| {
                    illegal(format!("{} is not a child of {}", step.binding, current.describe()))
                })?;
            self.append_args(&current, step, &mut args)?;
        }
        Ok(NodePath::new(args))
    }

    fn append_args(
        &self,
        context: &NodeCodecContext,
        step: &BindingStep,
        args: &mut Vec<PathArgument>,
    ) -> Result<()> {
        let no_key = || -> Result<()> {
            match step.key {
                Some(_) => Err(illegal(format!(
                    "{} is not a keyed list, it takes no key",
                    step.binding
                ))),
                None => Ok(()),
            }
        };
        match context {
            NodeCodecContext::Container(data) => {
                no_key()?;
                args.push(PathArgument::Node(data.qname().clone()));
            }
            NodeCodecContext::Augmentation(_) => no_key()?,
            NodeCodecContext::List(list) => {
                no_key()?;
                let qname = list.entry().qname();
                args.push(PathArgument::Node(qname.clone()));
                args.push(PathArgument::Node(qname.clone()));
            }
            NodeCodecContext::KeyedList(map) => {
                let qname = map.entry().qname();
                args.push(PathArgument::Node(qname.clone()));
                args.push(match &step.key {
                    Some(key) => PathArgument::Entry(map.key().entry_identifier(qname, key)?),
                    None => PathArgument::Node(qname.clone()),
                });
            }
            other => {
                return Err(illegal(format!(
                    "{} cannot be a step of a domain path",
                    other.describe()
                )));
            }
        }
        Ok(())
    }

    /// Finds the child of `parent` bound to `binding`, looking into the
    /// cases of its choices. Choices crossed on the way are recorded in
    /// `args`.
    fn stream_child(
        &self,
        parent: &NodeCodecContext,
        binding: TypeName,
        args: &mut Vec<PathArgument>,
    ) -> Result<Option<Arc<NodeCodecContext>>> {
        let Some(data) = parent.data_object() else {
            return Ok(None);
        };
        if let Some(id) = data
            .child_by_type(binding)
            .or_else(|| data.augmentation_for_type(binding))
        {
            return Ok(Some(self.context(id)?));
        }
        for choice_id in data.choices() {
            let choice_context = self.context(*choice_id)?;
            let NodeCodecContext::Choice(choice) = choice_context.as_ref() else {
                continue;
            };
            for case_id in choice.cases() {
                let case = self.context(case_id)?;
                let mut nested = Vec::new();
                if let Some(found) = self.stream_child(&case, binding, &mut nested)? {
                    args.push(PathArgument::Node(choice.qname().clone()));
                    args.extend(nested);
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    /// Translates a node path into a domain path. The path must address a
    /// container or list.
    pub fn from_node_path(&self, path: &NodePath) -> Result<BindingPath> {
        let mut steps = Vec::new();
        let target = self.lookup(path, Some(&mut steps))?;
        match target.as_ref() {
            NodeCodecContext::Container(_)
            | NodeCodecContext::List(_)
            | NodeCodecContext::KeyedList(_) => Ok(BindingPath::new(steps)),
            other => Err(illegal(format!(
                "{path} addresses {}, not a data object",
                other.describe()
            ))),
        }
    }

    /// The context responsible for the subtree at `path`.
    pub fn context_for_path(&self, path: &NodePath) -> Result<Arc<NodeCodecContext>> {
        self.lookup(path, None)
    }

    fn lookup(
        &self,
        path: &NodePath,
        mut steps: Option<&mut Vec<BindingStep>>,
    ) -> Result<Arc<NodeCodecContext>> {
        let mut push = |binding: Option<TypeName>, key| {
            if let (Some(steps), Some(binding)) = (steps.as_deref_mut(), binding) {
                steps.push(BindingStep { binding, key });
            }
        };

        let mut current: Option<Arc<NodeCodecContext>> = None;
        let mut open_list: Option<Arc<NodeCodecContext>> = None;
        let mut leaf_entry = false;

        for arg in path.iter() {
            if let Some(list) = open_list.take() {
                let qname = list.qname()?;
                let key = match (arg, list.as_ref()) {
                    (PathArgument::Entry(id), NodeCodecContext::KeyedList(map))
                        if id.name() == qname =>
                    {
                        Some(map.key().binding_key(id).map_err(as_illegal)?)
                    }
                    (PathArgument::Node(name), _) if name == qname => None,
                    _ => {
                        return Err(illegal(format!(
                            "list {qname} must be referenced twice, found {arg} instead"
                        )));
                    }
                };
                push(list.binding(), key);
                current = Some(list);
                continue;
            }

            let next = match (&current, arg) {
                (None, PathArgument::Node(name)) => self
                    .root_prototype(name)
                    .map_err(as_illegal)?
                    .context(self)?,
                (None, other) => {
                    return Err(illegal(format!("path must start with a node, found {other}")));
                }
                (Some(context), arg) => match context.as_ref() {
                    NodeCodecContext::LeafList(leaf_list) => match arg {
                        PathArgument::Value(name, _) if name == leaf_list.qname() && !leaf_entry => {
                            leaf_entry = true;
                            continue;
                        }
                        _ => return Err(past_leaf(leaf_list.qname(), arg)),
                    },
                    NodeCodecContext::Leaf(leaf) => return Err(past_leaf(leaf.qname(), arg)),
                    NodeCodecContext::Opaque(opaque) => return Err(past_leaf(opaque.qname(), arg)),
                    _ => {
                        let PathArgument::Node(name) = arg else {
                            return Err(illegal(format!(
                                "{arg} must be preceded by a reference to its list"
                            )));
                        };
                        let resolved = context.resolve_child(self, name).map_err(as_illegal)?;
                        if let Some(augmentation) = &resolved.augmentation {
                            push(augmentation.binding(), None);
                        }
                        resolved.context
                    }
                },
            };

            match next.as_ref() {
                NodeCodecContext::List(_) | NodeCodecContext::KeyedList(_) => {
                    open_list = Some(next);
                    continue;
                }
                NodeCodecContext::Container(_) => push(next.binding(), None),
                _ => {}
            }
            current = Some(next);
        }

        if let Some(list) = open_list {
            push(list.binding(), None);
            return Ok(list);
        }
        current.ok_or_else(|| illegal("empty node path".into()))
    }
}

fn past_leaf(leaf: &QName, arg: &PathArgument) -> CodecError {
    illegal(format!("cannot step past {leaf} to {arg}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindingKey;
    use crate::node::{EntryIdentifier, Value};
    use crate::testing::{self, q};

    fn factory() -> Arc<CodecContextFactory> {
        CodecContextFactory::new(testing::runtime())
    }

    fn entry_a() -> EntryIdentifier {
        EntryIdentifier::new(q("top-list"), [(q("id"), Value::from("a"))])
    }

    #[test]
    fn keyed_entry_round_trips() {
        let factory = factory();
        let binding = BindingPath::root("Top")
            .entry("TopList", BindingKey::single("a"))
            .child("Nested");
        let path = factory.to_node_path(&binding).unwrap();
        assert_eq!(
            path,
            NodePath::default()
                .node(q("top"))
                .node(q("top-list"))
                .entry(entry_a())
                .node(q("nested"))
        );
        assert_eq!(factory.from_node_path(&path).unwrap(), binding);
    }

    #[test]
    fn wildcard_list_round_trips() {
        let factory = factory();
        let binding = BindingPath::root("Top").child("TopList");
        let path = factory.to_node_path(&binding).unwrap();
        assert_eq!(
            path,
            NodePath::default()
                .node(q("top"))
                .node(q("top-list"))
                .node(q("top-list"))
        );
        assert_eq!(factory.from_node_path(&path).unwrap(), binding);

        let open = NodePath::default().node(q("top")).node(q("top-list"));
        assert_eq!(factory.from_node_path(&open).unwrap(), binding);
    }

    #[test]
    fn recursive_unkeyed_list() {
        let factory = factory();
        let binding = BindingPath::root("Top").child("Item").child("Item");
        let path = factory.to_node_path(&binding).unwrap();
        assert_eq!(path.len(), 5);
        assert_eq!(factory.from_node_path(&path).unwrap(), binding);
    }

    #[test]
    fn leaf_paths_resolve_but_are_not_objects() {
        let factory = factory();
        let path = NodePath::default().node(q("top")).node(q("tags"));
        let context = factory.context_for_path(&path).unwrap();
        assert!(matches!(context.as_ref(), NodeCodecContext::LeafList(_)));

        let mut entry = path.clone();
        entry.push(PathArgument::Value(q("tags"), Value::from("x")));
        assert!(factory.context_for_path(&entry).is_ok());
        assert!(matches!(
            factory.from_node_path(&entry),
            Err(CodecError::IllegalArgument(_))
        ));

        let past = NodePath::default().node(q("top")).node(q("name")).node(q("x"));
        assert!(matches!(
            factory.context_for_path(&past),
            Err(CodecError::IllegalArgument(_))
        ));
    }

    #[test]
    fn choice_and_augmentation_children() {
        let factory = factory();
        let radius = NodePath::default().node(q("top")).node(q("shape")).node(q("radius"));
        assert!(matches!(
            factory.context_for_path(&radius).unwrap().as_ref(),
            NodeCodecContext::Leaf(_)
        ));

        let extra = NodePath::default().node(q("top")).node(q("extra"));
        assert!(matches!(
            factory.context_for_path(&extra).unwrap().as_ref(),
            NodeCodecContext::Leaf(_)
        ));
    }

    #[test]
    fn malformed_paths_are_illegal() {
        let factory = factory();
        let cases = [
            NodePath::default(),
            NodePath::default().node(q("nope")),
            NodePath::default().entry(EntryIdentifier::new(q("top"), [])),
            NodePath::default().node(q("top")).node(q("missing")),
            NodePath::new([PathArgument::Node(q("top")), PathArgument::Entry(entry_a())]),
            NodePath::default()
                .node(q("top"))
                .node(q("top-list"))
                .node(q("nested")),
        ];
        for path in cases {
            assert!(
                matches!(factory.context_for_path(&path), Err(CodecError::IllegalArgument(_))),
                "{path}"
            );
        }
    }

    #[test]
    fn domain_path_must_start_at_root() {
        let factory = factory();
        assert!(matches!(
            factory.to_node_path(&BindingPath::root("TopList")),
            Err(CodecError::IllegalArgument(_))
        ));
        assert!(matches!(
            factory.to_node_path(&BindingPath::root("Top").entry("Item", BindingKey::single("x"))),
            Err(CodecError::IllegalArgument(_))
        ));
        assert!(matches!(
            factory.to_node_path(&BindingPath::root("Top").child("Circle")),
            Err(CodecError::IllegalArgument(_))
        ));
        assert!(matches!(
            factory.to_node_path(&BindingPath::default()),
            Err(CodecError::IllegalArgument(_))
        ));
    }
}
