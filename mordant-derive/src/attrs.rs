//! `#[binding(...)]` attribute parsing.

use syn::spanned::Spanned;

/// How a field is exposed as a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shape {
    Leaf,
    LeafList,
    Object,
    List,
    Map,
    Opaque,
    Augmentations,
    Skip,
}

impl Shape {
    fn from_ident(ident: &syn::Ident) -> Option<Self> {
        Some(match ident.to_string().as_str() {
            "leaf" => Shape::Leaf,
            "leaf_list" => Shape::LeafList,
            // A choice property holds the selected case object.
            "object" | "choice" => Shape::Object,
            "list" => Shape::List,
            "map" => Shape::Map,
            "opaque" => Shape::Opaque,
            "augmentations" => Shape::Augmentations,
            "skip" => Shape::Skip,
            _ => return None,
        })
    }
}

#[derive(Default)]
pub(crate) struct TypeAttrs {
    pub name: Option<String>,
    pub key: Option<Vec<syn::Ident>>,
}

pub(crate) fn parse_type_attrs(attrs: &[syn::Attribute]) -> syn::Result<TypeAttrs> {
    let mut result = TypeAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("binding") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: syn::LitStr = meta.value()?.parse()?;
                result.name = Some(value.value());
            } else if meta.path.is_ident("key") {
                let mut key = Vec::new();
                meta.parse_nested_meta(|part| {
                    let ident = part.path.get_ident().cloned().ok_or_else(|| {
                        part.error("key components are property names")
                    })?;
                    key.push(ident);
                    Ok(())
                })?;
                if key.is_empty() {
                    return Err(meta.error("key needs at least one property"));
                }
                result.key = Some(key);
            } else {
                return Err(meta.error("expected `name = \"...\"` or `key(...)`"));
            }
            Ok(())
        })?;
    }
    Ok(result)
}

pub(crate) struct FieldAttrs {
    pub shape: Shape,
    pub rename: Option<String>,
}

pub(crate) fn parse_field_attrs(field: &syn::Field) -> syn::Result<FieldAttrs> {
    let mut shape: Option<Shape> = None;
    let mut rename = None;
    for attr in &field.attrs {
        if !attr.path().is_ident("binding") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let value: syn::LitStr = meta.value()?.parse()?;
                rename = Some(value.value());
                return Ok(());
            }
            let parsed = meta
                .path
                .get_ident()
                .and_then(Shape::from_ident)
                .ok_or_else(|| meta.error("unknown binding attribute"))?;
            if shape.replace(parsed).is_some() {
                return Err(meta.error("a field has exactly one shape"));
            }
            Ok(())
        })?;
    }
    let shape = shape.unwrap_or(Shape::Leaf);
    if rename.is_some() && matches!(shape, Shape::Augmentations | Shape::Skip) {
        return Err(syn::Error::new(
            field.span(),
            "rename applies to properties only",
        ));
    }
    Ok(FieldAttrs { shape, rename })
}

/// Whether the field's type is spelled `Option<...>`.
pub(crate) fn is_option(ty: &syn::Type) -> bool {
    if let syn::Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            return segment.ident == "Option";
        }
    }
    false
}
