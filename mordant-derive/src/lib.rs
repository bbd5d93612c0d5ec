use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

mod attrs;

use attrs::{Shape, is_option, parse_field_attrs, parse_type_attrs};

/// Derive macro for data objects.
///
/// Generates `DataObject` and `BindingObject` for a struct with named
/// fields. Every field is a property named after the field unless marked
/// otherwise; empty collections are reported as absent.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use mordant_core::DataObject;
///
/// #[derive(Debug, DataObject)]
/// #[binding(name = "Entry", key(id))]
/// struct Entry {
///     id: String,
///     count: Option<u32>,
///     #[binding(leaf_list)]
///     tags: Vec<String>,
///     #[binding(object)]
///     detail: Option<Arc<Detail>>,
/// }
/// ```
///
/// # Attributes
///
/// On the struct:
/// - `#[binding(name = "...")]` - Domain type name, defaults to the struct name
/// - `#[binding(key(a, b))]` - Key properties of a keyed list entry
///
/// On fields:
/// - `leaf` (default) - `T` or `Option<T>` with `T: Clone + Into<Scalar>`
/// - `leaf_list` - iterable of `T: Clone + Into<Scalar>`
/// - `object`, `choice` - `Arc<T>` or `Option<Arc<T>>` of a data object
/// - `list`, `map` - iterable of `Arc<T>`; map entries are keyed by their key
/// - `opaque` - `OpaqueObject` or `Option<OpaqueObject>`
/// - `augmentations` - the object's `Augmentations`
/// - `skip` - not exposed
/// - `rename = "name"` - Property name, defaults to the field name
#[proc_macro_derive(DataObject, attributes(binding))]
pub fn derive_data_object(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_data_object_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn derive_data_object_impl(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        syn::Data::Struct(syn::DataStruct {
            fields: syn::Fields::Named(named),
            ..
        }) => &named.named,
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "DataObject can only be derived for structs with named fields",
            ));
        }
    };

    let type_attrs = parse_type_attrs(&input.attrs)?;
    let type_name = type_attrs.name.unwrap_or_else(|| name.to_string());

    let mut properties = Vec::new();
    let mut arms = Vec::new();
    let mut augmentations = None;
    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let attrs = parse_field_attrs(field)?;
        match attrs.shape {
            Shape::Skip => continue,
            Shape::Augmentations => {
                if augmentations.is_some() {
                    return Err(syn::Error::new_spanned(
                        field,
                        "only one field may hold augmentations",
                    ));
                }
                augmentations = Some(quote! {
                    fn augmentations(&self) -> ::mordant_core::Augmentations {
                        ::std::clone::Clone::clone(&self.#ident)
                    }
                });
                continue;
            }
            _ => {}
        }
        let optional = is_option(&field.ty);
        if optional && matches!(attrs.shape, Shape::LeafList | Shape::List | Shape::Map) {
            return Err(syn::Error::new_spanned(
                &field.ty,
                "collection properties cannot be `Option`; an empty collection is reported as absent",
            ));
        }
        let property = attrs.rename.unwrap_or_else(|| ident.to_string());
        let value = property_value(attrs.shape, ident, optional);
        arms.push(quote! { #property => #value, });
        properties.push(property);
    }

    let binding_type = match &type_attrs.key {
        Some(key) => {
            let key: Vec<String> = key.iter().map(|k| k.to_string()).collect();
            for component in &key {
                if !properties.contains(component) {
                    return Err(syn::Error::new_spanned(
                        input,
                        format!("key component `{component}` is not a property"),
                    ));
                }
            }
            quote! {
                ::mordant_core::BindingType::keyed(#type_name, &[#(#properties),*], &[#(#key),*])
            }
        }
        None => quote! {
            ::mordant_core::BindingType::new(#type_name, &[#(#properties),*])
        },
    };

    Ok(quote! {
        impl #impl_generics ::mordant_core::BindingObject for #name #ty_generics #where_clause {
            const BINDING_TYPE: &'static ::mordant_core::BindingType = &#binding_type;
        }

        impl #impl_generics ::mordant_core::DataObject for #name #ty_generics #where_clause {
            fn binding_type(&self) -> &'static ::mordant_core::BindingType {
                <Self as ::mordant_core::BindingObject>::BINDING_TYPE
            }

            fn property(
                &self,
                name: &str,
            ) -> ::mordant_core::Result<::std::option::Option<::mordant_core::DomainValue>> {
                ::std::result::Result::Ok(match name {
                    #(#arms)*
                    _ => ::std::option::Option::None,
                })
            }

            #augmentations

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }
    })
}

/// Expression producing `Option<DomainValue>` for one property.
fn property_value(shape: Shape, ident: &syn::Ident, optional: bool) -> proc_macro2::TokenStream {
    let object = quote! {
        |v| ::std::clone::Clone::clone(v)
            as ::std::sync::Arc<dyn ::mordant_core::DataObject>
    };
    match shape {
        Shape::Leaf if optional => quote! {
            self.#ident.as_ref().map(|v| {
                ::mordant_core::DomainValue::Scalar(::std::convert::Into::into(
                    ::std::clone::Clone::clone(v),
                ))
            })
        },
        Shape::Leaf => quote! {
            ::std::option::Option::Some(::mordant_core::DomainValue::Scalar(
                ::std::convert::Into::into(::std::clone::Clone::clone(&self.#ident)),
            ))
        },
        Shape::LeafList => quote! {
            ::mordant_core::DomainValue::scalar_list(
                ::std::iter::IntoIterator::into_iter(&self.#ident)
                    .map(|v| ::std::convert::Into::into(::std::clone::Clone::clone(v))),
            )
        },
        Shape::Object if optional => quote! {
            self.#ident.as_ref().map(|v| {
                ::mordant_core::DomainValue::Object(::std::clone::Clone::clone(v)
                    as ::std::sync::Arc<dyn ::mordant_core::DataObject>)
            })
        },
        Shape::Object => quote! {
            ::std::option::Option::Some(::mordant_core::DomainValue::Object(
                ::std::clone::Clone::clone(&self.#ident)
                    as ::std::sync::Arc<dyn ::mordant_core::DataObject>,
            ))
        },
        Shape::List => quote! {
            ::mordant_core::DomainValue::list(
                ::std::iter::IntoIterator::into_iter(&self.#ident).map(#object),
            )
        },
        Shape::Map => quote! {
            ::mordant_core::DomainValue::map(
                ::std::iter::IntoIterator::into_iter(&self.#ident).map(#object),
            )?
        },
        Shape::Opaque if optional => quote! {
            ::std::clone::Clone::clone(&self.#ident).map(::mordant_core::DomainValue::Opaque)
        },
        Shape::Opaque => quote! {
            ::std::option::Option::Some(::mordant_core::DomainValue::Opaque(
                ::std::clone::Clone::clone(&self.#ident),
            ))
        },
        Shape::Augmentations | Shape::Skip => quote! { ::std::option::Option::None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn optional_collections_are_rejected() {
        let input: DeriveInput = parse_quote! {
            struct Entry {
                #[binding(leaf_list)]
                tags: Option<Vec<String>>,
            }
        };
        let err = derive_data_object_impl(&input).unwrap_err();
        assert!(err.to_string().contains("cannot be `Option`"));

        let input: DeriveInput = parse_quote! {
            struct Entry {
                #[binding(list)]
                items: Option<Vec<std::sync::Arc<Item>>>,
            }
        };
        assert!(derive_data_object_impl(&input).is_err());
    }

    #[test]
    fn optional_leaves_are_accepted() {
        let input: DeriveInput = parse_quote! {
            #[binding(key(id))]
            struct Entry {
                id: String,
                count: Option<u32>,
                #[binding(leaf_list)]
                tags: Vec<String>,
            }
        };
        assert!(derive_data_object_impl(&input).is_ok());
    }
}
