//! # graphstream Derive Macros
//!
//! This crate provides the procedural macros for `graphstream`. `GraphRecord` generates the
//! explicit field-descriptor table and indexed accessors of `graphstream::record::Record`;
//! `GraphEnum` generates the static enum class of a fieldless enum.
//!
//! Compatible with `syn 2.0`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, LitStr, Path, Type, parse_macro_input};

/// Derives `Record`, `RecordType` and `ClassType` for a struct with named fields.
///
/// Struct attributes: `#[graph(name = "...")]`, `#[graph(final)]`, `#[graph(custom)]`,
/// `#[graph(constructor = "path")]`.
///
/// Field attributes: `#[graph(skip)]`, `#[graph(base)]`, `#[graph(owner)]`,
/// `#[graph(declared = "Type")]`.
#[proc_macro_derive(GraphRecord, attributes(graph))]
pub fn derive_graph_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_record(input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

/// Derives `EnumType`, `FieldType` and `ClassType` for a fieldless enum.
///
/// Accepts `#[graph(name = "...")]` on the enum.
#[proc_macro_derive(GraphEnum, attributes(graph))]
pub fn derive_graph_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_enum(input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

// --- Attributes ---

#[derive(Default)]
struct TypeAttrs {
    name: Option<LitStr>,
    is_final: bool,
    custom: bool,
    constructor: Option<Path>,
}

fn parse_type_attrs(attrs: &[Attribute], allow_record_keys: bool) -> syn::Result<TypeAttrs> {
    let mut parsed = TypeAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("graph") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                parsed.name = Some(meta.value()?.parse()?);
                return Ok(());
            }
            if allow_record_keys {
                if meta.path.is_ident("final") {
                    parsed.is_final = true;
                    return Ok(());
                }
                if meta.path.is_ident("custom") {
                    parsed.custom = true;
                    return Ok(());
                }
                if meta.path.is_ident("constructor") {
                    let path: LitStr = meta.value()?.parse()?;
                    parsed.constructor = Some(path.parse()?);
                    return Ok(());
                }
                return Err(meta.error(
                    "Unknown graph attribute key. Supported: name, final, custom, constructor",
                ));
            }
            Err(meta.error("Unknown graph attribute key. Supported: name"))
        })?;
    }
    Ok(parsed)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Role {
    Field,
    Skip,
    Base,
    Owner,
}

struct FieldAttrs {
    role: Role,
    declared: Option<Type>,
}

fn parse_field_attrs(attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut parsed = FieldAttrs {
        role: Role::Field,
        declared: None,
    };
    for attr in attrs {
        if !attr.path().is_ident("graph") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let role = if meta.path.is_ident("skip") {
                Role::Skip
            } else if meta.path.is_ident("base") {
                Role::Base
            } else if meta.path.is_ident("owner") {
                Role::Owner
            } else if meta.path.is_ident("declared") {
                let ty: LitStr = meta.value()?.parse()?;
                parsed.declared = Some(ty.parse()?);
                return Ok(());
            } else {
                return Err(meta.error(
                    "Unknown graph attribute key. Supported: skip, base, owner, declared",
                ));
            };
            if parsed.role != Role::Field {
                return Err(meta.error("skip, base and owner are mutually exclusive"));
            }
            parsed.role = role;
            Ok(())
        })?;
    }
    Ok(parsed)
}

// --- GraphRecord ---

struct RecordField {
    ident: syn::Ident,
    ty: Type,
    declared: Option<Type>,
}

fn expand_record(input: DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "GraphRecord does not support generic types",
        ));
    }
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(name.span(), "GraphRecord only supports structs"));
    };
    let Fields::Named(named) = &data.fields else {
        return Err(syn::Error::new(
            name.span(),
            "GraphRecord requires named fields",
        ));
    };
    let attrs = parse_type_attrs(&input.attrs, true)?;

    let mut fields = Vec::new();
    let mut base: Option<(syn::Ident, Type)> = None;
    let mut owner: Option<syn::Ident> = None;
    for field in &named.named {
        let parsed = parse_field_attrs(&field.attrs)?;
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        match parsed.role {
            Role::Skip => {}
            Role::Base if base.is_some() => {
                return Err(syn::Error::new(ident.span(), "only one base field is allowed"));
            }
            Role::Base => base = Some((ident, field.ty.clone())),
            Role::Owner if owner.is_some() => {
                return Err(syn::Error::new(ident.span(), "only one owner field is allowed"));
            }
            Role::Owner => owner = Some(ident),
            Role::Field => fields.push(RecordField {
                ident,
                ty: field.ty.clone(),
                declared: parsed.declared,
            }),
        }
    }

    let class_name = match &attrs.name {
        Some(lit) => quote! { #lit },
        None => quote! { concat!(module_path!(), "::", stringify!(#name)) },
    };
    let field_count = fields.len();

    let base_count = match &base {
        Some((_, ty)) => quote! { <#ty as graphstream::record::RecordType>::FIELD_COUNT },
        None => quote! { 0usize },
    };
    let collect_base = base.as_ref().map(|(_, ty)| {
        quote! { <#ty as graphstream::record::RecordType>::collect_fields(fields); }
    });
    let get_base = base.as_ref().map(|(ident, _)| {
        quote! {
            if index < BASE {
                return graphstream::record::Record::get_field(&self.#ident, index);
            }
        }
    });
    let set_base = base.as_ref().map(|(ident, _)| {
        quote! {
            if index < BASE {
                return graphstream::record::Record::set_field(&mut self.#ident, index, value);
            }
        }
    });

    let descriptors = fields.iter().map(|f| {
        let ident = &f.ident;
        let ty = &f.ty;
        let field_name = ident.to_string();
        let field_name = field_name.strip_prefix("r#").unwrap_or(&field_name).to_string();
        let (declared, register) = match &f.declared {
            Some(declared) => (
                quote! { <#declared as graphstream::record::ClassType>::CLASS_NAME },
                quote! { <#declared as graphstream::record::ClassType>::register_class },
            ),
            None => (
                quote! { <#ty as graphstream::record::FieldType>::DECLARED },
                quote! { <#ty as graphstream::record::FieldType>::register },
            ),
        };
        quote! {
            fields.push(graphstream::record::FieldDescriptor {
                declaring: <Self as graphstream::record::RecordType>::NAME,
                name: #field_name,
                declared: #declared,
                register: #register,
            });
        }
    });

    let get_arms = fields.iter().enumerate().map(|(i, f)| {
        let ident = &f.ident;
        quote! { #i => Ok(graphstream::record::FieldType::to_value(&self.#ident)), }
    });
    let set_arms = fields.iter().enumerate().map(|(i, f)| {
        let ident = &f.ident;
        quote! {
            #i => {
                self.#ident = graphstream::record::FieldType::from_value(value)?;
                Ok(())
            }
        }
    });

    let mut flags = quote! { graphstream::format::ClassFlags::NONE };
    if attrs.is_final {
        flags = quote! { #flags.with(graphstream::format::ClassFlags::FINAL) };
    }
    if owner.is_some() {
        flags = quote! { #flags.with(graphstream::format::ClassFlags::INNER) };
    }

    let owner_impl = owner.as_ref().map(|ident| {
        quote! {
            fn owner(&self) -> graphstream::Value {
                graphstream::record::FieldType::to_value(&self.#ident)
            }

            fn set_owner(&mut self, owner: graphstream::Value) -> graphstream::Result<()> {
                self.#ident = graphstream::record::FieldType::from_value(owner)?;
                Ok(())
            }
        }
    });

    let custom_impl = attrs.custom.then(|| {
        quote! {
            fn write_custom(
                &self,
                out: &mut dyn graphstream::record::ObjectOutput,
            ) -> Option<graphstream::Result<()>> {
                Some(graphstream::record::CustomFields::write_fields(self, out))
            }

            fn read_custom(
                &mut self,
                input: &mut dyn graphstream::record::ObjectInput,
            ) -> Option<graphstream::Result<()>> {
                Some(graphstream::record::CustomFields::read_fields(self, input))
            }
        }
    });

    let custom = attrs.custom;
    let construct = match &attrs.constructor {
        Some(path) => quote! { graphstream::rt::construct_with::<#name>(#path()) },
        None => quote! { graphstream::rt::construct_default::<#name>() },
    };

    Ok(quote! {
        const _: () = {
            const BASE: usize = #base_count;

            fn construct() -> graphstream::Result<Box<dyn graphstream::record::Record>> {
                #construct
            }

            impl graphstream::record::RecordType for #name {
                const NAME: &'static str = #class_name;
                const FIELD_COUNT: usize = BASE + #field_count;

                fn class() -> &'static graphstream::record::RecordClass {
                    static CLASS: graphstream::record::RecordClass = graphstream::record::RecordClass {
                        name: <#name as graphstream::record::RecordType>::NAME,
                        flags: #flags,
                        field_count: <#name as graphstream::record::RecordType>::FIELD_COUNT,
                        fields: <#name as graphstream::record::RecordType>::collect_fields,
                        custom: #custom,
                        construct,
                    };
                    &CLASS
                }

                fn collect_fields(fields: &mut Vec<graphstream::record::FieldDescriptor>) {
                    #collect_base
                    #(#descriptors)*
                }
            }

            impl graphstream::record::Record for #name {
                fn record_class(&self) -> &'static graphstream::record::RecordClass {
                    <Self as graphstream::record::RecordType>::class()
                }

                fn get_field(&self, index: usize) -> graphstream::Result<graphstream::Value> {
                    #get_base
                    match index - BASE {
                        #(#get_arms)*
                        _ => Err(graphstream::rt::field_index_error(
                            <Self as graphstream::record::RecordType>::NAME,
                            index,
                        )),
                    }
                }

                fn set_field(
                    &mut self,
                    index: usize,
                    value: graphstream::Value,
                ) -> graphstream::Result<()> {
                    #set_base
                    let _ = &value;
                    match index - BASE {
                        #(#set_arms)*
                        _ => Err(graphstream::rt::field_index_error(
                            <Self as graphstream::record::RecordType>::NAME,
                            index,
                        )),
                    }
                }

                #owner_impl
                #custom_impl

                fn as_any(&self) -> &dyn std::any::Any {
                    self
                }

                fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                    self
                }
            }

            impl graphstream::record::ClassType for #name {
                const CLASS_NAME: &'static str = <Self as graphstream::record::RecordType>::NAME;

                fn register_class() -> graphstream::Result<()> {
                    graphstream::rt::register_record::<Self>()
                }
            }
        };
    })
}

// --- GraphEnum ---

fn expand_enum(input: DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "GraphEnum does not support generic types",
        ));
    }
    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new(name.span(), "GraphEnum only supports enums"));
    };
    let attrs = parse_type_attrs(&input.attrs, false)?;

    let mut variants = Vec::new();
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "GraphEnum only supports fieldless variants",
            ));
        }
        variants.push(&variant.ident);
    }
    let variant_names: Vec<String> = variants.iter().map(|v| v.to_string()).collect();
    let ordinals: Vec<usize> = (0..variants.len()).collect();

    let class_name = match &attrs.name {
        Some(lit) => quote! { #lit },
        None => quote! { concat!(module_path!(), "::", stringify!(#name)) },
    };

    Ok(quote! {
        const _: () = {
            const NAME: &'static str = #class_name;

            impl graphstream::EnumType for #name {
                fn enum_class() -> &'static graphstream::EnumClass {
                    static CLASS: graphstream::EnumClass = graphstream::EnumClass {
                        name: NAME,
                        variants: &[#(#variant_names),*],
                    };
                    &CLASS
                }

                fn ordinal(&self) -> usize {
                    match self {
                        #(Self::#variants => #ordinals,)*
                    }
                }

                fn from_ordinal(ordinal: usize) -> Option<Self> {
                    match ordinal {
                        #(#ordinals => Some(Self::#variants),)*
                        _ => None,
                    }
                }
            }

            impl graphstream::record::FieldType for #name {
                const DECLARED: &'static str = NAME;

                fn to_value(&self) -> graphstream::Value {
                    graphstream::Value::Enum(graphstream::EnumType::to_enum_value(self))
                }

                fn from_value(value: graphstream::Value) -> graphstream::Result<Self> {
                    graphstream::rt::enum_from_value(value)
                }

                fn register() -> graphstream::Result<()> {
                    graphstream::rt::register_enum_field::<Self>()
                }
            }

            impl graphstream::record::ClassType for #name {
                const CLASS_NAME: &'static str = NAME;

                fn register_class() -> graphstream::Result<()> {
                    graphstream::rt::register_enum_field::<Self>()
                }
            }

            impl From<#name> for graphstream::Value {
                fn from(value: #name) -> Self {
                    graphstream::Value::Enum(graphstream::EnumType::to_enum_value(&value))
                }
            }
        };
    })
}
