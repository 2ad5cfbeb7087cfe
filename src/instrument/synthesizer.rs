//! Mock types for traits.
//!
//! For `trait Store: Cache` declared next to `trait Cache`, the synthesizer
//! emits a `MockStore` struct holding a `cache: MockCache` field, an
//! instrumented `impl Store for MockStore`, and an `impl Cache for MockStore`
//! forwarding to the field, so the composed mock satisfies the whole bound
//! and stubs recorded on `<MockCache as Cache>::..` apply to it.

use super::declaration::{
    cfg_attrs, has_impl_trait, has_type_generics, mentions_self, results, token_label, Owner,
};
use super::rewriter::Rewriter;
use super::{InstrumentError, Report};
use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote};
use std::collections::{HashMap, HashSet};
use syn::{
    parse_quote, Block, FnArg, Ident, ImplItem, ImplItemFn, Item, ItemImpl, ItemTrait, LitStr,
    ReturnType, Signature, TraitBoundModifier, TraitItem, TraitItemFn, Type, TypeParamBound,
    WherePredicate,
};

/// Traits declared in one module scope, by name.
pub(crate) type TraitTable = HashMap<String, ItemTrait>;

/// Supertraits a mock satisfies without a field: auto traits and the traits
/// every mock derives.
const MARKER_TRAITS: &[&str] = &[
    "Send",
    "Sync",
    "Sized",
    "Unpin",
    "Debug",
    "Clone",
    "Copy",
    "Default",
    "PartialEq",
    "Eq",
    "PartialOrd",
    "Ord",
    "Hash",
];

pub(crate) fn mock_ident(interface: &Ident) -> Ident {
    format_ident!("Mock{}", interface)
}

/// Build the mock items for `interface`.
pub(crate) fn synthesize(
    interface: &ItemTrait,
    table: &TraitTable,
    rewriter: &Rewriter<'_>,
    report: &mut Report,
) -> Result<Vec<Item>, InstrumentError> {
    validate(interface, table, &mut HashSet::new())
        .map_err(|reason| unsupported(&interface.ident, reason))?;

    let mock = mock_ident(&interface.ident);
    let mock_ty: Type = parse_quote!(#mock);
    let direct = local_supertraits(interface, table).map_err(|r| unsupported(&interface.ident, r))?;

    let mut items = vec![mock_struct(interface, &direct, table)];

    let owner = Owner::TraitImpl {
        self_ty: Box::new(mock_ty.clone()),
        trait_path: interface.ident.clone().into(),
    };
    let mut methods = Vec::new();
    for method in trait_methods(interface) {
        let mut stub = stub_method(method, &owner);
        record_rewrite(rewriter, &mut stub, &owner, report);
        methods.push(stub);
    }
    items.push(Item::Impl(trait_impl(interface, &mock, methods)));

    let mut forwarded = HashSet::new();
    for parent in &direct {
        let parent_trait = &table[&parent.to_string()];
        let field = field_ident(parent);
        let parent_mock = mock_ident(parent);
        for ancestor in closure(parent_trait, table) {
            if !forwarded.insert(ancestor.ident.to_string()) {
                continue;
            }
            let owner = Owner::TraitImpl {
                self_ty: Box::new(mock_ty.clone()),
                trait_path: ancestor.ident.clone().into(),
            };
            let mut methods = Vec::new();
            for method in trait_methods(ancestor) {
                if method.sig.receiver().is_none() {
                    let mut stub = stub_method(method, &owner);
                    record_rewrite(rewriter, &mut stub, &owner, report);
                    methods.push(stub);
                } else {
                    let forward = forward_method(method, &parent_mock, &ancestor.ident, &field)
                        .map_err(|reason| unsupported(&interface.ident, reason))?;
                    methods.push(forward);
                }
            }
            items.push(Item::Impl(trait_impl(ancestor, &mock, methods)));
        }
    }

    report.mocks_synthesized += 1;
    Ok(items)
}

fn unsupported(interface: &Ident, reason: String) -> InstrumentError {
    InstrumentError::UnsupportedConstruct {
        item: format!("trait {interface}"),
        reason,
    }
}

fn record_rewrite(rewriter: &Rewriter<'_>, stub: &mut ImplItemFn, owner: &Owner, report: &mut Report) {
    let name = owner.qualify(&stub.sig.ident);
    match rewriter.rewrite_method(stub, owner) {
        Ok(()) => report.rewritten(&name),
        Err(reason) => report.skip(name, reason),
    }
}

fn trait_methods(interface: &ItemTrait) -> impl Iterator<Item = &TraitItemFn> {
    interface.items.iter().filter_map(|item| match item {
        TraitItem::Fn(method) => Some(method),
        _ => None,
    })
}

/// Check that a mock of `interface`, and of every supertrait it composes,
/// can be generated.
fn validate(
    interface: &ItemTrait,
    table: &TraitTable,
    visited: &mut HashSet<String>,
) -> Result<(), String> {
    if !visited.insert(interface.ident.to_string()) {
        return Ok(());
    }
    if !interface.generics.params.is_empty() {
        return Err(format!("generic trait `{}`", interface.ident));
    }

    for item in &interface.items {
        let method = match item {
            TraitItem::Fn(method) => method,
            TraitItem::Type(assoc) => return Err(format!("associated type `{}`", assoc.ident)),
            TraitItem::Const(assoc) => return Err(format!("associated const `{}`", assoc.ident)),
            TraitItem::Macro(_) => return Err(String::from("macro invocation in trait body")),
            _ => return Err(String::from("unrecognized trait item")),
        };
        check_method(&method.sig)?;
    }

    for parent in local_supertraits(interface, table)? {
        let parent_trait = &table[&parent.to_string()];
        validate(parent_trait, table, visited)
            .map_err(|reason| format!("supertrait `{parent}`: {reason}"))?;
    }
    Ok(())
}

fn check_method(sig: &Signature) -> Result<(), String> {
    let name = &sig.ident;
    if has_type_generics(&sig.generics) {
        return Err(format!("generic method `{name}`"));
    }
    if has_impl_trait(sig) {
        return Err(format!("`impl Trait` in method `{name}`"));
    }
    if let ReturnType::Type(_, ty) = &sig.output {
        if matches!(**ty, Type::Never(_)) {
            return Err(format!("diverging method `{name}`"));
        }
    }
    Ok(())
}

/// Supertraits of `interface` that need a composed field, in declaration
/// order.
fn local_supertraits(interface: &ItemTrait, table: &TraitTable) -> Result<Vec<Ident>, String> {
    let where_bounds = interface
        .generics
        .where_clause
        .iter()
        .flat_map(|clause| &clause.predicates)
        .filter_map(|predicate| match predicate {
            WherePredicate::Type(bounded)
                if matches!(&bounded.bounded_ty, Type::Path(p) if p.path.is_ident("Self")) =>
            {
                Some(&bounded.bounds)
            }
            _ => None,
        })
        .flatten();

    let mut locals: Vec<Ident> = Vec::new();
    for bound in interface.supertraits.iter().chain(where_bounds) {
        if let Some(local) = classify_supertrait(bound, table)? {
            if !locals.contains(&local) {
                locals.push(local);
            }
        }
    }
    Ok(locals)
}

fn classify_supertrait(bound: &TypeParamBound, table: &TraitTable) -> Result<Option<Ident>, String> {
    let TypeParamBound::Trait(bound) = bound else {
        return match bound {
            TypeParamBound::Lifetime(_) => Ok(None),
            other => Err(format!("unsupported bound `{}`", token_label(other))),
        };
    };
    if matches!(bound.modifier, TraitBoundModifier::Maybe(_)) {
        return Ok(None);
    }
    let Some(last) = bound.path.segments.last() else {
        return Ok(None);
    };
    if MARKER_TRAITS.iter().any(|marker| last.ident == marker) {
        return Ok(None);
    }
    if bound.path.segments.len() == 1
        && last.arguments.is_none()
        && table.contains_key(&last.ident.to_string())
    {
        return Ok(Some(last.ident.clone()));
    }
    Err(format!(
        "supertrait `{}` is neither a marker trait nor a trait declared in the same module",
        token_label(&bound.path)
    ))
}

/// `root` followed by every trait it transitively composes, each once.
fn closure<'t>(root: &'t ItemTrait, table: &'t TraitTable) -> Vec<&'t ItemTrait> {
    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    let mut pending = vec![root];
    while let Some(current) = pending.pop() {
        if !seen.insert(current.ident.to_string()) {
            continue;
        }
        ordered.push(current);
        let parents = local_supertraits(current, table).unwrap_or_default();
        for parent in parents.iter().rev() {
            if let Some(parent_trait) = table.get(&parent.to_string()) {
                pending.push(parent_trait);
            }
        }
    }
    ordered
}

fn mock_struct(interface: &ItemTrait, direct: &[Ident], table: &TraitTable) -> Item {
    let cfgs = cfg_attrs(&interface.attrs);
    let vis = &interface.vis;
    let mock = mock_ident(&interface.ident);
    let derive = quote!(#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]);

    if direct.is_empty() {
        return parse_quote! {
            #(#cfgs)*
            #derive
            #vis struct #mock;
        };
    }

    let fields = direct.iter().map(|parent| {
        let field = field_ident(parent);
        let field_ty = mock_ident(parent);
        let field_vis = &table[&parent.to_string()].vis;
        quote!(#field_vis #field: #field_ty)
    });
    parse_quote! {
        #(#cfgs)*
        #derive
        #vis struct #mock {
            #(#fields),*
        }
    }
}

fn trait_impl(interface: &ItemTrait, mock: &Ident, methods: Vec<ImplItemFn>) -> ItemImpl {
    let cfgs = cfg_attrs(&interface.attrs);
    let unsafety = &interface.unsafety;
    let name = &interface.ident;
    let items = methods.into_iter().map(ImplItem::Fn);
    parse_quote! {
        #(#cfgs)*
        #unsafety impl #name for #mock {
            #(#items)*
        }
    }
}

/// Copy of a trait method signature with parameters renamed `arg0, arg1, ..`.
fn impl_signature(method: &TraitItemFn) -> (Signature, Vec<Ident>) {
    let mut sig = method.sig.clone();
    let mut args = Vec::new();
    for input in sig.inputs.iter_mut() {
        match input {
            FnArg::Receiver(receiver) => {
                if receiver.reference.is_none() {
                    receiver.mutability = None;
                }
            }
            FnArg::Typed(typed) => {
                let arg = format_ident!("arg{}", args.len());
                typed.pat = parse_quote!(#arg);
                typed.attrs.clear();
                args.push(arg);
            }
        }
    }
    (sig, args)
}

/// Method whose body returns zero values; instrumented afterwards.
fn stub_method(method: &TraitItemFn, owner: &Owner) -> ImplItemFn {
    let (sig, _) = impl_signature(method);
    let attrs = cfg_attrs(&method.attrs);
    let label = LitStr::new(&owner.qualify(&sig.ident), Span::call_site());
    let body = zero_body(&results(&sig.output), &label);
    parse_quote! {
        #(#attrs)*
        #sig #body
    }
}

fn zero_body(results: &[Type], label: &LitStr) -> Block {
    if results.is_empty() {
        return parse_quote!({});
    }
    let slots: Vec<TokenStream> = results
        .iter()
        .enumerate()
        .map(|(i, ty)| {
            let zero = format_ident!("__mock4rs_zero{}", i);
            quote! {
                let #zero: ::core::option::Option<#ty> = (&__mock4rs::Zero::<#ty>::new()).zero();
            }
        })
        .collect();
    let values: Vec<TokenStream> = (0..results.len())
        .map(|i| {
            let zero = format_ident!("__mock4rs_zero{}", i);
            quote!(__mock4rs::zero_value(#zero, #label))
        })
        .collect();

    if let [value] = values.as_slice() {
        parse_quote!({ #(#slots)* #value })
    } else {
        parse_quote!({ #(#slots)* (#(#values),*) })
    }
}

/// Method forwarding to the composed field `field` of type `parent_mock`.
fn forward_method(
    method: &TraitItemFn,
    parent_mock: &Ident,
    ancestor: &Ident,
    field: &Ident,
) -> Result<ImplItemFn, String> {
    let (sig, args) = impl_signature(method);
    let name = &sig.ident;

    let mentions_self_outside_receiver = sig.inputs.iter().any(|input| match input {
        FnArg::Typed(typed) => mentions_self(&typed.ty),
        FnArg::Receiver(_) => false,
    }) || matches!(&sig.output, ReturnType::Type(_, ty) if mentions_self(ty));
    if mentions_self_outside_receiver {
        return Err(format!(
            "method `{ancestor}::{name}` mentions `Self` outside its receiver and cannot be forwarded"
        ));
    }

    let receiver = sig
        .receiver()
        .ok_or_else(|| format!("method `{ancestor}::{name}` has no receiver"))?;
    let target = match (&receiver.reference, &receiver.colon_token) {
        (Some(_), _) if receiver.mutability.is_some() => quote!(&mut self.#field),
        (Some(_), _) => quote!(&self.#field),
        (None, None) => quote!(self.#field),
        (None, Some(_)) => match &*receiver.ty {
            Type::Path(path) if path.path.is_ident("Self") => quote!(self.#field),
            Type::Path(path)
                if path.path.segments.last().is_some_and(|s| s.ident == "Box") =>
            {
                quote!(::std::boxed::Box::new(self.#field))
            }
            Type::Reference(reference) if reference.mutability.is_some() => {
                quote!(&mut self.#field)
            }
            Type::Reference(_) => quote!(&self.#field),
            other => {
                return Err(format!(
                    "receiver `self: {}` of `{ancestor}::{name}` cannot be forwarded",
                    token_label(other)
                ))
            }
        },
    };

    let mut call = quote!(<#parent_mock as #ancestor>::#name(#target, #(#args),*));
    if sig.asyncness.is_some() {
        call = quote!(#call.await);
    }
    if sig.unsafety.is_some() {
        call = quote!(unsafe { #call });
    }
    let attrs = cfg_attrs(&method.attrs);
    Ok(parse_quote! {
        #(#attrs)*
        #sig {
            #call
        }
    })
}

/// Snake-case field name for a composed supertrait.
pub(crate) fn field_ident(parent: &Ident) -> Ident {
    let name = parent.to_string();
    let chars: Vec<char> = name.chars().collect();
    let mut snake = String::with_capacity(name.len() + 4);
    for (index, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let previous = index.checked_sub(1).map(|i| chars[i]);
            let next = chars.get(index + 1);
            let boundary = previous.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit())
                || (previous.is_some_and(char::is_uppercase)
                    && next.is_some_and(|n| n.is_lowercase()));
            if boundary {
                snake.push('_');
            }
            snake.extend(c.to_lowercase());
        } else {
            snake.push(c);
        }
    }

    if matches!(snake.as_str(), "self" | "super" | "crate") {
        snake.push('_');
    }
    syn::parse_str::<Ident>(&snake).unwrap_or_else(|_| Ident::new_raw(&snake, Span::call_site()))
}
