//! Classification of parsed items and the syntactic facts the rewriter needs
//! about a signature: owner, result list and how each argument is captured.

use quote::ToTokens;
use std::collections::BTreeSet;
use syn::punctuated::Punctuated;
use syn::visit::{self, Visit};
use syn::{
    Attribute, Expr, FnArg, GenericArgument, GenericParam, Ident, Item, ItemFn, ItemImpl, ItemMod,
    ItemTrait, Meta, Path, PathArguments, Receiver, ReturnType, Signature, Token, Type,
};

/// One top-level item of a module scope, tagged by how it is instrumented.
pub enum Declaration {
    /// Free function.
    Function(ItemFn),
    /// `impl` block whose methods are rewritten one by one.
    Method(ItemImpl),
    /// Trait that gets a synthesized mock.
    Interface(ItemTrait),
    /// Inline or out-of-line module.
    Module(ItemMod),
    Other(Item),
}

impl From<Item> for Declaration {
    fn from(item: Item) -> Self {
        match item {
            Item::Fn(function) => Self::Function(function),
            Item::Impl(block) => Self::Method(block),
            Item::Trait(interface) => Self::Interface(interface),
            Item::Mod(module) => Self::Module(module),
            other => Self::Other(other),
        }
    }
}

impl From<Declaration> for Item {
    fn from(declaration: Declaration) -> Self {
        match declaration {
            Declaration::Function(function) => Item::Fn(function),
            Declaration::Method(block) => Item::Impl(block),
            Declaration::Interface(interface) => Item::Trait(interface),
            Declaration::Module(module) => Item::Mod(module),
            Declaration::Other(other) => other,
        }
    }
}

/// Where a function is declared.
#[derive(Debug, Clone)]
pub enum Owner {
    Free,
    Inherent { self_ty: Box<Type> },
    TraitImpl { self_ty: Box<Type>, trait_path: Path },
}

impl Owner {
    /// Build the owner of the methods of `block`.
    pub fn of_impl(block: &ItemImpl) -> Self {
        match &block.trait_ {
            Some((_, trait_path, _)) => Self::TraitImpl {
                self_ty: block.self_ty.clone(),
                trait_path: trait_path.clone(),
            },
            None => Self::Inherent {
                self_ty: block.self_ty.clone(),
            },
        }
    }

    /// Qualified name of `name` as registered with the runtime:
    /// `greet`, `Account::deposit`, `<Account as Ledger>::post`.
    pub fn qualify(&self, name: &Ident) -> String {
        match self {
            Self::Free => name.to_string(),
            Self::Inherent { self_ty } => format!("{}::{name}", token_label(self_ty)),
            Self::TraitImpl {
                self_ty,
                trait_path,
            } => format!(
                "<{} as {}>::{name}",
                token_label(self_ty),
                token_label(trait_path)
            ),
        }
    }
}

/// Render tokens compactly, keeping spaces only between identifier characters.
pub fn token_label(tokens: &impl ToTokens) -> String {
    let rendered = tokens.to_token_stream().to_string();
    let chars: Vec<char> = rendered.chars().collect();
    let is_word = |c: char| c.is_alphanumeric() || c == '_';

    let mut label = String::with_capacity(rendered.len());
    for (index, &c) in chars.iter().enumerate() {
        if c == ' ' {
            let before = label.chars().last();
            let after = chars.get(index + 1).copied();
            if before.is_some_and(is_word) && after.is_some_and(is_word) {
                label.push(' ');
            }
        } else {
            label.push(c);
        }
    }
    label
}

/// Result positions of a signature: none for `()`, the elements of a tuple
/// of two or more, otherwise the single declared type. A one-element tuple
/// such as `(u32,)` is one result.
pub fn results(output: &ReturnType) -> Vec<Type> {
    match output {
        ReturnType::Default => Vec::new(),
        ReturnType::Type(_, ty) => match strip_parens(ty) {
            Type::Tuple(tuple) if tuple.elems.len() != 1 => tuple.elems.iter().cloned().collect(),
            other => vec![other.clone()],
        },
    }
}

fn strip_parens(ty: &Type) -> &Type {
    match ty {
        Type::Paren(inner) => strip_parens(&inner.elem),
        Type::Group(inner) => strip_parens(&inner.elem),
        other => other,
    }
}

/// How an argument is snapshotted for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// References and shared pointers, compared by the address they point to.
    Address,
    /// Raw pointers, compared by value.
    Pointer,
    /// Owned copy through the referent (`&str`, `&[T]`).
    DerefValue,
    /// Owned copy of the argument itself, when its type allows one.
    Value,
    /// Borrowing types that cannot outlive the call.
    Opaque,
}

/// Standard library types whose lifetime parameter is usually elided in
/// signatures: `Cow<str>`, `Chars`, `fmt::Arguments`.
const STD_BORROWING_TYPES: &[&str] = &[
    "Arguments",
    "Bytes",
    "CharIndices",
    "Chars",
    "Components",
    "Cow",
    "Drain",
    "Entry",
    "Iter",
    "IterMut",
    "Keys",
    "Lines",
    "MutexGuard",
    "Ref",
    "RefMut",
    "RwLockReadGuard",
    "RwLockWriteGuard",
    "Split",
    "SplitWhitespace",
    "StderrLock",
    "StdinLock",
    "StdoutLock",
    "Values",
    "ValuesMut",
];

/// Names of types declared with lifetime parameters. Writing such a type
/// without its lifetime (`Parser` for `Parser<'a>`) still borrows, so its
/// values cannot be kept past the call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BorrowingTypes(BTreeSet<String>);

impl BorrowingTypes {
    /// Structs, enums, unions and aliases of `items` (inline modules
    /// included) that take a lifetime parameter.
    pub fn declared_in(items: &[Item]) -> Self {
        let mut found = Self::default();
        found.collect(items);
        found
    }

    fn collect(&mut self, items: &[Item]) {
        for item in items {
            let (ident, generics) = match item {
                Item::Struct(item) => (&item.ident, &item.generics),
                Item::Enum(item) => (&item.ident, &item.generics),
                Item::Union(item) => (&item.ident, &item.generics),
                Item::Type(item) => (&item.ident, &item.generics),
                Item::Mod(module) => {
                    if let Some((_, content)) = &module.content {
                        self.collect(content);
                    }
                    continue;
                }
                _ => continue,
            };
            if generics.lifetimes().next().is_some() {
                self.0.insert(ident.to_string());
            }
        }
    }

    pub fn extend(&mut self, other: &Self) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn contains(&self, ident: &Ident) -> bool {
        STD_BORROWING_TYPES.iter().any(|name| ident == name) || self.0.contains(&ident.to_string())
    }
}

impl FromIterator<String> for BorrowingTypes {
    fn from_iter<I: IntoIterator<Item = String>>(names: I) -> Self {
        Self(names.into_iter().collect())
    }
}

/// Pick the capture strategy for a parameter of declared type `ty`.
pub fn capture_of(ty: &Type, borrowing: &BorrowingTypes) -> Capture {
    match strip_parens(ty) {
        Type::Reference(reference) => match strip_parens(&reference.elem) {
            elem if is_str_or_slice(elem) => {
                if mentions_borrow(elem, borrowing) {
                    Capture::Opaque
                } else {
                    Capture::DerefValue
                }
            }
            _ => Capture::Address,
        },
        Type::Ptr(_) => Capture::Pointer,
        Type::Path(path) if is_shared_pointer(path) => Capture::Address,
        other if mentions_borrow(other, borrowing) => Capture::Opaque,
        _ => Capture::Value,
    }
}

fn is_str_or_slice(ty: &Type) -> bool {
    match ty {
        Type::Slice(_) => true,
        Type::Path(path) => path.qself.is_none() && path.path.is_ident("str"),
        _ => false,
    }
}

fn is_shared_pointer(path: &syn::TypePath) -> bool {
    path.qself.is_none()
        && path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "Rc" || segment.ident == "Arc")
}

/// Expression capturing parameter `name` of type `ty`, for the runtime's
/// argument vector.
pub fn capture_expr(name: &Ident, ty: &Type, borrowing: &BorrowingTypes) -> Expr {
    match capture_of(ty, borrowing) {
        Capture::Address => syn::parse_quote!(__mock4rs::Arg::identity(&*#name)),
        Capture::Pointer => syn::parse_quote!(__mock4rs::Arg::pointer(#name)),
        Capture::DerefValue => syn::parse_quote!((&__mock4rs::Probe(&*#name)).capture()),
        Capture::Value => syn::parse_quote!((&__mock4rs::Probe(&#name)).capture()),
        Capture::Opaque => syn::parse_quote!(__mock4rs::Arg::opaque_of(&#name)),
    }
}

/// Expression capturing the receiver: by address for references and smart
/// pointers, by value for `self`.
pub fn receiver_capture(receiver: &Receiver) -> Expr {
    let by_value = match (&receiver.reference, &receiver.colon_token) {
        (Some(_), _) => false,
        (None, None) => true,
        (None, Some(_)) => matches!(strip_parens(&receiver.ty), Type::Path(path) if path.path.is_ident("Self")),
    };
    if by_value {
        syn::parse_quote!((&__mock4rs::Probe(&self)).capture())
    } else {
        syn::parse_quote!(__mock4rs::Arg::identity(&*self))
    }
}

/// True when `ty` holds a reference, a non-`'static` lifetime or a
/// borrowing type whose lifetime is elided.
pub fn mentions_borrow(ty: &Type, borrowing: &BorrowingTypes) -> bool {
    struct BorrowFinder<'b> {
        borrowing: &'b BorrowingTypes,
        found: bool,
    }

    impl<'ast> Visit<'ast> for BorrowFinder<'_> {
        fn visit_type_reference(&mut self, _: &'ast syn::TypeReference) {
            self.found = true;
        }

        fn visit_lifetime(&mut self, lifetime: &'ast syn::Lifetime) {
            if lifetime.ident != "static" {
                self.found = true;
            }
        }

        fn visit_type_path(&mut self, path: &'ast syn::TypePath) {
            if let Some(last) = path.path.segments.last() {
                if self.borrowing.contains(&last.ident) && !has_lifetime_argument(last) {
                    self.found = true;
                }
            }
            visit::visit_type_path(self, path);
        }
    }

    let mut finder = BorrowFinder {
        borrowing,
        found: false,
    };
    finder.visit_type(ty);
    finder.found
}

fn has_lifetime_argument(segment: &syn::PathSegment) -> bool {
    match &segment.arguments {
        PathArguments::AngleBracketed(arguments) => arguments
            .args
            .iter()
            .any(|argument| matches!(argument, GenericArgument::Lifetime(_))),
        _ => false,
    }
}

/// True when the signature has `impl Trait` in argument or return position.
pub fn has_impl_trait(sig: &Signature) -> bool {
    struct ImplTraitFinder(bool);

    impl<'ast> Visit<'ast> for ImplTraitFinder {
        fn visit_type_impl_trait(&mut self, _: &'ast syn::TypeImplTrait) {
            self.0 = true;
        }
    }

    let mut finder = ImplTraitFinder(false);
    for input in &sig.inputs {
        if let FnArg::Typed(typed) = input {
            finder.visit_type(&typed.ty);
        }
    }
    if let ReturnType::Type(_, ty) = &sig.output {
        finder.visit_type(ty);
    }
    finder.0
}

/// True when `ty` names `Self` anywhere.
pub fn mentions_self(ty: &Type) -> bool {
    struct SelfFinder(bool);

    impl<'ast> Visit<'ast> for SelfFinder {
        fn visit_path(&mut self, path: &'ast Path) {
            if path.segments.first().is_some_and(|s| s.ident == "Self") {
                self.0 = true;
            }
            visit::visit_path(self, path);
        }
    }

    let mut finder = SelfFinder(false);
    finder.visit_type(ty);
    finder.0
}

/// True when the generics declare type or const parameters.
pub fn has_type_generics(generics: &syn::Generics) -> bool {
    generics
        .params
        .iter()
        .any(|param| !matches!(param, GenericParam::Lifetime(_)))
}

/// True for attributes that make the item a test, benchmark or proc macro.
pub fn is_test_harness_attr(attr: &Attribute) -> bool {
    attr.path().segments.last().is_some_and(|segment| {
        matches!(
            segment.ident.to_string().as_str(),
            "test" | "bench" | "proc_macro" | "proc_macro_derive" | "proc_macro_attribute"
        )
    })
}

/// True when a `#[cfg(..)]` attribute only enables the item under `test`.
pub fn is_cfg_test(attrs: &[Attribute]) -> bool {
    attrs.iter().any(|attr| {
        attr.path().is_ident("cfg")
            && attr
                .parse_args::<Meta>()
                .is_ok_and(|meta| cfg_requires_test(&meta))
    })
}

fn cfg_requires_test(meta: &Meta) -> bool {
    match meta {
        Meta::Path(path) => path.is_ident("test"),
        Meta::List(list) => {
            let Ok(nested) =
                list.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)
            else {
                return false;
            };
            if list.path.is_ident("all") {
                nested.iter().any(cfg_requires_test)
            } else if list.path.is_ident("any") {
                !nested.is_empty() && nested.iter().all(cfg_requires_test)
            } else {
                false
            }
        }
        Meta::NameValue(_) => false,
    }
}

/// `#[cfg]` attributes, copied onto generated items.
pub fn cfg_attrs(attrs: &[Attribute]) -> Vec<Attribute> {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident("cfg"))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use syn::parse_quote;

    #[test]
    fn results_follow_return_shape() {
        let unit: ReturnType = parse_quote!();
        let explicit_unit: ReturnType = parse_quote!(-> ());
        let single: ReturnType = parse_quote!(-> String);
        let pair: ReturnType = parse_quote!(-> (u8, String));
        let one_tuple: ReturnType = parse_quote!(-> (u32,));

        assert!(results(&unit).is_empty());
        assert!(results(&explicit_unit).is_empty());
        assert_eq!(results(&single).len(), 1);
        assert_eq!(results(&pair).len(), 2);

        let whole: Type = parse_quote!((u32,));
        assert_eq!(results(&one_tuple), vec![whole]);
    }

    #[test]
    fn captures_by_declared_type() {
        let cases: Vec<(Type, Capture)> = vec![
            (parse_quote!(&Account), Capture::Address),
            (parse_quote!(&mut Vec<u8>), Capture::Address),
            (parse_quote!(Rc<Node>), Capture::Address),
            (parse_quote!(std::sync::Arc<Node>), Capture::Address),
            (parse_quote!(*const u8), Capture::Pointer),
            (parse_quote!(&str), Capture::DerefValue),
            (parse_quote!(&'a [u8]), Capture::DerefValue),
            (parse_quote!(&[&str]), Capture::Opaque),
            (parse_quote!(Option<&str>), Capture::Opaque),
            (parse_quote!(Cow<'a, str>), Capture::Opaque),
            (parse_quote!(String), Capture::Value),
            (parse_quote!(Vec<u32>), Capture::Value),
            (parse_quote!(&'static str), Capture::DerefValue),
            (parse_quote!(Cow<str>), Capture::Opaque),
            (parse_quote!(std::borrow::Cow<'static, str>), Capture::Value),
            (parse_quote!(std::str::Chars), Capture::Opaque),
            (parse_quote!(fmt::Arguments), Capture::Opaque),
            (parse_quote!(Option<std::slice::Iter<u8>>), Capture::Opaque),
        ];
        let borrowing = BorrowingTypes::default();
        for (ty, expected) in cases {
            assert_eq!(capture_of(&ty, &borrowing), expected, "{}", token_label(&ty));
        }
    }

    #[test]
    fn declared_lifetime_types_are_opaque_when_elided() {
        let items: syn::File = parse_quote! {
            pub struct Parser<'a> { input: &'a str }
            pub struct Owned { input: String }
            mod inner {
                pub enum Token<'s> { Word(&'s str) }
            }
        };
        let borrowing = BorrowingTypes::declared_in(&items.items);
        assert!(!borrowing.is_empty());

        let cases: Vec<(Type, Capture)> = vec![
            (parse_quote!(Parser), Capture::Opaque),
            (parse_quote!(crate::Parser), Capture::Opaque),
            (parse_quote!(Vec<Token>), Capture::Opaque),
            (parse_quote!(Parser<'static>), Capture::Value),
            (parse_quote!(Owned), Capture::Value),
        ];
        for (ty, expected) in cases {
            assert_eq!(capture_of(&ty, &borrowing), expected, "{}", token_label(&ty));
        }
    }

    #[test]
    fn qualified_names() {
        let name: Ident = parse_quote!(post);
        let block: ItemImpl = parse_quote!(impl Ledger for Account {});
        assert_eq!(Owner::of_impl(&block).qualify(&name), "<Account as Ledger>::post");

        let block: ItemImpl = parse_quote!(impl Vec<Account> {});
        assert_eq!(Owner::of_impl(&block).qualify(&name), "Vec<Account>::post");
        assert_eq!(Owner::Free.qualify(&name), "post");
    }

    #[test]
    fn token_label_keeps_word_spacing() {
        let ty: Type = parse_quote!(&'a dyn std::fmt::Debug);
        assert_eq!(token_label(&ty), "&'a dyn std::fmt::Debug");
    }

    #[test]
    fn cfg_test_detection() {
        let test_only: ItemMod = parse_quote! {
            #[cfg(test)]
            mod tests {}
        };
        let combined: ItemMod = parse_quote! {
            #[cfg(all(test, feature = "slow"))]
            mod slow {}
        };
        let negated: ItemMod = parse_quote! {
            #[cfg(not(test))]
            mod real {}
        };
        assert!(is_cfg_test(&test_only.attrs));
        assert!(is_cfg_test(&combined.attrs));
        assert!(!is_cfg_test(&negated.attrs));
    }

    #[test]
    fn impl_trait_detection() {
        let arg: Signature = parse_quote!(fn run(f: impl Fn()));
        let ret: Signature = parse_quote!(fn iter(&self) -> impl Iterator<Item = u8>);
        let plain: Signature = parse_quote!(fn len(&self) -> usize);
        assert!(has_impl_trait(&arg));
        assert!(has_impl_trait(&ret));
        assert!(!has_impl_trait(&plain));
    }
}
