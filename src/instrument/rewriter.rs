//! Prepends interception guards to function and method bodies.
//!
//! A rewritten body first hands its arguments to the runtime. When an
//! expectation matches, the guard returns the canned values (or zero values
//! for unset positions); otherwise the original statements run unchanged.

use super::declaration::{
    capture_expr, has_impl_trait, has_type_generics, is_cfg_test, is_test_harness_attr,
    receiver_capture, results, BorrowingTypes, Owner,
};
use super::Report;
use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote};
use std::fmt;
use syn::visit_mut::{self, VisitMut};
use syn::{
    parse_quote, Attribute, Block, Expr, FnArg, Ident, ImplItem, ImplItemFn, ItemFn, ItemImpl,
    Lifetime, LitStr, Pat, ReturnType, Signature, Stmt, Type,
};
use tracing::debug;

/// Why a declaration was left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ConstFn,
    Generic,
    GenericImpl,
    ImplTrait,
    Diverging,
    Variadic,
    EntryPoint,
    TestHarness,
    TestOnly,
    UnsupportedInterface,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::ConstFn => "const fn",
            Self::Generic => "type or const generic parameters",
            Self::GenericImpl => "generic impl block",
            Self::ImplTrait => "impl Trait in signature",
            Self::Diverging => "diverging return type",
            Self::Variadic => "C-variadic parameters",
            Self::EntryPoint => "program entry point",
            Self::TestHarness => "test, bench or proc-macro function",
            Self::TestOnly => "compiled only under cfg(test)",
            Self::UnsupportedInterface => "trait cannot be mocked",
        };
        f.write_str(reason)
    }
}

pub(crate) struct Rewriter<'a> {
    entry_points: &'a [String],
    borrowing: &'a BorrowingTypes,
}

impl<'a> Rewriter<'a> {
    pub(crate) fn new(entry_points: &'a [String], borrowing: &'a BorrowingTypes) -> Self {
        Self {
            entry_points,
            borrowing,
        }
    }

    /// Rewrite a free function. `top_level` is set for the file scope, where
    /// entry points live.
    pub(crate) fn rewrite_function(
        &self,
        function: &mut ItemFn,
        top_level: bool,
    ) -> Result<(), SkipReason> {
        if top_level && self.entry_points.iter().any(|entry| function.sig.ident == entry) {
            return Err(SkipReason::EntryPoint);
        }
        check_attrs(&function.attrs)?;
        instrument_body(&mut function.sig, &mut function.block, &Owner::Free, self.borrowing)
    }

    /// Rewrite every method of an `impl` block, recording each outcome.
    pub(crate) fn rewrite_impl(&self, block: &mut ItemImpl, report: &mut Report) {
        let owner = Owner::of_impl(block);
        let block_skip = if is_cfg_test(&block.attrs) {
            Some(SkipReason::TestOnly)
        } else if !block.generics.params.is_empty() {
            Some(SkipReason::GenericImpl)
        } else {
            None
        };

        for item in &mut block.items {
            let ImplItem::Fn(method) = item else {
                continue;
            };
            let name = owner.qualify(&method.sig.ident);
            let outcome = match block_skip {
                Some(reason) => Err(reason),
                None => self.rewrite_method(method, &owner),
            };
            match outcome {
                Ok(()) => report.rewritten(&name),
                Err(reason) => report.skip(name, reason),
            }
        }
    }

    pub(crate) fn rewrite_method(
        &self,
        method: &mut ImplItemFn,
        owner: &Owner,
    ) -> Result<(), SkipReason> {
        check_attrs(&method.attrs)?;
        instrument_body(&mut method.sig, &mut method.block, owner, self.borrowing)
    }
}

fn check_attrs(attrs: &[Attribute]) -> Result<(), SkipReason> {
    if is_cfg_test(attrs) {
        return Err(SkipReason::TestOnly);
    }
    if attrs.iter().any(is_test_harness_attr) {
        return Err(SkipReason::TestHarness);
    }
    Ok(())
}

fn check_signature(sig: &Signature) -> Result<(), SkipReason> {
    if sig.constness.is_some() {
        return Err(SkipReason::ConstFn);
    }
    if has_type_generics(&sig.generics) {
        return Err(SkipReason::Generic);
    }
    if sig.variadic.is_some() {
        return Err(SkipReason::Variadic);
    }
    if let ReturnType::Type(_, ty) = &sig.output {
        if matches!(**ty, Type::Never(_)) {
            return Err(SkipReason::Diverging);
        }
    }
    if has_impl_trait(sig) {
        return Err(SkipReason::ImplTrait);
    }
    Ok(())
}

/// Prepend the guard to `block`, renaming pattern parameters so they can be
/// captured.
pub(crate) fn instrument_body(
    sig: &mut Signature,
    block: &mut Block,
    owner: &Owner,
    borrowing: &BorrowingTypes,
) -> Result<(), SkipReason> {
    check_signature(sig)?;
    let name = owner.qualify(&sig.ident);

    let mut captures: Vec<Expr> = Vec::with_capacity(sig.inputs.len());
    let mut rebinds: Vec<Stmt> = Vec::new();
    for (index, input) in sig.inputs.iter_mut().enumerate() {
        match input {
            FnArg::Receiver(receiver) => captures.push(receiver_capture(receiver)),
            FnArg::Typed(typed) => {
                let ident = match plain_binding(&typed.pat) {
                    Some(ident) => ident,
                    None => {
                        let ident = format_ident!("__mock4rs_arg{}", index);
                        let pattern = std::mem::replace(&mut typed.pat, parse_quote!(#ident));
                        if !matches!(*pattern, Pat::Wild(_)) {
                            rebinds.push(parse_quote!(let #pattern = #ident;));
                        }
                        ident
                    }
                };
                captures.push(capture_expr(&ident, &typed.ty, borrowing));
            }
        }
    }

    let guard = build_guard(&name, &captures, &results(&sig.output));
    let original = std::mem::take(&mut block.stmts);
    block.stmts = std::iter::once(guard)
        .chain(rebinds)
        .chain(original)
        .collect();

    debug!(function = %name, "inserted interception guard");
    Ok(())
}

fn plain_binding(pat: &Pat) -> Option<Ident> {
    match pat {
        Pat::Ident(binding) if binding.by_ref.is_none() && binding.subpat.is_none() => {
            Some(binding.ident.clone())
        }
        _ => None,
    }
}

fn build_guard(name: &str, captures: &[Expr], results: &[Type]) -> Stmt {
    let name = LitStr::new(name, Span::call_site());
    let intercept = quote! {
        __mock4rs::intercept(
            &__mock4rs::FunctionId::new(::core::module_path!(), #name),
            ::std::vec![#(#captures),*],
        )
    };

    match results {
        [] => parse_quote! {
            if let ::core::option::Option::Some(_) = #intercept {
                return;
            }
        },
        [single] => {
            let slot = result_slot(0, single);
            parse_quote! {
                if let ::core::option::Option::Some(mut __mock4rs_values) = #intercept {
                    #slot
                    return __mock4rs_values.result(__mock4rs_ret0, 0usize);
                }
            }
        }
        many => {
            let whole = erase_lifetimes(&parse_quote!((#(#many),*)));
            let slots = many.iter().enumerate().map(|(i, ty)| result_slot(i, ty));
            let values = (0..many.len()).map(|i| {
                let ret = format_ident!("__mock4rs_ret{}", i);
                quote!(__mock4rs_values.result(#ret, #i))
            });
            parse_quote! {
                if let ::core::option::Option::Some(mut __mock4rs_values) = #intercept {
                    if let ::core::option::Option::Some(__mock4rs_whole) =
                        __mock4rs_values.take_whole::<#whole>()
                    {
                        return __mock4rs_whole;
                    }
                    #(#slots)*
                    return (#(#values),*);
                }
            }
        }
    }
}

/// Placeholder for result `position`: the zero value of `ty` if it has one,
/// replaced by the canned value when present.
fn result_slot(position: usize, ty: &Type) -> TokenStream {
    let ret = format_ident!("__mock4rs_ret{}", position);
    let erased = erase_lifetimes(ty);
    quote! {
        let mut #ret: ::core::option::Option<#ty> = (&__mock4rs::Zero::<#ty>::new()).zero();
        if let ::core::option::Option::Some(__mock4rs_value) =
            __mock4rs_values.take::<#erased>(#position)
        {
            #ret = ::core::option::Option::Some(__mock4rs_value);
        }
    }
}

/// Replace named lifetimes with `'_` so the type can be used as a
/// turbofish argument inside the body.
fn erase_lifetimes(ty: &Type) -> Type {
    struct Eraser;

    impl VisitMut for Eraser {
        fn visit_lifetime_mut(&mut self, lifetime: &mut Lifetime) {
            if lifetime.ident != "static" {
                *lifetime = Lifetime::new("'_", lifetime.span());
            }
        }

        fn visit_type_bare_fn_mut(&mut self, _: &mut syn::TypeBareFn) {}

        fn visit_trait_bound_mut(&mut self, bound: &mut syn::TraitBound) {
            if bound.lifetimes.is_none() {
                visit_mut::visit_trait_bound_mut(self, bound);
            }
        }
    }

    let mut erased = ty.clone();
    Eraser.visit_type_mut(&mut erased);
    erased
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quote::ToTokens;
    use syn::visit::Visit;

    fn literals(block: &Block) -> Vec<String> {
        struct Literals(Vec<String>);

        impl<'ast> Visit<'ast> for Literals {
            fn visit_lit_str(&mut self, lit: &'ast LitStr) {
                self.0.push(lit.value());
            }
        }

        let mut found = Literals(Vec::new());
        found.visit_block(block);
        found.0
    }

    fn rewrite(function: &mut ItemFn) -> Result<(), SkipReason> {
        let entry_points = vec![String::from("main")];
        Rewriter::new(&entry_points, &BorrowingTypes::default()).rewrite_function(function, true)
    }

    fn guard_text(function: &ItemFn) -> String {
        function.block.stmts[0].to_token_stream().to_string()
    }

    #[test]
    fn guard_is_prepended() {
        let mut function: ItemFn = parse_quote! {
            fn greet(name: &str) -> String {
                format!("hi {name}")
            }
        };
        rewrite(&mut function).unwrap();

        assert_eq!(function.block.stmts.len(), 2);
        assert!(matches!(
            &function.block.stmts[0],
            Stmt::Expr(Expr::If(_), None)
        ));
        assert_eq!(literals(&function.block), vec!["greet"]);
    }

    #[test]
    fn pattern_parameters_are_renamed_and_rebound() {
        let mut function: ItemFn = parse_quote! {
            fn area((w, h): (u32, u32), _: bool) -> u32 {
                w * h
            }
        };
        rewrite(&mut function).unwrap();

        let params: Vec<String> = function
            .sig
            .inputs
            .iter()
            .filter_map(|input| match input {
                FnArg::Typed(typed) => plain_binding(&typed.pat).map(|i| i.to_string()),
                FnArg::Receiver(_) => None,
            })
            .collect();
        assert_eq!(params, vec!["__mock4rs_arg0", "__mock4rs_arg1"]);

        let rebind: Stmt = parse_quote!(let (w, h) = __mock4rs_arg0;);
        assert_eq!(function.block.stmts[1], rebind);
        assert_eq!(function.block.stmts.len(), 3);
    }

    #[test]
    fn entry_point_and_tests_are_skipped() {
        let mut main: ItemFn = parse_quote!(fn main() {});
        assert_eq!(rewrite(&mut main), Err(SkipReason::EntryPoint));

        let mut test: ItemFn = parse_quote! {
            #[tokio::test]
            async fn works() {}
        };
        assert_eq!(rewrite(&mut test), Err(SkipReason::TestHarness));
    }

    #[test]
    fn nested_main_is_not_an_entry_point() {
        let entry_points = vec![String::from("main")];
        let mut main: ItemFn = parse_quote!(fn main() {});
        let borrowing = BorrowingTypes::default();
        let rewritten = Rewriter::new(&entry_points, &borrowing).rewrite_function(&mut main, false);
        assert_eq!(rewritten, Ok(()));
    }

    #[test]
    fn unsupported_signatures_are_skipped() {
        let cases: Vec<(ItemFn, SkipReason)> = vec![
            (parse_quote!(const fn c() -> u8 { 1 }), SkipReason::ConstFn),
            (parse_quote!(fn g<T>(t: T) {}), SkipReason::Generic),
            (parse_quote!(fn n<const N: usize>() {}), SkipReason::Generic),
            (parse_quote!(fn i(f: impl Fn()) {}), SkipReason::ImplTrait),
            (parse_quote!(fn d() -> ! { loop {} }), SkipReason::Diverging),
        ];
        for (mut function, expected) in cases {
            assert_eq!(rewrite(&mut function), Err(expected));
        }
    }

    #[test]
    fn lifetime_generics_are_instrumented() {
        let mut function: ItemFn = parse_quote! {
            fn first<'a>(words: &'a [String]) -> &'a String {
                &words[0]
            }
        };
        assert_eq!(rewrite(&mut function), Ok(()));
    }

    #[test]
    fn generic_impl_methods_are_reported_as_skipped() {
        let entry_points = Vec::new();
        let mut block: ItemImpl = parse_quote! {
            impl<T> Stack<T> {
                fn push(&mut self, value: T) {}
            }
        };
        let mut report = Report::default();
        let borrowing = BorrowingTypes::default();
        Rewriter::new(&entry_points, &borrowing).rewrite_impl(&mut block, &mut report);

        assert_eq!(report.functions_rewritten, 0);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].name, "Stack<T>::push");
        assert_eq!(report.skipped[0].reason, SkipReason::GenericImpl);
    }

    #[test]
    fn trait_impl_methods_use_qualified_names() {
        let entry_points = Vec::new();
        let mut block: ItemImpl = parse_quote! {
            impl Ledger for Account {
                fn post(&mut self, amount: i64) -> Result<(), String> {
                    Ok(())
                }
            }
        };
        let mut report = Report::default();
        let borrowing = BorrowingTypes::default();
        Rewriter::new(&entry_points, &borrowing).rewrite_impl(&mut block, &mut report);

        assert_eq!(report.functions_rewritten, 1);
        let ImplItem::Fn(method) = &block.items[0] else {
            panic!("expected a method");
        };
        assert_eq!(literals(&method.block), vec!["<Account as Ledger>::post"]);
    }

    #[test]
    fn one_element_tuple_is_a_single_result() {
        let mut function: ItemFn = parse_quote! {
            fn one() -> (u32,) {
                (1,)
            }
        };
        rewrite(&mut function).unwrap();

        let guard = guard_text(&function);
        assert!(!guard.contains("take_whole"), "{guard}");
        assert!(guard.contains("take :: < (u32 ,) >"), "{guard}");
    }

    #[test]
    fn elided_borrowing_parameters_are_captured_opaquely() {
        let mut function: ItemFn = parse_quote! {
            fn shout(s: Cow<str>, times: usize) -> usize {
                s.len() * times
            }
        };
        rewrite(&mut function).unwrap();

        let guard = guard_text(&function);
        assert!(guard.contains("Arg :: opaque_of (& s)"), "{guard}");
        assert!(guard.contains("Probe (& times)"), "{guard}");
    }

    #[test]
    fn lifetimes_are_erased_for_turbofish() {
        let ty: Type = parse_quote!(Result<&'a str, Box<dyn Error + 'static>>);
        let erased: Type = parse_quote!(Result<&'_ str, Box<dyn Error + 'static>>);
        assert_eq!(erase_lifetimes(&ty), erased);
    }
}
