#![cfg(feature = "instrument")]

use indoc::indoc;
use mock4rs::instrument::{InstrumentError, InstrumentOptions, SkipReason, Skipped};
use mock4rs::{instrument_file_in_place, instrument_source};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use syn::visit::Visit;
use syn::{Expr, ImplItem, Item, LitStr, Stmt};

fn instrument(source: &str) -> (syn::File, mock4rs::Instrumented) {
    let instrumented = instrument_source(source, &InstrumentOptions::default()).unwrap();
    let file = syn::parse_file(&instrumented.source).expect("instrumented output parses");
    (file, instrumented)
}

fn string_literals(file: &syn::File) -> Vec<String> {
    struct Literals(Vec<String>);

    impl<'ast> Visit<'ast> for Literals {
        fn visit_lit_str(&mut self, lit: &'ast LitStr) {
            self.0.push(lit.value());
        }
    }

    let mut found = Literals(Vec::new());
    found.visit_file(file);
    found.0
}

fn function<'a>(file: &'a syn::File, name: &str) -> &'a syn::ItemFn {
    file.items
        .iter()
        .find_map(|item| match item {
            Item::Fn(function) if function.sig.ident == name => Some(function),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no function `{name}`"))
}

fn starts_with_guard(stmts: &[Stmt]) -> bool {
    matches!(stmts.first(), Some(Stmt::Expr(Expr::If(_), None)))
}

fn has_runtime_import(items: &[Item]) -> bool {
    matches!(items.first(), Some(Item::Use(import))
        if quote::quote!(#import).to_string().contains("__mock4rs"))
}

#[test]
fn greet_is_guarded() {
    let (file, instrumented) = instrument(indoc! {r#"
        pub fn greet(name: &str) -> String {
            format!("hi {name}")
        }
    "#});

    assert_eq!(instrumented.functions_rewritten, 1);
    assert!(has_runtime_import(&file.items));
    let greet = function(&file, "greet");
    assert!(starts_with_guard(&greet.block.stmts));
    assert_eq!(greet.block.stmts.len(), 2);
    assert!(string_literals(&file).contains(&String::from("greet")));
}

#[test]
fn entry_points_tests_and_const_fns_are_untouched() {
    let (file, instrumented) = instrument(indoc! {r#"
        fn main() {
            run();
        }

        fn run() {}

        const fn limit() -> usize { 4 }

        fn largest<T: Ord>(items: Vec<T>) -> Option<T> {
            items.into_iter().max()
        }

        #[test]
        fn smoke() {}

        #[cfg(test)]
        mod tests {
            fn helper() -> u8 { 1 }
        }
    "#});

    assert_eq!(instrumented.functions_rewritten, 1);
    assert!(!starts_with_guard(&function(&file, "main").block.stmts));
    assert!(starts_with_guard(&function(&file, "run").block.stmts));

    let mut skipped = instrumented.skipped.clone();
    skipped.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(
        skipped,
        vec![
            Skipped {
                name: String::from("largest"),
                reason: SkipReason::Generic,
            },
            Skipped {
                name: String::from("limit"),
                reason: SkipReason::ConstFn,
            },
            Skipped {
                name: String::from("main"),
                reason: SkipReason::EntryPoint,
            },
            Skipped {
                name: String::from("smoke"),
                reason: SkipReason::TestHarness,
            },
        ]
    );
    assert!(!string_literals(&file).contains(&String::from("helper")));
}

#[test]
fn methods_get_qualified_names() {
    let (file, instrumented) = instrument(indoc! {r#"
        pub struct Account { balance: i64 }

        pub trait Ledger {
            fn post(&mut self, amount: i64);
        }

        impl Account {
            pub fn balance(&self) -> i64 { self.balance }
        }

        impl Ledger for Account {
            fn post(&mut self, amount: i64) { self.balance += amount; }
        }
    "#});

    let literals = string_literals(&file);
    assert!(literals.contains(&String::from("Account::balance")), "{literals:?}");
    assert!(literals.contains(&String::from("<Account as Ledger>::post")), "{literals:?}");
    assert!(literals.contains(&String::from("<MockLedger as Ledger>::post")), "{literals:?}");
    assert_eq!(instrumented.functions_rewritten, 3);
    assert_eq!(instrumented.mocks_synthesized, 1);
}

#[test]
fn generic_impls_are_skipped() {
    let (_, instrumented) = instrument(indoc! {r#"
        pub struct Wrapper<T>(T);

        impl<T: Clone> Wrapper<T> {
            pub fn get(&self) -> T { self.0.clone() }
        }
    "#});

    assert_eq!(instrumented.functions_rewritten, 0);
    assert_eq!(instrumented.skipped[0].reason, SkipReason::GenericImpl);
}

#[test]
fn traits_get_mock_types_next_to_them() {
    let (file, instrumented) = instrument(indoc! {r#"
        pub trait Store {
            fn get(&self, key: &str) -> Option<String>;
            fn put(&mut self, key: String, value: String);
        }
    "#});

    assert_eq!(instrumented.mocks_synthesized, 1);
    let mock = file.items.iter().find_map(|item| match item {
        Item::Struct(mock) if mock.ident == "MockStore" => Some(mock),
        _ => None,
    });
    assert!(mock.is_some(), "{}", instrumented.source);

    let stubbed: Vec<String> = file
        .items
        .iter()
        .filter_map(|item| match item {
            Item::Impl(block) if block.trait_.is_some() => Some(block),
            _ => None,
        })
        .flat_map(|block| block.items.iter())
        .filter_map(|item| match item {
            ImplItem::Fn(method) if starts_with_guard(&method.block.stmts) => {
                Some(method.sig.ident.to_string())
            }
            _ => None,
        })
        .collect();
    assert_eq!(stubbed, vec!["get", "put"]);
}

#[test]
fn supertraits_compose_structurally() {
    let (file, _) = instrument(indoc! {r#"
        pub trait Reader {
            fn read(&mut self, len: usize) -> Vec<u8>;
        }

        pub trait Source: Reader + Send {
            fn name(&self) -> String;
        }
    "#});

    let source = file
        .items
        .iter()
        .find_map(|item| match item {
            Item::Struct(mock) if mock.ident == "MockSource" => Some(mock),
            _ => None,
        })
        .unwrap();
    let fields: Vec<String> = source
        .fields
        .iter()
        .filter_map(|field| field.ident.as_ref().map(ToString::to_string))
        .collect();
    assert_eq!(fields, vec!["reader"]);

    let reader_impls = file
        .items
        .iter()
        .filter(|item| match item {
            Item::Impl(block) => {
                let implemented = block
                    .trait_
                    .as_ref()
                    .map(|(_, path, _)| quote::quote!(#path).to_string());
                implemented.as_deref() == Some("Reader")
            }
            _ => false,
        })
        .count();
    // MockReader's own impl plus MockSource's forwarding impl.
    assert_eq!(reader_impls, 2);
}

#[test]
fn unsupported_traits_fail_unless_skipped() {
    let source = indoc! {r#"
        pub trait Container {
            type Item;
            fn first(&self) -> Option<Self::Item>;
        }

        pub fn size() -> usize { 1 }
    "#};

    let err = instrument_source(source, &InstrumentOptions::default()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "unsupported construct in trait Container: associated type `Item`"
    );

    let lenient = InstrumentOptions {
        skip_unsupported_interfaces: true,
        ..InstrumentOptions::default()
    };
    let instrumented = instrument_source(source, &lenient).unwrap();
    assert_eq!(instrumented.functions_rewritten, 1);
    assert_eq!(instrumented.mocks_synthesized, 0);
}

#[test]
fn malformed_input_is_a_parse_error() {
    let err = instrument_source("fn ok() {}\nfn broken() -> {}\n", &InstrumentOptions::default())
        .unwrap_err();
    assert!(matches!(err, InstrumentError::Parse { line: 2, .. }), "{err:?}");
}

#[test]
fn instrumenting_twice_is_rejected() {
    let options = InstrumentOptions::default();
    let once = instrument_source("pub fn one() -> u8 { 1 }", &options).unwrap();
    assert!(matches!(
        instrument_source(&once.source, &options),
        Err(InstrumentError::AlreadyInstrumented)
    ));
}

#[test]
fn custom_entry_points() {
    let options = InstrumentOptions {
        entry_points: vec![String::from("start")],
        ..InstrumentOptions::default()
    };
    let instrumented =
        instrument_source("fn start() {}\nfn main() {}\n", &options).unwrap();
    assert_eq!(instrumented.functions_rewritten, 1);
    assert_eq!(instrumented.skipped[0].name, "start");
}

#[test]
fn files_are_rewritten_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lib.rs");
    std::fs::write(&path, "pub fn answer() -> u32 { 42 }\n").unwrap();

    let instrumented = instrument_file_in_place(&path, &InstrumentOptions::default()).unwrap();
    assert!(instrumented.is_modified());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), instrumented.source);
}

fn ident() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,8}".prop_filter("not a keyword or entry point", |name| {
        name != "main" && syn::parse_str::<syn::Ident>(name).is_ok()
    })
}

proptest! {
    #[test]
    fn output_always_parses_and_names_every_function(
        names in prop::collection::btree_set(ident(), 1..6),
        value in any::<u32>(),
    ) {
        let source: String = names
            .iter()
            .map(|name| format!("pub fn {name}(x: u32, label: &str) -> u32 {{ let _ = label; x + {value} }}\n"))
            .collect();

        let instrumented = instrument_source(&source, &InstrumentOptions::default()).unwrap();
        let file = syn::parse_file(&instrumented.source).unwrap();
        prop_assert_eq!(instrumented.functions_rewritten, names.len());

        let literals = string_literals(&file);
        for name in &names {
            prop_assert!(literals.contains(name));
        }
    }
}

#[test]
fn elided_lifetime_parameters_are_not_captured_by_value() {
    let (file, _) = instrument(indoc! {r#"
        use std::borrow::Cow;

        pub struct Cursor<'a> {
            rest: &'a str,
        }

        pub fn shout(s: Cow<str>) -> usize {
            s.len()
        }

        pub fn remaining(cursor: Cursor) -> usize {
            cursor.rest.len()
        }

        pub fn render(args: std::fmt::Arguments) -> String {
            args.to_string()
        }
    "#});

    for name in ["shout", "remaining", "render"] {
        let stmt = &function(&file, name).block.stmts[0];
        let guard = quote::quote!(#stmt).to_string();
        assert!(guard.contains("opaque_of"), "{name}: {guard}");
        assert!(!guard.contains("Probe"), "{name}: {guard}");
    }
}

#[test]
fn one_element_tuple_returns_stay_whole() {
    let (file, instrumented) = instrument("pub fn one() -> (u32,) { (1,) }\n");
    assert_eq!(instrumented.functions_rewritten, 1);

    let one = function(&file, "one");
    let stmt = &one.block.stmts[0];
    let guard = quote::quote!(#stmt).to_string();
    assert!(!guard.contains("take_whole"), "{guard}");
    assert!(guard.contains("result (__mock4rs_ret0 , 0usize)"), "{guard}");
}
