//! Source transformer: rewrites one Rust file so that its functions and
//! methods consult the runtime registry, and adds mock types for its traits.

pub mod declaration;
mod rewriter;
mod synthesizer;

pub use declaration::{BorrowingTypes, Declaration};
pub use rewriter::SkipReason;

use declaration::is_cfg_test;
use rewriter::Rewriter;
use std::fs;
use std::path::{Path, PathBuf};
use synthesizer::TraitTable;
use syn::{parse_quote, Item, UseTree};
use thiserror::Error;
use tracing::{debug, debug_span, warn};

/// Errors raised while transforming a source file.
#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("parse error at {line}:{column}: {message}")]
    Parse {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("unsupported construct in {item}: {reason}")]
    UnsupportedConstruct { item: String, reason: String },

    #[error("source is already instrumented")]
    AlreadyInstrumented,

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Knobs of the transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentOptions {
    /// Names of file-scope functions never rewritten.
    pub entry_points: Vec<String>,
    /// Log and skip traits that cannot be mocked instead of failing.
    pub skip_unsupported_interfaces: bool,
    /// Lifetime-generic types declared elsewhere in the crate. Those of the
    /// file itself are always added.
    pub borrowing_types: BorrowingTypes,
}

impl Default for InstrumentOptions {
    fn default() -> Self {
        Self {
            entry_points: vec![String::from("main")],
            skip_unsupported_interfaces: false,
            borrowing_types: BorrowingTypes::default(),
        }
    }
}

/// A declaration left as it was, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub name: String,
    pub reason: SkipReason,
}

/// Result of transforming one file.
#[derive(Debug, Clone)]
pub struct Instrumented {
    pub source: String,
    pub functions_rewritten: usize,
    pub mocks_synthesized: usize,
    pub skipped: Vec<Skipped>,
}

impl Instrumented {
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.functions_rewritten > 0 || self.mocks_synthesized > 0
    }
}

#[derive(Debug, Default)]
pub(crate) struct Report {
    pub(crate) functions_rewritten: usize,
    pub(crate) mocks_synthesized: usize,
    pub(crate) skipped: Vec<Skipped>,
}

impl Report {
    pub(crate) fn rewritten(&mut self, name: &str) {
        self.functions_rewritten += 1;
        debug!(function = name, "rewritten");
    }

    pub(crate) fn skip(&mut self, name: String, reason: SkipReason) {
        debug!(function = %name, %reason, "left untouched");
        self.skipped.push(Skipped { name, reason });
    }
}

/// Transform the text of one source file.
///
/// # Errors
///
/// Returns [`InstrumentError::Parse`] for malformed input,
/// [`InstrumentError::UnsupportedConstruct`] for traits that cannot be
/// mocked (unless skipping is enabled) and
/// [`InstrumentError::AlreadyInstrumented`] for the output of a previous run.
pub fn instrument_source(
    source: &str,
    options: &InstrumentOptions,
) -> Result<Instrumented, InstrumentError> {
    let file = parse_source(source)?;

    let mut borrowing = BorrowingTypes::declared_in(&file.items);
    borrowing.extend(&options.borrowing_types);
    let rewriter = Rewriter::new(&options.entry_points, &borrowing);
    let mut report = Report::default();
    let syn::File {
        shebang,
        attrs,
        items,
    } = file;
    let items = instrument_scope(items, true, &rewriter, options, &mut report)?;
    let file = syn::File {
        shebang,
        attrs,
        items,
    };

    Ok(Instrumented {
        source: prettyplease::unparse(&file),
        functions_rewritten: report.functions_rewritten,
        mocks_synthesized: report.mocks_synthesized,
        skipped: report.skipped,
    })
}

/// Lifetime-generic types declared in one source file, for sharing across
/// the files of a crate through [`InstrumentOptions::borrowing_types`].
pub fn borrowing_types_of(source: &str) -> Result<BorrowingTypes, InstrumentError> {
    Ok(BorrowingTypes::declared_in(&parse_source(source)?.items))
}

fn parse_source(source: &str) -> Result<syn::File, InstrumentError> {
    syn::parse_file(source).map_err(|err| {
        let start = err.span().start();
        InstrumentError::Parse {
            message: err.to_string(),
            line: start.line,
            column: start.column + 1,
        }
    })
}

/// Read and transform the file at `path`.
pub fn instrument_file(
    path: &Path,
    options: &InstrumentOptions,
) -> Result<Instrumented, InstrumentError> {
    let _span = debug_span!("instrument_file", path = %path.display()).entered();
    let source = fs::read_to_string(path).map_err(|source| InstrumentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let instrumented = instrument_source(&source, options)?;
    debug!(
        rewritten = instrumented.functions_rewritten,
        mocks = instrumented.mocks_synthesized,
        skipped = instrumented.skipped.len(),
        "instrumented file"
    );
    Ok(instrumented)
}

/// Transform the file at `path` and write the result back.
pub fn instrument_file_in_place(
    path: &Path,
    options: &InstrumentOptions,
) -> Result<Instrumented, InstrumentError> {
    let instrumented = instrument_file(path, options)?;
    fs::write(path, &instrumented.source).map_err(|source| InstrumentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(instrumented)
}

/// Rewrite the items of one module scope. Each scope that received a
/// rewrite or a mock gets its own runtime import.
fn instrument_scope(
    items: Vec<Item>,
    top_level: bool,
    rewriter: &Rewriter<'_>,
    options: &InstrumentOptions,
    report: &mut Report,
) -> Result<Vec<Item>, InstrumentError> {
    if items.iter().any(is_runtime_import) {
        return Err(InstrumentError::AlreadyInstrumented);
    }

    let table: TraitTable = items
        .iter()
        .filter_map(|item| match item {
            Item::Trait(interface) if !is_cfg_test(&interface.attrs) => {
                Some((interface.ident.to_string(), interface.clone()))
            }
            _ => None,
        })
        .collect();

    let mut rewritten_here = 0;
    let mut output = Vec::with_capacity(items.len() + 1);
    let mut mocks = Vec::new();

    for item in items {
        let before = report.functions_rewritten;
        match Declaration::from(item) {
            Declaration::Function(mut function) => {
                let name = function.sig.ident.to_string();
                match rewriter.rewrite_function(&mut function, top_level) {
                    Ok(()) => report.rewritten(&name),
                    Err(reason) => report.skip(name, reason),
                }
                output.push(Item::Fn(function));
            }
            Declaration::Method(mut block) => {
                rewriter.rewrite_impl(&mut block, report);
                output.push(Item::Impl(block));
            }
            Declaration::Interface(interface) => {
                if !is_cfg_test(&interface.attrs) {
                    match synthesizer::synthesize(&interface, &table, rewriter, report) {
                        Ok(items) => mocks.extend(items),
                        Err(err @ InstrumentError::UnsupportedConstruct { .. })
                            if options.skip_unsupported_interfaces =>
                        {
                            warn!(%err, "skipping mock synthesis");
                            report.skip(
                                format!("trait {}", interface.ident),
                                SkipReason::UnsupportedInterface,
                            );
                        }
                        Err(err) => return Err(err),
                    }
                }
                output.push(Item::Trait(interface));
            }
            Declaration::Module(mut module) => {
                if !is_cfg_test(&module.attrs) {
                    if let Some((brace, content)) = module.content.take() {
                        let content = instrument_scope(content, false, rewriter, options, report)?;
                        module.content = Some((brace, content));
                    }
                }
                output.push(Item::Mod(module));
                continue;
            }
            Declaration::Other(other) => output.push(other),
        }
        rewritten_here += report.functions_rewritten - before;
    }

    let needs_import = rewritten_here > 0 || !mocks.is_empty();
    output.extend(mocks);
    if needs_import {
        output.insert(0, runtime_import());
    }
    Ok(output)
}

fn runtime_import() -> Item {
    parse_quote! {
        #[allow(unused_imports)]
        use ::mock4rs::runtime::{
            self as __mock4rs, CaptureByValue as _, CaptureOpaque as _, ZeroAbsent as _,
            ZeroByDefault as _,
        };
    }
}

fn is_runtime_import(item: &Item) -> bool {
    fn renames_to_runtime(tree: &UseTree) -> bool {
        match tree {
            UseTree::Path(path) => renames_to_runtime(&path.tree),
            UseTree::Rename(rename) => rename.rename == "__mock4rs",
            UseTree::Group(group) => group.items.iter().any(renames_to_runtime),
            UseTree::Name(_) | UseTree::Glob(_) => false,
        }
    }

    matches!(item, Item::Use(import) if renames_to_runtime(&import.tree))
}
