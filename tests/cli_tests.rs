#![cfg(feature = "instrument")]

use assert_cmd::Command;
use indoc::indoc;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn mock4rs() -> Command {
    Command::cargo_bin("mock4rs").unwrap()
}

fn fixture_crate() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("Cargo.toml"),
        indoc! {r#"
            [package]
            name = "fixture"
            version = "0.1.0"
            edition = "2021"
        "#},
    )
    .unwrap();
    fs::create_dir(dir.path().join("src")).unwrap();
    fs::write(
        dir.path().join("src/lib.rs"),
        "pub fn answer() -> u32 { 42 }\n",
    )
    .unwrap();
    dir
}

fn stdout_of(command: &mut Command) -> String {
    let output = command.output().unwrap();
    assert!(output.status.success(), "{output:?}");
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn file_prints_instrumented_source() {
    let krate = fixture_crate();
    let text = stdout_of(
        mock4rs()
            .current_dir(krate.path())
            .args(["file", "src/lib.rs"]),
    );
    assert!(text.contains("__mock4rs::intercept"), "{text}");
    assert!(text.contains("\"answer\""), "{text}");
}

#[test]
fn file_reports_parse_errors_with_exit_code_2() {
    let krate = fixture_crate();
    fs::write(krate.path().join("src/lib.rs"), "fn broken( {\n").unwrap();

    let output = mock4rs()
        .current_dir(krate.path())
        .args(["file", "src/lib.rs"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("E010"));
}

#[test]
fn instrument_only_requires_keep() {
    let output = mock4rs().args(["test", "-i"]).output().unwrap();
    assert!(!output.status.success());
}

#[test]
fn instrument_only_keeps_the_staged_copy() {
    let krate = fixture_crate();
    let destination = tempfile::tempdir().unwrap();

    mock4rs()
        .args(["test", "-k", "-i", "-d"])
        .arg(destination.path())
        .arg(krate.path())
        .assert()
        .success();

    let staged = destination.path().join("fixture");
    let lib = fs::read_to_string(staged.join("src/lib.rs")).unwrap();
    assert!(lib.contains("__mock4rs"), "{lib}");
    assert!(fs::read_to_string(staged.join("Cargo.toml"))
        .unwrap()
        .contains("mock4rs"));
}

#[cfg(unix)]
#[test]
fn failing_test_command_exits_with_1_and_cleans_up() {
    let krate = fixture_crate();
    let destination = tempfile::tempdir().unwrap();

    mock4rs()
        .args(["test", "-d"])
        .arg(destination.path())
        .arg(krate.path())
        .args(["--", "false"])
        .assert()
        .code(1);

    assert!(!destination.path().join("fixture").exists());
}

#[cfg(unix)]
#[test]
fn passing_test_command_exits_with_0() {
    let krate = fixture_crate();
    let destination = tempfile::tempdir().unwrap();

    mock4rs()
        .args(["test", "-d"])
        .arg(destination.path())
        .arg(krate.path())
        .args(["--", "true"])
        .assert()
        .success();
}

#[test]
fn missing_test_command_is_a_tool_error() {
    let krate = fixture_crate();
    let destination = tempfile::tempdir().unwrap();

    mock4rs()
        .args(["test", "-d"])
        .arg(destination.path())
        .arg(krate.path())
        .args(["--", "mock4rs-no-such-runner"])
        .assert()
        .code(2);
}

#[test]
fn init_writes_a_config_once() {
    let krate = fixture_crate();
    let config = krate.path().join(".mock4rs.toml");

    mock4rs().arg("init").arg(krate.path()).assert().success();
    assert!(config.exists());
    assert!(fs::read_to_string(&config).unwrap().contains("entry_points"));

    mock4rs().arg("init").arg(krate.path()).assert().code(2);
    mock4rs()
        .args(["init", "--force"])
        .arg(krate.path())
        .assert()
        .success();
}

#[test]
fn config_file_supplies_the_command() {
    let krate = fixture_crate();
    let destination = tempfile::tempdir().unwrap();
    fs::write(
        krate.path().join(".mock4rs.toml"),
        "command = [\"mock4rs-no-such-runner\"]\n",
    )
    .unwrap();

    mock4rs()
        .args(["test", "-d"])
        .arg(destination.path())
        .arg(krate.path())
        .assert()
        .code(2);
    assert!(!Path::new(&destination.path().join("fixture")).exists());
}

const SCENARIO_LIB: &str = indoc! {r#"
    use std::borrow::Cow;

    pub fn greet(name: &str) -> String {
        format!("hi {name}")
    }

    pub fn shout(s: Cow<str>) -> usize {
        s.len()
    }

    pub fn one() -> (u32,) {
        (1,)
    }

    pub struct Parser<'a> {
        pub input: &'a str,
    }

    pub fn parse_len(parser: Parser) -> usize {
        parser.input.len()
    }

    pub trait Store {
        fn get(&self, key: &str) -> Option<String>;
    }

    pub trait Reader {
        fn read(&self, len: usize) -> Vec<u8>;
    }

    pub trait Source: Reader {
        fn name(&self) -> String;
    }

    pub fn total<S: Source>(source: &S) -> usize {
        source.read(3).len() + source.name().len()
    }
"#};

const SCENARIO_TEST: &str = indoc! {r#"
    use fixture::{greet, one, parse_len, shout, total, MockSource, MockStore, Parser, Reader, Source, Store};
    use mock4rs::runtime::{record, when};
    use std::borrow::Cow;

    #[test]
    fn stubs_replace_real_behavior() {
        assert_eq!(greet("ann"), "hi ann");
        assert_eq!(shout(Cow::Borrowed("hey")), 3);
        assert_eq!(one(), (1,));

        let store = MockStore::default();
        let source = MockSource::default();
        record(|| {
            when(|| greet("bob")).then_return(String::from("yo bob"));
            when(|| shout(Cow::Borrowed("ignored"))).then_return(99usize);
            when(|| one()).then_return((7u32,));
            when(|| parse_len(Parser { input: "abc" })).then_return(10usize);
            when(|| store.get("k")).then_return(Some(String::from("v")));
            when(|| source.reader.read(3)).then_return(vec![1u8, 2, 3, 4]);
            when(|| source.name()).then_return(String::from("src"));
        });

        assert_eq!(greet("bob"), "yo bob");
        assert_eq!(greet("ann"), "hi ann");
        assert_eq!(shout(Cow::Owned(String::from("anything"))), 99);
        assert_eq!(one(), (7,));
        assert_eq!(parse_len(Parser { input: "xyz" }), 10);
        assert_eq!(store.get("k"), Some(String::from("v")));
        assert_eq!(store.get("other"), None);
        assert_eq!(total(&source), 7);
    }
"#};

/// Stages a crate against this checkout of the runtime and runs its tests
/// for real: free functions, a trait mock, a supertrait mock, a borrowed
/// by-value parameter and a one-element tuple result.
#[test]
fn test_command_runs_instrumented_scenarios() {
    let krate = fixture_crate();
    fs::write(krate.path().join("src/lib.rs"), SCENARIO_LIB).unwrap();
    fs::create_dir(krate.path().join("tests")).unwrap();
    fs::write(krate.path().join("tests/scenarios.rs"), SCENARIO_TEST).unwrap();
    fs::write(
        krate.path().join(".mock4rs.toml"),
        format!(
            "command = [\"cargo\", \"test\", \"--offline\"]\n\n[runtime_dependency]\npath = '{}'\n",
            env!("CARGO_MANIFEST_DIR")
        ),
    )
    .unwrap();

    let destination = tempfile::tempdir().unwrap();
    let target_dir = tempfile::tempdir().unwrap();
    let output = mock4rs()
        .env("CARGO_TARGET_DIR", target_dir.path())
        .args(["test", "-d"])
        .arg(destination.path())
        .arg(krate.path())
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(!destination.path().join("fixture").exists());
}
