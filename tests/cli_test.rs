use clap::Parser;
use kiln::cli::{build_context, include_root, load_context, parse_assignment, Args};
use serde_json::json;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn make_args(args: &[&str]) -> Vec<OsString> {
    let mut res = vec![OsString::from("kiln")];
    res.extend(args.iter().map(OsString::from));
    res
}

#[test]
fn test_basic_args() {
    let parsed = Args::try_parse_from(make_args(&["./templates/Makefile.mako"])).unwrap();

    assert_eq!(parsed.template, PathBuf::from("./templates/Makefile.mako"));
    assert!(parsed.context.is_none());
    assert!(parsed.set.is_empty());
    assert!(parsed.output.is_none());
    assert!(!parsed.verbose);
}

#[test]
fn test_all_flags() {
    let args = make_args(&[
        "--context",
        "ctx.yaml",
        "--set",
        "name=demo",
        "--set",
        "debug=true",
        "--root",
        "./templates",
        "--config",
        "kiln.yml",
        "--output",
        "out/Makefile",
        "--verbose",
        "Makefile.mako",
    ]);
    let parsed = Args::try_parse_from(args).unwrap();

    assert_eq!(parsed.context, Some(PathBuf::from("ctx.yaml")));
    assert_eq!(
        parsed.set,
        vec![("name".to_string(), json!("demo")), ("debug".to_string(), json!(true))]
    );
    assert_eq!(parsed.root, Some(PathBuf::from("./templates")));
    assert_eq!(parsed.config, Some(PathBuf::from("kiln.yml")));
    assert_eq!(parsed.output, Some(PathBuf::from("out/Makefile")));
    assert!(parsed.verbose);
}

#[test]
fn test_short_flags() {
    let parsed = Args::try_parse_from(make_args(&["-v", "-o", "out.txt", "-c", "ctx.json", "t.mako"])).unwrap();

    assert!(parsed.verbose);
    assert_eq!(parsed.output, Some(PathBuf::from("out.txt")));
    assert_eq!(parsed.context, Some(PathBuf::from("ctx.json")));
}

#[test]
fn test_missing_args() {
    assert!(Args::try_parse_from(make_args(&[])).is_err());
}

#[test]
fn test_too_many_args() {
    assert!(Args::try_parse_from(make_args(&["a.mako", "b.mako"])).is_err());
}

#[test]
fn test_parse_assignment() {
    assert_eq!(parse_assignment("jobs=4").unwrap(), ("jobs".to_string(), json!(4)));
    assert_eq!(parse_assignment("libs=[\"m\"]").unwrap(), ("libs".to_string(), json!(["m"])));
    assert_eq!(parse_assignment("cc=gcc -O2").unwrap(), ("cc".to_string(), json!("gcc -O2")));
    assert_eq!(parse_assignment("empty=").unwrap(), ("empty".to_string(), json!("")));
    assert!(parse_assignment("novalue").is_err());
    assert!(parse_assignment("=1").is_err());
}

#[test]
fn test_context_file_and_overrides() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("context.yaml");
    fs::write(&path, "name: app\nsources:\n  - main.c\n").unwrap();

    assert_eq!(load_context(&path).unwrap()["sources"], json!(["main.c"]));

    let args = Args::try_parse_from(make_args(&[
        "--context",
        path.to_str().unwrap(),
        "--set",
        "name=other",
        "t.mako",
    ]))
    .unwrap();
    assert_eq!(build_context(&args).unwrap(), json!({"name": "other", "sources": ["main.c"]}));
}

#[test]
fn test_context_file_must_be_a_mapping() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("context.json");
    fs::write(&path, "[1, 2]").unwrap();
    assert!(load_context(&path).is_err());
    assert!(load_context(dir.path().join("missing.json")).is_err());
}

#[test]
fn test_include_root_defaults_to_template_directory() {
    let args = Args::try_parse_from(make_args(&["templates/cmake/CMakeLists.txt.mako"])).unwrap();
    assert_eq!(include_root(&args), PathBuf::from("templates/cmake"));

    let args = Args::try_parse_from(make_args(&["Makefile.mako"])).unwrap();
    assert_eq!(include_root(&args), PathBuf::from("."));

    let args = Args::try_parse_from(make_args(&["--root", "/srv/templates", "Makefile.mako"])).unwrap();
    assert_eq!(include_root(&args), PathBuf::from("/srv/templates"));
}
