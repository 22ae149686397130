use kiln::error::{Error, ResolutionError, SyntaxErrorKind, TypeErrorKind};
use kiln::loader::{DirectoryResolver, MemoryResolver};
use kiln::{Engine, EngineConfig, Map, TemplateSource};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn engine(resolver: MemoryResolver) -> Engine {
    Engine::default().with_resolver(resolver)
}

fn render_identity(engine: &Engine, identity: &str, context: serde_json::Value) -> kiln::Result<String> {
    let template = engine.load(identity)?;
    engine.render_json(template, &context)
}

#[test_log::test]
fn test_include_passes_arguments() {
    let engine = engine(
        MemoryResolver::new()
            .with("main", "<%include file=\"header\" args=\"{'title': name.upper()}\"/>body\n")
            .with("header", "<%page args=\"title, rule='='\"/>${title}\n${rule * len(title)}\n"),
    );
    assert_eq!(
        render_identity(&engine, "main", serde_json::json!({"name": "kiln"})).unwrap(),
        "KILN\n====\nbody\n"
    );
}

#[test]
fn test_include_keyword_arguments_and_interpolated_file() {
    let engine = engine(
        MemoryResolver::new()
            .with("main", "<%include file=\"${kind}/rules\" args=\"target=name, flags='-O2'\"/>")
            .with("make/rules", "${target}: ${flags}")
            .with("cmake/rules", "add_executable(${target}) # ${flags}"),
    );
    assert_eq!(
        render_identity(&engine, "main", serde_json::json!({"kind": "make", "name": "app"})).unwrap(),
        "app: -O2"
    );
    assert_eq!(
        render_identity(&engine, "main", serde_json::json!({"kind": "cmake", "name": "app"})).unwrap(),
        "add_executable(app) # -O2"
    );
}

#[test]
fn test_include_scope_is_isolated() {
    let engine = engine(
        MemoryResolver::new()
            .with("leaky", "<% secret = 42 %><%include file=\"inner\"/>")
            .with("passing", "<% secret = 42 %><%include file=\"inner\" args=\"secret=secret\"/>")
            .with("inner", "${secret}"),
    );
    assert!(matches!(
        render_identity(&engine, "leaky", serde_json::json!({})),
        Err(Error::NameError { name }) if name == "secret"
    ));
    // Caller context is not inherited either.
    assert!(matches!(
        render_identity(&engine, "leaky", serde_json::json!({"secret": 1})),
        Err(Error::NameError { .. })
    ));
    assert_eq!(render_identity(&engine, "passing", serde_json::json!({})).unwrap(), "42");
}

#[test]
fn test_included_bindings_do_not_leak_back() {
    let engine = engine(
        MemoryResolver::new()
            .with("main", "<%include file=\"setter\"/>${value}")
            .with("setter", "<% value = 1 %>"),
    );
    assert!(matches!(
        render_identity(&engine, "main", serde_json::json!({})),
        Err(Error::NameError { name }) if name == "value"
    ));
}

#[test_log::test]
fn test_mutual_includes_hit_the_recursion_limit() {
    let engine = engine(
        MemoryResolver::new()
            .with("a", "<%include file=\"b\"/>")
            .with("b", "<%include file=\"a\"/>"),
    );
    assert!(matches!(
        render_identity(&engine, "a", serde_json::json!({})),
        Err(Error::RecursionLimitExceeded { depth: 64 })
    ));
}

#[test]
fn test_recursion_limit_is_configurable() {
    let config = EngineConfig { max_include_depth: 3, ..EngineConfig::default() };
    let engine = Engine::new(config).with_resolver(
        MemoryResolver::new().with("countdown", "<%page args='n'/>${n}\n% if n > 0:\n<%include file=\"countdown\" args=\"n=n - 1\"/>\n% endif\n"),
    );
    let template = engine.load("countdown").unwrap();
    let mut context = Map::new();
    context.insert("n".into(), 2.into());
    assert_eq!(engine.render(Arc::clone(&template), &context).unwrap(), "2\n1\n0\n\n\n");

    context.insert("n".into(), 5.into());
    assert!(matches!(
        engine.render(template, &context),
        Err(Error::RecursionLimitExceeded { depth: 3 })
    ));
}

#[test]
fn test_include_argument_contract() {
    let engine = engine(
        MemoryResolver::new()
            .with("extra", "<%include file=\"strict\" args=\"name='x', bogus=1\"/>")
            .with("missing", "<%include file=\"strict\"/>")
            .with("open", "<%include file=\"loose\" args=\"anything=1\"/>")
            .with("strict", "<%page args='name'/>${name}")
            .with("loose", "${anything}"),
    );
    assert!(matches!(
        render_identity(&engine, "extra", serde_json::json!({})),
        Err(Error::TypeError { kind: TypeErrorKind::UnexpectedArgument(name) }) if name == "bogus"
    ));
    assert!(matches!(
        render_identity(&engine, "missing", serde_json::json!({})),
        Err(Error::MissingArgument { name }) if name == "name"
    ));
    assert_eq!(render_identity(&engine, "open", serde_json::json!({})).unwrap(), "1");
}

#[test]
fn test_include_failures_are_wrapped() {
    let engine = engine(
        MemoryResolver::new()
            .with("missing", "<%include file=\"nowhere\"/>")
            .with("broken", "<%include file=\"bad\"/>")
            .with("bad", "${unterminated"),
    );
    match render_identity(&engine, "missing", serde_json::json!({})) {
        Err(Error::IncludeError { identity, cause }) => {
            assert_eq!(identity, "nowhere");
            assert!(matches!(*cause, Error::Resolution(ResolutionError::NotFound { .. })));
        }
        other => panic!("expected an include error, got {other:?}"),
    }
    match render_identity(&engine, "broken", serde_json::json!({})) {
        Err(Error::IncludeError { cause, .. }) => assert!(matches!(
            *cause,
            Error::SyntaxError { kind: SyntaxErrorKind::UnterminatedTag(_), .. }
        )),
        other => panic!("expected an include error, got {other:?}"),
    }
}

#[test]
fn test_failure_inside_include_discards_its_output() {
    let engine = engine(
        MemoryResolver::new()
            .with("main", "before\n<%include file=\"tail\"/>after\n")
            .with("tail", "emitted text\n${1 // 0}\n"),
    );
    assert!(matches!(
        render_identity(&engine, "main", serde_json::json!({})),
        Err(Error::TypeError { kind: TypeErrorKind::DivisionByZero })
    ));
}

#[test]
fn test_includes_are_compiled_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let engine = Engine::default().with_resolver(move |identity: &str| {
        counter.fetch_add(1, Ordering::SeqCst);
        match identity {
            "main" => Ok(TemplateSource::from("% for i in range(3):\n<%include file=\"item\" args=\"i=i\"/>\n% endfor\n")),
            "item" => Ok(TemplateSource::from("[${i}]")),
            other => Err(ResolutionError::NotFound { identity: other.to_string() }),
        }
    });
    for _ in 0..2 {
        assert_eq!(render_identity(&engine, "main", serde_json::json!({})).unwrap(), "[0]\n[1]\n[2]\n");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(engine.cache().len(), 2);

    engine.cache().evict("item");
    render_identity(&engine, "main", serde_json::json!({})).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_relative_includes_from_a_directory() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("cmake")).unwrap();
    fs::create_dir_all(dir.path().join("common")).unwrap();
    fs::write(
        dir.path().join("cmake/CMakeLists.txt.mako"),
        "<%include file=\"options.mako\"/>\n<%include file=\"/common/license.mako\"/>\n",
    )
    .unwrap();
    fs::write(dir.path().join("cmake/options.mako"), "option(BUILD_TESTS ON)").unwrap();
    fs::write(dir.path().join("common/license.mako"), "# MIT").unwrap();

    let engine = Engine::default().with_resolver(DirectoryResolver::new(dir.path()));
    assert_eq!(
        render_identity(&engine, "cmake/CMakeLists.txt.mako", serde_json::json!({})).unwrap(),
        "option(BUILD_TESTS ON)\n# MIT\n"
    );
}
