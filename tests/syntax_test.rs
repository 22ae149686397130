use kiln::error::{Error, SyntaxErrorKind};
use kiln::template::Node;
use kiln::Template;
use rstest::rstest;

fn syntax_error(source: &str) -> SyntaxErrorKind {
    match Template::parse("t", source) {
        Err(Error::SyntaxError { kind, .. }) => kind,
        other => panic!("expected a syntax error for {source:?}, got {other:?}"),
    }
}

#[rstest]
#[case("${name")]
#[case("<% x = 1")]
#[case("<%text>never closed")]
#[case("<%doc>never closed")]
#[case("<%include file=\"a\"")]
fn test_unterminated_tags(#[case] source: &str) {
    assert!(matches!(syntax_error(source), SyntaxErrorKind::UnterminatedTag(_)));
}

#[rstest]
#[case("% if x:\nyes\n")]
#[case("% for x in xs:\n% endif\n")]
#[case("% endif\n")]
#[case("</%text>")]
#[case("% if x:\n<%text>\n% endif\n</%text>")]
fn test_unbalanced_blocks(#[case] source: &str) {
    assert!(matches!(syntax_error(source), SyntaxErrorKind::UnbalancedBlock(_)));
}

#[rstest]
#[case("<%def name=\"helper()\">x</%def>", "def")]
#[case("<%inherit file=\"base.mako\"/>", "inherit")]
#[case("<%namespace name=\"n\" file=\"n.mako\"/>", "namespace")]
#[case("% while True:\n% endwhile\n", "while")]
fn test_unknown_directives(#[case] source: &str, #[case] name: &str) {
    assert_eq!(syntax_error(source), SyntaxErrorKind::UnknownDirective(name.to_string()));
}

#[rstest]
#[case("${1 +}")]
#[case("${)}")]
#[case("<% x = = 1 %>")]
#[case("% if :\n% endif\n")]
#[case("% for in xs:\n% endfor\n")]
#[case("${f(a=1, 2)}")]
fn test_malformed_expressions(#[case] source: &str) {
    assert!(matches!(syntax_error(source), SyntaxErrorKind::MalformedExpression(_)));
}

#[test]
fn test_page_directive_rules() {
    assert_eq!(syntax_error("text\n<%page args=\"a\"/>"), SyntaxErrorKind::MisplacedPageArgs);
    assert_eq!(
        syntax_error("<%page args=\"a\"/><%page args=\"b\"/>"),
        SyntaxErrorKind::DuplicatePageArgs
    );
    assert_eq!(
        syntax_error("<%page args=\"a, b=1, a\"/>"),
        SyntaxErrorKind::DuplicateParameter("a".to_string())
    );

    let template = Template::parse("t", "\n  ## comment\n<%page args=\"a, b=1\"/>${a}").unwrap();
    assert_eq!(template.params().len(), 2);
}

#[test]
fn test_verbatim_blocks_hide_markers() {
    let template = Template::parse("t", "<%text>% if unbalanced:\n${x</%text>").unwrap();
    assert_eq!(template.nodes(), &[Node::RawText("% if unbalanced:\n${x".to_string())]);
}

#[test]
fn test_include_arguments_must_be_a_mapping() {
    assert!(Template::parse("t", "<%include file=\"a\" args=\"[1, 2]\"/>").is_err());
    assert!(Template::parse("t", "<%include file=\"a\" args=\"{'x': 1}\"/>").is_ok());
}
