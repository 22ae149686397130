use std::error::Error as _;
use std::io;

use kiln::error::{Error, Location, ResolutionError, SyntaxErrorKind, TypeErrorKind};

#[test]
fn test_error_conversion() {
    let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
    let err: Error = io_err.into();

    match err {
        Error::IoError(_) => (),
        _ => panic!("Expected IoError variant"),
    }

    let err: Error = ResolutionError::NotFound { identity: "a.mako".into() }.into();
    assert!(matches!(err, Error::Resolution(_)));
}

#[test]
fn test_error_display() {
    let err = Error::ConfigError("invalid config".to_string());
    assert_eq!(err.to_string(), "Configuration error: invalid config.");

    let err = Error::syntax(SyntaxErrorKind::UnterminatedTag("<% code block".into()), Location::new(3, 7));
    assert_eq!(err.to_string(), "Syntax error: unterminated <% code block at line 3, column 7.");

    let err = Error::type_error(TypeErrorKind::NotIterable("int".into()));
    assert_eq!(err.to_string(), "Type error: 'int' object is not iterable.");

    let err = Error::MissingArgument { name: "name".into() };
    assert_eq!(err.to_string(), "Missing required argument 'name'.");
}

#[test]
fn test_include_error_keeps_its_cause() {
    let err = Error::IncludeError {
        identity: "header.mako".into(),
        cause: Box::new(Error::Resolution(ResolutionError::NotFound { identity: "header.mako".into() })),
    };
    assert_eq!(
        err.to_string(),
        "Include of 'header.mako' failed: Resolution error: template 'header.mako' not found."
    );
    assert!(err.source().is_some());
}

#[test]
fn test_errors_carry_locations() {
    let err = kiln::Template::parse("t", "line one\n  ${ 1 + }").unwrap_err();
    match err {
        Error::SyntaxError { kind: SyntaxErrorKind::MalformedExpression(_), location } => {
            assert_eq!(location.line, 2);
            assert!(location.column > 3);
        }
        other => panic!("unexpected error {other:?}"),
    }
}
