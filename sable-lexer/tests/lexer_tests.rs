use sable_lexer::{tokenize, LexErrorKind, Token};

fn kinds(source: &str) -> Vec<Token> {
    tokenize(source)
        .expect("lexing failed")
        .into_iter()
        .map(|ts| ts.token)
        .collect()
}

#[test]
fn keywords_and_identifiers() {
    assert_eq!(
        kinds("var x defer switch iterator"),
        vec![
            Token::Var,
            Token::Identifier("x".into()),
            Token::Defer,
            Token::Switch,
            Token::Identifier("iterator".into()),
        ]
    );
}

#[test]
fn integer_radixes_and_separators() {
    assert_eq!(
        kinds("0b1010 0o17 0xfF 1_000_000"),
        vec![
            Token::IntLiteral(10),
            Token::IntLiteral(15),
            Token::IntLiteral(255),
            Token::IntLiteral(1_000_000),
        ]
    );
}

#[test]
fn invalid_binary_digit_is_an_error() {
    let err = tokenize("0b102").unwrap_err();
    assert_eq!(err.kind, LexErrorKind::InvalidDigit);
}

#[test]
fn trailing_dot_is_not_part_of_the_number() {
    // `1..3` must lex as a range, not as two float literals.
    assert_eq!(
        kinds("1..3"),
        vec![Token::IntLiteral(1), Token::DotDot, Token::IntLiteral(3)]
    );
    assert_eq!(kinds("2.5"), vec![Token::FloatLiteral(2.5)]);
}

#[test]
fn string_escapes() {
    assert_eq!(
        kinds(r#""a\tb\n" '\''"#),
        vec![
            Token::StringLiteral("a\tb\n".into()),
            Token::CharacterLiteral('\''),
        ]
    );
}

#[test]
fn unterminated_string_is_an_error() {
    let err = tokenize("\"oops").unwrap_err();
    assert_eq!(err.kind, LexErrorKind::UnterminatedString);
}

#[test]
fn strings_reject_embedded_newlines() {
    let err = tokenize("\"line\nbreak\"").unwrap_err();
    assert_eq!(err.kind, LexErrorKind::UnterminatedString);
}

#[test]
fn compound_operators() {
    assert_eq!(
        kinds("a += b <<= c && d ... e -> f?"),
        vec![
            Token::Identifier("a".into()),
            Token::PlusEqual,
            Token::Identifier("b".into()),
            Token::LeftShiftEqual,
            Token::Identifier("c".into()),
            Token::AndAnd,
            Token::Identifier("d".into()),
            Token::DotDotDot,
            Token::Identifier("e".into()),
            Token::RightArrow,
            Token::Identifier("f".into()),
            Token::QuestionMark,
        ]
    );
}

#[test]
fn directives_and_comments() {
    assert_eq!(
        kinds("#if DEBUG\n// line\n/* block */ #else #endif"),
        vec![Token::HashIf, Token::Identifier("DEBUG".into()), Token::HashElse, Token::HashEndif]
    );
}
