use logos::Logos;

/// Unescape the body of a string or character literal.
/// Returns None when an escape sequence is malformed.
fn unescape(s: &str) -> Option<String> {
    let mut result = String::new();
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('0') => result.push('\0'),
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some('"') => result.push('"'),
                Some('\'') => result.push('\''),
                Some('\\') => result.push('\\'),
                _ => return None,
            }
        } else {
            result.push(ch);
        }
    }

    Some(result)
}

fn lex_string(lex: &mut logos::Lexer<Token>) -> Result<String, LexErrorKind> {
    let slice = lex.slice();
    unescape(&slice[1..slice.len() - 1]).ok_or(LexErrorKind::InvalidEscape)
}

fn lex_char(lex: &mut logos::Lexer<Token>) -> Result<char, LexErrorKind> {
    let slice = lex.slice();
    let body = unescape(&slice[1..slice.len() - 1]).ok_or(LexErrorKind::InvalidEscape)?;
    let mut chars = body.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(LexErrorKind::InvalidCharacterLiteral),
    }
}

fn lex_int(lex: &mut logos::Lexer<Token>) -> Result<u64, LexErrorKind> {
    let digits: String = lex.slice().chars().filter(|&c| c != '_').collect();
    let (radix, body) = match digits.get(..2) {
        Some("0b") | Some("0B") => (2, &digits[2..]),
        Some("0o") | Some("0O") => (8, &digits[2..]),
        Some("0x") | Some("0X") => (16, &digits[2..]),
        _ => (10, digits.as_str()),
    };
    u64::from_str_radix(body, radix).map_err(|_| LexErrorKind::IntegerOutOfRange)
}

fn lex_float(lex: &mut logos::Lexer<Token>) -> Result<f64, LexErrorKind> {
    lex.slice()
        .parse()
        .map_err(|_| LexErrorKind::InvalidFloatLiteral)
}

fn invalid_digit(_: &mut logos::Lexer<Token>) -> Result<u64, LexErrorKind> {
    Err(LexErrorKind::InvalidDigit)
}

fn unterminated_string(_: &mut logos::Lexer<Token>) -> Result<String, LexErrorKind> {
    Err(LexErrorKind::UnterminatedString)
}

fn unterminated_character(_: &mut logos::Lexer<Token>) -> Result<char, LexErrorKind> {
    Err(LexErrorKind::UnterminatedCharacter)
}

/// Token set of the Sable language
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*[^/])*\*+/")]
#[logos(error = LexErrorKind)]
pub enum Token {
    // Keywords
    #[token("as")]
    As,
    #[token("break")]
    Break,
    #[token("case")]
    Case,
    #[token("const")]
    Const,
    #[token("continue")]
    Continue,
    #[token("default")]
    Default,
    #[token("defer")]
    Defer,
    #[token("else")]
    Else,
    #[token("enum")]
    Enum,
    #[token("extern")]
    Extern,
    #[token("false")]
    False,
    #[token("for")]
    For,
    #[token("if")]
    If,
    #[token("import")]
    Import,
    #[token("in")]
    In,
    #[token("interface")]
    Interface,
    #[token("null")]
    Null,
    #[token("private")]
    Private,
    #[token("public")]
    Public,
    #[token("return")]
    Return,
    #[token("sizeof")]
    Sizeof,
    #[token("struct")]
    Struct,
    #[token("switch")]
    Switch,
    #[token("this")]
    This,
    #[token("true")]
    True,
    #[token("undefined")]
    Undefined,
    #[token("var")]
    Var,
    #[token("while")]
    While,

    // Conditional compilation directives
    #[token("#if")]
    HashIf,
    #[token("#else")]
    HashElse,
    #[token("#endif")]
    HashEndif,

    // Literals. The float pattern requires a digit after the dot so that a
    // trailing '.' (as in `1..3` or `x.field`) is never consumed as part of
    // the number. Underscore separators are allowed in integers only.
    #[regex(r"0[bB][01_]+", lex_int)]
    #[regex(r"0[oO][0-7_]+", lex_int)]
    #[regex(r"0[xX][0-9a-fA-F_]+", lex_int)]
    #[regex(r"[0-9][0-9_]*", lex_int)]
    #[regex(r"0[bB][01_]*[2-9a-zA-Z][0-9a-zA-Z_]*", invalid_digit)]
    #[regex(r"0[oO][0-7_]*[89a-zA-Z][0-9a-zA-Z_]*", invalid_digit)]
    IntLiteral(u64),

    #[regex(r"[0-9]+\.[0-9]+", lex_float)]
    FloatLiteral(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, lex_string)]
    #[regex(r#""([^"\\\n]|\\.)*"#, unterminated_string, priority = 2)]
    StringLiteral(String),

    #[regex(r"'([^'\\\n]|\\.)*'", lex_char)]
    #[regex(r"'([^'\\\n]|\\.)*", unterminated_character, priority = 2)]
    CharacterLiteral(char),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    // Operators, longest first
    #[token("==")]
    Equal,
    #[token("!=")]
    NotEqual,
    #[token("<=")]
    LessOrEqual,
    #[token(">=")]
    GreaterOrEqual,
    #[token("<<=")]
    LeftShiftEqual,
    #[token(">>=")]
    RightShiftEqual,
    #[token("<<")]
    LeftShift,
    #[token(">>")]
    RightShift,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("++")]
    Increment,
    #[token("--")]
    Decrement,
    #[token("+=")]
    PlusEqual,
    #[token("-=")]
    MinusEqual,
    #[token("*=")]
    StarEqual,
    #[token("/=")]
    SlashEqual,
    #[token("%=")]
    ModuloEqual,
    #[token("&&=")]
    AndAndEqual,
    #[token("||=")]
    OrOrEqual,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("&=")]
    AndEqual,
    #[token("|=")]
    OrEqual,
    #[token("^=")]
    XorEqual,
    #[token("+")]
    Plus,
    #[token("->")]
    RightArrow,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Modulo,
    #[token("!")]
    Not,
    #[token("&")]
    And,
    #[token("|")]
    Or,
    #[token("^")]
    Xor,
    #[token("~")]
    Tilde,
    #[token("=")]
    Assignment,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token("...")]
    DotDotDot,
    #[token("..")]
    DotDot,
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token("?")]
    QuestionMark,
}

impl Token {
    /// Source spelling used in diagnostics ("expected `;`" etc).
    pub fn describe(&self) -> String {
        match self {
            Token::Identifier(name) => format!("identifier `{}`", name),
            Token::IntLiteral(value) => format!("integer literal `{}`", value),
            Token::FloatLiteral(value) => format!("float literal `{}`", value),
            Token::StringLiteral(_) => "string literal".to_string(),
            Token::CharacterLiteral(_) => "character literal".to_string(),
            other => format!("`{:?}`", other),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, thiserror::Error)]
pub enum LexErrorKind {
    #[default]
    #[error("unknown token")]
    UnknownToken,
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated character literal")]
    UnterminatedCharacter,
    #[error("invalid escape sequence in literal")]
    InvalidEscape,
    #[error("character literal must contain exactly one character")]
    InvalidCharacterLiteral,
    #[error("invalid digit for this radix")]
    InvalidDigit,
    #[error("integer literal out of range")]
    IntegerOutOfRange,
    #[error("invalid float literal")]
    InvalidFloatLiteral,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind} at {span:?}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: std::ops::Range<usize>,
}

/// A token together with its byte range in the source
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSpan {
    pub token: Token,
    pub span: std::ops::Range<usize>,
}

pub struct Lexer<'source> {
    inner: logos::Lexer<'source, Token>,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source str) -> Self {
        Self {
            inner: Token::lexer(source),
        }
    }
}

impl<'source> Iterator for Lexer<'source> {
    type Item = Result<TokenSpan, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.inner.next()?;
        let span = self.inner.span();

        match token {
            Ok(tok) => Some(Ok(TokenSpan { token: tok, span })),
            Err(kind) => Some(Err(LexError { kind, span })),
        }
    }
}

/// Lex an entire source string, stopping at the first error.
pub fn tokenize(source: &str) -> Result<Vec<TokenSpan>, LexError> {
    Lexer::new(source).collect()
}
