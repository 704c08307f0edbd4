use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    /// Reserved word; match on the lexeme with [`Token::is_kw`].
    Keyword,
    Integer,
    Float,
    /// String literal. The lexeme keeps the quotes; see [`Token::string_value`].
    Str,
    /// `#1/15/2020#` date literal.
    Date,
    /// `'...` or `Rem ...` up to (not including) the end of the line.
    Comment,
    Newline,

    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Dot,
    Colon,
    /// `:=` named-argument separator.
    ColonEq,
    Bang,
    Hash,

    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Backslash,
    Caret,
    Amp,
    Percent,

    /// Formula mode: `'Sheet name'` reference prefix.
    QuotedName,
    /// Formula mode: `#N/A`, `#DIV/0!`, ...
    ErrorLiteral,

    /// A character the grammar has no use for. Never an error by itself.
    Unknown,
    Eof,
}

/// Which grammar the lexer serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexMode {
    /// Whole modules: keywords, comments, `_` line continuations, type suffixes.
    Macro,
    /// Single spreadsheet formulas: no keywords or comments, `$`/`.` inside names, quoted sheet
    /// names and error literals.
    Formula,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    /// Byte offset of the first character in the source.
    pub offset: usize,
    /// 1-based source line.
    pub line: usize,
}

impl Token {
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// Case-insensitive keyword test.
    pub fn is_kw(&self, word: &str) -> bool {
        self.kind == TokenKind::Keyword && self.lexeme.eq_ignore_ascii_case(word)
    }

    /// Case-insensitive test against an identifier or keyword, ignoring a type suffix.
    pub fn is_word(&self, word: &str) -> bool {
        matches!(self.kind, TokenKind::Identifier | TokenKind::Keyword)
            && self.name().eq_ignore_ascii_case(word)
    }

    pub fn is_name_like(&self) -> bool {
        matches!(self.kind, TokenKind::Identifier | TokenKind::Keyword)
    }

    /// Identifier without its type-declaration suffix (`Left$` -> `Left`).
    pub fn name(&self) -> &str {
        self.lexeme.trim_end_matches(['$', '%', '&', '!', '#', '@'])
    }

    pub fn end(&self) -> usize {
        self.offset + self.lexeme.len()
    }

    /// Unescaped contents of a string literal or quoted name.
    pub fn string_value(&self) -> String {
        let quote = match self.kind {
            TokenKind::QuotedName => '\'',
            _ => '"',
        };
        let inner = self
            .lexeme
            .strip_prefix(quote)
            .and_then(|s| s.strip_suffix(quote))
            .unwrap_or(&self.lexeme);
        let doubled: String = [quote, quote].iter().collect();
        inner.replace(&doubled, &quote.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unterminated string literal on line {line}")]
    UnterminatedString { line: usize },
}

/// Tokenizes `src`, ending with an [`TokenKind::Eof`] token.
pub fn tokenize(src: &str, mode: LexMode) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(src, mode);
    let mut out = Vec::new();
    loop {
        let tok = lexer.next_token()?;
        let done = tok.kind == TokenKind::Eof;
        out.push(tok);
        if done {
            return Ok(out);
        }
    }
}

/// Like [`tokenize`], but an unterminated string becomes an [`TokenKind::Unknown`] token running
/// to the end of its line.
pub fn tokenize_lossy(src: &str, mode: LexMode) -> Vec<Token> {
    let mut lexer = Lexer::new(src, mode);
    lexer.lossy = true;
    let mut out = Vec::new();
    loop {
        match lexer.next_token() {
            Ok(tok) => {
                let done = tok.kind == TokenKind::Eof;
                out.push(tok);
                if done {
                    return out;
                }
            }
            // Lossy mode never reports errors.
            Err(_) => return out,
        }
    }
}

const MACRO_KEYWORDS: &[&str] = &[
    "alias", "and", "as", "base", "byref", "byval", "call", "case", "compare", "const", "declare",
    "dim", "do", "each", "else", "elseif", "empty", "end", "enum", "eqv", "erase", "error", "event",
    "exit", "explicit", "false", "for", "friend", "function", "global", "gosub", "goto", "if",
    "imp", "implements", "in", "is", "let", "lib", "like", "loop", "me", "mod", "new", "next",
    "not", "nothing", "null", "on", "option", "optional", "or", "paramarray", "preserve",
    "private", "property", "public", "raiseevent", "redim", "rem", "resume", "return", "select",
    "set", "static", "step", "stop", "sub", "then", "to", "true", "type", "typeof", "until",
    "wend", "while", "with", "withevents", "xor",
];

fn is_ident_continue(ch: char, formula: bool) -> bool {
    ch.is_alphanumeric() || ch == '_' || (formula && matches!(ch, '$' | '.'))
}

fn is_macro_keyword(word: &str) -> bool {
    let lower = word.to_ascii_lowercase();
    MACRO_KEYWORDS.binary_search(&lower.as_str()).is_ok()
}

pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    mode: LexMode,
    lossy: bool,
    /// Kind of the last non-trivia token, used to disambiguate `.5` from member access.
    prev: Option<TokenKind>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str, mode: LexMode) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            mode,
            lossy: false,
            prev: None,
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    fn bump_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(ch) = self.peek() {
            if !pred(ch) {
                break;
            }
            self.bump();
        }
    }

    fn is_ident_start(&self, ch: char) -> bool {
        ch.is_alphabetic() || ch == '_' || (self.mode == LexMode::Formula && ch == '$')
    }

    /// ` _` followed only by whitespace up to the line break.
    fn at_line_continuation(&self) -> bool {
        if self.mode != LexMode::Macro || self.peek() != Some('_') {
            return false;
        }
        let after = &self.rest()[1..];
        let line_rest = after.split('\n').next().unwrap_or("");
        let preceded_by_space = self.src[..self.pos]
            .chars()
            .next_back()
            .map_or(true, |c| c == ' ' || c == '\t');
        preceded_by_space && line_rest.trim().is_empty() && after.contains('\n')
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r' | '\u{a0}' | '\u{c}') => {
                    self.bump();
                }
                Some('_') if self.at_line_continuation() => {
                    self.bump_while(|c| c != '\n');
                    self.bump();
                }
                _ => return,
            }
        }
    }

    fn token(&self, kind: TokenKind, start: usize, line: usize) -> Token {
        Token {
            kind,
            lexeme: self.src[start..self.pos].to_string(),
            offset: start,
            line,
        }
    }

    fn lex_number(&mut self) -> TokenKind {
        let mut kind = TokenKind::Integer;
        self.bump_while(|c| c.is_ascii_digit());
        if self.peek() == Some('.') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            kind = TokenKind::Float;
            self.bump();
            self.bump_while(|c| c.is_ascii_digit());
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let digit_at = if matches!(self.peek_nth(1), Some('+' | '-')) { 2 } else { 1 };
            if self.peek_nth(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                kind = TokenKind::Float;
                for _ in 0..digit_at {
                    self.bump();
                }
                self.bump_while(|c| c.is_ascii_digit());
            }
        }
        if self.mode == LexMode::Macro {
            self.lex_type_suffix(&['%', '&', '!', '#', '@']);
        }
        kind
    }

    /// Consumes a type-declaration suffix when it is not the start of another token.
    fn lex_type_suffix(&mut self, allowed: &[char]) {
        if let Some(ch) = self.peek() {
            let next_is_word = self.peek_nth(1).is_some_and(|c| c.is_alphanumeric() || c == '_');
            if allowed.contains(&ch) && !next_is_word {
                self.bump();
            }
        }
    }

    fn lex_string(&mut self, quote: char, line: usize) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(ch) if ch == quote => {
                    self.bump();
                    if self.peek() == Some(quote) {
                        self.bump();
                        continue;
                    }
                    return Ok(());
                }
                Some('\n') | None => {
                    if self.lossy {
                        return Ok(());
                    }
                    return Err(LexError::UnterminatedString { line });
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    /// `#...#` on one line containing only date/time characters.
    fn date_literal_len(&self) -> Option<usize> {
        let body = &self.rest()[1..];
        let end = body.find(['#', '\n'])?;
        if !body[end..].starts_with('#') {
            return None;
        }
        let inner = &body[..end];
        let plausible = !inner.trim().is_empty()
            && inner.chars().any(|c| c.is_ascii_digit())
            && inner
                .chars()
                .all(|c| c.is_ascii_digit() || " /-:.,".contains(c) || "APMapm".contains(c));
        plausible.then_some(end + 2)
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia();
        let start = self.pos;
        let line = self.line;
        let Some(ch) = self.bump() else {
            return Ok(self.token(TokenKind::Eof, start, line));
        };

        let kind = match ch {
            '\n' => TokenKind::Newline,
            '\'' if self.mode == LexMode::Macro => {
                self.bump_while(|c| c != '\n');
                TokenKind::Comment
            }
            '\'' => match self.lex_string('\'', line) {
                Ok(()) => TokenKind::QuotedName,
                Err(err) => return Err(err),
            },
            '"' => {
                let terminated = self.lex_string('"', line);
                match terminated {
                    Ok(()) if self.src[start..self.pos].len() > 1
                        && self.src[start..self.pos].ends_with('"') =>
                    {
                        TokenKind::Str
                    }
                    Ok(()) => TokenKind::Unknown,
                    Err(err) => return Err(err),
                }
            }
            c if c.is_ascii_digit() => self.lex_number(),
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit())
                && !matches!(
                    self.prev,
                    Some(TokenKind::Identifier | TokenKind::Keyword | TokenKind::RParen)
                ) =>
            {
                self.pos = start;
                self.bump();
                self.bump_while(|c| c.is_ascii_digit());
                TokenKind::Float
            }
            '&' if self.mode == LexMode::Macro
                && matches!(self.peek(), Some('h' | 'H' | 'o' | 'O'))
                && self.peek_nth(1).is_some_and(|c| c.is_ascii_hexdigit()) =>
            {
                self.bump();
                self.bump_while(|c| c.is_ascii_hexdigit());
                self.lex_type_suffix(&['%', '&']);
                TokenKind::Integer
            }
            c if self.is_ident_start(c) => {
                let formula = self.mode == LexMode::Formula;
                self.bump_while(|c| is_ident_continue(c, formula));
                if self.mode == LexMode::Formula {
                    TokenKind::Identifier
                } else {
                    let word = &self.src[start..self.pos];
                    if word.eq_ignore_ascii_case("rem") {
                        self.bump_while(|c| c != '\n');
                        TokenKind::Comment
                    } else if is_macro_keyword(word) {
                        TokenKind::Keyword
                    } else {
                        self.lex_type_suffix(&['$', '%', '&', '!', '#', '@']);
                        TokenKind::Identifier
                    }
                }
            }
            '#' if self.mode == LexMode::Macro => {
                self.pos = start;
                match self.date_literal_len() {
                    Some(len) => {
                        self.pos = start + len;
                        TokenKind::Date
                    }
                    None => {
                        self.bump();
                        TokenKind::Hash
                    }
                }
            }
            '#' => {
                self.bump_while(|c| c.is_ascii_alphanumeric() || c == '/' || c == '_');
                if matches!(self.peek(), Some('!' | '?')) {
                    self.bump();
                }
                if self.pos - start > 1 {
                    TokenKind::ErrorLiteral
                } else {
                    TokenKind::Hash
                }
            }
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '.' => TokenKind::Dot,
            ':' if self.peek() == Some('=') => {
                self.bump();
                TokenKind::ColonEq
            }
            ':' => TokenKind::Colon,
            '!' => TokenKind::Bang,
            '=' => TokenKind::Eq,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '\\' => TokenKind::Backslash,
            '^' => TokenKind::Caret,
            '&' => TokenKind::Amp,
            '%' => TokenKind::Percent,
            '<' if self.peek() == Some('=') => {
                self.bump();
                TokenKind::Le
            }
            '<' if self.peek() == Some('>') => {
                self.bump();
                TokenKind::Ne
            }
            '<' => TokenKind::Lt,
            '>' if self.peek() == Some('=') => {
                self.bump();
                TokenKind::Ge
            }
            '>' => TokenKind::Gt,
            _ => TokenKind::Unknown,
        };

        if !matches!(kind, TokenKind::Comment | TokenKind::Newline) {
            self.prev = Some(kind);
        }
        Ok(self.token(kind, start, line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(src: &str, mode: LexMode) -> Vec<TokenKind> {
        tokenize(src, mode).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keyword_table_is_sorted() {
        let mut sorted = MACRO_KEYWORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, MACRO_KEYWORDS);
    }

    #[test]
    fn lexes_assignment_with_trailing_comment() {
        use TokenKind::*;
        assert_eq!(
            kinds("x = a & \"b\"\"c\" ' note\n", LexMode::Macro),
            vec![Identifier, Eq, Identifier, Amp, Str, Comment, Newline, Eof]
        );
        let toks = tokenize("s = \"b\"\"c\"", LexMode::Macro).unwrap();
        assert_eq!(toks[2].string_value(), "b\"c");
    }

    #[test]
    fn line_continuation_joins_physical_lines() {
        use TokenKind::*;
        let toks = tokenize("total = a + _\n    b\nNext", LexMode::Macro).unwrap();
        let kinds: Vec<_> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![Identifier, Eq, Identifier, Plus, Identifier, Newline, Keyword, Eof]);
        assert_eq!(toks[4].line, 2);
        assert_eq!(toks[6].line, 3);
    }

    #[test]
    fn keywords_are_case_insensitive_and_rem_is_a_comment() {
        let toks = tokenize("END IF\nrem whatever\n", LexMode::Macro).unwrap();
        assert!(toks[0].is_kw("end"));
        assert!(toks[1].is_kw("If"));
        assert_eq!(toks[3].kind, TokenKind::Comment);
        assert_eq!(toks[3].lexeme, "rem whatever");
    }

    #[test]
    fn type_suffixes_and_hex_literals() {
        let toks = tokenize("s = Left$(t, &HFF) & n%", LexMode::Macro).unwrap();
        assert_eq!(toks[2].lexeme, "Left$");
        assert_eq!(toks[2].name(), "Left");
        assert_eq!(toks[6].kind, TokenKind::Integer);
        assert_eq!(toks[6].lexeme, "&HFF");
        assert_eq!(toks[9].lexeme, "n%");
    }

    #[test]
    fn named_arguments_and_dates() {
        use TokenKind::*;
        assert_eq!(
            kinds("f x:=#1/15/2020#", LexMode::Macro),
            vec![Identifier, Identifier, ColonEq, Date, Eof]
        );
        // `#1` file numbers stay punctuation.
        assert_eq!(kinds("Close #1", LexMode::Macro), vec![Identifier, Hash, Integer, Eof]);
    }

    #[test]
    fn unterminated_string_is_the_only_error() {
        assert_eq!(
            tokenize("x = 1\ny = \"open", LexMode::Macro),
            Err(LexError::UnterminatedString { line: 2 })
        );
        let lossy = tokenize_lossy("y = \"open\nz = 1", LexMode::Macro);
        assert_eq!(lossy[2].kind, TokenKind::Unknown);
        assert_eq!(lossy.last().map(|t| t.kind), Some(TokenKind::Eof));
    }

    #[test]
    fn stray_characters_become_unknown_tokens() {
        assert_eq!(
            kinds("[A1] ?", LexMode::Macro),
            vec![
                TokenKind::Unknown,
                TokenKind::Identifier,
                TokenKind::Unknown,
                TokenKind::Unknown,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn formula_mode_references_and_errors() {
        use TokenKind::*;
        let toks = tokenize("=SUM('My Sheet'!$A$1:A10)+#N/A", LexMode::Formula).unwrap();
        let kinds: Vec<_> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                Eq, Identifier, LParen, QuotedName, Bang, Identifier, Colon, Identifier, RParen,
                Plus, ErrorLiteral, Eof
            ]
        );
        assert_eq!(toks[3].string_value(), "My Sheet");
        assert_eq!(toks[5].lexeme, "$A$1");
        assert_eq!(toks[10].lexeme, "#N/A");
    }

    #[test]
    fn numbers_and_member_access() {
        use TokenKind::*;
        assert_eq!(kinds("x = .5 + 1.5E3", LexMode::Macro), vec![Identifier, Eq, Float, Plus, Float, Eof]);
        assert_eq!(
            kinds("a.b(1).c", LexMode::Macro),
            vec![Identifier, Dot, Identifier, LParen, Integer, RParen, Dot, Identifier, Eof]
        );
    }
}
