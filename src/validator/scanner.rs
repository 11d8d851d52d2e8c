//! Single-pass SQL scanner
//!
//! Splits a statement into tokens while tracking quote state, so that keywords,
//! semicolons and comment delimiters inside string literals or quoted identifiers
//! are never mistaken for SQL structure.
//!
//! The scanner is deliberately small. It knows nothing about SQL grammar beyond
//! what the validator needs: words, numbers, quoted regions, comments, statement
//! terminators and parentheses.

/// Kind of a scanned token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare word: keyword or unquoted identifier (`[A-Za-z_][A-Za-z0-9_$]*`)
    Word,
    /// Numeric literal
    Number,
    /// Single-quoted string literal, quotes included
    Literal,
    /// Double-quoted or backtick-quoted identifier, quotes included
    QuotedIdent,
    /// `-- ...` or `# ...` up to end of line
    LineComment,
    /// `/* ... */`
    BlockComment,
    /// `;`
    Semicolon,
    /// `(`
    OpenParen,
    /// `)`
    CloseParen,
    /// `,`
    Comma,
    /// `$` not followed by a digit (dollar-quoted string opener)
    Dollar,
    /// Any other punctuation or operator character
    Symbol,
}

/// A token with its byte span in the scanned text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

impl Token<'_> {
    /// Case-insensitive comparison for words
    #[must_use]
    pub fn is_word(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    /// Whether this token is a comment
    #[must_use]
    pub const fn is_comment(&self) -> bool {
        matches!(self.kind, TokenKind::LineComment | TokenKind::BlockComment)
    }
}

/// Why scanning stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanError {
    /// A quote was opened and never closed
    UnterminatedQuote { at: usize },
    /// A block comment was opened and never closed
    UnterminatedComment { at: usize },
    /// An odd run of backslashes precedes a quote; dialects disagree on whether it closes
    AmbiguousEscape { at: usize },
}

/// Result of scanning: every token read before the first error
#[derive(Debug, Clone)]
pub struct Scan<'a> {
    pub tokens: Vec<Token<'a>>,
    pub error: Option<ScanError>,
}

/// Scan a statement into tokens
///
/// Scanning never panics. On error, the tokens read so far are kept so that the
/// caller can still inspect the leading verb.
#[must_use]
pub fn scan(sql: &str) -> Scan<'_> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let ch = bytes[pos];
        let start = pos;

        let kind = match ch {
            b if b.is_ascii_whitespace() => {
                pos += 1;
                continue;
            }
            b'\'' | b'"' | b'`' => match scan_quoted(bytes, pos, ch) {
                Ok(end) => {
                    pos = end;
                    if ch == b'\'' {
                        TokenKind::Literal
                    } else {
                        TokenKind::QuotedIdent
                    }
                }
                Err(error) => return Scan { tokens, error: Some(error) },
            },
            // MySQL line comment, scanned as one for every engine
            b'#' => {
                pos = bytes[pos..].iter().position(|&b| b == b'\n').map_or(bytes.len(), |n| pos + n);
                TokenKind::LineComment
            }
            b'-' if bytes.get(pos + 1) == Some(&b'-') => {
                pos = bytes[pos..].iter().position(|&b| b == b'\n').map_or(bytes.len(), |n| pos + n);
                TokenKind::LineComment
            }
            b'/' if bytes.get(pos + 1) == Some(&b'*') => {
                match find_subslice(&bytes[pos + 2..], b"*/") {
                    Some(n) => pos = pos + 2 + n + 2,
                    None => {
                        return Scan {
                            tokens,
                            error: Some(ScanError::UnterminatedComment { at: start }),
                        }
                    }
                }
                TokenKind::BlockComment
            }
            b';' => {
                pos += 1;
                TokenKind::Semicolon
            }
            b'(' => {
                pos += 1;
                TokenKind::OpenParen
            }
            b')' => {
                pos += 1;
                TokenKind::CloseParen
            }
            b',' => {
                pos += 1;
                TokenKind::Comma
            }
            b'$' if !bytes.get(pos + 1).is_some_and(u8::is_ascii_digit) => {
                pos += 1;
                TokenKind::Dollar
            }
            b if b.is_ascii_alphabetic() || b == b'_' || b >= 0x80 => {
                pos += 1;
                while pos < bytes.len() && is_word_byte(bytes[pos]) {
                    pos += 1;
                }
                TokenKind::Word
            }
            b if b.is_ascii_digit() => {
                pos += 1;
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'.')
                {
                    pos += 1;
                }
                TokenKind::Number
            }
            _ => {
                // Multi-byte characters are consumed whole so spans stay on char boundaries
                pos += utf8_len(ch);
                TokenKind::Symbol
            }
        };

        tokens.push(Token { kind, text: &sql[start..pos], start, end: pos });
    }

    Scan { tokens, error: None }
}

/// Scan a quoted region starting at `open`, returning the byte offset just past it
///
/// A doubled quote character is an escaped quote in every dialect. A backslash run
/// before a quote is only safe when it has even length: PostgreSQL treats backslashes
/// literally while MySQL treats them as escapes, and an even run closes the quote
/// under both readings.
fn scan_quoted(bytes: &[u8], open: usize, quote: u8) -> Result<usize, ScanError> {
    let mut pos = open + 1;
    let mut backslashes = 0usize;

    while pos < bytes.len() {
        let b = bytes[pos];
        if b == b'\\' {
            backslashes += 1;
            pos += 1;
            continue;
        }
        if b == quote {
            if backslashes % 2 == 1 {
                return Err(ScanError::AmbiguousEscape { at: pos });
            }
            if bytes.get(pos + 1) == Some(&quote) {
                pos += 2;
                backslashes = 0;
                continue;
            }
            return Ok(pos + 1);
        }
        backslashes = 0;
        pos += 1;
    }

    Err(ScanError::UnterminatedQuote { at: open })
}

/// Word characters: ASCII alphanumerics, `_`, `$`, and any non-ASCII byte
const fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

const fn utf8_len(first: u8) -> usize {
    match first {
        0xF0..=0xFF => 4,
        0xE0..=0xEF => 3,
        0xC0..=0xDF => 2,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        scan(sql).tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_words_and_symbols() {
        let scan = scan("SELECT * FROM web_items");
        assert!(scan.error.is_none());
        let texts: Vec<&str> = scan.tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["SELECT", "*", "FROM", "web_items"]);
    }

    #[test]
    fn test_keyword_inside_literal_is_one_token() {
        let scan = scan("select name from users where note = 'please DELETE my data'");
        assert!(scan.error.is_none());
        assert!(!scan.tokens.iter().any(|t| t.is_word("DELETE")));
        assert_eq!(scan.tokens.last().map(|t| t.kind), Some(TokenKind::Literal));
    }

    #[test]
    fn test_semicolon_inside_literal() {
        assert_eq!(
            kinds("SELECT 'a;b'"),
            vec![TokenKind::Word, TokenKind::Literal]
        );
    }

    #[test]
    fn test_doubled_quote_escape() {
        let scan = scan("SELECT 'O''Reilly', 1");
        assert!(scan.error.is_none());
        assert_eq!(scan.tokens[1].text, "'O''Reilly'");
        assert_eq!(scan.tokens[2].kind, TokenKind::Comma);
    }

    #[test]
    fn test_backslash_quote_is_ambiguous() {
        let scan = scan(r"SELECT 'a\' ; DROP TABLE x; --'");
        assert!(matches!(scan.error, Some(ScanError::AmbiguousEscape { .. })));
    }

    #[test]
    fn test_even_backslash_run_closes_quote() {
        let scan = scan(r"SELECT 'a\\' FROM t");
        assert!(scan.error.is_none());
        assert_eq!(scan.tokens[1].text, r"'a\\'");
        assert!(scan.tokens[2].is_word("FROM"));
    }

    #[test]
    fn test_unterminated_quote_keeps_prefix() {
        let scan = scan("SELECT 'oops");
        assert_eq!(scan.error, Some(ScanError::UnterminatedQuote { at: 7 }));
        assert_eq!(scan.tokens.len(), 1);
        assert!(scan.tokens[0].is_word("select"));
    }

    #[test]
    fn test_quoted_identifier() {
        assert_eq!(
            kinds(r#"SELECT "drop" FROM `t`"#),
            vec![TokenKind::Word, TokenKind::QuotedIdent, TokenKind::Word, TokenKind::QuotedIdent]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            kinds("SELECT 1 -- trailing\n"),
            vec![TokenKind::Word, TokenKind::Number, TokenKind::LineComment]
        );
        assert_eq!(
            kinds("SELECT /* x */ 1"),
            vec![TokenKind::Word, TokenKind::BlockComment, TokenKind::Number]
        );
        assert_eq!(
            scan("SELECT /* never closed").error,
            Some(ScanError::UnterminatedComment { at: 7 })
        );
    }

    #[test]
    fn test_hash_comment_hides_quotes() {
        let scan = scan("SELECT 1 #'\nINTO OUTFILE '/tmp/x' #'");
        assert!(scan.error.is_none());
        let kinds: Vec<TokenKind> = scan.tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds[..3], [TokenKind::Word, TokenKind::Number, TokenKind::LineComment]);
        assert_eq!(scan.tokens[2].text, "#'");
        assert!(scan.tokens[3].is_word("INTO"));
    }

    #[test]
    fn test_comment_marker_inside_literal() {
        assert_eq!(kinds("SELECT '--', '/*'"), vec![
            TokenKind::Word,
            TokenKind::Literal,
            TokenKind::Comma,
            TokenKind::Literal
        ]);
    }

    #[test]
    fn test_word_boundaries() {
        let scan = scan("SELECT updated_at, deleted FROM t");
        let words: Vec<&str> =
            scan.tokens.iter().filter(|t| t.kind == TokenKind::Word).map(|t| t.text).collect();
        assert_eq!(words, vec!["SELECT", "updated_at", "deleted", "FROM", "t"]);
    }

    #[test]
    fn test_dollar_tokens() {
        assert_eq!(kinds("SELECT $1"), vec![TokenKind::Word, TokenKind::Symbol, TokenKind::Number]);
        assert_eq!(
            kinds("SELECT $$x$$"),
            vec![TokenKind::Word, TokenKind::Dollar, TokenKind::Dollar, TokenKind::Word]
        );
    }

    #[test]
    fn test_spans_survive_multibyte_text() {
        let sql = "SELECT 'héllo' → 1";
        let scan = scan(sql);
        assert!(scan.error.is_none());
        for token in &scan.tokens {
            assert_eq!(&sql[token.start..token.end], token.text);
        }
    }
}
