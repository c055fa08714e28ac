use logos::Logos;

/// Tokens of a single request line.
///
/// Longest match makes `>>` win over `>`. Quoted words lose their quotes so
/// `echo "a | b"` yields one `Word` instead of a pipe.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f\x00]+")]
pub enum Token {
    #[token("|")]
    Pipe,

    #[token(">>")]
    Append,

    #[token(">")]
    RedirectOut,

    #[token("<")]
    RedirectIn,

    #[regex(r#""[^"]*""#, unquote)]
    #[regex(r"'[^']*'", unquote)]
    #[regex(r#"[^ \t\r\n\f\x00|<>"']+"#, |lex| lex.slice().to_string())]
    Word(String),
}

fn unquote(lex: &mut logos::Lexer<Token>) -> String {
    let slice = lex.slice();
    slice[1..slice.len() - 1].to_string()
}

impl Token {
    pub fn is_word(&self) -> bool {
        matches!(self, Token::Word(_))
    }
}

pub struct Lexer<'a> {
    inner: logos::Lexer<'a, Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            inner: Token::lexer(input),
        }
    }

    pub fn tokenize(input: &str) -> Result<Vec<Token>, LexerError> {
        Lexer::new(input).collect()
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, LexerError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|result| {
            result.map_err(|_| LexerError::InvalidToken {
                position: self.inner.span().start,
                text: self.inner.slice().to_string(),
            })
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LexerError {
    #[error("Invalid token at position {position}: '{text}'")]
    InvalidToken { position: usize, text: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(s: &str) -> Token {
        Token::Word(s.to_string())
    }

    #[test]
    fn test_basic_command() {
        let tokens = Lexer::tokenize("ls -la /home").unwrap();
        assert_eq!(tokens, vec![word("ls"), word("-la"), word("/home")]);
    }

    #[test]
    fn test_pipeline() {
        let tokens = Lexer::tokenize("ls|grep foo").unwrap();
        assert_eq!(tokens, vec![word("ls"), Token::Pipe, word("grep"), word("foo")]);
    }

    #[test]
    fn test_append_before_truncate() {
        let tokens = Lexer::tokenize("echo hi >>log > out").unwrap();
        assert_eq!(
            tokens,
            vec![
                word("echo"),
                word("hi"),
                Token::Append,
                word("log"),
                Token::RedirectOut,
                word("out"),
            ]
        );
    }

    #[test]
    fn test_input_redirect_without_spaces() {
        let tokens = Lexer::tokenize("wc -l<in.txt").unwrap();
        assert_eq!(tokens, vec![word("wc"), word("-l"), Token::RedirectIn, word("in.txt")]);
    }

    #[test]
    fn test_quoted_words_keep_metacharacters() {
        let tokens = Lexer::tokenize(r#"echo "a | b" 'c > d'"#).unwrap();
        assert_eq!(tokens, vec![word("echo"), word("a | b"), word("c > d")]);
    }

    #[test]
    fn test_nul_and_newline_are_whitespace() {
        let tokens = Lexer::tokenize("pwd\n\0").unwrap();
        assert_eq!(tokens, vec![word("pwd")]);
    }

    #[test]
    fn test_unterminated_quote_is_an_error() {
        let err = Lexer::tokenize(r#"echo "oops"#).unwrap_err();
        assert!(matches!(err, LexerError::InvalidToken { position: 5, .. }));
    }
}
