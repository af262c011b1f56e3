use crate::parser::token::Location;
use crate::parser::token::Token;
use crate::parser::token::TokenKind;
use anyhow::Result;

pub struct Scanner {
    source: Vec<char>,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: usize,
    column: usize,
}

impl Scanner {
    fn new(source: &str) -> Self {
        Scanner {
            source: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 0,
            column: 0,
        }
    }
    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }
    fn advance(&mut self) -> char {
        let c = self.source[self.current];
        self.current += 1;
        self.column += 1;
        c
    }
    fn peek(&self) -> char {
        self.peek_n(0)
    }
    fn peek_n(&self, n: usize) -> char {
        self.source.get(self.current + n).copied().unwrap_or('\0')
    }
    fn lexeme(&self) -> String {
        self.source[self.start..self.current].iter().collect()
    }
    fn add_token(&mut self, kind: TokenKind) {
        let lexeme = if kind == TokenKind::Eof {
            "".to_string()
        } else {
            self.lexeme()
        };
        let diff = self.current - self.start;
        let column = self.column.saturating_sub(diff);
        let location = Location::new(self.line, column, self.start);
        self.tokens.push(Token::new(kind, lexeme, location));
    }
    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        if self.peek() == '.' && self.peek_n(1).is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
            self.add_token(TokenKind::FloatLiteral);
        } else {
            self.add_token(TokenKind::Integer);
        }
    }
    // Whether the character is a valid identifier start character.
    fn is_identifier_start(c: char) -> bool {
        c.is_alphabetic() || c == '_' || c == '@' || c == '%'
    }
    // Whether the character is a valid identifier character.
    fn is_identifier(c: char) -> bool {
        c.is_alphanumeric() || c == '_' || c == '.' || c == '$'
    }
    fn is_int_type(word: &str) -> bool {
        let types = ["i1", "i8", "i16", "i32", "i64", "i128"];
        types.contains(&word)
    }
    // Scan identifiers and keywords.
    fn identifier(&mut self) {
        while Scanner::is_identifier(self.peek()) {
            self.advance();
        }
        let lexeme = self.lexeme();
        let kind = match lexeme.as_str() {
            s if s.starts_with('@') => TokenKind::AtIdentifier,
            s if s.starts_with('%') => TokenKind::PercentIdentifier,
            s if Scanner::is_int_type(s) => TokenKind::IntType,
            _ => TokenKind::BareIdentifier,
        };
        self.add_token(kind);
    }
    fn arrow_or_minus(&mut self) {
        if self.peek() == '>' {
            self.advance();
            self.add_token(TokenKind::Arrow);
        } else {
            self.add_token(TokenKind::Minus);
        }
    }
    fn string(&mut self) -> Result<()> {
        while self.peek() != '"' && !self.is_at_end() {
            if self.peek() == '\n' {
                break;
            }
            self.advance();
        }
        if self.peek() != '"' {
            let location = Location::new(self.line, self.column, self.start);
            let src = self.source.iter().collect::<String>();
            let msg = Scanner::error(&src, &location, "Unterminated string");
            return Err(anyhow::anyhow!("\n\n{msg}\n"));
        }
        self.advance();
        self.add_token(TokenKind::String);
        Ok(())
    }
    fn comment(&mut self) {
        while self.peek() != '\n' && !self.is_at_end() {
            self.advance();
        }
    }
    fn scan_token(&mut self) -> Result<()> {
        let c = self.advance();
        match c {
            '(' => self.add_token(TokenKind::LParen),
            ')' => self.add_token(TokenKind::RParen),
            '{' => self.add_token(TokenKind::LBrace),
            '}' => self.add_token(TokenKind::RBrace),
            '[' => self.add_token(TokenKind::LBracket),
            ']' => self.add_token(TokenKind::RBracket),
            ':' => self.add_token(TokenKind::Colon),
            ',' => self.add_token(TokenKind::Comma),
            '=' => self.add_token(TokenKind::Equal),
            '!' => self.add_token(TokenKind::Exclamation),
            '>' => self.add_token(TokenKind::Greater),
            '<' => self.add_token(TokenKind::Less),
            '?' => self.add_token(TokenKind::Question),
            '*' => self.add_token(TokenKind::Star),
            ' ' | '\r' | '\t' => (),
            '\n' => {
                self.line += 1;
                self.column = 0;
            }
            '/' if self.peek() == '/' => self.comment(),
            '-' => self.arrow_or_minus(),
            '"' => self.string()?,
            s if s.is_ascii_digit() => self.number(),
            s if Scanner::is_identifier_start(s) => self.identifier(),
            _ => {
                let column = self.column.saturating_sub(1);
                let location = Location::new(self.line, column, self.start);
                let src = self.source.iter().collect::<String>();
                let msg = format!("Scanning failed starting at: {c}");
                let msg = Scanner::error(&src, &location, &msg);
                return Err(anyhow::anyhow!("\n\n{msg}\n"));
            }
        }
        Ok(())
    }
    fn scan_tokens(&mut self) -> Result<()> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token()?;
        }
        self.start = self.current;
        self.add_token(TokenKind::Eof);
        Ok(())
    }
    pub fn scan(src: &str) -> Result<Vec<Token>> {
        let mut scanner = Scanner::new(src);
        scanner.scan_tokens()?;
        Ok(scanner.tokens)
    }
    /// Return a source excerpt that points at `loc` with `msg`.
    pub fn error(src: &str, loc: &Location, msg: &str) -> String {
        let lines = src.split('\n').collect::<Vec<&str>>();
        let n = loc.line().min(lines.len().saturating_sub(1));
        let prev_line = if n > 0 {
            let prev_n = n - 1;
            let prev = lines[prev_n];
            format!("\n{prev_n}  | {prev}")
        } else {
            "".to_string()
        };
        let line = lines.get(n).copied().unwrap_or("");
        let line_num_width = 4 + n.to_string().len();
        let err_indent = " ".repeat(loc.column() + line_num_width);
        format!("```{prev_line}\n{n}  | {line}\n{err_indent}^ {msg}\n```")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Scanner::scan(src).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_scanner() {
        let tokens = Scanner::scan("42.5 42").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].kind, TokenKind::FloatLiteral);
        assert_eq!(tokens[0].lexeme, "42.5");
        assert_eq!(tokens[1].kind, TokenKind::Integer);
        assert_eq!(tokens[1].lexeme, "42");
        assert_eq!(tokens[1].location.column(), 5);
        assert_eq!(tokens[2].kind, TokenKind::Eof);

        let src = "%0 = torch.prim.TupleConstruct %arg0, %arg1 : !torch.tensor, i64";
        let tokens = Scanner::scan(src).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::PercentIdentifier);
        assert_eq!(tokens[0].lexeme, "%0");
        assert_eq!(tokens[1].kind, TokenKind::Equal);
        assert_eq!(tokens[2].kind, TokenKind::BareIdentifier);
        assert_eq!(tokens[2].lexeme, "torch.prim.TupleConstruct");
        assert_eq!(tokens[3].lexeme, "%arg0");
        assert_eq!(tokens[4].kind, TokenKind::Comma);
        assert_eq!(tokens[7].kind, TokenKind::Exclamation);
        assert_eq!(tokens[8].lexeme, "torch.tensor");
        assert_eq!(tokens[10].kind, TokenKind::IntType);
        assert_eq!(tokens[11].kind, TokenKind::Eof);
    }

    #[test]
    fn test_tensor_type_tokens() {
        use TokenKind::*;
        let expected = vec![
            Exclamation,
            BareIdentifier,
            Less,
            LBracket,
            Integer,
            Comma,
            Question,
            RBracket,
            Comma,
            BareIdentifier,
            Greater,
            Eof,
        ];
        assert_eq!(kinds("!torch.vtensor<[2,?],f32>"), expected);
        assert_eq!(kinds("<*,si64>")[1], Star);
    }

    #[test]
    fn test_comments_and_arrows() {
        use TokenKind::*;
        let src = "// a comment\nfunc.func @f() -> i1 // trailing\n";
        let tokens = Scanner::scan(src).unwrap();
        let expected = vec![BareIdentifier, AtIdentifier, LParen, RParen, Arrow, IntType, Eof];
        let actual = tokens.iter().map(|t| t.kind).collect::<Vec<_>>();
        assert_eq!(actual, expected);
        assert_eq!(tokens[1].location.line(), 1);
        assert_eq!(tokens[1].lexeme, "@f");
    }

    #[test]
    fn test_scan_error() {
        let err = Scanner::scan("return\n  %0 ^ %1").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Scanning failed starting at: ^"));
        assert!(msg.contains("1  |   %0 ^ %1"));
    }
}
