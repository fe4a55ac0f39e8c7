//! Scanner: the external I/O boundary spec.md §1 calls out as "the concrete
//! grammar and scanner" — out of the core's scope, but still needed so the
//! workspace can actually run a `.venom` file end to end. No external
//! Venom-lexer crate exists, so this is a small hand-written scanner,
//! deliberately minimal (see `SPEC_FULL.md` §2's ambient-stack note).

use crate::error::VenomError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    IntLit(i64),
    FloatLit(f64),
    StringLit(String),
    True,
    False,
    Nil,

    Def,
    Class,
    Attr,
    Return,
    While,
    End,
    And,
    Or,
    Not,

    LParen,
    RParen,
    LBrace,
    RBrace,
    Colon,
    Semi,
    Comma,
    Dot,
    Arrow,
    Assign,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,

    Eof,
}

/// Scans `src` into a flat token stream; newlines are folded into `Semi` so
/// the parser treats `;` and a line break as the same statement separator.
pub fn lex(src: &str) -> Result<Vec<Token>, VenomError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' => i += 1,
            '\n' => {
                tokens.push(Token::Semi);
                i += 1;
            }
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '{' => {
                tokens.push(Token::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Token::RBrace);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            ';' => {
                tokens.push(Token::Semi);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '-' => {
                if chars.get(i + 1) == Some(&'>') {
                    tokens.push(Token::Arrow);
                    i += 2;
                } else {
                    tokens.push(Token::Minus);
                    i += 1;
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    tokens.push(Token::Assign);
                    i += 1;
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    return Err(VenomError::syntax(format!("unexpected character '{c}'")));
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '"' => {
                let (s, consumed) = lex_string(&chars[i..])?;
                tokens.push(Token::StringLit(s));
                i += consumed;
            }
            c if c.is_ascii_digit() => {
                let (tok, consumed) = lex_number(&chars[i..]);
                tokens.push(tok);
                i += consumed;
            }
            c if c.is_alphabetic() || c == '_' => {
                let (word, consumed) = lex_word(&chars[i..]);
                i += consumed;
                tokens.push(keyword_or_ident(&word));
            }
            other => return Err(VenomError::syntax(format!("unexpected character '{other}'"))),
        }
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

fn lex_string(chars: &[char]) -> Result<(String, usize), VenomError> {
    let mut out = String::new();
    let mut i = 1;
    loop {
        match chars.get(i) {
            None => return Err(VenomError::syntax("unterminated string literal")),
            Some('"') => {
                i += 1;
                break;
            }
            Some('\\') => {
                let escaped = match chars.get(i + 1) {
                    Some('n') => '\n',
                    Some('t') => '\t',
                    Some('"') => '"',
                    Some('\\') => '\\',
                    _ => return Err(VenomError::syntax("invalid escape sequence")),
                };
                out.push(escaped);
                i += 2;
            }
            Some(&c) => {
                out.push(c);
                i += 1;
            }
        }
    }
    Ok((out, i))
}

fn lex_number(chars: &[char]) -> (Token, usize) {
    let mut i = 0;
    while chars.get(i).is_some_and(char::is_ascii_digit) {
        i += 1;
    }
    let mut is_float = false;
    if chars.get(i) == Some(&'.') && chars.get(i + 1).is_some_and(char::is_ascii_digit) {
        is_float = true;
        i += 1;
        while chars.get(i).is_some_and(char::is_ascii_digit) {
            i += 1;
        }
    }
    let text: String = chars[..i].iter().collect();
    if is_float {
        (Token::FloatLit(text.parse().expect("validated digits")), i)
    } else {
        (Token::IntLit(text.parse().expect("validated digits")), i)
    }
}

fn lex_word(chars: &[char]) -> (String, usize) {
    let mut i = 0;
    while chars.get(i).is_some_and(|c| c.is_alphanumeric() || *c == '_') {
        i += 1;
    }
    (chars[..i].iter().collect(), i)
}

fn keyword_or_ident(word: &str) -> Token {
    match word {
        "def" => Token::Def,
        "class" => Token::Class,
        "attr" => Token::Attr,
        "return" => Token::Return,
        "while" => Token::While,
        "end" => Token::End,
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "True" => Token::True,
        "False" => Token::False,
        "Nil" => Token::Nil,
        _ => Token::Ident(word.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_scenario_two() {
        let tokens = lex("x = 1 + 2 * 3; print(x)").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("x".into()),
                Token::Assign,
                Token::IntLit(1),
                Token::Plus,
                Token::IntLit(2),
                Token::Star,
                Token::IntLit(3),
                Token::Semi,
                Token::Ident("print".into()),
                Token::LParen,
                Token::Ident("x".into()),
                Token::RParen,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_string_is_a_syntax_error() {
        let err = lex("\"hello").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidSyntax);
    }
}
