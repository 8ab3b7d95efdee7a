//! 分段SQL的词法分析器
//!
//! 只覆盖生成器输出的SQL子集以及用户手工编辑时常见的写法。
//! 无法识别的字符产生 `Illegal` token，而不是报错。

use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    /// 输入字符串中的当前位置（字节索引）
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, position: 0 }
    }

    /// 返回当前位置的字符，不推进位置
    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    /// 返回下一个位置的字符，不推进位置
    fn peek_next(&self) -> Option<char> {
        self.input[self.position..].chars().nth(1)
    }

    /// 推进位置一个字符并返回该字符
    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    /// 跳过空白字符和 `--` 行注释
    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '-' && self.peek_next() == Some('-') {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn token(&self, kind: TokenKind<'a>, start: usize) -> Token<'a> {
        Token {
            kind,
            span: Span::new(start, self.position),
        }
    }

    /// 读取数字字面量，允许一个小数部分
    fn read_number(&mut self, start: usize) -> Token<'a> {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.bump();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        let value = &self.input[start..self.position];
        self.token(TokenKind::Number(value), start)
    }

    /// 读取单引号字符串，`''` 表示字符串内的一个单引号
    /// 注意：开始的引号已经被调用者消费；未闭合的字符串读到输入末尾并产生 `Illegal`
    fn read_string(&mut self, start: usize) -> Token<'a> {
        let content_start = self.position;
        while let Some(c) = self.peek() {
            if c == '\'' {
                if self.peek_next() == Some('\'') {
                    self.bump();
                    self.bump();
                    continue;
                }
                let content = &self.input[content_start..self.position];
                self.bump(); // 消费结束引号
                return self.token(TokenKind::String(content), start);
            }
            self.bump();
        }
        self.token(TokenKind::Illegal, start)
    }

    /// 读取带引号的标识符，如 `"customers"` 或 `` `customers` ``
    fn read_quoted_identifier(&mut self, start: usize, quote: char) -> Token<'a> {
        let content_start = self.position;
        while let Some(c) = self.bump() {
            if c == quote {
                let content = &self.input[content_start..self.position - c.len_utf8()];
                return self.token(TokenKind::Identifier(content), start);
            }
        }
        self.token(TokenKind::Illegal, start)
    }

    /// 读取标识符或关键字
    /// 标识符可以包含字母、数字和下划线
    fn read_identifier(&mut self, start: usize) -> Token<'a> {
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let literal = &self.input[start..self.position];
        self.token(match_keyword(literal), start)
    }
}

fn match_keyword(s: &str) -> TokenKind<'_> {
    match s.to_ascii_lowercase().as_str() {
        "select" => TokenKind::Select,
        "from" => TokenKind::From,
        "where" => TokenKind::Where,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "exists" => TokenKind::Exists,
        "between" => TokenKind::Between,
        "like" => TokenKind::Like,
        "is" => TokenKind::Is,
        "null" => TokenKind::Null,
        "in" => TokenKind::In,
        "inner" => TokenKind::Inner,
        "join" => TokenKind::Join,
        "on" => TokenKind::On,
        "group" => TokenKind::Group,
        "by" => TokenKind::By,
        "having" => TokenKind::Having,
        "interval" => TokenKind::Interval,
        _ => TokenKind::Identifier(s),
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_trivia();
        let start = self.position;

        let Some(c) = self.bump() else {
            return None; // 到达输入末尾
        };

        let token = match c {
            '=' => self.token(TokenKind::Eq, start),
            '(' => self.token(TokenKind::LParen, start),
            ')' => self.token(TokenKind::RParen, start),
            ',' => self.token(TokenKind::Comma, start),
            '.' => self.token(TokenKind::Dot, start),
            ';' => self.token(TokenKind::Semicolon, start),
            '*' => self.token(TokenKind::Star, start),
            '+' => self.token(TokenKind::Plus, start),
            '-' => self.token(TokenKind::Minus, start),
            '<' => match self.peek() {
                Some('=') => {
                    self.bump();
                    self.token(TokenKind::Lte, start)
                }
                Some('>') => {
                    self.bump();
                    self.token(TokenKind::NotEq, start)
                }
                _ => self.token(TokenKind::Lt, start),
            },
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    self.token(TokenKind::Gte, start)
                } else {
                    self.token(TokenKind::Gt, start)
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    self.token(TokenKind::NotEq, start)
                } else {
                    self.token(TokenKind::Illegal, start)
                }
            }
            '\'' => self.read_string(start),
            '"' | '`' => self.read_quoted_identifier(start, c),
            c if c.is_ascii_digit() => self.read_number(start),
            c if c.is_alphabetic() || c == '_' => self.read_identifier(start),
            _ => self.token(TokenKind::Illegal, start),
        };
        Some(token)
    }
}

/// 把输入完整切分为 token 列表
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    Lexer::new(input).collect()
}
