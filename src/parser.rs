//! WHERE子句的语法分析器
//!
//! ## 解析流程图
//!
//! ```text
//! parse_expression()
//!   └─ parse_or()
//!        ├─ parse_and()
//!        │    ├─ parse_unary()            (失败时恢复为 Predicate::Unparsed)
//!        │    │    ├─ "NOT EXISTS" / "EXISTS" → parse_exists()
//!        │    │    │                              └─ parse_subquery()
//!        │    │    │                                   ├─ SELECT ... FROM <table>
//!        │    │    │                                   ├─ [INNER] JOIN <table> ON a.k = b.k
//!        │    │    │                                   ├─ WHERE → parse_or()
//!        │    │    │                                   ├─ GROUP BY <column>
//!        │    │    │                                   └─ HAVING → parse_predicate()
//!        │    │    ├─ "NOT" → Not(parse_unary())
//!        │    │    └─ parse_primary()
//!        │    │         ├─ "(" → 分组表达式 (递归调用parse_or)
//!        │    │         └─ parse_predicate()
//!        │    │              ├─ operand 比较运算符 operand
//!        │    │              ├─ operand [NOT] BETWEEN operand AND operand
//!        │    │              ├─ operand [NOT] LIKE operand
//!        │    │              ├─ operand [NOT] IN (operand, ...)
//!        │    │              └─ operand IS [NOT] NULL
//!        │    │
//!        │    └─ 遇到AND时，继续解析右侧表达式
//!        │
//!        └─ 遇到OR时，继续解析右侧AND表达式
//! ```
//!
//! ## 语法优先级（从高到低）
//!
//! 1. **括号分组** `(expression)`
//! 2. **NOT / EXISTS**
//! 3. **谓词** `a = b`, `BETWEEN`, `LIKE`, `IN`, `IS NULL`
//! 4. **AND操作**
//! 5. **OR操作**
//!
//! AND/OR 被解析为扁平的 n 元列表，与生成器的折叠方式一致；括号以 `Grouped`
//! 节点保留下来，反向编译依赖这种嵌套形状。
//!
//! ## 错误恢复
//!
//! 无法解析的片段不会使整个解析失败：解析器回退到片段开头，跳过直到下一个
//! 顶层 `AND`/`OR`/`)`，并把原文保存为 `Predicate::Unparsed`。
//! 括号、`NOT`、`EXISTS` 和函数调用的嵌套超过 [`MAX_NESTING_DEPTH`] 层时同样按
//! 无法解析的片段处理。

use crate::ast::{ColumnRef, CompOp, Expr, Join, Operand, Predicate, Subquery};
use crate::token::{Span, Token, TokenKind};

/// 递归下降允许的最大嵌套层数
pub const MAX_NESTING_DEPTH: usize = 128;

pub struct Parser<'a> {
    source: &'a str,
    tokens: &'a [Token<'a>],
    position: usize,
    depth: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Option<Span>,
}

impl ParseError {
    fn new(message: String, span: Option<Span>) -> Self {
        Self { message, span }
    }

    fn at_position(message: String, span: Span) -> Self {
        Self { message, span: Some(span) }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.span {
            Some(span) => write!(f, "{} (at {}..{})", self.message, span.start, span.end),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ParseError {}

impl<'a> Parser<'a> {
    /// `tokens` 必须来自 `source` 的词法分析，span 用于截取原文
    pub fn new(source: &'a str, tokens: &'a [Token<'a>]) -> Self {
        Self {
            source,
            tokens,
            position: 0,
            depth: 0,
        }
    }

    /// 在嵌套的一层内运行 `parse`，超过最大层数时返回错误
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, ParseError>) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ParseError::new(
                format!("Nesting deeper than {} levels", MAX_NESTING_DEPTH),
                self.peek().map(|token| token.span),
            ));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// 返回当前 token，不推进位置
    fn peek(&self) -> Option<&'a Token<'a>> {
        self.tokens.get(self.position)
    }

    fn peek_nth(&self, offset: usize) -> Option<&'a Token<'a>> {
        self.tokens.get(self.position + offset)
    }

    /// 返回当前 token 并推进位置
    fn advance(&mut self) -> Option<&'a Token<'a>> {
        let token = self.tokens.get(self.position);
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    /// 期望特定类型的 token 并推进，否则返回错误
    fn expect(&mut self, expected: TokenKind) -> Result<&'a Token<'a>, ParseError> {
        match self.peek() {
            Some(token) if std::mem::discriminant(&token.kind) == std::mem::discriminant(&expected) => {
                self.position += 1;
                Ok(token)
            }
            Some(token) => Err(ParseError::at_position(
                format!("Expected {:?}, found {:?}", expected, token.kind),
                token.span,
            )),
            None => Err(ParseError::new(
                format!("Expected {:?}, but reached end of input", expected),
                None,
            )),
        }
    }

    fn expect_identifier(&mut self) -> Result<&'a str, ParseError> {
        let token = self.expect(TokenKind::Identifier(""))?;
        match token.kind {
            TokenKind::Identifier(name) => Ok(name),
            _ => Err(ParseError::at_position("Expected identifier".to_string(), token.span)),
        }
    }

    /// 检查当前 token 是否匹配给定类型
    fn match_token(&self, kind: &TokenKind) -> bool {
        self.peek()
            .is_some_and(|token| std::mem::discriminant(&token.kind) == std::mem::discriminant(kind))
    }

    pub fn is_at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    /// 尚未消费的 token
    pub fn remaining(&self) -> &'a [Token<'a>] {
        &self.tokens[self.position.min(self.tokens.len())..]
    }

    /// 解析一个完整的布尔表达式；空输入返回错误，其余问题通过恢复处理
    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        if self.is_at_end() {
            return Err(ParseError::new("Unexpected end of input".to_string(), None));
        }
        self.parse_or()
    }

    /// 要求输入已经结束（允许一个结尾分号）
    pub fn expect_end(&mut self) -> Result<(), ParseError> {
        if self.match_token(&TokenKind::Semicolon) {
            self.advance();
        }
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(ParseError::at_position(
                format!("Unexpected token: {:?}", token.kind),
                token.span,
            )),
        }
    }

    /// 解析OR表达式 (最低优先级)
    ///
    /// 语法: `and_expr (OR and_expr)*`
    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut items = vec![self.parse_and()?];
        while self.match_token(&TokenKind::Or) {
            self.advance(); // 消费 OR
            items.push(self.parse_and()?);
        }
        Ok(flatten(items, Expr::Or))
    }

    /// 解析AND表达式
    ///
    /// 语法: `unary (AND unary)*`
    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut items = vec![self.parse_unary()?];
        while self.match_token(&TokenKind::And) {
            self.advance(); // 消费 AND
            items.push(self.parse_unary()?);
        }
        Ok(flatten(items, Expr::And))
    }

    /// 解析一元表达式，失败时把该片段记录为未解析原文
    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let start = self.position;
        match self.parse_unary_strict() {
            Ok(expr) => Ok(expr),
            Err(_) => {
                self.position = start;
                Ok(Expr::Predicate(Predicate::Unparsed(self.skip_fragment())))
            }
        }
    }

    fn parse_unary_strict(&mut self) -> Result<Expr, ParseError> {
        if self.match_token(&TokenKind::Not) {
            if self.peek_nth(1).is_some_and(|t| t.kind == TokenKind::Exists) {
                self.advance(); // 消费 NOT
                self.advance(); // 消费 EXISTS
                return self.nested(|parser| parser.parse_exists(true));
            }
            self.advance(); // 消费 NOT
            let inner = self.nested(Self::parse_unary_strict)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        if self.match_token(&TokenKind::Exists) {
            self.advance(); // 消费 EXISTS
            return self.nested(|parser| parser.parse_exists(false));
        }
        self.parse_primary()
    }

    /// 解析基础表达式：括号分组或谓词
    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        if self.match_token(&TokenKind::LParen) {
            self.advance(); // 消费 (
            let expr = self.nested(Self::parse_or)?;
            self.expect(TokenKind::RParen)?;
            return Ok(Expr::Grouped(Box::new(expr)));
        }
        Ok(Expr::Predicate(self.parse_predicate()?))
    }

    fn parse_exists(&mut self, negated: bool) -> Result<Expr, ParseError> {
        self.expect(TokenKind::LParen)?;
        let subquery = self.parse_subquery()?;
        self.expect(TokenKind::RParen)?;
        Ok(Expr::Exists {
            negated,
            subquery: Box::new(subquery),
        })
    }

    fn parse_subquery(&mut self) -> Result<Subquery, ParseError> {
        self.expect(TokenKind::Select)?;

        // 跳过选择列表，直到同层的 FROM
        let mut depth = 0usize;
        loop {
            let Some(token) = self.peek() else {
                return Err(ParseError::new("Expected FROM in sub-query".to_string(), None));
            };
            match token.kind {
                TokenKind::From if depth == 0 => break,
                TokenKind::LParen => depth += 1,
                TokenKind::RParen if depth == 0 => {
                    return Err(ParseError::at_position(
                        "Expected FROM in sub-query".to_string(),
                        token.span,
                    ))
                }
                TokenKind::RParen => depth -= 1,
                _ => {}
            }
            self.advance();
        }
        self.expect(TokenKind::From)?;
        let table = self.expect_identifier()?.to_string();

        let mut joins = Vec::new();
        loop {
            if self.match_token(&TokenKind::Inner) {
                self.advance();
                self.expect(TokenKind::Join)?;
            } else if self.match_token(&TokenKind::Join) {
                self.advance();
            } else {
                break;
            }
            let table = self.expect_identifier()?.to_string();
            self.expect(TokenKind::On)?;
            let left = self.parse_column()?;
            self.expect(TokenKind::Eq)?;
            let right = self.parse_column()?;
            joins.push(Join { table, left, right });
        }

        let filter = if self.match_token(&TokenKind::Where) {
            self.advance();
            Some(self.parse_or()?)
        } else {
            None
        };

        let group_by = if self.match_token(&TokenKind::Group) {
            self.advance();
            self.expect(TokenKind::By)?;
            Some(self.parse_column()?)
        } else {
            None
        };

        let having = if self.match_token(&TokenKind::Having) {
            self.advance();
            Some(self.parse_predicate()?)
        } else {
            None
        };

        Ok(Subquery {
            table,
            joins,
            filter,
            group_by,
            having,
        })
    }

    fn parse_column(&mut self) -> Result<ColumnRef, ParseError> {
        let first = self.expect_identifier()?;
        if self.match_token(&TokenKind::Dot) {
            self.advance();
            let column = self.expect_identifier()?;
            Ok(ColumnRef {
                table: Some(first.to_string()),
                column: column.to_string(),
            })
        } else {
            Ok(ColumnRef {
                table: None,
                column: first.to_string(),
            })
        }
    }

    fn parse_predicate(&mut self) -> Result<Predicate, ParseError> {
        let target = self.parse_operand()?;

        let negated = self.match_token(&TokenKind::Not);
        if negated {
            self.advance(); // 消费 NOT
        }

        let Some(token) = self.peek() else {
            if negated {
                return Err(ParseError::new("Unexpected end after NOT".to_string(), None));
            }
            return Ok(Predicate::Bare(target));
        };

        match &token.kind {
            kind if kind.is_comparison() && !negated => {
                self.advance();
                let op = comparison_operator(kind);
                let right = self.parse_operand()?;
                Ok(Predicate::Compare { left: target, op, right })
            }
            TokenKind::Between => {
                self.advance();
                let low = self.parse_operand()?;
                self.expect(TokenKind::And)?;
                let high = self.parse_operand()?;
                Ok(Predicate::Between { target, low, high, negated })
            }
            TokenKind::Like => {
                self.advance();
                let pattern = self.parse_operand()?;
                Ok(Predicate::Like { target, pattern, negated })
            }
            TokenKind::In => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let mut values = Vec::new();
                if !self.match_token(&TokenKind::RParen) {
                    loop {
                        values.push(self.parse_operand()?);
                        if self.match_token(&TokenKind::RParen) {
                            break;
                        }
                        self.expect(TokenKind::Comma)?;
                    }
                }
                self.expect(TokenKind::RParen)?;
                Ok(Predicate::In { target, values, negated })
            }
            TokenKind::Is if !negated => {
                self.advance();
                let is_not = self.match_token(&TokenKind::Not);
                if is_not {
                    self.advance();
                }
                self.expect(TokenKind::Null)?;
                Ok(Predicate::IsNull { target, negated: is_not })
            }
            _ if negated => Err(ParseError::at_position(
                format!("Expected BETWEEN, LIKE or IN after NOT, found {:?}", token.kind),
                token.span,
            )),
            kind if ends_fragment(kind) => Ok(Predicate::Bare(target)),
            _ => Err(ParseError::at_position(
                format!("Unexpected token after value: {:?}", token.kind),
                token.span,
            )),
        }
    }

    /// 语法: `term (('+' | '-') term)*`
    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Plus) => '+',
                Some(TokenKind::Minus) => '-',
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Operand::Arithmetic {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Operand, ParseError> {
        let Some(token) = self.advance() else {
            return Err(ParseError::new("Expected value, but reached end of input".to_string(), None));
        };

        match &token.kind {
            TokenKind::Identifier(name) => {
                if self.match_token(&TokenKind::LParen) {
                    self.advance(); // 消费 (
                    let args = self.nested(Self::parse_arguments)?;
                    self.expect(TokenKind::RParen)?;
                    Ok(Operand::Call {
                        name: name.to_string(),
                        args,
                    })
                } else if self.match_token(&TokenKind::Dot) {
                    self.advance(); // 消费 .
                    let column = self.expect_identifier()?;
                    Ok(Operand::Column(ColumnRef {
                        table: Some(name.to_string()),
                        column: column.to_string(),
                    }))
                } else {
                    Ok(Operand::Column(ColumnRef {
                        table: None,
                        column: name.to_string(),
                    }))
                }
            }
            TokenKind::String(raw) => Ok(Operand::String(unescape(raw))),
            TokenKind::Number(n) => Ok(Operand::Number(n.to_string())),
            TokenKind::Minus => match self.advance().map(|t| &t.kind) {
                Some(TokenKind::Number(n)) => Ok(Operand::Number(format!("-{}", n))),
                _ => Err(ParseError::at_position("Expected number after '-'".to_string(), token.span)),
            },
            TokenKind::Null => Ok(Operand::Null),
            TokenKind::Star => Ok(Operand::Star),
            TokenKind::Interval => self.parse_interval(token.span),
            _ => Err(ParseError::at_position(
                format!("Expected value, found {:?}", token.kind),
                token.span,
            )),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Operand>, ParseError> {
        let mut args = Vec::new();
        if self.match_token(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_operand()?);
            if !self.match_token(&TokenKind::Comma) {
                return Ok(args);
            }
            self.advance(); // 消费 ,
        }
    }

    /// `INTERVAL '30 days'`、`INTERVAL '7' DAY` 或 `INTERVAL 7 DAY`
    fn parse_interval(&mut self, span: Span) -> Result<Operand, ParseError> {
        let amount = match self.advance().map(|t| &t.kind) {
            Some(TokenKind::String(raw)) => unescape(raw),
            Some(TokenKind::Number(n)) => n.to_string(),
            _ => return Err(ParseError::at_position("Expected interval amount".to_string(), span)),
        };
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Identifier(unit)) => {
                self.advance();
                Ok(Operand::Interval(format!("{} {}", amount, unit)))
            }
            _ => Ok(Operand::Interval(amount)),
        }
    }

    /// 跳过一个无法解析的片段，返回其原文
    fn skip_fragment(&mut self) -> String {
        let start = self.position;
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen if depth == 0 => break,
                TokenKind::RParen => depth -= 1,
                ref kind if depth == 0 && ends_fragment(kind) => break,
                _ => {}
            }
            self.advance();
        }

        if self.position == start {
            return String::new();
        }
        let span = self.tokens[start].span.to(self.tokens[self.position - 1].span);
        self.source.get(span.start..span.end).unwrap_or_default().to_string()
    }
}

fn flatten(mut items: Vec<Expr>, combine: fn(Vec<Expr>) -> Expr) -> Expr {
    if items.len() == 1 {
        items.remove(0)
    } else {
        combine(items)
    }
}

/// Tokens that may follow a complete condition.
fn ends_fragment(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::And
            | TokenKind::Or
            | TokenKind::RParen
            | TokenKind::Semicolon
            | TokenKind::Group
            | TokenKind::Having
    )
}

fn comparison_operator(kind: &TokenKind) -> CompOp {
    match kind {
        TokenKind::NotEq => CompOp::NotEq,
        TokenKind::Gt => CompOp::Gt,
        TokenKind::Lt => CompOp::Lt,
        TokenKind::Gte => CompOp::Gte,
        TokenKind::Lte => CompOp::Lte,
        _ => CompOp::Eq,
    }
}

fn unescape(raw: &str) -> String {
    raw.replace("''", "'")
}
