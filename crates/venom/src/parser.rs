//! Recursive-descent parser: the other half of the I/O boundary spec.md §1
//! and §6 describe ("the parser produces an AST the core consumes"). Turns
//! a [`crate::lexer::Token`] stream into the [`crate::ast::Ast`] the
//! semantic checker consumes, held by a [`ParseContext`] the same way
//! spec.md §6 describes ("a `ParseContext` holding the root statement
//! list").

use crate::ast::{Ast, BinOp, ClassDecl, Expr, ExprId, FuncDecl, Param, AttrDecl, Stmt, StmtId, UnOp};
use crate::error::VenomError;
use crate::lexer::Token;

/// Holds the parsed root statement list, per spec.md §6.
pub struct ParseContext {
    pub ast: Ast,
    pub stmts: Vec<StmtId>,
}

pub fn parse(tokens: &[Token], trace: bool) -> Result<ParseContext, VenomError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        ast: Ast::new(),
        trace,
    };
    let stmts = parser.stmt_list(&[Token::Eof])?;
    parser.expect(&Token::Eof)?;
    Ok(ParseContext {
        ast: parser.ast,
        stmts,
    })
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    ast: Ast,
    trace: bool,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn bump(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.trace {
            eprintln!("parse: consumed {t:?}");
        }
        self.pos += 1;
        t
    }

    fn at(&self, t: &Token) -> bool {
        self.peek() == t
    }

    fn eat(&mut self, t: &Token) -> bool {
        if self.at(t) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, t: &Token) -> Result<(), VenomError> {
        if self.eat(t) {
            Ok(())
        } else {
            Err(VenomError::syntax(format!("expected {t:?}, found {:?}", self.peek())))
        }
    }

    fn expect_ident(&mut self) -> Result<String, VenomError> {
        match self.bump() {
            Token::Ident(name) => Ok(name),
            other => Err(VenomError::syntax(format!("expected identifier, found {other:?}"))),
        }
    }

    fn skip_separators(&mut self) {
        while self.eat(&Token::Semi) {}
    }

    /// Parses statements until one of `stop` is seen (not consumed).
    fn stmt_list(&mut self, stop: &[Token]) -> Result<Vec<StmtId>, VenomError> {
        let mut out = Vec::new();
        self.skip_separators();
        while !stop.iter().any(|s| self.at(s)) {
            out.push(self.statement()?);
            self.skip_separators();
        }
        Ok(out)
    }

    fn statement(&mut self) -> Result<StmtId, VenomError> {
        let stmt = match self.peek() {
            Token::While => self.while_stmt()?,
            Token::Def => self.func_decl(None)?,
            Token::Class => self.class_decl()?,
            Token::Return => self.return_stmt()?,
            _ => self.expr_or_assign_stmt()?,
        };
        Ok(self.ast.alloc_stmt(stmt))
    }

    fn while_stmt(&mut self) -> Result<Stmt, VenomError> {
        self.expect(&Token::While)?;
        let cond = self.expr()?;
        self.expect(&Token::Colon)?;
        let body = self.stmt_list(&[Token::End])?;
        self.expect(&Token::End)?;
        Ok(Stmt::While { cond, body })
    }

    fn return_stmt(&mut self) -> Result<Stmt, VenomError> {
        self.expect(&Token::Return)?;
        if self.at(&Token::Semi) || self.at(&Token::End) || self.at(&Token::Eof) {
            Ok(Stmt::Return(None))
        } else {
            Ok(Stmt::Return(Some(self.expr()?)))
        }
    }

    fn type_param_list(&mut self) -> Result<Vec<String>, VenomError> {
        let mut params = Vec::new();
        if self.eat(&Token::LBrace) {
            if !self.at(&Token::RBrace) {
                params.push(self.expect_ident()?);
                while self.eat(&Token::Comma) {
                    params.push(self.expect_ident()?);
                }
            }
            self.expect(&Token::RBrace)?;
        }
        Ok(params)
    }

    fn type_name(&mut self) -> Result<String, VenomError> {
        self.expect_ident()
    }

    fn params(&mut self) -> Result<Vec<Param>, VenomError> {
        self.expect(&Token::LParen)?;
        let mut out = Vec::new();
        if !self.at(&Token::RParen) {
            out.push(self.one_param()?);
            while self.eat(&Token::Comma) {
                out.push(self.one_param()?);
            }
        }
        self.expect(&Token::RParen)?;
        Ok(out)
    }

    fn one_param(&mut self) -> Result<Param, VenomError> {
        let name = self.expect_ident()?;
        self.expect(&Token::Colon)?;
        let declared_type_name = self.type_name()?;
        Ok(Param {
            name,
            declared_type_name,
            symbol: None,
        })
    }

    /// Parses `def name{T}(params)->Ret: body end` or the one-line method
    /// form `def name(params)->Ret=expr` spec.md §8 scenario 6 uses for
    /// `init`/`get`.
    fn func_decl(&mut self, _enclosing_class: Option<()>) -> Result<Stmt, VenomError> {
        self.expect(&Token::Def)?;
        let name = self.expect_ident()?;
        let type_params = self.type_param_list()?;
        let params = self.params()?;
        self.expect(&Token::Arrow)?;
        let return_type_name = self.type_name()?;
        let body = if self.eat(&Token::Assign) {
            let value = self.expr()?;
            vec![self.ast.alloc_stmt(Stmt::Return(Some(value)))]
        } else {
            self.expect(&Token::Colon)?;
            let body = self.stmt_list(&[Token::End])?;
            self.expect(&Token::End)?;
            body
        };
        Ok(Stmt::FuncDecl(FuncDecl {
            name,
            params,
            return_type_name,
            type_params,
            body,
            symbol: None,
        }))
    }

    fn class_decl(&mut self) -> Result<Stmt, VenomError> {
        self.expect(&Token::Class)?;
        let name = self.expect_ident()?;
        let parent = if self.eat(&Token::LParen) {
            let p = self.expect_ident()?;
            self.expect(&Token::RParen)?;
            Some(p)
        } else {
            None
        };
        let type_params = self.type_param_list()?;
        self.expect(&Token::Colon)?;

        let mut attrs = Vec::new();
        let mut methods = Vec::new();
        self.skip_separators();
        while !self.at(&Token::End) {
            if self.eat(&Token::Attr) {
                let attr_name = self.expect_ident()?;
                self.expect(&Token::Colon)?;
                let declared_type_name = self.type_name()?;
                attrs.push(AttrDecl {
                    name: attr_name,
                    declared_type_name,
                    symbol: None,
                });
            } else {
                let decl = self.func_decl(Some(()))?;
                methods.push(self.ast.alloc_stmt(decl));
            }
            self.skip_separators();
        }
        self.expect(&Token::End)?;

        Ok(Stmt::ClassDecl(ClassDecl {
            name,
            parent,
            type_params,
            attrs,
            methods,
            symbol: None,
        }))
    }

    /// An expression statement, or — when the parsed expression is
    /// immediately followed by `=` — an assignment. Venom has no `var`
    /// keyword (spec.md §4.4): the first assignment to an undeclared name
    /// is its declaration, decided later by the checker's name pass.
    fn expr_or_assign_stmt(&mut self) -> Result<Stmt, VenomError> {
        let target = self.expr()?;
        if self.eat(&Token::Assign) {
            let value = self.expr()?;
            Ok(Stmt::Assign { target, value })
        } else {
            Ok(Stmt::ExprStmt(target))
        }
    }

    fn expr(&mut self) -> Result<ExprId, VenomError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<ExprId, VenomError> {
        let mut lhs = self.and_expr()?;
        while self.eat(&Token::Or) {
            let rhs = self.and_expr()?;
            lhs = self.ast.alloc_expr(Expr::BinOp(BinOp::Or, lhs, rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<ExprId, VenomError> {
        let mut lhs = self.equality_expr()?;
        while self.eat(&Token::And) {
            let rhs = self.equality_expr()?;
            lhs = self.ast.alloc_expr(Expr::BinOp(BinOp::And, lhs, rhs));
        }
        Ok(lhs)
    }

    fn equality_expr(&mut self) -> Result<ExprId, VenomError> {
        let mut lhs = self.relational_expr()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinOp::Eq,
                Token::Ne => BinOp::Ne,
                _ => break,
            };
            self.bump();
            let rhs = self.relational_expr()?;
            lhs = self.ast.alloc_expr(Expr::BinOp(op, lhs, rhs));
        }
        Ok(lhs)
    }

    fn relational_expr(&mut self) -> Result<ExprId, VenomError> {
        let mut lhs = self.additive_expr()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::Le => BinOp::Le,
                Token::Gt => BinOp::Gt,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            self.bump();
            let rhs = self.additive_expr()?;
            lhs = self.ast.alloc_expr(Expr::BinOp(op, lhs, rhs));
        }
        Ok(lhs)
    }

    fn additive_expr(&mut self) -> Result<ExprId, VenomError> {
        let mut lhs = self.multiplicative_expr()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.multiplicative_expr()?;
            lhs = self.ast.alloc_expr(Expr::BinOp(op, lhs, rhs));
        }
        Ok(lhs)
    }

    fn multiplicative_expr(&mut self) -> Result<ExprId, VenomError> {
        let mut lhs = self.unary_expr()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.bump();
            let rhs = self.unary_expr()?;
            lhs = self.ast.alloc_expr(Expr::BinOp(op, lhs, rhs));
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Result<ExprId, VenomError> {
        match self.peek() {
            Token::Minus => {
                self.bump();
                let inner = self.unary_expr()?;
                Ok(self.ast.alloc_expr(Expr::UnOp(UnOp::Neg, inner)))
            }
            Token::Not => {
                self.bump();
                let inner = self.unary_expr()?;
                Ok(self.ast.alloc_expr(Expr::UnOp(UnOp::Not, inner)))
            }
            _ => self.postfix_expr(),
        }
    }

    fn postfix_expr(&mut self) -> Result<ExprId, VenomError> {
        let mut expr = self.primary_expr()?;
        loop {
            if self.eat(&Token::Dot) {
                let member = self.expect_ident()?;
                if self.at(&Token::LParen) {
                    let args = self.call_args()?;
                    expr = self.ast.alloc_expr(Expr::MethodCall {
                        receiver: expr,
                        method: member,
                        args,
                    });
                } else {
                    expr = self.ast.alloc_expr(Expr::AttrAccess {
                        receiver: expr,
                        attr: member,
                    });
                }
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn call_args(&mut self) -> Result<Vec<ExprId>, VenomError> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !self.at(&Token::RParen) {
            args.push(self.expr()?);
            while self.eat(&Token::Comma) {
                args.push(self.expr()?);
            }
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }

    fn primary_expr(&mut self) -> Result<ExprId, VenomError> {
        match self.bump() {
            Token::IntLit(v) => Ok(self.ast.alloc_expr(Expr::IntLit(v))),
            Token::FloatLit(v) => Ok(self.ast.alloc_expr(Expr::FloatLit(v.to_bits()))),
            Token::StringLit(s) => Ok(self.ast.alloc_expr(Expr::StringLit(s))),
            Token::True => Ok(self.ast.alloc_expr(Expr::BoolLit(true))),
            Token::False => Ok(self.ast.alloc_expr(Expr::BoolLit(false))),
            Token::Nil => Ok(self.ast.alloc_expr(Expr::NilLit)),
            Token::LParen => {
                let inner = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if self.at(&Token::LParen) {
                    let args = self.call_args()?;
                    Ok(self.ast.alloc_expr(Expr::Call { callee: name, args }))
                } else if self.at(&Token::LBrace) {
                    self.bump();
                    let mut type_args = vec![self.type_name()?];
                    while self.eat(&Token::Comma) {
                        type_args.push(self.type_name()?);
                    }
                    self.expect(&Token::RBrace)?;
                    self.expect(&Token::Dot)?;
                    let ctor = self.expect_ident()?;
                    if ctor != "new" {
                        return Err(VenomError::syntax(format!("expected '.new' after '{name}{{..}}'")));
                    }
                    let args = self.call_args()?;
                    Ok(self.ast.alloc_expr(Expr::New { class: name, type_args, args }))
                } else if self.peek() == &Token::Dot
                    && self.tokens.get(self.pos + 1) == Some(&Token::Ident("new".to_owned()))
                {
                    self.bump();
                    self.bump();
                    let args = self.call_args()?;
                    Ok(self.ast.alloc_expr(Expr::New {
                        class: name,
                        type_args: Vec::new(),
                        args,
                    }))
                } else {
                    Ok(self.ast.alloc_expr(Expr::Name(name)))
                }
            }
            other => Err(VenomError::syntax(format!("unexpected token {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    #[test]
    fn parses_scenario_two_as_assign_then_call() {
        let tokens = lex("x = 1 + 2 * 3; print(x)").unwrap();
        let ctx = parse(&tokens, false).unwrap();
        assert_eq!(ctx.stmts.len(), 2);
        assert!(matches!(ctx.ast.stmt(ctx.stmts[0]), Stmt::Assign { .. }));
        assert!(matches!(ctx.ast.stmt(ctx.stmts[1]), Stmt::ExprStmt(_)));
    }

    #[test]
    fn parses_generic_instantiation_and_method_call() {
        let src = "b = Box{Int}.new(7); print(b.get())";
        let tokens = lex(src).unwrap();
        let ctx = parse(&tokens, false).unwrap();
        assert_eq!(ctx.stmts.len(), 2);
    }

    #[test]
    fn parses_nested_function_declaration() {
        let src = "def outer()->Int: a = 10; def inner()->Int: return a+1; end; return inner(); end";
        let tokens = lex(src).unwrap();
        let ctx = parse(&tokens, false).unwrap();
        assert_eq!(ctx.stmts.len(), 1);
        let Stmt::FuncDecl(outer) = ctx.ast.stmt(ctx.stmts[0]) else {
            panic!("expected a function declaration");
        };
        assert_eq!(outer.body.len(), 3);
    }

    #[test]
    fn missing_end_is_a_syntax_error() {
        let tokens = lex("while True: print(1)").unwrap();
        let err = parse(&tokens, false).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidSyntax);
    }
}
