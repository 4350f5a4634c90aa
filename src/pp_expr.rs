//! プリプロセッサ条件式の評価
//!
//! #if / #elif ディレクティブの条件式を評価する。
//! 二項演算は優先順位クライミングで処理する（評価は先行評価。
//! `&&` / `||` も両辺を評価するため、0除算は全体がエラーになる）。

use crate::error::{CompileError, PPError};
use crate::intern::{InternedStr, StringInterner};
use crate::macro_def::MacroTable;
use crate::source::SourceLocation;
use crate::token::{Token, TokenKind};

/// プリプロセッサ式評価器
pub struct PPExprEvaluator<'a> {
    tokens: &'a [Token],
    pos: usize,
    interner: &'a StringInterner,
    macros: &'a MacroTable,
    loc: SourceLocation,
    /// "defined" キーワードのインターン済み文字列
    defined_id: Option<InternedStr>,
}

impl<'a> PPExprEvaluator<'a> {
    /// 新しい評価器を作成
    pub fn new(
        tokens: &'a [Token],
        interner: &'a StringInterner,
        macros: &'a MacroTable,
        loc: SourceLocation,
    ) -> Self {
        let defined_id = interner.lookup("defined");

        Self {
            tokens,
            pos: 0,
            interner,
            macros,
            loc,
            defined_id,
        }
    }

    /// 条件式を評価
    pub fn evaluate(&mut self) -> Result<i64, CompileError> {
        self.expr()
    }

    /// 現在のトークン種別を取得
    fn current_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    /// 次へ進む
    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    /// エラーを生成
    fn error(&self, msg: &str) -> CompileError {
        CompileError::Preprocess {
            loc: self.loc.clone(),
            kind: PPError::InvalidCondition(msg.to_string()),
        }
    }

    /// 二項演算子の優先順位（大きいほど強い）
    fn precedence(kind: &TokenKind) -> Option<u8> {
        match kind {
            TokenKind::PipePipe => Some(1),
            TokenKind::AmpAmp => Some(2),
            TokenKind::Pipe => Some(3),
            TokenKind::Caret => Some(4),
            TokenKind::Amp => Some(5),
            TokenKind::EqEq | TokenKind::BangEq => Some(6),
            TokenKind::Lt | TokenKind::Gt | TokenKind::LtEq | TokenKind::GtEq => Some(7),
            TokenKind::LtLt | TokenKind::GtGt => Some(8),
            TokenKind::Plus | TokenKind::Minus => Some(9),
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Some(10),
            _ => None,
        }
    }

    /// 二項演算子を適用
    fn apply(&self, op: &TokenKind, left: i64, right: i64) -> Result<i64, CompileError> {
        Ok(match op {
            TokenKind::PipePipe => ((left != 0) || (right != 0)) as i64,
            TokenKind::AmpAmp => ((left != 0) && (right != 0)) as i64,
            TokenKind::Pipe => left | right,
            TokenKind::Caret => left ^ right,
            TokenKind::Amp => left & right,
            TokenKind::EqEq => (left == right) as i64,
            TokenKind::BangEq => (left != right) as i64,
            TokenKind::Lt => (left < right) as i64,
            TokenKind::Gt => (left > right) as i64,
            TokenKind::LtEq => (left <= right) as i64,
            TokenKind::GtEq => (left >= right) as i64,
            TokenKind::LtLt => left.wrapping_shl(right as u32),
            TokenKind::GtGt => left.wrapping_shr(right as u32),
            TokenKind::Plus => left.wrapping_add(right),
            TokenKind::Minus => left.wrapping_sub(right),
            TokenKind::Star => left.wrapping_mul(right),
            TokenKind::Slash => {
                if right == 0 {
                    return Err(self.error("division by zero"));
                }
                left / right
            }
            TokenKind::Percent => {
                if right == 0 {
                    return Err(self.error("modulo by zero"));
                }
                left % right
            }
            _ => return Err(self.error("unexpected operator")),
        })
    }

    /// 条件式 (ternary)
    fn expr(&mut self) -> Result<i64, CompileError> {
        let cond = self.binary(1)?;

        if matches!(self.current_kind(), Some(TokenKind::Question)) {
            self.advance();
            let then_val = self.expr()?;
            if !matches!(self.current_kind(), Some(TokenKind::Colon)) {
                return Err(self.error("expected ':' in ternary expression"));
            }
            self.advance();
            let else_val = self.expr()?;
            Ok(if cond != 0 { then_val } else { else_val })
        } else {
            Ok(cond)
        }
    }

    /// 二項演算（優先順位クライミング）
    fn binary(&mut self, min_prec: u8) -> Result<i64, CompileError> {
        let mut left = self.unary()?;

        loop {
            let op = match self.current_kind() {
                Some(kind) => match Self::precedence(kind) {
                    Some(prec) if prec >= min_prec => kind.clone(),
                    _ => break,
                },
                None => break,
            };
            self.advance();
            let prec = Self::precedence(&op).unwrap_or(0);
            let right = self.binary(prec + 1)?;
            left = self.apply(&op, left, right)?;
        }

        Ok(left)
    }

    /// 単項演算
    fn unary(&mut self) -> Result<i64, CompileError> {
        match self.current_kind() {
            Some(TokenKind::Plus) => {
                self.advance();
                self.unary()
            }
            Some(TokenKind::Minus) => {
                self.advance();
                Ok(self.unary()?.wrapping_neg())
            }
            Some(TokenKind::Bang) => {
                self.advance();
                Ok((self.unary()? == 0) as i64)
            }
            Some(TokenKind::Tilde) => {
                self.advance();
                Ok(!self.unary()?)
            }
            _ => self.primary(),
        }
    }

    /// 一次式
    fn primary(&mut self) -> Result<i64, CompileError> {
        match self.current_kind().cloned() {
            Some(TokenKind::IntLit(n)) => {
                self.advance();
                Ok(n)
            }
            Some(TokenKind::UIntLit(n)) => {
                self.advance();
                Ok(n as i64)
            }
            Some(TokenKind::CharLit(c)) => {
                self.advance();
                Ok(c as i64)
            }
            Some(TokenKind::LParen) => {
                self.advance();
                let val = self.expr()?;
                if !matches!(self.current_kind(), Some(TokenKind::RParen)) {
                    return Err(self.error("expected ')'"));
                }
                self.advance();
                Ok(val)
            }
            Some(TokenKind::Ident(id)) => {
                // defined演算子のチェック
                if Some(id) == self.defined_id {
                    self.advance();
                    return self.parse_defined();
                }

                // 未定義の識別子は0として扱う（C標準）
                self.advance();
                Ok(0)
            }
            Some(_) => Err(self.error("unexpected token in preprocessor expression")),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    /// defined演算子をパース
    fn parse_defined(&mut self) -> Result<i64, CompileError> {
        let has_paren = matches!(self.current_kind(), Some(TokenKind::LParen));
        if has_paren {
            self.advance();
        }

        // 識別子またはキーワードを受け入れる
        // キーワードも #define で定義される可能性があるため
        let name = match self.current_kind() {
            Some(TokenKind::Ident(id)) => Some(*id),
            Some(kind) if kind.is_keyword() => {
                // インターンされていなければマクロとして定義されていない
                let kw_name = kind.spelling(self.interner);
                self.interner.lookup(&kw_name)
            }
            _ => return Err(self.error("expected identifier after 'defined'")),
        };
        self.advance();

        if has_paren {
            if !matches!(self.current_kind(), Some(TokenKind::RParen)) {
                return Err(self.error("expected ')' after identifier in 'defined'"));
            }
            self.advance();
        }

        Ok(match name {
            Some(n) if self.macros.is_defined(n) => 1,
            _ => 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macro_def::MacroDef;

    fn make_token(kind: TokenKind) -> Token {
        Token::new(kind, SourceLocation::default())
    }

    fn eval_tokens(tokens: &[Token], interner: &StringInterner, macros: &MacroTable) -> i64 {
        let mut eval = PPExprEvaluator::new(tokens, interner, macros, SourceLocation::default());
        eval.evaluate().unwrap()
    }

    #[test]
    fn test_simple_number() {
        let interner = StringInterner::new();
        let macros = MacroTable::new();
        let tokens = vec![make_token(TokenKind::IntLit(42))];

        assert_eq!(eval_tokens(&tokens, &interner, &macros), 42);
    }

    #[test]
    fn test_precedence() {
        let interner = StringInterner::new();
        let macros = MacroTable::new();

        // 10 - 4 * 2
        let tokens = vec![
            make_token(TokenKind::IntLit(10)),
            make_token(TokenKind::Minus),
            make_token(TokenKind::IntLit(4)),
            make_token(TokenKind::Star),
            make_token(TokenKind::IntLit(2)),
        ];
        assert_eq!(eval_tokens(&tokens, &interner, &macros), 2);

        // 1 || 0 && 0  (&& binds tighter)
        let tokens = vec![
            make_token(TokenKind::IntLit(1)),
            make_token(TokenKind::PipePipe),
            make_token(TokenKind::IntLit(0)),
            make_token(TokenKind::AmpAmp),
            make_token(TokenKind::IntLit(0)),
        ];
        assert_eq!(eval_tokens(&tokens, &interner, &macros), 1);
    }

    #[test]
    fn test_comparison_and_logical() {
        let interner = StringInterner::new();
        let macros = MacroTable::new();

        // 5 > 3
        let tokens = vec![
            make_token(TokenKind::IntLit(5)),
            make_token(TokenKind::Gt),
            make_token(TokenKind::IntLit(3)),
        ];
        assert_eq!(eval_tokens(&tokens, &interner, &macros), 1);

        // 1 && 0
        let tokens = vec![
            make_token(TokenKind::IntLit(1)),
            make_token(TokenKind::AmpAmp),
            make_token(TokenKind::IntLit(0)),
        ];
        assert_eq!(eval_tokens(&tokens, &interner, &macros), 0);
    }

    #[test]
    fn test_ternary() {
        let interner = StringInterner::new();
        let macros = MacroTable::new();

        let tokens = vec![
            make_token(TokenKind::IntLit(0)),
            make_token(TokenKind::Question),
            make_token(TokenKind::IntLit(10)),
            make_token(TokenKind::Colon),
            make_token(TokenKind::IntLit(20)),
        ];
        assert_eq!(eval_tokens(&tokens, &interner, &macros), 20);
    }

    #[test]
    fn test_unary() {
        let interner = StringInterner::new();
        let macros = MacroTable::new();

        let tokens = vec![
            make_token(TokenKind::Bang),
            make_token(TokenKind::IntLit(0)),
        ];
        assert_eq!(eval_tokens(&tokens, &interner, &macros), 1);

        let tokens = vec![
            make_token(TokenKind::Minus),
            make_token(TokenKind::IntLit(5)),
        ];
        assert_eq!(eval_tokens(&tokens, &interner, &macros), -5);
    }

    #[test]
    fn test_negate_most_negative_wraps() {
        let interner = StringInterner::new();
        let macros = MacroTable::new();

        // -9223372036854775808 は UIntLit として字句解析され、
        // i64 再解釈後の否定はラップする（パニックしない）
        let tokens = vec![
            make_token(TokenKind::Minus),
            make_token(TokenKind::UIntLit(9223372036854775808)),
        ];
        assert_eq!(eval_tokens(&tokens, &interner, &macros), i64::MIN);
    }

    #[test]
    fn test_defined() {
        let mut interner = StringInterner::new();
        let mut macros = MacroTable::new();

        let foo = interner.intern("FOO");
        let defined = interner.intern("defined");

        macros.define(MacroDef::object(foo, vec![], SourceLocation::default()));

        // defined(FOO)
        let tokens = vec![
            make_token(TokenKind::Ident(defined)),
            make_token(TokenKind::LParen),
            make_token(TokenKind::Ident(foo)),
            make_token(TokenKind::RParen),
        ];
        assert_eq!(eval_tokens(&tokens, &interner, &macros), 1);

        // defined BAR - 未定義、括弧なし形式
        let bar = interner.intern("BAR");
        let tokens = vec![
            make_token(TokenKind::Ident(defined)),
            make_token(TokenKind::Ident(bar)),
        ];
        assert_eq!(eval_tokens(&tokens, &interner, &macros), 0);
    }

    #[test]
    fn test_undefined_identifier_is_zero() {
        let mut interner = StringInterner::new();
        let macros = MacroTable::new();
        let unknown = interner.intern("UNKNOWN_MACRO");

        let tokens = vec![make_token(TokenKind::Ident(unknown))];
        assert_eq!(eval_tokens(&tokens, &interner, &macros), 0);
    }
}
