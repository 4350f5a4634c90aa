//! トップレベル宣言認識パーサ
//!
//! インアクティブ領域の帰属に必要なのは「どの関数の本体がどの範囲を
//! 占めるか」だけなので、完全なC文法はパースしない。プリプロセッサの
//! トークン列を外部宣言単位に区切り、`... ident ( ... ) { ... }` の
//! パターンを関数定義として認識する。
//!
//! 認識の規則:
//! - `;` がトップレベル（括弧深さ0）に現れたら宣言の終わり
//! - `{` の直前が `)` で、括弧列の直前に識別子があれば関数定義
//! - それ以外の `{`（struct/enum/共用体/初期化子）は対応する `}` まで
//!   読み飛ばして同じ宣言の収集を続ける
//! - K&R形式の関数定義は認識しない

use crate::ast::{ExternalDecl, FunctionDef, TranslationUnit};
use crate::error::{CompileError, ParseError, Result};
use crate::intern::InternedStr;
use crate::preprocessor::Preprocessor;
use crate::source::{FileId, SourceLocation, SourceRange};
use crate::token::{Token, TokenKind};

/// パーサ
pub struct Parser<'a> {
    pp: &'a mut Preprocessor,
    lookahead: Option<Token>,
}

impl<'a> Parser<'a> {
    /// 新しいパーサを作成
    pub fn new(pp: &'a mut Preprocessor) -> Self {
        Self {
            pp,
            lookahead: None,
        }
    }

    /// 翻訳単位をパース
    pub fn parse(&mut self, main_file: FileId) -> Result<TranslationUnit> {
        let mut tu = TranslationUnit::new(main_file);

        while let Some(decl) = self.parse_external_decl()? {
            tu.decls.push(decl);
        }

        Ok(tu)
    }

    /// 次のトークンを取得
    fn next(&mut self) -> Result<Token> {
        if let Some(token) = self.lookahead.take() {
            Ok(token)
        } else {
            self.pp.next_token()
        }
    }

    /// トークンを押し戻す
    fn put_back(&mut self, token: Token) {
        debug_assert!(self.lookahead.is_none());
        self.lookahead = Some(token);
    }

    /// 外部宣言を1つパース（EOFならNone）
    fn parse_external_decl(&mut self) -> Result<Option<ExternalDecl>> {
        let mut first_loc: Option<SourceLocation> = None;
        let mut candidate: Option<InternedStr> = None;
        let mut paren_depth = 0usize;
        let mut prev_rparen = false;
        let mut prev_ident: Option<InternedStr> = None;

        loop {
            let token = self.next()?;

            if first_loc.is_none() && !matches!(token.kind, TokenKind::Eof) {
                first_loc = Some(token.loc.clone());
            }

            match &token.kind {
                TokenKind::Eof => {
                    // 末尾に `;` のない断片は Other として記録
                    return Ok(first_loc.map(ExternalDecl::Other));
                }

                TokenKind::Semi if paren_depth == 0 => {
                    let loc = first_loc.unwrap_or(token.loc);
                    return Ok(Some(ExternalDecl::Other(loc)));
                }

                TokenKind::Ident(id) => {
                    // 属性指定は関数名の候補にしない
                    let name = self.pp.interner().get(*id);
                    if name == "__attribute__" || name == "__declspec" {
                        self.skip_attribute_parens()?;
                        prev_ident = None;
                        prev_rparen = true;
                        continue;
                    }
                    prev_ident = Some(*id);
                    prev_rparen = false;
                }

                TokenKind::LParen => {
                    if paren_depth == 0 {
                        if let Some(id) = prev_ident {
                            candidate = Some(id);
                        }
                    }
                    paren_depth += 1;
                    prev_ident = None;
                    prev_rparen = false;
                }

                TokenKind::RParen => {
                    paren_depth = paren_depth.saturating_sub(1);
                    prev_ident = None;
                    prev_rparen = true;
                }

                TokenKind::LBrace if paren_depth == 0 => {
                    if prev_rparen {
                        if let Some(name) = candidate {
                            // 関数定義: 本体は { から } まで
                            let body_begin = token.loc.clone();
                            let body_end = self.skip_balanced_braces(&token.loc)?;
                            return Ok(Some(ExternalDecl::FunctionDef(FunctionDef {
                                name,
                                loc: first_loc.unwrap_or(token.loc),
                                body: SourceRange::new(body_begin, body_end),
                                annotations: Vec::new(),
                            })));
                        }
                    }

                    // struct/enum/共用体/初期化子の波括弧は読み飛ばして
                    // 同じ宣言の収集を続ける（struct X {...} f(void) {...} 形式）
                    self.skip_balanced_braces(&token.loc)?;
                    prev_ident = None;
                    prev_rparen = false;
                }

                TokenKind::RBrace if paren_depth == 0 => {
                    // 対応する開き波括弧は常に消費済みなので、ここに
                    // 到達する `}` は対応を欠く
                    return Err(CompileError::Parse {
                        loc: token.loc,
                        kind: ParseError::UnexpectedToken {
                            expected: "external declaration".to_string(),
                            found: TokenKind::RBrace,
                        },
                    });
                }

                _ => {
                    prev_ident = None;
                    prev_rparen = false;
                }
            }
        }
    }

    /// 対応する閉じ波括弧まで読み飛ばす（開き波括弧は消費済み）
    ///
    /// 閉じ波括弧の位置を返す。
    fn skip_balanced_braces(&mut self, open_loc: &SourceLocation) -> Result<SourceLocation> {
        let mut depth = 1usize;

        loop {
            let token = self.next()?;
            match token.kind {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(token.loc);
                    }
                }
                TokenKind::Eof => {
                    return Err(CompileError::Parse {
                        loc: open_loc.clone(),
                        kind: ParseError::UnexpectedEof,
                    });
                }
                _ => {}
            }
        }
    }

    /// __attribute__((...)) の括弧列を読み飛ばす
    fn skip_attribute_parens(&mut self) -> Result<()> {
        let token = self.next()?;
        if !matches!(token.kind, TokenKind::LParen) {
            self.put_back(token);
            return Ok(());
        }

        let open_loc = token.loc;
        let mut depth = 1usize;
        loop {
            let token = self.next()?;
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                TokenKind::Eof => {
                    return Err(CompileError::Parse {
                        loc: open_loc,
                        kind: ParseError::UnexpectedEof,
                    });
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessor::{PPConfig, Preprocessor};
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn parse_source(source: &str) -> (TranslationUnit, Preprocessor) {
        let mut file = NamedTempFile::with_suffix(".c").unwrap();
        file.write_all(source.as_bytes()).unwrap();

        let mut pp = Preprocessor::new(PPConfig::default());
        let main_file = pp.process_file(file.path()).unwrap();
        let tu = Parser::new(&mut pp).parse(main_file).unwrap();
        (tu, pp)
    }

    #[test]
    fn test_parse_simple_function() {
        let (tu, pp) = parse_source("int add(int a, int b) { return a + b; }\n");
        let funcs: Vec<_> = tu.functions().collect();
        assert_eq!(funcs.len(), 1);
        assert_eq!(pp.interner().get(funcs[0].name), "add");
        assert!(funcs[0].body.begin.is_before(&funcs[0].body.end));
    }

    #[test]
    fn test_parse_multiple_functions() {
        let source = "\
static int helper(void) { return 1; }\n\
int main(void) {\n\
    return helper();\n\
}\n";
        let (tu, pp) = parse_source(source);
        let names: Vec<_> = tu
            .functions()
            .map(|f| pp.interner().get(f.name).to_string())
            .collect();
        assert_eq!(names, vec!["helper", "main"]);
    }

    #[test]
    fn test_parse_skips_declarations() {
        let source = "\
int global = 42;\n\
extern void proto(int x);\n\
typedef struct point { int x; int y; } point_t;\n\
int arr[] = { 1, 2, 3 };\n\
void run(void) { }\n";
        let (tu, pp) = parse_source(source);
        let funcs: Vec<_> = tu.functions().collect();
        assert_eq!(funcs.len(), 1);
        assert_eq!(pp.interner().get(funcs[0].name), "run");
        // 宣言は Other として記録される
        assert_eq!(tu.decls.len(), 5);
    }

    #[test]
    fn test_parse_struct_return_type() {
        let source = "\
struct pair { int a; int b; };\n\
struct pair make_pair(int a, int b) {\n\
    struct pair p = { a, b };\n\
    return p;\n\
}\n";
        let (tu, pp) = parse_source(source);
        let funcs: Vec<_> = tu.functions().collect();
        assert_eq!(funcs.len(), 1);
        assert_eq!(pp.interner().get(funcs[0].name), "make_pair");
    }

    #[test]
    fn test_parse_function_with_attribute() {
        let source = "\
__attribute__((noinline)) static int f(void) { return 0; }\n\
void g(void) __attribute__((noreturn));\n\
int h(void) { return f(); }\n";
        let (tu, pp) = parse_source(source);
        let names: Vec<_> = tu
            .functions()
            .map(|f| pp.interner().get(f.name).to_string())
            .collect();
        assert_eq!(names, vec!["f", "h"]);
    }

    #[test]
    fn test_parse_nested_braces_in_body() {
        let source = "\
int f(int x) {\n\
    if (x) {\n\
        while (x > 0) { x--; }\n\
    }\n\
    return x;\n\
}\n";
        let (tu, _pp) = parse_source(source);
        let funcs: Vec<_> = tu.functions().collect();
        assert_eq!(funcs.len(), 1);
        assert_eq!(funcs[0].body.end.line, 6);
    }

    #[test]
    fn test_parse_stray_close_brace_fails() {
        let mut file = NamedTempFile::with_suffix(".c").unwrap();
        file.write_all(b"int x;\n}\nint y;\n").unwrap();

        let mut pp = Preprocessor::new(PPConfig::default());
        let main_file = pp.process_file(file.path()).unwrap();
        let err = Parser::new(&mut pp).parse(main_file).unwrap_err();
        assert!(matches!(
            err,
            CompileError::Parse {
                kind: ParseError::UnexpectedToken { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_parse_unterminated_body_fails() {
        let mut file = NamedTempFile::with_suffix(".c").unwrap();
        file.write_all(b"int f(void) { return 0;\n").unwrap();

        let mut pp = Preprocessor::new(PPConfig::default());
        let main_file = pp.process_file(file.path()).unwrap();
        let result = Parser::new(&mut pp).parse(main_file);
        assert!(result.is_err());
    }
}
