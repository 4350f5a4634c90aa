//! スキップ領域の収集
//!
//! プリプロセッサの SkipCallback を実装し、条件コンパイルでスキップ
//! された領域を SkippedBlock として蓄積する。主入力ファイル以外で
//! 始まる領域（ヘッダ内のスキップ）は黙って捨てる。

use crate::intern::StringInterner;
use crate::preprocessor::SkipCallback;
use crate::source::{FileId, FileRegistry, SourceRange};
use crate::token::{Token, TokenKind};
use std::any::Any;

/// ペイロードに残す内容の最大バイト数
const MAX_CONTENT_LEN: usize = 200;

/// スキップされたインアクティブ領域
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedBlock {
    /// スキップ領域（開始は条件ディレクティブ行の次、終了は終端ディレクティブの `#`）
    pub range: SourceRange,
    /// ファイルパス（表示用）
    pub file: String,
    /// 開始行
    pub begin_line: u32,
    /// 開始列
    pub begin_col: u32,
    /// 終了行
    pub end_line: u32,
    /// 終了列
    pub end_col: u32,
    /// 条件トークンの綴り（#else 起点は "<no-condition>"、不明な種別は空）
    pub condition: String,
    /// サニタイズ済みのスキップ内容
    pub content: String,
}

/// 条件トークンを分類して綴りを返す
///
/// 識別子・キーワード（`if` 等）・`#` は綴りをそのまま使う。
/// EOF 番兵（#else 起点の領域）は "<no-condition>"。リテラル等の
/// その他の種別は空文字列となり、ペイロードから condition= が落ちる。
pub fn classify_condition(token: &Token, interner: &StringInterner) -> String {
    match &token.kind {
        TokenKind::Eof => "<no-condition>".to_string(),
        TokenKind::Hash => "#".to_string(),
        kind if kind.is_identifier_like() => token.kind.spelling(interner),
        _ => String::new(),
    }
}

/// スキップ内容をアノテーション向けにサニタイズする
///
/// 先頭200バイトだけを見て、安全な文字集合のみ残す。空白の連続は
/// 1つの `_` に潰し、出力に `_` が連続することはない。元の内容が
/// 200バイトを超えていた場合は "..." を付ける。
pub fn sanitize_content(raw: &[u8]) -> String {
    let mut out = String::new();

    for &b in raw.iter().take(MAX_CONTENT_LEN) {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' => out.push(b as char),
            b'(' | b')' | b'{' | b'}' | b'=' | b'+' | b'-' | b'*' | b'/' | b'<' | b'>'
            | b';' | b',' | b':' => out.push(b as char),
            b'_' | b'\n' | b'\r' | b'\t' | b' ' => {
                if !out.ends_with('_') {
                    out.push('_');
                }
            }
            _ => {}
        }
    }

    if raw.len() > MAX_CONTENT_LEN {
        out.push_str("...");
    }

    out
}

/// スキップ領域を蓄積するコレクタ
pub struct SkipCollector {
    /// 主入力ファイル
    main_file: FileId,
    /// 収集した領域（通知順＝ソース順）
    blocks: Vec<SkippedBlock>,
}

impl SkipCollector {
    /// 新しいコレクタを作成
    pub fn new(main_file: FileId) -> Self {
        Self {
            main_file,
            blocks: Vec::new(),
        }
    }

    /// 収集した領域を取り出す
    pub fn into_blocks(self) -> Vec<SkippedBlock> {
        self.blocks
    }

    /// 収集した領域への参照
    pub fn blocks(&self) -> &[SkippedBlock] {
        &self.blocks
    }
}

impl SkipCallback for SkipCollector {
    fn on_range_skipped(
        &mut self,
        range: &SourceRange,
        condition: &Token,
        files: &FileRegistry,
        interner: &StringInterner,
    ) {
        // ヘッダ内で始まるスキップは対象外
        if range.begin.file_id != self.main_file {
            return;
        }

        let raw = files.extract(range);
        let file = files.get_path(range.begin.file_id).display().to_string();

        self.blocks.push(SkippedBlock {
            range: range.clone(),
            file,
            begin_line: range.begin.line,
            begin_col: range.begin.column,
            end_line: range.end.line,
            end_col: range.end.column,
            condition: classify_condition(condition, interner),
            content: sanitize_content(raw),
        });
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceLocation;

    #[test]
    fn test_sanitize_keeps_safe_chars() {
        assert_eq!(sanitize_content(b"x = a + b;"), "x_=_a_+_b;");
        assert_eq!(sanitize_content(b"f(1, 2)"), "f(1,_2)");
    }

    #[test]
    fn test_sanitize_drops_unsafe_chars() {
        assert_eq!(sanitize_content(b"s = \"hi\" & !m;"), "s_=_hi_m;");
        assert_eq!(sanitize_content(b"p->x [0] #"), "p->x_0_");
    }

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(sanitize_content(b"a   \t\n  b"), "a_b");
        // 先頭の空白は1つの下線になる
        assert_eq!(sanitize_content(b"\n    debug();"), "_debug();");
    }

    #[test]
    fn test_sanitize_never_emits_consecutive_underscores() {
        // 識別子内の連続した下線も1つに潰される
        assert_eq!(sanitize_content(b"__x"), "_x");
        assert_eq!(sanitize_content(b"a_ b"), "a_b");
        assert_eq!(sanitize_content(b"a _b"), "a_b");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let once = sanitize_content(b"  if (flag) { run(); }\n");
        let twice = sanitize_content(once.as_bytes());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_sanitize_truncates_long_content() {
        let raw = vec![b'a'; 250];
        let out = sanitize_content(&raw);
        assert_eq!(out.len(), 203);
        assert!(out.ends_with("..."));
        assert!(out[..200].bytes().all(|b| b == b'a'));
    }

    #[test]
    fn test_sanitize_exactly_200_not_truncated() {
        let raw = vec![b'a'; 200];
        let out = sanitize_content(&raw);
        assert_eq!(out.len(), 200);
        assert!(!out.ends_with("..."));
    }

    #[test]
    fn test_classify_condition() {
        let mut interner = StringInterner::new();
        let id = interner.intern("DEBUG_MODE");
        let loc = SourceLocation::default();

        let ident = Token::new(TokenKind::Ident(id), loc.clone());
        assert_eq!(classify_condition(&ident, &interner), "DEBUG_MODE");

        let eof = Token::eof(loc.clone());
        assert_eq!(classify_condition(&eof, &interner), "<no-condition>");

        let kw = Token::new(TokenKind::KwIf, loc.clone());
        assert_eq!(classify_condition(&kw, &interner), "if");

        let hash = Token::new(TokenKind::Hash, loc.clone());
        assert_eq!(classify_condition(&hash, &interner), "#");

        // リテラルは空（ペイロードから condition= が落ちる）
        let lit = Token::new(TokenKind::IntLit(0), loc);
        assert_eq!(classify_condition(&lit, &interner), "");
    }
}
