//! Cプリプロセッサ
//!
//! TinyCC 方式の文字レベルプリプロセッサ。next_token() がメインの
//! インターフェースで、条件コンパイル処理済みのトークンを返す。
//!
//! 条件が偽のブランチは文字レベルでスキップされ、スキップされた極大
//! 領域ごとに 1 回、登録された SkipCallback へ通知される（通知は
//! ソース順・同期的）。スキップ領域内部のネストしたディレクティブは
//! 個別の通知を生成しない。

use std::any::Any;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CompileError, LexError, PPError, Result};
use crate::intern::{InternedStr, StringInterner};
use crate::macro_def::{MacroDef, MacroKind, MacroTable};
use crate::pp_expr::PPExprEvaluator;
use crate::source::{FileId, FileRegistry, SourceLocation, SourceRange};
use crate::token::{Token, TokenKind};

/// 条件式展開の上限（自己参照マクロの無限展開防止）
const MAX_CONDITION_EXPANSIONS: usize = 512;

/// スキップ領域通知のコールバックトレイト
///
/// 偽ブランチが文字レベルでスキップされるたびに呼び出される。
/// `range` はスキップされた領域（開始＝ディレクティブ行の次の行頭、
/// 終了＝終端ディレクティブの `#`）、`condition` はディレクティブに
/// 隣接する条件トークン（`#else` 起点の領域では EOF 番兵）。
pub trait SkipCallback {
    /// 領域がスキップされたときに呼ばれる
    fn on_range_skipped(
        &mut self,
        range: &SourceRange,
        condition: &Token,
        files: &FileRegistry,
        interner: &StringInterner,
    );

    /// ダウンキャスト用に Any に変換
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

/// インクルードパスの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    /// <...> システムヘッダ
    System,
    /// "..." ローカルヘッダ
    Local,
}

/// プリプロセッサ設定
#[derive(Debug, Default, Clone)]
pub struct PPConfig {
    /// システムインクルードパス (-I)
    pub include_paths: Vec<PathBuf>,
    /// 事前定義マクロ (-D)
    pub predefined: Vec<(String, Option<String>)>,
    /// プリプロセッサデバッグ出力 (--debug-pp)
    pub debug_pp: bool,
}

/// 条件コンパイル状態
#[derive(Debug, Clone)]
struct CondState {
    /// 現在のブランチが有効か
    active: bool,
    /// いずれかのブランチが有効だったか
    seen_active: bool,
    /// #else を見たか
    seen_else: bool,
    /// ディレクティブの位置
    loc: SourceLocation,
}

/// 入力ソース（1ファイル分）
struct InputSource {
    /// ソースバイト列
    source: Vec<u8>,
    /// 現在位置
    pos: usize,
    /// 行番号
    line: u32,
    /// 列番号
    column: u32,
    /// ファイルID
    file_id: FileId,
    /// 行頭フラグ（ディレクティブ検出用）
    at_line_start: bool,
}

impl InputSource {
    /// ファイルから作成
    fn from_file(source: Vec<u8>, file_id: FileId) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            column: 1,
            file_id,
            at_line_start: true,
        }
    }

    /// 行頭かどうか
    fn is_at_line_start(&self) -> bool {
        self.at_line_start
    }

    /// 現在位置を取得
    fn current_location(&self) -> SourceLocation {
        SourceLocation::new(self.file_id, self.line, self.column, self.pos as u32)
    }

    /// 行継続をスキップした実際の位置を取得
    fn skip_line_continuations(&self, start_pos: usize) -> usize {
        let mut pos = start_pos;
        loop {
            // \ の後に改行があれば行継続
            if self.source.get(pos) == Some(&b'\\') {
                let next = self.source.get(pos + 1);
                if next == Some(&b'\n') {
                    pos += 2;
                    continue;
                } else if next == Some(&b'\r') && self.source.get(pos + 2) == Some(&b'\n') {
                    pos += 3;
                    continue;
                }
            }
            break;
        }
        pos
    }

    /// 現在の文字をピーク（行継続を処理）
    fn peek(&self) -> Option<u8> {
        let pos = self.skip_line_continuations(self.pos);
        self.source.get(pos).copied()
    }

    /// n文字先をピーク（行継続を処理）
    fn peek_n(&self, n: usize) -> Option<u8> {
        let mut pos = self.pos;
        for i in 0..=n {
            pos = self.skip_line_continuations(pos);
            if pos >= self.source.len() {
                return None;
            }
            if i < n {
                pos += 1;
            }
        }
        self.source.get(pos).copied()
    }

    /// 1文字進める（行継続を処理）
    fn advance(&mut self) -> Option<u8> {
        let old_pos = self.pos;
        self.pos = self.skip_line_continuations(self.pos);

        // スキップした行継続の分だけ行番号を更新
        for i in old_pos..self.pos {
            if self.source.get(i) == Some(&b'\n') {
                self.line += 1;
                self.column = 1;
            }
        }

        let c = self.source.get(self.pos).copied()?;
        self.pos += 1;

        if c == b'\n' {
            self.line += 1;
            self.column = 1;
            self.at_line_start = true;
        } else {
            self.column += 1;
            if c != b' ' && c != b'\t' && c != b'\r' {
                self.at_line_start = false;
            }
        }
        Some(c)
    }

    /// 空白をスキップ（改行は含まない）
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            // space, tab, carriage return, form feed, vertical tab
            if c == b' ' || c == b'\t' || c == b'\r' || c == 0x0C || c == 0x0B {
                self.advance();
            } else {
                break;
            }
        }
    }
}

/// プリプロセッサ
pub struct Preprocessor {
    /// ファイルレジストリ
    files: FileRegistry,
    /// 文字列インターナー
    interner: StringInterner,
    /// マクロテーブル
    macros: MacroTable,
    /// 設定
    config: PPConfig,
    /// 入力ソーススタック
    sources: Vec<InputSource>,
    /// 条件コンパイルスタック
    cond_stack: Vec<CondState>,
    /// 先読みトークンバッファ
    lookahead: Vec<Token>,
    /// 現在の条件が有効かどうかのキャッシュ
    cond_active: bool,
    /// スペースをトークンとして返すかどうか（#define の判定用）
    return_spaces: bool,
    /// スキップ領域通知のコールバック
    skip_callback: Option<Box<dyn SkipCallback>>,
}

impl Preprocessor {
    /// 新しいプリプロセッサを作成
    pub fn new(config: PPConfig) -> Self {
        let mut pp = Self {
            files: FileRegistry::new(),
            interner: StringInterner::new(),
            macros: MacroTable::new(),
            config,
            sources: Vec::new(),
            cond_stack: Vec::new(),
            lookahead: Vec::new(),
            cond_active: true,
            return_spaces: false,
            skip_callback: None,
        };

        // 事前定義マクロを登録
        pp.define_predefined_macros();

        pp
    }

    /// スキップコールバックを設定
    pub fn set_skip_callback(&mut self, callback: Box<dyn SkipCallback>) {
        self.skip_callback = Some(callback);
    }

    /// スキップコールバックを取得（所有権を移動）
    pub fn take_skip_callback(&mut self) -> Option<Box<dyn SkipCallback>> {
        self.skip_callback.take()
    }

    /// ファイルレジストリへの参照を取得
    pub fn files(&self) -> &FileRegistry {
        &self.files
    }

    /// インターナーへの参照を取得
    pub fn interner(&self) -> &StringInterner {
        &self.interner
    }

    /// マクロテーブルへの参照を取得
    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    /// 事前定義マクロを登録
    fn define_predefined_macros(&mut self) {
        // -D オプションを #define ディレクティブとして処理する（TinyCC方式）。
        // これにより関数マクロも正しく定義される。
        let mut defines_source = String::new();

        for (name, value) in &self.config.predefined {
            if let Some(val) = value {
                defines_source.push_str(&format!("#define {} {}\n", name, val));
            } else {
                defines_source.push_str(&format!("#define {} 1\n", name));
            }
        }

        if defines_source.is_empty() {
            return;
        }

        // 仮想ファイルとして登録
        let bytes = defines_source.into_bytes();
        let file_id = self.files.register(PathBuf::from("<cmdline>"), bytes.clone());
        self.sources.push(InputSource::from_file(bytes, file_id));

        loop {
            match self.next_raw_token() {
                Ok(token) => match token.kind {
                    TokenKind::Eof => break,
                    TokenKind::Hash => {
                        if self.process_directive(token.loc).is_err() {
                            break;
                        }
                    }
                    _ => {}
                },
                Err(_) => break,
            }
        }

        self.sources.pop();
    }

    /// ファイルを処理開始
    ///
    /// 登録されたファイルの FileId を返す（主入力ファイルの識別に使う）。
    pub fn process_file(&mut self, path: &Path) -> Result<FileId> {
        let source = fs::read(path).map_err(|e| CompileError::Preprocess {
            loc: SourceLocation::default(),
            kind: PPError::IoError(path.to_path_buf(), e.to_string()),
        })?;

        let file_id = self.files.register(path.to_path_buf(), source.clone());
        self.sources.push(InputSource::from_file(source, file_id));

        Ok(file_id)
    }

    // ========================================================================
    // トークン供給
    // ========================================================================

    /// 次のトークンを取得（メインインターフェース）
    ///
    /// ディレクティブを処理し、条件コンパイル済みのトークンを返す。
    /// マクロ展開は行わない（関数定義の認識には不要なため）。
    pub fn next_token(&mut self) -> Result<Token> {
        loop {
            let token = if let Some(token) = self.lookahead.pop() {
                token
            } else {
                match self.lex_token_from_source()? {
                    Some(t) => t,
                    None => {
                        if self.sources.len() > 1 {
                            self.sources.pop();
                            continue;
                        }
                        Token::eof(SourceLocation::default())
                    }
                }
            };

            match &token.kind {
                TokenKind::Eof => {
                    // 現在のソースが終了
                    if self.sources.len() > 1 {
                        self.sources.pop();
                        continue;
                    }

                    // 条件コンパイルスタックのチェック
                    if let Some(state) = self.cond_stack.first() {
                        return Err(CompileError::Preprocess {
                            loc: state.loc.clone(),
                            kind: PPError::MissingEndif,
                        });
                    }

                    return Ok(token);
                }

                TokenKind::Newline => continue,

                TokenKind::Hash => {
                    self.process_directive(token.loc)?;
                    continue;
                }

                _ if !self.cond_active => continue,

                _ => return Ok(token),
            }
        }
    }

    /// 生のトークンを取得（ディレクティブ処理なし）
    fn next_raw_token(&mut self) -> Result<Token> {
        loop {
            if let Some(token) = self.lookahead.pop() {
                return Ok(token);
            }

            match self.lex_token_from_source()? {
                Some(token) => return Ok(token),
                None => {
                    if self.sources.len() > 1 {
                        self.sources.pop();
                        continue;
                    }
                    return Ok(Token::eof(SourceLocation::default()));
                }
            }
        }
    }

    /// 現在のソースからトークンを1つ読み取る
    ///
    /// コメントは空白と同様に読み飛ばす。ソースが尽きたら None。
    fn lex_token_from_source(&mut self) -> Result<Option<Token>> {
        loop {
            let Some(source) = self.sources.last_mut() else {
                return Ok(None);
            };

            // return_spaces モードでは空白を Space トークンとして返す
            if self.return_spaces {
                if let Some(c) = source.peek() {
                    if c == b' ' || c == b'\t' {
                        let loc = source.current_location();
                        while let Some(c) = source.peek() {
                            if c == b' ' || c == b'\t' {
                                source.advance();
                            } else {
                                break;
                            }
                        }
                        return Ok(Some(Token::new(TokenKind::Space, loc)));
                    }
                }
            } else {
                source.skip_whitespace();
            }

            // コメントを読み飛ばす
            match (source.peek(), source.peek_n(1)) {
                (Some(b'/'), Some(b'/')) => {
                    while source.peek().is_some_and(|c| c != b'\n') {
                        source.advance();
                    }
                    continue;
                }
                (Some(b'/'), Some(b'*')) => {
                    let loc = source.current_location();
                    source.advance();
                    source.advance();
                    loop {
                        match (source.peek(), source.peek_n(1)) {
                            (Some(b'*'), Some(b'/')) => {
                                source.advance();
                                source.advance();
                                break;
                            }
                            (Some(_), _) => {
                                source.advance();
                            }
                            (None, _) => {
                                return Err(CompileError::Lex {
                                    loc,
                                    kind: LexError::UnterminatedComment,
                                });
                            }
                        }
                    }
                    continue;
                }
                _ => {}
            }

            let loc = source.current_location();
            if source.peek().is_none() {
                return Ok(None);
            }

            let kind = self.scan_token_kind()?;
            return Ok(Some(Token::new(kind, loc)));
        }
    }

    // ========================================================================
    // 字句スキャン
    // ========================================================================

    /// トークン種別をスキャン
    fn scan_token_kind(&mut self) -> Result<TokenKind> {
        let source = self.sources.last_mut().unwrap();
        let Some(c) = source.peek() else {
            return Ok(TokenKind::Eof);
        };

        match c {
            b'\n' => {
                source.advance();
                Ok(TokenKind::Newline)
            }

            // ワイド文字列/文字リテラル（値は通常リテラルと同じ種別で保持）
            b'L' if matches!(source.peek_n(1), Some(b'"') | Some(b'\'')) => {
                source.advance(); // L
                if source.peek() == Some(b'"') {
                    self.scan_string()
                } else {
                    self.scan_char()
                }
            }

            // 識別子またはキーワード
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.scan_identifier(),

            // 数値リテラル
            b'0'..=b'9' => self.scan_number(),

            // 文字列リテラル
            b'"' => self.scan_string(),

            // 文字リテラル
            b'\'' => self.scan_char(),

            // 演算子・区切り記号
            b'+' => self.scan_operator(&[(b'+', TokenKind::PlusPlus), (b'=', TokenKind::PlusEq)], TokenKind::Plus),
            b'-' => self.scan_operator(&[(b'-', TokenKind::MinusMinus), (b'=', TokenKind::MinusEq), (b'>', TokenKind::Arrow)], TokenKind::Minus),
            b'*' => self.scan_operator(&[(b'=', TokenKind::StarEq)], TokenKind::Star),
            b'/' => self.scan_operator(&[(b'=', TokenKind::SlashEq)], TokenKind::Slash),
            b'%' => self.scan_operator(&[(b'=', TokenKind::PercentEq)], TokenKind::Percent),
            b'&' => self.scan_operator(&[(b'&', TokenKind::AmpAmp), (b'=', TokenKind::AmpEq)], TokenKind::Amp),
            b'|' => self.scan_operator(&[(b'|', TokenKind::PipePipe), (b'=', TokenKind::PipeEq)], TokenKind::Pipe),
            b'^' => self.scan_operator(&[(b'=', TokenKind::CaretEq)], TokenKind::Caret),
            b'!' => self.scan_operator(&[(b'=', TokenKind::BangEq)], TokenKind::Bang),
            b'=' => self.scan_operator(&[(b'=', TokenKind::EqEq)], TokenKind::Eq),
            b'~' => {
                source.advance();
                Ok(TokenKind::Tilde)
            }
            b'<' => self.scan_lt(),
            b'>' => self.scan_gt(),
            b'?' => {
                source.advance();
                Ok(TokenKind::Question)
            }
            b':' => {
                source.advance();
                Ok(TokenKind::Colon)
            }
            b'.' => self.scan_dot(),
            b',' => {
                source.advance();
                Ok(TokenKind::Comma)
            }
            b';' => {
                source.advance();
                Ok(TokenKind::Semi)
            }
            b'(' => {
                source.advance();
                Ok(TokenKind::LParen)
            }
            b')' => {
                source.advance();
                Ok(TokenKind::RParen)
            }
            b'[' => {
                source.advance();
                Ok(TokenKind::LBracket)
            }
            b']' => {
                source.advance();
                Ok(TokenKind::RBracket)
            }
            b'{' => {
                source.advance();
                Ok(TokenKind::LBrace)
            }
            b'}' => {
                source.advance();
                Ok(TokenKind::RBrace)
            }
            b'#' => {
                source.advance();
                if source.peek() == Some(b'#') {
                    source.advance();
                    Ok(TokenKind::HashHash)
                } else {
                    Ok(TokenKind::Hash)
                }
            }
            b'\\' => {
                source.advance();
                Ok(TokenKind::Backslash)
            }

            _ => {
                let loc = source.current_location();
                source.advance();
                Err(CompileError::Lex {
                    loc,
                    kind: LexError::InvalidChar(c as char),
                })
            }
        }
    }

    /// 汎用演算子スキャン
    fn scan_operator(&mut self, continuations: &[(u8, TokenKind)], default: TokenKind) -> Result<TokenKind> {
        let source = self.sources.last_mut().unwrap();
        source.advance();
        for (next, kind) in continuations {
            if source.peek() == Some(*next) {
                source.advance();
                return Ok(kind.clone());
            }
        }
        Ok(default)
    }

    /// < 演算子のスキャン
    fn scan_lt(&mut self) -> Result<TokenKind> {
        let source = self.sources.last_mut().unwrap();
        source.advance();
        match source.peek() {
            Some(b'<') => {
                source.advance();
                if source.peek() == Some(b'=') {
                    source.advance();
                    Ok(TokenKind::LtLtEq)
                } else {
                    Ok(TokenKind::LtLt)
                }
            }
            Some(b'=') => {
                source.advance();
                Ok(TokenKind::LtEq)
            }
            _ => Ok(TokenKind::Lt),
        }
    }

    /// > 演算子のスキャン
    fn scan_gt(&mut self) -> Result<TokenKind> {
        let source = self.sources.last_mut().unwrap();
        source.advance();
        match source.peek() {
            Some(b'>') => {
                source.advance();
                if source.peek() == Some(b'=') {
                    source.advance();
                    Ok(TokenKind::GtGtEq)
                } else {
                    Ok(TokenKind::GtGt)
                }
            }
            Some(b'=') => {
                source.advance();
                Ok(TokenKind::GtEq)
            }
            _ => Ok(TokenKind::Gt),
        }
    }

    /// . 演算子のスキャン
    fn scan_dot(&mut self) -> Result<TokenKind> {
        let source = self.sources.last_mut().unwrap();
        source.advance();
        if source.peek() == Some(b'.') && source.peek_n(1) == Some(b'.') {
            source.advance();
            source.advance();
            Ok(TokenKind::Ellipsis)
        } else {
            Ok(TokenKind::Dot)
        }
    }

    /// 識別子またはキーワードをスキャン
    fn scan_identifier(&mut self) -> Result<TokenKind> {
        let source = self.sources.last_mut().unwrap();
        let mut chars = Vec::new();
        while let Some(c) = source.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                chars.push(c);
                source.advance();
            } else {
                break;
            }
        }

        let text = std::str::from_utf8(&chars).unwrap_or_default();

        if let Some(kw) = TokenKind::from_keyword(text) {
            Ok(kw)
        } else {
            Ok(TokenKind::Ident(self.interner.intern(text)))
        }
    }

    /// 数値リテラルをスキャン
    fn scan_number(&mut self) -> Result<TokenKind> {
        let source = self.sources.last_mut().unwrap();
        let loc = source.current_location();
        let start = source.pos;

        // 16進数、8進数、2進数の判定
        if source.peek() == Some(b'0') {
            source.advance();
            match source.peek() {
                Some(b'x') | Some(b'X') => {
                    source.advance();
                    while source.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                        source.advance();
                    }
                }
                Some(b'b') | Some(b'B') => {
                    source.advance();
                    while matches!(source.peek(), Some(b'0') | Some(b'1')) {
                        source.advance();
                    }
                }
                Some(b'0'..=b'7') => {
                    while source.peek().is_some_and(|c| matches!(c, b'0'..=b'7')) {
                        source.advance();
                    }
                }
                Some(b'.') | Some(b'e') | Some(b'E') => {
                    return self.scan_float_from(start, loc);
                }
                _ => {}
            }
        } else {
            while source.peek().is_some_and(|c| c.is_ascii_digit()) {
                source.advance();
            }
            if matches!(source.peek(), Some(b'.') | Some(b'e') | Some(b'E')) {
                return self.scan_float_from(start, loc);
            }
        }

        self.finish_integer(start, loc)
    }

    /// 浮動小数点数をスキャン
    fn scan_float_from(&mut self, start: usize, loc: SourceLocation) -> Result<TokenKind> {
        let source = self.sources.last_mut().unwrap();

        if source.peek() == Some(b'.') {
            source.advance();
            while source.peek().is_some_and(|c| c.is_ascii_digit()) {
                source.advance();
            }
        }

        if matches!(source.peek(), Some(b'e') | Some(b'E')) {
            source.advance();
            if matches!(source.peek(), Some(b'+') | Some(b'-')) {
                source.advance();
            }
            while source.peek().is_some_and(|c| c.is_ascii_digit()) {
                source.advance();
            }
        }

        if matches!(source.peek(), Some(b'f') | Some(b'F') | Some(b'l') | Some(b'L')) {
            source.advance();
        }

        let text = String::from_utf8_lossy(&source.source[start..source.pos]).to_string();
        let value: f64 = text
            .trim_end_matches(['f', 'F', 'l', 'L'])
            .parse()
            .map_err(|_| CompileError::Lex {
                loc,
                kind: LexError::InvalidNumber(text.clone()),
            })?;

        Ok(TokenKind::FloatLit(value))
    }

    /// 整数リテラルの仕上げ（サフィックスと基数の処理）
    fn finish_integer(&mut self, start: usize, loc: SourceLocation) -> Result<TokenKind> {
        let source = self.sources.last_mut().unwrap();

        let mut is_unsigned = false;
        loop {
            match source.peek() {
                Some(b'u') | Some(b'U') => {
                    is_unsigned = true;
                    source.advance();
                }
                Some(b'l') | Some(b'L') => {
                    source.advance();
                }
                _ => break,
            }
        }

        let text = String::from_utf8_lossy(&source.source[start..source.pos]).to_string();
        let without_suffix = text.trim_end_matches(['u', 'U', 'l', 'L']);

        let (num_text, radix) = if let Some(hex) = without_suffix.strip_prefix("0x").or_else(|| without_suffix.strip_prefix("0X")) {
            (hex, 16)
        } else if let Some(bin) = without_suffix.strip_prefix("0b").or_else(|| without_suffix.strip_prefix("0B")) {
            (bin, 2)
        } else if without_suffix.len() > 1 && without_suffix.starts_with('0') {
            (&without_suffix[1..], 8)
        } else {
            (without_suffix, 10)
        };

        if is_unsigned {
            let value = u64::from_str_radix(num_text, radix).map_err(|_| CompileError::Lex {
                loc,
                kind: LexError::InvalidNumber(text.clone()),
            })?;
            Ok(TokenKind::UIntLit(value))
        } else {
            // まずi64でパースを試み、失敗したらu64でリトライ
            match i64::from_str_radix(num_text, radix) {
                Ok(value) => Ok(TokenKind::IntLit(value)),
                Err(_) => {
                    let value = u64::from_str_radix(num_text, radix).map_err(|_| CompileError::Lex {
                        loc,
                        kind: LexError::InvalidNumber(text.clone()),
                    })?;
                    Ok(TokenKind::UIntLit(value))
                }
            }
        }
    }

    /// 文字列リテラルをスキャン
    fn scan_string(&mut self) -> Result<TokenKind> {
        let loc = {
            let source = self.sources.last_mut().unwrap();
            let loc = source.current_location();
            source.advance(); // "
            loc
        };

        let mut bytes = Vec::new();
        loop {
            let source = self.sources.last_mut().unwrap();
            match source.peek() {
                Some(b'"') => {
                    source.advance();
                    return Ok(TokenKind::StringLit(bytes));
                }
                Some(b'\\') => {
                    source.advance();
                    let escaped = self.scan_escape_sequence(&loc)?;
                    bytes.push(escaped);
                }
                Some(b'\n') | None => {
                    return Err(CompileError::Lex {
                        loc,
                        kind: LexError::UnterminatedString,
                    });
                }
                Some(c) => {
                    source.advance();
                    bytes.push(c);
                }
            }
        }
    }

    /// 文字リテラルをスキャン
    ///
    /// 複数文字リテラルは先頭文字の値として扱う。
    fn scan_char(&mut self) -> Result<TokenKind> {
        let loc = {
            let source = self.sources.last_mut().unwrap();
            let loc = source.current_location();
            source.advance(); // '
            loc
        };

        let mut value: Option<u32> = None;
        loop {
            let source = self.sources.last_mut().unwrap();
            match source.peek() {
                Some(b'\'') => {
                    source.advance();
                    return Ok(TokenKind::CharLit(value.unwrap_or(0)));
                }
                Some(b'\\') => {
                    source.advance();
                    let escaped = self.scan_escape_sequence(&loc)?;
                    if value.is_none() {
                        value = Some(escaped as u32);
                    }
                }
                Some(b'\n') | None => {
                    return Err(CompileError::Lex {
                        loc,
                        kind: LexError::UnterminatedChar,
                    });
                }
                Some(c) => {
                    source.advance();
                    if value.is_none() {
                        value = Some(c as u32);
                    }
                }
            }
        }
    }

    /// エスケープシーケンスをスキャン
    fn scan_escape_sequence(&mut self, loc: &SourceLocation) -> Result<u8> {
        let source = self.sources.last_mut().unwrap();
        match source.peek() {
            Some(b'n') => { source.advance(); Ok(b'\n') }
            Some(b't') => { source.advance(); Ok(b'\t') }
            Some(b'r') => { source.advance(); Ok(b'\r') }
            Some(b'\\') => { source.advance(); Ok(b'\\') }
            Some(b'\'') => { source.advance(); Ok(b'\'') }
            Some(b'"') => { source.advance(); Ok(b'"') }
            Some(b'a') => { source.advance(); Ok(0x07) }
            Some(b'b') => { source.advance(); Ok(0x08) }
            Some(b'f') => { source.advance(); Ok(0x0C) }
            Some(b'v') => { source.advance(); Ok(0x0B) }
            Some(b'x') => {
                source.advance();
                let mut value = 0u8;
                let mut count = 0;
                while let Some(c) = source.peek() {
                    if let Some(digit) = (c as char).to_digit(16) {
                        value = value.wrapping_mul(16).wrapping_add(digit as u8);
                        source.advance();
                        count += 1;
                        if count >= 2 {
                            break;
                        }
                    } else {
                        break;
                    }
                }
                // GCC互換: \x の後に16進数がない場合は文字 'x' として扱う
                if count == 0 { Ok(b'x') } else { Ok(value) }
            }
            Some(c @ b'0'..=b'7') => {
                let mut value = c - b'0';
                source.advance();
                for _ in 0..2 {
                    if let Some(c @ b'0'..=b'7') = source.peek() {
                        value = value * 8 + (c - b'0');
                        source.advance();
                    } else {
                        break;
                    }
                }
                Ok(value)
            }
            Some(c) => {
                // GCC互換: 未知のエスケープシーケンスは文字そのものとして扱う
                source.advance();
                Ok(c)
            }
            None => Err(CompileError::Lex {
                loc: loc.clone(),
                kind: LexError::UnterminatedString,
            }),
        }
    }

    // ========================================================================
    // ディレクティブ処理
    // ========================================================================

    /// プリプロセッサディレクティブを処理
    fn process_directive(&mut self, loc: SourceLocation) -> Result<()> {
        let directive_token = self.next_raw_token()?;

        match &directive_token.kind {
            TokenKind::Newline | TokenKind::Eof => {
                // 空のディレクティブ（許可）
                Ok(())
            }
            TokenKind::Ident(id) => {
                let name = self.interner.get(*id).to_string();
                self.process_directive_by_name(&name, loc)
            }
            // ディレクティブ名がキーワードとして字句解析される場合がある
            TokenKind::KwIf => self.process_directive_by_name("if", loc),
            TokenKind::KwElse => self.process_directive_by_name("else", loc),
            TokenKind::IntLit(_) => {
                // # 123 "file" 形式の行マーカー
                self.skip_to_eol()?;
                Ok(())
            }
            _ => Err(CompileError::Preprocess {
                loc,
                kind: PPError::InvalidDirective(format!("{:?}", directive_token.kind)),
            }),
        }
    }

    /// ディレクティブ名に基づいて処理
    fn process_directive_by_name(&mut self, name: &str, loc: SourceLocation) -> Result<()> {
        match name {
            "define" => {
                if self.cond_active {
                    self.process_define(loc)?;
                } else {
                    self.skip_to_eol()?;
                }
            }
            "undef" => {
                if self.cond_active {
                    self.process_undef()?;
                } else {
                    self.skip_to_eol()?;
                }
            }
            "include" => {
                if self.cond_active {
                    self.process_include(loc)?;
                } else {
                    self.skip_to_eol()?;
                }
            }
            "if" => self.process_if(loc)?,
            "ifdef" => self.process_ifdef(loc, false)?,
            "ifndef" => self.process_ifdef(loc, true)?,
            "elif" => self.process_elif(loc)?,
            "else" => self.process_else(loc)?,
            "endif" => self.process_endif(loc)?,
            "error" => {
                if self.cond_active {
                    return Err(CompileError::Preprocess {
                        loc,
                        kind: PPError::InvalidDirective("#error".to_string()),
                    });
                }
                self.skip_to_eol()?;
            }
            "warning" | "pragma" | "line" => {
                self.skip_to_eol()?;
            }
            _ => {
                if self.cond_active {
                    return Err(CompileError::Preprocess {
                        loc,
                        kind: PPError::InvalidDirective(name.to_string()),
                    });
                }
                self.skip_to_eol()?;
            }
        }

        Ok(())
    }

    /// #define を処理
    fn process_define(&mut self, loc: SourceLocation) -> Result<()> {
        let name_token = self.next_raw_token()?;
        let name = match name_token.kind {
            TokenKind::Ident(id) => id,
            _ => {
                return Err(CompileError::Preprocess {
                    loc,
                    kind: PPError::InvalidDirective("expected macro name".to_string()),
                });
            }
        };

        // TinyCC方式: スペースモードで次のトークンを取得し、
        // '(' がマクロ名の直後にある場合のみ関数マクロとして扱う
        self.return_spaces = true;
        let next = self.next_raw_token()?;
        self.return_spaces = false;

        let (kind, body_start) = if matches!(next.kind, TokenKind::LParen) {
            let (params, is_variadic) = self.parse_macro_params()?;
            (MacroKind::Function { params, is_variadic }, None)
        } else if matches!(next.kind, TokenKind::Space) {
            let body_first = self.next_raw_token()?;
            (MacroKind::Object, Some(body_first))
        } else {
            (MacroKind::Object, Some(next))
        };

        let mut body = Vec::new();
        let mut need_more = true;
        if let Some(first) = body_start {
            if matches!(first.kind, TokenKind::Newline | TokenKind::Eof) {
                // 値なしマクロ
                need_more = false;
            } else {
                body.push(first);
            }
        }

        if need_more {
            loop {
                let token = self.next_raw_token()?;
                match token.kind {
                    TokenKind::Newline | TokenKind::Eof => break,
                    _ => body.push(token),
                }
            }
        }

        let def = match kind {
            MacroKind::Object => MacroDef::object(name, body, loc),
            MacroKind::Function { params, is_variadic } => {
                MacroDef::function(name, params, is_variadic, body, loc)
            }
        };

        self.macros.define(def);
        Ok(())
    }

    /// 関数マクロのパラメータをパース
    fn parse_macro_params(&mut self) -> Result<(Vec<InternedStr>, bool)> {
        let mut params = Vec::new();
        let mut is_variadic = false;

        loop {
            let token = self.next_raw_token()?;
            match token.kind {
                TokenKind::RParen => break,
                TokenKind::Ident(id) => {
                    params.push(id);
                    let next = self.next_raw_token()?;
                    match next.kind {
                        TokenKind::Comma => continue,
                        TokenKind::RParen => break,
                        TokenKind::Ellipsis => {
                            // GNU拡張: NAME... 形式
                            is_variadic = true;
                            let rparen = self.next_raw_token()?;
                            if !matches!(rparen.kind, TokenKind::RParen) {
                                return Err(CompileError::Preprocess {
                                    loc: token.loc,
                                    kind: PPError::InvalidMacroArgs("expected ')' after '...'".to_string()),
                                });
                            }
                            break;
                        }
                        _ => {
                            return Err(CompileError::Preprocess {
                                loc: token.loc,
                                kind: PPError::InvalidMacroArgs("expected ',' or ')'".to_string()),
                            });
                        }
                    }
                }
                TokenKind::Ellipsis => {
                    is_variadic = true;
                    let next = self.next_raw_token()?;
                    if !matches!(next.kind, TokenKind::RParen) {
                        return Err(CompileError::Preprocess {
                            loc: token.loc,
                            kind: PPError::InvalidMacroArgs("expected ')' after '...'".to_string()),
                        });
                    }
                    break;
                }
                _ => {
                    return Err(CompileError::Preprocess {
                        loc: token.loc,
                        kind: PPError::InvalidMacroArgs("expected parameter name".to_string()),
                    });
                }
            }
        }

        Ok((params, is_variadic))
    }

    /// #undef を処理
    fn process_undef(&mut self) -> Result<()> {
        let token = self.next_raw_token()?;
        if let TokenKind::Ident(id) = token.kind {
            self.macros.undefine(id);
        }
        self.skip_to_eol()?;
        Ok(())
    }

    /// #include を処理
    ///
    /// 解決できないシステムヘッダは読み飛ばす（単一翻訳単位の解析では
    /// システムヘッダツリーが手元にないのが普通のため）。ローカル
    /// ヘッダが見つからない場合はエラー。
    fn process_include(&mut self, loc: SourceLocation) -> Result<()> {
        let token = self.next_raw_token()?;

        let (path, kind) = match &token.kind {
            TokenKind::StringLit(bytes) => {
                (String::from_utf8_lossy(bytes).to_string(), IncludeKind::Local)
            }
            TokenKind::Lt => {
                // トークナイザを使わず文字レベルで直接読み取る
                let path = self.scan_include_path()?;
                (path, IncludeKind::System)
            }
            _ => {
                return Err(CompileError::Preprocess {
                    loc,
                    kind: PPError::InvalidDirective("expected include path".to_string()),
                });
            }
        };

        self.skip_to_eol()?;

        let Some(resolved) = self.resolve_include(&path, kind) else {
            match kind {
                IncludeKind::System => {
                    if self.config.debug_pp {
                        eprintln!("DEBUG: skipping unresolved system include <{}>", path);
                    }
                    return Ok(());
                }
                IncludeKind::Local => {
                    return Err(CompileError::Preprocess {
                        loc,
                        kind: PPError::IncludeNotFound(PathBuf::from(path)),
                    });
                }
            }
        };

        let source = fs::read(&resolved).map_err(|e| CompileError::Preprocess {
            loc: loc.clone(),
            kind: PPError::IoError(resolved.clone(), e.to_string()),
        })?;

        let file_id = self.files.register(resolved, source.clone());
        self.sources.push(InputSource::from_file(source, file_id));

        Ok(())
    }

    /// インクルードパスを解決
    fn resolve_include(&self, path: &str, kind: IncludeKind) -> Option<PathBuf> {
        let path = Path::new(path);

        // "..." はまず現在のファイルのディレクトリから探す
        if kind == IncludeKind::Local {
            if let Some(source) = self.sources.last() {
                let current_path = self.files.get_path(source.file_id);
                if let Some(parent) = current_path.parent() {
                    let candidate = parent.join(path);
                    if candidate.is_file() {
                        return Some(candidate);
                    }
                }
            }
        }

        for dir in &self.config.include_paths {
            let candidate = dir.join(path);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        None
    }

    /// #include <...> のパスを文字レベルで読み取る
    fn scan_include_path(&mut self) -> Result<String> {
        let source = self.sources.last_mut().ok_or_else(|| CompileError::Preprocess {
            loc: SourceLocation::default(),
            kind: PPError::InvalidDirective("no source".to_string()),
        })?;

        let loc = source.current_location();
        let mut path = String::new();

        loop {
            match source.peek() {
                Some(b'>') => {
                    source.advance();
                    break;
                }
                Some(b'\n') | None => {
                    return Err(CompileError::Preprocess {
                        loc,
                        kind: PPError::InvalidDirective("unterminated include path".to_string()),
                    });
                }
                Some(c) => {
                    source.advance();
                    path.push(c as char);
                }
            }
        }

        Ok(path)
    }

    // ========================================================================
    // 条件コンパイル
    // ========================================================================

    /// #if を処理
    fn process_if(&mut self, loc: SourceLocation) -> Result<()> {
        // 親が無効な場合は文字レベルでスキップ（通知はしない）
        if !self.cond_active {
            self.cond_stack.push(CondState {
                active: false,
                seen_active: false,
                seen_else: false,
                loc: loc.clone(),
            });
            let sentinel = Token::eof(loc.clone());
            return self.skip_inactive_branch(loc, sentinel, false);
        }

        // マクロ展開付きでトークンを収集
        let (tokens, first_raw) = self.collect_if_condition()?;

        let mut eval = PPExprEvaluator::new(&tokens, &self.interner, &self.macros, loc.clone());
        let active = eval.evaluate()? != 0;

        self.cond_stack.push(CondState {
            active,
            seen_active: active,
            seen_else: false,
            loc: loc.clone(),
        });

        self.update_cond_active();

        if !active {
            // 条件トークンは展開前の先頭トークン
            let cond = first_raw.unwrap_or_else(|| Token::eof(loc.clone()));
            self.skip_inactive_branch(loc, cond, true)?;
        }

        Ok(())
    }

    /// #ifdef / #ifndef を処理
    fn process_ifdef(&mut self, loc: SourceLocation, negate: bool) -> Result<()> {
        if !self.cond_active {
            self.cond_stack.push(CondState {
                active: false,
                seen_active: false,
                seen_else: false,
                loc: loc.clone(),
            });
            let sentinel = Token::eof(loc.clone());
            return self.skip_inactive_branch(loc, sentinel, false);
        }

        let token = self.next_raw_token()?;
        let defined = if let TokenKind::Ident(id) = &token.kind {
            self.macros.is_defined(*id)
        } else {
            false
        };

        self.skip_to_eol()?;

        let active = if negate { !defined } else { defined };

        self.cond_stack.push(CondState {
            active,
            seen_active: active,
            seen_else: false,
            loc: loc.clone(),
        });

        self.update_cond_active();

        if !active {
            // 条件トークンはディレクティブ隣接の識別子
            self.skip_inactive_branch(loc, token, true)?;
        }

        Ok(())
    }

    /// #elif を処理
    ///
    /// 注: これは有効なブランチから呼ばれる（そのブランチは終了し、
    /// #endif までの残りをスキップする必要がある）。
    fn process_elif(&mut self, loc: SourceLocation) -> Result<()> {
        let Some(state) = self.cond_stack.last() else {
            return Err(CompileError::Preprocess {
                loc,
                kind: PPError::UnmatchedEndif,
            });
        };
        if state.seen_else {
            return Err(CompileError::Preprocess {
                loc,
                kind: PPError::ElifAfterElse,
            });
        }

        // 有効なブランチの後なので条件は評価せず、#endif までスキップ。
        // スキップ領域の条件トークンは elif 条件の先頭トークン。
        let tokens = self.collect_to_eol()?;
        let cond = tokens
            .first()
            .cloned()
            .unwrap_or_else(|| Token::eof(loc.clone()));
        self.skip_inactive_branch(loc, cond, true)
    }

    /// #else を処理
    ///
    /// 注: これは有効なブランチから呼ばれる。#else 以降をスキップする。
    fn process_else(&mut self, loc: SourceLocation) -> Result<()> {
        let Some(state) = self.cond_stack.last_mut() else {
            return Err(CompileError::Preprocess {
                loc,
                kind: PPError::UnmatchedElse,
            });
        };
        if state.seen_else {
            return Err(CompileError::Preprocess {
                loc,
                kind: PPError::UnmatchedElse,
            });
        }
        state.seen_else = true;

        self.skip_to_eol()?;
        // #else には条件トークンがないので EOF 番兵を渡す
        let sentinel = Token::eof(loc.clone());
        self.skip_inactive_branch(loc, sentinel, true)
    }

    /// #endif を処理
    fn process_endif(&mut self, loc: SourceLocation) -> Result<()> {
        if self.cond_stack.pop().is_none() {
            return Err(CompileError::Preprocess {
                loc,
                kind: PPError::UnmatchedEndif,
            });
        }
        self.skip_to_eol()?;
        self.update_cond_active();
        Ok(())
    }

    /// 条件アクティブ状態を更新
    fn update_cond_active(&mut self) {
        self.cond_active = self.cond_stack.iter().all(|s| s.active);
    }

    /// 行末までトークンを収集（マクロ展開なし）
    fn collect_to_eol(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_raw_token()?;
            match token.kind {
                TokenKind::Newline | TokenKind::Eof => break,
                _ => tokens.push(token),
            }
        }
        Ok(tokens)
    }

    /// 行末までスキップ
    fn skip_to_eol(&mut self) -> Result<()> {
        loop {
            let token = self.next_raw_token()?;
            if matches!(token.kind, TokenKind::Newline | TokenKind::Eof) {
                break;
            }
        }
        Ok(())
    }

    /// #if条件用：マクロ展開付きでトークン収集
    ///
    /// マクロは展開するが、defined の引数は展開しない（TinyCC方式）。
    /// 自己参照マクロは展開回数上限で打ち切る。
    ///
    /// 戻り値の2番目は展開前の先頭トークン（スキップ領域の条件
    /// トークンとして使う。条件が空なら None）。
    fn collect_if_condition(&mut self) -> Result<(Vec<Token>, Option<Token>)> {
        let mut tokens = Vec::new();
        let mut first_raw: Option<Token> = None;
        let defined_id = self.interner.intern("defined");
        let mut expansions = 0usize;

        loop {
            let token = self.next_raw_token()?;

            if first_raw.is_none() && !matches!(token.kind, TokenKind::Newline | TokenKind::Eof) {
                first_raw = Some(token.clone());
            }

            match &token.kind {
                TokenKind::Newline | TokenKind::Eof => break,
                TokenKind::Ident(id) if *id == defined_id => {
                    // defined演算子の引数は展開しない
                    tokens.push(token);

                    let next = self.next_raw_token()?;
                    if matches!(next.kind, TokenKind::LParen) {
                        tokens.push(next);
                        let ident = self.next_raw_token()?;
                        tokens.push(ident);
                        let rparen = self.next_raw_token()?;
                        tokens.push(rparen);
                    } else {
                        // defined IDENT 形式（括弧なし）
                        tokens.push(next);
                    }
                }
                TokenKind::Ident(id) => {
                    let id = *id;
                    if expansions < MAX_CONDITION_EXPANSIONS {
                        if let Some(expanded) = self.try_expand_macro(id)? {
                            expansions += 1;
                            for t in expanded.into_iter().rev() {
                                self.lookahead.push(t);
                            }
                            continue;
                        }
                    }
                    tokens.push(token);
                }
                _ => tokens.push(token),
            }
        }

        if self.config.debug_pp {
            eprintln!("DEBUG: collected tokens for #if condition:");
            for t in &tokens {
                eprintln!("  {:?}", t.kind);
            }
        }

        Ok((tokens, first_raw))
    }

    /// マクロ展開を試みる（条件式収集専用）
    ///
    /// 戻り値 None は「展開できない」（未定義、または関数マクロが
    /// 呼び出し形式でない）。# / ## 演算子はサポートしない。
    fn try_expand_macro(&mut self, id: InternedStr) -> Result<Option<Vec<Token>>> {
        let Some(def) = self.macros.get(id).cloned() else {
            return Ok(None);
        };

        match &def.kind {
            MacroKind::Object => Ok(Some(def.body.clone())),
            MacroKind::Function { params, .. } => {
                let next = self.next_raw_token()?;
                if !matches!(next.kind, TokenKind::LParen) {
                    self.lookahead.push(next);
                    return Ok(None);
                }

                let args = self.collect_macro_args()?;
                let mut out = Vec::new();
                for t in &def.body {
                    if let TokenKind::Ident(pid) = t.kind {
                        if let Some(i) = params.iter().position(|p| *p == pid) {
                            out.extend(args.get(i).cloned().unwrap_or_default());
                            continue;
                        }
                    }
                    out.push(t.clone());
                }
                Ok(Some(out))
            }
        }
    }

    /// 関数マクロの実引数を収集（呼び出しの '(' は消費済み）
    fn collect_macro_args(&mut self) -> Result<Vec<Vec<Token>>> {
        let mut args: Vec<Vec<Token>> = vec![Vec::new()];
        let mut depth = 0usize;

        loop {
            let token = self.next_raw_token()?;
            match &token.kind {
                TokenKind::RParen if depth == 0 => break,
                TokenKind::Comma if depth == 0 => args.push(Vec::new()),
                TokenKind::LParen => {
                    depth += 1;
                    args.last_mut().unwrap().push(token);
                }
                TokenKind::RParen => {
                    depth -= 1;
                    args.last_mut().unwrap().push(token);
                }
                TokenKind::Newline | TokenKind::Eof => {
                    return Err(CompileError::Preprocess {
                        loc: token.loc,
                        kind: PPError::InvalidMacroArgs("unterminated macro arguments".to_string()),
                    });
                }
                _ => args.last_mut().unwrap().push(token),
            }
        }

        Ok(args)
    }

    // ========================================================================
    // 偽ブランチのスキップ
    // ========================================================================

    /// 現在のソース位置を取得
    fn current_source_location(&self) -> SourceLocation {
        self.sources
            .last()
            .map(|s| s.current_location())
            .unwrap_or_default()
    }

    /// スキップ領域をコールバックへ通知
    fn report_skipped(&mut self, range: SourceRange, condition: &Token) {
        if let Some(mut cb) = self.skip_callback.take() {
            cb.on_range_skipped(&range, condition, &self.files, &self.interner);
            self.skip_callback = Some(cb);
        }
    }

    /// 偽ブランチをスキップし、#else/#elif/#endif を処理
    ///
    /// スキップされた極大領域ごとに 1 回、コールバックへ通知する。
    /// `cond` は最初の領域の条件トークン。後続領域（#elif/#else 起点）
    /// の条件トークンはここで差し替える。
    fn skip_inactive_branch(&mut self, loc: SourceLocation, mut cond: Token, report: bool) -> Result<()> {
        loop {
            let begin = self.current_source_location();
            let (directive, hash_loc) = self.scan_skipped_region()?;

            if report {
                let range = SourceRange::new(begin, hash_loc.clone());
                self.report_skipped(range, &cond);
            }

            match directive.as_str() {
                "endif" => {
                    self.cond_stack.pop();
                    self.update_cond_active();
                    return Ok(());
                }
                "else" => {
                    let Some(state) = self.cond_stack.last_mut() else {
                        return Err(CompileError::Preprocess {
                            loc,
                            kind: PPError::UnmatchedElse,
                        });
                    };
                    if state.seen_else {
                        return Err(CompileError::Preprocess {
                            loc,
                            kind: PPError::UnmatchedElse,
                        });
                    }
                    state.seen_else = true;
                    if !state.seen_active {
                        state.active = true;
                        state.seen_active = true;
                        self.update_cond_active();
                        return Ok(());
                    }
                    // どのブランチも有効だったので else 側も偽。条件なし。
                    cond = Token::eof(hash_loc);
                }
                "elif" => {
                    let (seen_else, seen_active) = match self.cond_stack.last() {
                        Some(state) => (state.seen_else, state.seen_active),
                        None => {
                            return Err(CompileError::Preprocess {
                                loc,
                                kind: PPError::UnmatchedEndif,
                            });
                        }
                    };
                    if seen_else {
                        return Err(CompileError::Preprocess {
                            loc,
                            kind: PPError::ElifAfterElse,
                        });
                    }

                    if seen_active {
                        // 既に有効なブランチがあったので評価せずスキップ継続
                        let tokens = self.collect_to_eol()?;
                        cond = tokens
                            .first()
                            .cloned()
                            .unwrap_or_else(|| Token::eof(hash_loc));
                        continue;
                    }

                    // 条件を評価
                    let (tokens, first_raw) = self.collect_if_condition()?;
                    let active = {
                        let mut eval =
                            PPExprEvaluator::new(&tokens, &self.interner, &self.macros, loc.clone());
                        eval.evaluate()? != 0
                    };
                    if let Some(state) = self.cond_stack.last_mut() {
                        if active {
                            state.active = true;
                            state.seen_active = true;
                            self.update_cond_active();
                            return Ok(());
                        }
                    }
                    cond = first_raw.unwrap_or_else(|| Token::eof(hash_loc));
                }
                _ => unreachable!(),
            }
        }
    }

    /// 偽ブランチの1領域を文字レベルでスキャン（TinyCC方式）
    ///
    /// 同じ深さの #else/#elif/#endif を見つけるまで読み飛ばす。
    /// 戻り値は (終端ディレクティブ名, その '#' の位置)。
    /// "else"/"endif" ではディレクティブ行を行末まで消費する。
    /// "elif" では条件式が残るので行は消費しない。
    fn scan_skipped_region(&mut self) -> Result<(String, SourceLocation)> {
        let mut depth = 0i32;

        loop {
            let Some(source) = self.sources.last_mut() else {
                return Err(CompileError::Preprocess {
                    loc: SourceLocation::default(),
                    kind: PPError::MissingEndif,
                });
            };

            let mut at_line_start = source.is_at_line_start();

            loop {
                let c = match source.peek() {
                    Some(c) => c,
                    None => break, // このソースは終了、外側ループで次のソースへ
                };

                match c {
                    b' ' | b'\t' | b'\r' | 0x0C | 0x0B => {
                        source.advance();
                    }
                    b'\n' => {
                        source.advance();
                        at_line_start = true;
                    }
                    b'\\' => {
                        // 行継続
                        source.advance();
                        if source.peek() == Some(b'\n') {
                            source.advance();
                        } else if source.peek() == Some(b'\r') {
                            source.advance();
                            if source.peek() == Some(b'\n') {
                                source.advance();
                            }
                        }
                    }
                    b'"' | b'\'' => {
                        // 文字列・文字リテラルは中の # を無視するため丸ごと読む
                        let quote = c;
                        source.advance();
                        loop {
                            match source.peek() {
                                Some(c) if c == quote => {
                                    source.advance();
                                    break;
                                }
                                Some(b'\\') => {
                                    source.advance();
                                    source.advance();
                                }
                                Some(b'\n') | None => break,
                                Some(_) => {
                                    source.advance();
                                }
                            }
                        }
                        at_line_start = false;
                    }
                    b'/' => {
                        source.advance();
                        match source.peek() {
                            Some(b'/') => {
                                while source.peek().is_some_and(|c| c != b'\n') {
                                    source.advance();
                                }
                            }
                            Some(b'*') => {
                                source.advance();
                                loop {
                                    match (source.peek(), source.peek_n(1)) {
                                        (Some(b'*'), Some(b'/')) => {
                                            source.advance();
                                            source.advance();
                                            break;
                                        }
                                        (Some(_), _) => {
                                            source.advance();
                                        }
                                        (None, _) => break,
                                    }
                                }
                            }
                            _ => {}
                        }
                        at_line_start = false;
                    }
                    b'#' if at_line_start => {
                        let hash_loc = source.current_location();
                        source.advance();
                        while matches!(source.peek(), Some(b' ') | Some(b'\t')) {
                            source.advance();
                        }
                        let mut directive = String::new();
                        while let Some(c) = source.peek() {
                            if c.is_ascii_alphabetic() || c == b'_' {
                                directive.push(c as char);
                                source.advance();
                            } else {
                                break;
                            }
                        }

                        match directive.as_str() {
                            "if" | "ifdef" | "ifndef" => {
                                depth += 1;
                                Self::skip_line_raw(source);
                            }
                            "endif" => {
                                if depth == 0 {
                                    Self::skip_line_raw(source);
                                    return Ok(("endif".to_string(), hash_loc));
                                }
                                depth -= 1;
                                Self::skip_line_raw(source);
                            }
                            "else" if depth == 0 => {
                                Self::skip_line_raw(source);
                                return Ok(("else".to_string(), hash_loc));
                            }
                            "elif" if depth == 0 => {
                                // 条件式を読む必要があるので行は消費しない
                                return Ok(("elif".to_string(), hash_loc));
                            }
                            _ => {
                                Self::skip_line_raw(source);
                            }
                        }
                        at_line_start = source.is_at_line_start();
                    }
                    _ => {
                        source.advance();
                        at_line_start = false;
                    }
                }
            }

            // このソースが終了したら次のソースへ
            if self.sources.len() > 1 {
                self.sources.pop();
            } else {
                return Err(CompileError::Preprocess {
                    loc: SourceLocation::default(),
                    kind: PPError::MissingEndif,
                });
            }
        }
    }

    /// 行末まで文字レベルでスキップ（改行込み、ブロックコメントを考慮）
    fn skip_line_raw(source: &mut InputSource) {
        loop {
            match source.peek() {
                None => break,
                Some(b'\n') => {
                    source.advance();
                    break;
                }
                Some(b'/') => {
                    if source.peek_n(1) == Some(b'*') {
                        source.advance();
                        source.advance();
                        loop {
                            match (source.peek(), source.peek_n(1)) {
                                (Some(b'*'), Some(b'/')) => {
                                    source.advance();
                                    source.advance();
                                    break;
                                }
                                (Some(_), _) => {
                                    source.advance();
                                }
                                (None, _) => break,
                            }
                        }
                    } else if source.peek_n(1) == Some(b'/') {
                        while source.peek().is_some_and(|c| c != b'\n') {
                            source.advance();
                        }
                    } else {
                        source.advance();
                    }
                }
                Some(b'\\') => {
                    // 行継続
                    source.advance();
                    if source.peek() == Some(b'\n') {
                        source.advance();
                    } else if source.peek() == Some(b'\r') {
                        source.advance();
                        if source.peek() == Some(b'\n') {
                            source.advance();
                        }
                    }
                }
                Some(_) => {
                    source.advance();
                }
            }
        }
    }
}
