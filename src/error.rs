use crate::source::{FileRegistry, SourceLocation};
use crate::token::TokenKind;
use std::fmt;
use std::path::PathBuf;

/// エラー表示用のロケーション（ファイル名解決付き）
pub struct DisplayLocation<'a> {
    pub loc: &'a SourceLocation,
    pub files: &'a FileRegistry,
}

impl<'a> fmt::Display for DisplayLocation<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.files.get_path(self.loc.file_id);
        write!(f, "{}:{}:{}", path.display(), self.loc.line, self.loc.column)
    }
}

/// レキサーエラー
#[derive(Debug)]
pub enum LexError {
    /// 閉じられていないブロックコメント
    UnterminatedComment,
    /// 閉じられていない文字列リテラル
    UnterminatedString,
    /// 閉じられていない文字リテラル
    UnterminatedChar,
    /// 不正な文字
    InvalidChar(char),
    /// 不正な数値リテラル
    InvalidNumber(String),
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::UnterminatedComment => write!(f, "unterminated block comment"),
            LexError::UnterminatedString => write!(f, "unterminated string literal"),
            LexError::UnterminatedChar => write!(f, "unterminated character literal"),
            LexError::InvalidChar(c) => write!(f, "invalid character: {:?}", c),
            LexError::InvalidNumber(s) => write!(f, "invalid number: {}", s),
        }
    }
}

/// プリプロセッサエラー
#[derive(Debug)]
pub enum PPError {
    /// 不正なディレクティブ
    InvalidDirective(String),
    /// インクルードファイルが見つからない
    IncludeNotFound(PathBuf),
    /// 対応する#ifがない#endif
    UnmatchedEndif,
    /// 対応する#endifがない
    MissingEndif,
    /// 対応する#elseがない
    UnmatchedElse,
    /// #elifが#elseの後に出現
    ElifAfterElse,
    /// 不正なマクロ引数
    InvalidMacroArgs(String),
    /// #if の条件式エラー
    InvalidCondition(String),
    /// ファイル読み込みエラー
    IoError(PathBuf, String),
}

impl fmt::Display for PPError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PPError::InvalidDirective(s) => write!(f, "invalid directive: #{}", s),
            PPError::IncludeNotFound(p) => write!(f, "include file not found: {}", p.display()),
            PPError::UnmatchedEndif => write!(f, "#endif without matching #if"),
            PPError::MissingEndif => write!(f, "missing #endif"),
            PPError::UnmatchedElse => write!(f, "#else without matching #if"),
            PPError::ElifAfterElse => write!(f, "#elif after #else"),
            PPError::InvalidMacroArgs(s) => write!(f, "invalid macro arguments: {}", s),
            PPError::InvalidCondition(s) => write!(f, "invalid preprocessor condition: {}", s),
            PPError::IoError(p, e) => write!(f, "I/O error reading {}: {}", p.display(), e),
        }
    }
}

/// パースエラー
#[derive(Debug)]
pub enum ParseError {
    /// 予期しないトークン
    UnexpectedToken { expected: String, found: TokenKind },
    /// 予期しないファイル終端（閉じられていない波括弧など）
    UnexpectedEof,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnexpectedToken { expected, found } => {
                write!(f, "expected {}, found {:?}", expected, found)
            }
            ParseError::UnexpectedEof => write!(f, "unexpected end of file"),
        }
    }
}

/// 統合エラー型
#[derive(Debug)]
pub enum CompileError {
    /// レキサーエラー
    Lex { loc: SourceLocation, kind: LexError },
    /// プリプロセッサエラー
    Preprocess { loc: SourceLocation, kind: PPError },
    /// パースエラー
    Parse { loc: SourceLocation, kind: ParseError },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Lex { loc, kind } => {
                write!(f, "{}:{}:{}: lexer error: {}", loc.file_id.as_u32(), loc.line, loc.column, kind)
            }
            CompileError::Preprocess { loc, kind } => {
                write!(f, "{}:{}:{}: preprocessor error: {}", loc.file_id.as_u32(), loc.line, loc.column, kind)
            }
            CompileError::Parse { loc, kind } => {
                write!(f, "{}:{}:{}: parse error: {}", loc.file_id.as_u32(), loc.line, loc.column, kind)
            }
        }
    }
}

impl std::error::Error for CompileError {}

impl CompileError {
    /// エラーが発生した位置を取得
    pub fn loc(&self) -> &SourceLocation {
        match self {
            CompileError::Lex { loc, .. } => loc,
            CompileError::Preprocess { loc, .. } => loc,
            CompileError::Parse { loc, .. } => loc,
        }
    }

    /// ファイル名を解決してエラーメッセージをフォーマット
    pub fn format_with_files(&self, files: &FileRegistry) -> String {
        match self {
            CompileError::Lex { loc, kind } => {
                let disp = DisplayLocation { loc, files };
                format!("{}: lexer error: {}", disp, kind)
            }
            CompileError::Preprocess { loc, kind } => {
                let disp = DisplayLocation { loc, files };
                format!("{}: preprocessor error: {}", disp, kind)
            }
            CompileError::Parse { loc, kind } => {
                let disp = DisplayLocation { loc, files };
                format!("{}: parse error: {}", disp, kind)
            }
        }
    }
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FileId;
    use std::path::PathBuf;

    #[test]
    fn test_pp_error_display() {
        let err = PPError::MissingEndif;
        assert_eq!(format!("{}", err), "missing #endif");
    }

    #[test]
    fn test_format_with_files() {
        let mut files = FileRegistry::new();
        let id = files.register(PathBuf::from("test.c"), Vec::new());
        let err = CompileError::Lex {
            loc: SourceLocation::new(id, 10, 5, 0),
            kind: LexError::InvalidChar('$'),
        };
        let msg = err.format_with_files(&files);
        assert!(msg.starts_with("test.c:10:5"));
        assert!(msg.contains("invalid character"));
    }
}
