//! 翻訳単位の構文木
//!
//! 完全なC構文木ではなく、インアクティブ領域の帰属に必要な範囲に
//! 限定した外部宣言のリスト。関数定義は名前と本体の範囲を持ち、
//! それ以外のトップレベル宣言は位置のみを記録する。

use crate::intern::InternedStr;
use crate::source::{FileId, SourceLocation, SourceRange};

/// 関数に付与されるアノテーション
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// annotate属性のペイロード文字列
    pub payload: String,
    /// 挿入位置（関数定義の先頭）
    pub anchor: SourceLocation,
}

/// 関数定義
#[derive(Debug, Clone)]
pub struct FunctionDef {
    /// 関数名
    pub name: InternedStr,
    /// 定義の先頭位置（戻り値型の開始）
    pub loc: SourceLocation,
    /// 本体の範囲（開き波括弧から閉じ波括弧まで）
    pub body: SourceRange,
    /// 帰属によって付与されたアノテーション
    pub annotations: Vec<Annotation>,
}

/// 外部宣言
#[derive(Debug, Clone)]
pub enum ExternalDecl {
    /// 本体を持つ関数定義
    FunctionDef(FunctionDef),
    /// その他のトップレベル宣言（変数、typedef、プロトタイプ等）
    Other(SourceLocation),
}

/// 翻訳単位
#[derive(Debug, Clone)]
pub struct TranslationUnit {
    /// 外部宣言のリスト（ソース順）
    pub decls: Vec<ExternalDecl>,
    /// 主入力ファイル
    pub main_file: FileId,
}

impl TranslationUnit {
    /// 新しい翻訳単位を作成
    pub fn new(main_file: FileId) -> Self {
        Self {
            decls: Vec::new(),
            main_file,
        }
    }

    /// 関数定義のイテレータ（ソース順）
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDef> {
        self.decls.iter().filter_map(|d| match d {
            ExternalDecl::FunctionDef(f) => Some(f),
            ExternalDecl::Other(_) => None,
        })
    }

    /// 関数定義の可変イテレータ（ソース順）
    pub fn functions_mut(&mut self) -> impl Iterator<Item = &mut FunctionDef> {
        self.decls.iter_mut().filter_map(|d| match d {
            ExternalDecl::FunctionDef(f) => Some(f),
            ExternalDecl::Other(_) => None,
        })
    }
}
