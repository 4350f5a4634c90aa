//! 関数目録
//!
//! 翻訳単位から本体を持つ関数定義をソース順に集める。帰属処理は
//! この順序で最初に包含する関数を選ぶので、順序が意味を持つ。

use crate::ast::TranslationUnit;
use crate::intern::InternedStr;
use crate::source::SourceRange;

/// 目録に載る関数1件
#[derive(Debug, Clone)]
pub struct FunctionRecord {
    /// 翻訳単位内の出現順インデックス
    pub index: usize,
    /// 関数名
    pub name: InternedStr,
    /// 本体の範囲
    pub body: SourceRange,
}

/// 翻訳単位から関数目録を構築する
pub fn build(tu: &TranslationUnit) -> Vec<FunctionRecord> {
    tu.functions()
        .enumerate()
        .map(|(index, f)| FunctionRecord {
            index,
            name: f.name,
            body: f.body.clone(),
        })
        .collect()
}
