//! マクロ定義と管理
//!
//! Cプリプロセッサのマクロ定義を表現し、マクロテーブルで管理する。
//! 条件コンパイルの判定（#ifdef / defined / #if の展開）に必要な範囲のみ。

use std::collections::HashMap;

use crate::intern::InternedStr;
use crate::source::SourceLocation;
use crate::token::Token;

/// マクロ定義の種類
#[derive(Debug, Clone, PartialEq)]
pub enum MacroKind {
    /// オブジェクトマクロ: #define FOO value
    Object,
    /// 関数マクロ: #define FOO(a, b) ...
    Function {
        params: Vec<InternedStr>,
        is_variadic: bool,
    },
}

/// マクロ定義
#[derive(Debug, Clone)]
pub struct MacroDef {
    /// マクロ名
    pub name: InternedStr,
    /// マクロの種類
    pub kind: MacroKind,
    /// 置換トークン列
    pub body: Vec<Token>,
    /// 定義された位置
    pub def_loc: SourceLocation,
}

impl MacroDef {
    /// 新しいオブジェクトマクロを作成
    pub fn object(name: InternedStr, body: Vec<Token>, def_loc: SourceLocation) -> Self {
        Self {
            name,
            kind: MacroKind::Object,
            body,
            def_loc,
        }
    }

    /// 新しい関数マクロを作成
    pub fn function(
        name: InternedStr,
        params: Vec<InternedStr>,
        is_variadic: bool,
        body: Vec<Token>,
        def_loc: SourceLocation,
    ) -> Self {
        Self {
            name,
            kind: MacroKind::Function { params, is_variadic },
            body,
            def_loc,
        }
    }

    /// 関数マクロかどうか
    pub fn is_function(&self) -> bool {
        matches!(self.kind, MacroKind::Function { .. })
    }

    /// パラメータ数を取得（オブジェクトマクロなら0）
    pub fn param_count(&self) -> usize {
        match &self.kind {
            MacroKind::Object => 0,
            MacroKind::Function { params, .. } => params.len(),
        }
    }
}

/// マクロテーブル
#[derive(Debug, Default)]
pub struct MacroTable {
    macros: HashMap<InternedStr, MacroDef>,
}

impl MacroTable {
    /// 新しいマクロテーブルを作成
    pub fn new() -> Self {
        Self {
            macros: HashMap::new(),
        }
    }

    /// マクロを定義（既存の定義があれば返す）
    pub fn define(&mut self, def: MacroDef) -> Option<MacroDef> {
        self.macros.insert(def.name, def)
    }

    /// マクロを削除（削除された定義があれば返す）
    pub fn undefine(&mut self, name: InternedStr) -> Option<MacroDef> {
        self.macros.remove(&name)
    }

    /// マクロ定義を取得
    pub fn get(&self, name: InternedStr) -> Option<&MacroDef> {
        self.macros.get(&name)
    }

    /// マクロが定義されているかどうか
    pub fn is_defined(&self, name: InternedStr) -> bool {
        self.macros.contains_key(&name)
    }

    /// マクロ数を返す
    pub fn len(&self) -> usize {
        self.macros.len()
    }

    /// テーブルが空かどうか
    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::StringInterner;

    #[test]
    fn test_object_macro() {
        let mut interner = StringInterner::new();
        let name = interner.intern("FOO");

        let def = MacroDef::object(name, vec![], SourceLocation::default());
        assert!(!def.is_function());
        assert_eq!(def.param_count(), 0);
    }

    #[test]
    fn test_macro_table_define_undefine() {
        let mut interner = StringInterner::new();
        let mut table = MacroTable::new();

        let foo = interner.intern("FOO");
        let bar = interner.intern("BAR");

        assert!(table.define(MacroDef::object(foo, vec![], SourceLocation::default())).is_none());
        assert!(table.define(MacroDef::object(bar, vec![], SourceLocation::default())).is_none());
        assert_eq!(table.len(), 2);
        assert!(table.is_defined(foo));

        // 再定義は旧定義を返す
        let old = table.define(MacroDef::object(foo, vec![], SourceLocation::default()));
        assert!(old.is_some());
        assert_eq!(table.len(), 2);

        assert!(table.undefine(foo).is_some());
        assert!(!table.is_defined(foo));
    }
}
