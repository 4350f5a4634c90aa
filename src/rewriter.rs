//! ソース書き換え
//!
//! 元のソースに2種類の挿入を行う:
//! - 帰属した関数の定義先頭に `__attribute__((annotate("...")))` を付ける
//! - ファイル末尾に領域ごとのマーカースタブを追加する
//!
//! マーカーには `used` 属性が付くので、後段の最適化を越えて領域情報が
//! オブジェクトまで残る。

use crate::ast::TranslationUnit;
use crate::attributor::Marker;

/// C文字列リテラル向けにエスケープ
fn escape_c_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}

/// マーカースタブ1つ分のテキストを構築
fn marker_stub(marker: &Marker) -> String {
    format!(
        "__attribute__((annotate(\"{}\"), used)) static void {}(void) {{ }}\n",
        escape_c_string(&marker.payload),
        marker.name
    )
}

/// 注釈済みソースを構築する
///
/// `source` は主入力ファイルの元のバイト列。挿入位置は翻訳単位の
/// アノテーションのアンカー（関数定義の先頭オフセット）を使う。
pub fn rewrite(source: &[u8], tu: &TranslationUnit, markers: &[Marker]) -> Vec<u8> {
    // (オフセット, 挿入テキスト) を集めてオフセット順に適用する
    let mut insertions: Vec<(usize, String)> = Vec::new();

    for func in tu.functions() {
        for ann in &func.annotations {
            let text = format!(
                "__attribute__((annotate(\"{}\"))) ",
                escape_c_string(&ann.payload)
            );
            insertions.push((ann.anchor.offset as usize, text));
        }
    }

    insertions.sort_by_key(|(offset, _)| *offset);

    let mut out = Vec::with_capacity(source.len() + 256 * (insertions.len() + markers.len()));
    let mut pos = 0usize;

    for (offset, text) in insertions {
        let offset = offset.min(source.len());
        out.extend_from_slice(&source[pos..offset]);
        out.extend_from_slice(text.as_bytes());
        pos = offset;
    }
    out.extend_from_slice(&source[pos..]);

    // 末尾が改行で終わっていなければ補う
    if !out.is_empty() && !out.ends_with(b"\n") {
        out.push(b'\n');
    }

    for marker in markers {
        out.extend_from_slice(marker_stub(marker).as_bytes());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Annotation, ExternalDecl, FunctionDef};
    use crate::intern::StringInterner;
    use crate::source::{FileId, SourceLocation, SourceRange};

    #[test]
    fn test_escape_c_string() {
        assert_eq!(escape_c_string("plain"), "plain");
        assert_eq!(escape_c_string("a\"b\\c"), "a\\\"b\\\\c");
    }

    #[test]
    fn test_marker_stub_format() {
        let marker = Marker {
            name: "marker_0".to_string(),
            payload: "inactive_block: t.c:1:1-2:1".to_string(),
        };
        assert_eq!(
            marker_stub(&marker),
            "__attribute__((annotate(\"inactive_block: t.c:1:1-2:1\"), used)) static void marker_0(void) { }\n"
        );
    }

    #[test]
    fn test_rewrite_inserts_annotation_and_markers() {
        let source = b"int f(void) { return 0; }\n";
        let file_id = FileId::default();
        let mut interner = StringInterner::new();

        let mut tu = TranslationUnit::new(file_id);
        tu.decls.push(ExternalDecl::FunctionDef(FunctionDef {
            name: interner.intern("f"),
            loc: SourceLocation::new(file_id, 1, 1, 0),
            body: SourceRange::new(
                SourceLocation::new(file_id, 1, 13, 12),
                SourceLocation::new(file_id, 1, 25, 24),
            ),
            annotations: vec![Annotation {
                payload: "inactive_block: t.c:1:1-2:1".to_string(),
                anchor: SourceLocation::new(file_id, 1, 1, 0),
            }],
        }));

        let markers = vec![Marker {
            name: "marker_0".to_string(),
            payload: "inactive_block: t.c:1:1-2:1".to_string(),
        }];

        let out = rewrite(source, &tu, &markers);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with(
            "__attribute__((annotate(\"inactive_block: t.c:1:1-2:1\"))) int f(void)"
        ));
        assert!(text.ends_with(
            "static void marker_0(void) { }\n"
        ));
    }

    #[test]
    fn test_rewrite_without_changes_is_identity() {
        let source = b"int x = 1;\n";
        let tu = TranslationUnit::new(FileId::default());
        let out = rewrite(source, &tu, &[]);
        assert_eq!(out, source);
    }
}
