//! 帰属とマーカー生成
//!
//! 各スキップ領域を、それを字句的に包含する関数（目録順で最初の
//! もの）へ帰属させ、関数にアノテーションを付ける。包含関数の有無に
//! かかわらず、領域ごとにファイルスコープのマーカーを1つ生成する。

use crate::ast::{Annotation, TranslationUnit};
use crate::intern::InternedStr;
use crate::inventory::FunctionRecord;
use crate::skips::SkippedBlock;

/// ファイル末尾に挿入されるマーカースタブ
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    /// マーカー関数名（marker_0, marker_1, ...）
    pub name: String,
    /// annotate属性のペイロード
    pub payload: String,
}

/// 帰属の結果
#[derive(Debug, Clone)]
pub struct AttributionResult {
    /// 領域ごとのマーカー（領域と同じ順）
    pub markers: Vec<Marker>,
    /// 領域ごとの帰属先関数名（包含関数がなければ None）
    pub attributed: Vec<Option<InternedStr>>,
}

/// スキップ領域のペイロード文字列を構築する
///
/// 形式: `inactive_block: <file>:<bl>:<bc>-<el>:<ec>[ condition=<c>][ code=<content>]`
pub fn build_payload(block: &SkippedBlock) -> String {
    let mut payload = format!(
        "inactive_block: {}:{}:{}-{}:{}",
        block.file, block.begin_line, block.begin_col, block.end_line, block.end_col
    );
    if !block.condition.is_empty() {
        payload.push_str(" condition=");
        payload.push_str(&block.condition);
    }
    if !block.content.is_empty() {
        payload.push_str(" code=");
        payload.push_str(&block.content);
    }
    payload
}

/// 領域が関数本体に包含されるか
///
/// 包含は行・列の順序で判定する: 領域の開始が本体の開始より前でなく、
/// 本体の終了が領域の終了より前でないこと。
fn contains(body: &FunctionRecord, block: &SkippedBlock) -> bool {
    let body_begin = &body.body.begin;
    let body_end = &body.body.end;
    let block_begin = &block.range.begin;
    let block_end = &block.range.end;

    if body_begin.file_id != block_begin.file_id {
        return false;
    }

    !block_begin.is_before(body_begin) && !body_end.is_before(block_end)
}

/// 領域を関数に帰属させ、マーカーを生成する
///
/// マーカー名の連番は翻訳単位ごとに 0 から始まる。帰属した領域の
/// ペイロードは包含関数のアノテーションとしても記録される。
pub fn attribute(tu: &mut TranslationUnit, blocks: &[SkippedBlock]) -> AttributionResult {
    let inventory = crate::inventory::build(tu);

    let mut markers = Vec::with_capacity(blocks.len());
    let mut attributed = Vec::with_capacity(blocks.len());

    for (marker_idx, block) in blocks.iter().enumerate() {
        let payload = build_payload(block);

        // 目録順で最初に包含する関数へ帰属
        let containing = inventory.iter().find(|f| contains(f, block));

        if let Some(record) = containing {
            if let Some(func) = tu.functions_mut().nth(record.index) {
                func.annotations.push(Annotation {
                    payload: payload.clone(),
                    anchor: func.loc.clone(),
                });
            }
            attributed.push(Some(record.name));
        } else {
            attributed.push(None);
        }

        markers.push(Marker {
            name: format!("marker_{}", marker_idx),
            payload,
        });
    }

    AttributionResult { markers, attributed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{FileId, SourceLocation, SourceRange};

    fn block_at(bl: u32, bc: u32, el: u32, ec: u32) -> SkippedBlock {
        let file_id = FileId::default();
        SkippedBlock {
            range: SourceRange::new(
                SourceLocation::new(file_id, bl, bc, 0),
                SourceLocation::new(file_id, el, ec, 0),
            ),
            file: "test.c".to_string(),
            begin_line: bl,
            begin_col: bc,
            end_line: el,
            end_col: ec,
            condition: String::new(),
            content: String::new(),
        }
    }

    #[test]
    fn test_build_payload_full() {
        let mut block = block_at(3, 1, 5, 1);
        block.condition = "DEBUG_MODE".to_string();
        block.content = "x_=_1;".to_string();
        assert_eq!(
            build_payload(&block),
            "inactive_block: test.c:3:1-5:1 condition=DEBUG_MODE code=x_=_1;"
        );
    }

    #[test]
    fn test_build_payload_omits_empty_fields() {
        let block = block_at(3, 1, 5, 1);
        assert_eq!(build_payload(&block), "inactive_block: test.c:3:1-5:1");

        let mut with_cond = block_at(3, 1, 5, 1);
        with_cond.condition = "X".to_string();
        assert_eq!(
            build_payload(&with_cond),
            "inactive_block: test.c:3:1-5:1 condition=X"
        );
    }

    #[test]
    fn test_contains_boundaries() {
        use crate::intern::StringInterner;
        let mut interner = StringInterner::new();
        let file_id = FileId::default();
        let record = FunctionRecord {
            index: 0,
            name: interner.intern("f"),
            body: SourceRange::new(
                SourceLocation::new(file_id, 2, 13, 0),
                SourceLocation::new(file_id, 10, 1, 0),
            ),
        };

        // 本体内
        assert!(contains(&record, &block_at(4, 1, 6, 1)));
        // 開始位置が本体の開始と一致（包含は両端を含む）
        assert!(contains(&record, &block_at(2, 13, 6, 1)));
        // 終了位置が本体の終了と一致
        assert!(contains(&record, &block_at(4, 1, 10, 1)));
        // 本体範囲そのものと一致（反射性）
        assert!(contains(&record, &block_at(2, 13, 10, 1)));
        // 本体の手前から始まる
        assert!(!contains(&record, &block_at(1, 1, 6, 1)));
        // 本体の後ろで終わる
        assert!(!contains(&record, &block_at(4, 1, 11, 1)));
    }
}
