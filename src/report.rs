//! 翻訳単位ごとの処理レポート
//!
//! --json 指定時に出力する機械可読のサマリ。

use serde::Serialize;

use crate::attributor::AttributionResult;
use crate::intern::StringInterner;
use crate::skips::SkippedBlock;

/// スキップ領域1件のレポート
#[derive(Debug, Clone, Serialize)]
pub struct BlockReport {
    pub begin_line: u32,
    pub begin_col: u32,
    pub end_line: u32,
    pub end_col: u32,
    pub condition: String,
    pub content: String,
    /// 帰属先の関数名（包含関数がなければ null）
    pub attributed_to: Option<String>,
    pub payload: String,
}

/// マーカー1件のレポート
#[derive(Debug, Clone, Serialize)]
pub struct MarkerReport {
    pub name: String,
    pub payload: String,
}

/// 翻訳単位1つ分のレポート
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub file: String,
    pub blocks: Vec<BlockReport>,
    pub markers: Vec<MarkerReport>,
}

impl UnitReport {
    /// レポートを構築する
    ///
    /// `result.markers` / `result.attributed` は `blocks` と同じ順・
    /// 同じ長さであることが前提。
    pub fn build(
        file: String,
        blocks: &[SkippedBlock],
        result: &AttributionResult,
        interner: &StringInterner,
    ) -> Self {
        let blocks = blocks
            .iter()
            .zip(result.markers.iter().zip(result.attributed.iter()))
            .map(|(block, (marker, attributed))| BlockReport {
                begin_line: block.begin_line,
                begin_col: block.begin_col,
                end_line: block.end_line,
                end_col: block.end_col,
                condition: block.condition.clone(),
                content: block.content.clone(),
                attributed_to: attributed.map(|name| interner.get(name).to_string()),
                payload: marker.payload.clone(),
            })
            .collect();

        let markers = result
            .markers
            .iter()
            .map(|m| MarkerReport {
                name: m.name.clone(),
                payload: m.payload.clone(),
            })
            .collect();

        Self {
            file,
            blocks,
            markers,
        }
    }

    /// JSON文字列に変換
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
