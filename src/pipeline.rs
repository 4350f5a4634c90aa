//! Pipeline API for inactive-code-tracker
//!
//! 翻訳単位ごとの処理フェーズ:
//! 1. Preprocess: 条件コンパイルを評価しながらスキップ領域を収集
//! 2. Parse: トップレベル宣言を認識して関数目録を作る
//! 3. Attribute: 領域を包含関数へ帰属させマーカーを生成
//! 4. Rewrite: 注釈済みソースを書き出す
//!
//! # 使用例
//!
//! ```ignore
//! use inactive_code_tracker::Tracker;
//!
//! let tracker = Tracker::builder()
//!     .with_include("include")
//!     .with_define("NDEBUG", None::<String>)
//!     .build();
//! let outcome = tracker.run_unit(Path::new("main.c"))?;
//! println!("{} blocks", outcome.report.blocks.len());
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::attributor;
use crate::parser::Parser;
use crate::preprocessor::{PPConfig, Preprocessor};
use crate::report::UnitReport;
use crate::rewriter;
use crate::skips::SkipCollector;

// ============================================================================
// Error types
// ============================================================================

/// Pipeline 実行時のエラー
///
/// 失敗は翻訳単位単位で致命的（その単位はマーカーを生成しない）だが、
/// 呼び出し側は次の単位の処理を続行できる。
#[derive(Debug)]
pub enum PipelineError {
    /// プリプロセス/パースエラー（ファイル名・位置込みで整形済み）
    Compile { message: String },
    /// I/O エラー
    Io(std::io::Error),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Compile { message } => write!(f, "Compile error: {}", message),
            PipelineError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Compile { .. } => None,
            PipelineError::Io(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Io(e)
    }
}

// ============================================================================
// Config
// ============================================================================

/// Tracker の設定
#[derive(Debug, Clone, Default)]
pub struct TrackerConfig {
    /// インクルードパス (-I)
    pub include_paths: Vec<PathBuf>,
    /// プリプロセッサ定義 (-D)、指定順
    pub defines: Vec<(String, Option<String>)>,
    /// 注釈済みソースの出力先（省略時は入力の隣に <stem>.annotated.<ext>）
    pub output_dir: Option<PathBuf>,
    /// プリプロセッサデバッグ出力
    pub debug_pp: bool,
}

impl TrackerConfig {
    /// PPConfig に変換
    pub(crate) fn to_pp_config(&self) -> PPConfig {
        PPConfig {
            include_paths: self.include_paths.clone(),
            predefined: self.defines.clone(),
            debug_pp: self.debug_pp,
        }
    }
}

// ============================================================================
// TrackerBuilder
// ============================================================================

/// Tracker を構築するための Builder
#[derive(Debug, Default)]
pub struct TrackerBuilder {
    config: TrackerConfig,
}

impl TrackerBuilder {
    /// 空の Builder を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// インクルードパスを追加 (-I)
    pub fn with_include(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.include_paths.push(path.into());
        self
    }

    /// マクロ定義を追加 (-D)
    pub fn with_define(mut self, name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        self.config.defines.push((name.into(), value.map(|v| v.into())));
        self
    }

    /// 出力ディレクトリを設定 (-o)
    pub fn with_output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(path.into());
        self
    }

    /// プリプロセッサデバッグ出力を有効にする
    pub fn with_debug_pp(mut self, enabled: bool) -> Self {
        self.config.debug_pp = enabled;
        self
    }

    /// Tracker を構築
    pub fn build(self) -> Tracker {
        Tracker {
            config: self.config,
        }
    }
}

// ============================================================================
// Tracker
// ============================================================================

/// 翻訳単位1つ分の処理結果
#[derive(Debug)]
pub struct UnitOutcome {
    /// 処理レポート
    pub report: UnitReport,
    /// 注釈済みソースの書き出し先
    pub output_path: PathBuf,
}

/// インアクティブ領域トラッカ
///
/// 状態（マクロテーブル、スキップ領域、マーカー連番）はすべて
/// run_unit の内部で翻訳単位ごとに作り直される。
#[derive(Debug, Clone)]
pub struct Tracker {
    config: TrackerConfig,
}

impl Tracker {
    /// Builder を作成
    pub fn builder() -> TrackerBuilder {
        TrackerBuilder::new()
    }

    /// 設定から直接作成
    pub fn new(config: TrackerConfig) -> Self {
        Self { config }
    }

    /// 翻訳単位を1つ処理する
    pub fn run_unit(&self, input: &Path) -> Result<UnitOutcome, PipelineError> {
        let mut pp = Preprocessor::new(self.config.to_pp_config());

        let main_file = pp
            .process_file(input)
            .map_err(|e| PipelineError::Compile {
                message: e.format_with_files(pp.files()),
            })?;

        pp.set_skip_callback(Box::new(SkipCollector::new(main_file)));

        // パース失敗はこの単位にとって致命的（マーカーは生成されない）
        let mut tu = Parser::new(&mut pp)
            .parse(main_file)
            .map_err(|e| PipelineError::Compile {
                message: e.format_with_files(pp.files()),
            })?;

        let blocks = match pp.take_skip_callback() {
            Some(cb) => match cb.into_any().downcast::<SkipCollector>() {
                Ok(collector) => collector.into_blocks(),
                Err(_) => Vec::new(),
            },
            None => Vec::new(),
        };

        let result = attributor::attribute(&mut tu, &blocks);

        let source = pp.files().source(main_file).to_vec();
        let rewritten = rewriter::rewrite(&source, &tu, &result.markers);

        let output_path = self.output_path_for(input);
        if let Some(dir) = output_path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&output_path, &rewritten)?;

        let report = UnitReport::build(
            input.display().to_string(),
            &blocks,
            &result,
            pp.interner(),
        );

        Ok(UnitOutcome {
            report,
            output_path,
        })
    }

    /// 注釈済みソースの出力先を決める
    fn output_path_for(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "out".to_string());
        let name = match input.extension() {
            Some(ext) => format!("{}.annotated.{}", stem, ext.to_string_lossy()),
            None => format!("{}.annotated", stem),
        };

        match &self.config.output_dir {
            Some(dir) => dir.join(name),
            None => input.with_file_name(name),
        }
    }
}
