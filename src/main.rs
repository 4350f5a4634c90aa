//! Inactive Code Tracker CLI
//!
//! 条件コンパイルでスキップされた領域を収集し、注釈済みソースと
//! レポートを出力する

use std::path::PathBuf;

use clap::Parser as ClapParser;
use inactive_code_tracker::{Tracker, TrackerConfig, UnitOutcome};

/// コマンドライン引数
#[derive(ClapParser)]
#[command(name = "inactive-code-tracker")]
#[command(version, about = "Track #if/#ifdef-skipped code regions in C sources")]
struct Cli {
    /// 入力Cファイル（複数指定可、翻訳単位ごとに独立して処理）
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// インクルードパス (-I)
    #[arg(short = 'I', long = "include")]
    include: Vec<PathBuf>,

    /// マクロ定義 (-D NAME または -D NAME=VALUE)
    #[arg(short = 'D', long = "define")]
    define: Vec<String>,

    /// 注釈済みソースの出力ディレクトリ（省略時は入力の隣）
    #[arg(short = 'o', long = "output-dir")]
    output_dir: Option<PathBuf>,

    /// レポートをJSONで標準出力に出す
    #[arg(long = "json")]
    json: bool,

    /// プリプロセッサデバッグ出力
    #[arg(long = "debug-pp")]
    debug_pp: bool,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = TrackerConfig {
        include_paths: cli.include.clone(),
        defines: cli.define.iter().map(|d| parse_define(d)).collect(),
        output_dir: cli.output_dir.clone(),
        debug_pp: cli.debug_pp,
    };
    let tracker = Tracker::new(config);

    // 翻訳単位ごとに処理し、失敗しても残りの単位は続行する
    let mut failed = 0usize;
    for input in &cli.inputs {
        match tracker.run_unit(input) {
            Ok(outcome) => {
                if cli.json {
                    println!("{}", outcome.report.to_json()?);
                } else {
                    print_summary(&outcome);
                }
            }
            Err(e) => {
                eprintln!("{}: {}", input.display(), e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(format!("{} translation unit(s) failed", failed).into());
    }

    Ok(())
}

/// -D NAME=VALUE を分解する（VALUE省略時はNone）
fn parse_define(arg: &str) -> (String, Option<String>) {
    match arg.split_once('=') {
        Some((name, value)) => (name.to_string(), Some(value.to_string())),
        None => (arg.to_string(), None),
    }
}

/// 人間向けのサマリを出力
fn print_summary(outcome: &UnitOutcome) {
    let report = &outcome.report;
    println!(
        "{}: {} inactive block(s), {} marker(s) -> {}",
        report.file,
        report.blocks.len(),
        report.markers.len(),
        outcome.output_path.display()
    );
    for (block, marker) in report.blocks.iter().zip(report.markers.iter()) {
        let target = block.attributed_to.as_deref().unwrap_or("<file scope>");
        println!(
            "  {}:{}-{}:{} [{}] -> {} ({})",
            block.begin_line, block.begin_col, block.end_line, block.end_col,
            block.condition, target, marker.name
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_define() {
        assert_eq!(parse_define("DEBUG"), ("DEBUG".to_string(), None));
        assert_eq!(
            parse_define("VERSION=2"),
            ("VERSION".to_string(), Some("2".to_string()))
        );
        assert_eq!(
            parse_define("MSG=a=b"),
            ("MSG".to_string(), Some("a=b".to_string()))
        );
    }
}
