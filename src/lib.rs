//! Inactive Code Tracker
//!
//! Cソースの条件コンパイル（#if/#ifdef/#ifndef/#else）でスキップされた
//! 領域を記録し、各領域を字句的に包含する関数へ帰属させ、機械可読の
//! マーカーとして残すツール。

pub mod ast;
pub mod attributor;
pub mod error;
pub mod intern;
pub mod inventory;
pub mod macro_def;
pub mod parser;
pub mod pipeline;
pub mod pp_expr;
pub mod preprocessor;
pub mod report;
pub mod rewriter;
pub mod skips;
pub mod source;
pub mod token;

// 主要な型を再エクスポート
pub use ast::{Annotation, ExternalDecl, FunctionDef, TranslationUnit};
pub use attributor::{attribute, build_payload, AttributionResult, Marker};
pub use error::{CompileError, DisplayLocation, LexError, PPError, ParseError, Result};
pub use intern::{InternedStr, StringInterner};
pub use inventory::FunctionRecord;
pub use macro_def::{MacroDef, MacroKind, MacroTable};
pub use parser::Parser;
pub use pipeline::{PipelineError, Tracker, TrackerBuilder, TrackerConfig, UnitOutcome};
pub use preprocessor::{PPConfig, Preprocessor, SkipCallback};
pub use report::{BlockReport, MarkerReport, UnitReport};
pub use skips::{classify_condition, sanitize_content, SkipCollector, SkippedBlock};
pub use source::{FileId, FileRegistry, SourceLocation, SourceRange};
pub use token::{Token, TokenKind};

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    #[test]
    fn test_end_to_end_skip_collection() {
        let mut file = NamedTempFile::with_suffix(".c").unwrap();
        file.write_all(
            b"int add(int a, int b) {\n\
              #ifdef DEBUG_MODE\n\
                  log(a, b);\n\
              #endif\n\
                  return a + b;\n\
              }\n",
        )
        .unwrap();

        let mut pp = Preprocessor::new(PPConfig::default());
        let main_file = pp.process_file(file.path()).unwrap();
        pp.set_skip_callback(Box::new(SkipCollector::new(main_file)));

        let mut tu = Parser::new(&mut pp).parse(main_file).unwrap();

        let blocks = pp
            .take_skip_callback()
            .unwrap()
            .into_any()
            .downcast::<SkipCollector>()
            .unwrap()
            .into_blocks();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].condition, "DEBUG_MODE");

        let result = attribute(&mut tu, &blocks);
        assert_eq!(result.markers.len(), 1);
        assert_eq!(result.markers[0].name, "marker_0");
        assert_eq!(
            result.attributed[0].map(|n| pp.interner().get(n).to_string()),
            Some("add".to_string())
        );
    }
}
