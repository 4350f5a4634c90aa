//! End-to-end tracker tests: annotation, markers, rewritten output

use std::fs;
use std::path::Path;

use inactive_code_tracker::{Tracker, UnitOutcome};

/// Helper: run the tracker on a source written into a temp dir
fn run_source(name: &str, source: &str) -> (UnitOutcome, String, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join(name);
    fs::write(&input, source).unwrap();

    let tracker = Tracker::builder()
        .with_output_dir(dir.path().join("out"))
        .build();
    let outcome = tracker.run_unit(&input).unwrap();
    let rewritten = fs::read_to_string(&outcome.output_path).unwrap();
    (outcome, rewritten, dir)
}

#[test]
fn test_block_inside_function_is_attributed() {
    let source = "\
int add(int a, int b) {
#ifdef DEBUG_MODE
    log_call(a, b);
#endif
    return a + b;
}
";
    let (outcome, rewritten, dir) = run_source("add.c", source);
    let report = &outcome.report;

    assert_eq!(report.blocks.len(), 1);
    assert_eq!(report.markers.len(), 1);
    assert_eq!(report.blocks[0].attributed_to.as_deref(), Some("add"));
    assert_eq!(report.markers[0].name, "marker_0");

    let input = dir.path().join("add.c");
    let expected_payload = format!(
        "inactive_block: {}:3:1-4:1 condition=DEBUG_MODE code=_log_call(a,_b);_",
        input.display()
    );
    assert_eq!(report.markers[0].payload, expected_payload);

    // 関数定義の先頭にアノテーションが挿入される
    assert!(rewritten.starts_with(&format!(
        "__attribute__((annotate(\"{}\"))) int add",
        expected_payload
    )));
    // ファイル末尾にマーカーが追加される
    assert!(rewritten.ends_with(&format!(
        "__attribute__((annotate(\"{}\"), used)) static void marker_0(void) {{ }}\n",
        expected_payload
    )));
}

#[test]
fn test_blocks_in_two_functions() {
    let source = "\
int add(int a, int b) {
#ifdef DEBUG_MODE
    trace(a);
#endif
    return a + b;
}

int multiply(int a, int b) {
#ifdef VERBOSE
    dump(a, b);
#endif
    return a * b;
}
";
    let (outcome, rewritten, _dir) = run_source("math.c", source);
    let report = &outcome.report;

    assert_eq!(report.blocks.len(), 2);
    assert_eq!(report.blocks[0].attributed_to.as_deref(), Some("add"));
    assert_eq!(report.blocks[0].condition, "DEBUG_MODE");
    assert_eq!(report.blocks[1].attributed_to.as_deref(), Some("multiply"));
    assert_eq!(report.blocks[1].condition, "VERBOSE");
    assert_eq!(report.markers[0].name, "marker_0");
    assert_eq!(report.markers[1].name, "marker_1");

    // 両方の関数にアノテーションが付く
    assert_eq!(rewritten.matches("__attribute__((annotate(").count(), 4);
    assert!(rewritten.contains("))) int add"));
    assert!(rewritten.contains("))) int multiply"));
}

#[test]
fn test_top_level_block_gets_marker_only() {
    let source = "\
#ifdef ENABLE_FEATURE
int feature_state;
void feature_init(void) { feature_state = 1; }
#endif

int main(void) { return 0; }
";
    let (outcome, rewritten, _dir) = run_source("feature.c", source);
    let report = &outcome.report;

    assert_eq!(report.blocks.len(), 1);
    assert_eq!(report.blocks[0].attributed_to, None);
    assert_eq!(report.markers.len(), 1);

    // マーカーだけが挿入され、関数アノテーションはない
    assert!(!rewritten.contains("))) int main"));
    assert!(rewritten.contains("static void marker_0(void) { }"));
}

#[test]
fn test_long_content_is_truncated() {
    let long_expr = "a".repeat(250);
    let source = format!(
        "int f(void) {{\n#ifdef HUGE\n{};\n#endif\n    return 0;\n}}\n",
        long_expr
    );
    let (outcome, _rewritten, _dir) = run_source("huge.c", &source);
    let report = &outcome.report;

    assert_eq!(report.blocks.len(), 1);
    let content = &report.blocks[0].content;
    assert!(content.ends_with("..."));
    assert_eq!(content.len(), 203);
    assert!(content[..200].bytes().all(|b| b == b'a'));
}

#[test]
fn test_sibling_blocks_in_one_function() {
    let source = "\
void configure(void) {
#ifdef OPT_A
    enable_a();
#endif
    base();
#ifdef OPT_B
    enable_b();
#endif
}
";
    let (outcome, rewritten, _dir) = run_source("config.c", source);
    let report = &outcome.report;

    assert_eq!(report.blocks.len(), 2);
    assert_eq!(report.markers[0].name, "marker_0");
    assert_eq!(report.markers[1].name, "marker_1");
    assert_eq!(report.blocks[0].attributed_to.as_deref(), Some("configure"));
    assert_eq!(report.blocks[1].attributed_to.as_deref(), Some("configure"));

    // 同じ関数に2つのアノテーションが付く
    let before_fn = rewritten.split("void configure").next().unwrap();
    assert_eq!(before_fn.matches("__attribute__((annotate(").count(), 2);
}

#[test]
fn test_marker_counter_resets_between_units() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.c");
    let second = dir.path().join("second.c");
    fs::write(
        &first,
        "#define FOO 1\nint a(void) {\n#ifdef X\nx();\n#endif\nreturn 0;\n}\n",
    )
    .unwrap();
    // FOO は前の単位で定義されたが、この単位では未定義のはず
    fs::write(&second, "#ifdef FOO\nint leaked;\n#endif\nint b;\n").unwrap();

    let tracker = Tracker::builder()
        .with_output_dir(dir.path().join("out"))
        .build();

    let out1 = tracker.run_unit(&first).unwrap();
    let out2 = tracker.run_unit(&second).unwrap();

    assert_eq!(out1.report.markers[0].name, "marker_0");
    // マクロテーブルと連番は単位ごとにリセットされる
    assert_eq!(out2.report.blocks.len(), 1);
    assert_eq!(out2.report.markers[0].name, "marker_0");
}

#[test]
fn test_parse_failure_is_fatal_for_unit_only() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("bad.c");
    let good = dir.path().join("good.c");
    fs::write(&bad, "int f(void) { return 0;\n").unwrap();
    fs::write(&good, "#ifdef X\nint a;\n#endif\nint b;\n").unwrap();

    let tracker = Tracker::builder()
        .with_output_dir(dir.path().join("out"))
        .build();

    // 壊れた単位は失敗し、出力を生成しない
    assert!(tracker.run_unit(&bad).is_err());
    assert!(!dir.path().join("out").join("bad.annotated.c").exists());

    // 次の単位は通常どおり処理できる
    let outcome = tracker.run_unit(&good).unwrap();
    assert_eq!(outcome.report.blocks.len(), 1);
}

#[test]
fn test_defines_suppress_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("flags.c");
    fs::write(
        &input,
        "#ifdef DEBUG_MODE\nint debug_on;\n#endif\n#ifdef OTHER\nint other;\n#endif\n",
    )
    .unwrap();

    let tracker = Tracker::builder()
        .with_define("DEBUG_MODE", None::<String>)
        .with_output_dir(dir.path().join("out"))
        .build();
    let outcome = tracker.run_unit(&input).unwrap();

    assert_eq!(outcome.report.blocks.len(), 1);
    assert_eq!(outcome.report.blocks[0].condition, "OTHER");
}

#[test]
fn test_output_next_to_input_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("plain.c");
    fs::write(&input, "int x;\n").unwrap();

    let tracker = Tracker::builder().build();
    let outcome = tracker.run_unit(&input).unwrap();

    assert_eq!(
        outcome.output_path,
        dir.path().join("plain.annotated.c")
    );
    // スキップ領域がなければ出力は元と同一
    assert_eq!(fs::read_to_string(&outcome.output_path).unwrap(), "int x;\n");
    assert!(outcome.report.blocks.is_empty());
    assert!(outcome.report.markers.is_empty());
}

#[test]
fn test_report_json_round_trip() {
    let source = "\
int f(void) {
#if 0
    dead();
#endif
    return 1;
}
";
    let (outcome, _rewritten, _dir) = run_source("dead.c", source);
    let json = outcome.report.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["blocks"][0]["attributed_to"], "f");
    // リテラル条件はペイロードから condition= が落ちる
    let payload = value["markers"][0]["payload"].as_str().unwrap();
    assert!(!payload.contains("condition="));
    assert!(payload.contains("code="));
}

#[test]
fn test_markers_match_blocks_and_are_contiguous() {
    let source = "\
#ifdef A
int a;
#endif
#ifdef B
int b;
#endif
#ifdef C
int c;
#endif
int keep;
";
    let (outcome, _rewritten, _dir) = run_source("many.c", source);
    let report = &outcome.report;

    assert_eq!(report.markers.len(), report.blocks.len());
    for (i, marker) in report.markers.iter().enumerate() {
        assert_eq!(marker.name, format!("marker_{}", i));
    }
}

#[test]
fn test_output_dir_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("deep.c");
    fs::write(&input, "int x;\n").unwrap();

    let nested = dir.path().join("a").join("b");
    let tracker = Tracker::builder().with_output_dir(&nested).build();
    let outcome = tracker.run_unit(&input).unwrap();

    assert!(Path::new(&outcome.output_path).starts_with(&nested));
    assert!(outcome.output_path.exists());
}
