mod common;

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use prompthunter_core::{
    scan_with, Diagnostics, ExtractRules, ImagePromptNode, MetadataBundle, NegativeDetector, PromptExtractor,
    RawCandidate, ReportStatus, SilentDiagnostics, TextNormalizer, TranslateError, TranslationService,
};
use serde_json::{json, Value};

const NOT_FOUND: &str = "프롬프트를 찾을 수 없습니다.";
const WARNING: &str = "[경고: 부정 프롬프트만 발견됨] ";

fn extractor() -> PromptExtractor {
    PromptExtractor::new(ExtractRules::default()).unwrap()
}

/// 不联网的翻译服务
struct Tagging;

impl TranslationService for Tagging {
    fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, TranslateError> {
        Ok(format!("[{source}->{target}] {}", text.chars().count()))
    }
}

#[test]
fn scenario_a_escaped_parameters_decode_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_png(dir.path(), "a.png", &[("parameters", "\\uc548\\ub155\\ud558\\uc138\\uc694")]);
    let report = extractor().extract_file(&path, None, &SilentDiagnostics);
    assert_eq!(report.status, ReportStatus::Found);
    assert_eq!(report.prompt, "안녕하세요");
    assert_eq!(report.source.as_deref(), Some("fields:parameters"));
}

#[test]
fn scenario_b_positive_part_beats_negative_part() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_png(
        dir.path(),
        "b.png",
        &[("parameters", "a nice scene\nNegative prompt: blurry, low quality, distorted, ugly")],
    );
    let ex = extractor();
    let report = ex.extract_file(&path, None, &SilentDiagnostics);
    assert_eq!(report.prompt, "a nice scene");

    let bundle = prompthunter_core::read_metadata(&path).unwrap();
    let candidates = ex.collect(&bundle, &SilentDiagnostics);
    let negative = candidates.iter().find(|c| c.source == "fields:parameters.negative").unwrap();
    assert!(negative.is_negative);
    assert_eq!(
        NegativeDetector::from_rules(&ExtractRules::default().classifier).unwrap().distinct_hits(&negative.text),
        4
    );
}

#[test]
fn scenario_c_encoder_linked_to_translator_is_authoritative() {
    let korean = "조용한 항구의 밤 풍경, 달빛";
    let graph = common::graph_encoder_via_translator(korean);
    let bundle = MetadataBundle::default()
        .with_field("prompt", graph)
        .with_field("parameters", "an unrelated english prompt");
    let report = extractor().report(&bundle, None, None, &SilentDiagnostics);
    assert_eq!(report.prompt, korean);
    assert_eq!(report.source.as_deref(), Some("graph:6.text->graph:12.text"));
}

#[test]
fn scenario_c_escaped_bridge_text_is_decoded() {
    let graph = common::graph_encoder_via_translator("\\uc870\\uc6a9\\ud55c \\ud56d\\uad6c\\uc758 \\ubc24");
    let bundle = MetadataBundle::default().with_field("prompt", graph);
    let report = extractor().report(&bundle, None, None, &SilentDiagnostics);
    assert_eq!(report.prompt, "조용한 항구의 밤");
}

#[test]
fn scenario_d_load_image_marker_wins_over_everything() {
    let graph = common::graph_with_load_image(
        "flux_basic_00012_.png",
        json!({
            "20": { "class_type": "ShowText|pysssss", "inputs": { "text": "한국어로 보여지는 권위 텍스트" } },
            "21": { "class_type": "CLIPTextEncode", "inputs": { "text": "a long positive english prompt" } }
        }),
    );
    let bundle = MetadataBundle::default()
        .with_field("prompt", graph)
        .with_field("parameters", "yet another prompt");
    let rules = ExtractRules::default();
    let expected = rules.conventions[0].prompt.clone();
    let report = PromptExtractor::new(rules).unwrap().report(&bundle, None, None, &SilentDiagnostics);
    assert_eq!(report.prompt, expected);
    assert_eq!(report.status, ReportStatus::Convention);
}

#[test]
fn empty_metadata_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_png(dir.path(), "plain.png", &[]);
    let report = extractor().extract_file(&path, None, &SilentDiagnostics);
    assert_eq!(report.status, ReportStatus::NotFound);
    assert_eq!(report.prompt, NOT_FOUND);

    let report = extractor().report(&MetadataBundle::default().with_field("Software", "x"), None, None, &SilentDiagnostics);
    assert_eq!(report.prompt, NOT_FOUND);
}

#[test]
fn malformed_json_fields_never_raise() {
    let bundle = MetadataBundle::default()
        .with_field("workflow", "{not json")
        .with_field("prompt", "[1, 2, 3]");
    let report = extractor().report(&bundle, None, None, &SilentDiagnostics);
    assert_eq!(report.prompt, NOT_FOUND);
}

#[test]
fn only_negative_candidates_carry_warning() {
    let bundle = MetadataBundle::default().with_field("parameters", "Negative prompt: blurry, lowres, ugly, watermark");
    let report = extractor().report(&bundle, None, None, &SilentDiagnostics);
    assert_eq!(report.status, ReportStatus::NegativeOnly);
    assert!(report.prompt.starts_with(WARNING));
}

#[test]
fn authoritative_wins_in_either_field_order() {
    let shown = json!({ "5": { "class_type": "ShowText|pysssss", "inputs": { "text": "shown text" } } }).to_string();
    let bundle = MetadataBundle::default()
        .with_field("parameters", "a plain positive prompt")
        .with_field("prompt", shown);
    assert_eq!(extractor().report(&bundle, None, None, &SilentDiagnostics).prompt, "shown text");
}

#[test]
fn decode_is_idempotent() {
    let n = TextNormalizer::default();
    let inputs = [
        "plain ascii",
        "안녕하세요",
        "\\uc548\\ub155",
        "\\\\uc548 double escaped",
        "mixed \\n newline \\uD83D\\uDE00 emoji",
        "broken \\u12",
        "trailing \\",
        "",
    ];
    for x in inputs {
        let once = n.decode(x);
        assert_eq!(n.decode(&once), once, "input {x:?}");
    }
}

#[test]
fn escaped_hangul_round_trips() {
    let n = TextNormalizer::default();
    let chars: Vec<char> = (0xAC00u32..=0xD7A3).step_by(97).filter_map(char::from_u32).collect();
    let escaped: String = chars.iter().map(|c| format!("\\u{:04x}", *c as u32)).collect();
    let native: String = chars.iter().collect();
    assert_eq!(n.decode(&escaped), native);
    assert_eq!(n.decode(&escaped.to_uppercase().replace("\\U", "\\u")), native);
}

#[test]
fn two_terms_never_negative_three_always() {
    let det = NegativeDetector::from_rules(&ExtractRules::default().classifier).unwrap();
    assert!(!det.is_negative("a blurry photo of an ugly duckling"));
    assert!(!det.is_negative("blurry blurry blurry ugly ugly"));
    assert!(det.is_negative("blurry, ugly, watermark"));
    assert!(det.is_negative("BLURRY and Ugly with Lowres details and a watermark"));
}

#[test]
fn path_convention_for_files_without_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_png(dir.path(), "flux_basic_highres_00001_.png", &[]);
    let report = extractor().extract_file(&path, None, &SilentDiagnostics);
    assert_eq!(report.status, ReportStatus::Convention);
    assert_eq!(report.prompt, ExtractRules::default().conventions[1].prompt);
}

fn run_scan(dir: &Path, threads: usize) -> Value {
    let mut out = Vec::new();
    let stats = scan_with(dir, &mut out, Arc::new(extractor()), Some(Arc::new(Tagging)), Some(threads)).unwrap();
    assert_eq!(stats.outputs_written, 4);
    assert_eq!(stats.files_scanned, 4);
    assert_eq!(stats.prompts_found, 3);
    serde_json::from_slice(&out).unwrap()
}

#[test]
fn batch_scan_is_ordered_and_stable_across_threads() {
    let dir = tempfile::tempdir().unwrap();
    common::write_png(dir.path(), "c.png", &[("parameters", "the third image prompt")]);
    common::write_png(dir.path(), "a.png", &[("parameters", "\\uc548\\ub155\\ud558\\uc138\\uc694")]);
    common::write_png(dir.path(), "b.PNG", &[]);
    common::write_png(dir.path(), "d.png", &[("parameters", "Negative prompt: blurry, lowres, ugly")]);
    std::fs::write(dir.path().join("notes.txt"), "parameters: not an image").unwrap();
    std::fs::create_dir(dir.path().join("nested")).unwrap();
    common::write_png(&dir.path().join("nested"), "z.png", &[("parameters", "hidden in a subdirectory")]);

    let serial = run_scan(dir.path(), 1);
    let parallel = run_scan(dir.path(), 4);
    assert_eq!(serial, parallel);

    let items = serial.as_array().unwrap();
    let files: Vec<&str> = items.iter().map(|i| i["file"].as_str().unwrap()).collect();
    assert_eq!(files, ["a.png", "b.PNG", "c.png", "d.png"]);

    assert_eq!(items[0]["prompt"], "안녕하세요");
    assert_eq!(items[0]["translated"], "[ko->en] 5");
    assert_eq!(items[1]["status"], "not_found");
    assert_eq!(items[1]["translated"], NOT_FOUND);
    assert_eq!(items[2]["translated"], "the third image prompt");
    assert_eq!(items[3]["status"], "negative_only");
}

#[test]
fn default_rules_file_matches_builtin_defaults() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../rules/default.toml");
    let file = ExtractRules::load(&path).unwrap();
    let builtin = ExtractRules::default();
    assert_eq!(file.thresholds.workflow, builtin.thresholds.workflow);
    assert_eq!(file.thresholds.show_text, builtin.thresholds.show_text);
    assert_eq!(file.script.start, builtin.script.start);
    assert_eq!(file.script.end, builtin.script.end);
    assert_eq!(file.classifier.negative_terms, builtin.classifier.negative_terms);
    assert_eq!(file.messages.not_found, builtin.messages.not_found);
    assert_eq!(file.conventions.len(), builtin.conventions.len());
    for (a, b) in file.conventions.iter().zip(&builtin.conventions) {
        assert_eq!(a.prompt, b.prompt);
        assert_eq!(a.marker, b.marker);
    }
}

#[test]
fn node_returns_pixels_and_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_png(dir.path(), "n.png", &[("parameters", "한국어 프롬프트 입니다")]);
    let node = ImagePromptNode::new(extractor(), Some(Box::new(Tagging)));

    let out = node.run(&path, false, &SilentDiagnostics);
    assert_eq!(out.image.shape, [1, 3, 4, 3]);
    assert_eq!(out.image.data.len(), 36);
    assert_eq!(out.prompt, "한국어 프롬프트 입니다");
    assert_eq!(out.translated, out.prompt);

    let out = node.run(&path, true, &SilentDiagnostics);
    assert_eq!(out.translated, "[ko->en] 12");
}

#[test]
fn node_falls_back_on_undecodable_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.png");
    std::fs::write(&path, b"\x89PNG\r\n\x1a\nnot really").unwrap();
    let out = ImagePromptNode::new(extractor(), None).run(&path, false, &SilentDiagnostics);
    assert_eq!(out.image.shape, [1, 64, 64, 3]);
    assert!(out.image.data.iter().all(|&v| v == 0.0));
    assert!(out.prompt.starts_with("오류 발생: "));
}

/// 记录诊断事件
#[derive(Default)]
struct Recording {
    events: Mutex<Vec<String>>,
}

impl Diagnostics for Recording {
    fn candidate(&self, scanner: &str, candidate: &RawCandidate) {
        self.events.lock().unwrap().push(format!("candidate {scanner} {}", candidate.source));
    }

    fn skipped(&self, scanner: &str, what: &str, _reason: &dyn fmt::Display) {
        self.events.lock().unwrap().push(format!("skipped {scanner} {what}"));
    }

    fn field(&self, key: &str, _value: &str) {
        self.events.lock().unwrap().push(format!("field {key}"));
    }
}

#[test]
fn diagnostics_are_injected_not_global() {
    let bundle = MetadataBundle::default()
        .with_field("workflow", "{not json")
        .with_field("parameters", "a lighthouse in a storm");
    let diag = Recording::default();
    let report = extractor().report(&bundle, None, None, &diag);
    assert_eq!(report.prompt, "a lighthouse in a storm");

    let events = diag.events.into_inner().unwrap();
    assert!(events.contains(&"field workflow".to_string()));
    assert!(events.contains(&"skipped workflow workflow".to_string()));
    assert!(events.contains(&"candidate fields fields:parameters".to_string()));
}
