//! 工作流（节点列表）扫描
//!
//! 只看节点本身（类型名、标题、widgets_values），不建模连线。
//! 单个节点解析失败只跳过该节点。
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;

use crate::container::MetadataBundle;
use crate::findings::{Polarity, RawCandidate, Tier};
use crate::source::{CandidateSource, Collector, NodeKind, ScanContext};

const SCANNER: &str = "workflow";

fn sampler_prompt_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""prompt"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("prompt pattern"))
}

fn sampler_negative_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""negative_prompt"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("negative pattern"))
}

#[derive(Debug, Deserialize)]
struct WorkflowNode {
    #[serde(default)]
    id: Option<Value>,
    #[serde(rename = "type", default)]
    node_type: String,
    #[serde(default)]
    title: Option<String>,
    /// 多数节点为数组，少数自定义节点序列化为对象
    #[serde(default)]
    widgets_values: Option<Value>,
}

impl WorkflowNode {
    fn label(&self, pos: usize, field: &str) -> String {
        let id = match &self.id {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            _ => pos.to_string(),
        };
        match &self.title {
            Some(t) if !t.is_empty() => format!("{SCANNER}:{}({})#{}[{}]", self.node_type, t, id, field),
            _ => format!("{SCANNER}:{}#{}[{}]", self.node_type, id, field),
        }
    }

    /// 取出 widget 中的字符串；`nested` 时展开一层嵌套数组
    fn widget_strings(&self, nested: bool) -> Vec<(String, &str)> {
        let mut out = Vec::new();
        match &self.widgets_values {
            Some(Value::Array(items)) => {
                for (i, v) in items.iter().enumerate() {
                    match v {
                        Value::String(s) => out.push((i.to_string(), s.as_str())),
                        Value::Array(inner) if nested => {
                            for (j, w) in inner.iter().enumerate() {
                                if let Value::String(s) = w {
                                    out.push((format!("{i}.{j}"), s.as_str()));
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            Some(Value::Object(map)) => {
                for (k, v) in map {
                    if let Value::String(s) = v {
                        out.push((k.clone(), s.as_str()));
                    }
                }
            }
            _ => {}
        }
        out
    }

    fn first_widget(&self) -> Option<&str> {
        match &self.widgets_values {
            Some(Value::Array(items)) => items.first().and_then(Value::as_str),
            _ => None,
        }
    }
}

/// 去掉 JSON 字符串转义；失败时返回原文
fn json_unquote(escaped: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{escaped}\"")).unwrap_or_else(|_| escaped.to_string())
}

/// 工作流扫描器
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkflowScanner;

impl CandidateSource for WorkflowScanner {
    fn name(&self) -> &'static str {
        SCANNER
    }

    fn scan(&self, bundle: &MetadataBundle, cx: &ScanContext<'_>) -> Vec<RawCandidate> {
        let mut col = Collector::new(SCANNER, cx);
        let raw = match bundle.get("workflow") {
            Some(r) => r,
            None => return col.finish(),
        };
        let doc: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                col.skipped("workflow", &e);
                return col.finish();
            }
        };
        let nodes = match doc.get("nodes").and_then(Value::as_array) {
            Some(n) => n,
            None => {
                col.skipped("workflow", &"no `nodes` list");
                return col.finish();
            }
        };

        for (pos, node) in nodes.iter().enumerate() {
            match WorkflowNode::deserialize(node) {
                Ok(n) => scan_node(&mut col, &n, pos),
                Err(e) => col.skipped(&format!("node #{pos}"), &e),
            }
        }
        col.finish()
    }
}

fn scan_node(col: &mut Collector<'_, '_>, node: &WorkflowNode, pos: usize) {
    let thresholds = &col.cx().rules.thresholds;
    let (normal, relaxed) = (thresholds.workflow, thresholds.show_text);

    match NodeKind::of(&node.node_type, &col.cx().rules.nodes) {
        NodeKind::Translator => {
            // 翻译桥接节点按约定保存整理好的文本
            for (field, s) in node.widget_strings(false) {
                col.push_raw(s, normal, node.label(pos, &field), Tier::Regular, Polarity::Positive);
            }
        }
        NodeKind::ShowText => {
            let named = matches!(node.widgets_values, Some(Value::Object(_)));
            for (field, s) in node.widget_strings(true) {
                if named && !field.starts_with("text") {
                    continue;
                }
                col.push_raw(s, relaxed, node.label(pos, &field), Tier::Authoritative, Polarity::Positive);
            }
        }
        NodeKind::Sampler => {
            let mut matched = false;
            if let Some(first) = node.first_widget() {
                for (re, key, polarity) in [
                    (sampler_prompt_regex(), "prompt", Polarity::Positive),
                    (sampler_negative_regex(), "negative_prompt", Polarity::Negative),
                ] {
                    if let Some(cap) = re.captures(first).and_then(|c| c.get(1)) {
                        matched = true;
                        let text = json_unquote(cap.as_str());
                        col.push_raw(&text, normal, node.label(pos, &format!("0.{key}")), Tier::Regular, polarity);
                    }
                }
            }
            // 没有内嵌 JSON 的采样器按普通文本节点处理
            if !matched && NodeKind::is_text_like(&node.node_type) {
                scan_text_widgets(col, node, pos, normal);
            }
        }
        _ if NodeKind::is_text_like(&node.node_type) => scan_text_widgets(col, node, pos, normal),
        _ => {}
    }
}

fn scan_text_widgets(col: &mut Collector<'_, '_>, node: &WorkflowNode, pos: usize, threshold: usize) {
    for (field, s) in node.widget_strings(false) {
        col.push_raw(s, threshold, node.label(pos, &field), Tier::Regular, Polarity::Auto);
    }
}
