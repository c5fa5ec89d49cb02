//! 执行图（节点字典）扫描
//!
//! 输入值要么是字面量，要么是 `[node_id, output_slot]` 引用。
//! 引用只解析一跳：直接查看被引用节点的已知字段，不做递归遍历。
//!
//! 固定扫描顺序：
//! 1. 类型名含 "text" 的节点的所有长字符串输入
//! 2. conditioning 合并节点 → 一跳解析到文本编码器的 `text`
//! 3. 规范文本编码器的 `text`（引用时只接受翻译桥接节点）
//! 4. 翻译桥接节点的 `text`
//! 5. LoadImage 的文件名约定
//! 6. 兜底：任意节点中解码后含目标文字的转义字符串
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::container::MetadataBundle;
use crate::findings::{longer_than, Polarity, RawCandidate, Tier};
use crate::rules::ConventionScope;
use crate::source::{CandidateSource, Collector, NodeKind, ScanContext};

const SCANNER: &str = "graph";

#[derive(Debug, Deserialize)]
struct GraphNode {
    #[serde(default)]
    class_type: String,
    #[serde(default)]
    inputs: Map<String, Value>,
}

/// 输入值的两种形态
#[derive(Debug, Clone, PartialEq)]
enum Input<'a> {
    Literal(&'a str),
    Link(String),
    Other,
}

impl GraphNode {
    fn input(&self, key: &str) -> Input<'_> {
        match self.inputs.get(key) {
            Some(v) => classify_input(v),
            None => Input::Other,
        }
    }

    fn literal(&self, key: &str) -> Option<&str> {
        match self.input(key) {
            Input::Literal(s) => Some(s),
            _ => None,
        }
    }
}

fn classify_input(v: &Value) -> Input<'_> {
    match v {
        Value::String(s) => Input::Literal(s),
        Value::Array(items) if items.len() == 2 => match &items[0] {
            Value::String(id) => Input::Link(id.clone()),
            Value::Number(n) => Input::Link(n.to_string()),
            _ => Input::Other,
        },
        _ => Input::Other,
    }
}

/// 解析后的执行图（保持文档中的节点顺序）
struct ExecutionGraph {
    nodes: Vec<(String, GraphNode)>,
    index: HashMap<String, usize>,
}

impl ExecutionGraph {
    fn parse(raw: &str, col: &Collector<'_, '_>) -> Option<Self> {
        let doc: Map<String, Value> = match serde_json::from_str(raw) {
            Ok(m) => m,
            Err(e) => {
                col.skipped("prompt", &e);
                return None;
            }
        };
        let mut nodes = Vec::with_capacity(doc.len());
        let mut index = HashMap::new();
        for (id, value) in doc {
            match GraphNode::deserialize(&value) {
                Ok(node) => {
                    index.insert(id.clone(), nodes.len());
                    nodes.push((id, node));
                }
                Err(e) => col.skipped(&format!("node {id}"), &e),
            }
        }
        Some(Self { nodes, index })
    }

    /// 一跳解析
    fn resolve(&self, id: &str) -> Option<&GraphNode> {
        self.index.get(id).map(|&i| &self.nodes[i].1)
    }

    fn of_kind<'g>(&'g self, kind: NodeKind, col: &Collector<'_, '_>) -> Vec<&'g (String, GraphNode)> {
        let names = &col.cx().rules.nodes;
        self.nodes.iter().filter(|(_, n)| NodeKind::of(&n.class_type, names) == kind).collect()
    }
}

fn label(id: &str, field: &str) -> String {
    format!("{SCANNER}:{id}.{field}")
}

/// 执行图扫描器
#[derive(Debug, Default, Clone, Copy)]
pub struct GraphScanner;

impl CandidateSource for GraphScanner {
    fn name(&self) -> &'static str {
        SCANNER
    }

    fn scan(&self, bundle: &MetadataBundle, cx: &ScanContext<'_>) -> Vec<RawCandidate> {
        let mut col = Collector::new(SCANNER, cx);
        let raw = match bundle.get("prompt") {
            Some(r) => r,
            None => return col.finish(),
        };
        let graph = match ExecutionGraph::parse(raw, &col) {
            Some(g) => g,
            None => return col.finish(),
        };

        scan_text_nodes(&mut col, &graph);
        scan_combined_conditionings(&mut col, &graph);
        scan_text_encoders(&mut col, &graph);
        scan_translators(&mut col, &graph);
        scan_load_images(&mut col, &graph);
        scan_escaped_target_script(&mut col, &graph);
        col.finish()
    }
}

/// 步骤 1
fn scan_text_nodes(col: &mut Collector<'_, '_>, graph: &ExecutionGraph) {
    let threshold = col.cx().rules.thresholds.graph;
    let relaxed = col.cx().rules.thresholds.show_text;
    for (id, node) in &graph.nodes {
        if !NodeKind::is_text_like(&node.class_type) {
            continue;
        }
        let show_text = NodeKind::of(&node.class_type, &col.cx().rules.nodes) == NodeKind::ShowText;
        for (key, value) in &node.inputs {
            let s = match classify_input(value) {
                Input::Literal(s) => s,
                _ => continue,
            };
            if show_text && key.starts_with("text") {
                col.push_raw(s, relaxed, label(id, key), Tier::Authoritative, Polarity::Positive);
            } else {
                col.push_raw(s, threshold, label(id, key), Tier::Regular, Polarity::Auto);
            }
        }
    }
}

/// 步骤 2
fn scan_combined_conditionings(col: &mut Collector<'_, '_>, graph: &ExecutionGraph) {
    let threshold = col.cx().rules.thresholds.graph;
    let encoder = col.cx().rules.nodes.text_encoder.clone();
    for (id, node) in graph.of_kind(NodeKind::Combine, col) {
        for (key, value) in &node.inputs {
            if !key.starts_with("conditioning") {
                continue;
            }
            let target_id = match classify_input(value) {
                Input::Link(t) => t,
                _ => continue,
            };
            let target = match graph.resolve(&target_id) {
                Some(t) => t,
                None => {
                    col.skipped(&label(id, key), &format!("dangling reference to node {target_id}"));
                    continue;
                }
            };
            if !(NodeKind::is_text_like(&target.class_type) || target.class_type == encoder) {
                continue;
            }
            if let Some(s) = target.literal("text") {
                col.push_raw(s, threshold, format!("{}->{}", label(id, key), label(&target_id, "text")), Tier::Regular, Polarity::Auto);
            }
        }
    }
}

/// 步骤 3
fn scan_text_encoders(col: &mut Collector<'_, '_>, graph: &ExecutionGraph) {
    let threshold = col.cx().rules.thresholds.graph;
    let translator = col.cx().rules.nodes.translator.clone();
    for (id, node) in graph.of_kind(NodeKind::TextEncoder, col) {
        match node.input("text") {
            Input::Literal(s) => {
                col.push_raw(s, threshold, label(id, "text"), Tier::Regular, Polarity::Auto);
            }
            Input::Link(target_id) => {
                let target = match graph.resolve(&target_id) {
                    Some(t) if t.class_type == translator => t,
                    _ => continue,
                };
                // 编码器引用翻译桥接节点：取桥接节点的原始输入文本
                if let Some(s) = target.literal("text") {
                    if !s.is_empty() {
                        let text = col.cx().normalizer.decode(s);
                        col.push_decoded(
                            text,
                            format!("{}->{}", label(id, "text"), label(&target_id, "text")),
                            Tier::Authoritative,
                            Polarity::Positive,
                        );
                    }
                }
            }
            Input::Other => {}
        }
    }
}

/// 步骤 4
fn scan_translators(col: &mut Collector<'_, '_>, graph: &ExecutionGraph) {
    for (id, node) in graph.of_kind(NodeKind::Translator, col) {
        if let Some(s) = node.literal("text") {
            if !s.is_empty() {
                let text = col.cx().normalizer.decode(s);
                col.push_decoded(text, label(id, "text"), Tier::Regular, Polarity::Positive);
            }
        }
    }
}

/// 步骤 5
fn scan_load_images(col: &mut Collector<'_, '_>, graph: &ExecutionGraph) {
    for (id, node) in graph.of_kind(NodeKind::LoadImage, col) {
        let image = match node.literal("image") {
            Some(s) => s,
            None => continue,
        };
        let prompt = match col.cx().rules.match_convention(ConventionScope::LoadImage, image) {
            Some(c) => c.prompt.clone(),
            None => continue,
        };
        let text = col.cx().normalizer.decode(&prompt);
        col.push_decoded(text, label(id, "image"), Tier::Pinned, Polarity::Positive);
    }
}

/// 步骤 6
fn scan_escaped_target_script(col: &mut Collector<'_, '_>, graph: &ExecutionGraph) {
    let threshold = col.cx().rules.thresholds.graph;
    for (id, node) in &graph.nodes {
        for (key, value) in &node.inputs {
            let s = match classify_input(value) {
                Input::Literal(s) => s,
                _ => continue,
            };
            if !longer_than(s, threshold) || !col.cx().normalizer.needs_decode(s) {
                continue;
            }
            let decoded = col.cx().normalizer.decode(s);
            if col.cx().normalizer.is_target_script(&decoded) {
                col.push_decoded(decoded, label(id, key), Tier::Regular, Polarity::Auto);
            }
        }
    }
}
