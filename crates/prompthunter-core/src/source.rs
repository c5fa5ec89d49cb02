//! 候选来源抽象：工作流、执行图、平面字段三种扫描策略共用一个接口
use crate::container::MetadataBundle;
use crate::diagnostics::Diagnostics;
use crate::findings::{longer_than, Polarity, RawCandidate, Tier};
use crate::normalize::TextNormalizer;
use crate::rules::{ExtractRules, NodeNames};

/// 扫描时共享的只读上下文
pub struct ScanContext<'a> {
    pub rules: &'a ExtractRules,
    pub normalizer: &'a TextNormalizer,
    pub diagnostics: &'a dyn Diagnostics,
}

/// 能从元数据中扫描出候选的策略
///
/// 实现必须是“全函数”：解析失败只能减少产出，不能返回错误或 panic。
pub trait CandidateSource: Send + Sync {
    fn name(&self) -> &'static str;
    fn scan(&self, bundle: &MetadataBundle, cx: &ScanContext<'_>) -> Vec<RawCandidate>;
}

/// 按类型名识别的节点族
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Translator,
    ShowText,
    TextEncoder,
    Combine,
    LoadImage,
    Sampler,
    /// 类型名含 "text" 的其他节点
    Text,
    Other,
}

impl NodeKind {
    /// 判定顺序即优先级：精确名 → show-text → 采样器 → 泛 text
    pub(crate) fn of(type_name: &str, names: &NodeNames) -> Self {
        if type_name == names.translator {
            return NodeKind::Translator;
        }
        if type_name == names.text_encoder {
            return NodeKind::TextEncoder;
        }
        if type_name == names.combine {
            return NodeKind::Combine;
        }
        if type_name == names.load_image {
            return NodeKind::LoadImage;
        }
        let lower = type_name.to_lowercase();
        if lower.contains("show") && lower.contains("text") {
            NodeKind::ShowText
        } else if !names.sampler_hint.is_empty() && lower.contains(&names.sampler_hint.to_lowercase()) {
            NodeKind::Sampler
        } else if lower.contains("text") {
            NodeKind::Text
        } else {
            NodeKind::Other
        }
    }

    /// 类型名是否含 "text"（不区分大小写）
    pub(crate) fn is_text_like(type_name: &str) -> bool {
        type_name.to_lowercase().contains("text")
    }
}

/// 候选收集器：统一解码、记录诊断
pub(crate) struct Collector<'c, 'a> {
    scanner: &'static str,
    cx: &'c ScanContext<'a>,
    out: Vec<RawCandidate>,
}

impl<'c, 'a> Collector<'c, 'a> {
    pub(crate) fn new(scanner: &'static str, cx: &'c ScanContext<'a>) -> Self {
        Self { scanner, cx, out: Vec::new() }
    }

    pub(crate) fn cx(&self) -> &ScanContext<'a> {
        self.cx
    }

    /// 原文长度超过阈值才解码入选
    pub(crate) fn push_raw(&mut self, raw: &str, threshold: usize, source: String, tier: Tier, polarity: Polarity) {
        if !longer_than(raw, threshold) {
            return;
        }
        let text = self.cx.normalizer.decode(raw);
        self.push_decoded(text, source, tier, polarity);
    }

    /// 先解码，解码后长度超过阈值才入选
    pub(crate) fn push_decoded_if_longer(&mut self, raw: &str, threshold: usize, source: String, polarity: Polarity) {
        let text = self.cx.normalizer.decode(raw);
        if longer_than(&text, threshold) {
            self.push_decoded(text, source, Tier::Regular, polarity);
        }
    }

    pub(crate) fn push_decoded(&mut self, text: String, source: String, tier: Tier, polarity: Polarity) {
        let candidate = RawCandidate::new(text, source, tier, polarity);
        self.cx.diagnostics.candidate(self.scanner, &candidate);
        self.out.push(candidate);
    }

    pub(crate) fn skipped(&self, what: &str, reason: &dyn std::fmt::Display) {
        self.cx.diagnostics.skipped(self.scanner, what, reason);
    }

    pub(crate) fn finish(self) -> Vec<RawCandidate> {
        self.out
    }
}
