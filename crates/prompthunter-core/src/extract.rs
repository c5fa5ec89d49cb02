//! 单次提取：依固定顺序运行扫描器 → 分类 → 选择 →（可选）翻译
//!
//! 单线程同步执行；每次调用自建并丢弃候选集合，不共享可变状态。
use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use crate::container::{read_metadata, MetadataBundle};
use crate::detectors::{Classifier, NegativeDetector};
use crate::diagnostics::Diagnostics;
use crate::fields::FieldScanner;
use crate::findings::{Candidate, Tier};
use crate::graph::GraphScanner;
use crate::normalize::TextNormalizer;
use crate::rules::{ConventionScope, ExtractRules};
use crate::select::{select, Selection};
use crate::source::{CandidateSource, ScanContext};
use crate::translate::{translate_text, TranslationService};
use crate::workflow::WorkflowScanner;

/// 提取结果的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Found,
    NegativeOnly,
    /// 无候选，由图片路径约定给出
    Convention,
    NotFound,
    Error,
}

/// 单个图片的最终输出（总是有文本）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptReport {
    pub prompt: String,
    /// 未请求或无法翻译时等于 `prompt`
    pub translated: String,
    pub source: Option<String>,
    pub status: ReportStatus,
}

impl PromptReport {
    fn untranslated(prompt: String, source: Option<String>, status: ReportStatus) -> Self {
        Self { translated: prompt.clone(), prompt, source, status }
    }
}

/// 提示词提取器（规则、归一化器、分类器与扫描策略的组合）
pub struct PromptExtractor {
    rules: ExtractRules,
    normalizer: TextNormalizer,
    classifier: Classifier,
    sources: Vec<Box<dyn CandidateSource>>,
}

impl PromptExtractor {
    /// 使用默认的三种扫描策略（工作流 → 执行图 → 平面字段）
    pub fn new(rules: ExtractRules) -> Result<Self> {
        let sources: Vec<Box<dyn CandidateSource>> =
            vec![Box::new(WorkflowScanner), Box::new(GraphScanner), Box::new(FieldScanner)];
        Self::with_sources(rules, sources)
    }

    pub fn with_sources(rules: ExtractRules, sources: Vec<Box<dyn CandidateSource>>) -> Result<Self> {
        let normalizer = TextNormalizer::new(rules.script.clone());
        let detector = NegativeDetector::from_rules(&rules.classifier)?;
        let classifier = Classifier::new(detector, normalizer.clone());
        Ok(Self { rules, normalizer, classifier, sources })
    }

    pub fn rules(&self) -> &ExtractRules {
        &self.rules
    }

    pub fn normalizer(&self) -> &TextNormalizer {
        &self.normalizer
    }

    /// 收集并分类全部候选（按扫描顺序）
    pub fn collect(&self, bundle: &MetadataBundle, diagnostics: &dyn Diagnostics) -> Vec<Candidate> {
        for (key, value) in &bundle.fields {
            diagnostics.field(key, value);
        }
        let cx = ScanContext { rules: &self.rules, normalizer: &self.normalizer, diagnostics };
        self.sources
            .iter()
            .flat_map(|s| s.scan(bundle, &cx))
            .map(|raw| self.classifier.classify(raw))
            .collect()
    }

    pub fn extract(&self, bundle: &MetadataBundle, diagnostics: &dyn Diagnostics) -> Selection {
        let candidates = self.collect(bundle, diagnostics);
        select(&candidates, &self.rules.messages)
    }

    /// 对内存中的元数据生成报告；`image_path` 仅用于路径约定
    pub fn report(
        &self,
        bundle: &MetadataBundle,
        image_path: Option<&Path>,
        translator: Option<&dyn TranslationService>,
        diagnostics: &dyn Diagnostics,
    ) -> PromptReport {
        // body 为实际送去翻译的文本（负面警告前缀不翻译）
        let (prompt, body, source, status) = match self.extract(bundle, diagnostics) {
            Selection::Found { text, source, tier } => {
                let status = if tier == Tier::Pinned { ReportStatus::Convention } else { ReportStatus::Found };
                (text.clone(), text, Some(source), status)
            }
            Selection::NegativeOnly { text, body, source } => (text, body, Some(source), ReportStatus::NegativeOnly),
            Selection::NotFound { text } => {
                let by_path = image_path
                    .map(|p| p.to_string_lossy().into_owned())
                    .and_then(|p| self.rules.match_convention(ConventionScope::Path, &p).cloned());
                match by_path {
                    Some(c) => (c.prompt.clone(), c.prompt, Some(format!("path:{}", c.marker)), ReportStatus::Convention),
                    None => return PromptReport::untranslated(text, None, ReportStatus::NotFound),
                }
            }
        };

        let translated = match translator {
            Some(service) => {
                let out = translate_text(service, &body, &self.normalizer, &self.rules.translate, diagnostics);
                if status == ReportStatus::NegativeOnly {
                    format!("{}{}", self.rules.messages.negative_only_prefix, out)
                } else {
                    out
                }
            }
            None => prompt.clone(),
        };
        PromptReport { prompt, translated, source, status }
    }

    /// 读取图片并提取；读取失败转为说明文本，不返回错误
    pub fn extract_file(
        &self,
        path: &Path,
        translator: Option<&dyn TranslationService>,
        diagnostics: &dyn Diagnostics,
    ) -> PromptReport {
        match read_metadata(path) {
            Ok(bundle) => self.report(&bundle, Some(path), translator, diagnostics),
            Err(e) => PromptReport::untranslated(e.to_string(), None, ReportStatus::Error),
        }
    }
}
