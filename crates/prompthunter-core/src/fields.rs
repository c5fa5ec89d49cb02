//! 平面字段扫描：`parameters`、`Comment` 与 EXIF 标签
use crate::container::MetadataBundle;
use crate::findings::{Polarity, RawCandidate, Tier};
use crate::source::{CandidateSource, Collector, ScanContext};

const SCANNER: &str = "fields";
const NEGATIVE_MARKER: &str = "Negative prompt:";

/// `parameters` 拆分结果：负面段从标记到行尾，其余部分为正面
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParameterSplit<'a> {
    pub(crate) positive: String,
    pub(crate) negative: Option<&'a str>,
}

/// 按 `Negative prompt:`（区分大小写）拆分；标记之前与负面行之后的内容拼成正面
pub(crate) fn split_parameters(text: &str) -> ParameterSplit<'_> {
    match text.find(NEGATIVE_MARKER) {
        Some(at) => {
            let rest = &text[at + NEGATIVE_MARKER.len()..];
            let line_end = rest.find('\n').unwrap_or(rest.len());
            let positive = [text[..at].trim(), rest[line_end..].trim()]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            ParameterSplit { positive, negative: Some(rest[..line_end].trim()) }
        }
        None => ParameterSplit { positive: text.trim().to_string(), negative: None },
    }
}

/// 平面字段扫描器
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldScanner;

impl CandidateSource for FieldScanner {
    fn name(&self) -> &'static str {
        SCANNER
    }

    fn scan(&self, bundle: &MetadataBundle, cx: &ScanContext<'_>) -> Vec<RawCandidate> {
        let mut col = Collector::new(SCANNER, cx);
        let threshold = cx.rules.thresholds.fields;

        if let Some(params) = bundle.get("parameters") {
            let split = split_parameters(params);
            // parameters 只要求非空
            let positive = cx.normalizer.decode(&split.positive);
            if !positive.is_empty() {
                col.push_decoded(positive, format!("{SCANNER}:parameters"), Tier::Regular, Polarity::Positive);
            }
            if let Some(neg) = split.negative {
                let negative = cx.normalizer.decode(neg);
                if !negative.is_empty() {
                    col.push_decoded(negative, format!("{SCANNER}:parameters.negative"), Tier::Regular, Polarity::Negative);
                }
            }
        }

        if let Some(comment) = bundle.get("Comment") {
            col.push_decoded_if_longer(comment, threshold, format!("{SCANNER}:Comment"), Polarity::Positive);
        }

        for (tag, value) in &bundle.exif {
            col.push_decoded_if_longer(value, threshold, format!("{SCANNER}:exif.{tag}"), Polarity::Positive);
        }

        col.finish()
    }
}
