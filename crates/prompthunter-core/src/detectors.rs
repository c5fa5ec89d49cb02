//! 候选分类：负面关键词密度 + 目标文字检测
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use anyhow::Result;
use std::collections::HashSet;

use crate::findings::{Candidate, Polarity, RawCandidate, Tier};
use crate::normalize::TextNormalizer;
use crate::rules::ClassifierRules;

/// 负面词检测器（AC 自动机，ASCII 不区分大小写）
pub struct NegativeDetector {
    ac: AhoCorasick,
    min_distinct: usize,
}

impl NegativeDetector {
    /// 从规则构建；空词条与重复词条会被忽略
    pub fn from_rules(rules: &ClassifierRules) -> Result<Self> {
        let mut terms: Vec<String> = Vec::new();
        for t in &rules.negative_terms {
            let t = t.trim().to_lowercase();
            if !t.is_empty() && !terms.contains(&t) {
                terms.push(t);
            }
        }
        // 重叠匹配：短词条即使包含在长词条中也要计数
        let ac = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::Standard)
            .build(&terms)?;
        Ok(Self { ac, min_distinct: rules.min_distinct_terms })
    }

    /// 命中的不同词条数
    pub fn distinct_hits(&self, text: &str) -> usize {
        let mut seen: HashSet<usize> = HashSet::new();
        for m in self.ac.find_overlapping_iter(text) {
            seen.insert(m.pattern().as_usize());
        }
        seen.len()
    }

    /// 至少命中 `min_distinct` 个不同词条才判为负面
    pub fn is_negative(&self, text: &str) -> bool {
        self.min_distinct > 0 && self.distinct_hits(text) >= self.min_distinct
    }
}

/// 分类器：把原始候选转成带标记的 `Candidate`
pub struct Classifier {
    detector: NegativeDetector,
    normalizer: TextNormalizer,
}

impl Classifier {
    pub fn new(detector: NegativeDetector, normalizer: TextNormalizer) -> Self {
        Self { detector, normalizer }
    }

    pub fn detector(&self) -> &NegativeDetector {
        &self.detector
    }

    pub fn classify(&self, raw: RawCandidate) -> Candidate {
        let is_negative = match (raw.tier, raw.polarity) {
            // 权威来源不看正负面启发式
            (Tier::Pinned | Tier::Authoritative, _) => false,
            (_, Polarity::Positive) => false,
            (_, Polarity::Negative) => true,
            (_, Polarity::Auto) => self.detector.is_negative(&raw.text),
        };
        let is_target_script = self.normalizer.is_target_script(&raw.text);
        Candidate { text: raw.text, source: raw.source, tier: raw.tier, is_negative, is_target_script }
    }
}
