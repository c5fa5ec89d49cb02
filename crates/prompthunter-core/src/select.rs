//! 候选选择：固定优先级，先命中者胜
//!
//! 0. 文件名约定（Pinned）：第一个收集到的
//! 1. 权威候选：优先目标文字，否则第一个
//! 2. 正面普通候选：优先目标文字，否则第一个
//! 3. 仅有负面候选：同上，并加警告前缀
//! 4. 什么都没有：固定的未找到文案
use crate::findings::{Candidate, Tier};
use crate::rules::Messages;

/// 选择结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Found { text: String, source: String, tier: Tier },
    /// `text` 已带警告前缀，`body` 为候选原文
    NegativeOnly { text: String, body: String, source: String },
    NotFound { text: String },
}

impl Selection {
    pub fn text(&self) -> &str {
        match self {
            Selection::Found { text, .. } | Selection::NegativeOnly { text, .. } | Selection::NotFound { text } => text,
        }
    }

    pub fn source(&self) -> Option<&str> {
        match self {
            Selection::Found { source, .. } | Selection::NegativeOnly { source, .. } => Some(source),
            Selection::NotFound { .. } => None,
        }
    }

    pub fn is_found(&self) -> bool {
        !matches!(self, Selection::NotFound { .. })
    }
}

/// 同一层内：有目标文字的优先，否则按到达顺序取第一个
fn prefer_target_script<'a>(mut tier: impl Iterator<Item = &'a Candidate> + Clone) -> Option<&'a Candidate> {
    tier.clone().find(|c| c.is_target_script).or_else(|| tier.next())
}

pub fn select(candidates: &[Candidate], messages: &Messages) -> Selection {
    if let Some(c) = candidates.iter().find(|c| c.tier == Tier::Pinned) {
        return found(c);
    }

    let authoritative = candidates.iter().filter(|c| c.tier == Tier::Authoritative);
    if let Some(c) = prefer_target_script(authoritative) {
        return found(c);
    }

    let positive = candidates.iter().filter(|c| c.tier == Tier::Regular && !c.is_negative);
    if let Some(c) = prefer_target_script(positive) {
        return found(c);
    }

    let negative = candidates.iter().filter(|c| c.tier == Tier::Regular && c.is_negative);
    if let Some(c) = prefer_target_script(negative) {
        return Selection::NegativeOnly {
            text: format!("{}{}", messages.negative_only_prefix, c.text),
            body: c.text.clone(),
            source: c.source.clone(),
        };
    }

    Selection::NotFound { text: messages.not_found.clone() }
}

fn found(c: &Candidate) -> Selection {
    Selection::Found { text: c.text.clone(), source: c.source.clone(), tier: c.tier }
}
