//! 候选文本（扫描器产出 → 分类器 → 选择器）

/// 选择优先级分层
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    /// 文件名约定给出的固定提示词，无条件优先
    Pinned,
    /// show-text 节点族，或经引用解析到翻译桥接节点的文本
    Authoritative,
    Regular,
}

/// 正负面标记：扫描器可直接指定，否则交给分类器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Positive,
    Negative,
    /// 由关键词密度规则决定
    Auto,
}

/// 扫描器产出的原始候选（文本已解码）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCandidate {
    pub text: String,
    /// 来源标签，例如 `graph:6.text`、`workflow:ShowText|pysssss#12[0]`
    pub source: String,
    pub tier: Tier,
    pub polarity: Polarity,
}

impl RawCandidate {
    pub fn new(text: String, source: impl Into<String>, tier: Tier, polarity: Polarity) -> Self {
        Self { text, source: source.into(), tier, polarity }
    }

    pub fn regular(text: String, source: impl Into<String>) -> Self {
        Self::new(text, source, Tier::Regular, Polarity::Auto)
    }
}

/// 分类后的候选；选择器只读不改
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub text: String,
    pub source: String,
    pub tier: Tier,
    pub is_negative: bool,
    pub is_target_script: bool,
}

/// 按字符数判断是否“严格长于”阈值
pub(crate) fn longer_than(text: &str, threshold: usize) -> bool {
    text.chars().nth(threshold).is_some()
}
