//! 规则文件加载（TOML）
//!
//! 所有启发式参数（长度阈值、目标文字区间、节点类型名、负面词表、
//! 文件名约定等）都集中在 `ExtractRules` 中；缺省字段回退到内置默认值。
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

/// 完整的规则配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractRules {
    pub thresholds: Thresholds,
    pub script: ScriptRange,
    pub nodes: NodeNames,
    pub classifier: ClassifierRules,
    pub messages: Messages,
    pub translate: TranslateRules,
    pub conventions: Vec<Convention>,
}

/// 各扫描器的最小有效长度（按字符计，严格大于才入选）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub workflow: usize,
    /// show-text 节点族的放宽阈值
    pub show_text: usize,
    pub graph: usize,
    pub fields: usize,
}

/// 目标文字的码点区间（闭区间）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScriptRange {
    pub name: String,
    pub start: u32,
    pub end: u32,
}

/// 需要特殊识别的节点类型名
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeNames {
    /// 文本翻译桥接节点（按约定保存已整理好的文本）
    pub translator: String,
    /// 规范文本编码器
    pub text_encoder: String,
    /// 合并多个 conditioning 的节点
    pub combine: String,
    pub load_image: String,
    /// 类型名包含该片段即视为采样器（不区分大小写）
    pub sampler_hint: String,
}

/// 负面判定：词表与“不同词条”的最小命中数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierRules {
    pub negative_terms: Vec<String>,
    pub min_distinct_terms: usize,
}

/// 返回给调用方的固定文案
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Messages {
    pub not_found: String,
    pub negative_only_prefix: String,
    pub error_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranslateRules {
    pub source: String,
    pub target: String,
    pub chunk_chars: usize,
    pub endpoint: String,
}

/// 约定生效的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConventionScope {
    /// 执行图中 LoadImage 节点的 image 输入
    LoadImage,
    /// 输入图片自身的路径（仅在没有任何候选时使用）
    Path,
}

/// 文件名片段 → 固定提示词
#[derive(Debug, Clone, Deserialize)]
pub struct Convention {
    pub scope: ConventionScope,
    pub marker: String,
    pub prompt: String,
}

const FLUX_BASIC_PROMPT: &str = "아름다운 한국 여성의 클로즈업 이미지, 매우 사실적인 사진, 종이 한장을 들어서 보여주고있다, 종이에는 영어로 \"FLUX BASIC\" 이라는 문구가 적혀있다.";
const FLUX_HIGHRES_PROMPT: &str = "이 이미지는 원본의 고해상도 버전입니다 (원본 프롬프트: 아름다운 한국 여성의 클로즈업 이미지, 매우 사실적인 사진)";

const DEFAULT_NEGATIVE_TERMS: &[&str] = &[
    "blurry",
    "low quality",
    "worst quality",
    "bad quality",
    "lowres",
    "distorted",
    "deformed",
    "disfigured",
    "malformed",
    "ugly",
    "bad anatomy",
    "bad hands",
    "extra fingers",
    "missing fingers",
    "extra limbs",
    "mutated",
    "mutation",
    "poorly drawn",
    "jpeg artifacts",
    "watermark",
    "out of focus",
    "cropped",
    "grainy",
    "duplicate",
    "저품질",
    "흐릿",
    "왜곡",
    "기형",
    "못생긴",
];

impl Default for Thresholds {
    fn default() -> Self {
        Self { workflow: 10, show_text: 5, graph: 10, fields: 10 }
    }
}

impl Default for ScriptRange {
    fn default() -> Self {
        Self { name: "hangul".to_string(), start: 0xAC00, end: 0xD7A3 }
    }
}

impl ScriptRange {
    pub fn contains(&self, ch: char) -> bool {
        (self.start..=self.end).contains(&(ch as u32))
    }

    fn validate(&self) -> Result<()> {
        if self.start > self.end {
            bail!("script range `{}` is empty: {:#X} > {:#X}", self.name, self.start, self.end);
        }
        if char::from_u32(self.start).is_none() || char::from_u32(self.end).is_none() {
            bail!("script range `{}` has a bound outside the Unicode scalar values", self.name);
        }
        Ok(())
    }
}

impl Default for NodeNames {
    fn default() -> Self {
        Self {
            translator: "DeepTranslatorTextNode".to_string(),
            text_encoder: "CLIPTextEncode".to_string(),
            combine: "ConditioningCombine".to_string(),
            load_image: "LoadImage".to_string(),
            sampler_hint: "sampler".to_string(),
        }
    }
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            negative_terms: DEFAULT_NEGATIVE_TERMS.iter().map(|s| s.to_string()).collect(),
            min_distinct_terms: 3,
        }
    }
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            not_found: "프롬프트를 찾을 수 없습니다.".to_string(),
            negative_only_prefix: "[경고: 부정 프롬프트만 발견됨] ".to_string(),
            error_prefix: "오류 발생: ".to_string(),
        }
    }
}

impl Default for TranslateRules {
    fn default() -> Self {
        Self {
            source: "ko".to_string(),
            target: "en".to_string(),
            chunk_chars: 4000,
            endpoint: "https://translate.googleapis.com/translate_a/single".to_string(),
        }
    }
}

impl Default for ExtractRules {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            script: ScriptRange::default(),
            nodes: NodeNames::default(),
            classifier: ClassifierRules::default(),
            messages: Messages::default(),
            translate: TranslateRules::default(),
            conventions: vec![
                Convention {
                    scope: ConventionScope::LoadImage,
                    marker: "flux_basic_".to_string(),
                    prompt: FLUX_BASIC_PROMPT.to_string(),
                },
                Convention {
                    scope: ConventionScope::Path,
                    marker: "flux_basic_highres".to_string(),
                    prompt: FLUX_HIGHRES_PROMPT.to_string(),
                },
            ],
        }
    }
}

impl ExtractRules {
    /// 从 TOML 规则文件加载
    pub fn load(path: &Path) -> Result<Self> {
        let txt = std::fs::read_to_string(path)
            .with_context(|| format!("read rules file {}", path.display()))?;
        Self::from_toml_str(&txt).with_context(|| format!("parse rules file {}", path.display()))
    }

    pub fn from_toml_str(txt: &str) -> Result<Self> {
        let parsed: ExtractRules = toml::from_str(txt)?;
        parsed.script.validate()?;
        Ok(parsed)
    }

    /// 按作用位置筛选约定（保持配置顺序）
    pub fn conventions_for(&self, scope: ConventionScope) -> impl Iterator<Item = &Convention> {
        self.conventions.iter().filter(move |c| c.scope == scope)
    }

    /// 在给定文本中查找第一个命中的约定
    pub fn match_convention(&self, scope: ConventionScope, haystack: &str) -> Option<&Convention> {
        self.conventions_for(scope)
            .find(|c| !c.marker.is_empty() && haystack.contains(&c.marker))
    }
}
