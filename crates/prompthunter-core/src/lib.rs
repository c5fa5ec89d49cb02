//! 图片提示词提取核心库
//!
//! 设计要点：
//! - 只读图片元数据（PNG 文本块、EXIF），不依赖任何生成引擎。
//! - 三种扫描策略按固定顺序产出候选：编辑器工作流 → 执行图 → 平面字段。
//! - 候选统一做转义解码、正负分类，再按固定层级选出唯一结果；永远返回一段文本。
//! - 翻译是可选的外部服务，失败时回退原文。
//! - 批量模式输出为流式 JSON 数组，顺序与文件名排序一致。

mod options;
mod types;
mod findings;
mod detectors;
mod rules;
mod normalize;
mod error;
mod diagnostics;
mod container;
mod source;
mod workflow;
mod graph;
mod fields;
mod select;
mod translate;
mod extract;
mod scan;
mod node;

pub use options::{ExtractOptions, ScanStats};
pub use types::OutputItem;
pub use findings::{Candidate, Polarity, RawCandidate, Tier};
pub use detectors::{Classifier, NegativeDetector};
pub use rules::{
    ClassifierRules, Convention, ConventionScope, ExtractRules, Messages, NodeNames, ScriptRange, Thresholds,
    TranslateRules,
};
pub use normalize::{needs_decode, TextNormalizer};
pub use error::{ContainerError, DecodeError, TranslateError};
pub use diagnostics::{Diagnostics, SilentDiagnostics, TracingDiagnostics};
pub use container::{read_metadata, read_metadata_from_bytes, MetadataBundle};
pub use source::{CandidateSource, ScanContext};
pub use workflow::WorkflowScanner;
pub use graph::GraphScanner;
pub use fields::FieldScanner;
pub use select::{select, Selection};
pub use translate::{chunk_chars, translate_text, HttpTranslator, TranslationService};
pub use extract::{PromptExtractor, PromptReport, ReportStatus};
pub use scan::{scan_and_write, scan_with};
pub use node::{ImagePromptNode, ImageTensor, InputSpec, NodeOutput, NodeSpec, NODE_SPEC};
