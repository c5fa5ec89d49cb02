//! 公共类型（对外暴露）
use serde::Serialize;

use crate::extract::{PromptReport, ReportStatus};

/// 输出项结构（对应 result.json 的单个元素）
#[derive(Debug, Clone, Serialize)]
pub struct OutputItem<'a> {
    pub file: &'a str,
    pub prompt: &'a str,
    pub translated: &'a str,
    pub source: Option<&'a str>,
    pub status: ReportStatus,
}

impl<'a> OutputItem<'a> {
    pub fn new(file: &'a str, report: &'a PromptReport) -> Self {
        Self {
            file,
            prompt: &report.prompt,
            translated: &report.translated,
            source: report.source.as_deref(),
            status: report.status,
        }
    }
}
