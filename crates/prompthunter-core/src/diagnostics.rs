//! 诊断输出（由调用方注入，扫描器不直接使用全局日志）
use std::fmt;

use crate::findings::RawCandidate;

/// 扫描过程中的诊断回调
pub trait Diagnostics: Send + Sync {
    /// 扫描器产出一个候选
    fn candidate(&self, scanner: &str, candidate: &RawCandidate);
    /// 某个节点/字段被跳过（解析失败等）
    fn skipped(&self, scanner: &str, what: &str, reason: &dyn fmt::Display);
    /// 读取到的元数据字段（仅文本）
    fn field(&self, _key: &str, _value: &str) {}
}

/// 转发到 `tracing` 的默认实现
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn candidate(&self, scanner: &str, candidate: &RawCandidate) {
        tracing::debug!(
            scanner,
            source = %candidate.source,
            tier = ?candidate.tier,
            polarity = ?candidate.polarity,
            chars = candidate.text.chars().count(),
            "candidate"
        );
    }

    fn skipped(&self, scanner: &str, what: &str, reason: &dyn fmt::Display) {
        tracing::debug!(scanner, what, %reason, "skipped");
    }

    fn field(&self, key: &str, value: &str) {
        tracing::trace!(key, value, "metadata field");
    }
}

/// 丢弃所有诊断
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentDiagnostics;

impl Diagnostics for SilentDiagnostics {
    fn candidate(&self, _scanner: &str, _candidate: &RawCandidate) {}
    fn skipped(&self, _scanner: &str, _what: &str, _reason: &dyn fmt::Display) {}
}
