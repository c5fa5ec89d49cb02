//! 批量选项与统计信息（模块）
use std::path::PathBuf;

/// 批量提取选项
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// 对胜出文本调用翻译服务
    pub translate: bool,
    /// 规则文件路径（TOML）；为空则使用内置默认规则
    pub rules_path: Option<PathBuf>,
    /// 线程数：None 表示自动（等于 CPU 核数）；Some(1) 走串行
    pub threads: Option<usize>,
}

/// 批量统计信息（便于 CLI 打印）
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanStats {
    /// 成功读取元数据的图片数
    pub files_scanned: usize,
    /// 得到 found / negative_only / convention 结果的图片数
    pub prompts_found: usize,
    pub outputs_written: usize,
}
