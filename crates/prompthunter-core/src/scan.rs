//! 批量提取主流程与并行调度
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::diagnostics::TracingDiagnostics;
use crate::extract::{PromptExtractor, PromptReport, ReportStatus};
use crate::options::{ExtractOptions, ScanStats};
use crate::rules::ExtractRules;
use crate::translate::{HttpTranslator, TranslationService};
use crate::types::OutputItem;

/// 识别为图片的扩展名（不区分大小写）
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// 扫描目录下的图片并将结果以 JSON 数组流式写入 `out`
///
/// 稳定性保证：先收集文件并按文件名排序，并行时由 writer 按序号重排，
/// 输出顺序与串行一致。
pub fn scan_and_write(input_dir: &Path, out: &mut dyn Write, opts: &ExtractOptions) -> Result<ScanStats> {
    // 加载规则文件（未指定则用内置默认）
    let rules = match &opts.rules_path {
        Some(p) => ExtractRules::load(p)?,
        None => ExtractRules::default(),
    };
    let translator: Option<Arc<dyn TranslationService>> = if opts.translate {
        Some(Arc::new(HttpTranslator::new(rules.translate.endpoint.clone())))
    } else {
        None
    };
    let extractor = Arc::new(PromptExtractor::new(rules)?);
    scan_with(input_dir, out, extractor, translator, opts.threads)
}

/// 与 [`scan_and_write`] 相同，但由调用方提供提取器与翻译服务
pub fn scan_with(
    input_dir: &Path,
    out: &mut dyn Write,
    extractor: Arc<PromptExtractor>,
    translator: Option<Arc<dyn TranslationService>>,
    threads: Option<usize>,
) -> Result<ScanStats> {
    let files = collect_images(input_dir)?;
    let threads = threads.unwrap_or_else(num_cpus::get);
    tracing::debug!(files = files.len(), threads, "collected images");

    let mut stats = ScanStats::default();
    let mut writer = ArrayWriter::new(out)?;

    if threads > 1 && files.len() > 1 {
        scan_parallel(files, &mut writer, extractor, translator, &mut stats, threads)?;
    } else {
        // 串行路径
        for path in &files {
            let report = extract_one(&extractor, translator.as_deref(), path);
            writer.push(&file_label(path), &report, &mut stats)?;
        }
    }

    writer.finish()?;
    Ok(stats)
}

/// 深度为 1 的图片文件，按文件名排序
fn collect_images(input_dir: &Path) -> Result<Vec<PathBuf>> {
    if !input_dir.is_dir() {
        anyhow::bail!("input is not a directory: {}", input_dir.display());
    }
    let mut files: Vec<PathBuf> = vec![];
    for entry in WalkDir::new(input_dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "skip unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_file() && is_image(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn extract_one(extractor: &PromptExtractor, translator: Option<&dyn TranslationService>, path: &Path) -> PromptReport {
    let report = extractor.extract_file(path, translator, &TracingDiagnostics);
    tracing::debug!(file = %path.display(), status = ?report.status, source = ?report.source, "extracted");
    report
}

/// 流式 JSON 数组写出
struct ArrayWriter<'w> {
    out: &'w mut dyn Write,
    first: bool,
}

impl<'w> ArrayWriter<'w> {
    fn new(out: &'w mut dyn Write) -> Result<Self> {
        write!(out, "[")?;
        Ok(Self { out, first: true })
    }

    fn push(&mut self, file: &str, report: &PromptReport, stats: &mut ScanStats) -> Result<()> {
        if report.status != ReportStatus::Error {
            stats.files_scanned += 1;
        }
        if matches!(report.status, ReportStatus::Found | ReportStatus::NegativeOnly | ReportStatus::Convention) {
            stats.prompts_found += 1;
        }
        if !self.first {
            write!(self.out, ",")?;
        } else {
            self.first = false;
        }
        serde_json::to_writer(&mut *self.out, &OutputItem::new(file, report))?;
        stats.outputs_written += 1;
        Ok(())
    }

    fn finish(self) -> Result<()> {
        write!(self.out, "]")?;
        Ok(())
    }
}

/// 并行调度：
/// - 建索引后使用 Rayon 线程池并行提取（单个文件内仍是串行）
/// - 当前线程作为 writer，按 idx 重排并流式写 JSON
fn scan_parallel(
    files: Vec<PathBuf>,
    writer: &mut ArrayWriter<'_>,
    extractor: Arc<PromptExtractor>,
    translator: Option<Arc<dyn TranslationService>>,
    stats: &mut ScanStats,
    threads: usize,
) -> Result<()> {
    use crossbeam_channel as channel;
    use rayon::prelude::*;

    type Msg = (usize /*idx*/, String /*file*/, PromptReport);
    let (tx, rx) = channel::bounded::<Msg>(256);

    // writer 持有 &mut out，留在当前线程；提取在后台线程的 Rayon 池中执行
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("build rayon pool")?;
    let scan_thread = std::thread::spawn(move || {
        pool.install(|| {
            files.par_iter().enumerate().for_each_with(tx, |tx, (idx, path)| {
                let report = extract_one(&extractor, translator.as_deref(), path);
                let _ = tx.send((idx, file_label(path), report));
            });
        });
        // 结束后 Sender 全部被丢弃，Receiver 将收到关闭信号
    });

    let mut next_idx: usize = 0;
    let mut buffer: BTreeMap<usize, (String, PromptReport)> = BTreeMap::new();
    let mut write_result = Ok(());

    while let Ok((idx, file, report)) = rx.recv() {
        if write_result.is_err() {
            continue;
        }
        buffer.insert(idx, (file, report));
        // 从 next_idx 开始顺序冲刷
        while let Some((file, report)) = buffer.remove(&next_idx) {
            if let Err(e) = writer.push(&file, &report, stats) {
                write_result = Err(e);
                break;
            }
            next_idx += 1;
        }
    }

    if scan_thread.join().is_err() {
        anyhow::bail!("extraction worker panicked");
    }
    write_result
}
