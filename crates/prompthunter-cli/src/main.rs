use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prompthunter_core::{
    read_metadata, scan_and_write, ExtractOptions, ExtractRules, HttpTranslator, OutputItem, PromptExtractor,
    TracingDiagnostics, TranslationService,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// 命令行入口（基于 clap）
#[derive(Parser, Debug)]
#[command(name = "prompthunter", version, about = "이미지 메타데이터에서 프롬프트 추출")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 从单张图片提取提示词
    Extract {
        /// 图片路径
        #[arg(long)]
        image: PathBuf,

        /// 含目标文字时调用翻译服务
        #[arg(long)]
        translate: bool,

        /// 规则文件路径（TOML），默认使用内置规则
        #[arg(long)]
        rules: Option<PathBuf>,

        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },
    /// 批量处理目录并生成 result.json
    Scan {
        /// 输入目录
        #[arg(long)]
        input: PathBuf,

        /// 输出文件（JSON 数组）
        #[arg(long, default_value = "./result.json")]
        output: PathBuf,

        /// 线程数（"auto"=CPU 核心数）
        #[arg(long, default_value = "auto")]
        threads: String,

        #[arg(long)]
        translate: bool,

        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// 列出图片中的元数据字段与 EXIF 标签
    Fields {
        #[arg(long)]
        image: PathBuf,
    },
}

fn main() -> Result<()> {
    // 初始化日志（支持通过 RUST_LOG 控制等级，例如 info、debug）
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Extract { image, translate, rules, json } => {
            let rules = load_rules(rules.as_deref())?;
            let translator = translate.then(|| HttpTranslator::new(rules.translate.endpoint.clone()));
            let extractor = PromptExtractor::new(rules)?;
            let report = extractor.extract_file(
                &image,
                translator.as_ref().map(|t| t as &dyn TranslationService),
                &TracingDiagnostics,
            );

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            if json {
                let file = image.display().to_string();
                serde_json::to_writer_pretty(&mut out, &OutputItem::new(&file, &report))?;
                writeln!(out)?;
            } else {
                writeln!(out, "{}", report.prompt)?;
                if translate && report.translated != report.prompt {
                    writeln!(out, "{}", report.translated)?;
                }
            }
        }
        Commands::Scan { input, output, threads, translate, rules } => {
            info!(?input, ?output, "starting scan");

            // 以缓冲方式打开输出文件，按 JSON 数组流式写入
            let mut out = BufWriter::new(File::create(&output).context("create output file")?);
            // 解析线程参数："auto" 表示自动（等于 CPU 核数）；其他为具体数值
            let opts = ExtractOptions { translate, rules_path: rules, threads: parse_threads(&threads) };
            let stats = scan_and_write(&input, &mut out, &opts).context("scan and write failed")?;
            out.flush().context("flush output file")?;

            info!(
                files_scanned = stats.files_scanned,
                prompts_found = stats.prompts_found,
                outputs_written = stats.outputs_written,
                "scan finished"
            );
        }
        Commands::Fields { image } => {
            let bundle = read_metadata(&image)?;
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let mut keys: Vec<_> = bundle.fields.iter().collect();
            keys.sort_by(|a, b| a.0.cmp(b.0));
            for (key, value) in keys {
                writeln!(out, "{key}\t{} chars", value.chars().count())?;
            }
            for (tag, value) in &bundle.exif {
                writeln!(out, "exif.{tag}\t{} chars", value.chars().count())?;
            }
            if bundle.is_empty() {
                writeln!(out, "(no metadata)")?;
            }
        }
    }

    Ok(())
}

fn load_rules(path: Option<&Path>) -> Result<ExtractRules> {
    match path {
        Some(p) => ExtractRules::load(p),
        None => Ok(ExtractRules::default()),
    }
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    // 日志写到 stderr，stdout 留给提取结果
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// 解析线程参数
fn parse_threads(s: &str) -> Option<usize> {
    if s.eq_ignore_ascii_case("auto") {
        return None;
    }
    match s.parse::<usize>() {
        Ok(n) if n >= 1 => Some(n),
        _ => None,
    }
}
