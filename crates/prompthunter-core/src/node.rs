//! 宿主节点边界：声明输入输出、加载像素、兜底错误
//!
//! 核心逻辑不碰像素；这里只负责把图片转成带批维度的张量，
//! 并保证任何异常都变成“零图 + 错误文本”，不让宿主崩溃。
use image::DynamicImage;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use crate::diagnostics::Diagnostics;
use crate::extract::PromptExtractor;
use crate::translate::TranslationService;

/// 兜底零图的边长
const FALLBACK_SIDE: usize = 64;

/// 输入声明
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSpec {
    pub name: &'static str,
    pub kind: &'static str,
    pub required: bool,
    pub default: Option<&'static str>,
}

/// 节点的对外描述
#[derive(Debug, Clone, Copy)]
pub struct NodeSpec {
    pub name: &'static str,
    pub display_name: &'static str,
    pub category: &'static str,
    pub inputs: &'static [InputSpec],
    pub outputs: &'static [&'static str],
}

pub const NODE_SPEC: NodeSpec = NodeSpec {
    name: "ImagePromptExtractor",
    display_name: "이미지 프롬프트 추출기",
    category: "image/prompt",
    inputs: &[
        InputSpec { name: "image_path", kind: "STRING", required: true, default: None },
        InputSpec { name: "translate", kind: "BOOLEAN", required: false, default: Some("false") },
    ],
    outputs: &["IMAGE", "STRING", "STRING"],
};

/// RGB 浮点张量，形状 `[1, H, W, 3]`，取值 `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub shape: [usize; 4],
    pub data: Vec<f32>,
}

impl ImageTensor {
    pub fn zeros(height: usize, width: usize) -> Self {
        Self { shape: [1, height, width, 3], data: vec![0.0; height * width * 3] }
    }

    pub fn from_image(img: &DynamicImage) -> Self {
        let rgb = img.to_rgb32f();
        let (w, h) = rgb.dimensions();
        Self { shape: [1, h as usize, w as usize, 3], data: rgb.into_raw() }
    }
}

/// 节点输出
#[derive(Debug, Clone)]
pub struct NodeOutput {
    pub image: ImageTensor,
    pub prompt: String,
    pub translated: String,
}

/// 宿主侧节点
pub struct ImagePromptNode {
    extractor: PromptExtractor,
    translator: Option<Box<dyn TranslationService>>,
}

impl ImagePromptNode {
    pub fn new(extractor: PromptExtractor, translator: Option<Box<dyn TranslationService>>) -> Self {
        Self { extractor, translator }
    }

    pub fn spec(&self) -> &'static NodeSpec {
        &NODE_SPEC
    }

    pub fn run(&self, image_path: &Path, translate: bool, diagnostics: &dyn Diagnostics) -> NodeOutput {
        let result = catch_unwind(AssertUnwindSafe(|| self.run_inner(image_path, translate, diagnostics)));
        match result {
            Ok(Ok(out)) => out,
            Ok(Err(msg)) => self.fallback(msg),
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                self.fallback(msg)
            }
        }
    }

    fn run_inner(&self, image_path: &Path, translate: bool, diagnostics: &dyn Diagnostics) -> Result<NodeOutput, String> {
        let img = image::open(image_path).map_err(|e| format!("{}: {e}", image_path.display()))?;
        let translator = if translate { self.translator.as_deref() } else { None };
        let report = self.extractor.extract_file(image_path, translator, diagnostics);
        Ok(NodeOutput { image: ImageTensor::from_image(&img), prompt: report.prompt, translated: report.translated })
    }

    fn fallback(&self, msg: String) -> NodeOutput {
        tracing::warn!(error = %msg, "image prompt node failed, returning blank image");
        let prompt = format!("{}{}", self.extractor.rules().messages.error_prefix, msg);
        NodeOutput { image: ImageTensor::zeros(FALLBACK_SIDE, FALLBACK_SIDE), translated: prompt.clone(), prompt }
    }
}
