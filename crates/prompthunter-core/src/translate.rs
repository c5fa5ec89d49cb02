//! 可选的机器翻译
//!
//! 仅当胜出文本含目标文字时翻译：按字符数切块，逐块调用外部服务，
//! 结果以单个空格拼接。任何失败都回退为原文。
//! 外部调用是普通阻塞请求，不做重试；需要韧性的调用方自行包装。
use serde_json::Value;

use crate::diagnostics::Diagnostics;
use crate::error::TranslateError;
use crate::normalize::TextNormalizer;
use crate::rules::TranslateRules;

/// 外部翻译服务
pub trait TranslationService: Send + Sync {
    fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, TranslateError>;
}

/// 按字符边界切块（不感知句子）；`max_chars == 0` 时不切
pub fn chunk_chars(text: &str, max_chars: usize) -> Vec<&str> {
    if max_chars == 0 || text.is_empty() {
        return vec![text];
    }
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == max_chars {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    chunks.push(&text[start..]);
    chunks
}

/// 翻译胜出文本；非目标文字或服务失败时返回原文
pub fn translate_text(
    service: &dyn TranslationService,
    text: &str,
    normalizer: &TextNormalizer,
    rules: &TranslateRules,
    diagnostics: &dyn Diagnostics,
) -> String {
    if !normalizer.is_target_script(text) {
        return text.to_string();
    }
    let mut parts = Vec::new();
    for chunk in chunk_chars(text, rules.chunk_chars) {
        match service.translate(chunk, &rules.source, &rules.target) {
            Ok(t) => parts.push(t),
            Err(e) => {
                diagnostics.skipped("translate", "chunk", &e);
                return text.to_string();
            }
        }
    }
    parts.join(" ")
}

/// 基于 `translate_a/single` 接口的 HTTP 翻译（阻塞）
pub struct HttpTranslator {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpTranslator {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { client: reqwest::blocking::Client::new(), endpoint: endpoint.into() }
    }
}

impl TranslationService for HttpTranslator {
    fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, TranslateError> {
        if self.endpoint.trim().is_empty() {
            return Err(TranslateError::Unavailable("no endpoint configured".to_string()));
        }
        let body: Value = self
            .client
            .post(&self.endpoint)
            .query(&[("client", "gtx"), ("sl", source), ("tl", target), ("dt", "t")])
            .form(&[("q", text)])
            .send()?
            .error_for_status()?
            .json()?;
        parse_sentences(&body)
    }
}

/// 响应形如 `[[["译文", "原文", ...], ...], ...]`，拼接每句的第一个元素
fn parse_sentences(body: &Value) -> Result<String, TranslateError> {
    let sentences = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| TranslateError::UnexpectedResponse(truncate(body)))?;
    let mut out = String::new();
    for s in sentences {
        if let Some(part) = s.get(0).and_then(Value::as_str) {
            out.push_str(part);
        }
    }
    if out.is_empty() {
        return Err(TranslateError::UnexpectedResponse(truncate(body)));
    }
    Ok(out)
}

fn truncate(body: &Value) -> String {
    body.to_string().chars().take(200).collect()
}
