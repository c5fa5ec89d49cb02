//! 库内部错误类型
//!
//! 这些错误都不会越过提取边界：调用方最终总是拿到一段文本。
use thiserror::Error;

/// 转义解码失败（由归一化器内部回退吸收）
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("dangling backslash at end of text")]
    TrailingBackslash,
    #[error("truncated escape sequence at byte {at}")]
    TruncatedEscape { at: usize },
    #[error("escape does not name a valid scalar value: U+{0:04X}")]
    InvalidCodePoint(u32),
}

/// 图片容器读取失败；Display 文案直接作为返回给用户的说明
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("이미지 파일을 찾을 수 없습니다: {0}")]
    NotFound(String),
    #[error("이미지를 읽을 수 없습니다: {0}")]
    Io(#[from] std::io::Error),
    #[error("지원하지 않는 이미지 형식입니다: {0}")]
    Unsupported(String),
}

/// 外部翻译服务失败（由翻译器回退为原文）
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("translation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected translation response: {0}")]
    UnexpectedResponse(String),
    #[error("translation service unavailable: {0}")]
    Unavailable(String),
}
