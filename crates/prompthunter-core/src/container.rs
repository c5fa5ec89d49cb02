//! 图片容器读取：PNG 文本块 + EXIF
//!
//! PNG 块格式：4 字节长度（大端）、4 字节类型、数据、4 字节 CRC。
//! - tEXt：keyword\0text
//! - zTXt：keyword\0method + zlib 数据
//! - iTXt：keyword\0flag\0method\0language\0translated_keyword\0text
//!
//! 只读取元数据，不触碰像素。
use flate2::read::ZlibDecoder;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;

use crate::error::ContainerError;

/// PNG 文件签名
const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// 单个压缩文本块解压后的上限，防止 zip bomb
const MAX_INFLATED: u64 = 64 * 1024 * 1024;

/// 一次提取所需的全部元数据（只读）
#[derive(Debug, Clone, Default)]
pub struct MetadataBundle {
    /// 文本字段：`workflow`、`prompt`、`parameters`、`Comment` 等
    pub fields: HashMap<String, String>,
    /// EXIF 标签名 → 字符串值（保持文件中的顺序）
    pub exif: Vec<(String, String)>,
}

impl MetadataBundle {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn with_field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn with_exif(mut self, tag: &str, value: impl Into<String>) -> Self {
        self.exif.push((tag.to_string(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.exif.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerKind {
    Png,
    Jpeg,
    Tiff,
    WebP,
}

fn sniff(bytes: &[u8]) -> Option<ContainerKind> {
    if bytes.starts_with(&PNG_SIGNATURE) {
        Some(ContainerKind::Png)
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(ContainerKind::Jpeg)
    } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        Some(ContainerKind::Tiff)
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some(ContainerKind::WebP)
    } else {
        None
    }
}

/// 读取图片文件的元数据
pub fn read_metadata(path: &Path) -> Result<MetadataBundle, ContainerError> {
    if !path.exists() {
        return Err(ContainerError::NotFound(path.display().to_string()));
    }
    let bytes = std::fs::read(path)?;
    read_metadata_from_bytes(&bytes)
        .map_err(|e| match e {
            ContainerError::Unsupported(_) => ContainerError::Unsupported(path.display().to_string()),
            other => other,
        })
}

/// 从内存中的图片字节读取元数据
pub fn read_metadata_from_bytes(bytes: &[u8]) -> Result<MetadataBundle, ContainerError> {
    let kind = sniff(bytes).ok_or_else(|| ContainerError::Unsupported("unknown signature".to_string()))?;
    let mut bundle = MetadataBundle::default();

    match kind {
        ContainerKind::Png => {
            let exif_raw = parse_png_chunks(bytes, &mut bundle.fields);
            if let Some(raw) = exif_raw {
                if let Ok(exif) = exif::Reader::new().read_raw(raw) {
                    bundle.exif = collect_exif_strings(&exif);
                }
            }
        }
        ContainerKind::Jpeg | ContainerKind::Tiff | ContainerKind::WebP => {
            // 没有 EXIF 是正常情况，不视为错误
            let mut cursor = Cursor::new(bytes);
            if let Ok(exif) = exif::Reader::new().read_from_container(&mut cursor) {
                bundle.exif = collect_exif_strings(&exif);
            }
        }
    }

    Ok(bundle)
}

/// 遍历 PNG 块，收集文本字段；返回 eXIf 块的原始数据（若有）
///
/// 截断或损坏的块会终止遍历，已收集的字段保留。
fn parse_png_chunks(bytes: &[u8], fields: &mut HashMap<String, String>) -> Option<Vec<u8>> {
    let mut offset = PNG_SIGNATURE.len();
    let mut exif_raw = None;

    while offset + 8 <= bytes.len() {
        let len = u32::from_be_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]]) as usize;
        let chunk_type = &bytes[offset + 4..offset + 8];
        let data_start = offset + 8;
        let data_end = match data_start.checked_add(len) {
            Some(end) if end <= bytes.len() => end,
            _ => break,
        };
        let data = &bytes[data_start..data_end];

        match chunk_type {
            b"IEND" => break,
            b"tEXt" => parse_text_chunk(data, fields),
            b"zTXt" => parse_ztxt_chunk(data, fields),
            b"iTXt" => parse_itxt_chunk(data, fields),
            b"eXIf" => exif_raw = Some(data.to_vec()),
            _ => {}
        }

        // 跳过 CRC
        offset = data_end + 4;
    }

    exif_raw
}

/// tEXt 按规范是 Latin-1；实际常见 UTF-8，先尝试 UTF-8
fn latin1_or_utf8(data: &[u8]) -> String {
    match std::str::from_utf8(data) {
        Ok(s) => s.to_string(),
        Err(_) => data.iter().map(|&b| b as char).collect(),
    }
}

fn inflate(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data).take(MAX_INFLATED).read_to_end(&mut out).ok()?;
    Some(out)
}

fn split_keyword(data: &[u8]) -> Option<(String, &[u8])> {
    let null_pos = data.iter().position(|&b| b == 0)?;
    let keyword = latin1_or_utf8(&data[..null_pos]);
    if keyword.is_empty() {
        return None;
    }
    Some((keyword, &data[null_pos + 1..]))
}

fn parse_text_chunk(data: &[u8], fields: &mut HashMap<String, String>) {
    if let Some((keyword, rest)) = split_keyword(data) {
        fields.insert(keyword, latin1_or_utf8(rest));
    }
}

fn parse_ztxt_chunk(data: &[u8], fields: &mut HashMap<String, String>) {
    let (keyword, rest) = match split_keyword(data) {
        Some(v) => v,
        None => return,
    };
    // 第一个字节为压缩方法（仅定义了 0 = zlib）
    if rest.first() != Some(&0) {
        return;
    }
    if let Some(text) = inflate(&rest[1..]) {
        fields.insert(keyword, latin1_or_utf8(&text));
    }
}

fn parse_itxt_chunk(data: &[u8], fields: &mut HashMap<String, String>) {
    let (keyword, rest) = match split_keyword(data) {
        Some(v) => v,
        None => return,
    };
    if rest.len() < 2 {
        return;
    }
    let compressed = rest[0] == 1;
    let mut tail = &rest[2..];

    // language tag 与 translated keyword 各以 \0 结尾
    for _ in 0..2 {
        match tail.iter().position(|&b| b == 0) {
            Some(p) => tail = &tail[p + 1..],
            None => return,
        }
    }

    let text = if compressed {
        match inflate(tail) {
            Some(t) => String::from_utf8_lossy(&t).into_owned(),
            None => return,
        }
    } else {
        String::from_utf8_lossy(tail).into_owned()
    };
    fields.insert(keyword, text);
}

fn collect_exif_strings(exif: &exif::Exif) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for field in exif.fields() {
        let value = match &field.value {
            exif::Value::Ascii(vecs) => {
                let parts: Vec<String> = vecs
                    .iter()
                    .map(|v| latin1_or_utf8(v).trim_end_matches('\0').trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if parts.is_empty() {
                    continue;
                }
                parts.join("\n")
            }
            exif::Value::Undefined(bytes, _) if field.tag == exif::Tag::UserComment => {
                match decode_user_comment(bytes) {
                    Some(s) => s,
                    None => continue,
                }
            }
            _ => continue,
        };
        out.push((field.tag.to_string(), value));
    }
    out
}

/// 解码 EXIF UserComment：前 8 字节为字符集标识
pub(crate) fn decode_user_comment(bytes: &[u8]) -> Option<String> {
    if bytes.len() < 8 {
        return None;
    }
    let (charset, payload) = bytes.split_at(8);
    let text = if charset == b"UNICODE\0" {
        decode_utf16_guess(payload)
    } else {
        latin1_or_utf8(payload)
    };
    let text = text.trim_end_matches('\0').trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// UTF-16 字节序未标明：按偶/奇位置的零字节数猜测（ASCII 为主的文本高字节为 0）
fn decode_utf16_guess(payload: &[u8]) -> String {
    let (mut zero_even, mut zero_odd) = (0usize, 0usize);
    for (i, &b) in payload.iter().enumerate() {
        if b == 0 {
            if i % 2 == 0 {
                zero_even += 1;
            } else {
                zero_odd += 1;
            }
        }
    }
    let big_endian = zero_even > zero_odd;
    let units = payload.chunks_exact(2).map(|p| {
        if big_endian {
            u16::from_be_bytes([p[0], p[1]])
        } else {
            u16::from_le_bytes([p[0], p[1]])
        }
    });
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}
