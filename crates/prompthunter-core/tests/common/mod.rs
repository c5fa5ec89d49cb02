//! 集成测试共用的图片构造工具
#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};

use flate2::Crc;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};

/// 带合法 CRC 的 PNG 块
pub fn chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut crc = Crc::new();
    crc.update(kind);
    crc.update(data);
    let mut out = Vec::with_capacity(data.len() + 12);
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    out.extend_from_slice(&crc.sum().to_be_bytes());
    out
}

pub fn text_chunk(key: &str, value: &str) -> Vec<u8> {
    let mut data = key.as_bytes().to_vec();
    data.push(0);
    // tEXt 规定为 Latin-1，这里与生成器一样直接写 UTF-8
    data.extend_from_slice(value.as_bytes());
    chunk(b"tEXt", &data)
}

/// 可被 `image` 解码的小图，`fields` 以 tEXt 块插在 IHDR 之后
pub fn png_with_fields(width: u32, height: u32, fields: &[(&str, &str)]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([200, 100, 50]));
    let mut encoded = Cursor::new(Vec::new());
    img.write_to(&mut encoded, ImageFormat::Png).expect("encode png");
    let encoded = encoded.into_inner();

    // 签名 8 字节 + IHDR（4 长度 + 4 类型 + 13 数据 + 4 CRC）
    let ihdr_end = 8 + 4 + 4 + 13 + 4;
    let mut out = encoded[..ihdr_end].to_vec();
    for (k, v) in fields {
        out.extend(text_chunk(k, v));
    }
    out.extend_from_slice(&encoded[ihdr_end..]);
    out
}

pub fn write_png(dir: &Path, name: &str, fields: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, png_with_fields(4, 3, fields)).expect("write png");
    path
}

/// 编码器 `text` 引用翻译桥接节点的执行图
pub fn graph_encoder_via_translator(korean: &str) -> String {
    json!({
        "3": { "class_type": "KSampler", "inputs": { "positive": ["6", 0], "seed": 7 } },
        "6": { "class_type": "CLIPTextEncode", "inputs": { "text": ["12", 0], "clip": ["4", 1] } },
        "12": { "class_type": "DeepTranslatorTextNode", "inputs": { "text": korean, "from_translate": "korean", "to_translate": "english" } }
    })
    .to_string()
}

pub fn graph_with_load_image(image: &str, extra: Value) -> String {
    let mut doc = json!({
        "10": { "class_type": "LoadImage", "inputs": { "image": image, "upload": "image" } }
    });
    if let (Some(map), Value::Object(extra)) = (doc.as_object_mut(), extra) {
        map.extend(extra);
    }
    doc.to_string()
}
