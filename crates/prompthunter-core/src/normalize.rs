//! 文本归一化：还原 `\uXXXX` 转义并检测目标文字
//!
//! 解码是全函数：任何失败都退化为原样返回，绝不向调用方报错。
//! 三级回退：完整转义解码 → 仅替换 `\uXXXX` → 原文。
use regex::Regex;
use std::sync::OnceLock;

use crate::error::DecodeError;
use crate::rules::ScriptRange;

/// 多层转义（如 JSON 套 JSON）最多展开的轮数
const MAX_DECODE_PASSES: usize = 8;

fn escape_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\\u[0-9a-fA-F]{4}").expect("escape pattern"))
}

fn escape_pair_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // 优先匹配代理对，其次单个转义
    RE.get_or_init(|| {
        Regex::new(r"\\u([dD][89abAB][0-9a-fA-F]{2})\\u([dD][c-fC-F][0-9a-fA-F]{2})|\\u([0-9a-fA-F]{4})")
            .expect("escape pair pattern")
    })
}

/// 是否包含至少一个 `\uXXXX` 转义序列
pub fn needs_decode(text: &str) -> bool {
    escape_regex().is_match(text)
}

/// 文本归一化器（目标文字区间可配置）
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    script: ScriptRange,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new(ScriptRange::default())
    }
}

impl TextNormalizer {
    pub fn new(script: ScriptRange) -> Self {
        Self { script }
    }

    pub fn script(&self) -> &ScriptRange {
        &self.script
    }

    pub fn needs_decode(&self, text: &str) -> bool {
        needs_decode(text)
    }

    /// 是否含有目标文字区间内的字符
    pub fn is_target_script(&self, text: &str) -> bool {
        text.chars().any(|c| self.script.contains(c))
    }

    /// 解码转义文本；已含目标文字或无转义时原样返回
    ///
    /// 结果若仍含转义（多层转义），继续展开直到不再变化，
    /// 因此 `decode(decode(x)) == decode(x)`。
    pub fn decode(&self, text: &str) -> String {
        let mut current = text.to_string();
        for _ in 0..MAX_DECODE_PASSES {
            if self.is_target_script(&current) || !needs_decode(&current) {
                break;
            }
            let next = decode_once(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }
}

fn decode_once(text: &str) -> String {
    match unescape_full(text) {
        Ok(s) => s,
        Err(_) => substitute_unicode_escapes(text).unwrap_or_else(|_| text.to_string()),
    }
}

/// 第一级：完整的反斜杠转义解码
///
/// 支持 `\\ \" \' \/ \n \r \t \b \f \0 \xHH \uXXXX \UXXXXXXXX`，代理对会被合并；
/// 未知转义原样保留。孤立代理或截断的转义视为失败。
pub(crate) fn unescape_full(text: &str) -> Result<String, DecodeError> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices();

    while let Some((at, ch)) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let (_, esc) = chars.next().ok_or(DecodeError::TrailingBackslash)?;
        match esc {
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            '/' => out.push('/'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0C}'),
            '0' => out.push('\0'),
            'x' => {
                let cp = take_hex(&mut chars, 2, at)?;
                out.push(char::from_u32(cp).ok_or(DecodeError::InvalidCodePoint(cp))?);
            }
            'U' => {
                let cp = take_hex(&mut chars, 8, at)?;
                out.push(char::from_u32(cp).ok_or(DecodeError::InvalidCodePoint(cp))?);
            }
            'u' => {
                let hi = take_hex(&mut chars, 4, at)?;
                if (0xD800..0xDC00).contains(&hi) {
                    // 高位代理必须紧跟低位代理
                    let mut look = chars.clone();
                    let is_pair = matches!(look.next(), Some((_, '\\'))) && matches!(look.next(), Some((_, 'u')));
                    if !is_pair {
                        return Err(DecodeError::InvalidCodePoint(hi));
                    }
                    chars.next();
                    chars.next();
                    let lo = take_hex(&mut chars, 4, at)?;
                    if !(0xDC00..0xE000).contains(&lo) {
                        return Err(DecodeError::InvalidCodePoint(lo));
                    }
                    let cp = 0x10000 + ((hi - 0xD800) << 10) + (lo - 0xDC00);
                    out.push(char::from_u32(cp).ok_or(DecodeError::InvalidCodePoint(cp))?);
                } else {
                    out.push(char::from_u32(hi).ok_or(DecodeError::InvalidCodePoint(hi))?);
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }

    Ok(out)
}

fn take_hex(
    chars: &mut std::str::CharIndices<'_>,
    digits: usize,
    at: usize,
) -> Result<u32, DecodeError> {
    let mut cp: u32 = 0;
    for _ in 0..digits {
        let d = chars
            .next()
            .and_then(|(_, c)| c.to_digit(16))
            .ok_or(DecodeError::TruncatedEscape { at })?;
        cp = cp * 16 + d;
    }
    Ok(cp)
}

/// 第二级：只替换 `\uXXXX`（含代理对），其余字符不动
pub(crate) fn substitute_unicode_escapes(text: &str) -> Result<String, DecodeError> {
    let re = escape_pair_regex();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in re.captures_iter(text) {
        let m = match caps.get(0) {
            Some(m) => m,
            None => continue,
        };
        out.push_str(&text[last..m.start()]);
        let cp = match (caps.get(1), caps.get(2), caps.get(3)) {
            (Some(hi), Some(lo), _) => {
                let hi = u32::from_str_radix(hi.as_str(), 16).map_err(|_| DecodeError::TruncatedEscape { at: m.start() })?;
                let lo = u32::from_str_radix(lo.as_str(), 16).map_err(|_| DecodeError::TruncatedEscape { at: m.start() })?;
                0x10000 + ((hi - 0xD800) << 10) + (lo - 0xDC00)
            }
            (_, _, Some(single)) => {
                u32::from_str_radix(single.as_str(), 16).map_err(|_| DecodeError::TruncatedEscape { at: m.start() })?
            }
            _ => continue,
        };
        out.push(char::from_u32(cp).ok_or(DecodeError::InvalidCodePoint(cp))?);
        last = m.end();
    }
    out.push_str(&text[last..]);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn escape_all(s: &str) -> String {
        s.chars().map(|c| format!("\\u{:04x}", c as u32)).collect()
    }

    #[test]
    fn decodes_hangul_greeting() {
        let n = TextNormalizer::default();
        assert_eq!(n.decode("\\uc548\\ub155\\ud558\\uc138\\uc694"), "안녕하세요");
    }

    #[test]
    fn decodes_mixed_ascii_and_escapes() {
        let n = TextNormalizer::default();
        let raw = "\\uc544\\ub984\\ub2e4\\uc6b4 \\ud55c\\uad6d \\uc5ec\\uc131";
        assert_eq!(n.decode(raw), "아름다운 한국 여성");
    }

    #[test]
    fn round_trips_escaped_hangul() {
        let n = TextNormalizer::default();
        for sample in ["가", "한국어문장", "힣갛각", "프롬프트테스트"] {
            assert_eq!(n.decode(&escape_all(sample)), sample);
        }
    }

    #[test]
    fn native_text_is_left_alone() {
        let n = TextNormalizer::default();
        // 已含韩文时即使混有转义也不再解码
        let text = "안녕 \\u0041";
        assert_eq!(n.decode(text), text);
        assert_eq!(n.decode("plain ascii prompt"), "plain ascii prompt");
    }

    #[test]
    fn decode_is_idempotent() {
        let n = TextNormalizer::default();
        let inputs = [
            "\\uc548\\ub155",
            "\\\\uc548\\\\ub155",
            "line\\nbreak \\u0041",
            "broken \\ud800 tail",
            "trailing \\",
            "안녕하세요",
            "",
            "\\ud83d\\ude00 smile",
        ];
        for x in inputs {
            let once = n.decode(x);
            assert_eq!(n.decode(&once), once, "input {x:?}");
        }
    }

    #[test]
    fn nested_escapes_unwrap_fully() {
        let n = TextNormalizer::default();
        assert_eq!(n.decode("\\\\uc548\\\\ub155"), "안녕");
    }

    #[test]
    fn surrogate_pairs_are_joined() {
        assert_eq!(unescape_full("\\ud83d\\ude00").unwrap(), "😀");
        assert_eq!(
            substitute_unicode_escapes("x \\ud83d\\ude00 \\uc548").unwrap(),
            "x 😀 안"
        );
    }

    #[test]
    fn lone_surrogate_falls_back_to_identity() {
        let n = TextNormalizer::default();
        let raw = "bad \\udc00 escape";
        assert!(unescape_full(raw).is_err());
        assert!(substitute_unicode_escapes(raw).is_err());
        assert_eq!(n.decode(raw), raw);
    }

    #[test]
    fn second_tier_handles_trailing_backslash() {
        let n = TextNormalizer::default();
        // 第一级因末尾反斜杠失败，由第二级替换 \uXXXX
        let raw = "\\uc548\\ub155 \\";
        assert!(unescape_full(raw).is_err());
        assert_eq!(n.decode(raw), "안녕 \\");
    }

    #[test]
    fn unknown_escapes_are_kept() {
        assert_eq!(unescape_full("a\\qb \\u0041").unwrap(), "a\\qb A");
    }

    #[test]
    fn needs_decode_requires_four_hex_digits() {
        assert!(needs_decode("x \\uac00"));
        assert!(!needs_decode("x \\u12"));
        assert!(!needs_decode("x u1234"));
    }

    #[test]
    fn configurable_script_range() {
        let cyrillic = ScriptRange { name: "cyrillic".to_string(), start: 0x0400, end: 0x04FF };
        let n = TextNormalizer::new(cyrillic);
        assert!(n.is_target_script("привет"));
        assert!(!n.is_target_script("안녕"));
        assert_eq!(n.decode("\\u043f\\u0440\\u0438"), "при");
    }
}
