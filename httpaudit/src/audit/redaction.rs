//! 機密情報除去とシリアライズのポリシー
//!
//! - ヘッダー名に機密キーワードを含むものはスナップショットから除外
//! - 構造化データはJSON文字列にシリアライズし、失敗時は理由を示す文字列で代替
//! - レスポンスは文字数上限で切り詰め、マーカーを付与

use axum::http::{HeaderMap, Method};
use serde::Serialize;
use std::collections::BTreeMap;

/// 機密ヘッダー判定に使う部分文字列（小文字）
pub const SENSITIVE_HEADER_PATTERNS: [&str; 4] = ["authorization", "cookie", "password", "token"];

/// レスポンス保存時の既定文字数上限
pub const DEFAULT_TRUNCATE_CHARS: usize = 5000;

/// 切り詰め時に付与するマーカー
pub const TRUNCATION_MARKER: &str = "... [TRUNCATED]";

/// 機密ヘッダーか判定する（小文字化した名前の部分一致）
pub fn is_sensitive_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SENSITIVE_HEADER_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
}

/// 機密ヘッダーを除いたヘッダーマップを作成する
///
/// 同名ヘッダーが複数ある場合は `, ` で連結する。
/// UTF-8として読めない値は除外する。
pub fn redact_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut redacted: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        if is_sensitive_header(name.as_str()) {
            continue;
        }
        let Ok(value) = value.to_str() else {
            continue;
        };
        redacted
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    redacted
}

/// ボディをキャプチャ対象とするメソッドか（POST/PUT/PATCH）
pub fn is_body_bearing(method: &Method) -> bool {
    method == Method::POST || method == Method::PUT || method == Method::PATCH
}

/// JSONにシリアライズする。失敗時は理由を示す文字列を返す
///
/// `subject` はフォールバック文字列に埋め込む対象名（例: `request data`）。
pub fn serialize_or_fallback<T: Serialize>(value: &T, subject: &str) -> String {
    match serde_json::to_string(value) {
        Ok(serialized) => serialized,
        Err(e) => format!("Failed to serialize {}: {}", subject, e),
    }
}

/// 文字数上限で切り詰め、超過時はマーカーを付与する
///
/// 上限は文字単位（バイト単位ではない）。上限以下ならそのまま返す。
pub fn truncate_with_marker(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            let mut truncated = text;
            truncated.truncate(byte_idx);
            truncated.push_str(TRUNCATION_MARKER);
            truncated
        }
        None => text,
    }
}
