//! 監査レコードの型定義

use crate::common::ip::ClientOrigin;
use chrono::{DateTime, Utc};
use serde::ser::Error as _;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// 監査レコード（1エクスチェンジにつき1行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// レコードID（DB挿入後に設定）
    pub id: Option<i64>,
    /// リクエスト受信時刻
    pub request_timestamp: DateTime<Utc>,
    /// HTTPメソッド
    pub http_method: String,
    /// リクエストパス
    pub endpoint_path: String,
    /// クライアントIPアドレス
    pub client_ip: Option<String>,
    /// User-Agentヘッダー
    pub user_agent: Option<String>,
    /// リクエストスナップショット（シリアライズ済み）
    pub request_body_serialized: Option<String>,
    /// HTTPステータスコード（ステータス確定前に失敗した場合はNone）
    pub response_status: Option<u16>,
    /// レスポンススナップショット（シリアライズ済み、上限超過時は切り詰め）
    pub response_body_serialized: Option<String>,
    /// 処理時間（ミリ秒）
    pub processing_time_ms: i64,
    /// 未処理エラーの要約（`種別: メッセージ`）
    pub error_summary: Option<String>,
    /// 識別済みユーザー（認証連携用に予約）
    pub identified_user: Option<String>,
}

/// キャプチャしたボディの値
///
/// シリアライズ可能な値だけが保存データになる。
/// `Binary` は常にシリアライズに失敗し、フォールバック文字列に置き換わる。
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureValue {
    /// UTF-8テキスト
    Text(String),
    /// JSONとして解析できたボディ
    Json(serde_json::Value),
    /// テキスト化できないボディ
    Binary {
        /// バイト数
        len: usize,
    },
}

impl CaptureValue {
    /// 生バイト列から値を判定する
    ///
    /// JSON系Content-Typeで解析に成功すればJSON、UTF-8ならテキスト、それ以外はバイナリ。
    pub fn from_bytes(bytes: &[u8], content_type: Option<&str>) -> Self {
        let is_json = content_type
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false);
        if is_json {
            if let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) {
                return Self::Json(value);
            }
        }
        match std::str::from_utf8(bytes) {
            Ok(text) => Self::Text(text.to_string()),
            Err(_) => Self::Binary { len: bytes.len() },
        }
    }
}

impl Serialize for CaptureValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(text) => serializer.serialize_str(text),
            Self::Json(value) => value.serialize(serializer),
            Self::Binary { len } => Err(S::Error::custom(format!(
                "binary payload ({} bytes) is not representable as text",
                len
            ))),
        }
    }
}

/// リクエストスナップショット（前処理で作成）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSnapshot {
    /// HTTPメソッド
    pub method: String,
    /// リクエストパス
    pub uri: String,
    /// クエリ文字列
    pub query_string: Option<String>,
    /// 機密ヘッダーを除いたヘッダー
    pub headers: BTreeMap<String, String>,
    /// ボディ（POST/PUT/PATCHかつ非空の場合のみ）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<CaptureValue>,
}

/// レスポンススナップショット（後処理で作成）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseSnapshot {
    /// HTTPステータスコード
    pub status: u16,
    /// Content-Type
    pub content_type: Option<String>,
    /// ボディ（キャプチャできた場合のみ）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<CaptureValue>,
}

/// ハンドラーチェーンで発生した障害
///
/// エラーレスポンスのextensionsに格納するか、panicを捕捉して生成する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFault {
    /// 障害の種別（エラー型名など）
    pub kind: String,
    /// メッセージ
    pub message: String,
}

impl CapturedFault {
    /// 新しい障害情報を作成
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// 監査レコード用の要約（`種別: メッセージ`）
    pub fn summary(&self) -> String {
        format!("{}: {}", self.kind, self.message)
    }
}

/// 識別済みユーザー（認証レイヤーがレスポンスextensionsに設定する）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifiedUser(pub String);

/// ハンドラーチェーンの結果
///
/// 正常応答とpanicのどちらも後処理で同じように扱う。
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeOutcome {
    /// レスポンスが生成された（エラーレスポンスの場合は障害情報付き）
    Responded {
        /// レスポンススナップショット
        response: ResponseSnapshot,
        /// ハンドラーが報告した障害
        fault: Option<CapturedFault>,
    },
    /// ステータス確定前にハンドラーが異常終了した
    Aborted(CapturedFault),
}

impl ExchangeOutcome {
    /// レスポンススナップショット
    pub fn response(&self) -> Option<&ResponseSnapshot> {
        match self {
            Self::Responded { response, .. } => Some(response),
            Self::Aborted(_) => None,
        }
    }

    /// 障害情報
    pub fn fault(&self) -> Option<&CapturedFault> {
        match self {
            Self::Responded { fault, .. } => fault.as_ref(),
            Self::Aborted(fault) => Some(fault),
        }
    }
}

/// レコーダーに渡すキャプチャ済みペイロード
#[derive(Debug, Clone)]
pub struct CapturePayload {
    /// 前処理開始時刻
    pub started_at: DateTime<Utc>,
    /// HTTPメソッド
    pub method: String,
    /// リクエストパス
    pub path: String,
    /// User-Agentヘッダー
    pub user_agent: Option<String>,
    /// 接続元情報
    pub origin: ClientOrigin,
    /// リクエストスナップショット
    pub request: RequestSnapshot,
    /// ハンドラーチェーンの結果
    pub outcome: ExchangeOutcome,
    /// 処理時間（ミリ秒）
    pub elapsed_ms: i64,
    /// 識別済みユーザー
    pub identified_user: Option<String>,
}

/// ステータス別件数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBucket {
    /// ステータスコード（未確定はNone）
    pub status: Option<u16>,
    /// 件数
    pub count: i64,
}

/// 統計サマリー
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSummary {
    /// 期間内の総リクエスト数
    pub total_requests: i64,
    /// ステータス別件数（ステータス未確定は `"null"`）
    pub status_distribution: BTreeMap<String, i64>,
    /// 集計期間（時間）
    pub period_hours: i64,
    /// 集計時刻
    pub queried_at: DateTime<Utc>,
}

/// 保持期限切れ候補の報告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionCandidates {
    /// 候補件数
    pub identified: i64,
    /// 基準日時（これより古いレコードが候補）
    pub cutoff: DateTime<Utc>,
    /// 補足
    pub note: String,
}
