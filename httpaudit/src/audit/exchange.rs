//! 再読込可能なエクスチェンジラッパー
//!
//! リクエスト・レスポンスのボディをメモリにバッファし、
//! 下流ハンドラーとクライアントから見えるバイト列を変えずに後から参照できるようにする。

use axum::{
    body::{Body, Bytes},
    http::{header, request::Parts, HeaderMap, Request, StatusCode},
    response::Response,
};
use futures::{stream, StreamExt};
use tracing::{error, warn};

/// Content-Typeヘッダー値を取得する
pub fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// バッファ済みリクエスト
pub struct BufferedRequest {
    /// 下流に渡すリクエスト（ボディは読み取り前と同じバイト列）
    pub request: Request<Body>,
    /// バッファしたボディ。上限超過・読み取り失敗で素通しした場合はNone
    pub body: Option<Bytes>,
}

impl BufferedRequest {
    fn passthrough(parts: Parts, body: Body) -> Self {
        Self {
            request: Request::from_parts(parts, body),
            body: None,
        }
    }
}

/// リクエストボディを全てバッファし、同じバイト列を持つリクエストを再構築する
///
/// `Content-Length` が `limit` を超える場合は読まずにそのまま返す。
/// 長さ不明のボディが途中で `limit` を超えた場合や読み取りエラーの場合は、
/// 読み取り済みの先頭部分と残りのストリームを連結して下流に渡す（キャプチャはしない）。
pub async fn buffer_request(request: Request<Body>, limit: usize) -> BufferedRequest {
    if declared_length(request.headers()).is_some_and(|len| len > limit) {
        warn!(
            path = %request.uri().path(),
            limit,
            "Request body exceeds replay buffer limit, passing through without capture"
        );
        return BufferedRequest {
            request,
            body: None,
        };
    }

    let (parts, body) = request.into_parts();
    let mut rest = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut read = 0usize;

    while let Some(frame) = rest.next().await {
        match frame {
            Ok(chunk) => {
                read = read.saturating_add(chunk.len());
                chunks.push(chunk);
                if read > limit {
                    warn!(
                        path = %parts.uri.path(),
                        limit,
                        "Streamed request body exceeds replay buffer limit, passing through without capture"
                    );
                    let prefix = stream::iter(chunks.into_iter().map(Ok::<Bytes, axum::Error>));
                    return BufferedRequest::passthrough(parts, Body::from_stream(prefix.chain(rest)));
                }
            }
            Err(e) => {
                warn!(
                    path = %parts.uri.path(),
                    "Failed to read request body, forwarding it without capture: {}",
                    e
                );
                let replay = chunks
                    .into_iter()
                    .map(Ok::<Bytes, axum::Error>)
                    .chain(std::iter::once(Err(e)));
                return BufferedRequest::passthrough(parts, Body::from_stream(stream::iter(replay)));
            }
        }
    }

    let bytes = match chunks.len() {
        0 => Bytes::new(),
        1 => chunks.swap_remove(0),
        _ => {
            let mut buf = Vec::with_capacity(read);
            for chunk in &chunks {
                buf.extend_from_slice(chunk);
            }
            Bytes::from(buf)
        }
    };

    BufferedRequest {
        request: Request::from_parts(parts, Body::from(bytes.clone())),
        body: Some(bytes),
    }
}

/// ストリーミングレスポンスか（バッファすると逐次送信が壊れる）
fn is_streaming(headers: &HeaderMap) -> bool {
    content_type(headers)
        .map(|ct| ct.to_ascii_lowercase().starts_with("text/event-stream"))
        .unwrap_or(false)
}

enum ResponseBody {
    Buffered(Bytes),
    Passthrough(Body),
    Lost,
}

/// バッファ済みレスポンス
///
/// ハンドラーチェーンが書いたボディを保持し、`copy_back` で一度だけ実レスポンスに戻す。
pub struct ReplayableResponse {
    parts: axum::http::response::Parts,
    body: ResponseBody,
}

impl ReplayableResponse {
    /// レスポンスボディをバッファする
    ///
    /// ストリーミング（`text/event-stream`）はバッファせず素通しする。
    /// 読み取りに失敗した場合はそのエクスチェンジのボディは失われる。
    pub async fn capture(response: Response) -> Self {
        let (parts, body) = response.into_parts();
        if is_streaming(&parts.headers) {
            return Self {
                parts,
                body: ResponseBody::Passthrough(body),
            };
        }

        let body = match axum::body::to_bytes(body, usize::MAX).await {
            Ok(bytes) => ResponseBody::Buffered(bytes),
            Err(e) => {
                error!("Failed to buffer response body, client receives empty body: {}", e);
                ResponseBody::Lost
            }
        };
        Self { parts, body }
    }

    /// ステータスコード
    pub fn status(&self) -> StatusCode {
        self.parts.status
    }

    /// Content-Type
    pub fn content_type(&self) -> Option<String> {
        content_type(&self.parts.headers)
    }

    /// バッファしたボディ（空・素通し・読み取り失敗時はNone）
    pub fn body(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Buffered(bytes) if !bytes.is_empty() => Some(bytes),
            _ => None,
        }
    }

    /// extensionsから型付きの値を取得する
    pub fn extension<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.parts.extensions.get::<T>().cloned()
    }

    /// バッファを実レスポンスへそのまま書き戻す
    pub fn copy_back(self) -> Response {
        let body = match self.body {
            ResponseBody::Buffered(bytes) => Body::from(bytes),
            ResponseBody::Passthrough(body) => body,
            ResponseBody::Lost => Body::empty(),
        };
        Response::from_parts(self.parts, body)
    }
}
