//! クライアントIP解決ユーティリティ
//!
//! プロキシヘッダーとトランスポート層のピアアドレスから実際の接続元を決定する。

use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

/// 転送元IPヘッダー
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
/// リアルIPヘッダー
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// IPアドレスを正規化する
///
/// IPv4-mapped IPv6（::ffff:x.x.x.x）をIPv4に変換。
/// それ以外はそのまま返す。
pub fn normalize_ip(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                IpAddr::V4(v4)
            } else {
                IpAddr::V6(v6)
            }
        }
        v4 => v4,
    }
}

/// SocketAddrからIPアドレスを抽出し正規化する
pub fn normalize_socket_ip(addr: &SocketAddr) -> IpAddr {
    normalize_ip(addr.ip())
}

/// 接続元の解決に使う情報
///
/// 前処理で取得し、IP解決自体はレコーダー側で行う。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientOrigin {
    /// `X-Forwarded-For` ヘッダー値
    pub forwarded_for: Option<String>,
    /// `X-Real-IP` ヘッダー値
    pub real_ip: Option<String>,
    /// トランスポート層のピアアドレス
    pub peer: Option<SocketAddr>,
}

impl ClientOrigin {
    /// リクエストヘッダーとピアアドレスから取得する
    pub fn capture(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };
        Self {
            forwarded_for: header(FORWARDED_FOR_HEADER),
            real_ip: header(REAL_IP_HEADER),
            peer,
        }
    }

    /// クライアントIPを解決する
    ///
    /// 優先順位: `X-Forwarded-For`（カンマ区切りの先頭）→ `X-Real-IP` → ピアアドレス。
    /// 空文字と `unknown`（大文字小文字無視）は未設定扱い。
    pub fn resolve(&self) -> Option<String> {
        if let Some(forwarded) = usable(self.forwarded_for.as_deref()) {
            let first = forwarded.split(',').next().unwrap_or(forwarded).trim();
            if let Some(first) = usable(Some(first)) {
                return Some(first.to_string());
            }
        }

        if let Some(real_ip) = usable(self.real_ip.as_deref()) {
            return Some(real_ip.to_string());
        }

        self.peer
            .as_ref()
            .map(|addr| normalize_socket_ip(addr).to_string())
    }
}

fn usable(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("unknown"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        "10.0.0.1:54321".parse().unwrap()
    }

    fn resolve_client_ip(headers: &HeaderMap, peer: Option<&SocketAddr>) -> Option<String> {
        ClientOrigin::capture(headers, peer.copied()).resolve()
    }

    #[test]
    fn test_forwarded_for_first_value_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR_HEADER,
            HeaderValue::from_static("203.0.113.1, 192.168.1.1"),
        );
        headers.insert(REAL_IP_HEADER, HeaderValue::from_static("198.51.100.7"));
        assert_eq!(
            resolve_client_ip(&headers, Some(&peer())),
            Some("203.0.113.1".to_string())
        );
    }

    #[test]
    fn test_unknown_forwarded_for_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR_HEADER, HeaderValue::from_static("UNKNOWN"));
        headers.insert(REAL_IP_HEADER, HeaderValue::from_static("198.51.100.7"));
        assert_eq!(
            resolve_client_ip(&headers, Some(&peer())),
            Some("198.51.100.7".to_string())
        );
    }

    #[test]
    fn test_unknown_real_ip_falls_back_to_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(REAL_IP_HEADER, HeaderValue::from_static("unknown"));
        assert_eq!(
            resolve_client_ip(&headers, Some(&peer())),
            Some("10.0.0.1".to_string())
        );
    }

    #[test]
    fn test_no_source_available() {
        assert_eq!(resolve_client_ip(&HeaderMap::new(), None), None);
    }

    #[test]
    fn test_peer_ipv4_mapped_is_normalized() {
        let addr: SocketAddr = "[::ffff:192.0.2.10]:8080".parse().unwrap();
        assert_eq!(
            resolve_client_ip(&HeaderMap::new(), Some(&addr)),
            Some("192.0.2.10".to_string())
        );
    }

    #[test]
    fn test_normalize_ip_keeps_plain_ipv6() {
        let ip: IpAddr = "2001:db8::1".parse().unwrap();
        assert_eq!(normalize_ip(ip), ip);
    }
}
