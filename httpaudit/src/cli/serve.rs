//! serve サブコマンド
//!
//! 監査サーバーを起動します。

use crate::config::DEFAULT_DATABASE_URL;
use clap::Args;

/// serve サブコマンドの引数
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Listen port
    #[arg(short, long, default_value = "8080", env = "HTTPAUDIT_PORT")]
    pub port: u16,

    /// Bind address
    #[arg(short = 'H', long, default_value = "0.0.0.0", env = "HTTPAUDIT_HOST")]
    pub host: String,

    /// Database URL
    #[arg(long, default_value = DEFAULT_DATABASE_URL, env = "HTTPAUDIT_DATABASE_URL")]
    pub database_url: String,
}

impl ServeArgs {
    /// `host:port` 形式のバインドアドレス
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            port: crate::config::get_env_with_fallback_parse("HTTPAUDIT_PORT", "AUDIT_PORT", 8080),
            host: crate::config::get_env_with_fallback_or("HTTPAUDIT_HOST", "AUDIT_HOST", "0.0.0.0"),
            database_url: crate::config::get_database_url(),
        }
    }
}
