//! stats subcommand
//!
//! Prints the request statistics summary straight from the audit database.

use crate::audit::service::AuditQueryService;
use crate::config::DEFAULT_DATABASE_URL;
use crate::db::audit_log::SqliteAuditStore;
use crate::audit::types::StatisticsSummary;
use clap::Args;
use std::sync::Arc;

/// Arguments for the stats subcommand
#[derive(Args, Debug, Clone)]
pub struct StatsArgs {
    /// Window size in hours
    #[arg(long, default_value_t = 24)]
    pub hours: i64,

    /// Database URL
    #[arg(long, default_value = DEFAULT_DATABASE_URL, env = "HTTPAUDIT_DATABASE_URL")]
    pub database_url: String,

    /// Print JSON instead of a table
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Execute the stats command
pub async fn execute(args: &StatsArgs) -> Result<(), anyhow::Error> {
    let pool = crate::db::initialize_database(&args.database_url).await?;
    let service = AuditQueryService::new(Arc::new(SqliteAuditStore::new(pool)));
    let summary = service.statistics(args.hours).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", render_table(&summary));
    }
    Ok(())
}

/// 統計サマリーを表形式の文字列にする
pub fn render_table(summary: &StatisticsSummary) -> String {
    let mut out = format!(
        "WINDOW\t{}h\nTOTAL\t{}\nQUERIED\t{}\n\nSTATUS\tCOUNT\n",
        summary.period_hours, summary.total_requests, summary.queried_at
    );
    for (status, count) in &summary.status_distribution {
        out.push_str(&format!("{}\t{}\n", status, count));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    #[test]
    fn test_render_table() {
        let mut distribution = BTreeMap::new();
        distribution.insert("200".to_string(), 3);
        distribution.insert("null".to_string(), 1);
        let summary = StatisticsSummary {
            total_requests: 4,
            status_distribution: distribution,
            period_hours: 24,
            queried_at: Utc::now(),
        };

        let table = render_table(&summary);
        assert!(table.contains("TOTAL\t4\n"));
        assert!(table.contains("200\t3\n"));
        assert!(table.contains("null\t1\n"));
    }

    #[tokio::test]
    async fn test_execute_against_fresh_database() {
        let dir = tempfile::tempdir().unwrap();
        let args = StatsArgs {
            hours: 1,
            database_url: format!("sqlite:{}", dir.path().join("audit.db").display()),
            json: true,
        };
        execute(&args).await.unwrap();
    }
}
