// Text rendering for fetch results and statistics
use crate::domain::error::AppError;
use crate::domain::model::{CacheStats, FetchResult, FetchSource, PoolStats};
use crate::presentation::theme::Theme;
use serde_json::Value;
use std::fmt::Write;
use std::path::PathBuf;

/// Everything `--status` prints.
pub struct StatusReport {
    pub backend: String,
    pub config_path: Option<PathBuf>,
    pub cache: CacheStats,
    pub persisted: Option<usize>,
    pub http_pool: PoolStats,
    pub sqlite_pools: Vec<(PathBuf, PoolStats)>,
}

pub fn format_result(result: &Result<FetchResult, AppError>, theme: &Theme) -> String {
    let mut output = String::new();

    match result {
        Ok(result) => {
            let source = match result.source {
                FetchSource::Cache => (theme.good)("[cache]"),
                FetchSource::Backend => (theme.label)("[backend]"),
            };
            writeln!(
                output,
                "{} {} {}",
                (theme.title)(&result.path),
                source,
                (theme.line)(&format!("{} ms", result.elapsed_ms))
            )
            .ok();
            writeln!(output, "  {}", (theme.value)(&summarize(&result.body))).ok();
        }
        Err(e) => {
            writeln!(output, "{} {}", (theme.bad)("✘"), (theme.bad)(&e.to_string())).ok();
        }
    }

    output
}

// One-line shape of a JSON body
fn summarize(body: &Value) -> String {
    match body {
        Value::Array(items) => format!("array of {} items", items.len()),
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().take(6).map(String::as_str).collect();
            let more = if map.len() > keys.len() { ", …" } else { "" };
            format!("object {{{}{}}}", keys.join(", "), more)
        }
        Value::String(s) if s.chars().count() > 80 => {
            format!("{}…", s.chars().take(80).collect::<String>())
        }
        other => other.to_string(),
    }
}

fn format_pool(output: &mut String, theme: &Theme, name: &str, stats: &PoolStats) {
    writeln!(
        output,
        "{}: {}/{} active, {} idle, {} waiting (created {}, reused {}, recycled {})",
        (theme.label)(name),
        stats.active,
        stats.max_size,
        stats.idle,
        stats.waiting,
        stats.created,
        stats.reused,
        stats.recycled
    )
    .ok();
}

pub fn format_status(report: &StatusReport, theme: &Theme) -> String {
    let mut output = String::new();

    writeln!(output, "{}", (theme.title)("rbc Status")).ok();
    writeln!(output, "{}", (theme.line)(&"━".repeat(40))).ok();
    writeln!(output, "{}: {}", (theme.label)("Backend"), report.backend).ok();

    let cache = &report.cache;
    writeln!(
        output,
        "{}: {} entries, {} hits, {} misses, hit rate {:.1}%",
        (theme.label)("Memory Cache"),
        cache.size,
        cache.hits,
        cache.misses,
        cache.hit_rate * 100.0
    )
    .ok();

    match report.persisted {
        Some(count) => writeln!(
            output,
            "{}: {} responses",
            (theme.label)("Persistent Cache"),
            count
        ),
        None => writeln!(output, "{}: disabled", (theme.label)("Persistent Cache")),
    }
    .ok();

    format_pool(&mut output, theme, "HTTP Pool", &report.http_pool);
    for (path, stats) in &report.sqlite_pools {
        format_pool(
            &mut output,
            theme,
            &format!("SQLite Pool ({})", path.display()),
            stats,
        );
    }

    writeln!(
        output,
        "{}: {}",
        (theme.label)("Config"),
        report
            .config_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "Not found".to_string())
    )
    .ok();

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summarize_shapes() {
        assert_eq!(summarize(&json!([1, 2, 3])), "array of 3 items");
        assert_eq!(summarize(&json!({"nodes": [], "edges": []})), "object {edges, nodes}");
        assert_eq!(summarize(&json!(42)), "42");
    }

    #[test]
    fn plain_result_line_names_source() {
        let theme = Theme::new(false);
        let result = Ok(FetchResult {
            path: "/api/visualizations/graph".to_string(),
            body: json!({"nodes": []}),
            source: FetchSource::Cache,
            elapsed_ms: 3,
        });
        let output = format_result(&result, &theme);
        assert!(output.starts_with("/api/visualizations/graph [cache] 3 ms"));
    }

    #[test]
    fn plain_error_line() {
        let theme = Theme::new(false);
        let result = Err(AppError::Api("503 /api/x: Service Unavailable".to_string()));
        assert!(format_result(&result, &theme).contains("API Error: 503 /api/x"));
    }

    #[test]
    fn status_lists_pools() {
        let theme = Theme::new(false);
        let pool = PoolStats {
            created: 2,
            reused: 5,
            recycled: 1,
            active: 1,
            idle: 1,
            waiting: 0,
            max_size: 8,
        };
        let report = StatusReport {
            backend: "http://127.0.0.1:5000/".to_string(),
            config_path: None,
            cache: CacheStats::new(3, 3, 1),
            persisted: None,
            http_pool: pool,
            sqlite_pools: vec![(PathBuf::from("/tmp/cache.db"), pool)],
        };
        let output = format_status(&report, &theme);
        assert!(output.contains("hit rate 75.0%"));
        assert!(output.contains("HTTP Pool: 1/8 active, 1 idle, 0 waiting (created 2, reused 5, recycled 1)"));
        assert!(output.contains("SQLite Pool (/tmp/cache.db)"));
        assert!(output.contains("Persistent Cache: disabled"));
        assert!(output.contains("Config: Not found"));
    }
}
