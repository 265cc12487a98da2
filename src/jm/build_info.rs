use chrono::{DateTime, Utc};

pub fn build_host() -> &'static str {
    option_env!("JOBMASTER_BUILD_HOST").unwrap_or("unknown")
}

pub fn build_time_raw() -> &'static str {
    option_env!("JOBMASTER_BUILD_TIME").unwrap_or("unknown")
}

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Normalise the build.rs timestamp (`epoch:<secs>` or RFC3339) to `YYYY-MM-DD HH:MM:SS` UTC.
pub fn format_build_time(raw: &str) -> String {
    let raw = raw.trim();
    if let Some(secs) = raw.strip_prefix("epoch:").and_then(|s| s.trim().parse::<i64>().ok()) {
        if let Some(dt) = DateTime::<Utc>::from_timestamp(secs, 0) {
            return dt.format("%Y-%m-%d %H:%M:%S").to_string();
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Utc).format("%Y-%m-%d %H:%M:%S").to_string();
    }
    raw.replace('T', " ").trim_end_matches('Z').to_string()
}

pub fn banner() -> String {
    format!(
        "Job master {} (built on {} at {}).",
        version(),
        build_host(),
        format_build_time(build_time_raw())
    )
}
