use reverie::config::Config;

fn secret_label(value: Option<&str>) -> String {
    match value {
        Some(_) => t!("status.set").into_owned(),
        None => t!("status.unset").into_owned(),
    }
}

/// Human-readable summary of the effective configuration. Secrets are only
/// reported as set or unset; the raw TOML dump uses [`Config::redacted`].
pub fn render_config(config: &Config) -> String {
    let lines = [
        format!("◆ {}", t!("status.title")),
        String::new(),
        format!("{}     {}", t!("status.version"), env!("CARGO_PKG_VERSION")),
        format!("{}      {}", t!("status.config"), config.config_path.display()),
        String::new(),
        format!("  {}     {}", t!("status.backend"), config.backend.url),
        format!(
            "  {}    {}",
            t!("status.anon_key"),
            secret_label(config.backend.anon_key.as_deref())
        ),
        format!(
            "  {} {}",
            t!("status.access_token"),
            secret_label(config.backend.access_token.as_deref())
        ),
        format!(
            "  {}     {}",
            t!("status.user_id"),
            config.backend.user_id.as_deref().unwrap_or("(anonymous)")
        ),
        format!(
            "  {}       {} × {}ms (max {}ms)",
            t!("status.retry"),
            config.reliability.max_attempts,
            config.reliability.base_backoff_ms,
            config.reliability.max_backoff_ms
        ),
        format!(
            "  {}  {} / {}ms",
            t!("status.rate_limit"),
            config.rate_limit.max_requests,
            config.rate_limit.window_ms
        ),
        format!(
            "  {}    {}ms",
            t!("status.autosave"),
            config.autosave.delay_ms
        ),
        format!(
            "  {}    ≥{} words, {} × {} attempts",
            t!("status.analysis"),
            config.analysis.min_words,
            config.analysis.pipeline_retries + 1,
            config.analysis.stage_attempts
        ),
    ];
    lines.join("\n")
}
