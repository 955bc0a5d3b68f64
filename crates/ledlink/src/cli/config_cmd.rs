//! `config` subcommand: show the effective configuration, optionally
//! writing the defaults first.

use std::path::PathBuf;

use super::{Config, ConfigOutput, LedError, Result, kv, kv_indent, kv_width, print_json};

pub(super) fn cmd_config(json: bool, init: bool, custom_path: Option<PathBuf>) -> Result<()> {
    let config_path = custom_path.or_else(Config::path);

    if init {
        let Some(path) = &config_path else {
            return Err(LedError::Config("no config directory".into()));
        };
        if path.exists() {
            log::info!("{} already exists, leaving it alone", path.display());
        } else {
            Config::default().save_to(path)?;
            if !json {
                println!("Wrote default config to {}", path.display());
            }
        }
    }

    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let (config, warnings) = match &config_path {
        Some(p) => Config::load_from(p),
        None => (Config::default(), Vec::new()),
    };
    let issues: Vec<String> = match config.validate() {
        Ok(()) => Vec::new(),
        Err(issues) => issues.iter().map(ToString::to_string).collect(),
    };

    if json {
        return print_json(&ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            warnings,
            issues,
            settings: config,
        });
    }

    let w = kv_width(
        &["Config file:"],
        &[
            "max_connect_attempts:",
            "retry_delay_ms:",
            "scan_timeout_ms:",
            "baud_rate:",
            "cache_ttl_ms:",
        ],
    );

    match &config_path {
        Some(p) if config_exists => kv("Config file:", format_args!("{} (loaded)", p.display()), w),
        Some(p) => kv(
            "Config file:",
            format_args!("{} (not found, using defaults)", p.display()),
            w,
        ),
        None => kv("Config file:", "(no config directory)", w),
    }
    for warning in &warnings {
        println!("Warning: {warning}");
    }
    println!();

    let c = &config.connection;
    println!("Connection:");
    kv_indent("max_connect_attempts:", c.max_connect_attempts, w);
    kv_indent(
        "retry_delay_ms:",
        format_args!(
            "{} x{} up to {}",
            c.retry_initial_delay_ms, c.retry_multiplier, c.retry_max_delay_ms
        ),
        w,
    );
    kv_indent("scan_timeout_ms:", c.scan_timeout_ms, w);
    kv_indent("baud_rate:", c.baud_rate, w);
    println!();

    let p = &config.proxy;
    let on_off = |b: bool| if b { "on" } else { "off" };
    println!("Proxies:");
    kv_indent("access_control:", on_off(p.access_control), w);
    kv_indent("caching:", on_off(p.caching), w);
    kv_indent("logging:", on_off(p.logging), w);
    kv_indent("cache_ttl_ms:", p.cache_ttl_ms, w);
    println!();

    println!("Access:");
    kv_indent("role:", &config.access.role, w);
    for (role, ops) in &config.access.roles {
        kv_indent(&format!("{role}:"), ops.join(", "), w);
    }

    if !issues.is_empty() {
        println!();
        println!("Problems:");
        for issue in &issues {
            println!("  {issue}");
        }
    }
    Ok(())
}
