use std::{env, env::VarError};

/// The server is configured entirely through the environment. Any argument prints the help text and the current
/// (non-secret) settings.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 21] = [
        "RUST_LOG",
        "PNS_HOST",
        "PNS_PORT",
        "PNS_DATABASE_URL",
        "PNS_MEMORY_STORE",
        "PNS_USE_X_FORWARDED_FOR",
        "PNS_USE_FORWARDED",
        "PNS_NOTIFY_IP_ALLOWLIST",
        "PNS_STORE_TIMEOUT_SECS",
        "PNS_LEDGER_STALE_AFTER_SECS",
        "PNS_STRIPE_TOLERANCE_SECS",
        "PNS_ALIPAY_APP_ID",
        "PNS_ALIPAY_GATEWAY_URL",
        "PNS_ALIPAY_NOTIFY_URL",
        "PNS_ALIPAY_RETURN_URL",
        "PNS_STRIPE_API_BASE",
        "PNS_STRIPE_SUCCESS_URL",
        "PNS_STRIPE_CANCEL_URL",
        "PNS_SWEEPER_ENABLED",
        "PNS_SWEEP_INTERVAL_SECS",
        "PNS_SWEEP_MIN_AGE_SECS",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
