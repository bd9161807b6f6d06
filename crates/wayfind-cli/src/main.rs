//! `wayfind-cli` – wayfind Command Line Interface
//!
//! Interactive front end for the indoor navigation core. It:
//!
//! 1. Checks for `~/.wayfind/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Loads the site description and starts a `NavigatorService`.
//! 3. Prints every navigation event from the bus in the background.
//! 4. Drops the user into an **interactive REPL** with slash-commands
//!    (`/go`, `/pos`, `/floor`, `/status`, `/help`, ...).
//! 5. Intercepts **Ctrl-C** to stop any active navigation and exit.

mod config;
mod repl;

use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use wayfind_map::SiteMap;
use wayfind_middleware::EventBus;
use wayfind_runtime::{LogFormat, Navigator, NavigatorService, init_tracing};

fn main() -> ExitCode {
    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    // ── Structured logging ────────────────────────────────────────────────
    // The tracing guard must outlive the runtime so pending spans flush last.
    let _tracing = init_tracing("wayfind", &cfg.log);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            println!("{}: {}", "Failed to start the async runtime".red(), e);
            return ExitCode::FAILURE;
        }
    };

    // ── Site ──────────────────────────────────────────────────────────────
    print!("\n  Loading site {} … ", cfg.site_path.dimmed());
    std::io::Write::flush(&mut std::io::stdout()).ok();
    let site = match SiteMap::load(&cfg.site_path) {
        Ok(site) => Arc::new(site),
        Err(e) => {
            println!("{}", "FAILED".red());
            println!("  {}", e);
            println!(
                "  Set {} or edit {}.",
                "WAYFIND_SITE".bold(),
                config::config_path().display()
            );
            return ExitCode::FAILURE;
        }
    };
    println!(
        "{} ({} floors, {} destinations)",
        "OK".green(),
        site.floors().count(),
        site.destinations().count()
    );

    // ── Navigator service ─────────────────────────────────────────────────
    let bus = EventBus::default();
    let navigator = Navigator::new(site, cfg.navigator.clone(), bus);
    let (handle, task) = {
        let _enter = rt.enter();
        NavigatorService::spawn(navigator)
    };
    rt.spawn(repl::print_events(handle.subscribe_all()));
    info!(site = %cfg.site_path, tick_ms = cfg.navigator.tick_ms, "wayfind started");

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    let ctrlc_handle = handle.clone();
    let ctrlc_rt = rt.handle().clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping navigation …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
        let stopped = ctrlc_rt.block_on(async {
            let stopped = ctrlc_handle.stop_navigation().await.unwrap_or(false);
            let _ = ctrlc_handle.shutdown().await;
            stopped
        });
        if stopped {
            println!("{}", "  ✓ Navigation stopped.".green());
        }
        println!("{}", "  ✓ Exiting wayfind.".green());
        std::process::exit(0);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    println!();
    println!(
        "  Type {} for a list of commands.\n",
        "/help".bold().cyan()
    );

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(&rt, &handle, shutdown);

    rt.block_on(async {
        let _ = handle.shutdown().await;
        let _ = task.await;
    });
    ExitCode::SUCCESS
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║       wayfind First-Run Wizard       ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up wayfind.\n");

    let mut cfg = config::Config::default();

    cfg.site_path = prompt_line(
        &format!("  Site description [{}]: ", cfg.site_path),
        &cfg.site_path,
    );

    println!("  Log format?");
    println!("    1) Compact console output  (default)");
    println!("    2) JSON lines");
    cfg.log.format = match prompt_line("  Enter choice [1]: ", "1").trim() {
        "2" => LogFormat::Json,
        _ => LogFormat::Compact,
    };

    let tick = prompt_line(
        &format!("  Tick period in ms [{}]: ", cfg.navigator.tick_ms),
        &cfg.navigator.tick_ms.to_string(),
    );
    match tick.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => cfg.navigator.tick_ms = ms,
        _ => {}
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }

    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"                        ____ _         __"#.bold().cyan());
    println!("{}", r#"  _    _____ ___ __ __ / __/(_)__  ___/ /"#.bold().cyan());
    println!("{}", r#" | |/|/ / _ `/ // // // _/ / / _ \/ _  / "#.bold().cyan());
    println!("{}", r#" |__,__/\_,_/\_, / /_//_/  /_/_//_/\_,_/  "#.bold().cyan());
    println!("{}", r#"            /___/                          "#.bold().cyan());
    println!();
    println!("  {} {}",
        "wayfind".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Indoor multi-floor navigation");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
