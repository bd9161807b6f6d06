//! REPL – Read-Eval-Print Loop for the wayfind interactive shell.
//!
//! Supported slash-commands:
//!   /help                          – show this list
//!   /destinations                  – list the catalog, grouped by floor
//!   /floor <n>                     – pin the floor manually (`2`, `2F`, `B1`)
//!   /estimate <method> <n> <conf>  – report a raw floor estimate
//!   /qr <payload>                  – feed a scanned QR payload
//!   /calibrate <alt>...            – altitude baseline for the initial floor
//!   /altitude <alt> [accuracy]     – feed an altitude reading
//!   /network <mbps> <rtt_ms>       – feed a network-quality reading
//!   /accel <z>...                  – feed vertical acceleration samples
//!   /pos <x> <y> [floor]           – report the live position
//!   /go <destination>              – start navigating from the live position
//!   /stop                          – end the active session
//!   /status                        – floor, anchors, position and session
//!   /quit | /exit                  – gracefully exit the CLI

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::Runtime;
use wayfind_middleware::EventReceiver;
use wayfind_perception::FusionOutcome;
use wayfind_runtime::NavigatorHandle;
use wayfind_types::{
    EstimateMethod, FloorEstimate, NavError, NavEvent, PathQuality, Point3D, floor_label,
};

/// One parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Destinations,
    Floor(i32),
    Estimate {
        method: EstimateMethod,
        floor: i32,
        confidence: f64,
    },
    Qr(String),
    Calibrate(Vec<f64>),
    Altitude {
        altitude: f64,
        accuracy: Option<f64>,
    },
    Network {
        downlink_mbps: f64,
        rtt_ms: f64,
    },
    Accel(Vec<f64>),
    Pos {
        x: f64,
        y: f64,
        floor: Option<i32>,
    },
    Go(String),
    Stop,
    Status,
    Quit,
}

/// Parse one input line. The error is a user-facing usage hint.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Err("empty command".to_string());
    };
    let args: Vec<&str> = parts.collect();

    match (head, args.as_slice()) {
        ("/help", []) => Ok(Command::Help),
        ("/destinations", []) => Ok(Command::Destinations),
        ("/floor", [raw]) => parse_floor(raw)
            .map(Command::Floor)
            .ok_or_else(|| format!("not a floor: {raw}")),
        ("/estimate", [method, floor, confidence]) => {
            let floor = parse_floor(floor).ok_or_else(|| format!("not a floor: {floor}"))?;
            let confidence = confidence
                .parse::<f64>()
                .map_err(|_| format!("not a confidence: {confidence}"))?;
            Ok(Command::Estimate {
                method: EstimateMethod::parse(method),
                floor,
                confidence,
            })
        }
        ("/qr", payload) if !payload.is_empty() => Ok(Command::Qr(payload.join(" "))),
        ("/calibrate", samples) if !samples.is_empty() => {
            parse_numbers(samples, "altitude").map(Command::Calibrate)
        }
        ("/altitude", [altitude, rest @ ..]) if rest.len() <= 1 => {
            let altitude = parse_number(altitude, "altitude")?;
            let accuracy = match rest.first() {
                Some(raw) => Some(parse_number(raw, "accuracy")?),
                None => None,
            };
            Ok(Command::Altitude { altitude, accuracy })
        }
        ("/network", [downlink, rtt]) => Ok(Command::Network {
            downlink_mbps: parse_number(downlink, "downlink")?,
            rtt_ms: parse_number(rtt, "round-trip time")?,
        }),
        ("/accel", samples) if !samples.is_empty() => {
            parse_numbers(samples, "acceleration").map(Command::Accel)
        }
        ("/pos", [x, y, rest @ ..]) if rest.len() <= 1 => {
            let x = x.parse::<f64>().map_err(|_| format!("not a coordinate: {x}"))?;
            let y = y.parse::<f64>().map_err(|_| format!("not a coordinate: {y}"))?;
            let floor = match rest.first() {
                Some(raw) => Some(parse_floor(raw).ok_or_else(|| format!("not a floor: {raw}"))?),
                None => None,
            };
            Ok(Command::Pos { x, y, floor })
        }
        ("/go", [destination]) => Ok(Command::Go((*destination).to_string())),
        ("/stop", []) => Ok(Command::Stop),
        ("/status", []) => Ok(Command::Status),
        ("/quit" | "/exit", []) => Ok(Command::Quit),
        ("/floor", _) => Err("usage: /floor <n>".to_string()),
        ("/estimate", _) => Err("usage: /estimate <method> <floor> <confidence>".to_string()),
        ("/qr", _) => Err("usage: /qr <payload>".to_string()),
        ("/calibrate", _) => Err("usage: /calibrate <altitude>...".to_string()),
        ("/altitude", _) => Err("usage: /altitude <altitude> [accuracy]".to_string()),
        ("/network", _) => Err("usage: /network <downlink_mbps> <rtt_ms>".to_string()),
        ("/accel", _) => Err("usage: /accel <z>...".to_string()),
        ("/pos", _) => Err("usage: /pos <x> <y> [floor]".to_string()),
        ("/go", _) => Err("usage: /go <destination>".to_string()),
        (other, _) => Err(format!("unknown command '{other}'")),
    }
}

fn parse_number(raw: &str, what: &str) -> Result<f64, String> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("not a valid {what}: {raw}"))
}

fn parse_numbers(raw: &[&str], what: &str) -> Result<Vec<f64>, String> {
    raw.iter().map(|r| parse_number(r, what)).collect()
}

/// Accepts `2`, `-1`, `2F` and `B1`.
pub fn parse_floor(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    if let Some(digits) = raw.strip_prefix(['B', 'b']) {
        return digits.parse::<i32>().ok().filter(|n| *n > 0).map(|n| -n);
    }
    raw.strip_suffix(['F', 'f'])
        .unwrap_or(raw)
        .parse::<i32>()
        .ok()
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(rt: &Runtime, handle: &NavigatorHandle, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "wayfind>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_command(line) {
            Ok(Command::Quit) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Ok(command) => {
                if let Err(e) = execute(rt, handle, command) {
                    println!("{}: {}", "Error".red(), e);
                }
            }
            Err(hint) => {
                println!(
                    "{} {}. Type {} for available commands.",
                    "✗".red(),
                    hint.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn execute(rt: &Runtime, handle: &NavigatorHandle, command: Command) -> Result<(), NavError> {
    match command {
        Command::Help => cmd_help(),
        Command::Destinations => cmd_destinations(handle),
        Command::Floor(floor) => match rt.block_on(handle.set_manual_floor(floor))? {
            FusionOutcome::Changed(change) => println!(
                "{} Floor set to {}",
                "✓".green(),
                floor_label(change.new_floor).bold()
            ),
            _ => println!("  Already on {}", floor_label(floor).bold()),
        },
        Command::Estimate {
            method,
            floor,
            confidence,
        } => {
            handle.report_estimate(method.clone(), floor, confidence);
            println!(
                "  Buffered {} estimate for {}",
                method.to_string().yellow(),
                floor_label(floor).bold()
            );
        }
        Command::Qr(payload) => match rt.block_on(handle.scan_qr(payload))? {
            Some(floor) => println!(
                "{} QR marker for {} (applies on the next tick)",
                "✓".green(),
                floor_label(floor).bold()
            ),
            None => println!("  {}", "No floor marker in that payload".yellow()),
        },
        Command::Calibrate(samples) => match rt.block_on(handle.calibrate_altitude(samples))? {
            Some(baseline) => println!(
                "{} Altitude baseline {:.1} m",
                "✓".green(),
                baseline
            ),
            None => println!("  {}", "No usable altitude samples".yellow()),
        },
        Command::Altitude { altitude, accuracy } => {
            match rt.block_on(handle.report_altitude(altitude, accuracy))? {
                Some(estimate) => print_estimate(&estimate),
                None => println!(
                    "  {} Run {} first.",
                    "Altitude is not calibrated.".yellow(),
                    "/calibrate <altitude>".bold()
                ),
            }
        }
        Command::Network {
            downlink_mbps,
            rtt_ms,
        } => match rt.block_on(handle.report_network(downlink_mbps, rtt_ms))? {
            Some(estimate) => print_estimate(&estimate),
            None => println!("  {}", "Network reading too ambiguous for a floor".dimmed()),
        },
        Command::Accel(samples) => {
            let produced = rt.block_on(handle.report_vertical_acceleration(samples))?;
            if produced.is_empty() {
                println!("  {}", "No floor change detected".dimmed());
            }
            for estimate in &produced {
                print_estimate(estimate);
            }
        }
        Command::Pos { x, y, floor } => {
            let position = match floor {
                Some(floor) => Point3D::new(x, y, handle.site().elevation(floor), floor),
                None => rt.block_on(handle.locate(x, y))?,
            };
            rt.block_on(handle.update_position(position))?;
            println!(
                "  Position ({:.1}, {:.1}) on {}",
                position.x,
                position.y,
                floor_label(position.floor).bold()
            );
        }
        Command::Go(destination) => cmd_go(rt, handle, &destination)?,
        Command::Stop => {
            if rt.block_on(handle.stop_navigation())? {
                println!("{} Navigation stopped", "✓".green());
            } else {
                println!("  Not navigating");
            }
        }
        Command::Status => cmd_status(rt, handle)?,
        Command::Quit => {}
    }
    Ok(())
}

fn print_estimate(estimate: &FloorEstimate) {
    println!(
        "  Buffered {} estimate for {} ({:.2})",
        estimate.method.to_string().yellow(),
        floor_label(estimate.floor).bold(),
        estimate.confidence
    );
}

fn cmd_help() {
    println!();
    println!("{}", "wayfind Commands".bold().underline());
    println!("  {}                 – list destinations", "/destinations".bold().cyan());
    println!("  {}                    – pin the floor (2, 2F, B1)", "/floor <n>".bold().cyan());
    println!("  {} – report a floor estimate", "/estimate <method> <n> <c>".bold().cyan());
    println!("  {}                 – feed a scanned QR payload", "/qr <payload>".bold().cyan());
    println!("  {}         – calibrate the altitude baseline", "/calibrate <alt>...".bold().cyan());
    println!("  {}   – feed an altitude reading", "/altitude <alt> [accuracy]".bold().cyan());
    println!("  {}     – feed a network reading", "/network <mbps> <rtt_ms>".bold().cyan());
    println!("  {}                – feed vertical acceleration", "/accel <z>...".bold().cyan());
    println!("  {}          – report the live position", "/pos <x> <y> [floor]".bold().cyan());
    println!("  {}                    – start navigating", "/go <id>".bold().cyan());
    println!("  {}                       – end navigation", "/stop".bold().cyan());
    println!("  {}                     – show navigator state", "/status".bold().cyan());
    println!("  {}                – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_destinations(handle: &NavigatorHandle) {
    let site = handle.site();
    let mut floors: Vec<i32> = site.floors().collect();
    floors.reverse();

    println!("{}", "Destinations".bold().underline());
    for floor in floors {
        println!("  {}", floor_label(floor).bold().cyan());
        for d in site.destinations_on(floor) {
            println!(
                "    {:<18} {} {}",
                d.id.bold(),
                d.display_name,
                format!("({})", d.category).dimmed()
            );
        }
    }
}

fn cmd_go(rt: &Runtime, handle: &NavigatorHandle, destination: &str) -> Result<(), NavError> {
    match rt.block_on(handle.start_navigation(destination, None)) {
        Ok(route) => {
            if route.quality == PathQuality::StraightLineFallback {
                println!(
                    "  {}",
                    "No walkable path found; showing a straight line instead.".yellow()
                );
            }
            Ok(())
        }
        Err(NavError::NoPosition) => {
            println!(
                "  {} Report a position with {} first.",
                "No position yet.".yellow(),
                "/pos <x> <y>".bold()
            );
            Ok(())
        }
        Err(NavError::DestinationNotFound(id)) => {
            println!(
                "  {} '{}'. Try {}.",
                "Unknown destination".red(),
                id.yellow(),
                "/destinations".bold()
            );
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn cmd_status(rt: &Runtime, handle: &NavigatorHandle) -> Result<(), NavError> {
    let status = rt.block_on(handle.status())?;

    println!("{}", "Navigator Status".bold().underline());
    println!(
        "  Floor      : {} (confidence {:.2})",
        status.fusion.label.bold(),
        status.fusion.confidence
    );
    for (name, anchor) in [("Manual", &status.fusion.manual), ("QR", &status.fusion.qr)] {
        if let Some(a) = anchor {
            let state = if a.active { "active".green() } else { "expired".dimmed() };
            println!(
                "  {:<10} : {} {} ({:.0} s ago)",
                name,
                floor_label(a.floor),
                state,
                a.age_ms as f64 / 1000.0
            );
        }
    }
    println!("  Estimates  : {}", status.buffered_estimates);
    match status.altitude_baseline {
        Some(b) => println!("  Altitude   : baseline {:.1} m", b),
        None => println!("  Altitude   : {}", "not calibrated".dimmed()),
    }
    match status.position {
        Some(p) => println!(
            "  Position   : ({:.1}, {:.1}) on {}",
            p.x,
            p.y,
            floor_label(p.floor)
        ),
        None => println!("  Position   : {}", "unknown".dimmed()),
    }
    match status.session {
        Some(s) => println!(
            "  Navigating : {} – waypoint {}/{}, {:.1} m, ~{} min",
            s.destination.bold(),
            s.cursor,
            s.waypoints,
            s.total_distance,
            s.estimated_time_minutes
        ),
        None => println!("  Navigating : {}", "no".dimmed()),
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Event printer
// ─────────────────────────────────────────────────────────────────────────────

/// One-line rendering of an event.
pub fn describe(event: &NavEvent) -> String {
    match event {
        NavEvent::FloorChanged(change) => format!(
            "Floor changed: {} → {} ({}, {:.2})",
            floor_label(change.old_floor),
            floor_label(change.new_floor),
            change.source,
            change.confidence
        ),
        NavEvent::NavigationStart { destination, route } => format!(
            "Navigating to {destination}: {} waypoints, {:.1} m, ~{} min",
            route.len(),
            route.total_distance,
            route.estimated_time_minutes
        ),
        NavEvent::WaypointReached {
            next, progress, ..
        } => format!(
            "Waypoint reached ({:.0}%), next at ({:.1}, {:.1}) on {}",
            progress * 100.0,
            next.x,
            next.y,
            floor_label(next.floor)
        ),
        NavEvent::DestinationReached { .. } => "You have arrived.".to_string(),
        NavEvent::RouteRecalculated { new_route } => format!(
            "Route recalculated: {:.1} m, ~{} min",
            new_route.total_distance, new_route.estimated_time_minutes
        ),
        NavEvent::RecalculationFailed { reason } => {
            format!("Recalculation failed, keeping the current route: {reason}")
        }
        NavEvent::NavigationUpdate {
            distance_remaining,
            eta_minutes,
            ..
        } => format!("{distance_remaining:.1} m to go, ~{eta_minutes} min"),
        NavEvent::NavigationStop => "Navigation stopped.".to_string(),
    }
}

/// Print bus events until the bus closes. Periodic `navigation_update`s are
/// left to `/status` so they do not flood the prompt.
pub async fn print_events(mut events: EventReceiver) {
    while let Some(event) = events.next().await {
        let line = describe(&event.payload);
        match event.payload {
            NavEvent::NavigationUpdate { .. } => continue,
            NavEvent::RecalculationFailed { .. } => println!("\n  {} {}", "⚠".yellow(), line.yellow()),
            NavEvent::DestinationReached { .. } => println!("\n  {} {}", "✓".green(), line.green().bold()),
            _ => println!("\n  {} {}", "»".cyan(), line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfind_types::{DecisionSource, FloorChange};

    #[test]
    fn parses_floor_labels() {
        assert_eq!(parse_floor("2"), Some(2));
        assert_eq!(parse_floor("2F"), Some(2));
        assert_eq!(parse_floor("-1"), Some(-1));
        assert_eq!(parse_floor("B1"), Some(-1));
        assert_eq!(parse_floor("b2"), Some(-2));
        assert_eq!(parse_floor("B0"), None);
        assert_eq!(parse_floor("lobby"), None);
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("/help"), Ok(Command::Help));
        assert_eq!(parse_command("/floor B1"), Ok(Command::Floor(-1)));
        assert_eq!(
            parse_command("/estimate wifi 2 0.8"),
            Ok(Command::Estimate {
                method: EstimateMethod::Wifi,
                floor: 2,
                confidence: 0.8
            })
        );
        assert_eq!(
            parse_command("/pos 10 5.5"),
            Ok(Command::Pos {
                x: 10.0,
                y: 5.5,
                floor: None
            })
        );
        assert_eq!(
            parse_command("/pos 10 5 2F"),
            Ok(Command::Pos {
                x: 10.0,
                y: 5.0,
                floor: Some(2)
            })
        );
        assert_eq!(
            parse_command("/qr https://example.test/ floor_2"),
            Ok(Command::Qr("https://example.test/ floor_2".to_string()))
        );
        assert_eq!(parse_command("/go onsen_men"), Ok(Command::Go("onsen_men".to_string())));
        assert_eq!(parse_command("/exit"), Ok(Command::Quit));
    }

    #[test]
    fn parses_sensor_readings() {
        assert_eq!(
            parse_command("/calibrate 36 37"),
            Ok(Command::Calibrate(vec![36.0, 37.0]))
        );
        assert_eq!(
            parse_command("/altitude 40.1"),
            Ok(Command::Altitude {
                altitude: 40.1,
                accuracy: None
            })
        );
        assert_eq!(
            parse_command("/altitude 40.1 3"),
            Ok(Command::Altitude {
                altitude: 40.1,
                accuracy: Some(3.0)
            })
        );
        assert_eq!(
            parse_command("/network 8 80"),
            Ok(Command::Network {
                downlink_mbps: 8.0,
                rtt_ms: 80.0
            })
        );
        assert_eq!(
            parse_command("/accel 10.81 10.81"),
            Ok(Command::Accel(vec![10.81, 10.81]))
        );

        assert!(parse_command("/calibrate").unwrap_err().starts_with("usage"));
        assert!(parse_command("/altitude high").unwrap_err().contains("altitude"));
        assert!(parse_command("/network 8").unwrap_err().starts_with("usage"));
        assert!(parse_command("/accel 9.8 NaN").unwrap_err().contains("acceleration"));
    }

    #[test]
    fn rejects_bad_input_with_hints() {
        assert_eq!(parse_command("/floor"), Err("usage: /floor <n>".to_string()));
        assert!(parse_command("/floor up").unwrap_err().contains("not a floor"));
        assert!(parse_command("/estimate wifi 2 high").unwrap_err().contains("confidence"));
        assert!(parse_command("/pos 1").unwrap_err().starts_with("usage"));
        assert!(parse_command("/pos 1 2 3 4").unwrap_err().starts_with("usage"));
        assert!(parse_command("/teleport").unwrap_err().contains("unknown command"));
    }

    #[test]
    fn describes_events() {
        let change = NavEvent::FloorChanged(FloorChange {
            old_floor: -1,
            new_floor: 2,
            confidence: 0.9,
            source: DecisionSource::Composite,
        });
        assert_eq!(describe(&change), "Floor changed: B1 → 2F (composite, 0.90)");

        let update = NavEvent::NavigationUpdate {
            current_position: Point3D::new(0.0, 0.0, 0.0, 1),
            next_waypoint: Point3D::new(10.0, 5.0, 0.0, 1),
            distance_remaining: 11.18,
            eta_minutes: 1.0,
        };
        assert_eq!(describe(&update), "11.2 m to go, ~1 min");
        assert_eq!(describe(&NavEvent::NavigationStop), "Navigation stopped.");
    }
}
