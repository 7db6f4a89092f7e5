use std::env;
use std::process;

use insights_engine::{build_report, render_text, EngineConfig, ReportKind};
use logstore::Window;

fn usage() -> ! {
    eprintln!("usage: insights_cli <anomalies|tools|cache|skills|predict|roi|full> [days|YYYY-MM-DD] [project] [--json]");
    process::exit(2);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let json = args.iter().any(|arg| arg == "--json");
    args.retain(|arg| arg != "--json");

    let Some(kind_name) = args.first() else { usage() };
    let Some(kind) = ReportKind::parse(kind_name) else {
        eprintln!("unknown report kind: {}", kind_name);
        usage()
    };

    let mut config = EngineConfig::default();
    if let Some(window_arg) = args.get(1) {
        config.window = match window_arg.parse::<u32>() {
            Ok(days) => Window::TrailingDays(days),
            Err(_) => Window::Date(window_arg.clone()),
        };
    }
    if let Some(project) = args.get(2) {
        config.project = Some(project.clone());
    }

    match build_report(kind, &config) {
        Ok(report) => {
            if json {
                match report.to_json() {
                    Ok(body) => println!("{}", body),
                    Err(err) => {
                        eprintln!("failed to serialize report: {}", err);
                        process::exit(1);
                    }
                }
            } else {
                print!("{}", render_text(&report));
            }
        }
        Err(err) => {
            eprintln!("report failed: {}", err);
            process::exit(1);
        }
    }
}
