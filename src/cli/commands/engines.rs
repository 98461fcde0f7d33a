//! Engine diagnostics command.

use console::style;

use scanscribe::ocr::EngineState;
use scanscribe::{ExtractionService, Settings};

use crate::cli::icons::{dim_arrow, error, info, success, warn};

/// List registered engines with their state and installation hints.
pub async fn cmd_engines(settings: &Settings, probe: bool, json: bool) -> anyhow::Result<()> {
    let service = ExtractionService::new(settings);

    if probe {
        for (name, _) in service.registry().engines() {
            // failures are memoized and shown in the report
            let _ = service.registry().ensure_ready(&name).await;
        }
    }

    let report = service.engine_report();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.is_empty() {
        eprintln!("{} No engines enabled", warn());
        return Ok(());
    }

    for status in &report {
        let icon = match (&status.state, status.installed) {
            (EngineState::Ready, _) => success(),
            (EngineState::Failed(_), _) => error(),
            (_, true) => info(),
            (_, false) => warn(),
        };
        println!(
            "{} {:<10} {:<12} {}",
            icon,
            style(&status.name).bold(),
            status.kind.as_str(),
            style(&status.state).dim()
        );
        println!("  {} {}", dim_arrow(), status.hint);
    }

    let methods = service.available_methods();
    if methods.is_empty() {
        eprintln!("\n{} No engine can run on this machine", error());
    } else {
        eprintln!("\n{} Usable: {}", info(), methods.join(", "));
    }
    Ok(())
}
