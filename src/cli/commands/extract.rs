//! Text extraction commands.

use std::path::Path;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use scanscribe::ocr::CancellationFlag;
use scanscribe::{ExtractionResult, ExtractionService, ImageInput, Settings};

use crate::cli::icons::{bullet, confidence, dim_arrow, error, info, success, warn};

/// Extract text with the full engine ensemble, or one forced engine.
pub async fn cmd_extract(
    settings: &Settings,
    image: &Path,
    engine: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    if !image.exists() {
        anyhow::bail!("Image not found: {}", image.display());
    }

    let service = ExtractionService::new(settings);
    if engine.is_none() && !service.is_available() {
        eprintln!("{} No OCR engine looks installed; run 'scribe engines' for details", warn());
    }

    let result = run_with_spinner(&service, image, engine, json).await;
    report(&result, json)
}

/// Re-run one engine on an image.
pub async fn cmd_reprocess(
    settings: &Settings,
    image: &Path,
    engine: &str,
    json: bool,
) -> anyhow::Result<()> {
    if !image.exists() {
        anyhow::bail!("Image not found: {}", image.display());
    }

    let service = ExtractionService::new(settings);
    let pb = spinner(
        json,
        format!("Reprocessing {} with {}...", image.display(), engine),
    );
    let result = service.reprocess(image, engine).await;
    pb.finish_and_clear();
    report(&result, json)
}

fn spinner(hidden: bool, message: String) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message);
    pb
}

async fn run_with_spinner(
    service: &ExtractionService,
    image: &Path,
    engine: Option<&str>,
    quiet: bool,
) -> ExtractionResult {
    let cancel = CancellationFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.cancel();
        }
    });

    let pb = spinner(
        quiet,
        match engine {
            Some(name) => format!("Extracting text from {} with {}...", image.display(), name),
            None => format!("Extracting text from {}...", image.display()),
        },
    );

    let result = service
        .extract_text_with_cancel(ImageInput::Path(image.to_path_buf()), engine, &cancel)
        .await;
    pb.finish_and_clear();
    result
}

fn report(result: &ExtractionResult, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        print_result(result);
    }

    if let Some(err) = &result.error {
        anyhow::bail!("{}", err);
    }
    Ok(())
}

fn print_result(result: &ExtractionResult) {
    if result.error.is_some() {
        eprintln!("{} Could not extract meaningful text", error());
    } else {
        eprintln!(
            "{} Extracted {} words with {} (confidence {}, quality {})",
            success(),
            result.text.split_whitespace().count(),
            style(&result.method).cyan(),
            confidence(result.confidence),
            result.quality.as_str()
        );
        eprintln!(
            "  {} Text type: {}",
            dim_arrow(),
            result.text_type.as_str()
        );
    }
    if let Some(content) = &result.content_type {
        eprintln!(
            "  {} Looks {} (edge density {:.3}, variance {:.1})",
            dim_arrow(),
            if content.is_handwritten { "handwritten" } else { "printed" },
            content.edge_density,
            content.laplacian_variance
        );
    }
    if result.voting_applied {
        eprintln!("  {} Combined by word voting across engines", dim_arrow());
    }
    eprintln!("  {} {}ms", dim_arrow(), result.processing_time_ms);

    if !result.text.is_empty() {
        println!();
        println!("{}", result.text);
        println!();
    }

    if result.all_candidates.len() > 1 {
        eprintln!("{} Candidates:", info());
        for candidate in &result.all_candidates {
            eprintln!(
                "  {} {:<12} {:>4}  {:<5} {}",
                bullet(),
                candidate.engine_id,
                confidence(candidate.confidence),
                candidate.quality.quality.as_str(),
                style(preview(&candidate.text, 60)).dim()
            );
        }
    }

    for line in &result.diagnostics {
        eprintln!("{} {}", warn(), style(line).dim());
    }
    if !result.suggestions.is_empty() {
        eprintln!("{} Suggestions:", info());
        for suggestion in &result.suggestions {
            eprintln!("  {} {}", bullet(), suggestion);
        }
    }
}

/// First `max` characters on one line.
fn preview(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max).collect();
        format!("{}...", cut)
    }
}
