use anyhow::{bail, Context, Result};
use coursesync::request::GenerateOutcome;
use coursesync::sections::visible_sections;
use coursesync::{ApiClient, Autosave, SyncConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};

struct Args {
    term: String,
    config: Option<PathBuf>,
    verbose: bool,
}

fn parse_args() -> Result<Args> {
    let mut term = None;
    let mut config = None;
    let mut verbose = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                config = Some(PathBuf::from(path));
            }
            "--verbose" | "-v" => verbose = true,
            flag if flag.starts_with('-') => bail!("unknown flag {flag}"),
            _ if term.is_none() => term = Some(arg),
            _ => bail!("unexpected argument {arg}"),
        }
    }

    Ok(Args {
        term: term.context("usage: coursesync <term> [--config path] [--verbose]")?,
        config,
        verbose,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let config = match &args.config {
        Some(path) => SyncConfig::load_from_file(path)?,
        None => SyncConfig::default(),
    };

    let api = Arc::new(ApiClient::new(&config)?);
    let autosave = Arc::new(Autosave::new(api, &config));
    let teardown = autosave.spawn_teardown_flush();

    if let Err(e) = load_and_report(&autosave, &args.term).await {
        teardown.abort();
        autosave.shutdown().await;
        return Err(e);
    }

    info!("Watching for changes, press Ctrl-C to exit");
    if let Err(e) = teardown.await {
        warn!(error = %e, "Teardown listener stopped unexpectedly");
        autosave.shutdown().await;
    }
    Ok(())
}

async fn load_and_report(autosave: &Autosave<ApiClient>, term: &str) -> Result<()> {
    autosave
        .switch_term(term)
        .await
        .with_context(|| format!("loading saved courses for {term}"))?;

    let state = autosave.snapshot();
    for (index, card) in state.course_cards().iter() {
        let shown = visible_sections(card);
        info!(
            card = index,
            course = card.course_id().unwrap_or("-"),
            sections = card.sections.len(),
            visible = shown.len(),
            selected = card.selected_sections().count(),
            sort = card.sort_type.label(),
            "Restored card"
        );
    }

    if let Some(request) = autosave.schedule_request() {
        println!("{}", serde_json::to_string_pretty(&request)?);
    }
    match autosave.generate().await {
        Ok(GenerateOutcome::Schedules(schedules)) => {
            info!(schedules = schedules.len(), "Schedules available")
        }
        Ok(GenerateOutcome::NoSchedules { message }) => info!(message = %message, "No schedules"),
        Err(e) => warn!(error = %e, "Schedule generation failed"),
    }
    Ok(())
}
