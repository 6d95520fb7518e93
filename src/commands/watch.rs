use anyhow::Result;
use calfeed_core::{AgendaEntry, FeedConfig, service};
use chrono::Utc;
use owo_colors::OwoColorize;
use tracing::debug;

use crate::render::render_agenda;

/// Reprint the agenda each time it changes, until Ctrl-C.
pub async fn run(config: &FeedConfig) -> Result<()> {
    let timezone = config.timezone()?;
    let service = service::spawn_from_config(config)?;
    let mut changes = service.subscribe();
    let mut shown: Option<Vec<AgendaEntry>> = None;

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }

        let view = service.current_view();
        if shown.as_ref() == Some(&view) {
            debug!("agenda unchanged");
            continue;
        }

        let now = Utc::now();
        println!(
            "{}",
            format!("── {} ──", now.with_timezone(&timezone).format("%Y-%m-%d %H:%M")).dimmed()
        );
        if view.is_empty() {
            println!("{}", "No upcoming events".dimmed());
        }
        for line in render_agenda(&view, &timezone, now) {
            println!("{line}");
        }
        println!();

        shown = Some(view);
    }

    service.shutdown();
    Ok(())
}
