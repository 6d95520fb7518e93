use std::time::Duration;

use anyhow::Result;
use calfeed_core::{FeedConfig, service};
use chrono::Utc;
use owo_colors::OwoColorize;

use crate::render::render_agenda;

pub async fn run(config: &FeedConfig, wait: Duration, json: bool) -> Result<()> {
    let timezone = config.timezone()?;
    let service = service::spawn_from_config(config)?;

    if !service.wait_until_settled(wait).await {
        eprintln!(
            "{}",
            format!("Some calendars did not answer within {}", humantime::format_duration(wait))
                .yellow()
        );
    }

    let view = service.current_view();
    service.shutdown();

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    if view.is_empty() {
        println!("{}", "No upcoming events".dimmed());
        return Ok(());
    }

    for line in render_agenda(&view, &timezone, Utc::now()) {
        println!("{line}");
    }

    Ok(())
}
