use std::time::Duration;

use anyhow::Result;
use calfeed_core::{FeedConfig, service};
use owo_colors::OwoColorize;

use crate::render::Render;

pub async fn run(config: &FeedConfig, wait: Duration) -> Result<()> {
    let service = service::spawn_from_config(config)?;
    let settled = service.wait_until_settled(wait).await;
    let statuses = service.source_statuses();
    service.shutdown();

    for status in &statuses {
        println!("{}", status.render());
    }

    let failing = statuses
        .iter()
        .filter(|s| s.invalid || s.last_error.is_some())
        .count();

    println!();
    if !settled {
        println!("{}", "Some calendars are still loading.".yellow());
    } else if failing == 0 {
        println!("{}", "All calendars fetched.".green());
    } else {
        println!("{}", format!("{failing} of {} calendars failed.", statuses.len()).red());
    }

    Ok(())
}
