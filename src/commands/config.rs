use std::path::Path;

use anyhow::Result;
use calfeed_core::FeedConfig;
use owo_colors::OwoColorize;

pub fn run(config_path: &Path, config: &FeedConfig) -> Result<()> {
    let settings = config.view_settings()?;

    println!("{}", "Paths".bold());
    println!("  Config:     {}", config_path.display());

    println!();
    println!("{}", "Agenda".bold());
    println!("  Entries:    {}", settings.maximum_entries);
    println!("  Timezone:   {}", settings.timezone);
    println!("  Format:     {:?}", settings.calendar_format);
    println!("  Start:      {}", config.start_date);
    println!("  Private:    {}", if settings.hide_private { "hidden" } else { "shown" });
    println!(
        "  Polling:    every {}, timeout {}",
        humantime::format_duration(std::time::Duration::from_millis(config.fetch_interval_ms)),
        humantime::format_duration(config.fetch_timeout())
    );

    println!();
    println!("{}", "Calendars".bold());
    if config.calendars.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for source in config.source_descriptors(chrono::Utc::now()) {
        let auth = if source.auth.is_some() { " (auth)" } else { "" };
        println!(
            "  {}{}  {}",
            source.source_id,
            auth.dimmed(),
            format!(
                "{} entries, {} days",
                source.max_entries, source.max_window_days
            )
            .dimmed()
        );
    }

    Ok(())
}
