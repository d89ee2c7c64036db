use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use clap::Parser;

use dinewatch::config::Config;
use dinewatch::model::{Criteria, MealPeriod, ResourceRef};
use dinewatch::source::{AvailabilitySource, HttpAvailabilitySource};

/// One-shot queries against the configured availability source: list
/// locations, list restaurants at a location, or run a single availability
/// check.
#[derive(Parser, Debug)]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Location to list restaurants for (omit to list locations)
    #[arg(long)]
    location: Option<String>,

    /// Venue ID for an availability check (needs --location and --date)
    #[arg(long)]
    venue: Option<String>,

    #[arg(long, default_value_t = 2)]
    party_size: u32,

    /// Target date, YYYY-MM-DD
    #[arg(long)]
    date: Option<NaiveDate>,

    #[arg(long, default_value = "Dinner")]
    meal: MealPeriod,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let raw = fs::read_to_string(&args.config)?;
    let cfg: Config = serde_yaml::from_str(&raw)?;
    let client = HttpAvailabilitySource::from_config(&cfg.source)?;

    match (&args.location, &args.venue) {
        (Some(location), Some(venue)) => {
            let date = args
                .date
                .ok_or_else(|| anyhow!("--date is required for an availability check"))?;
            let resource = ResourceRef {
                venue_id: venue.clone(),
                location_id: location.clone(),
            };
            let criteria = Criteria {
                party_size: args.party_size,
                date,
                meal_period: args.meal,
            };
            let slots = client.check_availability(&resource, &criteria).await?;
            if slots.is_empty() {
                println!("No availability.");
            }
            for slot in slots {
                println!("{} -> {}", slot.time, slot.external_ref);
            }
        }
        (Some(location), None) => {
            for r in client.list_restaurants(location).await? {
                println!(
                    "{} -> {} ({})",
                    r.id,
                    r.name,
                    r.cuisine_type.as_deref().unwrap_or("unknown cuisine")
                );
            }
        }
        (None, _) => {
            for loc in client.list_locations().await? {
                println!("{} -> {}", loc.id, loc.name);
            }
        }
    }
    Ok(())
}
