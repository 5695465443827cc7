use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use inquire::Text;
use std::{path::PathBuf, sync::Arc};
use tokio::sync::watch;
use weather_core::{
    Config, DailyScrape, WeatherRecord, WeatherService, WeatherStore,
    config::parse_city_list,
    service::{DEFAULT_HISTORY_DAYS, MAX_HISTORY_DAYS},
    store,
};

use crate::server;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Weather scraper and history API")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API and the daily scrape.
    Serve {
        /// Address to listen on, e.g. "127.0.0.1:8000".
        #[arg(long)]
        bind: Option<String>,

        /// Do not start the daily scrape.
        #[arg(long)]
        no_schedule: bool,
    },

    /// Show current weather for a city.
    Show {
        city: String,

        /// Prefer the newest stored record over a live fetch.
        #[arg(long)]
        cached: bool,
    },

    /// Show stored records for a city.
    History {
        city: String,

        #[arg(long, default_value_t = DEFAULT_HISTORY_DAYS,
              value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_HISTORY_DAYS)))]
        days: u32,
    },

    /// Scrape and save now. Uses the configured city list when none is given.
    Scrape { cities: Vec<String> },

    /// Check that the document store can be opened, written and read.
    CheckStore,

    /// Interactively edit the config file.
    Configure,
}

impl Cli {
    pub async fn run(self, config: Config) -> anyhow::Result<()> {
        match self.command {
            Command::Serve { bind, no_schedule } => serve(config, bind, no_schedule).await,
            Command::Show { city, cached } => {
                let service = WeatherService::from_config(&config)?;
                let record = service.current_weather(&city, !cached).await?;
                print_record(&record);
                Ok(())
            }
            Command::History { city, days } => {
                let service = WeatherService::from_config(&config)?;
                let records = service.history(&city, days).await;
                if records.is_empty() {
                    println!("No records for {city} in the last {days} day(s).");
                }
                for record in &records {
                    print_record(record);
                    println!();
                }
                Ok(())
            }
            Command::Scrape { cities } => {
                let service = Arc::new(WeatherService::from_config(&config)?);
                let job = DailyScrape::new(service, &config.schedule)?;
                let cities = if cities.is_empty() {
                    job.cities().to_vec()
                } else {
                    cities
                };

                let outcomes = job.run_for(&cities).await;
                for outcome in &outcomes {
                    let mark = if outcome.saved { "ok" } else { "failed" };
                    println!("{:<20} {mark}", outcome.city);
                }
                if outcomes.iter().any(|o| !o.saved) {
                    bail!("Some cities could not be scraped");
                }
                Ok(())
            }
            Command::CheckStore => check_store(&config).await,
            Command::Configure => configure(),
        }
    }
}

async fn serve(config: Config, bind: Option<String>, no_schedule: bool) -> anyhow::Result<()> {
    let service = Arc::new(WeatherService::from_config(&config)?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let job = if no_schedule {
        tracing::info!("daily scrape disabled");
        None
    } else {
        let job = DailyScrape::new(service.clone(), &config.schedule)?;
        tracing::info!(cities = ?job.cities(), cron = %config.schedule.cron, "daily scrape enabled");
        Some(tokio::spawn(async move { job.run(shutdown_rx).await }))
    };

    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let app = server::router(service, &config.server.allowed_origins);
    let result = server::serve(app, &bind).await;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = job {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "daily scrape task failed");
        }
    }

    result
}

async fn check_store(config: &Config) -> anyhow::Result<()> {
    let path = config.store_path()?;
    println!("Store path: {}", path.display());
    println!("Keyspace:   {}", config.store.name);

    let store = store::open(config)?;
    store.ping().await.context("Store is not reachable")?;
    println!("Ping:       ok");

    store
        .check()
        .await
        .context("Failed to write and delete a probe document")?;
    println!("Write test: ok");

    Ok(())
}

fn configure() -> anyhow::Result<()> {
    // Edit the file as written, without environment overrides.
    let mut cfg = Config::load_file()?;

    let user_agent = Text::new("Scraper user agent:")
        .with_default(&cfg.scraper.user_agent)
        .prompt()?;

    let current_path = cfg
        .store
        .path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let store_path = Text::new("Store directory:")
        .with_default(&current_path)
        .with_help_message("Leave empty to use the platform data directory")
        .prompt()?;

    let store_name = Text::new("Store keyspace name:")
        .with_default(&cfg.store.name)
        .prompt()?;

    let current_cities = cfg.schedule.cities.join(", ");
    let cities = Text::new("Cities for the daily scrape:")
        .with_default(&current_cities)
        .with_help_message("Comma-separated")
        .prompt()?;

    cfg.scraper.user_agent = user_agent.trim().to_string();
    cfg.store.path = Some(store_path.trim())
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);
    cfg.store.name = store_name.trim().to_string();
    let cities = parse_city_list(&cities);
    if !cities.is_empty() {
        cfg.schedule.cities = cities;
    }

    cfg.validate()?;
    cfg.save()?;

    println!(
        "Configuration saved to {}",
        Config::config_file_path()?.display()
    );
    Ok(())
}

fn print_record(record: &WeatherRecord) {
    println!("{}", record.city);
    println!("  Observed:    {}", record.observed_at.format("%Y-%m-%d %H:%M UTC"));
    println!("  Condition:   {}", record.condition);
    println!("  Temperature: {:.1} °C", record.temperature);
    println!("  Humidity:    {:.0} %", record.humidity);
    println!("  Wind:        {:.0} km/h", record.wind_speed);
    match &record.air_quality {
        Some(aq) => println!("  Air quality: {} ({})", aq.index, aq.level),
        None => println!("  Air quality: n/a"),
    }
}
