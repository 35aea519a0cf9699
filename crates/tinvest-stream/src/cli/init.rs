/*
[INPUT]:  Interactive user input via CLI
[OUTPUT]: Generated YAML configuration file
[POS]:    CLI initialization layer
[UPDATE]: When StreamConfig schema changes
*/

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select, theme::ColorfulTheme};
use std::path::PathBuf;

use tinvest_adapter::CandleInterval;
use tinvest_adapter::ws::PRODUCTION_STREAM_URL;
use tinvest_stream::config::{StreamConfig, SubscriptionConfig};

const CHANNELS: [&str; 3] = ["orderbook", "candle", "instrument_info"];
const INTERVALS: [&str; 11] = [
    "1min", "2min", "3min", "5min", "10min", "15min", "30min", "hour", "day", "week", "month",
];

pub fn run_init(output: PathBuf) -> Result<()> {
    println!("{}", style("Welcome to tinvest-stream init").bold().cyan());
    println!(
        "{}",
        style("This will guide you through creating a new stream configuration.").dim()
    );

    let theme = ColorfulTheme::default();

    let token: String = Input::with_theme(&theme)
        .with_prompt("OpenAPI token (leave empty to use TINVEST_TOKEN)")
        .allow_empty(true)
        .interact_text()?;

    let stream_url: String = Input::with_theme(&theme)
        .with_prompt("Stream URL")
        .default(PRODUCTION_STREAM_URL.to_string())
        .interact_text()?;

    println!("\n{}", style("--- Subscriptions ---").bold());
    let mut subscriptions = Vec::new();
    loop {
        let figi: String = Input::with_theme(&theme)
            .with_prompt("FIGI (e.g., BBG000B9XRY4)")
            .default("BBG000B9XRY4".to_string())
            .interact_text()?;

        let channel = Select::with_theme(&theme)
            .with_prompt("Channel")
            .items(&CHANNELS)
            .default(0)
            .interact()?;

        let subscription = match CHANNELS[channel] {
            "orderbook" => {
                let depth: u32 = Input::with_theme(&theme)
                    .with_prompt("Depth (1-20)")
                    .default(3)
                    .interact_text()?;
                SubscriptionConfig::Orderbook {
                    figi,
                    depth: Some(depth),
                }
            }
            "candle" => {
                let interval = Select::with_theme(&theme)
                    .with_prompt("Interval")
                    .items(&INTERVALS)
                    .default(0)
                    .interact()?;
                SubscriptionConfig::Candle {
                    figi,
                    interval: Some(CandleInterval::from(INTERVALS[interval])),
                }
            }
            _ => SubscriptionConfig::InstrumentInfo { figi },
        };
        subscriptions.push(subscription);

        let more = Confirm::with_theme(&theme)
            .with_prompt("Add another subscription?")
            .default(false)
            .interact()?;
        if !more {
            break;
        }
    }

    let config = StreamConfig {
        token,
        stream_url,
        log_dir: None,
        report_interval_secs: 60,
        subscriptions,
    };

    let yaml = serde_yaml::to_string(&config).context("failed to serialize config to YAML")?;

    std::fs::write(&output, yaml)
        .with_context(|| format!("failed to write config to {}", output.display()))?;

    println!("\n{}", style("SUCCESS!").bold().green());
    println!("Configuration written to: {}", style(output.display()).cyan());

    Ok(())
}
