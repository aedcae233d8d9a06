use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{AggregatedSignal, Config, JsonFileFeed, ManagerCommand, MarketFeed, Tick};
use strategy::{StrategyFileConfig, StrategyManager};

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    info!(
        strategies = %cfg.strategy_config_path,
        market_data = %cfg.market_data_path,
        interval_secs = cfg.tick_interval.as_secs(),
        "Signal engine starting"
    );

    let strategy_file = StrategyFileConfig::load(&cfg.strategy_config_path)
        .unwrap_or_else(|e| panic!("Failed to load strategy config: {e}"));
    let manager = StrategyManager::from_config(&strategy_file)
        .unwrap_or_else(|e| panic!("Failed to build strategies: {e}"));
    for w in manager.strategy_weights() {
        info!(strategy = %w.name, weight = w.weight, enabled = w.enabled, "Strategy loaded");
    }

    // ── Channels ──────────────────────────────────────────────────────────────
    let (tick_tx, tick_rx) = mpsc::channel::<Tick>(16);
    let (command_tx, command_rx) = mpsc::channel::<ManagerCommand>(16);
    let (signal_tx, mut signal_rx) = mpsc::channel::<Vec<AggregatedSignal>>(16);

    // ── Market feed poller ────────────────────────────────────────────────────
    let feed: Arc<dyn MarketFeed> = Arc::new(JsonFileFeed::new(&cfg.market_data_path));
    let interval = cfg.tick_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match feed.next_tick().await {
                Ok(tick) => {
                    if tick_tx.send(tick).await.is_err() {
                        warn!("Tick channel closed — feed poller exiting");
                        return;
                    }
                }
                Err(e) => warn!(error = %e, "Market feed read failed — retrying next tick"),
            }
        }
    });

    // ── Control: one JSON command per stdin line ─────────────────────────────
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match serde_json::from_str::<ManagerCommand>(&line) {
                    Ok(command) => {
                        info!(?command, "Control command received");
                        if command_tx.send(command).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!(error = %e, "Unrecognised control command"),
                },
                // stdin closed: commands stop, ticks keep flowing
                Ok(None) => return,
                Err(e) => {
                    warn!(error = %e, "Control input failed — commands disabled");
                    return;
                }
            }
        }
    });

    // ── Signal logger ─────────────────────────────────────────────────────────
    tokio::spawn(async move {
        while let Some(ranked) = signal_rx.recv().await {
            for (rank, agg) in ranked.iter().enumerate() {
                let s = &agg.signal;
                info!(
                    rank = rank + 1,
                    exchange = %s.exchange,
                    symbol = %s.symbol,
                    side = %s.side,
                    confidence = agg.combined_confidence,
                    agreement = agg.agreement_ratio,
                    sources = %agg.sources.join(","),
                    price = s.price,
                    stop_loss = ?s.stop_loss,
                    take_profit = ?s.take_profit,
                    amount = s.amount,
                    reason = %s.reason,
                    "Signal"
                );
            }
        }
    });

    // ── Spawn strategy manager ────────────────────────────────────────────────
    tokio::spawn(manager.run(tick_rx, command_rx, signal_tx));

    // Keep main alive
    info!("All tasks started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c().await.unwrap();
    info!("Shutdown signal received. Exiting.");
}
