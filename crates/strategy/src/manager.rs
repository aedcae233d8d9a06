use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use common::{
    AggregatedSignal, Error, HistoricalData, ManagerCommand, MarketData, Result, Side, Signal,
    StrategyWeight, Tick,
};

use crate::base::PositionSizing;
use crate::config::{StrategyConfig, StrategyFileConfig};
use crate::strategies::{
    BollingerStrategy, IchimokuStrategy, MaCrossoverStrategy, RsiStrategy, VolumeProfileStrategy,
};
use crate::Strategy;

/// Upper bound for a strategy weight. Lower bound is 0.
pub const MAX_WEIGHT: f64 = 2.0;

/// Multiplier applied to the agreement ratio when boosting a group's confidence.
const AGREEMENT_BOOST: f64 = 0.5;

struct Entry {
    strategy: Box<dyn Strategy>,
    weight: f64,
    enabled: bool,
}

/// A strategy's signal with its weight and weighted confidence.
struct Weighted {
    signal: Signal,
    weight: f64,
    score: f64,
}

/// Owns the weighted strategy set and merges their output into ranked
/// [`AggregatedSignal`]s.
pub struct StrategyManager {
    entries: Vec<Entry>,
}

impl StrategyManager {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// All five strategies at default parameters and weight 1.0.
    pub fn with_default_strategies(sizing: PositionSizing) -> Result<Self> {
        let mut manager = Self::new();
        for id in [
            MaCrossoverStrategy::ID,
            RsiStrategy::ID,
            BollingerStrategy::ID,
            IchimokuStrategy::ID,
            VolumeProfileStrategy::ID,
        ] {
            manager.register(build_strategy(id, id, &toml::Table::new(), sizing)?, 1.0, true)?;
        }
        Ok(manager)
    }

    /// Build the manager from a strategy file. Any invalid entry fails the whole build.
    pub fn from_config(file_cfg: &StrategyFileConfig) -> Result<Self> {
        let mut manager = Self::new();
        for cfg in &file_cfg.strategies {
            let strategy = build_from_config(cfg, file_cfg.sizing)?;
            manager.register(strategy, cfg.weight, cfg.enabled)?;
        }
        Ok(manager)
    }

    /// Add a strategy. Names must be unique; the weight is clamped to [0, 2].
    pub fn register(
        &mut self,
        strategy: Box<dyn Strategy>,
        weight: f64,
        enabled: bool,
    ) -> Result<()> {
        let name = strategy.name().to_string();
        if self.position(&name).is_some() {
            return Err(Error::Config(format!("strategy '{name}' is already registered")));
        }
        if !weight.is_finite() {
            return Err(Error::Config(format!("strategy '{name}' has a non-finite weight")));
        }
        let weight = weight.clamp(0.0, MAX_WEIGHT);
        info!(strategy = %name, weight = weight, enabled = enabled, "Registered strategy");
        self.entries.push(Entry {
            strategy,
            weight,
            enabled,
        });
        Ok(())
    }

    pub fn strategy_count(&self) -> usize {
        self.entries.len()
    }

    /// Registered names in registration order.
    pub fn list_strategies(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.strategy.name().to_string())
            .collect()
    }

    pub fn strategy_weights(&self) -> Vec<StrategyWeight> {
        self.entries
            .iter()
            .map(|e| StrategyWeight {
                name: e.strategy.name().to_string(),
                weight: e.weight,
                enabled: e.enabled,
            })
            .collect()
    }

    /// Set a weight, clamped to [0, 2]. `false` for an unknown name or a non-finite weight.
    pub fn set_weight(&mut self, name: &str, weight: f64) -> bool {
        if !weight.is_finite() {
            warn!(strategy = %name, weight = weight, "Rejected non-finite weight");
            return false;
        }
        match self.entry_mut(name) {
            Some(entry) => {
                entry.weight = weight.clamp(0.0, MAX_WEIGHT);
                true
            }
            None => false,
        }
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.entry_mut(name) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Bulk update. Returns how many entries named a registered strategy.
    pub fn apply_weights(&mut self, weights: &[StrategyWeight]) -> usize {
        weights
            .iter()
            .filter(|w| {
                let known = self.set_weight(&w.name, w.weight);
                self.set_enabled(&w.name, w.enabled) && known
            })
            .count()
    }

    /// Merge a parameter patch into one strategy. `Ok(false)` for an unknown name.
    pub fn configure_strategy(&mut self, name: &str, patch: &toml::Table) -> Result<bool> {
        match self.entry_mut(name) {
            Some(entry) => {
                entry.strategy.configure(patch)?;
                info!(strategy = %name, "Strategy reconfigured");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run every enabled strategy and merge the results.
    ///
    /// Signals are grouped by (exchange, symbol, side). Each group's confidence is
    /// the weight-normalised average of `confidence × weight`, boosted by the share
    /// of registered strategies that agree. Output is sorted by combined
    /// confidence, descending; ties keep first-seen order.
    pub fn analyze(
        &self,
        markets: &[MarketData],
        history: &HistoricalData,
    ) -> Result<Vec<AggregatedSignal>> {
        let mut weighted = Vec::new();
        for entry in self.entries.iter().filter(|e| e.enabled) {
            let name = entry.strategy.name();
            let signals = match run_isolated(entry.strategy.as_ref(), markets, history) {
                Ok(signals) => signals,
                Err(e) => {
                    warn!(strategy = %name, error = %e, "Strategy failed — skipping this tick");
                    continue;
                }
            };
            debug!(strategy = %name, signals = signals.len(), "Strategy evaluated");
            weighted.extend(signals.into_iter().map(|signal| Weighted {
                score: signal.confidence * entry.weight,
                weight: entry.weight,
                signal,
            }));
        }

        let mut groups: Vec<Vec<Weighted>> = Vec::new();
        let mut index: HashMap<(String, String, Side), usize> = HashMap::new();
        for w in weighted {
            let key = (w.signal.exchange.clone(), w.signal.symbol.clone(), w.signal.side);
            match index.get(&key) {
                Some(&i) => groups[i].push(w),
                None => {
                    index.insert(key, groups.len());
                    groups.push(vec![w]);
                }
            }
        }

        let total = self.entries.len();
        let mut aggregated = groups
            .into_iter()
            .map(|group| combine(group, total))
            .collect::<Result<Vec<_>>>()?;
        // `sort_by` is stable, so equal confidences keep insertion order
        aggregated.sort_by(|a, b| b.combined_confidence.total_cmp(&a.combined_confidence));
        Ok(aggregated)
    }

    /// Main loop: analyze each incoming tick and apply reconfiguration commands
    /// between ticks. Pending commands are applied before the next tick.
    pub async fn run(
        mut self,
        mut tick_rx: mpsc::Receiver<Tick>,
        mut command_rx: mpsc::Receiver<ManagerCommand>,
        signal_tx: mpsc::Sender<Vec<AggregatedSignal>>,
    ) {
        info!(strategies = self.entries.len(), "StrategyManager running");
        let mut commands_open = true;
        loop {
            tokio::select! {
                biased;

                command = command_rx.recv(), if commands_open => {
                    match command {
                        Some(cmd) => self.handle_command(cmd),
                        None => commands_open = false,
                    }
                }

                tick = tick_rx.recv() => {
                    let Some(tick) = tick else {
                        info!("Tick channel closed — StrategyManager exiting");
                        return;
                    };
                    match self.analyze(&tick.markets, &tick.history) {
                        Ok(signals) => {
                            info!(
                                markets = tick.markets.len(),
                                signals = signals.len(),
                                "Tick analyzed"
                            );
                            if signal_tx.send(signals).await.is_err() {
                                warn!("Signal channel closed — StrategyManager exiting");
                                return;
                            }
                        }
                        Err(e) => error!(error = %e, "Aggregation failed — skipping tick"),
                    }
                }
            }
        }
    }

    fn handle_command(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::SetWeight { name, weight } => {
                if !self.set_weight(&name, weight) {
                    warn!(strategy = %name, "SetWeight ignored");
                }
            }
            ManagerCommand::SetEnabled { name, enabled } => {
                if !self.set_enabled(&name, enabled) {
                    warn!(strategy = %name, "SetEnabled for unknown strategy ignored");
                }
            }
            ManagerCommand::Configure { name, patch } => {
                match self.configure_strategy(&name, &patch) {
                    Ok(true) => {}
                    Ok(false) => warn!(strategy = %name, "Configure for unknown strategy ignored"),
                    Err(e) => warn!(strategy = %name, error = %e, "Configure rejected"),
                }
            }
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.strategy.name() == name)
    }

    fn entry_mut(&mut self, name: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.strategy.name() == name)
    }
}

impl Default for StrategyManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one strategy with panics contained. Panics and out-of-range confidences
/// surface as `Error::Strategy`.
fn run_isolated(
    strategy: &dyn Strategy,
    markets: &[MarketData],
    history: &HistoricalData,
) -> Result<Vec<Signal>> {
    let failed = |message: String| Error::Strategy {
        strategy: strategy.name().to_string(),
        message,
    };
    let signals = catch_unwind(AssertUnwindSafe(|| strategy.analyze(markets, history)))
        .map_err(|payload| failed(format!("panicked: {}", panic_message(payload.as_ref()))))??;
    if let Some(bad) = signals
        .iter()
        .find(|s| !(s.confidence.is_finite() && (0.0..=1.0).contains(&s.confidence)))
    {
        return Err(failed(format!(
            "invalid confidence {} for {}",
            bad.confidence, bad.symbol
        )));
    }
    Ok(signals)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string payload")
}

fn combine(group: Vec<Weighted>, total_strategies: usize) -> Result<AggregatedSignal> {
    let weight_sum: f64 = group.iter().map(|w| w.weight).sum();
    let weighted_sum: f64 = group.iter().map(|w| w.score).sum();
    let average = if weight_sum > 0.0 {
        weighted_sum / weight_sum
    } else {
        0.0
    };
    let agreement_ratio = group.len() as f64 / total_strategies.max(1) as f64;
    let combined = (average * (1.0 + agreement_ratio * AGREEMENT_BOOST)).min(1.0);
    if !combined.is_finite() {
        return Err(Error::Aggregation(format!(
            "non-finite combined confidence for {}",
            group[0].signal.key()
        )));
    }

    let sources = group.iter().map(|w| w.signal.strategy.clone()).collect();
    // Highest weighted confidence; first member wins ties
    let representative = group
        .into_iter()
        .reduce(|best, w| {
            if w.score > best.score {
                w
            } else {
                best
            }
        })
        .map(|w| w.signal)
        .ok_or_else(|| Error::Aggregation("empty signal group".into()))?;

    Ok(AggregatedSignal {
        signal: representative,
        sources,
        combined_confidence: combined,
        agreement_ratio,
    })
}

fn build_from_config(cfg: &StrategyConfig, sizing: PositionSizing) -> Result<Box<dyn Strategy>> {
    build_strategy(&cfg.strategy_type, cfg.name(), &cfg.params, sizing)
}

fn build_strategy(
    strategy_type: &str,
    name: &str,
    params: &toml::Table,
    sizing: PositionSizing,
) -> Result<Box<dyn Strategy>> {
    let strategy: Box<dyn Strategy> = match strategy_type {
        MaCrossoverStrategy::ID => {
            Box::new(MaCrossoverStrategy::from_table(params, sizing)?.named(name))
        }
        RsiStrategy::ID => Box::new(RsiStrategy::from_table(params, sizing)?.named(name)),
        BollingerStrategy::ID => {
            Box::new(BollingerStrategy::from_table(params, sizing)?.named(name))
        }
        IchimokuStrategy::ID => {
            Box::new(IchimokuStrategy::from_table(params, sizing)?.named(name))
        }
        VolumeProfileStrategy::ID => {
            Box::new(VolumeProfileStrategy::from_table(params, sizing)?.named(name))
        }
        other => return Err(Error::Config(format!("unknown strategy type '{other}'"))),
    };
    Ok(strategy)
}
