mod bollinger;
mod crossover;
mod ichimoku;
mod rsi;
mod volume;

pub use bollinger::{BollingerParams, BollingerStrategy};
pub use crossover::{CrossoverParams, MaCrossoverStrategy};
pub use ichimoku::{IchimokuParams, IchimokuStrategy};
pub use rsi::{detect_divergence, Divergence, RsiParams, RsiStrategy};
pub use volume::{VolumeParams, VolumeProfileStrategy};
