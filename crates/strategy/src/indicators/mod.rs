pub mod atr;
pub mod bollinger;
pub mod ichimoku;
pub mod ma;
pub mod rsi;
pub mod volume;

pub use atr::atr;
pub use bollinger::{bollinger, bollinger_series, Bands};
pub use ichimoku::{ichimoku_at, CloudPosition, IchimokuPeriods, IchimokuPoint};
pub use ma::{ema_series, sma, sma_series, MaKind};
pub use rsi::RsiIndicator;
pub use volume::{average_volume, obv_series, vwap, LevelKind, VolumeLevel, VolumeProfile};
