pub mod candle;
pub mod chart;
pub mod interval;
pub mod portfolio;
pub mod settings;
