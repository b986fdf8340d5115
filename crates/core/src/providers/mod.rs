pub mod traits;

// API source implementations
pub mod bybit;
