pub mod aggregator;
pub mod backfill;
pub mod series_fetcher;
