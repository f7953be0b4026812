pub mod exchange_rate_api;
pub mod util;

pub use exchange_rate_api::ExchangeRateApiProvider;
