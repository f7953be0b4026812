pub mod convert;
pub mod popular;
pub mod rates;
pub mod setup;
pub mod ui;
pub mod watch;
