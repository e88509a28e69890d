//! External data providers: the spot price oracle and the options exchange.

pub mod options;
pub mod spot;

pub use options::{default_vol, is_options_supported, OptionsClient};
pub use spot::SpotPriceClient;
