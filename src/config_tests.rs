//! Tests for configuration

#[cfg(test)]
mod tests {
    use super::super::config::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_bot_config_defaults() {
        let config = BotConfig::default();
        assert_eq!(config.starting_balance, dec!(1000));
        assert_eq!(config.min_edge_to_enter, 0.05);
        assert_eq!(config.max_edge_to_exit, 0.05);
        assert_eq!(config.base_position_size, dec!(25));
        assert_eq!(config.edge_multiplier, dec!(500));
        assert_eq!(config.max_position_size, dec!(100));
        assert_eq!(config.max_total_exposure, dec!(500));
        assert_eq!(config.poll_interval_secs, 120);
        assert_eq!(config.max_positions_per_market, 1);
        assert_eq!(config.vol_mode, VolMode::Default);
        assert!(config.dry_run);
    }

    #[test]
    fn test_bot_config_from_toml() {
        let toml_str = r#"
starting_balance = 5000
min_edge_to_enter = 0.08
base_position_size = 50
max_total_exposure = 2000
poll_interval_secs = 60
vol_mode = "realized"
dry_run = false
"#;
        let config: BotConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.starting_balance, dec!(5000));
        assert_eq!(config.min_edge_to_enter, 0.08);
        assert_eq!(config.base_position_size, dec!(50));
        assert_eq!(config.max_total_exposure, dec!(2000));
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.vol_mode, VolMode::Realized);
        assert!(!config.dry_run);
        // Untouched fields keep their defaults.
        assert_eq!(config.max_edge_to_exit, 0.05);
        assert_eq!(config.edge_multiplier, dec!(500));
    }

    #[test]
    fn test_endpoints_defaults() {
        let config: EndpointsConfig = toml::from_str("").unwrap();
        assert_eq!(config.gamma_url, "https://gamma-api.polymarket.com");
        assert_eq!(config.clob_url, "https://clob.polymarket.com");
        assert_eq!(config.options_url, "https://www.deribit.com/api/v2");
        assert_eq!(config.spot_url, "https://api.coingecko.com/api/v3");
    }

    #[test]
    fn test_endpoints_override() {
        let toml_str = r#"
gamma_url = "http://localhost:8080"
"#;
        let config: EndpointsConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.gamma_url, "http://localhost:8080");
        assert_eq!(config.clob_url, "https://clob.polymarket.com");
    }

    #[test]
    fn test_live_config() {
        let toml_str = r#"
private_key = "0xabc123"
"#;
        let config: LiveConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.private_key, "0xabc123");
        assert_eq!(config.chain_id, 137);
        assert!(config.funder_address.is_none());
    }

    #[test]
    fn test_full_config_document() {
        let toml_str = r#"
[endpoints]
gamma_url = "http://gamma.test"

[trading]
starting_balance = 250
min_edge_to_enter = 0.06

[data]
dir = "/tmp/polyquant-test"

[live]
private_key = "0xdeadbeef"
chain_id = 80002
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.endpoints.gamma_url, "http://gamma.test");
        assert_eq!(config.trading.starting_balance, dec!(250));
        assert_eq!(config.trading.min_edge_to_enter, 0.06);
        assert_eq!(config.data.dir.to_str().unwrap(), "/tmp/polyquant-test");
        assert_eq!(config.live.as_ref().unwrap().chain_id, 80002);
    }

    #[test]
    fn test_empty_config_is_runnable() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.trading.dry_run);
        assert!(config.live.is_none());
        assert_eq!(config.data.dir.to_str().unwrap(), "data");
    }
}
