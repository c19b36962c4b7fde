// Layered loading: defaults, TOML file, then SYNCDESK_* environment.

use std::path::Path;
use std::time::Duration;

use figment::Jail;
use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;

use syncdesk_config::{ConfigError, load_config};
use syncdesk_core::Table;

const FILE: &str = r#"
[server]
bind = "0.0.0.0:9090"

[remote]
base_url = "https://records.example.com/rest/v1"
api_key_env = "RECORDS_KEY"

[executor]
retry_attempts = 5

[executor.table_ttl_secs]
Proyectos = 15

[hub]
heartbeat_interval_secs = 20

[auth.tokens.tok-ana]
user_id = "u1"
user_name = "Ana"
"#;

#[test]
fn file_values_override_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file("syncdesk.toml", FILE)?;
        let config = load_config(Some(Path::new("syncdesk.toml"))).map_err(|e| e.to_string())?;

        assert_eq!(config.bind_addr().map_err(|e| e.to_string())?.port(), 9090);
        let executor = config.executor_config().map_err(|e| e.to_string())?;
        assert_eq!(executor.retry_attempts, 5);
        assert_eq!(executor.ttl_for(Table::Proyectos), Duration::from_secs(15));
        assert_eq!(executor.ttl_for(Table::Pedidos), Duration::from_secs(60));

        let hub = config.hub_config();
        assert_eq!(hub.heartbeat_interval, Duration::from_secs(20));
        assert_eq!(hub.liveness_window, Duration::from_secs(40));

        let actors = config.token_actors();
        assert_eq!(actors["tok-ana"].user_id.as_deref(), Some("u1"));
        Ok(())
    });
}

#[test]
fn environment_overrides_file() {
    Jail::expect_with(|jail| {
        jail.create_file("syncdesk.toml", FILE)?;
        jail.set_env("SYNCDESK_HUB__HEARTBEAT_INTERVAL_SECS", "45");
        jail.set_env("SYNCDESK_EXECUTOR__RETRY_ATTEMPTS", "1");
        jail.set_env("RECORDS_KEY", "from-env");

        let config = load_config(Some(Path::new("syncdesk.toml"))).map_err(|e| e.to_string())?;

        assert_eq!(config.hub.heartbeat_interval_secs, 45);
        assert_eq!(config.executor.retry_attempts, 1);
        let transport = config.transport_config();
        assert_eq!(
            transport.api_key.as_ref().map(|k| k.expose_secret().to_owned()),
            Some("from-env".to_owned())
        );
        Ok(())
    });
}

#[test]
fn config_env_var_points_at_the_file() {
    Jail::expect_with(|jail| {
        jail.create_file("elsewhere.toml", "[server]\nbind = \"127.0.0.1:7000\"\n")?;
        jail.set_env("SYNCDESK_CONFIG", "elsewhere.toml");

        let config = load_config(None).map_err(|e| e.to_string())?;
        assert_eq!(config.server.bind, "127.0.0.1:7000");
        Ok(())
    });
}

#[test]
fn explicit_missing_file_is_an_error() {
    Jail::expect_with(|_jail| {
        let err = load_config(Some(Path::new("nope.toml"))).expect_err("missing");
        assert!(matches!(err, ConfigError::Missing { .. }));
        Ok(())
    });
}

#[test]
fn invalid_values_name_the_field() {
    Jail::expect_with(|jail| {
        jail.create_file("bad.toml", "[remote]\nbase_url = \"ftp://records\"\n")?;
        let err = load_config(Some(Path::new("bad.toml"))).expect_err("bad scheme");
        assert!(err.to_string().contains("remote.base_url"));
        Ok(())
    });
}
