//! Process configuration, loaded from environment variables.

use crate::error::ConfigError;
use clap::Parser;
use std::net::IpAddr;

/// External-media request-body convention historically offered by ARI-style
/// engines. The target engine version decides which one it expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExternalMediaStyle {
    /// `POST /channels/externalMedia?app=...&external_host=...`
    QueryParams,
    /// `POST /channels/externalMedia` with a JSON body.
    JsonBody,
}

/// Authentication style for the engine's event-stream WebSocket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventAuthStyle {
    /// `?api_key=user:pass` query string.
    QueryString,
    /// `Authorization: Basic ...` header.
    Header,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "rtt-echo-relay")]
struct RawArgs {
    #[arg(long, env = "ENGINE_URL")]
    engine_url: String,

    #[arg(long, env = "ENGINE_USER")]
    engine_user: String,

    #[arg(long, env = "ENGINE_PASS")]
    engine_pass: String,

    #[arg(long, env = "APP_NAME", default_value = "rtt-echo")]
    app_name: String,

    #[arg(long, env = "BIND_IP", default_value = "0.0.0.0")]
    bind_ip: String,

    #[arg(long, env = "PORT_RANGE", default_value = "20000-20999")]
    port_range: String,

    #[arg(long, env = "ECHO_HOST")]
    echo_host: String,

    #[arg(long, env = "ECHO_PORT")]
    echo_port: u16,

    #[arg(long, env = "METRICS_INTERVAL_SEC", default_value_t = 10)]
    metrics_interval_sec: u64,

    #[arg(long, env = "SERVICE_PORT", default_value_t = 9090)]
    service_port: u16,

    #[arg(long, env = "EXTERNAL_MEDIA_STYLE", default_value = "query-params")]
    external_media_style: String,

    #[arg(long, env = "EVENT_AUTH_STYLE", default_value = "query-string")]
    event_auth_style: String,
}

/// Fully validated process configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub engine_url: String,
    pub engine_user: String,
    pub engine_pass: String,
    pub app_name: String,
    pub bind_ip: IpAddr,
    pub port_range: (u16, u16),
    pub echo_host: IpAddr,
    pub echo_port: u16,
    pub metrics_interval_sec: u64,
    pub service_port: u16,
    pub external_media_style: ExternalMediaStyle,
    pub event_auth_style: EventAuthStyle,
}

impl Config {
    /// Parse configuration from the process environment (and CLI flags, for
    /// local overrides/testing). Any missing or malformed field is a fatal
    /// startup error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = RawArgs::try_parse().map_err(|e| {
            // clap has already identified which field is missing/bad; surface
            // its rendered message rather than re-deriving which var it was.
            ConfigError::Cli(e.to_string())
        })?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawArgs) -> Result<Self, ConfigError> {
        let bind_ip: IpAddr = raw
            .bind_ip
            .parse()
            .map_err(|_| ConfigError::BadAddr(raw.bind_ip.clone(), "not an IP address".into()))?;

        let port_range = parse_port_range(&raw.port_range)?;

        let echo_host: IpAddr = raw
            .echo_host
            .parse()
            .map_err(|_| ConfigError::BadAddr(raw.echo_host.clone(), "ECHO_HOST must be an IP address".into()))?;

        if raw.service_port == 0 {
            return Err(ConfigError::BadServicePort(raw.service_port.to_string()));
        }

        let external_media_style = match raw.external_media_style.as_str() {
            "query-params" => ExternalMediaStyle::QueryParams,
            "json-body" => ExternalMediaStyle::JsonBody,
            other => return Err(ConfigError::BadEnumVar(other.to_string(), "EXTERNAL_MEDIA_STYLE")),
        };

        let event_auth_style = match raw.event_auth_style.as_str() {
            "query-string" => EventAuthStyle::QueryString,
            "header" => EventAuthStyle::Header,
            other => return Err(ConfigError::BadEnumVar(other.to_string(), "EVENT_AUTH_STYLE")),
        };

        Ok(Config {
            engine_url: raw.engine_url,
            engine_user: raw.engine_user,
            engine_pass: raw.engine_pass,
            app_name: raw.app_name,
            bind_ip,
            port_range,
            echo_host,
            echo_port: raw.echo_port,
            metrics_interval_sec: raw.metrics_interval_sec,
            service_port: raw.service_port,
            external_media_style,
            event_auth_style,
        })
    }
}

fn parse_port_range(s: &str) -> Result<(u16, u16), ConfigError> {
    let (min, max) = s
        .split_once('-')
        .ok_or_else(|| ConfigError::BadPortRange(s.to_string()))?;

    let min: u16 = min.parse().map_err(|_| ConfigError::BadPortRange(s.to_string()))?;
    let max: u16 = max.parse().map_err(|_| ConfigError::BadPortRange(s.to_string()))?;

    if min > max {
        return Err(ConfigError::BadPortRange(s.to_string()));
    }

    Ok((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_range() {
        assert_eq!(parse_port_range("20000-20999").unwrap(), (20000, 20999));
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(parse_port_range("500-100").is_err());
    }

    #[test]
    fn rejects_garbage_range() {
        assert!(parse_port_range("nope").is_err());
        assert!(parse_port_range("10-").is_err());
    }
}
