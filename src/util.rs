use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

const PROBER_LISTEN_ADDRESS: &str = "PROBER_LISTEN_ADDRESS";

const DEFAULT_LISTEN_ADDRESS: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(0, 0, 0, 0), 9110));

pub fn get_default_listen_address() -> SocketAddr {
    DEFAULT_LISTEN_ADDRESS
}

pub fn get_listen_address() -> SocketAddr {
    let addr_from_env = std::env::var(PROBER_LISTEN_ADDRESS);
    addr_from_env.map_or(DEFAULT_LISTEN_ADDRESS, |res| {
        parse_listen_address(&res).unwrap_or(DEFAULT_LISTEN_ADDRESS)
    })
}

/// Accepts `host:port` as well as the `:port` shorthand for all interfaces.
pub fn parse_listen_address(value: &str) -> Option<SocketAddr> {
    match value.strip_prefix(':') {
        Some(port) => port
            .parse()
            .ok()
            .map(|port| SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(0, 0, 0, 0), port))),
        None => value.parse().ok(),
    }
}

const PROBER_METRICS_PATH: &str = "PROBER_METRICS_PATH";

const DEFAULT_METRICS_PATH: &str = "/metrics";

pub fn get_metrics_path() -> String {
    let path_from_env = std::env::var(PROBER_METRICS_PATH);
    path_from_env
        .ok()
        .filter(|path| path.starts_with('/'))
        .unwrap_or_else(|| DEFAULT_METRICS_PATH.to_string())
}

const PROBER_CONFIG_PATH: &str = "PROBER_CONFIG_PATH";

const DEFAULT_CONFIG_PATH: &str = "blackbox.yml";

pub fn get_config_path() -> String {
    let path_from_env = std::env::var(PROBER_CONFIG_PATH);
    path_from_env.unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

const PROBER_MAX_CONCURRENCY: &str = "PROBER_MAX_CONCURRENCY";

pub fn get_max_concurrency() -> Option<usize> {
    let limit_from_env = std::env::var(PROBER_MAX_CONCURRENCY);
    limit_from_env
        .ok()
        .and_then(|res| res.parse().ok())
        .filter(|limit| *limit > 0)
}

/// Splits `host:port`, `[v6]:port` or a bare host into its host part.
pub fn host_of(host_port: &str) -> &str {
    if let Some(rest) = host_port.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host_port.rsplit_once(':') {
        // a bare IPv6 address has more than one colon and no brackets
        Some((host, _)) if !host.contains(':') => host,
        _ => host_port,
    }
}
