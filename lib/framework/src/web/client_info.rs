use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::extract::Request;
use axum::http::header;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

#[derive(Debug)]
pub struct ClientInfo {
    pub client_ip: String,
    pub user_agent: Option<String>,
}

pub fn client_info(request: &Request, max_forwarded_ips: usize) -> ClientInfo {
    let remote_address = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|connect_info| connect_info.0.ip().to_string());
    let forwarded_for = request
        .headers()
        .get(X_FORWARDED_FOR)
        .and_then(|value| value.to_str().ok());
    let client_ip = client_ip(remote_address, forwarded_for, max_forwarded_ips);

    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).to_string());

    ClientInfo { client_ip, user_agent }
}

// only trust the last max_forwarded_ips entries, those are appended by our own proxies (e.g. google front end)
fn client_ip(remote_address: Option<String>, forwarded_for: Option<&str>, max_forwarded_ips: usize) -> String {
    if let Some(forwarded_for) = forwarded_for {
        let ips: Vec<&str> = forwarded_for
            .split(',')
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .collect();
        let index = ips.len().saturating_sub(max_forwarded_ips);
        if let Some(ip) = ips.get(index) {
            return (*ip).to_owned();
        }
    }
    remote_address.unwrap_or_else(|| "unknown".to_owned())
}
