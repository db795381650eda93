use std::net::SocketAddr;

use tokio::net::lookup_host;

/// Resolves `host:port` to every address the resolver returns.
pub async fn resolve_host(host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
    // url hands out bracketed IPv6 hosts.
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let addrs: Vec<SocketAddr> = lookup_host((host, port)).await?.collect();
    if addrs.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Unable to resolve host: {}", host),
        ));
    }
    Ok(addrs)
}
