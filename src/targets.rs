use crate::types::Target;
use anyhow::{bail, Context, Result};
use if_addrs::{get_if_addrs, IfAddr};
use ipnet::{IpNet, Ipv4Net};
use std::collections::HashSet;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

/// Upper bound on hosts expanded from a single CIDR.
pub const MAX_HOSTS_PER_CIDR: u128 = 65_536;

/// Parse a target list into deduplicated host addresses.
///
/// Supported formats per line (commas also separate entries):
/// - single address: `10.0.0.5`, `fe80::1`
/// - CIDR network: `192.168.1.0/24`
/// - comments: everything after `#` is ignored
/// - whitespace and blank lines are ignored
pub fn parse_targets_str(s: &str) -> Result<Vec<IpAddr>> {
    let mut out: Vec<IpAddr> = Vec::new();
    let mut seen = HashSet::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        for item in line.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            let ips = parse_item(item).with_context(|| format!("line {line_no}: invalid target: {item}"))?;
            for ip in ips {
                if seen.insert(ip) {
                    out.push(ip);
                }
            }
        }
    }

    Ok(out)
}

/// Resolve a `--targets` argument: a path to a target file, or an inline list.
pub fn load_targets(arg: &str) -> Result<Vec<IpAddr>> {
    let path = Path::new(arg);
    if path.is_file() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read targets file: {}", path.display()))?;
        return parse_targets_str(&content);
    }
    parse_targets_str(arg)
}

/// Pair every host with `port`.
pub fn with_port(hosts: &[IpAddr], port: u16) -> Vec<Target> {
    hosts.iter().map(|&ip| Target::new(ip, port)).collect()
}

fn parse_item(item: &str) -> Result<Vec<IpAddr>> {
    if item.contains('/') {
        let net: IpNet = item.parse()?;
        return expand_cidr_to_ips(net);
    }
    let ip: IpAddr = item.parse()?;
    Ok(vec![ip])
}

/// Detect local non-loopback IPv4 addresses and convert each to a default /24 CIDR network.
///
/// Duplicates are removed and the result is sorted.
pub fn detect_local_cidrs() -> Result<Vec<IpNet>> {
    let mut set = HashSet::<Ipv4Net>::new();
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            set.insert(ipv4_to_default_cidr(v4.ip));
        }
    }
    let mut cidrs: Vec<Ipv4Net> = set.into_iter().collect();
    cidrs.sort_by_key(|n| u32::from(n.network()));
    Ok(cidrs.into_iter().map(IpNet::V4).collect())
}

/// Expand a CIDR into individual host addresses.
///
/// IPv4 prefixes shorter than /31 exclude the network and broadcast addresses.
/// Networks larger than [`MAX_HOSTS_PER_CIDR`] are refused.
pub fn expand_cidr_to_ips(cidr: IpNet) -> Result<Vec<IpAddr>> {
    let size: u128 = match cidr {
        IpNet::V4(n) => 1u128 << (32 - n.prefix_len()),
        IpNet::V6(n) => 1u128.checked_shl(128 - n.prefix_len() as u32).unwrap_or(u128::MAX),
    };
    if size > MAX_HOSTS_PER_CIDR {
        bail!("{cidr} has {size} addresses, limit is {MAX_HOSTS_PER_CIDR}");
    }
    Ok(cidr.hosts().collect())
}

/// Helper: convert an IPv4 address into its default /24 network.
pub fn ipv4_to_default_cidr(ip: Ipv4Addr) -> Ipv4Net {
    let o = ip.octets();
    Ipv4Net::new(Ipv4Addr::new(o[0], o[1], o[2], 0), 24).expect("/24 is always valid")
}
