//! The `lmhosts` backend: a flat file of `address name[#type]` lines.
//! Entries without an explicit type match only the workstation and
//! server name types.

use std::fs;
use std::net::IpAddr;
use std::path::Path;

use crate::error::ResolveError;

/// One parsed lmhosts line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LmHostsEntry {
    pub addr: IpAddr,
    pub name: String,
    /// None for untyped entries, which serve 0x00 and 0x20 lookups.
    pub name_type: Option<u8>,
}

/// Parse one line. Comments and unparsable lines yield `None`.
pub fn parse_line(line: &str) -> Option<LmHostsEntry> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut tokens = line.split_whitespace();
    let addr: IpAddr = tokens.next()?.parse().ok()?;
    let name_token = tokens.next()?;

    let (name, name_type) = match name_token.split_once('#') {
        Some((name, type_str)) => {
            let name_type = u8::from_str_radix(type_str, 16).ok()?;
            (name, Some(name_type))
        }
        None => (name_token, None),
    };
    if name.is_empty() {
        return None;
    }

    Some(LmHostsEntry {
        addr,
        name: name.to_string(),
        name_type,
    })
}

fn entry_matches_type(entry: &LmHostsEntry, name_type: u8) -> bool {
    match entry.name_type {
        Some(t) => t == name_type,
        None => name_type == 0x00 || name_type == 0x20,
    }
}

fn entries(path: &Path) -> Result<Vec<LmHostsEntry>, ResolveError> {
    let contents = fs::read_to_string(path).map_err(|err| {
        log::debug!("startlmhosts: can't open lmhosts file {:?}: {}", path, err);
        ResolveError::Unsuccessful
    })?;
    Ok(contents.lines().filter_map(parse_line).collect())
}

/// Collect every address the file lists for `(name, name_type)`.
pub fn resolve_lmhosts(
    path: &Path,
    name: &str,
    name_type: u8,
) -> Result<Vec<IpAddr>, ResolveError> {
    log::info!(
        "resolve_lmhosts: attempting lmhosts lookup for name {}<0x{:x}>",
        name,
        name_type
    );

    let addrs: Vec<IpAddr> = entries(path)?
        .into_iter()
        .filter(|e| e.name.eq_ignore_ascii_case(name) && entry_matches_type(e, name_type))
        .map(|e| e.addr)
        .collect();

    if addrs.is_empty() {
        return Err(ResolveError::NotFound);
    }
    Ok(addrs)
}

/// Reverse scan used by node-status lookups: the first name of the
/// requested type recorded for `addr`.
pub fn lookup_name_by_addr(path: &Path, addr: &IpAddr, name_type: u8) -> Option<String> {
    if !addr.is_ipv4() {
        return None;
    }
    entries(path)
        .ok()?
        .into_iter()
        .find(|e| e.addr == *addr && entry_matches_type(e, name_type))
        .map(|e| e.name)
}
