//! Forensic Collector
//!
//! Best-effort enrichment of a `Detection`. Each fact is gathered on its own;
//! a fact that cannot be collected is recorded in `ForensicSnapshot::absent`
//! and the rest of the snapshot is still returned. `collect` never fails.
//!
//! Process identity is the monitoring process's own: OS notification APIs do
//! not tell us which process touched the file.

use std::fs;
use std::net::{IpAddr, ToSocketAddrs};
use std::path::Path;

use chrono::{DateTime, Utc};
use sysinfo::{Networks, ProcessRefreshKind, System, Users};
use uuid::Uuid;

use super::types::{AbsentField, ActorIdentity, Detection, FileStat, ForensicSnapshot, ProcessIdentity};

type Fact<T> = Result<T, String>;

// ============================================================================
// COLLECTION
// ============================================================================

/// Build a forensic snapshot for `detection`
pub fn collect(detection: &Detection) -> ForensicSnapshot {
    let mut absent = Vec::new();

    let hostname = record(&mut absent, "actor.hostname", collect_hostname());
    let actor = ActorIdentity {
        username: record(&mut absent, "actor.username", collect_username()),
        internal_ip: match &hostname {
            Some(host) => record(&mut absent, "actor.internal_ip", resolve_internal_ip(host)),
            None => record(&mut absent, "actor.internal_ip", Err("hostname unavailable".to_string())),
        },
        mac_address: record(&mut absent, "actor.mac_address", collect_mac_address()),
        os: record(&mut absent, "actor.os", collect_os()),
        hostname,
    };

    let process = record(&mut absent, "process", collect_process());
    let file = record(&mut absent, "file", collect_file_stat(&detection.observed_path));

    ForensicSnapshot {
        id: Uuid::new_v4().to_string(),
        severity: detection.event_kind.severity(),
        detection: detection.clone(),
        collected_at: Utc::now(),
        actor,
        process,
        file,
        absent,
    }
}

fn record<T>(absent: &mut Vec<AbsentField>, field: &str, fact: Fact<T>) -> Option<T> {
    match fact {
        Ok(value) => Some(value),
        Err(reason) => {
            log::debug!("Forensic fact {} unavailable: {}", field, reason);
            absent.push(AbsentField { field: field.to_string(), reason });
            None
        }
    }
}

// ============================================================================
// SYSTEM IDENTITY
// ============================================================================

fn collect_hostname() -> Fact<String> {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .map_err(|e| e.to_string())
}

fn collect_username() -> Fact<String> {
    let from_process = sysinfo::get_current_pid().ok().and_then(|pid| {
        let mut sys = System::new();
        sys.refresh_process_specifics(pid, ProcessRefreshKind::new().with_user(sysinfo::UpdateKind::Always));
        let uid = sys.process(pid)?.user_id()?.clone();
        let users = Users::new_with_refreshed_list();
        users.get_user_by_id(&uid).map(|u| u.name().to_string())
    });

    from_process
        .or_else(|| std::env::var("USER").ok())
        .or_else(|| std::env::var("USERNAME").ok())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| "current user could not be resolved".to_string())
}

/// First non-loopback IPv4 the hostname resolves to, else any resolved address
fn resolve_internal_ip(host: &str) -> Fact<String> {
    let addrs: Vec<IpAddr> = (host, 0)
        .to_socket_addrs()
        .map_err(|e| e.to_string())?
        .map(|a| a.ip())
        .collect();

    addrs
        .iter()
        .find(|ip| ip.is_ipv4() && !ip.is_loopback())
        .or_else(|| addrs.first())
        .map(|ip| ip.to_string())
        .ok_or_else(|| format!("{} did not resolve", host))
}

fn collect_mac_address() -> Fact<String> {
    let networks = Networks::new_with_refreshed_list();
    let mut interfaces: Vec<_> = networks.iter().collect();
    interfaces.sort_by(|a, b| a.0.cmp(b.0));

    interfaces
        .into_iter()
        .map(|(_, data)| data.mac_address())
        .find(|mac| !mac.is_unspecified())
        .map(|mac| mac.to_string())
        .ok_or_else(|| "no interface with a hardware address".to_string())
}

fn collect_os() -> Fact<String> {
    match (System::name(), System::os_version()) {
        (Some(name), Some(version)) => Ok(format!("{} {}", name, version)),
        (Some(name), None) => Ok(name),
        _ => Err("os name unavailable".to_string()),
    }
}

// ============================================================================
// PROCESS & FILE
// ============================================================================

fn collect_process() -> Fact<ProcessIdentity> {
    let pid = sysinfo::get_current_pid().map_err(|e| e.to_string())?;
    let mut sys = System::new();
    sys.refresh_process_specifics(pid, ProcessRefreshKind::new().with_cmd(sysinfo::UpdateKind::Always));

    let process = sys
        .process(pid)
        .ok_or_else(|| format!("process {} not found", pid))?;

    Ok(ProcessIdentity {
        name: process.name().to_string(),
        pid: pid.as_u32(),
        command_line: process.cmd().join(" "),
    })
}

/// Metadata only; reading the decoy here would itself raise an access event.
fn collect_file_stat(path: &Path) -> Fact<FileStat> {
    let metadata = fs::metadata(path).map_err(|e| e.to_string())?;

    Ok(FileStat {
        size: metadata.len(),
        accessed_at: metadata.accessed().ok().map(DateTime::<Utc>::from),
        modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
    })
}

// ============================================================================
// TESTS
// ============================================================================
