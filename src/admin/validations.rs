//! Checks run against a target instance before it is admitted to a group.

use crate::connection::{Session, get_server_variable};
use crate::core::{AdminError, Result};
use crate::group::sql;
use crate::provision::MemberSslMode;
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use std::net::Ipv4Addr;

lazy_static! {
    static ref LABEL_CHARS: Regex = Regex::new(r"^[a-zA-Z0-9_\-.:]+$").unwrap();
    static ref CLUSTER_NAME_CHARS: Regex = Regex::new(r"^[a-zA-Z0-9_]+$").unwrap();
    static ref HOSTNAME: Regex = Regex::new(
        r"^[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?)*$"
    )
    .unwrap();
}

const MAX_LABEL_LENGTH: usize = 256;
const MAX_CLUSTER_NAME_LENGTH: usize = 40;

// ============================================================================
// Addresses
// ============================================================================

/// Loopback names and addresses.
pub fn is_local_host(host: &str) -> bool {
    let host = host.trim().trim_start_matches('[').trim_end_matches(']');
    host.eq_ignore_ascii_case("localhost")
        || host == "::1"
        || host
            .parse::<Ipv4Addr>()
            .is_ok_and(|ip| ip.is_loopback())
}

/// Whether `datadir` ends with the sandbox suffix, ignoring a trailing
/// path separator.
pub fn is_sandbox_datadir(datadir: &str, suffix: &str) -> bool {
    let datadir = datadir.trim_end_matches(['/', '\\']);
    !suffix.is_empty() && datadir.ends_with(suffix)
}

/// Rejects loopback hosts unless they serve a sandbox instance, and warns
/// when the server reports a loopback hostname to the group.
pub fn validate_instance_address(
    session: &dyn Session,
    host: &str,
    sandbox_suffix: &str,
) -> Result<()> {
    if is_local_host(host) {
        let datadir = get_server_variable(session, sql::VAR_DATADIR)?.unwrap_or_default();
        if !is_sandbox_datadir(&datadir, sandbox_suffix) {
            info!(
                "'{}' is a local address but not in a sandbox (datadir {})",
                host, datadir
            );
            return Err(AdminError::runtime(format!(
                "To add an instance to the cluster, please use a valid, non-local hostname or IP. \
                 {} can only be used with sandbox MySQL instances.",
                host
            )));
        }
        info!("'{}' ({}) detected as local sandbox", host, datadir);
        return Ok(());
    }

    if get_server_variable(session, sql::VAR_REPORT_HOST)?.is_none() {
        let hostname = get_server_variable(session, sql::VAR_HOSTNAME)?.unwrap_or_default();
        if is_local_host(&hostname) {
            warn!(
                "MySQL server reports hostname as being '{}', which may cause the cluster to be \
                 inaccessible externally. Please set report_host in MySQL to fix this.",
                hostname
            );
        }
    }
    Ok(())
}

/// Binary log filters break group replication.
pub fn validate_replication_filters(session: &dyn Session) -> Result<()> {
    let result = session.execute(sql::MASTER_STATUS)?;
    let filtered = ["Binlog_Do_DB", "Binlog_Ignore_DB"]
        .iter()
        .any(|column| result.get_text(0, column).is_some_and(|v| !v.trim().is_empty()));
    if filtered {
        return Err(AdminError::runtime(format!(
            "The instance '{}' has binlog filters configured, but they are not supported in \
             InnoDB Cluster.",
            session.connection_options().address()
        )));
    }
    Ok(())
}

// ============================================================================
// SSL
// ============================================================================

fn instance_supports_ssl(session: &dyn Session) -> Result<bool> {
    Ok(get_server_variable(session, sql::VAR_HAVE_SSL)?
        .is_some_and(|v| v.eq_ignore_ascii_case("YES")))
}

fn requires_secure_transport(session: &dyn Session) -> Result<bool> {
    Ok(session
        .global_variable(sql::VAR_REQUIRE_SECURE_TRANSPORT)?
        .as_bool())
}

/// SSL mode for the seed of a new group.
pub fn resolve_cluster_ssl_mode(
    session: &dyn Session,
    requested: MemberSslMode,
) -> Result<MemberSslMode> {
    let address = session.connection_options().address();
    match requested {
        MemberSslMode::Required => {
            if !instance_supports_ssl(session)? {
                return Err(AdminError::runtime(format!(
                    "The instance '{}' does not have SSL enabled, to configure the cluster to \
                     use SSL please enable SSL on the instance first.",
                    address
                )));
            }
            Ok(MemberSslMode::Required)
        }
        MemberSslMode::Disabled => {
            if requires_secure_transport(session)? {
                return Err(AdminError::runtime(format!(
                    "The instance '{}' requires secure connections, to create the cluster \
                     either turn off require_secure_transport or use the memberSslMode option \
                     with 'REQUIRED' value.",
                    address
                )));
            }
            Ok(MemberSslMode::Disabled)
        }
        MemberSslMode::Auto => {
            if instance_supports_ssl(session)? {
                Ok(MemberSslMode::Required)
            } else if requires_secure_transport(session)? {
                Err(AdminError::runtime(format!(
                    "The instance '{}' requires secure connections but does not support SSL.",
                    address
                )))
            } else {
                Ok(MemberSslMode::Disabled)
            }
        }
    }
}

/// SSL mode for an instance joining the group `peer` belongs to. The
/// group's own mode wins; an explicit request contradicting it is an error.
pub fn resolve_instance_ssl_mode(
    instance: &dyn Session,
    peer: &dyn Session,
    requested: MemberSslMode,
) -> Result<MemberSslMode> {
    let address = instance.connection_options().address();
    let group_mode = MemberSslMode::from_server_value(
        &get_server_variable(peer, sql::VAR_GR_SSL_MODE)?.unwrap_or_default(),
    );

    match group_mode {
        MemberSslMode::Required => {
            if requested == MemberSslMode::Disabled {
                return Err(AdminError::runtime(format!(
                    "The cluster has SSL (encryption) enabled. To add the instance '{}' to the \
                     cluster either disable SSL on the cluster, remove the memberSslMode option \
                     or use it with any of 'AUTO' or 'REQUIRED'.",
                    address
                )));
            }
            if !instance_supports_ssl(instance)? {
                return Err(AdminError::runtime(format!(
                    "Instance '{}' does not support SSL and cannot join a cluster with SSL \
                     (encryption) enabled. Enable SSL support on the instance and try again, \
                     otherwise it can only be added to a cluster with SSL disabled.",
                    address
                )));
            }
            Ok(MemberSslMode::Required)
        }
        _ => {
            if requested == MemberSslMode::Required {
                return Err(AdminError::runtime(format!(
                    "The cluster has SSL (encryption) disabled. To add the instance '{}' to the \
                     cluster either enable SSL on the cluster, remove the memberSslMode option \
                     or use it with any of 'AUTO' or 'DISABLED'.",
                    address
                )));
            }
            if requires_secure_transport(instance)? {
                return Err(AdminError::runtime(format!(
                    "The instance '{}' is configured to require a secure transport but the \
                     cluster has SSL disabled. To add the instance to the cluster, either turn \
                     OFF the require_secure_transport option on the instance or enable SSL on \
                     the cluster.",
                    address
                )));
            }
            Ok(MemberSslMode::Disabled)
        }
    }
}

// ============================================================================
// Option values
// ============================================================================

pub fn validate_label(label: &str) -> Result<()> {
    if label.is_empty() {
        return Err(AdminError::argument("The label can not be empty."));
    }
    if label.chars().count() > MAX_LABEL_LENGTH {
        return Err(AdminError::argument(format!(
            "The label can not be greater than {} characters.",
            MAX_LABEL_LENGTH
        )));
    }
    let starts_ok = label
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
    if !starts_ok {
        return Err(AdminError::argument(format!(
            "The label can only start with an alphanumeric or the '_' character. Invalid label: '{}'",
            label
        )));
    }
    if !LABEL_CHARS.is_match(label) {
        return Err(AdminError::argument(format!(
            "The label can only contain alphanumerics or the '_', '.', '-', ':' characters. \
             Invalid label: '{}'",
            label
        )));
    }
    Ok(())
}

pub fn validate_cluster_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AdminError::argument("The Cluster name cannot be empty."));
    }
    if name.chars().count() > MAX_CLUSTER_NAME_LENGTH {
        return Err(AdminError::argument(format!(
            "The Cluster name can not be greater than {} characters.",
            MAX_CLUSTER_NAME_LENGTH
        )));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        return Err(AdminError::argument(
            "The Cluster name can only start with an alphabetic or the '_' character.",
        ));
    }
    if !CLUSTER_NAME_CHARS.is_match(name) {
        return Err(AdminError::argument(
            "The Cluster name can only contain alphanumerics or the '_' character.",
        ));
    }
    Ok(())
}

/// Comma separated list of `AUTOMATIC`, IPv4 addresses with an optional
/// `/cidr` suffix, or hostnames.
pub fn validate_ip_whitelist(list: &str) -> Result<()> {
    if list.trim().is_empty() {
        return Err(AdminError::argument(
            "Invalid value for ipWhitelist, string value cannot be empty.",
        ));
    }
    if list.trim().eq_ignore_ascii_case("AUTOMATIC") {
        return Ok(());
    }
    for entry in list.split(',').map(str::trim) {
        let invalid = || {
            AdminError::argument(format!(
                "Invalid value for ipWhitelist '{}': '{}' is not a valid IPv4 address, \
                 subnet in CIDR notation or hostname.",
                list, entry
            ))
        };
        if entry.is_empty() {
            return Err(invalid());
        }
        match entry.split_once('/') {
            Some((ip, cidr)) => {
                ip.parse::<Ipv4Addr>().map_err(|_| invalid())?;
                let bits: u8 = cidr.parse().map_err(|_| invalid())?;
                if !(1..=32).contains(&bits) {
                    return Err(invalid());
                }
            }
            None => {
                let looks_numeric = entry.chars().all(|c| c.is_ascii_digit() || c == '.');
                if looks_numeric {
                    entry.parse::<Ipv4Addr>().map_err(|_| invalid())?;
                } else if !HOSTNAME.is_match(entry) {
                    return Err(invalid());
                }
            }
        }
    }
    Ok(())
}

/// Accepts `host:port`, `host:`, `:port` or a bare port.
pub fn validate_local_address(address: &str) -> Result<()> {
    let invalid = |why: &str| {
        AdminError::argument(format!("Invalid value for localAddress '{}': {}", address, why))
    };
    let address = address.trim();
    let port = match address.rsplit_once(':') {
        Some((_, port)) => port,
        None if address.chars().all(|c| c.is_ascii_digit()) => address,
        None => return Ok(()),
    };
    if port.is_empty() {
        return Ok(());
    }
    match port.parse::<u32>() {
        Ok(p) if (1..=65535).contains(&p) => Ok(()),
        _ => Err(invalid("port must be in the range [1, 65535]")),
    }
}

/// Fills in the parts of a `localAddress` value the operator left out:
/// the host defaults to the instance host, the port to `port * 10 + 1`,
/// or a random port in [1000, 65535] when that overflows.
pub fn resolve_local_address(value: &str, host: &str, port: u16) -> String {
    let value = value.trim();
    let (given_host, given_port) = match value.rsplit_once(':') {
        Some((h, p)) => (h, p),
        None if value.chars().all(|c| c.is_ascii_digit()) => ("", value),
        None => (value, ""),
    };
    let host = if given_host.is_empty() { host } else { given_host };
    let port = if given_port.is_empty() {
        let derived = u32::from(port) * 10 + 1;
        if derived > 65535 {
            let span = (65535 - 1000 + 1) as u128;
            (1000 + uuid::Uuid::new_v4().as_u128() % span).to_string()
        } else {
            derived.to_string()
        }
    } else {
        given_port.to_string()
    };
    format!("{}:{}", host, port)
}
