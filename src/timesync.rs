//! Network time anchoring.
//!
//! Each capture page records a device clock reading and, when reachable, an
//! externally anchored timestamp so the two sources can be cross-validated
//! later. Queries degrade to a sentinel rather than blocking a session.

use std::net::UdpSocket;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_OFFSET: i64 = 2_208_988_800;

/// Recorded in artifacts when no server answered within the timeout.
pub const UNAVAILABLE: &str = "unavailable";

/// Query the given servers in order, returning the first answer.
pub fn network_time(servers: &[String], timeout: Duration) -> Option<DateTime<Utc>> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.set_read_timeout(Some(timeout)).ok()?;
    socket.set_write_timeout(Some(timeout)).ok()?;

    for server in servers {
        match sntpc::simple_get_time(server.as_str(), &socket) {
            Ok(result) => {
                let unix_secs = i64::from(result.sec()) - NTP_UNIX_OFFSET;
                if let Some(stamp) = DateTime::from_timestamp(unix_secs, 0) {
                    return Some(stamp);
                }
            }
            Err(err) => debug!(server = server.as_str(), ?err, "NTP query failed"),
        }
    }
    None
}

/// Render an anchored timestamp for artifacts, or the documented sentinel.
pub fn render(stamp: Option<DateTime<Utc>>) -> String {
    match stamp {
        Some(ts) => ts.to_rfc3339(),
        None => UNAVAILABLE.to_string(),
    }
}
