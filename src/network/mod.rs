//! Transport: one TCP `Connection` per broker, plus the opaque
//! authentication hook SSL/SASL configuration is handed to.

mod connection;

pub use self::connection::{Connection, read_matching_response};

use errors::Result;

/// SSL/SASL handshake hook.
///
/// TLS and SASL-GSSAPI negotiation are treated as an external collaborator
/// wired in after the socket connects and before the first request is
/// framed; this crate keeps that seam but does not implement the handshake
/// itself. A real deployment that sets `ssl_*` / `sasl_gssapi_*`
/// configuration would plug a `native_tls`/GSSAPI implementation in here.
pub fn authenticate<C>(_connection: &mut C, ssl_enabled: bool) -> Result<()> {
    if ssl_enabled {
        debug!("authenticate() is a stub in this crate; SSL/SASL negotiation is an external collaborator");
    }
    Ok(())
}
