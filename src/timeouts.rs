use crate::prelude::*;
use crate::reactor::Reactor;
use crate::server::Server;

/// Periodic sweeps driven from the event loop: idle clients are closed,
/// stuck CGI children are killed and reaped.
pub fn process(server: &mut Server, reactor: &mut Reactor) {
    let now = Instant::now();

    for conn in server.connections.values_mut() {
        if now.duration_since(conn.last_activity) > CLIENT_TIMEOUT {
            trace!("idle connection {:?} timed out", conn.token);
            if let Some(cgi) = conn.cgi.as_mut() {
                if cgi.is_running() {
                    cgi.abort(&mut conn.response, reactor);
                }
            }
            conn.state = ConnState::Closed;
            continue;
        }

        let stuck = conn
            .cgi
            .as_ref()
            .map(|cgi| cgi.is_running() && cgi.started_at.elapsed() > CGI_TIMEOUT)
            .unwrap_or(false);
        if stuck {
            warn!("cgi wall-clock timeout on {:?}, killing child", conn.token);
            if let Some(cgi) = conn.cgi.as_mut() {
                cgi.abort(&mut conn.response, reactor);
            }
            // the 504 (or the truncated stream) still has to go out
            let _ = conn.begin_abort_send(reactor);
        }
    }
}
