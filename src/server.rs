use crate::prelude::*;
use crate::reactor::{EventView, Owner, Reactor};
use crate::timeouts;
use std::net::ToSocketAddrs;
use std::sync::atomic::{AtomicBool, Ordering};

/// One bound listening socket and the virtual hosts behind it. The first
/// config in `configs` is the default server for the address.
pub struct Listener {
    socket: TcpListener,
    configs: Vec<Arc<ServerConfig>>,
    port: u16,
}

/// Owns every listener and connection, and routes delivered events to
/// them through the reactor's registry.
pub struct Server {
    pub listeners: HashMap<Token, Listener>,
    pub connections: HashMap<Token, HttpConnection>,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    /// Binds one socket per distinct listen address; servers sharing an
    /// address become virtual hosts on that socket in declaration order.
    pub fn new(
        config: Config,
        reactor: &mut Reactor,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Server> {
        let mut groups: Vec<(String, u16, Vec<Arc<ServerConfig>>)> = Vec::new();
        for server in config.servers {
            let server = Arc::new(server);
            let addr = server.listen_addr();
            match groups.iter_mut().find(|(a, _, _)| *a == addr) {
                Some((_, _, list)) => list.push(server),
                None => groups.push((addr, server.port, vec![server])),
            }
        }

        let mut listeners = HashMap::new();
        for (addr, port, configs) in groups {
            let sock_addr = addr
                .to_socket_addrs()?
                .next()
                .ok_or_else(|| format!("cannot resolve listen address '{}'", addr))?;
            let mut socket = TcpListener::bind(sock_addr)?;
            let token = reactor.add(&mut socket, Owner::Listener, Interest::READABLE)?;
            info!("listening on {}", addr);
            listeners.insert(token, Listener { socket, configs, port });
        }

        Ok(Server {
            listeners,
            connections: HashMap::new(),
            shutdown,
        })
    }

    /// The event loop: one `wait` batch per iteration, then the timeout
    /// sweeps and closed-connection reaping, until the shutdown flag is
    /// raised by a signal.
    pub fn run(&mut self, reactor: &mut Reactor) -> Result<()> {
        while !self.shutdown.load(Ordering::Relaxed) {
            let batch = reactor.wait(Some(Duration::from_secs(1)))?;
            for event in batch {
                self.dispatch(event, reactor);
            }
            timeouts::process(self, reactor);
            self.reap_closed(reactor);
        }

        info!("shutdown requested, draining {} connection(s)", self.connections.len());
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            if let Some(mut conn) = self.connections.remove(&token) {
                conn.teardown(reactor);
            }
        }
        Ok(())
    }

    /// A failure while handling one peer never unwinds past dispatch;
    /// the connection is flagged and reaped, the loop continues.
    fn dispatch(&mut self, event: EventView, reactor: &mut Reactor) {
        match reactor.owner(event.token) {
            Some(Owner::Listener) => self.accept(event.token, reactor),
            Some(Owner::Client) => {
                let Some(conn) = self.connections.get_mut(&event.token) else {
                    return;
                };
                let mut result = Ok(());
                if event.readable {
                    result = conn.on_readable(reactor);
                }
                if result.is_ok() && event.writable {
                    result = conn.on_writable(reactor);
                }
                if let Err(e) = result {
                    error!("connection {:?} failed: {}", event.token, e);
                    conn.state = ConnState::Error;
                }
                if event.error && !conn.should_close() {
                    conn.state = ConnState::Error;
                }
            }
            Some(Owner::CgiPipe(client)) => {
                let Some(conn) = self.connections.get_mut(&client) else {
                    return;
                };
                let result = conn.on_cgi_event(
                    event.token,
                    event.readable,
                    event.writable,
                    event.error,
                    reactor,
                );
                if let Err(e) = result {
                    error!("cgi pipe for {:?} failed: {}", client, e);
                    conn.state = ConnState::Error;
                }
            }
            // event raced with a deregistration; the fd is gone
            None => {}
        }
    }

    fn accept(&mut self, token: Token, reactor: &mut Reactor) {
        loop {
            let accepted = {
                let Some(listener) = self.listeners.get_mut(&token) else {
                    return;
                };
                match listener.socket.accept() {
                    Ok((stream, peer)) => {
                        Some((stream, peer, listener.configs.clone(), listener.port))
                    }
                    Err(ref e) if e.kind() == ErrorKind::WouldBlock => None,
                    Err(e) => {
                        // aborted handshake or transient failure: keep
                        // draining the accept queue
                        warn!("accept failed: {}", e);
                        continue;
                    }
                }
            };

            let Some((mut stream, peer, configs, port)) = accepted else {
                return;
            };
            trace!("accepted connection from {}", peer);
            match reactor.add(&mut stream, Owner::Client, Interest::READABLE) {
                Ok(client_token) => {
                    self.connections.insert(
                        client_token,
                        HttpConnection::new(stream, client_token, configs, port),
                    );
                }
                Err(e) => {
                    // drop the stream; the peer sees a reset
                    error!("failed to register client: {}", e);
                }
            }
        }
    }

    /// Exactly one teardown per connection: deregister every owned fd,
    /// then drop (which closes the socket).
    fn reap_closed(&mut self, reactor: &mut Reactor) {
        let closed: Vec<Token> = self
            .connections
            .iter()
            .filter(|(_, conn)| conn.should_close())
            .map(|(token, _)| *token)
            .collect();

        for token in closed {
            if let Some(mut conn) = self.connections.remove(&token) {
                trace!("closing connection {:?}", token);
                conn.teardown(reactor);
            }
        }
    }
}
