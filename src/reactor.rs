use crate::prelude::*;
use mio::event::Source;

/// Who a registered fd belongs to. Pipe entries carry the token of the
/// client connection whose CGI coordinator owns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Listener,
    Client,
    CgiPipe(Token),
}

/// One delivered readiness event, detached from mio's event buffer so
/// dispatch can borrow the rest of the server freely.
#[derive(Debug, Clone, Copy)]
pub struct EventView {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
}

/// Wraps the readiness notifier: fd registration with token allocation,
/// interest changes, removal, and a single `wait` that snapshots the
/// batch. Every fd has exactly one owner in the registry and must be
/// removed here before its descriptor is closed.
pub struct Reactor {
    poll: Poll,
    events: Events,
    owners: HashMap<Token, Owner>,
    next_token: usize,
}

impl Reactor {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(1024),
            owners: HashMap::new(),
            next_token: 0,
        })
    }

    pub fn add(
        &mut self,
        source: &mut impl Source,
        owner: Owner,
        interest: Interest,
    ) -> io::Result<Token> {
        let token = Token(self.next_token);
        self.next_token += 1;
        self.poll.registry().register(source, token, interest)?;
        self.owners.insert(token, owner);
        Ok(token)
    }

    pub fn modify(
        &mut self,
        source: &mut impl Source,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll.registry().reregister(source, token, interest)
    }

    pub fn remove(&mut self, source: &mut impl Source, token: Token) -> io::Result<()> {
        self.owners.remove(&token);
        self.poll.registry().deregister(source)
    }

    pub fn owner(&self, token: Token) -> Option<Owner> {
        self.owners.get(&token).copied()
    }

    /// One batch from the poller. Interrupted waits surface as an empty
    /// batch so signal delivery can stop the loop.
    pub fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Vec<EventView>> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }

        let batch = self
            .events
            .iter()
            .map(|event| EventView {
                token: event.token(),
                readable: event.is_readable() || event.is_read_closed(),
                writable: event.is_writable(),
                error: event.is_error(),
            })
            .collect();
        Ok(batch)
    }
}
