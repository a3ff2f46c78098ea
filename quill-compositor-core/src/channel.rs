//! Duplex event pipes handed to window owners.
//!
//! Each pipe is a connected Unix socket pair. The compositor keeps the server
//! end in non-blocking mode: when a slow client lets its socket buffer fill up,
//! further messages are dropped instead of stalling the input path.

use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;

use parking_lot::Mutex;

use crate::protocol::{FrameReader, ProtocolError, WindowEvent};

/// Which of a window's pipes a channel is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Touch,
    Tablet,
    Key,
    Event,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 4] = [
        ChannelKind::Touch,
        ChannelKind::Tablet,
        ChannelKind::Key,
        ChannelKind::Event,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ChannelKind::Touch => "touch",
            ChannelKind::Tablet => "tablet",
            ChannelKind::Key => "key",
            ChannelKind::Event => "event",
        }
    }
}

struct ChannelInner {
    server: Option<UnixStream>,
    client: Option<UnixStream>,
    reader: FrameReader,
}

/// One end-to-end pipe between the compositor and a window owner.
pub struct EventChannel {
    kind: ChannelKind,
    inner: Mutex<ChannelInner>,
}

impl EventChannel {
    pub fn new(kind: ChannelKind) -> io::Result<Self> {
        let (server, client) = UnixStream::pair()?;
        server.set_nonblocking(true)?;
        Ok(Self {
            kind,
            inner: Mutex::new(ChannelInner {
                server: Some(server),
                client: Some(client),
                reader: FrameReader::new(),
            }),
        })
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().server.is_some()
    }

    /// A new handle to the client end, for passing to the owner.
    pub fn client_handle(&self) -> io::Result<Option<UnixStream>> {
        match &self.inner.lock().client {
            Some(client) => client.try_clone().map(Some),
            None => Ok(None),
        }
    }

    /// Writes `event` to the client. Returns `false` if the message was
    /// dropped because the channel is closed or the client is not reading.
    pub fn send(&self, event: &WindowEvent) -> bool {
        let mut inner = self.inner.lock();
        let Some(server) = inner.server.as_mut() else {
            return false;
        };
        let bytes = event.encode();
        match server.write(&bytes) {
            Ok(written) if written == bytes.len() => true,
            Ok(written) => {
                // A partial frame would corrupt the stream for the reader.
                tracing::warn!(
                    channel = self.kind.name(),
                    written,
                    expected = bytes.len(),
                    "Partial write on event channel, closing it"
                );
                Self::shutdown(&mut inner);
                false
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                tracing::warn!(channel = self.kind.name(), "Event channel full, dropping message");
                false
            }
            Err(e) => {
                tracing::debug!(channel = self.kind.name(), error = %e, "Event channel write failed");
                false
            }
        }
    }

    /// Reads everything currently available and returns the decoded messages.
    pub fn try_recv(&self) -> Result<Vec<WindowEvent>, ProtocolError> {
        let mut inner = self.inner.lock();
        let ChannelInner { server, reader, .. } = &mut *inner;
        let Some(server) = server.as_mut() else {
            return Ok(Vec::new());
        };
        let mut chunk = [0u8; 1024];
        loop {
            match server.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => reader.push(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        let mut events = Vec::new();
        while let Some(event) = reader.next_event()? {
            events.push(event);
        }
        Ok(events)
    }

    /// Sends the `Close` sentinel and shuts both ends down.
    pub fn close(&self) {
        self.send(&WindowEvent::Close);
        Self::shutdown(&mut self.inner.lock());
    }

    fn shutdown(inner: &mut ChannelInner) {
        if let Some(server) = inner.server.take() {
            let _ = server.shutdown(Shutdown::Write);
        }
        inner.client = None;
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("kind", &self.kind)
            .field("open", &self.is_open())
            .finish()
    }
}
