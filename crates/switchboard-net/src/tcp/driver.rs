use std::collections::HashMap;
use std::io::{self, IoSlice, Read, Write};
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use mio::net::TcpStream as MioTcpStream;
use mio::{Events, Interest, Poll, Token};
use switchboard_cache::{CacheConfig, StagingCache};
use switchboard_utils::safe_panic;
use tracing::{debug, warn};

use crate::callbacks::{Callbacks, MsgExternInfo};
use crate::driver::Driver;
use crate::error::TransportError;
use crate::handle::{Handle, HandleAllocator};
use crate::tcp::connection::Connection;
use crate::tcp::frame::{self, HEADER_LEN};
use crate::tcp::listener::{bind_raw, Listener};

/// Tuning knobs for [`StreamDriver`].
#[derive(Debug, Clone)]
pub struct StreamDriverConfig {
    /// Size of the per-update scratch buffer each connection reads into.
    /// A connection whose staged residual plus one read would exceed this
    /// is treated as an error (the source's `DEFAULT_COMMON_BUFF_LEN`).
    pub scratch_buffer_len: usize,
    /// Passed straight to `listen()`.
    pub listen_backlog: u32,
    /// Upper bound on fragments accepted by `send_vectored`, plus one for
    /// the frame header (the source's `MAX_SENDV_DATA_NUM`).
    pub max_send_fragments: usize,
    /// Caps how many complete frames a single `update()` call will deliver
    /// per connection, so one very chatty peer can't starve the others
    /// sharing this driver's reactor pass. `None` means no cap.
    pub max_frames_per_event: Option<usize>,
    pub send_cache: CacheConfig,
    pub recv_cache: CacheConfig,
}

impl Default for StreamDriverConfig {
    fn default() -> Self {
        Self {
            scratch_buffer_len: 2 * 1024 * 1024,
            listen_backlog: 10_000,
            max_send_fragments: 32,
            max_frames_per_event: None,
            send_cache: CacheConfig::default(),
            recv_cache: CacheConfig::default(),
        }
    }
}

enum Slot {
    Listener(Listener),
    Connection(Connection),
}

/// The built-in `tcp` driver: a single-threaded, non-blocking reactor over
/// `mio`, framing every message with an 8-byte magic+length header.
pub struct StreamDriver {
    config: StreamDriverConfig,
    poll: Option<Poll>,
    events: Events,
    handles: HandleAllocator,
    slots: HashMap<Handle, Slot>,
    send_cache: StagingCache,
    recv_cache: StagingCache,
    scratch: Vec<u8>,
    callbacks: Option<Rc<dyn Callbacks>>,
}

impl StreamDriver {
    pub fn new(config: StreamDriverConfig) -> Self {
        let scratch = vec![0u8; config.scratch_buffer_len];
        let send_cache = StagingCache::new(config.send_cache);
        let recv_cache = StagingCache::new(config.recv_cache);
        Self {
            config,
            poll: None,
            events: Events::with_capacity(1024),
            handles: HandleAllocator::new(0),
            slots: HashMap::new(),
            send_cache,
            recv_cache,
            scratch,
            callbacks: None,
        }
    }

    fn registry(&self) -> &mio::Registry {
        self.poll.as_ref().expect("StreamDriver::init was not called").registry()
    }

    fn token_of(handle: Handle) -> Token {
        Token(handle.raw() as usize)
    }

    fn dial(addr: SocketAddr) -> io::Result<MioTcpStream> {
        MioTcpStream::connect(addr)
    }

    /// Tears down a connection's socket (deregister + shutdown) and
    /// forgets any staged bytes, but leaves the `Slot::Connection` entry
    /// itself in place with `stream = None`.
    fn teardown_connection_io(&mut self, handle: Handle) {
        if let Some(Slot::Connection(conn)) = self.slots.get_mut(&handle) {
            if let Some(mut stream) = conn.stream.take() {
                let _ = self.poll.as_ref().unwrap().registry().deregister(&mut stream);
                let _ = stream.shutdown(std::net::Shutdown::Both);
            }
            conn.write_armed = false;
        }
        self.send_cache.del(handle.raw());
        self.recv_cache.del(handle.raw());
    }

    /// A connection hit an unrecoverable I/O error. Client-style
    /// connections are torn down and redialed immediately, in place;
    /// server-style connections are dropped and reported.
    fn connection_on_error(&mut self, handle: Handle) {
        let Some(Slot::Connection(conn)) = self.slots.get(&handle) else { return };
        let is_client = conn.is_client_style();
        let peer_addr = conn.peer_addr;
        let local_handle = conn.local_handle;
        let trans_handle = conn.trans_handle;

        if !is_client {
            self.teardown_connection_io(handle);
            self.slots.remove(&handle);
            if let Some(cb) = &self.callbacks {
                cb.on_peer_closed(local_handle, trans_handle);
            }
            return;
        }

        self.teardown_connection_io(handle);
        match Self::dial(peer_addr) {
            Ok(mut stream) => {
                let token = Self::token_of(handle);
                if self.registry().register(&mut stream, token, Interest::READABLE).is_ok() {
                    if let Some(Slot::Connection(conn)) = self.slots.get_mut(&handle) {
                        conn.stream = Some(stream);
                    }
                } else {
                    debug!(?handle, "reconnect register failed, leaving connection closed");
                }
            }
            Err(e) => {
                debug!(?handle, error = %e, "immediate reconnect failed, leaving connection closed");
            }
        }
    }

    fn arm_write(&mut self, handle: Handle) {
        let Some(Slot::Connection(conn)) = self.slots.get_mut(&handle) else { return };
        if conn.write_armed {
            return;
        }
        let Some(stream) = conn.stream.as_mut() else { return };
        if self
            .poll
            .as_ref()
            .unwrap()
            .registry()
            .reregister(stream, Self::token_of(handle), Interest::READABLE | Interest::WRITABLE)
            .is_ok()
        {
            conn.write_armed = true;
        }
    }

    fn disarm_write(&mut self, handle: Handle) {
        let Some(Slot::Connection(conn)) = self.slots.get_mut(&handle) else { return };
        if !conn.write_armed {
            return;
        }
        let Some(stream) = conn.stream.as_mut() else { return };
        if self
            .poll
            .as_ref()
            .unwrap()
            .registry()
            .reregister(stream, Self::token_of(handle), Interest::READABLE)
            .is_ok()
        {
            conn.write_armed = false;
        }
    }

    fn handle_listener_readable(&mut self, listener_handle: Handle) {
        loop {
            let accept_result = match self.slots.get_mut(&listener_handle) {
                Some(Slot::Listener(l)) => l.socket.accept(),
                _ => return,
            };
            match accept_result {
                Ok((mut stream, peer_addr)) => {
                    let peer_handle = self.handles.allocate();
                    let token = Self::token_of(peer_handle);
                    if let Err(e) = self.registry().register(&mut stream, token, Interest::READABLE) {
                        warn!(error = %e, "failed to register accepted connection, dropping it");
                        continue;
                    }
                    let conn = Connection {
                        stream: Some(stream),
                        peer_addr,
                        local_handle: listener_handle,
                        trans_handle: peer_handle,
                        write_armed: false,
                    };
                    self.slots.insert(peer_handle, Slot::Connection(conn));
                    if let Some(cb) = &self.callbacks {
                        cb.on_peer_connected(listener_handle, peer_handle);
                    }
                }
                Err(e) if is_fatal_accept_error(&e) => {
                    self.slots.remove(&listener_handle);
                    if let Some(cb) = &self.callbacks {
                        cb.on_closed(listener_handle);
                    }
                    return;
                }
                Err(_) => return,
            }
        }
    }

    /// Parses as many complete frames as are available (and under
    /// `max_frames_per_event`, if set) out of `scratch[..total_len]`,
    /// firing `on_message` for each. Returns the number of bytes consumed.
    fn parse_frames(&mut self, handle: Handle, total_len: usize) -> usize {
        let (local_handle, trans_handle) = match self.slots.get(&handle) {
            Some(Slot::Connection(conn)) => (conn.local_handle, conn.trans_handle),
            _ => return 0,
        };

        let mut consumed = 0usize;
        let mut frames = 0usize;
        loop {
            if let Some(cap) = self.config.max_frames_per_event {
                if frames >= cap {
                    break;
                }
            }
            let remaining = &self.scratch[consumed..total_len];
            let Some((head_len, payload_len)) = frame::parse_head(remaining) else { break };
            let payload_len = payload_len as usize;
            if head_len + payload_len > remaining.len() {
                break;
            }
            let payload_start = consumed + head_len;
            let payload_end = payload_start + payload_len;
            if let Some(cb) = &self.callbacks {
                let info = MsgExternInfo { self_handle: local_handle, remote_handle: trans_handle, arrived_ms: now_ms() };
                cb.on_message(&self.scratch[payload_start..payload_end], &info);
            }
            consumed = payload_end;
            frames += 1;
        }
        consumed
    }

    fn handle_connection_readable(&mut self, handle: Handle) {
        let buff_len = self.config.scratch_buffer_len;
        let cached = self.recv_cache.take(handle.raw()).unwrap_or_default();
        let cache_len = cached.len();

        if cache_len >= buff_len {
            warn!(?handle, cache_len, buff_len, "residual receive bytes exceed scratch buffer, closing");
            self.connection_on_error(handle);
            return;
        }
        self.scratch[..cache_len].copy_from_slice(&cached);

        let read_result = {
            let Some(Slot::Connection(conn)) = self.slots.get_mut(&handle) else { return };
            let Some(stream) = conn.stream.as_mut() else { return };
            loop {
                match stream.read(&mut self.scratch[cache_len..buff_len]) {
                    Ok(n) => break Ok(n),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => break Err(e),
                }
            }
        };

        match read_result {
            Ok(0) => self.connection_on_error(handle),
            Ok(n) => {
                let total = cache_len + n;
                let consumed = self.parse_frames(handle, total);
                let rest = total - consumed;
                if rest > 0 {
                    let leftover = self.scratch[consumed..total].to_vec();
                    if self.recv_cache.put(handle.raw(), &leftover).is_err() {
                        self.connection_on_error(handle);
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if cache_len > 0 {
                    let restaged = self.scratch[..cache_len].to_vec();
                    let _ = self.recv_cache.put(handle.raw(), &restaged);
                }
            }
            Err(_) => self.connection_on_error(handle),
        }
    }

    fn handle_connection_writable(&mut self, handle: Handle) {
        let Some(mut pending) = self.send_cache.take(handle.raw()) else {
            self.disarm_write(handle);
            return;
        };

        let write_result = {
            let Some(Slot::Connection(conn)) = self.slots.get_mut(&handle) else { return };
            let Some(stream) = conn.stream.as_mut() else { return };
            write_fully_nonblocking(stream, &pending)
        };

        match write_result {
            Ok(written) if written == pending.len() => self.disarm_write(handle),
            Ok(written) => {
                pending.drain(..written);
                if self.send_cache.put(handle.raw(), &pending).is_err() {
                    self.connection_on_error(handle);
                }
            }
            Err(_) => self.connection_on_error(handle),
        }
    }

    /// Sends a header plus one flattened payload, writing immediately if
    /// possible and staging whatever doesn't fit. Mirrors the source's
    /// `SendV`: write-armed connections always stage (no write attempt,
    /// to preserve ordering against whatever is already queued); otherwise
    /// a vectored write is tried and any remainder staged.
    fn write_or_stage(&mut self, handle: Handle, header: [u8; HEADER_LEN], payload: Vec<u8>) -> Result<(), TransportError> {
        let (write_armed, has_stream) = match self.slots.get(&handle) {
            Some(Slot::Connection(conn)) => (conn.write_armed, conn.stream.is_some()),
            _ => return Err(TransportError::InvalidHandle),
        };

        if write_armed {
            self.send_cache.put(handle.raw(), &header)?;
            self.send_cache.put(handle.raw(), &payload)?;
            return Ok(());
        }

        if !has_stream {
            let peer_addr = match self.slots.get(&handle) {
                Some(Slot::Connection(conn)) => conn.peer_addr,
                _ => return Err(TransportError::InvalidHandle),
            };
            let mut stream = Self::dial(peer_addr).map_err(|_| TransportError::ConnectFailed)?;
            let token = Self::token_of(handle);
            self.registry().register(&mut stream, token, Interest::READABLE).map_err(|_| TransportError::ConnectFailed)?;
            if let Some(Slot::Connection(conn)) = self.slots.get_mut(&handle) {
                conn.stream = Some(stream);
            }
        }

        let write_outcome = {
            let Some(Slot::Connection(conn)) = self.slots.get_mut(&handle) else {
                return Err(TransportError::InvalidHandle);
            };
            let stream = conn.stream.as_mut().expect("stream was just dialed or already present");
            stream.write_vectored(&[IoSlice::new(&header), IoSlice::new(&payload)])
        };

        match write_outcome {
            Ok(n) if n == header.len() + payload.len() => Ok(()),
            Ok(n) if n < header.len() => {
                self.send_cache.put(handle.raw(), &header[n..])?;
                self.send_cache.put(handle.raw(), &payload)?;
                self.arm_write(handle);
                Ok(())
            }
            Ok(n) => {
                let sent_payload = n - header.len();
                self.send_cache.put(handle.raw(), &payload[sent_payload..])?;
                self.arm_write(handle);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.send_cache.put(handle.raw(), &header)?;
                self.send_cache.put(handle.raw(), &payload)?;
                self.arm_write(handle);
                Ok(())
            }
            Err(_) => {
                self.connection_on_error(handle);
                Err(TransportError::SendFailed)
            }
        }
    }
}

impl Driver for StreamDriver {
    fn prefix(&self) -> &'static str {
        "tcp"
    }

    fn init(&mut self, callbacks: Rc<dyn Callbacks>) -> Result<(), TransportError> {
        let poll = Poll::new().map_err(|_| TransportError::ReactorInitFailed)?;
        self.poll = Some(poll);
        self.callbacks = Some(callbacks);
        // SIGPIPE would otherwise kill the process on a write to a peer
        // that has already reset the connection.
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        }
        Ok(())
    }

    fn set_handle_mask(&mut self, mask: i64) {
        self.handles = HandleAllocator::from_mask(mask);
    }

    fn bind(&mut self, address: &str) -> Result<Handle, TransportError> {
        let addr = parse_stream_addr(address)?;
        let handle = self.handles.allocate();
        let mut socket = bind_raw(addr, self.config.listen_backlog).map_err(|e| {
            warn!(%address, error = %e, "bind failed");
            TransportError::BindFailed
        })?;
        let token = Self::token_of(handle);
        self.registry().register(&mut socket, token, Interest::READABLE).map_err(|_| TransportError::BindFailed)?;
        self.slots.insert(handle, Slot::Listener(Listener { addr, socket }));
        Ok(handle)
    }

    fn connect(&mut self, address: &str) -> Result<Handle, TransportError> {
        let addr = parse_stream_addr(address)?;
        let handle = self.handles.allocate();
        let mut stream = Self::dial(addr).map_err(|e| {
            debug!(%address, error = %e, "initial connect failed");
            TransportError::ConnectFailed
        })?;
        let token = Self::token_of(handle);
        self.registry().register(&mut stream, token, Interest::READABLE).map_err(|_| TransportError::ConnectFailed)?;
        let conn = Connection { stream: Some(stream), peer_addr: addr, local_handle: handle, trans_handle: handle, write_armed: false };
        self.slots.insert(handle, Slot::Connection(conn));
        Ok(handle)
    }

    fn send_vectored(&mut self, handle: Handle, fragments: &[&[u8]]) -> Result<(), TransportError> {
        if fragments.len() + 1 > self.config.max_send_fragments {
            return Err(TransportError::SystemError);
        }
        let total_len: usize = fragments.iter().map(|f| f.len()).sum();
        let header = frame::encode_header(total_len as u32);
        let mut payload = Vec::with_capacity(total_len);
        for frag in fragments {
            payload.extend_from_slice(frag);
        }
        self.write_or_stage(handle, header, payload)
    }

    fn close(&mut self, handle: Handle) {
        match self.slots.remove(&handle) {
            Some(Slot::Listener(mut listener)) => {
                if let Some(poll) = &self.poll {
                    let _ = poll.registry().deregister(&mut listener.socket);
                }
            }
            Some(Slot::Connection(mut conn)) => {
                if let Some(mut stream) = conn.stream.take() {
                    if let Some(poll) = &self.poll {
                        let _ = poll.registry().deregister(&mut stream);
                    }
                    let _ = stream.shutdown(std::net::Shutdown::Both);
                }
                self.send_cache.del(handle.raw());
                self.recv_cache.del(handle.raw());
            }
            None => {}
        }
    }

    fn update(&mut self) -> usize {
        if self.poll.is_none() {
            safe_panic!("StreamDriver::update called before init");
            return 0;
        }
        if let Err(e) = self.poll.as_mut().unwrap().poll(&mut self.events, Some(Duration::ZERO)) {
            warn!(error = %e, "reactor poll failed");
            return 0;
        }

        let ready: Vec<(Token, bool, bool)> =
            self.events.iter().map(|e| (e.token(), e.is_readable(), e.is_writable())).collect();

        let mut handled = 0usize;
        for (token, readable, writable) in ready {
            handled += 1;
            let handle = Handle(token.0 as i64);
            match self.slots.get(&handle) {
                Some(Slot::Listener(_)) => {
                    if readable {
                        self.handle_listener_readable(handle);
                    }
                }
                Some(Slot::Connection(_)) => {
                    if readable {
                        self.handle_connection_readable(handle);
                    }
                    if writable && self.slots.contains_key(&handle) {
                        self.handle_connection_writable(handle);
                    }
                }
                None => {
                    safe_panic!("reactor event for unknown handle {handle:?}");
                }
            }
        }
        handled
    }
}

fn is_fatal_accept_error(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(code) if code == libc::EBADF || code == libc::ENOTSOCK)
}

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

/// Writes as much of `data` as the socket will currently accept, looping
/// past `EINTR` and stopping at the first `WouldBlock`, error, or
/// completion. Returns bytes written, which may be less than `data.len()`.
fn write_fully_nonblocking(stream: &mut MioTcpStream, data: &[u8]) -> io::Result<usize> {
    let mut written = 0usize;
    while written < data.len() {
        match stream.write(&data[written..]) {
            Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0")),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => return Err(e),
        }
    }
    Ok(written)
}

/// Parses a `host:port` address, rejecting anything that isn't dotted
/// IPv4. A peer-to-peer style suffix of the form `ip:port@instance_id` is
/// accepted by stripping everything from `@` onward unexamined.
fn parse_stream_addr(address: &str) -> Result<SocketAddr, TransportError> {
    let core = address.split('@').next().unwrap_or(address);
    let addr: SocketAddr = core.parse().map_err(|_| TransportError::InvalidParam)?;
    match addr {
        SocketAddr::V4(_) => Ok(addr),
        SocketAddr::V6(_) => Err(TransportError::InvalidParam),
    }
}
