use std::io;
use std::net::SocketAddr;

use mio::net::TcpListener as MioTcpListener;
use socket2::{Domain, Socket, Type};

/// Binds a listening socket with an explicit backlog and `SO_REUSEADDR`
/// set before bind.
///
/// Neither `std::net::TcpListener::bind` nor `mio::net::TcpListener::bind`
/// expose a backlog parameter, and both apply their socket options in an
/// order this driver can't control. The source binds with a backlog of
/// 10240 and sets `SO_REUSEADDR` ahead of `bind()` so a restarted process
/// can reclaim a port still draining TIME_WAIT connections; `socket2` gets
/// us the same ordering without hand-rolling `sockaddr` construction.
pub(crate) fn bind_raw(addr: SocketAddr, backlog: u32) -> io::Result<MioTcpListener> {
    let domain = Domain::for_address(addr);
    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog as i32)?;
    MioTcpListener::from_std(socket.into())
}

/// A bound, listening socket registered with the reactor.
pub(crate) struct Listener {
    pub(crate) addr: SocketAddr,
    pub(crate) socket: MioTcpListener,
}
