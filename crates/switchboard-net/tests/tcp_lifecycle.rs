use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use switchboard_net::{Callbacks, Facade, Handle, MsgExternInfo, TransportError};

#[derive(Default)]
struct Recorder {
    messages: RefCell<Vec<Vec<u8>>>,
    peers_connected: RefCell<Vec<(Handle, Handle)>>,
    peers_closed: RefCell<Vec<(Handle, Handle)>>,
}

impl Callbacks for Recorder {
    fn on_message(&self, payload: &[u8], _info: &MsgExternInfo) -> i32 {
        self.messages.borrow_mut().push(payload.to_vec());
        0
    }

    fn on_peer_connected(&self, listener: Handle, peer: Handle) -> i32 {
        self.peers_connected.borrow_mut().push((listener, peer));
        0
    }

    fn on_peer_closed(&self, listener: Handle, peer: Handle) -> i32 {
        self.peers_closed.borrow_mut().push((listener, peer));
        0
    }
}

fn pump_until(facade: &mut Facade, timeout: Duration, mut done: impl FnMut() -> bool) {
    let start = Instant::now();
    while !done() {
        facade.update();
        if start.elapsed() > timeout {
            panic!("condition not met within {timeout:?}");
        }
        thread::sleep(Duration::from_millis(2));
    }
}

/// Pumps `facade` for `duration` regardless of outcome, e.g. to give a
/// write time to land on the wire before asserting on the other side.
fn pump_for(facade: &mut Facade, duration: Duration) {
    let start = Instant::now();
    while start.elapsed() < duration {
        facade.update();
        thread::sleep(Duration::from_millis(2));
    }
}

/// A connection-stays-open, zero-message outcome when a client writes junk
/// in place of a frame header.
#[test]
fn bad_magic_leaves_the_connection_open_without_delivering_a_message() {
    use std::io::Write;
    use std::net::TcpListener as StdTcpListener;

    let std_listener = StdTcpListener::bind("127.0.0.1:23983").unwrap();
    let recorder: Rc<Recorder> = Rc::new(Recorder::default());
    let mut client = Facade::new(recorder.clone()).unwrap();
    let handle = client.connect("tcp://127.0.0.1:23983").unwrap();

    let (mut accepted, _) = std_listener.accept().unwrap();
    // 8 junk bytes: fails the magic check, never forms a frame.
    client.send(handle, b"not-real-frame-data-here").unwrap();
    pump_for(&mut client, Duration::from_millis(300));

    let mut buf = [0u8; 64];
    use std::io::Read;
    accepted.set_nonblocking(true).unwrap();
    thread::sleep(Duration::from_millis(50));
    let n = accepted.read(&mut buf).unwrap();
    assert!(n > 0, "the bytes should have reached the peer over the wire");

    // Send back garbage that isn't a valid header; the driver should not
    // report a message and should not close the connection.
    accepted.write_all(b"XXXXXXXXgarbage-payload-bytes").unwrap();
    pump_for(&mut client, Duration::from_millis(300));
    assert!(recorder.messages.borrow().is_empty());
    assert!(recorder.peers_closed.borrow().is_empty());
}

#[test]
fn server_side_drop_reports_peer_closed_and_does_not_reconnect() {
    let recorder: Rc<Recorder> = Rc::new(Recorder::default());
    let mut server = Facade::new(recorder.clone()).unwrap();
    server.bind("tcp://127.0.0.1:23984").unwrap();

    let joiner = thread::spawn(|| {
        let stream = std::net::TcpStream::connect("127.0.0.1:23984").unwrap();
        thread::sleep(Duration::from_millis(100));
        drop(stream);
    });

    pump_until(&mut server, Duration::from_secs(2), || !recorder.peers_connected.borrow().is_empty());
    joiner.join().unwrap();
    pump_until(&mut server, Duration::from_secs(2), || !recorder.peers_closed.borrow().is_empty());

    let (_, accepted_peer) = recorder.peers_connected.borrow()[0];
    let (_, closed_peer) = recorder.peers_closed.borrow()[0];
    assert_eq!(accepted_peer, closed_peer);
}

#[test]
fn closing_a_handle_twice_is_a_silent_no_op() {
    let recorder: Rc<Recorder> = Rc::new(Recorder::default());
    let mut client = Facade::new(recorder).unwrap();
    let handle = client.connect("tcp://127.0.0.1:23985").ok();

    // connect() may fail outright if nothing is listening; either way,
    // close must never panic, whether or not the handle is live.
    if let Some(handle) = handle {
        client.close(handle);
        client.close(handle);
    }
    client.close(Handle::from(0));
}

#[test]
fn a_ninth_driver_registration_is_rejected() {
    struct NoopDriver(&'static str);
    impl switchboard_net::Driver for NoopDriver {
        fn prefix(&self) -> &'static str {
            self.0
        }
        fn init(&mut self, _callbacks: Rc<dyn Callbacks>) -> Result<(), TransportError> {
            Ok(())
        }
        fn set_handle_mask(&mut self, _mask: i64) {}
        fn bind(&mut self, _address: &str) -> Result<Handle, TransportError> {
            Err(TransportError::UninstallDriver)
        }
        fn connect(&mut self, _address: &str) -> Result<Handle, TransportError> {
            Err(TransportError::UninstallDriver)
        }
        fn send_vectored(&mut self, _handle: Handle, _fragments: &[&[u8]]) -> Result<(), TransportError> {
            Err(TransportError::UninstallDriver)
        }
        fn close(&mut self, _handle: Handle) {}
        fn update(&mut self) -> usize {
            0
        }
    }

    let mut facade = Facade::new(Rc::new(Recorder::default())).unwrap();
    // Slot 0 is already taken by the built-in `tcp` driver; 7 more slots remain.
    for i in 0..7 {
        facade.add_driver(Box::new(NoopDriver(Box::leak(format!("proto{i}").into_boxed_str())))).unwrap();
    }
    let err = facade.add_driver(Box::new(NoopDriver("one-too-many"))).unwrap_err();
    assert_eq!(err, TransportError::DriverAlreadyRegistered);
}
