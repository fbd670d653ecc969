use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use switchboard_net::{Callbacks, Facade, Handle, MsgExternInfo};

#[derive(Default)]
struct Recorder {
    messages: RefCell<Vec<Vec<u8>>>,
    peers_connected: RefCell<Vec<(Handle, Handle)>>,
    peers_closed: RefCell<Vec<(Handle, Handle)>>,
    listeners_closed: Cell<usize>,
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

    fn on_closed(&self, _listener: Handle) -> i32 {
        self.listeners_closed.set(self.listeners_closed.get() + 1);
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

#[test]
fn round_trips_a_message_between_two_facades() {
    let recorder_a: Rc<Recorder> = Rc::new(Recorder::default());
    let recorder_b: Rc<Recorder> = Rc::new(Recorder::default());
    let mut server = Facade::new(recorder_a.clone()).unwrap();
    let mut client = Facade::new(recorder_b.clone()).unwrap();

    let listener = server.bind("tcp://127.0.0.1:23981").unwrap();
    let client_handle = client.connect("tcp://127.0.0.1:23981").unwrap();

    pump_until(&mut server, Duration::from_secs(2), || !recorder_a.peers_connected.borrow().is_empty());
    let (bound_listener, server_peer) = recorder_a.peers_connected.borrow()[0];
    assert_eq!(bound_listener, listener);

    client.send(client_handle, b"hello, switchboard").unwrap();
    pump_for(&mut client, Duration::from_millis(300));
    pump_until(&mut server, Duration::from_secs(2), || !recorder_a.messages.borrow().is_empty());

    assert_eq!(recorder_a.messages.borrow()[0], b"hello, switchboard");
    let _ = server_peer;
}

#[test]
fn fragmented_frames_reassemble_before_delivery() {
    let recorder: Rc<Recorder> = Rc::new(Recorder::default());
    let mut server = Facade::new(recorder.clone()).unwrap();
    let mut client = Facade::new(Rc::new(Recorder::default())).unwrap();

    server.bind("tcp://127.0.0.1:23982").unwrap();
    let client_handle = client.connect("tcp://127.0.0.1:23982").unwrap();

    pump_until(&mut server, Duration::from_secs(2), || !recorder.peers_connected.borrow().is_empty());

    let big = vec![0xABu8; 5000];
    client.send(client_handle, &big).unwrap();

    pump_for(&mut client, Duration::from_millis(200));
    pump_until(&mut server, Duration::from_secs(2), || !recorder.messages.borrow().is_empty());

    assert_eq!(recorder.messages.borrow()[0], big);
}
