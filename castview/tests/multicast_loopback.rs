//! Real sockets: a `Receiver` over `MulticastTransport` fed by an
//! `ImageSender` on the same host.
//!
//! The receiver joins the group on the loopback interface and binds the
//! wildcard address, so the sender can target `127.0.0.1:<port>` directly.
//! That keeps these tests independent of whether the host routes multicast.
//! Every test uses the same fixed port, hence `#[serial]`.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use serial_test::serial;

use castview::MulticastEndpoint;
use castview::net::MulticastSocket;
use castview::receiver::{Framing, MulticastTransport, Receiver};
use castview::sender::{ImageSender, SenderConfig};
use castview::viewer::{StartupError, preflight};

const PORT: u16 = 47_311;
const GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 77, 9);

fn endpoint(capacity: usize) -> MulticastEndpoint {
    MulticastEndpoint::new(GROUP, PORT, capacity)
        .unwrap()
        .with_interface(Ipv4Addr::LOCALHOST)
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Sends `image` every 20 ms until dropped.
///
/// The receiver opens its socket inside each cycle, so anything sent before
/// that is lost; repeating the image guarantees a whole copy lands in some
/// cycle.
struct Repeater {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Repeater {
    fn start(image: Vec<u8>, capacity: usize, framing: Framing) -> Self {
        let sender = ImageSender::bind(SenderConfig {
            endpoint: endpoint(capacity),
            framing,
            ..SenderConfig::default()
        })
        .unwrap();
        let dest = SocketAddr::from((Ipv4Addr::LOCALHOST, PORT));

        let stop = Arc::new(AtomicBool::new(false));
        let handle = thread::spawn({
            let stop = Arc::clone(&stop);
            move || {
                while !stop.load(Ordering::Relaxed) {
                    // Nobody listens between cycles; those sends are lost.
                    let _ = sender.send_to(&image, dest);
                    thread::sleep(Duration::from_millis(20));
                }
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for Repeater {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Runs cycles until one yields exactly `expected`.
///
/// Cycles that open mid-image see a truncated or misaligned stream and are
/// skipped.
fn receive_until(receiver: &mut Receiver, expected: &[u8]) {
    for _ in 0..50 {
        if receiver
            .receive_one()
            .is_ok_and(|image| image.as_bytes() == expected)
        {
            return;
        }
    }
    panic!("no complete copy of the image arrived");
}

fn receiver(capacity: usize, framing: Framing) -> Receiver {
    Receiver::new(
        endpoint(capacity),
        framing,
        MulticastTransport {
            read_timeout: Some(Duration::from_millis(500)),
            recv_buffer_size: Some(1 << 20),
        },
    )
}

#[test]
#[serial]
fn short_datagram_image_crosses_real_sockets() {
    let image = pattern(5_500);
    let _sender = Repeater::start(image.clone(), 1_400, Framing::ShortDatagram);

    receive_until(&mut receiver(1_400, Framing::ShortDatagram), &image);
}

#[test]
#[serial]
fn exact_multiple_image_crosses_real_sockets() {
    let image = pattern(4_200);
    let _sender = Repeater::start(image.clone(), 1_400, Framing::ShortDatagram);

    receive_until(&mut receiver(1_400, Framing::ShortDatagram), &image);
}

#[test]
#[serial]
fn length_prefixed_image_crosses_real_sockets() {
    let image = pattern(4_192);
    let _sender = Repeater::start(image.clone(), 1_400, Framing::LengthPrefixed);

    receive_until(&mut receiver(1_400, Framing::LengthPrefixed), &image);
}

#[test]
#[serial]
fn silent_group_times_out_and_port_is_released() {
    let mut receiver = receiver(1_400, Framing::ShortDatagram);

    let err = receiver.receive_one().unwrap_err();
    assert!(err.is_idle_timeout(), "{err}");

    // The cycle's socket is gone; the port can be joined again.
    let socket = MulticastSocket::join(&endpoint(1_400)).unwrap();
    socket.leave().unwrap();
}

#[test]
#[serial]
fn preflight_joins_and_leaves() {
    preflight(&endpoint(1_400)).unwrap();
    preflight(&endpoint(1_400)).unwrap();
}

#[test]
fn preflight_reports_unusable_interface() {
    // TEST-NET-1 is never assigned to a local interface.
    let endpoint = MulticastEndpoint::new(GROUP, 0, 1_400)
        .unwrap()
        .with_interface(Ipv4Addr::new(192, 0, 2, 1));

    assert!(matches!(
        preflight(&endpoint),
        Err(StartupError::Transport { .. })
    ));
}
