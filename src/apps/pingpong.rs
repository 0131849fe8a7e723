//! Ping-pong guest: a pinger sends datagrams at a peer, the peer echoes them
//! back. Exercises sockets, readiness callbacks, the resolver, and timers.

use tracing::{debug, warn};

use crate::engine::vepoll::RwSet;
use crate::engine::{CallbackId, SockId, TimerId};
use crate::host::api::NodeApi;
use crate::host::plugin::{Application, Plugin};

/// Well-known echo port.
pub const PORT: u16 = 7;

const CB_SEND_PING: CallbackId = CallbackId(1);

pub struct PingPongPlugin;

impl Plugin for PingPongPlugin {
    fn name(&self) -> &'static str {
        "pingpong"
    }

    fn instantiate(&self) -> Box<dyn Application> {
        Box::new(PingPong::new())
    }
}

/// Role is decided by args: `--peer <hostname>` makes a pinger, no args an
/// echoer. `--count <n>` bounds the pings, `--interval <ms>` paces them with
/// a timer instead of replying in the readiness callback.
pub struct PingPong {
    sockd: Option<SockId>,
    peer: Option<String>,
    count: u64,
    interval_ms: u64,
    sent: u64,
    received: u64,
}

impl PingPong {
    pub fn new() -> Self {
        PingPong {
            sockd: None,
            peer: None,
            count: 1,
            interval_ms: 0,
            sent: 0,
            received: 0,
        }
    }

    fn send_ping(&mut self, api: &mut NodeApi<'_>) {
        let (Some(sockd), Some(peer)) = (self.sockd, self.peer.as_deref()) else {
            return;
        };
        let Some(addr) = api.resolve_name(peer) else {
            warn!(host = %api.hostname(), peer, "peer not resolvable");
            return;
        };
        let payload = format!("ping {}", self.sent);
        if let Err(e) = api.send_to(sockd, addr, PORT, payload.into_bytes()) {
            warn!(host = %api.hostname(), error = %e, "ping send failed");
            return;
        }
        self.sent += 1;
    }
}

impl Application for PingPong {
    fn instantiate(&mut self, api: &mut NodeApi<'_>, args: &[String]) {
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--peer" => self.peer = iter.next().cloned(),
                "--count" => {
                    self.count = iter.next().and_then(|v| v.parse().ok()).unwrap_or(1);
                }
                "--interval" => {
                    self.interval_ms = iter.next().and_then(|v| v.parse().ok()).unwrap_or(0);
                }
                other => warn!(host = %api.hostname(), arg = other, "ignoring unknown arg"),
            }
        }

        match api.socket_open(PORT) {
            Ok(sockd) => {
                self.sockd = Some(sockd);
                if let Err(e) = api.interest_add(sockd, RwSet::READ) {
                    warn!(host = %api.hostname(), error = %e, "interest registration failed");
                }
            }
            Err(e) => {
                api.abort(format!("{}: cannot open echo socket: {}", api.hostname(), e));
                return;
            }
        }

        if self.peer.is_some() {
            self.send_ping(api);
        }
    }

    fn destroy(&mut self, api: &mut NodeApi<'_>) {
        debug!(
            host = %api.hostname(),
            sent = self.sent,
            received = self.received,
            "pingpong done"
        );
    }

    fn socket_ready(
        &mut self,
        api: &mut NodeApi<'_>,
        sockd: SockId,
        readable: bool,
        _writable: bool,
        _read_first: bool,
    ) {
        if !readable {
            return;
        }
        while let Ok(Some((from, payload))) = api.recv_from(sockd) {
            self.received += 1;
            if self.peer.is_none() {
                // Echoer: bounce the payload straight back.
                if let Err(e) = api.send_to(sockd, from.addr, from.port, payload) {
                    warn!(host = %api.hostname(), error = %e, "echo failed");
                }
            } else if self.sent < self.count {
                // Pinger: count the pong, fire the next round.
                if self.interval_ms == 0 {
                    self.send_ping(api);
                } else {
                    api.create_timer(self.interval_ms, CB_SEND_PING, self.sent);
                }
            } else if self.received >= self.count {
                // Conversation over; stop listening.
                let _ = api.interest_remove(sockd, RwSet::READ);
            }
        }
    }

    fn timer_expired(
        &mut self,
        api: &mut NodeApi<'_>,
        _tid: TimerId,
        cb_id: CallbackId,
        _arg: u64,
    ) {
        if cb_id == CB_SEND_PING {
            self.send_ping(api);
        }
    }
}
