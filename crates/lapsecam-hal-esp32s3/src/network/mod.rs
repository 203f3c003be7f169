//! WiFi link state shared between the connection worker and the serve loop.

use core::sync::atomic::{AtomicU8, AtomicU32, Ordering};

/// Station link phase for logs and the status page.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum LinkState {
    Idle = 0,
    Connecting = 1,
    Up = 2,
    Lost = 3,
}

impl LinkState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Up,
            3 => Self::Lost,
            _ => Self::Idle,
        }
    }
}

/// Immutable link snapshot for the serve loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LinkSnapshot {
    pub state: LinkState,
    pub ipv4: Option<[u8; 4]>,
}

impl LinkSnapshot {
    pub const fn is_up(&self) -> bool {
        matches!(self.state, LinkState::Up) && self.ipv4.is_some()
    }
}

/// Lock-free shared link status.
#[derive(Debug)]
pub struct LinkHandle {
    state: AtomicU8,
    ipv4: AtomicU32,
}

impl LinkHandle {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(LinkState::Idle as u8),
            ipv4: AtomicU32::new(0),
        }
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        let ipv4 = self.ipv4.load(Ordering::Acquire);
        LinkSnapshot {
            state: LinkState::from_raw(self.state.load(Ordering::Acquire)),
            ipv4: if ipv4 != 0 {
                Some(ipv4.to_be_bytes())
            } else {
                None
            },
        }
    }

    pub fn mark_connecting(&self) {
        self.store(LinkState::Connecting, 0);
    }

    pub fn mark_up(&self, ipv4: [u8; 4]) {
        self.store(LinkState::Up, u32::from_be_bytes(ipv4));
    }

    pub fn mark_lost(&self) {
        self.store(LinkState::Lost, 0);
    }

    fn store(&self, state: LinkState, ipv4: u32) {
        self.state.store(state as u8, Ordering::Release);
        self.ipv4.store(ipv4, Ordering::Release);
    }
}

impl Default for LinkHandle {
    fn default() -> Self {
        Self::new()
    }
}
