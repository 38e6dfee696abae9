//! In-memory transport replying from a script.

use std::{
    collections::{HashMap, VecDeque},
    io,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use bytes::Bytes;
use smb2_flow::transport::Transport;
use tokio::sync::Notify;

use crate::replies::Responder;

#[derive(Default)]
struct Script {
    sent: Vec<Bytes>,
    replies: HashMap<u64, VecDeque<Bytes>>,
    fail_sends: bool,
    closed: bool,
}

/// Transport double that records sent frames and serves queued replies.
///
/// `recv` waits until a reply for the requested message id is queued or the
/// transport is closed.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
    arrived: Notify,
    responder: Option<Responder>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Answer every sent frame with `responder`.
    #[must_use]
    pub fn responding(responder: Responder) -> Self {
        Self {
            responder: Some(responder),
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `reply` for the request with `message_id`.
    pub fn push_reply(&self, message_id: u64, reply: Bytes) {
        self.lock()
            .replies
            .entry(message_id)
            .or_default()
            .push_back(reply);
        self.arrived.notify_waiters();
    }

    /// Make every later `send` fail with `BrokenPipe`.
    pub fn fail_sends(&self) { self.lock().fail_sends = true; }

    /// Fail every pending and future `recv`.
    pub fn close(&self) {
        self.lock().closed = true;
        self.arrived.notify_waiters();
    }

    /// Frames sent so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<Bytes> { self.lock().sent.clone() }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, frame: Bytes) -> io::Result<()> {
        {
            let mut script = self.lock();
            if script.fail_sends {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted send failure"));
            }
            script.sent.push(frame.clone());
        }
        if let Some(responder) = &self.responder {
            for (message_id, reply) in responder.respond(&frame) {
                self.push_reply(message_id, reply);
            }
        }
        Ok(())
    }

    async fn recv(&self, message_id: u64) -> io::Result<Bytes> {
        loop {
            let arrived = self.arrived.notified();
            tokio::pin!(arrived);
            arrived.as_mut().enable();
            {
                let mut script = self.lock();
                if let Some(reply) = script
                    .replies
                    .get_mut(&message_id)
                    .and_then(VecDeque::pop_front)
                {
                    return Ok(reply);
                }
                if script.closed {
                    return Err(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "scripted transport closed",
                    ));
                }
            }
            arrived.await;
        }
    }
}
