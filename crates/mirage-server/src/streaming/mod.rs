//! Server-initiated message channels for streaming routes.
//!
//! Each `ws` route owns one [`StreamingChannel`]. Connected clients are
//! served a `text/event-stream` body fed by an unbounded mpsc channel.
//! A new subscriber first receives any transient messages queued while
//! nobody was connected, then the replay queue, then live broadcasts.

use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use futures::stream;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

use crate::server::response::ResponseBody;

/// Sentinel event written when a stream is closed by the server.
const CLOSE_EVENT: &str = "event: close\ndata: \n\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    Data(String),
    Close,
}

#[derive(Debug, Default)]
struct ChannelState {
    subscribers: HashMap<u64, mpsc::UnboundedSender<ChannelMessage>>,
    replay: Vec<String>,
    transient: VecDeque<String>,
    next_id: u64,
}

#[derive(Debug)]
pub struct StreamingChannel {
    route_uuid: String,
    state: Mutex<ChannelState>,
}

impl StreamingChannel {
    pub fn new(route_uuid: impl Into<String>) -> Self {
        Self {
            route_uuid: route_uuid.into(),
            state: Mutex::new(ChannelState::default()),
        }
    }

    /// Send a message to every connected subscriber.
    ///
    /// Replayable messages are also kept for all future subscribers. A
    /// non-replayable message sent while nobody is connected is held for the
    /// next subscriber only.
    pub fn send(&self, data: impl Into<String>, replayable: bool) {
        let data = data.into();
        let mut state = self.state.lock();

        if replayable {
            state.replay.push(data.clone());
        }

        if state.subscribers.is_empty() {
            if !replayable {
                state.transient.push_back(data);
            }
            return;
        }

        state
            .subscribers
            .retain(|_, tx| tx.send(ChannelMessage::Data(data.clone())).is_ok());
        debug!(
            "Broadcast message on route {} to {} subscriber(s)",
            self.route_uuid,
            state.subscribers.len()
        );
    }

    /// Register a new subscriber.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();

        while let Some(message) = state.transient.pop_front() {
            let _ = tx.send(ChannelMessage::Data(message));
        }
        for message in &state.replay {
            let _ = tx.send(ChannelMessage::Data(message.clone()));
        }

        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.insert(id, tx);

        Subscription {
            receiver: rx,
            _guard: SubscriberGuard {
                channel: Arc::downgrade(self),
                id,
            },
        }
    }

    fn detach(&self, id: u64) {
        if let Some(tx) = self.state.lock().subscribers.remove(&id) {
            let _ = tx.send(ChannelMessage::Close);
            debug!("Subscriber {} left route {}", id, self.route_uuid);
        }
    }

    /// Close every subscriber and drop both queues.
    pub fn close(&self) {
        let mut state = self.state.lock();
        for (_, tx) in state.subscribers.drain() {
            let _ = tx.send(ChannelMessage::Close);
        }
        state.replay.clear();
        state.transient.clear();
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }
}

/// Detaches its subscriber when dropped.
#[derive(Debug)]
struct SubscriberGuard {
    channel: Weak<StreamingChannel>,
    id: u64,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.upgrade() {
            channel.detach(self.id);
        }
    }
}

/// A connected subscriber. Dropping it detaches from the channel.
#[derive(Debug)]
pub struct Subscription {
    pub receiver: mpsc::UnboundedReceiver<ChannelMessage>,
    _guard: SubscriberGuard,
}

impl Subscription {
    /// Turn the subscription into a `text/event-stream` response body.
    pub fn into_sse_body(self) -> ResponseBody {
        let frames = stream::unfold(Some(self), |subscription| async move {
            let mut subscription = subscription?;
            match subscription.receiver.recv().await {
                Some(ChannelMessage::Data(data)) => {
                    let frame = Frame::data(Bytes::from(format_sse_data(&data)));
                    Some((Ok::<_, Infallible>(frame), Some(subscription)))
                }
                Some(ChannelMessage::Close) | None => {
                    let frame = Frame::data(Bytes::from_static(CLOSE_EVENT.as_bytes()));
                    Some((Ok(frame), None))
                }
            }
        });
        StreamBody::new(frames).boxed_unsync()
    }
}

/// One SSE `data:` event; multi-line messages get one `data:` line each.
pub fn format_sse_data(data: &str) -> String {
    let mut event = String::with_capacity(data.len() + 8);
    for line in data.split('\n') {
        event.push_str("data: ");
        event.push_str(line);
        event.push('\n');
    }
    event.push('\n');
    event
}

/// Channels of one server, keyed by route uuid.
#[derive(Debug, Default)]
pub struct StreamingChannels {
    channels: RwLock<HashMap<String, Arc<StreamingChannel>>>,
}

impl StreamingChannels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, route_uuid: &str) -> Arc<StreamingChannel> {
        if let Some(channel) = self.channels.read().get(route_uuid) {
            return Arc::clone(channel);
        }
        let mut channels = self.channels.write();
        Arc::clone(
            channels
                .entry(route_uuid.to_string())
                .or_insert_with(|| Arc::new(StreamingChannel::new(route_uuid))),
        )
    }

    pub fn get(&self, route_uuid: &str) -> Option<Arc<StreamingChannel>> {
        self.channels.read().get(route_uuid).cloned()
    }

    /// Close and forget every channel.
    pub fn close_all(&self) {
        let channels: Vec<Arc<StreamingChannel>> =
            self.channels.write().drain().map(|(_, c)| c).collect();
        for channel in channels {
            channel.close();
        }
    }
}
