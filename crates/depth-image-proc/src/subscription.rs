//! Subscribe upstream only while someone is listening downstream.

use crate::Result;
use frame_transport::{camera_info_topic, Subscriber, TopicInfo, TopicResolver};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// How a channel's topic is named before resolution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TopicName {
    Plain(String),
    /// The `camera_info` sibling of this image topic, resolved after the image topic.
    CameraInfoOf(String),
}

#[derive(Clone, Debug)]
pub struct ChannelSpec {
    pub label: String,
    pub topic: TopicName,
    pub transport: String,
}

impl ChannelSpec {
    pub fn new(label: &str, topic: TopicName, transport: &str) -> Self {
        Self {
            label: label.to_string(),
            topic,
            transport: transport.to_string(),
        }
    }
}

struct Channel {
    spec: ChannelSpec,
    subscriber: Box<dyn Subscriber>,
    subscribed: bool,
}

/// Per-channel subscription flags of one node instance.
#[derive(Default)]
pub struct SubscriptionState {
    channels: Vec<Channel>,
}

impl SubscriptionState {
    fn active(&self) -> bool {
        !self.channels.is_empty() && self.channels.iter().all(|c| c.subscribed)
    }

    fn unsubscribe_all(&mut self) {
        for ch in &mut self.channels {
            ch.subscriber.unsubscribe();
            ch.subscribed = false;
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transition {
    Subscribed,
    Unsubscribed,
    Unchanged,
}

/// Consumer-count driven state machine. Every transition runs under one lock so
/// rapid count reports cannot double-subscribe.
pub struct SubscriptionManager {
    resolver: TopicResolver,
    state: Mutex<SubscriptionState>,
}

impl SubscriptionManager {
    pub fn new(resolver: TopicResolver) -> Self {
        Self {
            resolver,
            state: Mutex::new(SubscriptionState::default()),
        }
    }

    pub fn add_channel(&mut self, spec: ChannelSpec, subscriber: Box<dyn Subscriber>) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.channels.push(Channel {
            spec,
            subscriber,
            subscribed: false,
        });
    }

    /// Apply the current downstream consumer count.
    pub fn on_consumer_count(&self, count: usize) -> Result<Transition> {
        let mut state = self.lock();
        if count == 0 {
            if state.channels.iter().any(|c| c.subscribed) {
                state.unsubscribe_all();
                info!("no consumers left, upstream channels unsubscribed");
                return Ok(Transition::Unsubscribed);
            }
            return Ok(Transition::Unchanged);
        }
        if state.active() {
            return Ok(Transition::Unchanged);
        }

        let resolved = self.resolve_all(&state)?;
        let mut failure = None;
        for (ch, topic) in state.channels.iter_mut().zip(&resolved) {
            if let Err(e) = ch.subscriber.subscribe(topic, &ch.spec.transport) {
                warn!("subscribing {} to {topic} failed, rolling back: {e}", ch.spec.label);
                failure = Some(e);
                break;
            }
            ch.subscribed = true;
            debug!("{} subscribed to {topic} [{}]", ch.spec.label, ch.spec.transport);
        }
        if let Some(e) = failure {
            state.unsubscribe_all();
            return Err(e.into());
        }
        info!("{} upstream channels subscribed", state.channels.len());
        Ok(Transition::Subscribed)
    }

    pub fn is_active(&self) -> bool {
        self.lock().active()
    }

    pub fn subscribed_topics(&self) -> Vec<TopicInfo> {
        self.lock()
            .channels
            .iter()
            .filter_map(|c| c.subscriber.topic().cloned())
            .collect()
    }

    fn resolve_all(&self, state: &SubscriptionState) -> Result<Vec<String>> {
        state
            .channels
            .iter()
            .map(|ch| match &ch.spec.topic {
                TopicName::Plain(name) => Ok(self.resolver.resolve(name)?),
                TopicName::CameraInfoOf(image) => {
                    let image = self.resolver.resolve(image)?;
                    Ok(self.resolver.resolve(&camera_info_topic(&image))?)
                }
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, SubscriptionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
