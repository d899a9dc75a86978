use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use tokio::runtime::Handle;

use crate::{
    Result, RuleflowError, ShareLock,
    common::{BroadcastQueue, Shutdown},
    events::{Event, Log, Message},
};

macro_rules! dispatch_event {
    ($handles:expr, $(&$item:ident), +) => {
        let handlers = $handles.read().map(|h| h.clone()).unwrap_or_default();
        for handle in handlers.iter() {
            (handle)($(&$item),+);
        }
    };
}

macro_rules! dispatch_event_async {
    ($handles:expr, $(&$item:ident), +) => {
        let handles = $handles.clone();

        tokio::spawn(async move {
            let handlers = handles.read().map(|h| h.clone()).unwrap_or_default();
            for handle in handlers.iter() {
                (handle)($(&$item),+).await;
            }
        });
    };
}

const EVENT_QUEUE_SIZE: usize = 2048;
const LOG_QUEUE_SIZE: usize = 4096;

pub type RuleEventHandle = Arc<dyn Fn(&Event<Message>) + Send + Sync>;
pub type RuleLogHandle = Arc<dyn Fn(&Event<Log>) + Send + Sync>;
pub type RuleEventHandleAsync = Arc<dyn Fn(&Event<Message>) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// use the glob pattern to match the rule id
    /// eg. boiler-*
    pub rule_id: String,

    /// use the glob pattern to match the node id
    /// eg. notify*
    pub nid: String,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            rule_id: "*".to_string(),
            nid: "*".to_string(),
        }
    }
}

impl ChannelOptions {
    pub fn new(
        rule_id: &str,
        nid: &str,
    ) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            nid: nid.to_string(),
        }
    }

    pub fn with_rule_id(rule_id: &str) -> Self {
        Self::new(rule_id, "*")
    }

    pub fn with_nid(nid: &str) -> Self {
        Self::new("*", nid)
    }
}

/// Broadcast hub for tracker events and evaluator logs.
#[derive(Clone)]
pub struct Channel {
    event_queue: Arc<BroadcastQueue<Event<Message>>>,
    log_queue: Arc<BroadcastQueue<Event<Log>>>,

    events: ShareLock<Vec<RuleEventHandle>>,
    logs: ShareLock<Vec<RuleLogHandle>>,
    events_async: ShareLock<Vec<RuleEventHandleAsync>>,

    runtime: Handle,
    shutdown: Arc<Shutdown>,
}

impl Channel {
    pub(crate) fn new(runtime: Handle) -> Self {
        Self {
            event_queue: BroadcastQueue::new(EVENT_QUEUE_SIZE),
            log_queue: BroadcastQueue::new(LOG_QUEUE_SIZE),
            events: Arc::new(RwLock::new(Vec::new())),
            logs: Arc::new(RwLock::new(Vec::new())),
            events_async: Arc::new(RwLock::new(Vec::new())),
            runtime,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    pub(crate) fn log_queue(&self) -> Arc<BroadcastQueue<Event<Log>>> {
        self.log_queue.clone()
    }

    pub(crate) fn event_queue(&self) -> Arc<BroadcastQueue<Event<Message>>> {
        self.event_queue.clone()
    }

    /// Publish an event. Nobody listening is not an error.
    pub(crate) fn publish(
        &self,
        msg: Message,
    ) {
        let _ = self.event_queue.send(Event::new(&msg));
    }

    pub(crate) fn listen(&self) {
        let mut event_queue = self.event_queue.subscribe();
        let mut log_queue = self.log_queue.subscribe();
        let events = self.events.clone();
        let logs = self.logs.clone();
        let events_async = self.events_async.clone();

        let shutdown = self.shutdown.clone();
        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    Ok(e) = event_queue.recv() => {
                        let evt = e.clone();
                        dispatch_event!(events, &evt);
                        dispatch_event_async!(events_async, &e);
                    }
                    Ok(log) = log_queue.recv() => {
                        dispatch_event!(logs, &log);
                    }
                }
            }
        });
    }

    pub(crate) fn shutdown(&self) {
        self.shutdown.shutdown();
    }
}

/// Glob-filtered subscription to a [`Channel`].
#[derive(Clone)]
pub struct ChannelEvent {
    channel: Arc<Channel>,

    glob: (globset::GlobMatcher, globset::GlobMatcher),
}

impl ChannelEvent {
    pub fn channel(
        channel: Arc<Channel>,
        options: ChannelOptions,
    ) -> Result<Self> {
        let compile = |pattern: &str| globset::Glob::new(pattern).map(|g| g.compile_matcher()).map_err(|e| RuleflowError::Config(e.to_string()));

        Ok(Self {
            channel,
            glob: (compile(&options.rule_id)?, compile(&options.nid)?),
        })
    }

    /// Called with the run id once a run reaches a terminal state.
    pub fn on_complete(
        &self,
        f: impl Fn(String) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        if let Ok(mut events) = self.channel.events.write() {
            events.push(Arc::new(move |e| {
                if e.event.is_complete() && is_match(&glob, &e.rule_id, &e.nid) {
                    f(e.eid.clone());
                }
            }));
        }
    }

    pub fn on_error(
        &self,
        f: impl Fn(&Event<Message>) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        if let Ok(mut events) = self.channel.events.write() {
            events.push(Arc::new(move |e| {
                if e.event.is_error() && is_match(&glob, &e.rule_id, &e.nid) {
                    f(e);
                }
            }));
        }
    }

    pub fn on_event(
        &self,
        f: impl Fn(&Event<Message>) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        if let Ok(mut events) = self.channel.events.write() {
            events.push(Arc::new(move |e| {
                if is_match(&glob, &e.rule_id, &e.nid) {
                    f(e);
                }
            }));
        }
    }

    pub fn on_log(
        &self,
        f: impl Fn(&Event<Log>) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        if let Ok(mut logs) = self.channel.logs.write() {
            logs.push(Arc::new(move |e| {
                if is_match(&glob, &e.rule_id, &e.nid) {
                    f(e);
                }
            }));
        }
    }

    pub fn on_event_async<F>(
        &self,
        f: F,
    ) where
        F: Fn(&Event<Message>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let glob = self.glob.clone();

        if let Ok(mut events) = self.channel.events_async.write() {
            events.push(Arc::new(move |e| {
                if is_match(&glob, &e.rule_id, &e.nid) {
                    f(e)
                } else {
                    Box::pin(async {})
                }
            }));
        }
    }
}

fn is_match(
    glob: &(globset::GlobMatcher, globset::GlobMatcher),
    rule_id: &str,
    nid: &str,
) -> bool {
    let (pat_rule, pat_nid) = glob;
    pat_rule.is_match(rule_id) && pat_nid.is_match(nid)
}
