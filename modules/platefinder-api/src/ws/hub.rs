//! Session hub: subscriptions, ownership, pending subscriptions, backlog,
//! and fan-out publication.
//!
//! Subscription keys are `(channel, requestId)` only — session identity is
//! enforced at the ownership check, never in the key, so a reused
//! connection cannot inherit another request's messages. All map operations
//! are constant-time under one mutex; sends happen after the lock drops.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use platefinder_common::protocol::{
    Channel, NackReason, OwnerRecord, ServerFrame, SubscriptionKey,
};

pub const BACKLOG_CAP: usize = 50;
pub const BACKLOG_TTL: Duration = Duration::from_secs(120);
pub const PENDING_TTL: Duration = Duration::from_secs(90);

pub type ConnId = String;

/// One connected client, as the hub sees it.
#[derive(Debug, Clone)]
pub struct ConnHandle {
    pub conn_id: ConnId,
    pub user_id: Option<String>,
    pub session_id: String,
    pub tx: mpsc::UnboundedSender<String>,
}

struct BacklogEntry {
    payload: String,
    enqueued_at: Instant,
}

struct PendingSubscription {
    conn_id: ConnId,
    key: SubscriptionKey,
    expires_at: Instant,
}

#[derive(Default)]
struct HubInner {
    conns: HashMap<ConnId, ConnHandle>,
    by_key: HashMap<SubscriptionKey, HashSet<ConnId>>,
    by_conn: HashMap<ConnId, HashSet<SubscriptionKey>>,
    owners: HashMap<String, OwnerRecord>,
    pending: Vec<PendingSubscription>,
    backlogs: HashMap<SubscriptionKey, VecDeque<BacklogEntry>>,
    backlog_dropped: u64,
}

pub struct SessionHub {
    inner: Mutex<HubInner>,
    require_auth: bool,
}

pub enum SubscribeOutcome {
    /// Active subscription; any backlog is returned in FIFO order and has
    /// been cleared.
    Active { backlog: Vec<String> },
    /// Job unknown yet; registered as pending (90 s TTL).
    Pending,
    Rejected(NackReason),
}

impl SessionHub {
    pub fn new(require_auth: bool) -> Self {
        Self {
            inner: Mutex::new(HubInner::default()),
            require_auth,
        }
    }

    pub fn register_conn(&self, handle: ConnHandle) {
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        inner.by_conn.entry(handle.conn_id.clone()).or_default();
        inner.conns.insert(handle.conn_id.clone(), handle);
    }

    /// Idempotent: closing a connection twice is a no-op.
    pub fn unregister_conn(&self, conn_id: &str) {
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        inner.conns.remove(conn_id);
        if let Some(keys) = inner.by_conn.remove(conn_id) {
            for key in keys {
                if let Some(subs) = inner.by_key.get_mut(&key) {
                    subs.remove(conn_id);
                    if subs.is_empty() {
                        inner.by_key.remove(&key);
                    }
                }
            }
        }
        inner.pending.retain(|p| p.conn_id != conn_id);
    }

    /// Record the job's owner at creation time, then promote any matching
    /// pending subscriptions. Pending entries that fail the ownership check
    /// expire silently.
    pub fn register_job(&self, request_id: &str, owner: OwnerRecord) {
        let (promoted, backlogs): (Vec<ConnHandle>, Vec<Vec<String>>) = {
            let mut inner = self.inner.lock().expect("hub lock poisoned");
            inner.owners.insert(request_id.to_string(), owner.clone());

            let now = Instant::now();
            let mut promoted = Vec::new();
            let mut pending = std::mem::take(&mut inner.pending);
            pending.retain(|p| {
                if p.expires_at <= now {
                    return false;
                }
                if p.key.request_id != request_id {
                    return true;
                }
                let Some(conn) = inner.conns.get(&p.conn_id).cloned() else {
                    return false;
                };
                if check_ownership(&owner, &conn, self.require_auth).is_some() {
                    debug!(conn_id = %p.conn_id, request_id, "Pending subscription failed ownership, expiring");
                    return false;
                }
                promoted.push((p.key.clone(), conn));
                false
            });
            inner.pending = pending;

            let mut handles = Vec::new();
            let mut drains = Vec::new();
            for (key, conn) in promoted {
                inner
                    .by_key
                    .entry(key.clone())
                    .or_default()
                    .insert(conn.conn_id.clone());
                inner
                    .by_conn
                    .entry(conn.conn_id.clone())
                    .or_default()
                    .insert(key.clone());
                drains.push(drain_backlog(&mut inner, &key));
                handles.push(conn);
            }
            (handles, drains)
        };

        for (conn, backlog) in promoted.iter().zip(backlogs) {
            info!(conn_id = %conn.conn_id, request_id, backlog = backlog.len(), "Pending subscription promoted");
            for payload in backlog {
                let _ = conn.tx.send(payload);
            }
        }
    }

    /// Subscribe a connection to `(channel, requestId)`. Idempotent.
    pub fn subscribe(
        &self,
        conn_id: &str,
        channel: Channel,
        request_id: &str,
    ) -> SubscribeOutcome {
        let key = SubscriptionKey::new(channel, request_id);
        let mut inner = self.inner.lock().expect("hub lock poisoned");

        let Some(conn) = inner.conns.get(conn_id).cloned() else {
            return SubscribeOutcome::Rejected(NackReason::Internal);
        };

        info!(
            conn_id,
            channel = %channel,
            request_id,
            "ws_subscribe_attempt"
        );

        if self.require_auth && conn.user_id.is_none() {
            return SubscribeOutcome::Rejected(NackReason::NotAuthenticated);
        }

        match inner.owners.get(request_id).cloned() {
            Some(owner) => {
                if let Some(reason) = check_ownership(&owner, &conn, self.require_auth) {
                    return SubscribeOutcome::Rejected(reason);
                }
                inner
                    .by_key
                    .entry(key.clone())
                    .or_default()
                    .insert(conn_id.to_string());
                inner
                    .by_conn
                    .entry(conn_id.to_string())
                    .or_default()
                    .insert(key.clone());
                let backlog = drain_backlog(&mut inner, &key);
                SubscribeOutcome::Active { backlog }
            }
            None => {
                // The job does not exist yet; park the request.
                inner.pending.push(PendingSubscription {
                    conn_id: conn_id.to_string(),
                    key,
                    expires_at: Instant::now() + PENDING_TTL,
                });
                SubscribeOutcome::Pending
            }
        }
    }

    /// Idempotent unsubscribe.
    pub fn unsubscribe(&self, conn_id: &str, channel: Channel, request_id: &str) {
        let key = SubscriptionKey::new(channel, request_id);
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        if let Some(subs) = inner.by_key.get_mut(&key) {
            subs.remove(conn_id);
            if subs.is_empty() {
                inner.by_key.remove(&key);
            }
        }
        if let Some(keys) = inner.by_conn.get_mut(conn_id) {
            keys.remove(&key);
        }
        inner
            .pending
            .retain(|p| !(p.conn_id == conn_id && p.key == key));
    }

    /// Deliver a frame to subscribers, or backlog it when nobody listens.
    pub fn publish_frame(&self, channel: Channel, request_id: &str, frame: &ServerFrame) {
        let key = SubscriptionKey::new(channel, request_id);
        let payload = frame.to_text();

        let targets: Vec<ConnHandle> = {
            let mut inner = self.inner.lock().expect("hub lock poisoned");
            let subscribers: Vec<ConnHandle> = inner
                .by_key
                .get(&key)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| inner.conns.get(id).cloned())
                        .collect()
                })
                .unwrap_or_default();

            if subscribers.is_empty() {
                let backlog = inner.backlogs.entry(key.clone()).or_default();
                let mut dropped_oldest = false;
                if backlog.len() >= BACKLOG_CAP {
                    backlog.pop_front();
                    dropped_oldest = true;
                }
                backlog.push_back(BacklogEntry {
                    payload,
                    enqueued_at: Instant::now(),
                });
                if dropped_oldest {
                    inner.backlog_dropped += 1;
                }
                debug!(key = %key, "No subscriber, backlogged");
                return;
            }
            subscribers
        };

        let mut sent = 0usize;
        let mut failed = 0usize;
        for conn in targets {
            // Best-effort, no retry: a dead channel just counts as failed.
            match conn.tx.send(payload.clone()) {
                Ok(()) => sent += 1,
                Err(_) => failed += 1,
            }
        }
        debug!(key = %key, sent, failed, "Published frame");
    }

    /// Evict expired backlogs and pending subscriptions. Run periodically.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        inner.pending.retain(|p| p.expires_at > now);
        inner.backlogs.retain(|_, entries| {
            while let Some(front) = entries.front() {
                if now.duration_since(front.enqueued_at) > BACKLOG_TTL {
                    entries.pop_front();
                } else {
                    break;
                }
            }
            !entries.is_empty()
        });
    }

    /// Dropped-from-backlog counter, for observability.
    pub fn backlog_dropped(&self) -> u64 {
        self.inner.lock().expect("hub lock poisoned").backlog_dropped
    }
}

/// `None` means the subscriber may attach. The dev-only bypass skips the
/// session check for anonymous subscribers when auth is off; it never
/// applies in production (auth required).
fn check_ownership(
    owner: &OwnerRecord,
    conn: &ConnHandle,
    require_auth: bool,
) -> Option<NackReason> {
    if let Some(owner_user) = &owner.owner_user_id {
        if conn.user_id.as_deref() != Some(owner_user.as_str()) {
            return Some(NackReason::UserMismatch);
        }
    }
    if let Some(owner_session) = &owner.owner_session_id {
        if *owner_session != conn.session_id {
            let anonymous = conn.session_id == "anonymous";
            if !require_auth && anonymous {
                // Documented dev-only bypass.
                warn!(conn_id = %conn.conn_id, "Anonymous session bypassing session check (dev mode)");
            } else {
                return Some(NackReason::SessionMismatch);
            }
        }
    }
    None
}

fn drain_backlog(inner: &mut HubInner, key: &SubscriptionKey) -> Vec<String> {
    inner
        .backlogs
        .remove(key)
        .map(|entries| {
            let now = Instant::now();
            entries
                .into_iter()
                .filter(|e| now.duration_since(e.enqueued_at) <= BACKLOG_TTL)
                .map(|e| e.payload)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl platefinder_common::events::EventSink for SessionHub {
    async fn publish(&self, channel: Channel, request_id: &str, frame: ServerFrame) {
        self.publish_frame(channel, request_id, &frame);
    }
}
