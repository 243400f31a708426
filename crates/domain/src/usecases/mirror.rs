//! Mirror use case - orchestrates fetching, composing, and publishing

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::OnceCell;

use crate::{
    model::{
        AccountIdentity, CheckpointLookup, ComposedEntry, CycleReport, MirrorPolicy,
        MirroredPost, SourcePost, StreamEvent,
    },
    normalize::{ContentError, normalize},
    ports::{
        CheckpointError, CheckpointStore, Clock, EventStream, PublishError, SourceFeed,
        SourceFeedError, TargetFeed,
    },
    usecases::compose::PostComposer,
};

/// Configuration for the mirror engine
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub policy: MirrorPolicy,
    /// Log what would be published without publishing or saving
    pub dry_run: bool,
    /// Retries per operation for transient failures
    pub max_retries: u32,
    /// First backoff delay, doubled per retry
    pub retry_base_delay: Duration,
    /// Upper bound for a single backoff delay
    pub retry_max_delay: Duration,
    /// Wait before re-subscribing after the stream drops
    pub reconnect_delay: Duration,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            policy: MirrorPolicy::default(),
            dry_run: false,
            max_retries: 3,
            retry_base_delay: Duration::from_secs(2),
            retry_max_delay: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(10),
        }
    }
}

/// Errors from the mirror engine
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Source feed error: {0}")]
    Source(String),
    #[error("{operation} still failing after retries: {message}")]
    Transient {
        operation: &'static str,
        message: String,
    },
    #[error("Target rejected part {part} of source post {source_id}: {reason}")]
    Rejected {
        source_id: String,
        part: usize,
        reason: String,
    },
    #[error("Failed to load checkpoint: {0}")]
    CheckpointLoad(String),
    #[error("Failed to save checkpoint {source_id}: {reason}")]
    CheckpointSave { source_id: String, reason: String },
}

impl MirrorError {
    /// Whether the run must stop instead of waiting for the next cycle
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MirrorError::Rejected { .. }
                | MirrorError::CheckpointSave { .. }
                | MirrorError::Configuration(_)
        )
    }
}

/// Result of handling a single stream event
#[derive(Debug, Clone)]
pub enum EventOutcome {
    Mirrored(MirroredPost),
    Skipped {
        source_id: String,
        reason: &'static str,
    },
    Ignored,
    Heartbeat {
        alive: bool,
    },
}

trait Retryable: Display {
    fn is_transient(&self) -> bool;

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for SourceFeedError {
    fn is_transient(&self) -> bool {
        SourceFeedError::is_transient(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            SourceFeedError::RateLimited(after) => *after,
            _ => None,
        }
    }
}

impl Retryable for PublishError {
    fn is_transient(&self) -> bool {
        PublishError::is_transient(self)
    }
}

impl Retryable for CheckpointError {
    fn is_transient(&self) -> bool {
        CheckpointError::is_transient(self)
    }
}

/// Mirror engine orchestrator
pub struct MirrorEngine<S, T, C, Cl>
where
    S: SourceFeed + ?Sized,
    T: TargetFeed + ?Sized,
    C: CheckpointStore + ?Sized,
    Cl: Clock + ?Sized,
{
    source: Arc<S>,
    target: Arc<T>,
    checkpoint: Arc<C>,
    clock: Arc<Cl>,
    config: MirrorConfig,
    composer: PostComposer,
    identity: OnceCell<AccountIdentity>,
}

impl<S, T, C, Cl> MirrorEngine<S, T, C, Cl>
where
    S: SourceFeed + ?Sized,
    T: TargetFeed + ?Sized,
    C: CheckpointStore + ?Sized,
    Cl: Clock + ?Sized,
{
    /// Build an engine, rejecting an invalid policy before any network call
    pub fn new(
        source: Arc<S>,
        target: Arc<T>,
        checkpoint: Arc<C>,
        clock: Arc<Cl>,
        config: MirrorConfig,
    ) -> Result<Self, MirrorError> {
        config
            .policy
            .validate()
            .map_err(MirrorError::Configuration)?;
        let composer = PostComposer::new(config.policy.clone());
        Ok(Self {
            source,
            target,
            checkpoint,
            clock,
            config,
            composer,
            identity: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Source account, resolved once and cached
    pub async fn source_identity(&self) -> Result<&AccountIdentity, MirrorError> {
        self.identity
            .get_or_try_init(|| async {
                let source = self.source.as_ref();
                let identity = self
                    .with_retry("verify source identity", move || source.verify_identity())
                    .await
                    .map_err(|e| source_error("verify source identity", e))?;
                tracing::info!(
                    account_id = %identity.id,
                    username = %identity.username,
                    "Verified source identity"
                );
                Ok(identity)
            })
            .await
    }

    /// Run a single mirroring cycle
    pub async fn run_once(&self) -> Result<CycleReport, MirrorError> {
        let started_at = self.clock.now();
        let identity = self.source_identity().await?;

        let source = self.source.as_ref();
        let account_id = identity.id.as_str();
        let posts = self
            .with_retry("fetch source posts", move || source.recent_posts(account_id))
            .await
            .map_err(|e| source_error("fetch source posts", e))?;
        let fetched = posts.len();

        let eligible: Vec<&SourcePost> = posts
            .iter()
            .filter(|post| self.skip_reason(post, identity).is_none())
            .collect();

        let mut skipped_malformed = 0;
        let mut entries = Vec::with_capacity(eligible.len());
        for post in &eligible {
            match self.compose_entry(post) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(post_id = %post.id, error = %e, "Skipping malformed post");
                    skipped_malformed += 1;
                }
            }
        }

        tracing::info!(
            fetched = fetched,
            eligible = eligible.len(),
            composed = entries.len(),
            "Fetched source posts"
        );

        let checkpoint = self.load_checkpoint().await?;
        let (pending, lookup) = collect_pending(&entries, checkpoint.as_deref());

        match &lookup {
            CheckpointLookup::Found(id) => {
                tracing::debug!(checkpoint = %id, pending = pending.len(), "Located checkpoint");
            }
            CheckpointLookup::FirstRun => {
                tracing::warn!(
                    pending = pending.len(),
                    "No checkpoint (first run), mirroring every visible post"
                );
            }
            CheckpointLookup::OutOfWindow(id) => {
                tracing::warn!(
                    checkpoint = %id,
                    pending = pending.len(),
                    "Checkpoint scrolled out of window, mirroring every visible post"
                );
            }
        }

        let mut mirrored = Vec::with_capacity(pending.len());
        for entry in pending.into_iter().rev() {
            let target_ids = self.publish_entry(entry).await?;
            if !self.config.dry_run {
                self.advance_checkpoint(&entry.source_id).await?;
            }
            mirrored.push(MirroredPost {
                source_id: entry.source_id.clone(),
                target_ids,
            });
        }

        Ok(CycleReport {
            started_at,
            fetched,
            eligible: eligible.len(),
            skipped_malformed,
            lookup,
            mirrored,
            dry_run: self.config.dry_run,
        })
    }

    /// Run cycles until `shutdown` resolves or a fatal error occurs
    pub async fn run_poll<F>(&self, shutdown: F) -> Result<(), MirrorError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let interval = self.config.policy.poll_interval;

        loop {
            match self.run_once().await {
                Ok(report) => {
                    tracing::info!(
                        mirrored = report.mirrored.len(),
                        skipped_malformed = report.skipped_malformed,
                        dry_run = report.dry_run,
                        "Cycle complete"
                    );
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::error!(error = %e, "Cycle failed, waiting for the next one");
                }
            }

            tracing::debug!(interval_secs = interval.as_secs(), "Sleeping until next cycle");
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping poll loop");
                    return Ok(());
                }
                _ = self.clock.sleep(interval) => {}
            }
        }
    }

    /// Consume the source event stream until `shutdown` resolves or a fatal error occurs
    pub async fn run_stream<F>(&self, shutdown: F) -> Result<(), MirrorError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let connected = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping stream");
                    return Ok(());
                }
                connected = self.subscribe() => connected,
            };

            match connected {
                Ok(mut events) => {
                    tracing::info!("Subscribed to source stream");
                    loop {
                        let next = tokio::select! {
                            biased;
                            _ = &mut shutdown => {
                                tracing::info!("Shutdown requested, stopping stream");
                                return Ok(());
                            }
                            next = events.next() => next,
                        };

                        match next {
                            Some(Ok(event)) => match self.handle_event(event).await {
                                Ok(outcome) => {
                                    tracing::debug!(outcome = ?outcome, "Handled stream event");
                                }
                                Err(e) if e.is_fatal() => return Err(e),
                                Err(e) => {
                                    tracing::error!(error = %e, "Failed to handle stream event");
                                }
                            },
                            Some(Err(e)) if e.is_transient() => {
                                tracing::warn!(error = %e, "Source stream interrupted");
                                break;
                            }
                            Some(Err(e)) => {
                                tracing::error!(error = %e, "Source stream failed");
                                break;
                            }
                            None => {
                                tracing::warn!("Source stream ended");
                                break;
                            }
                        }
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to subscribe to source stream");
                }
            }

            tracing::info!(
                delay_secs = self.config.reconnect_delay.as_secs(),
                "Reconnecting to source stream"
            );
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping stream");
                    return Ok(());
                }
                _ = self.clock.sleep(self.config.reconnect_delay) => {}
            }
        }
    }

    /// Process one stream event to completion
    pub async fn handle_event(&self, event: StreamEvent) -> Result<EventOutcome, MirrorError> {
        match event {
            StreamEvent::PostCreated(post) => self.mirror_single(&post).await,
            StreamEvent::PostDeleted(id) => {
                tracing::debug!(post_id = %id, "Source post deleted, mirrors are left in place");
                Ok(EventOutcome::Ignored)
            }
            StreamEvent::Notification(kind) => {
                tracing::debug!(kind = %kind, "Ignoring notification");
                Ok(EventOutcome::Ignored)
            }
            StreamEvent::Heartbeat => {
                let alive = match self.source.verify_identity().await {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::warn!(error = %e, "Liveness check failed");
                        false
                    }
                };
                Ok(EventOutcome::Heartbeat { alive })
            }
        }
    }

    async fn subscribe(&self) -> Result<EventStream, MirrorError> {
        let identity = self.source_identity().await?;
        let source = self.source.as_ref();
        let account_id = identity.id.as_str();
        self.with_retry("subscribe to source stream", move || {
            source.subscribe(account_id)
        })
        .await
        .map_err(|e| source_error("subscribe to source stream", e))
    }

    async fn mirror_single(&self, post: &SourcePost) -> Result<EventOutcome, MirrorError> {
        let identity = self.source_identity().await?;
        if let Some(reason) = self.skip_reason(post, identity) {
            tracing::debug!(post_id = %post.id, reason = reason, "Skipping ineligible post");
            return Ok(skipped(post, reason));
        }

        let entry = match self.compose_entry(post) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(post_id = %post.id, error = %e, "Skipping malformed post");
                return Ok(skipped(post, "malformed"));
            }
        };

        if self.load_checkpoint().await?.as_deref() == Some(post.id.as_str()) {
            tracing::debug!(post_id = %post.id, "Post already mirrored");
            return Ok(skipped(post, "already mirrored"));
        }

        let target_ids = self.publish_entry(&entry).await?;
        if !self.config.dry_run {
            self.advance_checkpoint(&entry.source_id).await?;
        }

        Ok(EventOutcome::Mirrored(MirroredPost {
            source_id: entry.source_id,
            target_ids,
        }))
    }

    fn skip_reason(&self, post: &SourcePost, identity: &AccountIdentity) -> Option<&'static str> {
        if !self.config.policy.visibilities.contains(&post.visibility) {
            Some("visibility")
        } else if post.is_reply {
            Some("reply")
        } else if post.is_reshare {
            Some("reshare")
        } else if post.account_id != identity.id {
            Some("foreign account")
        } else {
            None
        }
    }

    fn compose_entry(&self, post: &SourcePost) -> Result<ComposedEntry, ContentError> {
        let content = normalize(post, self.composer.policy())?;
        let posts = self.composer.compose(&content, &post.url, &post.id);
        if posts.is_empty() {
            return Err(ContentError::Empty {
                post_id: post.id.clone(),
            });
        }
        Ok(ComposedEntry {
            source_id: post.id.clone(),
            source_url: post.url.clone(),
            posts,
        })
    }

    /// Publish every part of an entry in order, threading each onto the previous one
    async fn publish_entry(&self, entry: &ComposedEntry) -> Result<Vec<String>, MirrorError> {
        let mut target_ids = Vec::with_capacity(entry.posts.len());
        let mut parent: Option<String> = None;

        for (index, part) in entry.posts.iter().enumerate() {
            let part_number = index + 1;

            if self.config.dry_run {
                tracing::info!(
                    source_id = %entry.source_id,
                    part = part_number,
                    chars = part.char_len(),
                    body = %part.body,
                    "[DRY RUN] Would publish"
                );
                continue;
            }

            let outbound = match &parent {
                Some(parent_id) => part.in_reply_to(parent_id.as_str()),
                None => part.clone(),
            };

            let target = self.target.as_ref();
            let body = outbound.body.as_str();
            let thread_parent = outbound.thread_parent.as_deref();
            let target_id = self
                .with_retry("publish", move || target.publish(body, thread_parent))
                .await
                .map_err(|e| {
                    if !target_ids.is_empty() {
                        // The next attempt republishes these parts from the start
                        tracing::warn!(
                            source_id = %entry.source_id,
                            failed_part = part_number,
                            orphaned_target_ids = ?target_ids,
                            error = %e,
                            "Thread left incomplete on target"
                        );
                    }
                    if e.is_transient() {
                        let message = if target_ids.is_empty() {
                            e.to_string()
                        } else {
                            format!("{} (orphaned target posts: {})", e, target_ids.join(", "))
                        };
                        MirrorError::Transient {
                            operation: "publish",
                            message,
                        }
                    } else {
                        MirrorError::Rejected {
                            source_id: entry.source_id.clone(),
                            part: part_number,
                            reason: e.to_string(),
                        }
                    }
                })?;

            tracing::info!(
                source_id = %entry.source_id,
                part = part_number,
                target_id = %target_id,
                platform = self.target.platform(),
                "Published"
            );

            parent = Some(target_id.clone());
            target_ids.push(target_id);
        }

        Ok(target_ids)
    }

    async fn load_checkpoint(&self) -> Result<Option<String>, MirrorError> {
        let checkpoint = self.checkpoint.as_ref();
        self.with_retry("load checkpoint", move || checkpoint.load())
            .await
            .map_err(|e| {
                if e.is_transient() {
                    MirrorError::Transient {
                        operation: "load checkpoint",
                        message: e.to_string(),
                    }
                } else {
                    MirrorError::CheckpointLoad(e.to_string())
                }
            })
    }

    async fn advance_checkpoint(&self, source_id: &str) -> Result<(), MirrorError> {
        let checkpoint = self.checkpoint.as_ref();
        self.with_retry("save checkpoint", move || checkpoint.save(source_id))
            .await
            .map_err(|e| MirrorError::CheckpointSave {
                source_id: source_id.to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(
            checkpoint = %source_id,
            strategy = self.checkpoint.strategy(),
            "Advanced checkpoint"
        );
        Ok(())
    }

    /// Run `call` until it succeeds, fails permanently, or runs out of retries
    async fn with_retry<R, E, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<R, E>
    where
        E: Retryable,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = e.retry_after().unwrap_or_else(|| self.backoff(attempt));
                    attempt += 1;
                    tracing::warn!(
                        operation = operation,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    self.clock.sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.config
            .retry_base_delay
            .saturating_mul(factor)
            .min(self.config.retry_max_delay)
    }
}

/// Entries newer than the checkpoint, newest first, and how the checkpoint was found.
///
/// When the checkpoint is missing from `entries`, every entry is pending.
pub fn collect_pending<'a>(
    entries: &'a [ComposedEntry],
    checkpoint: Option<&str>,
) -> (Vec<&'a ComposedEntry>, CheckpointLookup) {
    let mut pending = Vec::new();
    for entry in entries {
        if checkpoint == Some(entry.source_id.as_str()) {
            return (pending, CheckpointLookup::Found(entry.source_id.clone()));
        }
        pending.push(entry);
    }

    let lookup = match checkpoint {
        Some(id) => CheckpointLookup::OutOfWindow(id.to_string()),
        None => CheckpointLookup::FirstRun,
    };
    (pending, lookup)
}

fn source_error(operation: &'static str, error: SourceFeedError) -> MirrorError {
    if error.is_transient() {
        MirrorError::Transient {
            operation,
            message: error.to_string(),
        }
    } else {
        MirrorError::Source(error.to_string())
    }
}

fn skipped(post: &SourcePost, reason: &'static str) -> EventOutcome {
    EventOutcome::Skipped {
        source_id: post.id.clone(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LinkMode, OutboundPost, TargetPost, Visibility};
    use async_trait::async_trait;
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::OffsetDateTime;
    use tokio::sync::oneshot;

    const ME: &str = "acct-1";

    fn post(id: &str, content: &str) -> SourcePost {
        SourcePost {
            id: id.to_string(),
            account_id: ME.to_string(),
            visibility: Visibility::Public,
            is_reply: false,
            is_reshare: false,
            content: format!("<p>{}</p>", content),
            tags: vec![],
            url: format!("https://m.s/@me/{}", id),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn reply(id: &str) -> SourcePost {
        SourcePost {
            is_reply: true,
            ..post(id, "a reply")
        }
    }

    fn reshare(id: &str) -> SourcePost {
        SourcePost {
            is_reshare: true,
            ..post(id, "a boost")
        }
    }

    fn body_for(id: &str) -> String {
        format!("Post {} https://m.s/@me/{}", id, id)
    }

    type StreamScript = Vec<Result<StreamEvent, SourceFeedError>>;

    struct FakeSource {
        posts: Mutex<Vec<SourcePost>>,
        fetch_errors: Mutex<VecDeque<SourceFeedError>>,
        streams: Mutex<VecDeque<StreamScript>>,
        fetches: AtomicUsize,
        verifications: AtomicUsize,
        subscriptions: AtomicUsize,
    }

    impl FakeSource {
        fn new(posts: Vec<SourcePost>) -> Self {
            Self {
                posts: Mutex::new(posts),
                fetch_errors: Mutex::new(VecDeque::new()),
                streams: Mutex::new(VecDeque::new()),
                fetches: AtomicUsize::new(0),
                verifications: AtomicUsize::new(0),
                subscriptions: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SourceFeed for FakeSource {
        async fn verify_identity(&self) -> Result<AccountIdentity, SourceFeedError> {
            self.verifications.fetch_add(1, Ordering::SeqCst);
            Ok(AccountIdentity {
                id: ME.to_string(),
                username: "me".to_string(),
            })
        }

        async fn recent_posts(&self, account_id: &str) -> Result<Vec<SourcePost>, SourceFeedError> {
            assert_eq!(account_id, ME);
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(error) = self.fetch_errors.lock().unwrap().pop_front() {
                return Err(error);
            }
            Ok(self.posts.lock().unwrap().clone())
        }

        async fn subscribe(&self, _account_id: &str) -> Result<EventStream, SourceFeedError> {
            self.subscriptions.fetch_add(1, Ordering::SeqCst);
            let stream = match self.streams.lock().unwrap().pop_front() {
                Some(events) => stream::iter(events).boxed(),
                None => stream::pending().boxed(),
            };
            Ok(stream)
        }
    }

    #[derive(Default)]
    struct FakeTarget {
        published: Mutex<Vec<OutboundPost>>,
        script: Mutex<VecDeque<Result<(), PublishError>>>,
        attempts: AtomicUsize,
    }

    impl FakeTarget {
        fn scripted(script: Vec<Result<(), PublishError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            }
        }

        fn bodies(&self) -> Vec<String> {
            self.published
                .lock()
                .unwrap()
                .iter()
                .map(|p| p.body.clone())
                .collect()
        }
    }

    #[async_trait]
    impl TargetFeed for FakeTarget {
        async fn verify_identity(&self) -> Result<AccountIdentity, PublishError> {
            Ok(AccountIdentity {
                id: "x-1".to_string(),
                username: "mirror".to_string(),
            })
        }

        async fn recent_posts(&self, _account_id: &str) -> Result<Vec<TargetPost>, PublishError> {
            Ok(vec![])
        }

        async fn publish(
            &self,
            body: &str,
            thread_parent: Option<&str>,
        ) -> Result<String, PublishError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(Err(error)) = self.script.lock().unwrap().pop_front() {
                return Err(error);
            }
            let mut published = self.published.lock().unwrap();
            published.push(OutboundPost {
                body: body.to_string(),
                thread_parent: thread_parent.map(str::to_string),
            });
            Ok(format!("t{}", published.len()))
        }

        fn platform(&self) -> &'static str {
            "fake"
        }
    }

    #[derive(Default)]
    struct FakeCheckpoint {
        current: Mutex<Option<String>>,
        saves: Mutex<Vec<String>>,
    }

    impl FakeCheckpoint {
        fn at(id: &str) -> Self {
            Self {
                current: Mutex::new(Some(id.to_string())),
                ..Default::default()
            }
        }

        fn current(&self) -> Option<String> {
            self.current.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CheckpointStore for FakeCheckpoint {
        async fn load(&self) -> Result<Option<String>, CheckpointError> {
            Ok(self.current())
        }

        async fn save(&self, source_post_id: &str) -> Result<(), CheckpointError> {
            *self.current.lock().unwrap() = Some(source_post_id.to_string());
            self.saves.lock().unwrap().push(source_post_id.to_string());
            Ok(())
        }

        async fn clear(&self) -> Result<(), CheckpointError> {
            *self.current.lock().unwrap() = None;
            Ok(())
        }

        fn strategy(&self) -> &'static str {
            "fake"
        }
    }

    #[derive(Default)]
    struct FakeClock {
        sleeps: Mutex<Vec<Duration>>,
        stop_after: Option<usize>,
        stop: Mutex<Option<oneshot::Sender<()>>>,
    }

    impl FakeClock {
        /// Clock that fires the returned shutdown signal on the n-th sleep
        fn stopping_after(sleeps: usize) -> (Self, oneshot::Receiver<()>) {
            let (tx, rx) = oneshot::channel();
            let clock = Self {
                stop_after: Some(sleeps),
                stop: Mutex::new(Some(tx)),
                ..Default::default()
            };
            (clock, rx)
        }

        fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Clock for FakeClock {
        fn now(&self) -> OffsetDateTime {
            OffsetDateTime::UNIX_EPOCH
        }

        async fn sleep(&self, duration: Duration) {
            let count = {
                let mut sleeps = self.sleeps.lock().unwrap();
                sleeps.push(duration);
                sleeps.len()
            };
            if self.stop_after == Some(count) {
                if let Some(tx) = self.stop.lock().unwrap().take() {
                    let _ = tx.send(());
                }
            }
        }
    }

    struct Harness {
        source: Arc<FakeSource>,
        target: Arc<FakeTarget>,
        checkpoint: Arc<FakeCheckpoint>,
        clock: Arc<FakeClock>,
        engine: MirrorEngine<FakeSource, FakeTarget, FakeCheckpoint, FakeClock>,
    }

    fn config() -> MirrorConfig {
        MirrorConfig {
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            ..Default::default()
        }
    }

    fn harness_with(
        source: FakeSource,
        target: FakeTarget,
        checkpoint: FakeCheckpoint,
        clock: FakeClock,
        config: MirrorConfig,
    ) -> Harness {
        let source = Arc::new(source);
        let target = Arc::new(target);
        let checkpoint = Arc::new(checkpoint);
        let clock = Arc::new(clock);
        let engine = MirrorEngine::new(
            Arc::clone(&source),
            Arc::clone(&target),
            Arc::clone(&checkpoint),
            Arc::clone(&clock),
            config,
        )
        .unwrap();
        Harness {
            source,
            target,
            checkpoint,
            clock,
            engine,
        }
    }

    fn harness(posts: Vec<SourcePost>, checkpoint: FakeCheckpoint) -> Harness {
        harness_with(
            FakeSource::new(posts),
            FakeTarget::default(),
            checkpoint,
            FakeClock::default(),
            config(),
        )
    }

    fn scenario_posts() -> Vec<SourcePost> {
        vec![
            post("P5", "Post P5"),
            reply("P4"),
            post("P3", "Post P3"),
            reshare("P2"),
            post("P1", "Post P1"),
        ]
    }

    fn entry(id: &str) -> ComposedEntry {
        ComposedEntry {
            source_id: id.to_string(),
            source_url: format!("https://m.s/@me/{}", id),
            posts: vec![OutboundPost::new(id)],
        }
    }

    fn ids(entries: &[&ComposedEntry]) -> Vec<String> {
        entries.iter().map(|e| e.source_id.clone()).collect()
    }

    #[test]
    fn test_collect_pending_stops_at_checkpoint() {
        let entries = vec![entry("5"), entry("3"), entry("1")];
        let (pending, lookup) = collect_pending(&entries, Some("1"));
        assert_eq!(ids(&pending), vec!["5", "3"]);
        assert_eq!(lookup, CheckpointLookup::Found("1".to_string()));

        let (pending, _) = collect_pending(&entries, Some("5"));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_collect_pending_without_match_takes_everything() {
        let entries = vec![entry("5"), entry("3")];
        let (pending, lookup) = collect_pending(&entries, Some("0"));
        assert_eq!(ids(&pending), vec!["5", "3"]);
        assert_eq!(lookup, CheckpointLookup::OutOfWindow("0".to_string()));

        let (pending, lookup) = collect_pending(&entries, None);
        assert_eq!(pending.len(), 2);
        assert_eq!(lookup, CheckpointLookup::FirstRun);
    }

    #[test]
    fn test_invalid_policy_is_configuration_error() {
        let config = MirrorConfig {
            policy: MirrorPolicy {
                character_budget: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let result = MirrorEngine::new(
            Arc::new(FakeSource::new(vec![])),
            Arc::new(FakeTarget::default()),
            Arc::new(FakeCheckpoint::default()),
            Arc::new(FakeClock::default()),
            config,
        );
        match result {
            Err(e) => {
                assert!(matches!(e, MirrorError::Configuration(_)));
                assert!(e.is_fatal());
            }
            Ok(_) => panic!("invalid policy accepted"),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_publishes_pending_oldest_first() {
        let h = harness(scenario_posts(), FakeCheckpoint::at("P1"));

        let report = h.engine.run_once().await.unwrap();

        assert_eq!(h.target.bodies(), vec![body_for("P3"), body_for("P5")]);
        assert_eq!(*h.checkpoint.saves.lock().unwrap(), vec!["P3", "P5"]);
        assert_eq!(h.checkpoint.current().as_deref(), Some("P5"));
        assert_eq!(report.fetched, 5);
        assert_eq!(report.eligible, 3);
        assert_eq!(report.lookup, CheckpointLookup::Found("P1".to_string()));
        let mirrored: Vec<_> = report.mirrored.iter().map(|m| m.source_id.as_str()).collect();
        assert_eq!(mirrored, vec!["P3", "P5"]);
        assert_eq!(report.mirrored[0].target_ids, vec!["t1"]);
    }

    #[tokio::test]
    async fn test_rerun_publishes_nothing() {
        let h = harness(scenario_posts(), FakeCheckpoint::at("P1"));

        h.engine.run_once().await.unwrap();
        let report = h.engine.run_once().await.unwrap();

        assert!(report.mirrored.is_empty());
        assert_eq!(report.lookup, CheckpointLookup::Found("P5".to_string()));
        assert_eq!(h.target.bodies().len(), 2);
        // Identity is verified once per engine
        assert_eq!(h.source.verifications.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_checkpoint_out_of_window_mirrors_everything() {
        let h = harness(scenario_posts(), FakeCheckpoint::at("P0"));

        let report = h.engine.run_once().await.unwrap();

        assert_eq!(report.lookup, CheckpointLookup::OutOfWindow("P0".to_string()));
        assert_eq!(
            h.target.bodies(),
            vec![body_for("P1"), body_for("P3"), body_for("P5")]
        );
        assert_eq!(h.checkpoint.current().as_deref(), Some("P5"));
    }

    #[tokio::test]
    async fn test_first_run_mirrors_everything() {
        let h = harness(scenario_posts(), FakeCheckpoint::default());

        let report = h.engine.run_once().await.unwrap();

        assert_eq!(report.lookup, CheckpointLookup::FirstRun);
        assert_eq!(report.mirrored.len(), 3);
    }

    #[tokio::test]
    async fn test_filters_visibility_and_foreign_accounts() {
        let private = SourcePost {
            visibility: Visibility::Private,
            ..post("P3", "Post P3")
        };
        let foreign = SourcePost {
            account_id: "someone-else".to_string(),
            ..post("P2", "Post P2")
        };
        let h = harness(
            vec![private, foreign, post("P1", "Post P1")],
            FakeCheckpoint::default(),
        );

        let report = h.engine.run_once().await.unwrap();

        assert_eq!(report.eligible, 1);
        assert_eq!(h.target.bodies(), vec![body_for("P1")]);
    }

    #[tokio::test]
    async fn test_malformed_post_is_skipped() {
        let empty = SourcePost {
            content: "<p> </p>".to_string(),
            ..post("P2", "")
        };
        let h = harness(
            vec![empty, post("P1", "Post P1")],
            FakeCheckpoint::default(),
        );

        let report = h.engine.run_once().await.unwrap();

        assert_eq!(report.skipped_malformed, 1);
        assert_eq!(h.target.bodies(), vec![body_for("P1")]);
    }

    fn banner_config(budget: usize) -> MirrorConfig {
        MirrorConfig {
            policy: MirrorPolicy {
                character_budget: budget,
                link_mode: LinkMode::Banner,
                ..Default::default()
            },
            ..config()
        }
    }

    #[tokio::test]
    async fn test_two_part_entry_is_threaded() {
        let long = "lorem ipsum dolor sit amet ".repeat(4);
        let h = harness_with(
            FakeSource::new(vec![post("P1", long.trim())]),
            FakeTarget::default(),
            FakeCheckpoint::default(),
            FakeClock::default(),
            banner_config(80),
        );

        let report = h.engine.run_once().await.unwrap();

        let published = h.target.published.lock().unwrap().clone();
        assert_eq!(published.len(), 2);
        assert!(published[0].thread_parent.is_none());
        assert_eq!(published[1].thread_parent.as_deref(), Some("t1"));
        assert!(published[1].body.ends_with("[Mirrored Toot P1]"));
        assert_eq!(report.mirrored[0].target_ids, vec!["t1", "t2"]);
        assert_eq!(*h.checkpoint.saves.lock().unwrap(), vec!["P1"]);
    }

    #[tokio::test]
    async fn test_rejection_on_second_part_keeps_checkpoint() {
        let long = "lorem ipsum dolor sit amet ".repeat(4);
        let h = harness_with(
            FakeSource::new(vec![post("P3", long.trim()), post("P1", "short")]),
            FakeTarget::scripted(vec![
                Ok(()),
                Ok(()),
                Err(PublishError::Rejected("duplicate content".into())),
            ]),
            FakeCheckpoint::default(),
            FakeClock::default(),
            banner_config(80),
        );

        let error = h.engine.run_once().await.unwrap_err();

        assert!(error.is_fatal());
        match error {
            MirrorError::Rejected {
                source_id, part, ..
            } => {
                assert_eq!(source_id, "P3");
                assert_eq!(part, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(h.checkpoint.current().as_deref(), Some("P1"));
        assert_eq!(h.target.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_on_second_part_name_orphaned_post() {
        let long = "lorem ipsum dolor sit amet ".repeat(4);
        let h = harness_with(
            FakeSource::new(vec![post("P1", long.trim())]),
            FakeTarget::scripted(vec![
                Ok(()),
                Err(PublishError::Network("down".into())),
                Err(PublishError::Network("down".into())),
                Err(PublishError::Network("down".into())),
            ]),
            FakeCheckpoint::default(),
            FakeClock::default(),
            MirrorConfig {
                max_retries: 2,
                ..banner_config(80)
            },
        );

        let error = h.engine.run_once().await.unwrap_err();

        match &error {
            MirrorError::Transient { operation, message } => {
                assert_eq!(*operation, "publish");
                assert!(message.contains("orphaned target posts: t1"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!error.is_fatal());
        assert_eq!(h.target.bodies().len(), 1);
        assert!(h.checkpoint.current().is_none());
    }

    #[tokio::test]
    async fn test_transient_publish_errors_are_retried() {
        let h = harness_with(
            FakeSource::new(vec![post("P1", "Post P1")]),
            FakeTarget::scripted(vec![
                Err(PublishError::Network("connection reset".into())),
                Err(PublishError::RateLimited),
            ]),
            FakeCheckpoint::default(),
            FakeClock::default(),
            config(),
        );

        let report = h.engine.run_once().await.unwrap();

        assert_eq!(report.mirrored.len(), 1);
        assert_eq!(h.target.bodies(), vec![body_for("P1")]);
        assert_eq!(
            h.clock.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_exhausted_retries_abort_cycle_without_advancing() {
        let h = harness_with(
            FakeSource::new(vec![post("P1", "Post P1")]),
            FakeTarget::scripted(vec![
                Err(PublishError::Network("down".into())),
                Err(PublishError::Network("down".into())),
                Err(PublishError::Network("down".into())),
            ]),
            FakeCheckpoint::default(),
            FakeClock::default(),
            MirrorConfig {
                max_retries: 2,
                ..config()
            },
        );

        let error = h.engine.run_once().await.unwrap_err();

        assert!(matches!(error, MirrorError::Transient { operation: "publish", .. }));
        assert!(!error.is_fatal());
        assert!(h.checkpoint.current().is_none());
        assert_eq!(h.clock.sleeps().len(), 2);
    }

    #[tokio::test]
    async fn test_backoff_is_capped() {
        let h = harness_with(
            FakeSource::new(vec![]),
            FakeTarget::default(),
            FakeCheckpoint::default(),
            FakeClock::default(),
            MirrorConfig {
                retry_base_delay: Duration::from_secs(10),
                retry_max_delay: Duration::from_secs(25),
                ..config()
            },
        );

        assert_eq!(h.engine.backoff(0), Duration::from_secs(10));
        assert_eq!(h.engine.backoff(1), Duration::from_secs(20));
        assert_eq!(h.engine.backoff(2), Duration::from_secs(25));
        assert_eq!(h.engine.backoff(40), Duration::from_secs(25));
    }

    #[tokio::test]
    async fn test_dry_run_neither_publishes_nor_saves() {
        let h = harness_with(
            FakeSource::new(scenario_posts()),
            FakeTarget::default(),
            FakeCheckpoint::default(),
            FakeClock::default(),
            MirrorConfig {
                dry_run: true,
                ..config()
            },
        );

        let report = h.engine.run_once().await.unwrap();

        assert!(report.dry_run);
        assert_eq!(report.mirrored.len(), 3);
        assert!(report.mirrored.iter().all(|m| m.target_ids.is_empty()));
        assert!(h.target.bodies().is_empty());
        assert!(h.checkpoint.current().is_none());
    }

    #[tokio::test]
    async fn test_handle_event_variants() {
        let h = harness(vec![], FakeCheckpoint::at("P1"));

        let outcome = h
            .engine
            .handle_event(StreamEvent::PostCreated(post("P1", "Post P1")))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            EventOutcome::Skipped { reason: "already mirrored", .. }
        ));

        let outcome = h
            .engine
            .handle_event(StreamEvent::PostCreated(reply("P2")))
            .await
            .unwrap();
        assert!(matches!(outcome, EventOutcome::Skipped { reason: "reply", .. }));

        let outcome = h
            .engine
            .handle_event(StreamEvent::PostCreated(post("P3", "Post P3")))
            .await
            .unwrap();
        match outcome {
            EventOutcome::Mirrored(mirrored) => {
                assert_eq!(mirrored.source_id, "P3");
                assert_eq!(mirrored.target_ids, vec!["t1"]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(h.checkpoint.current().as_deref(), Some("P3"));

        let outcome = h
            .engine
            .handle_event(StreamEvent::PostDeleted("P3".into()))
            .await
            .unwrap();
        assert!(matches!(outcome, EventOutcome::Ignored));

        let before = h.source.verifications.load(Ordering::SeqCst);
        let outcome = h.engine.handle_event(StreamEvent::Heartbeat).await.unwrap();
        assert!(matches!(outcome, EventOutcome::Heartbeat { alive: true }));
        assert_eq!(h.source.verifications.load(Ordering::SeqCst), before + 1);

        assert_eq!(h.target.bodies(), vec![body_for("P3")]);
    }

    #[tokio::test]
    async fn test_run_stream_reconnects_until_shutdown() {
        let source = FakeSource::new(vec![]);
        source.streams.lock().unwrap().extend([
            vec![
                Ok(StreamEvent::PostCreated(post("P1", "Post P1"))),
                Err(SourceFeedError::Network("connection reset".into())),
            ],
            vec![
                Ok(StreamEvent::Heartbeat),
                Ok(StreamEvent::Notification("favourite".into())),
                Ok(StreamEvent::PostCreated(post("P2", "Post P2"))),
            ],
        ]);
        let h = harness_with(
            source,
            FakeTarget::default(),
            FakeCheckpoint::default(),
            FakeClock::default(),
            config(),
        );

        let target = Arc::clone(&h.target);
        let shutdown = async move {
            while target.bodies().len() < 2 {
                tokio::task::yield_now().await;
            }
        };

        h.engine.run_stream(shutdown).await.unwrap();

        assert_eq!(h.target.bodies(), vec![body_for("P1"), body_for("P2")]);
        assert_eq!(h.checkpoint.current().as_deref(), Some("P2"));
        assert!(h.source.subscriptions.load(Ordering::SeqCst) >= 2);
        assert!(h.clock.sleeps().contains(&Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_run_stream_stops_on_rejection() {
        let source = FakeSource::new(vec![]);
        source
            .streams
            .lock()
            .unwrap()
            .push_back(vec![Ok(StreamEvent::PostCreated(post("P1", "Post P1")))]);
        let h = harness_with(
            source,
            FakeTarget::scripted(vec![Err(PublishError::Rejected("suspended".into()))]),
            FakeCheckpoint::default(),
            FakeClock::default(),
            config(),
        );

        let error = h
            .engine
            .run_stream(futures::future::pending::<()>())
            .await
            .unwrap_err();

        assert!(matches!(error, MirrorError::Rejected { .. }));
        assert!(h.checkpoint.current().is_none());
    }

    #[tokio::test]
    async fn test_run_poll_repeats_until_shutdown() {
        let source = FakeSource::new(scenario_posts());
        source
            .fetch_errors
            .lock()
            .unwrap()
            .push_back(SourceFeedError::Auth("token expired".into()));
        let (clock, stop) = FakeClock::stopping_after(2);
        let h = harness_with(
            source,
            FakeTarget::default(),
            FakeCheckpoint::at("P1"),
            clock,
            config(),
        );

        h.engine
            .run_poll(async move {
                let _ = stop.await;
            })
            .await
            .unwrap();

        // First cycle fails, the following two mirror once and then find nothing new
        assert_eq!(h.source.fetches.load(Ordering::SeqCst), 3);
        assert_eq!(h.target.bodies(), vec![body_for("P3"), body_for("P5")]);
        let interval = MirrorPolicy::default().poll_interval;
        assert_eq!(h.clock.sleeps(), vec![interval, interval]);
    }

    #[tokio::test]
    async fn test_run_poll_stops_on_fatal_error() {
        let h = harness_with(
            FakeSource::new(vec![post("P1", "Post P1")]),
            FakeTarget::scripted(vec![Err(PublishError::Auth("revoked".into()))]),
            FakeCheckpoint::default(),
            FakeClock::default(),
            config(),
        );

        let error = h
            .engine
            .run_poll(futures::future::pending::<()>())
            .await
            .unwrap_err();

        assert!(error.is_fatal());
        assert!(h.clock.sleeps().is_empty());
    }
}
