pub mod trigger;

pub use trigger::{pacing_delay, DailyTrigger, Pacing, Trigger};

use crate::content::{ContentSource, FetchRequest, Sources};
use crate::dedup::{DedupLedger, DEFAULT_MAX_KEEP};
use crate::destinations::DestinationSet;
use crate::features::validate::parse_post_time;
use crate::features::{Extras, Feature, FeatureConfig, FeatureHandle, FeatureRegistry};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::transport::{DeliveryError, Destination, Post, Transport};
use chrono::{DateTime, NaiveTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

const SAFETY_MARGIN: Duration = Duration::from_secs(5 * 60);
const HOURLY: Duration = Duration::from_secs(60 * 60);
const DAILY_POLL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub trigger: Trigger,
    pub pacing: Pacing,
    /// Subtracted from the configured interval when pacing.
    pub safety_margin: Duration,
    /// Upper bound for one send to one destination.
    pub delivery_timeout: Duration,
    /// Turn the feature off when a configured channel no longer exists.
    pub disable_on_missing: bool,
    pub max_keep: usize,
}

impl SchedulerOptions {
    pub fn for_feature(feature: Feature, delivery_timeout: Duration) -> Self {
        let (trigger, pacing, disable_on_missing) = match feature {
            Feature::Meme => (Trigger::Every(HOURLY), Pacing::AfterCycle, true),
            Feature::Quote => (Trigger::Every(HOURLY), Pacing::BetweenSends, true),
            Feature::Waifu => (Trigger::Every(HOURLY), Pacing::AfterCycle, true),
            Feature::Schedule => (Trigger::DailyAt { poll: DAILY_POLL }, Pacing::None, false),
            Feature::Rss => (Trigger::ConfiguredInterval, Pacing::None, false),
        };
        Self {
            trigger,
            pacing,
            safety_margin: SAFETY_MARGIN,
            delivery_timeout,
            disable_on_missing,
            max_keep: DEFAULT_MAX_KEEP,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerState {
    Idle,
    Waiting { next_fire: DateTime<Utc> },
    Firing,
    /// Sending to one destination of the current cycle.
    PostCycle { channel_id: u64 },
}

/// Outcome of one fired cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub items: usize,
    pub delivered: usize,
    pub failed: usize,
    pub missing: Vec<u64>,
    pub skipped: usize,
    pub disabled: bool,
    pub interrupted: bool,
}

/// One feature's recurring fetch-and-announce loop.
pub struct BroadcastScheduler<X: Extras> {
    feature: Feature,
    store: FeatureHandle<X>,
    source: Arc<dyn ContentSource>,
    transport: Arc<dyn Transport>,
    options: SchedulerOptions,
    ledger: DedupLedger,
    daily: DailyTrigger,
    state: SchedulerState,
    shutdown: ShutdownSignal,
}

impl<X: Extras> BroadcastScheduler<X> {
    pub fn new(
        store: FeatureHandle<X>,
        source: Arc<dyn ContentSource>,
        transport: Arc<dyn Transport>,
        options: SchedulerOptions,
        shutdown: ShutdownSignal,
    ) -> Self {
        let snapshot = store.snapshot();
        let ledger =
            DedupLedger::from_persisted(snapshot.extras.seen_guids().to_vec(), options.max_keep);
        Self {
            feature: store.feature(),
            store,
            source,
            transport,
            options,
            ledger,
            daily: DailyTrigger::new(),
            state: SchedulerState::Idle,
            shutdown,
        }
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    fn poll_period(&self) -> Duration {
        match self.options.trigger {
            Trigger::Every(period) => period,
            Trigger::DailyAt { poll } => poll,
            Trigger::ConfiguredInterval => {
                let minutes = self
                    .store
                    .snapshot()
                    .interval_minutes
                    .max(self.feature.min_interval_minutes());
                Duration::from_secs(minutes * 60)
            }
        }
    }

    fn post_time(&self, config: &FeatureConfig<X>) -> NaiveTime {
        let fallback = NaiveTime::from_hms_opt(1, 0, 0).unwrap_or_default();
        match config.extras.post_time().map(parse_post_time) {
            Some(Ok(at)) => at,
            Some(Err(e)) => {
                warn!("{} post_time invalid, using 01:00: {}", self.feature.key(), e);
                fallback
            }
            None => fallback,
        }
    }

    /// Run the loop until shutdown. Nothing fires before the transport is
    /// ready.
    pub async fn run(mut self) {
        let feature = self.feature.key();
        info!("{} loop ({}) waiting for gateway", feature, self.source.name());
        tokio::select! {
            _ = self.transport.wait_until_ready() => {}
            _ = self.shutdown.wait() => {
                info!("{} loop stopped before start", feature);
                return;
            }
        }

        let mut period = self.poll_period();
        let mut ticker = new_ticker(period, false);
        info!("{} loop started, polling every {:?}", feature, period);

        loop {
            let wait =
                chrono::Duration::from_std(period).unwrap_or_else(|_| chrono::Duration::zero());
            self.state = SchedulerState::Waiting {
                next_fire: Utc::now() + wait,
            };
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.wait() => break,
            }

            if let Some(report) = self.tick(Utc::now()).await {
                if report.interrupted {
                    break;
                }
                if self.options.pacing == Pacing::AfterCycle && report.delivered > 0 {
                    let minutes = self.store.snapshot().interval_minutes;
                    if let Some(delay) = pacing_delay(
                        minutes,
                        self.feature.min_interval_minutes(),
                        self.options.safety_margin,
                    ) {
                        debug!("{} sleeping {:?} after cycle", feature, delay);
                        if !self.pause(delay).await {
                            break;
                        }
                    }
                }
            }

            if self.shutdown.is_triggered() {
                break;
            }
            let next = self.poll_period();
            if next != period {
                info!("{} poll interval changed to {:?}", feature, next);
                period = next;
                ticker = new_ticker(period, true);
            }
        }

        self.state = SchedulerState::Idle;
        info!("{} loop stopped", feature);
    }

    /// Evaluate one wake-up at `now`. Returns `None` when nothing fired.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Option<CycleReport> {
        let config = self.store.snapshot();
        if !config.enabled {
            return None;
        }
        if let Trigger::DailyAt { .. } = self.options.trigger {
            let at = self.post_time(&config);
            if !self.daily.is_due(now, at) {
                return None;
            }
            self.daily.mark_fired(now.date_naive());
        }

        self.state = SchedulerState::Firing;
        let report = self.fire(&config).await;
        self.state = SchedulerState::Idle;

        info!(
            "{} cycle: {} item(s), {} delivered, {} failed, {} missing",
            self.feature.key(),
            report.items,
            report.delivered,
            report.failed,
            report.missing.len()
        );
        Some(report)
    }

    async fn fire(&mut self, config: &FeatureConfig<X>) -> CycleReport {
        let feature = self.feature.key();
        let mut report = CycleReport::default();

        if config.destinations.is_empty() {
            info!("{} enabled but no channels configured", feature);
            return report;
        }

        let set = DestinationSet::resolve(
            self.transport.as_ref(),
            &config.destinations,
            self.options.delivery_timeout,
        )
        .await;
        report.missing = set.missing.clone();
        report.failed = set.unreachable.len();
        report.skipped = set.invalid.len();

        if set.is_empty() {
            warn!("{} has no reachable channels this cycle", feature);
        } else {
            let items = self
                .source
                .fetch(FetchRequest {
                    seen: Some(&self.ledger),
                    limit: config.extras.post_limit(),
                })
                .await;
            report.items = items.len();

            let mut ledger_changed = false;
            'items: for item in &items {
                let post = item.render(None);
                for (index, destination) in set.resolved.iter().enumerate() {
                    if index > 0 && self.options.pacing == Pacing::BetweenSends {
                        if let Some(delay) = pacing_delay(
                            config.interval_minutes,
                            self.feature.min_interval_minutes(),
                            self.options.safety_margin,
                        ) {
                            debug!("{} waiting {:?} before next channel", feature, delay);
                            if !self.pause(delay).await {
                                report.interrupted = true;
                                break 'items;
                            }
                        }
                    }

                    self.state = SchedulerState::PostCycle {
                        channel_id: destination.channel_id,
                    };
                    match self.deliver(destination, &post).await {
                        Ok(()) => report.delivered += 1,
                        Err(DeliveryError::NotFound(id)) => {
                            if !report.missing.contains(&id) {
                                report.missing.push(id);
                            }
                        }
                        Err(_) => report.failed += 1,
                    }
                }
                if let Some(identity) = &item.identity {
                    ledger_changed |= self.ledger.mark(identity.clone());
                }
            }

            if ledger_changed {
                let seen = self.ledger.to_persisted();
                self.store.modify(|cfg| cfg.extras.set_seen_guids(seen));
            }
        }

        if !report.missing.is_empty() && self.options.disable_on_missing {
            warn!(
                "Configured {} channel(s) {:?} not found - disabling",
                feature, report.missing
            );
            self.store.modify(|cfg| cfg.enabled = false);
            report.disabled = true;
        }

        report
    }

    async fn deliver(&self, destination: &Destination, post: &Post) -> Result<(), DeliveryError> {
        let channel_id = destination.channel_id;
        let send = self.transport.send(destination, post);
        match tokio::time::timeout(self.options.delivery_timeout, send).await {
            Ok(Ok(())) => {
                debug!("Posted {} to channel {}", self.feature.key(), channel_id);
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Failed posting {} to channel {}: {}", self.feature.key(), channel_id, e);
                Err(e)
            }
            Err(_) => {
                warn!("Posting {} to channel {} timed out", self.feature.key(), channel_id);
                Err(DeliveryError::TimedOut(channel_id))
            }
        }
    }

    /// Sleep unless shutdown arrives first. Returns `false` on shutdown.
    async fn pause(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.shutdown.wait() => false,
        }
    }
}

fn new_ticker(period: Duration, delay_first: bool) -> Interval {
    let mut ticker = if delay_first {
        interval_at(Instant::now() + period, period)
    } else {
        interval(period)
    };
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Spawn one broadcast loop per feature.
pub fn spawn_all(
    features: &FeatureRegistry,
    sources: &Sources,
    transport: Arc<dyn Transport>,
    shutdown: &Shutdown,
    delivery_timeout: Duration,
) -> Vec<JoinHandle<()>> {
    let options = |feature| SchedulerOptions::for_feature(feature, delivery_timeout);
    vec![
        tokio::spawn(
            BroadcastScheduler::new(
                features.meme.clone(),
                sources.meme.clone(),
                Arc::clone(&transport),
                options(Feature::Meme),
                shutdown.subscribe(),
            )
            .run(),
        ),
        tokio::spawn(
            BroadcastScheduler::new(
                features.quote.clone(),
                sources.quote.clone(),
                Arc::clone(&transport),
                options(Feature::Quote),
                shutdown.subscribe(),
            )
            .run(),
        ),
        tokio::spawn(
            BroadcastScheduler::new(
                features.waifu.clone(),
                sources.spawn.clone(),
                Arc::clone(&transport),
                options(Feature::Waifu),
                shutdown.subscribe(),
            )
            .run(),
        ),
        tokio::spawn(
            BroadcastScheduler::new(
                features.schedule.clone(),
                sources.schedule.clone(),
                Arc::clone(&transport),
                options(Feature::Schedule),
                shutdown.subscribe(),
            )
            .run(),
        ),
        tokio::spawn(
            BroadcastScheduler::new(
                features.rss.clone(),
                sources.rss.clone(),
                transport,
                options(Feature::Rss),
                shutdown.subscribe(),
            )
            .run(),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{select_fresh, ContentItem, FeedEntry, Payload};
    use crate::features::{DestinationRef, NoExtras, RssExtras, ScheduleExtras};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingTransport {
        missing: Vec<u64>,
        rejecting: Vec<u64>,
        /// Channels whose lookup never completes.
        stalled_lookup: Vec<u64>,
        /// Channels whose send never completes.
        stalled_send: Vec<u64>,
        sent: Mutex<Vec<(u64, Post)>>,
    }

    impl RecordingTransport {
        fn sent_to(&self) -> Vec<u64> {
            self.sent.lock().unwrap().iter().map(|(id, _)| *id).collect()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn wait_until_ready(&self) {}

        async fn resolve_channel(&self, channel_id: u64) -> Result<Destination, DeliveryError> {
            if self.stalled_lookup.contains(&channel_id) {
                std::future::pending::<()>().await;
            }
            if self.missing.contains(&channel_id) {
                Err(DeliveryError::NotFound(channel_id))
            } else {
                Ok(Destination::new(channel_id))
            }
        }

        async fn send(&self, destination: &Destination, post: &Post) -> Result<(), DeliveryError> {
            if self.stalled_send.contains(&destination.channel_id) {
                std::future::pending::<()>().await;
            }
            if self.rejecting.contains(&destination.channel_id) {
                return Err(DeliveryError::Rejected {
                    channel: destination.channel_id,
                    reason: "Missing Permissions".to_string(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((destination.channel_id, post.clone()));
            Ok(())
        }
    }

    /// Returns the same text post every cycle.
    struct FixedSource;

    #[async_trait]
    impl ContentSource for FixedSource {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn fetch(&self, _request: FetchRequest<'_>) -> Vec<ContentItem> {
            vec![ContentItem::new(Payload::Schedule("hello".to_string()))]
        }
    }

    /// Feed-like source with identities, filtered through the ledger.
    struct FeedSource(Vec<&'static str>);

    #[async_trait]
    impl ContentSource for FeedSource {
        fn name(&self) -> &'static str {
            "feed"
        }

        async fn fetch(&self, request: FetchRequest<'_>) -> Vec<ContentItem> {
            let items = self
                .0
                .iter()
                .map(|id| ContentItem {
                    identity: Some(id.to_string()),
                    payload: Payload::Feed(FeedEntry {
                        title: id.to_string(),
                        link: None,
                        published_at: None,
                    }),
                    published_at: None,
                    fallback: false,
                })
                .collect();
            select_fresh(items, request.seen, request.limit)
        }
    }

    fn options(trigger: Trigger, pacing: Pacing, disable_on_missing: bool) -> SchedulerOptions {
        SchedulerOptions {
            trigger,
            pacing,
            safety_margin: SAFETY_MARGIN,
            delivery_timeout: Duration::from_secs(5),
            disable_on_missing,
            max_keep: DEFAULT_MAX_KEEP,
        }
    }

    fn enabled_store<X: Extras>(
        feature: Feature,
        dir: &TempDir,
        channels: &[u64],
    ) -> FeatureHandle<X> {
        let store = FeatureHandle::<X>::open(feature, dir.path());
        store.modify(|cfg| {
            cfg.enabled = true;
            cfg.destinations = channels.iter().map(|id| DestinationRef::Id(*id)).collect();
        });
        store
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_failed_destination_does_not_abort_others() {
        let dir = TempDir::new().unwrap();
        let store = enabled_store::<NoExtras>(Feature::Meme, &dir, &[1, 2, 3]);
        let transport = Arc::new(RecordingTransport {
            rejecting: vec![2],
            ..Default::default()
        });
        let shutdown = Shutdown::new();
        let mut scheduler = BroadcastScheduler::new(
            store.clone(),
            Arc::new(FixedSource),
            transport.clone(),
            options(Trigger::Every(HOURLY), Pacing::None, true),
            shutdown.subscribe(),
        );

        let report = scheduler.tick(now()).await.unwrap();
        assert_eq!(transport.sent_to(), vec![1, 3]);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert!(!report.disabled);
        assert!(store.snapshot().enabled);
        assert_eq!(scheduler.state(), &SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_missing_destination_disables_feature() {
        let dir = TempDir::new().unwrap();
        let store = enabled_store::<NoExtras>(Feature::Quote, &dir, &[1, 404, 3]);
        let transport = Arc::new(RecordingTransport {
            missing: vec![404],
            ..Default::default()
        });
        let shutdown = Shutdown::new();
        let mut scheduler = BroadcastScheduler::new(
            store.clone(),
            Arc::new(FixedSource),
            transport.clone(),
            options(Trigger::Every(HOURLY), Pacing::None, true),
            shutdown.subscribe(),
        );

        let report = scheduler.tick(now()).await.unwrap();
        assert_eq!(transport.sent_to(), vec![1, 3]);
        assert_eq!(report.missing, vec![404]);
        assert!(report.disabled);
        assert!(!store.snapshot().enabled);

        // Disabled now, so the next wake does nothing.
        assert!(scheduler.tick(now()).await.is_none());
    }

    #[tokio::test]
    async fn test_missing_destination_is_logged_only_when_policy_says_so() {
        let dir = TempDir::new().unwrap();
        let store = enabled_store::<RssExtras>(Feature::Rss, &dir, &[404, 5]);
        let transport = Arc::new(RecordingTransport {
            missing: vec![404],
            ..Default::default()
        });
        let shutdown = Shutdown::new();
        let mut scheduler = BroadcastScheduler::new(
            store.clone(),
            Arc::new(FeedSource(vec!["x"])),
            transport.clone(),
            options(Trigger::ConfiguredInterval, Pacing::None, false),
            shutdown.subscribe(),
        );

        let report = scheduler.tick(now()).await.unwrap();
        assert!(!report.disabled);
        assert!(store.snapshot().enabled);
        assert_eq!(transport.sent_to(), vec![5]);
    }

    #[tokio::test]
    async fn test_daily_trigger_fires_once_for_two_ticks_in_same_minute() {
        let dir = TempDir::new().unwrap();
        let store = enabled_store::<ScheduleExtras>(Feature::Schedule, &dir, &[7]);
        store.modify(|cfg| cfg.extras.post_time = "09:00".to_string());
        let transport = Arc::new(RecordingTransport::default());
        let shutdown = Shutdown::new();
        let mut scheduler = BroadcastScheduler::new(
            store,
            Arc::new(FixedSource),
            transport.clone(),
            options(Trigger::DailyAt { poll: DAILY_POLL }, Pacing::None, false),
            shutdown.subscribe(),
        );

        let first = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 30).unwrap();
        assert!(scheduler.tick(first - chrono::Duration::minutes(1)).await.is_none());
        assert!(scheduler.tick(first).await.is_some());
        assert!(scheduler.tick(second).await.is_none());
        assert_eq!(transport.sent_to(), vec![7]);
    }

    #[tokio::test]
    async fn test_feed_identities_are_deduplicated_and_persisted() {
        let dir = TempDir::new().unwrap();
        let store = enabled_store::<RssExtras>(Feature::Rss, &dir, &[9]);
        let transport = Arc::new(RecordingTransport::default());
        let shutdown = Shutdown::new();
        let source = Arc::new(FeedSource(vec!["a", "b"]));
        let mut scheduler = BroadcastScheduler::new(
            store.clone(),
            source.clone(),
            transport.clone(),
            options(Trigger::ConfiguredInterval, Pacing::None, false),
            shutdown.subscribe(),
        );

        let first = scheduler.tick(now()).await.unwrap();
        assert_eq!(first.items, 2);
        assert_eq!(store.snapshot().extras.seen_guids, vec!["a", "b"]);

        let second = scheduler.tick(now()).await.unwrap();
        assert_eq!(second.items, 0);
        assert_eq!(transport.sent_to(), vec![9, 9]);

        // A fresh loop picks the ledger up from the persisted config.
        let reloaded = BroadcastScheduler::new(
            FeatureHandle::<RssExtras>::open(Feature::Rss, dir.path()),
            source,
            transport,
            options(Trigger::ConfiguredInterval, Pacing::None, false),
            shutdown.subscribe(),
        );
        assert!(reloaded.ledger().seen("a"));
        assert!(reloaded.ledger().seen("b"));
    }

    #[tokio::test]
    async fn test_no_destinations_skips_without_consuming() {
        let dir = TempDir::new().unwrap();
        let store = enabled_store::<RssExtras>(Feature::Rss, &dir, &[]);
        let transport = Arc::new(RecordingTransport::default());
        let shutdown = Shutdown::new();
        let mut scheduler = BroadcastScheduler::new(
            store.clone(),
            Arc::new(FeedSource(vec!["a"])),
            transport,
            options(Trigger::ConfiguredInterval, Pacing::None, false),
            shutdown.subscribe(),
        );

        let report = scheduler.tick(now()).await.unwrap();
        assert_eq!(report, CycleReport::default());
        assert!(store.snapshot().extras.seen_guids.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_spacing_between_sends() {
        let dir = TempDir::new().unwrap();
        let store = enabled_store::<NoExtras>(Feature::Quote, &dir, &[1, 2]);
        let transport = Arc::new(RecordingTransport::default());
        let shutdown = Shutdown::new();
        let mut scheduler = BroadcastScheduler::new(
            store,
            Arc::new(FixedSource),
            transport.clone(),
            options(Trigger::Every(HOURLY), Pacing::BetweenSends, true),
            shutdown.subscribe(),
        );

        shutdown.trigger();
        let report = scheduler.tick(now()).await.unwrap();
        assert!(report.interrupted);
        assert_eq!(transport.sent_to(), vec![1]);
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let store = FeatureHandle::<NoExtras>::open(Feature::Meme, dir.path());
        let shutdown = Shutdown::new();
        let scheduler = BroadcastScheduler::new(
            store,
            Arc::new(FixedSource),
            Arc::new(RecordingTransport::default()),
            options(Trigger::Every(HOURLY), Pacing::AfterCycle, true),
            shutdown.subscribe(),
        );

        let handle = tokio::spawn(scheduler.run());
        tokio::task::yield_now().await;
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_stalled_lookup_is_bounded_and_others_still_delivered() {
        let dir = TempDir::new().unwrap();
        let store = enabled_store::<NoExtras>(Feature::Meme, &dir, &[1, 2, 3]);
        let transport = Arc::new(RecordingTransport {
            stalled_lookup: vec![2],
            ..Default::default()
        });
        let shutdown = Shutdown::new();
        let mut scheduler = BroadcastScheduler::new(
            store,
            Arc::new(FixedSource),
            transport.clone(),
            SchedulerOptions {
                delivery_timeout: Duration::from_millis(200),
                ..options(Trigger::Every(HOURLY), Pacing::None, true)
            },
            shutdown.subscribe(),
        );

        let report = tokio::time::timeout(Duration::from_secs(3), scheduler.tick(now()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(transport.sent_to(), vec![1, 3]);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert!(report.missing.is_empty());
        assert!(!report.disabled);
    }

    #[tokio::test]
    async fn test_stalled_send_counts_as_failure() {
        let dir = TempDir::new().unwrap();
        let store = enabled_store::<NoExtras>(Feature::Meme, &dir, &[1, 2, 3]);
        let transport = Arc::new(RecordingTransport {
            stalled_send: vec![2],
            ..Default::default()
        });
        let shutdown = Shutdown::new();
        let mut scheduler = BroadcastScheduler::new(
            store.clone(),
            Arc::new(FixedSource),
            transport.clone(),
            SchedulerOptions {
                delivery_timeout: Duration::from_millis(200),
                ..options(Trigger::Every(HOURLY), Pacing::None, true)
            },
            shutdown.subscribe(),
        );

        let report = tokio::time::timeout(Duration::from_secs(3), scheduler.tick(now()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(transport.sent_to(), vec![1, 3]);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert!(store.snapshot().enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_sleeps_interval_minus_margin_after_delivery() {
        let dir = TempDir::new().unwrap();
        let store = enabled_store::<NoExtras>(Feature::Meme, &dir, &[1]);
        store.modify(|cfg| cfg.interval_minutes = 30);
        let transport = Arc::new(RecordingTransport::default());
        let shutdown = Shutdown::new();
        let scheduler = BroadcastScheduler::new(
            store,
            Arc::new(FixedSource),
            transport.clone(),
            options(Trigger::Every(Duration::from_secs(60)), Pacing::AfterCycle, true),
            shutdown.subscribe(),
        );
        let handle = tokio::spawn(scheduler.run());

        // First fire is immediate, then the loop sleeps 30m - 5m.
        tokio::time::sleep(Duration::from_secs(24 * 60)).await;
        assert_eq!(transport.sent_to(), vec![1]);

        tokio::time::sleep(Duration::from_secs(2 * 60)).await;
        assert_eq!(transport.sent_to(), vec![1, 1]);

        shutdown.trigger();
        handle.await.unwrap();
    }

    #[test]
    fn test_feature_presets() {
        let quote = SchedulerOptions::for_feature(Feature::Quote, Duration::from_secs(30));
        assert_eq!(quote.pacing, Pacing::BetweenSends);
        assert!(quote.disable_on_missing);

        let schedule = SchedulerOptions::for_feature(Feature::Schedule, Duration::from_secs(30));
        assert_eq!(schedule.trigger, Trigger::DailyAt { poll: DAILY_POLL });
        assert!(!schedule.disable_on_missing);

        let rss = SchedulerOptions::for_feature(Feature::Rss, Duration::from_secs(30));
        assert_eq!(rss.trigger, Trigger::ConfiguredInterval);
    }
}
