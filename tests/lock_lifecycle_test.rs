//! End-to-end lock lifecycle scenarios against the real tokio-backed
//! expiration scheduler, with the clock paused and advanced manually.

use async_trait::async_trait;
use secretcache::{
    AccessToken, BroadcastNotifier, CacheEvent, InMemoryPreferences, LockCoordinator, LockEvent,
    LockPolicy, LockState, LockTrigger, MasterSecret, NoUpgradeGuard, NoopStatusRefresher,
    PresenceEvent, PresenceMonitor, PresenceSource, SecretStore, SharedPresenceState,
    StatusRefresher,
    TokioExpirationScheduler,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio_test::assert_ok;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn timeout_policy(timeout: Duration) -> LockPolicy {
    LockPolicy::new()
        .with_lock_enabled(true)
        .with_trigger(LockTrigger::Timeout)
        .with_timeout(timeout)
}

struct Fixture {
    coordinator: Arc<LockCoordinator>,
    store: Arc<SecretStore>,
    presence: Arc<SharedPresenceState>,
    events: broadcast::Receiver<LockEvent>,
}

fn fixture(policy: LockPolicy) -> Fixture {
    fixture_with_refresher(policy, Arc::new(NoopStatusRefresher::new()))
}

fn fixture_with_refresher(policy: LockPolicy, refresher: Arc<dyn StatusRefresher>) -> Fixture {
    init_logging();

    let runtime = Handle::current();
    let store = Arc::new(SecretStore::new());
    let presence = Arc::new(SharedPresenceState::new());

    let token = AccessToken::generate().expect("token generation");
    let notifier = Arc::new(BroadcastNotifier::new(token.clone()));
    let events = notifier.subscribe(&token).expect("subscribe");

    let coordinator = LockCoordinator::new(
        Arc::clone(&store),
        Arc::new(TokioExpirationScheduler::new(runtime.clone())),
        notifier,
        refresher,
        Arc::new(InMemoryPreferences::new(policy)),
        Arc::clone(&presence) as Arc<dyn PresenceSource>,
        Arc::new(NoUpgradeGuard::new()),
        runtime,
    );

    Fixture {
        coordinator,
        store,
        presence,
        events,
    }
}

fn secret() -> MasterSecret {
    let mut material = vec![0xA5_u8; 32];
    MasterSecret::new(&mut material)
}

async fn drain() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn secret_expires_after_inactivity_timeout() {
    let f = fixture(timeout_policy(Duration::from_secs(60)));

    f.coordinator.dispatch(CacheEvent::CacheSecret(secret()));
    f.presence.set_inactive(true);
    f.coordinator.dispatch(CacheEvent::DeviceBecameInactive);
    drain().await;

    assert!(!f.coordinator.is_locked());

    tokio::time::advance(Duration::from_secs(60)).await;
    drain().await;

    assert!(f.coordinator.is_locked());
    assert_eq!(f.store.state(), LockState::Locked);
    assert!(f.coordinator.get_secret().is_err());
}

#[tokio::test(start_paused = true)]
async fn device_active_cancels_pending_expiration() {
    let f = fixture(timeout_policy(Duration::from_secs(60)));

    f.coordinator.dispatch(CacheEvent::CacheSecret(secret()));
    f.presence.set_inactive(true);
    f.coordinator.dispatch(CacheEvent::DeviceBecameInactive);
    drain().await;

    tokio::time::advance(Duration::from_secs(30)).await;
    f.presence.set_inactive(false);
    f.coordinator.dispatch(CacheEvent::DeviceBecameActive);
    drain().await;

    // well past the original deadline; the canceled timer must not fire
    tokio::time::advance(Duration::from_secs(120)).await;
    drain().await;

    assert!(!f.coordinator.is_locked());
    let copy = assert_ok!(f.coordinator.get_secret());
    assert_eq!(copy, secret());
}

#[tokio::test(start_paused = true)]
async fn subscriber_observes_secret_cleared() {
    let mut f = fixture(timeout_policy(Duration::from_secs(60)));

    f.coordinator.dispatch(CacheEvent::CacheSecret(secret()));
    f.coordinator.dispatch(CacheEvent::RequestClear);
    drain().await;

    assert_eq!(f.events.recv().await.expect("event"), LockEvent::SecretCleared);
}

#[tokio::test(start_paused = true)]
async fn presence_monitor_drives_the_coordinator() {
    let f = fixture(timeout_policy(Duration::from_secs(60)));
    let (sender, receiver) = mpsc::channel(8);
    let monitor = PresenceMonitor::start(&Handle::current(), &f.coordinator, receiver);

    f.coordinator.dispatch(CacheEvent::CacheSecret(secret()));

    sender
        .send(PresenceEvent::BecameInactive)
        .await
        .expect("send");
    drain().await;
    assert!(f.coordinator.timeout_pending());

    sender
        .send(PresenceEvent::BecameActive)
        .await
        .expect("send");
    drain().await;
    assert!(!f.coordinator.timeout_pending());

    monitor.stop();
    assert!(!monitor.is_running());
}

/// Refresher whose notification clearing takes a long time, standing in for
/// a slow secure wipe path.
struct SlowClearRefresher {
    delay: Duration,
}

#[async_trait]
impl StatusRefresher for SlowClearRefresher {
    fn set_cached_indicator(&self, _visible: bool) -> secretcache::Result<()> {
        Ok(())
    }

    async fn refresh(&self) -> secretcache::Result<()> {
        Ok(())
    }

    async fn clear_all(&self) -> secretcache::Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn clear_reports_locked_while_destruction_is_in_flight() {
    let f = fixture_with_refresher(
        timeout_policy(Duration::from_secs(60)),
        Arc::new(SlowClearRefresher {
            delay: Duration::from_secs(10),
        }),
    );

    f.coordinator.dispatch(CacheEvent::CacheSecret(secret()));
    f.coordinator.dispatch(CacheEvent::RequestClear);
    drain().await;

    // the background finalizer is still sleeping, yet the cache is locked
    assert_eq!(f.store.state(), LockState::Locking);
    assert!(f.coordinator.is_locked());
    assert!(f.coordinator.get_secret().is_err());

    tokio::time::advance(Duration::from_secs(10)).await;
    drain().await;
    assert_eq!(f.store.state(), LockState::Locked);
}

#[tokio::test(start_paused = true)]
async fn repeated_inactive_signals_do_not_drift_the_deadline() {
    let f = fixture(timeout_policy(Duration::from_secs(60)));

    f.coordinator.dispatch(CacheEvent::CacheSecret(secret()));
    f.coordinator.dispatch(CacheEvent::DeviceBecameInactive);
    drain().await;

    // a burst of duplicate signals must neither re-arm nor drift the timer
    tokio::time::advance(Duration::from_secs(45)).await;
    f.coordinator.dispatch(CacheEvent::DeviceBecameInactive);
    f.coordinator.dispatch(CacheEvent::DeviceBecameInactive);
    drain().await;

    tokio::time::advance(Duration::from_secs(15)).await;
    drain().await;

    assert!(f.coordinator.is_locked());
}
