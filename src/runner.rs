use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::auth::SessionSource;
use crate::browser::Browser;
use crate::config::Criteria;
use crate::feed::ListingSource;
use crate::filter::filter_eligible;
use crate::notifier::Notifier;
use crate::reactor::{Outcome, Reactor};
use crate::reporter;
use crate::state::DedupState;
use crate::store::IdStore;
use crate::types::{CycleReport, ExitSummary};

/// How one loop iteration ended.
#[derive(Debug)]
pub enum Tick {
    Completed(CycleReport),
    /// The cycle failed and a fresh session was loaded.
    Recovered,
    /// The cycle failed and so did re-authentication.
    Stalled,
}

impl Tick {
    pub fn report(self) -> Option<CycleReport> {
        match self {
            Tick::Completed(report) => Some(report),
            Tick::Recovered | Tick::Stalled => None,
        }
    }
}

/// Poll loop: fetch, filter, react, flush, sleep.
pub struct Runner<B> {
    reactor: Reactor<B>,
    source: Box<dyn ListingSource>,
    session: Arc<dyn SessionSource>,
    notifier: Box<dyn Notifier>,
    store: IdStore,
    state: DedupState,
    criteria: Criteria,
    poll_interval: Duration,
    summary: ExitSummary,
}

impl<B: Browser> Runner<B> {
    /// Build a runner, loading the dedup sets from `store`.
    pub fn new(
        reactor: Reactor<B>,
        source: Box<dyn ListingSource>,
        session: Arc<dyn SessionSource>,
        notifier: Box<dyn Notifier>,
        store: IdStore,
        criteria: Criteria,
        poll_interval: Duration,
    ) -> Self {
        let state = DedupState::load(&store);
        info!(
            "Loaded {} notified / {} responded ids",
            state.notified().len(),
            state.responded().len()
        );
        Self {
            reactor,
            source,
            session,
            notifier,
            store,
            state,
            criteria,
            poll_interval,
            summary: ExitSummary::default(),
        }
    }

    pub fn state(&self) -> &DedupState {
        &self.state
    }

    pub fn reactor(&self) -> &Reactor<B> {
        &self.reactor
    }

    /// Log in and load the session into the bot's browser.
    pub async fn start(&mut self) -> Result<()> {
        let cookies = self
            .session
            .acquire()
            .await
            .context("initial login failed")?;
        self.reactor
            .apply_session(&cookies)
            .await
            .context("failed to load session into browser")
    }

    /// One fetch → filter → react pass. Does not flush.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let listings = self.source.fetch().await?;
        let eligible = filter_eligible(&listings, &self.criteria);
        info!("Fetched {} listings, {} eligible", listings.len(), eligible.len());

        let mut report = CycleReport {
            fetched: listings.len(),
            eligible: eligible.len(),
            ..CycleReport::default()
        };
        for listing in &eligible {
            let outcome = self
                .reactor
                .process(listing, &mut self.state, self.notifier.as_ref())
                .await?;
            match outcome {
                Outcome::Skipped => report.skipped += 1,
                Outcome::AlreadyResponded => report.already_responded += 1,
                Outcome::Notified => report.notified += 1,
                Outcome::Responded => {
                    report.notified += 1;
                    report.responded += 1;
                }
                Outcome::Failed => {
                    report.notified += 1;
                    report.failed += 1;
                }
            }
        }

        report.timestamp = chrono::Utc::now().to_rfc3339();
        report.notified_total = self.state.notified().len();
        report.responded_total = self.state.responded().len();
        Ok(report)
    }

    /// Run one cycle; on success flush and report, otherwise re-authenticate.
    pub async fn tick(&mut self) -> Tick {
        match self.run_cycle().await {
            Ok(report) => {
                self.finish_cycle(&report);
                Tick::Completed(report)
            }
            Err(e) => {
                self.summary.cycles += 1;
                self.summary.failed_cycles += 1;
                error!("Cycle failed: {e:#}");
                if self.reauthenticate().await {
                    Tick::Recovered
                } else {
                    Tick::Stalled
                }
            }
        }
    }

    /// Flush the dedup sets, report and count a completed cycle.
    fn finish_cycle(&mut self, report: &CycleReport) {
        self.state.flush(&self.store);
        reporter::report_cycle(report);
        self.summary.cycles += 1;
        self.summary.notified += report.notified;
        self.summary.responded += report.responded;
    }

    async fn reauthenticate(&mut self) -> bool {
        info!("Re-authenticating...");
        let result = async {
            let cookies = self.session.acquire().await?;
            self.reactor.apply_session(&cookies).await
        }
        .await;
        match result {
            Ok(()) => {
                info!("Session refreshed");
                true
            }
            Err(e) => {
                warn!(
                    "Re-authentication failed: {e:#}; retrying in {}s",
                    self.poll_interval.as_secs()
                );
                false
            }
        }
    }

    /// Single cycle for `--once`: errors are returned instead of recovered.
    pub async fn run_once(&mut self) -> Result<CycleReport> {
        let report = self.run_cycle().await?;
        self.finish_cycle(&report);
        Ok(report)
    }

    /// Poll until `shutdown` resolves, then flush.
    ///
    /// A cycle that failed but re-authenticated is retried at once; a second
    /// failure in a row waits for the poll interval.
    pub async fn run<F: Future<Output = ()>>(&mut self, shutdown: F) {
        tokio::pin!(shutdown);
        info!(
            "Entering polling loop (interval: {}s). Press Ctrl+C to stop.",
            self.poll_interval.as_secs()
        );
        let mut retried = false;
        loop {
            let tick = tokio::select! {
                _ = &mut shutdown => break,
                tick = self.tick() => tick,
            };
            if matches!(tick, Tick::Recovered) && !retried {
                retried = true;
                continue;
            }
            retried = false;
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        info!("Shutdown signal received");
        self.state.flush(&self.store);
    }

    /// Flush state, close the browser and print the exit summary.
    pub async fn close(mut self) {
        self.state.flush(&self.store);
        self.reactor.quit().await;
        let summary = ExitSummary {
            timestamp: chrono::Utc::now().to_rfc3339(),
            notified_total: self.state.notified().len(),
            responded_total: self.state.responded().len(),
            ..self.summary
        };
        reporter::report_exit_summary(&summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::Locator;
    use crate::store::{IdSet, load_ids};
    use crate::testkit::{CountingSession, FakeBrowser, QueuedFeed, RecordingNotifier, unit_listing};
    use crate::types::SessionCookies;
    use anyhow::anyhow;

    const APPLY: Locator = Locator::XPath(
        "//button[contains(@class, 'btn-primary') and contains(., 'Reageren op deze Woning')]",
    );
    const POLL: Duration = Duration::from_secs(300);

    fn criteria() -> Criteria {
        Criteria {
            min_rent: 700.0,
            max_rent: 1200.0,
            min_area: 30.0,
            min_rooms: 1,
            max_rooms: 3,
        }
    }

    struct Harness {
        runner: Runner<FakeBrowser>,
        feed: Arc<QueuedFeed>,
        notifier: Arc<RecordingNotifier>,
        session: Arc<CountingSession>,
        store: IdStore,
        _dir: tempfile::TempDir,
    }

    fn harness(browser: FakeBrowser) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = IdStore::new(
            dir.path().join("notified.json"),
            dir.path().join("responded.json"),
        );
        let feed = Arc::new(QueuedFeed::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let cookies: SessionCookies = [("sid".to_string(), "fresh".to_string())].into();
        let session = Arc::new(CountingSession::with_cookies(cookies));
        let reactor =
            Reactor::new(browser, "https://portal.example", dir.path().join("shots")).unwrap();
        let runner = Runner::new(
            reactor,
            Box::new(feed.clone()),
            session.clone(),
            Box::new(notifier.clone()),
            store.clone(),
            criteria(),
            POLL,
        );
        Harness {
            runner,
            feed,
            notifier,
            session,
            store,
            _dir: dir,
        }
    }

    fn with_apply_button() -> FakeBrowser {
        let mut browser = FakeBrowser::default();
        browser.add_element(APPLY.query());
        browser
    }

    fn mentions(messages: &[String], text: &str) -> usize {
        messages.iter().filter(|m| m.contains(text)).count()
    }

    // ── single cycle ───────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn unseen_eligible_listing_is_notified_and_applied() {
        let mut h = harness(with_apply_button());
        let listing = unit_listing("100", 950.0, 45.0, 2);
        h.feed.push(Ok(vec![listing.clone()]));

        let report = h.runner.tick().await.report().unwrap();
        assert_eq!(report.fetched, 1);
        assert_eq!(report.eligible, 1);
        assert_eq!(report.notified, 1);
        assert_eq!(report.responded, 1);

        let messages = h.notifier.messages();
        assert_eq!(mentions(&messages, &listing.address), 1);
        assert_eq!(h.runner.reactor().browser().clicks, vec![APPLY.query()]);
        assert!(h.runner.state().is_notified("100"));
        assert!(h.runner.state().is_responded("100"));

        assert!(load_ids(h.store.path(IdSet::Notified)).contains("100"));
        assert!(load_ids(h.store.path(IdSet::Responded)).contains("100"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_application_leaves_id_out_of_responded() {
        let mut h = harness(FakeBrowser::default());
        h.feed.push(Ok(vec![unit_listing("101", 950.0, 45.0, 2)]));

        let report = h.runner.tick().await.report().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(mentions(&h.notifier.messages(), "Keizersgracht 101"), 1);
        assert!(h.runner.state().is_notified("101"));
        assert!(!h.runner.state().is_responded("101"));
        assert!(load_ids(h.store.path(IdSet::Responded)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_application_does_not_stop_the_cycle() {
        let mut browser = with_apply_button();
        browser.script_clicks(APPLY.query(), &[false, false, true]);
        let mut h = harness(browser);
        h.feed.push(Ok(vec![
            unit_listing("110", 950.0, 45.0, 2),
            unit_listing("111", 900.0, 50.0, 2),
        ]));

        let report = h.runner.tick().await.report().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.responded, 1);
        assert!(!h.runner.state().is_responded("110"));
        assert!(h.runner.state().is_responded("111"));
        assert!(h.runner.state().is_notified("110"));
        assert!(load_ids(h.store.path(IdSet::Responded)).contains("111"));
    }

    #[tokio::test(start_paused = true)]
    async fn ineligible_listings_are_never_opened() {
        let mut h = harness(with_apply_button());
        h.feed.push(Ok(vec![
            unit_listing("102", 1500.0, 45.0, 2),
            unit_listing("103", 950.0, 20.0, 2),
        ]));

        let report = h.runner.tick().await.report().unwrap();
        assert_eq!(report.fetched, 2);
        assert_eq!(report.eligible, 0);
        assert!(h.runner.reactor().browser().visited.is_empty());
        assert!(h.notifier.messages().is_empty());
    }

    // ── across cycles ──────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn repeated_listing_is_notified_once() {
        let mut h = harness(with_apply_button());
        let listing = unit_listing("104", 950.0, 45.0, 2);
        h.feed.push(Ok(vec![listing.clone()]));
        h.feed.push(Ok(vec![listing.clone()]));

        h.runner.tick().await.report().unwrap();
        let second = h.runner.tick().await.report().unwrap();
        assert_eq!(second.skipped, 1);
        assert_eq!(second.notified, 0);
        assert_eq!(mentions(&h.notifier.messages(), &listing.address), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn persisted_ids_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdStore::new(dir.path().join("n.json"), dir.path().join("r.json"));
        let mut state = DedupState::default();
        state.mark_notified("105");
        state.flush(&store);

        let feed = Arc::new(QueuedFeed::default());
        feed.push(Ok(vec![unit_listing("105", 950.0, 45.0, 2)]));
        let notifier = Arc::new(RecordingNotifier::default());
        let reactor = Reactor::new(
            with_apply_button(),
            "https://portal.example",
            dir.path().to_path_buf(),
        )
        .unwrap();
        let mut runner = Runner::new(
            reactor,
            Box::new(feed.clone()),
            Arc::new(CountingSession::failing()),
            Box::new(notifier.clone()),
            store,
            criteria(),
            POLL,
        );

        let report = runner.tick().await.report().unwrap();
        assert_eq!(report.skipped, 1);
        assert!(notifier.messages().is_empty());
    }

    // ── recovery ───────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn fetch_error_reacquires_session_once_and_resumes() {
        let mut h = harness(with_apply_button());
        h.feed.push(Err(anyhow!("connection reset by peer")));
        h.feed.push(Ok(vec![unit_listing("106", 950.0, 45.0, 2)]));

        assert!(matches!(h.runner.tick().await, Tick::Recovered));
        assert_eq!(h.session.calls(), 1);
        let browser = h.runner.reactor().browser();
        assert_eq!(browser.refreshes, 1);
        assert_eq!(
            browser.cookie_domains.get("sid").map(String::as_str),
            Some("portal.example")
        );

        let report = h.runner.tick().await.report().unwrap();
        assert_eq!(report.responded, 1);
        assert_eq!(h.session.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reauthentication_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let feed = Arc::new(QueuedFeed::default());
        feed.push(Err(anyhow!("session expired")));
        let session = Arc::new(CountingSession::failing());
        let reactor =
            Reactor::new(FakeBrowser::default(), "https://portal.example", dir.path().into())
                .unwrap();
        let mut runner = Runner::new(
            reactor,
            Box::new(feed.clone()),
            session.clone(),
            Box::new(Arc::new(RecordingNotifier::default())),
            IdStore::new(dir.path().join("n.json"), dir.path().join("r.json")),
            criteria(),
            POLL,
        );

        assert!(matches!(runner.tick().await, Tick::Stalled));
        assert_eq!(session.calls(), 1);
        assert!(runner.tick().await.report().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn start_applies_initial_session() {
        let mut h = harness(FakeBrowser::default());
        h.runner.start().await.unwrap();
        assert_eq!(h.session.calls(), 1);
        assert_eq!(
            h.runner.reactor().browser().visited,
            vec!["https://portal.example"]
        );
    }

    // ── loop control ───────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn run_polls_until_shutdown_then_flushes() {
        let mut h = harness(with_apply_button());
        h.feed.push(Ok(vec![unit_listing("107", 950.0, 45.0, 2)]));

        h.runner
            .run(tokio::time::sleep(POLL * 2 + POLL / 2))
            .await;
        assert_eq!(h.feed.calls(), 3);
        assert!(load_ids(h.store.path(IdSet::Notified)).contains("107"));
    }

    #[tokio::test(start_paused = true)]
    async fn recovered_session_is_used_without_waiting() {
        let mut h = harness(with_apply_button());
        h.feed.push(Err(anyhow!("session expired")));
        h.feed.push(Ok(vec![unit_listing("200", 950.0, 45.0, 2)]));

        h.runner.run(tokio::time::sleep(POLL / 2)).await;
        assert_eq!(h.feed.calls(), 2);
        assert_eq!(h.session.calls(), 1);
        assert!(h.runner.state().is_notified("200"));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_failure_waits_for_poll_interval() {
        let mut h = harness(with_apply_button());
        h.feed.push(Err(anyhow!("session expired")));
        h.feed.push(Err(anyhow!("still expired")));

        h.runner.run(tokio::time::sleep(POLL / 2)).await;
        assert_eq!(h.feed.calls(), 2);
        assert_eq!(h.session.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_once_flushes_on_success() {
        let mut h = harness(with_apply_button());
        h.feed.push(Ok(vec![unit_listing("300", 950.0, 45.0, 2)]));

        let report = h.runner.run_once().await.unwrap();
        assert_eq!(report.responded, 1);
        assert!(load_ids(h.store.path(IdSet::Notified)).contains("300"));
        assert!(load_ids(h.store.path(IdSet::Responded)).contains("300"));
    }

    #[tokio::test(start_paused = true)]
    async fn run_once_returns_fetch_error_without_reauthenticating() {
        let mut h = harness(with_apply_button());
        h.feed.push(Err(anyhow!("connection reset by peer")));

        let err = h.runner.run_once().await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));
        assert_eq!(h.session.calls(), 0);
        assert!(!h.store.path(IdSet::Notified).exists());
    }

    #[tokio::test(start_paused = true)]
    async fn close_flushes_state() {
        let h = harness(FakeBrowser::default());
        let store = h.store.clone();
        h.runner.close().await;
        assert!(store.path(IdSet::Notified).exists());
    }
}
