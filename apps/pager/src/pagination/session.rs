//! Live-preview sessions.
//!
//! A session owns the only state that survives a recompute (the margin map and
//! the indicator switch) plus one recompute worker. Derived state is published as
//! `PreviewSnapshot`s through a watch channel; hosts render whatever the latest
//! snapshot says instead of the engine touching presentation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::block::BlockNode;
use crate::pagination::classifier::{classify_sections, ContentSection};
use crate::pagination::indicators::{build_indicator_layer, IndicatorLayer};
use crate::pagination::navigator::{go_to, ScrollTarget};
use crate::pagination::packer::{pack_sections, PaginationResult};
use crate::pagination::scheduler::{
    next_debounced, recompute_channel, RecomputeRequested, RecomputeSignal,
};
use crate::pagination::spacing::{MarginMap, SpacingController, SpacingDirection};
use crate::pagination::surface::{LayoutSurface, MeasuredDocument, StoredSurface};
use crate::pagination::PaginationSettings;

// ────────────────────────────────────────────────────────────────────────────
// Derived state
// ────────────────────────────────────────────────────────────────────────────

/// Everything a preview host needs to draw pagination for one pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewSnapshot {
    /// Increments on every recompute of this session.
    pub revision: u64,
    pub computed_at: DateTime<Utc>,
    pub sections: Vec<ContentSection>,
    pub margins: MarginMap,
    pub pagination: PaginationResult,
    pub indicators: IndicatorLayer,
}

/// Mutable per-session engine state.
#[derive(Debug)]
pub struct PreviewState {
    settings: PaginationSettings,
    spacing: SpacingController,
    indicators_visible: bool,
    /// Classification from the latest pass, used to spot stale section ids.
    sections: Vec<ContentSection>,
    revision: u64,
}

impl PreviewState {
    pub fn new(settings: PaginationSettings) -> Self {
        Self {
            settings,
            spacing: SpacingController::new(),
            indicators_visible: true,
            sections: Vec::new(),
            revision: 0,
        }
    }

    /// Full classify → pack → project pass over a tree measured without adjustments.
    pub fn recompute(&mut self, document: &BlockNode) -> PreviewSnapshot {
        self.recompute_measured(&MeasuredDocument::unadjusted(document.clone()))
    }

    /// Full pass over a tree that may already carry some margin adjustments.
    pub fn recompute_measured(&mut self, measured: &MeasuredDocument) -> PreviewSnapshot {
        let settings = &self.settings;
        let sections = classify_sections(
            &measured.tree,
            &settings.break_config,
            self.spacing.margins(),
            &measured.rendered_margins,
        );
        let pagination = pack_sections(&sections, &settings.budget, &settings.break_config);
        let indicators = build_indicator_layer(&pagination.break_points, self.indicators_visible);

        self.revision += 1;
        self.sections = sections.clone();

        PreviewSnapshot {
            revision: self.revision,
            computed_at: Utc::now(),
            sections,
            margins: self.spacing.margins().clone(),
            pagination,
            indicators,
        }
    }

    /// Returns the new margin, or `None` if the section is unknown to the latest pass.
    pub fn adjust_spacing(&mut self, section_id: &str, direction: SpacingDirection) -> Option<u32> {
        self.spacing.adjust(section_id, direction, &self.sections)
    }

    /// Returns false if the section had no adjustment.
    pub fn reset_section_spacing(&mut self, section_id: &str) -> bool {
        self.spacing.reset(section_id)
    }

    pub fn reset_spacing(&mut self) {
        self.spacing.reset_all();
    }

    pub fn set_indicators_visible(&mut self, visible: bool) {
        self.indicators_visible = visible;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Session
// ────────────────────────────────────────────────────────────────────────────

/// One live-preview session with its recompute worker.
pub struct PreviewSession {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    surface: Arc<StoredSurface>,
    state: Arc<Mutex<PreviewState>>,
    signal: RecomputeSignal,
    publisher: Arc<watch::Sender<PreviewSnapshot>>,
    snapshots: watch::Receiver<PreviewSnapshot>,
    last_active: Mutex<Instant>,
    worker: JoinHandle<()>,
}

impl PreviewSession {
    /// Computes the first snapshot immediately and spawns the recompute worker.
    /// Must be called from within a tokio runtime.
    pub fn start(document: BlockNode, settings: PaginationSettings) -> Self {
        let id = Uuid::new_v4();
        let debounce = settings.debounce;

        let mut state = PreviewState::new(settings);
        let initial = state.recompute(&document);
        info!(
            session_id = %id,
            sections = initial.sections.len(),
            total_pages = initial.pagination.total_pages,
            "Preview session started"
        );

        let (publisher, snapshots) = watch::channel(initial);
        let publisher = Arc::new(publisher);
        let surface = Arc::new(StoredSurface::new(MeasuredDocument::unadjusted(document)));
        let state = Arc::new(Mutex::new(state));
        let (signal, rx) = recompute_channel();

        let worker = tokio::spawn(run_worker(
            id,
            rx,
            surface.clone(),
            state.clone(),
            publisher.clone(),
            debounce,
        ));

        Self {
            id,
            created_at: Utc::now(),
            surface,
            state,
            signal,
            publisher,
            snapshots,
            last_active: Mutex::new(Instant::now()),
            worker,
        }
    }

    /// Marks the session as in use now.
    pub async fn touch(&self) {
        *self.last_active.lock().await = Instant::now();
    }

    pub async fn idle_for(&self) -> Duration {
        self.last_active.lock().await.elapsed()
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> PreviewSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PreviewSnapshot> {
        self.snapshots.clone()
    }

    pub fn request_recompute(&self) {
        if !self.signal.request() {
            warn!(session_id = %self.id, "Recompute requested after worker shut down");
        }
    }

    /// Stores a freshly measured tree (content edit, resize) and schedules a recompute.
    /// `rendered_margins` lists the adjustments the host had applied when measuring.
    pub async fn replace_document(&self, document: BlockNode, rendered_margins: MarginMap) {
        self.surface
            .replace(MeasuredDocument {
                tree: document,
                rendered_margins,
            })
            .await;
        self.request_recompute();
    }

    /// Applies one spacing step. Unknown sections are ignored and nothing is scheduled.
    pub async fn adjust_spacing(
        &self,
        section_id: &str,
        direction: SpacingDirection,
    ) -> Option<u32> {
        let margin = self.state.lock().await.adjust_spacing(section_id, direction);
        if let Some(margin_px) = margin {
            debug!(session_id = %self.id, section_id, margin_px, "Section margin adjusted");
            self.request_recompute();
        }
        margin
    }

    /// Clears one section's adjustment; schedules a recompute only if one was set.
    pub async fn reset_section_spacing(&self, section_id: &str) -> bool {
        let cleared = self.state.lock().await.reset_section_spacing(section_id);
        if cleared {
            self.request_recompute();
        }
        cleared
    }

    /// Clears every margin adjustment and schedules a recompute.
    pub async fn reset_spacing(&self) {
        self.state.lock().await.reset_spacing();
        self.request_recompute();
    }

    /// Flips indicator visibility. Published at once; sections are untouched.
    pub async fn set_indicators_visible(&self, visible: bool) {
        // Publish under the state lock so a concurrent recompute cannot overwrite it.
        let mut state = self.state.lock().await;
        state.set_indicators_visible(visible);
        self.publisher
            .send_modify(|snapshot| snapshot.indicators.visible = visible);
    }

    /// Scroll target for `page_number` against the latest indicators; `None` is a no-op.
    pub fn go_to_page(&self, page_number: u32) -> Option<ScrollTarget> {
        go_to(page_number, &self.snapshots.borrow().indicators)
    }
}

impl Drop for PreviewSession {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run_worker(
    session_id: Uuid,
    mut rx: mpsc::UnboundedReceiver<RecomputeRequested>,
    surface: Arc<dyn LayoutSurface>,
    state: Arc<Mutex<PreviewState>>,
    publisher: Arc<watch::Sender<PreviewSnapshot>>,
    debounce: Duration,
) {
    while next_debounced(&mut rx, debounce).await {
        let Some(document) = surface.measure().await else {
            warn!(%session_id, "Layout surface returned no tree; skipping recompute");
            continue;
        };
        // Held through publish so a visibility toggle cannot land in between.
        let mut guard = state.lock().await;
        let snapshot = guard.recompute_measured(&document);
        debug!(
            %session_id,
            revision = snapshot.revision,
            total_pages = snapshot.pagination.total_pages,
            total_breaks = snapshot.pagination.total_breaks,
            "Pagination recomputed"
        );
        publisher.send_replace(snapshot);
    }
    debug!(%session_id, "Recompute worker stopped");
}

// ────────────────────────────────────────────────────────────────────────────
// Session store
// ────────────────────────────────────────────────────────────────────────────

/// In-memory session registry. Sessions live for one editing session only.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Arc<PreviewSession>>>>,
}

impl SessionStore {
    pub async fn insert(&self, session: PreviewSession) -> Arc<PreviewSession> {
        let session = Arc::new(session);
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        session
    }

    /// Looks up a session and marks it active.
    pub async fn get(&self, id: Uuid) -> Option<Arc<PreviewSession>> {
        let session = self.sessions.read().await.get(&id).cloned()?;
        session.touch().await;
        Some(session)
    }

    pub async fn remove(&self, id: Uuid) -> Option<Arc<PreviewSession>> {
        self.sessions.write().await.remove(&id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drops every session idle for at least `ttl`. Dropping a session stops its worker.
    pub async fn evict_idle(&self, ttl: Duration) -> Vec<Uuid> {
        let mut sessions = self.sessions.write().await;
        let mut expired = Vec::new();
        for (id, session) in sessions.iter() {
            if session.idle_for().await >= ttl {
                expired.push(*id);
            }
        }
        for id in &expired {
            sessions.remove(id);
        }
        expired
    }
}

/// Periodically evicts sessions idle for `ttl`, checking four times per TTL.
pub fn spawn_idle_sweeper(store: SessionStore, ttl: Duration) -> JoinHandle<()> {
    let period = (ttl / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let expired = store.evict_idle(ttl).await;
            if !expired.is_empty() {
                let remaining = store.len().await;
                info!(
                    evicted = expired.len(),
                    remaining = remaining,
                    "Evicted idle preview sessions"
                );
            }
        }
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::block::fixtures::document;
    use crate::pagination::units::PageBudget;

    /// `(class, height_pt)` sections at the default budget.
    fn document_pt(sections: &[(&str, f32)]) -> BlockNode {
        let budget = PageBudget::default();
        let px: Vec<(&str, f32)> = sections
            .iter()
            .map(|(class, pt)| (*class, budget.to_pixels(*pt)))
            .collect();
        document(&px)
    }

    fn settings() -> PaginationSettings {
        PaginationSettings::default()
    }

    #[test]
    fn test_recompute_is_deterministic() {
        let doc = document_pt(&[("experience", 500.0), ("education", 500.0), ("skills", 500.0)]);
        let mut state = PreviewState::new(settings());
        let first = state.recompute(&doc);
        let second = state.recompute(&doc);

        assert_eq!(first.pagination, second.pagination);
        assert_eq!(first.sections, second.sections);
        assert_eq!(second.revision, first.revision + 1);
        assert_eq!(first.pagination.total_pages, 3);
        assert_eq!(first.indicators.indicators.len(), 2);
    }

    #[test]
    fn test_margin_step_up_and_down_restores_break_points() {
        let doc = document_pt(&[("experience", 424.0), ("education", 400.0), ("skills", 300.0)]);
        let mut state = PreviewState::new(settings());
        let before = state.recompute(&doc);

        assert_eq!(state.adjust_spacing("section-0", SpacingDirection::Increase), Some(10));
        let bumped = state.recompute(&doc);
        assert_ne!(bumped.pagination.break_points, before.pagination.break_points);

        assert_eq!(state.adjust_spacing("section-0", SpacingDirection::Decrease), Some(0));
        let restored = state.recompute(&doc);
        assert_eq!(restored.pagination, before.pagination);
        assert!(restored.margins.is_empty());
    }

    #[test]
    fn test_adjusting_stale_section_is_ignored() {
        let mut state = PreviewState::new(settings());
        state.recompute(&document_pt(&[("experience", 100.0)]));
        assert_eq!(state.adjust_spacing("section-7", SpacingDirection::Increase), None);
    }

    #[test]
    fn test_reset_section_spacing_only_clears_that_section() {
        let mut state = PreviewState::new(settings());
        state.recompute(&document_pt(&[("experience", 100.0), ("skills", 100.0)]));
        state.adjust_spacing("section-0", SpacingDirection::Increase);
        state.adjust_spacing("section-1", SpacingDirection::Increase);

        assert!(state.reset_section_spacing("section-0"));
        assert!(!state.reset_section_spacing("section-0"));

        let snapshot = state.recompute(&document_pt(&[("experience", 100.0), ("skills", 100.0)]));
        assert_eq!(snapshot.sections[0].margin_adjustment_px, 0);
        assert_eq!(snapshot.sections[1].margin_adjustment_px, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_publishes_initial_snapshot() {
        let session = PreviewSession::start(
            document_pt(&[("experience", 500.0), ("skills", 500.0)]),
            settings(),
        );
        let snapshot = session.snapshot();
        assert_eq!(snapshot.revision, 1);
        assert_eq!(snapshot.pagination.total_pages, 2);
        assert_eq!(session.go_to_page(1), Some(ScrollTarget::DocumentTop));
        assert!(matches!(
            session.go_to_page(2),
            Some(ScrollTarget::Indicator { page_number: 2, .. })
        ));
        assert_eq!(session.go_to_page(3), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_signals_recomputes_once_after_debounce() {
        let session = PreviewSession::start(document_pt(&[("experience", 100.0)]), settings());
        let mut rx = session.subscribe();

        for _ in 0..4 {
            session.request_recompute();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!rx.has_changed().unwrap(), "still inside the debounce window");

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().revision, 2);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!rx.has_changed().unwrap(), "burst collapsed into one recompute");
    }

    #[tokio::test(start_paused = true)]
    async fn test_spacing_adjustment_triggers_recompute() {
        let session = PreviewSession::start(
            document_pt(&[("experience", 424.0), ("education", 400.0)]),
            settings(),
        );
        assert_eq!(session.snapshot().pagination.total_pages, 1);
        let mut rx = session.subscribe();

        let margin = session
            .adjust_spacing("section-0", SpacingDirection::Increase)
            .await;
        assert_eq!(margin, Some(10));

        rx.changed().await.unwrap();
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.pagination.total_pages, 2);
        assert_eq!(snapshot.sections[0].margin_adjustment_px, 10);
        assert_eq!(snapshot.margins.get("section-0"), Some(&10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_section_adjustment_schedules_nothing() {
        let session = PreviewSession::start(document_pt(&[("experience", 100.0)]), settings());
        let rx = session.subscribe();
        assert_eq!(
            session.adjust_spacing("nope", SpacingDirection::Increase).await,
            None
        );
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replaced_document_is_repaginated() {
        let session = PreviewSession::start(document_pt(&[("experience", 100.0)]), settings());
        let mut rx = session.subscribe();

        session
            .replace_document(
                document_pt(&[("experience", 600.0), ("education", 600.0)]),
                MarginMap::new(),
            )
            .await;
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().pagination.total_pages, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remeasured_tree_with_rendered_margin_keeps_break_points() {
        let doc = document(&[("experience", 1000.0), ("education", 1000.0), ("skills", 1000.0)]);
        let session = PreviewSession::start(doc.clone(), settings());
        let mut rx = session.subscribe();

        session
            .adjust_spacing("section-0", SpacingDirection::Increase)
            .await;
        rx.changed().await.unwrap();
        let adjusted = rx.borrow_and_update().pagination.break_points.clone();
        let offsets: Vec<f32> = adjusted.iter().map(|bp| bp.y_offset_px).collect();
        assert_eq!(offsets, vec![1010.0, 2010.0]);

        // The host re-measures after rendering the +10px margin and reports it.
        let mut rendered_tree = doc;
        for later in rendered_tree.children.iter_mut().skip(1) {
            later.offset_top_px += 10.0;
        }
        let mut rendered = MarginMap::new();
        rendered.insert("section-0".to_string(), 10);
        session.replace_document(rendered_tree, rendered).await;

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().pagination.break_points, adjusted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_visibility_toggle_survives_concurrent_recomputes() {
        let fast = PaginationSettings {
            debounce: Duration::from_millis(1),
            ..PaginationSettings::default()
        };
        let session = PreviewSession::start(
            document_pt(&[("experience", 500.0), ("skills", 500.0)]),
            fast,
        );

        for i in 0..200 {
            session.request_recompute();
            session.set_indicators_visible(i % 2 == 0).await;
            tokio::task::yield_now().await;
        }
        session.set_indicators_visible(false).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!session.state.lock().await.indicators_visible);
        assert!(
            !session.snapshot().indicators.visible,
            "published snapshot must match the session state"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_indicator_toggle_publishes_without_repacking() {
        let session = PreviewSession::start(
            document_pt(&[("experience", 500.0), ("skills", 500.0)]),
            settings(),
        );
        session.set_indicators_visible(false).await;

        let snapshot = session.snapshot();
        assert!(!snapshot.indicators.visible);
        assert_eq!(snapshot.revision, 1);
        assert_eq!(snapshot.indicators.indicators.len(), 1);

        // Visibility survives the next recompute.
        let mut rx = session.subscribe();
        session.request_recompute();
        rx.changed().await.unwrap();
        assert!(!rx.borrow_and_update().indicators.visible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_store_round_trip() {
        let store = SessionStore::default();
        let session = store
            .insert(PreviewSession::start(document_pt(&[("experience", 100.0)]), settings()))
            .await;

        assert_eq!(store.len().await, 1);
        assert!(store.get(session.id).await.is_some());
        assert!(store.remove(session.id).await.is_some());
        assert!(store.get(session.id).await.is_none());
        assert!(store.remove(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sessions_are_evicted_after_ttl() {
        let ttl = Duration::from_secs(30);
        let store = SessionStore::default();
        let active = store
            .insert(PreviewSession::start(document_pt(&[("experience", 100.0)]), settings()))
            .await;
        let idle = store
            .insert(PreviewSession::start(document_pt(&[("skills", 100.0)]), settings()))
            .await;

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(store.get(active.id).await.is_some());
        assert!(store.evict_idle(ttl).await.is_empty());

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(store.evict_idle(ttl).await, vec![idle.id]);
        assert!(store.get(active.id).await.is_some(), "touched 15s ago");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_abandoned_sessions() {
        let store = SessionStore::default();
        store
            .insert(PreviewSession::start(document_pt(&[("experience", 100.0)]), settings()))
            .await;

        let sweeper = spawn_idle_sweeper(store.clone(), Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(45)).await;

        assert_eq!(store.len().await, 0);
        sweeper.abort();
    }
}
