use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

mod config;
mod error;
mod persist;

pub use config::ViewerConfig;
pub use error::{OpenError, PersistError, RenderError};
pub use persist::{LastSessionRecord, SessionStore};

pub type SessionId = Uuid;

/// Smallest zoom a session will accept; keeps renders from degenerating to
/// zero-size bitmaps.
pub const MIN_ZOOM: f32 = 0.2;

static SESSION_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("f1d6a7c2-4e8b-5093-8c3d-7b92e5a0d614").expect("valid namespace UUID")
});

/// Resolves a user-supplied path to the canonical form used as file identity.
/// Falls back to an absolute join when the file cannot be resolved, so the
/// same spelling still maps to the same identity.
pub fn canonical_identity(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf())
}

pub fn session_id_for_path(path: &Path) -> SessionId {
    identity_id(&canonical_identity(path))
}

fn identity_id(identity: &Path) -> SessionId {
    let rendered = identity.to_string_lossy();
    Uuid::new_v5(&SESSION_NAMESPACE, rendered.as_bytes())
}

#[derive(Debug, Clone, Copy)]
pub struct RenderRequest {
    pub page_index: usize,
    pub zoom: f32,
}

/// RGBA8 raster of one page at one zoom.
#[derive(Debug, Clone, PartialEq)]
pub struct PageBitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

pub trait DocumentBackend: Send + Sync {
    fn page_count(&self) -> usize;
    fn render_page(&self, request: RenderRequest) -> Result<PageBitmap, RenderError>;
}

pub trait DocumentProvider: Send + Sync {
    fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>, OpenError>;
}

/// Stateless rasterization seam: page intrinsic size is scaled by `zoom`
/// before rasterizing, so zooming in gains real resolution instead of
/// blurring a fixed-DPI raster.
pub fn rasterize_page(
    backend: &dyn DocumentBackend,
    page_index: usize,
    zoom: f32,
) -> Result<PageBitmap, RenderError> {
    let count = backend.page_count();
    if page_index >= count {
        return Err(RenderError::PageOutOfRange {
            page: page_index,
            count,
        });
    }
    backend.render_page(RenderRequest {
        page_index,
        zoom: zoom.max(MIN_ZOOM),
    })
}

/// Tab accent color, assigned at session creation from a fixed palette.
/// Repetition is expected once more tabs are open than palette entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagColor {
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Violet,
}

impl TagColor {
    pub const PALETTE: [TagColor; 6] = [
        TagColor::Red,
        TagColor::Orange,
        TagColor::Yellow,
        TagColor::Green,
        TagColor::Blue,
        TagColor::Violet,
    ];
}

const BITMAP_CACHE_CAPACITY: usize = 10;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
struct BitmapKey {
    page_index: usize,
    zoom_milli: u32,
}

impl BitmapKey {
    fn new(page_index: usize, zoom: f32) -> Self {
        Self {
            page_index,
            zoom_milli: quantize_zoom(zoom),
        }
    }

    fn distance(&self, reference_page: usize) -> usize {
        self.page_index.abs_diff(reference_page)
    }
}

fn quantize_zoom(zoom: f32) -> u32 {
    let scaled = (zoom * 1000.0).round();
    if !scaled.is_finite() || scaled <= 0.0 {
        1
    } else if scaled > u32::MAX as f32 {
        u32::MAX
    } else {
        scaled as u32
    }
}

/// Viewing state for one open document. All fields are private; every
/// mutation goes through an operation that preserves the invariants
/// `current_page < page_count` (when non-empty), `zoom >= MIN_ZOOM` and
/// `scroll_fraction` in `[0, 1]`.
pub struct DocumentSession {
    id: SessionId,
    path: PathBuf,
    backend: Arc<dyn DocumentBackend>,
    page_count: usize,
    current_page: usize,
    zoom: f32,
    scroll_fraction: f32,
    tag: TagColor,
    bitmap_cache: Mutex<HashMap<BitmapKey, PageBitmap>>,
}

impl DocumentSession {
    pub fn new(
        id: SessionId,
        path: PathBuf,
        backend: Arc<dyn DocumentBackend>,
        tag: TagColor,
        default_zoom: f32,
    ) -> Self {
        let page_count = backend.page_count();
        Self {
            id,
            path,
            backend,
            page_count,
            current_page: 0,
            zoom: if default_zoom.is_finite() {
                default_zoom.max(MIN_ZOOM)
            } else {
                MIN_ZOOM
            },
            scroll_fraction: 0.0,
            tag,
            bitmap_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn title(&self) -> String {
        self.path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("<unknown>")
            .to_string()
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn scroll_fraction(&self) -> f32 {
        self.scroll_fraction
    }

    pub fn tag(&self) -> TagColor {
        self.tag
    }

    pub fn next_page(&mut self, count: usize) -> bool {
        let last = self.page_count.saturating_sub(1);
        self.move_to(self.current_page.saturating_add(count).min(last))
    }

    pub fn prev_page(&mut self, count: usize) -> bool {
        self.move_to(self.current_page.saturating_sub(count))
    }

    /// Out-of-range targets are swallowed, not clamped: page numbers are
    /// user-entered and unreliable input.
    pub fn go_to_page(&mut self, page: usize) -> bool {
        if page >= self.page_count {
            return false;
        }
        self.move_to(page)
    }

    fn move_to(&mut self, page: usize) -> bool {
        if self.page_count == 0 || page == self.current_page {
            return false;
        }
        self.current_page = page;
        // Explicit navigation lands at the top of the new page.
        self.scroll_fraction = 0.0;
        true
    }

    pub fn zoom_in(&mut self, step: f32) -> bool {
        self.set_zoom(self.zoom + step)
    }

    pub fn zoom_out(&mut self, step: f32) -> bool {
        self.set_zoom(self.zoom - step)
    }

    /// Floor-clamped at [`MIN_ZOOM`]; there is no ceiling.
    pub fn set_zoom(&mut self, zoom: f32) -> bool {
        if !zoom.is_finite() {
            return false;
        }
        let next = zoom.max(MIN_ZOOM);
        if next == self.zoom {
            return false;
        }
        self.zoom = next;
        true
    }

    pub fn set_scroll_fraction(&mut self, fraction: f32) -> bool {
        if !fraction.is_finite() {
            return false;
        }
        let next = fraction.clamp(0.0, 1.0);
        if next == self.scroll_fraction {
            return false;
        }
        self.scroll_fraction = next;
        true
    }

    /// Rasterizes the current page at the current zoom, serving repeats from
    /// the per-session cache.
    pub fn render(&self) -> Result<PageBitmap, RenderError> {
        self.render_cached(self.current_page, self.zoom)
    }

    /// Warms the cache with pages adjacent to the current one so page turns
    /// hit the cache. Errors are reported but do not stop the sweep.
    pub fn prefetch_neighbors(&self, range: usize) -> Result<(), RenderError> {
        let mut last_error = None;
        for offset in 1..=range {
            if let Some(prev) = self.current_page.checked_sub(offset) {
                if let Err(err) = self.render_cached(prev, self.zoom) {
                    last_error = Some(err);
                }
            }
            let next = self.current_page + offset;
            if next < self.page_count {
                if let Err(err) = self.render_cached(next, self.zoom) {
                    last_error = Some(err);
                }
            }
        }
        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn render_cached(&self, page_index: usize, zoom: f32) -> Result<PageBitmap, RenderError> {
        let key = BitmapKey::new(page_index, zoom);
        if let Some(hit) = self.bitmap_cache.lock().get(&key).cloned() {
            return Ok(hit);
        }
        let bitmap = rasterize_page(self.backend.as_ref(), page_index, zoom)?;
        self.store_cached(key, &bitmap);
        Ok(bitmap)
    }

    fn store_cached(&self, key: BitmapKey, bitmap: &PageBitmap) {
        let mut cache = self.bitmap_cache.lock();
        cache.insert(key, bitmap.clone());

        if cache.len() > BITMAP_CACHE_CAPACITY {
            // Evict the entries farthest from the page being read.
            let reference = self.current_page;
            let mut keys: Vec<_> = cache.keys().copied().collect();
            keys.sort_by_key(|k| k.distance(reference));
            for stale in keys.into_iter().skip(BITMAP_CACHE_CAPACITY) {
                cache.remove(&stale);
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OpenOutcome {
    pub id: SessionId,
    pub created: bool,
}

/// Owns the open sessions, keyed by the identity of the file behind them.
/// Re-opening a file that is already open activates the existing session
/// instead of creating a second one (and a second backend handle).
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, DocumentSession>,
    order: Vec<SessionId>,
    active: Option<SessionId>,
    created_count: usize,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip(self, provider))]
    pub fn open_or_activate<P: DocumentProvider>(
        &mut self,
        provider: &P,
        path: &Path,
        default_zoom: f32,
    ) -> Result<OpenOutcome, OpenError> {
        let identity = canonical_identity(path);
        let id = identity_id(&identity);
        if self.sessions.contains_key(&id) {
            debug!(path = %identity.display(), "file already open; activating existing session");
            self.active = Some(id);
            return Ok(OpenOutcome { id, created: false });
        }

        let backend = provider.open(&identity)?;
        let tag = self.next_tag();
        let session = DocumentSession::new(id, identity, backend, tag, default_zoom);
        self.sessions.insert(id, session);
        self.order.push(id);
        self.active = Some(id);
        self.created_count += 1;
        Ok(OpenOutcome { id, created: true })
    }

    pub fn activate(&mut self, id: SessionId) -> bool {
        if !self.sessions.contains_key(&id) {
            warn!(%id, "ignoring activation of unknown session");
            return false;
        }
        if self.active == Some(id) {
            return false;
        }
        self.active = Some(id);
        true
    }

    pub fn activate_at(&mut self, index: usize) -> bool {
        match self.order.get(index).copied() {
            Some(id) => self.activate(id),
            None => false,
        }
    }

    pub fn next_tab(&mut self) -> bool {
        if self.order.is_empty() {
            return false;
        }
        let next = match self.active.and_then(|id| self.position(id)) {
            Some(pos) => self.order[(pos + 1) % self.order.len()],
            None => self.order[0],
        };
        self.activate(next)
    }

    pub fn prev_tab(&mut self) -> bool {
        if self.order.is_empty() {
            return false;
        }
        let next = match self.active.and_then(|id| self.position(id)) {
            Some(pos) => self.order[(pos + self.order.len() - 1) % self.order.len()],
            None => self.order[self.order.len() - 1],
        };
        self.activate(next)
    }

    /// Dropping the session releases its backend handle; the active slot is
    /// cleared when the active session closes, even while others stay open.
    pub fn close(&mut self, id: SessionId) -> bool {
        if self.sessions.remove(&id).is_none() {
            warn!(%id, "ignoring close of unknown session");
            return false;
        }
        self.order.retain(|&o| o != id);
        if self.active == Some(id) {
            self.active = None;
        }
        true
    }

    fn position(&self, id: SessionId) -> Option<usize> {
        self.order.iter().position(|&o| o == id)
    }

    /// Cycles the palette by sessions-ever-created, skipping ahead to an
    /// unused color while one exists.
    fn next_tag(&self) -> TagColor {
        let palette = TagColor::PALETTE;
        let start = self.created_count % palette.len();
        for offset in 0..palette.len() {
            let candidate = palette[(start + offset) % palette.len()];
            if !self.sessions.values().any(|s| s.tag() == candidate) {
                return candidate;
            }
        }
        palette[start]
    }

    pub fn active_id(&self) -> Option<SessionId> {
        self.active
    }

    pub fn active(&self) -> Option<&DocumentSession> {
        self.active.and_then(|id| self.sessions.get(&id))
    }

    pub fn active_mut(&mut self) -> Option<&mut DocumentSession> {
        let id = self.active?;
        self.sessions.get_mut(&id)
    }

    pub fn get(&self, id: SessionId) -> Option<&DocumentSession> {
        self.sessions.get(&id)
    }

    /// Sessions in tab order.
    pub fn ordered(&self) -> impl Iterator<Item = &DocumentSession> {
        self.order.iter().filter_map(|id| self.sessions.get(id))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// What the presentation layer displays for the active session: the page
/// raster plus the scroll position to restore once the new content is laid
/// out.
#[derive(Debug, Clone)]
pub struct Frame {
    pub session: SessionId,
    pub page_index: usize,
    pub bitmap: PageBitmap,
    pub scroll_fraction: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameKey {
    session: SessionId,
    page_index: usize,
    zoom_milli: u32,
}

impl FrameKey {
    fn of(session: &DocumentSession) -> Self {
        Self {
            session: session.id(),
            page_index: session.current_page(),
            zoom_milli: quantize_zoom(session.zoom()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameUpdate {
    /// The page was rasterized and a new frame published.
    Rendered,
    /// Only the scroll position changed; the frame was republished without
    /// touching the backend.
    Redisplayed,
    /// The session has no pages; nothing to publish.
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollOutcome {
    Unchanged,
    Scrolled,
    PageTurned,
}

/// Directional scroll with the page-boundary transition: scrolling down at
/// the bottom turns to the next page (landing at its top), scrolling up at
/// the top turns to the previous page and lands at its bottom. At the first
/// or last page the motion saturates.
pub fn scroll_with_page_turn(session: &mut DocumentSession, delta: f32) -> ScrollOutcome {
    if !delta.is_finite() || delta == 0.0 || session.page_count() == 0 {
        return ScrollOutcome::Unchanged;
    }
    if delta > 0.0 {
        if session.scroll_fraction() >= 1.0
            && session.current_page() + 1 < session.page_count()
        {
            session.next_page(1);
            return ScrollOutcome::PageTurned;
        }
    } else if session.scroll_fraction() <= 0.0 && session.current_page() > 0 {
        session.prev_page(1);
        session.set_scroll_fraction(1.0);
        return ScrollOutcome::PageTurned;
    }
    if session.set_scroll_fraction(session.scroll_fraction() + delta) {
        ScrollOutcome::Scrolled
    } else {
        ScrollOutcome::Unchanged
    }
}

/// Decides, per state change, whether the page must be re-rasterized or the
/// existing frame merely republished. Keyed by (session, page, quantized
/// zoom): scroll moves and container resizes leave the key unchanged.
#[derive(Default)]
pub struct ViewportController {
    frame: Option<Frame>,
    key: Option<FrameKey>,
}

impl ViewportController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    /// Brings the published frame in line with the session. On a render
    /// failure the previous frame is retained untouched.
    pub fn refresh(&mut self, session: &DocumentSession) -> Result<FrameUpdate, RenderError> {
        if session.page_count() == 0 {
            self.frame = None;
            self.key = None;
            return Ok(FrameUpdate::Empty);
        }
        let key = FrameKey::of(session);
        if self.key == Some(key) {
            if let Some(frame) = self.frame.as_mut() {
                frame.scroll_fraction = session.scroll_fraction();
                return Ok(FrameUpdate::Redisplayed);
            }
        }
        let bitmap = session.render()?;
        self.frame = Some(Frame {
            session: session.id(),
            page_index: session.current_page(),
            bitmap,
            scroll_fraction: session.scroll_fraction(),
        });
        self.key = Some(key);
        Ok(FrameUpdate::Rendered)
    }

    pub fn clear(&mut self) {
        self.frame = None;
        self.key = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    CloseActive,
    Close { id: SessionId },
    Activate { id: SessionId },
    ActivateAt { index: usize },
    NextTab,
    PrevTab,
    NextPage { count: usize },
    PrevPage { count: usize },
    GotoPage { page: usize },
    ZoomIn,
    ZoomOut,
    SetZoom { zoom: f32 },
    ResetZoom,
    ScrollBy { delta: f32 },
    SetScroll { fraction: f32 },
    Resized { width: u16, height: u16 },
}

#[derive(Debug, Clone)]
pub enum ViewerEvent {
    SessionOpened(SessionId),
    SessionClosed(SessionId),
    ActiveChanged(SessionId),
    /// The published frame changed (new raster or new scroll position).
    FrameReady(SessionId),
    /// No session is active; the presentation should show its empty state.
    ViewEmptied,
    RenderFailed { session: SessionId, message: String },
}

#[derive(Debug, Clone)]
pub struct TabLabel {
    pub id: SessionId,
    pub title: String,
    pub tag: TagColor,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct ActiveStatus {
    pub id: SessionId,
    pub title: String,
    /// 1-based for display; 0 for an empty document.
    pub page_number: usize,
    pub page_count: usize,
    pub zoom_percent: u32,
    pub scroll_fraction: f32,
}

#[derive(Debug, Clone)]
pub struct ViewSnapshot {
    pub tabs: Vec<TabLabel>,
    pub active: Option<ActiveStatus>,
}

/// Single entry point the presentation layer drives: commands in, events and
/// a snapshot out. Owns the registry and the viewport pipeline.
pub struct Viewer {
    registry: SessionRegistry,
    viewport: ViewportController,
    config: ViewerConfig,
    events: Vec<ViewerEvent>,
}

impl Viewer {
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            registry: SessionRegistry::new(),
            viewport: ViewportController::new(),
            config,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn frame(&self) -> Option<&Frame> {
        self.viewport.frame()
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        let active_id = self.registry.active_id();
        let tabs = self
            .registry
            .ordered()
            .map(|session| TabLabel {
                id: session.id(),
                title: session.title(),
                tag: session.tag(),
                active: Some(session.id()) == active_id,
            })
            .collect();
        let active = self.registry.active().map(|session| ActiveStatus {
            id: session.id(),
            title: session.title(),
            page_number: if session.page_count() == 0 {
                0
            } else {
                session.current_page() + 1
            },
            page_count: session.page_count(),
            zoom_percent: (session.zoom() * 100.0).round() as u32,
            scroll_fraction: session.scroll_fraction(),
        });
        ViewSnapshot { tabs, active }
    }

    pub fn drain_events(&mut self) -> Vec<ViewerEvent> {
        std::mem::take(&mut self.events)
    }

    #[instrument(skip(self, provider))]
    pub fn open<P: DocumentProvider>(
        &mut self,
        provider: &P,
        path: &Path,
    ) -> Result<SessionId, OpenError> {
        let previous = self.registry.active_id();
        let outcome =
            self.registry
                .open_or_activate(provider, path, self.config.default_zoom)?;
        if outcome.created {
            self.events.push(ViewerEvent::SessionOpened(outcome.id));
        }
        if previous != Some(outcome.id) {
            self.events.push(ViewerEvent::ActiveChanged(outcome.id));
        }
        self.refresh_active();
        Ok(outcome.id)
    }

    /// Reopens a restored record, then replays its page and zoom through the
    /// session's own operations so the usual invariants apply (a stale page
    /// index is swallowed, the zoom floor holds).
    pub fn restore<P: DocumentProvider>(
        &mut self,
        provider: &P,
        record: &LastSessionRecord,
    ) -> Result<SessionId, OpenError> {
        let id = self.open(provider, &record.path)?;
        self.apply(Command::SetZoom { zoom: record.zoom });
        self.apply(Command::GotoPage {
            page: record.page_index,
        });
        Ok(id)
    }

    /// Snapshot of the active session for persistence at shutdown.
    pub fn last_session_record(&self) -> Option<LastSessionRecord> {
        self.registry.active().map(|session| LastSessionRecord {
            path: session.path().to_path_buf(),
            page_index: session.current_page(),
            zoom: session.zoom(),
        })
    }

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::CloseActive => {
                if let Some(id) = self.registry.active_id() {
                    self.close_session(id);
                }
            }
            Command::Close { id } => self.close_session(id),
            Command::Activate { id } => {
                let changed = self.registry.activate(id);
                self.after_activation(changed);
            }
            Command::ActivateAt { index } => {
                let changed = self.registry.activate_at(index);
                self.after_activation(changed);
            }
            Command::NextTab => {
                let changed = self.registry.next_tab();
                self.after_activation(changed);
            }
            Command::PrevTab => {
                let changed = self.registry.prev_tab();
                self.after_activation(changed);
            }
            Command::NextPage { count } => self.mutate_active(|s| s.next_page(count)),
            Command::PrevPage { count } => self.mutate_active(|s| s.prev_page(count)),
            Command::GotoPage { page } => self.mutate_active(|s| s.go_to_page(page)),
            Command::ZoomIn => {
                let step = self.config.zoom_step;
                self.mutate_active(|s| s.zoom_in(step));
            }
            Command::ZoomOut => {
                let step = self.config.zoom_step;
                self.mutate_active(|s| s.zoom_out(step));
            }
            Command::SetZoom { zoom } => self.mutate_active(|s| s.set_zoom(zoom)),
            Command::ResetZoom => {
                let zoom = self.config.default_zoom;
                self.mutate_active(|s| s.set_zoom(zoom));
            }
            Command::ScrollBy { delta } => {
                if let Some(session) = self.registry.active_mut() {
                    if scroll_with_page_turn(session, delta) != ScrollOutcome::Unchanged {
                        self.refresh_active();
                    }
                }
            }
            // Absolute positioning never turns the page.
            Command::SetScroll { fraction } => {
                self.mutate_active(|s| s.set_scroll_fraction(fraction))
            }
            Command::Resized { width, height } => {
                debug!(width, height, "container resized");
                // Zoom is left alone; an active document is republished so
                // the presentation can lay the frame out for the new size.
                if self.registry.active().is_some() {
                    self.refresh_active();
                }
            }
        }
    }

    fn close_session(&mut self, id: SessionId) {
        let was_active = self.registry.active_id() == Some(id);
        if !self.registry.close(id) {
            return;
        }
        self.events.push(ViewerEvent::SessionClosed(id));
        if was_active {
            self.viewport.clear();
            self.events.push(ViewerEvent::ViewEmptied);
        }
    }

    fn after_activation(&mut self, changed: bool) {
        if !changed {
            return;
        }
        if let Some(id) = self.registry.active_id() {
            self.events.push(ViewerEvent::ActiveChanged(id));
        }
        self.refresh_active();
    }

    fn mutate_active(&mut self, f: impl FnOnce(&mut DocumentSession) -> bool) {
        let Some(session) = self.registry.active_mut() else {
            return;
        };
        if f(session) {
            self.refresh_active();
        }
    }

    fn refresh_active(&mut self) {
        let Some(session) = self.registry.active() else {
            self.viewport.clear();
            return;
        };
        let id = session.id();
        match self.viewport.refresh(session) {
            Ok(_) => self.events.push(ViewerEvent::FrameReady(id)),
            Err(err) => {
                warn!(session = %id, error = %err, "render failed; keeping previous frame");
                self.events.push(ViewerEvent::RenderFailed {
                    session: id,
                    message: err.to_string(),
                });
            }
        }
    }
}
