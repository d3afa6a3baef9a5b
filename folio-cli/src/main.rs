use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event;
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use folio_core::{Command, SessionStore, ViewSnapshot, Viewer, ViewerConfig, ViewerEvent};
use folio_render::PdfiumProvider;
use folio_tty::{
    draw_empty_state, draw_tab_bar, invert_bitmap, plan_slice, slice_page, write_status_line,
    CellGeometry, DrawParams, EventMapper, KittyCanvas, UiEvent,
};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "folio", version, about = "tabbed terminal PDF viewer for kitty")]
struct Args {
    /// Page to open the active document on (1-based)
    #[arg(short = 'p', long = "page")]
    page: Option<usize>,

    /// Paths to PDF files to open; with none given, the previous session is
    /// restored
    files: Vec<PathBuf>,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("io", "folio", "folio")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let config = ViewerConfig::load(&project_dirs.config_dir().join("folio.toml"));
    let store = SessionStore::new(project_dirs.data_local_dir().join("last-session.json"));
    let provider = PdfiumProvider::new()?;
    let mut viewer = Viewer::new(config.clone());

    if args.files.is_empty() {
        if config.restore_last_session {
            if let Some(record) = store.load() {
                match viewer.restore(&provider, &record) {
                    Ok(_) => info!(path = ?record.path, "restored previous session"),
                    Err(err) => warn!(?err, "failed to restore previous session"),
                }
            }
        }
        if viewer.registry().is_empty() {
            return Err(anyhow!("no files given and no previous session to restore"));
        }
    } else {
        for path in &args.files {
            if let Err(err) = viewer.open(&provider, path) {
                warn!(?err, ?path, "failed to open document");
                eprintln!("folio: {err}");
            }
        }
        if viewer.registry().is_empty() {
            return Err(anyhow!("none of the given files could be opened"));
        }
    }

    if let Some(page) = args.page {
        viewer.apply(Command::GotoPage {
            page: page.saturating_sub(1),
        });
    }

    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide)?;
    let mut canvas = KittyCanvas::new(stdout);
    let mut event_mapper = EventMapper::new(config.scroll_step);
    let mut dark_mode = false;
    let mut last_error: Option<String> = None;
    let mut dirty = true;

    loop {
        for event in viewer.drain_events() {
            match event {
                ViewerEvent::RenderFailed { message, .. } => last_error = Some(message),
                ViewerEvent::FrameReady(_) => last_error = None,
                _ => {}
            }
            dirty = true;
        }

        if dirty {
            let pending = event_mapper.pending_input();
            redraw(
                &mut canvas,
                &viewer,
                pending.as_deref(),
                last_error.as_deref(),
                dark_mode,
            )?;
            dirty = false;
        }

        if event::poll(Duration::from_millis(100))? {
            let ev = event::read()?;
            match event_mapper.map_event(ev) {
                UiEvent::Command(command) => {
                    // A resize redraws even when nothing is open.
                    if matches!(command, Command::Resized { .. }) {
                        dirty = true;
                    }
                    viewer.apply(command);
                }
                UiEvent::ToggleDark => {
                    dark_mode = !dark_mode;
                    dirty = true;
                }
                UiEvent::Quit => break,
                UiEvent::None => {
                    // Keeps the status line in step with a count or page
                    // entry being typed without re-sending the page image.
                    let pending = event_mapper.pending_input();
                    let snapshot = viewer.snapshot();
                    if let Some(status) = combine_status(
                        combine_status(document_status(&snapshot), last_error.as_deref()),
                        pending.as_deref(),
                    ) {
                        draw_status_line(&mut canvas, &status)?;
                    }
                }
            }
        }
    }

    canvas.clear_all()?;

    match viewer.last_session_record() {
        Some(record) => {
            if let Err(err) = store.save(&record) {
                warn!(?err, "failed to persist last session");
            }
        }
        None => store.clear(),
    }
    Ok(())
}

fn redraw(
    canvas: &mut KittyCanvas<io::Stdout>,
    viewer: &Viewer,
    pending_input: Option<&str>,
    last_error: Option<&str>,
    dark_mode: bool,
) -> Result<()> {
    let window = terminal::window_size()?;
    let columns = window.columns.max(1);
    let rows = window.rows.max(1);
    let cells = CellGeometry::from_window(columns, rows, window.width, window.height);

    // Row zero carries the tab bar, the last row the status line.
    let image_rows = u32::from(rows.saturating_sub(2)).max(1);

    let snapshot = viewer.snapshot();

    canvas.begin_sync_update()?;
    canvas.clear_all()?;
    draw_tab_bar(canvas.writer(), &snapshot.tabs, columns)?;

    if let Some(frame) = viewer.frame() {
        let margin_cols = u32::from(columns).min(2);
        let margin_rows = image_rows.min(2);
        let available_cols = u32::from(columns).saturating_sub(margin_cols).max(1);
        let available_rows = image_rows.saturating_sub(margin_rows).max(1);

        let plan = plan_slice(
            frame.bitmap.width,
            frame.bitmap.height,
            available_cols,
            available_rows,
            cells,
        );
        let mut slice = slice_page(&frame.bitmap, frame.scroll_fraction, plan.visible_rows);
        if dark_mode {
            invert_bitmap(&mut slice);
        }

        let start_col = (u32::from(columns).saturating_sub(plan.draw_cols)) / 2;
        let start_row = 1 + image_rows.saturating_sub(plan.draw_rows) / 2;
        {
            let mut writer = canvas.writer();
            crossterm::execute!(
                &mut writer,
                cursor::MoveTo(start_col as u16, start_row as u16)
            )?;
        }
        canvas.draw(&slice, DrawParams::clamped(plan.draw_cols, plan.draw_rows))?;

        if let Some(session) = viewer.registry().active() {
            if let Err(err) = session.prefetch_neighbors(2) {
                warn!(
                    ?err,
                    page = session.current_page(),
                    "failed to prefetch neighboring pages"
                );
            }
        }
    } else {
        draw_empty_state(canvas.writer(), columns, rows)?;
    }

    if let Some(status) = combine_status(
        combine_status(document_status(&snapshot), last_error),
        pending_input,
    ) {
        draw_status_line(canvas, &status)?;
    }

    canvas.end_sync_update()?;
    Ok(())
}

fn document_status(snapshot: &ViewSnapshot) -> Option<String> {
    snapshot.active.as_ref().map(|active| {
        if active.page_count == 0 {
            format!("{} | no pages | {}%", active.title, active.zoom_percent)
        } else {
            format!(
                "{} | page {}/{} | {}%",
                active.title, active.page_number, active.page_count, active.zoom_percent
            )
        }
    })
}

fn combine_status(base: Option<String>, suffix: Option<&str>) -> Option<String> {
    match (base, suffix.filter(|s| !s.is_empty())) {
        (Some(mut base), Some(suffix)) => {
            base.push_str(" | ");
            base.push_str(suffix);
            Some(base)
        }
        (Some(base), None) => Some(base),
        (None, Some(suffix)) => Some(suffix.to_string()),
        (None, None) => None,
    }
}

fn draw_status_line(canvas: &mut KittyCanvas<io::Stdout>, status: &str) -> Result<()> {
    let window = terminal::window_size()?;
    let status_row = window.rows.saturating_sub(1);
    let mut writer = canvas.writer();
    crossterm::execute!(
        &mut writer,
        cursor::MoveTo(0, status_row),
        Clear(ClearType::CurrentLine)
    )?;
    write_status_line(&mut writer, status)?;
    Ok(())
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "folio.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Raw mode owns the terminal, so logs go to the file only.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
