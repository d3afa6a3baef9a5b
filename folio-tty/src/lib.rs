use std::io::{self, Write};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyModifiers},
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use folio_core::{Command, PageBitmap, TabLabel, TagColor};
use png::{BitDepth, ColorType, Encoder};

pub struct KittyCanvas<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
}

pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

impl<W: Write> KittyCanvas<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn draw(&mut self, bitmap: &PageBitmap, params: DrawParams) -> Result<()> {
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, bitmap.width, bitmap.height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&bitmap.pixels)?;
        writer.finish()?;

        let encoded = BASE64.encode(&buffer);
        let mut chunks = encoded.as_bytes().chunks(4096).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = chunks.peek().is_some();
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p={},c={},r={},s={},v={},z=-1,m={}",
                    self.image_id,
                    self.placement_id,
                    params.columns,
                    params.rows,
                    bitmap.width,
                    bitmap.height,
                    if more { 1 } else { 0 }
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", if more { 1 } else { 0 })?;
            }
            if !chunk.is_empty() {
                self.writer.write_all(b";")?;
                self.writer.write_all(chunk)?;
            }
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Ends the synchronized update so the terminal presents all buffered
    /// changes at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Clears the screen and removes any image placements.
    pub fn clear_all(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,q=2\u{1b}\\")?;
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventKind, KeyEventState, KeyModifiers};

    #[test]
    fn kitty_draw_emits_protocol() {
        let mut canvas = KittyCanvas::new(Vec::new());
        let bitmap = PageBitmap {
            width: 1,
            height: 1,
            pixels: vec![255, 0, 0, 255],
        };

        canvas.draw(&bitmap, DrawParams::clamped(10, 5)).unwrap();
        let output = canvas.writer;
        assert_eq!(output[0], 0x1b);
        assert_eq!(output[1], b'_');
        assert_eq!(output[2], b'G');
    }

    fn key_event(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::NONE)
    }

    fn key_event_with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    #[test]
    fn event_mapper_uses_numeric_prefix_for_page_turn() {
        let mut mapper = EventMapper::new(0.25);
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('1'))),
            UiEvent::None
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('2'))),
            UiEvent::None
        ));

        match mapper.map_event(key_event_with_modifiers(
            KeyCode::Char('J'),
            KeyModifiers::SHIFT,
        )) {
            UiEvent::Command(Command::NextPage { count }) => assert_eq!(count, 12),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn event_mapper_resets_prefix_after_use() {
        let mut mapper = EventMapper::new(0.25);
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('3'))),
            UiEvent::None
        ));

        match mapper.map_event(key_event_with_modifiers(
            KeyCode::Char('K'),
            KeyModifiers::SHIFT,
        )) {
            UiEvent::Command(Command::PrevPage { count }) => assert_eq!(count, 3),
            other => panic!("unexpected event: {:?}", other),
        }

        match mapper.map_event(key_event_with_modifiers(
            KeyCode::Char('K'),
            KeyModifiers::SHIFT,
        )) {
            UiEvent::Command(Command::PrevPage { count }) => assert_eq!(count, 1),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn event_mapper_numeric_prefix_scales_scroll_distance() {
        let mut mapper = EventMapper::new(0.25);
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('2'))),
            UiEvent::None
        ));

        match mapper.map_event(key_event(KeyCode::Char('j'))) {
            UiEvent::Command(Command::ScrollBy { delta }) => {
                assert!((delta - 0.5).abs() < f32::EPSILON);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        match mapper.map_event(key_event(KeyCode::Char('k'))) {
            UiEvent::Command(Command::ScrollBy { delta }) => {
                assert!((delta + 0.25).abs() < f32::EPSILON);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn event_mapper_goto_uses_one_based_prefix() {
        let mut mapper = EventMapper::new(0.25);
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('4'))),
            UiEvent::None
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('2'))),
            UiEvent::None
        ));

        match mapper.map_event(key_event_with_modifiers(
            KeyCode::Char('G'),
            KeyModifiers::SHIFT,
        )) {
            UiEvent::Command(Command::GotoPage { page }) => assert_eq!(page, 41),
            other => panic!("unexpected event: {:?}", other),
        }

        // Without a prefix, G saturates at the last page.
        match mapper.map_event(key_event_with_modifiers(
            KeyCode::Char('G'),
            KeyModifiers::SHIFT,
        )) {
            UiEvent::Command(Command::NextPage { count }) => assert_eq!(count, usize::MAX),
            other => panic!("unexpected event: {:?}", other),
        }

        match mapper.map_event(key_event(KeyCode::Char('g'))) {
            UiEvent::Command(Command::GotoPage { page }) => assert_eq!(page, 0),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn event_mapper_tab_cycles_and_prefix_selects() {
        let mut mapper = EventMapper::new(0.25);
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Tab)),
            UiEvent::Command(Command::NextTab)
        ));
        assert!(matches!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::BackTab,
                KeyModifiers::SHIFT
            )),
            UiEvent::Command(Command::PrevTab)
        ));

        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('2'))),
            UiEvent::None
        ));
        match mapper.map_event(key_event(KeyCode::Tab)) {
            UiEvent::Command(Command::ActivateAt { index }) => assert_eq!(index, 1),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn event_mapper_page_entry_submits_one_based_page() {
        let mut mapper = EventMapper::new(0.25);
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char(':'))),
            UiEvent::None
        ));
        assert_eq!(mapper.pending_input().as_deref(), Some(":"));

        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('4'))),
            UiEvent::None
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('2'))),
            UiEvent::None
        ));
        assert_eq!(mapper.pending_input().as_deref(), Some(":42"));

        match mapper.map_event(key_event(KeyCode::Enter)) {
            UiEvent::Command(Command::GotoPage { page }) => assert_eq!(page, 41),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(mapper.pending_input().is_none());
        assert_eq!(mapper.mode(), InputMode::Normal);
    }

    #[test]
    fn event_mapper_page_entry_swallows_junk() {
        let mut mapper = EventMapper::new(0.25);
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char(':'))),
            UiEvent::None
        ));
        for c in ['a', 'b', 'c'] {
            assert!(matches!(
                mapper.map_event(key_event(KeyCode::Char(c))),
                UiEvent::None
            ));
        }

        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::None
        ));
        assert_eq!(mapper.mode(), InputMode::Normal);
    }

    #[test]
    fn event_mapper_page_entry_rejects_zero() {
        let mut mapper = EventMapper::new(0.25);
        mapper.map_event(key_event(KeyCode::Char(':')));
        mapper.map_event(key_event(KeyCode::Char('0')));

        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::None
        ));
    }

    #[test]
    fn event_mapper_page_entry_cancels_on_esc() {
        let mut mapper = EventMapper::new(0.25);
        mapper.map_event(key_event(KeyCode::Char(':')));
        mapper.map_event(key_event(KeyCode::Char('5')));

        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Esc)),
            UiEvent::None
        ));
        assert_eq!(mapper.mode(), InputMode::Normal);
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn event_mapper_page_entry_backspace_edits_buffer() {
        let mut mapper = EventMapper::new(0.25);
        mapper.map_event(key_event(KeyCode::Char(':')));
        mapper.map_event(key_event(KeyCode::Char('1')));
        mapper.map_event(key_event(KeyCode::Char('2')));
        mapper.map_event(key_event(KeyCode::Backspace));
        assert_eq!(mapper.pending_input().as_deref(), Some(":1"));

        match mapper.map_event(key_event(KeyCode::Enter)) {
            UiEvent::Command(Command::GotoPage { page }) => assert_eq!(page, 0),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn event_mapper_drops_prefix_on_other_command() {
        let mut mapper = EventMapper::new(0.25);
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('4'))),
            UiEvent::None
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('q'))),
            UiEvent::Quit
        ));

        match mapper.map_event(key_event_with_modifiers(
            KeyCode::Char('J'),
            KeyModifiers::SHIFT,
        )) {
            UiEvent::Command(Command::NextPage { count }) => assert_eq!(count, 1),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn event_mapper_pending_input_shows_digits_until_consumed() {
        let mut mapper = EventMapper::new(0.25);
        assert!(mapper.pending_input().is_none());
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('1'))),
            UiEvent::None
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('2'))),
            UiEvent::None
        ));
        assert_eq!(mapper.pending_input().as_deref(), Some("12"));

        match mapper.map_event(key_event(KeyCode::Char('j'))) {
            UiEvent::Command(Command::ScrollBy { delta }) => {
                assert!((delta - 3.0).abs() < f32::EPSILON);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn event_mapper_maps_zoom_keys() {
        let mut mapper = EventMapper::new(0.25);
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('+'))),
            UiEvent::Command(Command::ZoomIn)
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('-'))),
            UiEvent::Command(Command::ZoomOut)
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('='))),
            UiEvent::Command(Command::ResetZoom)
        ));
    }

    #[test]
    fn event_mapper_maps_close_dark_and_home_end() {
        let mut mapper = EventMapper::new(0.25);
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('x'))),
            UiEvent::Command(Command::CloseActive)
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('d'))),
            UiEvent::ToggleDark
        ));
        match mapper.map_event(key_event(KeyCode::Home)) {
            UiEvent::Command(Command::SetScroll { fraction }) => assert_eq!(fraction, 0.0),
            other => panic!("unexpected event: {:?}", other),
        }
        match mapper.map_event(key_event(KeyCode::End)) {
            UiEvent::Command(Command::SetScroll { fraction }) => assert_eq!(fraction, 1.0),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn event_mapper_maps_resize_in_any_mode() {
        let mut mapper = EventMapper::new(0.25);
        match mapper.map_event(Event::Resize(120, 40)) {
            UiEvent::Command(Command::Resized { width, height }) => {
                assert_eq!((width, height), (120, 40));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        mapper.map_event(key_event(KeyCode::Char(':')));
        assert!(matches!(
            mapper.map_event(Event::Resize(80, 24)),
            UiEvent::Command(Command::Resized { .. })
        ));
    }

    #[test]
    fn slice_origin_follows_fraction() {
        assert_eq!(slice_origin(100, 40, 0.0), 0);
        assert_eq!(slice_origin(100, 40, 0.5), 30);
        assert_eq!(slice_origin(100, 40, 1.0), 60);
        assert_eq!(slice_origin(100, 120, 0.7), 0);
        assert_eq!(slice_origin(0, 10, 0.5), 0);
    }

    fn striped_bitmap(width: u32, height: u32) -> PageBitmap {
        let mut pixels = Vec::new();
        for row in 0..height {
            pixels.extend(std::iter::repeat(row as u8).take(width as usize * 4));
        }
        PageBitmap {
            width,
            height,
            pixels,
        }
    }

    #[test]
    fn slice_page_extracts_window_rows() {
        let bitmap = striped_bitmap(2, 4);

        let top = slice_page(&bitmap, 0.0, 2);
        assert_eq!(top.height, 2);
        assert_eq!(top.pixels[0], 0);
        assert_eq!(*top.pixels.last().unwrap(), 1);

        let bottom = slice_page(&bitmap, 1.0, 2);
        assert_eq!(bottom.pixels[0], 2);
        assert_eq!(*bottom.pixels.last().unwrap(), 3);

        let middle = slice_page(&bitmap, 0.5, 2);
        assert_eq!(middle.pixels[0], 1);
    }

    #[test]
    fn slice_page_keeps_short_pages_whole() {
        let bitmap = striped_bitmap(2, 4);

        let whole = slice_page(&bitmap, 0.5, 10);
        assert_eq!(whole.height, 4);
        assert_eq!(whole.pixels, bitmap.pixels);
    }

    #[test]
    fn plan_slice_windows_tall_pages() {
        let cells = CellGeometry {
            cell_width: 10.0,
            cell_height: 20.0,
        };

        let plan = plan_slice(100, 1000, 50, 20, cells);
        assert_eq!(plan.visible_rows, 80);
        assert_eq!(plan.draw_cols, 50);
        assert_eq!(plan.draw_rows, 20);
    }

    #[test]
    fn plan_slice_keeps_short_page_aspect() {
        let cells = CellGeometry {
            cell_width: 10.0,
            cell_height: 20.0,
        };

        let plan = plan_slice(100, 50, 50, 20, cells);
        assert_eq!(plan.visible_rows, 50);
        assert_eq!(plan.draw_cols, 50);
        assert_eq!(plan.draw_rows, 13);
    }

    #[test]
    fn cell_geometry_falls_back_without_pixel_report() {
        let cells = CellGeometry::from_window(80, 24, 0, 0);
        assert_eq!(cells.cell_width, 10.0);
        assert_eq!(cells.cell_height, 20.0);

        let reported = CellGeometry::from_window(100, 50, 1000, 1000);
        assert_eq!(reported.cell_width, 10.0);
        assert_eq!(reported.cell_height, 20.0);
    }

    #[test]
    fn invert_bitmap_preserves_alpha() {
        let mut bitmap = PageBitmap {
            width: 1,
            height: 1,
            pixels: vec![10, 20, 30, 40],
        };

        invert_bitmap(&mut bitmap);

        assert_eq!(bitmap.pixels, vec![245, 235, 225, 40]);
    }

    #[test]
    fn tab_bar_renders_dot_per_tab() {
        let tabs = vec![
            TabLabel {
                id: folio_core::session_id_for_path(std::path::Path::new("/a.pdf")),
                title: "a.pdf".to_string(),
                tag: TagColor::Red,
                active: true,
            },
            TabLabel {
                id: folio_core::session_id_for_path(std::path::Path::new("/b.pdf")),
                title: "b.pdf".to_string(),
                tag: TagColor::Green,
                active: false,
            },
        ];
        let mut out = Vec::new();

        draw_tab_bar(&mut out, &tabs, 80).unwrap();

        let rendered = String::from_utf8_lossy(&out);
        assert_eq!(rendered.matches('●').count(), 2);
        assert!(rendered.contains("a.pdf"));
        assert!(rendered.contains("b.pdf"));
    }
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    Command(Command),
    ToggleDark,
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    PageEntry,
}

impl Default for InputMode {
    fn default() -> Self {
        InputMode::Normal
    }
}

#[derive(Debug)]
pub struct EventMapper {
    scroll_step: f32,
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    page_buffer: String,
}

impl EventMapper {
    pub fn new(scroll_step: f32) -> Self {
        Self {
            scroll_step,
            pending_count: None,
            pending_digits: String::new(),
            mode: InputMode::default(),
            page_buffer: String::new(),
        }
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.page_buffer.clear();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        if let Event::Resize(width, height) = event {
            return UiEvent::Command(Command::Resized { width, height });
        }
        match self.mode {
            InputMode::Normal => self.map_event_normal(event),
            InputMode::PageEntry => self.map_event_page_entry(event),
        }
    }

    fn map_event_normal(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                    if let Some(digit) = c.to_digit(10) {
                        self.push_digit(digit as usize);
                    }
                    UiEvent::None
                }
                (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                    self.scroll(1.0)
                }
                (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                    self.scroll(-1.0)
                }
                (KeyCode::Char('J'), KeyModifiers::SHIFT)
                | (KeyCode::PageDown, _)
                | (KeyCode::Char(' '), KeyModifiers::NONE) => {
                    let count = self.take_count();
                    UiEvent::Command(Command::NextPage { count })
                }
                (KeyCode::Char('K'), KeyModifiers::SHIFT) | (KeyCode::PageUp, _) => {
                    let count = self.take_count();
                    UiEvent::Command(Command::PrevPage { count })
                }
                (KeyCode::Char('g'), KeyModifiers::NONE) => {
                    self.reset_count();
                    UiEvent::Command(Command::GotoPage { page: 0 })
                }
                // {n}G goes to page n (1-based); bare G saturates forward to
                // the last page.
                (KeyCode::Char('G'), KeyModifiers::SHIFT) => match self.take_prefix() {
                    Some(page) => UiEvent::Command(Command::GotoPage {
                        page: page.saturating_sub(1),
                    }),
                    None => UiEvent::Command(Command::NextPage { count: usize::MAX }),
                },
                (KeyCode::Home, _) => {
                    self.reset_count();
                    UiEvent::Command(Command::SetScroll { fraction: 0.0 })
                }
                (KeyCode::End, _) => {
                    self.reset_count();
                    UiEvent::Command(Command::SetScroll { fraction: 1.0 })
                }
                (KeyCode::Char('+'), _) => {
                    self.reset_count();
                    UiEvent::Command(Command::ZoomIn)
                }
                (KeyCode::Char('-'), _) => {
                    self.reset_count();
                    UiEvent::Command(Command::ZoomOut)
                }
                (KeyCode::Char('='), _) => {
                    self.reset_count();
                    UiEvent::Command(Command::ResetZoom)
                }
                (KeyCode::Char(':'), _) => {
                    self.set_mode(InputMode::PageEntry);
                    UiEvent::None
                }
                (KeyCode::Tab, KeyModifiers::NONE) => match self.take_prefix() {
                    Some(ordinal) => UiEvent::Command(Command::ActivateAt {
                        index: ordinal.saturating_sub(1),
                    }),
                    None => UiEvent::Command(Command::NextTab),
                },
                (KeyCode::BackTab, _) => {
                    self.reset_count();
                    UiEvent::Command(Command::PrevTab)
                }
                (KeyCode::Char('x'), KeyModifiers::NONE) => {
                    self.reset_count();
                    UiEvent::Command(Command::CloseActive)
                }
                (KeyCode::Char('d'), _) => {
                    self.reset_count();
                    UiEvent::ToggleDark
                }
                (KeyCode::Char('q'), _) => {
                    self.reset_count();
                    UiEvent::Quit
                }
                _ => {
                    self.reset_count();
                    UiEvent::None
                }
            },
            _ => UiEvent::None,
        }
    }

    fn map_event_page_entry(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Esc, _) => {
                    self.set_mode(InputMode::Normal);
                    UiEvent::None
                }
                (KeyCode::Enter, _) => {
                    let entry = self.page_buffer.clone();
                    self.set_mode(InputMode::Normal);
                    // Entries are 1-based; junk and zero are swallowed like
                    // any other unusable page number.
                    match entry.trim().parse::<usize>() {
                        Ok(page) if page >= 1 => {
                            UiEvent::Command(Command::GotoPage { page: page - 1 })
                        }
                        _ => UiEvent::None,
                    }
                }
                (KeyCode::Backspace, _) => {
                    self.page_buffer.pop();
                    UiEvent::None
                }
                (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                    self.page_buffer.push(c);
                    UiEvent::None
                }
                _ => UiEvent::None,
            },
            _ => UiEvent::None,
        }
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_prefix(&mut self) -> Option<usize> {
        self.pending_digits.clear();
        self.pending_count.take().filter(|&count| count > 0)
    }

    fn take_count(&mut self) -> usize {
        self.take_prefix().unwrap_or(1)
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    fn scroll(&mut self, direction: f32) -> UiEvent {
        let multiplier = self.take_count() as f32;
        UiEvent::Command(Command::ScrollBy {
            delta: direction * self.scroll_step * multiplier,
        })
    }

    pub fn pending_input(&self) -> Option<String> {
        if matches!(self.mode, InputMode::PageEntry) {
            return Some(format!(":{}", self.page_buffer));
        }
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}

pub fn tag_color(tag: TagColor) -> Color {
    match tag {
        TagColor::Red => Color::Red,
        TagColor::Orange => Color::DarkYellow,
        TagColor::Yellow => Color::Yellow,
        TagColor::Green => Color::Green,
        TagColor::Blue => Color::Blue,
        TagColor::Violet => Color::Magenta,
    }
}

/// One line of tabs at the top of the screen: a colored dot and title per
/// open document, the active tab reversed. Tabs that do not fit are dropped
/// from the right.
pub fn draw_tab_bar<W: Write>(writer: &mut W, tabs: &[TabLabel], columns: u16) -> Result<()> {
    crossterm::execute!(writer, cursor::MoveTo(0, 0), Clear(ClearType::CurrentLine))?;
    let mut used = 0usize;
    for tab in tabs {
        let label = format!(" {} ", tab.title);
        let cells = 1 + label.chars().count();
        if used + cells > columns as usize {
            break;
        }
        crossterm::execute!(
            writer,
            SetForegroundColor(tag_color(tab.tag)),
            Print("●"),
            ResetColor
        )?;
        if tab.active {
            crossterm::execute!(
                writer,
                SetAttribute(Attribute::Reverse),
                Print(label.as_str()),
                SetAttribute(Attribute::Reset)
            )?;
        } else {
            crossterm::execute!(writer, Print(label.as_str()))?;
        }
        used += cells;
    }
    Ok(())
}

pub fn draw_empty_state<W: Write>(writer: &mut W, columns: u16, rows: u16) -> Result<()> {
    const MESSAGE: &str = "No open documents";
    let col = columns.saturating_sub(MESSAGE.len() as u16) / 2;
    let row = rows / 2;
    crossterm::execute!(writer, cursor::MoveTo(col, row), Print(MESSAGE))?;
    Ok(())
}

/// Pixel row where the visible window starts for a scroll fraction.
pub fn slice_origin(total: u32, visible: u32, fraction: f32) -> u32 {
    if visible >= total || total == 0 {
        return 0;
    }
    let max_offset = total - visible;
    let clamped = fraction.clamp(0.0, 1.0);
    let raw = (max_offset as f32 * clamped).round();
    raw.max(0.0).min(max_offset as f32) as u32
}

/// Copies the window of `visible_rows` source rows selected by the scroll
/// fraction. The full page width is kept; fitting it is the draw step's job.
pub fn slice_page(bitmap: &PageBitmap, scroll_fraction: f32, visible_rows: u32) -> PageBitmap {
    if bitmap.width == 0 || bitmap.height == 0 {
        return PageBitmap {
            width: 0,
            height: 0,
            pixels: Vec::new(),
        };
    }
    let height = visible_rows.clamp(1, bitmap.height);
    if height == bitmap.height {
        return bitmap.clone();
    }
    let origin_y = slice_origin(bitmap.height, height, scroll_fraction);
    let stride = bitmap.width as usize * 4;
    let start = origin_y as usize * stride;
    let end = start + height as usize * stride;
    PageBitmap {
        width: bitmap.width,
        height,
        pixels: bitmap.pixels[start..end].to_vec(),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CellGeometry {
    pub cell_width: f32,
    pub cell_height: f32,
}

impl CellGeometry {
    /// Cell size in pixels from the reported window size, falling back to a
    /// typical 10x20 cell when the terminal reports no pixel dimensions.
    pub fn from_window(columns: u16, rows: u16, pixel_width: u16, pixel_height: u16) -> Self {
        let columns = f32::from(columns.max(1));
        let rows = f32::from(rows.max(1));
        let cell_width = if pixel_width > 0 {
            f32::from(pixel_width) / columns
        } else {
            10.0
        };
        let cell_height = if pixel_height > 0 {
            f32::from(pixel_height) / rows
        } else {
            20.0
        };
        Self {
            cell_width,
            cell_height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlicePlan {
    /// Source pixel rows of the page that fit the viewport.
    pub visible_rows: u32,
    pub draw_cols: u32,
    pub draw_rows: u32,
}

/// Fits the page to the available width, then takes as many source rows as
/// fill the available height at that scale. Pages shorter than the viewport
/// are drawn whole at their own aspect.
pub fn plan_slice(
    bitmap_width: u32,
    bitmap_height: u32,
    available_cols: u32,
    available_rows: u32,
    cells: CellGeometry,
) -> SlicePlan {
    let available_cols = available_cols.max(1);
    let available_rows = available_rows.max(1);
    if bitmap_width == 0 || bitmap_height == 0 {
        return SlicePlan {
            visible_rows: 0,
            draw_cols: available_cols,
            draw_rows: available_rows,
        };
    }
    let available_width_px = cells.cell_width * available_cols as f32;
    let available_height_px = cells.cell_height * available_rows as f32;
    let scale = available_width_px / bitmap_width as f32;
    if !scale.is_finite() || scale <= 0.0 {
        return SlicePlan {
            visible_rows: bitmap_height,
            draw_cols: available_cols,
            draw_rows: available_rows,
        };
    }
    let fit_rows = (available_height_px / scale).round().max(1.0);
    let visible_rows = (fit_rows as u32).min(bitmap_height);
    let draw_rows = if visible_rows < bitmap_height {
        available_rows
    } else {
        ((bitmap_height as f32 * scale) / cells.cell_height)
            .round()
            .clamp(1.0, available_rows as f32) as u32
    };
    SlicePlan {
        visible_rows,
        draw_cols: available_cols,
        draw_rows,
    }
}

/// In-place dark display filter: inverts RGB and leaves alpha alone.
pub fn invert_bitmap(bitmap: &mut PageBitmap) {
    for chunk in bitmap.pixels.chunks_exact_mut(4) {
        chunk[0] = 255 - chunk[0];
        chunk[1] = 255 - chunk[1];
        chunk[2] = 255 - chunk[2];
    }
}
