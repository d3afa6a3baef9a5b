use std::convert::TryFrom;
use std::env;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use folio_core::{
    DocumentBackend, DocumentProvider, OpenError, PageBitmap, RenderError, RenderRequest,
};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};

/// Runtime override for the pdfium shared library location.
pub const PDFIUM_PATH_ENV: &str = "FOLIO_PDFIUM_PATH";

pub struct PdfiumProvider {
    pdfium: Arc<Pdfium>,
}

impl PdfiumProvider {
    /// Binds the pdfium library: `FOLIO_PDFIUM_PATH` first, then a copy next
    /// to the executable or in the working directory, then the system
    /// library.
    pub fn new() -> Result<Self> {
        let pdfium = bind_pdfium()?;
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

impl DocumentProvider for PdfiumProvider {
    fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>, OpenError> {
        if !path.exists() {
            return Err(OpenError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let absolute = path.canonicalize().map_err(|err| OpenError::Backend {
            path: path.to_path_buf(),
            source: anyhow::Error::new(err)
                .context(format!("failed to resolve path for {:?}", path)),
        })?;
        let page_count = probe_page_count(&self.pdfium, &absolute)?;
        debug!(path = %absolute.display(), page_count, "opened document");
        Ok(Arc::new(PdfiumDocument::new(
            Arc::clone(&self.pdfium),
            absolute,
            page_count,
        )))
    }
}

struct PdfiumDocument {
    path: PathBuf,
    page_count: usize,
    memo: Mutex<Option<BitmapMemo>>,
    // `document` is declared before `pdfium` so it drops first: fields drop
    // in declaration order, and the cached document must be closed while the
    // bindings it references are still alive.
    document: Mutex<Option<PdfDocument<'static>>>,
    pdfium: Arc<Pdfium>,
}

struct BitmapMemo {
    page_index: usize,
    zoom: f32,
    bitmap: PageBitmap,
}

impl PdfiumDocument {
    fn new(pdfium: Arc<Pdfium>, path: PathBuf, page_count: usize) -> Self {
        Self {
            path,
            page_count,
            memo: Mutex::new(None),
            document: Mutex::new(None),
            pdfium,
        }
    }

    fn open_document(&self) -> Result<PdfDocument<'static>> {
        let document = self
            .pdfium
            .load_pdf_from_file(&self.path, None)
            .with_context(|| format!("failed to open {:?}", self.path))?;
        // SAFETY: the returned PdfDocument borrows the Pdfium bindings owned
        // by self.pdfium. It is stored inside self.document, and the field
        // ordering above guarantees it is dropped before self.pdfium, so the
        // borrow never outlives the bindings.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        Ok(document)
    }

    fn with_document<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&PdfDocument<'static>) -> Result<R>,
    {
        let mut guard = self.document.lock();
        if guard.is_none() {
            let document = self.open_document()?;
            *guard = Some(document);
        }
        let document = guard.as_ref().expect("document must be loaded");
        f(document)
    }

    fn render_internal(
        &self,
        document: &PdfDocument<'_>,
        request: &RenderRequest,
    ) -> Result<PageBitmap> {
        let page_index: PdfPageIndex = request
            .page_index
            .try_into()
            .map_err(|_| anyhow!("page {} is out of supported range", request.page_index))?;
        let page = document
            .pages()
            .get(page_index)
            .with_context(|| format!("page {} out of range", request.page_index))?;

        // Scaling the page before rasterizing means zooming in gains real
        // resolution instead of upscaling a fixed-DPI raster.
        let config = PdfRenderConfig::new().scale_page_by_factor(request.zoom.max(0.1));
        let bitmap = page
            .render_with_config(&config)
            .with_context(|| format!("failed to render page {}", request.page_index))?;
        let image = bitmap.as_image().to_rgba8();
        let (width, height) = (image.width(), image.height());

        Ok(PageBitmap {
            width,
            height,
            pixels: image.into_raw(),
        })
    }
}

impl DocumentBackend for PdfiumDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    #[instrument(skip(self))]
    fn render_page(&self, request: RenderRequest) -> Result<PageBitmap, RenderError> {
        if request.page_index >= self.page_count {
            return Err(RenderError::PageOutOfRange {
                page: request.page_index,
                count: self.page_count,
            });
        }

        {
            let memo = self.memo.lock();
            if let Some(entry) = memo.as_ref() {
                if entry.page_index == request.page_index
                    && (entry.zoom - request.zoom).abs() < f32::EPSILON
                {
                    return Ok(entry.bitmap.clone());
                }
            }
        }

        let bitmap = self
            .with_document(|document| self.render_internal(document, &request))
            .map_err(|source| RenderError::Backend {
                page: request.page_index,
                source,
            })?;

        *self.memo.lock() = Some(BitmapMemo {
            page_index: request.page_index,
            zoom: request.zoom,
            bitmap: bitmap.clone(),
        });

        Ok(bitmap)
    }
}

fn probe_page_count(pdfium: &Pdfium, path: &Path) -> Result<usize, OpenError> {
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|err| OpenError::Backend {
            path: path.to_path_buf(),
            source: anyhow::Error::new(err).context("failed to parse document"),
        })?;
    Ok(usize::try_from(document.pages().len()).unwrap_or_default())
}

fn bind_pdfium() -> Result<Pdfium> {
    let mut errors = Vec::new();

    if let Ok(path) = env::var(PDFIUM_PATH_ENV) {
        if !path.is_empty() {
            match Pdfium::bind_to_library(&path) {
                Ok(bindings) => return Ok(Pdfium::new(bindings)),
                Err(err) => {
                    warn!(%path, error = %err, "failed to load pdfium from override path");
                    errors.push(format!("{path}: {err}"));
                }
            }
        }
    }

    for dir in library_search_dirs() {
        let candidate = Pdfium::pdfium_platform_library_name_at_path(&dir);
        match Pdfium::bind_to_library(&candidate) {
            Ok(bindings) => return Ok(Pdfium::new(bindings)),
            Err(err) => {
                errors.push(format!("{}: {}", candidate.display(), err));
            }
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; install it or set {} ({})",
                PDFIUM_PATH_ENV,
                errors.join(", ")
            ))
        }
    }
}

fn library_search_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(exe) = env::current_exe() {
        if let Some(dir) = exe.parent() {
            dirs.push(dir.to_path_buf());
        }
    }
    dirs.push(PathBuf::from("./"));
    dirs
}
