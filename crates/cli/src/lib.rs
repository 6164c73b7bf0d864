use annotation_core::AnnotationStore;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use doc_model::{
    point_to_page_space, selection_to_page_rects, AnnotationColor, AnnotationId, AnnotationKind,
    AnnotationPatch, ClientPoint, ClientRect, HighlightPatch, NewAnnotation, PagePoint,
    StickyNotePatch,
};
use pdf_engine::{default_engine, OpenSource, PdfEngine};
use serde::Serialize;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::ffi::OsString;
use std::ops::Range;
use std::path::{Path, PathBuf};
use storage::{FileKeyValueStore, Settings, SettingsStore};
use viewer_core::{build_scene, page_layouts, PageLayout, ViewportState};

/// Page height used for `--page-count` documents, US Letter in points.
const DEFAULT_PAGE_HEIGHT_PT: f64 = 792.0;

/// Largest document `--page-count` accepts.
const MAX_PAGE_COUNT: u32 = 100_000;

#[derive(Debug, Parser)]
#[command(name = "annotate")]
#[command(about = "Highlights and sticky notes for PDF documents")]
pub struct Cli {
    /// Storage root holding annotations and settings.json.
    #[arg(long, global = true, value_name = "DIR")]
    store: Option<PathBuf>,

    /// Log debug output to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Highlight a text selection given as client-space rectangles.
    Highlight {
        #[arg(long)]
        page: u32,
        /// One rectangle per selected line, `x,y,width,height`.
        #[arg(long = "rect", value_name = "X,Y,W,H", value_parser = parse_rect, required = true)]
        rects: Vec<ClientRect>,
        #[command(flatten)]
        placement: Placement,
        /// Selected text.
        #[arg(long)]
        text: String,
        #[arg(long)]
        note: Option<String>,
        #[arg(long)]
        color: Option<AnnotationColor>,
    },
    /// Place a sticky note at a client-space point.
    Note {
        #[arg(long)]
        page: u32,
        #[arg(long, value_name = "X,Y", value_parser = parse_point)]
        at: ClientPoint,
        #[command(flatten)]
        placement: Placement,
        #[arg(long, value_name = "W,H", value_parser = parse_size)]
        size: Option<(f64, f64)>,
        #[arg(long, default_value = "")]
        content: String,
        #[arg(long)]
        color: Option<AnnotationColor>,
    },
    /// Edit an existing annotation.
    Update {
        id: String,
        #[arg(long, conflicts_with = "clear_note")]
        note: Option<String>,
        #[arg(long)]
        clear_note: bool,
        #[arg(long)]
        color: Option<AnnotationColor>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        minimized: Option<bool>,
        /// New sticky-note position in page space.
        #[arg(long = "move", value_name = "X,Y", value_parser = parse_point)]
        move_to: Option<ClientPoint>,
        #[arg(long, value_name = "W,H", value_parser = parse_size)]
        resize: Option<(f64, f64)>,
    },
    /// Delete an annotation.
    Delete { id: String },
    /// Print stored annotations as JSON.
    List {
        #[arg(long)]
        page: Option<u32>,
    },
    /// Print the overlay scene for the mounted pages as JSON.
    Render {
        #[arg(long, default_value_t = 1.0)]
        scale: f64,
        /// Pages to mount, `A..B` (end exclusive) or a single index.
        /// Defaults to the pages visible in the viewport.
        #[arg(long, value_name = "A..B", value_parser = parse_page_range)]
        pages: Option<Range<u32>>,
        #[arg(long, default_value_t = 0.0)]
        scroll: f64,
        #[arg(long, default_value_t = 800.0)]
        viewport_height: f64,
        #[command(flatten)]
        document: DocumentArgs,
    },
    /// Apply the configured page-range policy against a document.
    Prune {
        #[command(flatten)]
        document: DocumentArgs,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Args)]
struct Placement {
    /// Client position of the page container's top-left corner.
    #[arg(long, value_name = "X,Y", value_parser = parse_point, default_value = "0,0")]
    origin: ClientPoint,
    /// Zoom level the client coordinates were taken at.
    #[arg(long, default_value_t = 1.0)]
    scale: f64,
}

impl Placement {
    fn validated_scale(&self) -> Result<f64> {
        ensure_scale(self.scale)?;
        Ok(self.scale)
    }
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct DocumentArgs {
    /// PDF to read the page count and sizes from.
    #[arg(long, value_name = "FILE")]
    pdf: Option<PathBuf>,
    /// Page count of a document that is not at hand.
    #[arg(long, value_parser = clap::value_parser!(u32).range(..=MAX_PAGE_COUNT as i64))]
    page_count: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListOutput<'a> {
    highlights: &'a [doc_model::Highlight],
    sticky_notes: &'a [doc_model::StickyNote],
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);

    let root = cli.store.as_deref();
    match cli.command {
        Commands::Highlight { page, rects, placement, text, note, color } => {
            let (mut store, settings) = open_store(root)?;
            let rects =
                selection_to_page_rects(&rects, placement.origin, placement.validated_scale()?);
            let id = store.create(NewAnnotation::Highlight {
                page_index: page,
                rects,
                content: text,
                note,
                color: color.unwrap_or(settings.default_color),
            });
            persist(&store)?;
            println!("{id}");
            Ok(())
        }
        Commands::Note { page, at, placement, size, content, color } => {
            let (mut store, settings) = open_store(root)?;
            let position =
                point_to_page_space(at, placement.origin, placement.validated_scale()?);
            let (width, height) =
                size.unwrap_or((settings.sticky_note_width, settings.sticky_note_height));
            let id = store.create(NewAnnotation::StickyNote {
                page_index: page,
                position,
                width,
                height,
                content,
                color: color.unwrap_or(settings.default_color),
            });
            persist(&store)?;
            println!("{id}");
            Ok(())
        }
        Commands::Update { id, note, clear_note, color, content, minimized, move_to, resize } => {
            let (mut store, _) = open_store(root)?;
            let id = AnnotationId::from(id);
            let kind = store
                .get(&id)
                .map(|found| found.kind())
                .with_context(|| format!("annotation {id} not found"))?;

            let patch = match kind {
                AnnotationKind::Highlight => {
                    if minimized.is_some() || move_to.is_some() || resize.is_some() {
                        anyhow::bail!(
                            "--minimized, --move and --resize only apply to sticky notes"
                        );
                    }
                    let note = if clear_note { Some(None) } else { note.map(Some) };
                    let patch = HighlightPatch { note, color, content };
                    if patch.is_empty() {
                        anyhow::bail!("nothing to update");
                    }
                    AnnotationPatch::Highlight(patch)
                }
                AnnotationKind::StickyNote => {
                    if note.is_some() || clear_note {
                        anyhow::bail!("--note and --clear-note only apply to highlights");
                    }
                    let patch = StickyNotePatch {
                        position: move_to.map(|point| PagePoint::new(point.x, point.y)),
                        size: resize,
                        content,
                        color,
                        minimized,
                    };
                    if patch.is_empty() {
                        anyhow::bail!("nothing to update");
                    }
                    AnnotationPatch::StickyNote(patch)
                }
            };

            store.update(&id, patch).with_context(|| format!("failed to update {id}"))?;
            persist(&store)
        }
        Commands::Delete { id } => {
            let (mut store, _) = open_store(root)?;
            let id = AnnotationId::from(id);
            let kind = store.delete(&id).with_context(|| format!("failed to delete {id}"))?;
            persist(&store)?;
            println!("deleted {kind} {id}");
            Ok(())
        }
        Commands::List { page } => {
            let (store, _) = open_store(root)?;
            match page {
                Some(page) => print_json(&store.list_for_page(page)),
                None => print_json(&ListOutput {
                    highlights: store.highlights(),
                    sticky_notes: store.sticky_notes(),
                }),
            }
        }
        Commands::Render { scale, pages, scroll, viewport_height, document } => {
            ensure_scale(scale)?;
            let (store, _) = open_store(root)?;
            let page_heights = document_page_heights(&document)?;
            let page_count = page_heights.len() as u32;

            let layouts = match pages {
                Some(range) => (range.start.min(page_count)..range.end.min(page_count))
                    .map(|page| PageLayout::new(page, ClientPoint::default()))
                    .collect::<Vec<_>>(),
                None => page_layouts(&ViewportState {
                    viewport_height_px: viewport_height,
                    scroll_offset_px: scroll,
                    scale,
                    page_heights_pt: page_heights,
                    ..ViewportState::default()
                }),
            };

            print_json(&build_scene(&store, scale, &layouts, page_count))
        }
        Commands::Prune { document } => {
            let (mut store, _) = open_store(root)?;
            let page_count = document_page_count(&document)?;
            let report = store.apply_page_range(page_count);
            persist(&store)?;
            print_json(&report)
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };
    // Fails only if a logger is already installed in this process.
    let _ = TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Never);
}

fn open_store(root: Option<&Path>) -> Result<(AnnotationStore<FileKeyValueStore>, Settings)> {
    let (kv, settings_store) = match root {
        Some(root) => (FileKeyValueStore::with_root(root), SettingsStore::with_root(root)),
        None => (
            FileKeyValueStore::from_default_project().context("failed to locate data directory")?,
            SettingsStore::from_default_project()
                .context("failed to locate data directory")?,
        ),
    };

    let settings = settings_store.load_or_default();
    log::debug!("annotations stored under {}", kv.root().display());

    let mut config = annotation_core::WriteCoordinatorConfig::from_settings(&settings);
    // Each command flushes explicitly before exiting.
    config.enable_auto_save = false;

    let store = AnnotationStore::open_with_config(kv, config, settings.page_range_policy);
    Ok((store, settings))
}

fn persist(store: &AnnotationStore<FileKeyValueStore>) -> Result<()> {
    store.flush().context("failed to persist annotations (changes were kept in memory only)")
}

fn document_page_heights(document: &DocumentArgs) -> Result<Vec<f64>> {
    if let Some(count) = document.page_count {
        return Ok(vec![DEFAULT_PAGE_HEIGHT_PT; checked_page_count(count)? as usize]);
    }

    let mut engine = default_engine();
    let source = OpenSource::from(document_pdf(document)?);
    let handle = engine.open(source).context("failed to open PDF")?;
    let heights = engine.page_heights(handle)?;
    engine.close(handle)?;

    Ok(heights)
}

fn document_page_count(document: &DocumentArgs) -> Result<u32> {
    if let Some(count) = document.page_count {
        return checked_page_count(count);
    }

    let mut engine = default_engine();
    let source = OpenSource::from(document_pdf(document)?);
    let handle = engine.open(source).context("failed to open PDF")?;
    let count = engine.page_count(handle)?;
    engine.close(handle)?;

    Ok(count)
}

fn document_pdf(document: &DocumentArgs) -> Result<&Path> {
    let Some(path) = document.pdf.as_deref() else {
        anyhow::bail!("either --pdf or --page-count is required");
    };
    if !path.is_file() {
        anyhow::bail!("file does not exist: {}", path.display());
    }
    Ok(path)
}

fn checked_page_count(count: u32) -> Result<u32> {
    if count > MAX_PAGE_COUNT {
        anyhow::bail!("--page-count must be at most {MAX_PAGE_COUNT}, got {count}");
    }
    Ok(count)
}

fn ensure_scale(scale: f64) -> Result<()> {
    if !scale.is_finite() || scale <= 0.0 {
        anyhow::bail!("--scale must be a positive number, got {scale}");
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

fn parse_numbers<const N: usize>(value: &str) -> Result<[f64; N], String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(format!("expected {N} comma-separated numbers, got '{value}'"));
    }

    let mut numbers = [0.0; N];
    for (slot, part) in numbers.iter_mut().zip(parts) {
        *slot = part.parse().map_err(|_| format!("'{part}' is not a number"))?;
    }
    Ok(numbers)
}

fn parse_rect(value: &str) -> Result<ClientRect, String> {
    let [x, y, width, height] = parse_numbers(value)?;
    Ok(ClientRect::new(x, y, width, height))
}

fn parse_point(value: &str) -> Result<ClientPoint, String> {
    let [x, y] = parse_numbers(value)?;
    Ok(ClientPoint::new(x, y))
}

fn parse_size(value: &str) -> Result<(f64, f64), String> {
    let [width, height] = parse_numbers(value)?;
    if width <= 0.0 || height <= 0.0 {
        return Err(format!("size must be positive, got '{value}'"));
    }
    Ok((width, height))
}

fn parse_page_range(value: &str) -> Result<Range<u32>, String> {
    let parse = |part: &str| {
        part.trim().parse::<u32>().map_err(|_| format!("'{part}' is not a page index"))
    };

    match value.split_once("..") {
        Some((start, end)) => {
            let range = parse(start)?..parse(end)?;
            if range.is_empty() {
                return Err(format!("empty page range '{value}'"));
            }
            Ok(range)
        }
        None => {
            let page = parse(value)?;
            let end = page
                .checked_add(1)
                .ok_or_else(|| format!("page index '{value}' is too large"))?;
            Ok(page..end)
        }
    }
}
