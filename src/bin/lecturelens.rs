//! CLI binary for lecturelens.
//!
//! A thin shim over the library: subcommands map flags onto the config
//! structs, open a session over the JSON store and print results.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use lecturelens::{
    ingest, Analyst, AnalysisSession, AnalyzerConfig, IngestConfig, JsonFileStore,
    PersistenceGateway, Presentation, SessionCollaborators, SessionConfig, SessionObserver,
    SlideId, SlideStatus, UsageLog, VisionAnalyzer,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Session observer using indicatif ─────────────────────────────────────────

/// Renders a progress bar over the slides being analysed and one log line
/// per finished or failed slide.
struct CliProgress {
    bar: ProgressBar,
    started: Mutex<HashMap<SlideId, Instant>>,
    failures: AtomicUsize,
}

impl CliProgress {
    fn new(total: usize) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} slides  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);
        bar.set_prefix("Analysing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            started: Mutex::new(HashMap::new()),
            failures: AtomicUsize::new(0),
        })
    }

    fn elapsed(&self, slide: &SlideId) -> f64 {
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(slide)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl SessionObserver for CliProgress {
    fn on_status_change(&self, slide: &SlideId, page_number: u32, status: SlideStatus) {
        match status {
            SlideStatus::Loading => {
                self.started
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(slide.clone(), Instant::now());
                self.bar.set_message(format!("page {page_number}"));
            }
            SlideStatus::Success => {
                let secs = self.elapsed(slide);
                self.bar.println(format!(
                    "  {} Page {:>3}  {}",
                    green("✓"),
                    page_number,
                    dim(&format!("{secs:.1}s")),
                ));
                self.bar.inc(1);
            }
            SlideStatus::Idle | SlideStatus::Error => {}
        }
    }

    fn on_analysis_failed(&self, slide: &SlideId, page_number: u32, error: &str) {
        let secs = self.elapsed(slide);
        self.failures.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}  {}  {}",
            red("✗"),
            page_number,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
    }

    fn on_save_failed(&self, error: &str) {
        self.bar
            .println(format!("  {} {}", red("save failed:"), error));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Turn a PDF into a stored presentation (prints its id)
  lecturelens ingest week3.pdf --folder cs101

  # Explain every slide that has no explanation yet
  lecturelens analyze week3-193a2b4c1d0

  # Explain slides 4 to 8 with a different instruction
  lecturelens analyze week3-193a2b4c1d0 --pages 4-8 --prompt "Explain for a 12-year-old"

  # Redo slides that were already explained
  lecturelens analyze week3-193a2b4c1d0 --pages 2,5 --regenerate

  # Read the results
  lecturelens show week3-193a2b4c1d0 --page 4

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Directory containing libpdfium
  LECTURELENS_STORE       Store directory (default ./lectures)
"#;

/// Page-by-page AI explanations for lecture slides.
#[derive(Parser, Debug)]
#[command(
    name = "lecturelens",
    version,
    about = "Page-by-page AI explanations for lecture slides",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding stored presentations.
    #[arg(long, global = true, env = "LECTURELENS_STORE", default_value = "./lectures")]
    store: PathBuf,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "LECTURELENS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, global = true, env = "LECTURELENS_QUIET")]
    quiet: bool,

    /// Disable the progress bar.
    #[arg(long, global = true, env = "LECTURELENS_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rasterise a PDF (file or URL) into a stored presentation.
    Ingest(IngestArgs),
    /// Explain slides of a stored presentation, one at a time.
    Analyze(AnalyzeArgs),
    /// Print a stored presentation or one slide.
    Show {
        id: String,
        /// Only this page (1-indexed).
        #[arg(long)]
        page: Option<u32>,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// List stored presentations, most recent first.
    List {
        /// Only presentations filed under this folder.
        #[arg(long)]
        folder: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Delete a stored presentation and its images.
    Delete { id: String },
    /// Token totals per user from the usage log.
    Usage,
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Title; defaults to the PDF's title, then the file name.
    #[arg(long)]
    title: Option<String>,

    /// Folder to file the presentation under.
    #[arg(long, env = "LECTURELENS_FOLDER")]
    folder: Option<String>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "LECTURELENS_PASSWORD")]
    password: Option<String>,

    /// Longest edge of rendered slides in pixels.
    #[arg(long, env = "LECTURELENS_MAX_PIXELS", default_value_t = 1600,
          value_parser = clap::value_parser!(u32).range(256..=4096))]
    max_pixels: u32,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "LECTURELENS_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Presentation id, as printed by `ingest` or `list`.
    id: String,

    /// Page selection: all, 5, 3-15, 1,3,5 or 1-3,7.
    #[arg(long, default_value = "all")]
    pages: String,

    /// Instruction to use instead of each slide's own prompt.
    #[arg(long)]
    prompt: Option<String>,

    /// Also redo slides that already have an explanation.
    #[arg(long)]
    regenerate: bool,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Max LLM output tokens per slide.
    #[arg(long, env = "LECTURELENS_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "LECTURELENS_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Retries inside one analysis call.
    #[arg(long, env = "LECTURELENS_MAX_RETRIES", default_value_t = 2,
          value_parser = clap::value_parser!(u32).range(0..=i64::from(lecturelens::config::MAX_RETRIES)))]
    max_retries: u32,

    /// Per-attempt LLM call timeout in seconds.
    #[arg(long, env = "LECTURELENS_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Pause before each queued slide, in milliseconds.
    #[arg(long, env = "LECTURELENS_ADMISSION_DELAY_MS", default_value_t = 1000)]
    delay_ms: u64,

    /// Give up on a queued slide after this many failed calls in a row.
    #[arg(long, env = "LECTURELENS_MAX_ATTEMPTS", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,

    /// Name analyses are attributed to; defaults to the OS user.
    #[arg(long, env = "LECTURELENS_USER")]
    user: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The progress bar gives all the feedback that matters while analysing,
    // so library INFO logs are suppressed unless asked for.
    let analyzing = matches!(cli.command, Command::Analyze(_));
    let show_progress = analyzing && !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let store = JsonFileStore::new(&cli.store);
    match &cli.command {
        Command::Ingest(args) => run_ingest(&cli, &store, args).await,
        Command::Analyze(args) => run_analyze(&cli, &store, args, show_progress).await,
        Command::Show { id, page, json } => run_show(&store, id, *page, *json).await,
        Command::List { folder, json } => run_list(&store, folder.as_deref(), *json).await,
        Command::Delete { id } => {
            store
                .delete(id)
                .await
                .with_context(|| format!("Failed to delete '{id}'"))?;
            if !cli.quiet {
                eprintln!("{} deleted {}", green("✔"), bold(id));
            }
            Ok(())
        }
        Command::Usage => run_usage(&cli).await,
    }
}

async fn run_ingest(cli: &Cli, store: &JsonFileStore, args: &IngestArgs) -> Result<()> {
    let config = IngestConfig {
        max_rendered_pixels: args.max_pixels,
        password: args.password.clone(),
        folder_id: args.folder.clone(),
        title: args.title.clone(),
        download_timeout_secs: args.download_timeout,
        ..IngestConfig::default()
    };

    let spinner = (!cli.quiet && !cli.no_progress).then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Ingesting");
        bar.set_message(args.input.clone());
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let presentation = ingest(&args.input, &config)
        .await
        .with_context(|| format!("Failed to ingest '{}'", args.input))?;
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }

    store
        .save(&presentation)
        .await
        .context("Failed to store presentation")?;

    if !cli.quiet {
        eprintln!(
            "{} {} ({} slides) → {}",
            green("✔"),
            bold(&presentation.title),
            presentation.slide_count,
            dim(&cli.store.display().to_string()),
        );
    }
    println!("{}", presentation.id);
    Ok(())
}

async fn run_analyze(
    cli: &Cli,
    store: &JsonFileStore,
    args: &AnalyzeArgs,
    show_progress: bool,
) -> Result<()> {
    let presentation = store
        .load(&args.id)
        .await
        .with_context(|| format!("Failed to open '{}'", args.id))?;
    let pages = parse_pages(&args.pages)?;
    let (regenerate, queued) = select_slides(&presentation, pages.as_deref(), args.regenerate);
    if regenerate.is_empty() && queued.is_empty() {
        if !cli.quiet {
            eprintln!("{} nothing to analyse (use --regenerate to redo slides)", cyan("ℹ"));
        }
        return Ok(());
    }

    let mut analyzer_config = AnalyzerConfig::builder()
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .max_retries(args.max_retries)
        .api_timeout_secs(args.api_timeout);
    if let Some(model) = &args.model {
        analyzer_config = analyzer_config.model(model);
    }
    if let Some(provider) = &args.provider {
        analyzer_config = analyzer_config.provider_name(provider);
    }
    let analyzer = VisionAnalyzer::from_config(analyzer_config.build().context("Invalid configuration")?)
        .context("Failed to set up the vision model")?;

    let progress = show_progress.then(|| CliProgress::new(regenerate.len() + queued.len()));
    let analyst = match &args.user {
        Some(name) => Analyst::new(format!("local:{name}"), name.clone()),
        None => Analyst::local(),
    };
    let mut session_config = SessionConfig::builder()
        .admission_delay_ms(args.delay_ms)
        .max_auto_retries(Some(args.max_attempts))
        .analyst(analyst);
    if let Some(p) = &progress {
        session_config = session_config.observer(p.clone());
    }

    let session = AnalysisSession::open(
        presentation,
        SessionCollaborators {
            analyzer: Arc::new(analyzer),
            gateway: Arc::new(store.clone()),
            usage: Arc::new(UsageLog::new(cli.store.join("usage.jsonl"))),
        },
        session_config.build().context("Invalid configuration")?,
    );

    if let Some(p) = &progress {
        let p = Arc::clone(p);
        let mut saving = session.saving_updates();
        tokio::spawn(async move {
            while let Some(now) = saving.next().await {
                p.bar.set_prefix(if now { "Analysing ●" } else { "Analysing" });
            }
        });
    }

    let work = async {
        for id in &regenerate {
            session
                .trigger_analysis(id, args.prompt.clone())
                .await
                .with_context(|| format!("Failed to analyse slide {id}"))?;
        }
        for id in &queued {
            if args.prompt.is_some() {
                session.set_custom_prompt(id, args.prompt.clone())?;
            }
            session.enqueue(id);
        }
        session.wait_idle().await;
        anyhow::Ok(())
    };
    let interrupted = tokio::select! {
        result = work => { result?; false }
        _ = tokio::signal::ctrl_c() => true,
    };

    let finished = session.close().await.context("Failed to save results")?;
    if let Some(p) = &progress {
        p.bar.finish_and_clear();
    }

    if !cli.quiet {
        let targets: Vec<&SlideId> = regenerate.iter().chain(queued.iter()).collect();
        let done = targets
            .iter()
            .filter_map(|id| finished.slide(id))
            .filter(|s| s.status == SlideStatus::Success)
            .count();
        let failed = targets.len() - done;
        let failed_calls = progress
            .as_ref()
            .map_or(0, |p| p.failures.load(Ordering::SeqCst));
        let mark = if interrupted || failed > 0 { cyan("⚠") } else { green("✔") };
        eprintln!(
            "{} {}/{} slides explained{}{}",
            mark,
            bold(&done.to_string()),
            targets.len(),
            if interrupted {
                "  (interrupted)".to_string()
            } else if failed > 0 {
                format!("  ({} failed)", red(&failed.to_string()))
            } else {
                String::new()
            },
            if failed_calls > 0 {
                dim(&format!("  {failed_calls} failed calls along the way"))
            } else {
                String::new()
            },
        );
    }
    Ok(())
}

/// Split the selected slides into those to redo now and those to queue.
///
/// Already explained slides are only touched with `regenerate`; they cannot
/// be queued, so they are triggered one by one instead.
fn select_slides(
    presentation: &Presentation,
    pages: Option<&[u32]>,
    regenerate: bool,
) -> (Vec<SlideId>, Vec<SlideId>) {
    let mut redo = Vec::new();
    let mut queue = Vec::new();
    for slide in &presentation.slides {
        if pages.is_some_and(|p| !p.contains(&slide.page_number)) {
            continue;
        }
        match slide.status {
            SlideStatus::Success if regenerate => redo.push(slide.id.clone()),
            SlideStatus::Success => {}
            _ => queue.push(slide.id.clone()),
        }
    }
    (redo, queue)
}

async fn run_show(store: &JsonFileStore, id: &str, page: Option<u32>, json: bool) -> Result<()> {
    let presentation = store
        .load(id)
        .await
        .with_context(|| format!("Failed to open '{id}'"))?;

    let slides: Vec<_> = match page {
        Some(n) => vec![presentation
            .slide_by_page(n)
            .with_context(|| format!("'{id}' has no page {n}"))?
            .clone()],
        None => presentation.slides.clone(),
    };

    if json {
        let text = if page.is_some() {
            serde_json::to_string_pretty(&slides[0])
        } else {
            serde_json::to_string_pretty(&presentation)
        }
        .context("Failed to serialise output")?;
        println!("{text}");
        return Ok(());
    }

    println!("{}", bold(&presentation.title));
    if let Some(author) = &presentation.author {
        println!("{}", dim(author));
    }
    for slide in &slides {
        println!();
        println!(
            "{} {}",
            bold(&format!("── Page {} ", slide.page_number)),
            dim(&slide.status.to_string())
        );
        match (&slide.explanation, &slide.last_error) {
            (Some(text), _) => println!("{text}"),
            (None, Some(err)) => println!("{}", red(err)),
            (None, None) => println!("{}", dim("(not analysed)")),
        }
        if let Some(by) = &slide.analyzed_by {
            println!(
                "{}",
                dim(&format!("— {} at {}", by.user_name, by.timestamp.format("%Y-%m-%d %H:%M")))
            );
        }
    }
    Ok(())
}

async fn run_list(store: &JsonFileStore, folder: Option<&str>, json: bool) -> Result<()> {
    let summaries = store.list(folder).await.context("Failed to list store")?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summaries).context("Failed to serialise output")?
        );
        return Ok(());
    }
    if summaries.is_empty() {
        eprintln!("{}", dim("no presentations"));
        return Ok(());
    }
    for s in summaries {
        println!(
            "{:<32}  {:>3}/{:<3}  {}  {}",
            s.id,
            s.analysed,
            s.slide_count,
            s.last_modified.format("%Y-%m-%d %H:%M"),
            s.title,
        );
    }
    Ok(())
}

async fn run_usage(cli: &Cli) -> Result<()> {
    let log = UsageLog::new(cli.store.join("usage.jsonl"));
    let totals = log.totals_by_user().await.context("Failed to read usage log")?;
    if totals.is_empty() {
        eprintln!("{}", dim("no usage recorded"));
    }
    for (user, tokens) in totals {
        println!("{user:<32}  {tokens:>10} tokens");
    }
    Ok(())
}

/// Parse `--pages` into 1-indexed page numbers; `None` means all pages.
fn parse_pages(s: &str) -> Result<Option<Vec<u32>>> {
    let s = s.trim().to_lowercase();
    if s == "all" {
        return Ok(None);
    }

    let mut pages = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some((start, end)) = part.split_once('-') {
            let start: u32 = start
                .trim()
                .parse()
                .with_context(|| format!("Invalid start page in range '{part}'"))?;
            let end: u32 = end
                .trim()
                .parse()
                .with_context(|| format!("Invalid end page in range '{part}'"))?;
            if start < 1 {
                bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
            }
            if start > end {
                bail!("Invalid page range '{}-{}': start must be <= end", start, end);
            }
            pages.extend(start..=end);
        } else {
            let page: u32 = part
                .parse()
                .with_context(|| format!("Invalid page number: '{part}'"))?;
            if page < 1 {
                bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
            }
            pages.push(page);
        }
    }
    if pages.is_empty() {
        bail!("No pages selected");
    }
    pages.sort_unstable();
    pages.dedup();
    Ok(Some(pages))
}
