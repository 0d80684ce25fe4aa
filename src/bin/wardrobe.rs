//! CLI binary for wardrobe-ingest.
//!
//! A thin shim over the library crate: maps CLI flags to `IngestConfig`,
//! drives an `Ingestor`, and keeps the catalog in a JSON file.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use wardrobe_ingest::{
    recommend, resolve_oracle, shopping_suggestions, BatchOutcome, Catalog, ChatTurn,
    ClothingCategory, IngestConfig, IngestProgressCallback, Ingestor, PriceTier, ProgressCallback,
    ShoppingAdvice,
};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

const TICKS: [&str; 11] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar with one log line per photo.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_batch_start` tells us how many photos there are.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading photos…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, upload_num: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap()
            .remove(&upload_num)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_uploads: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} photos  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&TICKS);

        self.bar.set_length(total_uploads as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Analysing");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Analysing {total_uploads} photos…"))
        ));
    }

    fn on_upload_start(&self, upload_num: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(upload_num, Instant::now());
        self.bar.set_message(format!("photo {upload_num}"));
    }

    fn on_upload_complete(&self, upload_num: usize, total: usize, items_created: usize) {
        let secs = self.elapsed_secs(upload_num);
        let mark = if items_created > 0 { green("✓") } else { dim("·") };
        self.bar.println(format!(
            "  {} Photo {:>3}/{:<3}  {:<10}  {}",
            mark,
            upload_num,
            total,
            dim(&format!("{items_created:>2} items")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_upload_error(&self, upload_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(upload_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Photo {:>3}/{:<3}  {}  {}",
            red("✗"),
            upload_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_region_skipped(&self, upload_num: usize, region: usize, _reason: &str) {
        self.bar.println(format!(
            "    {} photo {} region {} skipped (empty box)",
            dim("↷"),
            upload_num,
            region
        ));
    }

    fn on_batch_complete(&self, total_uploads: usize, items_created: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if items_created == 0 {
            eprintln!("{} no items found in {} photos", red("✘"), total_uploads);
        } else if failed == 0 {
            eprintln!(
                "{} {} items from {} photos",
                green("✔"),
                bold(&items_created.to_string()),
                total_uploads
            );
        } else {
            eprintln!(
                "{} {} items from {} photos  ({} failed)",
                cyan("⚠"),
                bold(&items_created.to_string()),
                total_uploads,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Catalogue a few photos into ./wardrobe.json
  wardrobe ingest closet.jpg shoes.png

  # Photos from the web, with Gemini
  wardrobe --provider gemini ingest https://example.com/outfit.jpg

  # Browse
  wardrobe list --category shoes
  wardrobe list --search denim --json

  # Log an outfit and ask for advice
  wardrobe wear 3f2c9a… 81be04…
  wardrobe style "something smart-casual for a rainy friday" --history chat.json

  # Shopping ideas that fill the gaps; notes steer the next round
  wardrobe shop --tier standard --location "Lyon, FR"
  wardrobe note 5d1e77… "too formal for me"

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (preferred when set)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  WARDROBE_CATALOG        Catalog file (default: wardrobe.json)
  WARDROBE_LOOKBOOK       Saved shopping suggestions (default: lookbook.json)
  RUST_LOG                Tracing filter, overrides -v / -q
"#;

/// Catalogue clothing photos with a vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "wardrobe",
    version,
    about = "Catalogue clothing photos with a vision LLM",
    long_about = "Detect every clothing item in your photos with a vision language model, crop \
each one, and keep the results in a JSON wardrobe catalog. Supports Gemini, OpenAI, Anthropic \
and any OpenAI-compatible endpoint (Ollama, vLLM, LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Catalog JSON file.
    #[arg(long, global = true, env = "WARDROBE_CATALOG", default_value = "wardrobe.json")]
    catalog: PathBuf,

    #[command(flatten)]
    llm: LlmArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "WARDROBE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "WARDROBE_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct LlmArgs {
    /// LLM model ID (e.g. gemini-2.5-flash, gpt-4.1-mini).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama.
    #[arg(long, global = true, env = "WARDROBE_PROVIDER")]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "WARDROBE_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Max LLM output tokens per call.
    #[arg(long, global = true, env = "WARDROBE_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Per-call LLM timeout in seconds.
    #[arg(long, global = true, env = "WARDROBE_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect, crop and catalogue the clothing in one or more photos.
    Ingest(IngestArgs),

    /// List catalog items.
    List {
        /// Only this category: shirt, pants, accessory, shoes, other.
        #[arg(long)]
        category: Option<ClothingCategory>,

        /// Case-insensitive match on name, description, colour or style.
        #[arg(long, default_value = "")]
        search: String,

        /// Print items as JSON (including images).
        #[arg(long)]
        json: bool,
    },

    /// Record that the given items were worn today.
    Wear {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Delete an item from the catalog.
    Remove { id: String },

    /// Ask the stylist for an outfit from your own wardrobe.
    Style {
        message: String,

        /// JSON file holding the conversation so far; updated after each reply.
        #[arg(long, env = "WARDROBE_HISTORY")]
        history: Option<PathBuf>,
    },

    /// Suggest products that complement your wardrobe.
    Shop(ShopArgs),

    /// Leave a note on a suggested product for the next `shop` round.
    Note {
        product_id: String,

        /// Your reaction; an empty string clears the note.
        text: String,

        /// Saved suggestions file.
        #[arg(long, env = "WARDROBE_LOOKBOOK", default_value = "lookbook.json")]
        lookbook: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ShopArgs {
    /// Price range: budget, standard, premium.
    #[arg(long, default_value = "budget")]
    tier: PriceTier,

    /// City or region to price for (default: global).
    #[arg(long, env = "WARDROBE_LOCATION")]
    location: Option<String>,

    /// Saved suggestions file; notes in it are sent along, then it is replaced.
    #[arg(long, env = "WARDROBE_LOOKBOOK", default_value = "lookbook.json")]
    lookbook: PathBuf,

    /// Print the suggestions as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// Local image paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Longest edge of the image sent to the model, in pixels.
    #[arg(long, env = "WARDROBE_MAX_EDGE", default_value_t = 1200)]
    max_edge: u32,

    /// Padding around each detected item, as a fraction of its shorter side.
    #[arg(long, env = "WARDROBE_CROP_PADDING", default_value_t = 0.10)]
    crop_padding: f64,

    /// Path to a text file containing a custom recognition prompt.
    #[arg(long, env = "WARDROBE_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "WARDROBE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print the batch report as JSON.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "WARDROBE_NO_PROGRESS")]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar already reports per-photo results; keep library INFO
    // logs out of its way unless -v was given.
    let bar_active = matches!(&cli.command, Command::Ingest(a) if !a.no_progress && !a.json);
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || bar_active {
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

    match &cli.command {
        Command::Ingest(args) => run_ingest(&cli, args).await,
        Command::List {
            category,
            search,
            json,
        } => run_list(&cli.catalog, *category, search, *json),
        Command::Wear { ids } => run_wear(&cli, ids),
        Command::Remove { id } => run_remove(&cli, id),
        Command::Style { message, history } => run_style(&cli, message, history.as_deref()).await,
        Command::Shop(args) => run_shop(&cli, args).await,
        Command::Note {
            product_id,
            text,
            lookbook,
        } => run_note(&cli, lookbook, product_id, text),
    }
}

async fn run_ingest(cli: &Cli, args: &IngestArgs) -> Result<()> {
    let show_progress = !cli.quiet && !args.no_progress && !args.json;
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn IngestProgressCallback>)
    } else {
        None
    };

    let config = build_config(cli, Some(args), progress_cb).await?;
    let ingestor = Arc::new(Ingestor::from_config(config).context("No usable LLM provider")?);

    let enqueued = ingestor
        .enqueue_paths(&args.inputs)
        .await
        .context("Failed to read photos")?;
    for failure in &enqueued.failures {
        eprintln!("  {} {}", red("✗"), failure);
    }

    // Ctrl-C stops before the next photo; the one in flight still finishes.
    let cancel = ingestor.cancel_handle();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} stopping after the current photo…", cyan("◆"));
            cancel.cancel();
        }
    });

    let report = ingestor.run().await.context("Ingestion failed")?;
    watcher.abort();

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    }

    if report.outcome == BatchOutcome::NoItemsDetected {
        anyhow::bail!(
            "No clothing items detected in {} photos; try clearer, well-lit photos",
            report.stats.total_uploads
        );
    }

    let mut catalog = Catalog::load(&cli.catalog)?;
    let added = catalog.add_items(report.items);
    catalog.save(&cli.catalog)?;

    if !cli.quiet {
        eprintln!(
            "{}  {} items added  →  {}",
            green("✔"),
            added,
            bold(&cli.catalog.display().to_string())
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out  /  {}ms total",
            dim(&report.stats.total_input_tokens.to_string()),
            dim(&report.stats.total_output_tokens.to_string()),
            report.stats.total_duration_ms,
        );
    }
    Ok(())
}

fn run_list(path: &Path, category: Option<ClothingCategory>, search: &str, json: bool) -> Result<()> {
    let catalog = Catalog::load(path)?;
    let items: Vec<_> = catalog.filter(category, search).collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&items).context("Failed to serialise items")?
        );
        return Ok(());
    }

    if items.is_empty() {
        eprintln!("{}", dim("No matching items."));
        return Ok(());
    }
    for item in &items {
        println!(
            "{}  {:<9}  {:<28}  {:<12}  {}",
            dim(&item.id),
            item.category,
            item.name,
            item.color,
            dim(&format!("worn {}×", item.wear_count)),
        );
    }
    eprintln!("{}", dim(&format!("{} of {} items", items.len(), catalog.len())));
    Ok(())
}

fn run_wear(cli: &Cli, ids: &[String]) -> Result<()> {
    let mut catalog = Catalog::load(&cli.catalog)?;
    let touched = catalog.mark_worn(ids);
    if touched == 0 {
        anyhow::bail!("None of the given ids are in {}", cli.catalog.display());
    }
    catalog.save(&cli.catalog)?;
    if !cli.quiet {
        eprintln!("{} logged {} items as worn", green("✔"), touched);
    }
    Ok(())
}

fn run_remove(cli: &Cli, id: &str) -> Result<()> {
    let mut catalog = Catalog::load(&cli.catalog)?;
    let removed = catalog.delete_item(id)?;
    catalog.save(&cli.catalog)?;
    if !cli.quiet {
        eprintln!("{} removed {}", green("✔"), bold(&removed.name));
    }
    Ok(())
}

async fn run_style(cli: &Cli, message: &str, history_path: Option<&Path>) -> Result<()> {
    let catalog = Catalog::load(&cli.catalog)?;
    if catalog.is_empty() {
        anyhow::bail!(
            "{} is empty; run `wardrobe ingest` first",
            cli.catalog.display()
        );
    }

    let mut history: Vec<ChatTurn> = match history_path {
        Some(p) if p.exists() => {
            let text = tokio::fs::read_to_string(p)
                .await
                .with_context(|| format!("Failed to read chat history from {p:?}"))?;
            serde_json::from_str(&text).with_context(|| format!("Invalid chat history in {p:?}"))?
        }
        _ => Vec::new(),
    };

    let config = build_config(cli, None, None).await?;
    let oracle = resolve_oracle(&config).context("No usable LLM provider")?;

    let reply = recommend(oracle.as_ref(), &catalog, &history, message, &config)
        .await
        .context("Stylist request failed")?
        .context("The stylist returned an unreadable answer; try rephrasing")?;

    println!("{}", reply.text);
    for id in &reply.item_ids {
        if let Some(item) = catalog.get(id) {
            println!("  {} {}  {}", cyan("•"), item.name, dim(&item.id));
        }
    }

    if let Some(p) = history_path {
        history.push(ChatTurn::user(message));
        history.push(ChatTurn::model(&reply));
        let json = serde_json::to_string_pretty(&history).context("Failed to serialise history")?;
        tokio::fs::write(p, json)
            .await
            .with_context(|| format!("Failed to write chat history to {p:?}"))?;
    }
    Ok(())
}

async fn run_shop(cli: &Cli, args: &ShopArgs) -> Result<()> {
    let catalog = Catalog::load(&cli.catalog)?;
    if catalog.is_empty() {
        anyhow::bail!(
            "{} is empty; run `wardrobe ingest` first",
            cli.catalog.display()
        );
    }

    let previous = ShoppingAdvice::load(&args.lookbook)?;
    let feedback = previous.feedback();

    let config = build_config(cli, None, None).await?;
    let oracle = resolve_oracle(&config).context("No usable LLM provider")?;

    let advice = shopping_suggestions(
        oracle.as_ref(),
        &catalog,
        args.tier,
        args.location.as_deref(),
        &feedback,
        &config,
    )
    .await
    .context("Shopping request failed")?
    .context("The model returned no usable suggestions; try again")?;

    advice.save(&args.lookbook)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&advice)?);
        return Ok(());
    }

    if !advice.advice.is_empty() {
        println!("{}\n", advice.advice);
    }
    for p in &advice.products {
        println!("  {} {}  {}  {}", cyan("•"), bold(&p.name), p.price, dim(&p.store));
        if !p.reason.is_empty() {
            println!("    {}", p.reason);
        }
        if let Some(ref url) = p.url {
            println!("    {}", dim(url));
        }
        println!("    {}", dim(&format!("id {}", p.id)));
    }
    Ok(())
}

fn run_note(cli: &Cli, lookbook: &Path, product_id: &str, text: &str) -> Result<()> {
    let mut advice = ShoppingAdvice::load(lookbook)?;
    advice.set_feedback(product_id, text)?;
    advice.save(lookbook)?;
    if !cli.quiet {
        eprintln!("{} note saved for {}", green("✔"), product_id);
    }
    Ok(())
}

/// Map CLI args to `IngestConfig`.
async fn build_config(
    cli: &Cli,
    ingest: Option<&IngestArgs>,
    progress: Option<ProgressCallback>,
) -> Result<IngestConfig> {
    let mut builder = IngestConfig::builder()
        .temperature(cli.llm.temperature)
        .max_tokens(cli.llm.max_tokens)
        .api_timeout_secs(cli.llm.api_timeout);

    if let Some(ref model) = cli.llm.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.llm.provider {
        builder = builder.provider_name(provider);
    }

    if let Some(args) = ingest {
        builder = builder
            .max_edge(args.max_edge)
            .crop_padding(args.crop_padding)
            .download_timeout_secs(args.download_timeout);

        if let Some(ref path) = args.system_prompt {
            let prompt = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
            builder = builder.system_prompt(prompt);
        }
    }

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
