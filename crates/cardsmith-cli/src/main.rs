use cardsmith::export::{
    CardExporter, EmbedError, EmbedOptions, ExportError, ExportRequest, FetchError, PngOptions,
    RasterError, has_external_images, svg_to_png,
};
use cardsmith::{
    BoxSize, HeuristicTextMeasurer, TextFitOptions, TextMeasurer, TextStyle, default_measurer,
    fit_text,
};
use clap::{Args, Parser, Subcommand};
use std::borrow::Cow;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl CliError {
    /// 3 when the input itself was rejected, 1 for everything else.
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Raster(err) if err.is_validation() => 3,
            CliError::Export(err) if err.status_code() == 400 => 3,
            _ => 1,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "cardsmith",
    version,
    about = "Measure and fit card text, export card SVGs to PNG"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the rendered width of a string in px
    Measure(MeasureArgs),
    /// Find the largest font size at which text fits a box; prints JSON
    Fit(FitArgs),
    /// Inline external images as data URIs; prints SVG
    Embed(EmbedArgs),
    /// Rasterize an SVG to PNG
    Render(RenderArgs),
    /// Run an export request (`{"svg": ..., "filename": ...}`) and write the PNG
    Export(ExportArgs),
}

#[derive(Debug, Args)]
struct FontArgs {
    #[arg(long, default_value = "sans-serif")]
    family: String,
    #[arg(long)]
    weight: Option<String>,
    #[arg(long)]
    style: Option<String>,
    /// Use the character-count heuristic even when system fonts are available
    #[arg(long)]
    heuristic: bool,
}

impl FontArgs {
    fn measurer(&self) -> &'static dyn TextMeasurer {
        static HEURISTIC: HeuristicTextMeasurer = HeuristicTextMeasurer;
        if self.heuristic {
            &HEURISTIC
        } else {
            default_measurer()
        }
    }
}

#[derive(Debug, Args)]
struct MeasureArgs {
    #[command(flatten)]
    font: FontArgs,
    #[arg(long, default_value_t = 16.0)]
    size: f64,
    text: String,
}

#[derive(Debug, Args)]
struct FitArgs {
    #[command(flatten)]
    font: FontArgs,
    #[arg(long)]
    width: f64,
    #[arg(long)]
    height: f64,
    #[arg(long)]
    min: Option<f64>,
    #[arg(long)]
    max: Option<f64>,
    #[arg(long)]
    inset: Option<f64>,
    #[arg(long)]
    single_line: bool,
    #[arg(long)]
    line_height: Option<f64>,
    /// JSON file with fit options (camelCase keys); flags override its values
    #[arg(long)]
    options: Option<PathBuf>,
    #[arg(long)]
    pretty: bool,
    text: String,
}

#[derive(Debug, Args)]
struct FetchArgs {
    #[arg(long, default_value_t = 3)]
    concurrency: usize,
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,
    /// Fail when any image cannot be fetched
    #[arg(long)]
    strict: bool,
}

impl FetchArgs {
    fn embed_options(&self) -> EmbedOptions {
        EmbedOptions {
            concurrency: self.concurrency,
            timeout: Duration::from_millis(self.timeout_ms),
            throw_on_error: self.strict,
        }
    }
}

#[derive(Debug, Args)]
struct EmbedArgs {
    #[command(flatten)]
    fetch: FetchArgs,
    #[arg(long)]
    out: Option<PathBuf>,
    /// SVG file; `-` or omitted reads stdin
    input: Option<String>,
}

#[derive(Debug, Args)]
struct RenderArgs {
    #[command(flatten)]
    fetch: FetchArgs,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    /// CSS color (`#rrggbb`, `#rgb`, `white`, ...) painted beneath the SVG
    #[arg(long)]
    background: Option<String>,
    #[arg(long, default_value_t = 0)]
    bleed: u32,
    /// Rasterize as-is; external images are left out of the PNG
    #[arg(long)]
    no_embed: bool,
    #[arg(long)]
    skip_validation: bool,
    /// Output path; defaults to the input path with a `.png` extension. `-` writes stdout.
    #[arg(long)]
    out: Option<String>,
    input: Option<String>,
}

#[derive(Debug, Args)]
struct ExportArgs {
    #[command(flatten)]
    fetch: FetchArgs,
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
    /// Request JSON file; `-` or omitted reads stdin
    input: Option<String>,
}

fn read_input(input: Option<&str>) -> Result<String, CliError> {
    match input {
        None | Some("-") => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
        Some(path) => Ok(std::fs::read_to_string(path)?),
    }
}

fn write_output(bytes: &[u8], out: Option<&Path>) -> Result<(), CliError> {
    match out {
        None => std::io::stdout().lock().write_all(bytes)?,
        Some(path) => std::fs::write(path, bytes)?,
    }
    Ok(())
}

fn default_raster_out_path(input: Option<&str>, ext: &str) -> PathBuf {
    match input {
        Some(path) if path != "-" => PathBuf::from(path).with_extension(ext),
        _ => PathBuf::from(format!("out.{ext}")),
    }
}

fn fit_options(args: &FitArgs) -> Result<TextFitOptions, CliError> {
    let mut options = match &args.options {
        Some(path) => serde_json::from_str::<TextFitOptions>(&std::fs::read_to_string(path)?)?,
        None => TextFitOptions::default(),
    };
    if let Some(min) = args.min {
        options.min_size = min;
    }
    if let Some(max) = args.max {
        options.max_size = max;
    }
    if let Some(inset) = args.inset {
        options.inset = inset;
    }
    if let Some(ratio) = args.line_height {
        options.line_height_ratio = ratio;
    }
    if args.single_line {
        options.single_line = true;
    }
    if let Some(weight) = &args.font.weight {
        options.font_weight = weight.clone();
    }
    if let Some(style) = &args.font.style {
        options.font_style = style.clone();
    }
    Ok(options)
}

async fn embed_if_needed<'a>(
    svg: &'a str,
    fetch: &FetchArgs,
) -> Result<Cow<'a, str>, CliError> {
    if !has_external_images(svg) {
        return Ok(Cow::Borrowed(svg));
    }
    let exporter = CardExporter::http()?.embed_options(fetch.embed_options());
    Ok(exporter.embed(svg).await?)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Measure(args) => {
            let mut style = TextStyle::new(&args.font.family, args.size);
            style.font_weight = args.font.weight.clone();
            style.font_style = args.font.style.clone();
            let width = args.font.measurer().measure_width(&args.text, &style);
            println!("{width}");
        }
        Command::Fit(args) => {
            let options = fit_options(&args)?;
            let result = fit_text(
                &args.text,
                BoxSize::new(args.width, args.height),
                &args.font.family,
                args.font.measurer(),
                &options,
            );
            let stdout = std::io::stdout().lock();
            if args.pretty {
                serde_json::to_writer_pretty(stdout, &result)?;
            } else {
                serde_json::to_writer(stdout, &result)?;
            }
            println!();
        }
        Command::Embed(args) => {
            let svg = read_input(args.input.as_deref())?;
            let embedded = embed_if_needed(&svg, &args.fetch).await?;
            write_output(embedded.as_bytes(), args.out.as_deref())?;
        }
        Command::Render(args) => {
            let svg = read_input(args.input.as_deref())?;
            let svg = if args.no_embed {
                Cow::Borrowed(svg.as_str())
            } else {
                embed_if_needed(&svg, &args.fetch).await?
            };
            let options = PngOptions {
                width: args.width,
                height: args.height,
                background_color: args.background.clone(),
                bleed: args.bleed,
                skip_validation: args.skip_validation,
                ..Default::default()
            };
            let png = svg_to_png(&svg, &options).await?;
            let out = args.out.clone().unwrap_or_else(|| {
                default_raster_out_path(args.input.as_deref(), "png")
                    .to_string_lossy()
                    .to_string()
            });
            if out == "-" {
                write_output(&png.buffer, None)?;
            } else {
                write_output(&png.buffer, Some(Path::new(&out)))?;
                tracing::info!(path = %out, width = png.width, height = png.height, "wrote PNG");
            }
        }
        Command::Export(args) => {
            let body = read_input(args.input.as_deref())?;
            let request = ExportRequest::from_json(body.as_bytes())?;
            let exporter = CardExporter::http()?.embed_options(args.fetch.embed_options());
            let response = exporter.export(&request).await?;

            std::fs::create_dir_all(&args.out_dir)?;
            let path = args.out_dir.join(&response.filename);
            std::fs::write(&path, &response.body)?;
            println!("Content-Type: {}", response.content_type);
            println!("Content-Disposition: {}", response.content_disposition);
            println!("Content-Length: {}", response.body.len());
            tracing::info!(path = %path.display(), "wrote export");
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start async runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(run(cli)) {
        eprintln!("{err}");
        std::process::exit(err.exit_code());
    }
}
