mod cli;

use mediaforge::conversion::{ConversionExecutor, ConversionQueue, ItemEdit, StatusKind};
use mediaforge::InputFile;
use mf_av::ToolRegistry;
use mf_core::config::Config;
use mf_core::events::EventBus;
use mf_core::{registry, Dimensions, ItemId, MediaCategory, OutputFormat};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mediaforge=trace,mf_av=debug,mf_core=debug".to_string()
        } else {
            "mediaforge=info,mf_av=info,mf_core=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Convert {
            files,
            format,
            width,
            height,
            no_aspect_lock,
            output_dir,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            let settings = ConvertSettings::new(format, width, height, no_aspect_lock);
            rt.block_on(convert_files(
                &files,
                &settings,
                &output_dir,
                cli.config.as_deref(),
            ))
        }
        Commands::Formats { target } => list_formats(&target),
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&file, json, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate { file } => {
            let path = file.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("mediaforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

struct ConvertSettings {
    format: Option<OutputFormat>,
    width: Option<u32>,
    height: Option<u32>,
    aspect_lock: bool,
}

impl ConvertSettings {
    /// Explicit width and height together leave nothing to derive, so the
    /// lock is dropped.
    fn new(format: Option<OutputFormat>, width: Option<u32>, height: Option<u32>, no_aspect_lock: bool) -> Self {
        Self {
            format,
            width,
            height,
            aspect_lock: !no_aspect_lock && !(width.is_some() && height.is_some()),
        }
    }

    fn edits(&self, category: MediaCategory) -> Vec<ItemEdit> {
        let mut edits = Vec::new();
        if !self.aspect_lock {
            edits.push(ItemEdit::MaintainAspectRatio(false));
        }
        if let Some(format) = self.format {
            edits.push(ItemEdit::OutputFormat(format));
        }
        if category.supports_dimensions() {
            if let Some(w) = self.width {
                edits.push(ItemEdit::Width(Some(w)));
            }
            if let Some(h) = self.height {
                edits.push(ItemEdit::Height(Some(h)));
            }
        }
        edits
    }
}

async fn convert_files(
    files: &[PathBuf],
    settings: &ConvertSettings,
    output_dir: &Path,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = Config::load_or_default(config_path);
    for warning in config.validate() {
        tracing::warn!("{warning}");
    }

    let mut inputs = Vec::with_capacity(files.len());
    for path in files {
        let input = InputFile::from_path(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        inputs.push(input);
    }

    let queue = ConversionQueue::from_config(&config);
    let submitted = inputs.len();
    let ids = queue.add_files(inputs).await;
    if ids.len() < submitted {
        println!("Skipped {} unsupported file(s)", submitted - ids.len());
    }
    if ids.is_empty() {
        anyhow::bail!("No supported files to convert");
    }

    for item in queue.items() {
        for edit in settings.edits(item.category) {
            if let Err(e) = queue.update_item(item.id, edit) {
                println!("! {}: {e}; keeping {}", item.name, item.output_format);
            }
        }
    }

    let summary = queue.convert_all().await;

    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let mut used = HashSet::new();
    let mut written: HashMap<ItemId, PathBuf> = HashMap::new();
    for download in queue.downloads() {
        let path = output_dir.join(unique_name(&mut used, &download.file_name));
        tokio::fs::write(&path, &download.bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.insert(download.item_id, path);
    }

    for item in queue.items() {
        match item.status {
            StatusKind::Complete => {
                let dest = written
                    .get(&item.id)
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                println!("✓ {} -> {}", item.name, dest);
            }
            StatusKind::Error => println!(
                "✗ {}: {}",
                item.name,
                item.error.as_deref().unwrap_or("conversion failed")
            ),
            other => println!("- {}: {other}", item.name),
        }
    }

    println!(
        "\n{} converted, {} failed",
        summary.completed, summary.failed
    );

    if summary.failed > 0 {
        anyhow::bail!("{} of {} conversions failed", summary.failed, ids.len());
    }
    Ok(())
}

/// `name`, or `stem-N.ext` if an earlier output already took it.
fn unique_name(used: &mut HashSet<String>, name: &str) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = name.rsplit_once('.').unwrap_or((name, ""));
    (1..)
        .map(|n| {
            if ext.is_empty() {
                format!("{stem}-{n}")
            } else {
                format!("{stem}-{n}.{ext}")
            }
        })
        .find(|candidate| used.insert(candidate.clone()))
        .unwrap_or_else(|| name.to_string())
}

fn list_formats(target: &str) -> Result<()> {
    let mime = if target.contains('/') && !registry::allowed_outputs(target).is_empty() {
        target.to_ascii_lowercase()
    } else {
        let name = Path::new(target)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| target.to_string());
        registry::effective_mime_type(&name, "")
    };

    let outputs = registry::allowed_outputs(&mime);
    if outputs.is_empty() {
        anyhow::bail!("unsupported media type: {:?}", mime);
    }

    println!("{} ({})", mime, registry::classify(&mime));
    for (i, format) in outputs.iter().enumerate() {
        if i == 0 {
            println!("  {format} (default)");
        } else {
            println!("  {format}");
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ProbeReport {
    name: String,
    size: usize,
    effective_mime: String,
    category: MediaCategory,
    legacy: bool,
    dimensions: Option<Dimensions>,
    outputs: Vec<OutputFormat>,
}

async fn probe_file(file: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = Config::load_or_default(config_path);
    let tools = ToolRegistry::discover(&config.tools);
    let executor = ConversionExecutor::from_config(&config, &tools, Arc::new(EventBus::default()));

    let input = InputFile::from_path(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let effective_mime = input.effective_mime_type();
    let report = ProbeReport {
        name: input.name.clone(),
        size: input.len(),
        category: registry::classify(&effective_mime),
        legacy: input.is_legacy_image(),
        dimensions: executor.probe(&input).await,
        outputs: registry::allowed_outputs(&effective_mime).to_vec(),
        effective_mime,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("File: {}", report.name);
    println!("Size: {} bytes", report.size);
    if report.effective_mime.is_empty() {
        println!("Type: unknown");
    } else {
        println!("Type: {} ({})", report.effective_mime, report.category);
    }
    if report.legacy {
        println!("Legacy image: yes (normalised before decoding)");
    }
    match report.dimensions {
        Some(d) => println!("Dimensions: {d}"),
        None => println!("Dimensions: unknown"),
    }
    if report.outputs.is_empty() {
        println!("Outputs: none (unsupported)");
    } else {
        let list: Vec<String> = report.outputs.iter().map(|f| f.to_string()).collect();
        println!("Outputs: {}", list.join(", "));
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All tools are available!");
    } else {
        println!("Some tools are missing. Audio/video, HEIC input or video sizing may be unavailable.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = Config::load(p).with_context(|| format!("Invalid config {}", p.display()))?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let c = &config.conversion;
    println!("  Image quality: {}", c.image_quality);
    println!("  GIF: {}px wide at {} fps", c.gif_default_width, c.gif_fps);
    println!("  AAC bitrate: {}", c.audio_bitrate);
    println!("  Command timeout: {}s", c.command_timeout_secs);

    let warnings = config.validate();
    for warning in &warnings {
        println!("  ! {warning}");
    }

    Ok(())
}
