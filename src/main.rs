use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Parser};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use clustermap::export::render_svg;
use clustermap::filter::{FilterConfig, filter};
use clustermap::graph::{EntityType, RawGraph, Snapshot};
use clustermap::inventory::InventoryClient;
use clustermap::layout::{LayeredEngine, LayoutCoordinator, PositionedScene};

#[derive(Debug, Parser)]
#[command(
    name = "clustermap",
    about = "Render a cloud topology graph to SVG or serve the interactive explorer."
)]
struct RenderArgs {
    /// Path to a raw graph JSON file. Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Fetch the graph from an inventory service instead of a file.
    #[arg(long = "inventory-url", conflicts_with = "input")]
    inventory_url: Option<String>,

    /// Path to the output SVG file. Use '-' to write to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Hide an entity type. May be given multiple times.
    #[arg(long = "hide-type", value_name = "TYPE")]
    hide_types: Vec<String>,

    /// Keep only nodes whose label contains this text (case-insensitive).
    #[arg(long = "search")]
    search: Option<String>,

    /// Keep only risky permission flows and the nodes they touch.
    #[arg(long = "risk-only", action = ArgAction::SetTrue)]
    risk_only: bool,

    /// Keep only nodes flagged as external.
    #[arg(long = "external-only", action = ArgAction::SetTrue)]
    external_only: bool,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,
}

#[derive(Debug, Clone)]
enum InputSource {
    File(PathBuf),
    Stdin,
    Inventory(String),
}

#[derive(Debug, Clone)]
enum OutputDestination {
    File(PathBuf),
    Stdout,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    if let Err(err) = dispatch().await {
        eprintln!("\u{001b}[31merror:\u{001b}[0m {err:?}");
        std::process::exit(1);
    }
}

async fn dispatch() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        #[cfg(feature = "server")]
        Some("serve") => {
            let serve_args = clustermap::serve::ServeArgs::parse_from(
                std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned()),
            );
            clustermap::serve::run_serve(serve_args).await
        }
        Some("render") => {
            let render_args = RenderArgs::parse_from(
                std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned()),
            );
            run_render(render_args).await
        }
        _ => {
            let render_args = RenderArgs::parse_from(args);
            run_render(render_args).await
        }
    }
}

async fn run_render(cli: RenderArgs) -> Result<()> {
    let input_source = parse_input(cli.input.as_deref(), cli.inventory_url.as_deref())?;
    let output_dest = parse_output(cli.output.as_deref(), &input_source)?;
    let config = build_filter_config(&cli)?;

    let raw = load_graph(&input_source).await?;
    let (snapshot, warnings) = Snapshot::normalize(raw);
    if !cli.quiet {
        for warning in &warnings {
            eprintln!("warning: {warning}");
        }
    }

    let visible = filter(&snapshot, &config);

    let coordinator = LayoutCoordinator::new(LayeredEngine);
    coordinator
        .reposition(visible)
        .await
        .context("layout failed")?;
    let scene = coordinator.scene().await.unwrap_or_default();
    report_empty(&scene, cli.quiet);

    let svg = render_svg(&scene)?;
    write_output(output_dest, svg.as_bytes(), cli.quiet)?;

    Ok(())
}

fn report_empty(scene: &PositionedScene, quiet: bool) {
    if scene.nodes.is_empty() && !quiet {
        eprintln!("no nodes match the active filters");
    }
}

fn build_filter_config(cli: &RenderArgs) -> Result<FilterConfig> {
    let mut config = FilterConfig::default();
    for tag in &cli.hide_types {
        let entity_type = EntityType::from_tag(tag)
            .ok_or_else(|| anyhow!("unknown entity type '{tag}' in --hide-type"))?;
        config.visible_types.remove(&entity_type);
    }
    if let Some(search) = &cli.search {
        config.search_query = search.clone();
    }
    config.risk_only = cli.risk_only;
    config.external_only = cli.external_only;
    Ok(config)
}

fn parse_input(input: Option<&str>, inventory_url: Option<&str>) -> Result<InputSource> {
    if let Some(url) = inventory_url {
        return Ok(InputSource::Inventory(url.to_string()));
    }
    match input {
        Some("-") => Ok(InputSource::Stdin),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if !path.exists() {
                return Err(anyhow!("input file '{path_str}' does not exist"));
            }
            Ok(InputSource::File(path))
        }
        None => Ok(InputSource::Stdin),
    }
}

fn parse_output(output: Option<&str>, input: &InputSource) -> Result<OutputDestination> {
    match output {
        Some("-") => Ok(OutputDestination::Stdout),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(anyhow!(
                        "output directory '{}' does not exist",
                        parent.display()
                    ));
                }
            }
            Ok(OutputDestination::File(path))
        }
        None => match input {
            InputSource::File(path) => {
                let default_name = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| format!("{name}.svg"))
                    .unwrap_or_else(|| "out.svg".to_string());
                let mut default_path = path.to_path_buf();
                default_path.set_file_name(default_name);
                Ok(OutputDestination::File(default_path))
            }
            InputSource::Stdin | InputSource::Inventory(_) => {
                Ok(OutputDestination::File(PathBuf::from("out.svg")))
            }
        },
    }
}

async fn load_graph(source: &InputSource) -> Result<RawGraph> {
    match source {
        InputSource::Stdin => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            if buffer.trim().is_empty() {
                return Err(anyhow!("no graph supplied on stdin"));
            }
            serde_json::from_str(&buffer).context("failed to parse graph JSON from stdin")
        }
        InputSource::File(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            if contents.trim().is_empty() {
                return Err(anyhow!("input file '{}' was empty", path.display()));
            }
            serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse graph JSON from '{}'", path.display()))
        }
        InputSource::Inventory(url) => {
            let client = InventoryClient::new(url);
            let raw = client
                .fetch_graph()
                .await
                .with_context(|| format!("failed to fetch graph from '{url}'"))?;
            Ok(raw)
        }
    }
}

fn write_output(dest: OutputDestination, bytes: &[u8], quiet: bool) -> Result<()> {
    match dest {
        OutputDestination::Stdout => {
            let mut stdout = io::stdout();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
        OutputDestination::File(path) => {
            fs::write(&path, bytes)?;
            if !quiet {
                println!("Generated scene -> {}", path.display());
            }
        }
    }
    Ok(())
}
