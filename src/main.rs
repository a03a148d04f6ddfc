use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use log::info;

use rgmatrix::{
    ExecutionMode, GraphLoader, MatrixKind, ReductionConfig, ReductionWorkflow, ReportWriter,
    SelectionLoader, SpectralCache, default_file_name,
};

const USAGE: &str = "usage: rgmatrix <sequential|parallel> <network_file> <damping_delta> \
<print_interval> <print_number> <ten_number> <node_file> <name_file|-> [limit] \
[--matrix gr|grr|gpr|gqr|gi|all] [--output-dir DIR] [--cache DIR] [--threads N]";

fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

#[derive(Debug, Clone, PartialEq)]
struct CliArgs {
    mode: ExecutionMode,
    network: PathBuf,
    damping: f64,
    print_interval: usize,
    print_number: String,
    ten_number: String,
    node_file: PathBuf,
    name_file: Option<PathBuf>,
    limit: Option<usize>,
    matrices: Vec<MatrixKind>,
    output_dir: PathBuf,
    cache: Option<PathBuf>,
    threads: Option<usize>,
}

fn parse_args<I>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = String>,
{
    let mut positional = Vec::new();
    let mut matrices = vec![MatrixKind::Qr];
    let mut output_dir = PathBuf::from(".");
    let mut cache = None;
    let mut threads = None;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .ok_or_else(|| anyhow!("{flag} expects a value\n{USAGE}"))
        };
        match arg.as_str() {
            "-h" | "--help" => bail!("{USAGE}"),
            "--matrix" => {
                let choice = value("--matrix")?;
                matrices = if choice.eq_ignore_ascii_case("all") {
                    MatrixKind::ALL.to_vec()
                } else {
                    vec![choice.parse::<MatrixKind>().map_err(anyhow::Error::msg)?]
                };
            }
            "--output-dir" => output_dir = PathBuf::from(value("--output-dir")?),
            "--cache" => cache = Some(PathBuf::from(value("--cache")?)),
            "--threads" => {
                let raw = value("--threads")?;
                threads = Some(
                    raw.parse::<usize>()
                        .with_context(|| format!("invalid thread count {raw:?}"))?,
                );
            }
            flag if flag.starts_with("--") => bail!("unknown option {flag}\n{USAGE}"),
            _ => positional.push(arg),
        }
    }

    if !(8..=9).contains(&positional.len()) {
        bail!(
            "expected 8 or 9 positional arguments, got {}\n{USAGE}",
            positional.len()
        );
    }
    let mut positional = positional.into_iter();
    let mut next = || positional.next().unwrap_or_default();

    let mode = next().parse::<ExecutionMode>().map_err(anyhow::Error::msg)?;
    let network = PathBuf::from(next());
    let raw = next();
    let damping: f64 = raw
        .parse()
        .with_context(|| format!("invalid damping_delta {raw:?}"))?;
    let raw = next();
    let print_interval: usize = raw
        .parse()
        .with_context(|| format!("invalid print_interval {raw:?}"))?;
    let print_number = next();
    let ten_number = next();
    let node_file = PathBuf::from(next());
    let name_file = Some(next())
        .filter(|name| name != "-")
        .map(PathBuf::from);
    let limit = match next() {
        raw if raw.is_empty() => None,
        raw => Some(
            raw.parse::<usize>()
                .with_context(|| format!("invalid limit {raw:?}"))?,
        ),
    };

    Ok(CliArgs {
        mode,
        network,
        damping,
        print_interval,
        print_number,
        ten_number,
        node_file,
        name_file,
        limit,
        matrices,
        output_dir,
        cache,
        threads,
    })
}

fn main() -> Result<()> {
    init_logging();
    let args = parse_args(env::args().skip(1))?;

    info!("mode           = {}", args.mode);
    info!("network file   = {:?}", args.network);
    info!("1-alpha        = {}", args.damping);
    info!("print interval = {}", args.print_interval);
    info!("print number   = {}", args.print_number);
    info!("ten number     = {}", args.ten_number);
    info!("node file      = {:?}", args.node_file);
    info!("name file      = {:?}", args.name_file);

    let load_start = Instant::now();
    let graph = GraphLoader::from_path(&args.network)?;
    info!(
        "network: {} nodes, {} edges, {} dangling (loaded in {:.3?})",
        graph.node_count(),
        graph.edge_count(),
        graph.dangling().len(),
        load_start.elapsed()
    );

    let selection = SelectionLoader::new()
        .with_limit(args.limit)
        .load(&args.node_file, args.name_file.as_deref(), graph.node_count())?;
    let selection = Arc::new(selection);
    let nr = selection.len();
    info!("selected nodes: {}", nr);

    let config = ReductionConfig {
        damping: args.damping,
        check_interval: args.print_interval,
        mode: args.mode,
        threads: args.threads,
        ..ReductionConfig::default()
    };
    let mut workflow = ReductionWorkflow::new(config, graph, Arc::clone(&selection));
    if let Some(root) = &args.cache {
        workflow = workflow.with_cache(SpectralCache::new(root));
    }
    let summary = workflow.execute()?;
    info!(
        "dlambda = {:.16}, spectral {:.3?}, reduction {:.3?}",
        summary.spectral.dlambda, summary.spectral_duration, summary.reduction_duration
    );

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("create output directory {:?}", args.output_dir))?;
    let writer = ReportWriter::new(&selection);
    for kind in &args.matrices {
        let write_start = Instant::now();
        let path = args
            .output_dir
            .join(default_file_name(*kind, &args.network, &args.node_file, nr));
        writer.write_to_path(*kind, summary.matrices.get(*kind), &path)?;
        info!("wrote {} to {:?} in {:.3?}", kind, path, write_start.elapsed());
    }
    Ok(())
}
