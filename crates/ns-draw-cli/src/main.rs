//! ns-draw CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ns_draw::{Aliases, Bins, DrawOptions, Drawer, FlowPolicy, Table, fold_draw};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "ns-draw")]
#[command(about = "ns-draw - draw expressions over jagged event columns")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Draw an expression ("x" or "x:y") into a histogram or flat arrays
    Draw {
        /// Input table (JSON object of flat or jagged columns)
        #[arg(short, long)]
        input: PathBuf,

        /// Draw expression, e.g. "sum(Jet_pt[:2])" or "Jet_pt:Jet_eta"
        #[arg(short, long)]
        expr: String,

        /// Selection expression
        #[arg(long)]
        sel: Option<String>,

        /// Weight expression
        #[arg(long)]
        weights: Option<String>,

        /// X binning as "n,lo,hi" (automatic if omitted)
        #[arg(long)]
        bins: Option<Bins>,

        /// Y binning as "n,lo,hi" for 2D draws (defaults to --bins)
        #[arg(long)]
        y_bins: Option<Bins>,

        /// Fold under/overflow into the edge bins
        #[arg(long)]
        fold_flow: bool,

        /// Draw options file (JSON); command-line flags take precedence.
        #[arg(long)]
        options: Option<PathBuf>,

        /// Alias table (JSON object of name -> expression)
        #[arg(long)]
        aliases: Option<PathBuf>,

        /// Emit the aligned flat arrays instead of a histogram
        #[arg(long, conflicts_with = "chunk_rows")]
        arrays: bool,

        /// Split the table into chunks of this many rows and fold the histograms
        #[arg(long)]
        chunk_rows: Option<usize>,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the columns a draw would read
    Columns {
        /// Draw expression
        #[arg(short, long)]
        expr: String,

        /// Selection expression
        #[arg(long)]
        sel: Option<String>,

        /// Weight expression
        #[arg(long)]
        weights: Option<String>,

        /// Alias table (JSON object of name -> expression)
        #[arg(long)]
        aliases: Option<PathBuf>,

        /// Reserved words to report as columns anyway
        #[arg(long)]
        whitelist: Vec<String>,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Draw {
            input,
            expr,
            sel,
            weights,
            bins,
            y_bins,
            fold_flow,
            options,
            aliases,
            arrays,
            chunk_rows,
            output,
        } => {
            let mut opts = match options {
                Some(path) => read_json::<DrawOptions>(&path)?,
                None => DrawOptions::default(),
            };
            if bins.is_some() {
                opts.bins = bins;
            }
            if y_bins.is_some() {
                opts.y_bins = y_bins;
            }
            if fold_flow {
                opts.flow_policy = FlowPolicy::Fold;
            }
            let request = DrawRequest { expr, sel, weights, arrays, chunk_rows };
            cmd_draw(&input, aliases.as_deref(), opts, &request, output.as_ref())
        }
        Commands::Columns { expr, sel, weights, aliases, whitelist, output } => cmd_columns(
            &expr,
            sel.as_deref(),
            weights.as_deref(),
            aliases.as_deref(),
            &whitelist,
            output.as_ref(),
        ),
    }
}

struct DrawRequest {
    expr: String,
    sel: Option<String>,
    weights: Option<String>,
    arrays: bool,
    chunk_rows: Option<usize>,
}

fn cmd_draw(
    input: &Path,
    aliases: Option<&Path>,
    options: DrawOptions,
    request: &DrawRequest,
    output: Option<&PathBuf>,
) -> Result<()> {
    tracing::info!(path = %input.display(), "loading table");
    let table: Table = read_json(input)?;
    tracing::info!(rows = ns_draw::ColumnSource::n_rows(&table), "table loaded");

    let mut drawer = Drawer::new().with_options(options).with_aliases(load_aliases(aliases)?);
    let sel = request.sel.as_deref();
    let weights = request.weights.as_deref();

    let output_json = if request.arrays {
        let arrays = drawer.draw_arrays(&table, &request.expr, sel, weights)?;
        tracing::info!(points = arrays.len(), "draw complete");
        serde_json::json!({
            "expr": request.expr,
            "selection": sel,
            "weight": weights,
            "n": arrays.len(),
            "dims": arrays.dims,
            "weights": arrays.weights,
        })
    } else if let Some(rows) = request.chunk_rows {
        let summary =
            fold_draw(&mut drawer, table.chunks(rows).map(Ok), &request.expr, sel, weights)?;
        tracing::info!(chunks = summary.chunks, rows = summary.rows, "fold complete");
        serde_json::json!({
            "expr": request.expr,
            "selection": sel,
            "weight": weights,
            "chunks": summary.chunks,
            "rows": summary.rows,
            "histogram": summary.hist,
        })
    } else {
        let hist = drawer.draw_hist(&table, &request.expr, sel, weights)?;
        tracing::info!(entries = hist.entries(), integral = hist.integral(), "draw complete");
        serde_json::json!({
            "expr": request.expr,
            "selection": sel,
            "weight": weights,
            "histogram": hist,
        })
    };

    write_json(output, output_json)
}

fn cmd_columns(
    expr: &str,
    sel: Option<&str>,
    weights: Option<&str>,
    aliases: Option<&Path>,
    whitelist: &[String],
    output: Option<&PathBuf>,
) -> Result<()> {
    let mut drawer =
        Drawer::new().with_aliases(load_aliases(aliases)?).with_whitelist(whitelist.to_vec());
    let columns = drawer.required_columns(expr, sel, weights)?;
    write_json(output, serde_json::json!({ "columns": columns }))
}

fn load_aliases(path: Option<&Path>) -> Result<Aliases> {
    match path {
        Some(p) => read_json(p),
        None => Ok(Aliases::new()),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
