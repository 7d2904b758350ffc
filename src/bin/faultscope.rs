use anyhow::Context;
use clap::Parser;
use faultscope::boundary::Channel;
use faultscope::config::EngineConfig;
use faultscope::engine::Engine;
use faultscope::filter::{sort_records, RecordFilter, SortKey};
use faultscope::telemetry;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "faultscope", version, about = "Streaming error tracking for process output")]
struct Cli {
    /// Input files (`-` for stdin). May be repeated; stdin when empty.
    #[arg(required = false)]
    input: Vec<String>,

    /// Source name the input is attributed to
    #[arg(long = "source", default_value = "stdin")]
    source: String,

    /// Treat input as the process's error stream
    #[arg(long = "stderr", default_value_t = false)]
    stderr: bool,

    /// JSON engine configuration
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Aggregation window in days
    #[arg(long = "days", default_value_t = 7)]
    days: u32,

    /// Number of frequent errors to report
    #[arg(long = "top", default_value_t = 10)]
    top: usize,

    /// Only report records whose text contains this keyword
    #[arg(long = "match")]
    keyword: Option<String>,

    #[arg(long = "pretty", default_value_t = false)]
    pretty: bool,

    /// -v info, -vv debug, -vvv trace
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn feed_reader<R: BufRead>(
    engine: &Engine,
    source: &str,
    channel: Channel,
    reader: R,
    running: &AtomicBool,
) -> io::Result<()> {
    for line in reader.lines() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let mut line = line?;
        line.push('\n');
        engine.feed(source, &line, channel);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let engine = Engine::new(config).context("starting engine")?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let r = running.clone();
        let _ = ctrlc::set_handler(move || r.store(false, Ordering::SeqCst));
    }

    let channel = if cli.stderr { Channel::Secondary } else { Channel::Primary };
    let inputs = if cli.input.is_empty() { vec!["-".to_string()] } else { cli.input.clone() };
    for p in &inputs {
        if p == "-" {
            let stdin = io::stdin();
            feed_reader(&engine, &cli.source, channel, stdin.lock(), &running)?;
        } else {
            let f = File::open(p).with_context(|| format!("opening {p}"))?;
            feed_reader(&engine, &cli.source, channel, BufReader::new(f), &running)?;
        }
    }

    engine.source_ended(&cli.source);
    let grace = engine.config().shutdown_grace();
    if !engine.wait_idle(grace) {
        tracing::warn!("pipeline still busy after {:?}; reporting partial results", grace);
    }

    let aggregator = engine.aggregator();
    let mut filter = RecordFilter::new();
    if let Some(kw) = &cli.keyword {
        filter = filter.keyword(kw);
    }
    let mut records = filter.apply(&engine.store().query_recent(cli.days));
    sort_records(&mut records, SortKey::Occurrences, true);

    let report = serde_json::json!({
        "source": cli.source,
        "window_days": cli.days,
        "records": records,
        "distribution": aggregator.category_distribution(cli.days),
        "frequent": aggregator.frequent_errors(cli.days, cli.top),
        "trend": aggregator.trend(cli.days),
        "resolution": aggregator.resolution_rate(cli.days),
        "stats": engine.stats(),
    });
    let out = if cli.pretty { serde_json::to_string_pretty(&report)? } else { serde_json::to_string(&report)? };
    println!("{out}");

    engine.shutdown();
    Ok(())
}
