//! Smoke tool: stream one archive file and count its lines, without
//! touching the database or the ledger. Useful for checking a dump
//! decodes cleanly before pointing workers at it.

use anyhow::Result;
use clap::Parser;
use redarc::config::DecoderConfig;
use redarc::decode::LineReader;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "lines")]
#[command(about = "Count lines in a zstd archive file, reporting progress")]
struct Args {
    /// Archive file to read
    file: PathBuf,

    /// Lines between progress reports
    #[arg(long, default_value_t = 100_000)]
    report_every: u64,

    /// Include a trailing unterminated line in the count
    #[arg(long)]
    yield_trailing: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", "info"),
    )
    .init();

    let args = Args::parse();

    let file_size = tokio::fs::metadata(&args.file).await?.len();
    let config = DecoderConfig {
        yield_trailing_line: args.yield_trailing,
        ..DecoderConfig::default()
    };

    let start = Instant::now();
    let mut reader = LineReader::open(&args.file, &config).await?;
    let mut lines_read: u64 = 0;

    while let Some((_line, offset)) = reader.next_line().await? {
        lines_read += 1;
        if lines_read % args.report_every == 0 {
            let percent = if file_size > 0 {
                (offset as f64 / file_size as f64) * 100.0
            } else {
                0.0
            };
            log::info!(
                "{} lines : {} bytes : {:.0}% : elapsed {} s",
                lines_read,
                offset,
                percent,
                start.elapsed().as_secs()
            );
        }
    }

    log::info!(
        "Complete : {} lines : {} bytes : elapsed {} s",
        lines_read,
        reader.position(),
        start.elapsed().as_secs()
    );
    Ok(())
}
