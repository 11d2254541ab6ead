use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use yieldcurve::{
    animate::{render::console_header, Animator, ConsolePresenter},
    config::Config,
    fetch::TreasuryClient,
    harvest::{Harvester, PageOutcome},
    pipeline,
    store::YieldStore,
};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Harvest Treasury par yields and animate the yield curve"
)]
struct Cli {
    /// YAML config; defaults are used for anything it leaves out
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Harvest new trading days and merge them into the stored table
    Update(RangeArgs),
    /// Render the stored table to an animated GIF
    Animate(AnimateArgs),
    /// Update, then animate
    Run {
        #[command(flatten)]
        range: RangeArgs,
        #[command(flatten)]
        animate: AnimateArgs,
    },
    /// Play the stored table in the terminal, one line per frame
    Watch {
        #[command(flatten)]
        playback: PlaybackArgs,
        /// Stop after this many frames; loops forever by default
        #[arg(long)]
        frames: Option<usize>,
    },
    /// Fetch a single page index and print what it holds
    Probe {
        #[arg(long)]
        index: u64,
    },
}

#[derive(Args)]
struct RangeArgs {
    #[arg(long)]
    start_index: Option<u64>,
    #[arg(long)]
    end_index: Option<u64>,
}

#[derive(Args)]
struct PlaybackArgs {
    /// First date to show (YYYY-MM-DD)
    #[arg(long)]
    begin_date: Option<NaiveDate>,
    /// Frames per second
    #[arg(long)]
    frame_rate: Option<f64>,
}

#[derive(Args)]
struct AnimateArgs {
    #[command(flatten)]
    playback: PlaybackArgs,
    /// GIF to write
    #[arg(long)]
    output: Option<PathBuf>,
    /// Also write one SVG per frame into this directory
    #[arg(long)]
    svg_dir: Option<PathBuf>,
}

impl RangeArgs {
    fn apply(&self, config: &mut Config) {
        if self.start_index.is_some() {
            config.harvest.start_index = self.start_index;
        }
        if let Some(end) = self.end_index {
            config.harvest.end_index = end;
        }
    }
}

impl PlaybackArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(begin) = self.begin_date {
            config.animation.begin_date = begin;
        }
        if let Some(rate) = self.frame_rate {
            config.animation.frame_rate = rate;
        }
    }
}

impl AnimateArgs {
    fn apply(&self, config: &mut Config) {
        self.playback.apply(config);
        if let Some(output) = &self.output {
            config.animation.output = output.clone();
        }
    }
}

fn harvester(config: &Config) -> Result<Harvester<TreasuryClient>> {
    let client = TreasuryClient::new(&config.source).context("building HTTP client")?;
    Ok(Harvester::new(
        client,
        config.source.fields.clone(),
        &config.harvest,
    ))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Update(range) => {
            range.apply(&mut config);
            config.validate()?;
            let summary = pipeline::update(&config, &harvester(&config)?).await?;
            info!(
                start_index = summary.start_index,
                harvested = summary.harvested,
                total = summary.table.len(),
                stop = ?summary.stop,
                "update done"
            );
        }
        Command::Animate(args) => {
            args.apply(&mut config);
            config.validate()?;
            let table = YieldStore::new(&config.store.path)
                .load()
                .with_context(|| format!("loading {}", config.store.path.display()))?;
            let frames = pipeline::render(&config, &table, args.svg_dir.as_deref())?;
            info!(frames, output = %config.animation.output.display(), "animation written");
        }
        Command::Run { range, animate } => {
            range.apply(&mut config);
            animate.apply(&mut config);
            config.validate()?;
            let summary =
                pipeline::run(&config, &harvester(&config)?, animate.svg_dir.as_deref()).await?;
            info!(
                harvested = summary.harvested,
                total = summary.table.len(),
                inverted_days = summary.table.inverted_days(),
                "run done"
            );
        }
        Command::Watch { playback, frames } => {
            playback.apply(&mut config);
            config.validate()?;
            let table = YieldStore::new(&config.store.path)
                .load()
                .with_context(|| format!("loading {}", config.store.path.display()))?;
            let animator = Animator::from_config(&table, &config.animation)?;
            println!("{}", console_header());
            let mut console = ConsolePresenter::new(std::io::stdout());
            animator.play(&mut console, frames).await?;
        }
        Command::Probe { index } => {
            let harvester = harvester(&config)?;
            match harvester.probe(index).await {
                PageOutcome::Record(record) => {
                    println!("{}", serde_json::to_string_pretty(&record)?);
                }
                PageOutcome::EndOfData(reason) => println!("no data at index {}: {}", index, reason),
                PageOutcome::Retryable(e) => anyhow::bail!("transient failure: {}", e),
                PageOutcome::Fatal(e) => anyhow::bail!("unusable page: {}", e),
            }
        }
    }
    Ok(())
}
