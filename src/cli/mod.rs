pub mod commands;
pub mod dates;
pub mod report;

use std::fmt::Display;

use anyhow::Result;
use chrono::Duration;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::{
    engine::{config::DetectorConfig, interval::RecordKey, merge::MergeStrategy},
    store::{
        create_application_default_path,
        record_store::{FileRecordStore, NewManualEntry},
    },
    utils::logging::{enable_logging, CLI_PREFIX},
};

use dates::{DateStyle, RangeArgs};

#[derive(Parser, Debug)]
#[command(name = "Timeloom", version, long_about = None)]
#[command(about = "Reconciles manual, automatic and pomodoro time records", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Show untracked time in a date range")]
    Gaps {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(
            long = "min-gap",
            default_value_t = 15,
            help = "Shortest gap worth reporting, in minutes"
        )]
        min_gap: u32,
    },
    #[command(about = "Show overlapping and duplicated records in a date range")]
    Conflicts {
        #[command(flatten)]
        range: RangeArgs,
    },
    #[command(about = "Resolve a conflict group by keeping one record and deleting the rest")]
    Merge {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(help = "Group number from the conflicts report")]
        group: usize,
        #[arg(long, default_value_t = StrategyOption::Longest, help = "How to pick the surviving record")]
        strategy: StrategyOption,
        #[arg(long, help = "Keep this record, e.g. manual:12. Overrides --strategy")]
        keep: Option<RecordKey>,
        #[arg(long, help = "Print the plan without applying it")]
        dry_run: bool,
    },
    #[command(about = "Find structurally broken records")]
    Cleanup {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long, help = "Apply the suggested fixes")]
        apply: bool,
    },
    #[command(about = "Record a manual time entry")]
    Log {
        #[arg(long, help = "What the time was spent on")]
        task: String,
        #[arg(long, help = "Project id to file the entry under")]
        project: Option<u64>,
        #[arg(
            long = "start",
            short,
            help = "Start of the entry. Examples are \"13:00\", \"1 hour ago\", \"12:00 16/03/2025\""
        )]
        start_date: String,
        #[arg(
            long = "end",
            short,
            help = "End of the entry. Leave out to keep the timer running"
        )]
        end_date: Option<String>,
        #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
        date_style: DateStyle,
    },
    #[command(about = "Create a manual entry covering a detected gap")]
    Fill {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(help = "Gap number from the gaps report")]
        gap: usize,
        #[arg(long, help = "What the time was spent on")]
        task: String,
        #[arg(long, help = "Project id to file the entry under")]
        project: Option<u64>,
        #[arg(
            long = "min-gap",
            default_value_t = 15,
            help = "Shortest gap worth reporting, in minutes"
        )]
        min_gap: u32,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyOption {
    Longest,
    Earliest,
    Latest,
}

impl Display for StrategyOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyOption::Longest => write!(f, "longest"),
            StrategyOption::Earliest => write!(f, "earliest"),
            StrategyOption::Latest => write!(f, "latest"),
        }
    }
}

impl From<StrategyOption> for MergeStrategy {
    fn from(value: StrategyOption) -> Self {
        match value {
            StrategyOption::Longest => MergeStrategy::Longest,
            StrategyOption::Earliest => MergeStrategy::Earliest,
            StrategyOption::Latest => MergeStrategy::Latest,
        }
    }
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let data_path = create_application_default_path()?;
    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &data_path, logging_level, args.log)?;

    let store = FileRecordStore::new(data_path.join("records"))?;
    let config = DetectorConfig::default();

    match args.commands {
        Commands::Gaps { range, min_gap } => {
            commands::process_gaps(&store, range.resolve()?, Duration::minutes(min_gap as i64))
                .await
        }
        Commands::Conflicts { range } => {
            commands::process_conflicts(&store, range.resolve()?, &config).await
        }
        Commands::Merge {
            range,
            group,
            strategy,
            keep,
            dry_run,
        } => {
            let strategy = match keep {
                Some(key) => MergeStrategy::Keep(key),
                None => strategy.into(),
            };
            commands::process_merge(&store, range.resolve()?, &config, group, strategy, dry_run)
                .await
        }
        Commands::Cleanup { range, apply } => {
            commands::process_cleanup(&store, range.resolve()?, apply).await
        }
        Commands::Log {
            task,
            project,
            start_date,
            end_date,
            date_style,
        } => {
            let start = dates::parse_moment(&start_date, date_style)?;
            let end = end_date
                .as_deref()
                .map(|value| dates::parse_moment(value, date_style))
                .transpose()?;
            commands::process_log(
                &store,
                NewManualEntry {
                    task: task.into(),
                    project,
                    start,
                    end,
                },
            )
            .await
        }
        Commands::Fill {
            range,
            gap,
            task,
            project,
            min_gap,
        } => {
            commands::process_fill(
                &store,
                range.resolve()?,
                gap,
                task.into(),
                project,
                Duration::minutes(min_gap as i64),
            )
            .await
        }
    }
}
