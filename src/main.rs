use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollstitch::data::loader::load_contract_prices;
use rollstitch::prelude::*;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rollstitch")]
#[command(about = "Roll calendars, multiple prices and back-adjusted prices for futures", long_about = None)]
struct Cli {
    //root of the csv price store (overrides the config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    //path to a json engine config
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    //build a roll calendar from individual contract prices
    Calendar {
        instrument: String,

        //replace an existing calendar
        #[arg(long)]
        yes: bool,
    },

    //build multiple prices from the stored roll calendar
    Multiple {
        instrument: String,

        #[arg(long)]
        yes: bool,
    },

    //stitch adjusted prices from the stored multiple prices
    Adjusted {
        instrument: String,

        #[arg(long)]
        yes: bool,
    },

    //calendar, multiple and adjusted prices in one go
    Build {
        instrument: String,

        #[arg(long)]
        yes: bool,
    },

    //build several instruments in parallel (all stored instruments if none given)
    Batch {
        instruments: Vec<String>,

        #[arg(long)]
        yes: bool,
    },

    //run the checks on a stored roll calendar
    Check { instrument: String },

    //recover the roll calendar from stored multiple prices
    BackOut {
        instrument: String,

        #[arg(long)]
        yes: bool,
    },

    //merge new bars for one contract into the store
    UpdateContract {
        instrument: String,

        //contract id (eg 202306)
        #[arg(long)]
        contract: String,

        //csv file with the new bars
        #[arg(long)]
        file: PathBuf,
    },

    //extend stored multiple prices with newly stored prices of the current contracts
    UpdateMultiple { instrument: String },

    //extend stored adjusted prices, restitching if a roll has happened
    UpdateAdjusted { instrument: String },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rollstitch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)
            .context(format!("Failed to load config from {:?}", path))?,
        None => EngineConfig::default(),
    };
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let store = CsvPriceStore::new(&config.data_dir);
    let pipeline = InstrumentPipeline::new(&store, &config);

    match cli.command {
        Commands::Calendar { instrument, yes } => {
            print_header(&format!("Roll calendar for {}", instrument));
            let calendar = pipeline.build_roll_calendar(&instrument)?;
            for row in calendar.iter() {
                println!("{}", row);
            }
            store.write_roll_calendar(&instrument, &calendar, yes)?;
            println!("\n{} rows written", calendar.len());
        }
        Commands::Multiple { instrument, yes } => {
            print_header(&format!("Multiple prices for {}", instrument));
            let calendar = pipeline.stored_roll_calendar(&instrument)?;
            let multiple_prices = pipeline.build_multiple_prices(&instrument, &calendar)?;
            store.write_multiple_prices(&instrument, &multiple_prices, yes)?;
            println!("{} rows written", multiple_prices.len());
        }
        Commands::Adjusted { instrument, yes } => {
            print_header(&format!("Adjusted prices for {}", instrument));
            let multiple_prices = pipeline.stored_multiple_prices(&instrument)?;
            let adjusted_prices = pipeline.build_adjusted_prices(&multiple_prices)?;
            store.write_adjusted_prices(&instrument, &adjusted_prices, yes)?;
            println!("{} rows written", adjusted_prices.len());
        }
        Commands::Build { instrument, yes } => {
            print_header(&format!("Building {}", instrument));
            let build = pipeline.build_and_write(&instrument, yes)?;
            RollSummary::from_build(&build).pretty_print_table();
        }
        Commands::Batch { instruments, yes } => {
            let instruments = if instruments.is_empty() {
                store.instrument_codes()?
            } else {
                instruments
            };
            if instruments.is_empty() {
                anyhow::bail!("No instruments found under {:?}", config.data_dir);
            }

            print_header(&format!("Building {} instruments", instruments.len()));
            let results = build_instruments(&store, &instruments, &config, yes);
            print_batch_table(&results);

            let failed = results.values().filter(|result| result.is_err()).count();
            if failed > 0 {
                anyhow::bail!("{} of {} instruments failed", failed, results.len());
            }
        }
        Commands::Check { instrument } => {
            print_header(&format!("Checking roll calendar for {}", instrument));
            if pipeline.check_roll_calendar(&instrument)? {
                println!("Roll calendar passes all checks");
            } else {
                anyhow::bail!("Roll calendar for {} failed checks", instrument);
            }
        }
        Commands::BackOut { instrument, yes } => {
            print_header(&format!("Backing out roll calendar for {}", instrument));
            let calendar = pipeline.back_out_roll_calendar(&instrument)?;
            for row in calendar.iter() {
                println!("{}", row);
            }
            store.write_roll_calendar(&instrument, &calendar, yes)?;
            println!("\n{} rows written", calendar.len());
        }
        Commands::UpdateContract {
            instrument,
            contract,
            file,
        } => {
            print_header(&format!("Updating {} {}", instrument, contract));
            let contract = ContractDate::new(&contract, 0)?;
            let new_bars = load_contract_prices(&file)
                .context(format!("Failed to load bars from {:?}", file))?;

            match pipeline.update_contract_prices(&instrument, &contract, &new_bars)? {
                MergeOutcome::Merged(merged) => println!("{} rows stored", merged.len()),
                MergeOutcome::SpikeDetected { date, magnitude } => anyhow::bail!(
                    "Spike of {:.2} average daily moves at {}, nothing written",
                    magnitude,
                    date
                ),
            }
        }
        Commands::UpdateMultiple { instrument } => {
            print_header(&format!("Updating multiple prices for {}", instrument));
            match pipeline.update_multiple_prices(&instrument)? {
                MergeOutcome::Merged(multiple_prices) => {
                    println!("{} rows stored", multiple_prices.len())
                }
                MergeOutcome::SpikeDetected { date, magnitude } => anyhow::bail!(
                    "Spike of {:.2} average daily moves at {}, nothing written",
                    magnitude,
                    date
                ),
            }
        }
        Commands::UpdateAdjusted { instrument } => {
            print_header(&format!("Updating adjusted prices for {}", instrument));
            match pipeline.update_adjusted_prices(&instrument)? {
                AdjustedUpdate::Updated(adjusted_prices) => {
                    println!("{} rows stored", adjusted_prices.len())
                }
                AdjustedUpdate::RollOccurred => {
                    println!("Roll since last update, restitching");
                    let multiple_prices = pipeline.stored_multiple_prices(&instrument)?;
                    let adjusted_prices = pipeline.build_adjusted_prices(&multiple_prices)?;
                    store.write_adjusted_prices(&instrument, &adjusted_prices, true)?;
                    println!("{} rows stored", adjusted_prices.len());
                }
                AdjustedUpdate::SpikeDetected { date, magnitude } => anyhow::bail!(
                    "Spike of {:.2} average daily moves at {}, nothing written",
                    magnitude,
                    date
                ),
            }
        }
    }

    Ok(())
}

fn print_header(title: &str) {
    println!("{}", title);
    println!("{}\n", "=".repeat(title.len()));
}
