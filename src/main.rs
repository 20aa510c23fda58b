use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use prettytable::{Table, row};
use tracing::error;
use tracing_subscriber::EnvFilter;

use swapstore::{BlockNr, BlockStore, OpenMode, StoreConfig, StoreResult, StoreStats, SyncFlags};

#[derive(Parser)]
#[command(name = "swapstore", about = "Inspect and exercise paged swap files.", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// JSON file with page size settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// How results are printed.
    #[arg(long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Show page size and page counts of an existing swap file.
    Inspect { file: PathBuf },
    /// Hex dump of one block of an existing swap file.
    Dump {
        file: PathBuf,
        id: BlockNr,
        /// Number of pages in the block.
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    /// Fill volatile blocks in memory, attach a new swap file and sync.
    Exercise {
        file: PathBuf,
        #[arg(long, default_value_t = 16)]
        blocks: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> StoreResult<()> {
    let config = match &cli.config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::default(),
    };

    match &cli.command {
        Commands::Inspect { file } => {
            let store = BlockStore::open_with_config(Some(file.as_path()), OpenMode::Existing, &config)?;
            print_stats(&store.stats(), cli.format)?;
            store.close(false)
        }
        Commands::Dump { file, id, pages } => {
            let mut store = BlockStore::open_with_config(Some(file.as_path()), OpenMode::Existing, &config)?;
            let handle = store.get(*id, *pages)?;
            print_hex(store.data(handle)?);
            store.put(handle, false, false)?;
            store.close(false)
        }
        Commands::Exercise { file, blocks } => exercise(file, *blocks, &config, cli.format),
    }
}

fn exercise(path: &Path, blocks: usize, config: &StoreConfig, format: OutputFormat) -> StoreResult<()> {
    let mut store = BlockStore::open_with_config(None, OpenMode::CreateNew, config)?;
    for i in 0..blocks {
        let handle = store.allocate(true, 1)?;
        let data = store.data_mut(handle)?;
        let label = format!("block {i}");
        let len = label.len().min(data.len());
        data[..len].copy_from_slice(&label.as_bytes()[..len]);
        store.put(handle, true, false)?;
    }

    store.open_file(path)?;
    store.sync(SyncFlags::ALL | SyncFlags::FLUSH)?;
    print_stats(&store.stats(), format)?;
    store.close(false)
}

fn print_stats(stats: &StoreStats, format: OutputFormat) -> StoreResult<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(stats)?),
        OutputFormat::Table => {
            let path = match &stats.path {
                Some(path) => path.display().to_string(),
                None => "-".to_string(),
            };
            let mut table = Table::new();
            table.add_row(row!["Path", path]);
            table.add_row(row!["Page size", stats.page_size]);
            table.add_row(row!["Next durable id", stats.blocknr_max]);
            table.add_row(row!["Next volatile id", stats.blocknr_min]);
            table.add_row(row!["Pages in file", stats.infile_count]);
            table.add_row(row!["Cached blocks", stats.cached_blocks]);
            table.add_row(row!["Dirty blocks", stats.dirty_blocks]);
            table.add_row(row!["Free list", stats.free_list_len]);
            table.add_row(row!["Pages written", stats.pages_written]);
            table.add_row(row!["Dirty state", format!("{:?}", stats.dirty_state)]);
            table.printstd();
        }
    }
    Ok(())
}

fn print_hex(data: &[u8]) {
    for (line, chunk) in data.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        let text: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        println!("{:08x}  {:<47}  {}", line * 16, hex.join(" "), text);
    }
}
