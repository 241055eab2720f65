use clap::builder::styling::{AnsiColor, Color};
use clap::builder::styling::{Style, Styles};
use clap::{ColorChoice, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "uid-consensus",
    version = env!("CARGO_PKG_VERSION"),
    about = "Collapses UID-tagged FASTQ reads into per-molecule consensus sequences",
    color = ColorChoice::Always,
    styles = get_styles(),
)]
pub struct Args {
    /// Input FASTQ path, gzip-compressed if it ends in `.gz`
    pub input: String,

    /// Output FASTQ path for consensus records
    #[arg(short, long)]
    pub output: String,

    /// Length of the UID tag at each end of the read
    #[arg(short = 'b', long = "id-length", default_value_t = 8)]
    pub id_length: usize,

    /// Adapter sequence flanking the UID on each end
    #[arg(short, long, default_value_t = String::from("GACT"))]
    pub adapter: String,

    /// Maximum Hamming distance between UIDs still considered the same molecule
    #[arg(short = 't', long = "id-tolerance", default_value_t = 5)]
    pub id_tolerance: usize,

    /// Prefix length used to shard the UID index
    #[arg(short = 'p', long = "prefix-length", default_value_t = 5)]
    pub prefix_length: usize,

    /// Read length used to split short/long fragment statistics
    #[arg(long = "read-length")]
    pub read_length: Option<usize>,

    /// Clusters at or below this size are candidates for the small-cluster merge pass
    #[arg(short = 'm', long = "merge-size")]
    pub merge_size: Option<usize>,

    /// Clusters above `merge-size` and at or below this size absorb merge candidates
    #[arg(long = "merge-target")]
    pub merge_target: Option<usize>,

    /// Logging verbosity
    #[arg(long = "log", default_value_t = LogLevel::Info)]
    pub log: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        };
        f.write_str(s)
    }
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

pub fn get_styles() -> Styles {
    Styles::styled()
        .usage(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Yellow))),
        )
        .header(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Yellow))),
        )
        .literal(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green))))
        .invalid(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .error(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .valid(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
        )
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::White))))
}
