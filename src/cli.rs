use clap::Parser;

use crate::scan::{DEFAULT_READAHEAD, ScanOptions};

#[derive(Parser, Debug)]
#[command(name = "rootscan")]
#[command(version)]
#[command(about = "Read tree entry counts from local or remote ROOT files", long_about = None)]
#[command(after_help = "Examples:\n  \
  rootscan data1.root data2.root             entry counts of the Events tree\n  \
  rootscan -t muons/Tree https://host/f.root  tree inside a subdirectory of a remote file\n  \
  RUST_LOG=debug rootscan -w 1 *.root         trace every read with one decompression worker")]
pub struct Cli {
    /// ROOT file paths or HTTP URLs
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<String>,

    /// Tree to read from every file
    #[arg(short = 't', long, value_name = "NAME", default_value = "Events")]
    pub tree: String,

    /// Concurrent decompression workers
    #[arg(short = 'w', long, value_name = "N")]
    pub workers: Option<usize>,

    /// Bytes fetched by the first read of each file
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_READAHEAD)]
    pub readahead: u32,

    /// Per-request timeout for HTTP sources, in seconds
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    pub timeout: u64,

    /// Quiet mode: no summary line
    #[arg(short = 'q')]
    pub quiet: bool,
}

impl Cli {
    pub fn is_http_url(file: &str) -> bool {
        file.starts_with("http://") || file.starts_with("https://")
    }

    /// Whether every file is an HTTP URL
    pub fn all_remote(&self) -> bool {
        self.files.iter().all(|f| Self::is_http_url(f))
    }

    /// Whether any file is an HTTP URL
    pub fn any_remote(&self) -> bool {
        self.files.iter().any(|f| Self::is_http_url(f))
    }

    pub fn scan_options(&self) -> ScanOptions {
        let options = ScanOptions::default().with_readahead(self.readahead);
        match self.workers {
            Some(workers) => options.with_decompress_workers(workers),
            None => options,
        }
    }
}
