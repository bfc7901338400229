//! slscale - rescale the samples of a SeedLink stream and forward them.
//!
//! Usage:
//!   slscale -S NZ_WEL:HH? -B 10 geofon.example.org:18000 > scaled.ms3
//!   slscale -l streams.txt -x slscale.state -w :18000 localhost:16000

use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use log::{error, info, warn};

use mseedscale::cancel::CancelToken;
use mseedscale::datalink::{DataLinkClient, DataLinkConfig};
use mseedscale::pipeline::run_stream;
use mseedscale::scale::{IneligiblePolicy, ScaleConfig};
use mseedscale::seedlink::selection::{
    all_stations, default_selectors, parse_multiselect, read_stream_list, StationSelection,
    DEFAULT_SELECTORS,
};
use mseedscale::seedlink::state::{Checkpoint, StreamState};
use mseedscale::seedlink::{SeedLinkClient, SeedLinkConfig};
use mseedscale::sink::{DirectSink, ForwardingSink, PushClient, RecordSink};
use mseedscale::trace::{PackConfig, DEFAULT_RECORD_LENGTH};
use mseedscale::{logging, DataEncoding};

const PROGRAM: &str = "slscale";

#[derive(Parser, Debug)]
#[command(name = "slscale")]
#[command(about = "seedlink sample scaling")]
#[command(version)]
struct Args {
    /// Verbose output, repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Request write acknowledgements from the datalink server
    #[arg(short = 'w', long)]
    ack: bool,

    /// Client id sent to the datalink server
    #[arg(short, long, default_value = PROGRAM)]
    id: String,

    /// Seconds to wait before reconnecting to the seedlink server
    #[arg(short, long, default_value = "30")]
    delay: u64,

    /// Seconds without data before reconnecting, 0 disables
    #[arg(short, long, default_value = "600")]
    timeout: u64,

    /// Seconds between keepalive requests, 0 disables
    #[arg(short = 'k', long, default_value = "0")]
    heartbeat: u64,

    /// Stream list file, one `NET STA [selectors]` per line
    #[arg(short = 'l', long)]
    streamlist: Option<PathBuf>,

    /// Streams as `NET_STA[:selectors],...`
    #[arg(short = 'S', long)]
    streams: Option<String>,

    /// Default selectors
    #[arg(short = 's', long, default_value = DEFAULT_SELECTORS)]
    selectors: String,

    /// State file for resuming after a restart
    #[arg(short = 'x', long)]
    statefile: Option<PathBuf>,

    /// Data packets between state file saves, 0 saves only at shutdown
    #[arg(short = 'u', long, default_value = "300")]
    update: usize,

    /// Offset added to the scaled samples
    #[arg(short = 'A', long, default_value = "0", allow_negative_numbers = true)]
    alpha: f64,

    /// Scale factor for the raw samples
    #[arg(short = 'B', long, default_value = "10", allow_negative_numbers = true)]
    beta: f64,

    /// Replacement orientation code
    #[arg(short = 'O', long, default_value = "T")]
    orient: char,

    /// Keep the original orientation code
    #[arg(long, conflicts_with = "orient")]
    no_orient: bool,

    /// What to do with records that cannot be scaled: pass or drop
    #[arg(long, default_value = "drop")]
    ineligible: IneligiblePolicy,

    /// Maximum output record length in bytes
    #[arg(long, default_value_t = DEFAULT_RECORD_LENGTH)]
    record_length: usize,

    /// SeedLink server
    #[arg(default_value = ":18000")]
    server: String,

    /// DataLink server, records go to stdout when absent
    datalink: Option<String>,
}

impl Args {
    fn scale_config(&self) -> ScaleConfig {
        ScaleConfig {
            alpha: self.alpha,
            beta: self.beta,
            orientation: if self.no_orient { None } else { Some(self.orient) },
            ineligible: self.ineligible,
        }
    }

    fn pack_config(&self) -> PackConfig {
        PackConfig {
            max_record_length: self.record_length,
            encoding: DataEncoding::STEIM2,
        }
    }

    fn stations(&self) -> anyhow::Result<Vec<StationSelection>> {
        let defaults = default_selectors(&self.selectors);
        if let Some(path) = &self.streamlist {
            read_stream_list(path, &defaults)
                .with_context(|| format!("unable to read streams [{}]", path.display()))
        } else if let Some(streams) = &self.streams {
            parse_multiselect(streams, &defaults)
                .with_context(|| format!("unable to load streams [{}]", streams))
        } else {
            all_stations(&defaults)
                .with_context(|| format!("unable to load selectors [{}]", self.selectors))
        }
    }

    fn seedlink_config(&self, stations: Vec<StationSelection>) -> SeedLinkConfig {
        let mut config = SeedLinkConfig::new(&self.server, stations);
        config.user_agent = format!("{}/{}", PROGRAM, env!("CARGO_PKG_VERSION"));
        config.delay = Duration::from_secs(self.delay);
        config.timeout = Duration::from_secs(self.timeout);
        config.heartbeat = Duration::from_secs(self.heartbeat);
        config
    }
}

fn open_datalink(address: &str, args: &Args) -> anyhow::Result<DataLinkClient> {
    let mut client = DataLinkClient::new(DataLinkConfig {
        address: address.to_string(),
        client_id: format!("{}:{}", PROGRAM, args.id),
        ack: args.ack,
    });
    client
        .connect()
        .with_context(|| format!("error connecting to datalink server {}", client.address()))?;
    if !client.is_writable() {
        bail!("datalink server {} is non-writable", client.address());
    }
    Ok(client)
}

fn run(args: &Args) -> anyhow::Result<()> {
    info!("{} ({})", PROGRAM, env!("CARGO_PKG_VERSION"));
    let scale = args.scale_config();
    let pack = args.pack_config();
    info!("scale [{}]", scale);

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("cannot install signal handler")?;

    let datalink = match &args.datalink {
        Some(address) => Some(open_datalink(address, args)?),
        None => None,
    };

    let stations = args.stations()?;
    for sel in &stations {
        info!("requesting {}", sel);
    }

    let mut checkpoint = match &args.statefile {
        Some(path) => {
            let state = StreamState::load(path).unwrap_or_else(|e| {
                warn!("unable to recover statefile [{}]: {}", path.display(), e);
                StreamState::new()
            });
            Some(Checkpoint::new(path.clone(), args.update, state))
        }
        None => None,
    };
    let resume = checkpoint
        .as_ref()
        .map(|cp| cp.state.clone())
        .unwrap_or_default();
    let mut seedlink = SeedLinkClient::new(args.seedlink_config(stations), resume);

    let mut stream = |sink: &mut dyn RecordSink| {
        run_stream(&mut seedlink, &scale, &pack, sink, checkpoint.as_mut(), &cancel)
    };
    let result = match datalink {
        Some(client) => {
            let mut sink = ForwardingSink::new(client, cancel.clone());
            let result = stream(&mut sink);
            sink.into_client().disconnect();
            result
        }
        None => {
            let mut sink = DirectSink::new(BufWriter::new(io::stdout().lock()));
            stream(&mut sink)
        }
    };
    seedlink.disconnect();

    let summary = result?;
    info!("stopping: {}", summary);
    info!("terminated");
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(PROGRAM, args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
