use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "spliceforge")]
#[command(author, version, about = "SCTE-35 ad signaling for live streams")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Encode a splice command into a transport packet
    Encode {
        #[command(subcommand)]
        command: EncodeCommand,

        /// Output encoding
        #[arg(long, value_enum, default_value_t = OutputFormat::Hex, global = true)]
        format: OutputFormat,

        /// Emit the bare splice_info_section instead of a TS packet
        #[arg(long, global = true)]
        section_only: bool,

        /// PID of the transport packet (defaults to the configured PID)
        #[arg(long, global = true)]
        pid: Option<u16>,
    },

    /// Decode a hex or base64 packet/section and print it as JSON
    Decode {
        /// Hex or base64 encoded bytes
        #[arg(required = true)]
        input: String,
    },

    /// Replay markers against a virtual clock and print the resulting events
    Simulate {
        /// JSON file with an array of markers
        #[arg(required = true)]
        markers: PathBuf,

        /// Stream id for the simulated session
        #[arg(long, default_value = "simulated")]
        stream_id: String,

        /// Stream time to simulate up to, in seconds
        #[arg(long, default_value = "120")]
        until: f64,

        /// Virtual tick step, in seconds
        #[arg(long, default_value = "1")]
        step: f64,

        /// Segment duration of the rendered manifest, in seconds
        #[arg(long, default_value = "6")]
        segment_duration: f64,

        /// Manifest to render after the run
        #[arg(long, value_enum, default_value_t = ManifestKind::Hls)]
        manifest: ManifestKind,
    },

    /// Run a live session from the wall clock until Ctrl-C
    Run {
        /// JSON file with an array of markers
        #[arg(required = true)]
        markers: PathBuf,

        /// Stream id for the session
        #[arg(long, default_value = "live")]
        stream_id: String,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[derive(Subcommand)]
pub enum EncodeCommand {
    /// splice_insert out of network
    SpliceInsert {
        /// splice_event_id
        #[arg(long)]
        event_id: u32,

        /// Splice time in seconds (omit for an immediate splice)
        #[arg(long)]
        pts: Option<f64>,

        /// Break duration in seconds
        #[arg(long)]
        duration: Option<f64>,
    },

    /// time_signal at a PTS
    TimeSignal {
        /// Signal time in seconds
        #[arg(long)]
        pts: f64,
    },

    /// splice_null heartbeat
    Null,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Hex,
    Base64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ManifestKind {
    Hls,
    Dash,
    /// Print events only
    Off,
}
