use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use hashreg_types::{ActorId, Fingerprint};

#[derive(Parser)]
#[command(
    name = "hashreg",
    about = "Content-addressed hash registry with an append-only audit log",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Registry journal to operate on
    #[arg(long, global = true, default_value = "hashreg.journal")]
    pub journal: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy a new registry into the journal
    Init(InitArgs),
    /// Print the SHA-256 fingerprint of files
    Fingerprint(FingerprintArgs),
    /// Store a fingerprint
    Store(StoreArgs),
    /// Fingerprint a file and store the result
    StoreFile(StoreFileArgs),
    /// Store up to 50 fingerprints as one atomic batch
    BatchStore(BatchStoreArgs),
    /// Check whether a fingerprint is registered (recorded in the audit log)
    Verify(VerifyArgs),
    /// Check many fingerprints at once without recording anything
    BatchVerify(BatchVerifyArgs),
    /// Check an artifact against its expected fingerprint
    Check(CheckArgs),
    /// Show the record for a fingerprint
    Info(InfoArgs),
    /// Show registry totals and the administrator
    Stats,
    /// Hand administration to another identity
    Transfer(TransferArgs),
    /// Print the audit log
    Audit(AuditArgs),
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Generate a bearer token entry for the server config
    Token(TokenArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// First administrator (64 hex characters or @label)
    #[arg(long)]
    pub admin: ActorId,
}

#[derive(Args)]
pub struct FingerprintArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Args)]
pub struct StoreArgs {
    pub fingerprint: Fingerprint,
    /// Calling identity (64 hex characters or @label)
    #[arg(long = "as")]
    pub caller: ActorId,
}

#[derive(Args)]
pub struct StoreFileArgs {
    pub file: PathBuf,
    #[arg(long = "as")]
    pub caller: ActorId,
}

#[derive(Args)]
pub struct BatchStoreArgs {
    #[arg(required = true)]
    pub fingerprints: Vec<Fingerprint>,
    #[arg(long = "as")]
    pub caller: ActorId,
}

#[derive(Args)]
pub struct VerifyArgs {
    pub fingerprint: Fingerprint,
    #[arg(long = "as")]
    pub caller: ActorId,
}

#[derive(Args)]
pub struct BatchVerifyArgs {
    #[arg(required = true)]
    pub fingerprints: Vec<Fingerprint>,
}

#[derive(Args)]
pub struct CheckArgs {
    pub file: PathBuf,
    pub expected: Fingerprint,
}

#[derive(Args)]
pub struct InfoArgs {
    pub fingerprint: Fingerprint,
}

#[derive(Args)]
pub struct TransferArgs {
    pub new_administrator: ActorId,
    #[arg(long = "as")]
    pub caller: ActorId,
}

#[derive(Args)]
pub struct AuditArgs {
    /// Only show events after this sequence number
    #[arg(long, default_value = "0")]
    pub since: u64,
    /// Print at most this many events
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Server configuration file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Listen address; overrides the config file
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Administrator for a new journal (64 hex characters or @label)
    #[arg(long)]
    pub admin: Option<String>,
}

#[derive(Args)]
pub struct TokenArgs {
    /// Identity the token acts as; a fresh random identity when omitted
    #[arg(long)]
    pub actor: Option<ActorId>,
}
