use anyhow::{Context, Result, ensure};
use clap::{Parser, ValueEnum};
use std::{env, fmt, str::FromStr};

/// Smallest part size S3 accepts for all but the last multipart part.
const MIN_PART_SIZE_MB: usize = 5;
const MIB: usize = 1024 * 1024;

/// Which object store gateway backs the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// S3-compatible endpoint (AWS, MinIO, RustFS, ...).
    S3,
    /// Local directory, for development.
    Fs,
    /// Process memory, lost on exit.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        <Self as ValueEnum>::from_str(value, true)
            .map_err(|_| anyhow::anyhow!("unknown store backend `{}`", value))
    }
}

/// Connection settings for the S3 gateway.
#[derive(Clone)]
pub struct S3Settings {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Multipart part size in bytes; payloads above it are uploaded in parts.
    pub part_size: usize,
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field("part_size", &self.part_size)
            .finish()
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: StoreBackend,
    pub storage_dir: String,
    pub s3: S3Settings,
    /// Referer prefix admitted by the access gate.
    pub allowed_referrer: String,
    /// Content type advertised on every ranged response.
    pub playback_content_type: String,
    pub max_upload_bytes: usize,
    /// Chunks buffered between the store read and the client socket.
    pub relay_buffer: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Range-streaming media relay for S3-compatible stores")]
pub struct Args {
    /// Host to bind to (overrides MEDIA_RELAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides MEDIA_RELAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Object store backend (overrides MEDIA_RELAY_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<StoreBackend>,

    /// Bucket holding all relayed objects (overrides MEDIA_RELAY_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// S3 endpoint URL (overrides AWS_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// S3 region (overrides AWS_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Directory for the `fs` backend (overrides MEDIA_RELAY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Referer prefix admitted by the access gate (overrides MEDIA_RELAY_ALLOWED_REFERRER)
    #[arg(long)]
    pub allowed_referrer: Option<String>,

    /// Content type of ranged responses (overrides MEDIA_RELAY_PLAYBACK_CONTENT_TYPE)
    #[arg(long)]
    pub playback_content_type: Option<String>,

    /// Largest accepted upload in MiB (overrides MEDIA_RELAY_MAX_UPLOAD_MB)
    #[arg(long)]
    pub max_upload_mb: Option<usize>,

    /// Multipart part size in MiB, at least 5 (overrides MEDIA_RELAY_PART_SIZE_MB)
    #[arg(long)]
    pub part_size_mb: Option<usize>,

    /// Chunks buffered per streaming response (overrides MEDIA_RELAY_BUFFER_CHUNKS)
    #[arg(long)]
    pub relay_buffer: Option<usize>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::resolve(Args::parse())
    }

    /// Merge already-parsed CLI args over environment and defaults.
    pub fn resolve(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("MEDIA_RELAY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("MEDIA_RELAY_PORT", 3000u16)?;
        let env_backend = env_parse("MEDIA_RELAY_BACKEND", StoreBackend::S3)?;
        let env_bucket =
            env::var("MEDIA_RELAY_BUCKET").unwrap_or_else(|_| "my-development-bucket".into());
        let env_region = env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".into());
        let env_storage =
            env::var("MEDIA_RELAY_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_referrer = env::var("MEDIA_RELAY_ALLOWED_REFERRER")
            .unwrap_or_else(|_| "http://localhost:3000".into());
        let env_playback = env::var("MEDIA_RELAY_PLAYBACK_CONTENT_TYPE")
            .unwrap_or_else(|_| "video/mp4".into());
        let env_max_upload = env_parse("MEDIA_RELAY_MAX_UPLOAD_MB", 512usize)?;
        let env_part_size = env_parse("MEDIA_RELAY_PART_SIZE_MB", 8usize)?;
        let env_buffer = env_parse("MEDIA_RELAY_BUFFER_CHUNKS", 8usize)?;

        // --- Merge ---
        let part_size_mb = args.part_size_mb.unwrap_or(env_part_size);
        ensure!(
            part_size_mb >= MIN_PART_SIZE_MB,
            "part size must be at least {} MiB, got {}",
            MIN_PART_SIZE_MB,
            part_size_mb
        );
        let relay_buffer = args.relay_buffer.unwrap_or(env_buffer);
        ensure!(relay_buffer > 0, "relay buffer must hold at least one chunk");

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            backend: args.backend.unwrap_or(env_backend),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            s3: S3Settings {
                endpoint: args.s3_endpoint.or_else(|| env::var("AWS_S3_ENDPOINT").ok()),
                region: args.s3_region.unwrap_or(env_region),
                bucket: args.bucket.unwrap_or(env_bucket),
                access_key_id: env::var("AWS_ACCESS_KEY_ID").ok(),
                secret_access_key: env::var("AWS_SECRET_ACCESS_KEY").ok(),
                part_size: part_size_mb * MIB,
            },
            allowed_referrer: args.allowed_referrer.unwrap_or(env_referrer),
            playback_content_type: args.playback_content_type.unwrap_or(env_playback),
            max_upload_bytes: args.max_upload_mb.unwrap_or(env_max_upload) * MIB,
            relay_buffer,
        };

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read and parse `key`, falling back to `default` when it is unset.
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}
