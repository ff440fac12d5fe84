//! Command-line driver for the catalog: scan, enrich, sync, resolve
//! playlists and search, backed by `soundcatalog`'s library modules.
//!
//! Mirrors the reference CLI's subcommand surface. Mirrors the teacher's
//! `main.rs` in structure (clap derive, anyhow at the top level, a
//! `tracing`-based progress layer instead of bespoke logging) but is a
//! thin driver: all real work lives in the library.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use soundcatalog::cancel::CancelToken;
use soundcatalog::config::CatalogConfig;
use soundcatalog::duplicates;
use soundcatalog::formats::LoftyReader;
use soundcatalog::playlist;
use soundcatalog::progress;
use soundcatalog::remote::{self, MediaServerClient, RemoteAlbumDetail};
use soundcatalog::resolver::Resolver;
use soundcatalog::scanner;
use soundcatalog::store::CatalogStore;
use soundcatalog::unresolved::UnresolvedTracker;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "soundcatalogd")]
#[command(about = "Local music catalog: scan, resolve, search and sync")]
struct Cli {
    /// Catalog database file. Overrides the config file / environment.
    #[arg(short = 'd', long, global = true)]
    db_file: Option<String>,

    /// Fuzzy match confidence threshold (0.0-1.0). Overrides the config
    /// file / environment.
    #[arg(short = 't', long, global = true)]
    threshold: Option<f64>,

    /// Path to a config file. Defaults to `soundcatalog.toml` if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit tail-friendly periodic log lines instead of progress bars.
    #[arg(long, global = true)]
    log_only: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new, empty catalog database.
    Create,
    /// Scan one or more directories for audio files and add/update them.
    Scan {
        dirs: Vec<PathBuf>,
    },
    /// Remove recordings/directories whose files are gone and vacuum.
    Cleanup {
        #[arg(long)]
        dry_run: bool,
    },
    /// Fetch popularity and tags for every recording with a known MBID.
    Metadata,
    /// Sync recordings against a remote media server's library.
    Subsonic,
    /// Resolve a JSPF playlist against the catalog and write an M3U.
    Playlist {
        input: PathBuf,
        output: PathBuf,
    },
    /// Generate a radio-style playlist from a prompt. The prompt-parsing
    /// and candidate-generation engine is a separate, external component;
    /// this subcommand only resolves and writes out candidates it is given.
    LbRadio {
        mode: String,
        prompt: String,
    },
    /// Generate a periodic-jams playlist for a user. As with `lb-radio`,
    /// candidate generation is external; this only resolves and writes.
    PeriodicJams {
        user: String,
    },
    /// Print the most common tags by recording count.
    TopTags {
        #[arg(default_value_t = 20)]
        n: u32,
    },
    /// Report recordings that share a MusicBrainz recording id.
    Duplicates {
        #[arg(long)]
        by_release: bool,
    },
    /// Report MBIDs that repeatedly failed fuzzy resolution.
    Unresolved,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    progress::set_log_only(cli.log_only);

    let mut config = CatalogConfig::load_with_file(cli.config.as_ref())
        .context("failed to load configuration")?;
    if let Some(db_file) = &cli.db_file {
        config.db_file = db_file.clone();
    }
    if let Some(threshold) = cli.threshold {
        config.match_threshold = threshold;
    }
    let db_path = PathBuf::from(&config.db_file);

    match cli.command {
        Command::Create => {
            CatalogStore::create(&db_path).context("failed to create catalog")?;
            println!("created {}", db_path.display());
        }
        Command::Scan { dirs } => {
            let dirs = if dirs.is_empty() {
                config.music_roots.iter().map(PathBuf::from).collect()
            } else {
                dirs
            };
            if dirs.is_empty() {
                anyhow::bail!("no directories given and no music_roots configured");
            }
            let mut store = open_existing(&db_path)?;
            let reader = LoftyReader::new();
            let stats = scanner::scan(&mut store, &reader, &dirs, 1000, &CancelToken::new())
                .context("scan failed")?;
            println!("{:?}", stats);
        }
        Command::Cleanup { dry_run } => {
            let mut store = open_existing(&db_path)?;
            let report = store.cleanup(dry_run).context("cleanup failed")?;
            println!("{:?}", report);
        }
        Command::Metadata => {
            let mut store = open_existing(&db_path)?;
            let client = soundcatalog::enrich::HttpTagLookupClient::new(config.metadata_endpoint.as_str());
            let stats = soundcatalog::enrich::enrich(&mut store, &client, &CancelToken::new())
                .context("enrichment failed")?;
            println!("{:?}", stats);
        }
        Command::Subsonic => {
            if config.remote.host.is_empty() {
                anyhow::bail!("remote.host is not configured");
            }
            let mut store = open_existing(&db_path)?;
            let client = SubsonicClient::new(&config.remote);
            let stats = remote::sync(&mut store, &client, &CancelToken::new()).context("remote sync failed")?;
            println!("{:?}", stats);
        }
        Command::Playlist { input, output } => {
            let store = open_existing(&db_path)?;
            let parsed = playlist::read_jspf(&input).context("failed to read playlist")?;
            let resolver = Resolver::build(&store).context("failed to build resolver")?;
            let resolved = resolver
                .resolve(&store, parsed.queries, config.match_threshold)
                .context("resolution failed")?;
            let recordings = resolved
                .into_iter()
                .filter_map(|r| store.get_by_id(r.recording_id).ok().flatten())
                .collect::<Vec<_>>();
            let title = parsed.title.unwrap_or_else(|| "playlist".to_string());
            playlist::write_m3u(&output, &title, &recordings).context("failed to write m3u")?;
            println!("resolved {} of the playlist's tracks", recordings.len());
        }
        Command::LbRadio { mode, prompt } => {
            anyhow::bail!(
                "lb-radio is not implemented here: prompt parsing for mode={mode:?} prompt={prompt:?} \
                 is produced by a separate candidate-generation component and fed into this catalog's \
                 resolver, not reimplemented by it"
            );
        }
        Command::PeriodicJams { user } => {
            anyhow::bail!(
                "periodic-jams is not implemented here: candidates for user={user:?} are produced by \
                 a separate component and fed into this catalog's resolver, not reimplemented by it"
            );
        }
        Command::TopTags { n } => {
            let store = open_existing(&db_path)?;
            for (name, count) in store.top_tags(n).context("top-tags failed")? {
                println!("{:>8}  {}", count, name);
            }
        }
        Command::Duplicates { by_release } => {
            let store = open_existing(&db_path)?;
            for group in duplicates::find_duplicates(&store, by_release).context("duplicates failed")? {
                println!(
                    "{} - {} ({}x): {}",
                    group.artist_name.as_deref().unwrap_or("?"),
                    group.recording_name.as_deref().unwrap_or("?"),
                    group.count,
                    group.file_paths.join(", ")
                );
            }
        }
        Command::Unresolved => {
            let store = open_existing(&db_path)?;
            let client = soundcatalog::unresolved::MusicBrainzReleaseLookupClient::new();
            for row in UnresolvedTracker::new()
                .release_report(&store, &client)
                .context("unresolved report failed")?
            {
                println!("{:>8}  {}", row.unresolved_count, row.release_name);
            }
        }
    }

    Ok(())
}

fn open_existing(path: &PathBuf) -> Result<CatalogStore> {
    CatalogStore::open(path)
        .with_context(|| format!("no catalog at {}; run `soundcatalogd create` first", path.display()))
}

struct SubsonicClient {
    agent: ureq::Agent,
    base_url: String,
    user: String,
    password: String,
}

impl SubsonicClient {
    fn new(config: &soundcatalog::config::RemoteConfig) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            base_url: config.host.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
        }
    }

    fn auth_params(&self) -> Vec<(&str, &str)> {
        vec![
            ("u", self.user.as_str()),
            ("p", self.password.as_str()),
            ("v", "1.16.1"),
            ("c", "soundcatalogd"),
            ("f", "json"),
        ]
    }
}

impl MediaServerClient for SubsonicClient {
    fn list_albums(&self, offset: u32, size: u32) -> Result<Vec<String>, soundcatalog::error::CoreError> {
        let mut req = self
            .agent
            .get(&format!("{}/rest/getAlbumList2", self.base_url));
        for (k, v) in self.auth_params() {
            req = req.query(k, v);
        }
        let resp = req
            .query("type", "alphabeticalByName")
            .query("offset", &offset.to_string())
            .query("size", &size.to_string())
            .call()
            .map_err(|e| soundcatalog::error::CoreError::NetworkError(e.to_string()))?;
        let body: serde_json::Value = resp
            .into_json()
            .map_err(|e| soundcatalog::error::CoreError::NetworkError(e.to_string()))?;
        let albums = body["subsonic-response"]["albumList2"]["album"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        Ok(albums
            .into_iter()
            .filter_map(|a| a["id"].as_str().map(|s| s.to_string()))
            .collect())
    }

    fn album_detail(&self, album_id: &str) -> Result<RemoteAlbumDetail, soundcatalog::error::CoreError> {
        let mut req = self.agent.get(&format!("{}/rest/getAlbum", self.base_url));
        for (k, v) in self.auth_params() {
            req = req.query(k, v);
        }
        let resp = req
            .query("id", album_id)
            .call()
            .map_err(|e| soundcatalog::error::CoreError::NetworkError(e.to_string()))?;
        let body: serde_json::Value = resp
            .into_json()
            .map_err(|e| soundcatalog::error::CoreError::NetworkError(e.to_string()))?;
        let album = &body["subsonic-response"]["album"];
        let release_mbid = album["musicBrainzId"].as_str().map(|s| s.to_string());
        let songs = album["song"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|s| {
                Some(soundcatalog::remote::RemoteSong {
                    id: s["id"].as_str()?.to_string(),
                    track_num: s["track"].as_i64().unwrap_or(1),
                    disc_num: s["discNumber"].as_i64(),
                    title: s["title"].as_str().unwrap_or_default().to_string(),
                    duration_ms: s["duration"].as_i64().unwrap_or(0) * 1000,
                })
            })
            .collect();
        Ok(RemoteAlbumDetail { release_mbid, songs })
    }
}
