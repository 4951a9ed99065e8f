use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use std::path::PathBuf;

use crate::config::{self, Config, REFRESH_TOKEN_ENV};
use crate::domain::{history::PlayedCursor, profile::TimeRange};
use crate::mirror::{self, MirrorOutcome};
use crate::spotify::{
    auth::{Authenticator, Credentials},
    client::{SearchKind, SpotifyClient},
    transport::HttpTransport,
};
use crate::storage::operations::Storage;

#[derive(Parser)]
#[command(name = "spotify-mirror")]
#[command(version = "0.1")]
#[command(about = "Mirrors your Spotify listening history into a local database")]
pub struct Cli {
    /// Path to the config TOML file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Feed {
    Recent,
    Saved,
    All,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum TopKind {
    Tracks,
    Artists,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ItemKind {
    Track,
    Artist,
    Album,
}

impl From<ItemKind> for SearchKind {
    fn from(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Track => SearchKind::Track,
            ItemKind::Artist => SearchKind::Artist,
            ItemKind::Album => SearchKind::Album,
        }
    }
}

/// Bounds on play time, in unix milliseconds.
#[derive(Args, Clone, Copy, Default)]
pub struct Window {
    /// Only plays after this moment
    #[arg(long, conflicts_with = "before")]
    pub after: Option<i64>,
    /// Only plays before this moment
    #[arg(long)]
    pub before: Option<i64>,
}

impl Window {
    fn cursor(self) -> anyhow::Result<Option<PlayedCursor>> {
        PlayedCursor::from_millis(self.after, self.before).map_err(anyhow::Error::msg)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run http server
    Serve,
    /// Print the authorization URL, or exchange the code it redirected with
    Auth {
        /// `code` query parameter of the redirect
        #[arg(long)]
        code: Option<String>,
    },
    /// Pull new items from Spotify into the database
    Sync {
        #[arg(value_enum, default_value = "all")]
        feed: Feed,
        #[command(flatten)]
        window: Window,
    },
    /// List stored plays, newest first
    Recent {
        /// Defaults to the authenticated user
        #[arg(short, long)]
        user: Option<String>,
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
        #[command(flatten)]
        window: Window,
    },
    /// List stored saved tracks, newest first
    Saved {
        #[arg(short, long)]
        user: Option<String>,
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
    /// Show top tracks or artists straight from Spotify
    Top {
        #[arg(value_enum)]
        kind: TopKind,
        /// short, medium or long
        #[arg(short, long, default_value = "medium")]
        range: TimeRange,
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },
    /// Create a private playlist from your top tracks
    Playlist {
        #[arg(short, long, default_value = "short")]
        range: TimeRange,
    },
    /// List your playlists
    Playlists,
    /// Search the catalog
    Search {
        query: String,
        /// What to search for, may be repeated
        #[arg(short, long, value_enum, default_value = "track")]
        kind: Vec<ItemKind>,
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },
    /// Show one track, artist or album
    Show {
        #[arg(value_enum)]
        kind: ItemKind,
        id: String,
    },
    /// Save tracks to your library
    Save {
        #[arg(required = true)]
        track_ids: Vec<String>,
    },
    /// Remove tracks from your library
    Unsave {
        #[arg(required = true)]
        track_ids: Vec<String>,
    },
    /// Follow artists
    Follow {
        #[arg(required = true)]
        artist_ids: Vec<String>,
    },
    /// Unfollow artists
    Unfollow {
        #[arg(required = true)]
        artist_ids: Vec<String>,
    },
    /// Remove every stored play and saved track of a user
    Purge {
        user: String,
    },
}

fn open_storage(cfg: &config::Database) -> anyhow::Result<Storage> {
    Storage::new(cfg).context("Failed to initialize storage")
}

fn build_client(cfg: &Config) -> anyhow::Result<SpotifyClient> {
    let spotify = &cfg.spotify;
    if spotify.client_id.is_empty() || spotify.client_secret.is_empty() {
        bail!("Spotify client id and secret must be set in the config or the environment");
    }

    let transport = HttpTransport::new(spotify.timeout())?;
    let auth = Authenticator::new(
        Credentials {
            client_id: spotify.client_id.clone(),
            client_secret: spotify.client_secret.clone(),
            redirect_uri: spotify.redirect_uri.clone(),
        },
        &spotify.accounts_url,
        spotify.refresh_token.clone(),
    );

    Ok(SpotifyClient::new(
        Box::new(transport),
        auth,
        &spotify.api_url,
        cfg.cache.profile_ttl(),
    ))
}

/// Falls back to the authenticated user when none is given.
fn resolve_user(cfg: &Config, user: Option<String>) -> anyhow::Result<String> {
    match user {
        Some(user) => Ok(user),
        None => Ok(build_client(cfg)?.current_user()?.id),
    }
}

fn describe_outcome<K>(outcome: &MirrorOutcome<K>) -> &'static str {
    match outcome {
        MirrorOutcome::Overlap(_) => "caught up with stored history",
        MirrorOutcome::Exhausted => "reached the end of the feed",
    }
}

fn sync(
    client: &SpotifyClient,
    storage: &mut Storage,
    feed: Feed,
    cursor: Option<PlayedCursor>,
) -> anyhow::Result<()> {
    let user = client.current_user()?;

    if matches!(feed, Feed::Recent | Feed::All) {
        let report = mirror::sync_recently_played(client, storage, &user.id, cursor)
            .context("Failed to sync recently played tracks")?;
        println!(
            "Recently played: {} new, {} stored, {}",
            report.added.len(),
            report.snapshot.len(),
            describe_outcome(&report.outcome)
        );
    }

    if matches!(feed, Feed::Saved | Feed::All) {
        let report = mirror::sync_saved_tracks(client, storage, &user.id)
            .context("Failed to sync saved tracks")?;
        println!(
            "Saved tracks: {} new, {} stored, {}",
            report.added.len(),
            report.snapshot.len(),
            describe_outcome(&report.outcome)
        );
    }
    Ok(())
}

/// Entrypoint for CLI
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .to_str()
        .context("Config path is not valid UTF-8")?;
    let cfg = Config::load(config_path)?;

    match cli.command {
        Commands::Serve => {
            let storage = open_storage(&cfg.database)?;
            let client = build_client(&cfg)?;
            let http_server = crate::http::server::HttpServer::new(storage, client, cfg.http);

            info!(
                "HTTP server running at http://{}:{}",
                http_server.config.bind_addr, http_server.config.port
            );
            http_server.run();
        }

        Commands::Auth { code } => {
            let client = build_client(&cfg)?;
            match code {
                None => {
                    let state = chrono::Utc::now().timestamp_millis().to_string();
                    println!("Open this URL and grant access:");
                    println!("  {}", client.authorize_url(&state));
                    println!("Then run `auth --code <code>` with the code from the redirect.");
                }
                Some(code) => {
                    let grant = client
                        .exchange_code(&code)
                        .context("Failed to exchange authorization code")?;
                    println!("Authorized. Store this refresh token as spotify.refresh_token");
                    println!("or in {REFRESH_TOKEN_ENV}:");
                    println!("  {}", grant.refresh_token);
                    if let Some(scope) = grant.scope {
                        println!("Granted scopes: {scope}");
                    }
                }
            }
        }

        Commands::Sync { feed, window } => {
            let cursor = window.cursor()?;
            let mut storage = open_storage(&cfg.database)?;
            let client = build_client(&cfg)?;
            sync(&client, &mut storage, feed, cursor)?;
        }

        Commands::Recent {
            user,
            limit,
            window,
        } => {
            let cursor = window.cursor()?;
            let mut storage = open_storage(&cfg.database)?;
            let user = resolve_user(&cfg, user)?;
            let plays = storage.list_plays(&user, cursor, limit)?;
            if plays.is_empty() {
                println!("No plays stored for {user}");
            }
            for play in plays {
                let name = storage
                    .get_track(&play.track_id)?
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| play.track_id.clone());
                println!("{}  {}", play.played_at.format("%Y-%m-%d %H:%M"), name);
            }
        }

        Commands::Saved { user, limit } => {
            let mut storage = open_storage(&cfg.database)?;
            let user = resolve_user(&cfg, user)?;
            let saved = storage.list_saved_tracks(&user, limit)?;
            if saved.is_empty() {
                println!("No saved tracks stored for {user}");
            }
            for entry in saved {
                let name = storage
                    .get_track(&entry.track_id)?
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| entry.track_id.clone());
                println!("{}  {}", entry.added_at.format("%Y-%m-%d"), name);
            }
        }

        Commands::Top { kind, range, limit } => {
            let client = build_client(&cfg)?;
            match kind {
                TopKind::Tracks => {
                    for (i, track) in client.top_tracks(range, limit)?.iter().enumerate() {
                        println!("{:>2}. {}", i + 1, track);
                    }
                }
                TopKind::Artists => {
                    for (i, artist) in client.top_artists(range, limit)?.iter().enumerate() {
                        println!("{:>2}. {}", i + 1, artist.name);
                    }
                }
            }
        }

        Commands::Playlist { range } => {
            let client = build_client(&cfg)?;
            let playlist = client
                .create_top_tracks_playlist(range)
                .context("Failed to create playlist")?;
            println!(
                "Created playlist '{}' with {} tracks",
                playlist.name, playlist.track_count
            );
            if let Some(url) = playlist.external_url {
                println!("  {url}");
            }
        }

        Commands::Playlists => {
            let client = build_client(&cfg)?;
            for playlist in client.playlists() {
                let playlist = playlist?;
                let visibility = if playlist.public { "public" } else { "private" };
                println!(
                    "{}  {} ({} tracks, {visibility})",
                    playlist.id, playlist.name, playlist.track_count
                );
            }
        }

        Commands::Search { query, kind, limit } => {
            let client = build_client(&cfg)?;
            let kinds = kind.into_iter().map(SearchKind::from).collect::<Vec<_>>();
            let results = client.search(&query, &kinds, limit)?;
            for track in &results.tracks {
                println!("track   {}  {}", track.id, track);
            }
            for artist in &results.artists {
                println!("artist  {}  {}", artist.id, artist.name);
            }
            for album in &results.albums {
                println!("album   {}  {}", album.id, album.name);
            }
        }

        Commands::Show { kind, id } => {
            let client = build_client(&cfg)?;
            let document = match kind {
                ItemKind::Track => serde_json::to_string_pretty(&client.get_track(&id)?)?,
                ItemKind::Artist => serde_json::to_string_pretty(&client.get_artist(&id)?)?,
                ItemKind::Album => serde_json::to_string_pretty(&client.get_album(&id)?)?,
            };
            println!("{document}");
        }

        Commands::Save { track_ids } => {
            build_client(&cfg)?.save_tracks(&track_ids)?;
            println!("Saved {} tracks", track_ids.len());
        }

        Commands::Unsave { track_ids } => {
            build_client(&cfg)?.remove_saved_tracks(&track_ids)?;
            println!("Removed {} tracks from the library", track_ids.len());
        }

        Commands::Follow { artist_ids } => {
            build_client(&cfg)?.follow_artists(&artist_ids)?;
            println!("Following {} artists", artist_ids.len());
        }

        Commands::Unfollow { artist_ids } => {
            build_client(&cfg)?.unfollow_artists(&artist_ids)?;
            println!("Unfollowed {} artists", artist_ids.len());
        }

        Commands::Purge { user } => {
            let mut storage = open_storage(&cfg.database)?;
            let plays = storage.delete_all_plays(&user)?;
            let saved = storage.delete_all_saved_tracks(&user)?;
            println!("Removed {plays} plays and {saved} saved tracks of {user}");
        }
    }

    Ok(())
}
