use promise_pool::{BoxError, WorkerPool};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone)]
struct Credentials {
  token: String,
}

#[derive(Debug, Clone)]
struct Artist {
  name: String,
  origin: String,
}

#[derive(Debug, Clone)]
struct Track {
  name: String,
  length_ms: u32,
}

#[derive(Debug, Clone)]
struct Album {
  name: String,
  tracks: Vec<Track>,
  artists: Vec<Artist>,
}

fn login_to(service: &str) -> Result<Credentials, BoxError> {
  let login_time_ms = if service == "track" { 50 } else { 25 };
  info!("Logging in for {}", service);
  thread::sleep(Duration::from_millis(login_time_ms));
  info!("Logged in for {}", service);
  Ok(Credentials {
    token: format!("token:{service}"),
  })
}

fn lookup_artists(album_name: &str, login: &Credentials) -> Result<Vec<Artist>, BoxError> {
  if login.token != "token:artist" {
    return Err(format!("invalid credential: {}", login.token).into());
  }
  info!("Looking up artists for {}", album_name);
  thread::sleep(Duration::from_millis(75));
  info!("Looked up artists for {}", album_name);
  Ok(vec![Artist {
    name: "aa".to_string(),
    origin: "UK".to_string(),
  }])
}

fn lookup_tracks(album_name: &str, login: &Credentials) -> Result<Vec<Track>, BoxError> {
  if login.token != "token:track" {
    return Err(format!("invalid credential: {}", login.token).into());
  }
  info!("Looking up tracks for {}", album_name);
  thread::sleep(Duration::from_millis(100));
  info!("Looked up tracks for {}", album_name);
  Ok(vec![
    Track {
      name: "track 1".to_string(),
      length_ms: 100,
    },
    Track {
      name: "track 2".to_string(),
      length_ms: 150,
    },
  ])
}

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false) // Disable module paths for cleaner example output
    .init();

  info!("--- Album Lookup Example ---");

  let pool = WorkerPool::with_workers(4, "album_pool");
  let album_name = "The AA".to_string();
  let start = Instant::now();

  // Two independent logins run concurrently; each lookup chains onto its own
  // login without waiting for the other.
  let artist_pool = pool.clone();
  let artist_album = album_name.clone();
  let artists = pool
    .submit(|| login_to("artist"))
    .and_then(move |login| artist_pool.submit(move || lookup_artists(&artist_album, &login)));

  let track_pool = pool.clone();
  let track_album = album_name.clone();
  let tracks = pool
    .submit(|| login_to("track"))
    .and_then(move |login| track_pool.submit(move || lookup_tracks(&track_album, &login)));

  let combined_name = album_name.clone();
  let album_promise = tracks.combine(&artists, move |tracks, artists| Album {
    name: combined_name,
    tracks,
    artists,
  });

  info!(
    "Recipe built in {:?}; nothing has been joined yet (queued jobs: {}).",
    start.elapsed(),
    pool.queued_job_count()
  );

  match album_promise.join_timeout(Duration::from_millis(500)) {
    Ok(album) => info!(
      "Built {:?} with {} tracks in {:?} (serial sum would be 250ms).",
      album.name,
      album.tracks.len(),
      start.elapsed()
    ),
    Err(error) => info!("Album lookup failed: {}", error),
  }

  info!("--- Album Lookup Example End ---");
}
