//! Last-resort credential source: read the Gemini session cookies straight
//! out of a local Firefox profile. Firefox stores cookies in plain sqlite;
//! Chromium encrypts its store per-OS, so it is deliberately not supported.

use crate::upstream::{CookiePair, CredentialCandidate, CredentialSource};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

const COOKIE_QUERY: &str = "SELECT name, value FROM moz_cookies \
    WHERE host LIKE '%.google.com' \
    AND name IN ('__Secure-1PSID', '__Secure-1PSIDTS')";

/// Scan local Firefox profiles for a complete Gemini cookie pair.
/// Best-effort: any failure yields `None`, never an error.
pub async fn load_browser_cookies() -> Option<CredentialCandidate> {
    let cookies = tokio::task::spawn_blocking(read_firefox_cookies).await.ok()??;
    tracing::info!("Found Gemini cookies in a local Firefox profile");
    Some(CredentialCandidate { source: CredentialSource::Browser, cookies })
}

fn read_firefox_cookies() -> Option<CookiePair> {
    let profiles = firefox_profiles_dir()?;
    let entries = std::fs::read_dir(&profiles).ok()?;
    for entry in entries.flatten() {
        let db = entry.path().join("cookies.sqlite");
        if db.is_file() {
            match query_cookie_db(&db) {
                Some(pair) => return Some(pair),
                None => continue,
            }
        }
    }
    None
}

fn firefox_profiles_dir() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    let candidates = [
        home.join(".mozilla/firefox"),
        home.join("Library/Application Support/Firefox/Profiles"),
        home.join("snap/firefox/common/.mozilla/firefox"),
    ];
    candidates.into_iter().find(|p| p.is_dir())
}

fn query_cookie_db(db: &Path) -> Option<CookiePair> {
    // A running browser holds the database locked; read a throwaway copy.
    let copy = std::env::temp_dir().join(format!(
        "webai-cookies-{}.sqlite",
        uuid::Uuid::new_v4().simple()
    ));
    std::fs::copy(db, &copy).ok()?;
    let pair = query_copied_db(&copy);
    let _ = std::fs::remove_file(&copy);
    pair
}

fn query_copied_db(path: &Path) -> Option<CookiePair> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).ok()?;
    let mut stmt = conn.prepare(COOKIE_QUERY).ok()?;
    let mut rows = stmt.query([]).ok()?;

    let mut pair = CookiePair::default();
    while let Ok(Some(row)) = rows.next() {
        let name: String = row.get(0).ok()?;
        let value: String = row.get(1).ok()?;
        match name.as_str() {
            "__Secure-1PSID" => pair.psid = value,
            "__Secure-1PSIDTS" => pair.psidts = value,
            _ => {},
        }
    }

    pair.is_complete().then_some(pair)
}
