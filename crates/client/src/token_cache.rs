//! Client-side token file cache: one JSON file per profile under
//! `~/.gort/tokens/<host>_<port>_<profile>`, written mode 0600. Purely
//! an optimization — a missing or stale cache just re-authenticates.

use std::path::{Path, PathBuf};

use gort_domain::{Result, Token};
use reqwest::Url;

fn cache_dir() -> Option<PathBuf> {
    Some(dirs::home_dir()?.join(".gort").join("tokens"))
}

/// `<host>_<port>_<profile>` inside `dir`.
pub(crate) fn cache_path_in(dir: &Path, url: &Url, profile: &str) -> PathBuf {
    let host = url.host_str().unwrap_or("unknown");
    let port = url.port_or_known_default().unwrap_or(0);
    dir.join(format!("{host}_{port}_{profile}"))
}

pub(crate) fn load(url: &Url, profile: &str) -> Option<Token> {
    let path = cache_path_in(&cache_dir()?, url, profile);
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

pub(crate) fn store(url: &Url, profile: &str, token: &Token) -> Result<()> {
    let Some(dir) = cache_dir() else {
        return Ok(());
    };
    std::fs::create_dir_all(&dir)?;
    let path = cache_path_in(&dir, url, profile);
    std::fs::write(&path, serde_json::to_string(token)?)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn cache_path_is_host_port_profile() {
        let url = Url::parse("https://gort.example.com:4000").unwrap();
        let path = cache_path_in(Path::new("/tmp/tokens"), &url, "gort");
        assert_eq!(path, Path::new("/tmp/tokens/gort.example.com_4000_gort"));
    }

    #[test]
    fn default_port_is_filled_in() {
        let url = Url::parse("https://gort.example.com").unwrap();
        let path = cache_path_in(Path::new("/tmp/tokens"), &url, "p");
        assert_eq!(path, Path::new("/tmp/tokens/gort.example.com_443_p"));
    }

    #[cfg(unix)]
    #[test]
    fn stored_token_round_trips_with_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let url = Url::parse("https://example.com:4000").unwrap();
        let token = Token::new("tok".into(), "admin".into(), Duration::minutes(5));

        let path = cache_path_in(dir.path(), &url, "gort");
        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(&path, serde_json::to_string(&token).unwrap()).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let raw = std::fs::read_to_string(&path).unwrap();
        let reloaded: Token = serde_json::from_str(&raw).unwrap();
        assert_eq!(reloaded.token, token.token);
        assert_eq!(reloaded.user, "admin");
    }
}
