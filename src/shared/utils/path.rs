use dirs::home_dir;
use std::path::{Path, PathBuf};

/// Expands a leading `~` or `~/`. `~user` forms are left untouched.
pub fn expand_tilde(path: &str) -> PathBuf {
    let Some(home) = home_dir() else {
        return PathBuf::from(path);
    };

    match path {
        "~" => home,
        _ => match path.strip_prefix("~/") {
            Some(rest) => home.join(rest),
            None => PathBuf::from(path),
        },
    }
}

/// Shortens paths under the home directory for user-facing messages.
pub fn contract_tilde(path: &Path) -> String {
    let Some(home) = home_dir() else {
        return path.display().to_string();
    };

    match path.strip_prefix(&home) {
        Ok(rest) if rest.as_os_str().is_empty() => "~".to_string(),
        Ok(rest) => format!("~/{}", rest.display()),
        Err(_) => path.display().to_string(),
    }
}
