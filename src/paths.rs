use std::path::PathBuf;

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

pub fn default_data_dir() -> PathBuf {
    let base = if cfg!(target_os = "macos") {
        home_dir().map(|home| home.join("Library").join("Application Support"))
    } else {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| home_dir().map(|home| home.join(".local").join("share")))
    };

    match base {
        Some(base) => {
            let path = base.join("camden");
            let _ = std::fs::create_dir_all(&path);
            path
        }
        None => PathBuf::from("."),
    }
}

pub fn default_config_path() -> PathBuf {
    default_data_dir().join("camden.toml")
}

pub fn default_media_library_dir() -> PathBuf {
    match home_dir() {
        Some(home) => home.join("Pictures").join("Camden"),
        None => PathBuf::from("media-library"),
    }
}
