use crate::{process::SpawnRequest, supervisor::StopPolicy};

use std::{
    collections::BTreeMap,
    env, io,
    path::{Path, PathBuf},
};

pub const DEFAULT_SERVICE: &str = "playlist-sync";
pub const DEFAULT_LAUNCHER: &str = "python";
pub const DEFAULT_ENTRY: &str = "app.py";

/// Directory names checked, in order, for a virtual environment under the root.
const VENV_CANDIDATES: [&str; 2] = ["venv", ".venv"];

/// Environment variables read by [`Config::from_env`].
pub mod keys {
    pub const SERVICE: &str = "PLAYLIST_SYNC_SERVICE";
    pub const ROOT: &str = "PLAYLIST_SYNC_ROOT";
    pub const LOG_DIR: &str = "PLAYLIST_SYNC_LOG_DIR";
    pub const PID_FILE: &str = "PLAYLIST_SYNC_PID_FILE";
    pub const LOG_FILE: &str = "PLAYLIST_SYNC_LOG_FILE";
    pub const SUPERVISOR_LOG: &str = "PLAYLIST_SYNC_SUPERVISOR_LOG";
    pub const LAUNCHER: &str = "PLAYLIST_SYNC_LAUNCHER";
    pub const ENTRY: &str = "PLAYLIST_SYNC_ENTRY";
    pub const VENV: &str = "PLAYLIST_SYNC_VENV";
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to determine the service root: {0}")]
    Root(#[source] io::Error),
}

/// Options for one supervisor invocation. Resolved once, never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub service: String,
    /// Child working directory and base of relative paths
    pub root: PathBuf,
    pub log_dir: PathBuf,
    pub pid_file: PathBuf,
    /// Child stdout and stderr
    pub log_file: PathBuf,
    /// Supervisor lifecycle journal
    pub supervisor_log: PathBuf,
    pub launcher: String,
    pub entry: PathBuf,
    pub venv: Option<PathBuf>,
    pub stop: StopPolicy,
}

fn default_root() -> Result<PathBuf, ConfigError> {
    let exe = env::current_exe().map_err(ConfigError::Root)?;

    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        ConfigError::Root(io::Error::new(
            io::ErrorKind::NotFound,
            format!("'{}' has no parent directory", exe.display()),
        ))
    })
}

fn absolute(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(env::current_dir().map_err(ConfigError::Root)?.join(path))
}

fn under(root: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    match path.is_absolute() {
        true => path,
        false => root.join(path),
    }
}

fn is_venv(dir: &Path) -> bool {
    dir.join("bin").join("activate").is_file() || dir.join("pyvenv.cfg").is_file()
}

/// Load environment variables from the .env file in the specified directory
pub fn load_dotenv(path: &Path) -> BTreeMap<String, String> {
    let env_file = path.join(".env");
    let mut env_vars = BTreeMap::new();

    if !env_file.is_file() {
        return env_vars;
    }

    match dotenvy::from_path_iter(&env_file) {
        Ok(iter) => {
            for item in iter {
                match item {
                    Ok((key, value)) => {
                        env_vars.insert(key, value);
                    }
                    Err(err) => log::warn!("Failed to parse .env entry: {err}"),
                }
            }
            if !env_vars.is_empty() {
                log::info!("Loaded {} environment variables from {:?}", env_vars.len(), env_file);
            }
        }
        Err(err) => log::warn!("Failed to read .env file at {:?}: {err}", env_file),
    }

    env_vars
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(|key| env::var(key).ok())
    }

    /// Resolve every option through `lookup`, falling back to defaults.
    /// Blank values count as unset.
    pub fn resolve<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let root = match get(keys::ROOT) {
            Some(root) => absolute(Path::new(&root))?,
            None => default_root()?,
        };

        let service = get(keys::SERVICE).unwrap_or_else(|| DEFAULT_SERVICE.to_string());
        let path = |key: &str, default: PathBuf| {
            get(key)
                .map(|value| under(&root, &value))
                .unwrap_or(default)
        };

        let log_dir = path(keys::LOG_DIR, root.join("logs"));
        let pid_file = path(keys::PID_FILE, log_dir.join(format!("{service}.pid")));
        let log_file = path(keys::LOG_FILE, log_dir.join(format!("{service}.log")));
        let supervisor_log = path(
            keys::SUPERVISOR_LOG,
            log_dir.join(format!("{service}.supervisor.log")),
        );
        let entry = path(keys::ENTRY, root.join(DEFAULT_ENTRY));
        let launcher = get(keys::LAUNCHER).unwrap_or_else(|| DEFAULT_LAUNCHER.to_string());

        let venv = match get(keys::VENV) {
            Some(value) => {
                let dir = under(&root, &value);
                if is_venv(&dir) {
                    Some(dir)
                } else {
                    log::warn!("Ignoring {}: {:?} is not a virtual environment", keys::VENV, dir);
                    None
                }
            }
            None => VENV_CANDIDATES.iter().map(|name| root.join(name)).find(|dir| is_venv(dir)),
        };

        Ok(Config {
            service,
            root,
            log_dir,
            pid_file,
            log_file,
            supervisor_log,
            launcher,
            entry,
            venv,
            stop: StopPolicy::default(),
        })
    }

    /// Launch description for the service: root as working directory, `.env`
    /// variables added, and the virtual environment activated if present.
    pub fn spawn_request(&self) -> SpawnRequest {
        let mut vars = load_dotenv(&self.root);
        let mut env_remove = Vec::new();
        let mut program = self.launcher.clone();

        if let Some(venv) = &self.venv {
            let bin = venv.join("bin");
            let inherited = vars
                .get("PATH")
                .cloned()
                .or_else(|| env::var("PATH").ok())
                .unwrap_or_default();

            let entries = std::iter::once(bin.clone()).chain(env::split_paths(&inherited));
            let search_path = match env::join_paths(entries) {
                Ok(joined) => joined.to_string_lossy().into_owned(),
                Err(err) => {
                    log::warn!("Unable to prepend {:?} to PATH: {err}", bin);
                    inherited
                }
            };

            vars.insert("PATH".to_string(), search_path);
            vars.insert("VIRTUAL_ENV".to_string(), venv.display().to_string());
            vars.remove("PYTHONHOME");
            env_remove.push("PYTHONHOME".to_string());

            if !program.contains('/') && bin.join(&program).is_file() {
                program = bin.join(&program).display().to_string();
            }
        }

        SpawnRequest {
            program,
            args: vec![self.entry.display().to_string()],
            cwd: self.root.clone(),
            env: vars,
            env_remove,
            log_file: self.log_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashMap, fs};

    fn resolve(root: &Path, vars: &[(&str, &str)]) -> Config {
        let mut map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        map.insert(keys::ROOT.to_string(), root.display().to_string());
        Config::resolve(|key| map.get(key).cloned()).unwrap()
    }

    fn make_venv(dir: &Path) {
        fs::create_dir_all(dir.join("bin")).unwrap();
        fs::write(dir.join("bin").join("activate"), "# activate").unwrap();
        fs::write(dir.join("bin").join("python"), "").unwrap();
    }

    #[test]
    fn test_defaults_derive_from_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let config = resolve(root, &[]);

        assert_eq!(config.service, "playlist-sync");
        assert_eq!(config.log_dir, root.join("logs"));
        assert_eq!(config.pid_file, root.join("logs").join("playlist-sync.pid"));
        assert_eq!(config.log_file, root.join("logs").join("playlist-sync.log"));
        assert_eq!(config.supervisor_log, root.join("logs").join("playlist-sync.supervisor.log"));
        assert_eq!(config.launcher, "python");
        assert_eq!(config.entry, root.join("app.py"));
        assert_eq!(config.venv, None);
        assert_eq!(config.stop, StopPolicy::default());
    }

    #[test]
    fn test_service_name_feeds_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let config = resolve(dir.path(), &[(keys::SERVICE, "radio"), (keys::LOG_DIR, "/var/log/radio")]);

        assert_eq!(config.pid_file, PathBuf::from("/var/log/radio/radio.pid"));
        assert_eq!(config.log_file, PathBuf::from("/var/log/radio/radio.log"));
    }

    #[test]
    fn test_relative_overrides_resolve_against_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let config = resolve(
            root,
            &[(keys::PID_FILE, "run/svc.pid"), (keys::ENTRY, "server/main.py"), (keys::LAUNCHER, "python3")],
        );

        assert_eq!(config.pid_file, root.join("run").join("svc.pid"));
        assert_eq!(config.entry, root.join("server").join("main.py"));
        assert_eq!(config.launcher, "python3");
    }

    #[test]
    fn test_blank_values_count_as_unset() {
        let dir = tempfile::tempdir().unwrap();
        let config = resolve(dir.path(), &[(keys::LAUNCHER, "  "), (keys::LOG_DIR, "")]);

        assert_eq!(config.launcher, "python");
        assert_eq!(config.log_dir, dir.path().join("logs"));
    }

    #[test]
    fn test_detects_conventional_venv() {
        let dir = tempfile::tempdir().unwrap();
        make_venv(&dir.path().join(".venv"));

        let config = resolve(dir.path(), &[]);
        assert_eq!(config.venv, Some(dir.path().join(".venv")));
    }

    #[test]
    fn test_ignores_invalid_venv_override() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("env")).unwrap();

        let config = resolve(dir.path(), &[(keys::VENV, "env")]);
        assert_eq!(config.venv, None);
    }

    #[test]
    fn test_spawn_request_without_venv() {
        let dir = tempfile::tempdir().unwrap();
        let config = resolve(dir.path(), &[]);
        let request = config.spawn_request();

        assert_eq!(request.program, "python");
        assert_eq!(request.args, vec![dir.path().join("app.py").display().to_string()]);
        assert_eq!(request.cwd, dir.path());
        assert_eq!(request.log_file, config.log_file);
        assert!(request.env.is_empty());
        assert!(request.env_remove.is_empty());
    }

    #[test]
    fn test_spawn_request_activates_venv() {
        let dir = tempfile::tempdir().unwrap();
        let venv = dir.path().join("venv");
        make_venv(&venv);

        let request = resolve(dir.path(), &[]).spawn_request();
        let bin = venv.join("bin");

        assert_eq!(request.program, bin.join("python").display().to_string());
        assert_eq!(request.env.get("VIRTUAL_ENV"), Some(&venv.display().to_string()));
        assert!(request.env["PATH"].starts_with(&bin.display().to_string()));
        assert_eq!(request.env_remove, vec!["PYTHONHOME".to_string()]);
    }

    #[test]
    fn test_spawn_request_keeps_explicit_launcher_path() {
        let dir = tempfile::tempdir().unwrap();
        make_venv(&dir.path().join("venv"));

        let request = resolve(dir.path(), &[(keys::LAUNCHER, "/usr/bin/python3")]).spawn_request();
        assert_eq!(request.program, "/usr/bin/python3");
    }

    #[test]
    fn test_spawn_request_loads_dotenv() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env"), "PLAYLIST_SYNC_PORT=9090\n# comment\nSPOTIFY_CLIENT_ID=abc\n").unwrap();

        let request = resolve(dir.path(), &[]).spawn_request();
        assert_eq!(request.env.get("PLAYLIST_SYNC_PORT").map(String::as_str), Some("9090"));
        assert_eq!(request.env.get("SPOTIFY_CLIENT_ID").map(String::as_str), Some("abc"));
    }
}
