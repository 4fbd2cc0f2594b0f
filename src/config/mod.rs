use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

const DEFAULT_MODEL: &str = "mistral:7b";
const DEFAULT_MODEL_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_TOOL_HOST: &str = "server.py";
const DEFAULT_TEMPERATURE: f32 = 0.2;
const DEFAULT_MAX_TOOL_STEPS: usize = 4;
const DEFAULT_CONFIG_PATH: &str = "config/client.toml";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model: String,
    pub model_url: String,
    pub temperature: f32,
    pub max_tool_steps: usize,
    pub system_prompt: Option<String>,
    pub tool_host: Option<ToolHostConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config from {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    model: Option<String>,
    model_url: Option<String>,
    temperature: Option<f32>,
    max_tool_steps: Option<usize>,
    system_prompt: Option<String>,
    tool_host: Option<RawToolHost>,
}

/// Command line of the tool-host process the session is spawned against.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ToolHostConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawToolHost {
    Program(String),
    Detailed {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        workdir: Option<PathBuf>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
}

impl ToolHostConfig {
    /// Builds a host command from a bare program path. Python scripts are
    /// launched through the interpreter; anything else is executed directly.
    pub fn for_program(program: &str) -> Self {
        if program.ends_with(".py") {
            Self {
                command: "python".to_string(),
                args: vec![program.to_string()],
                workdir: None,
                env: HashMap::new(),
            }
        } else {
            Self {
                command: program.to_string(),
                args: Vec::new(),
                workdir: None,
                env: HashMap::new(),
            }
        }
    }

    pub fn default_host() -> Self {
        Self::for_program(DEFAULT_TOOL_HOST)
    }

    /// Short name used in logs and error messages.
    pub fn label(&self) -> &str {
        match self.command.as_str() {
            "python" | "python3" | "node" => {
                self.args.first().map(String::as_str).unwrap_or(&self.command)
            }
            _ => &self.command,
        }
    }
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return read_config(path);
        }
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        match read_config(default_path) {
            Ok(config) => Ok(config),
            Err(ConfigError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                info!("Configuration file not found; using defaults");
                Ok(Self::default())
            }
            Err(other) => Err(other),
        }
    }

    pub fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            model_url: DEFAULT_MODEL_URL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tool_steps: DEFAULT_MAX_TOOL_STEPS,
            system_prompt: None,
            tool_host: None,
        }
    }
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    debug!(path = %path.display(), "Reading client configuration file");
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: RawConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(AppConfig {
        model: parsed.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        model_url: parsed
            .model_url
            .unwrap_or_else(|| DEFAULT_MODEL_URL.to_string()),
        temperature: parsed.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        max_tool_steps: parsed.max_tool_steps.unwrap_or(DEFAULT_MAX_TOOL_STEPS),
        system_prompt: parsed.system_prompt,
        tool_host: parsed.tool_host.map(ToolHostConfig::from),
    })
}

impl From<RawToolHost> for ToolHostConfig {
    fn from(value: RawToolHost) -> Self {
        match value {
            RawToolHost::Program(program) => Self::for_program(&program),
            RawToolHost::Detailed {
                command,
                args,
                workdir,
                env,
            } => Self {
                command,
                args,
                workdir,
                env,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;

    static WORKDIR_GUARD: Mutex<()> = Mutex::new(());

    #[test]
    fn returns_default_when_missing() {
        let _lock = WORKDIR_GUARD.lock().expect("lock guard");
        let original_dir = env::current_dir().expect("current dir");
        let temp = tempfile::tempdir().expect("tempdir");
        env::set_current_dir(temp.path()).expect("switch to temp dir");

        let config = AppConfig::load(None).expect("load succeeds");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.model_url, DEFAULT_MODEL_URL);
        assert_eq!(config.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(config.max_tool_steps, DEFAULT_MAX_TOOL_STEPS);
        assert!(config.system_prompt.is_none());
        assert!(config.tool_host.is_none());

        env::set_current_dir(original_dir).expect("restore current dir");
    }

    #[test]
    fn reads_model_and_loop_settings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("client.toml");
        let mut file = File::create(&path).expect("create config");
        writeln!(
            file,
            r#"
model = "llama3"
model_url = "http://10.0.0.5:11434"
temperature = 0.0
max_tool_steps = 6
system_prompt = "keep short"
"#
        )
        .expect("write");

        let config = AppConfig::load(Some(&path)).expect("load config");
        assert_eq!(config.model, "llama3");
        assert_eq!(config.model_url, "http://10.0.0.5:11434");
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.max_tool_steps, 6);
        assert_eq!(config.system_prompt.as_deref(), Some("keep short"));
    }

    #[test]
    fn reads_tool_host_as_bare_program() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("client.toml");
        fs::write(&path, r#"tool_host = "tools/fun_server.py""#).expect("write");

        let config = AppConfig::load(Some(&path)).expect("load");
        let host = config.tool_host.expect("tool host configured");
        assert_eq!(host.command, "python");
        assert_eq!(host.args, vec!["tools/fun_server.py"]);
        assert_eq!(host.label(), "tools/fun_server.py");
    }

    #[test]
    fn reads_tool_host_as_full_command() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("client.toml");
        fs::write(
            &path,
            r#"
model = "llama3"

[tool_host]
command = "npx"
args = ["-y", "@example/tool-server"]
"#,
        )
        .expect("write tool host config");

        let config = AppConfig::load(Some(&path)).expect("load");
        let host = config.tool_host.expect("tool host configured");
        assert_eq!(host.command, "npx");
        assert_eq!(host.args, vec!["-y", "@example/tool-server"]);
        assert_eq!(host.label(), "npx");
    }

    #[test]
    fn bare_program_without_py_suffix_runs_directly() {
        let host = ToolHostConfig::for_program("./toolhost");
        assert_eq!(host.command, "./toolhost");
        assert!(host.args.is_empty());
        assert_eq!(host.label(), "./toolhost");
    }
}
