//! Python extension runtime.
//!
//! Units run out of process. An embedded harness imports the source with the
//! configured interpreter, calls its `setup(bot)` entry point against a
//! recording host, and either describes what was registered or invokes one
//! command handler. Each command invocation re-imports the source, so units
//! keep no in-process state between commands other than their settings.

use crate::extensions::record::{CommandInfo, ModuleInfo};
use crate::extensions::unit::{ExtensionUnit, HostContext, UnitError, UnitLoader, UnitResult};
use crate::registry::{CommandContext, CommandHandler, CommandReply};
use crate::storage::SettingsStore;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// MIME types that mark an attachment as Python source.
pub const PYTHON_MIME_TYPES: &[&str] = &["text/x-python", "text/x-script.python"];

static DECLARED_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^__extension_name__\s*=\s*["']([^"'\r\n]+)["']"#)
        .expect("valid declared-name pattern")
});

const HARNESS: &str = r#"
import asyncio, importlib.util, inspect, json, os, sys

OUT = sys.stdout
sys.stdout = sys.stderr


def emit(payload, code=0):
    OUT.write(json.dumps(payload, default=str))
    OUT.flush()
    sys.exit(code)


class Host:
    def __init__(self, name, settings, prefix):
        self.name = name
        self.settings = settings
        self.command_prefix = prefix
        self.commands = {}
        self.order = []
        self.description = None

    def register_command(self, cmd, handler, description="", module_name=None):
        token = str(cmd).strip().lower()
        if token in self.commands:
            self.order.remove(token)
        self.commands[token] = (handler, description or "")
        self.order.append(token)

    def set_module_description(self, module_name, description):
        self.description = description


class Event:
    def __init__(self, text, args):
        self.text = text
        self.raw_text = text
        self.args = args
        self.output = None

    async def edit(self, text, **kwargs):
        self.output = str(text)
        return self

    async def reply(self, text, **kwargs):
        self.output = str(text)
        return self

    async def delete(self):
        return None


def run(result):
    if inspect.isawaitable(result):
        return asyncio.run(result)
    return result


def load(path, name, host):
    sys.path.insert(0, os.path.dirname(os.path.abspath(path)))
    spec = importlib.util.spec_from_file_location(name, path)
    if spec is None or spec.loader is None:
        emit({"error": "load_failed", "message": "cannot import " + path}, 1)
    module = importlib.util.module_from_spec(spec)
    sys.modules[name] = module
    try:
        spec.loader.exec_module(module)
    except Exception as exc:
        emit({"error": "load_failed", "message": f"{type(exc).__name__}: {exc}"}, 1)
    setup = getattr(module, "setup", None)
    if not callable(setup):
        emit({"error": "missing_entry_point", "message": "setup() is not defined"}, 2)
    try:
        run(setup(host))
    except Exception as exc:
        emit({"error": "setup_failed", "message": f"{type(exc).__name__}: {exc}"}, 1)
    return module


def main():
    mode, path, name = sys.argv[1], sys.argv[2], sys.argv[3]
    request = json.loads(sys.stdin.read() or "{}")
    host = Host(name, request.get("settings") or {}, request.get("prefix", "."))
    module = load(path, name, host)

    if mode == "describe":
        info = None
        getter = getattr(module, "get_module_info", None)
        if callable(getter):
            try:
                info = getter()
            except Exception:
                info = None
        emit({
            "commands": [
                {"command": t, "description": host.commands[t][1]} for t in host.order
            ],
            "description": host.description,
            "module_info": info if isinstance(info, dict) else None,
            "settings": host.settings,
        })

    token = request.get("token", "")
    entry = host.commands.get(token)
    if entry is None:
        emit({"error": "unknown_command", "message": token}, 1)
    event = Event(request.get("text", ""), request.get("args", ""))
    try:
        run(entry[0](event))
    except Exception as exc:
        emit({"error": "handler_failed", "message": f"{type(exc).__name__}: {exc}"}, 1)
    emit({"reply": event.output, "settings": host.settings})


main()
"#;

#[derive(Debug, Deserialize)]
struct HarnessFailure {
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Description {
    #[serde(default)]
    commands: Vec<CommandInfo>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    module_info: Option<Value>,
    #[serde(default)]
    settings: Value,
}

#[derive(Debug, Deserialize)]
struct Invocation {
    #[serde(default)]
    reply: Option<String>,
    #[serde(default)]
    settings: Value,
}

/// Parses harness output into `T`, mapping reported failures to unit errors.
fn parse_harness<T: DeserializeOwned>(
    success: bool,
    stdout: &[u8],
    stderr: &[u8],
) -> UnitResult<T> {
    if success {
        return serde_json::from_slice(stdout)
            .map_err(|e| UnitError::Runtime(format!("malformed harness output: {e}")));
    }

    match serde_json::from_slice::<HarnessFailure>(stdout) {
        Ok(failure) if failure.error == "missing_entry_point" => {
            Err(UnitError::MissingEntryPoint(failure.message))
        }
        Ok(failure) if failure.error == "handler_failed" || failure.error == "unknown_command" => {
            Err(UnitError::Runtime(failure.message))
        }
        Ok(failure) => Err(UnitError::Setup(failure.message)),
        Err(_) => {
            let stderr = String::from_utf8_lossy(stderr);
            let last = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("no output");
            Err(UnitError::Runtime(format!("interpreter failed: {}", last.trim())))
        }
    }
}

/// Runs the harness and returns its parsed output.
async fn run_harness<T: DeserializeOwned>(
    interpreter: &str,
    mode: &str,
    path: &Path,
    name: &str,
    request: &Value,
) -> UnitResult<T> {
    let mut child = Command::new(interpreter)
        .arg("-c")
        .arg(HARNESS)
        .arg(mode)
        .arg(path)
        .arg(name)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(request.to_string().as_bytes()).await?;
    }

    let output = child.wait_with_output().await?;
    parse_harness(output.status.success(), &output.stdout, &output.stderr)
}

/// Loads `.py` extensions through an external interpreter.
#[derive(Debug, Clone)]
pub struct PythonUnitLoader {
    interpreter: String,
    command_prefix: String,
}

impl PythonUnitLoader {
    /// Creates a loader that runs sources with `interpreter`.
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self { interpreter: interpreter.into(), command_prefix: ".".to_string() }
    }

    /// Command prefix exposed to units as `bot.command_prefix`.
    #[must_use]
    pub fn with_command_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.command_prefix = prefix.into();
        self
    }
}

#[async_trait]
impl UnitLoader for PythonUnitLoader {
    async fn load(&self, name: &str, path: &Path) -> UnitResult<Arc<dyn ExtensionUnit>> {
        if !tokio::fs::try_exists(path).await? {
            return Err(UnitError::Runtime(format!("source not found: {}", path.display())));
        }
        Ok(Arc::new(PythonUnit {
            interpreter: self.interpreter.clone(),
            command_prefix: self.command_prefix.clone(),
            name: name.to_string(),
            path: path.to_path_buf(),
            info: Mutex::new(None),
        }))
    }

    fn file_extension(&self) -> &str {
        "py"
    }

    fn accepts(&self, file_name: Option<&str>, mime_type: Option<&str>) -> bool {
        let by_mime = mime_type.is_some_and(|m| PYTHON_MIME_TYPES.contains(&m));
        let by_name = file_name.is_some_and(|n| {
            Path::new(n).extension().is_some_and(|ext| ext.eq_ignore_ascii_case("py"))
        });
        by_mime || by_name
    }

    fn declared_name(&self, source: &str) -> Option<String> {
        DECLARED_NAME_RE
            .captures(source)
            .map(|caps| caps[1].trim().to_string())
            .filter(|name| !name.is_empty())
    }
}

struct PythonUnit {
    interpreter: String,
    command_prefix: String,
    name: String,
    path: PathBuf,
    info: Mutex<Option<ModuleInfo>>,
}

#[async_trait]
impl ExtensionUnit for PythonUnit {
    async fn setup(&self, host: &mut HostContext) -> UnitResult<()> {
        let settings = host.settings().await?;
        let request = json!({ "settings": settings, "prefix": self.command_prefix });
        let description: Description =
            run_harness(&self.interpreter, "describe", &self.path, &self.name, &request).await?;

        debug!(
            extension = %self.name,
            commands = description.commands.len(),
            "Described python extension"
        );

        let store = host.settings_store();
        for command in &description.commands {
            let handler = PythonCommandHandler {
                interpreter: self.interpreter.clone(),
                command_prefix: self.command_prefix.clone(),
                name: self.name.clone(),
                path: self.path.clone(),
                settings: Arc::clone(&store),
            };
            host.register_command(&command.token, Arc::new(handler), command.description.clone());
        }
        if let Some(text) = description.description {
            host.set_description(text);
        }
        if description.settings.is_object() && description.settings != settings {
            host.save_settings(&description.settings).await?;
        }

        let info = description.module_info.and_then(|v| serde_json::from_value(v).ok());
        if let Ok(mut slot) = self.info.lock() {
            *slot = info;
        }
        Ok(())
    }

    fn module_info(&self) -> Option<ModuleInfo> {
        self.info.lock().ok().and_then(|slot| slot.clone())
    }
}

struct PythonCommandHandler {
    interpreter: String,
    command_prefix: String,
    name: String,
    path: PathBuf,
    settings: Arc<dyn SettingsStore>,
}

#[async_trait]
impl CommandHandler for PythonCommandHandler {
    async fn handle(&self, ctx: &CommandContext) -> anyhow::Result<CommandReply> {
        let settings = self.settings.load_settings(&self.name).await?;
        let request = json!({
            "token": ctx.token,
            "text": ctx.text,
            "args": ctx.args,
            "settings": settings,
            "prefix": self.command_prefix,
        });
        let invocation: Invocation =
            run_harness(&self.interpreter, "invoke", &self.path, &self.name, &request).await?;

        if invocation.settings.is_object() && invocation.settings != settings {
            if let Err(e) = self.settings.save_settings(&self.name, &invocation.settings).await {
                warn!(extension = %self.name, error = %e, "Failed to persist settings");
            }
        }
        Ok(invocation.reply)
    }
}
