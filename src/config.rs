//!
//! acl-proxy configuration
//! -----------------------
//! Options are resolved from built-in defaults, then `ACL_PROXY_*` environment
//! variables, then command-line flags (flags win). Parsing is pure over an env
//! lookup function and an argument slice so it can be tested without touching
//! the process environment.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 4567;
pub const DEFAULT_DATA_DIR: &str = "./data";

pub const USAGE: &str = "acl-proxy\n\nUSAGE:\n  acl_proxy_server [OPTIONS]\n\nOPTIONS:\n  --host HOST              Listen address (env: ACL_PROXY_HOST, default 0.0.0.0)\n  -p, --port N             Listen port (env: ACL_PROXY_PORT, default 4567)\n  -d, --dir PATH           Data directory (env: ACL_PROXY_DATA_DIR, default ./data)\n  --publish-script PATH    Run after every publish (env: ACL_PROXY_PUBLISH_SCRIPT)\n  --credentials SCHEME     plaintext | bcrypt (env: ACL_PROXY_CREDENTIALS, default plaintext)\n  --no-signals             Do not install SIGINT/SIGTERM handlers\n  -D, --debug              Debug logging (env: ACL_PROXY_DEBUG)\n  -V, --trace              Trace logging (env: ACL_PROXY_TRACE)\n  -h, --help               Print this help\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub publish_script: Option<PathBuf>,
    pub credentials: String,
    pub no_signals: bool,
    pub debug: bool,
    pub trace: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            publish_script: None,
            credentials: "plaintext".to_string(),
            no_signals: false,
            debug: false,
            trace: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Run(Options),
    Help,
}

fn parse_bool(name: &str, v: &str) -> Result<bool> {
    match v.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{}: expected a boolean, got '{}'", name, other),
    }
}

fn parse_port(name: &str, v: &str) -> Result<u16> {
    v.parse::<u16>().with_context(|| format!("{}: invalid port '{}'", name, v))
}

impl Options {
    /// Resolve options from an environment lookup and the argument list (without argv[0]).
    pub fn parse<E>(env: E, args: &[String]) -> Result<Invocation>
    where
        E: Fn(&str) -> Option<String>,
    {
        let mut o = Options::default();

        if let Some(v) = env("ACL_PROXY_HOST") { o.host = v; }
        if let Some(v) = env("ACL_PROXY_PORT") { o.port = parse_port("ACL_PROXY_PORT", &v)?; }
        if let Some(v) = env("ACL_PROXY_DATA_DIR") { o.data_dir = PathBuf::from(v); }
        if let Some(v) = env("ACL_PROXY_PUBLISH_SCRIPT") {
            o.publish_script = if v.is_empty() { None } else { Some(PathBuf::from(v)) };
        }
        if let Some(v) = env("ACL_PROXY_CREDENTIALS") { o.credentials = v; }
        if let Some(v) = env("ACL_PROXY_DEBUG") { o.debug = parse_bool("ACL_PROXY_DEBUG", &v)?; }
        if let Some(v) = env("ACL_PROXY_TRACE") { o.trace = parse_bool("ACL_PROXY_TRACE", &v)?; }

        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            let mut value = || -> Result<String> {
                i += 1;
                args.get(i).cloned().ok_or_else(|| anyhow!("{} requires a value", flag))
            };
            match flag {
                "-h" | "--help" => return Ok(Invocation::Help),
                "--host" => o.host = value()?,
                "-p" | "--port" => {
                    let v = value()?;
                    o.port = parse_port(flag, &v)?;
                }
                "-d" | "--dir" => o.data_dir = PathBuf::from(value()?),
                "--publish-script" => o.publish_script = Some(PathBuf::from(value()?)),
                "--credentials" => o.credentials = value()?,
                "--no-signals" => o.no_signals = true,
                "-D" | "--debug" => o.debug = true,
                "-V" | "--trace" => o.trace = true,
                other => bail!("unknown option '{}'\n\n{}", other, USAGE),
            }
            i += 1;
        }

        if crate::credential::policy_by_name(&o.credentials).is_none() {
            bail!("unknown credential scheme '{}' (expected plaintext or bcrypt)", o.credentials);
        }
        Ok(Invocation::Run(o))
    }

    /// Resolve from the real process environment and arguments.
    pub fn from_process() -> Result<Invocation> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        Self::parse(|k| std::env::var(k).ok(), &args)
    }

    /// Resolve the listen address. Host names such as `localhost` are looked up, and
    /// IPv6 literals are accepted bare (`::1`).
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))?
            .next()
            .ok_or_else(|| anyhow!("listen address {}:{} resolved to nothing", self.host, self.port))
    }

    /// Default `EnvFilter` directive when `RUST_LOG` is not set.
    pub fn log_level(&self) -> &'static str {
        if self.trace {
            "trace"
        } else if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}
