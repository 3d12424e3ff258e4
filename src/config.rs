use std::path::PathBuf;
use std::time::Duration;

use clap::parser::ValueSource;
use clap::{ArgGroup, ArgMatches, Command, CommandFactory, FromArgMatches, Parser};

use crate::error::{ClientError, Result};
use crate::output::OutputFormat;

/// Command line surface of the client.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "flight-query-client")]
#[command(about = "Query a SQL engine through its Arrow Flight endpoint", long_about = None)]
#[command(group(
    ArgGroup::new("credentials")
        .required(true)
        .multiple(true)
        .args(["user", "pat"])
))]
pub struct Args {
    /// Coordinator hostname
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Flight server port
    #[arg(long, default_value_t = 32010)]
    pub port: u16,

    /// Username for basic authentication
    #[arg(long, requires = "pass")]
    pub user: Option<String>,

    /// Password for basic authentication
    #[arg(long, env = "FLIGHT_PASSWORD", hide_env_values = true)]
    pub pass: Option<String>,

    /// Personal access token, sent as a bearer credential
    #[arg(long, env = "FLIGHT_PAT", hide_env_values = true)]
    pub pat: Option<String>,

    /// Enable an encrypted connection
    #[arg(long)]
    pub tls: bool,

    /// PEM file with trusted certificates for the encrypted connection
    #[arg(long, requires = "tls")]
    pub certs: Option<PathBuf>,

    /// SQL query to run; without it the client stops after authenticating
    #[arg(long)]
    pub query: Option<String>,

    /// Project id, set as a session option when using a token
    #[arg(long)]
    pub project_id: Option<String>,

    /// Extra client property sent as a header on every call (KEY=VALUE)
    #[arg(long = "session-property", value_parser = parse_key_value)]
    pub session_properties: Vec<(String, String)>,

    /// Engine to route the query to
    #[arg(long)]
    pub engine: Option<String>,

    /// How query results are printed
    #[arg(long, value_enum, default_value_t = OutputFormat::Lines)]
    pub format: OutputFormat,

    /// Also write the result batches to this Arrow IPC file
    #[arg(long)]
    pub save_to: Option<PathBuf>,

    /// Give up connecting after this many seconds
    #[arg(long)]
    pub connect_timeout_secs: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

impl Args {
    /// Like [`Parser::parse`], but a credential flag given on the command
    /// line wins over a secret of the other mode picked up from the environment.
    pub fn parse_resolved() -> Self {
        Self::try_parse_with(Self::command(), std::env::args_os()).unwrap_or_else(|e| e.exit())
    }

    pub fn try_parse_resolved_from<I, T>(argv: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::try_parse_with(Self::command(), argv)
    }

    fn try_parse_with<I, T>(command: Command, argv: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = command.try_get_matches_from(argv)?;
        let mut args = Self::from_arg_matches(&matches)?;
        args.drop_shadowed_env_secrets(&matches);
        Ok(args)
    }

    fn drop_shadowed_env_secrets(&mut self, matches: &ArgMatches) {
        let from_env = |id: &str| matches.value_source(id) == Some(ValueSource::EnvVariable);
        if self.user.is_some() && from_env("pat") {
            self.pat = None;
        }
        if self.user.is_none() && self.pat.is_some() && !from_env("pat") && from_env("pass") {
            self.pass = None;
        }
    }
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Exactly one way of proving identity to the server.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { username: String, password: String },
    Bearer(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::Bearer(_) => f.debug_tuple("Bearer").field(&"<redacted>").finish(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsMode {
    #[default]
    Disabled,
    Enabled {
        certs: Option<PathBuf>,
    },
}

impl TlsMode {
    pub fn is_enabled(&self) -> bool {
        matches!(self, TlsMode::Enabled { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutputOptions {
    pub format: OutputFormat,
    pub save_to: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FlightConfig {
    pub host: String,
    pub port: u16,
    pub credentials: Credentials,
    pub tls: TlsMode,
    pub query: Option<String>,
    pub project_id: Option<String>,
    pub client_properties: Vec<(String, String)>,
    pub engine: Option<String>,
    pub connect_timeout: Option<Duration>,
    pub output: OutputOptions,
}

impl FlightConfig {
    pub fn new(host: impl Into<String>, port: u16, credentials: Credentials) -> Self {
        Self {
            host: host.into(),
            port,
            credentials,
            tls: TlsMode::Disabled,
            query: None,
            project_id: None,
            client_properties: Vec::new(),
            engine: None,
            connect_timeout: None,
            output: OutputOptions::default(),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn endpoint_uri(&self) -> String {
        let scheme = if self.tls.is_enabled() { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ClientError::Config("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(ClientError::Config("port must not be 0".into()));
        }
        match &self.credentials {
            Credentials::Basic { username, password } => {
                if username.is_empty() || password.is_empty() {
                    return Err(ClientError::Config(
                        "username and password must both be non-empty".into(),
                    ));
                }
            }
            Credentials::Bearer(token) => {
                if token.trim().is_empty() {
                    return Err(ClientError::Config("token must not be empty".into()));
                }
            }
        }
        if let Some(query) = &self.query {
            if query.trim().is_empty() {
                return Err(ClientError::Config("query must not be blank".into()));
            }
        }
        Ok(())
    }
}

impl TryFrom<Args> for FlightConfig {
    type Error = ClientError;

    fn try_from(args: Args) -> Result<Self> {
        let credentials = match (args.user, args.pass, args.pat) {
            (Some(username), Some(password), None) => Credentials::Basic { username, password },
            (None, None, Some(token)) => Credentials::Bearer(token),
            (Some(_), None, None) => {
                return Err(ClientError::Config("--user requires --pass".into()));
            }
            (None, None, None) | (None, Some(_), None) => {
                return Err(ClientError::Config(
                    "either --user/--pass or --pat must be supplied".into(),
                ));
            }
            _ => {
                return Err(ClientError::Config(
                    "--user/--pass and --pat are mutually exclusive".into(),
                ));
            }
        };

        let tls = match (args.tls, args.certs) {
            (true, certs) => TlsMode::Enabled { certs },
            (false, None) => TlsMode::Disabled,
            (false, Some(_)) => {
                return Err(ClientError::Config("--certs requires --tls".into()));
            }
        };

        let config = FlightConfig {
            host: args.host,
            port: args.port,
            credentials,
            tls,
            query: args.query,
            project_id: args.project_id,
            client_properties: args.session_properties,
            engine: args.engine,
            connect_timeout: args.connect_timeout_secs.map(Duration::from_secs),
            output: OutputOptions {
                format: args.format,
                save_to: args.save_to,
            },
        };
        config.validate()?;
        Ok(config)
    }
}
