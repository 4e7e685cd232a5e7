// PUBLIC DOMAIN - NO LICENSE, NO WARRANTY
//
// Gateway credentials and their 4-tier resolution.
//
// Priority:
//     1. Function arguments (address, username, password)
//     2. Environment variables (LINKIS_ADDRESS, LINKIS_USERNAME,
//        LINKIS_PASSWORD or LINKIS_TOKEN)
//     3. ~/.linkis/accounts.csv
//     4. ./accounts.csv
//
//     CSV format: address,username,password (one account per line)
//     Account selection: LINKIS_ACCOUNT=N env var (0-based index)

use crate::config::DEFAULT_ADDRESS;
use crate::error::{LinkisError, Result};
use std::env;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// How requests are authenticated.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// Username/password login establishing a cookie session
    Password { username: String, password: String },
    /// Static token sent as `Token-User` / `Token-Code` headers, no login
    Token { user: String, token: String },
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Auth::Token { user, .. } => f
                .debug_struct("Token")
                .field("user", user)
                .field("token", &"***")
                .finish(),
        }
    }
}

/// Gateway address plus authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Base URL, e.g. `http://localhost:9001`
    pub address: String,
    pub auth: Auth,
}

impl Credentials {
    pub fn password(
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            address: normalize_address(address.into()),
            auth: Auth::Password {
                username: username.into(),
                password: password.into(),
            },
        }
    }

    pub fn token(
        address: impl Into<String>,
        user: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            address: normalize_address(address.into()),
            auth: Auth::Token {
                user: user.into(),
                token: token.into(),
            },
        }
    }

    /// User the gateway will run jobs as.
    pub fn username(&self) -> &str {
        match &self.auth {
            Auth::Password { username, .. } => username,
            Auth::Token { user, .. } => user,
        }
    }

    /// Whether a login call is needed before the first request.
    pub fn needs_login(&self) -> bool {
        matches!(self.auth, Auth::Password { .. })
    }
}

fn normalize_address(address: String) -> String {
    address.trim().trim_end_matches('/').to_string()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Get the ~/.linkis directory path
fn get_linkis_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".linkis"))
}

/// Load credentials from a CSV file (address,username,password per line)
fn load_credentials_from_csv(path: &Path, account_index: usize) -> Option<Credentials> {
    let file = fs::File::open(path).ok()?;
    let reader = BufReader::new(file);

    let line = reader
        .lines()
        .map_while(|l| l.ok())
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .nth(account_index)?;

    let parts: Vec<&str> = line.splitn(3, ',').map(str::trim).collect();
    match parts.as_slice() {
        [address, username, password]
            if address.starts_with("http://") || address.starts_with("https://") =>
        {
            if username.is_empty() || password.is_empty() {
                return None;
            }
            Some(Credentials::password(*address, *username, *password))
        }
        _ => None,
    }
}

/// Resolve credentials using the 4-tier priority system.
///
/// # Examples
/// ```ignore
/// // Use environment variables or config file
/// let creds = resolve_credentials(None, None, None)?;
///
/// // Use explicit credentials
/// let creds = resolve_credentials(Some("http://gateway:9001"), Some("hadoop"), Some("secret"))?;
/// ```
pub fn resolve_credentials(
    address: Option<&str>,
    username: Option<&str>,
    password: Option<&str>,
) -> Result<Credentials> {
    let env_address = non_empty(env::var("LINKIS_ADDRESS").ok());
    let address_or_env = || {
        non_empty(address.map(str::to_string))
            .or_else(|| env_address.clone())
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_string())
    };

    // Tier 1: Function arguments
    if let (Some(user), Some(pass)) = (
        non_empty(username.map(str::to_string)),
        non_empty(password.map(str::to_string)),
    ) {
        return Ok(Credentials::password(address_or_env(), user, pass));
    }

    // Tier 2: Environment variables
    if let Some(user) = non_empty(env::var("LINKIS_USERNAME").ok()) {
        if let Some(pass) = non_empty(env::var("LINKIS_PASSWORD").ok()) {
            return Ok(Credentials::password(address_or_env(), user, pass));
        }
        if let Some(token) = non_empty(env::var("LINKIS_TOKEN").ok()) {
            return Ok(Credentials::token(address_or_env(), user, token));
        }
    }

    let account_index: usize = env::var("LINKIS_ACCOUNT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    // Tier 3: ~/.linkis/accounts.csv
    if let Some(dir) = get_linkis_dir() {
        if let Some(creds) = load_credentials_from_csv(&dir.join("accounts.csv"), account_index) {
            return Ok(creds);
        }
    }

    // Tier 4: ./accounts.csv
    if let Some(creds) = load_credentials_from_csv(Path::new("accounts.csv"), account_index) {
        return Ok(creds);
    }

    Err(LinkisError::NoCredentials)
}
