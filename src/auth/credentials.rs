//! Credential resolution for the UniMiB single sign-on
//!
//! Credentials come from the command line first, then from the
//! `UNIMIB_USERNAME` / `UNIMIB_PASSWORD` environment variables (a `.env` file
//! is loaded at startup). Anything still missing is prompted for when stdin is
//! a terminal.

use std::env;
use std::fmt;
use std::io::{self, Write};
use std::path::Path;

use crate::constants::env as env_constants;
use crate::errors::{AuthError, AuthResult};

/// Username and password for the identity provider
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authentication status information
#[derive(Debug, Clone)]
pub struct AuthStatus {
    /// Whether username environment variable is set
    pub username_set: bool,
    /// Whether password environment variable is set
    pub password_set: bool,
    /// Whether .env file exists in current directory
    pub dotenv_file_exists: bool,
}

impl AuthStatus {
    /// Check if both credentials are available in environment
    pub fn has_credentials(&self) -> bool {
        self.username_set && self.password_set
    }

    /// Hint shown when credentials are missing
    pub fn status_message(&self) -> String {
        match (self.username_set, self.password_set) {
            (true, true) => "Credentials configured".to_string(),
            (false, false) if self.dotenv_file_exists => format!(
                "The .env file does not define {} and {}",
                env_constants::USERNAME,
                env_constants::PASSWORD
            ),
            (false, false) => format!(
                "Pass --username/--password or set {} and {}",
                env_constants::USERNAME,
                env_constants::PASSWORD
            ),
            (true, false) => format!("Pass --password or set {}", env_constants::PASSWORD),
            (false, true) => format!("Pass --username or set {}", env_constants::USERNAME),
        }
    }
}

/// Check current authentication status
pub fn get_auth_status() -> AuthStatus {
    AuthStatus {
        username_set: env_value(env_constants::USERNAME).is_some(),
        password_set: env_value(env_constants::PASSWORD).is_some(),
        dotenv_file_exists: Path::new(".env").exists(),
    }
}

fn env_value(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

/// Resolves credentials from arguments, environment and, on a terminal, a prompt
///
/// # Errors
///
/// Returns `AuthError::MissingCredentials` if a value is missing and cannot
/// be prompted for.
pub fn resolve_credentials(
    username: Option<String>,
    password: Option<String>,
) -> AuthResult<Credentials> {
    let interactive = atty::is(atty::Stream::Stdin);
    resolve_with(username, password, env_value, interactive, prompt_missing)
}

/// Resolution with injectable environment and prompt
fn resolve_with<L, P>(
    username: Option<String>,
    password: Option<String>,
    lookup: L,
    interactive: bool,
    prompt: P,
) -> AuthResult<Credentials>
where
    L: Fn(&str) -> Option<String>,
    P: FnOnce(Option<String>, Option<String>) -> AuthResult<Credentials>,
{
    let username = username
        .filter(|value| !value.is_empty())
        .or_else(|| lookup(env_constants::USERNAME));
    let password = password
        .filter(|value| !value.is_empty())
        .or_else(|| lookup(env_constants::PASSWORD));

    match (username, password) {
        (Some(username), Some(password)) => Ok(Credentials { username, password }),
        (username, password) if interactive => prompt(username, password),
        _ => Err(AuthError::MissingCredentials),
    }
}

/// Prompts for whichever value is missing
fn prompt_missing(username: Option<String>, password: Option<String>) -> AuthResult<Credentials> {
    let username = match username {
        Some(username) => username,
        None => {
            print!("UniMiB username: ");
            io::stdout().flush()?;
            let mut line = String::new();
            io::stdin().read_line(&mut line)?;
            line.trim().to_string()
        }
    };
    let password = match password {
        Some(password) => password,
        None => rpassword::prompt_password(format!("Password for {}: ", username))?,
    };

    if username.is_empty() || password.is_empty() {
        return Err(AuthError::MissingCredentials);
    }
    Ok(Credentials { username, password })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn environment(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| values.get(name).cloned()
    }

    fn no_prompt(_: Option<String>, _: Option<String>) -> AuthResult<Credentials> {
        panic!("prompt must not be used");
    }

    /// Test argument precedence
    ///
    /// Verifies that command-line values win over the environment and that
    /// the environment fills what the command line left out.
    #[test]
    fn test_arguments_override_environment() {
        let env = environment(&[
            ("UNIMIB_USERNAME", "env.user"),
            ("UNIMIB_PASSWORD", "env-secret"),
        ]);

        let creds = resolve_with(Some("m.rossi".into()), None, &env, false, no_prompt).unwrap();
        assert_eq!(creds.username, "m.rossi");
        assert_eq!(creds.password, "env-secret");

        let creds = resolve_with(None, None, &env, false, no_prompt).unwrap();
        assert_eq!(creds.username, "env.user");
    }

    #[test]
    fn test_missing_credentials_without_terminal() {
        let env = environment(&[("UNIMIB_USERNAME", "env.user")]);
        let result = resolve_with(None, None, &env, false, no_prompt);
        assert!(matches!(result, Err(AuthError::MissingCredentials)));

        let result = resolve_with(
            Some(String::new()),
            Some("x".into()),
            environment(&[]),
            false,
            no_prompt,
        );
        assert!(matches!(result, Err(AuthError::MissingCredentials)));
    }

    #[test]
    fn test_prompt_receives_known_values() {
        let env = environment(&[("UNIMIB_USERNAME", "env.user")]);
        let creds = resolve_with(None, None, &env, true, |username, password| {
            assert_eq!(username.as_deref(), Some("env.user"));
            assert!(password.is_none());
            Ok(Credentials {
                username: username.unwrap_or_default(),
                password: "typed".into(),
            })
        })
        .unwrap();
        assert_eq!(creds.password, "typed");
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials {
            username: "m.rossi".into(),
            password: "hunter2".into(),
        };
        let printed = format!("{creds:?}");
        assert!(printed.contains("m.rossi"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_status_message() {
        let status = AuthStatus {
            username_set: true,
            password_set: false,
            dotenv_file_exists: false,
        };
        assert!(!status.has_credentials());
        assert!(status.status_message().contains("UNIMIB_PASSWORD"));
    }
}
