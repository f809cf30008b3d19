//! Command-line parsing
//!
//! ```text
//! authed [--config PATH] login --access TOKEN --refresh TOKEN
//! authed [--config PATH] logout
//! authed [--config PATH] send METHOD PATH [--body JSON]
//! ```

use anyhow::{Context, Result, bail};
use reqwest::Method;

#[derive(Debug, PartialEq)]
pub enum Command {
    Login { access: String, refresh: String },
    Logout,
    Send {
        method: Method,
        path: String,
        body: Option<serde_json::Value>,
    },
}

#[derive(Debug, PartialEq)]
pub struct Args {
    pub config: Option<String>,
    pub command: Command,
}

pub const USAGE: &str = "usage: authed [--config PATH] <login --access TOKEN --refresh TOKEN | logout | send METHOD PATH [--body JSON]>";

/// Value following `flag`, removing both from `args`.
fn take_flag(args: &mut Vec<String>, flag: &str) -> Result<Option<String>> {
    let Some(i) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    if i + 1 >= args.len() {
        bail!("{flag} requires a value");
    }
    let value = args.remove(i + 1);
    args.remove(i);
    Ok(Some(value))
}

/// Parse arguments, excluding the program name.
pub fn parse(mut args: Vec<String>) -> Result<Args> {
    let config = take_flag(&mut args, "--config")?;

    let command = match args.first().map(String::as_str) {
        Some("login") => {
            let access = take_flag(&mut args, "--access")?.context("login requires --access")?;
            let refresh =
                take_flag(&mut args, "--refresh")?.context("login requires --refresh")?;
            if args.len() > 1 {
                bail!("unexpected arguments: {}", args[1..].join(" "));
            }
            Command::Login { access, refresh }
        }
        Some("logout") => {
            if args.len() > 1 {
                bail!("unexpected arguments: {}", args[1..].join(" "));
            }
            Command::Logout
        }
        Some("send") => {
            let body = take_flag(&mut args, "--body")?
                .map(|raw| serde_json::from_str(&raw).context("--body must be valid JSON"))
                .transpose()?;
            let [_, method, path] = args.as_slice() else {
                bail!("send requires METHOD and PATH\n{USAGE}");
            };
            let method = Method::from_bytes(method.to_uppercase().as_bytes())
                .with_context(|| format!("invalid HTTP method: {method}"))?;
            Command::Send {
                method,
                path: path.clone(),
                body,
            }
        }
        Some(other) => bail!("unknown command: {other}\n{USAGE}"),
        None => bail!("{USAGE}"),
    };

    Ok(Args { config, command })
}
