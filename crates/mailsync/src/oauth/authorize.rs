//! Initial OAuth2 authorization-code flow
//!
//! Runs the interactive consent flow for a new mailbox: a local HTTP server
//! receives the callback, the code is exchanged for tokens, the mailbox
//! identity is resolved from the provider profile, and a fresh active
//! connection is persisted. Uses synchronous HTTP to be executor-agnostic.

use anyhow::{Context, Result};
use chrono::Utc;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;

use super::OAuthApi;
use crate::gmail::MailProvider;
use crate::models::Connection;
use crate::storage::ConnectionStore;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Scope granting read + label changes, needed to mark messages read
const GMAIL_MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

/// Port range to try for the local OAuth callback server
const PORT_RANGE_START: u16 = 8080;
const PORT_RANGE_END: u16 = 8090;

/// Run the authorization-code flow and persist a new active connection.
///
/// Opens the user's browser for consent; blocks until the callback arrives.
pub fn connect_account(
    client_id: &str,
    oauth: &dyn OAuthApi,
    provider: &dyn MailProvider,
    connections: &dyn ConnectionStore,
    user_id: &str,
) -> Result<Connection> {
    // Step 1: Start local server to receive callback
    let (listener, port) = start_local_server()?;
    let redirect_uri = format!("http://localhost:{}", port);

    // Step 2: Build authorization URL
    let auth_url = format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
        AUTH_URL,
        urlencoding::encode(client_id),
        urlencoding::encode(&redirect_uri),
        urlencoding::encode(GMAIL_MODIFY_SCOPE),
    );

    println!("\n=== Gmail Authorization Required ===");
    println!("Opening browser for authorization...");
    println!("If the browser doesn't open, visit: {}", auth_url);

    if let Err(e) = open::that(&auth_url) {
        eprintln!("Failed to open browser: {}. Please open the URL manually.", e);
    }

    // Step 3: Wait for callback with authorization code
    println!("Waiting for authorization...");
    let code = wait_for_callback(listener)?;

    // Step 4: Exchange code for tokens
    println!("Exchanging authorization code for tokens...");
    let token = oauth.exchange_code(&code, &redirect_uri)?;
    let expires_at = token.expiry(Utc::now());

    // Step 5: Resolve the mailbox identity behind the grant
    let profile = provider
        .get_profile(&token.access_token)
        .context("Failed to resolve mailbox identity")?;

    let connection = connections.insert_connection(
        Connection::new(user_id, profile.email_address).with_tokens(
            token.access_token,
            token.refresh_token,
            expires_at,
        ),
    )?;

    log::info!(
        "Connected mailbox {} for user {} (connection {})",
        connection.mailbox,
        user_id,
        connection.id
    );
    println!("Authorization successful!\n");
    Ok(connection)
}

/// Start a local TCP server on an available port
fn start_local_server() -> Result<(TcpListener, u16)> {
    for port in PORT_RANGE_START..=PORT_RANGE_END {
        if let Ok(listener) = TcpListener::bind(format!("127.0.0.1:{}", port)) {
            return Ok((listener, port));
        }
    }
    anyhow::bail!(
        "Could not bind to any port in range {}-{}",
        PORT_RANGE_START,
        PORT_RANGE_END
    )
}

/// Wait for the OAuth callback and extract the authorization code
fn wait_for_callback(listener: TcpListener) -> Result<String> {
    let (mut stream, _) = listener.accept().context("Failed to accept connection")?;

    let mut reader = BufReader::new(&stream);
    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .context("Failed to read request")?;

    // Format: GET /?code=AUTH_CODE&scope=... HTTP/1.1
    let code = query_param(&request_line, "code");
    let error = query_param(&request_line, "error");

    // Send response to browser
    let (status, body) = if code.is_some() {
        ("200 OK", "Authorization successful! You can close this window.")
    } else {
        ("400 Bad Request", "Authorization failed. Please try again.")
    };

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n<html><body><h1>{}</h1></body></html>",
        status, body
    );
    stream.write_all(response.as_bytes()).ok();

    if let Some(err) = error {
        anyhow::bail!("OAuth error: {}", err);
    }

    code.context("No authorization code received")
}

/// Extract one query parameter from an HTTP request line
fn query_param(request_line: &str, name: &str) -> Option<String> {
    request_line
        .split_whitespace()
        .nth(1) // Get the path
        .and_then(|path| {
            path.split('?').nth(1).and_then(|query| {
                query.split('&').find_map(|param| {
                    let mut parts = param.split('=');
                    if parts.next() == Some(name) {
                        parts.next().map(|s| s.to_string())
                    } else {
                        None
                    }
                })
            })
        })
}
