//! A scripted IMAP server for end-to-end tests.
//!
//! Speaks just enough IMAP4rev1 to drive the watcher and the release
//! engine over a real TCP connection: greeting, LOGIN, CREATE, SELECT,
//! UID SEARCH/FETCH/STORE/COPY/MOVE, EXPUNGE, APPEND with literal
//! continuation, NOOP, IDLE/DONE, LOGOUT. Every received command line is
//! recorded for assertions.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Server behavior script.
#[derive(Debug, Clone)]
pub struct ServerScript {
    /// Capability string advertised in the greeting.
    pub capabilities: String,
    /// UIDVALIDITY reported on SELECT.
    pub uidvalidity: u32,
    /// UIDNEXT reported on SELECT.
    pub uidnext: u32,
    /// EXISTS count reported on SELECT.
    pub exists: u32,
    /// Successive UID SEARCH answers; the last entry repeats forever.
    pub search_results: Vec<Vec<u32>>,
    /// Raw message bytes per UID for UID FETCH.
    pub messages: HashMap<u32, Vec<u8>>,
    /// Reject LOGIN with NO.
    pub fail_login: bool,
    /// Reject APPEND with NO after the continuation.
    pub fail_append: bool,
}

impl Default for ServerScript {
    fn default() -> Self {
        Self {
            capabilities: "IMAP4rev1 IDLE MOVE UIDPLUS".to_string(),
            uidvalidity: 1111,
            uidnext: 1,
            exists: 0,
            search_results: vec![Vec::new()],
            messages: HashMap::new(),
            fail_login: false,
            fail_append: false,
        }
    }
}

/// Handle to a running scripted server.
pub struct ScriptedServer {
    /// Address to connect to.
    pub addr: SocketAddr,
    /// Every command line received, across all connections.
    pub commands: Arc<Mutex<Vec<String>>>,
    /// Raw literals received via APPEND.
    pub appended: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl ScriptedServer {
    /// Starts the server. It accepts any number of sequential connections
    /// and serves each from the same script.
    pub async fn spawn(script: ServerScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let commands = Arc::new(Mutex::new(Vec::new()));
        let appended = Arc::new(Mutex::new(Vec::new()));

        let state = ConnState {
            script,
            commands: Arc::clone(&commands),
            appended: Arc::clone(&appended),
            search_calls: Arc::new(Mutex::new(0)),
        };

        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let state = state.clone();
                tokio::spawn(async move {
                    let _ = serve(socket, state).await;
                });
            }
        });

        Self {
            addr,
            commands,
            appended,
        }
    }

    /// Command lines containing the given fragment.
    pub fn commands_containing(&self, fragment: &str) -> Vec<String> {
        self.commands
            .lock()
            .expect("commands lock")
            .iter()
            .filter(|c| c.contains(fragment))
            .cloned()
            .collect()
    }
}

#[derive(Clone)]
struct ConnState {
    script: ServerScript,
    commands: Arc<Mutex<Vec<String>>>,
    appended: Arc<Mutex<Vec<Vec<u8>>>>,
    search_calls: Arc<Mutex<usize>>,
}

async fn serve(socket: TcpStream, state: ConnState) -> std::io::Result<()> {
    let mut reader = BufReader::new(socket);

    let greeting = format!("* OK [CAPABILITY {}] scripted ready\r\n", state.script.capabilities);
    reader.get_mut().write_all(greeting.as_bytes()).await?;

    loop {
        let line = read_line(&mut reader).await?;
        if line.is_empty() {
            return Ok(());
        }
        state
            .commands
            .lock()
            .expect("commands lock")
            .push(line.clone());

        let mut parts = line.splitn(2, ' ');
        let tag = parts.next().unwrap_or_default().to_string();
        let rest = parts.next().unwrap_or_default().to_string();
        let upper = rest.to_uppercase();

        let out: String = if upper.starts_with("LOGIN") {
            if state.script.fail_login {
                format!("{tag} NO [AUTHENTICATIONFAILED] invalid credentials\r\n")
            } else {
                format!("{tag} OK LOGIN completed\r\n")
            }
        } else if upper.starts_with("CAPABILITY") {
            format!(
                "* CAPABILITY {}\r\n{tag} OK CAPABILITY completed\r\n",
                state.script.capabilities
            )
        } else if upper.starts_with("CREATE") {
            format!("{tag} NO Mailbox already exists\r\n")
        } else if upper.starts_with("SELECT") {
            format!(
                "* {} EXISTS\r\n* 0 RECENT\r\n\
                 * OK [UIDVALIDITY {}] UIDs valid\r\n\
                 * OK [UIDNEXT {}] predicted next\r\n\
                 {tag} OK [READ-WRITE] SELECT completed\r\n",
                state.script.exists, state.script.uidvalidity, state.script.uidnext
            )
        } else if upper.starts_with("UID SEARCH") {
            let results = {
                let mut calls = state.search_calls.lock().expect("calls lock");
                let idx = (*calls).min(state.script.search_results.len().saturating_sub(1));
                *calls += 1;
                state
                    .script
                    .search_results
                    .get(idx)
                    .cloned()
                    .unwrap_or_default()
            };
            let list = results
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            if list.is_empty() {
                format!("* SEARCH\r\n{tag} OK SEARCH completed\r\n")
            } else {
                format!("* SEARCH {list}\r\n{tag} OK SEARCH completed\r\n")
            }
        } else if upper.starts_with("UID FETCH") {
            let uid: u32 = rest
                .split_whitespace()
                .nth(2)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            state.script.messages.get(&uid).map_or_else(
                || format!("{tag} OK FETCH completed\r\n"),
                |raw| {
                    let mut out = format!(
                        "* 1 FETCH (UID {uid} INTERNALDATE \"06-Aug-2026 10:00:00 +0000\" BODY[] {{{}}}\r\n",
                        raw.len()
                    );
                    out.push_str(&String::from_utf8_lossy(raw));
                    out.push_str(")\r\n");
                    out.push_str(&format!("{tag} OK FETCH completed\r\n"));
                    out
                },
            )
        } else if upper.starts_with("UID MOVE") {
            format!("{tag} OK MOVE completed\r\n")
        } else if upper.starts_with("UID COPY") {
            format!("{tag} OK COPY completed\r\n")
        } else if upper.starts_with("UID STORE") {
            format!("{tag} OK STORE completed\r\n")
        } else if upper.starts_with("EXPUNGE") {
            format!("* 1 EXPUNGE\r\n{tag} OK EXPUNGE completed\r\n")
        } else if upper.starts_with("NOOP") {
            format!("{tag} OK NOOP completed\r\n")
        } else if upper.starts_with("APPEND") {
            // literal size from the trailing {n}
            let size: usize = rest
                .rfind('{')
                .and_then(|open| {
                    rest[open + 1..]
                        .trim_end()
                        .trim_end_matches('}')
                        .parse()
                        .ok()
                })
                .unwrap_or(0);
            reader
                .get_mut()
                .write_all(b"+ Ready for literal data\r\n")
                .await?;

            let mut literal = vec![0u8; size];
            reader.read_exact(&mut literal).await?;
            let _ = read_line(&mut reader).await?; // trailing CRLF
            state
                .appended
                .lock()
                .expect("appended lock")
                .push(literal);

            if state.script.fail_append {
                format!("{tag} NO APPEND refused\r\n")
            } else {
                format!("{tag} OK [APPENDUID {} 9999] APPEND completed\r\n", state.script.uidvalidity)
            }
        } else if upper.starts_with("IDLE") {
            reader.get_mut().write_all(b"+ idling\r\n").await?;
            // block until DONE
            loop {
                let inner = read_line(&mut reader).await?;
                if inner.to_uppercase().starts_with("DONE") {
                    break;
                }
                if inner.is_empty() {
                    return Ok(());
                }
            }
            format!("{tag} OK IDLE terminated\r\n")
        } else if upper.starts_with("LOGOUT") {
            let out = format!("* BYE logging out\r\n{tag} OK LOGOUT completed\r\n");
            reader.get_mut().write_all(out.as_bytes()).await?;
            return Ok(());
        } else if upper.starts_with("CLOSE") {
            format!("{tag} OK CLOSE completed\r\n")
        } else {
            format!("{tag} BAD unknown command\r\n")
        };

        reader.get_mut().write_all(out.as_bytes()).await?;
    }
}

async fn read_line<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> std::io::Result<String> {
    let mut line = Vec::new();
    loop {
        let byte = match reader.read_u8().await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(String::from_utf8_lossy(&line).trim_end().to_string());
            }
            Err(e) => return Err(e),
        };
        if byte == b'\n' {
            return Ok(String::from_utf8_lossy(&line).trim_end().to_string());
        }
        line.push(byte);
    }
}
