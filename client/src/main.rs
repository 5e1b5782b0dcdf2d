//! Thin gateway client
//!
//! Stateless front end for the daemon: build one request from argv, perform
//! one socket exchange, print the result as compact JSON on stdout. All
//! diagnostics go to stderr so stdout stays machine-parseable. Exit codes:
//! 0 success, 1 daemon-reported error, 2 connect or timeout failure.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};

use gateway_common::DaemonClient;

fn default_socket_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".toolgate")
        .join("daemon.sock")
}

#[derive(Parser)]
#[command(name = "toolgate", about = "Query the warm tool-call gateway", version)]
struct Cli {
    /// Daemon socket path
    #[arg(long, global = true, env = "TOOLGATE_SOCKET")]
    socket: Option<PathBuf>,

    /// End-to-end call timeout in seconds
    #[arg(long, global = true, default_value_t = 2.0)]
    timeout: f64,

    /// Project records onto the method's minimal field preset
    #[arg(long, global = true)]
    minimal: bool,

    /// Project records onto the method's default field preset
    #[arg(long, global = true)]
    compact: bool,

    /// Explicit field allowlist, comma separated (overrides presets)
    #[arg(long, global = true)]
    fields: Option<String>,

    /// Truncate string fields to this many characters
    #[arg(long, global = true)]
    max_text_chars: Option<u64>,

    /// Print the full response envelope instead of just the result
    #[arg(long, global = true)]
    raw_response: bool,

    /// Pretty-print the JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Daemon health and resource probes
    Health,
    /// Count of unread inbound messages
    UnreadCount,
    /// List unread inbound messages
    Unread {
        #[arg(long)]
        limit: Option<i64>,
    },
    /// List recent conversations with last-message detail
    Recent {
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Full-text search over message bodies
    Search {
        query: String,
        #[arg(long)]
        limit: Option<i64>,
        /// Only messages at or after this ISO date or date-time
        #[arg(long)]
        since: Option<String>,
    },
    /// Message history for one contact
    Messages {
        contact: String,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// One conversation with unread count and last message
    Thread { conversation_id: i64 },
    /// Mark a contact's inbound messages as read
    MarkRead { contact: String },
    /// Several read-only methods in one round trip
    Bundle {
        /// Sections to include, comma separated (default: unread_count,unread,recent)
        #[arg(long)]
        include: Option<String>,
        #[arg(long)]
        unread_limit: Option<i64>,
        #[arg(long)]
        recent_limit: Option<i64>,
        #[arg(long)]
        search_limit: Option<i64>,
        #[arg(long)]
        messages_limit: Option<i64>,
        /// Search query, when the search section is included
        #[arg(long)]
        query: Option<String>,
        /// Contact, when the messages section is included
        #[arg(long)]
        contact: Option<String>,
        /// Conversation id, when the thread section is included
        #[arg(long)]
        conversation_id: Option<i64>,
    },
}

impl Command {
    fn method(&self) -> &'static str {
        match self {
            Command::Health => "health",
            Command::UnreadCount => "unread_count",
            Command::Unread { .. } => "unread",
            Command::Recent { .. } => "recent",
            Command::Search { .. } => "search",
            Command::Messages { .. } => "messages",
            Command::Thread { .. } => "thread",
            Command::MarkRead { .. } => "mark_read",
            Command::Bundle { .. } => "bundle",
        }
    }

    fn params(&self) -> Map<String, Value> {
        let mut p = Map::new();
        let mut set = |key: &str, value: Value| {
            if !value.is_null() {
                p.insert(key.to_string(), value);
            }
        };
        match self {
            Command::Health | Command::UnreadCount => {}
            Command::Unread { limit } | Command::Recent { limit } => {
                set("limit", json!(limit));
            }
            Command::Search {
                query,
                limit,
                since,
            } => {
                set("query", json!(query));
                set("limit", json!(limit));
                set("since", json!(since));
            }
            Command::Messages { contact, limit } => {
                set("contact", json!(contact));
                set("limit", json!(limit));
            }
            Command::Thread { conversation_id } => {
                set("conversation_id", json!(conversation_id));
            }
            Command::MarkRead { contact } => {
                set("contact", json!(contact));
            }
            Command::Bundle {
                include,
                unread_limit,
                recent_limit,
                search_limit,
                messages_limit,
                query,
                contact,
                conversation_id,
            } => {
                set("include", json!(include));
                set("unread_limit", json!(unread_limit));
                set("recent_limit", json!(recent_limit));
                set("search_limit", json!(search_limit));
                set("messages_limit", json!(messages_limit));
                set("query", json!(query));
                set("contact", json!(contact));
                set("conversation_id", json!(conversation_id));
            }
        }
        p
    }
}

impl Cli {
    /// Method params plus the shared shaping controls, set only when the
    /// flag was given so daemon-side defaults stay in charge.
    fn build_params(&self) -> Value {
        let mut params = self.command.params();
        if self.minimal {
            params.insert("minimal".into(), json!(true));
        }
        if self.compact {
            params.insert("compact".into(), json!(true));
        }
        if let Some(ref fields) = self.fields {
            params.insert("fields".into(), json!(fields));
        }
        if let Some(k) = self.max_text_chars {
            params.insert("max_text_chars".into(), json!(k));
        }
        Value::Object(params)
    }
}

fn print_json(value: &Value, pretty: bool) {
    if pretty {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    } else {
        println!("{}", value);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Tracing is best-effort here; a broken RUST_LOG must not block a call.
    let _ = gateway_common::init_tracing("toolgate");

    let cli = Cli::parse();
    let socket = cli.socket.clone().unwrap_or_else(default_socket_path);
    let client = DaemonClient::new(socket).with_timeout(Duration::from_secs_f64(cli.timeout));

    let params = cli.build_params();
    match client.call(cli.command.method(), params).await {
        Ok(resp) if resp.ok => {
            if cli.raw_response {
                print_json(&json!(resp), cli.pretty);
            } else {
                print_json(&resp.result.unwrap_or_default(), cli.pretty);
            }
            ExitCode::SUCCESS
        }
        Ok(resp) => {
            match resp.error {
                Some(ref err) => eprintln!("error [{}]: {}", err.code, err.message),
                None => eprintln!("error: daemon returned ok=false with no error object"),
            }
            if cli.raw_response {
                print_json(&json!(resp), cli.pretty);
            }
            ExitCode::from(1)
        }
        // Connect, timeout, or transport failure: nothing on stdout.
        Err(e) => {
            eprintln!("error [{}]: {}", e.code(), e);
            ExitCode::from(2)
        }
    }
}
