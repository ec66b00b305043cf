use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use lendflow_client::{
    ChatClient, ClientConfig, ContextStore, ConversationReducer, JsonFileContextStore,
    SessionContext, TransportKind,
};
use lendflow_types::ChatEvent;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransportArg {
    Sse,
    Ws,
}

#[derive(Debug, Parser)]
#[command(name = "lendflow-chat", about = "Terminal client for the Lendflow loan assistant")]
struct Args {
    /// Server base URL
    #[arg(long, env = "LENDFLOW_URL", default_value = "http://127.0.0.1:8000")]
    server: String,

    #[arg(long, value_enum, default_value_t = TransportArg::Sse)]
    transport: TransportArg,

    /// Resume this session instead of the last one
    #[arg(long)]
    session: Option<String>,

    #[arg(long, env = "LENDFLOW_CUSTOMER_ID")]
    customer_id: Option<String>,

    #[arg(long, env = "LENDFLOW_CUSTOMER_NAME")]
    customer_name: Option<String>,

    /// Where the session context is kept between runs
    #[arg(long, default_value = ".lendflow/context.json")]
    context_file: PathBuf,

    /// Do not save messages to the server's session directory
    #[arg(long)]
    no_persist: bool,
}

const HELP: &str = "Commands: /new  /open <id>  /sessions  /doc <label>: <summary>  \
/login <id> [name]  /quit\nCtrl-C stops a streaming reply, or quits at the prompt";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging();

    let store = Arc::new(JsonFileContextStore::new(&args.context_file));
    let mut context = store.load()?.unwrap_or_else(SessionContext::anonymous);
    if let Some(session) = &args.session {
        context.switch_to(session.clone());
    }
    if args.customer_id.is_some() {
        context = context.with_customer(args.customer_id.clone(), args.customer_name.clone());
    }

    let transport = match args.transport {
        TransportArg::Sse => TransportKind::Sse,
        TransportArg::Ws => TransportKind::WebSocket,
    };
    let config = ClientConfig::new(&args.server)
        .with_transport(transport)
        .with_persist(!args.no_persist);

    let session_id = context.session_id.clone();
    let mut client = ChatClient::new(config, context, store)?;
    if let Err(e) = client.open_session(&session_id).await {
        tracing::warn!("Could not load session history: {}", e);
    }

    // Ctrl-C cancels the streaming turn; with nothing in flight it quits
    let canceller = client.canceller();
    let quit = Arc::new(Notify::new());
    let quit_signal = Arc::clone(&quit);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !canceller.cancel() {
                quit_signal.notify_one();
            }
        }
    });

    println!("Lendflow assistant on {} (session {})", args.server, session_id);
    println!("{}", HELP);
    for message in client.reducer().messages() {
        println!("{}: {}", message.role.as_str(), message.content);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt();
    loop {
        let line = tokio::select! {
            _ = quit.notified() => {
                println!();
                break;
            }
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
        };
        let line = line.trim();
        if line.is_empty() {
            prompt();
            continue;
        }

        match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit", _) => break,
            ("/new", _) => {
                let id = client.new_session().await?;
                println!("Started session {}", id);
            }
            ("/open", id) if !id.is_empty() => match client.open_session(id.trim()).await {
                Ok(()) => {
                    for message in client.reducer().messages() {
                        println!("{}: {}", message.role.as_str(), message.content);
                    }
                }
                Err(e) => println!("Error: {}", e),
            },
            ("/sessions", _) => match client.list_sessions().await {
                Ok(sessions) => {
                    for session in sessions {
                        println!(
                            "{}  {}  ({} messages)",
                            session.session_id, session.title, session.message_count
                        );
                    }
                }
                Err(e) => println!("Error: {}", e),
            },
            ("/doc", rest) => match rest.split_once(':') {
                Some((label, summary)) => {
                    client.attach_document(label.trim(), summary.trim());
                    println!("Document attached to your next message");
                }
                None => println!("Usage: /doc <label>: <summary>"),
            },
            ("/login", rest) if !rest.is_empty() => {
                let (id, name) = match rest.split_once(' ') {
                    Some((id, name)) => (id, Some(name.trim().to_string())),
                    None => (rest, None),
                };
                match client.identify(id, name).await {
                    Ok(linked) => println!("Signed in as {} ({} sessions linked)", id, linked),
                    Err(e) => println!("Error: {}", e),
                }
            }
            (command, _) if command.starts_with('/') => println!("{}", HELP),
            _ => {
                if let Err(e) = client.send(line, render).await {
                    println!("Error: {}", e);
                }
                println!();
            }
        }
        prompt();
    }

    client.shutdown().await;
    Ok(())
}

fn render(_state: &ConversationReducer, event: &ChatEvent) {
    let mut out = std::io::stdout();
    let _ = match event {
        ChatEvent::Content { data, .. } => write!(out, "{}", data),
        ChatEvent::ToolStart { tool, agent, .. } => match agent {
            Some(agent) => writeln!(out, "\n  [{}] {} ...", agent, tool),
            None => writeln!(out, "\n  {} ...", tool),
        },
        ChatEvent::ToolComplete { tool, .. } => writeln!(out, "  {} done", tool),
        ChatEvent::AgentDecision { agent, summary, .. } => {
            writeln!(out, "  * {}: {}", agent, summary)
        }
        ChatEvent::SanctionLetter { pdf_url, letter_id, .. } => {
            writeln!(out, "\n  Sanction letter {} available at {}", letter_id, pdf_url)
        }
        ChatEvent::Error { message } => writeln!(out, "Error: {}", message),
        _ => Ok(()),
    };
    let _ = out.flush();
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
