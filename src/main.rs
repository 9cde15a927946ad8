use clap::Parser;
use helpdesk_chat::{ChatScope, ClientConfig, EventKind, Role, StorageConfig, StreamController};
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

/// Chat with the helpdesk assistant from a terminal.
#[derive(Parser, Debug)]
#[command(name = "helpdesk-chat", version)]
struct Args {
    /// Talk about a specific ticket instead of the global conversation
    #[arg(long)]
    ticket: Option<String>,

    /// Backend base URL
    #[arg(long, env = "HELPDESK_BACKEND_URL")]
    backend_url: Option<String>,

    /// Persist history in this SQLite file
    #[arg(long, env = "HELPDESK_HISTORY_DB")]
    db: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("helpdesk_chat={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Debug, PartialEq, Eq)]
enum Prompt {
    Line(String),
    Quit,
}

/// Wait for the next input line. End of input or `interrupt` resolving
/// both mean quit.
async fn read_prompt<R, F>(lines: &mut Lines<R>, interrupt: F) -> std::io::Result<Prompt>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        line = lines.next_line() => Ok(match line? {
            Some(line) => Prompt::Line(line),
            None => Prompt::Quit,
        }),
        _ = interrupt => Ok(Prompt::Quit),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = ClientConfig::from_env();
    if let Some(url) = args.backend_url {
        config = config.with_base_url(url);
    }
    if let Some(path) = args.db {
        config = config.with_storage(StorageConfig::Sqlite(path));
    }

    let scope = match args.ticket {
        Some(id) => ChatScope::Ticket(id),
        None => ChatScope::Global,
    };
    let mut chat = StreamController::from_config(&config, scope)?;

    for message in chat.messages() {
        let who = match message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        println!("{who}> {}", message.content);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();
    loop {
        print!("you> ");
        stdout.flush()?;
        let Prompt::Line(line) = read_prompt(&mut lines, tokio::signal::ctrl_c()).await? else {
            println!();
            break;
        };
        match line.trim() {
            "/quit" => break,
            "/clear" => {
                chat.clear();
                println!("(conversation cleared)");
                continue;
            }
            _ => {}
        }
        if let Err(e) = chat.start(&line) {
            eprintln!("{e}");
            continue;
        }

        print!("assistant> ");
        stdout.flush()?;
        loop {
            tokio::select! {
                event = chat.next_event() => match event {
                    Some(EventKind::Delta(text)) => {
                        print!("{text}");
                        stdout.flush()?;
                    }
                    Some(EventKind::Complete) => {
                        println!();
                        break;
                    }
                    Some(EventKind::Error(message)) => {
                        println!();
                        eprintln!("error: {message}");
                        break;
                    }
                    Some(EventKind::Tick) => {}
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    chat.stop();
                    println!("\n(stopped after {}s)", chat.elapsed_secs());
                    break;
                }
            }
        }
    }

    Ok(())
}
