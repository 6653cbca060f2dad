use anyhow::Result;
use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tracing::info;

use flowdesk::chat::{ClientMessage, EventRouter, MessageRole, RouterNotice, UserTurn};
use flowdesk::config::FlowdeskConfig;
use flowdesk::transport::{SocketClient, SocketConfig, SocketEvent};

#[derive(Parser)]
#[command(name = "flowdesk", about = "Headless chat client for the project assistant.")]
struct Cli {
    /// WebSocket URL (defaults to the configured endpoint)
    #[arg(short, long)]
    url: Option<String>,

    /// Route turns through the planner
    #[arg(long)]
    planner: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("flowdesk=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = FlowdeskConfig::load();
    let url = cli.url.or_else(|| config.ws_url()).ok_or_else(|| {
        anyhow::anyhow!("no WebSocket URL configured; set FLOWDESK_WS_URL or api_url")
    })?;

    info!("connecting to {url}");
    let (client, mut events) = SocketClient::connect(SocketConfig::new(url));
    let mut router = EventRouter::new();

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SocketEvent::Opened) => println!("· connected"),
                Some(SocketEvent::Closed) => println!("· disconnected"),
                Some(SocketEvent::Event(event)) => {
                    let before = router.messages().len();
                    if let Some(RouterNotice::ArtifactGenerated { kind, .. }) = router.apply(event) {
                        println!("· generated a {} — review and save it in the app", kind.as_str());
                    }
                    for msg in &router.messages()[before..] {
                        let tag = match msg.role {
                            MessageRole::User => "you",
                            MessageRole::Assistant => "assistant",
                            MessageRole::Thought => "thinking",
                            MessageRole::Tool => "tool",
                            MessageRole::Action => "action",
                            MessageRole::Result => "result",
                        };
                        println!("[{tag}] {}", msg.content);
                    }
                }
                None => break,
            },
            line = lines.next_line() => match line? {
                Some(line) if !line.trim().is_empty() => {
                    let text = line.trim().to_string();
                    let message_id = router.push_user_message(&text);
                    let sent = client.send(&ClientMessage::Turn(UserTurn {
                        message: text,
                        conversation_id: router.conversation_id().map(Into::into),
                        planner: cli.planner.then_some(true),
                        message_id: Some(message_id.clone()),
                    }));
                    if !sent {
                        router.mark_send_failed(&message_id);
                        println!("· not connected; message not sent");
                    }
                }
                Some(_) => {}
                None => break,
            },
        }
    }

    client.disconnect();
    Ok(())
}
