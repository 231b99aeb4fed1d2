use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use shared::{ClientMessage, ServerMessage};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug)]
#[command(author, version, about = "Scripted client for poking a running server")]
struct Args {
    /// Server websocket URL
    #[arg(short, long, default_value = "ws://127.0.0.1:8080")]
    url: String,

    #[arg(long, default_value = "tester")]
    username: String,

    #[arg(long, default_value = "secret")]
    password: String,

    /// Create the account instead of logging in
    #[arg(long)]
    signup: bool,

    /// Number of steps to walk
    #[arg(long, default_value = "10")]
    steps: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (ws_stream, _) = connect_async(args.url.as_str()).await?;
    println!("Connected to {}", args.url);
    let (mut write, mut read) = ws_stream.split();

    let hello = if args.signup {
        ClientMessage::Signup {
            username: args.username.clone(),
            password: args.password.clone(),
        }
    } else {
        ClientMessage::Login {
            username: args.username.clone(),
            password: args.password.clone(),
        }
    };
    write
        .send(Message::Text(serde_json::to_string(&hello)?))
        .await?;

    // Print everything the server sends until we go away
    let reader = tokio::spawn(async move {
        while let Some(Ok(frame)) = read.next().await {
            match frame {
                Message::Text(text) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(ServerMessage::LoginSuccess { player, players, map })
                    | Ok(ServerMessage::SignupSuccess { player, players, map }) => {
                        println!(
                            "Logged in as {} (id {}) at ({}, {}) on {}, {} online",
                            player.username,
                            player.id,
                            player.pos_x,
                            player.pos_y,
                            map.id,
                            players.len()
                        );
                    }
                    Ok(message) => println!("Received: {:?}", message),
                    Err(e) => println!("Unreadable message {:?}: {}", text, e),
                },
                Message::Close(_) => {
                    println!("Server closed the connection");
                    break;
                }
                _ => {}
            }
        }
    });

    sleep(Duration::from_millis(200)).await;

    for i in 0..args.steps {
        // Walk a square so the client stays near spawn
        let (dx, dy) = match (i / 3) % 4 {
            0 => (1, 0),
            1 => (0, 1),
            2 => (-1, 0),
            _ => (0, -1),
        };
        let step = ClientMessage::Move { dx, dy };
        write
            .send(Message::Text(serde_json::to_string(&step)?))
            .await?;
        sleep(Duration::from_millis(250)).await;
    }

    let chat = ClientMessage::Chat {
        text: "hello from the test client".to_string(),
    };
    write
        .send(Message::Text(serde_json::to_string(&chat)?))
        .await?;
    sleep(Duration::from_millis(500)).await;

    write.send(Message::Close(None)).await?;
    let _ = timeout(Duration::from_secs(2), reader).await;
    println!("Test client finished");

    Ok(())
}
