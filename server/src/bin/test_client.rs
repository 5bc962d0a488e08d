use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use shared::{ClientMessage, GameType, ServerMessage};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;

/// Joins a running buzzer server, buzzes a few times and prints every update.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// WebSocket URL of the server
    #[clap(long, default_value = "ws://127.0.0.1:80/ws")]
    url: String,
    /// Server id printed by the server at startup
    #[clap(long)]
    server_id: String,
    #[clap(long, default_value = "test-client")]
    name: String,
    /// Rejoin as an existing player
    #[clap(long)]
    user_id: Option<i32>,
    /// If set, award the buzz after each attempt
    #[clap(long)]
    admin_token: Option<String>,
    #[clap(long, default_value = "3")]
    rounds: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("Connecting to {}", args.url);
    let (ws, _) = tokio_tungstenite::connect_async(args.url.as_str()).await?;
    let (mut write, mut read) = ws.split();

    let init = ClientMessage::init(&args.server_id, GameType::Buzzer, args.user_id, &args.name);
    write.send(Message::Text(init.to_json()?)).await?;

    // Wait for the join acknowledgement
    let user_id = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => match ServerMessage::parse(&text)? {
                ServerMessage::Connected(connected) => break connected.user_id,
                ServerMessage::Error(error) => {
                    println!("Server rejected us: {}", error.message_text);
                    return Ok(());
                }
                other => println!("Received before Connected: {:?}", other),
            },
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => {
                println!("Server closed the connection");
                return Ok(());
            }
        }
    };
    println!("Connected with user id {}", user_id);

    for round in 0..args.rounds {
        println!("Round {}: buzzing", round + 1);
        write
            .send(Message::Text(ClientMessage::buzz(user_id, true).to_json()?))
            .await?;

        if let Some(admin_token) = &args.admin_token {
            write
                .send(Message::Text(ClientMessage::admin(admin_token, 0).to_json()?))
                .await?;
        }

        // Print whatever arrives for a second
        let deadline = sleep(Duration::from_secs(1));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => print_update(&text),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        println!("Server closed the connection");
                        return Ok(());
                    }
                },
            }
        }
    }

    println!("Sending quit");
    write
        .send(Message::Text(ClientMessage::quit(user_id).to_json()?))
        .await?;

    // The server closes the socket once we are removed
    let _ = timeout(Duration::from_secs(1), async {
        while let Some(Ok(_)) = read.next().await {}
    })
    .await;

    println!("Test client finished");
    Ok(())
}

fn print_update(text: &str) {
    match ServerMessage::parse(text) {
        Ok(ServerMessage::GameStatus(status)) => {
            println!("Game status:");
            for entry in status.status {
                println!(
                    "  {} ({}): active={} buzzing={} locked_out={} score={}",
                    entry.user_info.player_name,
                    entry.user_info.user_id,
                    entry.user_info.active,
                    entry.buzz_status.buzzing,
                    entry.buzz_status.locked_out,
                    entry.buzz_status.score
                );
            }
        }
        Ok(ServerMessage::PlayerStatus(status)) => {
            println!("Own status: {:?}", status.status);
        }
        Ok(other) => println!("Received: {:?}", other),
        Err(e) => println!("Failed to decode message: {}", e),
    }
}
