//! Line-oriented test client: every stdin line is sent as a raw JSON event and
//! every server frame is printed as it arrives.
//!
//! ```text
//! cargo run --bin test_client -- ws://127.0.0.1:3000
//! {"event":"createRoom","data":{"username":"alice"}}
//! ```

use futures_util::{SinkExt, StreamExt};
use shared::ClientEvent;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:3000".to_string());

    let (socket, _) = connect_async(url.as_str()).await?;
    println!("Connected to {}", url);
    let (mut write, mut read) = socket.split();

    let printer = tokio::spawn(async move {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => println!("<- {}", text),
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    println!("Connection error: {}", e);
                    break;
                }
            }
        }
        println!("Server closed the connection");
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // Warn locally about frames the server would drop
        if let Err(e) = serde_json::from_str::<ClientEvent>(line) {
            println!("Warning: not a known event ({}), sending anyway", e);
        }
        write.send(Message::Text(line.to_string())).await?;
    }

    write.close().await?;
    printer.await?;
    Ok(())
}
