use clap::Parser;
use shared::{BattleNotice, Command, Document, DocumentDecoder, AUTH_SUCCESS, BATTLE_KEY, QUIT};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Line-based client for poking at a running server by hand
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    #[arg(short, long)]
    username: String,

    #[arg(short, long)]
    password: String,
}

fn describe(doc: &Document, me: &str) -> String {
    if let Some(value) = doc.get(BATTLE_KEY) {
        return match BattleNotice::parse(value, me) {
            Ok(BattleNotice::Opponent(other)) => format!("battle started against {}", other),
            Ok(BattleNotice::Wait) => "waiting for opponent".to_string(),
            Ok(BattleNotice::Turn(_)) => "your turn".to_string(),
            Ok(BattleNotice::Attacked { hp, damage, slot }) => {
                format!("slot {} took {} damage, {} HP left", slot, damage, hp)
            }
            Ok(BattleNotice::Victory(winner)) => format!("{} won the battle", winner),
            Err(e) => format!("unreadable battle notice: {}", e),
        };
    }
    if doc.len() == 1 {
        if let Some((key, value)) = doc.iter().next() {
            if value == QUIT {
                return format!("{} left", key);
            }
            if key == me {
                return format!("caught creature {}", value);
            }
        }
    }
    let cells: Vec<String> = doc
        .iter()
        .map(|(cell, value)| {
            if value.is_empty() {
                format!("{}: empty", cell)
            } else {
                format!("{}: {}", cell, value)
            }
        })
        .collect();
    cells.join(", ")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let stream = TcpStream::connect(&args.server).await?;
    println!("Connected to {}", args.server);

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    writer
        .write_all(format!("{}\n{}\n", args.username, args.password).as_bytes())
        .await?;

    let mut status = String::new();
    reader.read_line(&mut status).await?;
    if status.trim() != AUTH_SUCCESS {
        println!("Login failed");
        return Ok(());
    }
    let mut owned = String::new();
    reader.read_line(&mut owned).await?;
    println!("Logged in as {}, owned creatures: [{}]", args.username, owned.trim());
    println!("Commands: row-col | battle-<you>-<id> | battle-<you>-<slot>*attack | battle-<you>-<slot>*switch | surrender-<you>");

    let me = args.username.clone();
    let printer = tokio::spawn(async move {
        let mut decoder = DocumentDecoder::new();
        let mut buffer = [0u8; 4096];
        loop {
            let n = match reader.read(&mut buffer).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            decoder.push(&buffer[..n]);
            match decoder.drain_documents() {
                Ok(docs) => {
                    for doc in docs {
                        println!("< {}", describe(&doc, &me));
                    }
                }
                Err(e) => eprintln!("Dropped malformed data: {}", e),
            }
        }
        println!("Server closed the connection");
    });

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = stdin.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(e) = line.parse::<Command>() {
            eprintln!("Not a command ({}), sending anyway", e);
        }
        if writer.write_all(format!("{}\n", line).as_bytes()).await.is_err() {
            break;
        }
        if printer.is_finished() {
            break;
        }
    }

    Ok(())
}
