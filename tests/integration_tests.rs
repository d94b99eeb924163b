//! Integration tests for the creature world server
//!
//! These tests run a real server on a loopback port and drive it through
//! plain TCP clients, checking the exact documents each player receives.

use server::config::{GameConfig, ServerConfig};
use server::game::GameState;
use server::network::Server;
use server::store::{AccountStore, Catalog};
use shared::{Document, DocumentDecoder, BATTLE_KEY};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

const CATALOG: &str = r#"[
  {"id": "1", "name": "Bulbasaur", "types": ["Grass", "Poison"],
   "stats": {"HP": "45", "Attack": "1", "Defense": "5", "Speed": "45"}, "exp": "64"},
  {"id": "4", "name": "Charmander", "types": ["Fire"],
   "stats": {"HP": "39", "Attack": "1", "Defense": "5", "Speed": "65"}, "exp": "62"},
  {"id": "25", "name": "Pikachu", "types": ["Electric"],
   "stats": {"HP": "35", "Attack": "1", "Defense": "5", "Speed": "90"}, "exp": "112"}
]"#;

fn accounts_json() -> String {
    let catalog: serde_json::Value = serde_json::from_str(CATALOG).unwrap();
    serde_json::json!([
        {"username": "ash", "password": "pika", "pokeBalls": catalog.clone()},
        {"username": "gary", "password": "eevee", "pokeBalls": catalog},
        {"username": "misty", "password": "togepi", "pokeBalls": []}
    ])
    .to_string()
}

const WAIT: Duration = Duration::from_secs(5);

/// Starts a server on an ephemeral port with timers far in the future.
async fn start_server(dir: &TempDir, rows: usize, cols: usize, spawn_batch: usize) -> SocketAddr {
    let catalog_path = dir.path().join("pokedex.json");
    let accounts_path = dir.path().join("players.json");
    std::fs::write(&catalog_path, CATALOG).unwrap();
    std::fs::write(&accounts_path, accounts_json()).unwrap();

    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        catalog_path,
        accounts_path,
        game: GameConfig {
            rows,
            cols,
            spawn_batch,
            seed: Some(42),
            ..GameConfig::default()
        },
        spawn_interval: Duration::from_secs(3600),
        despawn_interval: Duration::from_secs(3600),
    };

    let catalog = Catalog::load(&config.catalog_path).unwrap();
    let accounts = AccountStore::load(&config.accounts_path).unwrap();
    let game = GameState::new(&config.game, catalog, accounts);
    let mut server = Server::bind(&config, game).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move { server.run().await });
    addr
}

struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    decoder: DocumentDecoder,
}

impl TestClient {
    async fn connect(addr: SocketAddr, username: &str, password: &str) -> (Self, String) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer
            .write_all(format!("{}\n{}\n", username, password).as_bytes())
            .await
            .unwrap();
        let mut client = Self {
            reader: BufReader::new(reader),
            writer,
            decoder: DocumentDecoder::new(),
        };
        let status = client.line().await;
        (client, status)
    }

    /// Logs in and returns the owned creature list.
    async fn login(addr: SocketAddr, username: &str, password: &str) -> (Self, String) {
        let (mut client, status) = Self::connect(addr, username, password).await;
        assert_eq!(status, "successful");
        let owned = client.line().await;
        (client, owned)
    }

    async fn line(&mut self) -> String {
        let mut line = String::new();
        timeout(WAIT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a line")
            .unwrap();
        line.trim_end().to_string()
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .unwrap();
    }

    async fn next_doc(&mut self) -> Document {
        let mut buffer = [0u8; 1024];
        loop {
            if let Some(doc) = self.decoder.next_document().unwrap() {
                return doc;
            }
            let n = timeout(WAIT, self.reader.read(&mut buffer))
                .await
                .expect("timed out waiting for a document")
                .unwrap();
            assert!(n > 0, "server closed the connection");
            self.decoder.push(&buffer[..n]);
        }
    }

    /// Skips grid updates until the next battle notice.
    async fn battle_notice(&mut self) -> String {
        loop {
            let doc = self.next_doc().await;
            if let Some(value) = doc.get(BATTLE_KEY) {
                return value.clone();
            }
        }
    }

    async fn closed(&mut self) -> bool {
        let mut buffer = [0u8; 64];
        matches!(
            timeout(WAIT, self.reader.read(&mut buffer)).await,
            Ok(Ok(0)) | Ok(Err(_))
        )
    }
}

fn single(doc: &Document) -> (&str, &str) {
    assert_eq!(doc.len(), 1, "expected a single entry: {:?}", doc);
    let (key, value) = doc.iter().next().unwrap();
    (key.as_str(), value.as_str())
}

fn doc(entries: &[(&str, &str)]) -> Document {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// AUTHENTICATION TESTS
mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn wrong_password_is_refused_and_closed() {
        let dir = TempDir::new().unwrap();
        let addr = start_server(&dir, 3, 3, 0).await;

        let (mut client, status) = TestClient::connect(addr, "ash", "charizard").await;
        assert_eq!(status, "failed");
        assert!(client.closed().await);
    }

    #[tokio::test]
    async fn duplicate_login_is_refused() {
        let dir = TempDir::new().unwrap();
        let addr = start_server(&dir, 3, 3, 0).await;

        let (mut first, owned) = TestClient::login(addr, "ash", "pika").await;
        assert_eq!(owned, "1-4-25");
        let (_, status) = TestClient::connect(addr, "ash", "pika").await;
        assert_eq!(status, "failed");

        // the first session is untouched
        assert_eq!(first.next_doc().await, Document::new());
        let players = first.next_doc().await;
        assert_eq!(players.values().collect::<Vec<_>>(), vec!["ash"]);
    }

    #[tokio::test]
    async fn login_sequence_and_join_broadcast() {
        let dir = TempDir::new().unwrap();
        let addr = start_server(&dir, 3, 3, 2).await;

        let (mut misty, owned) = TestClient::login(addr, "misty", "togepi").await;
        assert_eq!(owned, "");
        let creatures = misty.next_doc().await;
        assert_eq!(creatures.len(), 2);
        let players = misty.next_doc().await;
        let (misty_cell, name) = single(&players);
        assert_eq!(name, "misty");
        assert!(!creatures.contains_key(misty_cell));

        let (_ash, _) = TestClient::login(addr, "ash", "pika").await;
        let players = misty.next_doc().await;
        assert_eq!(players.len(), 2);
        assert_eq!(players.get(misty_cell).map(String::as_str), Some("misty"));
    }
}

/// WORLD TESTS
mod world_tests {
    use super::*;

    #[tokio::test]
    async fn catch_is_persisted_and_broadcast() {
        let dir = TempDir::new().unwrap();
        // one creature and one free cell
        let addr = start_server(&dir, 1, 2, 1).await;

        let (mut misty, _) = TestClient::login(addr, "misty", "togepi").await;
        let creatures = misty.next_doc().await;
        let (creature_cell, creature_id) = single(&creatures);
        let (creature_cell, creature_id) = (creature_cell.to_string(), creature_id.to_string());
        misty.next_doc().await;

        misty.send(&creature_cell).await;
        assert_eq!(misty.next_doc().await, doc(&[("misty", creature_id.as_str())]));
        assert_eq!(misty.next_doc().await, doc(&[(creature_cell.as_str(), "misty")]));

        let saved: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("players.json")).unwrap()).unwrap();
        let misty_entry = saved
            .as_array()
            .unwrap()
            .iter()
            .find(|a| a["username"] == "misty")
            .unwrap();
        assert_eq!(misty_entry["creatures"][0]["id"], creature_id.as_str());

        // a fresh login sees the catch
        drop(misty);
        let reloaded = AccountStore::load(dir.path().join("players.json")).unwrap();
        assert_eq!(reloaded.get("misty").unwrap().creature_list(), creature_id);
    }

    #[tokio::test]
    async fn out_of_bounds_move_is_ignored() {
        let dir = TempDir::new().unwrap();
        let addr = start_server(&dir, 2, 2, 0).await;

        let (mut ash, _) = TestClient::login(addr, "ash", "pika").await;
        ash.next_doc().await;
        let before = ash.next_doc().await;

        ash.send("7-7").await;
        ash.send("garbage").await;
        let (cell, _) = single(&before);
        let target = if cell == "0-0" { "1-1" } else { "0-0" };
        ash.send(target).await;

        // only the valid move produced a broadcast
        assert_eq!(ash.next_doc().await, doc(&[(target, "ash")]));
    }

    #[tokio::test]
    async fn disconnect_broadcasts_quit() {
        let dir = TempDir::new().unwrap();
        let addr = start_server(&dir, 3, 3, 0).await;

        let (mut ash, _) = TestClient::login(addr, "ash", "pika").await;
        ash.next_doc().await;
        ash.next_doc().await;
        let (gary, _) = TestClient::login(addr, "gary", "eevee").await;
        assert_eq!(ash.next_doc().await.len(), 2);

        drop(gary);
        assert_eq!(ash.next_doc().await, doc(&[("gary", "quit")]));

        // the identity is free again
        let (_gary, owned) = TestClient::login(addr, "gary", "eevee").await;
        assert_eq!(owned, "1-4-25");
    }
}

/// BATTLE TESTS
mod battle_tests {
    use super::*;

    /// Two players on a 1x2 board, so each is the other's only neighbour.
    async fn face_off(dir: &TempDir) -> (TestClient, TestClient) {
        let addr = start_server(dir, 1, 2, 0).await;

        let (mut ash, _) = TestClient::login(addr, "ash", "pika").await;
        ash.next_doc().await;
        ash.next_doc().await;
        let (mut gary, _) = TestClient::login(addr, "gary", "eevee").await;
        gary.next_doc().await;
        let players = gary.next_doc().await;
        ash.next_doc().await;

        let gary_cell = players
            .iter()
            .find(|(_, name)| name.as_str() == "gary")
            .map(|(cell, _)| cell.clone())
            .unwrap();
        ash.send(&gary_cell).await;
        assert_eq!(ash.battle_notice().await, "gary");
        assert_eq!(gary.battle_notice().await, "ash");
        (ash, gary)
    }

    #[tokio::test]
    async fn full_battle_until_surrender() {
        let dir = TempDir::new().unwrap();
        let (mut ash, mut gary) = face_off(&dir).await;

        for id in ["1", "4", "25"] {
            gary.send(&format!("battle-gary-{}", id)).await;
        }
        for id in ["4", "1", "25"] {
            ash.send(&format!("battle-ash-{}", id)).await;
        }
        // ash leads with speed 65 against 45
        assert_eq!(ash.battle_notice().await, "ash");
        assert_eq!(gary.battle_notice().await, "wait");

        ash.send("battle-ash-0*attack").await;
        assert_eq!(gary.battle_notice().await, "attacked-0-45-0");
        assert_eq!(gary.battle_notice().await, "gary");
        assert_eq!(ash.battle_notice().await, "wait");

        gary.send("battle-gary-0*attack").await;
        // 1 * 50 - 5 = 45 against Charmander's 39 HP
        assert_eq!(ash.battle_notice().await, "attacked-0-45-0");
        assert_eq!(ash.battle_notice().await, "ash");
        assert_eq!(gary.battle_notice().await, "wait");

        ash.send("surrender-ash").await;
        assert_eq!(ash.battle_notice().await, "victory_gary");
        assert_eq!(gary.battle_notice().await, "victory_gary");
    }

    #[tokio::test]
    async fn knocking_out_every_creature_wins() {
        let dir = TempDir::new().unwrap();
        let (mut ash, mut gary) = face_off(&dir).await;

        for id in ["25", "4", "1"] {
            ash.send(&format!("battle-ash-{}", id)).await;
            gary.send(&format!("battle-gary-{}", id)).await;
        }
        // speed tie goes to the initiator
        assert_eq!(ash.battle_notice().await, "ash");
        assert_eq!(gary.battle_notice().await, "wait");

        // every hit is a knockout, so the side moving first wins
        for round in 0..3 {
            ash.send("battle-ash-0*attack").await;
            assert_eq!(gary.battle_notice().await, "attacked-0-45-0");
            if round == 2 {
                break;
            }
            assert_eq!(gary.battle_notice().await, "gary");
            assert_eq!(ash.battle_notice().await, "wait");

            gary.send("battle-gary-0*attack").await;
            assert_eq!(ash.battle_notice().await, "attacked-0-45-0");
            assert_eq!(ash.battle_notice().await, "ash");
            assert_eq!(gary.battle_notice().await, "wait");
        }
        assert_eq!(gary.battle_notice().await, "victory_ash");
        assert_eq!(ash.battle_notice().await, "victory_ash");
    }

    #[tokio::test]
    async fn disconnect_mid_battle_forfeits() {
        let dir = TempDir::new().unwrap();
        let (ash, mut gary) = face_off(&dir).await;

        drop(ash);
        assert_eq!(gary.battle_notice().await, "victory_gary");
        assert_eq!(gary.next_doc().await, doc(&[("ash", "quit")]));
    }
}

/// WIRE FORMAT TESTS
mod wire_tests {
    use super::*;

    #[test]
    fn decoder_handles_arbitrary_chunking() {
        let stream = r#"{"0-1":"25"}{"battle":"wait"}{"ash":"quit"}"#.as_bytes();
        for chunk in 1..stream.len() {
            let mut decoder = DocumentDecoder::new();
            let mut docs = Vec::new();
            for piece in stream.chunks(chunk) {
                decoder.push(piece);
                docs.extend(decoder.drain_documents().unwrap());
            }
            assert_eq!(docs.len(), 3, "chunk size {}", chunk);
            assert_eq!(docs[2], doc(&[("ash", "quit")]));
            assert_eq!(decoder.buffered(), 0);
        }
    }

    #[test]
    fn sample_files_parse() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pokedex.json");
        std::fs::write(&path, CATALOG).unwrap();
        let catalog = Catalog::load(Path::new(&path)).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get("25").unwrap().stat("Speed"), Some(90));
    }
}
