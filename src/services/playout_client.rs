//! Playout Unix-socket client — line-oriented, "END"-terminated protocol,
//! mutex-guarded reconnect-on-error.
//!
//! Grounded on `original_source/core/services/liquidsoap_client.py`. The original
//! is a pair of module-level globals guarded by an `asyncio.Lock`; here that's a
//! `PlayoutClient` struct holding a `tokio::sync::Mutex<Option<UnixStream>>` so
//! it can be constructed once and shared via `Arc` in app state.

use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::Mutex;

const COMMAND_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

pub struct PlayoutClient {
    socket_path: PathBuf,
    conn: Mutex<Option<BufReader<UnixStream>>>,
}

impl PlayoutClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path, conn: Mutex::new(None) }
    }

    /// Sends `cmd` and reads lines until an "END" marker, returning the joined
    /// body. `None` on any connection/IO/timeout failure; the connection is
    /// dropped so the next call reconnects.
    pub async fn send_command(&self, cmd: &str) -> Option<String> {
        let mut guard = self.conn.lock().await;

        if guard.is_none() {
            match UnixStream::connect(&self.socket_path).await {
                Ok(stream) => *guard = Some(BufReader::new(stream)),
                Err(e) => {
                    tracing::warn!(error = %e, socket = %self.socket_path.display(), "playout connect failed");
                    return None;
                }
            }
        }

        let result = Self::run_command(guard.as_mut().unwrap(), cmd).await;
        if result.is_none() {
            *guard = None;
        }
        result
    }

    async fn run_command(stream: &mut BufReader<UnixStream>, cmd: &str) -> Option<String> {
        let write_result = tokio::time::timeout(COMMAND_TIMEOUT, async {
            stream.get_mut().write_all(format!("{cmd}\n").as_bytes()).await?;
            stream.get_mut().flush().await
        })
        .await;
        match write_result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "playout write failed");
                return None;
            }
            Err(_) => {
                tracing::warn!("playout write timed out");
                return None;
            }
        }

        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let read = tokio::time::timeout(COMMAND_TIMEOUT, stream.read_line(&mut line)).await;
            match read {
                Ok(Ok(0)) => return None,
                Ok(Ok(_)) => {
                    let trimmed = line.trim_end();
                    if trimmed == "END" {
                        break;
                    }
                    lines.push(trimmed.to_string());
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "playout read failed");
                    return None;
                }
                Err(_) => {
                    tracing::warn!("playout command timed out");
                    return None;
                }
            }
        }
        Some(lines.join("\n"))
    }

    pub async fn push_break(&self, audio_path: &str) -> bool {
        self.send_command(&format!("breaks.push {audio_path}")).await.is_some()
    }

    pub async fn push_sting(&self, audio_path: &str) -> bool {
        self.send_command(&format!("stings.push {audio_path}")).await.is_some()
    }

    pub async fn reset_counter(&self) -> bool {
        self.send_command("hermes.reset_counter").await.is_some()
    }

    pub async fn get_track_count(&self) -> Option<i64> {
        self.send_command("hermes.track_count").await?.trim().parse().ok()
    }

    pub async fn skip_track(&self) -> bool {
        self.send_command("hermes.skip").await.is_some()
    }

    pub async fn heartbeat(&self) -> bool {
        self.send_command("version").await.is_some()
    }

    pub async fn close(&self) {
        *self.conn.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    /// Spawns a fake playout server on a throwaway socket that echoes back
    /// canned `END`-terminated responses, keyed by command prefix.
    async fn fake_server(path: PathBuf, responses: Vec<(&'static str, Vec<&'static str>)>) {
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { return };
                let responses = responses.clone();
                tokio::spawn(async move {
                    let mut stream = BufReader::new(stream);
                    loop {
                        let mut line = String::new();
                        if stream.read_line(&mut line).await.unwrap_or(0) == 0 {
                            return;
                        }
                        let cmd = line.trim_end();
                        let body = responses
                            .iter()
                            .find(|(prefix, _)| cmd.starts_with(prefix))
                            .map(|(_, lines)| lines.clone())
                            .unwrap_or_default();
                        for l in body {
                            let _ = stream.get_mut().write_all(format!("{l}\n").as_bytes()).await;
                        }
                        let _ = stream.get_mut().write_all(b"END\n").await;
                        let _ = stream.get_mut().flush().await;
                    }
                });
            }
        });
        // Give the listener a moment to be ready to accept.
        tokio::task::yield_now().await;
    }

    fn socket_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("break_studio_test_{name}_{}.sock", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn push_break_sends_command_and_reads_until_end() {
        let path = socket_path("push_break");
        let _ = std::fs::remove_file(&path);
        fake_server(path.clone(), vec![("breaks.push", vec!["OK"])]).await;

        let client = PlayoutClient::new(path);
        assert!(client.push_break("/breaks/brk_1.mp3").await);
    }

    #[tokio::test]
    async fn get_track_count_parses_numeric_body() {
        let path = socket_path("track_count");
        let _ = std::fs::remove_file(&path);
        fake_server(path.clone(), vec![("hermes.track_count", vec!["7"])]).await;

        let client = PlayoutClient::new(path);
        assert_eq!(client.get_track_count().await, Some(7));
    }

    #[tokio::test]
    async fn connect_failure_against_nonexistent_socket_returns_false() {
        let path = std::env::temp_dir().join(format!("break_studio_no_such_socket_{}.sock", uuid::Uuid::new_v4()));
        let client = PlayoutClient::new(path);
        assert!(!client.push_break("/breaks/brk_2.mp3").await);
    }

    #[tokio::test]
    async fn reconnects_after_server_drops_connection() {
        let path = socket_path("reconnect");
        let _ = std::fs::remove_file(&path);
        fake_server(path.clone(), vec![("version", vec![])]).await;

        let client = PlayoutClient::new(path);
        assert!(client.heartbeat().await);
        // A second call reuses the cached connection and still succeeds.
        assert!(client.heartbeat().await);
    }
}
