//! Ensemble readiness probing over the four-letter-word interface

use std::net::SocketAddr;
use std::time::{Duration, Instant};
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Longest a single probe may take
const PROBE_IO_TIMEOUT: Duration = Duration::from_secs(3);

/// Result of the bounded readiness poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Readiness {
    /// The participant reported a quorum role
    Ready { mode: String, elapsed: Duration },
    /// The bound elapsed first
    TimedOut { elapsed: Duration, last_error: Option<String> },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready { .. })
    }
}

/// Send `srvr` once and return the reported mode (`leader`, `follower`, `standalone`)
pub async fn probe_once(addr: SocketAddr) -> Result<String, String> {
    probe_within(addr, PROBE_IO_TIMEOUT).await
}

async fn probe_within(addr: SocketAddr, limit: Duration) -> Result<String, String> {
    let exchange = async {
        let mut stream = TcpStream::connect(addr).await.map_err(|e| e.to_string())?;
        stream.write_all(b"srvr").await.map_err(|e| e.to_string())?;
        let mut reply = String::new();
        stream.read_to_string(&mut reply).await.map_err(|e| e.to_string())?;
        Ok::<_, String>(reply)
    };

    let reply = tokio::time::timeout(limit, exchange)
        .await
        .map_err(|_| "probe timed out".to_string())??;

    parse_mode(&reply).ok_or_else(|| {
        let first = reply.lines().next().unwrap_or("empty reply").trim();
        format!("not serving: {}", first)
    })
}

/// `Mode:` value of a `srvr` reply
pub fn parse_mode(reply: &str) -> Option<String> {
    reply
        .lines()
        .find_map(|line| line.trim().strip_prefix("Mode:"))
        .map(|mode| mode.trim().to_string())
        .filter(|mode| !mode.is_empty())
}

/// Probe every `interval` until a mode is reported or `timeout` elapses.
///
/// A single attempt never runs past the overall bound.
pub async fn wait_until_ready(addr: SocketAddr, interval: Duration, timeout: Duration) -> Readiness {
    let started = Instant::now();
    let mut last_error = None;

    loop {
        let remaining = timeout.saturating_sub(started.elapsed());
        match probe_within(addr, remaining.min(PROBE_IO_TIMEOUT)).await {
            Ok(mode) => {
                let elapsed = started.elapsed();
                info!(%addr, %mode, ?elapsed, "ensemble participant ready");
                return Readiness::Ready { mode, elapsed };
            }
            Err(e) => {
                debug!(%addr, error = %e, "ensemble not ready yet");
                last_error = Some(e);
            }
        }

        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Readiness::TimedOut {
                elapsed: started.elapsed(),
                last_error,
            };
        }
        tokio::time::sleep(interval.min(remaining)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn fake_participant(reply: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                let mut command = [0u8; 4];
                let _ = socket.read_exact(&mut command).await;
                let _ = socket.write_all(reply.as_bytes()).await;
            }
        });
        addr
    }

    #[test]
    fn test_parse_mode() {
        let reply = "Zookeeper version: 3.8.4\nLatency min/avg/max: 0/0.0/0\nZxid: 0x100000000\nMode: follower\nNode count: 5\n";
        assert_eq!(parse_mode(reply).as_deref(), Some("follower"));
        assert_eq!(parse_mode("This ZooKeeper instance is not currently serving requests\n"), None);
    }

    #[tokio::test]
    async fn test_ready_participant() {
        let addr = fake_participant("Zookeeper version: 3.8.4\nMode: leader\n").await;
        let readiness = wait_until_ready(addr, Duration::from_millis(10), Duration::from_secs(2)).await;
        assert!(matches!(readiness, Readiness::Ready { ref mode, .. } if mode == "leader"));
    }

    #[tokio::test]
    async fn test_not_serving_times_out() {
        let addr = fake_participant("This ZooKeeper instance is not currently serving requests\n").await;
        let readiness = wait_until_ready(addr, Duration::from_millis(20), Duration::from_millis(200)).await;

        match readiness {
            Readiness::TimedOut { last_error, .. } => {
                assert!(last_error.unwrap().contains("not currently serving"));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_silent_participant_does_not_overrun_bound() {
        // Accepts connections but never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let started = Instant::now();
        let readiness = wait_until_ready(addr, Duration::from_millis(50), Duration::from_millis(300)).await;

        assert!(!readiness.is_ready());
        assert!(started.elapsed() < PROBE_IO_TIMEOUT, "took {:?}", started.elapsed());
        match readiness {
            Readiness::TimedOut { last_error, .. } => {
                assert_eq!(last_error.as_deref(), Some("probe timed out"));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
