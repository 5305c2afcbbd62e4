//! ICMP echo probes.
//!
//! `SystemPing` drives the system `ping` binary rather than opening a raw
//! socket itself, so the usual setuid/capability arrangement of the host
//! applies.

use std::collections::BTreeMap;
use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Payloads smaller than this carry no timestamp, so replies come back
/// without a round-trip time.
const MIN_TIMED_PAYLOAD: u16 = 16;

#[derive(Debug, Error)]
pub enum ProbeError {
    /// The process may not send ICMP. Fatal: nothing changes between
    /// cycles.
    #[error("not permitted to send ICMP echo requests: {0}")]
    PermissionDenied(String),
    /// No `ping` binary to run.
    #[error("probe tool unavailable: {0}")]
    Unavailable(String),
    #[error("probe failed: {0}")]
    Failed(String),
}

impl ProbeError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, ProbeError::PermissionDenied(_))
    }
}

/// What happened to one echo request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PacketOutcome {
    /// A reply arrived; the RTT is missing when the payload was too small
    /// to carry a timestamp.
    Replied { rtt_ms: Option<f64> },
    Lost,
}

impl PacketOutcome {
    pub fn replied(&self) -> bool {
        matches!(self, PacketOutcome::Replied { .. })
    }
}

/// Outcomes of one batch of echo requests, in send order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeBatch {
    pub outcomes: Vec<PacketOutcome>,
    /// Mean RTT over the replies that carried one.
    pub avg_rtt_ms: Option<f64>,
}

impl ProbeBatch {
    pub fn new(outcomes: Vec<PacketOutcome>) -> Self {
        let rtts: Vec<f64> = outcomes
            .iter()
            .filter_map(|o| match o {
                PacketOutcome::Replied { rtt_ms } => *rtt_ms,
                PacketOutcome::Lost => None,
            })
            .collect();
        let avg_rtt_ms = if rtts.is_empty() {
            None
        } else {
            Some(rtts.iter().sum::<f64>() / rtts.len() as f64)
        };
        Self {
            outcomes,
            avg_rtt_ms,
        }
    }

    pub fn sent(&self) -> u32 {
        self.outcomes.len() as u32
    }

    pub fn received(&self) -> u32 {
        self.outcomes.iter().filter(|o| o.replied()).count() as u32
    }
}

/// Send `count` echo requests with `size` payload bytes to `target`,
/// waiting at most `timeout` for each reply.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(
        &self,
        target: &str,
        size: u16,
        count: u32,
        timeout: Duration,
    ) -> Result<ProbeBatch, ProbeError>;
}

/// Prober backed by the system `ping` command.
#[derive(Debug, Clone)]
pub struct SystemPing {
    program: String,
}

impl Default for SystemPing {
    fn default() -> Self {
        Self {
            program: "ping".to_string(),
        }
    }
}

impl SystemPing {
    /// Use a different binary, e.g. an absolute path.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Prober for SystemPing {
    async fn probe(
        &self,
        target: &str,
        size: u16,
        count: u32,
        timeout: Duration,
    ) -> Result<ProbeBatch, ProbeError> {
        let payload = size.max(MIN_TIMED_PAYLOAD);
        if payload != size {
            debug!(size, payload, "raising payload size so replies carry timing");
        }
        let wait_secs = timeout.as_secs_f64().ceil().max(1.0) as u64;

        let mut command = Command::new(&self.program);
        command
            .args(["-n", "-c", &count.to_string()])
            .args(["-s", &payload.to_string()])
            .args(["-W", &wait_secs.to_string()])
            .arg(target)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        // ping paces requests one second apart, then waits for the last.
        let deadline = Duration::from_secs(u64::from(count) + wait_secs + 5);
        let output = match tokio::time::timeout(deadline, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(spawn_error(&self.program, e)),
            Err(_) => {
                return Err(ProbeError::Failed(format!(
                    "{} did not finish within {deadline:?}",
                    self.program
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_permission_failure(&stderr) {
            return Err(ProbeError::PermissionDenied(stderr.trim().to_string()));
        }

        let batch = batch_from_output(&stdout, count);
        debug!(
            %target,
            sent = batch.sent(),
            received = batch.received(),
            avg_rtt_ms = ?batch.avg_rtt_ms,
            status = ?output.status.code(),
            "ping finished"
        );

        // Exit status 1 means "no replies" and is a valid result. Anything
        // else without a single reply is a tool error (bad host and so on).
        if batch.received() == 0 && !matches!(output.status.code(), Some(0 | 1)) {
            let message = stderr.trim();
            return Err(ProbeError::Failed(if message.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                message.to_string()
            }));
        }
        Ok(batch)
    }
}

fn spawn_error(program: &str, e: io::Error) -> ProbeError {
    match e.kind() {
        io::ErrorKind::NotFound => ProbeError::Unavailable(format!("{program}: {e}")),
        io::ErrorKind::PermissionDenied => ProbeError::PermissionDenied(format!("{program}: {e}")),
        _ => ProbeError::Failed(format!("{program}: {e}")),
    }
}

fn is_permission_failure(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.contains("operation not permitted") || stderr.contains("permission denied")
}

/// Build a batch of `count` outcomes from `ping` output.
///
/// Sequence numbers start at 1 on Linux and 0 on BSD; whichever base the
/// replies use is assumed. Duplicate replies count once.
fn batch_from_output(stdout: &str, count: u32) -> ProbeBatch {
    let mut replies: BTreeMap<u32, Option<f64>> = BTreeMap::new();
    for (seq, rtt) in stdout.lines().filter_map(parse_reply) {
        replies.entry(seq).or_insert(rtt);
    }
    let base = if replies.contains_key(&0) { 0 } else { 1 };

    let outcomes = (base..base + count)
        .map(|seq| match replies.get(&seq) {
            Some(rtt_ms) => PacketOutcome::Replied { rtt_ms: *rtt_ms },
            None => PacketOutcome::Lost,
        })
        .collect();
    ProbeBatch::new(outcomes)
}

/// `64 bytes from 8.8.8.8: icmp_seq=3 ttl=117 time=14.2 ms` → `(3, Some(14.2))`.
fn parse_reply(line: &str) -> Option<(u32, Option<f64>)> {
    if !line.contains("bytes from") {
        return None;
    }
    let seq = field(line, "icmp_seq=")?.parse().ok()?;
    let rtt = field(line, "time=").and_then(|t| t.parse::<f64>().ok());
    Some((seq, rtt))
}

fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let start = line.find(key)? + key.len();
    let rest = &line[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    Some(&rest[..end]).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINUX_OUTPUT: &str = "\
PING 8.8.8.8 (8.8.8.8) 16(44) bytes of data.
24 bytes from 8.8.8.8: icmp_seq=1 ttl=117 time=14.2 ms
24 bytes from 8.8.8.8: icmp_seq=2 ttl=117 time=15.8 ms
24 bytes from 8.8.8.8: icmp_seq=4 ttl=117 time=16.0 ms
24 bytes from 8.8.8.8: icmp_seq=4 ttl=117 time=90.0 ms (DUP!)

--- 8.8.8.8 ping statistics ---
4 packets transmitted, 3 received, +1 duplicates, 25% packet loss, time 3004ms
rtt min/avg/max/mdev = 14.2/15.333/16.0/0.8 ms
";

    #[test]
    fn parses_linux_replies() {
        assert_eq!(
            parse_reply("24 bytes from 8.8.8.8: icmp_seq=2 ttl=117 time=15.8 ms"),
            Some((2, Some(15.8)))
        );
        assert_eq!(
            parse_reply("10 bytes from 8.8.8.8: icmp_seq=7 ttl=117"),
            Some((7, None))
        );
        assert_eq!(parse_reply("PING 8.8.8.8 (8.8.8.8) 16(44) bytes of data."), None);
        assert_eq!(
            parse_reply("From 192.0.2.1 icmp_seq=3 Destination Host Unreachable"),
            None
        );
    }

    #[test]
    fn missing_sequence_numbers_are_lost() {
        let batch = batch_from_output(LINUX_OUTPUT, 4);
        assert_eq!(batch.sent(), 4);
        assert_eq!(batch.received(), 3);
        assert_eq!(batch.outcomes[2], PacketOutcome::Lost);
        let avg = batch.avg_rtt_ms.unwrap();
        assert!((avg - (14.2 + 15.8 + 16.0) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn bsd_sequence_numbers_start_at_zero() {
        let output = "\
64 bytes from 1.1.1.1: icmp_seq=0 ttl=57 time=9.000 ms
64 bytes from 1.1.1.1: icmp_seq=1 ttl=57 time=11.000 ms
";
        let batch = batch_from_output(output, 3);
        assert_eq!(batch.received(), 2);
        assert_eq!(batch.outcomes[2], PacketOutcome::Lost);
        assert_eq!(batch.avg_rtt_ms, Some(10.0));
    }

    #[test]
    fn no_replies_has_no_average() {
        let batch = batch_from_output("PING 192.0.2.1 (192.0.2.1) 16(44) bytes of data.\n", 5);
        assert_eq!(batch.sent(), 5);
        assert_eq!(batch.received(), 0);
        assert_eq!(batch.avg_rtt_ms, None);
    }

    #[test]
    fn permission_failures_are_recognised() {
        assert!(is_permission_failure(
            "ping: socket: Operation not permitted\n"
        ));
        assert!(is_permission_failure("ping: icmp open socket: Permission denied"));
        assert!(!is_permission_failure("ping: unknown host nowhere.invalid"));
    }

    #[test]
    fn spawn_errors_map_by_kind() {
        let err = spawn_error("ping", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, ProbeError::Unavailable(_)));
        let err = spawn_error("ping", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(err.is_permission_denied());
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let ping = SystemPing::with_program("/nonexistent/uplink-ping");
        let err = ping
            .probe("127.0.0.1", 2, 1, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Unavailable(_)));
    }
}
