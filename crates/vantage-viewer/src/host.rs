//! Host link over stdio: one JSON message per line in, one event per line out.

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use anyhow::{Context, Result};
use vantage_proto::{ClientEvent, HostMessage, decode_message, encode_event};

/// What the reader thread produced since the last drain.
#[derive(Debug)]
pub enum Inbound {
    Message(HostMessage),
    /// The host sent something that is not a message. Nothing after it is
    /// read.
    Malformed(anyhow::Error),
    /// No more input will arrive.
    Closed,
}

/// Receiving half of the host link.
pub struct HostLink {
    rx: Receiver<Result<HostMessage>>,
    closed: bool,
}

impl HostLink {
    /// Reads host messages from `input` on a background thread.
    pub fn spawn<R>(input: R) -> Result<Self>
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("host-reader".to_string())
            .spawn(move || {
                for (n, line) in input.lines().enumerate() {
                    let parsed = line
                        .context("failed to read host input")
                        .and_then(|line| {
                            if line.trim().is_empty() {
                                return Ok(None);
                            }
                            decode_message(&line)
                                .map(Some)
                                .with_context(|| format!("host message on line {} is malformed", n + 1))
                        });
                    match parsed {
                        Ok(None) => {}
                        Ok(Some(msg)) => {
                            if tx.send(Ok(msg)).is_err() {
                                return;
                            }
                        }
                        Err(err) => {
                            let _ = tx.send(Err(err));
                            return;
                        }
                    }
                }
            })
            .context("failed to start host reader thread")?;
        Ok(Self { rx, closed: false })
    }

    /// Next inbound item without blocking. `None` when nothing is waiting.
    /// `Closed` is reported once.
    pub fn try_next(&mut self) -> Option<Inbound> {
        if self.closed {
            return None;
        }
        match self.rx.try_recv() {
            Ok(Ok(msg)) => Some(Inbound::Message(msg)),
            Ok(Err(err)) => Some(Inbound::Malformed(err)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                Some(Inbound::Closed)
            }
        }
    }
}

/// Writes one event as a JSON line and flushes.
pub fn send_event<W: Write>(out: &mut W, event: &ClientEvent) -> Result<()> {
    let line = encode_event(event).context("failed to encode client event")?;
    writeln!(out, "{line}")?;
    out.flush()?;
    Ok(())
}

/// [`send_event`] to stdout; failures are logged, not fatal.
pub fn emit(event: &ClientEvent) {
    let stdout = io::stdout();
    if let Err(err) = send_event(&mut stdout.lock(), event) {
        log::warn!("dropping {} event: {err:#}", event.kind());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    fn drain(link: &mut HostLink) -> Vec<Inbound> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut out = Vec::new();
        while Instant::now() < deadline {
            match link.try_next() {
                Some(Inbound::Closed) => {
                    out.push(Inbound::Closed);
                    break;
                }
                Some(item) => out.push(item),
                None => thread::sleep(Duration::from_millis(1)),
            }
        }
        out
    }

    // ── reading ───────────────────────────────────────────────────────────

    #[test]
    fn messages_arrive_in_order_then_close() {
        let input = concat!(
            r#"{"msg":"set_plot_visible","plot":"a","visible":false}"#,
            "\n\n",
            r#"{"msg":"delete_scenes","scenes":["s"],"plots":[]}"#,
            "\n",
        );
        let mut link = HostLink::spawn(Cursor::new(input)).unwrap();
        let items = drain(&mut link);
        assert_eq!(items.len(), 3);
        assert!(matches!(items[0], Inbound::Message(HostMessage::SetPlotVisible { .. })));
        assert!(matches!(items[1], Inbound::Message(HostMessage::DeleteScenes { .. })));
        assert!(matches!(items[2], Inbound::Closed));
        assert!(link.try_next().is_none());
    }

    #[test]
    fn malformed_line_stops_reading() {
        let input = "{\"msg\":\"nope\"}\n{\"msg\":\"set_plot_visible\",\"plot\":\"a\",\"visible\":true}\n";
        let mut link = HostLink::spawn(Cursor::new(input)).unwrap();
        let items = drain(&mut link);
        match &items[0] {
            Inbound::Malformed(err) => assert!(format!("{err:#}").contains("line 1")),
            other => panic!("expected a malformed line, got {other:?}"),
        }
        assert!(matches!(items[1], Inbound::Closed));
    }

    // ── writing ───────────────────────────────────────────────────────────

    #[test]
    fn events_are_newline_delimited() {
        let mut out = Vec::new();
        send_event(&mut out, &ClientEvent::MouseDown { buttons: 1 }).unwrap();
        send_event(&mut out, &ClientEvent::KeyUp { key: "KeyA".into() }).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![
            r#"{"event":"mouse_down","buttons":1}"#,
            r#"{"event":"key_up","key":"KeyA"}"#,
        ]);
    }
}
