use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use crate::models::card::Uid;
use crate::rfid::reader::RfidReader;

/// Reader for keyboard-emulating RFID readers that type one UID per line
///
/// Lines are collected on a helper thread so polling never blocks the
/// board loop.
pub struct LineReader {
    lines: Receiver<String>,
    current: Uid,
    pending: Option<Uid>,
}

impl LineReader {
    pub fn new(lines: Receiver<String>) -> Self {
        Self {
            lines,
            current: Uid::INVALID,
            pending: None,
        }
    }

    /// Reader fed from standard input
    pub fn stdin() -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to read card line from stdin");
                        break;
                    }
                }
            }
        });
        Self::new(rx)
    }
}

impl RfidReader for LineReader {
    fn is_new_card_present(&mut self) -> bool {
        loop {
            match self.lines.try_recv() {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match line.parse::<Uid>() {
                        Ok(uid) => {
                            self.pending = Some(uid);
                            return true;
                        }
                        Err(e) => {
                            tracing::warn!(line = line, error = %e, "Ignoring unreadable card line");
                        }
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn read_card_serial(&mut self) -> bool {
        match self.pending.take() {
            Some(uid) => {
                self.current = uid;
                true
            }
            None => false,
        }
    }

    fn uid(&self) -> Uid {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_hex_lines() {
        let (tx, rx) = mpsc::channel();
        let mut reader = LineReader::new(rx);

        assert!(!reader.is_new_card_present());

        tx.send("  ".to_string()).unwrap();
        tx.send("not a card".to_string()).unwrap();
        tx.send("F6F07894".to_string()).unwrap();

        assert!(reader.is_new_card_present());
        assert!(reader.read_card_serial());
        assert_eq!(reader.uid(), Uid::new(0xF6F07894));
        assert!(!reader.read_card_serial());
        assert!(!reader.is_new_card_present());
    }

    #[test]
    fn test_disconnected_source() {
        let (tx, rx) = mpsc::channel::<String>();
        drop(tx);
        let mut reader = LineReader::new(rx);
        assert!(!reader.is_new_card_present());
    }
}
