//! Scripted terminal double shared by the unit tests.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use crate::terminal::Terminal;

/// Terminal that replays canned chunks and records everything done to it.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTerminal {
    pub interactive: bool,
    pub raw: bool,
    /// Every successful `set_raw` call, in order.
    pub transitions: Vec<bool>,
    pub written: Vec<u8>,
    pub fail_write: bool,
    pub fail_mode_switch: bool,
    script: VecDeque<(Duration, Vec<u8>)>,
}

impl ScriptedTerminal {
    pub fn cooked() -> Self {
        Self {
            interactive: true,
            ..Self::default()
        }
    }

    pub fn raw() -> Self {
        Self {
            interactive: true,
            raw: true,
            ..Self::default()
        }
    }

    pub fn non_interactive() -> Self {
        Self::default()
    }

    /// Queue `bytes` to be delivered `delay` after the previous chunk.
    pub fn chunk_after(mut self, delay: Duration, bytes: &[u8]) -> Self {
        self.script.push_back((delay, bytes.to_vec()));
        self
    }

    pub fn chunk(self, bytes: &[u8]) -> Self {
        self.chunk_after(Duration::ZERO, bytes)
    }

    /// Queue an end of input.
    pub fn eof(self) -> Self {
        self.chunk(b"")
    }

    pub fn failing_write(mut self) -> Self {
        self.fail_write = true;
        self
    }

    pub fn failing_mode_switch(mut self) -> Self {
        self.fail_mode_switch = true;
        self
    }
}

impl Terminal for ScriptedTerminal {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn is_raw(&self) -> io::Result<bool> {
        Ok(self.raw)
    }

    fn set_raw(&mut self, raw: bool) -> io::Result<()> {
        if self.fail_mode_switch {
            return Err(io::Error::other("tcsetattr refused"));
        }
        self.raw = raw;
        self.transitions.push(raw);
        Ok(())
    }

    async fn write_query(&mut self, query: &[u8]) -> io::Result<()> {
        if self.fail_write {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        self.written.extend_from_slice(query);
        Ok(())
    }

    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some((delay, mut bytes)) = self.script.pop_front() else {
            return std::future::pending().await;
        };
        tokio::time::sleep(delay).await;
        if bytes.len() > buf.len() {
            let tail = bytes.split_off(buf.len());
            self.script.push_front((Duration::ZERO, tail));
        }
        buf[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }
}
