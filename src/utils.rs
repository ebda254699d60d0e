/**************************************************************************/
/*  This file is part of PROTOCNF.                                        */
/*                                                                        */
/*  Copyright (C) 2025                                                    */
/*    CEA (Commissariat à l'énergie atomique et aux énergies              */
/*         alternatives)                                                  */
/*                                                                        */
/*  you can redistribute it and/or modify it under the terms of the GNU   */
/*  Lesser General Public License as published by the Free Software       */
/*  Foundation, version 2.1.                                              */
/*                                                                        */
/*  It is distributed in the hope that it will be useful,                 */
/*  but WITHOUT ANY WARRANTY; without even the implied warranty of        */
/*  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the         */
/*  GNU Lesser General Public License for more details.                   */
/*                                                                        */
/*  See the GNU Lesser General Public License version 2.1                 */
/*  for more details (enclosed in the file licenses/LGPLv2.1).            */
/*                                                                        */
/**************************************************************************/

//! Process and file helpers.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::trace;

/// How many of the last bytes read [`LastLines`] keeps
pub const LAST_LINES_CAPACITY: usize = 1024;

struct Tail {
    bytes: VecDeque<u8>,
    error: Option<std::io::ErrorKind>,
    done: bool,
}

impl Tail {
    fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend(chunk.iter().copied());
        let excess = self.bytes.len().saturating_sub(LAST_LINES_CAPACITY);
        self.bytes.drain(..excess);
    }
}

/// Drains a pipe in a background thread so that the writing process never blocks on it, and
/// keeps only the last [`LAST_LINES_CAPACITY`] bytes and the first read error.
///
/// The thread stops at end of file, at the first error, or at the next read after this is
/// dropped.
pub struct LastLines {
    tail: Arc<Mutex<Tail>>,
}

impl LastLines {
    /// Spawns the thread reading `read`.
    pub fn new<R: Read + Send + 'static>(mut read: R) -> Self {
        let tail = Arc::new(Mutex::new(Tail {
            bytes: VecDeque::with_capacity(LAST_LINES_CAPACITY),
            error: None,
            done: false,
        }));
        let shared = tail.clone();
        std::thread::spawn(move || {
            let mut buffer = [0; LAST_LINES_CAPACITY / 2];
            loop {
                let res = read.read(&mut buffer);
                let mut tail = match shared.lock() {
                    Ok(tail) => tail,
                    Err(_) => break,
                };
                match res {
                    Ok(0) => tail.done = true,
                    Ok(n) => tail.push(&buffer[..n]),
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                    Err(e) => tail.error = Some(e.kind()),
                }
                if tail.done || tail.error.is_some() {
                    break;
                }
            }
        });
        Self { tail }
    }

    /// The last bytes read so far, and the read error if one occurred.
    pub fn get(&self) -> (Vec<u8>, std::io::Result<()>) {
        match self.tail.lock() {
            Ok(tail) => {
                let error = match tail.error {
                    Some(kind) => Err(kind.into()),
                    None => Ok(()),
                };
                (tail.bytes.iter().copied().collect(), error)
            }
            Err(_) => (
                Vec::new(),
                Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "pipe reader panicked",
                )),
            ),
        }
    }

    /// Like [`LastLines::get`], as text, ignoring errors.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.get().0).into_owned()
    }

    /// Waits at most `timeout` for the end of the pipe, then returns [`LastLines::text`].
    pub fn text_at_end(&self, timeout: Duration) -> String {
        let interval = Duration::from_millis(10);
        let mut waited = Duration::from_secs(0);
        while waited < timeout {
            match self.tail.lock() {
                Ok(tail) if !tail.done && tail.error.is_none() => (),
                _ => break,
            }
            std::thread::sleep(interval);
            waited += interval;
        }
        self.text()
    }
}

impl Drop for LastLines {
    fn drop(&mut self) {
        if let Ok(mut tail) = self.tail.lock() {
            tail.done = true;
        }
    }
}

/// Waits for `process` to exit, for at most `timeout`. Returns None if it is still running.
pub fn try_wait_timeout(
    process: &mut std::process::Child,
    timeout: Duration,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let interval = Duration::from_millis(20);
    let mut waited = Duration::from_secs(0);
    loop {
        if let Some(status) = process.try_wait()? {
            return Ok(Some(status));
        }
        if waited >= timeout {
            return Ok(None);
        }
        std::thread::sleep(interval);
        waited += interval;
    }
}

/// Returns whether an event at this level would be logged.
pub fn would_log(level: tracing::Level) -> bool {
    level <= tracing::level_filters::LevelFilter::current()
}

/// A temporary file, kept on disk when debug logging is enabled so that it can be inspected.
pub enum MaybePersistentTempFile {
    /// Removed on drop
    Temp(tempfile::NamedTempFile),
    /// Kept: file and path
    Persistent(File, std::path::PathBuf),
}

impl MaybePersistentTempFile {
    /// Creates the file. `extension` includes the leading dot.
    pub fn new(extension: &str) -> anyhow::Result<Self> {
        let temp = tempfile::Builder::new()
            .prefix("protocnf")
            .suffix(extension)
            .tempfile()?;
        if would_log(tracing::Level::DEBUG) {
            let (file, path) = temp.keep()?;
            trace!(path = %path.display(), "keeping temporary file");
            Ok(Self::Persistent(file, path))
        } else {
            Ok(Self::Temp(temp))
        }
    }

    /// The underlying file
    pub fn as_file_mut(&mut self) -> &mut File {
        match self {
            MaybePersistentTempFile::Temp(file) => file.as_file_mut(),
            MaybePersistentTempFile::Persistent(file, _) => file,
        }
    }
}

impl Write for MaybePersistentTempFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.as_file_mut().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.as_file_mut().flush()
    }
}

impl AsRef<Path> for MaybePersistentTempFile {
    fn as_ref(&self) -> &Path {
        match self {
            MaybePersistentTempFile::Persistent(_, path) => path.as_ref(),
            MaybePersistentTempFile::Temp(file) => file.as_ref(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::process::{Command, Stdio};

    #[test]
    fn last_lines_keeps_the_end() -> anyhow::Result<()> {
        let mut child = Command::new("seq")
            .arg("1000000")
            .stdout(Stdio::piped())
            .spawn()?;
        let stdout = child.stdout.take().expect("piped stdout");
        let lines = LastLines::new(stdout);
        assert!(child.wait()?.success());
        // the reader thread may lag behind the exit of the process
        lines.text_at_end(Duration::from_secs(5));
        let (text, err) = lines.get();
        assert!(err.is_ok());
        assert!(text.len() <= LAST_LINES_CAPACITY);
        assert!(text.ends_with(b"999999\n1000000\n"));
        Ok(())
    }

    #[test]
    fn wait_timeout() -> anyhow::Result<()> {
        let mut sleeper = Command::new("sleep").arg("10").spawn()?;
        assert!(try_wait_timeout(&mut sleeper, Duration::from_millis(100))?.is_none());
        sleeper.kill()?;
        sleeper.wait()?;
        let mut quick = Command::new("true").spawn()?;
        let status = try_wait_timeout(&mut quick, Duration::from_secs(10))?;
        assert!(status.map_or(false, |s| s.success()));
        Ok(())
    }

    #[test]
    fn temp_file_is_writable() -> anyhow::Result<()> {
        let mut file = MaybePersistentTempFile::new(".cnf")?;
        writeln!(file, "p cnf 0 0")?;
        file.flush()?;
        let path: &Path = file.as_ref();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("cnf"));
        assert_eq!(std::fs::read_to_string(path)?, "p cnf 0 0\n");
        Ok(())
    }
}
