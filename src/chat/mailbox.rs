/// Offline mailbox store — per-nickname durable queues of messages
/// awaiting delivery.
///
/// One append-only file per nickname, `<spool>/<nickname>.dat`, plain
/// text, one message per line. The file's existence is the only
/// persisted signal of "has pending mail": it is created by the first
/// append and deleted when the mailbox is drained.
///
/// Appends for the same nickname only ever originate from the router
/// path with the registry lock held, so the store itself carries no
/// lock.
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use tracing::error;

#[derive(Debug, Clone)]
pub struct Mailbox {
    dir: PathBuf,
}

impl Mailbox {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, nickname: &str) -> PathBuf {
        self.dir.join(format!("{nickname}.dat"))
    }

    pub fn exists(&self, nickname: &str) -> bool {
        self.path(nickname).exists()
    }

    /// Append one message line to the nickname's mailbox.
    pub fn append(&self, nickname: &str, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(nickname))?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// All pending entries for a nickname, or `None` when no mailbox
    /// exists. Draining an absent mailbox is a no-op, not an error.
    pub fn pending(&self, nickname: &str) -> io::Result<Option<Vec<String>>> {
        match fs::read_to_string(self.path(nickname)) {
            Ok(contents) => Ok(Some(contents.lines().map(str::to_owned).collect())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete the nickname's mailbox after a drain. Failure is reported
    /// to the operator and does not block further service.
    pub fn clear(&self, nickname: &str) {
        let path = self.path(nickname);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != io::ErrorKind::NotFound {
                error!(path = %path.display(), "error deleting mailbox file: {e}");
            }
        }
    }
}
