use async_trait::async_trait;
use burrow_core::error::{Result, StorageError};
use burrow_core::{LinkId, Repository, Statistic, UrlPair};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
struct FileState {
    file: File,
    /// Number of lines in the file, which is also the last id handed out.
    last_id: u64,
}

impl FileState {
    /// Positions the handle at the start and returns a line reader over it.
    async fn rewind(&mut self) -> Result<LineReader<'_>> {
        self.file.seek(SeekFrom::Start(0)).await?;
        Ok(LineReader {
            reader: BufReader::new(&mut self.file),
            buf: Vec::new(),
        })
    }

    async fn count_lines(&mut self) -> Result<u64> {
        let mut lines = self.rewind().await?;
        let mut count = 0;
        while lines.next_line().await?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    /// Appends `batch` and advances the allocator by `count` once the bytes
    /// are synced.
    async fn append(&mut self, batch: &[u8], count: u64) -> Result<()> {
        let committed = self.file.metadata().await?.len();
        let written = write_synced(&mut self.file, batch).await;
        self.settle(committed, written).await?;
        self.last_id += count;
        Ok(())
    }

    /// Keeps an append only if it was acknowledged. Otherwise the file is cut
    /// back to `committed`, so an unacknowledged or torn line cannot shift
    /// the ids of later appends.
    async fn settle(&mut self, committed: u64, written: std::io::Result<()>) -> Result<()> {
        let Err(cause) = written else {
            return Ok(());
        };
        error!(error = %cause, committed, "append failed, truncating link file");

        let truncated = async {
            self.file.set_len(committed).await?;
            self.file.sync_data().await
        }
        .await;
        if let Err(truncate_err) = truncated {
            warn!(error = %truncate_err, "truncation failed, recounting lines");
            self.last_id = self.count_lines().await?;
        }
        Err(cause.into())
    }
}

async fn write_synced(file: &mut File, batch: &[u8]) -> std::io::Result<()> {
    file.write_all(batch).await?;
    file.flush().await?;
    file.sync_data().await
}

/// Reads lines as raw bytes. Invalid UTF-8 is replaced rather than
/// rejected, so one damaged line never makes the file unreadable.
struct LineReader<'a> {
    reader: BufReader<&'a mut File>,
    buf: Vec<u8>,
}

impl LineReader<'_> {
    async fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
            return Ok(None);
        }
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

/// Append-only file implementation of the [`Repository`] contract.
///
/// Every link is one line and its 1-based line number is its id. The format
/// has no room for owners or deletion flags: deletes are no-ops and the
/// history of any owner is the whole file. Duplicate URLs are not detected.
#[derive(Debug)]
pub struct FileRepository {
    path: PathBuf,
    base_url: String,
    state: Mutex<FileState>,
}

impl FileRepository {
    /// Opens (or creates) the link file and resumes the id counter from its
    /// line count.
    pub async fn open(path: impl AsRef<Path>, base_url: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(StorageError::Io("empty file path".to_string()));
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .await?;

        let mut state = FileState { file, last_id: 0 };
        repair_trailing_newline(&mut state.file, path).await?;

        let count = state.count_lines().await?;
        state.last_id = count;

        info!(path = %path.display(), last_id = count, "opened link file");

        Ok(Self {
            path: path.to_path_buf(),
            base_url: base_url.into(),
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Terminates a final line that was written without a newline so the next
/// append starts on a line of its own.
async fn repair_trailing_newline(file: &mut File, path: &Path) -> Result<()> {
    if file.metadata().await?.len() == 0 {
        return Ok(());
    }

    file.seek(SeekFrom::End(-1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    if last[0] != b'\n' {
        warn!(path = %path.display(), "link file does not end with a newline, repairing");
        file.write_all(b"\n").await?;
        file.flush().await?;
        file.sync_data().await?;
    }
    Ok(())
}

#[async_trait]
impl Repository for FileRepository {
    async fn create_short(&self, _owner: &str, urls: &[String]) -> Result<Vec<LinkId>> {
        if let Some(url) = urls.iter().find(|url| url.contains(['\n', '\r'])) {
            return Err(StorageError::InvalidUrl(format!(
                "line breaks cannot be stored in the link file: {url:?}"
            )));
        }
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        let mut state = self.state.lock().await;

        let mut buffer = String::new();
        let mut ids = Vec::with_capacity(urls.len());
        let mut next = LinkId::new(state.last_id);
        for url in urls {
            buffer.push_str(url);
            buffer.push('\n');
            next = next.next();
            ids.push(next);
        }

        state.append(buffer.as_bytes(), ids.len() as u64).await?;

        debug!(count = ids.len(), last_id = state.last_id, "appended links");
        Ok(ids)
    }

    async fn get_original(&self, id: LinkId) -> Result<String> {
        let mut state = self.state.lock().await;
        if id.get() > state.last_id {
            return Err(StorageError::NotFound(id));
        }

        let mut lines = state.rewind().await?;
        let mut line_no = 0;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line_no == id.get() {
                return Ok(line);
            }
        }

        Err(StorageError::NotFound(id))
    }

    async fn mark_as_deleted(&self, _owner: &str, ids: &[LinkId]) -> Result<()> {
        debug!(count = ids.len(), "file storage cannot delete links, ignoring");
        Ok(())
    }

    async fn get_urls_by_user(&self, _owner: &str) -> Result<Vec<UrlPair>> {
        let mut state = self.state.lock().await;

        let mut lines = state.rewind().await?;
        let mut history = Vec::new();
        let mut id = LinkId::first();
        while let Some(original_url) = lines.next_line().await? {
            history.push(UrlPair {
                short_url: id.to_url(&self.base_url),
                original_url,
            });
            id = id.next();
        }
        Ok(history)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn statistic(&self) -> Result<Statistic> {
        let state = self.state.lock().await;
        Ok(Statistic {
            urls: state.last_id as usize,
            users: 0,
        })
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
