//! The append-only persistence log: a RESP-framed command stream
//! (`*N\r\n$len\r\n...`), its loader, and the low-level file operations the
//! online shrink in `db.rs` builds its chunked rewrite on top of.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use fs4::FileExt;

use crate::config::SyncPolicy;
use crate::error::{Error, Result};
use crate::item::Item;

/// Encodes one RESP array-of-bulk-strings command frame.
pub fn encode_command(args: &[&[u8]]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for a in args {
        buf.extend_from_slice(format!("${}\r\n", a.len()).as_bytes());
        buf.extend_from_slice(a);
        buf.extend_from_slice(b"\r\n");
    }
    buf
}

/// Encodes a live item as a `SET` record, with `EX` carrying its remaining
/// TTL in seconds relative to `now`. Shared by commit-time appends,
/// `Database::save`, and shrink's full-dataset rewrite, so all three produce
/// byte-identical records for the same item.
pub fn encode_set_record(item: &Item, now: SystemTime) -> Vec<u8> {
    let ttl_str = item
        .expires_at
        .map(|at| at.duration_since(now).unwrap_or(Duration::ZERO).as_secs().to_string());
    let mut args: Vec<&[u8]> = vec![b"set", &item.key, &item.value];
    if let Some(ref s) = ttl_str {
        args.push(b"ex");
        args.push(s.as_bytes());
    }
    encode_command(&args)
}

/// Encodes a `DEL` record.
pub fn encode_del_record(key: &[u8]) -> Vec<u8> {
    encode_command(&[b"del", key])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set { key: Vec<u8>, value: Vec<u8>, ttl: Option<Duration> },
    Del { key: Vec<u8> },
}

/// Parses every complete command frame out of `data`.
///
/// Tolerates two forms of damage rather than erroring: stray NUL bytes
/// between frames (the tail of a file grown by `fallocate`-style
/// preallocation) are skipped, and an incomplete frame at the very end of the
/// buffer (a write that was interrupted mid-append, e.g. by a crash before
/// the trailing bytes hit disk) is silently dropped instead of failing the
/// whole load. A frame that *is* fully present but structurally wrong (a bad
/// length, a `SET` missing its value) is a real corruption and is reported.
pub fn parse_stream(data: &[u8]) -> Result<Vec<Command>> {
    Ok(parse_stream_with_tail(data)?.0)
}

/// Same as `parse_stream`, plus the number of trailing bytes that could not
/// be parsed as a complete frame (0 in the common case of a clean file).
/// `db.rs`'s loader logs this count rather than silently swallowing it.
pub fn parse_stream_with_tail(data: &[u8]) -> Result<(Vec<Command>, usize)> {
    let mut commands = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        if data[pos] == 0 {
            pos += 1;
            continue;
        }
        match parse_frame(&data[pos..])? {
            Some((consumed, args)) => {
                pos += consumed;
                if let Some(cmd) = command_from_args(&args)? {
                    commands.push(cmd);
                }
            }
            None => break,
        }
    }
    Ok((commands, data.len() - pos))
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parses one frame starting at the beginning of `buf`. Returns `Ok(None)`
/// for a frame that is truncated (more bytes needed than `buf` has), and
/// `Err` for a frame that is present but malformed.
fn parse_frame(buf: &[u8]) -> Result<Option<(usize, Vec<Vec<u8>>)>> {
    if buf.is_empty() || buf[0] != b'*' {
        return Err(Error::InvalidDatabase("expected '*' array header".into()));
    }
    let Some(header_end) = find_crlf(buf) else { return Ok(None) };
    let count: usize = std::str::from_utf8(&buf[1..header_end])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::InvalidDatabase("bad array length".into()))?;

    let mut pos = header_end + 2;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        if pos >= buf.len() || buf[pos] != b'$' {
            if pos >= buf.len() {
                return Ok(None);
            }
            return Err(Error::InvalidDatabase("expected '$' bulk header".into()));
        }
        let Some(rel_crlf) = find_crlf(&buf[pos..]) else { return Ok(None) };
        let len_end = pos + rel_crlf;
        let len: usize = std::str::from_utf8(&buf[pos + 1..len_end])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::InvalidDatabase("bad bulk length".into()))?;
        let data_start = len_end + 2;
        let data_end = data_start + len;
        if data_end + 2 > buf.len() {
            return Ok(None);
        }
        if &buf[data_end..data_end + 2] != b"\r\n" {
            return Err(Error::InvalidDatabase("missing bulk terminator".into()));
        }
        args.push(buf[data_start..data_end].to_vec());
        pos = data_end + 2;
    }
    Ok(Some((pos, args)))
}

fn command_from_args(args: &[Vec<u8>]) -> Result<Option<Command>> {
    if args.is_empty() {
        return Err(Error::InvalidDatabase("empty command".into()));
    }
    match args[0].to_ascii_lowercase().as_slice() {
        b"set" => {
            if args.len() != 3 && args.len() != 5 {
                return Err(Error::InvalidDatabase(format!(
                    "set requires 3 or 5 args, got {}",
                    args.len()
                )));
            }
            let ttl = if args.len() == 5 {
                if !args[3].eq_ignore_ascii_case(b"ex") {
                    return Err(Error::InvalidDatabase("expected EX before ttl seconds".into()));
                }
                let secs: u64 = std::str::from_utf8(&args[4])
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| Error::InvalidDatabase("bad ex seconds".into()))?;
                Some(Duration::from_secs(secs))
            } else {
                None
            };
            Ok(Some(Command::Set { key: args[1].clone(), value: args[2].clone(), ttl }))
        }
        b"del" => {
            if args.len() != 2 {
                return Err(Error::InvalidDatabase(format!(
                    "del requires exactly 2 args, got {}",
                    args.len()
                )));
            }
            Ok(Some(Command::Del { key: args[1].clone() }))
        }
        // Any other verb fails the whole load (spec.md §4.3): unlike the
        // stray-NUL/truncated-tail tolerance, a structurally complete frame
        // naming an unknown command is real corruption, not partial-write
        // damage.
        other => Err(Error::InvalidDatabase(format!(
            "unrecognized command {:?}",
            String::from_utf8_lossy(other)
        ))),
    }
}

/// The live append-only file plus enough state to implement the configured
/// sync policy without calling `fsync` more than necessary.
pub struct Log {
    path: PathBuf,
    file: File,
    dirty: bool,
}

impl Log {
    /// Opens (creating if absent) the log file and takes an advisory
    /// exclusive lock on it, so a second process opening the same path fails
    /// fast instead of silently interleaving writes with this one. This is
    /// strictly a cross-*process* guard: spec.md's single-writer discipline
    /// within one process is already enforced by the `RwLock` in `db.rs`.
    pub fn open(path: &Path) -> Result<Log> {
        let file = OpenOptions::new().create(true).read(true).append(true).open(path)?;
        file.try_lock_exclusive().map_err(|e| {
            Error::InvalidDatabase(format!("{} is already locked by another process: {e}", path.display()))
        })?;
        Ok(Log { path: path.to_path_buf(), file, dirty: false })
    }

    /// Reads the whole file and the time it was last written, for
    /// reconstructing absolute expirations (see `db.rs::load`).
    pub fn read_all(path: &Path) -> Result<(Vec<u8>, SystemTime)> {
        let mut file = File::open(path)?;
        let mtime = file.metadata()?.modified().unwrap_or_else(|_| SystemTime::now());
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok((data, mtime))
    }

    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.file.write_all(bytes)?;
        self.dirty = true;
        Ok(())
    }

    pub fn maybe_sync(&mut self, policy: SyncPolicy) -> Result<()> {
        if policy == SyncPolicy::Always && self.dirty {
            self.file.sync_all()?;
            self.dirty = false;
        }
        Ok(())
    }

    /// Called by the background worker roughly once a second under
    /// `SyncPolicy::EverySecond`.
    pub fn tick_sync(&mut self) -> Result<()> {
        if self.dirty {
            self.file.sync_all()?;
            self.dirty = false;
        }
        Ok(())
    }

    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the log's contents with `bytes` in place, used by `db.rs`'s
    /// shrink once the rewritten copy has been fully written and synced to a
    /// temp file and renamed over `self.path`. Reopens the file handle so
    /// subsequent appends land after the new, shorter content.
    pub fn reopen_after_shrink(&mut self) -> Result<()> {
        let file = OpenOptions::new().create(true).read(true).append(true).open(&self.path)?;
        file.try_lock_exclusive().map_err(|e| {
            Error::InvalidDatabase(format!("{} is already locked by another process: {e}", self.path.display()))
        })?;
        self.file = file;
        self.file.seek(SeekFrom::End(0))?;
        Ok(())
    }
}

/// Creates a private temp file alongside `final_path` for the shrink
/// rewrite, named so a crash mid-shrink never collides with the live log.
pub fn create_shrink_temp(final_path: &Path) -> Result<(PathBuf, File)> {
    let tmp_path = final_path.with_extension("shrink.tmp");
    let file = OpenOptions::new().create(true).write(true).truncate(true).open(&tmp_path)?;
    Ok((tmp_path, file))
}

/// Finishes a shrink rewrite: copies everything appended to `final_path`
/// since `endpos` (commits that landed while the snapshot scan was running)
/// onto the end of `tmp_file`, then atomically renames it over `final_path`.
///
/// Copying the suffix is what makes the online rewrite safe under
/// concurrent writers — the snapshot scan only captures the tree as of the
/// moment each chunk ran, so anything committed mid-shrink would otherwise
/// be silently dropped.
pub fn finish_shrink(mut tmp_file: File, tmp_path: &Path, final_path: &Path, endpos: u64) -> Result<()> {
    let append_suffix = || -> Result<()> {
        let mut orig = File::open(final_path)?;
        orig.seek(SeekFrom::Start(endpos))?;
        let mut suffix = Vec::new();
        orig.read_to_end(&mut suffix)?;
        tmp_file.write_all(&suffix)?;
        tmp_file.sync_all()?;
        Ok(())
    };

    if let Err(e) = append_suffix() {
        let _ = std::fs::remove_file(tmp_path);
        return Err(e);
    }
    drop(tmp_file);

    // A rename failure here leaves the live log in an ambiguous state (the
    // rewritten copy is complete and correct, but not in place); spec.md
    // treats this as a process-fatal condition rather than a recoverable
    // error, since the database cannot guarantee consistency by retrying.
    if let Err(e) = std::fs::rename(tmp_path, final_path) {
        panic!("kvdb: fatal: could not install shrunk log at {}: {e}", final_path.display());
    }
    Ok(())
}
