use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info, warn};

use inmemdb_common::clock::mstime;

use crate::db::{Database, Entry};
use crate::list::ValueList;
use crate::value::{Value, INT_VALUE_TYPE, LIST_VALUE_TYPE, STRING_VALUE_TYPE};

/// Snapshot Binary Format
///
/// ```text
/// +---------------+---------------------+------------+
/// | Magic (8B)    | Record*             | 0xFF (1B)  |
/// +---------------+---------------------+------------+
/// ```
///
/// Each record:
/// ```text
/// +---------+-------------+-------------+----------+---------+
/// | Tag(1B) | Deadline(8B)| KeyLen (4B) | Key Data | Payload |
/// +---------+-------------+-------------+----------+---------+
/// ```
///
/// Payload by tag:
/// - `0` string: `[len(4B)] [bytes]`
/// - `1` integer: `[i64(8B)]`
/// - `2` list: `[count(4B)] { [len(4B)] [bytes] }*`
///
/// The deadline is an absolute millisecond timestamp, -1 for none. All
/// multi-byte integers are little-endian; the magic was bumped from the
/// host-order `IMDB0001` format when the byte order was fixed.
const SNAPSHOT_MAGIC: &[u8; 8] = b"IMDB0002";
const SNAPSHOT_EOF: u8 = 0xFF;

/// Upper bound on any single length field, so a corrupt file cannot make
/// the loader allocate without limit.
const MAX_RECORD_LEN: u32 = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The file does not start with the expected magic bytes.
    #[error("Bad snapshot magic")]
    BadMagic,

    /// Encountered an unknown record type byte.
    #[error("Invalid record type: {0}")]
    InvalidRecordType(u8),

    /// A length field exceeds the safety limit.
    #[error("Record too large: {len} bytes (max {max})")]
    RecordTooLarge { len: u32, max: u32 },
}

/// Writes a point-in-time snapshot of the keyspace to `path`.
///
/// The snapshot is first written to `<path>.tmp`, synced, and then moved
/// over any previous snapshot so a crash mid-save never clobbers the old
/// file. Any write failure removes the temporary file.
pub fn save(db: &Database, path: &Path) -> Result<(), SnapshotError> {
    let tmp = tmp_path(path);
    debug!(?tmp, "Writing snapshot");

    if let Err(e) = write_snapshot(db, &tmp) {
        fs::remove_file(&tmp).ok();
        return Err(e);
    }

    // Replace-by-rename; the explicit remove keeps the behavior identical
    // on platforms where rename onto an existing file fails.
    fs::remove_file(path).ok();
    if let Err(e) = fs::rename(&tmp, path) {
        fs::remove_file(&tmp).ok();
        return Err(e.into());
    }

    info!(keys = db.len(), ?path, "Snapshot saved");
    Ok(())
}

fn write_snapshot(db: &Database, tmp: &Path) -> Result<(), SnapshotError> {
    let file = File::create(tmp)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(SNAPSHOT_MAGIC)?;

    for (key, entry) in db.iter() {
        writer.write_all(&[entry.value.type_tag()])?;
        writer.write_all(&entry.expire_at.unwrap_or(-1).to_le_bytes())?;
        write_bytes(&mut writer, key)?;

        match &entry.value {
            Value::Str(data) => write_bytes(&mut writer, data)?,
            Value::Int(n) => writer.write_all(&n.to_le_bytes())?,
            Value::List(list) => {
                writer.write_all(&(list.len() as u32).to_le_bytes())?;
                for item in list.iter() {
                    write_bytes(&mut writer, item)?;
                }
            }
        }
    }

    writer.write_all(&[SNAPSHOT_EOF])?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Loads a snapshot into `db`, replacing entries key by key. Records whose
/// deadline has already passed are skipped. Returns the number of entries
/// loaded.
///
/// A truncated tail is tolerated: whatever loaded before the truncation
/// point stays, and a warning is logged.
pub fn load(db: &mut Database, path: &Path) -> Result<usize, SnapshotError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != SNAPSHOT_MAGIC {
        return Err(SnapshotError::BadMagic);
    }

    let now = mstime();
    let mut loaded = 0usize;

    loop {
        let mut tag = [0u8; 1];
        match reader.read_exact(&mut tag) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                warn!(?path, "Snapshot missing trailer, stopping at EOF");
                break;
            }
            Err(e) => return Err(e.into()),
        }
        let tag = tag[0];
        if tag == SNAPSHOT_EOF {
            break;
        }

        let record = match read_record(&mut reader, tag) {
            Ok(record) => record,
            Err(SnapshotError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                // Crash mid-save of the original file; keep what we have.
                warn!(?path, "Snapshot truncated, skipping partial record");
                break;
            }
            Err(e) => return Err(e),
        };

        if record.deadline >= 0 && now > record.deadline {
            debug!(
                key = %String::from_utf8_lossy(&record.key),
                "Skipping expired snapshot record"
            );
            continue;
        }

        let expire_at = (record.deadline >= 0).then_some(record.deadline);
        db.insert_entry(record.key, Entry::with_deadline(record.value, expire_at));
        loaded += 1;
    }

    info!(keys = loaded, ?path, "Snapshot loaded");
    Ok(loaded)
}

struct Record {
    deadline: i64,
    key: Bytes,
    value: Value,
}

fn read_record(reader: &mut impl Read, tag: u8) -> Result<Record, SnapshotError> {
    let deadline = read_i64(reader)?;
    let key = read_bytes(reader)?;

    let value = match tag {
        STRING_VALUE_TYPE => Value::Str(read_bytes(reader)?),
        INT_VALUE_TYPE => Value::Int(read_i64(reader)?),
        LIST_VALUE_TYPE => {
            let count = read_u32(reader)?;
            if count > MAX_RECORD_LEN {
                return Err(SnapshotError::RecordTooLarge {
                    len: count,
                    max: MAX_RECORD_LEN,
                });
            }
            let mut list = ValueList::new();
            for _ in 0..count {
                list.push_back(read_bytes(reader)?);
            }
            Value::List(list)
        }
        other => return Err(SnapshotError::InvalidRecordType(other)),
    };

    Ok(Record {
        deadline,
        key,
        value,
    })
}

fn write_bytes(writer: &mut impl Write, data: &[u8]) -> Result<(), SnapshotError> {
    writer.write_all(&(data.len() as u32).to_le_bytes())?;
    writer.write_all(data)?;
    Ok(())
}

fn read_bytes(reader: &mut impl Read) -> Result<Bytes, SnapshotError> {
    let len = read_u32(reader)?;
    if len > MAX_RECORD_LEN {
        return Err(SnapshotError::RecordTooLarge {
            len,
            max: MAX_RECORD_LEN,
        });
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(Bytes::from(buf))
}

fn read_u32(reader: &mut impl Read) -> Result<u32, SnapshotError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i64(reader: &mut impl Read) -> Result<i64, SnapshotError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
