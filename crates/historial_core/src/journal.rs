//! Durable journal of committed changes.
//!
//! Every committed transaction appends one frame. Opening a factory replays
//! all frames in order to rebuild the databases.
//!
//! ## Frame Format
//!
//! ```text
//! | magic (4) | version (2) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! The payload is a CBOR map `{"db": text, "drop": bool, "ops": [mutation]}`.
//!
//! ## Recovery Policy
//!
//! - A truncated header or payload at the end of the journal is a write
//!   interrupted by a crash: the tail is discarded with a warning.
//! - A bad magic, an unknown format version, a checksum mismatch or an
//!   undecodable payload is corruption and fails the open.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::native::state::{DatabaseState, Mutation};
use historial_codec::{from_cbor, to_cbor, Value};
use historial_storage::StorageBackend;
use std::collections::BTreeMap;

/// Magic bytes opening every frame.
pub(crate) const FRAME_MAGIC: [u8; 4] = *b"HJNL";

/// Current frame format version.
pub(crate) const FRAME_VERSION: u16 = 1;

const HEADER_SIZE: usize = 10;
const CRC_SIZE: usize = 4;

/// One committed unit of change for one database.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Frame {
    pub(crate) database: String,
    pub(crate) dropped: bool,
    pub(crate) mutations: Vec<Mutation>,
}

impl Frame {
    pub(crate) fn changes(database: &str, mutations: Vec<Mutation>) -> Self {
        Self {
            database: database.to_string(),
            dropped: false,
            mutations,
        }
    }

    pub(crate) fn drop_database(database: &str) -> Self {
        Self {
            database: database.to_string(),
            dropped: true,
            mutations: Vec::new(),
        }
    }

    pub(crate) fn encode(&self) -> CoreResult<Vec<u8>> {
        let payload = to_cbor(&Value::map([
            ("db", Value::from(self.database.as_str())),
            ("drop", Value::Bool(self.dropped)),
            (
                "ops",
                Value::Array(self.mutations.iter().map(Mutation::to_value).collect()),
            ),
        ]))?;
        let length = u32::try_from(payload.len())
            .map_err(|_| CoreError::invalid_state("journal frame exceeds 4 GiB"))?;

        let mut out = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        out.extend_from_slice(&FRAME_MAGIC);
        out.extend_from_slice(&FRAME_VERSION.to_le_bytes());
        out.extend_from_slice(&length.to_le_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&compute_crc32(&payload).to_le_bytes());
        Ok(out)
    }

    fn decode_payload(payload: &[u8], offset: usize) -> CoreResult<Self> {
        let corrupt =
            |what: String| CoreError::journal_corruption(format!("{what} at offset {offset}"));
        let value = from_cbor(payload).map_err(|e| corrupt(format!("undecodable frame: {e}")))?;
        let database = value
            .get("db")
            .and_then(Value::as_text)
            .ok_or_else(|| corrupt("frame without database name".into()))?
            .to_string();
        let dropped = value.get("drop").and_then(Value::as_bool).unwrap_or(false);
        let mutations = value
            .get("ops")
            .and_then(Value::as_array)
            .unwrap_or_default()
            .iter()
            .map(Mutation::from_value)
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(Self {
            database,
            dropped,
            mutations,
        })
    }
}

/// Result of scanning raw journal bytes.
#[derive(Debug)]
pub(crate) struct Scan {
    pub(crate) frames: Vec<Frame>,
    /// Length of the valid prefix; anything after it is a torn tail.
    pub(crate) valid_len: usize,
}

/// Splits raw journal bytes into frames.
pub(crate) fn scan(bytes: &[u8]) -> CoreResult<Scan> {
    let mut frames = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let rest = &bytes[offset..];
        if rest.len() < HEADER_SIZE {
            break;
        }
        if rest[0..4] != FRAME_MAGIC {
            return Err(CoreError::journal_corruption(format!(
                "invalid magic at offset {offset}"
            )));
        }
        let version = u16::from_le_bytes([rest[4], rest[5]]);
        if version > FRAME_VERSION {
            return Err(CoreError::journal_corruption(format!(
                "unsupported frame version {version} at offset {offset}"
            )));
        }
        let length = u32::from_le_bytes([rest[6], rest[7], rest[8], rest[9]]) as usize;
        let total = HEADER_SIZE + length + CRC_SIZE;
        if rest.len() < total {
            break;
        }
        let payload = &rest[HEADER_SIZE..HEADER_SIZE + length];
        let stored_crc = u32::from_le_bytes([
            rest[total - 4],
            rest[total - 3],
            rest[total - 2],
            rest[total - 1],
        ]);
        if compute_crc32(payload) != stored_crc {
            return Err(CoreError::journal_corruption(format!(
                "checksum mismatch at offset {offset}"
            )));
        }
        frames.push(Frame::decode_payload(payload, offset)?);
        offset += total;
    }
    Ok(Scan {
        frames,
        valid_len: offset,
    })
}

/// Appends frames to a storage backend.
pub(crate) struct Journal {
    backend: Box<dyn StorageBackend>,
    sync_on_commit: bool,
}

impl Journal {
    /// Wraps a backend without reading it.
    pub(crate) fn new(backend: Box<dyn StorageBackend>, config: &Config) -> Self {
        Self {
            backend,
            sync_on_commit: config.sync_on_commit,
        }
    }

    /// Wraps a backend and replays it into per-database states.
    pub(crate) fn open(
        backend: Box<dyn StorageBackend>,
        config: &Config,
    ) -> CoreResult<(Self, BTreeMap<String, DatabaseState>)> {
        let mut journal = Self::new(backend, config);
        let bytes = journal.backend.read_all()?;
        let scan = scan(&bytes)?;

        if scan.valid_len < bytes.len() {
            tracing::warn!(
                discarded = bytes.len() - scan.valid_len,
                "discarding torn journal tail"
            );
            journal.backend.replace(&bytes[..scan.valid_len])?;
        }

        let mut states: BTreeMap<String, DatabaseState> = BTreeMap::new();
        let frame_count = scan.frames.len();
        for frame in scan.frames {
            if frame.dropped {
                states.remove(&frame.database);
                continue;
            }
            let state = states.entry(frame.database.clone()).or_default();
            for mutation in &frame.mutations {
                state.apply(mutation).map_err(|e| {
                    CoreError::journal_corruption(format!(
                        "replaying {:?}: {e}",
                        frame.database
                    ))
                })?;
            }
        }
        tracing::debug!(
            frames = frame_count,
            databases = states.len(),
            "journal replayed"
        );

        if config.compact_on_open {
            journal.rewrite(&snapshot_frames(&states))?;
        }
        Ok((journal, states))
    }

    pub(crate) fn append(&mut self, frame: &Frame) -> CoreResult<()> {
        let bytes = frame.encode()?;
        self.backend.append(&bytes)?;
        if self.sync_on_commit {
            self.backend.sync()?;
        }
        Ok(())
    }

    /// Replaces the whole journal with `frames`.
    pub(crate) fn rewrite(&mut self, frames: &[Frame]) -> CoreResult<()> {
        let mut bytes = Vec::new();
        for frame in frames {
            bytes.extend_from_slice(&frame.encode()?);
        }
        let before = self.backend.size()?;
        self.backend.replace(&bytes)?;
        self.backend.sync()?;
        tracing::info!(before, after = bytes.len(), "journal compacted");
        Ok(())
    }

    pub(crate) fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }
}

/// One snapshot frame per database.
pub(crate) fn snapshot_frames<'a>(
    states: impl IntoIterator<Item = (&'a String, &'a DatabaseState)>,
) -> Vec<Frame> {
    states
        .into_iter()
        .filter(|(_, state)| state.version > 0)
        .map(|(name, state)| Frame::changes(name, state.snapshot()))
        .collect()
}

/// CRC32 (IEEE polynomial) over `data`.
pub(crate) fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use historial_storage::InMemoryBackend;

    fn put(id: &str) -> Mutation {
        Mutation::Put {
            store: "students".into(),
            key: Key::from(id),
            value: Value::map([("id", Value::from(id))]),
        }
    }

    fn schema() -> Vec<Mutation> {
        vec![
            Mutation::SetVersion(1),
            Mutation::CreateStore {
                name: "students".into(),
                key_path: Some("id".into()),
            },
        ]
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn scan_splits_frames() {
        let mut bytes = Frame::changes("db", schema()).encode().unwrap();
        bytes.extend(Frame::changes("db", vec![put("1")]).encode().unwrap());
        let scan = scan(&bytes).unwrap();
        assert_eq!(scan.frames.len(), 2);
        assert_eq!(scan.valid_len, bytes.len());
        assert_eq!(scan.frames[1].mutations, vec![put("1")]);
    }

    #[test]
    fn torn_tail_is_discarded_on_open() {
        let mut bytes = Frame::changes("db", schema()).encode().unwrap();
        let good = bytes.len();
        let second = Frame::changes("db", vec![put("1")]).encode().unwrap();
        bytes.extend_from_slice(&second[..second.len() - 3]);

        let backend = InMemoryBackend::with_data(bytes);
        let (_, states) = Journal::open(Box::new(backend.clone()), &Config::default()).unwrap();
        assert!(states["db"].stores["students"].records.is_empty());
        assert_eq!(backend.data().len(), good);
    }

    #[test]
    fn checksum_mismatch_is_corruption() {
        let mut bytes = Frame::changes("db", schema()).encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            scan(&bytes),
            Err(CoreError::JournalCorruption { .. })
        ));
    }

    #[test]
    fn bad_magic_is_corruption() {
        let mut bytes = Frame::changes("db", schema()).encode().unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            scan(&bytes),
            Err(CoreError::JournalCorruption { .. })
        ));
    }

    #[test]
    fn dropped_database_is_forgotten() {
        let mut bytes = Frame::changes("db", schema()).encode().unwrap();
        bytes.extend(Frame::drop_database("db").encode().unwrap());
        let backend = InMemoryBackend::with_data(bytes);
        let (_, states) = Journal::open(Box::new(backend), &Config::default()).unwrap();
        assert!(states.is_empty());
    }

    #[test]
    fn compact_on_open_rewrites_snapshot() {
        let mut bytes = Frame::changes("db", schema()).encode().unwrap();
        for _ in 0..5 {
            bytes.extend(Frame::changes("db", vec![put("1")]).encode().unwrap());
        }
        let backend = InMemoryBackend::with_data(bytes.clone());
        let config = Config::new().compact_on_open(true);
        let (journal, states) = Journal::open(Box::new(backend.clone()), &config).unwrap();
        assert!(journal.size().unwrap() < bytes.len() as u64);
        assert_eq!(states["db"].stores["students"].records.len(), 1);

        let (_, reopened) = Journal::open(Box::new(backend), &Config::default()).unwrap();
        assert_eq!(reopened, states);
    }
}
