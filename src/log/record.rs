use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::common::{Lsn, PageId, QuireError, Result, TxnId};

/// Tag stored in the first four bytes of every log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordType(pub u32);

impl RecordType {
    pub const FILE_REGISTER: RecordType = RecordType(2);
    pub const TXN_REGOP: RecordType = RecordType(6);
    pub const TXN_CKP: RecordType = RecordType(7);
    pub const TXN_CHILD: RecordType = RecordType(8);
    pub const TXN_PREPARE: RecordType = RecordType(9);
    pub const COUNT_ADJUST: RecordType = RecordType(50);
    pub const LEAF_INSERT: RecordType = RecordType(51);
    pub const LEAF_DELETE: RecordType = RecordType(52);

    /// First tag owned by the transaction subsystem. Everything below
    /// describes the environment (open files) rather than work.
    pub const TXN_BEGIN: RecordType = RecordType(6);

    /// Reads the tag of an encoded record.
    pub fn of(record: &[u8]) -> Result<RecordType> {
        if record.len() < 4 {
            return Err(QuireError::LogCorrupted {
                lsn: Lsn::ZERO,
                reason: format!("record of {} bytes has no type tag", record.len()),
            });
        }
        Ok(RecordType(u32::from_le_bytes([
            record[0], record[1], record[2], record[3],
        ])))
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            RecordType::FILE_REGISTER => "file_register",
            RecordType::TXN_REGOP => "txn_regop",
            RecordType::TXN_CKP => "txn_ckp",
            RecordType::TXN_CHILD => "txn_child",
            RecordType::TXN_PREPARE => "txn_prepare",
            RecordType::COUNT_ADJUST => "count_adjust",
            RecordType::LEAF_INSERT => "leaf_insert",
            RecordType::LEAF_DELETE => "leaf_delete",
            RecordType(other) => return write!(f, "rectype({other})"),
        };
        f.write_str(name)
    }
}

/// Size of the common prefix: type, transaction id, previous LSN.
pub const RECORD_HEADER_SIZE: usize = 16;

/// A subtree count change on one internal page entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountAdjust {
    pub page_id: PageId,
    /// Page LSN before the change
    pub page_lsn: Lsn,
    pub indx: u16,
    pub adjust: i32,
    /// The page is the root, so its whole-tree total moved too
    pub root: bool,
}

/// A leaf slot that was inserted or removed, with its full contents so the
/// change can be replayed in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafItem {
    pub page_id: PageId,
    /// Page LSN before the change
    pub page_lsn: Lsn,
    pub indx: u16,
    /// Page type byte of the leaf
    pub page_type: u8,
    /// The delete only set the slot's deleted flag
    pub logical: bool,
    pub key: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordBody {
    FileRegister { file_id: u32, name: String },
    Commit { timestamp: u64 },
    Checkpoint { ckp_lsn: Lsn, last_ckp: Lsn, timestamp: u64 },
    ChildCommit { parent: TxnId },
    Prepare,
    CountAdjust(CountAdjust),
    LeafInsert(LeafItem),
    LeafDelete(LeafItem),
}

impl RecordBody {
    pub fn record_type(&self) -> RecordType {
        match self {
            RecordBody::FileRegister { .. } => RecordType::FILE_REGISTER,
            RecordBody::Commit { .. } => RecordType::TXN_REGOP,
            RecordBody::Checkpoint { .. } => RecordType::TXN_CKP,
            RecordBody::ChildCommit { .. } => RecordType::TXN_CHILD,
            RecordBody::Prepare => RecordType::TXN_PREPARE,
            RecordBody::CountAdjust(_) => RecordType::COUNT_ADJUST,
            RecordBody::LeafInsert(_) => RecordType::LEAF_INSERT,
            RecordBody::LeafDelete(_) => RecordType::LEAF_DELETE,
        }
    }
}

/// A decoded log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Writing transaction, `TxnId::NONE` outside any transaction
    pub txn_id: TxnId,
    /// Previous record written by the same transaction
    pub prev_lsn: Lsn,
    pub body: RecordBody,
}

impl LogRecord {
    pub fn new(txn_id: TxnId, prev_lsn: Lsn, body: RecordBody) -> Self {
        Self {
            txn_id,
            prev_lsn,
            body,
        }
    }

    pub fn record_type(&self) -> RecordType {
        self.body.record_type()
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u32_le(self.record_type().as_u32());
        buf.put_u32_le(self.txn_id.as_u32());
        buf.put_u64_le(self.prev_lsn.as_u64());

        match &self.body {
            RecordBody::FileRegister { file_id, name } => {
                buf.put_u32_le(*file_id);
                put_bytes(&mut buf, name.as_bytes());
            }
            RecordBody::Commit { timestamp } => buf.put_u64_le(*timestamp),
            RecordBody::Checkpoint {
                ckp_lsn,
                last_ckp,
                timestamp,
            } => {
                buf.put_u64_le(ckp_lsn.as_u64());
                buf.put_u64_le(last_ckp.as_u64());
                buf.put_u64_le(*timestamp);
            }
            RecordBody::ChildCommit { parent } => buf.put_u32_le(parent.as_u32()),
            RecordBody::Prepare => {}
            RecordBody::CountAdjust(adj) => {
                buf.put_u32_le(adj.page_id.as_u32());
                buf.put_u64_le(adj.page_lsn.as_u64());
                buf.put_u16_le(adj.indx);
                buf.put_i32_le(adj.adjust);
                buf.put_u8(u8::from(adj.root));
            }
            RecordBody::LeafInsert(item) | RecordBody::LeafDelete(item) => {
                buf.put_u32_le(item.page_id.as_u32());
                buf.put_u64_le(item.page_lsn.as_u64());
                buf.put_u16_le(item.indx);
                buf.put_u8(item.page_type);
                buf.put_u8(u8::from(item.logical));
                put_bytes(&mut buf, &item.key);
                put_bytes(&mut buf, &item.data);
            }
        }
        buf.freeze()
    }

    /// Decodes a record read from `lsn`.
    pub fn decode(lsn: Lsn, record: &[u8]) -> Result<Self> {
        let mut r = Reader { buf: record, lsn };
        let rectype = RecordType(r.u32()?);
        let txn_id = TxnId::new(r.u32()?);
        let prev_lsn = Lsn::new(r.u64()?);

        let body = match rectype {
            RecordType::FILE_REGISTER => {
                let file_id = r.u32()?;
                let name = String::from_utf8(r.bytes()?).map_err(|_| QuireError::LogCorrupted {
                    lsn,
                    reason: "file name is not UTF-8".to_string(),
                })?;
                RecordBody::FileRegister { file_id, name }
            }
            RecordType::TXN_REGOP => RecordBody::Commit {
                timestamp: r.u64()?,
            },
            RecordType::TXN_CKP => RecordBody::Checkpoint {
                ckp_lsn: Lsn::new(r.u64()?),
                last_ckp: Lsn::new(r.u64()?),
                timestamp: r.u64()?,
            },
            RecordType::TXN_CHILD => RecordBody::ChildCommit {
                parent: TxnId::new(r.u32()?),
            },
            RecordType::TXN_PREPARE => RecordBody::Prepare,
            RecordType::COUNT_ADJUST => RecordBody::CountAdjust(CountAdjust {
                page_id: PageId::new(r.u32()?),
                page_lsn: Lsn::new(r.u64()?),
                indx: r.u16()?,
                adjust: r.i32()?,
                root: r.u8()? != 0,
            }),
            RecordType::LEAF_INSERT | RecordType::LEAF_DELETE => {
                let item = LeafItem {
                    page_id: PageId::new(r.u32()?),
                    page_lsn: Lsn::new(r.u64()?),
                    indx: r.u16()?,
                    page_type: r.u8()?,
                    logical: r.u8()? != 0,
                    key: r.bytes()?,
                    data: r.bytes()?,
                };
                if rectype == RecordType::LEAF_INSERT {
                    RecordBody::LeafInsert(item)
                } else {
                    RecordBody::LeafDelete(item)
                }
            }
            RecordType(other) => return Err(QuireError::UnknownRecordType(other)),
        };

        Ok(Self {
            txn_id,
            prev_lsn,
            body,
        })
    }
}

fn put_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_u32_le(bytes.len() as u32);
    buf.put_slice(bytes);
}

struct Reader<'a> {
    buf: &'a [u8],
    lsn: Lsn,
}

impl Reader<'_> {
    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(QuireError::LogCorrupted {
                lsn: self.lsn,
                reason: format!("truncated record: need {n} bytes, have {}", self.buf.remaining()),
            });
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    fn u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    fn i32(&mut self) -> Result<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    fn u64(&mut self) -> Result<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.u32()? as usize;
        self.need(len)?;
        let out = self.buf[..len].to_vec();
        self.buf.advance(len);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_adjust_encoding() {
        let record = LogRecord::new(
            TxnId::new(0x8000_0001),
            Lsn::new(40),
            RecordBody::CountAdjust(CountAdjust {
                page_id: PageId::new(3),
                page_lsn: Lsn::new(24),
                indx: 2,
                adjust: -1,
                root: true,
            }),
        );
        let bytes = record.encode();
        assert_eq!(RecordType::of(&bytes).unwrap(), RecordType::COUNT_ADJUST);
        assert_eq!(LogRecord::decode(Lsn::new(64), &bytes).unwrap(), record);
    }

    #[test]
    fn test_leaf_item_encoding() {
        let record = LogRecord::new(
            TxnId::new(0x8000_0002),
            Lsn::ZERO,
            RecordBody::LeafDelete(LeafItem {
                page_id: PageId::new(9),
                page_lsn: Lsn::new(100),
                indx: 0,
                page_type: 5,
                logical: true,
                key: b"k".to_vec(),
                data: b"value".to_vec(),
            }),
        );
        let decoded = LogRecord::decode(Lsn::new(1), &record.encode()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_truncated_record_is_corruption() {
        let record = LogRecord::new(
            TxnId::NONE,
            Lsn::ZERO,
            RecordBody::Checkpoint {
                ckp_lsn: Lsn::new(8),
                last_ckp: Lsn::ZERO,
                timestamp: 0,
            },
        );
        let bytes = record.encode();
        let err = LogRecord::decode(Lsn::new(8), &bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, QuireError::LogCorrupted { .. }));
    }

    #[test]
    fn test_unknown_record_type() {
        let mut bytes = vec![0u8; RECORD_HEADER_SIZE];
        bytes[0] = 200;
        assert!(matches!(
            LogRecord::decode(Lsn::new(8), &bytes),
            Err(QuireError::UnknownRecordType(200))
        ));
        assert_eq!(RecordType(200).to_string(), "rectype(200)");
    }
}
