//! Ledger replay: parsing exported records and folding rollbacks into the set of active
//! transactions.
//!
//! A record is one line of `;`-separated fields in fixed positions:
//!
//! | idx | field |
//! |-----|-------|
//! | 0 | rollback marker (`-1` for a rollback) |
//! | 1 | nested transaction id |
//! | 2 | type |
//! | 3 | signature (base58) |
//! | 4 | version |
//! | 5 | timestamp |
//! | 6 | sender public key (base58) |
//! | 7 | fee |
//! | 8 | fee asset id |
//! | 9 | params, JSON array of data entries |
//! | 10 | diff, JSON array of data entries |
//! | 11 | extra, JSON object |
//!
//! The three JSON fields are read as consecutive JSON values, so a `;` inside a JSON string
//! does not split the record.
use crate::error::{AuditError, EncodingError, Result};
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use serde_json::Value;
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};
use tracing::{debug, info};

pub const ROLLBACK_MARKER: &str = "-1";

/// Operation assumed when a transaction's params carry none
pub const DEFAULT_OPERATION: &str = "createContract";

pub const VOTE_OPERATION: &str = "vote";

/// Operations whose diffs make up the contract state. Votes write per-voter entries that the
/// audit does not need and are left out.
pub const STATE_OPERATIONS: &[&str] = &[
    "createContract",
    "addMainKey",
    "addDKGKey",
    "addCommissionKey",
    "startVoting",
    "updateList",
    "finishVoting",
    "decryption",
    "commissionDecryption",
    "results",
];

const PLAIN_FIELDS: usize = 9;
const JSON_FIELDS: usize = 3;

/// Value of a contract data entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataValue {
    Int(i64),
    Bool(bool),
    Binary(Vec<u8>),
    String(String),
}

impl DataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(value) => Some(value),
            _ => None,
        }
    }
}

/// Data entry as it appears in the exported JSON
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDataEntry {
    key: String,
    string_value: Option<String>,
    binary_value: Option<String>,
    int_value: Option<Value>,
    bool_value: Option<bool>,
}

impl RawDataEntry {
    /// The first populated of string, binary, int and bool wins; an entry with none of them
    /// is an empty string
    fn into_entry(self) -> std::result::Result<(String, DataValue), String> {
        let value = match (self.string_value, self.binary_value, self.int_value, self.bool_value) {
            (Some(text), _, _, _) if !text.is_empty() => DataValue::String(text),
            (_, Some(binary), _, _) if !binary.is_empty() => {
                let encoded = binary.strip_prefix("base64:").unwrap_or(&binary);
                let bytes = general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(|e| format!("entry {}: {}", self.key, e))?;
                DataValue::Binary(bytes)
            }
            (_, _, Some(int), _) if !int.is_null() => DataValue::Int(parse_int(&int)
                .ok_or_else(|| format!("entry {}: bad integer {}", self.key, int))?),
            (_, _, _, Some(flag)) => DataValue::Bool(flag),
            _ => DataValue::String(String::new()),
        };
        return Ok((self.key, value));
    }
}

fn parse_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

/// A contract call as recorded on the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: String,
    pub tx_type: u8,
    pub version: u8,
    pub timestamp: u64,
    pub sender_public_key: String,
    pub fee: u64,
    pub fee_asset_id: String,
    pub signature: String,
    pub params: Vec<(String, DataValue)>,
    pub diff: Vec<(String, DataValue)>,
    pub extra: Value,
    pub operation: String,
    pub contract_id: String,
    pub valid: bool,
}

impl Transaction {
    /// Look up a call parameter; a repeated key resolves to its last occurrence
    pub fn get_param(&self, key: &str) -> Option<&DataValue> {
        return self
            .params
            .iter()
            .rev()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value);
    }

    pub fn is_vote(&self) -> bool {
        return self.operation == VOTE_OPERATION;
    }

    pub fn is_state_relevant(&self) -> bool {
        return STATE_OPERATIONS.contains(&self.operation.as_str());
    }

    /// The bytes covered by the sender's signature:
    ///
    /// type:u8 || version:u8 || sender key || len16(contract id) || count16(params) || params
    /// || fee:u64 || timestamp:u64 || fee asset (0 | 1 || id)
    ///
    /// with every integer big-endian and each param written as len16(key) || tag || value.
    pub fn body_bytes(&self) -> std::result::Result<Vec<u8>, EncodingError> {
        let sender = decode_base58(&self.sender_public_key)?;
        let contract = decode_base58(&self.contract_id)?;

        let mut out = vec![self.tx_type, self.version];
        out.extend_from_slice(&sender);
        out.extend_from_slice(&prefix16("contract id", contract.len())?);
        out.extend_from_slice(&contract);
        out.extend_from_slice(&prefix16("parameter list", self.params.len())?);
        for (key, value) in &self.params {
            out.extend_from_slice(&prefix16("parameter key", key.len())?);
            out.extend_from_slice(key.as_bytes());
            match value {
                DataValue::Int(int) => {
                    out.push(0);
                    out.extend_from_slice(&int.to_be_bytes());
                }
                DataValue::Bool(flag) => {
                    out.push(1);
                    out.push(*flag as u8);
                }
                DataValue::Binary(bytes) => {
                    out.push(2);
                    out.extend_from_slice(&prefix32("binary value", bytes.len())?);
                    out.extend_from_slice(bytes);
                }
                DataValue::String(text) => {
                    out.push(3);
                    out.extend_from_slice(&prefix32("string value", text.len())?);
                    out.extend_from_slice(text.as_bytes());
                }
            }
        }
        out.extend_from_slice(&self.fee.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        if self.fee_asset_id.is_empty() {
            out.push(0);
        } else {
            out.push(1);
            out.extend_from_slice(&decode_base58(&self.fee_asset_id)?);
        }
        return Ok(out);
    }
}

fn prefix16(what: &'static str, len: usize) -> std::result::Result<[u8; 2], EncodingError> {
    return u16::try_from(len)
        .map(u16::to_be_bytes)
        .map_err(|_| EncodingError::TooLong(what, len));
}

fn prefix32(what: &'static str, len: usize) -> std::result::Result<[u8; 4], EncodingError> {
    return u32::try_from(len)
        .map(u32::to_be_bytes)
        .map_err(|_| EncodingError::TooLong(what, len));
}

fn decode_base58(encoded: &str) -> std::result::Result<Vec<u8>, EncodingError> {
    return bs58::decode(encoded)
        .into_vec()
        .map_err(|e| EncodingError::Base58(e.to_string()));
}

/// One parsed ledger line
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Transaction(Transaction),
    Rollback { id: String },
}

impl Record {
    /// Parse one exported line. Errors carry only the reason; the caller knows the position.
    pub fn parse(line: &str, contract_id: &str) -> std::result::Result<Self, String> {
        let mut fields = line.splitn(PLAIN_FIELDS + 1, ';');
        let mut plain: Vec<&str> = Vec::with_capacity(PLAIN_FIELDS);
        for _ in 0..PLAIN_FIELDS {
            plain.push(fields.next().unwrap_or(""));
        }
        if plain[0] == ROLLBACK_MARKER {
            if plain[1].is_empty() {
                return Err("rollback without transaction id".to_string());
            }
            return Ok(Self::Rollback {
                id: plain[1].to_string(),
            });
        }

        let rest = fields
            .next()
            .ok_or_else(|| format!("expected {} fields", PLAIN_FIELDS + JSON_FIELDS))?;
        let json = split_json_fields(rest)?;
        let params = parse_entries(&json[0]).map_err(|e| format!("params: {}", e))?;
        let diff = parse_entries(&json[1]).map_err(|e| format!("diff: {}", e))?;

        let operation = params
            .iter()
            .rev()
            .find(|(key, _)| key == "operation")
            .and_then(|(_, value)| value.as_str())
            .filter(|operation| !operation.is_empty())
            .unwrap_or(DEFAULT_OPERATION)
            .to_string();

        return Ok(Self::Transaction(Transaction {
            id: plain[1].to_string(),
            tx_type: parse_number(plain[2], "type")?,
            signature: plain[3].to_string(),
            version: parse_number(plain[4], "version")?,
            timestamp: parse_number(plain[5], "timestamp")?,
            sender_public_key: plain[6].to_string(),
            fee: parse_number(plain[7], "fee")?,
            fee_asset_id: plain[8].to_string(),
            params,
            diff,
            extra: json[2].clone(),
            operation,
            contract_id: contract_id.to_string(),
            valid: false,
        }));
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, name: &str) -> std::result::Result<T, String> {
    return field
        .trim()
        .parse()
        .map_err(|_| format!("{} is not a number: {:?}", name, field));
}

/// Read params, diff and extra as three JSON values separated by `;`
fn split_json_fields(rest: &str) -> std::result::Result<Vec<Value>, String> {
    let mut values = Vec::with_capacity(JSON_FIELDS);
    let mut remaining = rest.trim_end();
    while values.len() < JSON_FIELDS {
        let mut stream = serde_json::Deserializer::from_str(remaining).into_iter::<Value>();
        let value = match stream.next() {
            Some(Ok(value)) => value,
            Some(Err(e)) => return Err(format!("JSON field {}: {}", PLAIN_FIELDS + values.len(), e)),
            None => return Err(format!("missing JSON field {}", PLAIN_FIELDS + values.len())),
        };
        let consumed = stream.byte_offset();
        values.push(value);
        remaining = remaining[consumed..].trim_start();
        if values.len() < JSON_FIELDS {
            remaining = remaining
                .strip_prefix(';')
                .ok_or_else(|| format!("expected ';' after JSON field {}", PLAIN_FIELDS + values.len() - 1))?;
        }
    }
    if !remaining.is_empty() {
        return Err(format!("trailing data after extra: {:?}", remaining));
    }
    return Ok(values);
}

fn parse_entries(value: &Value) -> std::result::Result<Vec<(String, DataValue)>, String> {
    let raw: Vec<RawDataEntry> =
        serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
    return raw.into_iter().map(RawDataEntry::into_entry).collect();
}

/// The ordered buffer of transactions that survived every rollback seen so far
#[derive(Debug, Default, Clone)]
pub struct Ledger {
    active: Vec<Transaction>,
    rollbacks: usize,
}

impl Ledger {
    pub fn new() -> Self {
        return Self::default();
    }

    /// Apply a record. A rollback removes the earliest buffered transaction with its id and
    /// is a no-op if there is none.
    pub fn apply(&mut self, record: Record) {
        match record {
            Record::Transaction(tx) => self.active.push(tx),
            Record::Rollback { id } => {
                match self.active.iter().position(|tx| tx.id == id) {
                    Some(idx) => {
                        self.active.remove(idx);
                        self.rollbacks += 1;
                        debug!("{:>44}: transaction removed (rollback)", id);
                    }
                    None => debug!("{:>44}: rollback of unknown transaction ignored", id),
                }
            }
        }
    }

    /// Parse and apply every line of one export, in order. Blank lines are skipped; the first
    /// malformed line, invalid UTF-8 included, aborts with its position.
    pub fn ingest<R: BufRead>(
        &mut self,
        file: &str,
        mut reader: R,
        contract_id: &str,
    ) -> Result<()> {
        let parse_error = |line: usize, reason: String| AuditError::Parse {
            file: file.to_string(),
            line,
            reason,
        };
        let mut buf = Vec::new();
        let mut line_no = 0;
        loop {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf).map_err(|e| AuditError::Io {
                path: file.to_string(),
                reason: e.to_string(),
            })?;
            if read == 0 {
                break;
            }
            line_no += 1;
            let line = std::str::from_utf8(&buf)
                .map_err(|e| parse_error(line_no, format!("invalid UTF-8: {}", e)))?
                .trim_end_matches(|c| c == '\n' || c == '\r');
            if line.trim().is_empty() {
                continue;
            }
            let record =
                Record::parse(line, contract_id).map_err(|reason| parse_error(line_no, reason))?;
            self.apply(record);
        }
        return Ok(());
    }

    pub fn get_active(&self) -> &[Transaction] {
        &self.active
    }

    pub fn get_rollbacks(&self) -> usize {
        self.rollbacks
    }

    pub fn into_active(self) -> Vec<Transaction> {
        self.active
    }
}

/// A directory of ledger exports (`*.csv`), visited in sorted path order
#[derive(Debug, Clone)]
pub struct LedgerSource {
    files: Vec<PathBuf>,
}

impl LedgerSource {
    pub fn new(files: Vec<PathBuf>) -> Self {
        return Self { files };
    }

    pub fn from_dir(dir: &Path) -> Result<Self> {
        let io_error = |e: std::io::Error| AuditError::Io {
            path: dir.display().to_string(),
            reason: e.to_string(),
        };
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.is_file() && path.extension().map_or(false, |ext| ext == "csv") {
                files.push(path);
            }
        }
        files.sort();
        return Ok(Self::new(files));
    }

    pub fn get_files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Replay every file, one fully before the next
    pub fn replay(&self, contract_id: &str) -> Result<Ledger> {
        let mut ledger = Ledger::new();
        for path in &self.files {
            let name = path.display().to_string();
            let file = File::open(path).map_err(|e| AuditError::Io {
                path: name.clone(),
                reason: e.to_string(),
            })?;
            ledger.ingest(&name, BufReader::new(file), contract_id)?;
        }
        info!(
            "replayed {} files: {} active transactions, {} rollbacks",
            self.files.len(),
            ledger.get_active().len(),
            ledger.get_rollbacks()
        );
        return Ok(ledger);
    }
}
