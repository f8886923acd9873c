//! JSON file order audit log.
//!
//! The file holds one pretty-printed JSON array of receipts. Each batch is
//! merged into the existing array, written to a temporary file beside the
//! log and renamed over it, so a failed write leaves the previous log intact.

use crate::domain::error::TradeloopError;
use crate::domain::order::OrderReceipt;
use crate::ports::audit_log_port::AuditLogPort;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

pub struct JsonAuditLog {
    path: PathBuf,
}

impl JsonAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, reason: impl std::fmt::Display) -> TradeloopError {
        TradeloopError::AuditLog {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Every recorded receipt, oldest first. A missing file is an empty log.
    pub fn read_all(&self) -> Result<Vec<OrderReceipt>, TradeloopError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| self.error(e))?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|e| self.error(e))
    }

    fn replace_contents(&self, body: &[u8]) -> Result<(), TradeloopError> {
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(|e| self.error(e))?;
                parent
            }
            None => Path::new("."),
        };
        let mut staged = NamedTempFile::new_in(dir).map_err(|e| self.error(e))?;
        staged.write_all(body).map_err(|e| self.error(e))?;
        staged.as_file().sync_all().map_err(|e| self.error(e))?;
        staged.persist(&self.path).map_err(|e| self.error(e.error))?;
        Ok(())
    }
}

impl AuditLogPort for JsonAuditLog {
    fn append_batch(&self, receipts: &[OrderReceipt]) -> Result<(), TradeloopError> {
        if receipts.is_empty() {
            return Ok(());
        }

        let mut recorded = self.read_all()?;
        let mut seen: HashSet<String> = recorded.iter().map(|r| r.order_id.clone()).collect();
        let before = recorded.len();
        for receipt in receipts {
            if seen.insert(receipt.order_id.clone()) {
                recorded.push(receipt.clone());
            }
        }
        let added = recorded.len() - before;
        if added == 0 {
            return Ok(());
        }

        let body = serde_json::to_string_pretty(&recorded).map_err(|e| self.error(e))?;
        self.replace_contents(body.as_bytes())?;

        debug!(path = %self.path.display(), added, total = recorded.len(), "audit log written");
        Ok(())
    }
}
