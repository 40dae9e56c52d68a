//! sled-backed NodeLinkStore.
//!
//! Each link is written twice in one transaction: under an outgoing key
//! `o | type | source` and an incoming key `i | type | destination`, so both
//! ends resolve with a point lookup.

use super::{LinkType, NodeLink, NodeLinkStore};
use crate::error::StorageError;
use crate::types::NodeId;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use std::path::Path;
use tracing::debug;

const OUTGOING: u8 = b'o';
const INCOMING: u8 = b'i';

fn key(direction: u8, link_type: LinkType, node_id: NodeId) -> [u8; 10] {
    let mut key = [0u8; 10];
    key[0] = direction;
    key[1] = link_type.tag();
    key[2..].copy_from_slice(&node_id.to_be_bytes());
    key
}

fn decode(bytes: &[u8]) -> Result<NodeLink, StorageError> {
    Ok(bincode::deserialize(bytes)?)
}

fn tx_get(
    tx: &TransactionalTree,
    key: &[u8],
) -> Result<Option<NodeLink>, ConflictableTransactionError<StorageError>> {
    match tx.get(key)? {
        Some(bytes) => decode(&bytes)
            .map(Some)
            .map_err(ConflictableTransactionError::Abort),
        None => Ok(None),
    }
}

fn tx_remove(
    tx: &TransactionalTree,
    link: &NodeLink,
) -> Result<(), ConflictableTransactionError<StorageError>> {
    tx.remove(&key(OUTGOING, link.link_type, link.source_id)[..])?;
    tx.remove(&key(INCOMING, link.link_type, link.destination_id)[..])?;
    Ok(())
}

fn map_tx_error(err: TransactionError<StorageError>) -> StorageError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => StorageError::from(e),
    }
}

/// Link store persisted in a sled tree
pub struct SledNodeLinkStore {
    tree: sled::Tree,
}

impl SledNodeLinkStore {
    const TREE_NAME: &'static str = "node_links";

    /// Open (or create) the store at `path`
    pub fn new(path: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(path)?;
        let db = sled::open(path)?;
        Self::from_db(&db)
    }

    /// Use an already opened database
    pub fn from_db(db: &sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            tree: db.open_tree(Self::TREE_NAME)?,
        })
    }

    /// Store that lives only as long as the process
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(&db)
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.tree.flush()?;
        Ok(())
    }
}

impl NodeLinkStore for SledNodeLinkStore {
    fn get_outgoing(
        &self,
        link_type: LinkType,
        source_id: NodeId,
    ) -> Result<Option<NodeLink>, StorageError> {
        match self.tree.get(key(OUTGOING, link_type, source_id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_incoming(
        &self,
        link_type: LinkType,
        destination_id: NodeId,
    ) -> Result<Option<NodeLink>, StorageError> {
        match self.tree.get(key(INCOMING, link_type, destination_id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn add(&self, link: &NodeLink) -> Result<Vec<NodeLink>, StorageError> {
        let value = bincode::serialize(link)?;
        let out_key = key(OUTGOING, link.link_type, link.source_id);
        let in_key = key(INCOMING, link.link_type, link.destination_id);

        let displaced = self
            .tree
            .transaction(|tx| {
                let mut displaced = Vec::new();
                if let Some(existing) = tx_get(tx, &out_key)? {
                    if existing != *link {
                        tx_remove(tx, &existing)?;
                        displaced.push(existing);
                    }
                }
                if let Some(existing) = tx_get(tx, &in_key)? {
                    if existing != *link && !displaced.contains(&existing) {
                        tx_remove(tx, &existing)?;
                        displaced.push(existing);
                    }
                }
                tx.insert(&out_key[..], value.as_slice())?;
                tx.insert(&in_key[..], value.as_slice())?;
                Ok(displaced)
            })
            .map_err(map_tx_error)?;

        debug!(
            source_id = link.source_id,
            destination_id = link.destination_id,
            displaced = displaced.len(),
            "Stored node link"
        );
        Ok(displaced)
    }

    fn delete(&self, link: &NodeLink) -> Result<bool, StorageError> {
        let out_key = key(OUTGOING, link.link_type, link.source_id);
        self.tree
            .transaction(|tx| match tx_get(tx, &out_key)? {
                Some(existing) if existing == *link => {
                    tx_remove(tx, link)?;
                    Ok(true)
                }
                _ => Ok(false),
            })
            .map_err(map_tx_error)
    }

    fn list(&self) -> Result<Vec<NodeLink>, StorageError> {
        let mut links = Vec::new();
        for entry in self.tree.scan_prefix([OUTGOING]) {
            let (_, bytes) = entry?;
            links.push(decode(&bytes)?);
        }
        Ok(links)
    }
}
