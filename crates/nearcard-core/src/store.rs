//! Contact store - persistence for accepted cards
//!
//! The coordinator only ever issues `upsert` calls, one per accepted
//! offer, sequentially. Conflicts resolve last-writer-wins: a re-accepted
//! identity simply overwrites the stored fields.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use crate::error::{CardError, CardResult};
use crate::types::{AcceptedContact, PeerIdentity};

/// Table for accepted contacts (key: identity string, value: serialized AcceptedContact)
const CONTACTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("contacts");

/// The single operation the coordinator needs from persistence
pub trait ContactStore: Send + 'static {
    /// Insert or overwrite the contact stored under its identity
    fn upsert(&self, contact: &AcceptedContact) -> CardResult<()>;
}

/// redb-backed contact store
#[derive(Clone)]
pub struct RedbContactStore {
    db: Arc<RwLock<Database>>,
}

impl RedbContactStore {
    /// Open (or create) the contact database at the given path
    pub fn open(path: impl AsRef<Path>) -> CardResult<Self> {
        let db = Database::create(path)?;

        // Make sure the table exists before any reads
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(CONTACTS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    /// Load a contact by identity. Returns `None` when absent.
    pub fn load(&self, identity: &PeerIdentity) -> CardResult<Option<AcceptedContact>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(CONTACTS_TABLE)?;

        match table.get(identity.as_str())? {
            Some(data) => {
                let contact: AcceptedContact = postcard::from_bytes(data.value())
                    .map_err(|e| CardError::Serialization(e.to_string()))?;
                Ok(Some(contact))
            }
            None => Ok(None),
        }
    }

    /// List all stored contacts
    pub fn list(&self) -> CardResult<Vec<AcceptedContact>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(CONTACTS_TABLE)?;

        let mut contacts = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let contact: AcceptedContact = postcard::from_bytes(value.value())
                .map_err(|e| CardError::Serialization(e.to_string()))?;
            contacts.push(contact);
        }
        Ok(contacts)
    }

    /// Delete a contact. `Ok(())` even when absent.
    pub fn remove(&self, identity: &PeerIdentity) -> CardResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(CONTACTS_TABLE)?;
            table.remove(identity.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

impl ContactStore for RedbContactStore {
    fn upsert(&self, contact: &AcceptedContact) -> CardResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(CONTACTS_TABLE)?;
            let serialized = postcard::to_allocvec(contact)
                .map_err(|e| CardError::Serialization(e.to_string()))?;
            table.insert(contact.identity.as_str(), serialized.as_slice())?;
        }
        write_txn.commit()?;
        debug!(identity = %contact.identity, "Contact upserted");
        Ok(())
    }
}

/// In-memory contact store for tests
#[derive(Clone, Default)]
pub struct MemoryContactStore {
    contacts: Arc<Mutex<HashMap<PeerIdentity, AcceptedContact>>>,
}

impl MemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, identity: &PeerIdentity) -> Option<AcceptedContact> {
        self.contacts.lock().get(identity).cloned()
    }

    pub fn len(&self) -> usize {
        self.contacts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.lock().is_empty()
    }
}

impl ContactStore for MemoryContactStore {
    fn upsert(&self, contact: &AcceptedContact) -> CardResult<()> {
        self.contacts
            .lock()
            .insert(contact.identity.clone(), contact.clone());
        Ok(())
    }
}
