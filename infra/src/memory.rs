use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use err_derive::Error;
use log::*;

use crate::persistence::{DuplicateTitle, Record, Storage};

#[derive(Debug, Clone, Error)]
#[error(display = "in-memory drink table poisoned")]
pub struct Poisoned;

#[derive(Debug)]
struct Table {
    next_id: i32,
    rows: BTreeMap<i32, Record>,
}

/// Pool-compatible storage that keeps the drink table in process memory.
/// Every connection handed out by one manager shares the same table.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnectionManager {
    table: Arc<Mutex<Table>>,
}

#[derive(Debug)]
pub struct MemoryDrinks {
    table: Arc<Mutex<Table>>,
}

impl Default for Table {
    fn default() -> Self {
        Table {
            next_id: 1,
            rows: BTreeMap::new(),
        }
    }
}

impl Table {
    fn title_taken(&self, title: &str, except: Option<i32>) -> bool {
        self.rows
            .values()
            .any(|r| r.title == title && Some(r.id) != except)
    }
}

impl r2d2::ManageConnection for MemoryConnectionManager {
    type Connection = MemoryDrinks;
    type Error = Poisoned;

    fn connect(&self) -> Result<MemoryDrinks, Poisoned> {
        let table = self.table.clone();
        Ok(MemoryDrinks { table })
    }

    fn is_valid(&self, conn: &mut MemoryDrinks) -> Result<(), Poisoned> {
        conn.table.lock().map(|_| ()).map_err(|_| Poisoned)
    }

    fn has_broken(&self, conn: &mut MemoryDrinks) -> bool {
        conn.table.is_poisoned()
    }
}

impl MemoryDrinks {
    fn table(&self) -> Result<MutexGuard<'_, Table>, Poisoned> {
        self.table.lock().map_err(|_| Poisoned)
    }
}

impl Storage for MemoryDrinks {
    fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        *self.table()? = Table::default();
        info!("Recreated in-memory drink table");
        Ok(())
    }

    fn list(&mut self) -> Result<Vec<Record>> {
        Ok(self.table()?.rows.values().cloned().collect())
    }

    fn load(&mut self, id: i32) -> Result<Option<Record>> {
        Ok(self.table()?.rows.get(&id).cloned())
    }

    fn insert(&mut self, title: &str, recipe: &str) -> Result<Record> {
        let mut table = self.table()?;
        if table.title_taken(title, None) {
            return Err(DuplicateTitle(title.to_string()).into());
        }
        let id = table.next_id;
        table.next_id += 1;
        let record = Record {
            id,
            title: title.to_string(),
            recipe: recipe.to_string(),
        };
        table.rows.insert(id, record.clone());
        debug!("Inserted {:?}", record);
        Ok(record)
    }

    fn update(
        &mut self,
        id: i32,
        title: Option<&str>,
        recipe: Option<&str>,
    ) -> Result<Option<Record>> {
        let mut table = self.table()?;
        if let Some(title) = title {
            if table.title_taken(title, Some(id)) && table.rows.contains_key(&id) {
                return Err(DuplicateTitle(title.to_string()).into());
            }
        }
        let record = match table.rows.get_mut(&id) {
            Some(record) => record,
            None => return Ok(None),
        };
        if let Some(title) = title {
            record.title = title.to_string();
        }
        if let Some(recipe) = recipe {
            record.recipe = recipe.to_string();
        }
        Ok(Some(record.clone()))
    }

    fn delete(&mut self, id: i32) -> Result<bool> {
        Ok(self.table()?.rows.remove(&id).is_some())
    }
}
