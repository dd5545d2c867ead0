use anyhow::{Context, Result};
use log::*;
use postgres::error::SqlState;
use postgres::{Client, NoTls, Row};
use r2d2_postgres::PostgresConnectionManager;

use crate::persistence::{DuplicateTitle, Record, Storage};

const SETUP_SQL: &str = include_str!("persistence.sql");
const DROP_SQL: &str = "DROP TABLE IF EXISTS drink";
const LIST_SQL: &str = "SELECT id, title, recipe FROM drink ORDER BY id";
const LOAD_SQL: &str = "SELECT id, title, recipe FROM drink WHERE id = $1";
const INSERT_SQL: &str = "INSERT INTO drink (title, recipe) VALUES ($1, $2) \
                          RETURNING id, title, recipe";
const UPDATE_SQL: &str = "UPDATE drink \
                          SET title = COALESCE($2, title), recipe = COALESCE($3, recipe) \
                          WHERE id = $1 \
                          RETURNING id, title, recipe";
const DELETE_SQL: &str = "DELETE FROM drink WHERE id = $1";

/// Hands out [`Drinks`] connections to an `r2d2` pool.
#[derive(Debug)]
pub struct DrinkConnectionManager {
    inner: PostgresConnectionManager<NoTls>,
}

/// A postgres connection that speaks [`Storage`].
pub struct Drinks(Client);

impl DrinkConnectionManager {
    pub fn new(url: &str) -> Result<Self> {
        let config = url
            .parse::<postgres::Config>()
            .context("parse postgres url")?;
        let inner = PostgresConnectionManager::new(config, NoTls);
        Ok(DrinkConnectionManager { inner })
    }
}

impl r2d2::ManageConnection for DrinkConnectionManager {
    type Connection = Drinks;
    type Error = postgres::Error;

    fn connect(&self) -> Result<Drinks, postgres::Error> {
        self.inner.connect().map(Drinks)
    }

    fn is_valid(&self, conn: &mut Drinks) -> Result<(), postgres::Error> {
        self.inner.is_valid(&mut conn.0)
    }

    fn has_broken(&self, conn: &mut Drinks) -> bool {
        self.inner.has_broken(&mut conn.0)
    }
}

impl Drinks {
    pub fn client(&mut self) -> &mut Client {
        &mut self.0
    }
}

fn record(row: &Row) -> Result<Record> {
    Ok(Record {
        id: row.try_get(0)?,
        title: row.try_get(1)?,
        recipe: row.try_get(2)?,
    })
}

fn classify(err: postgres::Error, title: Option<&str>) -> anyhow::Error {
    match title {
        Some(title) if err.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
            warn!("Rejected duplicate title {:?}", title);
            DuplicateTitle(title.to_string()).into()
        }
        _ => err.into(),
    }
}

impl Storage for Drinks {
    fn setup(&mut self) -> Result<()> {
        self.0.batch_execute(SETUP_SQL).context("create drink table")?;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        let mut t = self.0.transaction()?;
        t.batch_execute(DROP_SQL).context("drop drink table")?;
        t.batch_execute(SETUP_SQL).context("create drink table")?;
        t.commit()?;
        info!("Recreated drink table");
        Ok(())
    }

    fn list(&mut self) -> Result<Vec<Record>> {
        let rows = self.0.query(LIST_SQL, &[]).context("list drinks")?;
        rows.iter().map(record).collect()
    }

    fn load(&mut self, id: i32) -> Result<Option<Record>> {
        let row = self.0.query_opt(LOAD_SQL, &[&id]).context("load drink")?;
        let res = row.as_ref().map(record).transpose()?;
        debug!("Load {} -> {:?}", id, res);
        Ok(res)
    }

    fn insert(&mut self, title: &str, recipe: &str) -> Result<Record> {
        let row = self
            .0
            .query_one(INSERT_SQL, &[&title, &recipe])
            .map_err(|e| classify(e, Some(title)))?;
        let res = record(&row)?;
        debug!("Inserted {:?}", res);
        Ok(res)
    }

    fn update(
        &mut self,
        id: i32,
        title: Option<&str>,
        recipe: Option<&str>,
    ) -> Result<Option<Record>> {
        let row = self
            .0
            .query_opt(UPDATE_SQL, &[&id, &title, &recipe])
            .map_err(|e| classify(e, title))?;
        let res = row.as_ref().map(record).transpose()?;
        debug!("Updated {} -> {:?}", id, res);
        Ok(res)
    }

    fn delete(&mut self, id: i32) -> Result<bool> {
        let nrows = self.0.execute(DELETE_SQL, &[&id]).context("delete drink")?;
        debug!("Delete {} modified {} rows", id, nrows);
        Ok(nrows == 1)
    }
}
