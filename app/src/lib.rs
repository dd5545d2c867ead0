use std::sync::Arc;

use actix_web::web;
use anyhow::Result;
use log::*;
use r2d2::Pool;

use infra::persistence::Storage;
use infra::pg::DrinkConnectionManager;

pub mod auth;
pub mod config;
pub mod errors;
pub mod menu;
pub mod services;

/// The application context: one per process, cloned into every worker.
pub struct CoffeeShop<M: r2d2::ManageConnection> {
    menu: menu::Menu<M>,
}

impl CoffeeShop<DrinkConnectionManager> {
    pub fn new(config: &config::Config, keys: auth::KeySet) -> Result<Self> {
        let db = config.postgres.build()?;
        let verifier = config.auth.verifier(keys);
        Ok(CoffeeShop::with_pool(db, verifier))
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> CoffeeShop<M> {
    pub fn with_pool(db: Pool<M>, verifier: auth::Verifier) -> Self {
        let menu = menu::Menu::new(db, Arc::new(verifier));
        CoffeeShop { menu }
    }

    pub fn setup(&self, bootstrap: &config::Bootstrap) -> Result<()> {
        debug!("Init schema: {:?}", bootstrap);
        self.menu.setup(bootstrap)
    }

    pub fn menu(&self) -> &menu::Menu<M> {
        &self.menu
    }

    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        info!("Opening the coffee shop");

        cfg.app_data(errors::path_config());
        self.menu.configure(cfg);
        cfg.default_service(web::to(errors::not_found));
    }
}

impl<M: r2d2::ManageConnection> Clone for CoffeeShop<M> {
    fn clone(&self) -> Self {
        let menu = self.menu.clone();
        CoffeeShop { menu }
    }
}
