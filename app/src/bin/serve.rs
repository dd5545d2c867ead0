use std::net::SocketAddr;
use std::path::PathBuf;

use actix_web::{middleware::Logger, App, HttpServer};
use anyhow::{Context, Result};
use log::*;
use serde::Deserialize;
use structopt::StructOpt;

use coffeeshop::config::{self, EnvLogger, Overrides};
use coffeeshop::CoffeeShop;
use infra::pg::DrinkConnectionManager;

#[derive(Debug, StructOpt)]
#[structopt(name = "serve", about = "Serve the coffee shop menu.")]
struct Opt {
    /// Config file
    #[structopt(parse(from_os_str))]
    config: PathBuf,
}

#[derive(Deserialize, Debug)]
struct Config {
    #[serde(flatten)]
    coffeeshop: config::Config,
    listener: Listener,
    #[serde(default)]
    env_logger: EnvLogger,
}

#[derive(Deserialize, Debug)]
struct Listener {
    addr: SocketAddr,
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    let mut config: Config = config::load(&opt.config)?;
    config.env_logger.builder().init();
    debug!("Options: {:?}", opt);

    let overrides = Overrides::from_env()?;
    overrides.apply(&mut config.coffeeshop);
    if let Some(addr) = overrides.listen_addr {
        config.listener.addr = addr;
    }

    // Fetched before the runtime starts; the client blocks.
    let keys = config.coffeeshop.auth.key_set().context("load signing keys")?;

    let shop = CoffeeShop::new(&config.coffeeshop, keys)?;
    shop.setup(&config.coffeeshop.bootstrap)
        .context("bootstrap menu")?;

    actix_web::rt::System::new().block_on(serve(shop, config.listener.addr))?;
    Ok(())
}

async fn serve(shop: CoffeeShop<DrinkConnectionManager>, addr: SocketAddr) -> Result<()> {
    let srv = HttpServer::new(move || {
        let shop = shop.clone();
        App::new()
            .wrap(Logger::default())
            .configure(move |cfg| shop.configure(cfg))
    })
    .bind(addr)
    .context("bind")?;
    info!("Listening on: {:?}", srv.addrs());
    srv.run().await?;
    Ok(())
}
