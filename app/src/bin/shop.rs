use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::Deserialize;
use structopt::StructOpt;

use coffeeshop::auth::KeySet;
use coffeeshop::config::{self, Bootstrap, EnvLogger, Overrides};
use coffeeshop::menu::{Drink, ShowDrink, ShowMenu};
use coffeeshop::services::Queryable;
use coffeeshop::CoffeeShop;
use infra::ids::Id;

#[derive(Debug, StructOpt)]
#[structopt(name = "shop", about = "Coffee shop menu administration")]
struct Opt {
    /// Config file
    #[structopt(parse(from_os_str))]
    config: PathBuf,
    #[structopt(subcommand)]
    command: Commands,
}

#[derive(Debug, StructOpt)]
enum Commands {
    #[structopt(name = "setup", about = "Create the drink table and seed the menu")]
    Setup,
    #[structopt(name = "reset", about = "Drop every drink and seed the menu afresh")]
    Reset,
    #[structopt(name = "show-menu", about = "Show menu, or a single drink on it")]
    ShowMenu {
        /// Drink id
        id: Option<Id<Drink>>,
    },
}

#[derive(Deserialize, Debug)]
struct Config {
    #[serde(flatten)]
    coffeeshop: config::Config,
    #[serde(default)]
    env_logger: EnvLogger,
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    let mut config: Config = config::load(&opt.config)?;
    config.env_logger.builder().init();
    Overrides::from_env()?.apply(&mut config.coffeeshop);

    // Nothing is served, so no tokens need checking.
    let shop = CoffeeShop::new(&config.coffeeshop, KeySet::default())?;

    match opt.command {
        Commands::Setup => {
            shop.setup(&Bootstrap {
                reset: false,
                seed: true,
            })?;
        }
        Commands::Reset => {
            shop.setup(&Bootstrap {
                reset: true,
                seed: true,
            })?;
        }
        Commands::ShowMenu { id: None } => {
            for drink in shop.menu().query(ShowMenu)? {
                print_drink(&drink);
            }
        }
        Commands::ShowMenu { id: Some(id) } => match shop.menu().query(ShowDrink { id })? {
            Some(drink) => print_drink(&drink),
            None => bail!("No drink {} on the menu", id),
        },
    }

    Ok(())
}

fn print_drink(drink: &Drink) {
    let parts = drink
        .recipe()
        .ingredients()
        .iter()
        .map(|i| format!("{}x{} ({})", i.parts, i.name, i.color))
        .collect::<Vec<_>>();
    println!("{}: {} [{}]", drink.id(), drink.title(), parts.join(", "));
}
