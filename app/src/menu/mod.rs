mod models;
mod resources;

use infra::ids::Id;

use crate::services::Request;

pub use self::models::{
    Drink, Ingredient, LongDrink, MenuError, Recipe, RecipeError, RecipeInput, ShortDrink,
    MAX_TITLE_CHARS,
};
pub use self::resources::Menu;

/// Title and recipe of the drink every fresh menu starts with.
pub const SEED_TITLE: &str = "esspresso";
pub const SEED_RECIPE: &str = r#"[{"name": "esspresso", "color": "brown", "parts": 1}]"#;

/// Every drink on the menu, in id order.
#[derive(Debug, Clone, Copy)]
pub struct ShowMenu;

/// A single drink; `None` when there is no such drink.
#[derive(Debug, Clone, Copy)]
pub struct ShowDrink {
    pub id: Id<Drink>,
}

#[derive(Debug, Clone)]
pub struct AddDrink {
    pub title: String,
    pub recipe: Recipe,
}

/// Replaces whichever of title and recipe are given. Responds with `None`
/// when there is no such drink.
#[derive(Debug, Clone)]
pub struct EditDrink {
    pub id: Id<Drink>,
    pub title: Option<String>,
    pub recipe: Option<Recipe>,
}

/// Responds with whether the drink existed.
#[derive(Debug, Clone, Copy)]
pub struct RemoveDrink {
    pub id: Id<Drink>,
}

impl Request for ShowMenu {
    type Resp = Vec<Drink>;
}

impl Request for ShowDrink {
    type Resp = Option<Drink>;
}

impl Request for AddDrink {
    type Resp = Drink;
}

impl Request for EditDrink {
    type Resp = Option<Drink>;
}

impl Request for RemoveDrink {
    type Resp = bool;
}
