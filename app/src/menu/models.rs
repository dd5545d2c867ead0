use err_derive::Error;
use serde::{Deserialize, Serialize};

use infra::ids::{Entity, Id};
use infra::persistence::Record;

pub const MAX_TITLE_CHARS: usize = 80;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Ingredient {
    pub name: String,
    pub color: String,
    pub parts: u32,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct Recipe(Vec<Ingredient>);

/// A recipe as clients send it: either a list of ingredients, or a lone
/// ingredient standing in for a list of one.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum RecipeInput {
    Many(Vec<Ingredient>),
    One(Ingredient),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drink {
    pub(crate) id: Id<Drink>,
    pub(crate) title: String,
    pub(crate) recipe: Recipe,
}

/// The public view of a drink; ingredient names are kept back.
#[derive(Serialize, Debug)]
pub struct ShortDrink<'a> {
    id: Id<Drink>,
    title: &'a str,
    recipe: Vec<ShortIngredient<'a>>,
}

#[derive(Serialize, Debug)]
pub struct ShortIngredient<'a> {
    color: &'a str,
    parts: u32,
}

#[derive(Serialize, Debug)]
pub struct LongDrink<'a> {
    id: Id<Drink>,
    title: &'a str,
    recipe: &'a Recipe,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MenuError {
    #[error(display = "title must be between 1 and 80 characters")]
    InvalidTitle,
    #[error(display = "ingredient {:?} needs at least one part", _0)]
    NoParts(String),
}

#[derive(Debug, Error)]
#[error(display = "stored recipe of drink {} is malformed", drink)]
pub struct RecipeError {
    drink: i32,
    #[error(source)]
    cause: serde_json::Error,
}

pub(crate) fn validate_title(title: &str) -> Result<(), MenuError> {
    let len = title.chars().count();
    if len == 0 || len > MAX_TITLE_CHARS {
        return Err(MenuError::InvalidTitle);
    }
    Ok(())
}

impl Recipe {
    pub fn new(ingredients: Vec<Ingredient>) -> Self {
        Recipe(ingredients)
    }

    pub fn ingredients(&self) -> &[Ingredient] {
        &self.0
    }

    pub(crate) fn validate(&self) -> Result<(), MenuError> {
        match self.0.iter().find(|i| i.parts == 0) {
            Some(i) => Err(MenuError::NoParts(i.name.clone())),
            None => Ok(()),
        }
    }

    pub(crate) fn to_blob(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<RecipeInput> for Recipe {
    fn from(input: RecipeInput) -> Self {
        match input {
            RecipeInput::Many(ingredients) => Recipe(ingredients),
            RecipeInput::One(ingredient) => Recipe(vec![ingredient]),
        }
    }
}

impl Drink {
    pub(crate) fn from_record(record: Record) -> Result<Self, RecipeError> {
        let Record { id, title, recipe } = record;
        let recipe = serde_json::from_str::<RecipeInput>(&recipe)
            .map_err(|cause| RecipeError { drink: id, cause })?
            .into();
        Ok(Drink {
            id: Id::from_raw(id),
            title,
            recipe,
        })
    }

    pub fn id(&self) -> Id<Drink> {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    pub fn short(&self) -> ShortDrink<'_> {
        let recipe = self
            .recipe
            .0
            .iter()
            .map(|i| ShortIngredient {
                color: &i.color,
                parts: i.parts,
            })
            .collect();
        ShortDrink {
            id: self.id,
            title: &self.title,
            recipe,
        }
    }

    pub fn long(&self) -> LongDrink<'_> {
        LongDrink {
            id: self.id,
            title: &self.title,
            recipe: &self.recipe,
        }
    }
}

impl Entity for Drink {
    const PREFIX: &'static str = "drink";
}
