use std::sync::Arc;

use actix_web::{http::header, web, HttpRequest, HttpResponse};
use anyhow::{Context, Result};
use log::*;
use r2d2::Pool;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use infra::ids::Id;
use infra::persistence::Storage;

use super::models::{validate_title, Drink, Recipe, RecipeInput};
use super::{AddDrink, EditDrink, RemoveDrink, ShowDrink, ShowMenu, SEED_RECIPE, SEED_TITLE};
use crate::auth::{self, Claims, Verifier};
use crate::config::Bootstrap;
use crate::errors::{self, ApiError};
use crate::services::{Commandable, Queryable};

#[derive(Debug)]
pub struct Menu<M: r2d2::ManageConnection> {
    db: Pool<M>,
    verifier: Arc<Verifier>,
}

#[derive(Deserialize, Debug)]
struct NewDrink {
    title: String,
    recipe: RecipeInput,
}

#[derive(Deserialize, Debug)]
struct DrinkPatch {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    recipe: Option<RecipeInput>,
}

#[derive(Serialize, Debug)]
struct Drinks<T> {
    success: bool,
    drinks: T,
}

#[derive(Serialize, Debug)]
struct Deleted {
    success: bool,
    delete: Id<Drink>,
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("bad request: {}", e)))
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> Menu<M> {
    pub fn new(db: Pool<M>, verifier: Arc<Verifier>) -> Self {
        Menu { db, verifier }
    }

    /// Makes sure the table exists (recreating it when asked to) and puts
    /// the house drink on the menu.
    pub fn setup(&self, bootstrap: &Bootstrap) -> Result<()> {
        let mut conn = self.db.get()?;
        if bootstrap.reset {
            warn!("Dropping every drink on the menu");
            conn.reset().context("reset drink table")?;
        } else {
            conn.setup().context("setup drink table")?;
        }

        if bootstrap.seed {
            let present = conn.list()?.iter().any(|r| r.title == SEED_TITLE);
            if !present {
                let seed = conn.insert(SEED_TITLE, SEED_RECIPE).context("seed menu")?;
                info!("Seeded menu with {:?} as {}", seed.title, seed.id);
            }
        }
        Ok(())
    }

    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.service(
            web::resource("/drinks")
                .route(web::get().to({
                    let me = self.clone();
                    move || {
                        let me = me.clone();
                        async move { me.index().await }
                    }
                }))
                .route(web::post().to({
                    let me = self.clone();
                    move |req: HttpRequest, body: web::Bytes| {
                        let me = me.clone();
                        async move { me.create(req, body).await }
                    }
                }))
                .default_service(web::to(errors::method_not_allowed)),
        )
        .service(
            web::resource("/drinks-detail")
                .route(web::get().to({
                    let me = self.clone();
                    move |req: HttpRequest| {
                        let me = me.clone();
                        async move { me.detail(req).await }
                    }
                }))
                .default_service(web::to(errors::method_not_allowed)),
        )
        .service(
            web::resource(r"/drinks/{id:\d+}")
                .route(web::patch().to({
                    let me = self.clone();
                    move |req: HttpRequest, id: web::Path<Id<Drink>>, body: web::Bytes| {
                        let me = me.clone();
                        async move { me.update(req, id.into_inner(), body).await }
                    }
                }))
                .route(web::delete().to({
                    let me = self.clone();
                    move |req: HttpRequest, id: web::Path<Id<Drink>>| {
                        let me = me.clone();
                        async move { me.remove(req, id.into_inner()).await }
                    }
                }))
                .default_service(web::to(errors::method_not_allowed)),
        );
    }

    async fn index(&self) -> Result<HttpResponse, ApiError> {
        let drinks = self.in_pool(|menu| menu.query(ShowMenu)).await?;
        debug!("Listing {} drinks", drinks.len());
        let drinks = drinks.iter().map(Drink::short).collect::<Vec<_>>();
        Ok(HttpResponse::Ok().json(Drinks {
            success: true,
            drinks,
        }))
    }

    async fn detail(&self, req: HttpRequest) -> Result<HttpResponse, ApiError> {
        self.authorize(&req, auth::GET_DRINKS_DETAIL)?;
        let drinks = self.in_pool(|menu| menu.query(ShowMenu)).await?;
        let drinks = drinks.iter().map(Drink::long).collect::<Vec<_>>();
        Ok(HttpResponse::Ok().json(Drinks {
            success: true,
            drinks,
        }))
    }

    async fn create(&self, req: HttpRequest, body: web::Bytes) -> Result<HttpResponse, ApiError> {
        self.authorize(&req, auth::POST_DRINKS)?;
        let NewDrink { title, recipe } = parse_body(&body)?;
        let add = AddDrink {
            title,
            recipe: recipe.into(),
        };
        let drink = self.in_pool(move |menu| menu.execute(add)).await?;
        info!("Added {:?}: {:?}", drink.id(), drink.title());
        Ok(HttpResponse::Ok().json(Drinks {
            success: true,
            drinks: drink.long(),
        }))
    }

    async fn update(
        &self,
        req: HttpRequest,
        id: Id<Drink>,
        body: web::Bytes,
    ) -> Result<HttpResponse, ApiError> {
        self.authorize(&req, auth::PATCH_DRINKS)?;
        let DrinkPatch { title, recipe } = parse_body(&body)?;
        let edit = EditDrink {
            id,
            title,
            recipe: recipe.map(Recipe::from),
        };
        let drink = self
            .in_pool(move |menu| menu.execute(edit))
            .await?
            .ok_or(ApiError::NotFound)?;
        info!("Edited {:?}", drink.id());
        Ok(HttpResponse::Ok().json(Drinks {
            success: true,
            drinks: vec![drink.long()],
        }))
    }

    // A missing drink is a 400 here, where editing one is a 404.
    async fn remove(&self, req: HttpRequest, id: Id<Drink>) -> Result<HttpResponse, ApiError> {
        self.authorize(&req, auth::DELETE_DRINKS)?;
        let removed = self.in_pool(move |menu| menu.execute(RemoveDrink { id })).await?;
        if !removed {
            return Err(ApiError::BadRequest(format!("drink {} does not exist", id)));
        }
        info!("Removed {:?}", id);
        Ok(HttpResponse::Ok().json(Deleted {
            success: true,
            delete: id,
        }))
    }

    fn authorize(&self, req: &HttpRequest, permission: &str) -> Result<Claims, ApiError> {
        let header = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let claims = self.verifier.authorize(header, permission)?;
        Ok(claims)
    }

    /// Runs `f` on the blocking thread pool, out of the way of the executor.
    async fn in_pool<R, F>(&self, f: F) -> Result<R, ApiError>
    where
        R: Send + 'static,
        F: FnOnce(&Self) -> Result<R> + Send + 'static,
    {
        let me = self.clone();
        let res = web::block(move || f(&me)).await?;
        res.map_err(ApiError::from)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> Queryable<ShowMenu>
    for Menu<M>
{
    // Drinks whose stored recipe no longer decodes are left off.
    fn query(&self, _: ShowMenu) -> Result<Vec<Drink>> {
        let mut conn = self.db.get()?;
        let records = conn.list().context("list drinks")?;
        trace!("Loaded {} records", records.len());
        let drinks = records
            .into_iter()
            .filter_map(|record| match Drink::from_record(record) {
                Ok(drink) => Some(drink),
                Err(e) => {
                    error!("Skipping drink: {}", e);
                    None
                }
            })
            .collect();
        Ok(drinks)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<ShowDrink> for Menu<M>
{
    fn query(&self, req: ShowDrink) -> Result<Option<Drink>> {
        let mut conn = self.db.get()?;
        let record = conn.load(req.id.raw()).context("load drink")?;
        let drink = record.map(Drink::from_record).transpose()?;
        Ok(drink)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> Commandable<AddDrink>
    for Menu<M>
{
    fn execute(&self, req: AddDrink) -> Result<Drink> {
        let AddDrink { title, recipe } = req;
        validate_title(&title)?;
        recipe.validate()?;
        let blob = recipe.to_blob()?;

        let mut conn = self.db.get()?;
        let record = conn.insert(&title, &blob).context("add drink")?;
        debug!("Saved {:?} as {}", record.title, record.id);

        Ok(Drink {
            id: Id::from_raw(record.id),
            title: record.title,
            recipe,
        })
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<EditDrink> for Menu<M>
{
    fn execute(&self, req: EditDrink) -> Result<Option<Drink>> {
        let EditDrink { id, title, recipe } = req;
        if let Some(title) = title.as_deref() {
            validate_title(title)?;
        }
        let blob = match recipe.as_ref() {
            Some(recipe) => {
                recipe.validate()?;
                Some(recipe.to_blob()?)
            }
            None => None,
        };

        let mut conn = self.db.get()?;
        let record = conn
            .update(id.raw(), title.as_deref(), blob.as_deref())
            .context("edit drink")?;
        let drink = record.map(Drink::from_record).transpose()?;
        Ok(drink)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<RemoveDrink> for Menu<M>
{
    fn execute(&self, req: RemoveDrink) -> Result<bool> {
        let mut conn = self.db.get()?;
        let removed = conn.delete(req.id.raw()).context("remove drink")?;
        Ok(removed)
    }
}

impl<M: r2d2::ManageConnection> Clone for Menu<M> {
    fn clone(&self) -> Self {
        let db = self.db.clone();
        let verifier = self.verifier.clone();
        Menu { db, verifier }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::auth::KeySet;
    use crate::menu::Ingredient;
    use infra::memory::MemoryConnectionManager;

    fn menu() -> Menu<MemoryConnectionManager> {
        let db = r2d2::Pool::builder()
            .max_size(1)
            .build(MemoryConnectionManager::default())
            .expect("pool");
        let verifier = Verifier::new(KeySet::default(), "issuer", "audience");
        Menu::new(db, Arc::new(verifier))
    }

    fn ingredient(name: &str, parts: u32) -> Ingredient {
        Ingredient {
            name: name.to_string(),
            color: "brown".to_string(),
            parts,
        }
    }

    #[test]
    fn setup_seeds_the_house_drink_once() {
        let menu = menu();
        menu.setup(&Bootstrap::default()).expect("setup");
        menu.setup(&Bootstrap::default()).expect("setup again");

        let drinks = menu.query(ShowMenu).expect("menu");

        assert_eq!(drinks.len(), 1);
        assert_eq!(drinks[0].title(), SEED_TITLE);
        assert_eq!(drinks[0].recipe().ingredients()[0].name, "esspresso");
    }

    #[test]
    fn reset_drops_what_was_there() {
        let menu = menu();
        menu.execute(AddDrink {
            title: "mocha".to_string(),
            recipe: Recipe::new(vec![ingredient("chocolate", 1)]),
        })
        .expect("add");

        menu.setup(&Bootstrap {
            reset: true,
            seed: false,
        })
        .expect("reset");

        assert_eq!(menu.query(ShowMenu).expect("menu"), vec![]);
    }

    #[test]
    fn editing_only_the_title_keeps_the_recipe() {
        let menu = menu();
        let added = menu
            .execute(AddDrink {
                title: "mocha".to_string(),
                recipe: Recipe::new(vec![ingredient("chocolate", 2)]),
            })
            .expect("add");

        let edited = menu
            .execute(EditDrink {
                id: added.id(),
                title: Some("dark mocha".to_string()),
                recipe: None,
            })
            .expect("edit")
            .expect("present");

        assert_eq!(edited.title(), "dark mocha");
        assert_eq!(edited.recipe(), added.recipe());
    }

    #[test]
    fn invalid_edits_touch_nothing() {
        let menu = menu();
        let added = menu
            .execute(AddDrink {
                title: "mocha".to_string(),
                recipe: Recipe::new(vec![ingredient("chocolate", 2)]),
            })
            .expect("add");

        let err = menu
            .execute(EditDrink {
                id: added.id(),
                title: Some(String::new()),
                recipe: None,
            })
            .expect_err("empty title");

        assert!(err.downcast_ref::<crate::menu::MenuError>().is_some());
        assert_eq!(menu.query(ShowMenu).expect("menu"), vec![added]);
    }

    #[test]
    fn corrupt_recipes_are_left_off_the_menu() {
        let menu = menu();
        menu.setup(&Bootstrap::default()).expect("setup");
        menu.db
            .get()
            .expect("conn")
            .insert("mystery", r#"[{"color": "grey"}]"#)
            .expect("insert");

        let drinks = menu.query(ShowMenu).expect("menu");

        let titles = drinks.iter().map(Drink::title).collect::<Vec<_>>();
        assert_eq!(titles, vec![SEED_TITLE]);
    }

    #[test]
    fn shows_single_drinks_by_id() {
        let menu = menu();
        let added = menu
            .execute(AddDrink {
                title: "mocha".to_string(),
                recipe: Recipe::new(vec![ingredient("chocolate", 2)]),
            })
            .expect("add");

        let shown = menu.query(ShowDrink { id: added.id() }).expect("show");
        assert_eq!(shown, Some(added));

        let missing = menu
            .query(ShowDrink {
                id: Id::from_raw(41),
            })
            .expect("show");
        assert_eq!(missing, None);
    }

    #[test]
    fn removing_reports_absence() {
        let menu = menu();
        let id = Id::from_raw(41);

        assert!(!menu.execute(RemoveDrink { id }).expect("remove"));
    }
}
