use std::sync::LazyLock;

use futures::FutureExt;
use futures::future::BoxFuture;
use scraper::Selector;

use super::{Task, TaskContext, TaskError, TaskOutcome};
use crate::browser::render_page;
use crate::parser::{count_elements, parse_animal_count, parse_teguise_total, teguise_search_form};
use crate::types::RescueRecord;

const ISLAND: &str = "Lanzarote";

pub const SARA_URL: &str = "https://animales.saraprotectora.org/animales/categoria/1";
pub const TEGUISE_URL: &str = "https://albergueanimalesteguise.com/Nuestros-Animales";
pub const CASA_ESTRELLAS_URL: &str = "https://www.casa-de-las-estrellas.org/es/dogs";

/// One gallery card per dog on the rendered Wix page.
pub static CASA_ESTRELLAS_ITEM: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.item-link-wrapper").expect("invalid selector: casa estrellas item")
});

pub const SARA: Task = Task::new(
    "lanzarote_sara",
    "Sara protectora dog count (framed listing page)",
    SARA_URL,
    run_sara,
);

pub const TEGUISE: Task = Task::new(
    "lanzarote_teguise",
    "Teguise shelter dog count (ASP.NET postback)",
    TEGUISE_URL,
    run_teguise,
);

pub const CASA_ESTRELLAS: Task = Task::new(
    "lanzarote_casa_estrellas",
    "Casa de las Estrellas dog gallery (headless browser)",
    CASA_ESTRELLAS_URL,
    run_casa_estrellas,
);

fn run_sara(ctx: &TaskContext) -> BoxFuture<'_, Result<TaskOutcome, TaskError>> {
    scrape_sara(ctx, SARA_URL).boxed()
}

fn run_teguise(ctx: &TaskContext) -> BoxFuture<'_, Result<TaskOutcome, TaskError>> {
    scrape_teguise(ctx, TEGUISE_URL).boxed()
}

fn run_casa_estrellas(ctx: &TaskContext) -> BoxFuture<'_, Result<TaskOutcome, TaskError>> {
    scrape_casa_estrellas(ctx, CASA_ESTRELLAS_URL).boxed()
}

pub async fn scrape_sara(ctx: &TaskContext, url: &str) -> Result<TaskOutcome, TaskError> {
    let html = ctx.scraper.get_html(url).await?;
    let total_dogs = parse_animal_count(&html)?;
    Ok(ctx
        .store_rescue(RescueRecord::new(total_dogs, "Sara", ISLAND))
        .await)
}

pub async fn scrape_teguise(ctx: &TaskContext, url: &str) -> Result<TaskOutcome, TaskError> {
    let landing = ctx.scraper.get_html(url).await?;
    let form = teguise_search_form(&landing);

    let delta = ctx.scraper.post_postback(url, &form).await?;
    let total_dogs = parse_teguise_total(&delta)?;
    Ok(ctx
        .store_rescue(RescueRecord::new(total_dogs, "Teguise", ISLAND))
        .await)
}

pub async fn scrape_casa_estrellas(
    ctx: &TaskContext,
    url: &str,
) -> Result<TaskOutcome, TaskError> {
    let html = render_page(url, &ctx.render).await?;
    let total_dogs = count_elements(&html, &CASA_ESTRELLAS_ITEM);
    if total_dogs == 0 {
        log::warn!("No gallery items rendered on {}; the page may not have finished loading", url);
    }

    Ok(ctx
        .store_rescue(RescueRecord::new(
            total_dogs as i64,
            "Casa de las Estrellas",
            ISLAND,
        ))
        .await)
}
