//! Recipe Streaming Demo
//!
//! Streams a structured recipe from a responses endpoint and prints each partial
//! result as fields fill in. The model can look up pantry stock through a typed
//! tool.
//!
//! ```text
//! STRUCTURED_STREAM_ENDPOINT=http://localhost:8080/v1/responses \
//! RUST_LOG=structured_stream=debug \
//! cargo run --example recipe_stream -- "a weeknight focaccia"
//! ```

use anyhow::Context;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use structured_stream::{
    ConversationItem, Generable, SchemaType, Session, SessionOptions, Tool, TypeDescription,
    get_api_key, get_endpoint,
};
use tracing_subscriber::EnvFilter;

struct Recipe;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
struct PartialRecipe {
    title: Option<String>,
    servings: Option<u32>,
    ingredients: Option<Vec<PartialIngredient>>,
    steps: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
struct PartialIngredient {
    name: Option<String>,
    grams: Option<f64>,
}

impl Generable for Recipe {
    type Partial = PartialRecipe;

    fn type_description() -> TypeDescription {
        TypeDescription::new("Recipe")
            .description("A recipe a home cook can follow")
            .field("title", SchemaType::String, "Name of the dish")
            .field("servings", SchemaType::Integer, "")
            .field(
                "ingredients",
                SchemaType::array(SchemaType::reference("Ingredient")),
                "",
            )
            .field("steps", SchemaType::array(SchemaType::String), "One action per step")
    }

    fn definitions() -> Vec<TypeDescription> {
        vec![
            TypeDescription::new("Ingredient")
                .field("name", SchemaType::String, "")
                .optional_field("grams", SchemaType::Number, "Weight in grams"),
        ]
    }
}

#[derive(Deserialize)]
struct PantryQuery {
    item: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
struct PartialPantryQuery {
    item: Option<String>,
}

impl Generable for PantryQuery {
    type Partial = PartialPantryQuery;

    fn type_description() -> TypeDescription {
        TypeDescription::new("PantryQuery").field("item", SchemaType::String, "Ingredient to check")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let dish = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "a simple sourdough loaf".to_string());

    let pantry = Tool::typed(
        "pantry_lookup",
        "Check whether an ingredient is in stock",
        |query: PantryQuery| async move {
            let in_stock = !query.item.to_lowercase().contains("saffron");
            Ok(json!({"item": query.item, "in_stock": in_stock}))
        },
    )?;

    let endpoint = get_endpoint(Some("http://localhost:8080/v1/responses"))
        .context("no endpoint configured")?;
    let options = SessionOptions::builder()
        .instructions(
            "You are a recipe writer. Check the pantry before relying on unusual \
             ingredients, then answer with the recipe only.",
        )
        .endpoint(endpoint)
        .api_key(get_api_key())
        .tool(pantry)
        .build()?;
    let mut session = Session::new(options)?;

    let prompt = format!("Write a recipe for {}.", dish);
    let mut partials = session.stream_typed::<Recipe>([ConversationItem::user_text(prompt)]);

    while let Some(partial) = partials.next().await {
        let recipe = partial.context("recipe stream failed")?;
        let ingredients = recipe.ingredients.as_ref().map_or(0, Vec::len);
        let steps = recipe.steps.as_ref().map_or(0, Vec::len);
        println!(
            "{:<30} servings={:<4} ingredients={:<3} steps={}",
            recipe.title.as_deref().unwrap_or("..."),
            recipe
                .servings
                .map_or_else(|| "?".to_string(), |s| s.to_string()),
            ingredients,
            steps
        );
    }
    drop(partials);

    println!(
        "\n{} items in transcript, continuation id {:?}",
        session.transcript().len(),
        session.previous_response_id()
    );
    Ok(())
}
